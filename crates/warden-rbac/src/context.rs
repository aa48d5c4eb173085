//! Per-test context: fixture identity and late-bound target attributes.
//!
//! The source framework resolved dotted attribute strings reflectively off
//! the test instance; here target bindings are explicit names resolved over a
//! typed context at run time.
use crate::errors::{RbacError, RbacResult};
use std::collections::BTreeMap;
use warden_identity::Credentials;

/// Identifies a test fixture for the role-switch misuse ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixtureId {
    pub module: &'static str,
    pub fixture: &'static str,
}

impl FixtureId {
    pub fn new(module: &'static str, fixture: &'static str) -> Self {
        Self { module, fixture }
    }
}

impl std::fmt::Display for FixtureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}", self.module, self.fixture)
    }
}

/// How one extra target attribute obtains its value.
#[derive(Debug, Clone)]
pub enum TargetBinding {
    /// A fixed value known when the contract is declared.
    Literal(String),
    /// The name of a context attribute, resolved when the test runs.
    Attr(String),
}

/// State a decorated test exposes to the framework.
#[derive(Debug, Clone)]
pub struct TestContext {
    pub fixture: FixtureId,
    pub credentials: Credentials,
    attrs: BTreeMap<String, String>,
}

impl TestContext {
    pub fn new(fixture: FixtureId, credentials: Credentials) -> Self {
        Self {
            fixture,
            credentials,
            attrs: BTreeMap::new(),
        }
    }

    /// Publish an attribute for late-bound target resolution, typically a
    /// resource id created during setup.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(name.into(), value.into());
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Resolve a contract's target bindings against this context.
    pub(crate) fn resolve(
        &self,
        bindings: &BTreeMap<String, TargetBinding>,
    ) -> RbacResult<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();
        for (key, binding) in bindings {
            let value = match binding {
                TargetBinding::Literal(value) => value.clone(),
                TargetBinding::Attr(name) => self
                    .attr(name)
                    .ok_or_else(|| {
                        RbacError::SetupFailed(format!(
                            "target attribute {name:?} (for target key {key:?}) is not set on the test context"
                        ))
                    })?
                    .to_string(),
            };
            resolved.insert(key.clone(), value);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_identity::{ProjectId, UserId};

    fn context() -> TestContext {
        TestContext::new(
            FixtureId::new("warden::tests", "ServerTest"),
            Credentials {
                user_id: UserId::new("u1"),
                project_id: ProjectId::new("p1"),
            },
        )
    }

    #[test]
    fn literal_and_attr_bindings_resolve() {
        let mut ctx = context();
        ctx.set_attr("server_id", "s-42");
        let bindings = BTreeMap::from([
            (
                "server:id".to_string(),
                TargetBinding::Attr("server_id".to_string()),
            ),
            (
                "flavor".to_string(),
                TargetBinding::Literal("small".to_string()),
            ),
        ]);
        let resolved = ctx.resolve(&bindings).expect("resolve");
        assert_eq!(resolved.get("server:id").map(String::as_str), Some("s-42"));
        assert_eq!(resolved.get("flavor").map(String::as_str), Some("small"));
    }

    #[test]
    fn missing_attr_fails_setup() {
        let ctx = context();
        let bindings = BTreeMap::from([(
            "server:id".to_string(),
            TargetBinding::Attr("server_id".to_string()),
        )]);
        let err = ctx.resolve(&bindings).expect_err("missing attr");
        assert!(matches!(err, RbacError::SetupFailed(_)));
    }

    #[test]
    fn fixture_display() {
        let fixture = FixtureId::new("warden::tests", "ServerTest");
        assert_eq!(fixture.to_string(), "warden::tests::ServerTest");
    }
}
