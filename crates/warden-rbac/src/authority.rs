//! Policy authority: the oracle derived from a service's declared policy.
//!
//! # Purpose
//! Owns a loaded ruleset for one (project, user, service) triple and answers
//! "is rule R allowed for role set S?". Rulesets are cached process-wide:
//! asking for the same service again returns the same shared compilation.
use crate::catalog::ServiceCatalog;
use crate::errors::{RbacError, RbacResult};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use warden_identity::{ProjectId, UserId};
use warden_policy::{PolicyLoader, PolicyResult, Ruleset, Subject, Target};

/// Process-wide ruleset cache keyed by service name.
#[derive(Debug, Default)]
pub struct RulesetCache {
    cache: DashMap<String, Arc<Ruleset>>,
}

impl RulesetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load-once semantics: the first caller compiles, everyone else shares
    /// the same `Arc`.
    pub fn get_or_load(&self, loader: &PolicyLoader, service: &str) -> PolicyResult<Arc<Ruleset>> {
        if let Some(entry) = self.cache.get(service) {
            tracing::debug!(service, "ruleset cache hit");
            return Ok(entry.clone());
        }
        let rules = Arc::new(loader.load(service)?);
        tracing::info!(service, rules = rules.len(), "policy ruleset loaded");
        let entry = self.cache.entry(service.to_string()).or_insert(rules);
        Ok(entry.clone())
    }
}

/// Per-(project, user, service) façade over the compiled ruleset.
pub struct PolicyAuthority {
    service: String,
    project_id: ProjectId,
    user_id: UserId,
    admin_role: String,
    extra_target: BTreeMap<String, String>,
    rules: Arc<Ruleset>,
}

impl PolicyAuthority {
    pub async fn new(
        catalog: &ServiceCatalog,
        cache: &RulesetCache,
        loader: &PolicyLoader,
        admin_role: &str,
        project_id: ProjectId,
        user_id: UserId,
        service: &str,
        extra_target: BTreeMap<String, String>,
    ) -> RbacResult<Self> {
        let service = service.trim().to_lowercase();
        catalog.validate(&service).await?;
        let rules = cache.get_or_load(loader, &service)?;
        Ok(Self {
            service,
            project_id,
            user_id,
            admin_role: admin_role.to_string(),
            extra_target,
            rules,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Predict whether `rule_name` is allowed for the given role set.
    pub fn allowed(&self, rule_name: &str, roles: &BTreeSet<String>) -> RbacResult<bool> {
        // is_admin_project is hard-coded true: deriving it from project and
        // domain names is not implemented, so admin-project-scoped rules are
        // always evaluated as if the test project were the admin project.
        let subject = Subject::new(
            self.user_id.as_str(),
            self.project_id.as_str(),
            roles.clone(),
        )
        .with_admin_project(true);

        let mut target = Target::for_project(self.project_id.as_str(), self.user_id.as_str());
        target.extend(
            self.extra_target
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let decision = self
            .rules
            .decide(rule_name, &subject, &target, &self.admin_role)?;
        tracing::debug!(
            service = %self.service,
            rule = rule_name,
            %decision,
            "policy authority prediction"
        );
        Ok(decision.is_allowed())
    }
}
