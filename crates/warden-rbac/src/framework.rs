//! Process-lifetime assembly of the conformance framework.
//!
//! # Purpose
//! One [`RbacFramework`] per worker process owns the configuration, the
//! identity client, the role-switch coordinator, the oracle caches, and the
//! optional reporter, and drives decorated test bodies through the
//! prediction/outcome truth table.
//!
//! # Ordering
//! For each test the order is strictly: oracle consult → role switch (done by
//! the test's own setup) → body → admin restore → report.
use crate::action::{ActionContract, ExpectedFault, classify};
use crate::authority::{PolicyAuthority, RulesetCache};
use crate::catalog::ServiceCatalog;
use crate::config::RbacConfig;
use crate::context::{FixtureId, TestContext};
use crate::coordinator::RoleSwitchCoordinator;
use crate::errors::{ApiFault, RbacError, RbacResult};
use crate::report::{RbacReporter, ReportRow, Verdict};
use crate::requirements::RequirementsAuthority;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use warden_identity::{CredentialProvider, IdentityClient};
use warden_policy::{DefaultRegistry, PolicyLoader};

pub struct RbacFramework {
    config: RbacConfig,
    subject: Arc<dyn CredentialProvider>,
    coordinator: RoleSwitchCoordinator,
    catalog: ServiceCatalog,
    loader: PolicyLoader,
    rulesets: RulesetCache,
    requirements: DashMap<String, Arc<RequirementsAuthority>>,
    reporter: Option<RbacReporter>,
}

impl RbacFramework {
    /// Build the framework once at harness startup.
    ///
    /// The reporter is opened here only when reporting is enabled; when
    /// disabled the reporter is never touched.
    pub fn new(
        config: RbacConfig,
        identity: Arc<dyn IdentityClient>,
        subject: Arc<dyn CredentialProvider>,
        defaults: DefaultRegistry,
    ) -> RbacResult<Self> {
        let reporter = if config.enable_reporting {
            Some(RbacReporter::open(
                &config.report_log_path,
                &config.report_log_name,
            )?)
        } else {
            None
        };
        let loader = PolicyLoader::new(config.custom_policy_files.clone(), defaults);
        let coordinator = RoleSwitchCoordinator::new(
            identity.clone(),
            config.admin_role.clone(),
            config.rbac_test_role.clone(),
        );
        let catalog = ServiceCatalog::new(identity);
        Ok(Self {
            config,
            subject,
            coordinator,
            catalog,
            loader,
            rulesets: RulesetCache::new(),
            requirements: DashMap::new(),
            reporter,
        })
    }

    pub fn config(&self) -> &RbacConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &RoleSwitchCoordinator {
        &self.coordinator
    }

    pub fn subject(&self) -> &dyn CredentialProvider {
        self.subject.as_ref()
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    /// Fresh context for a fixture, carrying the subject's credentials.
    pub fn context(&self, fixture: FixtureId) -> TestContext {
        TestContext::new(fixture, self.subject.credentials())
    }

    /// Fixture setup entry point: put the subject into the test role.
    pub async fn assume_test_role(&self, fixture: &FixtureId) -> RbacResult<()> {
        self.coordinator
            .switch_role(self.subject.as_ref(), fixture, true)
            .await
    }

    /// Fixture teardown entry point: put the subject back into admin.
    pub async fn assume_admin_role(&self, fixture: &FixtureId) -> RbacResult<()> {
        self.coordinator
            .switch_role(self.subject.as_ref(), fixture, false)
            .await
    }

    /// Scoped switch for use inside a body; restores admin on exit.
    pub async fn override_role<T, F, Fut>(&self, fixture: &FixtureId, body: F) -> RbacResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RbacResult<T>>,
    {
        self.coordinator
            .override_role(self.subject.as_ref(), fixture, body)
            .await
    }

    /// Run one decorated test body against its contract.
    ///
    /// The role switch has already been performed by the test's own setup;
    /// this only predicts, observes, restores admin, and reports.
    pub async fn run<F, Fut>(
        &self,
        ctx: &TestContext,
        contract: &ActionContract,
        test_name: &str,
        body: F,
    ) -> RbacResult<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), ApiFault>>,
    {
        if !self.config.enable_rbac {
            return Err(RbacError::Skipped(
                "rbac conformance testing is disabled".to_string(),
            ));
        }

        let role = self.config.rbac_test_role.clone();
        let (expected, predicted) = match self.pre_phase(ctx, contract, &role).await {
            Ok(resolved) => resolved,
            Err(err) => {
                // The test's setup already switched roles; put admin back
                // before surfacing the pre-phase failure.
                if let Err(restore_err) = self
                    .coordinator
                    .restore_admin(self.subject.as_ref(), &ctx.fixture, true)
                    .await
                {
                    tracing::error!(error = %restore_err, "admin restore failed after pre-phase error");
                }
                return Err(err);
            }
        };
        tracing::debug!(
            service = %contract.service,
            rule = %contract.rule,
            role = %role,
            predicted_allowed = predicted,
            "oracle prediction"
        );

        let outcome = body().await;

        if expected == ExpectedFault::NotFound && matches!(outcome, Err(ApiFault::NotFound)) {
            // Some services mask 403 as 404 to hide resource existence;
            // tolerated, but worth surfacing every time it happens.
            tracing::warn!(
                service = %contract.service,
                rule = %contract.rule,
                "service returned 404 where 403 would be semantically correct"
            );
        }

        let (result, actual) = classify(
            predicted,
            outcome,
            expected,
            &role,
            &contract.rule,
            &contract.service,
        );

        let restore = self
            .coordinator
            .restore_admin(self.subject.as_ref(), &ctx.fixture, result.is_err())
            .await;

        if let Some(reporter) = &self.reporter {
            reporter.record(&ReportRow {
                service: contract.service.clone(),
                test: test_name.to_string(),
                rule: contract.rule.clone(),
                expected: Verdict::from_allowed(predicted),
                actual,
            })?;
        }

        result?;
        restore
    }

    async fn pre_phase(
        &self,
        ctx: &TestContext,
        contract: &ActionContract,
        role: &str,
    ) -> RbacResult<(ExpectedFault, bool)> {
        // A context built for some other subject cannot be driven here.
        if ctx.credentials != self.subject.credentials() {
            return Err(RbacError::SetupFailed(
                "test context credentials do not match the framework subject".to_string(),
            ));
        }
        // Resolve the expected fault before the body runs: a bad error code
        // is a bug in the test, not a conformance result.
        let expected = ExpectedFault::from_code(contract.expected_error_code)?;
        // Late-bind the extra target attributes against the context.
        let extras = ctx.resolve(&contract.extra_target_data)?;

        let predicted = match self.predict(ctx, contract, role, extras).await {
            Ok(predicted) => predicted,
            Err(RbacError::Parsing(err)) => {
                if self.config.strict_policy_check {
                    return Err(RbacError::Parsing(err));
                }
                return Err(RbacError::Skipped(format!("policy not parsable: {err}")));
            }
            Err(RbacError::InvalidService(service)) => {
                return Err(RbacError::NotFound(format!(
                    "service {service} not found in the identity catalog"
                )));
            }
            Err(other) => return Err(other),
        };
        Ok((expected, predicted))
    }

    async fn predict(
        &self,
        ctx: &TestContext,
        contract: &ActionContract,
        role: &str,
        extras: BTreeMap<String, String>,
    ) -> RbacResult<bool> {
        if contract.admin_only {
            tracing::debug!(
                rule = %contract.rule,
                "admin-only contract, bypassing oracle"
            );
            return Ok(role == self.config.admin_role);
        }

        if self.config.test_custom_requirements {
            let authority = self.requirements_for(&contract.service)?;
            return authority.allowed(&contract.rule, role);
        }

        let authority = PolicyAuthority::new(
            &self.catalog,
            &self.rulesets,
            &self.loader,
            &self.config.admin_role,
            ctx.credentials.project_id.clone(),
            ctx.credentials.user_id.clone(),
            &contract.service,
            extras,
        )
        .await?;
        authority.allowed(&contract.rule, &BTreeSet::from([role.to_string()]))
    }

    fn requirements_for(&self, service: &str) -> RbacResult<Arc<RequirementsAuthority>> {
        if let Some(entry) = self.requirements.get(service) {
            return Ok(entry.clone());
        }
        let Some(path) = &self.config.custom_requirements_file else {
            return Err(RbacError::SetupFailed(
                "test_custom_requirements is set but custom_requirements_file is not".to_string(),
            ));
        };
        let authority = Arc::new(RequirementsAuthority::load(path, service)?);
        let entry = self
            .requirements
            .entry(service.to_string())
            .or_insert(authority);
        Ok(entry.clone())
    }
}
