//! Role-switch coordinator: puts the test subject into exactly one role.
//!
//! # Purpose
//! Establishes that the subject wears exactly the test role for the duration
//! of a test body and wears exactly the admin role between tests, flushing
//! cached authentication after every change.
//!
//! # How it fits
//! Test setup calls [`RoleSwitchCoordinator::switch_role`] before the body;
//! the action runner restores admin during cleanup. [`override_role`] bundles
//! both for scoped use inside a body.
//!
//! # Key invariants
//! - After any switch the subject holds exactly one role on the project.
//! - Admin is restored even when the body fails.
//! - One coordinator per process; role ids are resolved once, lazily.
use crate::context::FixtureId;
use crate::errors::{RbacError, RbacResult};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use warden_identity::{CredentialProvider, IdentityClient, RoleId};

#[derive(Debug, Clone)]
struct RoleIds {
    admin: RoleId,
    test: RoleId,
}

pub struct RoleSwitchCoordinator {
    identity: Arc<dyn IdentityClient>,
    admin_role: String,
    rbac_test_role: String,
    role_ids: OnceCell<RoleIds>,
    // Last requested flag per fixture; catches tests that switch the same
    // way twice without an intervening switch back.
    ledger: DashMap<FixtureId, bool>,
}

impl RoleSwitchCoordinator {
    pub fn new(
        identity: Arc<dyn IdentityClient>,
        admin_role: impl Into<String>,
        rbac_test_role: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            admin_role: admin_role.into(),
            rbac_test_role: rbac_test_role.into(),
            role_ids: OnceCell::new(),
            ledger: DashMap::new(),
        }
    }

    async fn role_ids(&self) -> RbacResult<&RoleIds> {
        self.role_ids
            .get_or_try_init(|| async {
                let roles = self.identity.list_roles().await?;
                let find = |name: &str| {
                    roles
                        .iter()
                        .find(|role| role.name == name)
                        .map(|role| role.id.clone())
                };
                let admin = find(&self.admin_role).ok_or_else(|| {
                    RbacError::SetupFailed(format!(
                        "admin role {:?} not found on the identity service",
                        self.admin_role
                    ))
                })?;
                let test = find(&self.rbac_test_role).ok_or_else(|| {
                    RbacError::SetupFailed(format!(
                        "rbac test role {:?} not found on the identity service",
                        self.rbac_test_role
                    ))
                })?;
                tracing::debug!(admin = %admin, test = %test, "role ids resolved");
                Ok::<_, RbacError>(RoleIds { admin, test })
            })
            .await
    }

    /// Switch the subject to the test role (`to_test_role`) or to admin.
    ///
    /// Calling twice in a row with the same flag is a fixture bug and fails
    /// with `SetupFailed`.
    pub async fn switch_role(
        &self,
        subject: &dyn CredentialProvider,
        fixture: &FixtureId,
        to_test_role: bool,
    ) -> RbacResult<()> {
        self.switch_inner(subject, fixture, to_test_role, true).await
    }

    /// Cleanup entry point: restore admin after a test body.
    ///
    /// `body_failed` exempts the switch from the double-switch guard — the
    /// failed body may have skipped its own switch back.
    pub(crate) async fn restore_admin(
        &self,
        subject: &dyn CredentialProvider,
        fixture: &FixtureId,
        body_failed: bool,
    ) -> RbacResult<()> {
        self.switch_inner(subject, fixture, false, !body_failed).await
    }

    async fn switch_inner(
        &self,
        subject: &dyn CredentialProvider,
        fixture: &FixtureId,
        to_test_role: bool,
        enforce_guard: bool,
    ) -> RbacResult<()> {
        let ids = self.role_ids().await?;

        let previous = self.ledger.get(fixture).map(|entry| *entry);
        if enforce_guard && previous == Some(to_test_role) {
            return Err(RbacError::SetupFailed(format!(
                "switch_role must not be called with the same role twice in a row (fixture {fixture})"
            )));
        }
        self.ledger.insert(fixture.clone(), to_test_role);

        let desired = if to_test_role { &ids.test } else { &ids.admin };
        let creds = subject.credentials();
        let held = self
            .identity
            .roles_on_project(&creds.project_id, &creds.user_id)
            .await?;

        let already_switched = held.len() == 1 && held[0].id == *desired;
        if already_switched {
            tracing::debug!(fixture = %fixture, role = %desired, "subject already holds the desired role");
        } else {
            for role in &held {
                self.identity
                    .revoke_role(&creds.project_id, &creds.user_id, &role.id)
                    .await?;
            }
            self.identity
                .grant_role(&creds.project_id, &creds.user_id, desired)
                .await?;
            tracing::info!(
                fixture = %fixture,
                role = %desired,
                to_test_role,
                "subject role switched"
            );
        }

        self.refresh_auth(subject).await
    }

    async fn refresh_auth(&self, subject: &dyn CredentialProvider) -> RbacResult<()> {
        let token = subject.current_token();
        subject.clear_auth();
        let uuid_shaped = token.map(|t| t.is_uuid_shaped()).unwrap_or(false);
        if !uuid_shaped {
            // Opaque tokens embed a second-precise issue timestamp; a token
            // requested within the same second as the revocation can predate
            // the role change. Cross the second boundary before re-auth.
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        subject.set_auth().await?;
        Ok(())
    }

    /// Run `body` under the test role, restoring admin afterwards.
    ///
    /// The restore runs whether the body succeeded or failed; a body error
    /// wins over a restore error.
    pub async fn override_role<T, F, Fut>(
        &self,
        subject: &dyn CredentialProvider,
        fixture: &FixtureId,
        body: F,
    ) -> RbacResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RbacResult<T>>,
    {
        self.switch_role(subject, fixture, true).await?;
        let result = body().await;
        let restore = self
            .restore_admin(subject, fixture, result.is_err())
            .await;
        match (result, restore) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), restore) => {
                if let Err(restore_err) = restore {
                    tracing::error!(error = %restore_err, "failed to restore admin role after body error");
                }
                Err(err)
            }
        }
    }
}
