//! In-memory identity fakes shared by the integration tests.
#![allow(dead_code)]
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use warden_identity::{
    CredentialProvider, Credentials, IdentityClient, IdentityError, IdentityResult, ProjectId,
    Role, RoleId, ServiceRecord, Token, UserId,
};

pub const PROJECT: &str = "p-test";
pub const USER: &str = "u-test";

/// Identity backend holding a fixed role/service catalog and one subject's
/// mutable project role assignments.
pub struct FakeIdentity {
    roles: Vec<Role>,
    services: Vec<ServiceRecord>,
    assignments: Mutex<Vec<RoleId>>,
    pub grants: AtomicUsize,
    pub revokes: AtomicUsize,
}

impl FakeIdentity {
    pub fn new(role_names: &[&str], service_names: &[&str], initial: &[&str]) -> Self {
        let roles: Vec<Role> = role_names
            .iter()
            .map(|name| Role {
                id: RoleId::new(format!("role-{name}")),
                name: name.to_string(),
            })
            .collect();
        let services = service_names
            .iter()
            .enumerate()
            .map(|(idx, name)| ServiceRecord {
                id: format!("svc-{idx}"),
                name: name.to_string(),
                service_type: name.to_string(),
                enabled: true,
            })
            .collect();
        let assignments = initial
            .iter()
            .map(|name| RoleId::new(format!("role-{name}")))
            .collect();
        Self {
            roles,
            services,
            assignments: Mutex::new(assignments),
            grants: AtomicUsize::new(0),
            revokes: AtomicUsize::new(0),
        }
    }

    pub fn held_role_names(&self) -> Vec<String> {
        let held = self.assignments.lock().expect("assignments");
        self.roles
            .iter()
            .filter(|role| held.contains(&role.id))
            .map(|role| role.name.clone())
            .collect()
    }
}

#[async_trait]
impl IdentityClient for FakeIdentity {
    async fn list_roles(&self) -> IdentityResult<Vec<Role>> {
        Ok(self.roles.clone())
    }

    async fn list_services(&self) -> IdentityResult<Vec<ServiceRecord>> {
        Ok(self.services.clone())
    }

    async fn roles_on_project(
        &self,
        _project: &ProjectId,
        _user: &UserId,
    ) -> IdentityResult<Vec<Role>> {
        let held = self.assignments.lock().expect("assignments");
        Ok(self
            .roles
            .iter()
            .filter(|role| held.contains(&role.id))
            .cloned()
            .collect())
    }

    async fn grant_role(
        &self,
        _project: &ProjectId,
        _user: &UserId,
        role: &RoleId,
    ) -> IdentityResult<()> {
        self.grants.fetch_add(1, Ordering::Relaxed);
        let mut held = self.assignments.lock().expect("assignments");
        if !held.contains(role) {
            held.push(role.clone());
        }
        Ok(())
    }

    async fn revoke_role(
        &self,
        _project: &ProjectId,
        _user: &UserId,
        role: &RoleId,
    ) -> IdentityResult<()> {
        self.revokes.fetch_add(1, Ordering::Relaxed);
        let mut held = self.assignments.lock().expect("assignments");
        let before = held.len();
        held.retain(|id| id != role);
        if held.len() == before {
            return Err(IdentityError::UnexpectedStatus {
                status: 404,
                context: "revoking role not held".to_string(),
            });
        }
        Ok(())
    }

    async fn issue_token(&self, _user: &UserId, _project: &ProjectId) -> IdentityResult<Token> {
        Ok(Token::new("0123456789abcdef0123456789abcdef"))
    }
}

/// Credential provider issuing deterministic UUID-shaped tokens so role
/// switches never need to wait out a second boundary.
pub struct FakeSubject {
    credentials: Credentials,
    token: Mutex<Option<Token>>,
    issued: AtomicU64,
}

impl FakeSubject {
    pub fn new() -> Self {
        Self {
            credentials: Credentials {
                user_id: UserId::new(USER),
                project_id: ProjectId::new(PROJECT),
            },
            // Pre-authenticated with a UUID-shaped token.
            token: Mutex::new(Some(Token::new("00000000000000000000000000000001"))),
            issued: AtomicU64::new(1),
        }
    }

    pub fn token_generation(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CredentialProvider for FakeSubject {
    fn credentials(&self) -> Credentials {
        self.credentials.clone()
    }

    fn current_token(&self) -> Option<Token> {
        self.token.lock().expect("token").clone()
    }

    fn clear_auth(&self) {
        *self.token.lock().expect("token") = None;
    }

    async fn set_auth(&self) -> IdentityResult<Token> {
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        let token = Token::new(format!("{n:032x}"));
        *self.token.lock().expect("token") = Some(token.clone());
        Ok(token)
    }
}
