//! Identity service client: the narrow REST surface the framework consumes.
//!
//! # Purpose
//! Lists roles and services, reads and mutates a user's role assignments on
//! a project, and issues tokens. The core never depends on a concrete
//! implementation; tests substitute an in-memory fake.
use crate::errors::{IdentityError, IdentityResult};
use crate::token::Token;
use crate::types::{ProjectId, Role, RoleId, ServiceRecord, UserId};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

pub const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

#[async_trait]
pub trait IdentityClient: Send + Sync {
    async fn list_roles(&self) -> IdentityResult<Vec<Role>>;
    async fn list_services(&self) -> IdentityResult<Vec<ServiceRecord>>;
    async fn roles_on_project(
        &self,
        project: &ProjectId,
        user: &UserId,
    ) -> IdentityResult<Vec<Role>>;
    async fn grant_role(
        &self,
        project: &ProjectId,
        user: &UserId,
        role: &RoleId,
    ) -> IdentityResult<()>;
    async fn revoke_role(
        &self,
        project: &ProjectId,
        user: &UserId,
        role: &RoleId,
    ) -> IdentityResult<()>;
    async fn issue_token(&self, user: &UserId, project: &ProjectId) -> IdentityResult<Token>;
}

#[derive(Debug, Deserialize)]
struct RolesResponse {
    roles: Vec<Role>,
}

#[derive(Debug, Deserialize)]
struct ServicesResponse {
    services: Vec<ServiceRecord>,
}

/// Reqwest-backed client for a v3-style identity REST API.
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpIdentityClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn assignment_url(&self, project: &ProjectId, user: &UserId, role: &RoleId) -> String {
        self.url(&format!(
            "/v3/projects/{}/users/{}/roles/{}",
            project.as_str(),
            user.as_str(),
            role.as_str()
        ))
    }

    async fn expect_success(
        response: reqwest::Response,
        context: &str,
    ) -> IdentityResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(IdentityError::UnexpectedStatus {
                status: status.as_u16(),
                context: context.to_string(),
            })
        }
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    async fn list_roles(&self) -> IdentityResult<Vec<Role>> {
        let response = self.client.get(self.url("/v3/roles")).send().await?;
        let response = Self::expect_success(response, "listing roles").await?;
        let body: RolesResponse = response.json().await?;
        Ok(body.roles)
    }

    async fn list_services(&self) -> IdentityResult<Vec<ServiceRecord>> {
        let response = self.client.get(self.url("/v3/services")).send().await?;
        let response = Self::expect_success(response, "listing services").await?;
        let body: ServicesResponse = response.json().await?;
        Ok(body.services)
    }

    async fn roles_on_project(
        &self,
        project: &ProjectId,
        user: &UserId,
    ) -> IdentityResult<Vec<Role>> {
        let url = self.url(&format!(
            "/v3/projects/{}/users/{}/roles",
            project.as_str(),
            user.as_str()
        ));
        let response = self.client.get(url).send().await?;
        let response = Self::expect_success(response, "listing project role assignments").await?;
        let body: RolesResponse = response.json().await?;
        Ok(body.roles)
    }

    async fn grant_role(
        &self,
        project: &ProjectId,
        user: &UserId,
        role: &RoleId,
    ) -> IdentityResult<()> {
        let response = self
            .client
            .put(self.assignment_url(project, user, role))
            .send()
            .await?;
        Self::expect_success(response, "granting role").await?;
        Ok(())
    }

    async fn revoke_role(
        &self,
        project: &ProjectId,
        user: &UserId,
        role: &RoleId,
    ) -> IdentityResult<()> {
        let response = self
            .client
            .delete(self.assignment_url(project, user, role))
            .send()
            .await?;
        Self::expect_success(response, "revoking role").await?;
        Ok(())
    }

    async fn issue_token(&self, user: &UserId, project: &ProjectId) -> IdentityResult<Token> {
        let body = json!({
            "auth": {
                "user_id": user.as_str(),
                "project_id": project.as_str(),
            }
        });
        let response = self
            .client
            .post(self.url("/v3/auth/tokens"))
            .json(&body)
            .send()
            .await?;
        let response = Self::expect_success(response, "issuing token").await?;
        let token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(Token::new)
            .ok_or(IdentityError::MissingToken)?;
        Ok(token)
    }
}
