//! Failure taxonomy for RBAC conformance runs.
//!
//! # Purpose
//! Distinguishes the outcomes a conformance run can produce: policy-mismatch
//! failures (over/under-permission), infrastructure failures (setup, identity,
//! parsing), and harness signals (skip, not-found). Every failure message
//! carries the role, rule, and service involved.
use thiserror::Error;
use warden_identity::IdentityError;
use warden_policy::PolicyError;

/// What a test body observes from the service under test.
///
/// Bodies return `Ok(())` when the API call succeeded and one of these when
/// it did not; the truth table in the action runner maps the pair
/// (prediction, fault) to a pass or a typed failure.
#[derive(Debug, Error)]
pub enum ApiFault {
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("action failed: {0}")]
    ActionFailed(String),
    #[error("conflicting policies: {0}")]
    ConflictingPolicies(String),
    #[error("invalid service: {0}")]
    InvalidService(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum RbacError {
    /// The role performed an action policy predicted would be denied.
    #[error("Role {role} was allowed to perform {rule} on {service}")]
    OverPermission {
        role: String,
        rule: String,
        service: String,
    },
    /// The role was denied an action policy predicted would be allowed.
    /// Surfaces as the harness's forbidden failure with an augmented message.
    #[error("Role {role} was not allowed to perform {rule} on {service}: {fault}")]
    UnderPermission {
        role: String,
        rule: String,
        service: String,
        #[source]
        fault: ApiFault,
    },
    /// Policy rule missing, cyclic, or syntactically unrecoverable.
    #[error(transparent)]
    Parsing(#[from] PolicyError),
    #[error("service {0} is not in the identity catalog")]
    InvalidService(String),
    #[error("unsupported expected error code {0}; only 403 and 404 are supported")]
    InvalidErrorCode(u16),
    #[error("fixture setup failed: {0}")]
    SetupFailed(String),
    /// The harness's skip signal.
    #[error("skipped: {0}")]
    Skipped(String),
    /// The harness's not-found failure; used to re-wrap invalid services.
    #[error("not found: {0}")]
    NotFound(String),
    /// The body raised something other than the mapped expected fault.
    #[error("expected {expected} was not raised for {rule} on {service}: {source}")]
    Unexpected {
        expected: &'static str,
        rule: String,
        service: String,
        #[source]
        source: ApiFault,
    },
    #[error("requirements file has no section for service {0}")]
    Misconfigured(String),
    #[error("requirement rule {rule} absent for service {service}")]
    UnknownRequirement { service: String, rule: String },
    #[error("identity service: {0}")]
    Identity(#[from] IdentityError),
    #[error("report stream: {0}")]
    Io(#[from] std::io::Error),
}

pub type RbacResult<T> = Result<T, RbacError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_permission_message_names_role_and_rule() {
        let err = RbacError::OverPermission {
            role: "member".to_string(),
            rule: "create_server".to_string(),
            service: "compute".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Role member was allowed to perform create_server on compute"
        );
    }

    #[test]
    fn under_permission_carries_fault() {
        let err = RbacError::UnderPermission {
            role: "member".to_string(),
            rule: "list_servers".to_string(),
            service: "compute".to_string(),
            fault: ApiFault::Forbidden,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("was not allowed"));
        assert!(rendered.contains("forbidden"));
    }

    #[test]
    fn unexpected_names_the_missing_fault() {
        let err = RbacError::Unexpected {
            expected: "Forbidden",
            rule: "list_servers".to_string(),
            service: "compute".to_string(),
            source: ApiFault::ActionFailed("409".to_string()),
        };
        assert!(err.to_string().contains("expected Forbidden"));
    }
}
