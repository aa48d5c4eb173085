use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unknown policy rule \"{rule}\" for service {service}")]
    UnknownRule { service: String, rule: String },
    #[error("cyclic rule reference through \"{rule}\" for service {service}")]
    CyclicReference { service: String, rule: String },
    #[error("invalid policy expression {expression:?}: {reason}")]
    InvalidExpression { expression: String, reason: String },
    #[error("no policy sources for service {service}; attempted files: {attempted:?}")]
    EmptySources {
        service: String,
        attempted: Vec<PathBuf>,
    },
}

pub type PolicyResult<T> = Result<T, PolicyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_variants() {
        let errors = vec![
            PolicyError::UnknownRule {
                service: "compute".to_string(),
                rule: "boot".to_string(),
            },
            PolicyError::CyclicReference {
                service: "compute".to_string(),
                rule: "a".to_string(),
            },
            PolicyError::InvalidExpression {
                expression: "role:".to_string(),
                reason: "empty role name".to_string(),
            },
            PolicyError::EmptySources {
                service: "compute".to_string(),
                attempted: vec![PathBuf::from("/etc/compute/policy.json")],
            },
        ];

        for error in errors {
            let rendered = error.to_string();
            assert!(!rendered.is_empty());
        }
    }
}
