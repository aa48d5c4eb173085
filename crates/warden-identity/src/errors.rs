use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("identity service returned {status} while {context}")]
    UnexpectedStatus { status: u16, context: String },
    #[error("identity service response missing token header")]
    MissingToken,
}

pub type IdentityResult<T> = Result<T, IdentityError>;
