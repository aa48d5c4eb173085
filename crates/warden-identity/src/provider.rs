use crate::errors::IdentityResult;
use crate::token::Token;
use crate::types::Credentials;
use async_trait::async_trait;

/// Credential state of the test subject.
///
/// The role-switch coordinator flushes and re-establishes authentication
/// through this interface after every role change; implementations own the
/// cached token and the identity endpoint used to refresh it.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The user and project the subject acts under.
    fn credentials(&self) -> Credentials;

    /// The currently cached token, if authenticated.
    fn current_token(&self) -> Option<Token>;

    /// Drop any cached authentication state.
    fn clear_auth(&self);

    /// Re-authenticate and cache a fresh token.
    async fn set_auth(&self) -> IdentityResult<Token>;
}
