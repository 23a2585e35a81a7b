mod bearer_token;

pub use bearer_token::*;
use http::HeaderValue;

/// Provides the `Authorization` header for outgoing requests.
#[async_trait::async_trait]
pub trait Authorizer: Send + Sync {
    /// Returns the authorization header to use for requests.
    ///
    /// # Errors
    /// Fails if a token is not available, for example because fetching it failed.
    async fn authorization_header(&self) -> Result<HeaderValue, crate::error::Error>;
}

/// Helper function to ensure that a string is ASCII.
///
/// # Errors
/// Fails with `InvalidHeaderValue` if the string is not ASCII.
pub(crate) fn require_ascii(s: &str) -> Result<(), crate::error::Error> {
    if s.is_ascii() {
        Ok(())
    } else {
        Err(crate::error::Error::InvalidHeaderValue)
    }
}
