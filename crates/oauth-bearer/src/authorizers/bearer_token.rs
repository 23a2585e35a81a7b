//! Authorizer attaching a cached bearer token to requests.
use http::HeaderValue;

use super::Authorizer;
use crate::{
    error::Result,
    interceptor::{InterceptorHooks, TokenCache},
    TokenResponse,
};

/// Handle produced by [`interceptor`](crate::interceptor()) for HTTP clients.
///
/// Every call to [`Authorizer::authorization_header`] asks the token cache for
/// a token and formats it. The token is only fetched from the token endpoint
/// when the cache holds no valid token.
///
/// Uses `Arc` internally for cheap cloning.
#[derive(Debug, Clone)]
pub struct BearerInterceptor {
    hooks: InterceptorHooks,
}

impl BearerInterceptor {
    #[must_use]
    pub fn new(hooks: InterceptorHooks) -> Self {
        Self { hooks }
    }

    /// The cached token response, including fields not used for the header.
    ///
    /// # Errors
    /// Fails if no valid token is cached and fetching a new one failed.
    pub async fn token(&self) -> Result<TokenResponse> {
        self.hooks.get_token.get_token().await
    }
}

#[async_trait::async_trait]
impl Authorizer for BearerInterceptor {
    async fn authorization_header(&self) -> Result<HeaderValue> {
        let token = self.token().await?;
        (self.hooks.header_formatter)(&token)
    }
}
