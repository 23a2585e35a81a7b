//! Composition of a token cache with an authenticate function.
//!
//! [`interceptor`] asks a [`TokenCacheProvider`] for a cache around the
//! authenticate function and hands the resulting [`InterceptorHooks`] back to
//! the provider, which turns them into a client specific handle.
use std::{fmt, future::Future, sync::Arc, time::Duration};

use http::HeaderValue;

use crate::{
    authorizers::require_ascii,
    error::{Error, Result},
    request::{HttpTransport, TokenFetcher},
    TokenResponse,
};

/// Fetches a new token. Called by a [`TokenCache`] whenever it holds no valid token.
#[async_trait::async_trait]
pub trait Authenticate: Send + Sync {
    /// # Errors
    /// Fails if the token could not be obtained.
    async fn authenticate(&self) -> Result<TokenResponse>;
}

impl fmt::Debug for dyn Authenticate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Authenticate")
    }
}

#[async_trait::async_trait]
impl<C: HttpTransport> Authenticate for TokenFetcher<C> {
    async fn authenticate(&self) -> Result<TokenResponse> {
        self.fetch().await
    }
}

#[async_trait::async_trait]
impl<A: Authenticate + ?Sized> Authenticate for Arc<A> {
    async fn authenticate(&self) -> Result<TokenResponse> {
        (**self).authenticate().await
    }
}

/// [`Authenticate`] implementation backed by an async closure.
pub struct AuthenticateFn<F>(F);

/// Use an async closure as [`Authenticate`].
pub fn authenticate_fn<F, Fut>(f: F) -> AuthenticateFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<TokenResponse>> + Send + 'static,
{
    AuthenticateFn(f)
}

impl<F> fmt::Debug for AuthenticateFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticateFn").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<F, Fut> Authenticate for AuthenticateFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<TokenResponse>> + Send + 'static,
{
    async fn authenticate(&self) -> Result<TokenResponse> {
        (self.0)().await
    }
}

/// Memoizing access to a token.
///
/// Implementations return the cached response while it is valid and call their
/// [`Authenticate`] otherwise. Concurrent calls during a refresh must not
/// trigger more than one call to [`Authenticate::authenticate`].
#[async_trait::async_trait]
pub trait TokenCache: fmt::Debug + Send + Sync {
    /// # Errors
    /// Fails if no valid token is cached and fetching a new one failed.
    async fn get_token(&self) -> Result<TokenResponse>;
}

/// Computes how long a token stays valid.
pub type MaxAge = fn(&TokenResponse) -> Result<Duration>;

/// Turns a token into the value of the `Authorization` header.
pub type HeaderFormatter = fn(&TokenResponse) -> Result<HeaderValue>;

/// Options passed to [`TokenCacheProvider::token_cache`].
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    pub get_max_age: MaxAge,
}

/// Callbacks passed to [`TokenCacheProvider::interceptor`].
#[derive(Debug, Clone)]
pub struct InterceptorHooks {
    pub get_token: Arc<dyn TokenCache>,
    pub header_formatter: HeaderFormatter,
}

/// Integration point of an HTTP client.
///
/// A provider knows how to cache tokens and how to attach a header to the
/// requests of its client.
pub trait TokenCacheProvider {
    type Handle;

    /// Wrap `authenticate` in a cache that expires entries after `options.get_max_age`.
    fn token_cache(
        &self,
        authenticate: Arc<dyn Authenticate>,
        options: CacheOptions,
    ) -> Arc<dyn TokenCache>;

    /// Build the client specific handle that attaches tokens to requests.
    fn interceptor(&self, hooks: InterceptorHooks) -> Self::Handle;
}

/// Lifetime of `response`: `expires_in` seconds.
///
/// # Errors
/// Fails with [`Error::MalformedTokenResponse`] if `expires_in` is missing.
pub fn max_age(response: &TokenResponse) -> Result<Duration> {
    response
        .expires_in
        .map(|seconds| Duration::from_millis(seconds.saturating_mul(1000)))
        .ok_or(Error::MalformedTokenResponse("expires_in"))
}

/// `Bearer <access_token>`, marked as sensitive.
///
/// # Errors
/// - Fails with [`Error::MalformedTokenResponse`] if `access_token` is missing.
/// - Fails with [`Error::InvalidHeaderValue`] if the token is not a valid header value.
pub fn header_formatter(response: &TokenResponse) -> Result<HeaderValue> {
    let token = response
        .access_token
        .as_deref()
        .ok_or(Error::MalformedTokenResponse("access_token"))?;
    require_ascii(token)?;

    let mut header =
        HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_e| Error::InvalidHeaderValue)?;
    header.set_sensitive(true);
    Ok(header)
}

/// Compose `authenticate` with the cache of `provider` and return the provider's handle.
pub fn interceptor<P, A>(provider: &P, authenticate: A) -> P::Handle
where
    P: TokenCacheProvider + ?Sized,
    A: Authenticate + 'static,
{
    let get_token = provider.token_cache(
        Arc::new(authenticate),
        CacheOptions {
            get_max_age: max_age,
        },
    );
    provider.interceptor(InterceptorHooks {
        get_token,
        header_formatter,
    })
}
