#[cfg(not(feature = "runtime-tokio"))]
compile_error!("If `memory-cache` feature is enabled, an async runtime, such as `runtime-tokio`, must be enabled too.");

use std::{fmt, sync::Arc, time::Duration};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
// tokio's clock can be paused in tests.
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use crate::{
    error::Result,
    interceptor::{Authenticate, CacheOptions, TokenCache},
    TokenResponse,
};

/// Configuration of a [`MemoryTokenCache`].
///
/// * `refresh_tolerance`: Tokens are considered expired this long before their actual expiry. Default is 0.
/// * `max_retries`: Number of consecutive retries when fetching a token fails. Default is 0.
/// * `retry_interval`: Interval between consecutive retries. Default is 10ms.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CacheConfig {
    #[builder(default = Duration::ZERO)]
    pub refresh_tolerance: Duration,
    #[builder(default = 0)]
    pub max_retries: u32,
    #[builder(default = Duration::from_millis(10))]
    pub retry_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    response: TokenResponse,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory [`TokenCache`].
///
/// The token is fetched on first use and kept until `get_max_age` of the
/// response has elapsed. A refresh runs as one shared future: callers arriving
/// while it is in flight await the same result, success or failure, instead of
/// starting their own. The refresh keeps running as long as one caller awaits
/// it, and a caller cancelled mid-refresh leaves it to be resumed by the next
/// one. Failures are not cached.
///
/// Uses `Arc` internally for cheap cloning.
#[derive(Debug, Clone)]
pub struct MemoryTokenCache {
    authenticate: Arc<dyn Authenticate>,
    options: CacheOptions,
    config: CacheConfig,
    state: Arc<Mutex<CacheState>>,
}

type SharedRefresh = Shared<BoxFuture<'static, Result<CachedToken>>>;

#[derive(Default)]
struct CacheState {
    token: Option<CachedToken>,
    /// In-flight refresh, tagged with the generation that started it.
    refresh: Option<(u64, SharedRefresh)>,
    generation: u64,
}

impl fmt::Debug for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheState")
            .field("token", &self.token)
            .field("refreshing", &self.refresh.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

impl MemoryTokenCache {
    #[must_use]
    pub fn new(authenticate: Arc<dyn Authenticate>, options: CacheOptions) -> Self {
        Self {
            authenticate,
            options,
            config: CacheConfig::default(),
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Set a custom [`CacheConfig`].
    #[must_use]
    pub fn set_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    async fn lookup(&self) -> Lookup {
        let mut state = self.state.lock().await;

        if let Some(cached) = state.token.as_ref().filter(|t| t.is_valid(Instant::now())) {
            tracing::trace!("Using cached token");
            return Lookup::Cached(cached.response.clone());
        }

        if let Some((generation, refresh)) = &state.refresh {
            tracing::trace!("Joining in-flight token refresh");
            return Lookup::Refresh(*generation, refresh.clone());
        }

        state.generation += 1;
        let refresh = fetch_cached_token(
            self.authenticate.clone(),
            self.options,
            self.config.clone(),
        )
        .boxed()
        .shared();
        state.refresh = Some((state.generation, refresh.clone()));
        Lookup::Refresh(state.generation, refresh)
    }
}

enum Lookup {
    Cached(TokenResponse),
    /// Refresh to await, with the generation that started it.
    Refresh(u64, SharedRefresh),
}

async fn fetch_cached_token(
    authenticate: Arc<dyn Authenticate>,
    options: CacheOptions,
    config: CacheConfig,
) -> Result<CachedToken> {
    let response = request_new_token(authenticate.as_ref(), &config).await?;
    let max_age = (options.get_max_age)(&response)?;
    let lifetime = max_age.saturating_sub(config.refresh_tolerance);
    tracing::debug!("Caching token for {}ms", lifetime.as_millis());

    Ok(CachedToken {
        response,
        expires_at: Instant::now() + lifetime,
    })
}

async fn request_new_token(
    authenticate: &dyn Authenticate,
    config: &CacheConfig,
) -> Result<TokenResponse> {
    let mut counter = 0;

    loop {
        counter += 1;

        match authenticate.authenticate().await {
            Ok(response) => {
                tracing::debug!("Successfully fetched token");
                return Ok(response);
            }
            Err(e) => {
                if counter > config.max_retries {
                    tracing::error!("Failed to fetch token after {} attempts: {e}", counter);
                    return Err(e);
                }
                tracing::debug!(
                    "Failed to fetch token: {e}. Retrying in {}ms",
                    config.retry_interval.as_millis()
                );
                tokio::time::sleep(config.retry_interval).await;
            }
        }
    }
}

#[async_trait::async_trait]
impl TokenCache for MemoryTokenCache {
    async fn get_token(&self) -> Result<TokenResponse> {
        let (generation, refresh) = match self.lookup().await {
            Lookup::Cached(response) => return Ok(response),
            Lookup::Refresh(generation, refresh) => (generation, refresh),
        };

        let result = refresh.await;

        // The first caller to finish settles the refresh. A newer generation
        // has already replaced it and is left alone.
        let mut state = self.state.lock().await;
        if state.refresh.as_ref().is_some_and(|(g, _)| *g == generation) {
            state.refresh = None;
            if let Ok(cached) = &result {
                state.token = Some(cached.clone());
            }
        }
        drop(state);

        result.map(|cached| cached.response)
    }
}
