use http::{header::AUTHORIZATION, HeaderValue};
use reqwest::IntoUrl;

use crate::{error::Result, Authorizer};

/// Wrapper around `reqwest::Client` that automatically adds the authorization header,
/// fetching and caching the token through an `Authorizer`.
///
/// Designed to be a mostly drop-in replacement for `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpClient<A: Authorizer> {
    authorizer: A,
    client: reqwest::Client,
}

impl<A: Authorizer> HttpClient<A> {
    /// Creates a new `HttpClient` with the given `Authorizer`.
    pub fn new(authorizer: A) -> Self {
        Self {
            authorizer,
            client: reqwest::Client::new(),
        }
    }

    /// Set a custom `reqwest::Client`.
    #[must_use]
    pub fn set_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn authorizer(&self) -> &A {
        &self.authorizer
    }

    /// Obtain the authorization header for the next request.
    ///
    /// # Errors
    /// Returns an error if the authorizer fails to provide a token, typically because
    /// fetching the token failed.
    pub async fn authorization_header(&self) -> Result<HeaderValue> {
        self.authorizer.authorization_header().await
    }

    /// Start building a `Request`, adding the authorization header.
    ///
    /// # Errors
    /// Returns an error if the authorizer fails to provide a token, typically because
    /// fetching the token failed.
    pub async fn request<U: IntoUrl>(
        &self,
        method: reqwest::Method,
        url: U,
    ) -> Result<reqwest::RequestBuilder> {
        let header = self.authorization_header().await?;
        let request = self.client.request(method, url).header(AUTHORIZATION, header);
        Ok(request)
    }

    /// Execute a `Request`, adding the authorization header if it is not already set.
    ///
    /// # Errors
    /// - Returns an error if the authorizer fails to provide a token, typically because fetching the token failed.
    /// - Returns an error if the request fails.
    pub async fn execute(&self, mut request: reqwest::Request) -> Result<reqwest::Response> {
        if !request.headers().contains_key(AUTHORIZATION) {
            let header = self.authorization_header().await?;
            request.headers_mut().insert(AUTHORIZATION, header);
        }
        self.client
            .execute(request)
            .await
            .map_err(std::sync::Arc::new)
            .map_err(Into::into)
    }

    /// Convenience method to make a `GET` request to a URL.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    pub async fn get<U: IntoUrl>(&self, url: U) -> Result<reqwest::RequestBuilder> {
        self.request(reqwest::Method::GET, url).await
    }

    /// Convenience method to make a `POST` request to a URL.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    pub async fn post<U: IntoUrl>(&self, url: U) -> Result<reqwest::RequestBuilder> {
        self.request(reqwest::Method::POST, url).await
    }

    /// Convenience method to make a `PUT` request to a URL.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    pub async fn put<U: IntoUrl>(&self, url: U) -> Result<reqwest::RequestBuilder> {
        self.request(reqwest::Method::PUT, url).await
    }

    /// Convenience method to make a `PATCH` request to a URL.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    pub async fn patch<U: IntoUrl>(&self, url: U) -> Result<reqwest::RequestBuilder> {
        self.request(reqwest::Method::PATCH, url).await
    }

    /// Convenience method to make a `DELETE` request to a URL.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    pub async fn delete<U: IntoUrl>(&self, url: U) -> Result<reqwest::RequestBuilder> {
        self.request(reqwest::Method::DELETE, url).await
    }

    /// Convenience method to make a `HEAD` request to a URL.
    ///
    /// # Errors
    /// See [`request`](Self::request).
    pub async fn head<U: IntoUrl>(&self, url: U) -> Result<reqwest::RequestBuilder> {
        self.request(reqwest::Method::HEAD, url).await
    }
}

#[cfg(feature = "memory-cache")]
pub use provider::ReqwestProvider;

#[cfg(feature = "memory-cache")]
mod provider {
    use std::sync::Arc;

    use super::HttpClient;
    use crate::{
        Authenticate, BearerInterceptor, CacheConfig, CacheOptions, InterceptorHooks,
        MemoryTokenCache, TokenCache, TokenCacheProvider,
    };

    /// [`TokenCacheProvider`] for `reqwest`.
    ///
    /// Tokens are cached in a [`MemoryTokenCache`]; the handle returned by
    /// [`interceptor`](crate::interceptor()) is an [`HttpClient`] that attaches
    /// them to every request.
    ///
    /// ```no_run
    /// # async fn run() -> oauth_bearer::Result<()> {
    /// use oauth_bearer::{interceptor, token_http_client, Grant, ReqwestProvider, TokenFetcher};
    ///
    /// let fetcher = TokenFetcher::from_grant(
    ///     token_http_client()?,
    ///     "https://identity.example.com/oauth2/token".parse()?,
    ///     Grant::client_credentials("my-client-id", "my-client-secret"),
    /// );
    /// let client = interceptor(&ReqwestProvider::new(), fetcher);
    /// let _response = client.get("https://api.example.com/data").await?.send().await;
    /// # Ok(())
    /// # }
    /// ```
    #[derive(Debug, Clone, Default)]
    pub struct ReqwestProvider {
        client: reqwest::Client,
        config: CacheConfig,
    }

    impl ReqwestProvider {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Set the `reqwest::Client` used by the returned [`HttpClient`].
        #[must_use]
        pub fn set_client(mut self, client: reqwest::Client) -> Self {
            self.client = client;
            self
        }

        /// Configure the token cache.
        #[must_use]
        pub fn set_cache_config(mut self, config: CacheConfig) -> Self {
            self.config = config;
            self
        }
    }

    impl TokenCacheProvider for ReqwestProvider {
        type Handle = HttpClient<BearerInterceptor>;

        fn token_cache(
            &self,
            authenticate: Arc<dyn Authenticate>,
            options: CacheOptions,
        ) -> Arc<dyn TokenCache> {
            Arc::new(MemoryTokenCache::new(authenticate, options).set_config(self.config.clone()))
        }

        fn interceptor(&self, hooks: InterceptorHooks) -> Self::Handle {
            HttpClient::new(BearerInterceptor::new(hooks)).set_client(self.client.clone())
        }
    }
}

#[cfg(all(test, feature = "memory-cache"))]
mod tests {
    use http::header::CONTENT_TYPE;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    use super::*;
    use crate::{interceptor, token_http_client, Error, Grant, ReqwestProvider, TokenFetcher};

    async fn token_server(expires_in: u64, hits: usize) -> (mockito::ServerGuard, mockito::Mock) {
        let mut oauth_server = mockito::Server::new_async().await;
        let mock = oauth_server
            .mock("POST", "/my-tenant/oauth2/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex("grant_type=client_credentials".to_string()),
                mockito::Matcher::Regex("client_id=my-client".to_string()),
            ]))
            .match_header("content-type", "application/x-www-form-urlencoded")
            .with_status(200)
            .with_header(CONTENT_TYPE.as_str(), "application/json")
            .with_body(
                serde_json::json!({
                    "access_token": "my-issued-token",
                    "token_type": "Bearer",
                    "expires_in": expires_in
                })
                .to_string(),
            )
            .expect(hits)
            .create_async()
            .await;
        (oauth_server, mock)
    }

    fn fetcher(server: &mockito::ServerGuard) -> TokenFetcher<reqwest::Client> {
        TokenFetcher::from_grant(
            token_http_client().unwrap(),
            format!("{}/my-tenant/oauth2/token", server.url())
                .parse()
                .unwrap(),
            Grant::client_credentials("my-client", "my-secret"),
        )
    }

    #[tokio::test]
    #[traced_test]
    async fn test_http_client_attaches_cached_token() {
        let (oauth_server, token_mock) = token_server(3600, 1).await;
        let mut api_server = mockito::Server::new_async().await;
        let api_mock = api_server
            .mock("GET", "/data")
            .match_header("authorization", "Bearer my-issued-token")
            .with_status(200)
            .expect(2)
            .create_async()
            .await;

        let client = interceptor(&ReqwestProvider::new(), fetcher(&oauth_server));

        for _ in 0..2 {
            let response = client
                .get(format!("{}/data", api_server.url()))
                .await
                .unwrap()
                .send()
                .await
                .unwrap();
            assert!(response.status().is_success());
        }

        token_mock.assert_async().await;
        api_mock.assert_async().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn test_execute_keeps_existing_authorization() {
        let (oauth_server, token_mock) = token_server(3600, 0).await;
        let mut api_server = mockito::Server::new_async().await;
        let api_mock = api_server
            .mock("GET", "/data")
            .match_header("authorization", "Bearer existing-token")
            .with_status(200)
            .create_async()
            .await;

        let client = interceptor(&ReqwestProvider::new(), fetcher(&oauth_server));
        let request = reqwest::Client::new()
            .get(format!("{}/data", api_server.url()))
            .header(AUTHORIZATION, "Bearer existing-token")
            .build()
            .unwrap();

        let response = client.execute(request).await.unwrap();
        assert!(response.status().is_success());

        token_mock.assert_async().await;
        api_mock.assert_async().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn test_token_endpoint_failure_fails_request() {
        let mut oauth_server = mockito::Server::new_async().await;
        let token_mock = oauth_server
            .mock("POST", "/my-tenant/oauth2/token")
            .with_status(500)
            .with_header(CONTENT_TYPE.as_str(), "application/json")
            .with_body(r#"{"error":"server_error"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = interceptor(&ReqwestProvider::new(), fetcher(&oauth_server));
        let result = client.get("https://api.example.com/data").await;

        assert!(matches!(
            result,
            Err(Error::TokenEndpointError { status, ref data })
                if status == reqwest::StatusCode::INTERNAL_SERVER_ERROR
                    && data["error"] == "server_error"
        ));
        token_mock.assert_async().await;
    }

    #[tokio::test]
    #[traced_test]
    async fn test_authorization_header_exposes_token() {
        let (oauth_server, _token_mock) = token_server(3600, 1).await;

        let client = interceptor(&ReqwestProvider::new(), fetcher(&oauth_server));
        let header = client.authorization_header().await.unwrap();
        assert_eq!(header.to_str().unwrap(), "Bearer my-issued-token");

        let token = client.authorizer().token().await.unwrap();
        assert_eq!(
            token.extra_field("token_type"),
            Some(&serde_json::Value::String("Bearer".to_string()))
        );
    }
}
