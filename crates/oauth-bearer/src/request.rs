//! Building and sending token requests.
use std::sync::Arc;

use http::{
    header::{ACCEPT, CONTENT_TYPE},
    Method, StatusCode,
};
use oauth2::{
    AuthorizationCode, ClientId, ClientSecret, RefreshToken, ResourceOwnerPassword,
    ResourceOwnerUsername,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::{form_urlencoded, Url};

use crate::error::{Error, Result};

const URL_FIELD: &str = "url";
const GRANT_TYPE_FIELD: &str = "grant_type";

/// Parameters of a token request: the token endpoint plus the form fields
/// sent to it.
///
/// Fields keep their insertion order. Adding the same name twice sends the
/// field twice, which is how array values are expressed.
#[derive(Clone, PartialEq, veil::Redact)]
pub struct CredentialSet {
    url: Url,
    #[redact]
    params: Vec<(String, String)>,
}

impl CredentialSet {
    /// Create a credential set for the given token endpoint and grant type.
    #[must_use]
    pub fn new(url: Url, grant_type: &str) -> Self {
        Self {
            url,
            params: vec![(GRANT_TYPE_FIELD.to_string(), grant_type.to_string())],
        }
    }

    /// Create a credential set from a flat list of fields.
    /// The `url` field names the token endpoint and is not sent in the body.
    ///
    /// # Errors
    /// - Fails if `url` or `grant_type` is missing.
    /// - Fails if `url` is not a valid URL.
    pub fn from_params<I, K, V>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut url = None;
        let mut rest = Vec::new();
        for (name, value) in params {
            let name = name.into();
            if name == URL_FIELD {
                url = Some(value.into());
            } else {
                rest.push((name, value.into()));
            }
        }

        let url = url.ok_or(Error::MissingCredentialField(URL_FIELD))?;
        if !rest.iter().any(|(name, _)| name == GRANT_TYPE_FIELD) {
            return Err(Error::MissingCredentialField(GRANT_TYPE_FIELD));
        }

        Ok(Self {
            url: Url::parse(&url)?,
            params: rest,
        })
    }

    /// Append a field to the request body.
    #[must_use]
    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    /// The token endpoint.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn grant_type(&self) -> Option<&str> {
        self.get(GRANT_TYPE_FIELD)
    }

    /// First value of the field `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize into a POST request against the token endpoint.
    #[must_use]
    pub fn to_request(&self) -> TokenRequest {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter().filter(|(name, _)| name != URL_FIELD))
            .finish();

        TokenRequest {
            url: self.url.clone(),
            method: Method::POST,
            body,
        }
    }
}

/// The OAuth2 grants with a fixed set of fields.
///
/// Each grant lowers into a [`CredentialSet`] with `grant_type`, `client_id` and
/// `client_secret` first, followed by the grant specific fields. Optional fields
/// that are `None` are left out of the body.
#[derive(Debug, Clone)]
pub enum Grant {
    AuthorizationCode {
        client_id: ClientId,
        client_secret: ClientSecret,
        redirect_uri: String,
        code: Option<AuthorizationCode>,
    },
    OwnerCredentials {
        client_id: ClientId,
        client_secret: ClientSecret,
        username: Option<ResourceOwnerUsername>,
        password: Option<ResourceOwnerPassword>,
    },
    ClientCredentials {
        client_id: ClientId,
        client_secret: ClientSecret,
    },
    RefreshToken {
        client_id: ClientId,
        client_secret: ClientSecret,
        refresh_token: Option<RefreshToken>,
    },
}

impl Grant {
    #[must_use]
    pub fn authorization_code(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self::AuthorizationCode {
            client_id: ClientId::new(client_id.to_string()),
            client_secret: ClientSecret::new(client_secret.to_string()),
            redirect_uri: redirect_uri.to_string(),
            code: None,
        }
    }

    #[must_use]
    pub fn owner_credentials(client_id: &str, client_secret: &str) -> Self {
        Self::OwnerCredentials {
            client_id: ClientId::new(client_id.to_string()),
            client_secret: ClientSecret::new(client_secret.to_string()),
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn client_credentials(client_id: &str, client_secret: &str) -> Self {
        Self::ClientCredentials {
            client_id: ClientId::new(client_id.to_string()),
            client_secret: ClientSecret::new(client_secret.to_string()),
        }
    }

    #[must_use]
    pub fn refresh_token(client_id: &str, client_secret: &str) -> Self {
        Self::RefreshToken {
            client_id: ClientId::new(client_id.to_string()),
            client_secret: ClientSecret::new(client_secret.to_string()),
            refresh_token: None,
        }
    }

    /// Value of the `grant_type` field.
    #[must_use]
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::OwnerCredentials { .. } => "password",
            Self::ClientCredentials { .. } => "client_credentials",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }

    /// Lower the grant into the generic credential form.
    #[must_use]
    pub fn into_credentials(self, url: Url) -> CredentialSet {
        let credentials = CredentialSet::new(url, self.grant_type());
        match self {
            Self::AuthorizationCode {
                client_id,
                client_secret,
                redirect_uri,
                code,
            } => {
                let credentials = with_client(credentials, &client_id, &client_secret)
                    .param("redirect_uri", &redirect_uri);
                with_optional(credentials, "code", code.as_ref().map(|c| c.secret()))
            }
            Self::OwnerCredentials {
                client_id,
                client_secret,
                username,
                password,
            } => {
                let credentials = with_client(credentials, &client_id, &client_secret);
                let credentials =
                    with_optional(credentials, "username", username.as_ref().map(|u| &**u));
                with_optional(credentials, "password", password.as_ref().map(|p| p.secret()))
            }
            Self::ClientCredentials {
                client_id,
                client_secret,
            } => with_client(credentials, &client_id, &client_secret),
            Self::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
            } => {
                let credentials = with_client(credentials, &client_id, &client_secret);
                with_optional(
                    credentials,
                    "refresh_token",
                    refresh_token.as_ref().map(|t| t.secret()),
                )
            }
        }
    }
}

fn with_client(
    credentials: CredentialSet,
    client_id: &ClientId,
    client_secret: &ClientSecret,
) -> CredentialSet {
    credentials
        .param("client_id", client_id)
        .param("client_secret", client_secret.secret())
}

fn with_optional(credentials: CredentialSet, name: &str, value: Option<&String>) -> CredentialSet {
    match value {
        Some(value) => credentials.param(name, value),
        None => credentials,
    }
}

/// A fully encoded token request.
#[derive(Clone, PartialEq, veil::Redact)]
pub struct TokenRequest {
    url: Url,
    method: Method,
    #[redact]
    body: String,
}

impl TokenRequest {
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Always `POST`.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The `application/x-www-form-urlencoded` body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Response of an [`HttpTransport`]. `data` is the decoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub data: Value,
}

/// The HTTP client used to send token requests.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request.
    ///
    /// # Errors
    /// Implementations fail on network errors and on non-success status codes.
    /// The latter should be reported as [`Error::TokenEndpointError`] so the
    /// body sent by the server is not lost.
    async fn execute(&self, request: TokenRequest) -> Result<TransportResponse>;
}

#[async_trait::async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn execute(&self, request: TokenRequest) -> Result<TransportResponse> {
        (**self).execute(request).await
    }
}

#[async_trait::async_trait]
impl HttpTransport for reqwest::Client {
    async fn execute(&self, request: TokenRequest) -> Result<TransportResponse> {
        let response = self
            .request(request.method, request.url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .body(request.body)
            .send()
            .await
            .map_err(Arc::new)?;

        let status = response.status();
        let text = response.text().await.map_err(Arc::new)?;
        // Non-JSON bodies are handed through as a plain string.
        let data = serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text));

        if !status.is_success() {
            return Err(Error::TokenEndpointError { status, data });
        }
        Ok(TransportResponse { status, data })
    }
}

/// Create a `reqwest::Client` suitable for token requests.
/// Redirects are disabled to prevent SSRF vulnerabilities.
///
/// # Errors
/// Fails if a TLS backend cannot be initialized.
pub fn token_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(Arc::new)
        .map_err(Into::into)
}

/// Sends a prepared token request through an [`HttpTransport`].
///
/// The body is encoded once on construction, every call to [`TokenFetcher::fetch`]
/// sends a new request. Nothing is cached.
#[derive(Debug, Clone)]
pub struct TokenFetcher<C> {
    client: C,
    request: TokenRequest,
}

impl<C: HttpTransport> TokenFetcher<C> {
    #[must_use]
    pub fn new(client: C, credentials: &CredentialSet) -> Self {
        Self {
            client,
            request: credentials.to_request(),
        }
    }

    /// Create a fetcher for one of the fixed-shape [`Grant`]s.
    #[must_use]
    pub fn from_grant(client: C, url: Url, grant: Grant) -> Self {
        Self::new(client, &grant.into_credentials(url))
    }

    #[must_use]
    pub fn request(&self) -> &TokenRequest {
        &self.request
    }

    /// Send the token request and decode the response data as `T`.
    /// Use `serde_json::Value` to receive the data unmodified.
    ///
    /// # Errors
    /// - Transport errors are returned unchanged.
    /// - Fails with [`Error::OAuth2ParseError`] if the data does not decode as `T`.
    pub async fn fetch<T: DeserializeOwned>(&self) -> Result<T> {
        let response = self.client.execute(self.request.clone()).await?;
        // The query may carry secrets, only host and path are logged.
        tracing::debug!(
            "Token endpoint `{}{}` answered with status {}",
            self.request.url.host_str().unwrap_or_default(),
            self.request.url.path(),
            response.status
        );
        Ok(serde_json::from_value(response.data)?)
    }
}
