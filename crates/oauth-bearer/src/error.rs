use std::sync::Arc;

use http::StatusCode;
use serde_json::Value;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, Clone)]
pub enum Error {
    #[error("Token cannot be used as a header value. Must be ASCII.")]
    InvalidHeaderValue,
    #[error("Credential set is missing the required `{0}` field.")]
    MissingCredentialField(&'static str),
    #[error("Invalid token endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Request to fetch token failed: {0}")]
    OAuth2RequestFailed(String),
    #[error("Failed to parse token response: {0}")]
    OAuth2ParseError(String),
    #[error("Token response is missing the `{0}` field.")]
    MalformedTokenResponse(&'static str),
    /// Non-success answer of the token endpoint. `data` is the decoded body,
    /// for OAuth2 servers typically `{"error": ..., "error_description": ...}`.
    #[error("Token endpoint responded with {status}: {data}")]
    TokenEndpointError { status: StatusCode, data: Value },
    #[error("Request failed: {0}")]
    ReqwestFailed(#[from] Arc<reqwest::Error>),
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::OAuth2ParseError(value.to_string())
    }
}
