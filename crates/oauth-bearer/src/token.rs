use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Response of a token endpoint.
///
/// `access_token` and `expires_in` are the only fields this crate interprets.
/// Everything else the server sends (`token_type`, `scope`, `refresh_token`, ...)
/// is kept verbatim in `extra` and serialized back unchanged.
#[derive(Clone, PartialEq, Default, Serialize, Deserialize, veil::Redact)]
pub struct TokenResponse {
    #[redact]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Lifetime of the token in seconds. Some servers send it as a string.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_expires_in"
    )]
    pub expires_in: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenResponse {
    /// Create a response carrying only an access token and its lifetime.
    #[must_use]
    pub fn new(access_token: &str, expires_in: u64) -> Self {
        Self {
            access_token: Some(access_token.to_string()),
            expires_in: Some(expires_in),
            extra: Map::new(),
        }
    }

    /// Look up a field the crate does not interpret.
    #[must_use]
    pub fn extra_field(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}

fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(seconds)) => Ok(Some(seconds)),
        Some(Seconds::Text(text)) => text.trim().parse().map(Some).map_err(|_e| {
            serde::de::Error::custom(format!("`expires_in` is not a number of seconds: {text}"))
        }),
    }
}
