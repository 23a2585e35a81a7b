use std::{str::FromStr, time::Duration};

use oauth_bearer::{
    interceptor, token_http_client, CacheConfig, Grant, ReqwestProvider, TokenFetcher,
};
use reqwest::Client;
use url::Url;

#[tokio::main]
async fn main() {
    let client_id = "my-client-id";
    let client_secret = "my-client-secret";
    let token_endpoint = Url::from_str("https://identity.example.com/oauth2/token").unwrap();

    // Prepare the token request. Nothing is sent yet.
    let fetcher = TokenFetcher::from_grant(
        token_http_client().unwrap(),
        token_endpoint,
        Grant::client_credentials(client_id, client_secret),
    );

    // Tokens are fetched on first use and cached until 30 seconds before they expire.
    let provider = ReqwestProvider::new()
        .set_client(Client::new())
        .set_cache_config(
            CacheConfig::builder()
                .refresh_tolerance(Duration::from_secs(30))
                .max_retries(3)
                .build(),
        );
    let client = interceptor(&provider, fetcher);

    // Start using the client - the authorization header is automatically added.
    // Fails if the token could not be fetched.
    let request = client.get("https://api.example.com/data").await.unwrap();
    let _response = request.send().await.unwrap();
}
