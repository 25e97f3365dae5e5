use log::{debug, error};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::transport::{Transport, TransportSettings};
use crate::auth::Token;
use crate::error::{ExtractError, Result};

const LOGIN_PATH: &str = "/api/auth/client/login";
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Serialize)]
struct ClientCredentials<'a> {
    #[serde(rename = "clientID")]
    client_id: &'a str,
    #[serde(rename = "clientSecret")]
    client_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Typed access to the CI API on top of the resilient [`Transport`].
pub struct ApiClient {
    transport: Transport,
    base_url: String,
}

impl ApiClient {
    /// Creates a client for the API at `base_url` (e.g. `https://ci.example.com`).
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `base_url` is not an absolute http(s)
    /// URL or the HTTP client cannot be built.
    pub fn new(base_url: &str, settings: TransportSettings) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ExtractError::Config(format!("Invalid API base URL: {e}")))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ExtractError::Config(format!(
                "API base URL must use http or https, got {}",
                parsed.scheme()
            )));
        }

        let transport = Transport::new(settings)?;
        debug!(
            "API client for {base_url} (correlation id {})",
            transport.correlation_id()
        );

        Ok(Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Exchanges client credentials for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Auth`] when the API rejects the credentials or
    /// answers with something that is not a token. Network failures keep their
    /// transport error.
    pub async fn get_token(&self, client_id: &str, client_secret: &str) -> Result<Token> {
        let url = self.url(LOGIN_PATH);
        let body = serde_json::to_vec(&ClientCredentials {
            client_id,
            client_secret,
        })?;

        let response = self
            .transport
            .request(
                &url,
                |client| {
                    client
                        .post(&url)
                        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                        .body(body.clone())
                },
                &[],
            )
            .await
            .map_err(|e| match e {
                ExtractError::UnexpectedStatus { status, .. } => {
                    ExtractError::Auth(format!("{url} responded with status code {status}"))
                }
                other => other,
            })?;

        let parsed: TokenResponse = serde_json::from_slice(&response).map_err(|e| {
            error!(
                "Failed unmarshalling get token response: {e} (body: {})",
                String::from_utf8_lossy(&response)
            );
            ExtractError::Auth(format!("Malformed token response: {e}"))
        })?;

        if parsed.token.is_empty() {
            return Err(ExtractError::Auth("API returned an empty token".to_string()));
        }

        debug!("Obtained API token");
        Ok(Token::from(parsed.token))
    }

    /// GETs `path_and_query` below the base URL with the bearer token attached.
    pub(super) async fn get_bytes(&self, token: &Token, path_and_query: &str) -> Result<Vec<u8>> {
        let url = self.url(path_and_query);
        self.transport
            .request(&url, |client| authorized_get(client, &url, token), &[])
            .await
    }

    /// GETs and decodes a JSON document.
    pub(super) async fn get_json<T>(&self, token: &Token, path_and_query: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let body = self.get_bytes(token, path_and_query).await?;
        decode(&self.url(path_and_query), &body)
    }

    pub(super) fn transport(&self) -> &Transport {
        &self.transport
    }

    pub(super) fn url(&self, path_and_query: &str) -> String {
        format!("{}{path_and_query}", self.base_url)
    }
}

#[cfg(test)]
impl ApiClient {
    /// Client with short timeouts and near-zero backoff for mock servers.
    pub(crate) fn for_tests(base_url: &str) -> Self {
        Self::new(
            base_url,
            TransportSettings {
                max_attempts: 2,
                timeout: std::time::Duration::from_secs(2),
                backoff_base: std::time::Duration::from_millis(1),
            },
        )
        .unwrap()
    }
}

/// GET carrying the bearer token; `bearer_auth` marks the header sensitive.
pub(super) fn authorized_get(client: &Client, url: &str, token: &Token) -> RequestBuilder {
    client
        .get(url)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .bearer_auth(token.as_str())
}

fn decode<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        let body = String::from_utf8_lossy(body).into_owned();
        error!("Failed unmarshalling response from {url}: {e} (body: {body})");
        ExtractError::Decode {
            url: url.to_string(),
            message: e.to_string(),
            body,
        }
    })
}
