//! Ephemeral credential client
//!
//! The backend mints short-lived realtime credentials at `GET /token`;
//! a missing or empty `client_secret.value` is fatal to session start.

use super::TokenProvider;
use crate::error::{Result, SottoError};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    client_secret: Option<ClientSecret>,
}

#[derive(Debug, Default, Deserialize)]
struct ClientSecret {
    #[serde(default)]
    value: Option<String>,
}

fn extract_credential(response: TokenResponse) -> Result<String> {
    response
        .client_secret
        .and_then(|secret| secret.value)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SottoError::TokenError("token response missing client_secret".into()))
}

/// HTTP client for the backend token endpoint
pub struct TokenClient {
    http: reqwest::Client,
    base_url: String,
}

impl TokenClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/token", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TokenProvider for TokenClient {
    async fn fetch(&self) -> Result<String> {
        let response = self
            .http
            .get(self.endpoint())
            .send()
            .await
            .map_err(|e| SottoError::TokenError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SottoError::TokenError(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SottoError::TokenError(format!("malformed token response: {}", e)))?;
        extract_credential(body)
    }
}
