//! App-only authentication via the OAuth2 client-credentials grant.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use reqwest::Client;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::GraphConfig;
use crate::error::{DriveError, Result};
use crate::models::TokenResponse;

/// Refresh this long before the token actually expires.
const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Cached access token with expiration.
#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

/// Token provider for a single service principal.
#[derive(Clone)]
pub struct Authenticator {
    config: Arc<GraphConfig>,
    client: Client,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl Authenticator {
    /// Create a new authenticator. Fails if the identity fields are missing.
    pub fn new(config: GraphConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            config: Arc::new(config),
            client,
            cached_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Get a valid access token, requesting a new one if necessary.
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + EXPIRY_BUFFER {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let new_token = self.request_token().await?;

        {
            let mut cached = self.cached_token.write().await;
            *cached = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }

    async fn request_token(&self) -> Result<CachedToken> {
        let scope = self.config.scopes.join(" ");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let token_url = self.config.token_url();
        debug!(url = %token_url, "requesting app-only token");

        let response = self.client.post(&token_url).form(&params).send().await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(DriveError::Config(format!(
                "Failed to obtain access token (status {}): {}",
                status.as_u16(),
                body
            )));
        }

        let token_response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            DriveError::Config(format!("Failed to parse token response: {}", e))
        })?;

        if let Some(error) = token_response.error {
            let description = token_response.error_description.unwrap_or_default();
            return Err(DriveError::Config(format!(
                "Failed to obtain access token: {}: {}",
                error, description
            )));
        }

        let access_token = token_response.access_token.ok_or_else(|| {
            DriveError::Config("Failed to obtain access token: no access_token in response".to_string())
        })?;

        let expires_in = token_response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        Ok(CachedToken {
            access_token,
            expires_at: SystemTime::now() + Duration::from_secs(expires_in),
        })
    }
}
