//! Access-token management for the mailbox provider
//!
//! Holds a refresh token obtained out of band and exchanges it for short
//! lived access tokens, caching them until shortly before expiry.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Mutex;

/// OAuth credentials for a connected mailbox
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// Token response from the provider
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Cached access token with its expiry instant (unix seconds)
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<i64>,
}

impl CachedToken {
    /// Valid means at least the skew window remains before expiry
    fn is_fresh(&self, now: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at > now + TokenProvider::EXPIRY_SKEW_SECS,
            None => false,
        }
    }
}

/// Caching token source backed by the refresh-token grant
pub struct TokenProvider {
    credentials: ProviderCredentials,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Refresh this many seconds before the provider-reported expiry
    const EXPIRY_SKEW_SECS: i64 = 300;

    pub fn new(credentials: ProviderCredentials) -> Self {
        Self {
            credentials,
            token_url: Self::TOKEN_URL.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Override the token endpoint (for tests)
    pub fn with_token_url(credentials: ProviderCredentials, token_url: impl Into<String>) -> Self {
        Self {
            credentials,
            token_url: token_url.into(),
            cached: Mutex::new(None),
        }
    }

    /// Get a valid access token, refreshing if the cached one is near expiry
    pub fn get_access_token(&self) -> Result<String> {
        let now = chrono::Utc::now().timestamp();

        {
            let cached = self.cached.lock().unwrap();
            if let Some(token) = cached.as_ref()
                && token.is_fresh(now)
            {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.refresh_access_token()?;
        let access_token = token.access_token.clone();

        let mut cached = self.cached.lock().unwrap();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: token.expires_in.map(|d| now + d as i64),
        });

        Ok(access_token)
    }

    /// Exchange the refresh token for a new access token
    fn refresh_access_token(&self) -> Result<TokenResponse> {
        let response = ureq::post(&self.token_url)
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        let token: TokenResponse = response
            .into_body()
            .read_json()
            .context("Failed to parse refresh token response")?;

        Ok(token)
    }
}
