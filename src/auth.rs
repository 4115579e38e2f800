//! Bearer credentials for action execution.
//!
//! Process-wide mutable state under a single-writer discipline: readers
//! take the current snapshot; refresh is serialized through one mutex
//! with a double-check, so concurrent dispatches never race on refresh
//! and briefly block instead of using an expired token.

use crate::error::{Result, StockhandError};
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// Margin subtracted from a token's lifetime so a token is refreshed
/// shortly before the provider would reject it.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// One bearer credential snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub access_token: String,
    pub expires_at: Instant,
}

impl Credentials {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// External provider of fresh credentials (the OAuth refresh flow).
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self) -> Result<Credentials>;
}

/// Cached credential with serialized refresh.
pub struct CredentialStore {
    source: Arc<dyn TokenSource>,
    current: RwLock<Option<Credentials>>,
    refresh: Mutex<()>,
}

impl CredentialStore {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    /// Current access token, refreshing first if the snapshot is missing
    /// or expired.
    pub async fn token(&self) -> Result<String> {
        if let Some(credentials) = self.current.read().await.as_ref()
            && !credentials.is_expired()
        {
            return Ok(credentials.access_token.clone());
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited on the lock.
        if let Some(credentials) = self.current.read().await.as_ref()
            && !credentials.is_expired()
        {
            return Ok(credentials.access_token.clone());
        }

        debug!("refreshing action credentials");
        let fresh = self.source.fetch().await?;
        let token = fresh.access_token.clone();
        *self.current.write().await = Some(fresh);
        info!("action credentials refreshed");
        Ok(token)
    }

    /// Drop the cached snapshot, e.g. after the provider rejected it.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }
}

/// Token source backed by an OAuth token endpoint.
pub struct HttpTokenSource {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

impl HttpTokenSource {
    pub fn new(token_url: &str, client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
        }
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch(&self) -> Result<Credentials> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StockhandError::ExternalServiceError {
                message: format!("token endpoint unreachable: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(StockhandError::AuthExpired);
        }

        let body: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| StockhandError::ExternalServiceError {
                    message: format!("invalid token response: {}", e),
                })?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(EXPIRY_MARGIN);
        Ok(Credentials {
            access_token: body.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Token source handing out numbered tokens, for tests.
#[derive(Default)]
pub struct MockTokenSource {
    fetches: std::sync::atomic::AtomicUsize,
    lifetime: Option<Duration>,
    fail: bool,
}

impl MockTokenSource {
    pub fn new() -> Self {
        Self {
            lifetime: Some(Duration::from_secs(3600)),
            ..Self::default()
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for MockTokenSource {
    async fn fetch(&self) -> Result<Credentials> {
        let n = self
            .fetches
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail {
            return Err(StockhandError::AuthExpired);
        }
        Ok(Credentials {
            access_token: format!("token-{}", n),
            expires_at: Instant::now() + self.lifetime.unwrap_or(Duration::from_secs(3600)),
        })
    }
}
