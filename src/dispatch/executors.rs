//! Action executor seams and their HTTP implementations.
//!
//! The real email and spreadsheet systems sit behind small JSON APIs;
//! these clients attach the current bearer credential and translate HTTP
//! failures into the dispatch error taxonomy.

use crate::auth::CredentialStore;
use crate::error::{Result, StockhandError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::sync::Mutex;

/// Sends notification email on the user's behalf.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<Value>;
}

/// Reads and mutates the inventory spreadsheet.
#[async_trait]
pub trait SheetClient: Send + Sync {
    /// Append rows to a range.
    async fn update(&self, range: &str, values: &[Vec<String>]) -> Result<Value>;
    /// Read-only stock lookup.
    async fn query(&self, item: &str) -> Result<Value>;
}

/// Translate an executor HTTP response into the dispatch taxonomy.
async fn check_response(
    response: reqwest::Response,
    credentials: &CredentialStore,
) -> Result<Value> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        // The provider rejected our snapshot; make the next dispatch refresh.
        credentials.invalidate().await;
        return Err(StockhandError::AuthExpired);
    }
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(StockhandError::ExternalServiceError {
            message: format!("{}: {}", status, body),
        });
    }
    response
        .json()
        .await
        .or_else(|_| Ok(json!({ "status": "ok" })))
}

fn transport_error(e: reqwest::Error) -> StockhandError {
    StockhandError::ExternalServiceError {
        message: e.to_string(),
    }
}

/// Email executor posting to a JSON send endpoint.
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    credentials: Arc<CredentialStore>,
}

impl HttpEmailSender {
    pub fn new(endpoint: &str, credentials: Arc<CredentialStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            credentials,
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<Value> {
        let token = self.credentials.token().await?;
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&json!({ "to": to, "subject": subject, "body": body }))
            .send()
            .await
            .map_err(transport_error)?;
        check_response(response, &self.credentials).await
    }
}

/// Spreadsheet executor posting to a JSON values API.
pub struct HttpSheetClient {
    client: reqwest::Client,
    endpoint: String,
    credentials: Arc<CredentialStore>,
}

impl HttpSheetClient {
    pub fn new(endpoint: &str, credentials: Arc<CredentialStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credentials,
        }
    }
}

#[async_trait]
impl SheetClient for HttpSheetClient {
    async fn update(&self, range: &str, values: &[Vec<String>]) -> Result<Value> {
        let token = self.credentials.token().await?;
        let response = self
            .client
            .post(format!("{}/update", self.endpoint))
            .bearer_auth(token)
            .json(&json!({ "range": range, "values": values }))
            .send()
            .await
            .map_err(transport_error)?;
        check_response(response, &self.credentials).await
    }

    async fn query(&self, item: &str) -> Result<Value> {
        let token = self.credentials.token().await?;
        let response = self
            .client
            .post(format!("{}/query", self.endpoint))
            .bearer_auth(token)
            .json(&json!({ "item": item }))
            .send()
            .await
            .map_err(transport_error)?;
        check_response(response, &self.credentials).await
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Recording email sender for tests.
#[derive(Default)]
pub struct MockEmailSender {
    sent: Mutex<Vec<(String, String, String)>>,
    fail: Mutex<Option<String>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(self, error: StockhandError) -> Self {
        *self.fail.lock().expect("mock lock poisoned") = Some(error.to_string());
        self
    }

    /// `(to, subject, body)` triples in send order.
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<Value> {
        if let Some(message) = self.fail.lock().expect("mock lock poisoned").clone() {
            return Err(StockhandError::ExternalServiceError { message });
        }
        self.sent.lock().expect("mock lock poisoned").push((
            to.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
        Ok(json!({ "status": "sent" }))
    }
}

enum MockFailure {
    None,
    Auth,
    External(String),
}

/// Recording spreadsheet client for tests.
pub struct MockSheetClient {
    updates: Mutex<Vec<(String, Vec<Vec<String>>)>>,
    queries: Mutex<Vec<String>>,
    update_attempts: std::sync::atomic::AtomicUsize,
    fail: MockFailure,
}

impl Default for MockSheetClient {
    fn default() -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            update_attempts: std::sync::atomic::AtomicUsize::new(0),
            fail: MockFailure::None,
        }
    }
}

impl MockSheetClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self, error: StockhandError) -> Self {
        self.fail = match error {
            StockhandError::AuthExpired => MockFailure::Auth,
            other => MockFailure::External(other.to_string()),
        };
        self
    }

    fn scripted_failure(&self) -> Option<StockhandError> {
        match &self.fail {
            MockFailure::None => None,
            MockFailure::Auth => Some(StockhandError::AuthExpired),
            MockFailure::External(message) => Some(StockhandError::ExternalServiceError {
                message: message.clone(),
            }),
        }
    }

    pub fn updates(&self) -> Vec<(String, Vec<Vec<String>>)> {
        self.updates.lock().expect("mock lock poisoned").clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("mock lock poisoned").clone()
    }

    /// Update calls attempted, including failed ones.
    pub fn update_attempts(&self) -> usize {
        self.update_attempts
            .load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl SheetClient for MockSheetClient {
    async fn update(&self, range: &str, values: &[Vec<String>]) -> Result<Value> {
        self.update_attempts
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(error) = self.scripted_failure() {
            return Err(error);
        }
        self.updates
            .lock()
            .expect("mock lock poisoned")
            .push((range.to_string(), values.to_vec()));
        Ok(json!({ "updated_rows": values.len() }))
    }

    async fn query(&self, item: &str) -> Result<Value> {
        if let Some(error) = self.scripted_failure() {
            return Err(error);
        }
        self.queries
            .lock()
            .expect("mock lock poisoned")
            .push(item.to_string());
        Ok(json!({ "item": item, "count": 12 }))
    }
}
