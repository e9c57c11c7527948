//! Control plane boundary
//!
//! `DatabaseApi` and `StreamingApi` are the only way the engine talks to the
//! remote control plane. Implementations return the raw status code together
//! with the typed body; deciding what a status means is left to the engine
//! components that classify it.

pub mod http;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpControlPlane;
pub use types::*;

/// The request never produced an HTTP response (connect, TLS, timeout, body read).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{context}: {message}")]
pub struct TransportError {
    pub context: String,
    pub message: String,
}

impl TransportError {
    pub fn new(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self {
            context: context.into(),
            message: err.to_string(),
        }
    }
}

/// Status code plus body of one control plane response.
///
/// `body` is only populated for 2xx responses whose payload decoded; `raw`
/// always holds the response text for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub body: Option<T>,
    pub raw: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(status: u16, body: T) -> Self {
        Self {
            status,
            body: Some(body),
            raw: String::new(),
        }
    }

    pub fn error(status: u16, raw: impl Into<String>) -> Self {
        Self {
            status,
            body: None,
            raw: raw.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            status: self.status,
            body: self.body.map(f),
            raw: self.raw,
        }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, TransportError>;

/// Database lifecycle and keyspace endpoints.
#[async_trait]
pub trait DatabaseApi: Send + Sync {
    async fn get_database(&self, database_id: &str) -> ApiResult<Database>;

    /// Keyspace names currently listed for the database.
    async fn list_keyspaces(&self, database_id: &str) -> ApiResult<Vec<String>>;

    async fn add_keyspace(&self, database_id: &str, keyspace: &str) -> ApiResult<()>;

    async fn drop_keyspace(&self, database_id: &str, keyspace: &str) -> ApiResult<()>;

    async fn current_org(&self) -> ApiResult<Organization>;
}

/// Streaming tenant token and CDC endpoints.
#[async_trait]
pub trait StreamingApi: Send + Sync {
    async fn list_tenant_tokens(
        &self,
        tenant: &str,
        org_id: &str,
        cluster: &str,
    ) -> ApiResult<Vec<TenantToken>>;

    /// Raw token material for one token id.
    async fn get_tenant_token(
        &self,
        tenant: &str,
        token_id: &str,
        org_id: &str,
        cluster: &str,
    ) -> ApiResult<String>;

    async fn enable_cdc(
        &self,
        tenant: &str,
        request: &CdcRequest,
        credential: &RoutingCredential,
    ) -> ApiResult<()>;

    async fn delete_cdc(
        &self,
        tenant: &str,
        request: &CdcRequest,
        credential: &RoutingCredential,
    ) -> ApiResult<()>;

    async fn list_cdc(
        &self,
        tenant: &str,
        credential: &RoutingCredential,
    ) -> ApiResult<Vec<CdcEntry>>;
}
