pub mod genesys;
pub mod models;

use crate::apis::models::{ContactScanResponse, ConversationQueryResponse, UserListResponse};
use async_trait::async_trait;
use thiserror::Error;

pub use genesys::GenesysClient;

/// Failures coming back from the Genesys API, kept distinct from pipeline errors
/// so the pagination drivers can decide whether to retry, stop, or propagate.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The three Genesys calls the extractor depends on.
#[async_trait]
pub trait GenesysApi: Send + Sync {
    /// Conversation details for `interval`, one numbered page (1-based).
    async fn query_conversations(
        &self,
        interval: &str,
        page_number: u32,
        page_size: u32,
    ) -> Result<ConversationQueryResponse, ApiError>;

    /// One page of external contacts; `cursor` of `None` requests the first page.
    async fn scan_contacts(
        &self,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<ContactScanResponse, ApiError>;

    /// All users in a single page.
    async fn list_users(&self, page_size: u32) -> Result<UserListResponse, ApiError>;
}
