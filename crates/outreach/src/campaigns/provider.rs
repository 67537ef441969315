use std::collections::BTreeMap;

use super::domain::ProviderMessageId;

/// Correlation tag names attached to every outbound send.
pub const TAG_JOB_ID: &str = "job_id";
pub const TAG_WORKSPACE_ID: &str = "workspace_id";

/// A fully rendered message handed to the provider adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Correlation tags echoed back by provider webhooks.
    pub tags: BTreeMap<String, String>,
}

/// Provider failure taxonomy. Transient failures are retried up to the
/// configured attempt threshold; rejections are terminal immediately.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transient(String),
    #[error("provider rejected the message: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Seam to the third-party transactional email API.
///
/// Implementations are stateless apart from credentials; all correlation
/// state travels in [`OutboundEmail::tags`].
#[async_trait::async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, ProviderError>;
}
