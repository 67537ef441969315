use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use outreach::campaigns::{
    EmailProvider, Mailbox, MailboxId, OutboundEmail, OutreachStore, ProviderError,
    ProviderMessageId, SendingDomain, StoreError, WorkspaceId,
};
use outreach::config::ProviderConfig;
use serde::Deserialize;
use serde_json::json;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Provider selected from configuration: the HTTP adapter when an API key is
/// present, the console adapter otherwise.
pub(crate) enum DispatchProvider {
    Http(HttpEmailProvider),
    Console(ConsoleProvider),
}

impl DispatchProvider {
    pub(crate) fn from_config(config: &ProviderConfig) -> Self {
        match &config.api_key {
            Some(api_key) => Self::Http(HttpEmailProvider::new(
                config.base_url.clone(),
                api_key.clone(),
            )),
            None => {
                tracing::warn!("no provider API key configured; sends go to the console adapter");
                Self::Console(ConsoleProvider::default())
            }
        }
    }
}

#[async_trait::async_trait]
impl EmailProvider for DispatchProvider {
    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, ProviderError> {
        match self {
            Self::Http(provider) => provider.send(email).await,
            Self::Console(provider) => provider.send(email).await,
        }
    }
}

/// Adapter for a Resend-shaped transactional email API.
pub(crate) struct HttpEmailProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

impl HttpEmailProvider {
    pub(crate) fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl EmailProvider for HttpEmailProvider {
    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, ProviderError> {
        let tags: Vec<serde_json::Value> = email
            .tags
            .iter()
            .map(|(name, value)| json!({ "name": name, "value": value }))
            .collect();
        let payload = json!({
            "from": email.from,
            "to": [email.to],
            "subject": email.subject,
            "text": email.body,
            "tags": tags,
        });

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProviderError::Transient(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: SendResponse = response
                .json()
                .await
                .map_err(|err| ProviderError::Transient(format!("unreadable provider response: {err}")))?;
            Ok(ProviderMessageId(body.id))
        } else if status.is_server_error() {
            Err(ProviderError::Transient(format!("provider returned {status}")))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::Rejected(format!("provider returned {status}: {body}")))
        }
    }
}

/// Logs sends instead of delivering them; local development only.
#[derive(Default)]
pub(crate) struct ConsoleProvider {
    sequence: AtomicU64,
}

#[async_trait::async_trait]
impl EmailProvider for ConsoleProvider {
    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, ProviderError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(to = %email.to, subject = %email.subject, "console provider delivered email");
        Ok(ProviderMessageId(format!("console-{id:04}")))
    }
}

/// Seed the workspace's sending identity from configuration. Real identity
/// management lives in the admin surface; the engine only needs one usable
/// mailbox on a verified domain to dispatch.
pub(crate) fn seed_sending_identity<S: OutreachStore>(
    store: &S,
    workspace: &WorkspaceId,
    provider: &ProviderConfig,
) -> Result<(), StoreError> {
    let domain = provider
        .from_address
        .split_once('@')
        .map(|(_, domain)| domain.to_string())
        .unwrap_or_else(|| "example.com".to_string());

    store.upsert_sending_domain(SendingDomain {
        domain: domain.clone(),
        workspace_id: workspace.clone(),
        dkim_verified: true,
        spf_verified: true,
        dmarc_verified: true,
        daily_limit: 2000,
        sent_today: 0,
    })?;
    store.upsert_mailbox(Mailbox {
        id: MailboxId(format!("mbx-{domain}")),
        workspace_id: workspace.clone(),
        address: provider.from_address.clone(),
        domain,
        display_name: provider.from_name.clone(),
        active: true,
        daily_limit: 1000,
        sent_today: 0,
    })?;
    Ok(())
}
