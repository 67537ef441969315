use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::domain::{EventKind, JobId, ProviderMessageId, WorkspaceId};

/// The `{type, data}` envelope providers post to the webhook endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// A provider webhook reduced to the fields the pipeline consumes. The raw
/// payload rides along for the outbox audit trail.
#[derive(Debug, Clone)]
pub struct NormalizedWebhookEvent {
    pub kind: EventKind,
    pub email: Option<String>,
    pub provider_message_id: Option<ProviderMessageId>,
    pub provider_event_id: Option<String>,
    pub job_id: Option<JobId>,
    pub workspace_id: Option<WorkspaceId>,
    pub click_url: Option<String>,
    pub reply_text: Option<String>,
    pub raw: Value,
}

impl NormalizedWebhookEvent {
    /// Key used to deduplicate redelivered webhooks at append time: the
    /// provider's event id when present, otherwise kind + message id.
    pub fn dedupe_key(&self) -> Option<String> {
        if let Some(event_id) = &self.provider_event_id {
            return Some(format!("provider:{event_id}"));
        }
        self.provider_message_id
            .as_ref()
            .map(|id| format!("{}:{}", self.kind.label(), id.0))
    }
}

/// Fixed mapping from provider webhook types to internal event kinds.
/// Unmapped types are acknowledged and ignored upstream, never errored.
pub fn event_kind_for_type(event_type: &str) -> Option<EventKind> {
    match event_type {
        "email.sent" => Some(EventKind::Sent),
        "email.delivered" => Some(EventKind::Delivered),
        "email.opened" => Some(EventKind::Opened),
        "email.clicked" => Some(EventKind::Clicked),
        "email.bounced" => Some(EventKind::Bounced),
        "email.complained" => Some(EventKind::Complained),
        "email.replied" | "inbound.reply" => Some(EventKind::Replied),
        _ => None,
    }
}

/// Normalize the two tag shapes providers emit, an array of
/// `{name, value}` pairs or a flat object, into one string mapping.
/// Entries of any other shape are dropped.
pub fn normalize_tags(value: &Value) -> BTreeMap<String, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?;
                let value = item.get("value")?.as_str()?;
                Some((name.to_string(), value.to_string()))
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(name, value)| {
                value.as_str().map(|value| (name.clone(), value.to_string()))
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Reduce a raw webhook payload to a [`NormalizedWebhookEvent`], or `None`
/// when the payload is malformed or carries an unmapped type.
pub fn normalize_webhook(payload: &Value) -> Option<NormalizedWebhookEvent> {
    let envelope: WebhookEnvelope = serde_json::from_value(payload.clone()).ok()?;
    let kind = event_kind_for_type(&envelope.event_type)?;
    let data = &envelope.data;

    let tags = data
        .get("tags")
        .map(normalize_tags)
        .unwrap_or_default();

    let email = data
        .get("to")
        .and_then(first_address)
        .or_else(|| data.get("email").and_then(Value::as_str).map(str::to_string));

    let provider_message_id = data
        .get("email_id")
        .or_else(|| data.get("message_id"))
        .and_then(Value::as_str)
        .map(|id| ProviderMessageId(id.to_string()));

    let provider_event_id = payload
        .get("id")
        .or_else(|| data.get("event_id"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let click_url = data
        .get("click")
        .and_then(|click| click.get("link"))
        .or_else(|| data.get("click_url"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let reply_text = data
        .get("text")
        .or_else(|| data.get("reply_text"))
        .and_then(Value::as_str)
        .map(str::to_string);

    // The dashboard tagged sends with camelCase names before the worker
    // switched to snake_case; accept both.
    let job_id = tag_value(&tags, &["job_id", "jobId"]).map(JobId);
    let workspace_id = tag_value(&tags, &["workspace_id", "workspaceId"]).map(WorkspaceId);

    Some(NormalizedWebhookEvent {
        kind,
        email,
        provider_message_id,
        provider_event_id,
        job_id,
        workspace_id,
        click_url,
        reply_text,
        raw: payload.clone(),
    })
}

fn first_address(value: &Value) -> Option<String> {
    match value {
        Value::String(address) => Some(address.clone()),
        Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn tag_value(tags: &BTreeMap<String, String>, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| tags.get(*name).cloned())
}
