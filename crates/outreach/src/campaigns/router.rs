use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{CampaignId, LeadId, WorkspaceId};
use super::provider::EmailProvider;
use super::service::{OutreachError, OutreachService};
use super::steps::StepDraft;
use super::store::{AppendOutcome, OutreachStore};
use super::webhook::normalize_webhook;

/// Service plus the two values resolved once at the trigger boundary: the
/// workspace this deployment serves and the optional cron bearer secret.
pub struct OutreachApi<S, P> {
    pub service: Arc<OutreachService<S, P>>,
    pub workspace: WorkspaceId,
    pub cron_secret: Option<String>,
}

/// Router builder exposing the outreach HTTP surface.
pub fn outreach_router<S, P>(api: Arc<OutreachApi<S, P>>) -> Router
where
    S: OutreachStore + 'static,
    P: EmailProvider + 'static,
{
    Router::new()
        .route("/api/v1/outreach/cron", get(cron_handler::<S, P>))
        .route("/api/v1/outreach/webhook", post(webhook_handler::<S, P>))
        .route(
            "/api/v1/campaigns/:campaign_id/steps",
            put(replace_steps_handler::<S, P>),
        )
        .route(
            "/api/v1/campaigns/:campaign_id/enrollments",
            post(enroll_handler::<S, P>),
        )
        .with_state(api)
}

pub(crate) async fn cron_handler<S, P>(
    State(api): State<Arc<OutreachApi<S, P>>>,
    headers: HeaderMap,
) -> Response
where
    S: OutreachStore + 'static,
    P: EmailProvider + 'static,
{
    if let Some(secret) = &api.cron_secret {
        let expected = format!("Bearer {secret}");
        let presented = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        if presented != Some(expected.as_str()) {
            let payload = json!({ "error": "unauthorized" });
            return (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response();
        }
    }

    let now = Utc::now();
    match api.service.run_cycle(&api.workspace, now).await {
        Ok(report) => {
            let payload = json!({
                "status": "ok",
                "timestamp": now.to_rfc3339(),
                "report": report,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "outreach cycle failed");
            let payload = json!({ "error": "outreach cycle failed" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn webhook_handler<S, P>(
    State(api): State<Arc<OutreachApi<S, P>>>,
    body: axum::body::Bytes,
) -> Response
where
    S: OutreachStore + 'static,
    P: EmailProvider + 'static,
{
    // Never bounce a webhook for a payload we cannot read: a 4xx/5xx here
    // only buys a provider-side retry storm.
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(error = %err, "unreadable webhook payload acknowledged");
            let payload = json!({ "status": "ignored" });
            return (StatusCode::OK, axum::Json(payload)).into_response();
        }
    };

    let Some(event) = normalize_webhook(&payload) else {
        let payload = json!({ "status": "ignored" });
        return (StatusCode::OK, axum::Json(payload)).into_response();
    };

    match api.service.ingest_webhook(&api.workspace, &event, Utc::now()) {
        Ok(AppendOutcome::Recorded(_)) => {
            let payload = json!({ "status": "accepted" });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Ok(AppendOutcome::Duplicate) => {
            let payload = json!({ "status": "duplicate" });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => {
            // Persistence failure: let the provider redeliver later.
            tracing::error!(error = %err, "failed to record webhook event");
            let payload = json!({ "error": "event not recorded" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StepBatchRequest {
    pub(crate) steps: Vec<StepDraft>,
}

pub(crate) async fn replace_steps_handler<S, P>(
    State(api): State<Arc<OutreachApi<S, P>>>,
    Path(campaign_id): Path<String>,
    axum::Json(request): axum::Json<StepBatchRequest>,
) -> Response
where
    S: OutreachStore + 'static,
    P: EmailProvider + 'static,
{
    let campaign = CampaignId(campaign_id);
    match api.service.replace_steps(&campaign, request.steps) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(OutreachError::UnknownCampaign(id)) => {
            let payload = json!({ "error": format!("unknown campaign {id}") });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "step batch update failed");
            let payload = json!({ "error": "step batch update failed" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnrollRequest {
    pub(crate) lead_id: String,
}

pub(crate) async fn enroll_handler<S, P>(
    State(api): State<Arc<OutreachApi<S, P>>>,
    Path(campaign_id): Path<String>,
    axum::Json(request): axum::Json<EnrollRequest>,
) -> Response
where
    S: OutreachStore + 'static,
    P: EmailProvider + 'static,
{
    let campaign = CampaignId(campaign_id);
    let lead = LeadId(request.lead_id);
    match api
        .service
        .enroll(&api.workspace, &campaign, &lead, Utc::now())
    {
        Ok(enrollment) => (StatusCode::CREATED, axum::Json(enrollment)).into_response(),
        Err(OutreachError::AlreadyEnrolled) => {
            let payload = json!({ "error": "lead already enrolled in campaign" });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        Err(err @ OutreachError::UnknownCampaign(_)) | Err(err @ OutreachError::UnknownLead(_)) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "enrollment failed");
            let payload = json!({ "error": "enrollment failed" });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
