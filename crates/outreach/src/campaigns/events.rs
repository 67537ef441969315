use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{EmailMessage, EnrollmentStatus, EventKind, OutreachEvent, WorkspaceId};
use super::store::{AppendOutcome, NewEvent, OutreachStore, StoreError};
use super::webhook::NormalizedWebhookEvent;

/// Consumes the outbox: claims unprocessed events in creation order and
/// applies message/enrollment state transitions. Re-running a drain is a
/// no-op because claiming stamps `processed_at` atomically.
pub struct EventPipeline<S> {
    store: Arc<S>,
    batch_size: usize,
}

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventReport {
    pub processed: usize,
    /// Events referencing unknown jobs/messages: recorded, logged, no state
    /// change.
    pub anomalies: usize,
    /// Enrollments moved to Bounced by bounce/complaint events.
    pub suppressed: usize,
    /// Enrollments moved to Replied.
    pub replied: usize,
    pub errors: usize,
}

enum Applied {
    StateChanged,
    Suppressed,
    Replied,
    Anomaly,
}

impl<S: OutreachStore> EventPipeline<S> {
    pub fn new(store: Arc<S>, batch_size: usize) -> Self {
        Self { store, batch_size }
    }

    /// Append one event to the outbox. Odd-but-parseable payloads are
    /// recorded as-is; only persistence failures surface to the caller.
    pub fn emit(
        &self,
        event: NewEvent,
        now: DateTime<Utc>,
    ) -> Result<AppendOutcome, StoreError> {
        self.store.append_event(event, now)
    }

    /// Build the outbox row for a normalized provider webhook.
    pub fn event_from_webhook(
        &self,
        workspace: WorkspaceId,
        webhook: &NormalizedWebhookEvent,
    ) -> NewEvent {
        NewEvent {
            workspace_id: workspace,
            kind: webhook.kind,
            job_id: webhook.job_id.clone(),
            provider_message_id: webhook.provider_message_id.clone(),
            payload: webhook.raw.clone(),
            dedupe_key: webhook.dedupe_key(),
        }
    }

    /// Drain unprocessed events, bounded by the batch size.
    pub fn process_events(&self, now: DateTime<Utc>) -> Result<EventReport, StoreError> {
        let events = self.store.claim_unprocessed_events(self.batch_size, now)?;
        let mut report = EventReport::default();

        for event in events {
            report.processed += 1;
            match self.apply(&event) {
                Ok(Applied::StateChanged) => {}
                Ok(Applied::Suppressed) => report.suppressed += 1,
                Ok(Applied::Replied) => report.replied += 1,
                Ok(Applied::Anomaly) => report.anomalies += 1,
                Err(err) => {
                    report.errors += 1;
                    tracing::warn!(event = %event.id.0, error = %err, "event application failed");
                }
            }
        }

        if report.processed > 0 {
            tracing::info!(
                processed = report.processed,
                anomalies = report.anomalies,
                suppressed = report.suppressed,
                replied = report.replied,
                "event drain finished"
            );
        }
        Ok(report)
    }

    fn apply(&self, event: &OutreachEvent) -> Result<Applied, StoreError> {
        let Some(message) = self.resolve_message(event)? else {
            tracing::warn!(
                event = %event.id.0,
                kind = event.kind.label(),
                "event references no known message; recorded as anomaly"
            );
            return Ok(Applied::Anomaly);
        };

        let advanced = self
            .store
            .advance_message_status(&message.id, event.kind.message_status())?;
        if !advanced {
            tracing::debug!(
                event = %event.id.0,
                message = %message.id.0,
                kind = event.kind.label(),
                "delivery ledger already past this event"
            );
        }

        match event.kind {
            EventKind::Bounced | EventKind::Complained => {
                self.transition_enrollment_for(&message, EnrollmentStatus::Bounced)
            }
            EventKind::Replied => self.transition_enrollment_for(&message, EnrollmentStatus::Replied),
            EventKind::Sent
            | EventKind::Delivered
            | EventKind::Opened
            | EventKind::Clicked => Ok(Applied::StateChanged),
        }
    }

    fn transition_enrollment_for(
        &self,
        message: &EmailMessage,
        to: EnrollmentStatus,
    ) -> Result<Applied, StoreError> {
        let Some(job) = self.store.job(&message.job_id)? else {
            tracing::warn!(message = %message.id.0, "message references no known job");
            return Ok(Applied::Anomaly);
        };

        match self.store.transition_enrollment(&job.enrollment_id, to) {
            Ok(_) => {
                tracing::info!(
                    enrollment = %job.enrollment_id.0,
                    status = to.label(),
                    "enrollment transitioned by delivery event"
                );
                Ok(match to {
                    EnrollmentStatus::Replied => Applied::Replied,
                    _ => Applied::Suppressed,
                })
            }
            // Already terminal: the transition table rejects the move and
            // the existing terminal state wins.
            Err(StoreError::InvalidTransition { from, to }) => {
                tracing::debug!(
                    enrollment = %job.enrollment_id.0,
                    %from,
                    %to,
                    "ignoring transition outside the enrollment table"
                );
                Ok(Applied::StateChanged)
            }
            Err(StoreError::NotFound) => {
                tracing::warn!(
                    enrollment = %job.enrollment_id.0,
                    "event's enrollment no longer exists"
                );
                Ok(Applied::Anomaly)
            }
            Err(err) => Err(err),
        }
    }

    fn resolve_message(&self, event: &OutreachEvent) -> Result<Option<EmailMessage>, StoreError> {
        if let Some(provider_id) = &event.provider_message_id {
            if let Some(message) = self.store.message_by_provider_id(provider_id)? {
                return Ok(Some(message));
            }
        }
        if let Some(job_id) = &event.job_id {
            return self.store.message_for_job(job_id);
        }
        Ok(None)
    }
}
