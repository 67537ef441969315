use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use super::domain::{
    EmailJob, EnrollmentStatus, EventKind, JobStatus, SendingIdentity, WorkspaceId,
};
use super::provider::{EmailProvider, OutboundEmail, ProviderError, TAG_JOB_ID, TAG_WORKSPACE_ID};
use super::render::{lead_vars, render_template};
use super::store::{NewEvent, NewMessage, OutreachStore, StoreError};

/// Dispatches pending jobs through the provider, respecting per-mailbox and
/// per-domain daily limits and the configured retry threshold.
pub struct Worker<S, P> {
    store: Arc<S>,
    provider: Arc<P>,
    batch_size: usize,
    max_attempts: u32,
    send_timeout: Duration,
}

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Transient failures left Pending for a later cycle.
    pub retried: usize,
    /// Jobs left untouched because every sending identity was throttled.
    pub deferred: usize,
    pub errors: usize,
}

enum Dispatched {
    Sent,
    Failed,
    Skipped,
    Retried,
    /// Identities exist but none has quota left; stop the batch.
    Deferred,
}

impl<S, P> Worker<S, P>
where
    S: OutreachStore,
    P: EmailProvider,
{
    pub fn new(
        store: Arc<S>,
        provider: Arc<P>,
        batch_size: usize,
        max_attempts: u32,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            batch_size,
            max_attempts,
            send_timeout,
        }
    }

    /// Drain due pending jobs, bounded by the batch size. One job's failure
    /// never aborts the batch.
    pub async fn process_jobs(
        &self,
        workspace: &WorkspaceId,
        now: DateTime<Utc>,
    ) -> Result<DispatchReport, StoreError> {
        let jobs = self.store.pending_jobs(workspace, now, self.batch_size)?;
        let mut report = DispatchReport::default();

        let total = jobs.len();
        for (position, job) in jobs.into_iter().enumerate() {
            match self.dispatch(&job, now).await {
                Ok(Dispatched::Sent) => report.sent += 1,
                Ok(Dispatched::Failed) => report.failed += 1,
                Ok(Dispatched::Skipped) => report.skipped += 1,
                Ok(Dispatched::Retried) => report.retried += 1,
                Ok(Dispatched::Deferred) => {
                    report.deferred = total - position;
                    tracing::info!(
                        workspace = %workspace.0,
                        deferred = report.deferred,
                        "all sending identities throttled; deferring remainder of batch"
                    );
                    break;
                }
                Err(err) => {
                    report.errors += 1;
                    tracing::warn!(job = %job.id.0, error = %err, "job dispatch failed");
                }
            }
        }

        if report.sent > 0 || report.failed > 0 {
            tracing::info!(
                workspace = %workspace.0,
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                retried = report.retried,
                "dispatch pass finished"
            );
        }
        Ok(report)
    }

    async fn dispatch(&self, job: &EmailJob, now: DateTime<Utc>) -> Result<Dispatched, StoreError> {
        // Re-read under the store lock: an overlapping invocation may have
        // dispatched this job already. A send is never issued twice once a
        // job has left Pending.
        let Some(mut job) = self.store.job(&job.id)? else {
            return Ok(Dispatched::Skipped);
        };
        if job.status != JobStatus::Pending {
            return Ok(Dispatched::Skipped);
        }

        let enrollment = self.store.enrollment(&job.enrollment_id)?;
        let active = enrollment
            .map(|enrollment| enrollment.status == EnrollmentStatus::Active)
            .unwrap_or(false);
        if !active {
            // Paused or suppressed since scheduling: we chose not to send.
            return self.mark_skipped(job, "enrollment no longer active");
        }

        let Some(lead) = self.store.lead(&job.lead_id)? else {
            return self.mark_skipped(job, "lead no longer exists");
        };
        let Some(step) = self.store.step(&job.step_id)? else {
            return self.mark_skipped(job, "step removed from campaign");
        };

        let identities = self.store.sending_identities(&job.workspace_id)?;
        if identities.is_empty() || !identities.iter().any(|identity| identity.mailbox.active) {
            return self.mark_skipped(job, "no active sending identity");
        }
        let Some(identity) = identities.into_iter().find(SendingIdentity::available) else {
            return Ok(Dispatched::Deferred);
        };

        let mut vars = lead_vars(&lead);
        if let Some(campaign) = self.store.campaign(&job.campaign_id)? {
            vars.insert("campaign_name".to_string(), campaign.name);
        }
        let subject = render_template(&step.subject, &vars);
        let body = render_template(&step.body, &vars);

        let mut tags = std::collections::BTreeMap::new();
        tags.insert(TAG_JOB_ID.to_string(), job.id.0.clone());
        tags.insert(TAG_WORKSPACE_ID.to_string(), job.workspace_id.0.clone());

        let email = OutboundEmail {
            from: identity.from_header(),
            to: lead.email.clone(),
            subject: subject.clone(),
            body,
            tags,
        };

        let outcome = match tokio::time::timeout(self.send_timeout, self.provider.send(&email)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Transient(format!(
                "send timed out after {:?}",
                self.send_timeout
            ))),
        };

        match outcome {
            Ok(provider_id) => {
                job.status = JobStatus::Sent;
                job.attempts += 1;
                job.sent_message_id = Some(provider_id.clone());
                job.last_error = None;
                self.store.update_job(&job)?;

                self.store.insert_message(NewMessage {
                    workspace_id: job.workspace_id.clone(),
                    job_id: job.id.clone(),
                    lead_id: job.lead_id.clone(),
                    to: lead.email,
                    subject,
                    provider_message_id: provider_id.clone(),
                    sent_at: now,
                })?;
                self.store.record_identity_send(&identity.mailbox.id)?;

                // Internal trigger into the outbox so the ledger records the
                // send even if the provider never calls back.
                self.store.append_event(
                    NewEvent {
                        workspace_id: job.workspace_id.clone(),
                        kind: EventKind::Sent,
                        job_id: Some(job.id.clone()),
                        provider_message_id: Some(provider_id.clone()),
                        payload: json!({ "source": "worker" }),
                        dedupe_key: Some(format!("sent:{}", provider_id.0)),
                    },
                    now,
                )?;

                tracing::info!(job = %job.id.0, provider_message = %provider_id.0, "email dispatched");
                Ok(Dispatched::Sent)
            }
            Err(err) => {
                job.attempts += 1;
                job.last_error = Some(err.to_string());

                if err.is_transient() && job.attempts < self.max_attempts {
                    // Stays Pending; a later cycle retries.
                    self.store.update_job(&job)?;
                    tracing::warn!(
                        job = %job.id.0,
                        attempt = job.attempts,
                        error = %err,
                        "transient send failure, will retry"
                    );
                    Ok(Dispatched::Retried)
                } else {
                    job.status = JobStatus::Failed;
                    self.store.update_job(&job)?;
                    tracing::error!(
                        job = %job.id.0,
                        attempts = job.attempts,
                        error = %err,
                        "send permanently failed"
                    );
                    Ok(Dispatched::Failed)
                }
            }
        }
    }

    fn mark_skipped(&self, mut job: EmailJob, reason: &str) -> Result<Dispatched, StoreError> {
        job.status = JobStatus::Skipped;
        job.last_error = Some(reason.to_string());
        self.store.update_job(&job)?;
        tracing::info!(job = %job.id.0, reason, "job skipped");
        Ok(Dispatched::Skipped)
    }
}
