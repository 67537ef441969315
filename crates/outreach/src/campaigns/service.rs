use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{CampaignEnrollment, CampaignId, LeadId, WorkspaceId};
use super::events::{EventPipeline, EventReport};
use super::provider::EmailProvider;
use super::scheduler::{ScheduleReport, Scheduler};
use super::steps::{StepBatchOutcome, StepDraft};
use super::store::{AppendOutcome, NewEnrollment, OutreachStore, StoreError};
use super::webhook::NormalizedWebhookEvent;
use super::worker::{DispatchReport, Worker};

/// Tuning for one service instance; loaded from configuration by the
/// binary, defaulted for tests.
#[derive(Debug, Clone)]
pub struct OutreachSettings {
    pub scheduler_batch_size: usize,
    pub worker_batch_size: usize,
    pub event_batch_size: usize,
    pub max_send_attempts: u32,
    pub send_timeout: Duration,
}

impl Default for OutreachSettings {
    fn default() -> Self {
        Self {
            scheduler_batch_size: 100,
            worker_batch_size: 25,
            event_batch_size: 100,
            max_send_attempts: 3,
            send_timeout: Duration::from_secs(30),
        }
    }
}

/// Error raised by the outreach service.
#[derive(Debug, thiserror::Error)]
pub enum OutreachError {
    #[error("unknown campaign {0}")]
    UnknownCampaign(String),
    #[error("unknown lead {0}")]
    UnknownLead(String),
    #[error("lead already enrolled in campaign")]
    AlreadyEnrolled,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Import(#[from] super::import::RosterImportError),
}

/// Aggregate counts for one full Scheduler -> Worker -> Event System cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub schedule: ScheduleReport,
    pub dispatch: DispatchReport,
    pub events: EventReport,
}

/// Composes the scheduler, worker, and event pipeline over one store and
/// provider. The workspace is an explicit parameter on every entry point,
/// resolved once at the trigger boundary.
pub struct OutreachService<S, P> {
    store: Arc<S>,
    scheduler: Scheduler<S>,
    worker: Worker<S, P>,
    pipeline: EventPipeline<S>,
}

impl<S, P> OutreachService<S, P>
where
    S: OutreachStore,
    P: EmailProvider,
{
    pub fn new(store: Arc<S>, provider: Arc<P>, settings: OutreachSettings) -> Self {
        let scheduler = Scheduler::new(store.clone(), settings.scheduler_batch_size);
        let worker = Worker::new(
            store.clone(),
            provider,
            settings.worker_batch_size,
            settings.max_send_attempts,
            settings.send_timeout,
        );
        let pipeline = EventPipeline::new(store.clone(), settings.event_batch_size);

        Self {
            store,
            scheduler,
            worker,
            pipeline,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Enroll a lead into a campaign; step 0 becomes immediately due.
    pub fn enroll(
        &self,
        workspace: &WorkspaceId,
        campaign: &CampaignId,
        lead: &LeadId,
        now: DateTime<Utc>,
    ) -> Result<CampaignEnrollment, OutreachError> {
        if self.store.campaign(campaign)?.is_none() {
            return Err(OutreachError::UnknownCampaign(campaign.0.clone()));
        }
        if self.store.lead(lead)?.is_none() {
            return Err(OutreachError::UnknownLead(lead.0.clone()));
        }

        match self.store.insert_enrollment(NewEnrollment {
            workspace_id: workspace.clone(),
            lead_id: lead.clone(),
            campaign_id: campaign.clone(),
            enrolled_at: now,
        }) {
            Ok(enrollment) => Ok(enrollment),
            Err(StoreError::Conflict) => Err(OutreachError::AlreadyEnrolled),
            Err(err) => Err(err.into()),
        }
    }

    /// Replace a campaign's step list in one atomic batch.
    pub fn replace_steps(
        &self,
        campaign: &CampaignId,
        drafts: Vec<StepDraft>,
    ) -> Result<StepBatchOutcome, OutreachError> {
        match self.store.replace_steps(campaign, drafts) {
            Ok(outcome) => Ok(outcome),
            Err(StoreError::NotFound) => Err(OutreachError::UnknownCampaign(campaign.0.clone())),
            Err(err) => Err(err.into()),
        }
    }

    pub fn schedule_jobs(
        &self,
        workspace: &WorkspaceId,
        now: DateTime<Utc>,
    ) -> Result<ScheduleReport, OutreachError> {
        Ok(self.scheduler.schedule_jobs(workspace, now)?)
    }

    pub async fn process_jobs(
        &self,
        workspace: &WorkspaceId,
        now: DateTime<Utc>,
    ) -> Result<DispatchReport, OutreachError> {
        Ok(self.worker.process_jobs(workspace, now).await?)
    }

    pub fn process_events(&self, now: DateTime<Utc>) -> Result<EventReport, OutreachError> {
        Ok(self.pipeline.process_events(now)?)
    }

    /// Record a normalized provider webhook and drain inline, best-effort.
    /// The inline drain failing does not fail ingestion; the cron-triggered
    /// drain is the durable fallback.
    pub fn ingest_webhook(
        &self,
        fallback_workspace: &WorkspaceId,
        webhook: &NormalizedWebhookEvent,
        now: DateTime<Utc>,
    ) -> Result<AppendOutcome, OutreachError> {
        let workspace = match self.resolve_workspace(webhook)? {
            Some(workspace) => workspace,
            None => fallback_workspace.clone(),
        };

        let event = self.pipeline.event_from_webhook(workspace, webhook);
        let outcome = self.pipeline.emit(event, now)?;

        if matches!(outcome, AppendOutcome::Recorded(_)) {
            if let Err(err) = self.pipeline.process_events(now) {
                tracing::warn!(error = %err, "inline event drain failed; cron drain will catch up");
            }
        }
        Ok(outcome)
    }

    /// One full pipeline cycle. Stage reports are aggregated; a store-level
    /// failure in any stage aborts the cycle and surfaces to the trigger.
    pub async fn run_cycle(
        &self,
        workspace: &WorkspaceId,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, OutreachError> {
        let schedule = self.scheduler.schedule_jobs(workspace, now)?;
        let dispatch = self.worker.process_jobs(workspace, now).await?;
        let events = self.pipeline.process_events(now)?;

        Ok(CycleReport {
            schedule,
            dispatch,
            events,
        })
    }

    fn resolve_workspace(
        &self,
        webhook: &NormalizedWebhookEvent,
    ) -> Result<Option<WorkspaceId>, OutreachError> {
        if let Some(workspace) = &webhook.workspace_id {
            return Ok(Some(workspace.clone()));
        }
        if let Some(job_id) = &webhook.job_id {
            if let Some(job) = self.store.job(job_id)? {
                return Ok(Some(job.workspace_id));
            }
        }
        if let Some(provider_id) = &webhook.provider_message_id {
            if let Some(message) = self.store.message_by_provider_id(provider_id)? {
                return Ok(Some(message.workspace_id));
            }
        }
        Ok(None)
    }
}
