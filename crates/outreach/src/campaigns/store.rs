use chrono::{DateTime, Utc};

use super::domain::{
    Campaign, CampaignEnrollment, CampaignId, CampaignStep, EmailJob, EmailMessage,
    EnrollmentId, EnrollmentStatus, EventKind, JobId, Lead, LeadId, Mailbox, MailboxId,
    MessageId, MessageStatus, OutreachEvent, ProviderMessageId, SendingDomain, SendingIdentity,
    StepId, WorkspaceId,
};
use super::steps::{StepBatchOutcome, StepDraft};

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("transition from {from} to {to} is not allowed")]
    InvalidTransition { from: String, to: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Fields for a job created by the scheduler; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub workspace_id: WorkspaceId,
    pub lead_id: LeadId,
    pub campaign_id: CampaignId,
    pub step_id: StepId,
    pub enrollment_id: EnrollmentId,
    pub scheduled_for: DateTime<Utc>,
}

/// Fields for a delivery ledger row written after a successful send.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub workspace_id: WorkspaceId,
    pub job_id: JobId,
    pub lead_id: LeadId,
    pub to: String,
    pub subject: String,
    pub provider_message_id: ProviderMessageId,
    pub sent_at: DateTime<Utc>,
}

/// Fields for an outbox row. `dedupe_key` makes appends idempotent under
/// provider webhook redelivery.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub workspace_id: WorkspaceId,
    pub kind: EventKind,
    pub job_id: Option<JobId>,
    pub provider_message_id: Option<ProviderMessageId>,
    pub payload: serde_json::Value,
    pub dedupe_key: Option<String>,
}

/// Fields for a fresh enrollment; cursor 0, Active, step 0 immediately due.
#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub workspace_id: WorkspaceId,
    pub lead_id: LeadId,
    pub campaign_id: CampaignId,
    pub enrolled_at: DateTime<Utc>,
}

/// Result of an outbox append.
#[derive(Debug)]
pub enum AppendOutcome {
    Recorded(OutreachEvent),
    /// The dedupe key was already present; nothing was written.
    Duplicate,
}

/// Storage seam for the whole pipeline. The relational store behind this
/// trait is the single synchronization point: every check-then-act the
/// scheduler, worker, and event pipeline rely on must execute atomically
/// inside one call.
pub trait OutreachStore: Send + Sync {
    // Leads.
    fn insert_lead(&self, lead: Lead) -> Result<(), StoreError>;
    fn lead(&self, id: &LeadId) -> Result<Option<Lead>, StoreError>;

    // Campaigns and steps.
    fn insert_campaign(&self, campaign: Campaign) -> Result<(), StoreError>;
    fn campaign(&self, id: &CampaignId) -> Result<Option<Campaign>, StoreError>;
    /// Steps ordered by their `order` column.
    fn steps(&self, campaign: &CampaignId) -> Result<Vec<CampaignStep>, StoreError>;
    fn step(&self, id: &StepId) -> Result<Option<CampaignStep>, StoreError>;
    /// Apply a batch edit atomically: matched drafts update, new drafts
    /// create, absent steps delete; a concurrent reader sees either the old
    /// list or the new one, never a mix.
    fn replace_steps(
        &self,
        campaign: &CampaignId,
        drafts: Vec<StepDraft>,
    ) -> Result<StepBatchOutcome, StoreError>;

    // Enrollments.
    /// `Conflict` when the lead already has an open enrollment in the
    /// campaign.
    fn insert_enrollment(
        &self,
        enrollment: NewEnrollment,
    ) -> Result<CampaignEnrollment, StoreError>;
    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<CampaignEnrollment>, StoreError>;
    /// Active enrollments whose next step is due at `now`: `next_step_due_at
    /// <= now`, or null with the cursor still at step 0 (fresh enrollment).
    fn due_enrollments(
        &self,
        workspace: &WorkspaceId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CampaignEnrollment>, StoreError>;
    /// Status change guarded by the enrollment transition table;
    /// `InvalidTransition` otherwise. Leaving Active clears
    /// `next_step_due_at`.
    fn transition_enrollment(
        &self,
        id: &EnrollmentId,
        to: EnrollmentStatus,
    ) -> Result<CampaignEnrollment, StoreError>;
    /// Move the cursor after scheduling a step. Rejected once the
    /// enrollment is no longer Active.
    fn advance_enrollment(
        &self,
        id: &EnrollmentId,
        next_index: u32,
        next_due: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    // Jobs.
    /// `Conflict` when an open (Pending or Sent) job already exists for the
    /// `(enrollment, step)` pair; this is the pipeline's idempotency guard.
    fn insert_job(&self, job: NewJob) -> Result<EmailJob, StoreError>;
    fn open_job_exists(
        &self,
        enrollment: &EnrollmentId,
        step: &StepId,
    ) -> Result<bool, StoreError>;
    /// Any Pending job left for the enrollment (used to hold off completion
    /// while a retry is still outstanding).
    fn pending_job_exists(&self, enrollment: &EnrollmentId) -> Result<bool, StoreError>;
    /// Pending jobs due at `now`, ascending `scheduled_for`.
    fn pending_jobs(
        &self,
        workspace: &WorkspaceId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EmailJob>, StoreError>;
    fn job(&self, id: &JobId) -> Result<Option<EmailJob>, StoreError>;
    /// Persist worker-side mutations. Status changes are guarded by the job
    /// transition table; attempt/error updates keep the stored status.
    fn update_job(&self, job: &EmailJob) -> Result<(), StoreError>;

    // Messages.
    fn insert_message(&self, message: NewMessage) -> Result<EmailMessage, StoreError>;
    fn message_by_provider_id(
        &self,
        id: &ProviderMessageId,
    ) -> Result<Option<EmailMessage>, StoreError>;
    fn message_for_job(&self, job: &JobId) -> Result<Option<EmailMessage>, StoreError>;
    /// Returns whether the move advanced the ledger; regressions are
    /// ignored and report `false`.
    fn advance_message_status(
        &self,
        id: &MessageId,
        to: MessageStatus,
    ) -> Result<bool, StoreError>;

    // Outbox.
    fn append_event(
        &self,
        event: NewEvent,
        recorded_at: DateTime<Utc>,
    ) -> Result<AppendOutcome, StoreError>;
    /// Claim the oldest unprocessed events: stamp `processed_at` and return
    /// them in one atomic operation, so overlapping drains (cron plus
    /// webhook-inline) can never double-apply an event. The SQL equivalent
    /// is `SELECT ... FOR UPDATE SKIP LOCKED` plus the stamp in the same
    /// transaction.
    fn claim_unprocessed_events(
        &self,
        limit: usize,
        claimed_at: DateTime<Utc>,
    ) -> Result<Vec<OutreachEvent>, StoreError>;

    // Sending identities.
    fn upsert_sending_domain(&self, domain: SendingDomain) -> Result<(), StoreError>;
    fn upsert_mailbox(&self, mailbox: Mailbox) -> Result<(), StoreError>;
    /// Mailboxes joined with their domain config; mailboxes on unknown
    /// domains are omitted.
    fn sending_identities(
        &self,
        workspace: &WorkspaceId,
    ) -> Result<Vec<SendingIdentity>, StoreError>;
    /// Bump the daily counters after a successful dispatch.
    fn record_identity_send(&self, mailbox: &MailboxId) -> Result<(), StoreError>;
}
