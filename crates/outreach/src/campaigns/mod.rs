//! Campaign scheduling, delivery, and provider-event processing.
//!
//! Control flow per cycle: [`scheduler`] turns due enrollments into pending
//! jobs, [`worker`] dispatches them through an [`provider::EmailProvider`],
//! and [`events`] folds provider-reported occurrences from the outbox back
//! into enrollment state. Data flows one way; components only meet in the
//! [`store::OutreachStore`].

pub mod domain;
pub mod events;
pub mod import;
pub mod memory;
pub mod provider;
pub mod render;
pub mod router;
pub mod scheduler;
pub mod service;
pub mod steps;
pub mod store;
pub mod webhook;
pub mod worker;

#[cfg(test)]
mod tests;

pub use domain::{
    Campaign, CampaignEnrollment, CampaignId, CampaignStep, EmailJob, EmailMessage,
    EnrollmentId, EnrollmentStatus, EventId, EventKind, JobId, JobStatus, Lead, LeadId,
    Mailbox, MailboxId, MessageId, MessageStatus, OutreachEvent, ProviderMessageId,
    SendingDomain, SendingIdentity, StepId, WorkspaceId,
};
pub use events::{EventPipeline, EventReport};
pub use memory::InMemoryOutreachStore;
pub use provider::{EmailProvider, OutboundEmail, ProviderError};
pub use router::{outreach_router, OutreachApi};
pub use scheduler::{ScheduleReport, Scheduler};
pub use service::{CycleReport, OutreachError, OutreachService, OutreachSettings};
pub use steps::{diff_steps, StepBatchOutcome, StepDraft};
pub use store::{AppendOutcome, NewEnrollment, NewEvent, NewJob, OutreachStore, StoreError};
pub use webhook::{normalize_tags, normalize_webhook, NormalizedWebhookEvent};
pub use worker::{DispatchReport, Worker};
