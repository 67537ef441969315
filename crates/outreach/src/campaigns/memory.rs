use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    Campaign, CampaignEnrollment, CampaignId, CampaignStep, EmailJob, EmailMessage,
    EnrollmentId, EnrollmentStatus, EventId, JobId, JobStatus, Lead, LeadId, Mailbox,
    MailboxId, MessageId, MessageStatus, OutreachEvent, ProviderMessageId, SendingDomain,
    SendingIdentity, StepId, WorkspaceId,
};
use super::steps::{diff_steps, StepBatchOutcome, StepDraft};
use super::store::{
    AppendOutcome, NewEnrollment, NewEvent, NewJob, NewMessage, OutreachStore, StoreError,
};

#[derive(Default)]
struct State {
    leads: HashMap<LeadId, Lead>,
    campaigns: HashMap<CampaignId, Campaign>,
    steps: HashMap<StepId, CampaignStep>,
    enrollments: HashMap<EnrollmentId, CampaignEnrollment>,
    jobs: HashMap<JobId, EmailJob>,
    messages: HashMap<MessageId, EmailMessage>,
    events: Vec<OutreachEvent>,
    dedupe_keys: HashSet<String>,
    domains: HashMap<String, SendingDomain>,
    mailboxes: HashMap<MailboxId, Mailbox>,
    sequence: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{:06}", self.sequence)
    }
}

/// Mutex-backed [`OutreachStore`]. Every trait call runs under one lock, so
/// each check-then-act sequence is atomic, the in-memory stand-in for the
/// row locking a relational store would provide.
#[derive(Default, Clone)]
pub struct InMemoryOutreachStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryOutreachStore {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("store mutex poisoned")
    }
}

impl OutreachStore for InMemoryOutreachStore {
    fn insert_lead(&self, lead: Lead) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.leads.contains_key(&lead.id) {
            return Err(StoreError::Conflict);
        }
        state.leads.insert(lead.id.clone(), lead);
        Ok(())
    }

    fn lead(&self, id: &LeadId) -> Result<Option<Lead>, StoreError> {
        Ok(self.lock().leads.get(id).cloned())
    }

    fn insert_campaign(&self, campaign: Campaign) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.campaigns.contains_key(&campaign.id) {
            return Err(StoreError::Conflict);
        }
        state.campaigns.insert(campaign.id.clone(), campaign);
        Ok(())
    }

    fn campaign(&self, id: &CampaignId) -> Result<Option<Campaign>, StoreError> {
        Ok(self.lock().campaigns.get(id).cloned())
    }

    fn steps(&self, campaign: &CampaignId) -> Result<Vec<CampaignStep>, StoreError> {
        let state = self.lock();
        let mut steps: Vec<CampaignStep> = state
            .steps
            .values()
            .filter(|step| &step.campaign_id == campaign)
            .cloned()
            .collect();
        steps.sort_by_key(|step| step.order);
        Ok(steps)
    }

    fn step(&self, id: &StepId) -> Result<Option<CampaignStep>, StoreError> {
        Ok(self.lock().steps.get(id).cloned())
    }

    fn replace_steps(
        &self,
        campaign: &CampaignId,
        drafts: Vec<StepDraft>,
    ) -> Result<StepBatchOutcome, StoreError> {
        let mut state = self.lock();
        if !state.campaigns.contains_key(campaign) {
            return Err(StoreError::NotFound);
        }

        let mut existing: Vec<CampaignStep> = state
            .steps
            .values()
            .filter(|step| &step.campaign_id == campaign)
            .cloned()
            .collect();
        existing.sort_by_key(|step| step.order);

        let plan = diff_steps(&existing, &drafts);
        let outcome = plan.outcome();

        for id in &plan.delete {
            state.steps.remove(id);
        }
        for planned in plan.upserts {
            let id = match planned.existing_id {
                Some(id) => id,
                None => StepId(state.next_id("step")),
            };
            state.steps.insert(
                id.clone(),
                CampaignStep {
                    id,
                    campaign_id: campaign.clone(),
                    order: planned.order,
                    subject: planned.subject,
                    body: planned.body,
                    delay_minutes: planned.delay_minutes,
                },
            );
        }

        Ok(outcome)
    }

    fn insert_enrollment(
        &self,
        enrollment: NewEnrollment,
    ) -> Result<CampaignEnrollment, StoreError> {
        let mut state = self.lock();
        if !state.leads.contains_key(&enrollment.lead_id)
            || !state.campaigns.contains_key(&enrollment.campaign_id)
        {
            return Err(StoreError::NotFound);
        }
        let open_exists = state.enrollments.values().any(|existing| {
            existing.lead_id == enrollment.lead_id
                && existing.campaign_id == enrollment.campaign_id
                && !existing.status.is_terminal()
        });
        if open_exists {
            return Err(StoreError::Conflict);
        }

        let id = EnrollmentId(state.next_id("enr"));
        let record = CampaignEnrollment {
            id: id.clone(),
            workspace_id: enrollment.workspace_id,
            lead_id: enrollment.lead_id,
            campaign_id: enrollment.campaign_id,
            current_step_index: 0,
            status: EnrollmentStatus::Active,
            enrolled_at: enrollment.enrolled_at,
            next_step_due_at: None,
        };
        state.enrollments.insert(id, record.clone());
        Ok(record)
    }

    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<CampaignEnrollment>, StoreError> {
        Ok(self.lock().enrollments.get(id).cloned())
    }

    fn due_enrollments(
        &self,
        workspace: &WorkspaceId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CampaignEnrollment>, StoreError> {
        let state = self.lock();
        let mut due: Vec<CampaignEnrollment> = state
            .enrollments
            .values()
            .filter(|enrollment| {
                &enrollment.workspace_id == workspace
                    && enrollment.status == EnrollmentStatus::Active
                    && match enrollment.next_step_due_at {
                        Some(due_at) => due_at <= now,
                        None => enrollment.current_step_index == 0,
                    }
            })
            .cloned()
            .collect();
        due.sort_by_key(|enrollment| {
            (
                enrollment.next_step_due_at.unwrap_or(enrollment.enrolled_at),
                enrollment.id.0.clone(),
            )
        });
        due.truncate(limit);
        Ok(due)
    }

    fn transition_enrollment(
        &self,
        id: &EnrollmentId,
        to: EnrollmentStatus,
    ) -> Result<CampaignEnrollment, StoreError> {
        let mut state = self.lock();
        let enrollment = state.enrollments.get_mut(id).ok_or(StoreError::NotFound)?;
        if !enrollment.status.can_transition(to) {
            return Err(StoreError::InvalidTransition {
                from: enrollment.status.label().to_string(),
                to: to.label().to_string(),
            });
        }
        enrollment.status = to;
        if to != EnrollmentStatus::Active {
            enrollment.next_step_due_at = None;
        }
        Ok(enrollment.clone())
    }

    fn advance_enrollment(
        &self,
        id: &EnrollmentId,
        next_index: u32,
        next_due: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let enrollment = state.enrollments.get_mut(id).ok_or(StoreError::NotFound)?;
        if enrollment.status != EnrollmentStatus::Active {
            return Err(StoreError::InvalidTransition {
                from: enrollment.status.label().to_string(),
                to: "advanced cursor".to_string(),
            });
        }
        enrollment.current_step_index = next_index;
        enrollment.next_step_due_at = next_due;
        Ok(())
    }

    fn insert_job(&self, job: NewJob) -> Result<EmailJob, StoreError> {
        let mut state = self.lock();
        let open_exists = state.jobs.values().any(|existing| {
            existing.enrollment_id == job.enrollment_id
                && existing.step_id == job.step_id
                && matches!(existing.status, JobStatus::Pending | JobStatus::Sent)
        });
        if open_exists {
            return Err(StoreError::Conflict);
        }

        let id = JobId(state.next_id("job"));
        let record = EmailJob {
            id: id.clone(),
            workspace_id: job.workspace_id,
            lead_id: job.lead_id,
            campaign_id: job.campaign_id,
            step_id: job.step_id,
            enrollment_id: job.enrollment_id,
            scheduled_for: job.scheduled_for,
            status: JobStatus::Pending,
            attempts: 0,
            last_error: None,
            sent_message_id: None,
        };
        state.jobs.insert(id, record.clone());
        Ok(record)
    }

    fn open_job_exists(
        &self,
        enrollment: &EnrollmentId,
        step: &StepId,
    ) -> Result<bool, StoreError> {
        let state = self.lock();
        Ok(state.jobs.values().any(|job| {
            &job.enrollment_id == enrollment
                && &job.step_id == step
                && matches!(job.status, JobStatus::Pending | JobStatus::Sent)
        }))
    }

    fn pending_job_exists(&self, enrollment: &EnrollmentId) -> Result<bool, StoreError> {
        let state = self.lock();
        Ok(state
            .jobs
            .values()
            .any(|job| &job.enrollment_id == enrollment && job.status == JobStatus::Pending))
    }

    fn pending_jobs(
        &self,
        workspace: &WorkspaceId,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EmailJob>, StoreError> {
        let state = self.lock();
        let mut jobs: Vec<EmailJob> = state
            .jobs
            .values()
            .filter(|job| {
                &job.workspace_id == workspace
                    && job.status == JobStatus::Pending
                    && job.scheduled_for <= now
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|job| (job.scheduled_for, job.id.0.clone()));
        jobs.truncate(limit);
        Ok(jobs)
    }

    fn job(&self, id: &JobId) -> Result<Option<EmailJob>, StoreError> {
        Ok(self.lock().jobs.get(id).cloned())
    }

    fn update_job(&self, job: &EmailJob) -> Result<(), StoreError> {
        let mut state = self.lock();
        let stored = state.jobs.get_mut(&job.id).ok_or(StoreError::NotFound)?;
        if stored.status != job.status && !stored.status.can_transition(job.status) {
            return Err(StoreError::InvalidTransition {
                from: stored.status.label().to_string(),
                to: job.status.label().to_string(),
            });
        }
        *stored = job.clone();
        Ok(())
    }

    fn insert_message(&self, message: NewMessage) -> Result<EmailMessage, StoreError> {
        let mut state = self.lock();
        let id = MessageId(state.next_id("msg"));
        let record = EmailMessage {
            id: id.clone(),
            workspace_id: message.workspace_id,
            job_id: message.job_id,
            lead_id: message.lead_id,
            to: message.to,
            subject: message.subject,
            provider_message_id: message.provider_message_id,
            status: MessageStatus::Sent,
            sent_at: message.sent_at,
        };
        state.messages.insert(id, record.clone());
        Ok(record)
    }

    fn message_by_provider_id(
        &self,
        id: &ProviderMessageId,
    ) -> Result<Option<EmailMessage>, StoreError> {
        let state = self.lock();
        Ok(state
            .messages
            .values()
            .find(|message| &message.provider_message_id == id)
            .cloned())
    }

    fn message_for_job(&self, job: &JobId) -> Result<Option<EmailMessage>, StoreError> {
        let state = self.lock();
        Ok(state
            .messages
            .values()
            .find(|message| &message.job_id == job)
            .cloned())
    }

    fn advance_message_status(
        &self,
        id: &MessageId,
        to: MessageStatus,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let message = state.messages.get_mut(id).ok_or(StoreError::NotFound)?;
        if message.status.advances_to(to) {
            message.status = to;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn append_event(
        &self,
        event: NewEvent,
        recorded_at: DateTime<Utc>,
    ) -> Result<AppendOutcome, StoreError> {
        let mut state = self.lock();
        if let Some(key) = &event.dedupe_key {
            if !state.dedupe_keys.insert(key.clone()) {
                return Ok(AppendOutcome::Duplicate);
            }
        }

        let id = EventId(state.next_id("evt"));
        let record = OutreachEvent {
            id,
            workspace_id: event.workspace_id,
            kind: event.kind,
            job_id: event.job_id,
            provider_message_id: event.provider_message_id,
            payload: event.payload,
            dedupe_key: event.dedupe_key,
            recorded_at,
            processed_at: None,
        };
        state.events.push(record.clone());
        Ok(AppendOutcome::Recorded(record))
    }

    fn claim_unprocessed_events(
        &self,
        limit: usize,
        claimed_at: DateTime<Utc>,
    ) -> Result<Vec<OutreachEvent>, StoreError> {
        let mut state = self.lock();
        let mut claimed = Vec::new();
        for event in state.events.iter_mut() {
            if claimed.len() == limit {
                break;
            }
            if event.processed_at.is_none() {
                event.processed_at = Some(claimed_at);
                claimed.push(event.clone());
            }
        }
        Ok(claimed)
    }

    fn upsert_sending_domain(&self, domain: SendingDomain) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.domains.insert(domain.domain.clone(), domain);
        Ok(())
    }

    fn upsert_mailbox(&self, mailbox: Mailbox) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.mailboxes.insert(mailbox.id.clone(), mailbox);
        Ok(())
    }

    fn sending_identities(
        &self,
        workspace: &WorkspaceId,
    ) -> Result<Vec<SendingIdentity>, StoreError> {
        let state = self.lock();
        let mut identities: Vec<SendingIdentity> = state
            .mailboxes
            .values()
            .filter(|mailbox| &mailbox.workspace_id == workspace)
            .filter_map(|mailbox| {
                state.domains.get(&mailbox.domain).map(|domain| SendingIdentity {
                    mailbox: mailbox.clone(),
                    domain: domain.clone(),
                })
            })
            .collect();
        identities.sort_by_key(|identity| identity.mailbox.id.0.clone());
        Ok(identities)
    }

    fn record_identity_send(&self, mailbox: &MailboxId) -> Result<(), StoreError> {
        let mut state = self.lock();
        let domain_name = {
            let mailbox = state.mailboxes.get_mut(mailbox).ok_or(StoreError::NotFound)?;
            mailbox.sent_today += 1;
            mailbox.domain.clone()
        };
        if let Some(domain) = state.domains.get_mut(&domain_name) {
            domain.sent_today += 1;
        }
        Ok(())
    }
}
