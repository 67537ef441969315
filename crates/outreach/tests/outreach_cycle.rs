use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use outreach::campaigns::{
    normalize_webhook, Campaign, CampaignId, EmailProvider, EnrollmentStatus,
    InMemoryOutreachStore, JobStatus, Lead, LeadId, Mailbox, MailboxId, MessageStatus,
    OutboundEmail, OutreachService, OutreachSettings, OutreachStore, ProviderError,
    ProviderMessageId, SendingDomain, StepDraft, WorkspaceId,
};

#[derive(Default)]
struct RecordingProvider {
    sent: Mutex<Vec<OutboundEmail>>,
    sequence: AtomicU64,
}

impl RecordingProvider {
    fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().expect("provider mutex poisoned").clone()
    }
}

#[async_trait::async_trait]
impl EmailProvider for RecordingProvider {
    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, ProviderError> {
        self.sent
            .lock()
            .expect("provider mutex poisoned")
            .push(email.clone());
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(ProviderMessageId(format!("pm-{id:04}")))
    }
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0)
        .single()
        .expect("valid timestamp")
}

struct Harness {
    store: Arc<InMemoryOutreachStore>,
    provider: Arc<RecordingProvider>,
    service: OutreachService<InMemoryOutreachStore, RecordingProvider>,
    workspace: WorkspaceId,
    campaign: CampaignId,
    lead: LeadId,
}

fn harness(delays: &[i64]) -> Harness {
    let store = Arc::new(InMemoryOutreachStore::default());
    let provider = Arc::new(RecordingProvider::default());
    let workspace = WorkspaceId("ws-acme".to_string());
    let campaign = CampaignId("cmp-welcome".to_string());
    let lead = LeadId("lead-ada".to_string());

    store
        .insert_campaign(Campaign {
            id: campaign.clone(),
            workspace_id: workspace.clone(),
            name: "Welcome sequence".to_string(),
        })
        .expect("campaign inserts");
    store
        .replace_steps(
            &campaign,
            delays
                .iter()
                .enumerate()
                .map(|(index, delay)| StepDraft {
                    id: None,
                    subject: format!("Checking in, {{{{first_name}}}} ({})", index + 1),
                    body: "Would {{company}} benefit from a chat?".to_string(),
                    delay_minutes: *delay,
                })
                .collect(),
        )
        .expect("steps install");
    store
        .insert_lead(Lead {
            id: lead.clone(),
            workspace_id: workspace.clone(),
            email: "ada@initech.example".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            company: "Initech".to_string(),
        })
        .expect("lead inserts");
    store
        .upsert_sending_domain(SendingDomain {
            domain: "mail.acme.example".to_string(),
            workspace_id: workspace.clone(),
            dkim_verified: true,
            spf_verified: true,
            dmarc_verified: true,
            daily_limit: 500,
            sent_today: 0,
        })
        .expect("domain upserts");
    store
        .upsert_mailbox(Mailbox {
            id: MailboxId("mbx-sales".to_string()),
            workspace_id: workspace.clone(),
            address: "sales@mail.acme.example".to_string(),
            domain: "mail.acme.example".to_string(),
            display_name: "Acme Sales".to_string(),
            active: true,
            daily_limit: 200,
            sent_today: 0,
        })
        .expect("mailbox upserts");

    let service = OutreachService::new(
        store.clone(),
        provider.clone(),
        OutreachSettings::default(),
    );

    Harness {
        store,
        provider,
        service,
        workspace,
        campaign,
        lead,
    }
}

#[tokio::test]
async fn two_step_sequence_bounces_out_after_the_first_send() {
    let harness = harness(&[0, 1440]);
    let t0 = start_time();

    let enrollment = harness
        .service
        .enroll(&harness.workspace, &harness.campaign, &harness.lead, t0)
        .expect("lead enrolls");

    // Cycle 1: step 0 is scheduled and dispatched.
    let report = harness
        .service
        .run_cycle(&harness.workspace, t0)
        .await
        .expect("cycle runs");
    assert_eq!(report.schedule.jobs_created, 1);
    assert_eq!(report.dispatch.sent, 1);

    let after_first = harness
        .store
        .enrollment(&enrollment.id)
        .expect("fetch succeeds")
        .expect("enrollment present");
    assert_eq!(after_first.current_step_index, 1);
    assert_eq!(after_first.next_step_due_at, Some(t0 + Duration::minutes(1440)));

    let sent = harness.provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Checking in, Ada (1)");

    // The provider reports a hard bounce for that message.
    let job_tag = sent[0].tags.get("job_id").expect("job tag present").clone();
    let provider_id = harness
        .store
        .job(&outreach::campaigns::JobId(job_tag.clone()))
        .expect("fetch succeeds")
        .expect("job present")
        .sent_message_id
        .expect("provider id recorded");

    let payload = json!({
        "type": "email.bounced",
        "id": "wh-bounce-1",
        "data": {
            "email_id": provider_id.0,
            "to": ["ada@initech.example"],
            "tags": [
                { "name": "job_id", "value": job_tag },
                { "name": "workspace_id", "value": "ws-acme" }
            ]
        }
    });
    let webhook = normalize_webhook(&payload).expect("bounce maps");
    harness
        .service
        .ingest_webhook(&harness.workspace, &webhook, t0 + Duration::minutes(5))
        .expect("webhook ingests");

    let suppressed = harness
        .store
        .enrollment(&enrollment.id)
        .expect("fetch succeeds")
        .expect("enrollment present");
    assert_eq!(suppressed.status, EnrollmentStatus::Bounced);

    let message = harness
        .store
        .message_by_provider_id(&provider_id)
        .expect("fetch succeeds")
        .expect("message present");
    assert_eq!(message.status, MessageStatus::Bounced);

    // Cycle 2, past the step-1 due time: nothing new is produced.
    let t1 = t0 + Duration::minutes(1500);
    let report = harness
        .service
        .run_cycle(&harness.workspace, t1)
        .await
        .expect("cycle runs");
    assert_eq!(report.schedule.jobs_created, 0);
    assert_eq!(report.dispatch.sent, 0);
    assert_eq!(harness.provider.sent().len(), 1);
}

#[tokio::test]
async fn repeated_cycles_with_no_time_elapsed_send_exactly_once() {
    let harness = harness(&[0, 60]);
    let t0 = start_time();
    harness
        .service
        .enroll(&harness.workspace, &harness.campaign, &harness.lead, t0)
        .expect("lead enrolls");

    for _ in 0..3 {
        harness
            .service
            .run_cycle(&harness.workspace, t0)
            .await
            .expect("cycle runs");
    }

    assert_eq!(harness.provider.sent().len(), 1);
}

#[tokio::test]
async fn full_sequence_completes_and_stays_completed() {
    let harness = harness(&[0, 60]);
    let t0 = start_time();
    let enrollment = harness
        .service
        .enroll(&harness.workspace, &harness.campaign, &harness.lead, t0)
        .expect("lead enrolls");

    harness
        .service
        .run_cycle(&harness.workspace, t0)
        .await
        .expect("first cycle runs");
    let t1 = t0 + Duration::minutes(60);
    harness
        .service
        .run_cycle(&harness.workspace, t1)
        .await
        .expect("second cycle runs");
    assert_eq!(harness.provider.sent().len(), 2);

    // The pass after the final send completes the enrollment.
    let t2 = t1 + Duration::minutes(1);
    harness
        .service
        .run_cycle(&harness.workspace, t2)
        .await
        .expect("third cycle runs");
    let completed = harness
        .store
        .enrollment(&enrollment.id)
        .expect("fetch succeeds")
        .expect("enrollment present");
    assert_eq!(completed.status, EnrollmentStatus::Completed);

    let t3 = t2 + Duration::days(30);
    let report = harness
        .service
        .run_cycle(&harness.workspace, t3)
        .await
        .expect("fourth cycle runs");
    assert_eq!(report.schedule.jobs_created, 0);
    assert_eq!(harness.provider.sent().len(), 2);
}

#[tokio::test]
async fn duplicate_webhook_delivery_changes_nothing_on_the_second_pass() {
    let harness = harness(&[0, 1440]);
    let t0 = start_time();
    let enrollment = harness
        .service
        .enroll(&harness.workspace, &harness.campaign, &harness.lead, t0)
        .expect("lead enrolls");
    harness
        .service
        .run_cycle(&harness.workspace, t0)
        .await
        .expect("cycle runs");

    let sent = harness.provider.sent();
    let provider_id = {
        let job_tag = sent[0].tags.get("job_id").expect("job tag present");
        harness
            .store
            .job(&outreach::campaigns::JobId(job_tag.clone()))
            .expect("fetch succeeds")
            .expect("job present")
            .sent_message_id
            .expect("provider id recorded")
    };

    let payload = json!({
        "type": "email.complained",
        "id": "wh-spam-1",
        "data": { "email_id": provider_id.0 }
    });
    let webhook = normalize_webhook(&payload).expect("complaint maps");

    harness
        .service
        .ingest_webhook(&harness.workspace, &webhook, t0)
        .expect("first delivery ingests");
    let first = harness
        .store
        .enrollment(&enrollment.id)
        .expect("fetch succeeds")
        .expect("enrollment present");

    // Redelivery: same webhook id, same payload.
    harness
        .service
        .ingest_webhook(&harness.workspace, &webhook, t0 + Duration::minutes(1))
        .expect("second delivery ingests");
    let second = harness
        .store
        .enrollment(&enrollment.id)
        .expect("fetch succeeds")
        .expect("enrollment present");

    assert_eq!(first.status, EnrollmentStatus::Bounced);
    assert_eq!(first, second);
}

#[tokio::test]
async fn replacing_steps_mid_flight_reshapes_the_remaining_sequence() {
    let harness = harness(&[0, 1440]);
    let t0 = start_time();
    harness
        .service
        .enroll(&harness.workspace, &harness.campaign, &harness.lead, t0)
        .expect("lead enrolls");
    harness
        .service
        .run_cycle(&harness.workspace, t0)
        .await
        .expect("cycle runs");

    // Editor drops the follow-up step entirely.
    let steps = harness.store.steps(&harness.campaign).expect("steps listed");
    let keep_first = steps[0].id.clone();
    let outcome = harness
        .service
        .replace_steps(
            &harness.campaign,
            vec![StepDraft {
                id: Some(keep_first),
                subject: "Checking in, {{first_name}} (1)".to_string(),
                body: "Would {{company}} benefit from a chat?".to_string(),
                delay_minutes: 0,
            }],
        )
        .expect("batch applies");
    assert_eq!(outcome.deleted, 1);

    // The enrollment's cursor now points past the shortened sequence, so it
    // completes instead of sending the removed step.
    let t1 = t0 + Duration::minutes(1500);
    let report = harness
        .service
        .run_cycle(&harness.workspace, t1)
        .await
        .expect("cycle runs");
    assert_eq!(report.schedule.jobs_created, 0);
    assert_eq!(report.schedule.completed, 1);
    assert_eq!(harness.provider.sent().len(), 1);
}

#[tokio::test]
async fn worker_skip_leaves_a_terminal_skipped_job() {
    let harness = harness(&[0]);
    let t0 = start_time();
    let enrollment = harness
        .service
        .enroll(&harness.workspace, &harness.campaign, &harness.lead, t0)
        .expect("lead enrolls");

    harness
        .service
        .schedule_jobs(&harness.workspace, t0)
        .expect("scheduling runs");
    let job_id = harness
        .store
        .pending_jobs(&harness.workspace, t0, 10)
        .expect("jobs listed")
        .remove(0)
        .id;

    harness
        .store
        .transition_enrollment(&enrollment.id, EnrollmentStatus::Paused)
        .expect("pause allowed");

    let report = harness
        .service
        .process_jobs(&harness.workspace, t0)
        .await
        .expect("dispatch runs");
    assert_eq!(report.skipped, 1);
    assert!(harness.provider.sent().is_empty());

    let job = harness
        .store
        .job(&job_id)
        .expect("fetch succeeds")
        .expect("job present");
    assert_eq!(job.status, JobStatus::Skipped);
    assert!(job
        .last_error
        .as_deref()
        .is_some_and(|reason| reason.contains("active")));
}
