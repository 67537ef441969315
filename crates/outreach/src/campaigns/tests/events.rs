use serde_json::json;

use super::common::{fixed_now, fixture_with_steps, Fixture};
use crate::campaigns::domain::{
    EnrollmentId, EnrollmentStatus, EventKind, MessageStatus, ProviderMessageId,
};
use crate::campaigns::store::{NewEvent, OutreachStore};

/// Enroll, schedule, and dispatch one step so a message exists to attach
/// events to. Returns the enrollment and the provider message id.
async fn sent_message(fixture: &Fixture) -> (EnrollmentId, ProviderMessageId) {
    let now = fixed_now();
    let enrollment_id = fixture.enroll(now);
    fixture
        .service
        .schedule_jobs(&fixture.workspace, now)
        .expect("scheduling runs");
    fixture
        .service
        .process_jobs(&fixture.workspace, now)
        .await
        .expect("dispatch runs");
    // Drain the worker's own Sent event so later asserts start clean.
    fixture
        .service
        .process_events(now)
        .expect("initial drain runs");

    let jobs = fixture
        .store
        .pending_jobs(&fixture.workspace, now, 10)
        .expect("jobs listed");
    assert!(jobs.is_empty(), "job should have been dispatched");

    let enrollment = fixture
        .store
        .enrollment(&enrollment_id)
        .expect("fetch succeeds")
        .expect("enrollment present");
    let sent = fixture.provider.sent();
    assert_eq!(sent.len(), 1);

    let provider_id = {
        let job_id = sent[0].tags.get("job_id").expect("job tag present");
        fixture
            .store
            .job(&crate::campaigns::domain::JobId(job_id.clone()))
            .expect("fetch succeeds")
            .expect("job present")
            .sent_message_id
            .expect("provider id recorded")
    };
    (enrollment.id, provider_id)
}

fn emit(fixture: &Fixture, kind: EventKind, provider_id: &ProviderMessageId, dedupe: &str) {
    fixture
        .store
        .append_event(
            NewEvent {
                workspace_id: fixture.workspace.clone(),
                kind,
                job_id: None,
                provider_message_id: Some(provider_id.clone()),
                payload: json!({ "source": "test" }),
                dedupe_key: Some(dedupe.to_string()),
            },
            fixed_now(),
        )
        .expect("event appends");
}

#[tokio::test]
async fn bounce_permanently_suppresses_the_enrollment() {
    let fixture = fixture_with_steps(&[0, 1440]);
    let (enrollment_id, provider_id) = sent_message(&fixture).await;

    emit(&fixture, EventKind::Bounced, &provider_id, "bounce-1");
    let report = fixture
        .service
        .process_events(fixed_now())
        .expect("drain runs");
    assert_eq!(report.processed, 1);
    assert_eq!(report.suppressed, 1);

    let enrollment = fixture
        .store
        .enrollment(&enrollment_id)
        .expect("fetch succeeds")
        .expect("enrollment present");
    assert_eq!(enrollment.status, EnrollmentStatus::Bounced);
    assert!(enrollment.next_step_due_at.is_none());

    let message = fixture
        .store
        .message_by_provider_id(&provider_id)
        .expect("fetch succeeds")
        .expect("message present");
    assert_eq!(message.status, MessageStatus::Bounced);

    // Even long past the old due time, nothing is scheduled again.
    let later = fixed_now() + chrono::Duration::days(7);
    let schedule = fixture
        .service
        .schedule_jobs(&fixture.workspace, later)
        .expect("scheduling runs");
    assert_eq!(schedule.jobs_created, 0);
}

#[tokio::test]
async fn reply_exits_the_sequence() {
    let fixture = fixture_with_steps(&[0, 1440]);
    let (enrollment_id, provider_id) = sent_message(&fixture).await;

    emit(&fixture, EventKind::Replied, &provider_id, "reply-1");
    let report = fixture
        .service
        .process_events(fixed_now())
        .expect("drain runs");
    assert_eq!(report.replied, 1);

    let enrollment = fixture
        .store
        .enrollment(&enrollment_id)
        .expect("fetch succeeds")
        .expect("enrollment present");
    assert_eq!(enrollment.status, EnrollmentStatus::Replied);
}

#[tokio::test]
async fn engagement_events_do_not_touch_the_enrollment() {
    let fixture = fixture_with_steps(&[0, 1440]);
    let (enrollment_id, provider_id) = sent_message(&fixture).await;

    emit(&fixture, EventKind::Opened, &provider_id, "open-1");
    emit(&fixture, EventKind::Clicked, &provider_id, "click-1");
    let report = fixture
        .service
        .process_events(fixed_now())
        .expect("drain runs");
    assert_eq!(report.processed, 2);
    assert_eq!(report.suppressed, 0);

    let enrollment = fixture
        .store
        .enrollment(&enrollment_id)
        .expect("fetch succeeds")
        .expect("enrollment present");
    assert_eq!(enrollment.status, EnrollmentStatus::Active);

    let message = fixture
        .store
        .message_by_provider_id(&provider_id)
        .expect("fetch succeeds")
        .expect("message present");
    assert_eq!(message.status, MessageStatus::Clicked);
}

#[tokio::test]
async fn reprocessing_a_drained_outbox_is_a_noop() {
    let fixture = fixture_with_steps(&[0, 1440]);
    let (enrollment_id, provider_id) = sent_message(&fixture).await;

    emit(&fixture, EventKind::Bounced, &provider_id, "bounce-1");
    fixture
        .service
        .process_events(fixed_now())
        .expect("first drain runs");
    let before = fixture
        .store
        .enrollment(&enrollment_id)
        .expect("fetch succeeds")
        .expect("enrollment present");

    let second = fixture
        .service
        .process_events(fixed_now())
        .expect("second drain runs");
    assert_eq!(second.processed, 0);

    let after = fixture
        .store
        .enrollment(&enrollment_id)
        .expect("fetch succeeds")
        .expect("enrollment present");
    assert_eq!(before, after);
}

#[tokio::test]
async fn unknown_reference_is_an_anomaly_not_an_error() {
    let fixture = fixture_with_steps(&[0]);
    let now = fixed_now();

    emit(
        &fixture,
        EventKind::Delivered,
        &ProviderMessageId("pm-nobody-knows".to_string()),
        "ghost-1",
    );
    let report = fixture.service.process_events(now).expect("drain runs");
    assert_eq!(report.processed, 1);
    assert_eq!(report.anomalies, 1);
    assert_eq!(report.errors, 0);
}

#[tokio::test]
async fn late_reply_after_a_bounce_leaves_the_terminal_state_alone() {
    let fixture = fixture_with_steps(&[0, 1440]);
    let (enrollment_id, provider_id) = sent_message(&fixture).await;

    emit(&fixture, EventKind::Bounced, &provider_id, "bounce-1");
    fixture
        .service
        .process_events(fixed_now())
        .expect("first drain runs");

    emit(&fixture, EventKind::Replied, &provider_id, "reply-1");
    let report = fixture
        .service
        .process_events(fixed_now())
        .expect("second drain runs");
    assert_eq!(report.errors, 0);
    assert_eq!(report.replied, 0);

    let enrollment = fixture
        .store
        .enrollment(&enrollment_id)
        .expect("fetch succeeds")
        .expect("enrollment present");
    assert_eq!(enrollment.status, EnrollmentStatus::Bounced);
}
