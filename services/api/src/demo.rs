use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::Args;
use outreach::campaigns::import::{read_roster, RosterRow};
use outreach::campaigns::{
    normalize_webhook, Campaign, CampaignId, EmailProvider, InMemoryOutreachStore, Lead,
    LeadId, OutboundEmail, OutreachService, OutreachSettings, OutreachStore, ProviderError,
    ProviderMessageId, StepDraft, WorkspaceId,
};
use outreach::config::ProviderConfig;
use outreach::error::AppError;
use serde_json::json;

use crate::infra::seed_sending_identity;

#[derive(Args, Debug, Default)]
pub(crate) struct RosterArgs {
    /// Path to a CSV lead roster export
    #[arg(long)]
    pub(crate) path: PathBuf,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Optional CSV lead roster to enroll instead of the built-in sample
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
}

/// Parse a roster export and report what an import would enroll.
pub(crate) fn run_roster_preview(args: RosterArgs) -> Result<(), AppError> {
    let file = std::fs::File::open(&args.path)?;
    let import = read_roster(file).map_err(outreach::campaigns::OutreachError::from)?;

    println!("Roster: {}", args.path.display());
    println!("  importable leads: {}", import.rows.len());
    println!("  skipped rows:     {}", import.skipped);
    for row in import.rows.iter().take(5) {
        println!("  - {} {} <{}> ({})", row.first_name, row.last_name, row.email, row.company);
    }
    if import.rows.len() > 5 {
        println!("  ... and {} more", import.rows.len() - 5);
    }
    Ok(())
}

/// Provider that narrates sends to stdout for the CLI walkthrough.
#[derive(Default)]
struct DemoProvider {
    sequence: AtomicU64,
}

#[async_trait::async_trait]
impl EmailProvider for DemoProvider {
    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, ProviderError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        println!("  -> delivered \"{}\" to {}", email.subject, email.to);
        Ok(ProviderMessageId(format!("demo-{id:04}")))
    }
}

fn builtin_roster() -> Vec<RosterRow> {
    vec![
        RosterRow {
            email: "ada@initech.example".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            company: "Initech".to_string(),
        },
        RosterRow {
            email: "grace@umbrella.example".to_string(),
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            company: "Umbrella".to_string(),
        },
        RosterRow {
            email: "linus@globex.example".to_string(),
            first_name: "Linus".to_string(),
            last_name: "Torvalds".to_string(),
            company: "Globex".to_string(),
        },
    ]
}

/// End-to-end walkthrough: enroll leads, run delivery cycles, and replay
/// provider events so the enrollment ledger is visible from the terminal.
pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let store = Arc::new(InMemoryOutreachStore::default());
    let provider = Arc::new(DemoProvider::default());
    let workspace = WorkspaceId("ws-demo".to_string());
    let campaign = CampaignId("cmp-welcome".to_string());

    let provider_config = ProviderConfig {
        api_key: None,
        base_url: "https://api.resend.com".to_string(),
        from_address: "sales@demo.example".to_string(),
        from_name: "Demo Sales".to_string(),
    };
    seed_sending_identity(store.as_ref(), &workspace, &provider_config)
        .map_err(outreach::campaigns::OutreachError::from)?;

    store
        .insert_campaign(Campaign {
            id: campaign.clone(),
            workspace_id: workspace.clone(),
            name: "Welcome sequence".to_string(),
        })
        .map_err(outreach::campaigns::OutreachError::from)?;
    store
        .replace_steps(
            &campaign,
            vec![
                StepDraft {
                    id: None,
                    subject: "Hello {{first_name}}".to_string(),
                    body: "Curious whether {{company}} could use a hand?".to_string(),
                    delay_minutes: 0,
                },
                StepDraft {
                    id: None,
                    subject: "Following up, {{first_name}}".to_string(),
                    body: "Still happy to walk {{company}} through it.".to_string(),
                    delay_minutes: 1440,
                },
            ],
        )
        .map_err(outreach::campaigns::OutreachError::from)?;

    let rows = match &args.roster {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            let import = read_roster(file).map_err(outreach::campaigns::OutreachError::from)?;
            println!(
                "Imported {} leads from {} ({} rows skipped)",
                import.rows.len(),
                path.display(),
                import.skipped
            );
            import.rows
        }
        None => builtin_roster(),
    };

    let service = OutreachService::new(store.clone(), provider, OutreachSettings::default());
    let t0 = Utc::now();

    let mut enrollments = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let lead_id = LeadId(format!("lead-{:04}", index + 1));
        store
            .insert_lead(Lead {
                id: lead_id.clone(),
                workspace_id: workspace.clone(),
                email: row.email.clone(),
                first_name: row.first_name.clone(),
                last_name: row.last_name.clone(),
                company: row.company.clone(),
            })
            .map_err(outreach::campaigns::OutreachError::from)?;
        let enrollment = service.enroll(&workspace, &campaign, &lead_id, t0)?;
        enrollments.push((row.email.clone(), enrollment.id));
    }
    println!("Enrolled {} leads into \"Welcome sequence\"", enrollments.len());

    println!("\nCycle 1 (step 1 due immediately):");
    let report = service.run_cycle(&workspace, t0).await?;
    println!(
        "  scheduled {} / sent {} / events {}",
        report.schedule.jobs_created, report.dispatch.sent, report.events.processed
    );

    // Replay provider events: the first recipient opens, the second hard
    // bounces. Demo sends are numbered in dispatch order.
    if let Some((email, _)) = enrollments.first() {
        let payload = json!({
            "type": "email.opened",
            "id": "demo-open-1",
            "data": { "email_id": "demo-0001", "to": [email] }
        });
        if let Some(webhook) = normalize_webhook(&payload) {
            service.ingest_webhook(&workspace, &webhook, t0)?;
            println!("\nWebhook: {email} opened the first email");
        }
    }
    if let Some((email, _)) = enrollments.get(1) {
        let payload = json!({
            "type": "email.bounced",
            "id": "demo-bounce-1",
            "data": { "email_id": "demo-0002", "to": [email] }
        });
        if let Some(webhook) = normalize_webhook(&payload) {
            service.ingest_webhook(&workspace, &webhook, t0)?;
            println!("Webhook: {email} hard bounced (suppressed)");
        }
    }

    println!("\nCycle 2 (one day later, follow-up due):");
    let t1 = t0 + Duration::minutes(1441);
    let report = service.run_cycle(&workspace, t1).await?;
    println!(
        "  scheduled {} / sent {} / skipped {}",
        report.schedule.jobs_created, report.dispatch.sent, report.dispatch.skipped
    );

    println!("\nEnrollment ledger:");
    for (email, enrollment_id) in &enrollments {
        let enrollment = store
            .enrollment(enrollment_id)
            .map_err(outreach::campaigns::OutreachError::from)?;
        if let Some(enrollment) = enrollment {
            println!(
                "  {:<28} step {} status {}",
                email,
                enrollment.current_step_index,
                enrollment.status.label()
            );
        }
    }

    Ok(())
}
