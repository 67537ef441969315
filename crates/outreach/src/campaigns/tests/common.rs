use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use crate::campaigns::domain::{
    Campaign, CampaignId, EnrollmentId, Lead, LeadId, Mailbox, MailboxId, ProviderMessageId,
    SendingDomain, WorkspaceId,
};
use crate::campaigns::memory::InMemoryOutreachStore;
use crate::campaigns::provider::{EmailProvider, OutboundEmail, ProviderError};
use crate::campaigns::service::{OutreachService, OutreachSettings};
use crate::campaigns::steps::StepDraft;
use crate::campaigns::store::OutreachStore;

pub(crate) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Recording provider with a scriptable failure queue; an empty queue means
/// every send succeeds.
#[derive(Default)]
pub(crate) struct MockProvider {
    sent: Mutex<Vec<OutboundEmail>>,
    failures: Mutex<VecDeque<ProviderError>>,
    sequence: AtomicU64,
}

impl MockProvider {
    pub(crate) fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().expect("mock mutex poisoned").clone()
    }

    pub(crate) fn push_failure(&self, error: ProviderError) {
        self.failures
            .lock()
            .expect("mock mutex poisoned")
            .push_back(error);
    }
}

#[async_trait::async_trait]
impl EmailProvider for MockProvider {
    async fn send(&self, email: &OutboundEmail) -> Result<ProviderMessageId, ProviderError> {
        if let Some(error) = self
            .failures
            .lock()
            .expect("mock mutex poisoned")
            .pop_front()
        {
            return Err(error);
        }

        self.sent
            .lock()
            .expect("mock mutex poisoned")
            .push(email.clone());
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(ProviderMessageId(format!("pm-{id:04}")))
    }
}

pub(crate) struct Fixture {
    pub(crate) store: Arc<InMemoryOutreachStore>,
    pub(crate) provider: Arc<MockProvider>,
    pub(crate) service: OutreachService<InMemoryOutreachStore, MockProvider>,
    pub(crate) workspace: WorkspaceId,
    pub(crate) campaign: CampaignId,
    pub(crate) lead: LeadId,
}

impl Fixture {
    pub(crate) fn enroll(&self, now: DateTime<Utc>) -> EnrollmentId {
        self.service
            .enroll(&self.workspace, &self.campaign, &self.lead, now)
            .expect("lead enrolls")
            .id
    }

    pub(crate) fn add_lead(&self, id: &str, email: &str) -> LeadId {
        let lead_id = LeadId(id.to_string());
        self.store
            .insert_lead(Lead {
                id: lead_id.clone(),
                workspace_id: self.workspace.clone(),
                email: email.to_string(),
                first_name: "Grace".to_string(),
                last_name: "Hopper".to_string(),
                company: "Eckert-Mauchly".to_string(),
            })
            .expect("extra lead inserts");
        lead_id
    }
}

/// Store seeded with one workspace, one verified identity, one campaign
/// (steps built from `delays`), and one lead.
pub(crate) fn fixture_with_steps(delays: &[i64]) -> Fixture {
    fixture(delays, true)
}

/// Same as [`fixture_with_steps`] but with no sending identity configured.
pub(crate) fn fixture_without_identity(delays: &[i64]) -> Fixture {
    fixture(delays, false)
}

fn fixture(delays: &[i64], with_identity: bool) -> Fixture {
    let store = Arc::new(InMemoryOutreachStore::default());
    let provider = Arc::new(MockProvider::default());
    let workspace = WorkspaceId("ws-test".to_string());
    let campaign = CampaignId("cmp-welcome".to_string());
    let lead = LeadId("lead-ada".to_string());

    store
        .insert_campaign(Campaign {
            id: campaign.clone(),
            workspace_id: workspace.clone(),
            name: "Welcome sequence".to_string(),
        })
        .expect("campaign inserts");

    let drafts = delays
        .iter()
        .enumerate()
        .map(|(index, delay)| StepDraft {
            id: None,
            subject: format!("Hello {{{{first_name}}}} ({})", index + 1),
            body: format!("Step {} for {{{{company}}}}.", index + 1),
            delay_minutes: *delay,
        })
        .collect();
    store
        .replace_steps(&campaign, drafts)
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

    if with_identity {
        seed_identity(&store, &workspace, 1000);
    }

    let service = OutreachService::new(
        store.clone(),
        provider.clone(),
        OutreachSettings::default(),
    );

    Fixture {
        store,
        provider,
        service,
        workspace,
        campaign,
        lead,
    }
}

pub(crate) fn seed_identity(
    store: &InMemoryOutreachStore,
    workspace: &WorkspaceId,
    daily_limit: u32,
) {
    store
        .upsert_sending_domain(SendingDomain {
            domain: "mail.test.example".to_string(),
            workspace_id: workspace.clone(),
            dkim_verified: true,
            spf_verified: true,
            dmarc_verified: true,
            daily_limit,
            sent_today: 0,
        })
        .expect("domain upserts");
    store
        .upsert_mailbox(Mailbox {
            id: MailboxId("mbx-test".to_string()),
            workspace_id: workspace.clone(),
            address: "outreach@mail.test.example".to_string(),
            domain: "mail.test.example".to_string(),
            display_name: "Outreach".to_string(),
            active: true,
            daily_limit,
            sent_today: 0,
        })
        .expect("mailbox upserts");
}
