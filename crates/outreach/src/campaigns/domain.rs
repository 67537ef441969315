use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for the tenant workspace a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceId(pub String);

/// Identifier wrapper for leads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadId(pub String);

/// Identifier wrapper for campaigns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(pub String);

/// Identifier wrapper for campaign steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

/// Identifier wrapper for campaign enrollments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentId(pub String);

/// Identifier wrapper for email jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

/// Identifier wrapper for outbound message records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Identifier wrapper for outbox events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

/// Identifier wrapper for sending mailboxes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MailboxId(pub String);

/// Correlation id assigned by the email provider to an accepted send.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderMessageId(pub String);

/// A lead's run through one campaign's step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Paused,
    Completed,
    Bounced,
    Replied,
}

impl EnrollmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Bounced => "bounced",
            Self::Replied => "replied",
        }
    }

    /// Completed, Bounced, and Replied are final; nothing transitions out.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Bounced | Self::Replied)
    }

    /// Transition table for enrollment status. Anything not listed here is
    /// rejected by the store and logged by the event pipeline.
    pub fn can_transition(self, to: Self) -> bool {
        match self {
            Self::Active => matches!(
                to,
                Self::Paused | Self::Completed | Self::Bounced | Self::Replied
            ),
            Self::Paused => matches!(to, Self::Active | Self::Bounced | Self::Replied),
            Self::Completed | Self::Bounced | Self::Replied => false,
        }
    }
}

/// Lifecycle of one scheduled send. Pending is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Sent,
    Failed,
    Skipped,
}

impl JobStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn can_transition(self, to: Self) -> bool {
        match self {
            Self::Pending => matches!(to, Self::Sent | Self::Failed | Self::Skipped),
            Self::Sent | Self::Failed | Self::Skipped => false,
        }
    }
}

/// Delivery ledger status for one outbound message.
///
/// Engagement advances monotonically (`Sent -> Delivered -> Opened ->
/// Clicked -> Replied`); `Bounced` and `Complained` are terminal overrides
/// reachable from any non-terminal status. Regressions reported by the
/// provider (e.g. a late `Delivered` after an `Opened`) are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Replied,
    Bounced,
    Complained,
}

impl MessageStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Replied => "replied",
            Self::Bounced => "bounced",
            Self::Complained => "complained",
        }
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Sent => 0,
            Self::Delivered => 1,
            Self::Opened => 2,
            Self::Clicked => 3,
            Self::Replied => 4,
            Self::Bounced | Self::Complained => 5,
        }
    }

    pub fn advances_to(self, to: Self) -> bool {
        if matches!(self, Self::Bounced | Self::Complained) {
            return false;
        }
        if matches!(to, Self::Bounced | Self::Complained) {
            return true;
        }
        to.rank() > self.rank()
    }
}

/// One provider-reported occurrence recorded in the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
    Complained,
    Replied,
}

impl EventKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Bounced => "bounced",
            Self::Complained => "complained",
            Self::Replied => "replied",
        }
    }

    /// Delivery-ledger status this event moves a message towards.
    pub const fn message_status(self) -> MessageStatus {
        match self {
            Self::Sent => MessageStatus::Sent,
            Self::Delivered => MessageStatus::Delivered,
            Self::Opened => MessageStatus::Opened,
            Self::Clicked => MessageStatus::Clicked,
            Self::Bounced => MessageStatus::Bounced,
            Self::Complained => MessageStatus::Complained,
            Self::Replied => MessageStatus::Replied,
        }
    }
}

/// A person being worked through outreach campaigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub workspace_id: WorkspaceId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
}

/// A sequence of message steps leads are enrolled into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub workspace_id: WorkspaceId,
    pub name: String,
}

/// One message template in a campaign's sequence.
///
/// `delay_minutes` offsets the step from the previous one (or from the
/// enrollment for step 0). Steps are edited only through the batch-replace
/// endpoint, never individually.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStep {
    pub id: StepId,
    pub campaign_id: CampaignId,
    pub order: u32,
    pub subject: String,
    pub body: String,
    pub delay_minutes: i64,
}

/// A lead's participation in one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignEnrollment {
    pub id: EnrollmentId,
    pub workspace_id: WorkspaceId,
    pub lead_id: LeadId,
    pub campaign_id: CampaignId,
    /// 0-based cursor into the campaign's step sequence.
    pub current_step_index: u32,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    /// Populated only while `status` is Active. `None` on a fresh enrollment
    /// means step 0 is immediately due.
    pub next_step_due_at: Option<DateTime<Utc>>,
}

/// One scheduled send for one enrollment/step pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailJob {
    pub id: JobId,
    pub workspace_id: WorkspaceId,
    pub lead_id: LeadId,
    pub campaign_id: CampaignId,
    pub step_id: StepId,
    pub enrollment_id: EnrollmentId,
    pub scheduled_for: DateTime<Utc>,
    pub status: JobStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub sent_message_id: Option<ProviderMessageId>,
}

/// Delivery ledger row for one outbound send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: MessageId,
    pub workspace_id: WorkspaceId,
    pub job_id: JobId,
    pub lead_id: LeadId,
    pub to: String,
    pub subject: String,
    pub provider_message_id: ProviderMessageId,
    pub status: MessageStatus,
    pub sent_at: DateTime<Utc>,
}

/// Append-only outbox row; immutable once written apart from the processed
/// stamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachEvent {
    pub id: EventId,
    pub workspace_id: WorkspaceId,
    pub kind: EventKind,
    pub job_id: Option<JobId>,
    pub provider_message_id: Option<ProviderMessageId>,
    /// Raw provider payload, kept for audit.
    pub payload: serde_json::Value,
    pub dedupe_key: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Outbound domain configuration and reputation tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendingDomain {
    pub domain: String,
    pub workspace_id: WorkspaceId,
    pub dkim_verified: bool,
    pub spf_verified: bool,
    pub dmarc_verified: bool,
    pub daily_limit: u32,
    pub sent_today: u32,
}

impl SendingDomain {
    /// A domain is usable for dispatch once DKIM and SPF check out.
    pub fn healthy(&self) -> bool {
        self.dkim_verified && self.spf_verified
    }

    pub fn remaining_today(&self) -> u32 {
        self.daily_limit.saturating_sub(self.sent_today)
    }
}

/// One outbound mailbox on a sending domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: MailboxId,
    pub workspace_id: WorkspaceId,
    pub address: String,
    pub domain: String,
    pub display_name: String,
    pub active: bool,
    pub daily_limit: u32,
    pub sent_today: u32,
}

impl Mailbox {
    pub fn remaining_today(&self) -> u32 {
        self.daily_limit.saturating_sub(self.sent_today)
    }
}

/// A mailbox joined with its domain, as selected by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendingIdentity {
    pub mailbox: Mailbox,
    pub domain: SendingDomain,
}

impl SendingIdentity {
    /// Usable for the next send: active mailbox, healthy domain, and
    /// remaining quota on both.
    pub fn available(&self) -> bool {
        self.mailbox.active
            && self.domain.healthy()
            && self.mailbox.remaining_today() > 0
            && self.domain.remaining_today() > 0
    }

    /// RFC 5322 style from header value.
    pub fn from_header(&self) -> String {
        if self.mailbox.display_name.is_empty() {
            self.mailbox.address.clone()
        } else {
            format!("{} <{}>", self.mailbox.display_name, self.mailbox.address)
        }
    }
}
