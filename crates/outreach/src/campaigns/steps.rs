use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::domain::{CampaignStep, StepId};

/// One step submitted through the batch editor. A known `id` updates the
/// stored step in place; a missing (or unknown) `id` creates a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDraft {
    #[serde(default)]
    pub id: Option<StepId>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub delay_minutes: i64,
}

/// A step as it should exist after the batch is applied. Order follows the
/// incoming position, not the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub existing_id: Option<StepId>,
    pub order: u32,
    pub subject: String,
    pub body: String,
    pub delay_minutes: i64,
}

/// The editor's full diff of a campaign's step list. The store applies the
/// whole plan in one transaction so concurrent readers never observe a
/// partially replaced sequence.
#[derive(Debug, Clone, Default)]
pub struct StepBatchPlan {
    pub upserts: Vec<PlannedStep>,
    pub delete: Vec<StepId>,
}

impl StepBatchPlan {
    pub fn outcome(&self) -> StepBatchOutcome {
        StepBatchOutcome {
            created: self
                .upserts
                .iter()
                .filter(|step| step.existing_id.is_none())
                .count(),
            updated: self
                .upserts
                .iter()
                .filter(|step| step.existing_id.is_some())
                .count(),
            deleted: self.delete.len(),
        }
    }
}

/// Counts reported back to the editor after a batch replace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepBatchOutcome {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Diff the stored step list against the incoming set: matched ids update,
/// unmatched drafts create, stored steps absent from the set delete.
pub fn diff_steps(existing: &[CampaignStep], drafts: &[StepDraft]) -> StepBatchPlan {
    let known: HashSet<&StepId> = existing.iter().map(|step| &step.id).collect();
    let mut seen: HashSet<StepId> = HashSet::new();

    let upserts = drafts
        .iter()
        .enumerate()
        .map(|(position, draft)| {
            let existing_id = draft
                .id
                .as_ref()
                .filter(|id| known.contains(id))
                .cloned();
            if let Some(id) = &existing_id {
                seen.insert(id.clone());
            }
            PlannedStep {
                existing_id,
                order: position as u32,
                subject: draft.subject.clone(),
                body: draft.body.clone(),
                delay_minutes: draft.delay_minutes,
            }
        })
        .collect();

    let delete = existing
        .iter()
        .filter(|step| !seen.contains(&step.id))
        .map(|step| step.id.clone())
        .collect();

    StepBatchPlan { upserts, delete }
}
