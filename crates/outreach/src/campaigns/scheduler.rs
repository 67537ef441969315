use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::domain::{CampaignEnrollment, EnrollmentStatus, WorkspaceId};
use super::store::{NewJob, OutreachStore, StoreError};

/// Turns due enrollments into pending email jobs and advances their step
/// cursors. Safe to run from overlapping cron invocations: the duplicate-job
/// check plus the store's uniqueness conflict keep scheduling idempotent.
pub struct Scheduler<S> {
    store: Arc<S>,
    batch_size: usize,
}

/// Counts from one scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleReport {
    pub jobs_created: usize,
    pub completed: usize,
    pub skipped: usize,
    pub errors: usize,
}

enum Scheduled {
    Job,
    Completed,
    Skipped,
}

impl<S: OutreachStore> Scheduler<S> {
    pub fn new(store: Arc<S>, batch_size: usize) -> Self {
        Self { store, batch_size }
    }

    /// One scheduling pass over the workspace's due enrollments.
    pub fn schedule_jobs(
        &self,
        workspace: &WorkspaceId,
        now: DateTime<Utc>,
    ) -> Result<ScheduleReport, StoreError> {
        let due = self.store.due_enrollments(workspace, now, self.batch_size)?;
        let mut report = ScheduleReport::default();

        for enrollment in due {
            match self.schedule_one(&enrollment, now) {
                Ok(Scheduled::Job) => report.jobs_created += 1,
                Ok(Scheduled::Completed) => report.completed += 1,
                Ok(Scheduled::Skipped) => report.skipped += 1,
                Err(err) => {
                    report.errors += 1;
                    tracing::warn!(
                        enrollment = %enrollment.id.0,
                        error = %err,
                        "failed to schedule enrollment step"
                    );
                }
            }
        }

        if report.jobs_created > 0 || report.completed > 0 {
            tracing::info!(
                workspace = %workspace.0,
                jobs_created = report.jobs_created,
                completed = report.completed,
                skipped = report.skipped,
                "scheduling pass finished"
            );
        }
        Ok(report)
    }

    fn schedule_one(
        &self,
        enrollment: &CampaignEnrollment,
        now: DateTime<Utc>,
    ) -> Result<Scheduled, StoreError> {
        let steps = self.store.steps(&enrollment.campaign_id)?;
        let index = enrollment.current_step_index as usize;

        let Some(step) = steps.get(index) else {
            // Cursor past the sequence (or a zero-step campaign). Hold off
            // while a retry for an earlier step is still outstanding, so a
            // completion cannot strand a pending job.
            if self.store.pending_job_exists(&enrollment.id)? {
                return Ok(Scheduled::Skipped);
            }
            self.store
                .transition_enrollment(&enrollment.id, EnrollmentStatus::Completed)?;
            return Ok(Scheduled::Completed);
        };

        if self.store.open_job_exists(&enrollment.id, &step.id)? {
            return Ok(Scheduled::Skipped);
        }

        match self.store.insert_job(NewJob {
            workspace_id: enrollment.workspace_id.clone(),
            lead_id: enrollment.lead_id.clone(),
            campaign_id: enrollment.campaign_id.clone(),
            step_id: step.id.clone(),
            enrollment_id: enrollment.id.clone(),
            scheduled_for: now,
        }) {
            Ok(_) => {}
            // An overlapping invocation created the job first.
            Err(StoreError::Conflict) => return Ok(Scheduled::Skipped),
            Err(err) => return Err(err),
        }

        let next_index = enrollment.current_step_index + 1;
        let next_due = match steps.get(next_index as usize) {
            Some(next) => Some(now + Duration::minutes(next.delay_minutes)),
            // No further step: stay due so the next pass can complete the
            // enrollment once the final job has drained.
            None => Some(now),
        };
        self.store
            .advance_enrollment(&enrollment.id, next_index, next_due)?;

        Ok(Scheduled::Job)
    }
}
