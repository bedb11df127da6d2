//! Job records: the only shared mutable state of the generation pipeline.
//!
//! Every mutation happens under one lock, so dedup checks, claims and transitions are atomic
//! per job id. Terminal jobs move from the live table to a retention-bounded archive; running
//! totals keep the lifetime counts once archived jobs are pruned.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::clock::offset;
use super::domain::{
    EnqueueOutcome, GenerationRequest, Job, JobCounts, JobId, JobKey, JobState, OutcomeTally,
};

/// How long finished jobs stay readable when no retention is configured.
pub const DEFAULT_JOB_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobState,
        to: JobState,
    },
    #[error("job store unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction for generation jobs.
pub trait JobStore: Send + Sync {
    /// Create a PENDING job unless one is already in flight for the key.
    fn enqueue(
        &self,
        request: GenerationRequest,
        now: DateTime<Utc>,
    ) -> Result<EnqueueOutcome, StoreError>;

    /// Like `enqueue`, but a waiting job whose snapshot differs is superseded by a fresh one.
    fn enqueue_revision(
        &self,
        request: GenerationRequest,
        now: DateTime<Utc>,
    ) -> Result<EnqueueOutcome, StoreError>;

    /// Move retry-scheduled jobs whose backoff elapsed back to PENDING.
    fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<JobId>, StoreError>;

    /// Atomically mark the oldest PENDING job ACTIVE and return it.
    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>, StoreError>;

    /// ACTIVE jobs claimed before `cutoff`. Their worker is gone; they need a verdict.
    fn abandoned(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, StoreError>;

    fn complete(&self, id: &JobId, now: DateTime<Utc>) -> Result<Job, StoreError>;

    /// Record a failed attempt and schedule the next one.
    fn schedule_retry(
        &self,
        id: &JobId,
        error: String,
        retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Job, StoreError>;

    /// Record the final failed attempt. Only one caller can win this transition.
    fn escalate(&self, id: &JobId, error: String, now: DateTime<Utc>) -> Result<Job, StoreError>;

    fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError>;

    fn in_flight(&self, key: &JobKey) -> Result<Option<Job>, StoreError>;

    /// Current counts. RETRY_SCHEDULED jobs whose backoff has elapsed by `now` count as pending.
    fn counts(&self, now: DateTime<Utc>) -> Result<JobCounts, StoreError>;

    fn outcomes_since(&self, since: DateTime<Utc>) -> Result<OutcomeTally, StoreError>;
}

#[derive(Debug, Default, Clone, Copy)]
struct TerminalTotals {
    completed: usize,
    failed: usize,
    superseded: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    sequence: u64,
    live: Vec<Job>,
    /// Finished jobs in the order they finished.
    archive: VecDeque<Job>,
    totals: TerminalTotals,
    retention: Duration,
}

impl StoreState {
    fn next_id(&mut self) -> JobId {
        self.sequence += 1;
        JobId::from_sequence(self.sequence)
    }

    fn in_flight_index(&self, key: &JobKey) -> Option<usize> {
        self.live
            .iter()
            .position(|job| job.state.is_in_flight() && &job.key() == key)
    }

    fn live_index(&self, id: &JobId) -> Result<usize, StoreError> {
        self.live
            .iter()
            .position(|job| &job.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn insert(&mut self, request: GenerationRequest, now: DateTime<Utc>) -> JobId {
        let id = self.next_id();
        self.live.push(Job::new(id.clone(), request, now));
        id
    }

    fn transition(
        &mut self,
        index: usize,
        to: JobState,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let job = &mut self.live[index];
        if !job.state.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                job_id: job.id.clone(),
                from: job.state,
                to,
            });
        }
        job.state = to;
        job.updated_at = now;
        if to.is_terminal() {
            job.finished_at = Some(now);
        }
        Ok(())
    }

    fn archive(&mut self, index: usize, now: DateTime<Utc>) -> Job {
        let job = self.live.remove(index);
        match job.state {
            JobState::Completed => self.totals.completed += 1,
            JobState::FailedEscalated => self.totals.failed += 1,
            JobState::Superseded => self.totals.superseded += 1,
            JobState::Pending | JobState::Active | JobState::RetryScheduled => {}
        }
        self.archive.push_back(job.clone());
        self.prune(now);
        job
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let Some(cutoff) = now.checked_sub_signed(offset(self.retention)) else {
            return;
        };
        while self
            .archive
            .front()
            .is_some_and(|job| job.finished_at.map_or(true, |finished| finished < cutoff))
        {
            self.archive.pop_front();
        }
    }
}

/// Mutex-backed store created at process start and injected into the queue.
#[derive(Debug)]
pub struct InMemoryJobStore {
    state: Mutex<StoreState>,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_JOB_RETENTION)
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finished jobs older than `retention` are dropped from the archive.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            state: Mutex::new(StoreState {
                retention,
                ..StoreState::default()
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("job store lock poisoned".to_string()))
    }

    /// Live jobs followed by the finished jobs still within retention.
    pub fn snapshot(&self) -> Result<Vec<Job>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .live
            .iter()
            .chain(state.archive.iter())
            .cloned()
            .collect())
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(
        &self,
        request: GenerationRequest,
        now: DateTime<Utc>,
    ) -> Result<EnqueueOutcome, StoreError> {
        let mut state = self.lock()?;
        let packet_type = request.packet_type;
        if let Some(index) = state.in_flight_index(&request.key()) {
            return Ok(EnqueueOutcome {
                job_id: state.live[index].id.clone(),
                packet_type,
                created: false,
                superseded: None,
            });
        }

        let job_id = state.insert(request, now);
        Ok(EnqueueOutcome {
            job_id,
            packet_type,
            created: true,
            superseded: None,
        })
    }

    fn enqueue_revision(
        &self,
        request: GenerationRequest,
        now: DateTime<Utc>,
    ) -> Result<EnqueueOutcome, StoreError> {
        let mut state = self.lock()?;
        let packet_type = request.packet_type;
        let Some(index) = state.in_flight_index(&request.key()) else {
            let job_id = state.insert(request, now);
            return Ok(EnqueueOutcome {
                job_id,
                packet_type,
                created: true,
                superseded: None,
            });
        };

        let existing = &state.live[index];
        let stale = existing.state != JobState::Active && existing.answers != request.answers;
        if !stale {
            return Ok(EnqueueOutcome {
                job_id: existing.id.clone(),
                packet_type,
                created: false,
                superseded: None,
            });
        }

        let job_id = state.next_id();
        state.transition(index, JobState::Superseded, now)?;
        state.live[index].superseded_by = Some(job_id.clone());
        let old = state.archive(index, now);
        state.live.push(Job::new(job_id.clone(), request, now));

        Ok(EnqueueOutcome {
            job_id,
            packet_type,
            created: true,
            superseded: Some(old.id),
        })
    }

    fn promote_due(&self, now: DateTime<Utc>) -> Result<Vec<JobId>, StoreError> {
        let mut state = self.lock()?;
        let due: Vec<usize> = state
            .live
            .iter()
            .enumerate()
            .filter(|(_, job)| {
                job.state == JobState::RetryScheduled
                    && job.next_attempt_at.map_or(true, |at| at <= now)
            })
            .map(|(index, _)| index)
            .collect();

        let mut promoted = Vec::with_capacity(due.len());
        for index in due {
            state.transition(index, JobState::Pending, now)?;
            state.live[index].next_attempt_at = None;
            promoted.push(state.live[index].id.clone());
        }
        Ok(promoted)
    }

    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>, StoreError> {
        let mut state = self.lock()?;
        // Live jobs stay in creation order, so the first PENDING one is the oldest.
        let Some(index) = state
            .live
            .iter()
            .position(|job| job.state == JobState::Pending)
        else {
            return Ok(None);
        };
        state.transition(index, JobState::Active, now)?;
        Ok(Some(state.live[index].clone()))
    }

    fn abandoned(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>, StoreError> {
        let state = self.lock()?;
        // An ACTIVE job's `updated_at` is its claim time.
        Ok(state
            .live
            .iter()
            .filter(|job| job.state == JobState::Active && job.updated_at < cutoff)
            .cloned()
            .collect())
    }

    fn complete(&self, id: &JobId, now: DateTime<Utc>) -> Result<Job, StoreError> {
        let mut state = self.lock()?;
        let index = state.live_index(id)?;
        state.transition(index, JobState::Completed, now)?;
        state.live[index].last_error = None;
        Ok(state.archive(index, now))
    }

    fn schedule_retry(
        &self,
        id: &JobId,
        error: String,
        retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Job, StoreError> {
        let mut state = self.lock()?;
        let index = state.live_index(id)?;
        state.transition(index, JobState::RetryScheduled, now)?;
        let job = &mut state.live[index];
        job.attempts += 1;
        job.last_error = Some(error);
        job.next_attempt_at = Some(retry_at);
        Ok(job.clone())
    }

    fn escalate(&self, id: &JobId, error: String, now: DateTime<Utc>) -> Result<Job, StoreError> {
        let mut state = self.lock()?;
        let index = state.live_index(id)?;
        state.transition(index, JobState::FailedEscalated, now)?;
        let job = &mut state.live[index];
        job.attempts += 1;
        job.last_error = Some(error);
        Ok(state.archive(index, now))
    }

    fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .live
            .iter()
            .chain(state.archive.iter())
            .find(|job| &job.id == id)
            .cloned())
    }

    fn in_flight(&self, key: &JobKey) -> Result<Option<Job>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .in_flight_index(key)
            .map(|index| state.live[index].clone()))
    }

    fn counts(&self, now: DateTime<Utc>) -> Result<JobCounts, StoreError> {
        let state = self.lock()?;
        let mut counts = JobCounts {
            completed: state.totals.completed,
            failed: state.totals.failed,
            superseded: state.totals.superseded,
            ..JobCounts::default()
        };
        for job in &state.live {
            match (job.state, job.next_attempt_at) {
                (JobState::Pending, _) => counts.note_pending(job.updated_at),
                (JobState::RetryScheduled, Some(due)) if due > now => counts.retrying += 1,
                // Runnable once a worker promotes it, so it waits like any pending job.
                (JobState::RetryScheduled, due) => {
                    counts.note_pending(due.unwrap_or(job.updated_at))
                }
                (JobState::Active, _) => counts.active += 1,
                (JobState::Completed | JobState::FailedEscalated | JobState::Superseded, _) => {}
            }
        }
        Ok(counts)
    }

    fn outcomes_since(&self, since: DateTime<Utc>) -> Result<OutcomeTally, StoreError> {
        let state = self.lock()?;
        let mut tally = OutcomeTally::default();
        // Newest first; stop at the first job that finished before the window.
        let recent = state
            .archive
            .iter()
            .rev()
            .take_while(|job| job.finished_at.is_some_and(|finished| finished >= since));
        for job in recent {
            match job.state {
                JobState::Completed => tally.completed += 1,
                JobState::FailedEscalated => tally.failed += 1,
                _ => {}
            }
        }
        Ok(tally)
    }
}
