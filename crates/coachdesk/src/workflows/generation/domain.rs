use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::intake::IntakeResponses;
use crate::workflows::packets::PacketType;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub(crate) fn from_sequence(sequence: u64) -> Self {
        Self(format!("job-{sequence:06}"))
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity details the packets and the escalation payload need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub id: ClientId,
    pub full_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
}

impl ClientProfile {
    pub fn first_name(&self) -> &str {
        self.full_name
            .split_whitespace()
            .next()
            .unwrap_or(self.full_name.as_str())
    }
}

/// Dedup and concurrency key: at most one in-flight job per pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobKey {
    pub client_id: ClientId,
    pub packet_type: PacketType,
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.client_id, self.packet_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Active,
    RetryScheduled,
    Completed,
    FailedEscalated,
    /// Replaced by a newer answer snapshot before it ran. Not a failure.
    Superseded,
}

impl JobState {
    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Pending, Active)
                | (Pending, Superseded)
                | (Active, Completed)
                | (Active, RetryScheduled)
                | (Active, FailedEscalated)
                | (RetryScheduled, Pending)
                | (RetryScheduled, Superseded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::FailedEscalated | JobState::Superseded
        )
    }

    /// A retry-scheduled job returns to PENDING, so it still occupies its key.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            JobState::Pending | JobState::Active | JobState::RetryScheduled
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Active => "ACTIVE",
            JobState::RetryScheduled => "RETRY_SCHEDULED",
            JobState::Completed => "COMPLETED",
            JobState::FailedEscalated => "FAILED_ESCALATED",
            JobState::Superseded => "SUPERSEDED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Accepted request to render one packet for one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub client: ClientProfile,
    pub packet_type: PacketType,
    pub answers: IntakeResponses,
}

impl GenerationRequest {
    pub fn key(&self) -> JobKey {
        JobKey {
            client_id: self.client.id.clone(),
            packet_type: self.packet_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub client: ClientProfile,
    pub packet_type: PacketType,
    pub answers: IntakeResponses,
    pub state: JobState,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// For PENDING jobs this is when the job became pending.
    pub updated_at: DateTime<Utc>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub superseded_by: Option<JobId>,
}

impl Job {
    pub(crate) fn new(id: JobId, request: GenerationRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            client: request.client,
            packet_type: request.packet_type,
            answers: request.answers,
            state: JobState::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            next_attempt_at: None,
            finished_at: None,
            superseded_by: None,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            client_id: self.client.id.clone(),
            packet_type: self.packet_type,
        }
    }

    pub fn view(&self) -> JobView {
        JobView {
            job_id: self.id.clone(),
            client_id: self.client.id.clone(),
            packet_type: self.packet_type,
            state: self.state,
            attempts: self.attempts,
            last_error: self.last_error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            next_attempt_at: self.next_attempt_at,
            superseded_by: self.superseded_by.clone(),
        }
    }
}

/// Sanitized job status for API responses; omits the answer snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub job_id: JobId,
    pub client_id: ClientId,
    pub packet_type: PacketType,
    pub state: JobState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<JobId>,
}

/// Result of an enqueue call. `created` is false when an in-flight job was reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueueOutcome {
    pub job_id: JobId,
    pub packet_type: PacketType,
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded: Option<JobId>,
}

/// Aggregate counters for the stats endpoint and the monitor. Terminal counts are lifetime totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub pending: usize,
    pub retrying: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub superseded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_pending_since: Option<DateTime<Utc>>,
}

impl JobCounts {
    pub(crate) fn note_pending(&mut self, since: DateTime<Utc>) {
        self.pending += 1;
        self.oldest_pending_since = Some(match self.oldest_pending_since {
            Some(oldest) => oldest.min(since),
            None => since,
        });
    }
}

/// Terminal outcomes inside a time window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeTally {
    pub completed: usize,
    pub failed: usize,
}

impl OutcomeTally {
    pub fn total(&self) -> usize {
        self.completed + self.failed
    }

    pub fn failure_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.failed as f64 / total as f64),
        }
    }
}

/// Who is asking for generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "client_id", rename_all = "snake_case")]
pub enum Requester {
    Client(ClientId),
    Coach,
    Admin,
}
