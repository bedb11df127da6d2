//! Asynchronous packet generation: dedup-keyed jobs, bounded retries, escalation, health.
//!
//! Job lifecycle: `PENDING -> ACTIVE -> {COMPLETED | RETRY_SCHEDULED | FAILED_ESCALATED}`, with
//! `RETRY_SCHEDULED -> PENDING` once backoff elapses and `SUPERSEDED` for waiting jobs replaced by
//! a newer answer snapshot.

pub mod clock;
pub mod domain;
pub mod monitor;
pub mod policy;
pub mod ports;
pub mod queue;
pub mod router;
pub mod service;
pub mod store;
pub mod worker;

#[cfg(test)]
mod tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    ClientId, ClientProfile, EnqueueOutcome, GenerationRequest, Job, JobCounts, JobId, JobKey,
    JobState, JobView, OutcomeTally, Requester,
};
pub use monitor::{run_periodic, HealthIssue, HealthReport, HealthStatus, IssueKind, QueueMonitor};
pub use policy::{RetryDecision, RetryPolicy};
pub use ports::{
    ArchiveError, ArchiveReceipt, FailureEscalation, GenerationNotifier, NotifyError,
    PacketArchive, PacketReady,
};
pub use queue::{GenerationQueue, JobFailure, JobOutcome};
pub use router::generation_router;
pub use service::{
    authorize, GenerationService, GenerationServiceError, SubmissionReceipt, Trigger,
};
pub use store::{InMemoryJobStore, JobStore, StoreError, DEFAULT_JOB_RETENTION};
pub use worker::WorkerPool;
