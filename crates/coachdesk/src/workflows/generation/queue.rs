use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use super::clock::{offset, Clock, SystemClock};
use super::domain::{EnqueueOutcome, GenerationRequest, Job, JobCounts, JobId};
use super::policy::{RetryDecision, RetryPolicy};
use super::ports::{
    ArchiveError, ArchiveReceipt, FailureEscalation, GenerationNotifier, PacketArchive,
    PacketReady,
};
use super::store::{JobStore, StoreError};
use crate::config::GenerationConfig;
use crate::workflows::packets::{
    calculated_fields, render, ContextValue, RenderContext, RenderError, TemplateLibrary,
};

/// Why a single attempt failed. Every variant is retried under the same policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobFailure {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("attempt exceeded its {}s budget", .0.as_secs_f64())]
    TimedOut(Duration),
    #[error("attempt panicked: {0}")]
    Panicked(String),
    #[error("attempt abandoned by its worker after {}s", .0.as_secs_f64())]
    Abandoned(Duration),
}

impl JobFailure {
    pub fn missing_path(&self) -> Option<&str> {
        match self {
            JobFailure::Render(err) => err.path(),
            JobFailure::Archive(_)
            | JobFailure::TimedOut(_)
            | JobFailure::Panicked(_)
            | JobFailure::Abandoned(_) => None,
        }
    }
}

/// What happened to the job a worker picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        job_id: JobId,
        location: String,
    },
    RetryScheduled {
        job_id: JobId,
        attempts: u32,
        delay: Duration,
    },
    Escalated {
        job_id: JobId,
        attempts: u32,
    },
}

/// Enqueue, claim and execute packet-generation jobs against an injected store.
pub struct GenerationQueue<S> {
    store: Arc<S>,
    archive: Arc<dyn PacketArchive>,
    notifier: Arc<dyn GenerationNotifier>,
    templates: Arc<TemplateLibrary>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    job_timeout: Duration,
    wakeup: Notify,
}

impl<S> GenerationQueue<S>
where
    S: JobStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        archive: Arc<dyn PacketArchive>,
        notifier: Arc<dyn GenerationNotifier>,
        config: &GenerationConfig,
    ) -> Self {
        Self {
            store,
            archive,
            notifier,
            templates: Arc::new(TemplateLibrary::standard()),
            clock: Arc::new(SystemClock),
            policy: RetryPolicy::from_config(config),
            job_timeout: config.job_timeout,
            wakeup: Notify::new(),
        }
    }

    pub fn with_templates(mut self, templates: Arc<TemplateLibrary>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Accept a request; returns the in-flight job's id when one already exists for the key.
    pub fn enqueue(&self, request: GenerationRequest) -> Result<EnqueueOutcome, StoreError> {
        let key = request.key();
        let outcome = self.store.enqueue(request, self.clock.now())?;
        self.announce(&outcome, &key.to_string());
        Ok(outcome)
    }

    /// Accept a request whose answers may have changed since the in-flight job was queued.
    pub fn enqueue_revision(
        &self,
        request: GenerationRequest,
    ) -> Result<EnqueueOutcome, StoreError> {
        let key = request.key();
        let outcome = self.store.enqueue_revision(request, self.clock.now())?;
        if let Some(stale) = &outcome.superseded {
            info!(
                job_id = %outcome.job_id,
                superseded = %stale,
                key = %key,
                "stale generation job superseded"
            );
        }
        self.announce(&outcome, &key.to_string());
        Ok(outcome)
    }

    fn announce(&self, outcome: &EnqueueOutcome, key: &str) {
        if outcome.created {
            info!(job_id = %outcome.job_id, key, "generation job enqueued");
            self.wakeup.notify_one();
        } else {
            info!(job_id = %outcome.job_id, key, "generation already in flight");
        }
    }

    pub fn job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        self.store.get(id)
    }

    pub fn counts(&self) -> Result<JobCounts, StoreError> {
        self.store.counts(self.clock.now())
    }

    pub(crate) async fn wait_for_work(&self) {
        self.wakeup.notified().await;
    }

    /// `client`, `answers`, `calculated` and `packet` scopes for one job.
    pub fn assemble_context(&self, job: &Job) -> RenderContext {
        let mut context = RenderContext::new()
            .with_scope("answers", RenderContext::answers_scope(&job.answers))
            .with_scope("calculated", calculated_fields(&job.answers));

        context.insert("client", "id", job.client.id.0.as_str());
        context.insert("client", "fullName", job.client.full_name.as_str());
        context.insert("client", "firstName", job.client.first_name());
        context.insert("client", "email", job.client.email.as_str());
        context.insert(
            "client",
            "segment",
            ContextValue::from(job.client.segment.clone()),
        );
        context.insert("packet", "type", job.packet_type.as_str());
        context.insert("packet", "title", job.packet_type.title());
        context.insert("packet", "requestedOn", job.created_at.date_naive());
        context
    }

    /// Claim and execute the oldest runnable job. `None` when there is nothing to do.
    pub async fn run_next(&self) -> Result<Option<JobOutcome>, StoreError> {
        self.reclaim_abandoned().await?;

        let promoted = self.store.promote_due(self.clock.now())?;
        for job_id in &promoted {
            info!(job_id = %job_id, "retry backoff elapsed, job pending again");
        }

        let Some(job) = self.store.claim_next(self.clock.now())? else {
            return Ok(None);
        };
        info!(
            job_id = %job.id,
            client_id = %job.client.id,
            packet_type = %job.packet_type,
            attempt = job.attempts + 1,
            "generation job claimed"
        );

        let attempt = AssertUnwindSafe(self.execute(&job)).catch_unwind();
        let result = match tokio::time::timeout(self.job_timeout, attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(JobFailure::Panicked(panic_message(payload.as_ref()))),
            Err(_) => Err(JobFailure::TimedOut(self.job_timeout)),
        };

        let outcome = match result {
            Ok(receipt) => self.finish(&job, receipt).await?,
            Err(failure) => self.fail(&job, failure).await?,
        };
        Ok(Some(outcome))
    }

    /// ACTIVE jobs older than twice the attempt budget lost their worker. Each one is failed
    /// once; a job another worker already settled is skipped.
    async fn reclaim_abandoned(&self) -> Result<(), StoreError> {
        let budget = self.job_timeout.saturating_mul(2);
        let now = self.clock.now();
        let Some(cutoff) = now.checked_sub_signed(offset(budget)) else {
            return Ok(());
        };

        for job in self.store.abandoned(cutoff)? {
            warn!(
                job_id = %job.id,
                client_id = %job.client.id,
                claimed_at = %job.updated_at,
                "generation job abandoned by its worker"
            );
            match self.fail(&job, JobFailure::Abandoned(budget)).await {
                Ok(_) | Err(StoreError::NotFound(_) | StoreError::InvalidTransition { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Run jobs until none is runnable right now. Backoff delays are not waited out.
    pub async fn run_until_idle(&self) -> Result<Vec<JobOutcome>, StoreError> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.run_next().await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn execute(&self, job: &Job) -> Result<ArchiveReceipt, JobFailure> {
        let template = self
            .templates
            .select(job.packet_type, job.client.segment.as_deref())?;
        let context = self.assemble_context(job);
        let packet = render(template, &context)?;
        let receipt = self.archive.store(&job.id, &job.client.id, &packet).await?;
        Ok(receipt)
    }

    async fn finish(&self, job: &Job, receipt: ArchiveReceipt) -> Result<JobOutcome, StoreError> {
        let done = self.store.complete(&job.id, self.clock.now())?;
        info!(
            job_id = %done.id,
            client_id = %done.client.id,
            packet_type = %done.packet_type,
            location = %receipt.location,
            "packet generated"
        );

        let event = PacketReady {
            job_id: done.id.clone(),
            client_id: done.client.id.clone(),
            packet_type: done.packet_type,
            location: receipt.location.clone(),
        };
        if let Err(err) = self.notifier.packet_ready(event).await {
            warn!(job_id = %done.id, error = %err, "packet ready notification failed");
        }

        Ok(JobOutcome::Completed {
            job_id: done.id,
            location: receipt.location,
        })
    }

    async fn fail(&self, job: &Job, failure: JobFailure) -> Result<JobOutcome, StoreError> {
        let attempts = job.attempts + 1;
        let now = self.clock.now();
        let message = failure.to_string();

        match self.policy.decide(attempts) {
            RetryDecision::Retry { delay } => {
                let retry_at = now.checked_add_signed(offset(delay)).unwrap_or(now);
                let updated = self.store.schedule_retry(&job.id, message, retry_at, now)?;
                warn!(
                    job_id = %updated.id,
                    client_id = %updated.client.id,
                    packet_type = %updated.packet_type,
                    attempt = updated.attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure,
                    "generation attempt failed, retry scheduled"
                );
                Ok(JobOutcome::RetryScheduled {
                    job_id: updated.id,
                    attempts: updated.attempts,
                    delay,
                })
            }
            RetryDecision::Escalate => {
                let failed = self.store.escalate(&job.id, message.clone(), now)?;
                error!(
                    job_id = %failed.id,
                    client_id = %failed.client.id,
                    packet_type = %failed.packet_type,
                    attempts = failed.attempts,
                    error = %failure,
                    "generation failed permanently, escalating"
                );

                let escalation = FailureEscalation {
                    job_id: failed.id.clone(),
                    client_id: failed.client.id.clone(),
                    client_name: failed.client.full_name.clone(),
                    client_email: failed.client.email.clone(),
                    packet_type: failed.packet_type,
                    error_message: message,
                    retry_count: failed.attempts,
                    missing_path: failure.missing_path().map(str::to_string),
                };
                if let Err(err) = self.notifier.escalate(escalation).await {
                    error!(job_id = %failed.id, error = %err, "failure escalation not delivered");
                }

                Ok(JobOutcome::Escalated {
                    job_id: failed.id,
                    attempts: failed.attempts,
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
