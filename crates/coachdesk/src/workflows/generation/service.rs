use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    ClientId, ClientProfile, EnqueueOutcome, GenerationRequest, JobCounts, JobId, JobView,
    Requester,
};
use super::monitor::{HealthReport, QueueMonitor};
use super::queue::GenerationQueue;
use super::store::{JobStore, StoreError};
use crate::workflows::intake::{
    HiddenAnswerPolicy, IntakeCatalog, IntakeError, IntakeResponses, IntakeSession, QuestionId,
};

/// How a generation request reached the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    IntakeSubmission,
    Manual,
}

/// Jobs created or reused for one intake submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReceipt {
    pub client_id: ClientId,
    pub jobs: Vec<EnqueueOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hidden_answers: Vec<QuestionId>,
}

/// Service composing the intake catalog, the generation queue and the queue monitor.
pub struct GenerationService<S> {
    catalog: Arc<IntakeCatalog>,
    queue: Arc<GenerationQueue<S>>,
    monitor: Arc<QueueMonitor<S>>,
    hidden_answers: HiddenAnswerPolicy,
}

impl<S> GenerationService<S>
where
    S: JobStore + 'static,
{
    pub fn new(
        catalog: Arc<IntakeCatalog>,
        queue: Arc<GenerationQueue<S>>,
        monitor: Arc<QueueMonitor<S>>,
        hidden_answers: HiddenAnswerPolicy,
    ) -> Self {
        Self {
            catalog,
            queue,
            monitor,
            hidden_answers,
        }
    }

    pub fn catalog(&self) -> &Arc<IntakeCatalog> {
        &self.catalog
    }

    pub fn queue(&self) -> &Arc<GenerationQueue<S>> {
        &self.queue
    }

    pub fn monitor(&self) -> &Arc<QueueMonitor<S>> {
        &self.monitor
    }

    /// Validate a finished intake and enqueue one job per required packet type.
    pub fn submit_intake(
        &self,
        requester: &Requester,
        client: ClientProfile,
        responses: IntakeResponses,
    ) -> Result<SubmissionReceipt, GenerationServiceError> {
        authorize(requester, &client.id, Trigger::IntakeSubmission)?;

        let mut session = IntakeSession::resume(Arc::clone(&self.catalog), responses);
        let submitted = session.submit(self.hidden_answers)?;

        let mut jobs = Vec::with_capacity(submitted.packets.len());
        for packet_type in &submitted.packets {
            let request = GenerationRequest {
                client: client.clone(),
                packet_type: *packet_type,
                answers: submitted.responses.clone(),
            };
            jobs.push(self.queue.enqueue_revision(request)?);
        }

        info!(
            client_id = %client.id,
            packets = jobs.len(),
            hidden_answers = submitted.hidden_answers.len(),
            "intake submitted"
        );

        Ok(SubmissionReceipt {
            client_id: client.id,
            jobs,
            hidden_answers: submitted.hidden_answers,
        })
    }

    /// Manual (re)generation of a single packet from an answer snapshot.
    pub fn enqueue_generation(
        &self,
        requester: &Requester,
        request: GenerationRequest,
    ) -> Result<EnqueueOutcome, GenerationServiceError> {
        authorize(requester, &request.client.id, Trigger::Manual)?;
        Ok(self.queue.enqueue(request)?)
    }

    pub fn job(&self, id: &JobId) -> Result<JobView, GenerationServiceError> {
        self.queue
            .job(id)?
            .map(|job| job.view())
            .ok_or_else(|| GenerationServiceError::JobNotFound(id.clone()))
    }

    pub fn stats(&self) -> Result<JobCounts, GenerationServiceError> {
        Ok(self.queue.counts()?)
    }

    pub fn health(&self) -> Result<HealthReport, GenerationServiceError> {
        Ok(self.monitor.check_health()?)
    }
}

/// Clients may only submit their own intake; coaches and admins may trigger anything.
pub fn authorize(
    requester: &Requester,
    client_id: &ClientId,
    trigger: Trigger,
) -> Result<(), GenerationServiceError> {
    let denied = match (requester, trigger) {
        (Requester::Coach | Requester::Admin, _) => None,
        (Requester::Client(own), Trigger::IntakeSubmission) if own == client_id => None,
        (Requester::Client(_), Trigger::IntakeSubmission) => {
            Some("clients may only submit their own intake")
        }
        (Requester::Client(_), Trigger::Manual) => {
            Some("only coaches and admins may trigger generation directly")
        }
    };

    match denied {
        None => Ok(()),
        Some(reason) => {
            warn!(client_id = %client_id, ?requester, reason, "generation request refused");
            Err(GenerationServiceError::Forbidden(reason.to_string()))
        }
    }
}

/// Error raised by the generation service.
#[derive(Debug, thiserror::Error)]
pub enum GenerationServiceError {
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error(transparent)]
    Store(#[from] StoreError),
}
