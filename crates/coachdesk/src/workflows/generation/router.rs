use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{ClientProfile, GenerationRequest, JobId, Requester};
use super::service::{GenerationService, GenerationServiceError};
use super::store::JobStore;
use crate::workflows::intake::{BlockId, IntakeError, IntakeResponses, QuestionId};
use crate::workflows::packets::PacketType;

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesPayload {
    #[serde(default)]
    pub(crate) responses: IntakeResponses,
}

#[derive(Debug, Serialize)]
pub(crate) struct VisibleBlockView {
    pub(crate) block_id: BlockId,
    pub(crate) title: String,
    pub(crate) questions: Vec<QuestionId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmissionPayload {
    pub(crate) requester: Requester,
    pub(crate) client: ClientProfile,
    pub(crate) responses: IntakeResponses,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerationPayload {
    pub(crate) requester: Requester,
    pub(crate) client: ClientProfile,
    pub(crate) packet_type: PacketType,
    #[serde(default)]
    pub(crate) answers: IntakeResponses,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatsQuery {
    #[serde(default)]
    pub(crate) health: bool,
}

/// Router builder exposing intake and generation endpoints.
pub fn generation_router<S>(service: Arc<GenerationService<S>>) -> Router
where
    S: JobStore + 'static,
{
    Router::new()
        .route("/api/v1/intake/visibility", post(visibility_handler::<S>))
        .route("/api/v1/intake/validation", post(validation_handler::<S>))
        .route("/api/v1/intake/submissions", post(submission_handler::<S>))
        .route("/api/v1/generation/jobs", post(enqueue_handler::<S>))
        .route("/api/v1/generation/jobs/:job_id", get(job_handler::<S>))
        .route("/api/v1/generation/stats", get(stats_handler::<S>))
        .route("/api/v1/generation/health", get(health_handler::<S>))
        .with_state(service)
}

pub(crate) async fn visibility_handler<S>(
    State(service): State<Arc<GenerationService<S>>>,
    axum::Json(payload): axum::Json<ResponsesPayload>,
) -> Response
where
    S: JobStore + 'static,
{
    let blocks: Vec<VisibleBlockView> = service
        .catalog()
        .visible(&payload.responses)
        .into_iter()
        .map(|visible| VisibleBlockView {
            block_id: visible.block.id.clone(),
            title: visible.block.title.clone(),
            questions: visible
                .questions
                .iter()
                .map(|question| question.id.clone())
                .collect(),
        })
        .collect();

    (StatusCode::OK, axum::Json(json!({ "blocks": blocks }))).into_response()
}

pub(crate) async fn validation_handler<S>(
    State(service): State<Arc<GenerationService<S>>>,
    axum::Json(payload): axum::Json<ResponsesPayload>,
) -> Response
where
    S: JobStore + 'static,
{
    let report = service.catalog().validate(&payload.responses);
    (StatusCode::OK, axum::Json(report)).into_response()
}

pub(crate) async fn submission_handler<S>(
    State(service): State<Arc<GenerationService<S>>>,
    axum::Json(payload): axum::Json<SubmissionPayload>,
) -> Response
where
    S: JobStore + 'static,
{
    match service.submit_intake(&payload.requester, payload.client, payload.responses) {
        Ok(receipt) => (StatusCode::ACCEPTED, axum::Json(receipt)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn enqueue_handler<S>(
    State(service): State<Arc<GenerationService<S>>>,
    axum::Json(payload): axum::Json<GenerationPayload>,
) -> Response
where
    S: JobStore + 'static,
{
    let request = GenerationRequest {
        client: payload.client,
        packet_type: payload.packet_type,
        answers: payload.answers,
    };
    match service.enqueue_generation(&payload.requester, request) {
        Ok(outcome) => (StatusCode::ACCEPTED, axum::Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn job_handler<S>(
    State(service): State<Arc<GenerationService<S>>>,
    Path(job_id): Path<String>,
) -> Response
where
    S: JobStore + 'static,
{
    match service.job(&JobId(job_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn stats_handler<S>(
    State(service): State<Arc<GenerationService<S>>>,
    Query(query): Query<StatsQuery>,
) -> Response
where
    S: JobStore + 'static,
{
    let counts = match service.stats() {
        Ok(counts) => counts,
        Err(err) => return error_response(err),
    };

    let mut payload = json!({
        "pending": counts.pending,
        "retrying": counts.retrying,
        "active": counts.active,
        "completed": counts.completed,
        "failed": counts.failed,
        "superseded": counts.superseded,
    });
    if query.health {
        match service.health() {
            Ok(report) => payload["health"] = json!(report),
            Err(err) => return error_response(err),
        }
    }

    (StatusCode::OK, axum::Json(payload)).into_response()
}

/// Advisory only: the verdict is in the body, the status code stays 200.
pub(crate) async fn health_handler<S>(State(service): State<Arc<GenerationService<S>>>) -> Response
where
    S: JobStore + 'static,
{
    match service.health() {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: GenerationServiceError) -> Response {
    let (status, payload) = match &err {
        GenerationServiceError::Forbidden(_) => {
            (StatusCode::FORBIDDEN, json!({ "error": err.to_string() }))
        }
        GenerationServiceError::Intake(IntakeError::Invalid(report)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": err.to_string(),
                "validation": report,
            }),
        ),
        GenerationServiceError::Intake(_) => {
            (StatusCode::BAD_REQUEST, json!({ "error": err.to_string() }))
        }
        GenerationServiceError::JobNotFound(_) => {
            (StatusCode::NOT_FOUND, json!({ "error": err.to_string() }))
        }
        GenerationServiceError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": err.to_string() }),
        ),
    };
    (status, axum::Json(payload)).into_response()
}
