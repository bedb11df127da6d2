use crate::infra::AppState;
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use coachdesk::workflows::generation::{generation_router, GenerationService, JobId, JobStore};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_generation_routes<S>(service: Arc<GenerationService<S>>) -> axum::Router
where
    S: JobStore + 'static,
{
    generation_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/packets/:job_id",
            axum::routing::get(packet_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Archived packet for a completed job, as JSON sections plus a plain-text rendering.
pub(crate) async fn packet_endpoint(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let job_id = JobId(job_id);
    match state.packets.get(&job_id) {
        Some(packet) => {
            let text = packet.to_text();
            (
                StatusCode::OK,
                Json(json!({ "job_id": job_id, "packet": packet, "text": text })),
            )
                .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no archived packet for job {job_id}") })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::InMemoryPacketArchive;
    use coachdesk::workflows::generation::{ClientId, PacketArchive};
    use coachdesk::workflows::packets::{PacketType, RenderedPacket, RenderedSection};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;

    fn state(ready: bool) -> AppState {
        let recorder = PrometheusBuilder::new().build_recorder();
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(recorder.handle()),
            packets: InMemoryPacketArchive::default(),
        }
    }

    async fn read_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json payload")
    }

    #[tokio::test]
    async fn readiness_reports_initializing_until_flagged() {
        let response = readiness_endpoint(Extension(state(false)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = readiness_endpoint(Extension(state(true)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn packet_endpoint_serves_archived_packets() {
        let state = state(true);
        let packet = RenderedPacket {
            template_id: "lifestyle-standard".to_string(),
            packet_type: PacketType::Lifestyle,
            sections: vec![RenderedSection {
                id: "habits".to_string(),
                title: "Habits".to_string(),
                blocks: Vec::new(),
            }],
        };
        state
            .packets
            .store(
                &JobId::from("job-000001"),
                &ClientId::from("client-42"),
                &packet,
            )
            .await
            .expect("stored");

        let response = packet_endpoint(
            Extension(state.clone()),
            Path("job-000001".to_string()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload["packet"]["packet_type"], "LIFESTYLE");
        assert!(payload["text"]
            .as_str()
            .is_some_and(|text| text.contains("## Habits")));

        let response = packet_endpoint(Extension(state), Path("job-000002".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
