use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use super::server::AppState;
use crate::scheduler::{HealthStatus, StatusSnapshot};

/// Body of `GET /api/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub sources_total: usize,
    pub sources_enabled: usize,
    pub sources_degraded: usize,
}

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/status", get(status))
        .with_state(state)
}

/// Returns 503 while any source is disabled or failing.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let snapshot = state.status.snapshot();
    let degraded = snapshot
        .sources
        .iter()
        .filter(|s| !s.enabled || s.status == HealthStatus::Degraded)
        .count();

    let (code, status) = if snapshot.is_healthy() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: state.start_time.elapsed().as_secs(),
            sources_total: snapshot.sources.len(),
            sources_enabled: snapshot.sources.iter().filter(|s| s.enabled).count(),
            sources_degraded: degraded,
        }),
    )
}

async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.status.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TrackedSource;
    use crate::scheduler::{SourceHealth, StatusHandle};
    use platforms_feed::PlatformKind;

    fn state_with(health: SourceHealth) -> AppState {
        let status = StatusHandle::new();
        status.publish(&health);
        AppState::new(status)
    }

    #[tokio::test]
    async fn test_health_ok() {
        let source = TrackedSource::new(PlatformKind::Bluesky, "goose.bsky.social");
        let (code, Json(body)) = health_check(State(state_with(SourceHealth::new(&source)))).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.status, "healthy");
        assert_eq!(body.sources_total, 1);
        assert_eq!(body.sources_enabled, 1);
    }

    #[tokio::test]
    async fn test_health_degraded_when_source_disabled() {
        let source = TrackedSource::new(PlatformKind::Youtube, "@goose");
        let mut health = SourceHealth::new(&source);
        health.disable(chrono::Utc::now(), "HTTP 403".into());

        let (code, Json(body)) = health_check(State(state_with(health))).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.sources_degraded, 1);
    }

    #[tokio::test]
    async fn test_status_serializes_snapshot() {
        let source = TrackedSource::new(PlatformKind::Youtube, "@goose");
        let Json(snapshot) = status(State(state_with(SourceHealth::new(&source)))).await;

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["phase"], "idle");
        assert_eq!(json["sources"][0]["source_id"], "youtube:@goose");
        assert_eq!(json["sources"][0]["status"], "unknown");
    }
}
