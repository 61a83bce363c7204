// src/map/server.rs
//! HTTP endpoints the web map polls

use crate::config::StatusThresholds;
use crate::diagnostics::{DiagnosticReport, Diagnostics};
use crate::error::Result;
use crate::map::feed::{MapFeed, MapPayload};
use crate::state::SharedPositionState;
use crate::status::{self, StatusReport};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Shared application state for axum handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    feed: MapFeed,
    state: SharedPositionState,
    thresholds: StatusThresholds,
    device: PathBuf,
}

impl AppState {
    pub fn new(state: SharedPositionState, thresholds: StatusThresholds, device: impl Into<PathBuf>) -> Self {
        Self {
            feed: MapFeed::new(state.clone()),
            state,
            thresholds,
            device: device.into(),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/location", get(get_location))
        .route("/status", get(get_status))
        .route("/diagnostics", get(get_diagnostics))
        .route("/health", get(health))
        .with_state(state)
}

async fn get_location(State(app): State<AppState>) -> Json<MapPayload> {
    Json(app.feed.current_payload())
}

async fn get_status(State(app): State<AppState>) -> Json<StatusReport> {
    Json(status::classify(&app.state.read(), Utc::now(), &app.thresholds))
}

/// Probes touch the filesystem and spawn `pgrep`, so they run off the async workers.
async fn get_diagnostics(
    State(app): State<AppState>,
) -> std::result::Result<Json<DiagnosticReport>, (StatusCode, String)> {
    let device = app.device.clone();
    tokio::task::spawn_blocking(move || Diagnostics::new(device).run())
        .await
        .map(Json)
        .map_err(|e| {
            warn!(error = %e, "diagnostics task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

async fn health() -> &'static str {
    "ok"
}

/// Bind `0.0.0.0:port`. Done before anything else starts so a taken port fails fast.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "map server listening");
    Ok(listener)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn run_server(
    listener: TcpListener,
    app: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    axum::serve(listener, create_router(app))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("map server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpsError;
    use crate::gps::data::{ConnectionState, Fix, SharedSnapshot};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn get_json(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn app(state: SharedPositionState) -> Router {
        create_router(AppState::new(state, StatusThresholds::default(), "/nonexistent"))
    }

    #[tokio::test]
    async fn test_location_without_fix() {
        let (status, json) = get_json(app(SharedPositionState::new()), "/location").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["lat"].is_null());
        assert_eq!(json["valid"], false);
    }

    #[tokio::test]
    async fn test_location_with_fix() {
        let state = SharedPositionState::new();
        state.write(SharedSnapshot::with_fix(Fix {
            valid: true,
            latitude: 45.5017,
            longitude: -73.5673,
            speed_kmh: 12.5,
            timestamp: Utc::now(),
            receiver_time: None,
        }));

        let (_, json) = get_json(app(state), "/location").await;
        assert_eq!(json["lat"], 45.5017);
        assert_eq!(json["lon"], -73.5673);
        assert_eq!(json["speed_kmh"], 12.5);
        assert_eq!(json["valid"], true);
    }

    #[tokio::test]
    async fn test_status_reports_tier() {
        let state = SharedPositionState::new();
        let (_, json) = get_json(app(state.clone()), "/status").await;
        assert_eq!(json["tier"], "lost");
        assert_eq!(json["connection"]["state"], "disconnected");

        let mut fix = Fix::invalid(Utc::now());
        fix.valid = true;
        state.write(SharedSnapshot::with_fix(fix));
        let (_, json) = get_json(app(state.clone()), "/status").await;
        assert_eq!(json["tier"], "fresh");

        state.update_connection(ConnectionState::Connecting);
        let (_, json) = get_json(app(state), "/status").await;
        assert_eq!(json["tier"], "lost");
    }

    #[tokio::test]
    async fn test_diagnostics_lists_every_check() {
        let (status, json) = get_json(app(SharedPositionState::new()), "/diagnostics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["checks"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_bind_fails_when_port_taken() {
        let taken = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = bind(port).await.unwrap_err();
        assert!(matches!(err, GpsError::Io(ref e) if e.kind() == std::io::ErrorKind::AddrInUse));
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let listener = bind(0).await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let app = AppState::new(SharedPositionState::new(), StatusThresholds::default(), "/nonexistent");
        let server = tokio::spawn(run_server(listener, app, async {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(SharedPositionState::new())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
