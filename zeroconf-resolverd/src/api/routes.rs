use std::convert::Infallible;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use tokio::sync::{broadcast, watch};
use shared::protocol::API_PREFIX;
use shared::types::{Notification, ServiceRecord};
use crate::error::ResolverError;
use crate::platform::ScanRequest;
use crate::resolution::CoordinatorStatus;
use crate::resolution_manager::CoordinatorHandle;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: CoordinatorHandle,
    pub hash_rx: watch::Receiver<String>,
    pub notifications: broadcast::Sender<Notification>,
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/services", get(get_discovered))
        .route("/services/resolved", get(get_resolved))
        .route("/services/hash", get(get_hash))
        .route("/services/:name", get(get_service))
        .route("/status", get(get_status))
        .route("/scan", post(start_scan))
        .route("/scan/stop", post(stop_scan))
        .route("/events", get(events));

    Router::new().nest(API_PREFIX, v1).with_state(state)
}

fn internal_error(e: ResolverError) -> StatusCode {
    tracing::error!("Coordinator request failed: {}", e);
    match e {
        ResolverError::Facility(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn get_discovered(State(state): State<AppState>) -> Result<Json<Vec<ServiceRecord>>, StatusCode> {
    state.coordinator.discovered().await.map(Json).map_err(internal_error)
}

async fn get_resolved(State(state): State<AppState>) -> Result<Json<Vec<ServiceRecord>>, StatusCode> {
    state.coordinator.resolved().await.map(Json).map_err(internal_error)
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.hash_rx.borrow().clone()
}

async fn get_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ServiceRecord>, StatusCode> {
    state
        .coordinator
        .get_one(name)
        .await
        .map_err(internal_error)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_status(State(state): State<AppState>) -> Result<Json<CoordinatorStatus>, StatusCode> {
    state.coordinator.status().await.map(Json).map_err(internal_error)
}

async fn start_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<StatusCode, StatusCode> {
    state.coordinator.scan(request).await.map_err(internal_error)?;
    Ok(StatusCode::ACCEPTED)
}

async fn stop_scan(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    state.coordinator.stop_scan().await.map_err(internal_error)?;
    Ok(StatusCode::ACCEPTED)
}

async fn events(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.notifications.subscribe();
    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    let event = Event::default()
                        .json_data(&notification)
                        .unwrap_or_else(|_| Event::default().comment("unserializable notification"));
                    return Some((Ok(event), rx));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream client lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use axum::body::Body;
    use axum::http::Request;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;
    use crate::platform::PlatformEvent;
    use crate::resolution::testing::{self, record, resolved_record};
    use crate::resolution::{hash, ResolutionPolicy};
    use crate::resolution_manager::Schedule;

    async fn app() -> (Router, tokio::sync::mpsc::Sender<PlatformEvent>, CancellationToken) {
        let (coordinator, _facility, _rx) = testing::coordinator(ResolutionPolicy::default());
        let (hash_tx, hash_rx) = watch::channel(hash::compute_hash(&[]));
        let cancel = CancellationToken::new();
        let schedule = Schedule {
            resolve_tick: Duration::from_millis(500),
            watchdog_tick: Duration::from_secs(10),
            backfill_tick: None,
        };
        let (handle, _task) = CoordinatorHandle::spawn(coordinator, schedule, hash_tx, cancel.clone());
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        handle.subscribe(rx).await.unwrap();
        let state = AppState {
            coordinator: handle,
            hash_rx,
            notifications: broadcast::channel(16).0,
        };
        (router(state), tx, cancel)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test(start_paused = true)]
    async fn test_lists_and_lookup() {
        let (app, events, cancel) = app().await;
        events.send(PlatformEvent::ServiceFound(record("b"))).await.unwrap();
        events.send(PlatformEvent::ServiceFound(record("a"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(550)).await;
        events.send(PlatformEvent::ServiceResolved(1, resolved_record("b"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (status, body) = get_json(&app, "/v1/services").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "a");
        assert_eq!(body[1]["name"], "b");

        let (_, body) = get_json(&app, "/v1/services/resolved").await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["port"], 8080);

        let (status, _) = get_json(&app, "/v1/services/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = get_json(&app, "/v1/status").await;
        assert_eq!(body["discovered"], 2);
        assert_eq!(body["pending"][0], "a");
        cancel.cancel();
    }
}
