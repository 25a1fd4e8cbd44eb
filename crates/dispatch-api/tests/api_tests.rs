//! Integration tests for the dispatch API endpoints.
//!
//! Tests drive the Axum `Router` directly via `tower::ServiceExt` without
//! starting a TCP server.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use dispatch_api::router::build_router;
use dispatch_api::state::{AppState, ExpiryPolicy};
use dispatch_store::{AgentStore, StoreConfig};
use dispatch_types::{AgentId, Location};
use serde_json::{Value, json};
use tower::ServiceExt;

fn make_state(ttl_secs: i64) -> Arc<AppState> {
    let store = AgentStore::new(&StoreConfig {
        history_capacity: 3,
        ..StoreConfig::default()
    })
    .unwrap();
    Arc::new(AppState::new(Arc::new(store), ExpiryPolicy { ttl_secs }))
}

async fn send(router: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = router.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn ping(id: i64, timestamp: i64, lat: f64, lon: f64) -> Value {
    json!({
        "timestamp": timestamp,
        "agent_id": id,
        "location": { "lat": lat, "lon": lon },
    })
}

#[tokio::test]
async fn ingest_then_lookup() {
    let state = make_state(300);
    let router = build_router(Arc::clone(&state));

    let (status, json) = send(
        router.clone(),
        Method::POST,
        "/api/drivers",
        Some(ping(7, 1_000, 40.0, -73.0)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);

    let (status, json) = send(router, Method::GET, "/api/drivers/7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["agent"], 7);

    let snapshot = state.store.get(AgentId(7)).unwrap();
    assert_eq!(snapshot.expires_at, Some(1_300));
    assert_eq!(snapshot.last_location, Location::new(40.0, -73.0));
}

#[tokio::test]
async fn unknown_driver_is_not_found() {
    let router = build_router(make_state(300));
    let (status, json) = send(router, Method::GET, "/api/drivers/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "driver 99 does not exist");
}

#[tokio::test]
async fn malformed_payload_gets_failure_envelope() {
    let router = build_router(make_state(300));
    let (status, json) = send(
        router,
        Method::POST,
        "/api/drivers",
        Some(json!({ "timestamp": 1, "location": { "lat": 0.0, "lon": 0.0 } })),
    )
    .await;
    assert!(status.is_client_error());
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn nearest_orders_by_distance() {
    let router = build_router(make_state(300));
    let points = [
        (1, 1.0, 1.0),
        (2, 2.0, 2.0),
        (3, 0.5, 0.5),
        (4, 10.0, 10.0),
        (5, -10.0, -10.0),
    ];
    for (id, lat, lon) in points {
        let (status, _) = send(
            router.clone(),
            Method::POST,
            "/api/drivers",
            Some(ping(id, 1_000, lat, lon)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = send(
        router.clone(),
        Method::GET,
        "/api/drivers/nearest?lat=0&lon=0&limit=3",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["agents"], json!([3, 1, 2]));

    let (_, json) = send(
        router,
        Method::GET,
        "/api/drivers/nearest?lat=0&lon=0&radius=1.5",
        None,
    )
    .await;
    assert_eq!(json["agents"], json!([3, 1]));
}

#[tokio::test]
async fn nearest_rejects_zero_limit() {
    let router = build_router(make_state(300));
    let (status, json) = send(
        router,
        Method::GET,
        "/api/drivers/nearest?lat=0&lon=0&limit=0",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn delete_removes_driver() {
    let router = build_router(make_state(0));
    send(
        router.clone(),
        Method::POST,
        "/api/drivers",
        Some(ping(5, 1, 3.0, 4.0)),
    )
    .await;

    let (status, _) = send(router.clone(), Method::DELETE, "/api/drivers/5", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(router.clone(), Method::DELETE, "/api/drivers/5", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, json) = send(router, Method::GET, "/api/drivers/nearest?lat=3&lon=4", None).await;
    assert_eq!(json["agents"], json!([]));
}

#[tokio::test]
async fn history_is_bounded() {
    let state = make_state(0);
    let router = build_router(Arc::clone(&state));
    for ts in 1..=5_i64 {
        #[allow(clippy::cast_precision_loss)]
        let lat = ts as f64;
        send(
            router.clone(),
            Method::POST,
            "/api/drivers",
            Some(ping(8, ts, lat, 0.0)),
        )
        .await;
    }

    let (status, json) = send(router, Method::GET, "/api/drivers/8/history", None).await;
    assert_eq!(status, StatusCode::OK);
    let timestamps: Vec<i64> = json["history"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["timestamp"].as_i64().unwrap())
        .collect();
    assert_eq!(timestamps, vec![3, 4, 5]);
    assert_eq!(state.store.get(AgentId(8)).unwrap().expires_at, None);
}

#[tokio::test]
async fn non_numeric_id_is_bad_request() {
    let router = build_router(make_state(300));
    let (status, json) = send(router, Method::GET, "/api/drivers/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
}
