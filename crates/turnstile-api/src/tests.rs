//! Router tests driving the JSON API against an in-memory SQLite store.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use http_body_util::BodyExt as _;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use turnstile_store_sqlite::SqliteStore;

use crate::api_router;

async fn app() -> Router {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  api_router(Arc::new(store))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
  Request::builder()
    .method("POST")
    .uri(uri)
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(body.to_string()))
    .unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
  Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
  let bytes = response.into_body().collect().await.unwrap().to_bytes();
  serde_json::from_slice(&bytes).unwrap()
}

/// POST and return the parsed body, asserting the expected status.
async fn send(app: &Router, req: Request<Body>, expect: StatusCode) -> Value {
  let response = app.clone().oneshot(req).await.unwrap();
  assert_eq!(response.status(), expect);
  body_json(response).await
}

async fn enroll(app: &Router, card: &str, username: &str) -> String {
  let body = send(
    app,
    post_json(
      "/identities",
      json!({ "username": username, "display_name": username, "card_id": card }),
    ),
    StatusCode::CREATED,
  )
  .await;
  body["identity_id"].as_str().unwrap().to_owned()
}

async fn add_facility(app: &Router, capacity: u32) -> String {
  let body = send(
    app,
    post_json("/facilities", json!({ "name": "workshop", "capacity": capacity })),
    StatusCode::CREATED,
  )
  .await;
  body["facility_id"].as_str().unwrap().to_owned()
}

async fn add_event(app: &Router, slug: &str, minimum: i64) -> Value {
  send(
    app,
    post_json(
      "/events",
      json!({
        "slug": slug,
        "name": "Hack Night",
        "minimum_attendance_minutes": minimum,
        "starts_at": "2026-06-01T09:00:00Z",
        "ends_at": "2026-06-01T23:00:00Z",
      }),
    ),
    StatusCode::CREATED,
  )
  .await
}

#[tokio::test]
async fn scan_toggles_occupancy_over_http() {
  let app = app().await;
  enroll(&app, "card-a", "alice").await;
  let facility_id = add_facility(&app, 5).await;

  let scan = json!({
    "card_id": "card-a",
    "facility_id": facility_id,
    "scanned_at": "2026-06-01T09:00:00Z",
  });

  let entered = send(&app, post_json("/scans", scan.clone()), StatusCode::OK).await;
  assert_eq!(entered["action"], "enter");
  assert_eq!(entered["occupancy"]["current"], 1);
  assert_eq!(entered["access_event"]["success"], true);

  let report = send(
    &app,
    get_req(&format!("/facilities/{facility_id}/occupancy")),
    StatusCode::OK,
  )
  .await;
  assert_eq!(report["current"], 1);
  assert_eq!(report["available"], 4);

  let exited = send(&app, post_json("/scans", scan), StatusCode::OK).await;
  assert_eq!(exited["action"], "exit");
  assert_eq!(exited["occupancy"]["current"], 0);
}

#[tokio::test]
async fn error_taxonomy_maps_to_statuses() {
  let app = app().await;
  enroll(&app, "card-a", "alice").await;
  let full = add_facility(&app, 0).await;

  // Unknown card: NotFound → 404.
  let body = send(
    &app,
    post_json(
      "/scans",
      json!({
        "card_id": "ghost",
        "facility_id": full,
        "scanned_at": "2026-06-01T09:00:00Z",
      }),
    ),
    StatusCode::NOT_FOUND,
  )
  .await;
  assert!(body["error"].as_str().unwrap().contains("ghost"));

  // Capacity: PolicyViolation → 403.
  send(
    &app,
    post_json(
      "/scans",
      json!({
        "card_id": "card-a",
        "facility_id": full,
        "scanned_at": "2026-06-01T09:01:00Z",
      }),
    ),
    StatusCode::FORBIDDEN,
  )
  .await;

  // Both denials are nonetheless on the audit trail.
  let events = send(
    &app,
    get_req(&format!("/access-events?facility_id={full}&success=false")),
    StatusCode::OK,
  )
  .await;
  assert_eq!(events.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn attendance_flow_over_http() {
  let app = app().await;
  let identity_id = enroll(&app, "card-a", "alice").await;
  add_event(&app, "hack-night", 60).await;

  send(
    &app,
    post_json(
      "/events/hack-night/attendees",
      json!({ "identity_id": identity_id }),
    ),
    StatusCode::CREATED,
  )
  .await;

  // Registering twice conflicts.
  send(
    &app,
    post_json(
      "/events/hack-night/attendees",
      json!({ "identity_id": identity_id }),
    ),
    StatusCode::CONFLICT,
  )
  .await;

  let toggle = |at: &str| {
    json!({ "card_id": "card-a", "scanned_at": at })
  };

  let check_in = send(
    &app,
    post_json("/events/hack-night/attendance", toggle("2026-06-01T09:00:00Z")),
    StatusCode::OK,
  )
  .await;
  assert_eq!(check_in["action"], "checked_in");

  // Checkout before check-in time: InvalidInput → 400.
  send(
    &app,
    post_json("/events/hack-night/attendance", toggle("2026-06-01T08:00:00Z")),
    StatusCode::BAD_REQUEST,
  )
  .await;

  let check_out = send(
    &app,
    post_json("/events/hack-night/attendance", toggle("2026-06-01T10:30:00Z")),
    StatusCode::OK,
  )
  .await;
  assert_eq!(check_out["action"], "checked_out");
  assert_eq!(check_out["attendee"]["total_seconds"], 5400);
  assert_eq!(check_out["attendee"]["is_eligible"], true);

  let sessions = send(
    &app,
    get_req(&format!("/events/hack-night/attendees/{identity_id}/sessions")),
    StatusCode::OK,
  )
  .await;
  assert_eq!(sessions.as_array().unwrap().len(), 1);

  // Unregister cascades; the attendee is gone afterwards.
  let response = app
    .clone()
    .oneshot(
      Request::builder()
        .method("DELETE")
        .uri(format!("/events/hack-night/attendees/{identity_id}"))
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::NO_CONTENT);

  send(
    &app,
    get_req(&format!("/events/hack-night/attendees/{identity_id}")),
    StatusCode::NOT_FOUND,
  )
  .await;
}

#[tokio::test]
async fn missing_event_is_404() {
  let app = app().await;
  send(&app, get_req("/events/nope"), StatusCode::NOT_FOUND).await;
}
