// libs/doctor-cell/tests/handlers_test.rs

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use doctor_cell::models::{BookedInterval, DoctorProfile};
use doctor_cell::router::{doctor_routes, DoctorCellState};
use doctor_cell::services::{BookingLedger, InMemoryScheduleStore, ScheduleService};
use shared_database::DatabaseError;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct NoBookings;

#[async_trait]
impl BookingLedger for NoBookings {
    async fn active_bookings(
        &self,
        _doctor_id: Uuid,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<BookedInterval>, DatabaseError> {
        Ok(Vec::new())
    }
}

struct TestApp {
    router: Router,
    secret: String,
    doctor: TestUser,
    doctor_id: Uuid,
}

async fn create_test_app() -> TestApp {
    let test_config = TestConfig::default();
    let config = test_config.to_arc();

    let store = InMemoryScheduleStore::new();
    let doctor_id = Uuid::new_v4();
    store
        .register_doctor(DoctorProfile::new(doctor_id, "Europe/London"))
        .await;

    let schedules = Arc::new(ScheduleService::new(Arc::new(store), Arc::new(NoBookings), &config));
    let state = Arc::new(DoctorCellState { config, schedules });

    TestApp {
        router: doctor_routes(state),
        secret: test_config.jwt_secret.clone(),
        doctor: TestUser::with_id(doctor_id, "doctor@example.com", "doctor"),
        doctor_id,
    }
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    user: Option<&TestUser>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header(AUTHORIZATION, JwtTestUtils::bearer(user, &app.secret));
    }
    let request = match body {
        Some(body) => request
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn monday_schedule() -> Value {
    json!({
        "slot_duration_minutes": 30,
        "days": [
            { "day": "monday", "ranges": [{ "start": "09:00:00", "end": "12:00:00" }] }
        ]
    })
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let app = create_test_app().await;
    let uri = format!("/{}/schedule", app.doctor_id);

    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn doctor_publishes_schedule_and_reads_slots() {
    let app = create_test_app().await;
    let doctor = &app.doctor;

    let uri = format!("/{}/schedule", app.doctor_id);
    let (status, body) = send(&app, Method::PUT, &uri, Some(doctor), Some(monday_schedule())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slot_duration_minutes"], 30);

    let (status, body) = send(&app, Method::GET, &uri, Some(doctor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["days"][0]["day"], "monday");

    // 2030-01-07 is a Monday; London is on GMT in January.
    let uri = format!("/{}/slots?from=2030-01-07", app.doctor_id);
    let (status, body) = send(&app, Method::GET, &uri, Some(doctor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 6);
    assert_eq!(body["slots"][0]["start"], "2030-01-07T09:00:00Z");

    let uri = format!("/{}/open-intervals?from=2030-01-07&to=2030-01-13", app.doctor_id);
    let (status, body) = send(&app, Method::GET, &uri, Some(doctor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn other_doctors_cannot_edit_the_schedule() {
    let app = create_test_app().await;
    let intruder = TestUser::doctor("other@example.com");

    let uri = format!("/{}/schedule", app.doctor_id);
    let (status, _) = send(&app, Method::PUT, &uri, Some(&intruder), Some(monday_schedule())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = TestUser::admin("admin@example.com");
    let (status, _) = send(&app, Method::PUT, &uri, Some(&admin), Some(monday_schedule())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn exception_lifecycle_over_http() {
    let app = create_test_app().await;
    let doctor = &app.doctor;
    let uri = format!("/{}/exceptions", app.doctor_id);
    let blocked = json!({ "date": "2030-01-07", "kind": "fully_blocked", "reason": "Holiday" });

    let (status, created) = send(&app, Method::POST, &uri, Some(doctor), Some(blocked.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["kind"], "fully_blocked");

    let (status, body) = send(&app, Method::POST, &uri, Some(doctor), Some(blocked)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    let (status, body) = send(&app, Method::GET, &uri, Some(doctor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let id = created["id"].as_str().unwrap();
    let delete_uri = format!("/{}/exceptions/{}", app.doctor_id, id);
    let (status, body) = send(&app, Method::DELETE, &delete_uri, Some(doctor), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], true);

    let (status, _) = send(&app, Method::DELETE, &delete_uri, Some(doctor), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_input_maps_to_bad_request() {
    let app = create_test_app().await;
    let doctor = &app.doctor;

    let overlapping = json!({
        "slot_duration_minutes": 30,
        "days": [{
            "day": "monday",
            "ranges": [
                { "start": "09:00:00", "end": "11:00:00" },
                { "start": "10:00:00", "end": "12:00:00" }
            ]
        }]
    });
    let uri = format!("/{}/schedule", app.doctor_id);
    let (status, body) = send(&app, Method::PUT, &uri, Some(doctor), Some(overlapping)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let uri = format!("/{}/slots?from=2030-01-07&to=2031-01-07", app.doctor_id);
    let (status, _) = send(&app, Method::GET, &uri, Some(doctor), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/{}/schedule", Uuid::new_v4());
    let (status, _) = send(&app, Method::GET, &uri, Some(doctor), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
