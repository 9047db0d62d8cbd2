mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{today, Harness};
use court_booking_server::routes::{create_routes, RouterOptions};

fn app(h: &Harness) -> Router {
    create_routes(
        h.state.clone(),
        &RouterOptions {
            allowed_origins: "http://localhost:5173".into(),
            include_hsts: false,
        },
    )
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn booking_body(h: &Harness, start: &str, end: &str) -> Value {
    json!({
        "resource_id": h.court.id,
        "owner_id": uuid::Uuid::new_v4(),
        "discipline_id": uuid::Uuid::new_v4(),
        "date": today(),
        "start_time": start,
        "end_time": end,
        "attendees": [{ "name": "Ana", "email": "ana@example.com" }],
        "attendee_count": 1
    })
}

#[tokio::test]
async fn test_health_carries_security_headers() {
    let h = Harness::new();
    let response = app(&h).oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert!(response.headers().get("strict-transport-security").is_none());
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_booking_round_trip_over_http() {
    let h = Harness::new();
    let app = app(&h);

    let response = app
        .clone()
        .oneshot(post("/api/v1/reservations", booking_body(&h, "10:00:00", "11:00:00")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"]["reservation"]["state"], "pending");
    assert_eq!(body["data"]["reservation"]["cost"], "100.00");
    assert!(body["data"]["payment_url"].is_string());
    assert!(body.get("warnings").is_none());
    let code = body["data"]["reservation"]["code"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/payments/callback",
            json!({
                "transaction_id": h.gateway.last_transaction(),
                "status": "completed",
                "amount": "100.00"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["reservation"]["state"], "confirmed");
    assert_eq!(body["data"]["replayed"], false);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/v1/reservations/{code}")))
        .await
        .unwrap();
    let body = body_json(response).await;
    let attendee = &body["data"]["attendees"][0];
    assert!(attendee["qr_code"].is_string());
    assert!(attendee.get("token_hash").is_none());

    let response = app
        .oneshot(post("/api/v1/reservations", booking_body(&h, "10:30:00", "11:30:00")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAVAILABLE");
}

#[tokio::test]
async fn test_coupon_warning_in_envelope() {
    let h = Harness::new();
    let mut body = booking_body(&h, "12:00:00", "13:00:00");
    body["coupon_code"] = json!("GHOST");

    let response = app(&h)
        .oneshot(post("/api/v1/reservations", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["warnings"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["reservation"]["cost"], "100.00");
}

#[tokio::test]
async fn test_malformed_requests_use_error_envelope() {
    let h = Harness::new();
    let response = app(&h)
        .oneshot(post("/api/v1/reservations", json!({ "resource_id": "nope" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let response = app(&h)
        .oneshot(get("/api/v1/resources/not-a-uuid/availability?date=2026-06-01"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_availability_and_day_sheet() {
    let h = Harness::new();
    let app = app(&h);
    app.clone()
        .oneshot(post("/api/v1/reservations", booking_body(&h, "07:00:00", "08:00:00")))
        .await
        .unwrap();

    let uri = format!("/api/v1/resources/{}/availability?date={}", h.court.id, today());
    let body = body_json(app.clone().oneshot(get(&uri)).await.unwrap()).await;
    let slots = body["data"].as_array().unwrap();
    assert_eq!(slots.len(), 17);
    assert_eq!(slots[0]["start"], "06:00:00");
    assert_eq!(slots[0]["is_free"], true);
    assert_eq!(slots[1]["is_free"], false);

    let uri = format!("/api/v1/resources/{}/reservations?date={}", h.court.id, today());
    let body = body_json(app.clone().oneshot(get(&uri)).await.unwrap()).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let uri = format!(
        "/api/v1/resources/{}/availability?date={}",
        uuid::Uuid::new_v4(),
        today()
    );
    let response = app.oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_access_denial_codes() {
    let h = Harness::new();
    let response = app(&h)
        .oneshot(post(
            "/api/v1/access/verify",
            json!({ "qr_code": "QR-missing", "token": "whatever" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_cancel_and_state_errors() {
    let h = Harness::new();
    let app = app(&h);
    let body = body_json(
        app.clone()
            .oneshot(post("/api/v1/reservations", booking_body(&h, "15:00:00", "16:00:00")))
            .await
            .unwrap(),
    )
    .await;
    let code = body["data"]["reservation"]["code"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/v1/reservations/{code}/cancel"),
            json!({ "reason": "changed plans" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post(&format!("/api/v1/reservations/{code}/checkout"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_STATE");
    assert_eq!(body["error"]["details"]["current_state"], "cancelled");

    let response = app
        .oneshot(post("/api/v1/reservations/complete-elapsed", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_coupon_endpoints() {
    let h = Harness::new();
    let app = app(&h);

    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/coupons",
            json!({ "code": "spring", "kind": "percentage", "magnitude": "20" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/coupons/batch",
            json!({ "prefix": "VIP", "count": 3, "kind": "fixed", "magnitude": "10" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    let body = body_json(
        app.oneshot(get("/api/v1/coupons/SPRING/validate"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["data"]["valid"], true);
}

fn post_raw(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_cancel_body_is_optional_but_must_be_valid() {
    let h = Harness::new();
    let app = app(&h);
    let mut codes = Vec::new();
    for (start, end) in [("09:00:00", "10:00:00"), ("11:00:00", "12:00:00")] {
        let body = body_json(
            app.clone()
                .oneshot(post("/api/v1/reservations", booking_body(&h, start, end)))
                .await
                .unwrap(),
        )
        .await;
        codes.push(body["data"]["reservation"]["code"].as_str().unwrap().to_string());
    }

    let response = app
        .clone()
        .oneshot(post_raw(
            &format!("/api/v1/reservations/{}/cancel", codes[0]),
            "{\"reason\": ",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
    let still = h.state.reservations.details(&codes[0]).await.unwrap();
    assert_eq!(still.reservation.state.as_str(), "pending");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/reservations/{}/cancel", codes[1]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["state"], "cancelled");
}

#[tokio::test]
async fn test_coupon_state_endpoints() {
    let h = Harness::new();
    let app = app(&h);
    app.clone()
        .oneshot(post(
            "/api/v1/coupons",
            json!({ "code": "HOLD", "kind": "fixed", "magnitude": "5" }),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post("/api/v1/coupons/hold/deactivate", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["state"], "inactive");

    let response = app
        .clone()
        .oneshot(post("/api/v1/coupons/HOLD/deactivate", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_STATE");
    assert_eq!(body["error"]["details"]["current_state"], "inactive");

    let response = app
        .oneshot(post("/api/v1/coupons/HOLD/activate", json!({})))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["data"]["state"], "active");
}

#[tokio::test]
async fn test_resend_credentials_endpoint() {
    let h = Harness::new();
    let app = app(&h);
    let body = body_json(
        app.clone()
            .oneshot(post("/api/v1/reservations", booking_body(&h, "18:00:00", "19:00:00")))
            .await
            .unwrap(),
    )
    .await;
    let code = body["data"]["reservation"]["code"].as_str().unwrap().to_string();

    let response = app
        .oneshot(post(&format!("/api/v1/reservations/{code}/credentials"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["details"]["current_state"], "pending");
    assert_eq!(body["error"]["details"]["action"], "issue credentials for");
}
