use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use service::clock::SystemClock;
use service::domain::Actor;
use service::notify::EventPublisher;
use service::{AppContext, MarketSettings};
use tower::ServiceExt;
use uuid::Uuid;

use server::auth::issue_token;

const SECRET: &str = "test-secret";

fn build_app() -> Router {
    let (publisher, _rx) = EventPublisher::channel();
    let settings = MarketSettings { sweep_interval_secs: 0, ..MarketSettings::default() };
    let ctx = AppContext::in_memory(Arc::new(SystemClock), publisher, settings);
    server::build_app(ctx, SECRET)
}

fn token(actor: Actor) -> String {
    issue_token(SECRET, actor, 3600).expect("sign token")
}

async fn call(app: &Router, method: &str, uri: &str, who: Option<Actor>, body: Option<Value>) -> anyhow::Result<(StatusCode, Value)> {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(actor) = who {
        req = req.header("authorization", format!("Bearer {}", token(actor)));
    }
    let req = match body {
        Some(b) => req.header("content-type", "application/json").body(Body::from(serde_json::to_vec(&b)?))?,
        None => req.body(Body::empty())?,
    };
    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, value))
}

fn request_body() -> Value {
    json!({
        "title": "Paint two bedrooms",
        "description": "Walls need a fresh coat",
        "serviceCategory": "PAINTING",
        "location": { "address": "4 Mall Road", "city": "Lahore" },
        "urgency": "HIGH",
        "budget": { "min": 1000, "max": 5000 }
    })
}

#[tokio::test]
async fn health_is_public() -> anyhow::Result<()> {
    let app = build_app();
    let (status, body) = call(&app, "GET", "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn missing_token_is_unauthorized() -> anyhow::Result<()> {
    let app = build_app();
    let (status, body) = call(&app, "POST", "/service-requests", None, Some(request_body())).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    Ok(())
}

#[tokio::test]
async fn malformed_input_is_a_json_validation_error() -> anyhow::Result<()> {
    let app = build_app();
    let customer = Actor::customer(Uuid::new_v4());
    let mut body = request_body();
    if let Some(fields) = body.as_object_mut() {
        fields.remove("description");
    }
    let (status, err) = call(&app, "POST", "/service-requests", Some(customer), Some(body)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["success"], false);
    assert!(err["message"].as_str().is_some_and(|m| m.contains("description")), "{err}");

    let (status, err) = call(&app, "GET", "/service-requests/not-a-uuid", Some(customer), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["message"].is_string());

    let (status, err) = call(&app, "GET", "/service-requests?page=abc", Some(customer), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["message"].is_string());
    Ok(())
}

#[tokio::test]
async fn bid_and_award_flow() -> anyhow::Result<()> {
    let app = build_app();
    let customer = Actor::customer(Uuid::new_v4());
    let (x, y) = (Actor::servian(Uuid::new_v4()), Actor::servian(Uuid::new_v4()));

    let (status, created) = call(&app, "POST", "/service-requests", Some(customer), Some(request_body())).await?;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_str().unwrap_or_default().to_string();
    assert_eq!(created["data"]["status"], "ACTIVE");

    let bid_uri = format!("/service-requests/{id}/bid");
    let (status, bid) = call(&app, "POST", &bid_uri, Some(x), Some(json!({ "amount": 3000 }))).await?;
    assert_eq!(status, StatusCode::CREATED);
    let bid_id = bid["data"]["id"].as_str().unwrap_or_default().to_string();

    let (status, body) = call(&app, "POST", &bid_uri, Some(x), Some(json!({ "amount": 3200 }))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 2005);

    let (status, _) = call(&app, "POST", &bid_uri, Some(y), Some(json!({ "amount": 7000 }))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // customers cannot bid, servians cannot accept
    let (status, _) = call(&app, "POST", &bid_uri, Some(customer), Some(json!({ "amount": 3000 }))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let accept_uri = format!("/service-requests/{id}/accept-bid/{bid_id}");
    let (status, _) = call(&app, "PUT", &accept_uri, Some(x), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, awarded) = call(&app, "PUT", &accept_uri, Some(customer), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(awarded["data"]["status"], "AWARDED");

    let (status, _) = call(&app, "PUT", &accept_uri, Some(customer), None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = call(&app, "POST", &bid_uri, Some(y), Some(json!({ "amount": 3000 }))).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, "PUT", &format!("/service-requests/{id}/complete"), Some(customer), None).await?;
    assert_eq!(status, StatusCode::OK);
    let review = json!({ "rating": 5, "comment": "Great job" });
    let review_uri = format!("/service-requests/{id}/review");
    let (status, _) = call(&app, "POST", &review_uri, Some(customer), Some(review.clone())).await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(&app, "POST", &review_uri, Some(customer), Some(review)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, profile) = call(&app, "GET", &format!("/profiles/{}", x.id), Some(customer), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["data"]["profile"]["role"], "servian");
    assert_eq!(profile["data"]["profile"]["totalReviews"], 1);
    Ok(())
}

#[tokio::test]
async fn strangers_see_not_found() -> anyhow::Result<()> {
    let app = build_app();
    let owner = Actor::customer(Uuid::new_v4());
    let (_, created) = call(&app, "POST", "/service-requests", Some(owner), Some(request_body())).await?;
    let id = created["data"]["id"].as_str().unwrap_or_default().to_string();

    let stranger = Actor::customer(Uuid::new_v4());
    let (status, body) = call(&app, "GET", &format!("/service-requests/{id}"), Some(stranger), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "service request not found");
    let (status, _) = call(&app, "PUT", &format!("/service-requests/{id}/cancel"), Some(stranger), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, "PUT", &format!("/service-requests/{id}/cancel"), Some(owner), Some(json!({ "reason": "changed plans" }))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "CANCELLED");
    Ok(())
}

#[tokio::test]
async fn free_tier_quota_returns_429() -> anyhow::Result<()> {
    let app = build_app();
    let customer = Actor::customer(Uuid::new_v4());
    for _ in 0..3 {
        let (status, _) = call(&app, "POST", "/service-requests", Some(customer), Some(request_body())).await?;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = call(&app, "POST", "/service-requests", Some(customer), Some(request_body())).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], 2009);

    let (status, list) = call(&app, "GET", "/service-requests?status=active&limit=2", Some(customer), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["data"]["items"].as_array().map(Vec::len), Some(2));
    assert_eq!(list["data"]["pagination"]["total"], 3);

    let (_, stats) = call(&app, "GET", "/service-requests/stats", Some(customer), None).await?;
    assert_eq!(stats["data"]["active"], 3);
    Ok(())
}

#[tokio::test]
async fn servian_browses_open_requests() -> anyhow::Result<()> {
    let app = build_app();
    let customer = Actor::customer(Uuid::new_v4());
    let servian = Actor::servian(Uuid::new_v4());
    call(&app, "POST", "/service-requests", Some(customer), Some(request_body())).await?;

    let (status, open) = call(&app, "GET", "/service-requests/open?category=painting", Some(servian), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(open["data"]["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(open["data"]["items"][0]["timeLeft"], 7);

    let (status, _) = call(&app, "GET", "/service-requests/open?category=roofing", Some(servian), None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, stats) = call(&app, "GET", "/servian/stats", Some(servian), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["data"]["totalBids"], 0);
    Ok(())
}
