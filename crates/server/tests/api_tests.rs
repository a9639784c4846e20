//! Router tests against an in-process server.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use common::{fixtures, TestFixture};
use ticketscout_core::FetchResponse;

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_summary() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);

    let body = &response.body;
    assert_eq!(body["platforms"].as_array().unwrap().len(), 6);
    assert_eq!(body["strategies"]["aggressive"]["concurrency"], 5);
    assert_eq!(body["database_enabled"], false);
    assert!(body["demand_profiles"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p["id"] == "el_clasico"));
}

#[tokio::test]
async fn test_scrape_returns_report() {
    let fixture = TestFixture::new();
    fixture.fetcher.respond(
        "q=PSG",
        FetchResponse::ok(fixtures::event_page(
            "PSG vs Marseille",
            "2026-03-15",
            85.0,
            "InStock",
        )),
    );

    let response = fixture
        .post(
            "/api/v1/scrape",
            json!({ "keyword": "PSG vs Marseille", "platforms": ["psg"] }),
        )
        .await;
    assert_status!(response, StatusCode::OK);

    let body = &response.body;
    assert_eq!(body["profile_id"], "standard");
    assert_eq!(body["cancelled"], false);
    assert_eq!(body["tickets"].as_array().unwrap().len(), 1);
    assert_eq!(body["tickets"][0]["platform"], "psg");
    assert_eq!(body["platform_stats"]["psg"]["outcome"], "completed");
}

#[tokio::test]
async fn test_scrape_unknown_platform_is_bad_request() {
    let fixture = TestFixture::new();
    let response = fixture
        .post(
            "/api/v1/scrape",
            json!({ "keyword": "Ajax vs PSV", "platforms": ["ajax"] }),
        )
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("ajax"));
    assert_eq!(fixture.fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_scrape_rejects_malformed_body() {
    let fixture = TestFixture::new();
    let response = fixture
        .post("/api/v1/scrape", json!({ "platforms": ["psg"] }))
        .await;
    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_queue_inspect_and_clear() {
    let fixture = TestFixture::new();

    let response = fixture.get("/api/v1/queue/real_madrid").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["in_queue"], false);
    assert_eq!(response.body["state"], serde_json::Value::Null);

    fixture
        .state
        .scout()
        .queue()
        .mark_in_queue("real_madrid", "execution-1", &fixtures::queue_page(1200, 40))
        .await
        .unwrap();

    let response = fixture.get("/api/v1/queue/real_madrid").await;
    assert_eq!(response.body["in_queue"], true);
    assert_eq!(response.body["state"]["position"], 1200);
    assert_eq!(response.body["state"]["owner"], "execution-1");
    assert!(response.body["marker_remaining_secs"].as_u64().unwrap() > 0);

    let response = fixture.delete("/api/v1/queue/real_madrid").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["cleared"], true);

    let response = fixture.get("/api/v1/queue/real_madrid").await;
    assert_eq!(response.body["in_queue"], false);
}

#[tokio::test]
async fn test_queue_unknown_platform() {
    let fixture = TestFixture::new();
    let response = fixture.get("/api/v1/queue/ajax").await;
    assert_status!(response, StatusCode::NOT_FOUND);
    let response = fixture.delete("/api/v1/queue/ajax").await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_high_demand_scrape_registers_watch() {
    let fixture = TestFixture::new();

    let response = fixture
        .post(
            "/api/v1/scrape",
            json!({ "keyword": "Real Madrid vs Barcelona", "platforms": ["real_madrid"] }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["pre_sale_monitoring"], true);

    let response = fixture.get("/api/v1/watches").await;
    let watches = response.body.as_array().unwrap();
    assert_eq!(watches.len(), 1);
    assert_eq!(watches[0]["profile_id"], "el_clasico");
    assert_eq!(watches[0]["interval_secs"], 30);

    let key = watches[0]["key"].as_str().unwrap().replace(' ', "%20");
    let response = fixture.delete(&format!("/api/v1/watches/{key}")).await;
    assert_status!(response, StatusCode::NO_CONTENT);

    let response = fixture.delete(&format!("/api/v1/watches/{key}")).await;
    assert_status!(response, StatusCode::NOT_FOUND);
    assert!(fixture.get("/api/v1/watches").await.body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cooling_down_platform_is_skipped() {
    let fixture = TestFixture::new();
    fixture
        .state
        .scout()
        .cooldowns()
        .mark("psg", "blocked:429", Duration::from_secs(120))
        .await
        .unwrap();

    let response = fixture
        .post(
            "/api/v1/scrape",
            json!({ "keyword": "PSG vs Lens", "platforms": ["psg"] }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["platform_stats"]["psg"]["outcome"], "cooling_down");
    assert_eq!(fixture.fetcher.fetch_count(), 0);

    let response = fixture.get("/api/v1/platforms").await;
    assert_status!(response, StatusCode::OK);
    let platforms = response.body.as_array().unwrap();
    let psg = platforms.iter().find(|p| p["id"] == "psg").unwrap();
    assert!(psg["cooldown_remaining_secs"].as_u64().unwrap() > 100);
    assert_eq!(psg["in_queue"], false);
    assert_eq!(psg["rate_limit"]["requests_per_minute"], 6000);

    let juventus = platforms.iter().find(|p| p["id"] == "juventus").unwrap();
    assert_eq!(juventus["cooldown_remaining_secs"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new();
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("ticketscout_http_requests_total"));
    assert!(body.contains("ticketscout_watches_active"));
    assert!(body.contains("ticketscout_platform_queued"));
}
