//! Common test utilities for course-sync integration tests

#![allow(dead_code)]

use course_sync::{Config, CourseSync, EntityId, HttpContentApi, RetryConfig};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration pointing at `server`, with fast deterministic retries
pub fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.api.base_url = format!("{}/api/", server.uri());
    config.api.timeout = Duration::from_secs(5);
    config.retry = RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// HTTP collaborator pointing at `server`
pub fn http_api(server: &MockServer) -> HttpContentApi {
    HttpContentApi::new(&config_for(server)).unwrap()
}

/// Facade pointing at `server`
pub fn course_sync(server: &MockServer) -> CourseSync {
    CourseSync::new(config_for(server)).unwrap()
}

/// Minimal lesson record as the content API returns it
pub fn lesson(id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Lesson {id}"),
        "status": status,
        "categories": []
    })
}

/// Validated IDs from raw integers
pub fn ids(raw: &[i64]) -> Vec<EntityId> {
    raw.iter().map(|&id| EntityId::new(id).unwrap()).collect()
}

/// Serve `GET /api/entities/{id}` with `body`, expecting exactly `times` requests
pub async fn mount_entity(server: &MockServer, id: i64, body: Value, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/api/entities/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}
