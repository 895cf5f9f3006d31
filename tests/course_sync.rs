//! End-to-end behavior of the sync layer over HTTP

mod common;

use common::*;
use course_sync::{CategoryUpdate, CompletionTarget, EntityStatus, Event, MixedOperations};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn concurrent_lookups_share_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/entities/42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(lesson(42, "publish"))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let sync = course_sync(&server);
    let lookups = (0..10).map(|_| {
        let sync = sync.clone();
        tokio::spawn(async move { sync.cache().get(42, false).await })
    });
    let results = futures::future::join_all(lookups).await;

    for result in results {
        let entity = result.unwrap().unwrap();
        assert_eq!(entity.id.get(), 42);
    }
    assert_eq!(sync.cache().in_flight(), 0);
}

#[tokio::test]
async fn concurrent_lookups_share_one_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/entities/13"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;

    let sync = course_sync(&server);
    let (a, b) = tokio::join!(sync.cache().get(13, false), sync.cache().get(13, false));

    assert_eq!(a.unwrap_err().status(), Some(500));
    assert_eq!(b.unwrap_err().status(), Some(500));
    assert!(sync.cache().is_empty());
}

#[tokio::test]
async fn cached_entity_is_served_without_network() {
    let server = MockServer::start().await;
    mount_entity(&server, 5, lesson(5, "draft"), 2).await;

    let sync = course_sync(&server);
    sync.cache().get(5, false).await.unwrap();
    sync.cache().get(5, false).await.unwrap();
    sync.cache().get_raw("5", false).await.unwrap();

    // Forced refresh goes to the network again
    sync.cache().get(5, true).await.unwrap();
}

#[tokio::test]
async fn failed_lookup_is_retried_on_next_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/entities/8"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_entity(&server, 8, lesson(8, "draft"), 1).await;

    let sync = course_sync(&server);
    assert!(sync.cache().get(8, false).await.is_err());
    assert_eq!(sync.cache().get(8, false).await.unwrap().id.get(), 8);
}

#[tokio::test]
async fn invalid_ids_never_reach_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let sync = course_sync(&server);
    assert!(sync.cache().get(0, false).await.unwrap_err().is_validation());
    assert!(sync.cache().get(-7, false).await.unwrap_err().is_validation());
    assert!(sync.cache().get_raw("4.5", false).await.unwrap_err().is_validation());
}

#[tokio::test]
async fn bulk_delete_reports_partial_failure() {
    let server = MockServer::start().await;
    for id in [101, 102, 104, 105, 106] {
        Mock::given(method("DELETE"))
            .and(path(format!("/api/entities/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "deleted": true })))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("DELETE"))
        .and(path("/api/entities/103"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database is locked"))
        .expect(1)
        .mount(&server)
        .await;

    let sync = course_sync(&server);
    let mut events = sync.subscribe();
    let report = sync.bulk_delete(ids(&[101, 102, 103, 104, 105, 106])).await;

    let mut succeeded: Vec<i64> = report.successful.iter().map(|s| s.item.get()).collect();
    succeeded.sort_unstable();
    assert_eq!(succeeded, vec![101, 102, 104, 105, 106]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].item.get(), 103);
    assert!(report.failed[0].error.contains("database is locked"));
    assert_eq!(report.total, 6);
    assert_eq!(report.summary(), "5 successful, 1 failed");

    assert!(matches!(
        events.recv().await.unwrap(),
        Event::BatchFinished { total: 6, succeeded: 5, failed: 1 }
    ));
}

#[tokio::test]
async fn bulk_apply_runs_every_sub_batch() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/entities/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "deleted": true })))
        .expect(1)
        .mount(&server)
        .await;
    for id in [2, 3] {
        Mock::given(method("PUT"))
            .and(path(format!("/api/entities/{id}")))
            .and(body_json(json!({ "categories": [7] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "categories": [7]
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let sync = course_sync(&server);
    let report = sync
        .bulk_apply(MixedOperations {
            delete: ids(&[1]),
            status: None,
            category: Some(CategoryUpdate {
                ids: ids(&[2, 3]),
                categories: vec![7],
            }),
        })
        .await;

    assert_eq!(report.total, 3);
    assert!(report.all_succeeded());
}

#[tokio::test]
async fn bulk_status_updates_the_cache() {
    let server = MockServer::start().await;
    mount_entity(&server, 11, lesson(11, "draft"), 1).await;
    Mock::given(method("PUT"))
        .and(path("/api/entities/11"))
        .and(body_json(json!({ "status": "pending" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(lesson(11, "pending")))
        .expect(1)
        .mount(&server)
        .await;

    let sync = course_sync(&server);
    assert_eq!(sync.cache().get(11, false).await.unwrap().status(), Some("draft"));

    sync.bulk_set_status(ids(&[11]), EntityStatus::Pending).await;
    assert_eq!(sync.cache().get(11, false).await.unwrap().status(), Some("pending"));
}

#[tokio::test]
async fn step_mark_reconciles_with_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/progress/mark"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "progress": 25.0 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/progress/5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "progress": 25.0 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/progress/5/completed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "content_id": 120004, "content_type": "step", "completed_at": "2024-03-01T10:00:00Z" },
            { "content_id": 31, "content_type": "quiz", "completed_at": "2024-02-11T08:30:00Z" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let sync = course_sync(&server);
    let progress = sync.progress(5).unwrap();
    let target = CompletionTarget::step(880, 12, 4);
    assert!(!progress.is_completed(&target));

    let response = progress.mark_complete(target).await.unwrap();

    assert_eq!(response.progress, Some(25.0));
    assert!(progress.is_completed(&target));
    assert!(progress.is_completed(&CompletionTarget::quiz(31)));
    assert!(!progress.is_completed(&CompletionTarget::step(880, 12, 3)));
    let snapshot = progress.snapshot();
    assert_eq!(snapshot.percentage, 25.0);
    assert_eq!(snapshot.completed.len(), 2);
    assert!(!snapshot.loading);
}

#[tokio::test]
async fn failed_mark_is_propagated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/progress/mark"))
        .respond_with(ResponseTemplate::new(403).set_body_string("not enrolled"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let sync = course_sync(&server);
    let progress = sync.progress(5).unwrap();

    let err = progress
        .mark_complete(CompletionTarget::lesson(12))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(403));
    assert!(!progress.is_completed(&CompletionTarget::lesson(12)));
    assert!(progress.snapshot().last_error.unwrap().contains("not enrolled"));
}

#[tokio::test]
async fn bulk_delete_accepts_no_content_and_invalidates_cache() {
    let server = MockServer::start().await;
    mount_entity(&server, 7, lesson(7, "draft"), 1).await;
    Mock::given(method("DELETE"))
        .and(path("/api/entities/7"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let sync = course_sync(&server);
    sync.cache().get(7, false).await.unwrap();
    assert_eq!(sync.cache().len(), 1);

    let report = sync.bulk_delete(ids(&[7])).await;

    assert!(report.all_succeeded(), "{}", report.summary());
    assert_eq!(report.successful[0].item.get(), 7);
    assert!(sync.cache().is_empty());
}
