//! Shared test helpers: a scripted in-memory content API.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

use crate::api::ContentApi;
use crate::error::{Error, Result};
use crate::progress::key::completion_key;
use crate::types::{
    CompletionTarget, CourseProgress, Entity, EntityId, EntityUpdate, MarkRequest, MarkResponse,
    ProgressRecord,
};

/// In-memory [`ContentApi`] with call counters, scripted failures and gates.
///
/// Marks are applied to a server-side completed list the way the real
/// server does it (steps keyed by composite key), so reconciliation returns
/// realistic data.
#[derive(Default)]
pub(crate) struct FakeApi {
    entities: Mutex<HashMap<i64, Value>>,
    failing: Mutex<HashMap<i64, u16>>,
    get_delay: Mutex<Duration>,
    action_delays: Mutex<HashMap<i64, Duration>>,
    get_calls: Mutex<HashMap<i64, usize>>,
    pub(crate) delete_calls: AtomicUsize,
    pub(crate) update_calls: AtomicUsize,
    pub(crate) mark_calls: AtomicUsize,
    pub(crate) unmark_calls: AtomicUsize,
    pub(crate) progress_calls: AtomicUsize,
    pub(crate) completed_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub(crate) max_in_flight: AtomicUsize,
    server_completed: Mutex<Vec<ProgressRecord>>,
    server_percentage: Mutex<f64>,
    mark_progress: Mutex<Option<f64>>,
    fail_marks: AtomicBool,
    fail_reads: AtomicBool,
    ignore_marks: AtomicBool,
    completed_gate: Mutex<Option<Arc<Semaphore>>>,
    /// Notified after each mark/unmark call is answered
    pub(crate) marked: Notify,
}

impl FakeApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add_entity(&self, id: i64, mut fields: Value) {
        if let Some(map) = fields.as_object_mut() {
            map.insert("id".to_string(), json!(id));
        }
        self.entities.lock().unwrap().insert(id, fields);
        self.failing.lock().unwrap().remove(&id);
    }

    pub(crate) fn fail_entity(&self, id: i64, status: u16) {
        self.failing.lock().unwrap().insert(id, status);
    }

    pub(crate) fn set_get_delay(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = delay;
    }

    /// Delay applied to delete/update of `id`
    pub(crate) fn set_action_delay(&self, id: i64, delay: Duration) {
        self.action_delays.lock().unwrap().insert(id, delay);
    }

    pub(crate) fn get_calls(&self, id: i64) -> usize {
        self.get_calls.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    pub(crate) fn total_get_calls(&self) -> usize {
        self.get_calls.lock().unwrap().values().sum()
    }

    pub(crate) fn set_server_progress(&self, percentage: f64, completed: Vec<ProgressRecord>) {
        *self.server_percentage.lock().unwrap() = percentage;
        *self.server_completed.lock().unwrap() = completed;
    }

    pub(crate) fn server_completed(&self) -> Vec<ProgressRecord> {
        self.server_completed.lock().unwrap().clone()
    }

    /// Percentage returned by mark/unmark responses (None = omitted)
    pub(crate) fn set_mark_progress(&self, progress: Option<f64>) {
        *self.mark_progress.lock().unwrap() = progress;
    }

    pub(crate) fn set_fail_marks(&self, fail: bool) {
        self.fail_marks.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Accept marks without recording them server-side
    pub(crate) fn set_ignore_marks(&self, ignore: bool) {
        self.ignore_marks.store(ignore, Ordering::SeqCst);
    }

    /// Hold the next completed-content read until the returned semaphore gets
    /// a permit. The read answers with the list as it was when it arrived.
    pub(crate) fn gate_next_completed_read(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.completed_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn status_error(status: u16, path: String) -> Error {
        Error::HttpStatus {
            status,
            url: format!("http://fake{path}"),
            body: String::new(),
        }
    }

    async fn tracked_action(&self, id: EntityId) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .action_delays
            .lock()
            .unwrap()
            .get(&id.get())
            .copied()
            .unwrap_or(Duration::from_millis(1));
        tokio::time::sleep(delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failing = self.failing.lock().unwrap().get(&id.get()).copied();
        match failing {
            Some(status) => Err(Self::status_error(status, format!("/entities/{id}"))),
            None => Ok(()),
        }
    }

    fn apply_mark(&self, request: &MarkRequest, completed: bool) {
        if self.ignore_marks.load(Ordering::SeqCst) {
            return;
        }
        let target = CompletionTarget {
            content_id: request.content_id,
            content_type: request.content_type,
            parent_lesson_id: request.parent_lesson_id,
            step_index: request.step_index,
        };
        let Ok(key) = completion_key(&target) else {
            return;
        };
        let mut server = self.server_completed.lock().unwrap();
        server.retain(|r| !(r.content_id == key && r.content_type == request.content_type));
        if completed {
            server.push(ProgressRecord {
                content_id: key,
                content_type: request.content_type,
                completed_at: Some(chrono::Utc::now()),
            });
        }
    }
}

#[async_trait]
impl ContentApi for FakeApi {
    async fn get_entity(&self, id: EntityId) -> Result<Entity> {
        *self.get_calls.lock().unwrap().entry(id.get()).or_insert(0) += 1;

        let delay = *self.get_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(status) = self.failing.lock().unwrap().get(&id.get()).copied() {
            return Err(Self::status_error(status, format!("/entities/{id}")));
        }
        let raw = self.entities.lock().unwrap().get(&id.get()).cloned();
        match raw {
            Some(raw) => Ok(serde_json::from_value(raw)?),
            None => Err(Self::status_error(404, format!("/entities/{id}"))),
        }
    }

    async fn delete_entity(&self, id: EntityId) -> Result<Value> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.tracked_action(id).await?;
        self.entities.lock().unwrap().remove(&id.get());
        Ok(json!({ "deleted": true, "id": id }))
    }

    async fn update_entity(&self, id: EntityId, update: &EntityUpdate) -> Result<Entity> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.tracked_action(id).await?;

        let mut entities = self.entities.lock().unwrap();
        let record = entities.entry(id.get()).or_insert_with(|| json!({ "id": id }));
        if let (Some(map), Value::Object(patch)) = (record.as_object_mut(), serde_json::to_value(update)?) {
            for (k, v) in patch {
                map.insert(k, v);
            }
        }
        Ok(serde_json::from_value(record.clone())?)
    }

    async fn mark_complete(&self, request: &MarkRequest) -> Result<MarkResponse> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let result = if self.fail_marks.load(Ordering::SeqCst) {
            Err(Self::status_error(500, "/progress/mark".to_string()))
        } else {
            self.apply_mark(request, true);
            Ok(MarkResponse {
                progress: *self.mark_progress.lock().unwrap(),
            })
        };
        self.marked.notify_one();
        result
    }

    async fn unmark_complete(&self, request: &MarkRequest) -> Result<MarkResponse> {
        self.unmark_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let result = if self.fail_marks.load(Ordering::SeqCst) {
            Err(Self::status_error(500, "/progress/unmark".to_string()))
        } else {
            self.apply_mark(request, false);
            Ok(MarkResponse {
                progress: *self.mark_progress.lock().unwrap(),
            })
        };
        self.marked.notify_one();
        result
    }

    async fn get_progress(&self, course_id: i64) -> Result<CourseProgress> {
        self.progress_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::status_error(500, format!("/progress/{course_id}")));
        }
        Ok(CourseProgress {
            progress: *self.server_percentage.lock().unwrap(),
        })
    }

    async fn get_completed(&self, course_id: i64) -> Result<Vec<ProgressRecord>> {
        self.completed_calls.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.server_completed.lock().unwrap().clone();
        let gate = self.completed_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::status_error(
                500,
                format!("/progress/{course_id}/completed"),
            ));
        }
        Ok(snapshot)
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
