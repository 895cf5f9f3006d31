//! Per-course completion tracking with optimistic updates
//!
//! A mark or unmark goes through four steps:
//! 1. the mutation is sent to the server
//! 2. a percentage carried by the response replaces the local one
//! 3. the local completed list is edited optimistically
//! 4. progress and completed content are re-read, and the server's list replaces the local one
//!
//! Mutations and explicit refreshes on one store share a queue, so a read
//! issued before a mutation can never overwrite that mutation's reconciliation. A failed step leaves earlier edits
//! in place and returns the error.

pub mod key;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, broadcast};

use crate::api::ContentApi;
use crate::error::{Error, Result};
use crate::types::{
    CompletionTarget, ContentType, Event, MarkRequest, MarkResponse, ProgressRecord,
};

use key::completion_key;

#[derive(Debug, Default)]
struct ProgressState {
    percentage: f64,
    completed: Vec<ProgressRecord>,
    loading: usize,
    last_error: Option<String>,
}

impl ProgressState {
    fn contains(&self, key: i64, content_type: ContentType) -> bool {
        self.completed
            .iter()
            .any(|r| r.content_id == key && r.content_type == content_type)
    }

    /// Returns false when a record with the same key and type already exists
    fn insert_optimistic(&mut self, key: i64, content_type: ContentType) -> bool {
        if self.contains(key, content_type) {
            return false;
        }
        self.completed.push(ProgressRecord {
            content_id: key,
            content_type,
            completed_at: Some(chrono::Utc::now()),
        });
        true
    }

    fn remove_optimistic(&mut self, key: i64, content_type: ContentType) -> bool {
        let before = self.completed.len();
        self.completed
            .retain(|r| !(r.content_id == key && r.content_type == content_type));
        self.completed.len() != before
    }
}

/// Point-in-time view of a course's progress for rendering
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ProgressSnapshot {
    /// Course ID
    pub course_id: i64,
    /// Completion percentage (0.0 until first fetched)
    pub percentage: f64,
    /// Completed content
    pub completed: Vec<ProgressRecord>,
    /// Whether any progress read is in flight
    pub loading: bool,
    /// Message of the most recent failure, cleared by the next successful reconciliation
    pub last_error: Option<String>,
}

/// Completion state of one user in one course
pub struct ProgressStore {
    course_id: i64,
    api: Arc<dyn ContentApi>,
    state: RwLock<ProgressState>,
    mutations: Mutex<()>,
    event_tx: Option<broadcast::Sender<Event>>,
}

impl ProgressStore {
    /// Create an empty store for `course_id`
    pub fn new(course_id: i64, api: Arc<dyn ContentApi>) -> Self {
        Self {
            course_id,
            api,
            state: RwLock::new(ProgressState::default()),
            mutations: Mutex::new(()),
            event_tx: None,
        }
    }

    /// Emit [`Event::ProgressReconciled`] after each successful reconciliation
    #[must_use]
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Course this store tracks
    pub fn course_id(&self) -> i64 {
        self.course_id
    }

    /// Re-read the aggregate completion percentage
    ///
    /// Waits for queued mutations, so the result never predates one of them.
    pub async fn fetch_progress(&self) -> Result<f64> {
        let _queue = self.mutations.lock().await;
        self.load_progress().await
    }

    /// Re-read the completed-content list, replacing local state wholesale
    ///
    /// Waits for queued mutations, like [`fetch_progress`](Self::fetch_progress).
    pub async fn fetch_completed_content(&self) -> Result<Vec<ProgressRecord>> {
        let _queue = self.mutations.lock().await;
        self.load_completed().await
    }

    /// Reconcile both percentage and completed content with the server
    ///
    /// Takes its turn in the mutation queue. Both reads are issued even if one
    /// fails; the first error is returned.
    pub async fn refresh(&self) -> Result<()> {
        let _queue = self.mutations.lock().await;
        self.reconcile().await
    }

    /// Mark content complete, optimistically, then reconcile
    ///
    /// # Errors
    /// Validation errors are returned before any network access. A failed
    /// mutation leaves local state untouched; a failed reconciliation keeps the
    /// optimistic record.
    pub async fn mark_complete(&self, target: CompletionTarget) -> Result<MarkResponse> {
        let key = completion_key(&target)?;
        let _queue = self.mutations.lock().await;

        let request = MarkRequest::new(self.course_id, &target);
        let response = self
            .api
            .mark_complete(&request)
            .await
            .map_err(|e| self.failed("mark complete", e))?;

        {
            let mut state = self.write();
            if let Some(progress) = response.progress {
                state.percentage = progress;
            }
            if !state.insert_optimistic(key, target.content_type) {
                tracing::debug!(
                    course_id = self.course_id,
                    key,
                    content_type = %target.content_type,
                    "already marked locally"
                );
            }
        }

        self.reconcile()
            .await
            .map_err(|e| self.failed("reconcile after mark", e))?;
        Ok(response)
    }

    /// Unmark content, optimistically, then reconcile
    ///
    /// Mirrors [`mark_complete`](Self::mark_complete).
    pub async fn unmark_complete(&self, target: CompletionTarget) -> Result<MarkResponse> {
        let key = completion_key(&target)?;
        let _queue = self.mutations.lock().await;

        let request = MarkRequest::new(self.course_id, &target);
        let response = self
            .api
            .unmark_complete(&request)
            .await
            .map_err(|e| self.failed("unmark complete", e))?;

        {
            let mut state = self.write();
            if let Some(progress) = response.progress {
                state.percentage = progress;
            }
            state.remove_optimistic(key, target.content_type);
        }

        self.reconcile()
            .await
            .map_err(|e| self.failed("reconcile after unmark", e))?;
        Ok(response)
    }

    /// Whether `target` is completed according to local state
    ///
    /// Never touches the network. Targets whose key cannot be derived are
    /// reported as not completed.
    pub fn is_completed(&self, target: &CompletionTarget) -> bool {
        match completion_key(target) {
            Ok(key) => self.read().contains(key, target.content_type),
            Err(_) => false,
        }
    }

    /// Local completion percentage (0.0 until the first successful read)
    pub fn percentage(&self) -> f64 {
        self.read().percentage
    }

    /// Local completed-content list
    pub fn completed(&self) -> Vec<ProgressRecord> {
        self.read().completed.clone()
    }

    /// Whether any progress read is in flight
    pub fn is_loading(&self) -> bool {
        self.read().loading > 0
    }

    /// Everything a view needs in one consistent read
    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.read();
        ProgressSnapshot {
            course_id: self.course_id,
            percentage: state.percentage,
            completed: state.completed.clone(),
            loading: state.loading > 0,
            last_error: state.last_error.clone(),
        }
    }

    async fn load_progress(&self) -> Result<f64> {
        let progress = self.tracked(self.api.get_progress(self.course_id)).await?;
        self.write().percentage = progress.progress;
        Ok(progress.progress)
    }

    async fn load_completed(&self) -> Result<Vec<ProgressRecord>> {
        let completed = self.tracked(self.api.get_completed(self.course_id)).await?;
        self.write().completed = completed.clone();
        Ok(completed)
    }

    /// Callers must hold the mutation queue
    async fn reconcile(&self) -> Result<()> {
        let (progress, completed) = tokio::join!(self.load_progress(), self.load_completed());
        progress?;
        completed?;

        let (percentage, count) = {
            let mut state = self.write();
            state.last_error = None;
            (state.percentage, state.completed.len())
        };
        tracing::info!(
            course_id = self.course_id,
            percentage,
            completed = count,
            "progress reconciled"
        );
        if let Some(tx) = &self.event_tx {
            tx.send(Event::ProgressReconciled {
                course_id: self.course_id,
                percentage,
                completed: count,
            })
            .ok();
        }
        Ok(())
    }

    /// Run a read while counting it as loading and recording its failure
    async fn tracked<T>(&self, read: impl Future<Output = Result<T>>) -> Result<T> {
        let loading = LoadingGuard::enter(self);
        let result = read.await;
        drop(loading);
        if let Err(e) = &result {
            self.write().last_error = Some(e.to_string());
        }
        result
    }

    fn failed(&self, operation: &str, error: Error) -> Error {
        tracing::warn!(
            course_id = self.course_id,
            operation,
            error = %error,
            "progress update failed"
        );
        self.write().last_error = Some(error.to_string());
        error
    }

    fn read(&self) -> RwLockReadGuard<'_, ProgressState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ProgressState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counts one in-flight read until dropped, including when the read is abandoned
struct LoadingGuard<'a>(&'a ProgressStore);

impl<'a> LoadingGuard<'a> {
    fn enter(store: &'a ProgressStore) -> Self {
        store.write().loading += 1;
        Self(store)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.write();
        state.loading = state.loading.saturating_sub(1);
    }
}
