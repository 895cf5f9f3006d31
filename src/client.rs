//! Long-lived entry point tying the cache, batch executor and progress stores together

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

use crate::api::{ContentApi, HttpContentApi};
use crate::batch::{BatchExecutor, BatchReport, MixedItem, MixedOperations, MutationOutcome};
use crate::cache::EntityCache;
use crate::config::Config;
use crate::error::{Error, Result, ValidationError};
use crate::progress::{ProgressSnapshot, ProgressStore};
use crate::types::{Entity, EntityId, EntityStatus, EntityUpdate, Event};

/// Client-side synchronization layer (cloneable - all fields are Arc-wrapped)
///
/// One instance is meant to live as long as the application and be handed to
/// every view that reads or writes content.
#[derive(Clone)]
pub struct CourseSync {
    config: Arc<Config>,
    api: Arc<dyn ContentApi>,
    cache: EntityCache,
    batch: BatchExecutor,
    progress: Arc<Mutex<HashMap<i64, Arc<ProgressStore>>>>,
    event_tx: broadcast::Sender<Event>,
}

impl CourseSync {
    /// Build a client talking to the configured HTTP content API
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use course_sync::{Config, CourseSync};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let sync = CourseSync::new(Config::default())?;
    ///     let lesson = sync.cache().get(101, false).await?;
    ///     println!("{:?}", lesson.status());
    ///     Ok(())
    /// }
    /// ```
    pub fn new(config: Config) -> Result<Self> {
        let api = Arc::new(HttpContentApi::new(&config)?);
        Self::with_api(config, api)
    }

    /// Build a client on top of any [`ContentApi`] implementation
    pub fn with_api(config: Config, api: Arc<dyn ContentApi>) -> Result<Self> {
        config.validate()?;

        // Subscribers that fall more than 1000 events behind see `RecvError::Lagged`
        let (event_tx, _rx) = broadcast::channel(1000);

        let cache = EntityCache::new(Arc::clone(&api)).with_events(event_tx.clone());
        let batch = BatchExecutor::new(Arc::clone(&api))
            .with_width(config.batch.width)
            .with_cache(cache.clone());

        tracing::info!(
            api = api.name(),
            batch_width = config.batch.width,
            "course sync initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            api,
            cache,
            batch,
            progress: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Content API collaborator
    pub fn api(&self) -> &Arc<dyn ContentApi> {
        &self.api
    }

    /// Shared entity cache
    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Shared batch executor (keeps the cache in step with its mutations)
    pub fn batch(&self) -> &BatchExecutor {
        &self.batch
    }

    /// Subscribe to sync events
    ///
    /// Each subscriber receives every event sent after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Progress store for `course_id`, created on first use
    ///
    /// Every call with the same course returns the same store, so all views of
    /// a course share one mutation queue and one local state.
    pub fn progress(&self, course_id: i64) -> Result<Arc<ProgressStore>> {
        if course_id <= 0 {
            return Err(ValidationError::NonPositiveId(course_id).into());
        }
        let mut stores = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
        let store = stores.entry(course_id).or_insert_with(|| {
            tracing::debug!(course_id, "creating progress store");
            Arc::new(
                ProgressStore::new(course_id, Arc::clone(&self.api))
                    .with_events(self.event_tx.clone()),
            )
        });
        Ok(Arc::clone(store))
    }

    /// Reconcile a course's progress, reporting failure through events instead of errors
    ///
    /// Returns the local snapshot after the attempt (with `last_error` set if it
    /// failed), or `None` if `course_id` is not a valid ID.
    pub async fn refresh_best_effort(&self, course_id: i64) -> Option<ProgressSnapshot> {
        let store = match self.progress(course_id) {
            Ok(store) => store,
            Err(e) => {
                self.sync_failed("refresh progress", &e);
                return None;
            }
        };
        if let Err(e) = store.refresh().await {
            self.sync_failed("refresh progress", &e);
        }
        Some(store.snapshot())
    }

    /// Delete many entities
    pub async fn bulk_delete(&self, ids: Vec<EntityId>) -> BatchReport<EntityId, Value> {
        let report = self.batch.delete_all(ids).await;
        self.batch_finished(&report);
        report
    }

    /// Set the publication status of many entities
    pub async fn bulk_set_status(
        &self,
        ids: Vec<EntityId>,
        status: EntityStatus,
    ) -> BatchReport<EntityId, Entity> {
        let report = self
            .batch
            .update_all(ids, &EntityUpdate::status(status))
            .await;
        self.batch_finished(&report);
        report
    }

    /// Replace the categories of many entities
    pub async fn bulk_set_categories(
        &self,
        ids: Vec<EntityId>,
        categories: Vec<i64>,
    ) -> BatchReport<EntityId, Entity> {
        let report = self
            .batch
            .update_all(ids, &EntityUpdate::categories(categories))
            .await;
        self.batch_finished(&report);
        report
    }

    /// Run delete, status and category changes as one bulk action
    pub async fn bulk_apply(
        &self,
        operations: MixedOperations,
    ) -> BatchReport<MixedItem, MutationOutcome> {
        let report = self.batch.run_mixed(operations).await;
        self.batch_finished(&report);
        report
    }

    fn batch_finished<I, P>(&self, report: &BatchReport<I, P>) {
        self.event_tx
            .send(Event::BatchFinished {
                total: report.total,
                succeeded: report.successful_count(),
                failed: report.failed_count(),
            })
            .ok();
    }

    fn sync_failed(&self, operation: &str, error: &Error) {
        tracing::warn!(operation, error = %error, "best-effort sync failed");
        self.event_tx
            .send(Event::SyncFailed {
                operation: operation.to_string(),
                error: error.to_string(),
            })
            .ok();
    }
}

impl std::fmt::Debug for CourseSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourseSync")
            .field("api", &self.api.name())
            .field("batch", &self.batch)
            .field("cached_entities", &self.cache.len())
            .finish()
    }
}
