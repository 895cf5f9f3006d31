//! Bounded-concurrency bulk mutations
//!
//! [`BatchExecutor::run`] splits its input into groups of `width` items (5 by
//! default). Groups run one after another; the actions inside a group run
//! concurrently. A failing item is recorded in the report and never stops the
//! rest of the batch.

mod mixed;

pub use mixed::{
    CategoryUpdate, MixedItem, MixedOperation, MixedOperations, MutationOutcome, StatusUpdate,
};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::api::ContentApi;
use crate::cache::EntityCache;
use crate::error::Error;
use crate::types::{Entity, EntityId, EntityUpdate};

/// Group width used when none is configured
pub const DEFAULT_BATCH_WIDTH: usize = 5;

/// An item whose action succeeded, with the action's output
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchSuccess<I, P> {
    /// Input item
    pub item: I,
    /// Value produced by the action
    pub payload: P,
}

/// An item whose action failed
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchFailure<I> {
    /// Input item
    pub item: I,
    /// Error message
    pub error: String,
}

/// Outcome of one item's action
#[derive(Clone, Debug, PartialEq)]
pub enum BatchItemResult<I, P> {
    /// The action succeeded
    Success(BatchSuccess<I, P>),
    /// The action failed
    Failure(BatchFailure<I>),
}

impl<I, P> BatchItemResult<I, P> {
    /// Classify an action's result
    pub fn from_result<E: fmt::Display>(item: I, result: Result<P, E>) -> Self {
        match result {
            Ok(payload) => Self::Success(BatchSuccess { item, payload }),
            Err(e) => Self::Failure(BatchFailure {
                item,
                error: e.to_string(),
            }),
        }
    }

    /// Whether the action succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The input item
    pub fn item(&self) -> &I {
        match self {
            Self::Success(s) => &s.item,
            Self::Failure(f) => &f.item,
        }
    }
}

/// Partition of a batch into successes and failures
///
/// Both lists are in completion order. `successful.len() + failed.len()`
/// always equals `total`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchReport<I, P> {
    /// Items whose action succeeded
    pub successful: Vec<BatchSuccess<I, P>>,
    /// Items whose action failed
    pub failed: Vec<BatchFailure<I>>,
    /// Number of items submitted
    pub total: usize,
}

impl<I, P> Default for BatchReport<I, P> {
    fn default() -> Self {
        Self {
            successful: Vec::new(),
            failed: Vec::new(),
            total: 0,
        }
    }
}

impl<I, P> BatchReport<I, P> {
    /// Add one item's outcome
    pub fn record(&mut self, result: BatchItemResult<I, P>) {
        self.total += 1;
        match result {
            BatchItemResult::Success(s) => self.successful.push(s),
            BatchItemResult::Failure(f) => self.failed.push(f),
        }
    }

    /// Number of successful items
    pub fn successful_count(&self) -> usize {
        self.successful.len()
    }

    /// Number of failed items
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True when nothing failed (including the empty batch)
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// True when at least one item succeeded
    pub fn any_succeeded(&self) -> bool {
        !self.successful.is_empty()
    }

    /// Human-readable counts, e.g. "5 successful, 1 failed"
    pub fn summary(&self) -> String {
        format!(
            "{} successful, {} failed",
            self.successful_count(),
            self.failed_count()
        )
    }

    /// Append another report's outcomes to this one
    pub fn merge(&mut self, other: BatchReport<I, P>) {
        self.successful.extend(other.successful);
        self.failed.extend(other.failed);
        self.total += other.total;
    }

    /// Transform every success payload
    pub fn map_payload<Q>(self, mut f: impl FnMut(P) -> Q) -> BatchReport<I, Q> {
        BatchReport {
            successful: self
                .successful
                .into_iter()
                .map(|s| BatchSuccess {
                    item: s.item,
                    payload: f(s.payload),
                })
                .collect(),
            failed: self.failed,
            total: self.total,
        }
    }

    /// Transform every item, successful or failed
    pub fn map_items<J>(self, mut f: impl FnMut(I) -> J) -> BatchReport<J, P> {
        BatchReport {
            successful: self
                .successful
                .into_iter()
                .map(|s| BatchSuccess {
                    item: f(s.item),
                    payload: s.payload,
                })
                .collect(),
            failed: self
                .failed
                .into_iter()
                .map(|e| BatchFailure {
                    item: f(e.item),
                    error: e.error,
                })
                .collect(),
            total: self.total,
        }
    }
}

/// Applies one action to many items, `width` at a time
#[derive(Clone)]
pub struct BatchExecutor {
    width: usize,
    api: Arc<dyn ContentApi>,
    cache: Option<EntityCache>,
}

impl BatchExecutor {
    /// Create an executor with the default width
    pub fn new(api: Arc<dyn ContentApi>) -> Self {
        Self {
            width: DEFAULT_BATCH_WIDTH,
            api,
            cache: None,
        }
    }

    /// Set the group width (at least 1)
    #[must_use]
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    /// Keep `cache` in step with successful mutations
    ///
    /// Updated entities are stored; deleted ones are invalidated.
    #[must_use]
    pub fn with_cache(mut self, cache: EntityCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Group width
    pub fn width(&self) -> usize {
        self.width
    }

    /// Run `action` over `items`
    ///
    /// Group `k` holds items `[k * width, (k + 1) * width)`. Group `k + 1` is not
    /// started until every action of group `k` has settled.
    pub async fn run<I, P, E, F, Fut>(&self, items: Vec<I>, action: F) -> BatchReport<I, P>
    where
        I: Clone + fmt::Debug,
        E: fmt::Display,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<P, E>>,
    {
        let mut report = BatchReport::default();
        let groups = items.len().div_ceil(self.width);

        for (index, group) in items.chunks(self.width).enumerate() {
            tracing::debug!(group = index + 1, groups, size = group.len(), "dispatching batch group");

            let outcomes: Vec<BatchItemResult<I, P>> = stream::iter(group.iter().cloned())
                .map(|item| {
                    let pending = action(item.clone());
                    async move { BatchItemResult::from_result(item, pending.await) }
                })
                .buffer_unordered(self.width)
                .collect()
                .await;

            for outcome in outcomes {
                if let BatchItemResult::Failure(failure) = &outcome {
                    tracing::warn!(item = ?failure.item, error = %failure.error, "batch item failed");
                }
                report.record(outcome);
            }
        }

        tracing::info!(
            total = report.total,
            succeeded = report.successful_count(),
            failed = report.failed_count(),
            "batch finished"
        );
        report
    }

    /// Delete every entity in `ids`
    pub async fn delete_all(&self, ids: Vec<EntityId>) -> BatchReport<EntityId, Value> {
        self.run(ids, |id| {
            let api = Arc::clone(&self.api);
            let cache = self.cache.clone();
            async move {
                let ack = api.delete_entity(id).await?;
                if let Some(cache) = cache {
                    cache.invalidate(id);
                }
                Ok::<_, Error>(ack)
            }
        })
        .await
    }

    /// Apply the same partial update to every entity in `ids`
    pub async fn update_all(
        &self,
        ids: Vec<EntityId>,
        update: &EntityUpdate,
    ) -> BatchReport<EntityId, Entity> {
        self.run(ids, |id| {
            let api = Arc::clone(&self.api);
            let cache = self.cache.clone();
            async move {
                let entity = api.update_entity(id, update).await?;
                if let Some(cache) = cache {
                    cache.store(entity.clone());
                }
                Ok::<_, Error>(entity)
            }
        })
        .await
    }
}

impl fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("width", &self.width)
            .field("api", &self.api.name())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}
