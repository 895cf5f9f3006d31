//! Per-entity fetch cache with in-flight request coalescing
//!
//! Two tables live behind one mutex:
//! - `entries`: the last successfully retrieved representation of each entity
//! - `pending`: one shared retrieval per entity currently on the wire
//!
//! A retrieval runs in its own task. When it settles, that task removes the
//! pending entry and (on success) stores the entity under the same lock, so a
//! caller arriving afterwards sees either the fresh entry or no pending
//! retrieval, never a stale one.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use crate::api::ContentApi;
use crate::error::{Error, Result};
use crate::types::{Entity, EntityId, Event};

type FetchOutcome = std::result::Result<Arc<Entity>, Arc<Error>>;
type PendingFetch = Shared<BoxFuture<'static, FetchOutcome>>;

#[derive(Default)]
struct CacheState {
    entries: HashMap<EntityId, Arc<Entity>>,
    pending: HashMap<EntityId, PendingFetch>,
}

/// Keyed cache of single-entity lookups
///
/// Cloning is cheap and clones share the same tables. Entries never expire;
/// they are replaced by a forced refresh (last writer wins) or dropped with
/// [`invalidate`](Self::invalidate) / [`clear`](Self::clear).
#[derive(Clone)]
pub struct EntityCache {
    api: Arc<dyn ContentApi>,
    state: Arc<Mutex<CacheState>>,
    event_tx: Option<broadcast::Sender<Event>>,
}

impl EntityCache {
    /// Create an empty cache backed by `api`
    pub fn new(api: Arc<dyn ContentApi>) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(CacheState::default())),
            event_tx: None,
        }
    }

    /// Emit [`Event::EntityLoaded`] on every successful retrieval
    #[must_use]
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Look up an entity by raw ID
    ///
    /// Non-positive IDs fail with a validation error before any network access.
    /// See [`get_id`](Self::get_id) for the caching rules.
    pub async fn get(&self, id: i64, force_refresh: bool) -> Result<Arc<Entity>> {
        let id = EntityId::new(id)?;
        self.get_id(id, force_refresh).await
    }

    /// Look up an entity from unparsed input (e.g. a route parameter)
    pub async fn get_raw(&self, raw: &str, force_refresh: bool) -> Result<Arc<Entity>> {
        let id: EntityId = raw.parse()?;
        self.get_id(id, force_refresh).await
    }

    /// Look up an entity
    ///
    /// - Without `force_refresh`, a cached entry is returned with no network access.
    /// - If a retrieval for `id` is already in flight, this call waits on it.
    /// - Otherwise exactly one retrieval is issued and every caller arriving
    ///   before it settles shares its outcome.
    ///
    /// # Errors
    /// Retrieval failures are delivered to every attached caller as
    /// [`Error::Coalesced`]; nothing is cached, so the next call retries.
    pub async fn get_id(&self, id: EntityId, force_refresh: bool) -> Result<Arc<Entity>> {
        let pending = {
            let mut state = self.lock();

            if !force_refresh && let Some(entity) = state.entries.get(&id) {
                tracing::debug!(entity_id = id.get(), "entity cache hit");
                return Ok(Arc::clone(entity));
            }

            match state.pending.get(&id) {
                Some(pending) => {
                    tracing::debug!(entity_id = id.get(), "joining in-flight retrieval");
                    pending.clone()
                }
                None => {
                    let pending = self.spawn_retrieval(id);
                    state.pending.insert(id, pending.clone());
                    pending
                }
            }
        };

        pending.await.map_err(Error::Coalesced)
    }

    /// Start the single retrieval for `id`; the caller registers it as pending
    fn spawn_retrieval(&self, id: EntityId) -> PendingFetch {
        tracing::debug!(entity_id = id.get(), api = self.api.name(), "retrieving entity");

        let api = Arc::clone(&self.api);
        let state = Arc::clone(&self.state);
        let event_tx = self.event_tx.clone();

        let task = tokio::spawn(async move {
            let outcome: FetchOutcome = api.get_entity(id).await.map(Arc::new).map_err(Arc::new);

            {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.pending.remove(&id);
                if let Ok(entity) = &outcome {
                    state.entries.insert(id, Arc::clone(entity));
                }
            }

            match &outcome {
                Ok(_) => {
                    if let Some(tx) = &event_tx {
                        tx.send(Event::EntityLoaded { id }).ok();
                    }
                }
                Err(e) => {
                    tracing::warn!(entity_id = id.get(), error = %e, "entity retrieval failed");
                }
            }

            outcome
        });

        let state = Arc::clone(&self.state);
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // The task died before clearing its pending entry
                    state
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pending
                        .remove(&id);
                    Err(Arc::new(Error::Other(format!(
                        "entity retrieval task failed: {e}"
                    ))))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Cached entry for `id`, without network access
    pub fn peek(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.lock().entries.get(&id).cloned()
    }

    /// Store an entity obtained elsewhere (e.g. the response of an update)
    pub fn store(&self, entity: Entity) {
        let id = entity.id;
        self.lock().entries.insert(id, Arc::new(entity));
    }

    /// Drop the cached entry for `id`; returns whether one existed
    pub fn invalidate(&self, id: EntityId) -> bool {
        self.lock().entries.remove(&id).is_some()
    }

    /// Drop every cached entry; in-flight retrievals are unaffected
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Number of retrievals currently in flight
    pub fn in_flight(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
