//! Several bulk mutations issued as one user action

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::{BatchExecutor, BatchReport};
use crate::types::{Entity, EntityId, EntityStatus, EntityUpdate};

/// Set one publication status on many entities
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Entities to update
    pub ids: Vec<EntityId>,
    /// New status
    pub status: EntityStatus,
}

/// Set one category list on many entities
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryUpdate {
    /// Entities to update
    pub ids: Vec<EntityId>,
    /// Category IDs replacing the current assignment
    pub categories: Vec<i64>,
}

/// Delete, status and category sub-batches; any may be empty or absent
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MixedOperations {
    /// Entities to delete
    #[serde(default)]
    pub delete: Vec<EntityId>,
    /// Status change
    #[serde(default)]
    pub status: Option<StatusUpdate>,
    /// Category change
    #[serde(default)]
    pub category: Option<CategoryUpdate>,
}

impl MixedOperations {
    /// Number of individual operations across all sub-batches
    pub fn len(&self) -> usize {
        self.delete.len()
            + self.status.as_ref().map_or(0, |s| s.ids.len())
            + self.category.as_ref().map_or(0, |c| c.ids.len())
    }

    /// Whether there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which sub-batch an operation belonged to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixedOperation {
    /// Deletion
    Delete,
    /// Status change
    SetStatus,
    /// Category change
    SetCategories,
}

/// One operation of a mixed batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MixedItem {
    /// Sub-batch
    pub operation: MixedOperation,
    /// Target entity
    pub id: EntityId,
}

impl fmt::Display for MixedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.operation, self.id)
    }
}

/// Output of a successful operation in a mixed batch
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "operation", content = "result", rename_all = "snake_case")]
pub enum MutationOutcome {
    /// Deletion acknowledgement
    Deleted(Value),
    /// Entity after its status changed
    StatusUpdated(Entity),
    /// Entity after its categories changed
    CategoryUpdated(Entity),
}

impl BatchExecutor {
    /// Run the delete, status and category sub-batches concurrently
    ///
    /// Each sub-batch keeps its own grouping. Empty or absent sub-batches are
    /// skipped. The merged report's total is the sum of all sub-batch sizes.
    pub async fn run_mixed(
        &self,
        operations: MixedOperations,
    ) -> BatchReport<MixedItem, MutationOutcome> {
        let MixedOperations {
            delete,
            status,
            category,
        } = operations;

        let deletes = async move {
            if delete.is_empty() {
                return None;
            }
            Some(self.delete_all(delete).await)
        };

        let statuses = async move {
            let update = status.filter(|s| !s.ids.is_empty())?;
            let patch = EntityUpdate::status(update.status);
            Some(self.update_all(update.ids, &patch).await)
        };

        let categories = async move {
            let update = category.filter(|c| !c.ids.is_empty())?;
            let patch = EntityUpdate::categories(update.categories);
            Some(self.update_all(update.ids, &patch).await)
        };

        let (deleted, status_updated, category_updated) =
            tokio::join!(deletes, statuses, categories);

        let mut report = BatchReport::default();
        if let Some(deleted) = deleted {
            report.merge(
                deleted
                    .map_items(|id| MixedItem {
                        operation: MixedOperation::Delete,
                        id,
                    })
                    .map_payload(MutationOutcome::Deleted),
            );
        }
        if let Some(updated) = status_updated {
            report.merge(
                updated
                    .map_items(|id| MixedItem {
                        operation: MixedOperation::SetStatus,
                        id,
                    })
                    .map_payload(MutationOutcome::StatusUpdated),
            );
        }
        if let Some(updated) = category_updated {
            report.merge(
                updated
                    .map_items(|id| MixedItem {
                        operation: MixedOperation::SetCategories,
                        id,
                    })
                    .map_payload(MutationOutcome::CategoryUpdated),
            );
        }
        report
    }
}
