//! # course-sync
//!
//! Client-side synchronization layer for a learning-management admin/student panel.
//!
//! ## Design Philosophy
//!
//! course-sync sits between views and a remote content API:
//! - **Coalesced reads** - concurrent lookups of one entity share a single request
//! - **Throttled bulk writes** - bulk actions run in small sequential groups and
//!   report partial failure instead of aborting
//! - **Optimistic progress** - completion marks show up locally at once and are
//!   then reconciled against the server
//! - **Event-driven** - consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use course_sync::{Config, CourseSync, CompletionTarget, EntityId, EntityStatus};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.api.base_url = "https://lms.example.com/api/".to_string();
//!     config.api.auth_token = Some("token".to_string());
//!
//!     let sync = CourseSync::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = sync.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Bulk publish
//!     let ids = [101, 102, 103].map(EntityId::new).into_iter().collect::<Result<Vec<_>, _>>()?;
//!     let report = sync.bulk_set_status(ids, EntityStatus::Publish).await;
//!     println!("{}", report.summary());
//!
//!     // Mark step 4 of lesson 12 as done
//!     let progress = sync.progress(5)?;
//!     progress.mark_complete(CompletionTarget::step(880, 12, 4)).await?;
//!     println!("{}%", progress.percentage());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Content API collaborator
pub mod api;
/// Bounded-concurrency bulk mutations
pub mod batch;
/// Entity cache with request coalescing
pub mod cache;
/// Long-lived client facade
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Course progress tracking
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use api::{ContentApi, HttpContentApi};
pub use batch::{
    BatchExecutor, BatchFailure, BatchItemResult, BatchReport, BatchSuccess, CategoryUpdate,
    MixedOperations, MutationOutcome, StatusUpdate,
};
pub use cache::EntityCache;
pub use client::CourseSync;
pub use config::{ApiConfig, BatchConfig, Config, RetryConfig};
pub use error::{Error, Result, ValidationError};
pub use progress::{ProgressSnapshot, ProgressStore};
pub use types::{
    CompletionTarget, ContentType, Entity, EntityId, EntityStatus, EntityUpdate, Event,
    ProgressRecord,
};
