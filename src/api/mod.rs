//! Contract with the remote content API
//!
//! The synchronization layer only talks to the server through [`ContentApi`].
//! [`HttpContentApi`] is the production implementation; tests inject scripted fakes.

mod http;

pub use http::HttpContentApi;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{
    CourseProgress, Entity, EntityId, EntityUpdate, MarkRequest, MarkResponse, ProgressRecord,
};

/// Remote content API collaborator
///
/// Every method is one network exchange. A non-success response is an error
/// regardless of its payload.
///
/// # Examples
///
/// ```no_run
/// use course_sync::api::{ContentApi, HttpContentApi};
/// use course_sync::config::Config;
/// use course_sync::types::EntityId;
///
/// # async fn example() -> course_sync::Result<()> {
/// let api = HttpContentApi::new(&Config::default())?;
/// let lesson = api.get_entity(EntityId::new(42)?).await?;
/// println!("{:?}", lesson.status());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// `GET /entities/{id}`
    async fn get_entity(&self, id: EntityId) -> Result<Entity>;

    /// `DELETE /entities/{id}`; returns the deletion acknowledgement verbatim
    async fn delete_entity(&self, id: EntityId) -> Result<Value>;

    /// `PUT /entities/{id}` with a partial update; returns the updated entity
    async fn update_entity(&self, id: EntityId, update: &EntityUpdate) -> Result<Entity>;

    /// `POST /progress/mark`
    async fn mark_complete(&self, request: &MarkRequest) -> Result<MarkResponse>;

    /// `POST /progress/unmark`
    async fn unmark_complete(&self, request: &MarkRequest) -> Result<MarkResponse>;

    /// `GET /progress/{course_id}`
    async fn get_progress(&self, course_id: i64) -> Result<CourseProgress>;

    /// `GET /progress/{course_id}/completed`
    async fn get_completed(&self, course_id: i64) -> Result<Vec<ProgressRecord>>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
