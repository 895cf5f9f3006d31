//! Core types for course-sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Identifier of an entity on the content API (always positive)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct EntityId(i64);

impl EntityId {
    /// Validate and wrap a raw ID
    pub fn new(id: i64) -> Result<Self, ValidationError> {
        if id <= 0 {
            return Err(ValidationError::NonPositiveId(id));
        }
        Ok(Self(id))
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for EntityId {
    type Error = ValidationError;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<EntityId> for i64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for EntityId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EntityId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: i64 = s
            .trim()
            .parse()
            .map_err(|_| ValidationError::NotAnInteger(s.to_string()))?;
        Self::new(id)
    }
}

/// Opaque entity representation as returned by the content API
///
/// Only `id` is interpreted; every other field is kept verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity ID
    pub id: EntityId,
    /// Remaining fields, untouched
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Entity {
    /// Look up a raw field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Publication status, if the record carries one
    pub fn status(&self) -> Option<&str> {
        self.field("status").and_then(Value::as_str)
    }
}

/// Publication status accepted by the status-update endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    /// Visible to students
    Publish,
    /// Work in progress
    Draft,
    /// Awaiting review
    Pending,
    /// Visible to administrators only
    Private,
}

impl EntityStatus {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Publish => "publish",
            EntityStatus::Draft => "draft",
            EntityStatus::Pending => "pending",
            EntityStatus::Private => "private",
        }
    }
}

/// Partial-update payload for `PUT /entities/{id}`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    /// New publication status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EntityStatus>,
    /// Replacement category IDs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<i64>>,
    /// Meta fields to merge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl EntityUpdate {
    /// Update that only changes the publication status
    pub fn status(status: EntityStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Update that only replaces the categories
    pub fn categories(categories: Vec<i64>) -> Self {
        Self {
            categories: Some(categories),
            ..Self::default()
        }
    }
}

/// Kind of course content whose completion is tracked
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// A lesson
    Lesson,
    /// A step nested inside a lesson
    Step,
    /// A quiz
    Quiz,
}

impl ContentType {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Lesson => "lesson",
            ContentType::Step => "step",
            ContentType::Quiz => "quiz",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed piece of course content
///
/// For steps, `content_id` holds the composite key rather than the raw step ID.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Content ID (composite key for steps)
    pub content_id: i64,
    /// Content kind
    pub content_type: ContentType,
    /// When the content was completed (None for records not yet confirmed by the server)
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Content addressed by a mark/unmark/lookup call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CompletionTarget {
    /// Raw content ID
    pub content_id: i64,
    /// Content kind
    pub content_type: ContentType,
    /// Lesson that contains the step (steps only)
    pub parent_lesson_id: Option<i64>,
    /// Position of the step inside its lesson (steps only)
    pub step_index: Option<u32>,
}

impl CompletionTarget {
    /// Target without step coordinates
    pub fn new(content_id: i64, content_type: ContentType) -> Self {
        Self {
            content_id,
            content_type,
            parent_lesson_id: None,
            step_index: None,
        }
    }

    /// A lesson
    pub fn lesson(lesson_id: i64) -> Self {
        Self::new(lesson_id, ContentType::Lesson)
    }

    /// A quiz
    pub fn quiz(quiz_id: i64) -> Self {
        Self::new(quiz_id, ContentType::Quiz)
    }

    /// A step addressed by its lesson and position
    pub fn step(content_id: i64, parent_lesson_id: i64, step_index: u32) -> Self {
        Self {
            content_id,
            content_type: ContentType::Step,
            parent_lesson_id: Some(parent_lesson_id),
            step_index: Some(step_index),
        }
    }
}

/// Body of `POST /progress/mark` and `POST /progress/unmark`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkRequest {
    /// Raw content ID
    pub content_id: i64,
    /// Content kind
    pub content_type: ContentType,
    /// Course the content belongs to
    pub course_id: i64,
    /// Parent lesson (steps only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_lesson_id: Option<i64>,
    /// Step position (steps only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<u32>,
}

impl MarkRequest {
    /// Build the request body for a target in a course
    pub fn new(course_id: i64, target: &CompletionTarget) -> Self {
        Self {
            content_id: target.content_id,
            content_type: target.content_type,
            course_id,
            parent_lesson_id: target.parent_lesson_id,
            step_index: target.step_index,
        }
    }
}

/// Response of the mark/unmark endpoints
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkResponse {
    /// Updated completion percentage, when the server reports one
    #[serde(default)]
    pub progress: Option<f64>,
}

/// Response of `GET /progress/{course_id}`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseProgress {
    /// Completion percentage (0.0 to 100.0)
    #[serde(default)]
    pub progress: f64,
}

/// Event emitted by the synchronization layer
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An entity was retrieved from the network and cached
    EntityLoaded {
        /// Entity ID
        id: EntityId,
    },

    /// A bulk operation finished
    BatchFinished {
        /// Operations attempted
        total: usize,
        /// Operations that succeeded
        succeeded: usize,
        /// Operations that failed
        failed: usize,
    },

    /// Local progress state was replaced by the server's version
    ProgressReconciled {
        /// Course ID
        course_id: i64,
        /// Completion percentage after reconciliation
        percentage: f64,
        /// Number of completed items after reconciliation
        completed: usize,
    },

    /// A best-effort operation failed and was not propagated
    SyncFailed {
        /// What was being done
        operation: String,
        /// Error message
        error: String,
    },
}
