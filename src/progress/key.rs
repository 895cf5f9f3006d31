//! Completion keys
//!
//! Lessons and quizzes are keyed by their own ID. Steps have no server-side
//! identity of their own in the completed-content list; they are keyed by
//! `parent_lesson_id * 10000 + step_index`, which is also what the server
//! reports back for step records.

use crate::error::ValidationError;
use crate::types::{CompletionTarget, ContentType};

/// Multiplier applied to the parent lesson ID in a step's composite key
pub const STEP_KEY_MULTIPLIER: i64 = 10_000;

/// Encode a step's position as a single key
///
/// # Errors
/// - `step_index` must be below [`STEP_KEY_MULTIPLIER`], otherwise two
///   different steps could share a key
/// - `parent_lesson_id` must be positive and small enough not to overflow
pub fn composite_key(parent_lesson_id: i64, step_index: u32) -> Result<i64, ValidationError> {
    if parent_lesson_id <= 0 {
        return Err(ValidationError::NonPositiveId(parent_lesson_id));
    }
    if i64::from(step_index) >= STEP_KEY_MULTIPLIER {
        return Err(ValidationError::StepIndexOutOfRange {
            index: step_index,
            limit: STEP_KEY_MULTIPLIER as u32,
        });
    }
    parent_lesson_id
        .checked_mul(STEP_KEY_MULTIPLIER)
        .and_then(|base| base.checked_add(i64::from(step_index)))
        .ok_or(ValidationError::CompositeKeyOverflow {
            parent: parent_lesson_id,
            index: step_index,
        })
}

/// Decode a composite key into `(parent_lesson_id, step_index)`
pub fn split_composite_key(key: i64) -> (i64, u32) {
    let parent = key.div_euclid(STEP_KEY_MULTIPLIER);
    let index = key.rem_euclid(STEP_KEY_MULTIPLIER) as u32;
    (parent, index)
}

/// Key under which a target's completion is stored
///
/// Steps with both coordinates use the composite key; anything else, including
/// a step missing either coordinate, uses the raw content ID.
pub fn completion_key(target: &CompletionTarget) -> Result<i64, ValidationError> {
    match (
        target.content_type,
        target.parent_lesson_id,
        target.step_index,
    ) {
        (ContentType::Step, Some(parent), Some(index)) => composite_key(parent, index),
        _ => Ok(target.content_id),
    }
}
