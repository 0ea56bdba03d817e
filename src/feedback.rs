//! Human feedback on ingested records.

use crate::model::Feedback;
use crate::store::{LogStore, StoreError};

/// Record a thumbs-up/down verdict for `log_id`. Blank comment and reference
/// strings are stored as null. Returns the feedback id.
pub fn save_feedback(
    store: &mut dyn LogStore,
    log_id: i64,
    is_good: bool,
    comments: Option<&str>,
    reference_answer: Option<&str>,
) -> Result<i64, StoreError> {
    let non_blank = |s: Option<&str>| {
        s.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let entry = Feedback {
        log_id,
        is_good,
        comments: non_blank(comments),
        reference_answer: non_blank(reference_answer),
    };
    let id = store.insert_feedback(&entry)?;
    tracing::info!(log_id, feedback_id = id, is_good, "feedback saved");
    Ok(id)
}
