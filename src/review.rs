//! Marketplace review update path (spec.md §9 REDESIGN FLAG).
//!
//! The source's review-service update path throws a not-implemented error;
//! this module re-architects it as a direct update, gated by an eligibility
//! value the original submit path would already have established. Only the
//! update half is implemented — a full review/marketplace system (eligibility
//! computation, moderation, aggregation) is out of scope per spec.md §1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// Eligibility to update a previously submitted review, established by the
/// (out-of-scope) submit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewEligibility {
    /// Whether the reviewer authored the original review and may amend it.
    pub can_update: bool,
}

/// A review record after update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Kind of resource reviewed (e.g. "node", "vm_type").
    pub resource_type: String,
    /// The resource's id.
    pub resource_id: String,
    /// The reviewer's id.
    pub reviewer_id: String,
    /// 1-5 star rating.
    pub rating: u8,
    /// Short title.
    pub title: String,
    /// Free-text comment.
    pub comment: String,
    /// When this review was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Apply an update to a reviewer's existing review, given the eligibility the
/// submit path already established. Rejects ratings outside 1-5 the same way
/// the submit path would.
pub fn update_review(
    eligibility: ReviewEligibility,
    resource_type: impl Into<String>,
    resource_id: impl Into<String>,
    reviewer_id: impl Into<String>,
    rating: u8,
    title: impl Into<String>,
    comment: impl Into<String>,
) -> Result<Review, EventError> {
    if !eligibility.can_update {
        return Err(EventError::Backend("reviewer is not eligible to update this review".to_string()));
    }
    if !(1..=5).contains(&rating) {
        return Err(EventError::Backend(format!("rating must be between 1 and 5, got {rating}")));
    }
    Ok(Review {
        resource_type: resource_type.into(),
        resource_id: resource_id.into(),
        reviewer_id: reviewer_id.into(),
        rating,
        title: title.into(),
        comment: comment.into(),
        updated_at: Utc::now(),
    })
}
