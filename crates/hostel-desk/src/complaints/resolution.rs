//! Resolution bookkeeping helpers.

use chrono::NaiveDate;

use super::domain::{InvariantViolation, Resolution, ValidationError};

/// Quality scores run 1 to 10 and may be applied once per resolution.
pub fn validate_quality_check(
    resolution: &Resolution,
    score: u8,
) -> Result<(), QualityCheckRejection> {
    if !(1..=10).contains(&score) {
        return Err(QualityCheckRejection::Validation(
            ValidationError::QualityScoreRange(score),
        ));
    }
    if resolution.quality_checked {
        return Err(QualityCheckRejection::Invariant(
            InvariantViolation::QualityAlreadyChecked(resolution.id.clone()),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum QualityCheckRejection {
    Validation(ValidationError),
    Invariant(InvariantViolation),
}

/// A follow-up is overdue when required, not completed, and dated before
/// `today`.
pub fn is_follow_up_overdue(resolution: &Resolution, today: NaiveDate) -> bool {
    resolution.follow_up_required
        && !resolution.follow_up_completed
        && resolution
            .follow_up_date
            .map(|date| date < today)
            .unwrap_or(false)
}
