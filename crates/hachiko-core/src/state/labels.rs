//! Status and plan labels on tracking records
//!
//! `hachiko:status:{status}` carries the plan's single current status;
//! `hachiko:plan:{plan_id}` joins the record back to its plan.

use crate::types::StepStatus;

/// Prefix of the single current-status label.
pub const STATUS_LABEL_PREFIX: &str = "hachiko:status:";

/// Prefix of the plan-identity label.
pub const PLAN_LABEL_PREFIX: &str = "hachiko:plan:";

/// Build the status label for `status`.
#[inline]
#[must_use]
pub fn status_label(status: StepStatus) -> String {
    format!("{STATUS_LABEL_PREFIX}{status}")
}

/// Build the plan label for `plan_id`.
#[inline]
#[must_use]
pub fn plan_label(plan_id: &str) -> String {
    format!("{PLAN_LABEL_PREFIX}{plan_id}")
}

/// Is this one of ours?
#[inline]
#[must_use]
pub fn is_status_label(label: &str) -> bool {
    label.starts_with(STATUS_LABEL_PREFIX)
}

/// Parse a status label back into its status.
#[must_use]
pub fn parse_status_label(label: &str) -> Option<StepStatus> {
    label
        .strip_prefix(STATUS_LABEL_PREFIX)
        .and_then(StepStatus::parse)
}
