//! Branch-naming protocol
//!
//! Step identity must be recoverable from version-control artifacts alone.
//! A branch named `hachi/{plan}/{step}` or `hachi/{plan}/{step}/{chunk}` is
//! the canonical, reversible encoding of a step attempt; these functions are
//! pure and total over their accepted inputs.

use crate::error::BranchNameError;
use serde::{Deserialize, Serialize};

/// Literal prefix of every migration branch.
pub const BRANCH_PREFIX: &str = "hachi/";

/// A decoded migration branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchRef {
    /// Plan segment
    pub plan_id: String,
    /// Step segment
    pub step_id: String,
    /// Optional chunk segment
    pub chunk: Option<String>,
}

fn check_segment(segment: &'static str, value: &str) -> Result<(), BranchNameError> {
    if value.is_empty() {
        return Err(BranchNameError::EmptySegment { segment });
    }
    if value.contains('/') {
        return Err(BranchNameError::EmbeddedSeparator {
            segment,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Encode `(plan, step, chunk)` as a branch name.
///
/// Segments containing `/` (or empty segments) are rejected so that
/// [`parse_branch`] remains an exact left inverse.
pub fn branch_name(
    plan_id: &str,
    step_id: &str,
    chunk: Option<&str>,
) -> Result<String, BranchNameError> {
    check_segment("plan id", plan_id)?;
    check_segment("step id", step_id)?;
    match chunk {
        Some(chunk) => {
            check_segment("chunk", chunk)?;
            Ok(format!("{BRANCH_PREFIX}{plan_id}/{step_id}/{chunk}"))
        }
        None => Ok(format!("{BRANCH_PREFIX}{plan_id}/{step_id}")),
    }
}

/// Decode a branch name back into its step identity.
///
/// Returns `None` for anything that is not a well-formed migration branch.
/// For all valid inputs, `parse_branch(branch_name(p, s, c)) == (p, s, c)`.
#[must_use]
pub fn parse_branch(name: &str) -> Option<BranchRef> {
    let rest = name.strip_prefix(BRANCH_PREFIX)?;
    let segments: Vec<&str> = rest.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    match segments.as_slice() {
        [plan_id, step_id] => Some(BranchRef {
            plan_id: (*plan_id).to_string(),
            step_id: (*step_id).to_string(),
            chunk: None,
        }),
        [plan_id, step_id, chunk] => Some(BranchRef {
            plan_id: (*plan_id).to_string(),
            step_id: (*step_id).to_string(),
            chunk: Some((*chunk).to_string()),
        }),
        _ => None,
    }
}

/// Cheap pre-filter: does `name` look like a migration branch at all?
#[inline]
#[must_use]
pub fn is_migration_branch(name: &str) -> bool {
    name.starts_with(BRANCH_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_without_chunk() {
        assert_eq!(
            branch_name("react-18", "2", None).unwrap(),
            "hachi/react-18/2"
        );
    }

    #[test]
    fn encodes_with_chunk() {
        assert_eq!(
            branch_name("react-18", "2", Some("ui")).unwrap(),
            "hachi/react-18/2/ui"
        );
    }

    #[test]
    fn rejects_embedded_separator() {
        let err = branch_name("a/b", "2", None).unwrap_err();
        assert!(matches!(
            err,
            BranchNameError::EmbeddedSeparator { segment: "plan id", .. }
        ));
        assert!(branch_name("p", "s", Some("x/y")).is_err());
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(branch_name("", "2", None).is_err());
        assert!(branch_name("p", "", None).is_err());
        assert!(branch_name("p", "s", Some("")).is_err());
    }

    #[test]
    fn parse_rejects_foreign_branches() {
        assert_eq!(parse_branch("main"), None);
        assert_eq!(parse_branch("feature/hachi/x"), None);
        assert_eq!(parse_branch("hachi/only-plan"), None);
        assert_eq!(parse_branch("hachi/p/s/c/extra"), None);
        assert_eq!(parse_branch("hachi//s"), None);
    }

    #[test]
    fn prefix_filter() {
        assert!(is_migration_branch("hachi/p/s"));
        assert!(is_migration_branch("hachi/anything"));
        assert!(!is_migration_branch("hachiko/p/s"));
        assert!(!is_migration_branch("main"));
    }

    proptest! {
        #[test]
        fn round_trip_law(
            plan in "[A-Za-z0-9._-]{1,16}",
            step in "[A-Za-z0-9._-]{1,16}",
            chunk in proptest::option::of("[A-Za-z0-9._-]{1,16}"),
        ) {
            let name = branch_name(&plan, &step, chunk.as_deref()).unwrap();
            prop_assert!(is_migration_branch(&name));
            let parsed = parse_branch(&name).unwrap();
            prop_assert_eq!(parsed.plan_id, plan);
            prop_assert_eq!(parsed.step_id, step);
            prop_assert_eq!(parsed.chunk, chunk);
        }
    }
}
