//! File-access policy engine
//!
//! Evaluates allow/deny glob rules against a requested file set before any
//! backend is allowed to mutate files. The engine reports every violation,
//! not just the first: a rejected execution names each offending path and
//! the rule it broke.

use crate::error::PolicyError;
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// Operation kinds a rule may constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    /// Read file contents
    Read,
    /// Overwrite an existing file
    Write,
    /// Create a new file
    Create,
    /// Delete a file
    Delete,
}

impl FileOperation {
    /// Lowercase name, as used in violation messages.
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FileOperation::Read => "read",
            FileOperation::Write => "write",
            FileOperation::Create => "create",
            FileOperation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One allow or deny rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Glob over repository-relative paths
    pub pattern: String,
    /// Operations the rule constrains; empty means all operations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<FileOperation>,
}

impl PolicyRule {
    /// Rule over all operations.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            operations: Vec::new(),
        }
    }

    /// Restrict the rule to specific operations.
    #[must_use]
    pub fn for_operations(mut self, operations: Vec<FileOperation>) -> Self {
        self.operations = operations;
        self
    }
}

/// Allow/deny rules over file paths and operation kinds.
///
/// Supplied once per adapter instance; immutable for that instance's
/// lifetime. An empty allow list permits everything not denied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Paths an agent may touch; empty means unrestricted
    #[serde(default)]
    pub allow: Vec<PolicyRule>,
    /// Paths an agent must never touch; deny wins over allow
    #[serde(default)]
    pub deny: Vec<PolicyRule>,
}

impl PolicyConfig {
    /// Unrestricted policy.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an allow rule over all operations.
    #[must_use]
    pub fn allow(mut self, pattern: impl Into<String>) -> Self {
        self.allow.push(PolicyRule::new(pattern));
        self
    }

    /// Add a deny rule over all operations.
    #[must_use]
    pub fn deny(mut self, pattern: impl Into<String>) -> Self {
        self.deny.push(PolicyRule::new(pattern));
        self
    }
}

/// Why a path was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolatedRule {
    /// A deny rule matched
    Denied {
        /// Pattern of the matching deny rule
        pattern: String,
    },
    /// An allow list is present and nothing in it covers the path
    NotAllowed,
    /// The path points outside the repository root
    EscapesRepository,
}

/// One rejected `(path, operation)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    /// Offending repository-relative path
    pub path: String,
    /// Operation that was requested
    pub operation: FileOperation,
    /// Which rule it broke
    pub rule: ViolatedRule,
}

impl std::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.rule {
            ViolatedRule::Denied { pattern } => write!(
                f,
                "'{}' ({}) is denied by rule '{}'",
                self.path, self.operation, pattern
            ),
            ViolatedRule::NotAllowed => write!(
                f,
                "'{}' ({}) is not covered by any allow rule",
                self.path, self.operation
            ),
            ViolatedRule::EscapesRepository => {
                write!(f, "'{}' escapes the repository root", self.path)
            }
        }
    }
}

#[derive(Debug)]
struct CompiledRule {
    pattern: String,
    matcher: GlobMatcher,
    operations: Vec<FileOperation>,
}

impl CompiledRule {
    fn compile(rule: &PolicyRule) -> Result<Self, PolicyError> {
        let matcher = Glob::new(&rule.pattern)
            .map_err(|e| PolicyError::InvalidPattern {
                pattern: rule.pattern.clone(),
                message: e.to_string(),
            })?
            .compile_matcher();
        Ok(Self {
            pattern: rule.pattern.clone(),
            matcher,
            operations: rule.operations.clone(),
        })
    }

    fn covers(&self, path: &str, operation: FileOperation) -> bool {
        (self.operations.is_empty() || self.operations.contains(&operation))
            && self.matcher.is_match(path)
    }
}

/// Compiled policy, evaluated before every file mutation.
#[derive(Debug)]
pub struct PolicyEngine {
    config: PolicyConfig,
    allow: Vec<CompiledRule>,
    deny: Vec<CompiledRule>,
}

impl PolicyEngine {
    /// Compile a policy configuration. Patterns are compiled once; the
    /// configuration is immutable for the engine's lifetime.
    pub fn new(config: PolicyConfig) -> Result<Self, PolicyError> {
        let allow = config
            .allow
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let deny = config
            .deny
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            config,
            allow,
            deny,
        })
    }

    /// The configuration this engine was compiled from.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Evaluate a requested file set.
    ///
    /// Returns every violation: paths escaping the repository, every
    /// matching deny rule, and (when an allow list exists) every path not
    /// covered by it. Deny wins over allow.
    #[must_use]
    pub fn check(
        &self,
        files: &[String],
        repo_path: &Path,
        operation: FileOperation,
    ) -> Vec<PolicyViolation> {
        let mut violations = Vec::new();

        for file in files {
            let path = Path::new(file);
            if path.is_absolute()
                || path.components().any(|c| matches!(c, Component::ParentDir))
            {
                violations.push(PolicyViolation {
                    path: file.clone(),
                    operation,
                    rule: ViolatedRule::EscapesRepository,
                });
                continue;
            }

            let mut denied = false;
            for rule in &self.deny {
                if rule.covers(file, operation) {
                    denied = true;
                    violations.push(PolicyViolation {
                        path: file.clone(),
                        operation,
                        rule: ViolatedRule::Denied {
                            pattern: rule.pattern.clone(),
                        },
                    });
                }
            }

            if !denied
                && !self.allow.is_empty()
                && !self.allow.iter().any(|rule| rule.covers(file, operation))
            {
                violations.push(PolicyViolation {
                    path: file.clone(),
                    operation,
                    rule: ViolatedRule::NotAllowed,
                });
            }
        }

        if !violations.is_empty() {
            tracing::warn!(
                "policy rejected {} of {} requested paths under {}",
                violations.len(),
                files.len(),
                repo_path.display()
            );
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn engine(config: PolicyConfig) -> PolicyEngine {
        PolicyEngine::new(config).unwrap()
    }

    fn repo() -> PathBuf {
        PathBuf::from("/tmp/repo")
    }

    #[test]
    fn empty_policy_permits_everything() {
        let engine = engine(PolicyConfig::new());
        let violations = engine.check(
            &["src/main.rs".into(), "README.md".into()],
            &repo(),
            FileOperation::Write,
        );
        assert!(violations.is_empty());
    }

    #[test]
    fn deny_rule_names_the_path_and_pattern() {
        let engine = engine(PolicyConfig::new().deny("secrets/*"));
        let violations = engine.check(
            &["secrets/api.pem".into(), "src/lib.rs".into()],
            &repo(),
            FileOperation::Write,
        );
        assert_eq!(violations.len(), 1);
        let text = violations[0].to_string();
        assert!(text.contains("secrets/api.pem"));
        assert!(text.contains("secrets/*"));
    }

    #[test]
    fn deny_matches_nested_paths() {
        let engine = engine(PolicyConfig::new().deny("secrets/*"));
        let violations = engine.check(
            &["secrets/deep/nested.key".into()],
            &repo(),
            FileOperation::Delete,
        );
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn every_violation_is_reported() {
        let engine = engine(
            PolicyConfig::new()
                .allow("src/**")
                .deny("**/*.lock")
                .deny("vendor/**"),
        );
        let violations = engine.check(
            &[
                "vendor/dep.lock".into(),
                "docs/guide.md".into(),
                "src/ok.rs".into(),
            ],
            &repo(),
            FileOperation::Write,
        );
        // vendor/dep.lock breaks both deny rules; docs/guide.md misses allow.
        assert_eq!(violations.len(), 3);
    }

    #[test]
    fn deny_wins_over_allow() {
        let engine = engine(PolicyConfig::new().allow("**").deny("Cargo.lock"));
        let violations = engine.check(&["Cargo.lock".into()], &repo(), FileOperation::Write);
        assert_eq!(violations.len(), 1);
        assert!(matches!(violations[0].rule, ViolatedRule::Denied { .. }));
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let engine = engine(PolicyConfig::new());
        let violations = engine.check(
            &["../outside.txt".into(), "/etc/passwd".into()],
            &repo(),
            FileOperation::Read,
        );
        assert_eq!(violations.len(), 2);
        assert!(violations
            .iter()
            .all(|v| v.rule == ViolatedRule::EscapesRepository));
    }

    #[test]
    fn rules_scope_to_operations() {
        let rule = PolicyRule::new("migrations/*").for_operations(vec![FileOperation::Delete]);
        let engine = engine(PolicyConfig {
            allow: vec![],
            deny: vec![rule],
        });

        let files = vec!["migrations/001.sql".to_string()];
        assert!(engine.check(&files, &repo(), FileOperation::Write).is_empty());
        assert_eq!(engine.check(&files, &repo(), FileOperation::Delete).len(), 1);
    }

    #[test]
    fn invalid_patterns_fail_compilation() {
        let result = PolicyEngine::new(PolicyConfig::new().deny("a{b"));
        assert!(matches!(result, Err(PolicyError::InvalidPattern { .. })));
    }
}
