//! Plan frontmatter: the structured metadata header of a plan file
//!
//! A plan document is a YAML frontmatter block between `---` fences followed
//! by a free-form markdown body. The model is agnostic to the body's markup;
//! only the header is structured.

use serde::{Deserialize, Serialize};

/// Structured metadata of a migration plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanFrontmatter {
    /// Plan identity, unique within a repository
    pub id: String,
    /// Human-readable title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Reference to the prompt configuration used when dispatching steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_config: Option<String>,
    /// Optional chunking configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunking: Option<ChunkingConfig>,
    /// Ordered steps; required, may be empty
    pub steps: Vec<StepFrontmatter>,
}

/// How a step's file set is split into parallel chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Upper bound on files per chunk
    pub max_files_per_chunk: usize,
}

/// One step declaration inside the frontmatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFrontmatter {
    /// Step identity, unique within the plan
    pub id: String,
    /// Short description, folded into the step prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Step ids within the same plan this step depends on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Repository-relative paths or patterns the step may touch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    /// Declared parallel sub-units of this step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<String>,
}

/// Split a plan document into its YAML frontmatter and markdown body.
///
/// Returns `None` when the document does not start with a `---` fence or the
/// closing fence is missing.
#[must_use]
pub(crate) fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;
    let end = rest.find("\n---")?;
    let yaml = &rest[..end + 1];
    let mut body = &rest[end + 4..];
    // Swallow the remainder of the closing fence line.
    if let Some(idx) = body.find('\n') {
        let fence_tail = &body[..idx];
        if fence_tail.trim_matches(|c| c == '-' || c == '\r').is_empty() {
            body = &body[idx + 1..];
        }
    } else if body.trim_matches(|c| c == '-' || c == '\r').is_empty() {
        body = "";
    }
    Some((yaml, body))
}

/// Normalize frontmatter into its canonical form.
///
/// Trims identifiers, drops empty dependency/chunk entries, and sorts and
/// deduplicates dependencies and chunks. Normalization is idempotent, which
/// is what makes the round-trip law below hold.
#[must_use]
pub fn normalized_frontmatter(frontmatter: &PlanFrontmatter) -> PlanFrontmatter {
    let mut normalized = frontmatter.clone();
    normalized.id = normalized.id.trim().to_string();
    normalized.title = normalized
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    for step in &mut normalized.steps {
        step.id = step.id.trim().to_string();
        step.dependencies = {
            let mut deps: Vec<String> = step
                .dependencies
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
            deps.sort();
            deps.dedup();
            deps
        };
        step.chunks = {
            let mut chunks: Vec<String> = step
                .chunks
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            chunks.sort();
            chunks.dedup();
            chunks
        };
    }
    normalized
}

/// Serialize frontmatter back into a fenced YAML header.
///
/// Round-trip law: for any previously-valid frontmatter `f`,
/// `parse(serialize(normalize(f))) == normalize(f)`.
pub fn serialize_frontmatter(
    frontmatter: &PlanFrontmatter,
) -> Result<String, serde_yaml::Error> {
    let yaml = serde_yaml::to_string(frontmatter)?;
    Ok(format!("---\n{yaml}---\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> PlanFrontmatter {
        PlanFrontmatter {
            id: " react-18 ".into(),
            title: Some("Upgrade to React 18".into()),
            prompt_config: Some("prompts/react.yaml".into()),
            chunking: Some(ChunkingConfig {
                max_files_per_chunk: 10,
            }),
            steps: vec![
                StepFrontmatter {
                    id: "1".into(),
                    description: Some("Update dependencies".into()),
                    dependencies: vec![],
                    files: vec!["package.json".into()],
                    chunks: vec![],
                },
                StepFrontmatter {
                    id: "2".into(),
                    description: None,
                    dependencies: vec!["1".into(), "1".into(), " ".into()],
                    files: vec!["src/**/*.tsx".into()],
                    chunks: vec!["ui".into(), "api".into()],
                },
            ],
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalized_frontmatter(&sample());
        let twice = normalized_frontmatter(&once);
        assert_eq!(once, twice);
        assert_eq!(once.id, "react-18");
        assert_eq!(once.steps[1].dependencies, vec!["1".to_string()]);
        assert_eq!(
            once.steps[1].chunks,
            vec!["api".to_string(), "ui".to_string()]
        );
    }

    #[test]
    fn serialized_form_round_trips() {
        let normalized = normalized_frontmatter(&sample());
        let text = serialize_frontmatter(&normalized).unwrap();
        let (yaml, body) = split_frontmatter(&text).unwrap();
        assert_eq!(body, "");
        let reparsed: PlanFrontmatter = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(reparsed, normalized);
    }

    #[test]
    fn split_requires_both_fences() {
        assert!(split_frontmatter("no frontmatter here").is_none());
        assert!(split_frontmatter("---\nid: x\nsteps: []").is_none());
        let (yaml, body) = split_frontmatter("---\nid: x\n---\nbody text\n").unwrap();
        assert_eq!(yaml, "id: x\n");
        assert_eq!(body, "body text\n");
    }
}
