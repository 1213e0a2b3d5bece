//! Migration plan model & dependency resolver
//!
//! A plan is a markdown document with a YAML frontmatter header: ordered
//! steps, inter-step dependencies, optional chunking. This module owns
//! discovery, parsing, dependency validation, and frontmatter
//! serialization.
//!
//! Parsing never throws past its boundary: malformed metadata and missing
//! required fields populate [`ParsedPlan::errors`] and the caller decides
//! whether to surface, skip, or halt.

mod frontmatter;
mod graph;

pub use frontmatter::{
    normalized_frontmatter, serialize_frontmatter, ChunkingConfig, PlanFrontmatter,
    StepFrontmatter,
};
pub use graph::StepGraph;

use frontmatter::split_frontmatter;
use pulldown_cmark::{Event, Parser as MarkdownParser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A loaded migration plan. Immutable once loaded for a given run;
/// reloaded per orchestration cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    /// Plan identity, unique within a repository
    pub id: String,
    /// Structured metadata header
    pub frontmatter: PlanFrontmatter,
    /// Free-form markdown body with the migration instructions
    pub content: String,
    /// Source location
    pub file_path: PathBuf,
}

/// One unit of agent work within a plan. Identity is `(plan_id, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStep {
    /// Owning plan
    pub plan_id: String,
    /// Step identity within the plan
    pub id: String,
    /// Declared position within the plan
    pub ordinal: usize,
    /// Short description from the frontmatter
    pub description: Option<String>,
    /// Same-plan step ids this step depends on
    pub dependencies: Vec<String>,
    /// Repository-relative paths or patterns the step may touch
    pub files: Vec<String>,
    /// Declared parallel sub-units
    pub chunks: Vec<String>,
}

impl MigrationPlan {
    /// Materialize the plan's steps with their ordinals.
    #[must_use]
    pub fn steps(&self) -> Vec<MigrationStep> {
        self.frontmatter
            .steps
            .iter()
            .enumerate()
            .map(|(ordinal, step)| MigrationStep {
                plan_id: self.id.clone(),
                id: step.id.clone(),
                ordinal,
                description: step.description.clone(),
                dependencies: step.dependencies.clone(),
                files: step.files.clone(),
                chunks: step.chunks.clone(),
            })
            .collect()
    }

    /// Look up one step by id.
    #[must_use]
    pub fn step(&self, step_id: &str) -> Option<MigrationStep> {
        self.steps().into_iter().find(|s| s.id == step_id)
    }

    /// Derive the instruction prompt for one step from the plan body.
    ///
    /// The markdown section whose heading names the step (e.g. `## Step 2`)
    /// scopes the instructions; when no section matches, the whole body is
    /// used. The step description and target file list are always folded in.
    #[must_use]
    pub fn prompt_for_step(&self, step: &MigrationStep) -> String {
        let instructions = section_for_step(&self.content, &step.id)
            .unwrap_or_else(|| self.content.trim().to_string());

        let mut prompt = String::new();
        if let Some(title) = &self.frontmatter.title {
            prompt.push_str(&format!("Migration: {title}\n\n"));
        }
        if let Some(description) = &step.description {
            prompt.push_str(description.trim());
            prompt.push_str("\n\n");
        }
        if !instructions.is_empty() {
            prompt.push_str(&instructions);
            prompt.push_str("\n\n");
        }
        if !step.files.is_empty() {
            prompt.push_str("Target files:\n");
            for file in &step.files {
                prompt.push_str(&format!("- {file}\n"));
            }
        }
        prompt.trim_end().to_string()
    }
}

/// Flat markdown section: heading text plus the text up to the next heading.
struct Section {
    title: String,
    text: String,
}

fn body_sections(content: &str) -> Vec<Section> {
    let parser = MarkdownParser::new(content);
    let mut sections: Vec<Section> = Vec::new();
    let mut in_heading = false;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                in_heading = true;
                sections.push(Section {
                    title: String::new(),
                    text: String::new(),
                });
            }
            Event::End(TagEnd::Heading(_)) => in_heading = false,
            Event::Text(text) | Event::Code(text) => {
                if let Some(section) = sections.last_mut() {
                    if in_heading {
                        section.title.push_str(&text);
                    } else {
                        section.text.push_str(&text);
                        section.text.push('\n');
                    }
                }
            }
            _ => {}
        }
    }

    sections
}

/// Find the body section scoped to `step_id`.
///
/// A heading matches when, lowercased, it equals the step id or names it as
/// `step {id}`.
fn section_for_step(content: &str, step_id: &str) -> Option<String> {
    let needle = step_id.to_lowercase();
    body_sections(content)
        .into_iter()
        .find(|section| {
            let title = section.title.trim().to_lowercase();
            title == needle || title == format!("step {needle}") || title.starts_with(&format!("step {needle}:"))
        })
        .map(|section| section.text.trim().to_string())
}

/// Outcome of parsing one candidate plan file.
///
/// `plan` is present iff `is_valid`; `errors` holds plain-language
/// descriptions of everything wrong with the document.
#[derive(Debug, Clone)]
pub struct ParsedPlan {
    /// The parsed plan, when valid
    pub plan: Option<MigrationPlan>,
    /// Whether the document parsed cleanly
    pub is_valid: bool,
    /// Plain-language parse errors
    pub errors: Vec<String>,
    /// Source location of the candidate
    pub file_path: PathBuf,
}

/// Where and how plan files are discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// File extensions treated as plan candidates
    pub extensions: Vec<String>,
    /// Directory names never recursed into
    pub excluded_dirs: Vec<String>,
}

impl DiscoveryConfig {
    /// Default discovery: markdown files, skipping VCS and build output.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the excluded directory set.
    #[inline]
    #[must_use]
    pub fn with_excluded_dirs(mut self, dirs: Vec<String>) -> Self {
        self.excluded_dirs = dirs;
        self
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["md".to_string(), "markdown".to_string()],
            excluded_dirs: vec![
                ".git".to_string(),
                "node_modules".to_string(),
                "target".to_string(),
            ],
        }
    }
}

/// Lazily walk `root` for plan candidates.
///
/// Restartable (each call yields a fresh walk), deterministic (file-name
/// order), and never recurses into excluded directories.
pub fn discover<'a>(
    root: &Path,
    config: &'a DiscoveryConfig,
) -> impl Iterator<Item = PathBuf> + 'a {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !config.excluded_dirs.iter().any(|d| d.as_str() == name.as_ref())
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| config.extensions.iter().any(|known| known.as_str() == ext))
        })
        .map(|entry| entry.into_path())
}

/// Parse one candidate file into a [`ParsedPlan`].
///
/// Never returns an error: I/O failures, missing fences, malformed YAML,
/// missing required fields, and duplicate step ids all land in `errors`.
#[must_use]
pub fn parse(file_path: &Path) -> ParsedPlan {
    let mut errors = Vec::new();

    let raw = match std::fs::read_to_string(file_path) {
        Ok(raw) => raw,
        Err(e) => {
            errors.push(format!("cannot read {}: {e}", file_path.display()));
            return invalid(file_path, errors);
        }
    };

    let Some((yaml, body)) = split_frontmatter(&raw) else {
        errors.push(format!(
            "{}: missing frontmatter (expected a '---' fenced header)",
            file_path.display()
        ));
        return invalid(file_path, errors);
    };

    let frontmatter: PlanFrontmatter = match serde_yaml::from_str(yaml) {
        Ok(frontmatter) => frontmatter,
        Err(e) => {
            errors.push(format!("{}: malformed frontmatter: {e}", file_path.display()));
            return invalid(file_path, errors);
        }
    };

    let frontmatter = normalized_frontmatter(&frontmatter);
    if frontmatter.id.is_empty() {
        errors.push(format!("{}: plan id must not be empty", file_path.display()));
    }
    let mut seen = std::collections::BTreeSet::new();
    for step in &frontmatter.steps {
        if step.id.is_empty() {
            errors.push(format!("{}: step id must not be empty", file_path.display()));
        } else if !seen.insert(step.id.clone()) {
            errors.push(format!(
                "{}: duplicate step id '{}'",
                file_path.display(),
                step.id
            ));
        }
    }

    if !errors.is_empty() {
        return invalid(file_path, errors);
    }

    ParsedPlan {
        plan: Some(MigrationPlan {
            id: frontmatter.id.clone(),
            frontmatter,
            content: body.to_string(),
            file_path: file_path.to_path_buf(),
        }),
        is_valid: true,
        errors,
        file_path: file_path.to_path_buf(),
    }
}

fn invalid(file_path: &Path, errors: Vec<String>) -> ParsedPlan {
    tracing::debug!("rejecting plan candidate {}: {:?}", file_path.display(), errors);
    ParsedPlan {
        plan: None,
        is_valid: false,
        errors,
        file_path: file_path.to_path_buf(),
    }
}

/// Discover and parse every candidate under `root`, preserving discovery
/// order.
pub fn load_all<'a>(
    root: &Path,
    config: &'a DiscoveryConfig,
) -> impl Iterator<Item = ParsedPlan> + 'a {
    discover(root, config).map(|path| parse(&path))
}

/// Validate the dependency graphs of a set of plans.
///
/// Returns one plain-language description per violation: every cycle (with
/// all member steps named), every self-reference, every dangling reference.
/// Linear in total nodes + edges.
#[must_use]
pub fn validate_dependencies(plans: &[MigrationPlan]) -> Vec<String> {
    let mut violations = Vec::new();
    for plan in plans {
        violations.extend(StepGraph::build(plan).violations());
    }
    violations
}
