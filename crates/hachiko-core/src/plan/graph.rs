//! Per-plan dependency graph
//!
//! Builds one directed graph per plan (edge `a -> b` when step `a` depends
//! on step `b`) and validates it exhaustively: every cycle and every
//! dangling reference is reported, not just the first found.
//!
//! Cycle detection uses the three-color DFS (unvisited / in-progress /
//! done). A plain visited-set is not enough here: it mis-reports diamonds
//! (shared sub-dependencies) as cycles and can miss long cycles entirely.

use crate::plan::MigrationPlan;
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Dependency graph of one plan's steps.
#[derive(Debug)]
pub struct StepGraph {
    plan_id: String,
    /// Step id -> node index, in declared order
    ids: IndexMap<String, u32>,
    graph: DiGraphMap<u32, ()>,
    /// `(step, missing dependency)` pairs
    dangling: Vec<(String, String)>,
    /// Steps that declare themselves as a dependency
    self_references: Vec<String>,
}

impl StepGraph {
    /// Build the graph from a plan's declared steps.
    #[must_use]
    pub fn build(plan: &MigrationPlan) -> Self {
        let mut ids: IndexMap<String, u32> = IndexMap::new();
        for step in &plan.frontmatter.steps {
            let next = ids.len() as u32;
            ids.entry(step.id.clone()).or_insert(next);
        }

        let mut graph: DiGraphMap<u32, ()> = DiGraphMap::new();
        for index in ids.values() {
            graph.add_node(*index);
        }

        let mut dangling = Vec::new();
        let mut self_references = Vec::new();
        for step in &plan.frontmatter.steps {
            let from = ids[step.id.as_str()];
            for dep in &step.dependencies {
                if dep == &step.id {
                    self_references.push(step.id.clone());
                    continue;
                }
                match ids.get(dep.as_str()) {
                    Some(to) => {
                        graph.add_edge(from, *to, ());
                    }
                    None => dangling.push((step.id.clone(), dep.clone())),
                }
            }
        }

        Self {
            plan_id: plan.id.clone(),
            ids,
            graph,
            dangling,
            self_references,
        }
    }

    fn id_of(&self, index: u32) -> &str {
        self.ids
            .get_index(index as usize)
            .map(|(id, _)| id.as_str())
            .unwrap_or("?")
    }

    /// All distinct cycles, each as a sorted list of member step ids.
    ///
    /// One cycle is reported per back edge found by the DFS; cycles reached
    /// through different entry points are deduplicated by membership.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let node_count = self.ids.len();
        let mut colors = vec![Color::White; node_count];
        let mut path: Vec<u32> = Vec::new();
        let mut found: BTreeSet<Vec<String>> = BTreeSet::new();

        for start in 0..node_count as u32 {
            if colors[start as usize] == Color::White {
                self.visit(start, &mut colors, &mut path, &mut found);
            }
        }

        found.into_iter().collect()
    }

    fn visit(
        &self,
        node: u32,
        colors: &mut [Color],
        path: &mut Vec<u32>,
        found: &mut BTreeSet<Vec<String>>,
    ) {
        colors[node as usize] = Color::Gray;
        path.push(node);

        for next in self.graph.neighbors(node) {
            match colors[next as usize] {
                Color::Gray => {
                    // Back edge: the cycle is the path suffix starting at `next`.
                    if let Some(pos) = path.iter().position(|n| *n == next) {
                        let mut members: Vec<String> = path[pos..]
                            .iter()
                            .map(|n| self.id_of(*n).to_string())
                            .collect();
                        members.sort();
                        found.insert(members);
                    }
                }
                Color::White => self.visit(next, colors, path, found),
                Color::Black => {}
            }
        }

        path.pop();
        colors[node as usize] = Color::Black;
    }

    /// Human-readable violations: every cycle, every self-reference, every
    /// dangling dependency. Empty for a valid plan; a plan with zero steps
    /// or zero edges trivially passes.
    #[must_use]
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for cycle in self.cycles() {
            violations.push(format!(
                "plan '{}': dependency cycle between steps {}",
                self.plan_id,
                cycle.join(", ")
            ));
        }
        for step in &self.self_references {
            violations.push(format!(
                "plan '{}': step '{}' depends on itself",
                self.plan_id, step
            ));
        }
        for (step, dep) in &self.dangling {
            violations.push(format!(
                "plan '{}': step '{}' depends on unknown step '{}'",
                self.plan_id, step, dep
            ));
        }
        violations
    }

    /// Execution order: dependencies before dependents, deterministic for a
    /// given plan. Falls back to declared order when the graph is cyclic
    /// (the caller is expected to have surfaced the violation already).
    #[must_use]
    pub fn topo_order(&self) -> Vec<String> {
        match toposort(&self.graph, None) {
            Ok(order) => {
                // `a -> b` means "a depends on b", so dependencies come last;
                // reverse to get execution order.
                order
                    .into_iter()
                    .rev()
                    .map(|n| self.id_of(n).to_string())
                    .collect()
            }
            Err(_) => self.ids.keys().cloned().collect(),
        }
    }
}
