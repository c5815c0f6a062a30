//! Shape classification: source shape → target master name.
//!
//! The heuristic strategy is an ordered rule cascade (first match wins, an
//! assigned id is never overwritten). The LLM-backed strategy in the facade
//! crate satisfies the same [`MappingStrategy`] contract.

use tracing::debug;

use crate::error::Result;
use crate::model::{Diagram, Mapping, MasterInfo, Shape};

/// Strategy contract shared by the heuristic and remote classifiers.
pub trait MappingStrategy {
    fn create_mapping(&self, diagram: &Diagram, targets: &[MasterInfo]) -> Result<Mapping>;
}

/// Lowercase alphanumerics only: `"Rounded Rectangle"` → `"roundedrectangle"`.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Normalized source master name → preferred target names, in order.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("rectangle", &["process", "rounded rectangle"]),
    ("roundedrectangle", &["rounded rectangle", "process"]),
    ("diamond", &["decision"]),
    ("decision", &["decision"]),
    ("decagon", &["decision"]),
    ("startend", &["start/end"]),
    ("terminator", &["start/end"]),
    ("dynamicconnector", &["dynamic connector", "connector"]),
    ("connector", &["dynamic connector"]),
    ("simplearrow", &["dynamic connector"]),
    (
        "frame",
        &[
            "cff container",
            "swimlane",
            "swimlane (vertical)",
            "swimlane list",
        ],
    ),
];

/// Branch outcome labels that ride on tiny floating shapes next to
/// connectors rather than on flow nodes.
pub const BRANCH_LABELS: &[&str] = &[
    "是", "否", "通过", "不通过", "同意", "拒绝", "yes", "no", "y", "n", "ok", "pass", "fail",
];

/// Role vocabulary marking organizational headers; such shapes are process
/// nodes even when their master looks container-like.
pub const ROLE_LABELS: &[&str] = &[
    "负责人", "经理", "主管", "审批", "财务", "部门", "manager", "department", "approver",
    "owner", "lead",
];

pub fn is_branch_label(text: &str) -> bool {
    let norm = normalize_name(text);
    BRANCH_LABELS.iter().any(|l| normalize_name(l) == norm)
}

pub fn has_role_label(text: &str) -> bool {
    let norm = normalize_name(text);
    !norm.is_empty() && ROLE_LABELS.iter().any(|l| norm.contains(&normalize_name(l)))
}

pub struct HeuristicMapper;

impl MappingStrategy for HeuristicMapper {
    fn create_mapping(&self, diagram: &Diagram, targets: &[MasterInfo]) -> Result<Mapping> {
        let index = TargetIndex::new(targets);
        let mut mapping = Mapping::new();

        for page in &diagram.pages {
            for shape in &page.shapes {
                if mapping.contains_key(&shape.id) {
                    continue;
                }
                if let Some(target) = map_shape(shape, &index) {
                    mapping.insert(shape.id.clone(), target);
                } else {
                    debug!(id = %shape.id, "no heuristic match; leaving shape unmapped");
                }
            }
            // Connectors unconditionally take the best connector master.
            if let Some(conn_target) = index.best_of(&["dynamic connector", "connector"]) {
                for connector in &page.connectors {
                    mapping
                        .entry(connector.id.clone())
                        .or_insert_with(|| conn_target.clone());
                }
            }
        }
        Ok(mapping)
    }
}

fn map_shape(shape: &Shape, index: &TargetIndex) -> Option<String> {
    let master_norm = normalize_name(shape.master_name.as_deref().unwrap_or(""));

    // 1. Direct name match.
    if let Some(target) = index.exact(&master_norm) {
        return Some(finish(shape, target, index));
    }

    // 2. Fixed synonym table.
    if let Some((_, candidates)) = SYNONYMS.iter().find(|(k, _)| *k == master_norm) {
        if let Some(target) = index.best_of(candidates) {
            return Some(finish(shape, target, index));
        }
    }

    // 3. Keyword containment on the master name.
    let mut keywords: Vec<&str> = Vec::new();
    if master_norm.contains("rect") {
        keywords.extend(["process", "rounded rectangle"]);
    }
    if master_norm.contains("diamond") || master_norm.contains("decision") {
        keywords.push("decision");
    }
    if master_norm.contains("start") || master_norm.contains("end") {
        keywords.push("start/end");
    }
    if master_norm.contains("connector") || master_norm.contains("arrow") {
        keywords.push("dynamic connector");
    }
    if !keywords.is_empty() {
        if let Some(target) = index.best_of(&keywords) {
            return Some(finish(shape, target, index));
        }
    }

    // 4. Fuzzy containment against the target list itself.
    if !master_norm.is_empty() {
        if let Some(target) = index.fuzzy(&master_norm) {
            return Some(finish(shape, target, index));
        }
    }

    // 5. Geometry/text heuristics for untyped shapes.
    if is_branch_label(&shape.text) && shape.size.height < 0.5 && shape.size.width < 1.5 {
        // A short wide branch word floating by itself belongs to a connector.
        return index.best_of(&["dynamic connector", "connector"]);
    }
    if !shape.text.is_empty()
        && shape.text.chars().count() <= 30
        && shape.size.width * shape.size.height < 4.0
    {
        return index.best_of(&["process", "rounded rectangle"]);
    }

    None
}

/// Role-labeled shapes are process nodes even when the cascade chose a
/// container-like master for them.
fn finish(shape: &Shape, chosen: String, index: &TargetIndex) -> String {
    let chosen_norm = normalize_name(&chosen);
    let container_like = ["container", "swimlane", "frame", "list"]
        .iter()
        .any(|k| chosen_norm.contains(k));
    if container_like && has_role_label(&shape.text) {
        if let Some(process) = index.best_of(&["process", "rounded rectangle"]) {
            return process;
        }
    }
    chosen
}

struct TargetIndex {
    /// (normalized name, display name)
    names: Vec<(String, String)>,
}

impl TargetIndex {
    fn new(targets: &[MasterInfo]) -> Self {
        Self {
            names: targets
                .iter()
                .filter(|m| !m.name.is_empty())
                .map(|m| (normalize_name(&m.name), m.name.clone()))
                .collect(),
        }
    }

    fn exact(&self, norm: &str) -> Option<String> {
        if norm.is_empty() {
            return None;
        }
        self.names
            .iter()
            .find(|(n, _)| n == norm)
            .map(|(_, name)| name.clone())
    }

    /// First candidate that matches exactly, else by containment either way.
    fn best_of(&self, candidates: &[&str]) -> Option<String> {
        for candidate in candidates {
            let norm = normalize_name(candidate);
            if let Some(name) = self.exact(&norm) {
                return Some(name);
            }
            if let Some(name) = self.fuzzy(&norm) {
                return Some(name);
            }
        }
        None
    }

    fn fuzzy(&self, norm: &str) -> Option<String> {
        self.names
            .iter()
            .find(|(n, _)| n.contains(norm) || norm.contains(n.as_str()))
            .map(|(_, name)| name.clone())
    }
}
