//! Target grid: lane and row metrics derived from a concrete
//! swimlane/container instance on the template's page.

use crate::classify::normalize_name;
use crate::layout::LayoutOptions;
use crate::layout::cluster::{cluster_values, nearest_cluster};
use crate::model::{Diagram, MasterInfo};

pub const DEFAULT_PROCESS_HEIGHT: f64 = 0.75;
pub const DEFAULT_START_END_HEIGHT: f64 = 0.5;
pub const DEFAULT_HEADING_HEIGHT: f64 = 0.35;

/// Role a master name plays in the flowchart vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterRole {
    Lane,
    Container,
    Process,
    Decision,
    StartEnd,
    Connector,
    Text,
    Other,
}

pub fn master_role(name: &str) -> MasterRole {
    let norm = normalize_name(name);
    if norm.is_empty() {
        return MasterRole::Other;
    }
    if norm.contains("swimlane") && !norm.contains("list") {
        return MasterRole::Lane;
    }
    if norm.contains("container") || norm.contains("frame") {
        return MasterRole::Container;
    }
    if norm.contains("decision") || norm.contains("diamond") {
        return MasterRole::Decision;
    }
    if norm.contains("startend") || norm.contains("terminator") {
        return MasterRole::StartEnd;
    }
    if norm.contains("connector") || norm.contains("arrow") {
        return MasterRole::Connector;
    }
    if norm.contains("text") {
        return MasterRole::Text;
    }
    if norm.contains("process") || norm.contains("rect") {
        return MasterRole::Process;
    }
    MasterRole::Other
}

pub fn is_flow_role(role: MasterRole) -> bool {
    matches!(
        role,
        MasterRole::Process | MasterRole::Decision | MasterRole::StartEnd
    )
}

/// Metrics of the template's swimlane instance and flow-row skeleton.
#[derive(Debug, Clone)]
pub struct TargetGrid {
    /// Lane widths, left to right.
    pub lane_widths: Vec<f64>,
    pub lane_height: f64,
    pub heading_height: f64,
    /// Container (or lane-union) left edge and bottom edge.
    pub origin_x: f64,
    pub origin_y: f64,
    /// Flow-row vertical centers, top first.
    pub row_centers: Vec<f64>,
    /// Index into `row_centers` of the decision row.
    pub decision_row: Option<usize>,
    pub process_height: f64,
    pub start_end_height: f64,
    /// Display names of the template masters backing each role, when present.
    pub lane_master: Option<String>,
    pub container_master: Option<String>,
    pub text_master: Option<String>,
    pub page_width: f64,
    pub page_height: f64,
}

impl TargetGrid {
    pub fn lane_count(&self) -> usize {
        self.lane_widths.len()
    }

    pub fn total_width(&self) -> f64 {
        self.lane_widths.iter().sum()
    }

    /// Left edge of lane `i`, clamped to the last lane.
    pub fn lane_left(&self, i: usize) -> f64 {
        let i = i.min(self.lane_widths.len().saturating_sub(1));
        self.origin_x + self.lane_widths[..i].iter().sum::<f64>()
    }

    pub fn lane_width(&self, i: usize) -> f64 {
        let i = i.min(self.lane_widths.len().saturating_sub(1));
        self.lane_widths[i]
    }
}

/// Derive the target grid from the template's first page.
///
/// Returns `None` when the template exposes no lane instance; the caller
/// falls back to proportional scaling of the source bounds.
pub fn derive_grid(
    template: &Diagram,
    template_masters: &[MasterInfo],
    opts: &LayoutOptions,
) -> Option<TargetGrid> {
    let page = template.pages.first()?;

    let mut lanes: Vec<&crate::model::Shape> = page
        .shapes
        .iter()
        .filter(|s| role_of(s.master_name.as_deref()) == MasterRole::Lane)
        .collect();
    if lanes.is_empty() {
        return None;
    }
    lanes.sort_by(|a, b| a.position.x.total_cmp(&b.position.x));

    let lane_widths: Vec<f64> = lanes.iter().map(|l| l.size.width).collect();
    let lane_height = lanes
        .iter()
        .map(|l| l.size.height)
        .fold(0.0_f64, f64::max);

    let container = page
        .shapes
        .iter()
        .find(|s| role_of(s.master_name.as_deref()) == MasterRole::Container);

    let (origin_x, origin_y, heading_height) = match container {
        Some(c) => (
            c.left(),
            c.bottom(),
            (c.size.height - lane_height).max(0.0),
        ),
        None => (
            lanes.iter().map(|l| l.left()).fold(f64::INFINITY, f64::min),
            lanes
                .iter()
                .map(|l| l.bottom())
                .fold(f64::INFINITY, f64::min),
            DEFAULT_HEADING_HEIGHT,
        ),
    };

    let process_height = master_height(template_masters, MasterRole::Process)
        .unwrap_or(DEFAULT_PROCESS_HEIGHT);
    let start_end_height = master_height(template_masters, MasterRole::StartEnd)
        .unwrap_or(DEFAULT_START_END_HEIGHT);

    // Flow-row skeleton of the template page itself.
    let flow: Vec<&crate::model::Shape> = page
        .shapes
        .iter()
        .filter(|s| is_flow_role(role_of(s.master_name.as_deref())))
        .collect();
    let ys: Vec<f64> = flow.iter().map(|s| s.position.y).collect();
    let clusters = cluster_values(&ys, opts.row_cluster_factor * process_height);
    let row_centers: Vec<f64> = clusters.iter().map(|c| c.center).collect();

    let decision_row = vote_decision_row(&clusters, &flow);

    Some(TargetGrid {
        lane_widths,
        lane_height,
        heading_height,
        origin_x,
        origin_y,
        row_centers,
        decision_row,
        process_height,
        start_end_height,
        lane_master: master_name(template_masters, MasterRole::Lane),
        container_master: master_name(template_masters, MasterRole::Container),
        text_master: master_name(template_masters, MasterRole::Text),
        page_width: page.width,
        page_height: page.height,
    })
}

/// Plurality vote: the cluster nearest to the most decision shapes.
fn vote_decision_row(
    clusters: &[super::cluster::Cluster],
    flow: &[&crate::model::Shape],
) -> Option<usize> {
    let mut votes = vec![0usize; clusters.len()];
    for shape in flow {
        if role_of(shape.master_name.as_deref()) != MasterRole::Decision {
            continue;
        }
        if let Some(idx) = nearest_cluster(clusters, shape.position.y) {
            votes[idx] += 1;
        }
    }
    let best = votes.iter().copied().max().unwrap_or(0);
    if best == 0 {
        return None;
    }
    votes.iter().position(|&v| v == best)
}

pub fn role_of(master_name: Option<&str>) -> MasterRole {
    master_name.map(master_role).unwrap_or(MasterRole::Other)
}

fn master_name(masters: &[MasterInfo], role: MasterRole) -> Option<String> {
    masters
        .iter()
        .find(|m| master_role(&m.name) == role)
        .map(|m| m.name.clone())
}

fn master_height(masters: &[MasterInfo], role: MasterRole) -> Option<f64> {
    masters
        .iter()
        .find(|m| master_role(&m.name) == role)
        .map(|m| m.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_roles() {
        assert_eq!(master_role("Swimlane"), MasterRole::Lane);
        assert_eq!(master_role("Swimlane (vertical)"), MasterRole::Lane);
        assert_eq!(master_role("Swimlane List"), MasterRole::Other);
        assert_eq!(master_role("CFF Container"), MasterRole::Container);
        assert_eq!(master_role("Decision"), MasterRole::Decision);
        assert_eq!(master_role("Start/End"), MasterRole::StartEnd);
        assert_eq!(master_role("Dynamic connector"), MasterRole::Connector);
        assert_eq!(master_role("Rounded Rectangle"), MasterRole::Process);
        assert_eq!(master_role("Text box"), MasterRole::Text);
    }
}
