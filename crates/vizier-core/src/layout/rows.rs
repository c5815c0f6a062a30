//! Flow-row clustering and the row-to-row target mapping (states 7 and 8
//! of the re-projection sequence).

use std::collections::HashSet;

use crate::layout::LayoutOptions;
use crate::layout::cluster::{Cluster, cluster_values, nearest_cluster};
use crate::layout::grid::{self, DEFAULT_PROCESS_HEIGHT, MasterRole, TargetGrid};
use crate::model::{Mapping, Page, Shape};

/// Flow-role classification of the source page's shapes. The mapped target
/// master decides first; the original master name second; untyped shapes
/// fall back to a size/text-length heuristic.
#[derive(Debug, Default)]
pub struct FlowInfo {
    pub flow_ids: HashSet<String>,
    pub decision_ids: HashSet<String>,
    pub start_end_ids: HashSet<String>,
}

pub fn detect_flow_shapes(page: &Page, mapping: &Mapping, exclude: &HashSet<String>) -> FlowInfo {
    let mut info = FlowInfo::default();
    for shape in &page.shapes {
        if exclude.contains(&shape.id) {
            continue;
        }
        let role = shape_flow_role(shape, mapping);
        if !grid::is_flow_role(role) {
            continue;
        }
        info.flow_ids.insert(shape.id.clone());
        match role {
            MasterRole::Decision => {
                info.decision_ids.insert(shape.id.clone());
            }
            MasterRole::StartEnd => {
                info.start_end_ids.insert(shape.id.clone());
            }
            _ => {}
        }
    }
    info
}

fn shape_flow_role(shape: &Shape, mapping: &Mapping) -> MasterRole {
    let mapped = mapping
        .get(&shape.id)
        .map(|name| grid::master_role(name))
        .unwrap_or(MasterRole::Other);
    if mapped != MasterRole::Other && mapped != MasterRole::Connector {
        return mapped;
    }
    let original = grid::role_of(shape.master_name.as_deref());
    if original != MasterRole::Other && original != MasterRole::Connector {
        return original;
    }
    // Untyped: a compact labeled box reads as a process step. Floating
    // branch words belong to connectors, not to the flow grid.
    if !shape.text.is_empty()
        && !crate::classify::is_branch_label(&shape.text)
        && shape.text.chars().count() <= 30
        && shape.size.width * shape.size.height < 4.0
    {
        return MasterRole::Process;
    }
    MasterRole::Other
}

#[derive(Debug, Clone)]
pub struct SourceRow {
    pub center: f64,
    pub ids: Vec<String>,
}

/// Vertical transform from source flow rows into the target grid.
#[derive(Debug)]
pub enum RowMap {
    /// Per-row targets anchored on the template's decision row.
    Anchored {
        rows: Vec<SourceRow>,
        targets: Vec<f64>,
        decision_row: usize,
    },
    /// Single linear fit between the source top-to-decision span and the
    /// template's equivalent span.
    Linear { scale: f64, offset: f64 },
    Identity,
}

impl RowMap {
    /// Map a flow shape's Y: snap to its row's target center; decision
    /// shapes always land exactly on the decision target.
    pub fn map_flow(&self, id: &str, y: f64, is_decision: bool) -> f64 {
        match self {
            RowMap::Anchored {
                rows,
                targets,
                decision_row,
            } => {
                if is_decision {
                    return targets[*decision_row];
                }
                match rows.iter().position(|r| r.ids.iter().any(|i| i == id)) {
                    Some(idx) => targets[idx],
                    None => self.map_free(y),
                }
            }
            _ => self.map_free(y),
        }
    }

    /// Map any other Y, preserving its offset from the nearest row center.
    pub fn map_free(&self, y: f64) -> f64 {
        match self {
            RowMap::Anchored { rows, targets, .. } => {
                let nearest = rows
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| {
                        (a.center - y).abs().total_cmp(&(b.center - y).abs())
                    })
                    .map(|(i, _)| i);
                match nearest {
                    Some(idx) => targets[idx] + (y - rows[idx].center),
                    None => y,
                }
            }
            RowMap::Linear { scale, offset } => scale * y + offset,
            RowMap::Identity => y,
        }
    }
}

/// Build the row map for a page (clustering, duplicate pruning, anchored
/// interpolation with clamping, linear fallback).
pub fn build_row_map(
    page: &Page,
    flow: &FlowInfo,
    grid: Option<&TargetGrid>,
    opts: &LayoutOptions,
) -> RowMap {
    let process_height = grid
        .map(|g| g.process_height)
        .unwrap_or(DEFAULT_PROCESS_HEIGHT);
    let tolerance = opts.row_cluster_factor * process_height;

    let flow_shapes: Vec<&Shape> = page
        .shapes
        .iter()
        .filter(|s| flow.flow_ids.contains(&s.id))
        .collect();
    if flow_shapes.is_empty() {
        return RowMap::Identity;
    }

    let ys: Vec<f64> = flow_shapes.iter().map(|s| s.position.y).collect();
    let clusters = cluster_values(&ys, tolerance);
    let mut rows: Vec<SourceRow> = clusters
        .iter()
        .map(|c| SourceRow {
            center: c.center,
            ids: c
                .members
                .iter()
                .map(|&i| flow_shapes[i].id.clone())
                .collect(),
        })
        .collect();

    let decision_row = vote_decision_row(&clusters, &flow_shapes, &flow.decision_ids);

    // Prune outlier single-member decision rows just below the voted one:
    // pure duplicates would inflate the row count before mapping.
    if let Some(dec) = decision_row {
        while dec + 1 < rows.len()
            && rows[dec + 1].ids.len() == 1
            && flow.decision_ids.contains(&rows[dec + 1].ids[0])
        {
            let pruned = rows.remove(dec + 1);
            rows[dec].ids.extend(pruned.ids);
        }
    }

    if let (Some(g), Some(dec)) = (grid, decision_row) {
        if let Some(tpl_dec) = g.decision_row {
            if !g.row_centers.is_empty() {
                let targets = anchored_targets(&rows, dec, &g.row_centers, tpl_dec, g, flow);
                return RowMap::Anchored {
                    rows,
                    targets,
                    decision_row: dec,
                };
            }
        }
    }

    // No reliable template anchor: fit a single linear transform through
    // the top-row/decision-row span of both diagrams.
    if let (Some(g), Some(dec)) = (grid, decision_row) {
        if let Some(tpl_dec) = g.decision_row {
            let src_top = rows[0].center;
            let src_dec = rows[dec].center;
            if dec > 0 && (src_top - src_dec).abs() > f64::EPSILON && !g.row_centers.is_empty() {
                let scale = (g.row_centers[0] - g.row_centers[tpl_dec]) / (src_top - src_dec);
                let offset = g.row_centers[tpl_dec] - scale * src_dec;
                return RowMap::Linear { scale, offset };
            }
        }
    }
    RowMap::Identity
}

fn vote_decision_row(
    clusters: &[Cluster],
    flow_shapes: &[&Shape],
    decision_ids: &HashSet<String>,
) -> Option<usize> {
    let mut votes = vec![0usize; clusters.len()];
    for shape in flow_shapes {
        if !decision_ids.contains(&shape.id) {
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
    // Ties break toward the topmost row.
    votes.iter().position(|&v| v == best)
}

fn anchored_targets(
    rows: &[SourceRow],
    dec: usize,
    tpl: &[f64],
    tpl_dec: usize,
    g: &TargetGrid,
    flow: &FlowInfo,
) -> Vec<f64> {
    let n = rows.len();
    let mut targets = vec![0.0; n];

    // Rows above the decision map one-to-one to the earliest template rows,
    // clamped when the source has more of them than the template.
    for (i, target) in targets.iter_mut().enumerate().take(dec) {
        let idx = i.min(tpl_dec.saturating_sub(1)).min(tpl.len() - 1);
        *target = tpl[idx];
    }
    targets[dec] = tpl[tpl_dec.min(tpl.len() - 1)];

    let n_below = n - dec - 1;
    if n_below > 0 {
        // Anchor far enough below the decision row to fit the remainder,
        // clamped to the last template row rather than extrapolated.
        let anchor_idx = (tpl_dec + n_below).min(tpl.len() - 1);
        let anchor = tpl[anchor_idx];
        let dec_target = targets[dec];
        for j in 1..=n_below {
            let t = j as f64 / n_below as f64;
            targets[dec + j] = dec_target + (anchor - dec_target) * t;
        }

        // A terminator in the last row is shorter than a process node; land
        // its visual center on the anchor, not its geometric center.
        let last_has_terminator = rows[n - 1]
            .ids
            .iter()
            .any(|id| flow.start_end_ids.contains(id));
        if last_has_terminator {
            let corrected = anchor - (g.process_height - g.start_end_height) / 2.0;
            targets[n - 1] = if n >= 2 {
                corrected.min(targets[n - 2])
            } else {
                corrected
            };
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Extent, Position};
    use indexmap::IndexMap;

    fn flow_shape(id: &str, y: f64, master: &str) -> Shape {
        Shape {
            id: id.to_string(),
            text: format!("step {id}"),
            master_name: Some(master.to_string()),
            master_id: None,
            position: Position { x: 4.0, y },
            size: Extent {
                width: 1.2,
                height: 0.6,
            },
            properties: Default::default(),
            tags: Default::default(),
        }
    }

    fn page(shapes: Vec<Shape>) -> Page {
        Page {
            name: "Page-1".into(),
            width: 11.0,
            height: 8.5,
            shapes,
            connectors: vec![],
        }
    }

    fn grid_with_rows(rows: Vec<f64>, decision: usize) -> TargetGrid {
        TargetGrid {
            lane_widths: vec![3.0, 3.0],
            lane_height: 8.0,
            heading_height: 0.4,
            origin_x: 0.5,
            origin_y: 0.5,
            row_centers: rows,
            decision_row: Some(decision),
            process_height: 0.75,
            start_end_height: 0.5,
            lane_master: Some("Swimlane".into()),
            container_master: Some("CFF Container".into()),
            text_master: None,
            page_width: 11.0,
            page_height: 8.5,
        }
    }

    #[test]
    fn anchored_rows_snap_and_preserve_order() {
        let shapes = vec![
            flow_shape("1", 7.5, "Process"),
            flow_shape("2", 6.0, "Process"),
            flow_shape("3", 4.5, "Decision"),
            flow_shape("4", 3.0, "Process"),
            flow_shape("5", 1.5, "Start/End"),
        ];
        let p = page(shapes);
        let mapping = IndexMap::new();
        let flow = detect_flow_shapes(&p, &mapping, &HashSet::new());
        assert_eq!(flow.flow_ids.len(), 5);
        assert!(flow.decision_ids.contains("3"));
        assert!(flow.start_end_ids.contains("5"));

        let grid = grid_with_rows(vec![7.0, 5.5, 4.0, 2.5, 1.0], 2);
        let opts = LayoutOptions::default();
        let map = build_row_map(&p, &flow, Some(&grid), &opts);

        // decision snaps exactly to the template decision row
        assert_eq!(map.map_flow("3", 4.5, true), 4.0);
        // rows above in order
        assert_eq!(map.map_flow("1", 7.5, false), 7.0);
        assert_eq!(map.map_flow("2", 6.0, false), 5.5);

        // monotonic order is preserved through the map
        let mapped: Vec<f64> = [
            ("1", 7.5),
            ("2", 6.0),
            ("3", 4.5),
            ("4", 3.0),
            ("5", 1.5),
        ]
        .iter()
        .map(|(id, y)| map.map_flow(id, *y, *id == "3"))
        .collect();
        for pair in mapped.windows(2) {
            assert!(pair[0] >= pair[1], "row order not preserved: {mapped:?}");
        }

        // terminator half-height correction: below the plain anchor
        let anchor = 1.0;
        let corrected = anchor - (0.75 - 0.5) / 2.0;
        assert!((map.map_flow("5", 1.5, false) - corrected).abs() < 1e-9);
    }

    #[test]
    fn interpolation_clamps_to_last_template_row() {
        // Source has more rows below the decision than the template offers.
        let shapes = vec![
            flow_shape("1", 8.0, "Process"),
            flow_shape("2", 6.5, "Decision"),
            flow_shape("3", 5.0, "Process"),
            flow_shape("4", 3.5, "Process"),
            flow_shape("5", 2.0, "Process"),
        ];
        let p = page(shapes);
        let flow = detect_flow_shapes(&p, &IndexMap::new(), &HashSet::new());
        let grid = grid_with_rows(vec![7.0, 5.5, 4.0], 1);
        let map = build_row_map(&p, &flow, Some(&grid), &LayoutOptions::default());

        // The farthest row lands on the last template row, not beyond it.
        assert!((map.map_flow("5", 2.0, false) - 4.0).abs() < 1e-9);
        assert!(map.map_flow("3", 5.0, false) >= map.map_flow("4", 3.5, false));
    }

    #[test]
    fn duplicate_decision_row_is_pruned() {
        let shapes = vec![
            flow_shape("1", 7.0, "Process"),
            flow_shape("2", 5.0, "Decision"),
            // A second decision diamond drawn slightly lower: pure duplicate.
            flow_shape("3", 4.2, "Decision"),
            flow_shape("4", 2.0, "Process"),
        ];
        let p = page(shapes);
        let flow = detect_flow_shapes(&p, &IndexMap::new(), &HashSet::new());
        let grid = grid_with_rows(vec![7.0, 5.0, 3.0], 1);
        let map = build_row_map(&p, &flow, Some(&grid), &LayoutOptions::default());
        match &map {
            RowMap::Anchored { rows, .. } => {
                assert_eq!(rows.len(), 3, "duplicate row not pruned");
            }
            other => panic!("expected anchored map, got {other:?}"),
        }
        // Both decisions snap to the same decision target.
        assert_eq!(map.map_flow("2", 5.0, true), map.map_flow("3", 4.2, true));
    }

    #[test]
    fn no_template_rows_falls_back_to_identity() {
        let shapes = vec![flow_shape("1", 7.0, "Process")];
        let p = page(shapes);
        let flow = detect_flow_shapes(&p, &IndexMap::new(), &HashSet::new());
        let map = build_row_map(&p, &flow, None, &LayoutOptions::default());
        assert!(matches!(map, RowMap::Identity));
        assert_eq!(map.map_free(3.3), 3.3);
    }
}
