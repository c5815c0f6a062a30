//! Horizontal lane remapping and in-place shape geometry edits.

use tracing::debug;

use crate::cells;
use crate::classify::is_branch_label;
use crate::layout::LayoutOptions;
use crate::layout::grid::TargetGrid;
use crate::model::{Page, Shape};
use crate::xml::{Element, Node};

/// Piecewise-linear transform from source lane spans to the target grid's
/// lane columns. Falls back to one global linear segment when the source
/// has no usable lane headers.
#[derive(Debug)]
pub struct LaneMap {
    src_edges: Vec<f64>,
    dst_edges: Vec<f64>,
}

impl LaneMap {
    /// Build from the source header shapes (already sorted by X) and the
    /// target grid. Adjacent source lanes share an edge at the midpoint
    /// between neighboring headers.
    pub fn from_headers(headers: &[&Shape], grid: &TargetGrid) -> Option<LaneMap> {
        if headers.is_empty() {
            return None;
        }
        let mut src_edges = Vec::with_capacity(headers.len() + 1);
        src_edges.push(headers[0].left());
        for pair in headers.windows(2) {
            src_edges.push((pair[0].right() + pair[1].left()) / 2.0);
        }
        src_edges.push(headers[headers.len() - 1].right());

        let mut dst_edges = Vec::with_capacity(headers.len() + 1);
        for i in 0..headers.len() {
            dst_edges.push(grid.lane_left(i));
        }
        dst_edges.push(grid.lane_left(headers.len() - 1) + grid.lane_width(headers.len() - 1));

        for pair in src_edges.windows(2) {
            if pair[1] - pair[0] <= f64::EPSILON {
                debug!("degenerate source lane span, lane map unavailable");
                return None;
            }
        }
        Some(LaneMap {
            src_edges,
            dst_edges,
        })
    }

    /// One global segment spanning the whole drawing.
    pub fn global(src_left: f64, src_right: f64, dst_left: f64, dst_right: f64) -> Option<LaneMap> {
        if src_right - src_left <= f64::EPSILON {
            return None;
        }
        Some(LaneMap {
            src_edges: vec![src_left, src_right],
            dst_edges: vec![dst_left, dst_right],
        })
    }

    pub fn map_x(&self, x: f64) -> f64 {
        let n = self.src_edges.len() - 1;
        // Outside the covered span: extend the nearest segment.
        let seg = if x <= self.src_edges[0] {
            0
        } else if x >= self.src_edges[n] {
            n - 1
        } else {
            self.src_edges
                .windows(2)
                .position(|p| x >= p[0] && x <= p[1])
                .unwrap_or(n - 1)
        };
        let (s0, s1) = (self.src_edges[seg], self.src_edges[seg + 1]);
        let (d0, d1) = (self.dst_edges[seg], self.dst_edges[seg + 1]);
        d0 + (x - s0) / (s1 - s0) * (d1 - d0)
    }

    /// Index of the target lane whose column contains the mapped X.
    pub fn lane_of(&self, x: f64) -> usize {
        let mapped = self.map_x(x);
        let n = self.dst_edges.len() - 1;
        self.dst_edges
            .windows(2)
            .position(|p| mapped >= p[0] && mapped <= p[1])
            .unwrap_or(if mapped < self.dst_edges[0] { 0 } else { n - 1 })
    }
}

/// Locate the top-level shape element with the given ID.
pub fn shape_element_mut<'a>(page_root: &'a mut Element, id: &str) -> Option<&'a mut Element> {
    let shapes = page_root.first_child_named_mut("Shapes")?;
    shapes
        .children_named_mut("Shape")
        .find(|el| el.attr("ID") == Some(id))
}

pub fn remove_shape_element(page_root: &mut Element, id: &str) {
    if let Some(shapes) = page_root.first_child_named_mut("Shapes") {
        shapes.retain_elements(|el| !(el.has_local_name("Shape") && el.attr("ID") == Some(id)));
    }
}

pub fn set_shape_position(el: &mut Element, x: f64, y: f64) {
    cells::set_cell_f64(el, "PinX", x);
    cells::set_cell_f64(el, "PinY", y);
}

pub fn set_shape_size(el: &mut Element, width: f64, height: f64) {
    cells::set_cell_f64(el, "Width", width);
    cells::set_cell_f64(el, "Height", height);
    cells::set_cell_f64(el, "LocPinX", width / 2.0);
    cells::set_cell_f64(el, "LocPinY", height / 2.0);
}

/// Rewrite a routed connector's endpoint cells and recenter its pin on
/// the new midpoint. Stale route geometry is dropped so Visio re-routes.
pub fn set_connector_geometry(el: &mut Element, begin: (f64, f64), end: (f64, f64)) {
    cells::set_cell_f64(el, "BeginX", begin.0);
    cells::set_cell_f64(el, "BeginY", begin.1);
    cells::set_cell_f64(el, "EndX", end.0);
    cells::set_cell_f64(el, "EndY", end.1);
    let width = (end.0 - begin.0).abs().max(f64::EPSILON);
    let height = (end.1 - begin.1).abs().max(f64::EPSILON);
    cells::set_cell_f64(el, "PinX", (begin.0 + end.0) / 2.0);
    cells::set_cell_f64(el, "PinY", (begin.1 + end.1) / 2.0);
    cells::set_cell_f64(el, "Width", width);
    cells::set_cell_f64(el, "Height", height);
    cells::remove_sections(el, &["Geometry"]);
}

/// Replace a shape's text body. Whitespace-only text nodes between the
/// cells are dropped too, so `text_content` yields exactly the new text.
pub fn set_shape_text(el: &mut Element, text: &str) {
    el.retain_elements(|child| !child.has_local_name("Text"));
    el.children.retain(|node| match node {
        Node::Text(t) => !t.trim().is_empty(),
        Node::Element(_) => true,
    });
    let mut text_el = Element::new("Text");
    text_el.push_text(text);
    el.push_element(text_el);
}

/// Re-home free-floating branch labels onto their connectors: a small
/// label like 通过 near an untexted connector midpoint becomes that
/// connector's text, and the label shape is deleted.
pub fn reassociate_branch_labels(
    page_root: &mut Element,
    page: &mut Page,
    opts: &LayoutOptions,
) -> usize {
    let mut moved: Vec<(String, String, String)> = Vec::new();
    let mut claimed: Vec<String> = Vec::new();

    for shape in &page.shapes {
        if !is_branch_label(&shape.text) {
            continue;
        }
        if shape.size.width * shape.size.height > 1.0 {
            continue;
        }
        let center = shape.center();
        let nearest = page
            .connectors
            .iter()
            .filter(|c| c.text.is_empty() && !claimed.contains(&c.id))
            .map(|c| {
                let mid = c.midpoint();
                let d = ((mid.x - center.x).powi(2) + (mid.y - center.y).powi(2)).sqrt();
                (c.id.clone(), d)
            })
            .filter(|(_, d)| *d <= opts.label_snap_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((connector_id, _)) = nearest {
            claimed.push(connector_id.clone());
            moved.push((shape.id.clone(), connector_id, shape.text.clone()));
        }
    }

    for (label_id, connector_id, text) in &moved {
        if let Some(el) = shape_element_mut(page_root, connector_id) {
            set_shape_text(el, text);
        }
        remove_shape_element(page_root, label_id);
        if let Some(c) = page.connectors.iter_mut().find(|c| &c.id == connector_id) {
            c.text = text.clone();
        }
        page.shapes.retain(|s| &s.id != label_id);
        debug!(label = %text, connector = %connector_id, "branch label re-homed");
    }
    moved.len()
}
