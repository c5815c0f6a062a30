//! Layout re-projection: moves a restyled page's shapes into the target
//! template's swimlane-and-row grid.
//!
//! The pass is best-effort by design. When the source page has no
//! recognizable lane headers the shapes are scaled to the template's page
//! size instead, and when even that is impossible the page is left alone.
//! A failed re-projection never fails the conversion.

pub mod cluster;
pub mod grid;
pub mod remap;
pub mod rows;

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cells;
use crate::geom::Bounds;
use crate::layout::grid::MasterRole;
use crate::layout::remap::LaneMap;
use crate::layout::rows::RowMap;
use crate::model::{Extent, Mapping, Page, Position, Shape, ShapeTags};
use crate::xml::Element;

pub use grid::{TargetGrid, derive_grid};

/// Tunables for the re-projection pass.
#[derive(Debug, Clone)]
pub struct LayoutOptions {
    /// Maximum distance between a floating branch label and a connector
    /// midpoint for the label to be folded into the connector's text.
    pub label_snap_distance: f64,
    /// Row clustering tolerance as a fraction of the process-shape height.
    pub row_cluster_factor: f64,
    /// Fraction of the page height, measured from the top, searched for
    /// the diagram title.
    pub header_top_band: f64,
    /// Quick-style color index that marks lane header shapes in the
    /// source drawings.
    pub header_marker_color: String,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        LayoutOptions {
            label_snap_distance: 2.0,
            row_cluster_factor: 0.6,
            header_top_band: 0.2,
            header_marker_color: "19".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    /// Full lane-and-row re-projection.
    Swimlane,
    /// Uniform rescale onto the template's page size.
    Scaled,
    /// No geometry was touched.
    Unchanged,
}

#[derive(Debug)]
pub struct LayoutOutcome {
    pub mode: LayoutMode,
    pub lanes: usize,
    pub relabeled: usize,
    pub headings_added: usize,
}

impl LayoutOutcome {
    fn unchanged() -> Self {
        LayoutOutcome {
            mode: LayoutMode::Unchanged,
            lanes: 0,
            relabeled: 0,
            headings_added: 0,
        }
    }
}

/// Re-project one page into the target grid, editing both the XML tree
/// and the extracted model in place.
pub fn reproject_page(
    page_root: &mut Element,
    page: &mut Page,
    mapping: &Mapping,
    imported: &IndexMap<String, String>,
    grid: Option<&TargetGrid>,
    opts: &LayoutOptions,
) -> LayoutOutcome {
    let Some(g) = grid else {
        debug!("no target grid derived, leaving layout unchanged");
        return LayoutOutcome::unchanged();
    };

    let header_ids = detect_headers(page_root, page, mapping, opts);
    if header_ids.len() < 2 {
        debug!(
            headers = header_ids.len(),
            "not enough lane headers, falling back to page scaling"
        );
        return scale_page(page_root, page, g);
    }

    let headers: Vec<Shape> = header_ids
        .iter()
        .filter_map(|id| page.shapes.iter().find(|s| &s.id == id))
        .cloned()
        .collect();
    let lane_count = headers.len().min(g.lane_count());
    if headers.len() > g.lane_count() {
        warn!(
            source = headers.len(),
            template = g.lane_count(),
            "more source lanes than template columns, extra lanes share the last column"
        );
    }

    let header_set: HashSet<String> = header_ids.iter().cloned().collect();
    let container_id = find_container(page, mapping, &header_set);
    let mut excluded = header_set.clone();
    if let Some(id) = &container_id {
        excluded.insert(id.clone());
    }

    let flow = rows::detect_flow_shapes(page, mapping, &excluded);
    let title_id = find_title(page, &excluded, &flow.flow_ids, opts);

    for shape in &mut page.shapes {
        shape.tags = ShapeTags {
            is_header: header_set.contains(&shape.id),
            is_container: container_id.as_deref() == Some(shape.id.as_str()),
            is_flow_node: flow.flow_ids.contains(&shape.id),
            is_decision: flow.decision_ids.contains(&shape.id),
        };
    }

    let header_refs: Vec<&Shape> = headers.iter().collect();
    let lane_map = LaneMap::from_headers(&header_refs, g).or_else(|| {
        let mut bounds = Bounds::empty();
        for shape in &page.shapes {
            bounds.add_centered(shape.center(), shape.extent());
        }
        LaneMap::global(
            bounds.min_x,
            bounds.max_x,
            g.origin_x,
            g.origin_x + g.total_width(),
        )
    });
    let row_map = rows::build_row_map(page, &flow, Some(g), opts);

    let group_token = Uuid::new_v4().to_string();
    place_lanes(page_root, page, &header_ids, g, &group_token);
    if let Some(id) = &container_id {
        place_container(page_root, page, id, lane_count, g, &group_token);
    }
    if let Some(id) = &title_id {
        place_title(page_root, page, id, g);
    }

    move_shapes(
        page_root,
        page,
        title_id.as_deref(),
        &flow,
        lane_map.as_ref(),
        &row_map,
        g,
    );
    move_connectors(page_root, page, lane_map.as_ref(), &row_map);

    // Label removal retires shape ids; heading ids must come from the
    // pre-removal maximum so a freed id is never reissued.
    let fresh_ids_from = max_shape_id(page_root) + 1;
    let relabeled = remap::reassociate_branch_labels(page_root, page, opts);
    let headings_added =
        synthesize_headings(page_root, page, &headers, lane_count, g, imported, fresh_ids_from);
    reorder_z(page_root, container_id.as_deref(), &header_ids, headings_added);

    info!(
        lanes = headers.len(),
        relabeled, headings_added, "page re-projected into swimlane grid"
    );
    LayoutOutcome {
        mode: LayoutMode::Swimlane,
        lanes: headers.len(),
        relabeled,
        headings_added,
    }
}

/// Lane headers: shapes mapped onto a lane master, plus shapes carrying
/// the header quick-style marker, filtered to the topmost band they share
/// and ordered left to right.
fn detect_headers(
    page_root: &Element,
    page: &Page,
    mapping: &Mapping,
    opts: &LayoutOptions,
) -> Vec<String> {
    let mut candidates: Vec<&Shape> = Vec::new();
    for shape in &page.shapes {
        let mapped_lane = mapping
            .get(&shape.id)
            .is_some_and(|name| grid::master_role(name) == MasterRole::Lane);
        let marked = shape_element(page_root, &shape.id).is_some_and(|el| {
            let fill = cells::cell_value(el, "QuickStyleFillColor");
            let line = cells::cell_value(el, "QuickStyleLineColor");
            fill.is_some() && fill == line && fill == Some(opts.header_marker_color.as_str())
        });
        if mapped_lane || marked {
            candidates.push(shape);
        }
    }
    if candidates.is_empty() {
        return Vec::new();
    }

    // Headers sit in one horizontal band near the top of the drawing;
    // marker-styled shapes elsewhere on the page are not lanes.
    let max_top = candidates.iter().map(|s| s.top()).fold(f64::MIN, f64::max);
    let tolerance = candidates
        .iter()
        .map(|s| s.size.height)
        .fold(0.0f64, f64::max)
        .max(0.25);
    let mut headers: Vec<&Shape> = candidates
        .into_iter()
        .filter(|s| s.top() >= max_top - tolerance)
        .collect();
    headers.sort_by(|a, b| a.position.x.total_cmp(&b.position.x));
    headers.iter().map(|s| s.id.clone()).collect()
}

fn find_container(page: &Page, mapping: &Mapping, headers: &HashSet<String>) -> Option<String> {
    page.shapes
        .iter()
        .filter(|s| !headers.contains(&s.id))
        .find(|s| {
            let mapped = mapping
                .get(&s.id)
                .is_some_and(|name| grid::master_role(name) == MasterRole::Container);
            mapped || grid::role_of(s.master_name.as_deref()) == MasterRole::Container
        })
        .map(|s| s.id.clone())
}

/// The diagram title: the widest texted shape in the top band that is
/// neither structural nor part of the flow.
fn find_title(
    page: &Page,
    excluded: &HashSet<String>,
    flow_ids: &HashSet<String>,
    opts: &LayoutOptions,
) -> Option<String> {
    let band_floor = page.height * (1.0 - opts.header_top_band);
    page.shapes
        .iter()
        .filter(|s| {
            !excluded.contains(&s.id)
                && !flow_ids.contains(&s.id)
                && !s.text.is_empty()
                && s.position.y >= band_floor
        })
        .max_by(|a, b| a.size.width.total_cmp(&b.size.width))
        .map(|s| s.id.clone())
}

fn scale_page(page_root: &mut Element, page: &mut Page, g: &TargetGrid) -> LayoutOutcome {
    if page.width <= f64::EPSILON || page.height <= f64::EPSILON {
        return LayoutOutcome::unchanged();
    }
    let sx = g.page_width / page.width;
    let sy = g.page_height / page.height;
    if (sx - 1.0).abs() < 1e-9 && (sy - 1.0).abs() < 1e-9 {
        return LayoutOutcome::unchanged();
    }

    for shape in &mut page.shapes {
        shape.position.x *= sx;
        shape.position.y *= sy;
        if let Some(el) = remap::shape_element_mut(page_root, &shape.id) {
            remap::set_shape_position(el, shape.position.x, shape.position.y);
        }
    }
    for connector in &mut page.connectors {
        connector.begin.x *= sx;
        connector.begin.y *= sy;
        connector.end.x *= sx;
        connector.end.y *= sy;
        if let Some(el) = remap::shape_element_mut(page_root, &connector.id) {
            remap::set_connector_geometry(
                el,
                (connector.begin.x, connector.begin.y),
                (connector.end.x, connector.end.y),
            );
        }
    }
    LayoutOutcome {
        mode: LayoutMode::Scaled,
        lanes: 0,
        relabeled: 0,
        headings_added: 0,
    }
}

fn place_lanes(
    page_root: &mut Element,
    page: &mut Page,
    header_ids: &[String],
    g: &TargetGrid,
    group_token: &str,
) {
    for (i, id) in header_ids.iter().enumerate() {
        let width = g.lane_width(i);
        let x = g.lane_left(i) + width / 2.0;
        let y = g.origin_y + g.lane_height / 2.0;
        let text = page
            .shapes
            .iter()
            .find(|s| &s.id == id)
            .map(|s| s.text.clone())
            .unwrap_or_default();
        if let Some(el) = remap::shape_element_mut(page_root, id) {
            remap::set_shape_position(el, x, y);
            remap::set_shape_size(el, width, g.lane_height);
            cells::set_section_row_value(el, "User", "visHeadingText", &text);
            cells::set_section_row_value(el, "User", "groupToken", group_token);
        }
        if let Some(shape) = page.shapes.iter_mut().find(|s| &s.id == id) {
            shape.position = Position { x, y };
            shape.size = Extent {
                width,
                height: g.lane_height,
            };
        }
    }
}

fn place_container(
    page_root: &mut Element,
    page: &mut Page,
    id: &str,
    lane_count: usize,
    g: &TargetGrid,
    group_token: &str,
) {
    let width = g.total_width();
    let height = g.lane_height + g.heading_height;
    let x = g.origin_x + width / 2.0;
    let y = g.origin_y + height / 2.0;
    if let Some(el) = remap::shape_element_mut(page_root, id) {
        remap::set_shape_position(el, x, y);
        remap::set_shape_size(el, width, height);
        cells::set_section_row_value(el, "User", "numLanes", &lane_count.to_string());
        cells::set_section_row_value(el, "User", "vertical", "0");
        cells::set_section_row_value(el, "User", "locked", "1");
        cells::set_section_row_value(
            el,
            "User",
            "headingHeight",
            &cells::format_number(g.heading_height),
        );
        cells::set_section_row_value(el, "User", "showTitle", "0");
        cells::set_section_row_value(el, "User", "groupToken", group_token);
    }
    if let Some(shape) = page.shapes.iter_mut().find(|s| s.id == id) {
        shape.position = Position { x, y };
        shape.size = Extent { width, height };
    }
}

fn place_title(page_root: &mut Element, page: &mut Page, id: &str, g: &TargetGrid) {
    let x = g.origin_x + g.total_width() / 2.0;
    let y = g.origin_y + g.lane_height + g.heading_height + 0.3;
    if let Some(el) = remap::shape_element_mut(page_root, id) {
        remap::set_shape_position(el, x, y);
    }
    if let Some(shape) = page.shapes.iter_mut().find(|s| s.id == id) {
        shape.position = Position { x, y };
    }
}

fn move_shapes(
    page_root: &mut Element,
    page: &mut Page,
    title_id: Option<&str>,
    flow: &rows::FlowInfo,
    lane_map: Option<&LaneMap>,
    row_map: &RowMap,
    g: &TargetGrid,
) {
    let targets: Vec<(String, f64, f64, Option<f64>)> = page
        .shapes
        .iter()
        .filter(|s| {
            !s.tags.is_header && !s.tags.is_container && Some(s.id.as_str()) != title_id
        })
        .map(|s| {
            let x = lane_map.map_or(s.position.x, |m| m.map_x(s.position.x));
            let y = if s.tags.is_flow_node {
                row_map.map_flow(&s.id, s.position.y, s.tags.is_decision)
            } else {
                row_map.map_free(s.position.y)
            };
            // Flow nodes adopt the template's row heights so rows stay even.
            let height = if flow.start_end_ids.contains(&s.id) {
                Some(g.start_end_height)
            } else if s.tags.is_flow_node && !s.tags.is_decision {
                Some(g.process_height)
            } else {
                None
            };
            (s.id.clone(), x, y, height)
        })
        .collect();

    for (id, x, y, height) in targets {
        if let Some(el) = remap::shape_element_mut(page_root, &id) {
            remap::set_shape_position(el, x, y);
            if let Some(h) = height {
                cells::set_cell_f64(el, "Height", h);
                cells::set_cell_f64(el, "LocPinY", h / 2.0);
            }
        }
        if let Some(shape) = page.shapes.iter_mut().find(|s| s.id == id) {
            shape.position = Position { x, y };
            if let Some(h) = height {
                shape.size.height = h;
            }
        }
    }
}

fn move_connectors(
    page_root: &mut Element,
    page: &mut Page,
    lane_map: Option<&LaneMap>,
    row_map: &RowMap,
) {
    for connector in &mut page.connectors {
        let begin = Position {
            x: lane_map.map_or(connector.begin.x, |m| m.map_x(connector.begin.x)),
            y: row_map.map_free(connector.begin.y),
        };
        let end = Position {
            x: lane_map.map_or(connector.end.x, |m| m.map_x(connector.end.x)),
            y: row_map.map_free(connector.end.y),
        };
        if let Some(el) = remap::shape_element_mut(page_root, &connector.id) {
            remap::set_connector_geometry(el, (begin.x, begin.y), (end.x, end.y));
        }
        connector.begin = begin;
        connector.end = end;
    }
}

/// Add heading text shapes over each lane column, instantiated from the
/// template's text master when one was imported. The heading takes over
/// the lane's title, so the lane's own `Text` element is stripped.
fn synthesize_headings(
    page_root: &mut Element,
    page: &mut Page,
    headers: &[Shape],
    lane_count: usize,
    g: &TargetGrid,
    imported: &IndexMap<String, String>,
    first_fresh_id: u64,
) -> usize {
    let Some(master_name) = &g.text_master else {
        return 0;
    };
    let Some(master_id) = imported.get(master_name) else {
        debug!(master = %master_name, "text master not imported, skipping headings");
        return 0;
    };

    let mut next_id = first_fresh_id;
    let mut added = 0;
    for (i, header) in headers.iter().enumerate() {
        if header.text.is_empty() {
            continue;
        }
        if let Some(lane_el) = remap::shape_element_mut(page_root, &header.id) {
            lane_el.retain_elements(|child| !child.has_local_name("Text"));
        }
        let lane = i.min(lane_count.saturating_sub(1));
        let x = g.lane_left(lane) + g.lane_width(lane) / 2.0;
        let y = g.origin_y + g.lane_height + g.heading_height / 2.0;
        let id = next_id.to_string();
        next_id += 1;

        let mut el = Element::new("Shape");
        el.set_attr("ID", &id);
        el.set_attr("Type", "Shape");
        el.set_attr("Master", master_id);
        cells::set_cell_f64(&mut el, "PinX", x);
        cells::set_cell_f64(&mut el, "PinY", y);
        cells::set_cell_f64(&mut el, "Width", g.lane_width(lane));
        cells::set_cell_f64(&mut el, "Height", g.heading_height);
        cells::set_cell_f64(&mut el, "LocPinX", g.lane_width(lane) / 2.0);
        cells::set_cell_f64(&mut el, "LocPinY", g.heading_height / 2.0);
        remap::set_shape_text(&mut el, &header.text);
        if let Some(shapes) = page_root.first_child_named_mut("Shapes") {
            shapes.push_element(el);
            added += 1;
            page.shapes.push(Shape {
                id,
                text: header.text.clone(),
                master_name: Some(master_name.clone()),
                master_id: Some(master_id.clone()),
                position: Position { x, y },
                size: Extent {
                    width: g.lane_width(lane),
                    height: g.heading_height,
                },
                properties: Default::default(),
                tags: Default::default(),
            });
        }
    }
    added
}

fn max_shape_id(page_root: &Element) -> u64 {
    let mut max = 0;
    page_root.walk(&mut |el| {
        if el.has_local_name("Shape") {
            if let Some(id) = el.attr("ID").and_then(|v| v.parse::<u64>().ok()) {
                max = max.max(id);
            }
        }
    });
    max
}

/// Draw order: container at the back, lanes next, flow and connectors in
/// their original order, synthesized headings on top.
fn reorder_z(
    page_root: &mut Element,
    container_id: Option<&str>,
    header_ids: &[String],
    headings_added: usize,
) {
    let Some(shapes) = page_root.first_child_named_mut("Shapes") else {
        return;
    };
    let children = std::mem::take(&mut shapes.children);
    let mut elements: Vec<Element> = children
        .into_iter()
        .filter_map(|node| match node {
            crate::xml::Node::Element(el) => Some(el),
            crate::xml::Node::Text(_) => None,
        })
        .collect();

    let heading_start = elements.len().saturating_sub(headings_added);
    let headings: Vec<Element> = elements.split_off(heading_start);

    let mut ordered: Vec<Element> = Vec::with_capacity(elements.len() + headings.len());
    let mut take_by_id = |elements: &mut Vec<Element>, id: &str| -> Option<Element> {
        let idx = elements.iter().position(|el| el.attr("ID") == Some(id))?;
        Some(elements.remove(idx))
    };
    if let Some(id) = container_id {
        if let Some(el) = take_by_id(&mut elements, id) {
            ordered.push(el);
        }
    }
    for id in header_ids {
        if let Some(el) = take_by_id(&mut elements, id) {
            ordered.push(el);
        }
    }
    ordered.extend(elements);
    ordered.extend(headings);

    for el in ordered {
        shapes.push_element(el);
    }
}

fn shape_element<'a>(page_root: &'a Element, id: &str) -> Option<&'a Element> {
    let shapes = page_root.first_child_named("Shapes")?;
    shapes
        .children_named("Shape")
        .find(|el| el.attr("ID") == Some(id))
}
