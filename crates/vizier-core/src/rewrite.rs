//! Shape Rewriter: swap a shape's master reference and strip the local
//! style overrides so the shape inherits the new master's appearance.
//!
//! Never fails: a mapping entry whose target master was not imported leaves
//! the shape untouched with a warning.

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::warn;

use crate::cells;
use crate::model::Mapping;
use crate::xml::Element;

/// Sections carrying local style overrides.
const STYLE_SECTIONS: &[&str] = &["Fill", "Line", "QuickStyle", "Image"];

/// Scalar style-bearing cells; removed so the master's values apply.
const STYLE_CELLS: &[&str] = &[
    "LineColor",
    "LinePattern",
    "LineWeight",
    "LineCap",
    "BeginArrow",
    "EndArrow",
    "FillForegnd",
    "FillBkgnd",
    "FillPattern",
    "ShdwForegnd",
    "ShdwPattern",
    "QuickStyleLineColor",
    "QuickStyleFillColor",
    "QuickStyleShadowColor",
    "QuickStyleFontColor",
    "QuickStyleLineMatrix",
    "QuickStyleFillMatrix",
    "QuickStyleEffectsMatrix",
    "QuickStyleFontMatrix",
];

/// Cells captured from the template page's own instances of each master,
/// so rewritten shapes match how the template author tuned them, not just
/// the master defaults.
const SNAPSHOT_CELLS: &[&str] = &[
    "FillForegnd",
    "FillBkgnd",
    "LineColor",
    "LineWeight",
    "QuickStyleLineColor",
    "QuickStyleFillColor",
    "QuickStyleFontColor",
    "QuickStyleLineMatrix",
    "QuickStyleFillMatrix",
    "QuickStyleEffectsMatrix",
    "QuickStyleFontMatrix",
    "QuickStyleType",
    "QuickStyleVariation",
];

/// Per-master-name style cells observed on the template page.
pub type StyleSnapshot = HashMap<String, Vec<(String, String)>>;

/// Capture the first template instance's style cells for every master name.
pub fn capture_style_snapshot(
    template_page: &Element,
    template_master_names: &HashMap<String, String>,
) -> StyleSnapshot {
    let mut snapshot = StyleSnapshot::new();
    for shape in template_page.descendants_named("Shape") {
        let Some(name) = shape
            .attr("Master")
            .and_then(|mid| template_master_names.get(mid))
        else {
            continue;
        };
        if snapshot.contains_key(name) {
            continue;
        }
        let captured: Vec<(String, String)> = SNAPSHOT_CELLS
            .iter()
            .filter_map(|n| cells::cell_value(shape, n).map(|v| (n.to_string(), v.to_string())))
            .collect();
        if !captured.is_empty() {
            snapshot.insert(name.clone(), captured);
        }
    }
    snapshot
}

pub struct RewriteContext<'a> {
    pub mapping: &'a Mapping,
    /// Master display name → id in the working package (importer output).
    pub imported: &'a IndexMap<String, String>,
    /// Old master id → intrinsic size, for materializing inherited size.
    pub source_master_sizes: &'a HashMap<String, (f64, f64)>,
    pub snapshot: Option<&'a StyleSnapshot>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub rewritten: usize,
    pub unresolved: Vec<String>,
}

/// Rewrite every mapped shape and connector on a page, in place.
pub fn rewrite_page(page_root: &mut Element, ctx: &RewriteContext) -> RewriteStats {
    let mut stats = RewriteStats::default();
    page_root.walk_mut(&mut |el| {
        if !el.has_local_name("Shape") {
            return;
        }
        let Some(id) = el.attr("ID").map(str::to_string) else {
            return;
        };
        let Some(target_name) = ctx.mapping.get(&id) else {
            return;
        };
        match ctx.imported.get(target_name) {
            Some(new_id) => {
                rewrite_shape(el, target_name, new_id, ctx);
                stats.rewritten += 1;
            }
            None => {
                warn!(shape = %id, master = %target_name, "target master not imported; keeping original style");
                stats.unresolved.push(id);
            }
        }
    });
    stats
}

fn rewrite_shape(shape: &mut Element, target_name: &str, new_master_id: &str, ctx: &RewriteContext) {
    let is_connector = cells::has_cell(shape, "BeginX") && cells::has_cell(shape, "EndX");

    // Size inherited implicitly from the old master must survive the swap:
    // materialize it as an explicit cell before the reference changes.
    if !is_connector {
        if let Some((w, h)) = shape
            .attr("Master")
            .and_then(|old| ctx.source_master_sizes.get(old))
        {
            if !cells::has_cell(shape, "Width") {
                cells::set_cell_f64(shape, "Width", *w);
            }
            if !cells::has_cell(shape, "Height") {
                cells::set_cell_f64(shape, "Height", *h);
            }
        }
    }

    shape.set_attr("Master", new_master_id);
    shape.remove_attr("Type");

    cells::remove_sections(shape, STYLE_SECTIONS);
    for cell in STYLE_CELLS {
        cells::remove_cell(shape, cell);
    }

    if let Some(snapshot) = ctx.snapshot {
        if let Some(captured) = snapshot.get(target_name) {
            for (name, value) in captured {
                cells::set_cell(shape, name, value);
            }
        }
    }
}
