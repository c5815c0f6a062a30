//! Document Model Extractor: package → [`Diagram`].
//!
//! Best-effort by design: a malformed or missing part degrades to an
//! empty/default partial result with a warning, never an aborted
//! extraction.

use std::collections::BTreeMap;

use tracing::warn;

use crate::cells;
use crate::error::Result;
use crate::masters;
use crate::model::{Connector, Diagram, Extent, Page, Position, Shape};
use crate::package::{Package, parts};
use crate::xml::Element;

pub const DEFAULT_PAGE_WIDTH: f64 = 11.0;
pub const DEFAULT_PAGE_HEIGHT: f64 = 8.5;

/// Extract the semantic diagram model from a package.
///
/// Only the first page is modeled; further pages are a documented non-goal.
pub fn extract_diagram(pkg: &Package, filename: &str) -> Result<Diagram> {
    let (page_name, width, height) = page_geometry(pkg);

    let mut shapes = Vec::new();
    let mut connectors = Vec::new();

    match pkg.read_xml(parts::PAGE1) {
        Ok(page_root) => {
            let master_names = masters::name_table(pkg);
            let connects = connect_table(&page_root);
            for element in top_level_shapes(&page_root) {
                read_shape(element, &master_names, &connects, &mut shapes, &mut connectors);
            }
        }
        Err(err) => {
            warn!("could not read {}: {err}; extracting empty page", parts::PAGE1);
        }
    }

    Ok(Diagram {
        filename: filename.to_string(),
        pages: vec![Page {
            name: page_name,
            width,
            height,
            shapes,
            connectors,
        }],
    })
}

/// First page name and dimensions from `pages.xml`, with the stock
/// US-letter default when the part or its cells are absent.
pub fn page_geometry(pkg: &Package) -> (String, f64, f64) {
    let mut name = "Page-1".to_string();
    let mut width = DEFAULT_PAGE_WIDTH;
    let mut height = DEFAULT_PAGE_HEIGHT;

    let Ok(root) = pkg.read_xml(parts::PAGES) else {
        warn!("could not read {}; using default page geometry", parts::PAGES);
        return (name, width, height);
    };
    let Some(page) = root.descendants_named("Page").first().copied() else {
        return (name, width, height);
    };
    if let Some(n) = page.attr("NameU").or_else(|| page.attr("Name")) {
        name = n.to_string();
    }
    if let Some(sheet) = page.first_child_named("PageSheet") {
        width = cells::cell_f64(sheet, "PageWidth", DEFAULT_PAGE_WIDTH);
        height = cells::cell_f64(sheet, "PageHeight", DEFAULT_PAGE_HEIGHT);
    }
    (name, width, height)
}

/// Top-level shape elements of a page (children of `Shapes`, not the
/// sub-shapes of groups).
pub fn top_level_shapes(page_root: &Element) -> Vec<&Element> {
    page_root
        .first_child_named("Shapes")
        .map(|shapes| shapes.children_named("Shape").collect())
        .unwrap_or_default()
}

/// A shape is a connector when it carries both begin and end X cells.
pub fn is_connector_element(shape: &Element) -> bool {
    cells::has_cell(shape, "BeginX") && cells::has_cell(shape, "EndX")
}

/// Shape text: concatenated `Text` runs, falling back to the
/// `visHeadingText` user row when the text element is absent or empty.
pub fn shape_text(shape: &Element) -> String {
    let text = shape
        .first_child_named("Text")
        .map(|t| t.text_content().trim().to_string())
        .unwrap_or_default();
    if !text.is_empty() {
        return text;
    }
    cells::section_row_value(shape, "User", "visHeadingText")
        .unwrap_or_default()
        .to_string()
}

fn read_shape(
    element: &Element,
    master_names: &std::collections::HashMap<String, String>,
    connects: &ConnectTable,
    shapes: &mut Vec<Shape>,
    connectors: &mut Vec<Connector>,
) {
    let Some(id) = element.attr("ID") else {
        return;
    };
    let id = id.to_string();
    let master_id = element.attr("Master").map(str::to_string);
    let master_name = master_id
        .as_deref()
        .and_then(|mid| master_names.get(mid))
        .cloned();
    let text = shape_text(element);
    let properties = shape_properties(element);

    if is_connector_element(element) {
        let endpoints = connects.get(&id);
        connectors.push(Connector {
            id,
            text,
            master_name,
            from_shape: endpoints.and_then(|e| e.from.clone()),
            to_shape: endpoints.and_then(|e| e.to.clone()),
            begin: Position {
                x: cells::cell_f64(element, "BeginX", 0.0),
                y: cells::cell_f64(element, "BeginY", 0.0),
            },
            end: Position {
                x: cells::cell_f64(element, "EndX", 0.0),
                y: cells::cell_f64(element, "EndY", 0.0),
            },
            properties,
        });
    } else {
        shapes.push(Shape {
            id,
            text,
            master_name,
            master_id,
            position: Position {
                x: cells::cell_f64(element, "PinX", 0.0),
                y: cells::cell_f64(element, "PinY", 0.0),
            },
            size: Extent {
                width: cells::cell_f64(element, "Width", 1.0),
                height: cells::cell_f64(element, "Height", 1.0),
            },
            properties,
            tags: Default::default(),
        });
    }
}

/// Shape Data (`Property`) and `User` rows flattened into a key/value bag.
fn shape_properties(shape: &Element) -> BTreeMap<String, String> {
    let mut bag = BTreeMap::new();
    for section_name in ["Property", "User"] {
        let Some(section) = cells::section(shape, section_name) else {
            continue;
        };
        for row in section.children_named("Row") {
            let Some(name) = row.attr("N") else { continue };
            let value = row
                .children_named("Cell")
                .find(|c| c.attr("N") == Some("Value"))
                .and_then(|c| c.attr("V"))
                .unwrap_or_default();
            bag.insert(name.to_string(), value.to_string());
        }
    }
    bag
}

#[derive(Default)]
struct Endpoints {
    from: Option<String>,
    to: Option<String>,
}

type ConnectTable = std::collections::HashMap<String, Endpoints>;

/// Wiring from the page's `Connects` section: `FromSheet` is the connector,
/// `FromCell` names which end, `ToSheet` is the attached shape. Best-effort;
/// connectors missing here stay unresolved.
fn connect_table(page_root: &Element) -> ConnectTable {
    let mut table = ConnectTable::new();
    let Some(connects) = page_root.first_child_named("Connects") else {
        return table;
    };
    for connect in connects.children_named("Connect") {
        let (Some(from_sheet), Some(from_cell), Some(to_sheet)) = (
            connect.attr("FromSheet"),
            connect.attr("FromCell"),
            connect.attr("ToSheet"),
        ) else {
            continue;
        };
        let entry = table.entry(from_sheet.to_string()).or_default();
        match from_cell {
            "BeginX" => entry.from = Some(to_sheet.to_string()),
            "EndX" => entry.to = Some(to_sheet.to_string()),
            _ => {}
        }
    }
    table
}
