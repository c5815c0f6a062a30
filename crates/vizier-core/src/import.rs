//! Style Importer: copy the template's masters and shared style tables into
//! the working package, keeping it structurally valid.
//!
//! Fresh master ids start at `max_existing_id + 1`; each imported master
//! gets a synthetic backing filename (`masterN.xml`), a rewritten `Rel`
//! relationship id (`rIdN_injected`), a relationship entry, and a
//! content-type override. Masters without a resolvable backing file are
//! skipped with a warning, not a failure.

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::Result;
use crate::masters;
use crate::ns;
use crate::package::{Package, parts};
use crate::xml::Element;

#[derive(Debug, Default)]
pub struct ImportReport {
    /// Template master display name → fresh id in the working package.
    pub masters_by_name: IndexMap<String, String>,
    pub skipped: Vec<String>,
}

/// Import every template master into the working package.
pub fn import_masters(work: &mut Package, template: &Package) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    let template_root = match template.read_xml(parts::MASTERS) {
        Ok(root) => root,
        Err(err) => {
            warn!("template has no usable masters part: {err}");
            return Ok(report);
        }
    };
    let template_rels = masters::rels_table(template, parts::MASTERS_RELS);

    let mut work_root = work
        .read_xml(parts::MASTERS)
        .unwrap_or_else(|_| empty_masters_root());
    let mut work_rels = work
        .read_xml(parts::MASTERS_RELS)
        .unwrap_or_else(|_| empty_relationships_root());
    let mut content_types = work.read_xml(parts::CONTENT_TYPES)?;

    let mut next_id = masters::max_master_id(&work_root) + 1;

    for template_master in template_root.descendants_named("Master") {
        let Some(name) = masters::display_name(template_master) else {
            continue;
        };
        let name = name.to_string();

        let backing = masters::master_rel_id(template_master)
            .and_then(|rid| template_rels.get(rid))
            .map(|target| masters::file_name(target).to_string());
        let Some(backing) = backing else {
            warn!(master = %name, "skipping master: no relationship to a backing file");
            report.skipped.push(name);
            continue;
        };
        if !template.has_part(&parts::master_file(&backing)) {
            warn!(master = %name, file = %backing, "skipping master: backing file not in package");
            report.skipped.push(name);
            continue;
        }

        let new_id = next_id.to_string();
        next_id += 1;
        let new_file = format!("master{new_id}.xml");
        let new_rel_id = format!("rId{new_id}_injected");

        work.copy_part_from(
            template,
            &parts::master_file(&backing),
            &parts::master_file(&new_file),
        )?;

        let mut master = template_master.clone();
        master.set_attr("ID", new_id.as_str());
        master.walk_mut(&mut |el| {
            if el.has_local_name("Rel") {
                el.set_attr("r:id", new_rel_id.as_str());
            }
        });
        work_root.push_element(master);

        let mut rel = Element::new("Relationship");
        rel.set_attr("Id", new_rel_id.as_str());
        rel.set_attr("Type", ns::MASTER_REL_TYPE);
        rel.set_attr("Target", new_file.as_str());
        work_rels.push_element(rel);

        ensure_override(
            &mut content_types,
            &format!("/visio/masters/{new_file}"),
            ns::MASTER_CONTENT_TYPE,
        );

        debug!(master = %name, id = %new_id, "imported master");
        report.masters_by_name.insert(name, new_id);
    }

    work.write_xml(parts::MASTERS, &work_root)?;
    work.write_xml(parts::MASTERS_RELS, &work_rels)?;
    work.write_xml(parts::CONTENT_TYPES, &content_types)?;
    Ok(report)
}

/// Replace the working document's shared style tables (color table, font
/// table, style sheets) with the template's. Document-scoped, not per-shape.
pub fn import_document_tables(work: &mut Package, template: &Package) -> Result<()> {
    let Ok(template_doc) = template.read_xml(parts::DOCUMENT) else {
        warn!("template has no document part; keeping source style tables");
        return Ok(());
    };
    let Ok(mut work_doc) = work.read_xml(parts::DOCUMENT) else {
        warn!("working package has no document part; skipping table import");
        return Ok(());
    };

    for table in ["Colors", "FaceNames", "StyleSheets"] {
        let Some(replacement) = template_doc.first_child_named(table) else {
            continue;
        };
        work_doc.retain_elements(|el| !el.has_local_name(table));
        work_doc.push_element(replacement.clone());
    }
    work.write_xml(parts::DOCUMENT, &work_doc)
}

/// Page-sheet cells carried over from the template's first page: geometry,
/// shadow defaults, and scale, so the restyled page inherits the template's
/// canvas setup.
const PAGE_SHEET_CELLS: &[&str] = &[
    "PageWidth",
    "PageHeight",
    "ShdwOffsetX",
    "ShdwOffsetY",
    "PageScale",
    "DrawingScale",
    "DrawingSizeType",
    "DrawingScaleType",
    "ShdwType",
    "ShdwObliqueAngle",
    "ShdwScaleFactor",
];

const PAGE_VIEW_ATTRS: &[&str] = &["ViewScale", "ViewCenterX", "ViewCenterY"];

/// Import the template first page's view attributes and page-sheet cells
/// onto the working first page.
pub fn import_page_sheet(work: &mut Package, template: &Package) -> Result<()> {
    let Ok(template_pages) = template.read_xml(parts::PAGES) else {
        return Ok(());
    };
    let Ok(mut work_pages) = work.read_xml(parts::PAGES) else {
        return Ok(());
    };
    let Some(template_page) = template_pages.descendants_named("Page").first().copied() else {
        return Ok(());
    };

    let view: Vec<(String, String)> = PAGE_VIEW_ATTRS
        .iter()
        .filter_map(|a| template_page.attr(a).map(|v| (a.to_string(), v.to_string())))
        .collect();
    let sheet_cells: Vec<(String, String)> = template_page
        .first_child_named("PageSheet")
        .map(|sheet| {
            sheet
                .children_named("Cell")
                .filter_map(|c| match (c.attr("N"), c.attr("V")) {
                    (Some(n), Some(v)) if PAGE_SHEET_CELLS.contains(&n) => {
                        Some((n.to_string(), v.to_string()))
                    }
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let Some(work_page) = work_pages.first_child_named_mut("Page") else {
        return Ok(());
    };
    for (attr, value) in &view {
        work_page.set_attr(attr, value.as_str());
    }
    if work_page.first_child_named("PageSheet").is_none() {
        work_page.push_element(Element::new("PageSheet"));
    }
    let sheet = work_page
        .first_child_named_mut("PageSheet")
        .expect("just ensured");
    for (name, value) in &sheet_cells {
        crate::cells::set_cell(sheet, name, value);
    }

    work.write_xml(parts::PAGES, &work_pages)
}

/// Copy the template's theme parts and the first page's theme relationship
/// so the imported quick styles resolve to the template's palette.
pub fn import_theme(work: &mut Package, template: &Package) -> Result<()> {
    let theme_parts: Vec<String> = template
        .part_names()
        .iter()
        .filter(|p| p.starts_with("visio/theme/") && p.ends_with(".xml"))
        .cloned()
        .collect();
    if theme_parts.is_empty() {
        return Ok(());
    }

    let mut content_types = work.read_xml(parts::CONTENT_TYPES)?;
    for part in &theme_parts {
        work.copy_part_from(template, part, part)?;
        ensure_override(&mut content_types, &format!("/{part}"), ns::THEME_CONTENT_TYPE);
    }
    work.write_xml(parts::CONTENT_TYPES, &content_types)?;

    // Carry the page→theme link over, keeping any existing page rels.
    let template_page_rels = template.read_xml(parts::PAGE1_RELS).ok();
    let Some(template_page_rels) = template_page_rels else {
        return Ok(());
    };
    let mut work_rels = work
        .read_xml(parts::PAGE1_RELS)
        .unwrap_or_else(|_| empty_relationships_root());
    for rel in template_page_rels.children_named("Relationship") {
        if rel.attr("Type") != Some(ns::THEME_REL_TYPE) {
            continue;
        }
        let already = work_rels
            .children_named("Relationship")
            .any(|r| r.attr("Type") == Some(ns::THEME_REL_TYPE));
        if !already {
            work_rels.push_element(rel.clone());
        }
    }
    work.write_xml(parts::PAGE1_RELS, &work_rels)
}

fn ensure_override(content_types: &mut Element, part_name: &str, content_type: &str) {
    let exists = content_types
        .children_named("Override")
        .any(|o| o.attr("PartName") == Some(part_name));
    if exists {
        return;
    }
    let mut over = Element::new("Override");
    over.set_attr("PartName", part_name);
    over.set_attr("ContentType", content_type);
    content_types.push_element(over);
}

fn empty_masters_root() -> Element {
    let mut root = Element::new("Masters");
    root.set_attr("xmlns", ns::VISIO_MAIN);
    root.set_attr("xmlns:r", ns::DOC_RELS);
    root
}

pub(crate) fn empty_relationships_root() -> Element {
    let mut root = Element::new("Relationships");
    root.set_attr("xmlns", ns::PKG_RELS);
    root
}
