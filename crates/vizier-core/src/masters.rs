//! Master (style template) catalog of a package.

use std::collections::HashMap;

use tracing::warn;

use crate::cells;
use crate::error::Result;
use crate::model::MasterInfo;
use crate::package::{Package, parts};
use crate::xml::Element;

/// Master id to display name, `NameU` preferred over `Name`.
/// A package without a masters part yields an empty table.
pub fn name_table(pkg: &Package) -> HashMap<String, String> {
    let mut table = HashMap::new();
    let Ok(root) = pkg.read_xml(parts::MASTERS) else {
        return table;
    };
    for master in root.descendants_named("Master") {
        let Some(id) = master.attr("ID") else { continue };
        if let Some(name) = display_name(master) {
            table.insert(id.to_string(), name.to_string());
        }
    }
    table
}

pub fn display_name(master: &Element) -> Option<&str> {
    master.attr("NameU").or_else(|| master.attr("Name"))
}

/// Relationship id to target file name from a `.rels` part.
pub fn rels_table(pkg: &Package, part: &str) -> HashMap<String, String> {
    let mut table = HashMap::new();
    let Ok(root) = pkg.read_xml(part) else {
        return table;
    };
    for rel in root.children_named("Relationship") {
        if let (Some(id), Some(target)) = (rel.attr("Id"), rel.attr("Target")) {
            table.insert(id.to_string(), target.to_string());
        }
    }
    table
}

/// The relationship id referenced by a master's `Rel` element.
pub fn master_rel_id(master: &Element) -> Option<&str> {
    master
        .descendants_named("Rel")
        .first()
        .and_then(|rel| rel.attr("r:id"))
}

/// Intrinsic default size of a master, read from the first shape of its
/// backing part. Missing parts or cells yield the 1.0 × 1.0 default.
pub fn intrinsic_size(pkg: &Package, backing_file: &str) -> (f64, f64) {
    let part = parts::master_file(backing_file);
    let Ok(root) = pkg.read_xml(&part) else {
        return (1.0, 1.0);
    };
    match root.descendants_named("Shape").first() {
        Some(shape) => (
            cells::cell_f64(shape, "Width", 1.0),
            cells::cell_f64(shape, "Height", 1.0),
        ),
        None => (1.0, 1.0),
    }
}

/// List the masters a package exposes, with intrinsic sizes resolved
/// through the rels table. Best-effort: a missing masters part is an empty
/// list, an unresolvable backing file keeps the default size.
pub fn list_masters(pkg: &Package) -> Result<Vec<MasterInfo>> {
    let mut masters = Vec::new();
    if !pkg.has_part(parts::MASTERS) {
        warn!("package has no masters part; returning empty catalog");
        return Ok(masters);
    }
    let root = pkg.read_xml(parts::MASTERS)?;
    let rels = rels_table(pkg, parts::MASTERS_RELS);

    for master in root.descendants_named("Master") {
        let (Some(id), Some(name)) = (master.attr("ID"), display_name(master)) else {
            continue;
        };
        let (width, height) = master_rel_id(master)
            .and_then(|rid| rels.get(rid))
            .map(|target| intrinsic_size(pkg, file_name(target)))
            .unwrap_or((1.0, 1.0));

        masters.push(MasterInfo {
            id: id.to_string(),
            name: name.to_string(),
            description: master.attr("UniqueID").unwrap_or_default().to_string(),
            width,
            height,
        });
    }
    Ok(masters)
}

/// Highest numeric master id in a masters part root; 0 when none parse.
pub fn max_master_id(masters_root: &Element) -> u64 {
    masters_root
        .descendants_named("Master")
        .iter()
        .filter_map(|m| m.attr("ID"))
        .filter_map(|id| id.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

/// Final path component of a rels target (`masters/master3.xml` → `master3.xml`).
pub fn file_name(target: &str) -> &str {
    target.rsplit('/').next().unwrap_or(target)
}

/// Sizes of masters keyed by id, for intrinsic-size materialization.
pub fn size_table(pkg: &Package) -> HashMap<String, (f64, f64)> {
    let mut table = HashMap::new();
    let Ok(masters) = list_masters(pkg) else {
        return table;
    };
    for m in masters {
        table.insert(m.id.clone(), (m.width, m.height));
    }
    table
}
