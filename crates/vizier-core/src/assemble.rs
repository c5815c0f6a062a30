//! Final write-back: namespace repair, page relationship sync, and the
//! atomic save of the rebuilt package.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::masters;
use crate::ns;
use crate::package::{Package, parts};
use crate::xml::Element;

/// Injected masters reference their backing parts through `r:id`
/// attributes, so the page root must declare the prefix.
pub fn ensure_relationship_ns(page_root: &mut Element) {
    if page_root.attr("xmlns:r").is_none() {
        page_root.set_attr("xmlns:r", ns::DOC_RELS);
    }
}

/// Rebuild the page part's relationship list so every master a shape
/// references resolves to its backing part. Existing non-master
/// relationships (theme and the like) are preserved.
pub fn sync_page_rels(pkg: &mut Package, page_root: &Element) -> Result<()> {
    let backing = master_backing_files(pkg);
    let mut referenced: Vec<&str> = Vec::new();
    for shape in page_root.descendants_named("Shape") {
        if let Some(id) = shape.attr("Master") {
            if !referenced.contains(&id) {
                referenced.push(id);
            }
        }
    }

    let mut rels_root = match pkg.read_xml(parts::PAGE1_RELS) {
        Ok(root) => root,
        Err(_) => crate::import::empty_relationships_root(),
    };
    rels_root.retain_elements(|el| {
        !(el.has_local_name("Relationship")
            && el.attr("Type") == Some(ns::MASTER_REL_TYPE))
    });

    let mut next = next_rel_index(&rels_root);
    let mut added = 0usize;
    for master_id in referenced {
        let Some(file) = backing.get(master_id) else {
            debug!(master = master_id, "no backing part for referenced master");
            continue;
        };
        let mut rel = Element::new("Relationship");
        rel.set_attr("Id", &format!("rId{next}"));
        rel.set_attr("Type", ns::MASTER_REL_TYPE);
        rel.set_attr("Target", &format!("../masters/{file}"));
        rels_root.push_element(rel);
        next += 1;
        added += 1;
    }

    debug!(added, "page relationships rebuilt");
    pkg.write_xml(parts::PAGE1_RELS, &rels_root)
}

/// Write the mutated page part and save the package to `dest` in one
/// step. The save itself is atomic: a staging file next to the target is
/// renamed into place only after the archive is complete.
pub fn finalize(
    pkg: &mut Package,
    page_root: &mut Element,
    dest: &Path,
) -> Result<()> {
    ensure_relationship_ns(page_root);
    pkg.write_xml(parts::PAGE1, page_root)?;
    sync_page_rels(pkg, page_root)?;
    pkg.save(dest)?;
    info!(path = %dest.display(), "package written");
    Ok(())
}

/// Master id to backing part file name, resolved through the masters
/// relationship table.
fn master_backing_files(pkg: &Package) -> HashMap<String, String> {
    let mut table = HashMap::new();
    let Ok(root) = pkg.read_xml(parts::MASTERS) else {
        return table;
    };
    let rels = masters::rels_table(pkg, parts::MASTERS_RELS);
    for master in root.descendants_named("Master") {
        let Some(id) = master.attr("ID") else { continue };
        if let Some(target) = masters::master_rel_id(master).and_then(|rid| rels.get(rid)) {
            table.insert(id.to_string(), masters::file_name(target).to_string());
        }
    }
    table
}

fn next_rel_index(rels_root: &Element) -> u64 {
    rels_root
        .children_named("Relationship")
        .filter_map(|rel| rel.attr("Id"))
        .filter_map(|id| id.strip_prefix("rId"))
        .filter_map(|n| {
            n.trim_end_matches(|c: char| !c.is_ascii_digit())
                .parse::<u64>()
                .ok()
        })
        .max()
        .map(|n| n + 1)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_ns_is_added_once() {
        let mut root = Element::parse(
            r#"<PageContents xmlns="http://schemas.microsoft.com/office/visio/2012/main"/>"#,
        )
        .unwrap();
        ensure_relationship_ns(&mut root);
        assert_eq!(root.attr("xmlns:r"), Some(ns::DOC_RELS));
        let before = root.attrs.len();
        ensure_relationship_ns(&mut root);
        assert_eq!(root.attrs.len(), before);
    }

    #[test]
    fn rel_index_skips_injected_ids() {
        let root = Element::parse(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
                <Relationship Id="rId2" Type="t" Target="a"/>
                <Relationship Id="rId7_injected" Type="t" Target="b"/>
            </Relationships>"#,
        )
        .unwrap();
        assert_eq!(next_rel_index(&root), 8);
    }
}
