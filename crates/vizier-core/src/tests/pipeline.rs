//! End-to-end conversion over synthetic packages: extract, map, import,
//! re-project, rewrite, assemble, then re-open the output and check the
//! structural invariants hold.

use std::collections::HashSet;

use crate::classify::{HeuristicMapper, MappingStrategy};
use crate::layout::{self, LayoutMode, LayoutOptions};
use crate::package::{Package, parts};
use crate::rewrite::{RewriteContext, capture_style_snapshot, rewrite_page};
use crate::tests::fixtures;
use crate::{assemble, extract, import, masters};

#[test]
fn full_conversion_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let work_path = fixtures::work_vsdx(dir.path());
    let template_path = fixtures::template_vsdx(dir.path());

    let mut work = Package::open(&work_path).unwrap();
    let template = Package::open(&template_path).unwrap();

    // Extract
    let diagram = extract::extract_diagram(&work, "work.vsdx").unwrap();
    let page = &diagram.pages[0];
    assert_eq!(page.name, "Page-1");
    assert_eq!(page.shapes.len(), 7);
    assert_eq!(page.connectors.len(), 1);
    assert_eq!(page.connectors[0].from_shape.as_deref(), Some("5"));
    assert_eq!(page.connectors[0].to_shape.as_deref(), Some("6"));

    // Map
    let targets = masters::list_masters(&template).unwrap();
    let mapping = HeuristicMapper.create_mapping(&diagram, &targets).unwrap();
    assert_eq!(mapping.get("4").map(String::as_str), Some("Process"));
    assert_eq!(mapping.get("5").map(String::as_str), Some("Decision"));
    assert_eq!(mapping.get("6").map(String::as_str), Some("Start/End"));
    assert_eq!(mapping.get("3").map(String::as_str), Some("CFF Container"));
    assert_eq!(mapping.get("7").map(String::as_str), Some("Dynamic connector"));

    // Import
    let report = import::import_masters(&mut work, &template).unwrap();
    assert_eq!(report.masters_by_name.len(), 7);
    let ids: HashSet<&String> = report.masters_by_name.values().collect();
    assert_eq!(ids.len(), 7, "imported master ids collide");
    for id in &ids {
        assert!(id.parse::<u64>().unwrap() > 5, "id {id} not above source max");
    }
    import::import_document_tables(&mut work, &template).unwrap();
    import::import_page_sheet(&mut work, &template).unwrap();

    // Re-project (before the rewrite so the header markers are still there)
    let template_diagram = extract::extract_diagram(&template, "template.vsdx").unwrap();
    let opts = LayoutOptions::default();
    let grid = layout::derive_grid(&template_diagram, &targets, &opts).unwrap();
    assert_eq!(grid.lane_count(), 2);
    assert_eq!(grid.decision_row, Some(1));

    let mut page_root = work.read_xml(parts::PAGE1).unwrap();
    let mut page = diagram.pages.into_iter().next().unwrap();
    let outcome = layout::reproject_page(
        &mut page_root,
        &mut page,
        &mapping,
        &report.masters_by_name,
        Some(&grid),
        &opts,
    );
    assert_eq!(outcome.mode, LayoutMode::Swimlane);
    assert_eq!(outcome.lanes, 2);
    assert_eq!(outcome.relabeled, 1);
    assert_eq!(outcome.headings_added, 2);

    // The decision sits exactly on the template's decision row, inside
    // its source lane's column.
    let decision = page.shapes.iter().find(|s| s.id == "5").unwrap();
    assert!((decision.position.y - 4.5).abs() < 1e-9);
    assert!(decision.position.x >= 1.0 && decision.position.x <= 4.0);
    // The branch label was folded into the connector.
    assert_eq!(page.connectors[0].text, "通过");
    assert!(!page.shapes.iter().any(|s| s.id == "8"));

    // Rewrite
    let template_page = template.read_xml(parts::PAGE1).unwrap();
    let snapshot = capture_style_snapshot(&template_page, &masters::name_table(&template));
    let sizes = masters::size_table(&work);
    let stats = rewrite_page(
        &mut page_root,
        &RewriteContext {
            mapping: &mapping,
            imported: &report.masters_by_name,
            source_master_sizes: &sizes,
            snapshot: Some(&snapshot),
        },
    );
    assert_eq!(stats.rewritten, 7);
    assert!(stats.unresolved.is_empty());

    // Assemble
    let out = dir.path().join("out.vsdx");
    assemble::finalize(&mut work, &mut page_root, &out).unwrap();

    // Re-open the output and verify the structural invariants.
    let rebuilt = Package::open(&out).unwrap();
    let masters_root = rebuilt.read_xml(parts::MASTERS).unwrap();
    let master_ids: Vec<&str> = masters_root
        .descendants_named("Master")
        .iter()
        .filter_map(|m| m.attr("ID"))
        .collect();
    let unique: HashSet<&&str> = master_ids.iter().collect();
    assert_eq!(master_ids.len(), 12);
    assert_eq!(unique.len(), master_ids.len(), "master ids collide");

    let out_page = rebuilt.read_xml(parts::PAGE1).unwrap();
    for shape in out_page.descendants_named("Shape") {
        if let Some(master) = shape.attr("Master") {
            assert!(
                master_ids.contains(&master),
                "shape references unknown master {master}"
            );
        }
    }

    // Every referenced master resolves through the page rels.
    let page_rels = rebuilt.read_xml(parts::PAGE1_RELS).unwrap();
    let targets: Vec<&str> = page_rels
        .children_named("Relationship")
        .filter_map(|r| r.attr("Target"))
        .collect();
    assert!(!targets.is_empty());
    for target in &targets {
        assert!(target.starts_with("../masters/master"));
    }

    // The extracted model of the output still carries the flow.
    let out_diagram = extract::extract_diagram(&rebuilt, "out.vsdx").unwrap();
    let out_page = &out_diagram.pages[0];
    assert_eq!(out_page.connectors.len(), 1);
    assert_eq!(out_page.connectors[0].from_shape.as_deref(), Some("5"));
    assert_eq!(out_page.connectors[0].to_shape.as_deref(), Some("6"));
    assert_eq!(out_page.connectors[0].text, "通过");
    let texts: Vec<&str> = out_page.shapes.iter().map(|s| s.text.as_str()).collect();
    assert!(texts.contains(&"部门负责人"));
    assert!(texts.contains(&"提交申请"));
}

#[test]
fn template_without_lanes_degrades_to_scaling() {
    let dir = tempfile::tempdir().unwrap();
    let work_path = fixtures::work_vsdx(dir.path());
    let template_path = fixtures::template_vsdx(dir.path());

    let work = Package::open(&work_path).unwrap();
    let template = Package::open(&template_path).unwrap();

    let diagram = extract::extract_diagram(&work, "work.vsdx").unwrap();
    let mut template_diagram = extract::extract_diagram(&template, "template.vsdx").unwrap();
    // Strip the lane instances: no grid can be derived.
    template_diagram.pages[0]
        .shapes
        .retain(|s| s.master_name.as_deref() != Some("Swimlane"));

    let targets = masters::list_masters(&template).unwrap();
    let opts = LayoutOptions::default();
    assert!(layout::derive_grid(&template_diagram, &targets, &opts).is_none());

    // With no grid the page is left untouched rather than half-moved.
    let mut page_root = work.read_xml(parts::PAGE1).unwrap();
    let mut page = diagram.pages.into_iter().next().unwrap();
    let before = page.shapes[0].position;
    let outcome = layout::reproject_page(
        &mut page_root,
        &mut page,
        &crate::model::Mapping::new(),
        &indexmap::IndexMap::new(),
        None,
        &opts,
    );
    assert_eq!(outcome.mode, LayoutMode::Unchanged);
    assert_eq!(page.shapes[0].position.x, before.x);
}
