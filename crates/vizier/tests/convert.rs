//! End-to-end conversion through the facade: synthetic work and template
//! packages in, a restyled package and intermediate artifacts out.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use vizier::package::parts;
use vizier::{ConvertOptions, HeuristicMapper, Package, ns};

fn build_vsdx(path: &Path, entries: &[(&str, String)]) -> PathBuf {
    let file = fs::File::create(path).unwrap();
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, body) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
    path.to_path_buf()
}

fn content_types() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="{ct}">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/visio/pages/pages.xml" ContentType="application/vnd.ms-visio.pages+xml"/>
  <Override PartName="/visio/pages/page1.xml" ContentType="application/vnd.ms-visio.page+xml"/>
  <Override PartName="/visio/masters/masters.xml" ContentType="application/vnd.ms-visio.masters+xml"/>
</Types>"#,
        ct = ns::CONTENT_TYPES
    )
}

fn pages_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Pages xmlns="{main}" xmlns:r="{rels}">
  <Page ID="0" NameU="Page-1">
    <PageSheet>
      <Cell N="PageWidth" V="8.5"/>
      <Cell N="PageHeight" V="11"/>
    </PageSheet>
  </Page>
</Pages>"#,
        main = ns::VISIO_MAIN,
        rels = ns::DOC_RELS
    )
}

fn masters_xml(masters: &[(&str, &str)]) -> String {
    let mut body = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Masters xmlns="{main}" xmlns:r="{rels}">"#,
        main = ns::VISIO_MAIN,
        rels = ns::DOC_RELS
    );
    for (i, (id, name)) in masters.iter().enumerate() {
        body.push_str(&format!(
            r#"<Master ID="{id}" NameU="{name}"><Rel r:id="rId{n}"/></Master>"#,
            n = i + 1
        ));
    }
    body.push_str("</Masters>");
    body
}

fn masters_rels(count: usize) -> String {
    let mut body = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{rels}">"#,
        rels = ns::PKG_RELS
    );
    for i in 1..=count {
        body.push_str(&format!(
            r#"<Relationship Id="rId{i}" Type="{t}" Target="master{i}.xml"/>"#,
            t = ns::MASTER_REL_TYPE
        ));
    }
    body.push_str("</Relationships>");
    body
}

fn master_part(width: f64, height: f64) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<MasterContents xmlns="{main}">
  <Shapes>
    <Shape ID="1" Type="Shape">
      <Cell N="Width" V="{width}"/>
      <Cell N="Height" V="{height}"/>
    </Shape>
  </Shapes>
</MasterContents>"#,
        main = ns::VISIO_MAIN
    )
}

fn work_vsdx(dir: &Path) -> PathBuf {
    let masters = [("1", "Rectangle"), ("2", "Terminator"), ("3", "Dynamic connector")];
    let page1 = format!(
        r##"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<PageContents xmlns="{main}" xmlns:r="{rels}">
  <Shapes>
    <Shape ID="1" Type="Shape" Master="1">
      <Cell N="PinX" V="4"/><Cell N="PinY" V="9"/>
      <Cell N="Width" V="1.5"/><Cell N="Height" V="0.8"/>
      <Cell N="FillForegnd" V="#FF0000"/>
      <Text>提交申请</Text>
    </Shape>
    <Shape ID="2" Type="Shape" Master="2">
      <Cell N="PinX" V="4"/><Cell N="PinY" V="6"/>
      <Cell N="Width" V="1.2"/><Cell N="Height" V="0.4"/>
      <Text>结束</Text>
    </Shape>
    <Shape ID="3" Type="Shape" Master="3">
      <Cell N="BeginX" V="4"/><Cell N="BeginY" V="8.6"/>
      <Cell N="EndX" V="4"/><Cell N="EndY" V="6.2"/>
    </Shape>
  </Shapes>
  <Connects>
    <Connect FromSheet="3" FromCell="BeginX" ToSheet="1"/>
    <Connect FromSheet="3" FromCell="EndX" ToSheet="2"/>
  </Connects>
</PageContents>"##,
        main = ns::VISIO_MAIN,
        rels = ns::DOC_RELS
    );
    build_vsdx(
        &dir.join("work.vsdx"),
        &[
            (parts::CONTENT_TYPES, content_types()),
            (parts::PAGES, pages_xml()),
            (parts::PAGE1, page1),
            (parts::MASTERS, masters_xml(&masters)),
            (parts::MASTERS_RELS, masters_rels(masters.len())),
            ("visio/masters/master1.xml", master_part(1.5, 0.8)),
            ("visio/masters/master2.xml", master_part(1.0, 0.4)),
            ("visio/masters/master3.xml", master_part(1.0, 0.25)),
        ],
    )
}

fn template_vsdx(dir: &Path) -> PathBuf {
    let masters = [("1", "Process"), ("2", "Start/End"), ("3", "Dynamic connector")];
    let page1 = format!(
        r##"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<PageContents xmlns="{main}" xmlns:r="{rels}">
  <Shapes>
    <Shape ID="1" Type="Shape" Master="1">
      <Cell N="PinX" V="2"/><Cell N="PinY" V="9"/>
      <Cell N="Width" V="1.2"/><Cell N="Height" V="0.75"/>
      <Cell N="FillForegnd" V="#4472C4"/>
    </Shape>
  </Shapes>
</PageContents>"##,
        main = ns::VISIO_MAIN,
        rels = ns::DOC_RELS
    );
    build_vsdx(
        &dir.join("template.vsdx"),
        &[
            (parts::CONTENT_TYPES, content_types()),
            (parts::PAGES, pages_xml()),
            (parts::PAGE1, page1),
            (parts::MASTERS, masters_xml(&masters)),
            (parts::MASTERS_RELS, masters_rels(masters.len())),
            ("visio/masters/master1.xml", master_part(1.2, 0.75)),
            ("visio/masters/master2.xml", master_part(1.0, 0.5)),
            ("visio/masters/master3.xml", master_part(1.0, 0.25)),
        ],
    )
}

#[test]
fn convert_restyles_a_package_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let work = work_vsdx(dir.path());
    let template = template_vsdx(dir.path());
    let output = dir.path().join("out.vsdx");

    let report = vizier::convert(
        &work,
        &template,
        &output,
        &HeuristicMapper,
        &ConvertOptions::default(),
    )
    .unwrap();

    assert_eq!(report.masters_imported, 3);
    assert_eq!(report.rewritten, 3);
    assert!(report.unresolved.is_empty());
    assert_eq!(report.mapping["1"], "Process");
    assert_eq!(report.mapping["2"], "Start/End");
    assert_eq!(report.mapping["3"], "Dynamic connector");

    let out = Package::open(&output).unwrap();
    let page = out.read_xml(parts::PAGE1).unwrap();
    let shapes = page.descendants_named("Shape");
    // Imported ids start after the existing maximum (3), in catalog order.
    assert_eq!(shapes[0].attr("Master"), Some("4"));
    assert_eq!(shapes[1].attr("Master"), Some("5"));
    assert_eq!(shapes[2].attr("Master"), Some("6"));
    // Local fill override stripped, template instance style snapshotted in.
    let process = shapes[0];
    assert_eq!(
        vizier::cells::cell_value(process, "FillForegnd"),
        Some("#4472C4")
    );
    assert_eq!(
        process.first_child_named("Text").unwrap().text_content(),
        "提交申请"
    );
}

#[test]
fn convert_writes_intermediate_artifacts_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let work = work_vsdx(dir.path());
    let template = template_vsdx(dir.path());
    let output = dir.path().join("out.vsdx");
    let intermediate = dir.path().join("intermediate");

    let opts = ConvertOptions {
        save_intermediate: Some(intermediate.clone()),
        ..Default::default()
    };
    vizier::convert(&work, &template, &output, &HeuristicMapper, &opts).unwrap();

    let mapping: std::collections::HashMap<String, String> = serde_json::from_str(
        &fs::read_to_string(intermediate.join("shape_mapping.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(mapping["1"], "Process");
    assert!(intermediate.join("extracted_diagram.json").is_file());
    assert!(intermediate.join("target_masters.json").is_file());
}

#[test]
fn rebuild_accepts_a_precomputed_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let work = work_vsdx(dir.path());
    let template = template_vsdx(dir.path());
    let output = dir.path().join("out.vsdx");

    let mut mapping = vizier::Mapping::new();
    mapping.insert("1".to_string(), "Start/End".to_string());

    let report = vizier::rebuild(
        &work,
        &template,
        &output,
        &mapping,
        &ConvertOptions::default(),
    )
    .unwrap();

    assert_eq!(report.rewritten, 1);
    let out = Package::open(&output).unwrap();
    let page = out.read_xml(parts::PAGE1).unwrap();
    // Start/End is the second imported master.
    assert_eq!(page.descendants_named("Shape")[0].attr("Master"), Some("5"));
}
