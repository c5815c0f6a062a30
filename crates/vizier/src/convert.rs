//! The conversion pipeline: one call from a source drawing plus a template
//! to a restyled output package.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, info_span};

use vizier_core::classify::MappingStrategy;
use vizier_core::layout::{self, LayoutOptions, LayoutOutcome};
use vizier_core::model::Mapping;
use vizier_core::package::{Package, parts};
use vizier_core::rewrite::{RewriteContext, capture_style_snapshot, rewrite_page};
use vizier_core::{Result, assemble, extract, import, masters};

#[derive(Debug, Default, Clone)]
pub struct ConvertOptions {
    pub layout: LayoutOptions,
    /// Directory for the JSON artifacts of each stage (model, catalog,
    /// mapping); nothing is written when unset.
    pub save_intermediate: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ConvertReport {
    pub mapping: Mapping,
    pub masters_imported: usize,
    pub rewritten: usize,
    pub unresolved: Vec<String>,
    pub layout: LayoutOutcome,
}

/// Convert `work` against `template`, writing the result to `output`.
///
/// Stages run in a fixed order: extract, map, import, re-project, rewrite,
/// assemble. The layout pass runs before the rewrite because it reads the
/// source drawing's header style markers, which the rewrite strips.
pub fn convert(
    work_path: &Path,
    template_path: &Path,
    output: &Path,
    strategy: &dyn MappingStrategy,
    opts: &ConvertOptions,
) -> Result<ConvertReport> {
    let span = info_span!("convert", work = %work_path.display());
    let _guard = span.enter();

    let work = Package::open(work_path)?;
    let template = Package::open(template_path)?;

    let diagram = extract::extract_diagram(&work, &display_name(work_path))?;
    let targets = masters::list_masters(&template)?;
    info!(
        shapes = diagram.pages[0].shapes.len(),
        connectors = diagram.pages[0].connectors.len(),
        targets = targets.len(),
        "extracted"
    );

    let mapping = strategy.create_mapping(&diagram, &targets)?;
    info!(mapped = mapping.len(), "mapping created");

    if let Some(dir) = &opts.save_intermediate {
        save_intermediate(dir, &diagram, &targets, &mapping)?;
    }

    rebuild(work_path, template_path, output, &mapping, opts)
}

/// Rebuild `work` against `template` with a precomputed mapping. This is
/// everything [`convert`] does after the classification stage.
pub fn rebuild(
    work_path: &Path,
    template_path: &Path,
    output: &Path,
    mapping: &Mapping,
    opts: &ConvertOptions,
) -> Result<ConvertReport> {
    let mut work = Package::open(work_path)?;
    let template = Package::open(template_path)?;

    let diagram = extract::extract_diagram(&work, &display_name(work_path))?;
    let targets = masters::list_masters(&template)?;

    let report = import::import_masters(&mut work, &template)?;
    import::import_document_tables(&mut work, &template)?;
    import::import_page_sheet(&mut work, &template)?;
    import::import_theme(&mut work, &template)?;

    let template_diagram = extract::extract_diagram(&template, "template")?;
    let grid = layout::derive_grid(&template_diagram, &targets, &opts.layout);

    let mut page_root = work.read_xml(parts::PAGE1)?;
    let mut page = diagram
        .pages
        .into_iter()
        .next()
        .unwrap_or_else(unreachable_page);
    let layout_outcome = layout::reproject_page(
        &mut page_root,
        &mut page,
        mapping,
        &report.masters_by_name,
        grid.as_ref(),
        &opts.layout,
    );

    let template_page = template.read_xml(parts::PAGE1)?;
    let snapshot = capture_style_snapshot(&template_page, &masters::name_table(&template));
    let sizes = masters::size_table(&work);
    let stats = rewrite_page(
        &mut page_root,
        &RewriteContext {
            mapping,
            imported: &report.masters_by_name,
            source_master_sizes: &sizes,
            snapshot: Some(&snapshot),
        },
    );

    assemble::finalize(&mut work, &mut page_root, output)?;
    info!(
        imported = report.masters_by_name.len(),
        rewritten = stats.rewritten,
        unresolved = stats.unresolved.len(),
        "conversion finished"
    );

    Ok(ConvertReport {
        mapping: mapping.clone(),
        masters_imported: report.masters_by_name.len(),
        rewritten: stats.rewritten,
        unresolved: stats.unresolved,
        layout: layout_outcome,
    })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "work.vsdx".to_string())
}

fn save_intermediate(
    dir: &Path,
    diagram: &vizier_core::Diagram,
    targets: &[vizier_core::MasterInfo],
    mapping: &Mapping,
) -> Result<()> {
    fs::create_dir_all(dir)?;
    fs::write(
        dir.join("extracted_diagram.json"),
        serde_json::to_string_pretty(diagram)?,
    )?;
    let catalog = vizier_core::MasterCatalog {
        masters: targets.to_vec(),
    };
    fs::write(
        dir.join("target_masters.json"),
        serde_json::to_string_pretty(&catalog)?,
    )?;
    fs::write(
        dir.join("shape_mapping.json"),
        serde_json::to_string_pretty(mapping)?,
    )?;
    Ok(())
}

fn unreachable_page() -> vizier_core::Page {
    // extract_diagram always yields exactly one page.
    vizier_core::Page {
        name: "Page-1".to_string(),
        width: extract::DEFAULT_PAGE_WIDTH,
        height: extract::DEFAULT_PAGE_HEIGHT,
        shapes: Vec::new(),
        connectors: Vec::new(),
    }
}
