#![forbid(unsafe_code)]

//! VSDX restyling engine (headless).
//!
//! Takes a drawing produced against one stencil vocabulary and re-expresses
//! it in a template's vocabulary: shape masters are remapped, the template's
//! style tables and masters are imported into the work package, shape
//! instances are rewritten to reference them, and the page layout is
//! re-projected into the template's swimlane grid. Everything operates on
//! the package's XML parts directly; no Visio installation is involved.

pub mod assemble;
pub mod cells;
pub mod classify;
pub mod error;
pub mod extract;
pub mod geom;
pub mod import;
pub mod layout;
pub mod masters;
pub mod model;
pub mod ns;
pub mod package;
pub mod rewrite;
pub mod xml;

pub use classify::{HeuristicMapper, MappingStrategy};
pub use error::{Error, Result};
pub use extract::extract_diagram;
pub use import::ImportReport;
pub use layout::{LayoutMode, LayoutOptions, LayoutOutcome, TargetGrid};
pub use model::{Diagram, Mapping, MasterCatalog, MasterInfo, Page};
pub use package::Package;
pub use rewrite::{RewriteContext, RewriteStats};

#[cfg(test)]
mod tests;
