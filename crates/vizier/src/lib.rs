#![forbid(unsafe_code)]

//! `vizier` restyles VSDX flowcharts: it reads a work diagram, maps its
//! shapes onto a template's master vocabulary, imports the template's
//! masters and styles, and writes a new package that keeps the work's
//! content with the template's look.
//!
//! # Features
//!
//! - `render`: enable wireframe PNG previews (`vizier::render`)
//! - `llm`: enable the chat-completions mapping strategy ([`llm::LlmMapper`])

pub use vizier_core::*;

pub mod convert;
pub use convert::{ConvertOptions, ConvertReport, convert, rebuild};

#[cfg(feature = "llm")]
pub mod llm;

#[cfg(feature = "render")]
pub mod render {
    pub use vizier_render::{
        PreviewOptions, RenderError, Result, render_preview, render_preview_to,
    };

    use std::path::Path;

    /// Opens a package and writes a preview PNG next to whatever path the
    /// caller chose. Convenience for CLI and scripting use.
    pub fn preview_file(vsdx: &Path, png: &Path, options: &PreviewOptions) -> Result<()> {
        let package = vizier_core::Package::open(vsdx)?;
        render_preview_to(&package, png, options)
    }
}
