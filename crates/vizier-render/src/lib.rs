#![forbid(unsafe_code)]

//! Preview rendering for converted VSDX packages.
//!
//! Produces a wireframe PNG of the first page: shape outlines, decision
//! diamonds, connector lines, and a dot marking each texted shape. Useful
//! for eyeballing a conversion result in environments without Visio.

mod error;
mod preview;

pub use error::{RenderError, Result};
pub use preview::{PreviewOptions, render_preview, render_preview_to};
