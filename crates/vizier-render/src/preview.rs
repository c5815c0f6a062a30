//! Wireframe rasterizer: boxes, diamonds, and connector lines straight
//! from the page cells. Not a faithful Visio renderer; the point is a
//! quick visual sanity check of a converted page without opening Visio.

use std::path::Path;

use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};
use tracing::debug;

use vizier_core::package::{Package, parts};
use vizier_core::{cells, extract, masters};

use crate::error::{RenderError, Result};

const BACKGROUND: (u8, u8, u8) = (255, 255, 255);
const CONNECTOR: (u8, u8, u8) = (120, 120, 120);
const DECISION: (u8, u8, u8) = (160, 160, 160);
const OUTLINE: (u8, u8, u8) = (170, 170, 170);
const TEXT_DOT: (u8, u8, u8) = (80, 80, 80);

#[derive(Debug, Clone)]
pub struct PreviewOptions {
    /// Pixels per drawing inch.
    pub scale: f32,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        PreviewOptions { scale: 40.0 }
    }
}

/// Render the package's first page into PNG bytes.
pub fn render_preview(pkg: &Package, opts: &PreviewOptions) -> Result<Vec<u8>> {
    let (_, page_width, page_height) = extract::page_geometry(pkg);
    let page_root = pkg.read_xml(parts::PAGE1)?;
    let master_names = masters::name_table(pkg);

    let width_px = ((page_width as f32) * opts.scale).round().max(1.0) as u32;
    let height_px = ((page_height as f32) * opts.scale).round().max(1.0) as u32;
    let mut pixmap = Pixmap::new(width_px, height_px).ok_or(RenderError::PixmapAlloc)?;
    pixmap.fill(color(BACKGROUND));

    let scale = opts.scale;
    let page_h = page_height as f32;

    let mut shapes = 0usize;
    for shape in page_root.descendants_named("Shape") {
        if extract::is_connector_element(shape) {
            let x0 = cells::cell_f64(shape, "BeginX", 0.0) as f32 * scale;
            let y0 = (page_h - cells::cell_f64(shape, "BeginY", 0.0) as f32) * scale;
            let x1 = cells::cell_f64(shape, "EndX", 0.0) as f32 * scale;
            let y1 = (page_h - cells::cell_f64(shape, "EndY", 0.0) as f32) * scale;
            stroke_line(&mut pixmap, x0, y0, x1, y1, CONNECTOR);
            shapes += 1;
            continue;
        }

        let width = cells::cell_f64(shape, "Width", 0.0) as f32 * scale;
        let height = cells::cell_f64(shape, "Height", 0.0) as f32 * scale;
        if width <= 0.0 || height <= 0.0 {
            continue;
        }
        let pin_x = cells::cell_f64(shape, "PinX", 0.0) as f32;
        let pin_y = cells::cell_f64(shape, "PinY", 0.0) as f32;
        // Visio's origin is bottom-left; the pixmap's is top-left.
        let x = pin_x * scale - width / 2.0;
        let y = (page_h - pin_y) * scale - height / 2.0;

        let master_name = shape
            .attr("Master")
            .and_then(|mid| master_names.get(mid))
            .map(String::as_str)
            .unwrap_or("");
        if master_name.contains("Decision") || master_name.contains("Diamond") {
            stroke_diamond(&mut pixmap, x, y, width, height, DECISION);
        } else {
            stroke_rect(&mut pixmap, x, y, width, height, OUTLINE);
        }

        if !extract::shape_text(shape).is_empty() {
            fill_dot(&mut pixmap, x + width / 2.0, y + height / 2.0, TEXT_DOT);
        }
        shapes += 1;
    }
    debug!(shapes, width_px, height_px, "preview rasterized");

    pixmap.encode_png().map_err(|_| RenderError::PngEncode)
}

/// Render straight to a file.
pub fn render_preview_to(pkg: &Package, path: &Path, opts: &PreviewOptions) -> Result<()> {
    let bytes = render_preview(pkg, opts)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

fn color((r, g, b): (u8, u8, u8)) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(r, g, b, 255)
}

fn paint(rgb: (u8, u8, u8)) -> Paint<'static> {
    let mut p = Paint::default();
    p.set_color(color(rgb));
    p.anti_alias = true;
    p
}

fn stroke_line(pixmap: &mut Pixmap, x0: f32, y0: f32, x1: f32, y1: f32, rgb: (u8, u8, u8)) {
    let mut pb = PathBuilder::new();
    pb.move_to(x0, y0);
    pb.line_to(x1, y1);
    let Some(path) = pb.finish() else { return };
    pixmap.stroke_path(
        &path,
        &paint(rgb),
        &Stroke::default(),
        Transform::identity(),
        None,
    );
}

fn stroke_rect(pixmap: &mut Pixmap, x: f32, y: f32, w: f32, h: f32, rgb: (u8, u8, u8)) {
    let Some(rect) = Rect::from_xywh(x, y, w, h) else {
        return;
    };
    let path = PathBuilder::from_rect(rect);
    pixmap.stroke_path(
        &path,
        &paint(rgb),
        &Stroke::default(),
        Transform::identity(),
        None,
    );
}

fn stroke_diamond(pixmap: &mut Pixmap, x: f32, y: f32, w: f32, h: f32, rgb: (u8, u8, u8)) {
    let cx = x + w / 2.0;
    let cy = y + h / 2.0;
    let mut pb = PathBuilder::new();
    pb.move_to(cx, y);
    pb.line_to(x + w, cy);
    pb.line_to(cx, y + h);
    pb.line_to(x, cy);
    pb.close();
    let Some(path) = pb.finish() else { return };
    pixmap.stroke_path(
        &path,
        &paint(rgb),
        &Stroke::default(),
        Transform::identity(),
        None,
    );
}

fn fill_dot(pixmap: &mut Pixmap, cx: f32, cy: f32, rgb: (u8, u8, u8)) {
    let Some(rect) = Rect::from_xywh(cx - 1.5, cy - 1.5, 3.0, 3.0) else {
        return;
    };
    let path = PathBuilder::from_rect(rect);
    pixmap.fill_path(
        &path,
        &paint(rgb),
        FillRule::Winding,
        Transform::identity(),
        None,
    );
}
