/// Section crop: cut a region out of the screenshot and upscale it so the
/// element stage sees small or dense UI at a higher resolution.
use base64::Engine as _;

use crate::errors::{InsightError, InsightResult};
use crate::perception::types::{BBox, Size};

/// Minimum edge length of a section before cropping.
pub const MIN_SECTION_EDGE: f64 = 300.0;
/// Crops smaller than this (either side) are upscaled.
pub const MIN_CROP_SIZE: u32 = 512;

/// Result of cropping a section out of the full screenshot.
#[derive(Debug, Clone)]
pub struct SectionCrop {
    /// Base64-encoded PNG of the (possibly upscaled) crop.
    pub image_base64: String,
    /// Region of the full screenshot that was cropped.
    pub rect: BBox,
    /// Size of the image sent to the model.
    pub output: Size,
}

impl SectionCrop {
    /// Map a box in crop-image pixels back to full-screenshot pixels.
    pub fn to_full(&self, bbox: &BBox) -> BBox {
        let crop_w = self.rect[2] - self.rect[0];
        let crop_h = self.rect[3] - self.rect[1];
        let sx = crop_w / self.output.width as f64;
        let sy = crop_h / self.output.height as f64;
        [
            (bbox[0] * sx + self.rect[0]).round(),
            (bbox[1] * sy + self.rect[1]).round(),
            (bbox[2] * sx + self.rect[0]).round(),
            (bbox[3] * sy + self.rect[1]).round(),
        ]
    }
}

/// Grow `rect` around its centre to at least `min_edge` per side, clamped to
/// the screenshot. Zero-area or off-screen input is rejected.
pub fn expand_section(rect: &BBox, size: Size, min_edge: f64) -> InsightResult<BBox> {
    let (w, h) = (size.width as f64, size.height as f64);
    let [x1, y1, x2, y2] = *rect;
    if !(x2 > x1 && y2 > y1) {
        return Err(InsightError::Perception(format!(
            "section rect {rect:?} has zero area"
        )));
    }
    if x2 <= 0.0 || y2 <= 0.0 || x1 >= w || y1 >= h {
        return Err(InsightError::Perception(format!(
            "section rect {rect:?} lies outside the {}x{} screenshot",
            size.width, size.height
        )));
    }

    let grow = |lo: f64, hi: f64, limit: f64| -> (f64, f64) {
        let lo = lo.max(0.0);
        let hi = hi.min(limit);
        let edge = min_edge.min(limit);
        if hi - lo >= edge {
            return (lo, hi);
        }
        let center = (lo + hi) / 2.0;
        let mut start = center - edge / 2.0;
        start = start.max(0.0).min(limit - edge);
        (start, start + edge)
    };

    let (nx1, nx2) = grow(x1, x2, w);
    let (ny1, ny2) = grow(y1, y2, h);
    Ok([nx1.round(), ny1.round(), nx2.round(), ny2.round()])
}

/// Crop `rect` out of `src_bytes`, upscaling to at least `min_size`.
pub fn crop_section(src_bytes: &[u8], rect: &BBox, min_size: u32) -> InsightResult<SectionCrop> {
    let img = image::load_from_memory(src_bytes)
        .map_err(|e| InsightError::Perception(format!("crop load: {e}")))?;
    let (w, h) = (img.width(), img.height());

    let cx1 = (rect[0].max(0.0) as u32).min(w);
    let cy1 = (rect[1].max(0.0) as u32).min(h);
    let cx2 = (rect[2].max(0.0) as u32).min(w);
    let cy2 = (rect[3].max(0.0) as u32).min(h);
    let cw = cx2.saturating_sub(cx1);
    let ch = cy2.saturating_sub(cy1);

    if cw == 0 || ch == 0 {
        return Err(InsightError::Perception("zero-size crop".into()));
    }

    let cropped = img.crop_imm(cx1, cy1, cw, ch);

    let scale = if cw < min_size || ch < min_size {
        let sw = min_size as f32 / cw as f32;
        let sh = min_size as f32 / ch as f32;
        sw.max(sh).max(1.0)
    } else {
        1.0
    };
    let out_w = (cw as f32 * scale).round() as u32;
    let out_h = (ch as f32 * scale).round() as u32;

    let result_img = if scale > 1.0 {
        cropped.resize_exact(out_w, out_h, image::imageops::FilterType::Lanczos3)
    } else {
        cropped
    };

    let mut png_bytes = Vec::new();
    result_img
        .write_to(
            &mut std::io::Cursor::new(&mut png_bytes),
            image::ImageFormat::Png,
        )
        .map_err(|e| InsightError::Perception(format!("crop PNG encode: {e}")))?;

    tracing::debug!(
        x = cx1, y = cy1, w = cw, h = ch,
        out_w, out_h,
        "section cropped"
    );

    Ok(SectionCrop {
        image_base64: base64::engine::general_purpose::STANDARD.encode(&png_bytes),
        rect: [cx1 as f64, cy1 as f64, cx2 as f64, cy2 as f64],
        output: Size {
            width: out_w,
            height: out_h,
        },
    })
}
