/// Outline a target region on the screenshot so a vision model can be asked
/// about "the marked element" instead of free-form coordinates.
use base64::Engine as _;

use crate::errors::{InsightError, InsightResult};
use crate::perception::types::BBox;

const MARK_COLOUR: [u8; 4] = [255, 40, 40, 255];

/// Draw a rectangle around `bbox` and return the PNG as base64.
///
/// The outline is drawn just outside the box so the element itself stays
/// unobscured; on wide screenshots (> 1600 px) the stroke is thicker.
pub fn mark_region(src_bytes: &[u8], bbox: &BBox) -> InsightResult<String> {
    let img = image::load_from_memory(src_bytes)
        .map_err(|e| InsightError::Perception(format!("mark load: {e}")))?;
    let mut canvas = img.to_rgba8();
    let (w, h) = canvas.dimensions();
    let (fw, fh) = (w as f64, h as f64);
    let [bx1, by1, bx2, by2] = *bbox;
    if !(bx2 > bx1 && by2 > by1 && bx2 > 0.0 && by2 > 0.0 && bx1 < fw && by1 < fh) {
        return Err(InsightError::Perception(format!(
            "mark target {bbox:?} does not intersect the {w}x{h} screenshot"
        )));
    }
    let thickness: i32 = if w > 1600 { 4 } else { 2 };

    // Clamped so the outline loops stay within a stroke of the canvas.
    let t = thickness as f64;
    let x1 = (bx1.round() - t).clamp(-t, fw + t) as i32;
    let y1 = (by1.round() - t).clamp(-t, fh + t) as i32;
    let x2 = (bx2.round() + t).clamp(-t, fw + t) as i32;
    let y2 = (by2.round() + t).clamp(-t, fh + t) as i32;
    draw_rect(&mut canvas, x1, y1, x2, y2, MARK_COLOUR, thickness);

    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| InsightError::Perception(format!("mark PNG encode: {e}")))?;

    Ok(base64::engine::general_purpose::STANDARD.encode(&out))
}

fn draw_rect(
    canvas: &mut image::RgbaImage,
    x1: i32, y1: i32, x2: i32, y2: i32,
    col: [u8; 4],
    thickness: i32,
) {
    let (w, h) = canvas.dimensions();
    let (iw, ih) = (w as i32, h as i32);
    let mut put = |x: i32, y: i32| {
        if x >= 0 && x < iw && y >= 0 && y < ih {
            canvas.put_pixel(x as u32, y as u32, image::Rgba(col));
        }
    };

    for t in 0..thickness {
        for x in x1..=x2 {
            put(x, y1 + t);
            put(x, y2 - t);
        }
        for y in y1..=y2 {
            put(x1 + t, y);
            put(x2 - t, y);
        }
    }
}
