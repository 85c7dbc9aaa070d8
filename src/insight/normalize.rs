/// Response normalization: untrusted model JSON into typed results.
///
/// Model output is treated like a wire format. It is deserialized into raw
/// intermediates and then coerced through named rules (`fill_locate_param`,
/// `adapt_bbox`) into canonical values.
use serde::Deserialize;
use serde_json::Value;

use crate::config::CoordinateSystem;
use crate::errors::{InsightError, InsightResult};
use crate::perception::crop::SectionCrop;
use crate::perception::types::{
    AssertionResult, BBox, DescribeResult, ExtractionResult, LocateResult, LocatedElement, Size,
    UIContext,
};
use crate::prompts::assertion::assertion_contract;

/// Edge of the box synthesized around a point-only answer.
pub const DEFAULT_POINT_BOX: f64 = 20.0;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawLocateElement {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub bbox_2d: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLocateResponse {
    #[serde(default)]
    pub elements: Vec<RawLocateElement>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSection {
    #[serde(default)]
    bbox_2d: Option<Vec<f64>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAssertion {
    pass: bool,
    thought: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawDescribe {
    description: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawOrderSensitivity {
    is_order_sensitive: bool,
}

/// Canonical box from a model's `bbox_2d`.
///
/// Four numbers pass through unchanged. Two numbers are a point; the box is
/// `[x, y, x + 20, y + 20]`, always extending to the lower right.
pub fn fill_locate_param(bbox_2d: &[f64]) -> InsightResult<BBox> {
    match *bbox_2d {
        [x1, y1, x2, y2] => Ok([x1, y1, x2, y2]),
        [x, y] => Ok([x, y, x + DEFAULT_POINT_BOX, y + DEFAULT_POINT_BOX]),
        _ => Err(InsightError::ResponseParse(format!(
            "bbox_2d must have 2 or 4 numbers, got {}",
            bbox_2d.len()
        ))),
    }
}

/// Convert a filled box from the backend's coordinate system to pixels of
/// an image of `size`, then clamp so that `x2 > x1`, `y2 > y1` and both
/// corners lie inside the image.
pub fn adapt_bbox(bbox: &BBox, coordinates: CoordinateSystem, size: Size) -> BBox {
    let [x1, y1, x2, y2] = scale_bbox(bbox, coordinates, size);
    let (w, h) = (size.width as f64, size.height as f64);
    let (x1, x2) = clamp_span(x1, x2, w);
    let (y1, y2) = clamp_span(y1, y2, h);
    [x1.round(), y1.round(), x2.round(), y2.round()]
}

/// Coordinate conversion only; corners are reordered but not clamped.
pub fn scale_bbox(bbox: &BBox, coordinates: CoordinateSystem, size: Size) -> BBox {
    let (w, h) = (size.width as f64, size.height as f64);
    let [a, b, c, d] = *bbox;
    let [x1, y1, x2, y2] = match coordinates {
        CoordinateSystem::Pixel => [a, b, c, d],
        CoordinateSystem::Normalized1000 => [a * w / 1000.0, b * h / 1000.0, c * w / 1000.0, d * h / 1000.0],
        CoordinateSystem::Normalized1000Yx => [b * w / 1000.0, a * h / 1000.0, d * w / 1000.0, c * h / 1000.0],
    };
    [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)]
}

fn clamp_span(lo: f64, hi: f64, limit: f64) -> (f64, f64) {
    let limit = limit.max(1.0);
    let lo = lo.clamp(0.0, limit);
    let hi = hi.clamp(0.0, limit);
    if hi > lo {
        (lo, hi)
    } else if lo + 1.0 <= limit {
        (lo, lo + 1.0)
    } else {
        (limit - 1.0, limit)
    }
}

/// Where the boxes in a locate response live.
pub struct LocateFrame<'a> {
    pub context: &'a UIContext,
    pub coordinates: CoordinateSystem,
    /// Set when the element stage ran against a section crop.
    pub crop: Option<&'a SectionCrop>,
}

impl LocateFrame<'_> {
    fn image_size(&self) -> Size {
        self.crop.map(|c| c.output).unwrap_or(self.context.size)
    }

    fn to_full(&self, bbox: &BBox) -> BBox {
        match self.crop {
            Some(crop) => adapt_bbox(&crop.to_full(bbox), CoordinateSystem::Pixel, self.context.size),
            None => *bbox,
        }
    }
}

/// Parse a locate response. Never fails: problems land in `error`.
pub fn normalize_locate(value: Value, frame: &LocateFrame<'_>) -> LocateResult {
    let raw: RawLocateResponse = match serde_json::from_value(value) {
        Ok(raw) => raw,
        Err(e) => return LocateResult::failed(format!("unreadable locate response: {e}")),
    };

    let mut errors: Vec<String> = raw.errors.into_iter().filter(|e| !e.trim().is_empty()).collect();
    let mut elements = Vec::new();

    for item in raw.elements {
        match resolve_element(&item, frame) {
            Ok(el) => elements.push(el),
            Err(e) => errors.push(e.to_string()),
        }
    }

    LocateResult {
        elements,
        rect: None,
        image_base64: None,
        error: if errors.is_empty() { None } else { Some(errors.join("; ")) },
    }
}

fn resolve_element(item: &RawLocateElement, frame: &LocateFrame<'_>) -> InsightResult<LocatedElement> {
    let prompt = item.prompt.clone().unwrap_or_default();

    if let Some(raw_box) = item.bbox_2d.as_deref() {
        let filled = fill_locate_param(raw_box)?;
        let local = adapt_bbox(&filled, frame.coordinates, frame.image_size());
        let bbox = frame.to_full(&local);
        let id = item
            .id
            .clone()
            .filter(|id| frame.context.node(id).is_some())
            .or_else(|| innermost_node_at(frame.context, &bbox))
            .unwrap_or_else(|| synthetic_id(&bbox));
        return Ok(LocatedElement { id, bbox, prompt });
    }

    let id = item
        .id
        .as_deref()
        .ok_or_else(|| InsightError::ResponseParse("element has neither bbox_2d nor id".into()))?;
    let node = frame
        .context
        .node(id)
        .ok_or_else(|| InsightError::ResponseParse(format!("element id '{id}' is not on the page")))?;
    let bbox = adapt_bbox(&node.rect.to_bbox(), CoordinateSystem::Pixel, frame.context.size);
    Ok(LocatedElement { id: node.id.clone(), bbox, prompt })
}

/// Smallest content node containing the centre of `bbox`.
fn innermost_node_at(ctx: &UIContext, bbox: &BBox) -> Option<String> {
    let (cx, cy) = ((bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0);
    ctx.content
        .iter()
        .filter(|n| {
            let r = n.rect.to_bbox();
            cx >= r[0] && cx <= r[2] && cy >= r[1] && cy <= r[3] && n.rect.width > 0.0 && n.rect.height > 0.0
        })
        .min_by(|a, b| {
            let aa = a.rect.width * a.rect.height;
            let ba = b.rect.width * b.rect.height;
            aa.partial_cmp(&ba).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|n| n.id.clone())
}

fn synthetic_id(bbox: &BBox) -> String {
    format!("bbox-{}-{}-{}-{}", bbox[0], bbox[1], bbox[2], bbox[3])
}

/// Section box in pixels of an image of `size`, or the model's reason for
/// not finding one. Left unclamped so off-screen answers stay detectable.
pub fn normalize_section(value: Value, coordinates: CoordinateSystem, size: Size) -> Result<BBox, String> {
    let raw: RawSection =
        serde_json::from_value(value).map_err(|e| format!("unreadable section response: {e}"))?;
    match raw.bbox_2d {
        Some(b) => {
            let filled = fill_locate_param(&b).map_err(|e| e.to_string())?;
            Ok(scale_bbox(&filled, coordinates, size))
        }
        None => Err(raw.error.unwrap_or_else(|| "section not found".to_string())),
    }
}

/// Strict: anything but `{pass, thought}` is a parse error.
pub fn parse_assertion(value: Value) -> InsightResult<AssertionResult> {
    assertion_contract()
        .validate(&value)
        .map_err(|e| InsightError::ResponseParse(format!("assertion: {e}")))?;
    let raw: RawAssertion = serde_json::from_value(value)
        .map_err(|e| InsightError::ResponseParse(format!("assertion: {e}")))?;

    let thought = if raw.pass {
        None
    } else {
        Some(
            raw.thought
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "assertion does not hold for the current UI".to_string()),
        )
    };
    Ok(AssertionResult { pass: raw.pass, thought })
}

pub fn normalize_extraction(value: Value) -> ExtractionResult {
    match serde_json::from_value::<RawExtraction>(value) {
        Ok(raw) => ExtractionResult {
            data: raw.data,
            error: if raw.errors.is_empty() { None } else { Some(raw.errors.join("; ")) },
        },
        Err(e) => ExtractionResult {
            data: None,
            error: Some(format!("unreadable extraction response: {e}")),
        },
    }
}

pub fn normalize_describe(value: Value) -> DescribeResult {
    match serde_json::from_value::<RawDescribe>(value) {
        Ok(raw) => DescribeResult {
            description: raw.description.trim().to_string(),
            error: raw.error.filter(|e| !e.trim().is_empty()),
        },
        Err(e) => DescribeResult {
            description: String::new(),
            error: Some(format!("unreadable describe response: {e}")),
        },
    }
}

pub fn parse_order_sensitivity(value: Value) -> InsightResult<bool> {
    serde_json::from_value::<RawOrderSensitivity>(value)
        .map(|r| r.is_order_sensitive)
        .map_err(|e| InsightError::ResponseParse(format!("order sensitivity: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::perception::types::{ContentNode, Rect};

    const SIZE: Size = Size { width: 1000, height: 500 };

    fn ctx() -> UIContext {
        let node = |id: &str, left: f64, top: f64, width: f64, height: f64| ContentNode {
            id: id.into(),
            rect: Rect { left, top, width, height },
            attributes: BTreeMap::new(),
            content: String::new(),
        };
        UIContext {
            screenshot_base64: String::new(),
            size: SIZE,
            content: vec![
                node("form", 0.0, 0.0, 600.0, 400.0),
                node("submit", 100.0, 100.0, 80.0, 30.0),
            ],
        }
    }

    #[test]
    fn four_numbers_pass_through() {
        for b in [[1.0, 2.0, 3.0, 4.0], [10.5, 0.0, 99.25, 7.0], [-5.0, 3.0, 2000.0, 1.0]] {
            assert_eq!(fill_locate_param(&b).unwrap(), b);
        }
    }

    #[test]
    fn two_numbers_expand_lower_right() {
        for (x, y) in [(0.0, 0.0), (150.0, 75.5), (999.0, 1.0)] {
            assert_eq!(fill_locate_param(&[x, y]).unwrap(), [x, y, x + 20.0, y + 20.0]);
        }
        assert!(fill_locate_param(&[1.0, 2.0, 3.0]).is_err());
        assert!(fill_locate_param(&[]).is_err());
    }

    #[test]
    fn adapt_scales_and_clamps() {
        assert_eq!(
            adapt_bbox(&[100.0, 100.0, 200.0, 200.0], CoordinateSystem::Normalized1000, SIZE),
            [100.0, 50.0, 200.0, 100.0]
        );
        assert_eq!(
            adapt_bbox(&[100.0, 100.0, 200.0, 200.0], CoordinateSystem::Normalized1000Yx, SIZE),
            [100.0, 50.0, 200.0, 100.0]
        );
        assert_eq!(
            adapt_bbox(&[990.0, 490.0, 1010.0, 510.0], CoordinateSystem::Pixel, SIZE),
            [990.0, 490.0, 1000.0, 500.0]
        );
        // entirely outside: collapses to a 1px box on the edge
        assert_eq!(
            adapt_bbox(&[1200.0, 10.0, 1300.0, 20.0], CoordinateSystem::Pixel, SIZE),
            [999.0, 10.0, 1000.0, 20.0]
        );
        // reversed corners are reordered
        assert_eq!(
            adapt_bbox(&[50.0, 60.0, 10.0, 20.0], CoordinateSystem::Pixel, SIZE),
            [10.0, 20.0, 50.0, 60.0]
        );
    }

    #[test]
    fn locate_resolves_point_and_id_answers() {
        let ctx = ctx();
        let frame = LocateFrame { context: &ctx, coordinates: CoordinateSystem::Pixel, crop: None };
        let value = json!({
            "elements": [
                { "id": null, "prompt": "submit", "bbox_2d": [110, 105] },
                { "id": "form", "prompt": "the form", "bbox_2d": null }
            ],
            "errors": []
        });
        let result = normalize_locate(value, &frame);
        assert!(result.error.is_none());
        assert_eq!(result.elements.len(), 2);
        assert_eq!(result.elements[0].id, "submit");
        assert_eq!(result.elements[0].bbox, [110.0, 105.0, 130.0, 125.0]);
        assert_eq!(result.elements[1].bbox, [0.0, 0.0, 600.0, 400.0]);
    }

    #[test]
    fn locate_keeps_partial_results_with_error() {
        let ctx = ctx();
        let frame = LocateFrame { context: &ctx, coordinates: CoordinateSystem::Pixel, crop: None };
        let value = json!({
            "elements": [
                { "id": "ghost", "prompt": "x", "bbox_2d": null },
                { "id": null, "prompt": "corner", "bbox_2d": [700, 450, 720, 470] }
            ],
            "errors": []
        });
        let result = normalize_locate(value, &frame);
        assert_eq!(result.elements.len(), 1);
        assert_eq!(result.elements[0].id, "bbox-700-450-720-470");
        assert!(result.error.unwrap().contains("ghost"));

        let garbage = normalize_locate(json!({"elements": "nope"}), &frame);
        assert!(garbage.elements.is_empty());
        assert!(garbage.error.is_some());
    }

    #[test]
    fn assertion_shape_is_strict() {
        assert_eq!(
            parse_assertion(json!({"pass": true, "thought": "looks fine"})).unwrap(),
            AssertionResult { pass: true, thought: None }
        );
        let failed = parse_assertion(json!({"pass": false, "thought": null})).unwrap();
        assert!(!failed.pass);
        assert!(failed.thought.is_some());
        assert!(parse_assertion(json!({"pass": true})).is_err());
        assert!(parse_assertion(json!({"pass": 1, "thought": null})).is_err());
        assert!(parse_assertion(json!({"pass": true, "thought": null, "score": 1})).is_err());
    }

    #[test]
    fn section_and_order_parsing() {
        assert_eq!(
            normalize_section(json!({"bbox_2d": [10, 10, 110, 60], "error": null}), CoordinateSystem::Pixel, SIZE),
            Ok([10.0, 10.0, 110.0, 60.0])
        );
        assert_eq!(
            normalize_section(json!({"bbox_2d": null, "error": "no sidebar"}), CoordinateSystem::Pixel, SIZE),
            Err("no sidebar".to_string())
        );
        assert!(parse_order_sensitivity(json!({"isOrderSensitive": true})).unwrap());
        assert!(parse_order_sensitivity(json!({"orderSensitive": true})).is_err());
    }

    #[test]
    fn extraction_and_describe_degrade_gracefully() {
        let ok = normalize_extraction(json!({"data": ["a", "b"], "errors": []}));
        assert_eq!(ok.data, Some(json!(["a", "b"])));
        assert!(ok.error.is_none());
        let bad = normalize_extraction(json!({"data": 1, "errors": "oops"}));
        assert!(bad.error.is_some());

        let d = normalize_describe(json!({"description": " The blue Login button ", "error": ""}));
        assert_eq!(d.description, "The blue Login button");
        assert!(d.error.is_none());
    }
}
