use std::collections::BTreeMap;

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::errors::{InsightError, InsightResult};

/// Attribute key under which drivers report the node kind.
pub const NODE_TYPE_ATTR: &str = "nodeType";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn to_bbox(&self) -> BBox {
        [self.left, self.top, self.left + self.width, self.top + self.height]
    }

    pub fn from_bbox(bbox: &BBox) -> Self {
        Self {
            left: bbox[0],
            top: bbox[1],
            width: bbox[2] - bbox[0],
            height: bbox[3] - bbox[1],
        }
    }
}

/// `[x1, y1, x2, y2]` in absolute pixels.
pub type BBox = [f64; 4];

pub fn bbox_center(bbox: &BBox) -> (f64, f64) {
    ((bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0)
}

/// One UI element surfaced by the platform driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentNode {
    pub id: String,
    pub rect: Rect,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Visible text; empty for purely graphical nodes.
    #[serde(default)]
    pub content: String,
}

impl ContentNode {
    pub fn node_type(&self) -> &str {
        self.attributes
            .get(NODE_TYPE_ATTR)
            .map(String::as_str)
            .unwrap_or("UNKNOWN Node")
    }

    pub fn has_text(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Snapshot of the UI for a single automation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIContext {
    /// PNG or JPEG, base64 without a data-URI prefix.
    pub screenshot_base64: String,
    pub size: Size,
    /// Driver order is preserved; "first"/"last" rely on it.
    pub content: Vec<ContentNode>,
}

impl UIContext {
    /// Build a context from raw image bytes; the size is read from the image.
    pub fn from_image_bytes(bytes: &[u8], content: Vec<ContentNode>) -> InsightResult<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| InsightError::Perception(format!("screenshot decode: {e}")))?;
        Ok(Self {
            screenshot_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            size: Size {
                width: img.width(),
                height: img.height(),
            },
            content,
        })
    }

    pub fn screenshot_bytes(&self) -> InsightResult<Vec<u8>> {
        let raw = self
            .screenshot_base64
            .split_once("base64,")
            .map(|(_, data)| data)
            .unwrap_or(&self.screenshot_base64);
        base64::engine::general_purpose::STANDARD
            .decode(raw.trim())
            .map_err(|e| InsightError::Perception(format!("screenshot base64: {e}")))
    }

    pub fn node(&self, id: &str) -> Option<&ContentNode> {
        self.content.iter().find(|n| n.id == id)
    }
}

/// Build a `data:` URL for an image payload, guessing the media type from its header.
pub fn image_data_url(base64_data: &str) -> String {
    if base64_data.starts_with("data:") {
        return base64_data.to_string();
    }
    format!("data:{};base64,{}", media_type_of(base64_data), base64_data)
}

pub fn media_type_of(base64_data: &str) -> &'static str {
    if base64_data.starts_with("/9j/") {
        "image/jpeg"
    } else {
        "image/png"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocateRequest {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_area: Option<String>,
    #[serde(default)]
    pub deep_think: bool,
    #[serde(default)]
    pub multi: bool,
}

impl LocateRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            search_area: None,
            deep_think: false,
            multi: false,
        }
    }

    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    pub fn deep_think(mut self) -> Self {
        self.deep_think = true;
        self
    }

    pub fn within(mut self, search_area: impl Into<String>) -> Self {
        self.search_area = Some(search_area.into());
        self
    }

    /// Section stage runs when a search area is given or deep think is on.
    pub fn wants_section(&self) -> bool {
        self.deep_think || self.search_area.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocatedElement {
    pub id: String,
    pub bbox: BBox,
    pub prompt: String,
}

impl LocatedElement {
    pub fn center(&self) -> (f64, f64) {
        bbox_center(&self.bbox)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocateResult {
    pub elements: Vec<LocatedElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<BBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LocateResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// The single located element, or an error naming the description.
    pub fn into_single(self, description: &str) -> InsightResult<LocatedElement> {
        if let Some(err) = self.error {
            return Err(InsightError::ResponseParse(err).for_step(description));
        }
        let matches = self.elements.len();
        if matches != 1 {
            return Err(InsightError::LocateAmbiguity {
                description: description.to_string(),
                matches,
            });
        }
        self.elements
            .into_iter()
            .next()
            .ok_or_else(|| InsightError::LocateAmbiguity {
                description: description.to_string(),
                matches: 0,
            })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<BBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssertionResult {
    pub pass: bool,
    pub thought: Option<String>,
}

impl AssertionResult {
    pub fn into_step_result(self, assertion: &str) -> InsightResult<()> {
        if self.pass {
            Ok(())
        } else {
            Err(InsightError::ResponseParse(format!(
                "assertion failed: {}",
                self.thought.unwrap_or_default()
            ))
            .for_step(assertion))
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractionResult {
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescribeResult {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
