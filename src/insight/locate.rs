//! Two-stage locator.
//!
//! The optional section stage finds a coarse region on the full screenshot and
//! crops it; the element stage then runs against the crop (or the whole page)
//! and its boxes are mapped back to full-screenshot pixels.
use crate::config::CoordinateSystem;
use crate::errors::{InsightError, InsightResult};
use crate::insight::normalize::{normalize_locate, normalize_section, LocateFrame};
use crate::insight::PageView;
use crate::llm::invoker::ModelInvoker;
use crate::perception::crop::{crop_section, expand_section, SectionCrop, MIN_CROP_SIZE, MIN_SECTION_EDGE};
use crate::perception::description::DescribeOptions;
use crate::perception::types::{LocateRequest, LocateResult, SectionResult, UIContext};
use crate::prompts::{self, PromptOptions, PromptSubject};

/// Find the region described by `section` and crop it out of the screenshot.
///
/// Section-level problems (not found, zero area, off screen) are reported in
/// `SectionResult::error`. Model invocation failures propagate.
pub async fn locate_section(
    invoker: &ModelInvoker,
    ctx: &UIContext,
    section: &str,
    opts: &PromptOptions,
) -> InsightResult<(SectionResult, Option<SectionCrop>)> {
    let subject = PromptSubject::Image {
        base64: &ctx.screenshot_base64,
        size: ctx.size,
    };
    let prompt = prompts::locate::locate_section(&subject, section, opts);
    let value = match invoker.invoke(prompt.messages, &prompt.contract).await {
        Ok(v) => v,
        Err(InsightError::ResponseParse(msg)) => return Ok((section_error(msg), None)),
        Err(e) => return Err(e),
    };

    let raw_rect = match normalize_section(value, invoker.coordinates(), ctx.size) {
        Ok(r) => r,
        Err(msg) => {
            tracing::info!(section, reason = %msg, "section not found");
            return Ok((section_error(msg), None));
        }
    };
    let rect = match expand_section(&raw_rect, ctx.size, MIN_SECTION_EDGE) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(section, ?raw_rect, error = %e, "unusable section rect");
            return Ok((section_error(e.to_string()), None));
        }
    };

    let crop = crop_section(&ctx.screenshot_bytes()?, &rect, MIN_CROP_SIZE)?;
    tracing::debug!(section, ?raw_rect, rect = ?crop.rect, "section located");
    Ok((
        SectionResult {
            rect: Some(crop.rect),
            image_base64: Some(crop.image_base64.clone()),
            error: None,
        },
        Some(crop),
    ))
}

fn section_error(msg: impl Into<String>) -> SectionResult {
    SectionResult {
        error: Some(msg.into()),
        ..Default::default()
    }
}

/// Locate the element(s) described by `req`.
///
/// `opts.vision` selects screenshot prompts; without it the section stage is
/// skipped and `search_area` only narrows the prompt text.
pub async fn locate(
    invoker: &ModelInvoker,
    ctx: &UIContext,
    req: &LocateRequest,
    opts: &PromptOptions,
    describe_opts: &DescribeOptions,
) -> InsightResult<LocateResult> {
    let mut section: Option<SectionResult> = None;
    let mut crop: Option<SectionCrop> = None;

    if req.wants_section() {
        if opts.vision {
            let area = req.search_area.as_deref().unwrap_or(&req.description);
            let (found, cropped) = locate_section(invoker, ctx, area, opts).await?;
            if let Some(err) = &found.error {
                return Ok(LocateResult {
                    error: Some(format!("section '{area}': {err}")),
                    ..Default::default()
                });
            }
            section = Some(found);
            crop = cropped;
        } else {
            tracing::warn!(
                description = %req.description,
                deep_think = req.deep_think,
                "section stage needs a vision model, locating against the full page"
            );
        }
    }

    let page = PageView::new(ctx, opts.vision, describe_opts);
    let subject = match &crop {
        Some(c) => PromptSubject::Image {
            base64: &c.image_base64,
            size: c.output,
        },
        None => page.subject(),
    };
    let hint = if crop.is_some() { None } else { req.search_area.as_deref() };
    let prompt = prompts::locate::locate_element(&subject, &req.description, req.multi, hint, opts);

    let mut result = match invoker.invoke(prompt.messages, &prompt.contract).await {
        Ok(value) => {
            let frame = LocateFrame {
                context: ctx,
                coordinates: if opts.vision {
                    invoker.coordinates()
                } else {
                    CoordinateSystem::Pixel
                },
                crop: crop.as_ref(),
            };
            normalize_locate(value, &frame)
        }
        Err(InsightError::ResponseParse(msg)) => LocateResult::failed(msg),
        Err(e) => return Err(e),
    };

    if let Some(s) = section {
        result.rect = s.rect;
        result.image_base64 = s.image_base64;
    }

    if !req.multi && result.elements.len() != 1 {
        let ambiguity = InsightError::LocateAmbiguity {
            description: req.description.clone(),
            matches: result.elements.len(),
        }
        .to_string();
        result.error = Some(match result.error.take() {
            Some(prev) => format!("{ambiguity}; {prev}"),
            None => ambiguity,
        });
        result.elements.clear();
    }

    tracing::info!(
        description = %req.description,
        found = result.elements.len(),
        sectioned = result.rect.is_some(),
        error = result.error.as_deref().unwrap_or(""),
        "locate finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::llm::providers::scripted::ScriptedProvider;
    use crate::llm::types::{CallConfig, ChatMessage};
    use crate::perception::types::{ContentNode, Rect};

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba([240, 240, 240, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn ctx() -> UIContext {
        let node = |id: &str, left: f64, top: f64, text: &str| ContentNode {
            id: id.into(),
            rect: Rect { left, top, width: 120.0, height: 30.0 },
            attributes: BTreeMap::from([("nodeType".to_string(), "BUTTON Node".to_string())]),
            content: text.into(),
        };
        UIContext::from_image_bytes(
            &png(1000, 800),
            vec![node("save", 100.0, 100.0, "Save"), node("cancel", 300.0, 100.0, "Cancel")],
        )
        .unwrap()
    }

    fn invoker(provider: ScriptedProvider) -> (Arc<ScriptedProvider>, ModelInvoker) {
        let provider = Arc::new(provider);
        let invoker = ModelInvoker::new(
            provider.clone(),
            CallConfig {
                model: "test".into(),
                temperature: 0.0,
                timeout: Duration::from_secs(5),
            },
        );
        (provider, invoker)
    }

    fn is_section_call(messages: &[ChatMessage]) -> bool {
        messages[0].text().contains("layout analyst")
    }

    #[tokio::test]
    async fn deep_think_maps_crop_boxes_to_full_screenshot() {
        let (provider, inv) = invoker(
            ScriptedProvider::new(|m| {
                Ok(if is_section_call(m) {
                    r#"{"bbox_2d": [100, 100, 400, 300], "error": null}"#.to_string()
                } else {
                    r#"{"elements": [{"id": null, "prompt": "save", "bbox_2d": [256, 256, 276, 276]}], "errors": []}"#
                        .to_string()
                })
            })
            .with_vision(true),
        );
        let opts = PromptOptions::new(true, "English");
        let req = LocateRequest::new("save button").deep_think();
        let result = locate(&inv, &ctx(), &req, &opts, &DescribeOptions::default()).await.unwrap();

        assert!(result.error.is_none(), "{:?}", result.error);
        // 300x200 section grown to 300x300, cropped, then upscaled to 512x512
        assert_eq!(result.rect, Some([100.0, 50.0, 400.0, 350.0]));
        assert_eq!(result.elements.len(), 1);
        assert_eq!(result.elements[0].bbox, [250.0, 200.0, 262.0, 212.0]);
        assert_eq!(provider.call_count(), 2);

        let calls = provider.recorded_calls();
        assert_eq!(calls[0].contract, "locate_section");
        assert!(calls[1].messages[1].text().contains("512x512"));
    }

    #[tokio::test]
    async fn single_locate_with_two_matches_is_ambiguous() {
        let (_, inv) = invoker(ScriptedProvider::fixed(
            r#"{"elements": [
                {"id": "save", "prompt": "a", "bbox_2d": null},
                {"id": "cancel", "prompt": "b", "bbox_2d": null}
            ], "errors": []}"#,
        ));
        let opts = PromptOptions::new(false, "English");
        let ctx = ctx();

        let single = locate(&inv, &ctx, &LocateRequest::new("a button"), &opts, &DescribeOptions::default())
            .await
            .unwrap();
        assert!(single.elements.is_empty());
        assert!(single.error.unwrap().contains("found 2"));

        let multi = locate(&inv, &ctx, &LocateRequest::new("a button").multi(), &opts, &DescribeOptions::default())
            .await
            .unwrap();
        assert_eq!(multi.elements.len(), 2);
        assert!(multi.error.is_none());
    }

    #[tokio::test]
    async fn text_mode_skips_section_stage_and_resolves_ids() {
        let (provider, inv) = invoker(ScriptedProvider::fixed(
            r#"{"elements": [{"id": "cancel", "prompt": "Cancel", "bbox_2d": null}], "errors": []}"#,
        ));
        let opts = PromptOptions::new(false, "English");
        let req = LocateRequest::new("cancel").within("the toolbar");
        let result = locate(&inv, &ctx(), &req, &opts, &DescribeOptions::default()).await.unwrap();

        assert_eq!(provider.call_count(), 1);
        assert_eq!(result.elements[0].id, "cancel");
        assert_eq!(result.elements[0].bbox, [300.0, 100.0, 420.0, 130.0]);
        assert!(result.rect.is_none());
        let user = provider.recorded_calls()[0].messages[1].text();
        assert!(user.contains("[cancel]"));
        assert!(user.contains("It is located within: the toolbar"));
    }

    #[tokio::test]
    async fn unusable_section_is_reported_not_thrown() {
        let (provider, inv) = invoker(
            ScriptedProvider::fixed(r#"{"bbox_2d": [1200, 900, 1300, 950], "error": null}"#).with_vision(true),
        );
        let opts = PromptOptions::new(true, "English");
        let req = LocateRequest::new("save").within("a sidebar");
        let result = locate(&inv, &ctx(), &req, &opts, &DescribeOptions::default()).await.unwrap();
        assert!(result.elements.is_empty());
        assert!(result.error.unwrap().contains("outside"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn section_crop_is_smaller_than_screenshot() {
        let (_, inv) = invoker(
            ScriptedProvider::fixed(r#"{"bbox_2d": [600, 500, 900, 700], "error": null}"#).with_vision(true),
        );
        let ctx = ctx();
        let (section, crop) = locate_section(&inv, &ctx, "bottom right panel", &PromptOptions::new(true, "English"))
            .await
            .unwrap();
        assert!(section.error.is_none());
        let rect = section.rect.unwrap();
        assert!(rect[2] - rect[0] < ctx.size.width as f64);
        assert!(rect[3] - rect[1] < ctx.size.height as f64);
        assert!(section.image_base64.is_some());
        let crop = crop.unwrap();
        assert_eq!(crop.rect, [600.0, 450.0, 900.0, 750.0]);
        assert!(crop.output.width < ctx.size.width && crop.output.height < ctx.size.height);
    }
}
