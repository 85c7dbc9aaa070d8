use serde_json::json;

use crate::llm::contract::ResponseContract;
use crate::llm::types::ChatMessage;
use crate::prompts::{
    json_only_rule, language_rule, subject_message, ComposedPrompt, PromptOptions, PromptSubject,
};

pub fn locate_contract() -> ResponseContract {
    ResponseContract::strict(
        "locate_element",
        json!({
            "type": "object",
            "properties": {
                "elements": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": ["string", "null"] },
                            "prompt": { "type": ["string", "null"] },
                            "bbox_2d": { "type": ["array", "null"], "items": { "type": "number" } }
                        },
                        "required": ["id", "prompt", "bbox_2d"],
                        "additionalProperties": false
                    }
                },
                "errors": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["elements", "errors"],
            "additionalProperties": false
        }),
    )
}

pub fn section_contract() -> ResponseContract {
    ResponseContract::strict(
        "locate_section",
        json!({
            "type": "object",
            "properties": {
                "bbox_2d": { "type": ["array", "null"], "items": { "type": "number" } },
                "error": { "type": ["string", "null"] }
            },
            "required": ["bbox_2d", "error"],
            "additionalProperties": false
        }),
    )
}

/// Prompt for the element stage.
///
/// `search_area` is only used as a textual hint here; the section stage is
/// what narrows the image.
pub fn locate_element(
    subject: &PromptSubject<'_>,
    description: &str,
    multi: bool,
    search_area: Option<&str>,
    opts: &PromptOptions,
) -> ComposedPrompt {
    let contract = locate_contract();

    let how = match subject {
        PromptSubject::Image { .. } => {
            "For every matching element give `bbox_2d` as [x1, y1, x2, y2], the top-left and \
             bottom-right corners of the element in screenshot pixels. If you can only point at \
             the element, give [x, y]. Set `id` to null unless the element carries a visible id label."
        }
        PromptSubject::Description(_) => {
            "For every matching element give its `id` exactly as listed in the page elements \
             and set `bbox_2d` to null."
        }
    };
    let cardinality = if multi {
        "Return ALL elements that match the description, in page order."
    } else {
        "The caller expects exactly one element. If several elements match equally well, \
         return all of them; never pick one arbitrarily."
    };

    let system = format!(
        "You are a UI element locator. Given a user interface and a description of a target \
         element, find the element(s) the description refers to.\n\n\
         Rules:\n\
         - {how}\n\
         - {cardinality}\n\
         - Ordinal words (first, second, last, n-th) refer to visual order: top-to-bottom, then left-to-right.\n\
         - Set `prompt` to a short restatement of what you found.\n\
         - If nothing matches, return an empty `elements` list and explain why in `errors`.\n\
         - {}\n\n{}",
        language_rule(&opts.language),
        json_only_rule(&contract),
    );

    let mut task = format!("Target element: {description}");
    if let Some(area) = search_area {
        task.push_str(&format!("\nIt is located within: {area}"));
    }

    ComposedPrompt {
        messages: vec![ChatMessage::system(system), subject_message(subject, task)],
        contract,
    }
}

/// Prompt for the section stage: a coarse region, always against the image.
pub fn locate_section(subject: &PromptSubject<'_>, section: &str, opts: &PromptOptions) -> ComposedPrompt {
    let contract = section_contract();
    let system = format!(
        "You are a UI layout analyst. Given a screenshot and a description of an area of the \
         interface, find the rectangular section that contains it.\n\n\
         Rules:\n\
         - Give `bbox_2d` as [x1, y1, x2, y2] in screenshot pixels, covering the whole section \
           with a little margin.\n\
         - If the section cannot be found, set `bbox_2d` to null and explain in `error`; \
           otherwise `error` is null.\n\
         - {}\n\n{}",
        language_rule(&opts.language),
        json_only_rule(&contract),
    );
    ComposedPrompt {
        messages: vec![
            ChatMessage::system(system),
            subject_message(subject, format!("Section to find: {section}")),
        ],
        contract,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::Size;

    #[test]
    fn vision_variant_attaches_image_and_asks_for_boxes() {
        let opts = PromptOptions::new(true, "English");
        let subject = PromptSubject::Image { base64: "iVBOR", size: Size { width: 800, height: 600 } };
        let p = locate_element(&subject, "login button", false, Some("the header"), &opts);
        assert_eq!(p.messages.len(), 2);
        assert_eq!(p.messages[1].image_count(), 1);
        let system = p.messages[0].text();
        assert!(system.contains("bbox_2d"));
        assert!(system.contains("never pick one arbitrarily"));
        let user = p.messages[1].text();
        assert!(user.contains("800x600"));
        assert!(user.contains("It is located within: the header"));
    }

    #[test]
    fn text_variant_embeds_description() {
        let opts = PromptOptions::new(false, "Deutsch");
        let subject = PromptSubject::Description("[n1] <button> rect=(0,0,10,10) \"OK\"");
        let p = locate_element(&subject, "ok button", true, None, &opts);
        assert_eq!(p.messages[1].image_count(), 0);
        assert!(p.messages[1].text().contains("[n1] <button>"));
        assert!(p.messages[0].text().contains("Return ALL elements"));
        assert!(p.messages[0].text().contains("Deutsch"));
    }
}
