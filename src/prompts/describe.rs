use serde_json::json;

use crate::llm::contract::ResponseContract;
use crate::llm::types::ChatMessage;
use crate::perception::types::BBox;
use crate::prompts::{
    json_only_rule, language_rule, subject_message, ComposedPrompt, PromptOptions, PromptSubject,
};

pub fn describe_contract() -> ResponseContract {
    ResponseContract::strict(
        "describe_element",
        json!({
            "type": "object",
            "properties": {
                "description": { "type": "string" },
                "error": { "type": ["string", "null"] }
            },
            "required": ["description", "error"],
            "additionalProperties": false
        }),
    )
}

/// Ask for a description that would let a locator find the element again.
///
/// In vision mode the subject image already carries a red outline around the
/// target; in text mode the target is given by its rectangle.
pub fn describe_element(subject: &PromptSubject<'_>, target: &BBox, opts: &PromptOptions) -> ComposedPrompt {
    let contract = describe_contract();
    let which = match subject {
        PromptSubject::Image { .. } => "the element outlined with a red rectangle in the screenshot".to_string(),
        PromptSubject::Description(_) => format!(
            "the element whose rectangle is ({}, {}) to ({}, {})",
            target[0].round(),
            target[1].round(),
            target[2].round(),
            target[3].round()
        ),
    };
    let system = format!(
        "You are a UI element describer. Write a short description of {which} so that someone \
         else can find exactly this element on the same screen.\n\n\
         Rules:\n\
         - Mention visible text, element kind, and distinguishing position or neighbours.\n\
         - Keep it under 30 words. Do not mention the red rectangle or coordinates.\n\
         - If the target is unclear, still give your best description and explain in `error`; \
           otherwise `error` is null.\n\
         - {}\n\n{}",
        language_rule(&opts.language),
        json_only_rule(&contract),
    );
    ComposedPrompt {
        messages: vec![
            ChatMessage::system(system),
            subject_message(subject, "Describe the target element.".to_string()),
        ],
        contract,
    }
}
