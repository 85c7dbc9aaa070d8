use serde_json::json;

use crate::llm::contract::ResponseContract;
use crate::llm::types::ChatMessage;
use crate::prompts::{json_only_rule, ComposedPrompt};

pub fn order_contract() -> ResponseContract {
    ResponseContract::strict(
        "order_sensitivity",
        json!({
            "type": "object",
            "properties": {
                "isOrderSensitive": { "type": "boolean" }
            },
            "required": ["isOrderSensitive"],
            "additionalProperties": false
        }),
    )
}

/// Text-only classification; never carries the screenshot.
pub fn judge_order_sensitive(description: &str) -> ComposedPrompt {
    let contract = order_contract();
    let system = format!(
        "Decide whether a UI element description depends on the order or position of elements.\n\n\
         Order-sensitive descriptions use ordinal or positional words that pick one element out \
         of several similar ones, such as \"the second item\", \"the last input\", \
         \"the 5th element\", \"the first row\".\n\
         Descriptions that identify an element by its own content or role, such as \
         \"login button\", \"search input\", \"user avatar\", are NOT order-sensitive.\n\n{}",
        json_only_rule(&contract),
    );
    ComposedPrompt {
        messages: vec![
            ChatMessage::system(system),
            ChatMessage::user(format!("Description: {description}")),
        ],
        contract,
    }
}
