use serde_json::json;

use crate::llm::contract::ResponseContract;
use crate::llm::types::ChatMessage;
use crate::prompts::{
    json_only_rule, language_rule, subject_message, ComposedPrompt, PromptOptions, PromptSubject,
};

pub fn assertion_contract() -> ResponseContract {
    ResponseContract::strict(
        "assertion",
        json!({
            "type": "object",
            "properties": {
                "pass": { "type": "boolean" },
                "thought": { "type": ["string", "null"] }
            },
            "required": ["pass", "thought"],
            "additionalProperties": false
        }),
    )
}

pub fn assertion(subject: &PromptSubject<'_>, assertion: &str, opts: &PromptOptions) -> ComposedPrompt {
    let contract = assertion_contract();
    let system = format!(
        "You are a senior UI test engineer. Decide whether an assertion about the current user \
         interface is true.\n\n\
         Output contract: {{\"pass\": boolean, \"thought\": string | null}}\n\
         - `pass` is true only if the assertion clearly holds for what is shown.\n\
         - When `pass` is true, `thought` MUST be null.\n\
         - When `pass` is false, `thought` MUST explain what you observed instead.\n\
         - Count and compare carefully; do not assume content that is not visible.\n\
         - {}\n\n{}",
        language_rule(&opts.language),
        json_only_rule(&contract),
    );
    ComposedPrompt {
        messages: vec![
            ChatMessage::system(system),
            subject_message(subject, format!("Assertion: {assertion}")),
        ],
        contract,
    }
}
