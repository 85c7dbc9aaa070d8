//! Prompt composition for every insight task.
//!
//! Each builder is a pure function of the task input and `PromptOptions`; it
//! returns the chat messages plus the response contract the model must meet.
pub mod assertion;
pub mod describe;
pub mod extraction;
pub mod locate;
pub mod order;

use crate::llm::contract::ResponseContract;
use crate::llm::types::{ChatMessage, ContentPart, ImageUrl};
use crate::perception::types::{image_data_url, Size};

#[derive(Debug, Clone)]
pub struct ComposedPrompt {
    pub messages: Vec<ChatMessage>,
    pub contract: ResponseContract,
}

#[derive(Debug, Clone)]
pub struct PromptOptions {
    /// Vision variant: attach images and ask for pixel boxes.
    pub vision: bool,
    /// Language for free-text fields in the response.
    pub language: String,
}

impl PromptOptions {
    pub fn new(vision: bool, language: impl Into<String>) -> Self {
        Self {
            vision,
            language: language.into(),
        }
    }
}

/// The image (or textual stand-in) a task is evaluated against.
#[derive(Debug, Clone)]
pub enum PromptSubject<'a> {
    /// Base64 image and its pixel size.
    Image { base64: &'a str, size: Size },
    /// Structural description of the page.
    Description(&'a str),
}

pub(crate) fn language_rule(language: &str) -> String {
    format!(
        "Write every free-text field of your answer (such as reasons, thoughts, errors and descriptions) in {language}."
    )
}

pub(crate) fn json_only_rule(contract: &ResponseContract) -> String {
    format!(
        "Respond with ONLY one JSON object matching this schema, with no extra properties, \
         no markdown and no explanation:\n{}",
        contract.schema
    )
}

/// User turn carrying the subject followed by the task text.
pub(crate) fn subject_message(subject: &PromptSubject<'_>, task: String) -> ChatMessage {
    match subject {
        PromptSubject::Image { base64, size } => ChatMessage::user_parts(vec![
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image_data_url(base64),
                },
            },
            ContentPart::Text {
                text: format!(
                    "The screenshot is {}x{} pixels.\n\n{task}",
                    size.width, size.height
                ),
            },
        ]),
        PromptSubject::Description(desc) => ChatMessage::user(format!(
            "Page elements, one per line as `[id] <type> rect=(left,top,width,height) attributes \"text\"`:\n\
             {desc}\n\n{task}"
        )),
    }
}
