use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm::contract::ResponseContract;
use crate::llm::types::ChatMessage;
use crate::prompts::{
    json_only_rule, language_rule, subject_message, ComposedPrompt, PromptOptions, PromptSubject,
};

/// What the caller wants pulled out of the page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DataQuery {
    /// Free-form demand, e.g. "the titles of all todo items, as string[]".
    Text(String),
    /// Field name to a description of its meaning and type.
    Fields(BTreeMap<String, String>),
}

impl DataQuery {
    /// Stable text form, also used as the cache prompt.
    pub fn render(&self) -> String {
        match self {
            DataQuery::Text(t) => t.clone(),
            DataQuery::Fields(fields) => {
                let body = fields
                    .iter()
                    .map(|(k, v)| format!("  \"{k}\": {v}"))
                    .collect::<Vec<_>>()
                    .join(",\n");
                format!("{{\n{body}\n}}")
            }
        }
    }
}

/// `data` is caller-shaped, so the contract stays open.
pub fn extraction_contract() -> ResponseContract {
    ResponseContract::loose(
        "extract_data",
        json!({
            "type": "object",
            "properties": {
                "data": {},
                "errors": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["data"]
        }),
    )
}

pub fn extract_data(subject: &PromptSubject<'_>, query: &DataQuery, opts: &PromptOptions) -> ComposedPrompt {
    let contract = extraction_contract();
    let shape = match query {
        DataQuery::Text(_) => "`data` holds the requested value in whatever JSON shape the demand describes.",
        DataQuery::Fields(_) => {
            "`data` is an object with exactly the requested keys; each value follows the type in its description."
        }
    };
    let system = format!(
        "You are a precise data extraction engine for user interfaces. Read the interface and \
         extract the data the user asks for.\n\n\
         Rules:\n\
         - {shape}\n\
         - Only use information that is actually shown; use null for anything missing.\n\
         - Put problems (ambiguous or unreadable content) into `errors`.\n\
         - Copy page text verbatim. {}\n\n{}",
        language_rule(&opts.language),
        json_only_rule(&contract),
    );
    ComposedPrompt {
        messages: vec![
            ChatMessage::system(system),
            subject_message(subject, format!("Data demand:\n{}", query.render())),
        ],
        contract,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_queries_render_deterministically() {
        let mut fields = BTreeMap::new();
        fields.insert("total".to_string(), "number, the cart total".to_string());
        fields.insert("items".to_string(), "string[], item names".to_string());
        let q = DataQuery::Fields(fields);
        assert_eq!(
            q.render(),
            "{\n  \"items\": string[], item names,\n  \"total\": number, the cart total\n}"
        );
        let parsed: DataQuery = serde_json::from_str(r#"{"total": "number"}"#).unwrap();
        assert!(matches!(parsed, DataQuery::Fields(_)));
        let parsed: DataQuery = serde_json::from_str(r#""all titles""#).unwrap();
        assert_eq!(parsed, DataQuery::Text("all titles".into()));
    }
}
