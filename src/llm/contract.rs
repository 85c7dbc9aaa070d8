/// Response contracts: the JSON schema a task requires from the model, plus
/// post-hoc validation for backends that cannot enforce it server-side.
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ResponseContract {
    /// Schema name sent to backends that support `json_schema` output.
    pub name: &'static str,
    pub schema: Value,
    /// Whether the schema is closed enough for strict server-side enforcement.
    pub strict: bool,
}

impl ResponseContract {
    pub fn strict(name: &'static str, schema: Value) -> Self {
        Self { name, schema, strict: true }
    }

    pub fn loose(name: &'static str, schema: Value) -> Self {
        Self { name, schema, strict: false }
    }

    /// Check `value` against the schema subset used by the prompts:
    /// `type`, `properties`, `required`, `additionalProperties`, `items`.
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        validate_node(&self.schema, value, "$")
    }
}

fn validate_node(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    if let Some(ty) = schema.get("type") {
        let allowed: Vec<&str> = match ty {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(t, value)) {
            return Err(format!("{path}: expected {}, got {}", allowed.join("|"), type_name(value)));
        }
    }

    if let Value::Object(map) = value {
        let props = schema.get("properties").and_then(Value::as_object);
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !map.contains_key(key) {
                    return Err(format!("{path}: missing required field `{key}`"));
                }
            }
        }
        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
        for (key, child) in map {
            match props.and_then(|p| p.get(key)) {
                Some(child_schema) => validate_node(child_schema, child, &format!("{path}.{key}"))?,
                None if closed => return Err(format!("{path}: unexpected field `{key}`")),
                None => {}
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            validate_node(item_schema, item, &format!("{path}[{i}]"))?;
        }
    }
    Ok(())
}

fn type_matches(ty: &str, value: &Value) -> bool {
    match ty {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("valid regex"))
}

/// Pull a JSON document out of model text: bare JSON, a fenced block, or
/// the outermost `{...}` span inside surrounding prose.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }
    if let Some(caps) = fence_re().captures(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(caps[1].trim()) {
            return Some(v);
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn assertion_contract() -> ResponseContract {
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

    #[test]
    fn validates_closed_object() {
        let c = assertion_contract();
        assert!(c.validate(&json!({"pass": true, "thought": null})).is_ok());
        assert!(c.validate(&json!({"pass": false, "thought": "no"})).is_ok());
        let err = c.validate(&json!({"pass": "yes", "thought": null})).unwrap_err();
        assert!(err.contains("$.pass"));
        assert!(c.validate(&json!({"pass": true})).unwrap_err().contains("thought"));
        assert!(c
            .validate(&json!({"pass": true, "thought": null, "extra": 1}))
            .unwrap_err()
            .contains("unexpected"));
    }

    #[test]
    fn validates_array_items() {
        let c = ResponseContract::strict(
            "list",
            json!({"type": "object", "properties": {"xs": {"type": "array", "items": {"type": "number"}}}}),
        );
        assert!(c.validate(&json!({"xs": [1, 2.5]})).is_ok());
        assert!(c.validate(&json!({"xs": [1, "2"]})).unwrap_err().contains("$.xs[1]"));
    }

    #[test]
    fn extracts_json_from_fences_and_prose() {
        assert_eq!(extract_json(r#"{"a":1}"#), Some(json!({"a": 1})));
        assert_eq!(
            extract_json("Sure!\n```json\n{\"pass\": true, \"thought\": null}\n```"),
            Some(json!({"pass": true, "thought": null}))
        );
        assert_eq!(
            extract_json("The answer is {\"isOrderSensitive\": false} as requested."),
            Some(json!({"isOrderSensitive": false}))
        );
        assert_eq!(extract_json("no json here"), None);
    }
}
