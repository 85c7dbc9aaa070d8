/// Textual description of a `UIContext` for prompts.
///
/// One line per content node, in driver order. Every item is bounded so the
/// prompt size does not grow with the length of any single node's text.
use crate::perception::types::{ContentNode, UIContext, NODE_TYPE_ATTR};

/// Text bound applied when the caller does not set `truncate_text_length`.
pub const DEFAULT_TEXT_LIMIT: usize = 150;
const ATTRIBUTE_VALUE_LIMIT: usize = 40;
const ATTRIBUTE_BUDGET: usize = 60;
const TRUNCATED_ATTRIBUTE_BUDGET: usize = 30;

#[derive(Debug, Clone, Default)]
pub struct DescribeOptions {
    pub truncate_text_length: Option<usize>,
    pub filter_non_text_content: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDescription {
    pub description: String,
    /// Nodes that made it into the description.
    pub item_count: usize,
}

pub fn describe_context(ctx: &UIContext, opts: &DescribeOptions) -> ContextDescription {
    let text_limit = opts.truncate_text_length.unwrap_or(DEFAULT_TEXT_LIMIT);
    let attr_budget = if opts.truncate_text_length.is_some() {
        TRUNCATED_ATTRIBUTE_BUDGET
    } else {
        ATTRIBUTE_BUDGET
    };

    let lines: Vec<String> = ctx
        .content
        .iter()
        .filter(|node| !opts.filter_non_text_content || node.has_text())
        .map(|node| describe_node(node, text_limit, attr_budget))
        .collect();

    tracing::debug!(
        nodes = ctx.content.len(),
        described = lines.len(),
        text_limit,
        "context described"
    );

    ContextDescription {
        item_count: lines.len(),
        description: lines.join("\n"),
    }
}

fn describe_node(node: &ContentNode, text_limit: usize, attr_budget: usize) -> String {
    let r = &node.rect;
    let mut line = format!(
        "[{}] <{}> rect=({},{},{},{})",
        node.id,
        short_type(node.node_type()),
        r.left.round() as i64,
        r.top.round() as i64,
        r.width.round() as i64,
        r.height.round() as i64,
    );

    let mut used = 0;
    for (key, value) in &node.attributes {
        if key == NODE_TYPE_ATTR || value.trim().is_empty() {
            continue;
        }
        let part = format!(" {}=\"{}\"", key, truncate(value.trim(), ATTRIBUTE_VALUE_LIMIT));
        if used + part.len() > attr_budget {
            break;
        }
        used += part.len();
        line.push_str(&part);
    }

    let text = collapse_whitespace(&node.content);
    if !text.is_empty() {
        line.push_str(" \"");
        line.push_str(&truncate(&text, text_limit));
        line.push('"');
    }
    line
}

/// "BUTTON Node" -> "button"
fn short_type(node_type: &str) -> String {
    node_type
        .trim_end_matches(" Node")
        .trim()
        .to_lowercase()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `limit` chars, marking the cut with "...".
pub fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    if limit < 3 {
        return s.chars().take(limit).collect();
    }
    let keep = limit - 3;
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::perception::types::{Rect, Size};

    fn node(id: usize, node_type: &str, content: &str, attrs: &[(&str, &str)]) -> ContentNode {
        let mut attributes: BTreeMap<String, String> = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        attributes.insert(NODE_TYPE_ATTR.into(), node_type.into());
        ContentNode {
            id: format!("n{id}"),
            rect: Rect { left: 12.0 * id as f64, top: 30.0 * id as f64, width: 240.0, height: 32.0 },
            attributes,
            content: content.into(),
        }
    }

    fn fixture() -> UIContext {
        let long = "Walk the dog around the block twice, then water the plants in the \
                    garden and remember to check the mailbox for the package that was \
                    supposed to arrive yesterday afternoon";
        let mut content = Vec::new();
        for i in 0..12 {
            let n = match i % 4 {
                0 => node(i, "TEXT Node", long, &[("class", "todo-item-label")]),
                1 => node(i, "BUTTON Node", "Clear completed", &[("class", "clear-completed"), ("type", "button")]),
                2 => node(i, "IMG Node", "", &[("src", "https://cdn.example.com/assets/images/avatar-large-rounded.png")]),
                _ => node(i, "INPUT Node", "", &[("placeholder", "What needs to be done?"), ("class", "new-todo")]),
            };
            content.push(n);
        }
        UIContext {
            screenshot_base64: String::new(),
            size: Size { width: 1280, height: 800 },
            content,
        }
    }

    fn avg_len(d: &ContextDescription) -> usize {
        d.description.len() / d.item_count.max(1)
    }

    #[test]
    fn default_description_is_bounded_per_item() {
        let ctx = fixture();
        let d = describe_context(&ctx, &DescribeOptions::default());
        assert_eq!(d.item_count, 12);
        assert!(avg_len(&d) < 250, "avg {} chars", avg_len(&d));
        for line in d.description.lines() {
            assert!(line.len() < 300, "{line}");
        }
    }

    #[test]
    fn truncation_and_filtering_shrink_description() {
        let ctx = fixture();
        let full = describe_context(&ctx, &DescribeOptions::default());
        let truncated = describe_context(
            &ctx,
            &DescribeOptions { truncate_text_length: Some(100), filter_non_text_content: false },
        );
        assert!(truncated.description.len() < full.description.len());

        let filtered = describe_context(
            &ctx,
            &DescribeOptions { truncate_text_length: Some(100), filter_non_text_content: true },
        );
        assert_eq!(filtered.item_count, 6);
        assert!(avg_len(&filtered) < 160, "avg {} chars", avg_len(&filtered));
        // The context itself is untouched.
        assert_eq!(ctx.content.len(), 12);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn tiny_limits_never_exceed_the_bound() {
        for limit in 0..=3 {
            assert!(truncate("abcdefgh", limit).chars().count() <= limit, "limit {limit}");
        }
        assert_eq!(truncate("abcdefgh", 2), "ab");
        assert_eq!(truncate("abcdefgh", 0), "");
    }

    #[test]
    fn description_keeps_driver_order() {
        let d = describe_context(&fixture(), &DescribeOptions::default());
        let first = d.description.lines().next().unwrap();
        assert!(first.starts_with("[n0] <text>"));
        assert!(d.description.lines().last().unwrap().starts_with("[n11] <input>"));
    }
}
