use serde_json::{Map, Value, json};

// Atlassian document format (ADF) bodies, as used by Jira comments.

/// One node of a rich-text comment body.
///
/// Only the node kinds the reminder flow builds or inspects get their own
/// variant. Everything else lands in `Other`, which keeps any inline text and
/// nested nodes so that flattening still reaches text buried in unknown
/// structures (tables, panels, marks).
#[derive(Clone, Debug, PartialEq)]
pub enum RichNode {
    Document(Vec<RichNode>),
    Paragraph(Vec<RichNode>),
    Text(String),
    Mention {
        id: String,
        text: Option<String>,
    },
    Other {
        text: Option<String>,
        children: Vec<RichNode>,
    },
}

impl RichNode {
    /// Parses a comment `body` field. Older API versions return plain strings
    /// instead of documents; those become a single text leaf.
    pub fn from_body(body: &Value) -> Self {
        match body {
            Value::String(text) => RichNode::Text(text.clone()),
            other => RichNode::from_value(other),
        }
    }

    fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => RichNode::from_object(map),
            Value::Array(items) => RichNode::Other {
                text: None,
                children: nested_nodes(items.iter()),
            },
            _ => RichNode::Other {
                text: None,
                children: Vec::new(),
            },
        }
    }

    fn from_object(map: &Map<String, Value>) -> Self {
        let text = map.get("text").and_then(Value::as_str).map(str::to_owned);
        match map.get("type").and_then(Value::as_str) {
            Some("doc") => RichNode::Document(content_of(map)),
            Some("paragraph") => RichNode::Paragraph(content_of(map)),
            Some("text") => RichNode::Text(text.unwrap_or_default()),
            Some("mention") => {
                let attrs = map.get("attrs");
                let attr = |name: &str| {
                    attrs
                        .and_then(|attrs| attrs.get(name))
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                };
                RichNode::Mention {
                    id: attr("id").unwrap_or_default(),
                    text: attr("text"),
                }
            }
            _ => RichNode::Other {
                text,
                children: nested_nodes(
                    map.iter()
                        .filter(|(key, _)| key.as_str() != "text")
                        .map(|(_, value)| value),
                ),
            },
        }
    }

    /// Concatenates every text leaf in document order, without separators.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.append_text(&mut out);
        out
    }

    fn append_text(&self, out: &mut String) {
        match self {
            RichNode::Document(children) | RichNode::Paragraph(children) => {
                for child in children {
                    child.append_text(out);
                }
            }
            RichNode::Text(text) => out.push_str(text),
            RichNode::Mention { text, .. } => {
                if let Some(text) = text {
                    out.push_str(text);
                }
            }
            RichNode::Other { text, children } => {
                if let Some(text) = text {
                    out.push_str(text);
                }
                for child in children {
                    child.append_text(out);
                }
            }
        }
    }

    /// Serializes the node back into ADF JSON for the REST API.
    pub fn to_value(&self) -> Value {
        match self {
            RichNode::Document(children) => json!({
                "type": "doc",
                "version": 1,
                "content": children.iter().map(RichNode::to_value).collect::<Vec<_>>(),
            }),
            RichNode::Paragraph(children) => json!({
                "type": "paragraph",
                "content": children.iter().map(RichNode::to_value).collect::<Vec<_>>(),
            }),
            RichNode::Text(text) => json!({ "type": "text", "text": text }),
            RichNode::Mention { id, text } => {
                let mut attrs = Map::new();
                attrs.insert("id".to_owned(), Value::String(id.clone()));
                if let Some(text) = text {
                    attrs.insert("text".to_owned(), Value::String(text.clone()));
                }
                json!({ "type": "mention", "attrs": attrs })
            }
            RichNode::Other { text, children } => {
                let mut map = Map::new();
                if let Some(text) = text {
                    map.insert("text".to_owned(), Value::String(text.clone()));
                }
                if !children.is_empty() {
                    map.insert(
                        "content".to_owned(),
                        Value::Array(children.iter().map(RichNode::to_value).collect()),
                    );
                }
                Value::Object(map)
            }
        }
    }
}

fn content_of(map: &Map<String, Value>) -> Vec<RichNode> {
    match map.get("content") {
        Some(Value::Array(items)) => nested_nodes(items.iter()),
        _ => Vec::new(),
    }
}

fn nested_nodes<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<RichNode> {
    values
        .filter(|value| value.is_object() || value.is_array())
        .map(RichNode::from_value)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_concatenates_nested_leaves() {
        let body = json!({
            "type": "doc",
            "version": 1,
            "content": [
                {
                    "type": "paragraph",
                    "content": [
                        { "type": "mention", "attrs": { "id": "abc", "text": "@Jane" } },
                        { "type": "text", "text": " Please set a due date" }
                    ]
                },
                {
                    "type": "bulletList",
                    "content": [{
                        "type": "listItem",
                        "content": [{
                            "type": "paragraph",
                            "content": [{ "type": "text", "text": " #datahygiene" }]
                        }]
                    }]
                }
            ]
        });

        let node = RichNode::from_body(&body);
        assert_eq!(node.plain_text(), "@Jane Please set a due date #datahygiene");
    }

    #[test]
    fn unknown_nodes_keep_nested_text() {
        let body = json!({
            "type": "doc",
            "content": [{
                "type": "panel",
                "attrs": { "panelType": "info" },
                "content": [{ "type": "text", "text": "inside", "marks": [{ "type": "strong" }] }]
            }]
        });

        let node = RichNode::from_body(&body);
        assert_eq!(node.plain_text(), "inside");
    }

    #[test]
    fn plain_string_body_is_a_single_leaf() {
        let node = RichNode::from_body(&json!("legacy body #datahygiene"));
        assert_eq!(node, RichNode::Text("legacy body #datahygiene".into()));
    }

    #[test]
    fn scalars_and_missing_content_flatten_to_nothing() {
        assert_eq!(RichNode::from_body(&json!(42)).plain_text(), "");
        assert_eq!(
            RichNode::from_body(&json!({ "type": "paragraph" })).plain_text(),
            ""
        );
    }

    #[test]
    fn to_value_writes_mention_then_text() {
        let node = RichNode::Document(vec![RichNode::Paragraph(vec![
            RichNode::Mention {
                id: "acc-1".into(),
                text: None,
            },
            RichNode::Text(" hello".into()),
        ])]);

        let value = node.to_value();
        assert_eq!(value["type"], "doc");
        assert_eq!(value["version"], 1);
        let inline = &value["content"][0]["content"];
        assert_eq!(inline[0]["type"], "mention");
        assert_eq!(inline[0]["attrs"]["id"], "acc-1");
        assert!(inline[0]["attrs"].get("text").is_none());
        assert_eq!(inline[1]["text"], " hello");
    }

    #[test]
    fn to_value_output_parses_back_to_the_same_tree() {
        let node = RichNode::Document(vec![RichNode::Paragraph(vec![RichNode::Text(
            "x".into(),
        )])]);
        assert_eq!(RichNode::from_body(&node.to_value()), node);
    }
}
