//! Structured rich-text document shared by titles and event bodies.
//!
//! A document is a list of blocks. Paragraph blocks hold inline runs (styled
//! text, tag markers, mentions); timestamp dividers separate log entries in a
//! body. Exports to markup and plain text are always regenerable from here.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::markup::escape_html;

/// Display/parse format for timestamp dividers.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Inline formatting marks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marks {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strikethrough: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Marks {
    pub fn is_plain(&self) -> bool {
        *self == Marks::default()
    }

    fn from_slate(node: &Value) -> Self {
        let flag = |key: &str| node.get(key).and_then(Value::as_bool).unwrap_or(false);
        Marks {
            bold: flag("bold"),
            italic: flag("italic"),
            underline: flag("underline"),
            strikethrough: flag("strikethrough"),
        }
    }
}

/// Inline content of a paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Inline {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Marks::is_plain")]
        marks: Marks,
    },
    Tag {
        tag_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Mention {
        target_id: String,
        #[serde(default)]
        label: String,
    },
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Inline::Text {
            text: text.into(),
            marks: Marks::default(),
        }
    }

    pub fn styled(text: impl Into<String>, marks: Marks) -> Self {
        Inline::Text {
            text: text.into(),
            marks,
        }
    }

    pub fn tag(tag_id: impl Into<String>) -> Self {
        Inline::Tag {
            tag_id: tag_id.into(),
            label: None,
        }
    }

    fn from_value(node: &Value) -> Option<Self> {
        match node.get("type").and_then(Value::as_str) {
            Some("tag") => Some(Inline::Tag {
                tag_id: node
                    .get("tag_id")
                    .or_else(|| node.get("tagId"))
                    .and_then(Value::as_str)?
                    .to_string(),
                label: node
                    .get("label")
                    .or_else(|| node.get("tagName"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            Some("mention") => Some(Inline::Mention {
                target_id: node
                    .get("target_id")
                    .or_else(|| node.get("targetId"))
                    .and_then(Value::as_str)?
                    .to_string(),
                label: node
                    .get("label")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            _ => {
                let text = node.get("text").and_then(Value::as_str)?;
                let marks = match node.get("marks") {
                    Some(marks) => serde_json::from_value(marks.clone()).unwrap_or_default(),
                    None => Marks::from_slate(node),
                };
                Some(Inline::Text {
                    text: text.to_string(),
                    marks,
                })
            }
        }
    }
}

/// Top-level block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Block {
    Paragraph {
        #[serde(default)]
        children: Vec<Inline>,
    },
    TimestampDivider { timestamp: NaiveDateTime },
}

impl Block {
    pub fn paragraph(text: impl Into<String>) -> Self {
        let text = text.into();
        let children = if text.is_empty() {
            Vec::new()
        } else {
            vec![Inline::text(text)]
        };
        Block::Paragraph { children }
    }

    fn from_value(node: &Value) -> Option<Self> {
        match node.get("type").and_then(Value::as_str) {
            Some("timestamp-divider") => {
                let raw = node.get("timestamp").and_then(Value::as_str)?;
                parse_timestamp(raw).map(|timestamp| Block::TimestampDivider { timestamp })
            }
            Some("paragraph") | None => {
                let children = node
                    .get("children")
                    .and_then(Value::as_array)
                    .map(|nodes| nodes.iter().filter_map(Inline::from_value).collect())
                    .unwrap_or_default();
                Some(Block::Paragraph { children })
            }
            // Unknown block types keep their text.
            Some(_) => {
                let children = node
                    .get("children")
                    .and_then(Value::as_array)
                    .map(|nodes| nodes.iter().filter_map(Inline::from_value).collect())
                    .unwrap_or_default();
                Some(Block::Paragraph { children })
            }
        }
    }

    fn plain_text(&self) -> String {
        match self {
            Block::Paragraph { children } => children
                .iter()
                .filter_map(|inline| match inline {
                    Inline::Text { text, .. } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            Block::TimestampDivider { timestamp } => timestamp.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Parse a divider timestamp written either in display format or RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_local())
        })
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok())
}

/// Structured rich-text document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RichDoc {
    pub blocks: Vec<Block>,
}

impl<'de> Deserialize<'de> for RichDoc {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        RichDoc::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom("unrecognized rich document shape"))
    }
}

impl RichDoc {
    /// A document with a single paragraph holding `text` unstyled.
    pub fn from_plain(text: &str) -> Self {
        RichDoc {
            blocks: vec![Block::paragraph(text)],
        }
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        RichDoc { blocks }
    }

    /// Accept `{ "blocks": [...] }`, a bare block array (legacy editor JSON),
    /// or either of those encoded as a JSON string.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(nodes) => {
                let blocks = nodes.iter().map(Block::from_value).collect::<Option<Vec<_>>>()?;
                Some(RichDoc { blocks })
            }
            Value::Object(map) => {
                let nodes = map.get("blocks")?.as_array()?;
                let blocks = nodes.iter().map(Block::from_value).collect::<Option<Vec<_>>>()?;
                Some(RichDoc { blocks })
            }
            Value::String(raw) => Self::from_json_str(raw),
            _ => None,
        }
    }

    pub fn from_json_str(raw: &str) -> Option<Self> {
        let trimmed = raw.trim_start();
        if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
            return None;
        }
        let value: Value = serde_json::from_str(raw).ok()?;
        match value {
            Value::String(_) => None,
            other => Self::from_value(&other),
        }
    }

    /// True when there is no text, tag, mention or divider anywhere.
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|block| match block {
            Block::Paragraph { children } => children.iter().all(|inline| match inline {
                Inline::Text { text, .. } => text.trim().is_empty(),
                _ => false,
            }),
            Block::TimestampDivider { .. } => false,
        })
    }

    /// Plain text export: one line per block.
    pub fn plain_text(&self) -> String {
        self.blocks
            .iter()
            .map(Block::plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Block-level markup export used for event bodies.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Paragraph { children } => {
                    out.push_str("<p>");
                    for inline in children {
                        push_inline_html(&mut out, inline);
                    }
                    out.push_str("</p>");
                }
                Block::TimestampDivider { timestamp } => {
                    let shown = timestamp.format(TIMESTAMP_FORMAT);
                    out.push_str(&format!(
                        "<div class=\"timestamp-divider\" data-timestamp=\"{shown}\">{shown}</div>"
                    ));
                }
            }
        }
        out
    }

    /// Text runs with their marks, tag/mention markers removed, paragraphs
    /// joined by a single space and outer whitespace trimmed.
    pub fn inline_runs(&self) -> Vec<(String, Marks)> {
        let mut runs: Vec<(String, Marks)> = Vec::new();
        for (index, block) in self.blocks.iter().enumerate() {
            let Block::Paragraph { children } = block else {
                continue;
            };
            if index > 0 && !runs.is_empty() {
                runs.push((" ".to_string(), Marks::default()));
            }
            for inline in children {
                if let Inline::Text { text, marks } = inline {
                    runs.push((text.clone(), *marks));
                }
            }
        }

        if let Some(first) = runs.first_mut() {
            first.0 = first.0.trim_start().to_string();
        }
        if let Some(last) = runs.last_mut() {
            last.0 = last.0.trim_end().to_string();
        }
        runs.retain(|(text, _)| !text.is_empty());
        runs
    }

    /// Tag ids referenced by tag markers in the first paragraph.
    pub fn tag_ids(&self) -> Vec<String> {
        self.first_paragraph()
            .map(|children| {
                children
                    .iter()
                    .filter_map(|inline| match inline {
                        Inline::Tag { tag_id, .. } => Some(tag_id.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn first_paragraph(&self) -> Option<&Vec<Inline>> {
        self.blocks.iter().find_map(|block| match block {
            Block::Paragraph { children } => Some(children),
            Block::TimestampDivider { .. } => None,
        })
    }

    /// Mutable access to the first paragraph, inserting one at the top if the
    /// document has none.
    pub fn first_paragraph_mut(&mut self) -> &mut Vec<Inline> {
        let index = match self
            .blocks
            .iter()
            .position(|block| matches!(block, Block::Paragraph { .. }))
        {
            Some(index) => index,
            None => {
                self.blocks.insert(0, Block::Paragraph { children: Vec::new() });
                0
            }
        };
        match &mut self.blocks[index] {
            Block::Paragraph { children } => children,
            Block::TimestampDivider { .. } => unreachable!("index points at a paragraph"),
        }
    }
}

/// Render styled text runs as inline markup (no block elements).
pub fn runs_to_markup(runs: &[(String, Marks)]) -> String {
    let mut out = String::new();
    for (text, marks) in runs {
        push_marked(&mut out, text, marks);
    }
    out
}

fn push_inline_html(out: &mut String, inline: &Inline) {
    match inline {
        Inline::Text { text, marks } => {
            let escaped = escape_html(text).replace('\n', "<br>");
            wrap_marks(out, &escaped, marks);
        }
        Inline::Tag { tag_id, label } => {
            let shown = label.as_deref().unwrap_or(tag_id);
            out.push_str(&format!(
                "<span class=\"tag\" data-tag-id=\"{}\">#{}</span>",
                escape_html(tag_id),
                escape_html(shown)
            ));
        }
        Inline::Mention { target_id, label } => {
            out.push_str(&format!(
                "<span class=\"mention\" data-target-id=\"{}\">@{}</span>",
                escape_html(target_id),
                escape_html(label)
            ));
        }
    }
}

fn push_marked(out: &mut String, text: &str, marks: &Marks) {
    wrap_marks(out, &escape_html(text), marks);
}

fn wrap_marks(out: &mut String, escaped: &str, marks: &Marks) {
    let tags: Vec<&str> = [
        (marks.bold, "b"),
        (marks.italic, "i"),
        (marks.underline, "u"),
        (marks.strikethrough, "s"),
    ]
    .into_iter()
    .filter_map(|(on, tag)| on.then_some(tag))
    .collect();

    for tag in &tags {
        out.push_str(&format!("<{tag}>"));
    }
    out.push_str(escaped);
    for tag in tags.iter().rev() {
        out.push_str(&format!("</{tag}>"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_legacy_slate_array() {
        let value = json!([
            { "type": "paragraph", "children": [{ "text": "Hello " }, { "text": "world", "bold": true }] }
        ]);
        let doc = RichDoc::from_value(&value).unwrap();
        assert_eq!(doc.plain_text(), "Hello world");
        assert_eq!(doc.to_html(), "<p>Hello <b>world</b></p>");
    }

    #[test]
    fn serde_roundtrip_uses_tagged_blocks() {
        let doc = RichDoc::from_blocks(vec![
            Block::TimestampDivider {
                timestamp: parse_timestamp("2025-10-19 10:21:18").unwrap(),
            },
            Block::paragraph("note"),
        ]);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["blocks"][0]["type"], "timestamp-divider");
        let back: RichDoc = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn json_string_document_is_accepted() {
        let raw = r#"[{"type":"paragraph","children":[{"text":"inside a string"}]}]"#;
        let doc: RichDoc = serde_json::from_value(Value::String(raw.into())).unwrap();
        assert_eq!(doc.plain_text(), "inside a string");
    }

    #[test]
    fn inline_runs_skip_tags_and_trim() {
        let doc = RichDoc::from_blocks(vec![Block::Paragraph {
            children: vec![
                Inline::text("  Review "),
                Inline::tag("tag_work"),
                Inline::styled("budget ", Marks { italic: true, ..Marks::default() }),
            ],
        }]);
        let runs = doc.inline_runs();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].0, "Review ");
        assert_eq!(runs[1].0, "budget");
        assert_eq!(runs_to_markup(&runs), "Review <i>budget</i>");
    }

    #[test]
    fn emptiness_ignores_whitespace_only_text() {
        assert!(RichDoc::default().is_empty());
        assert!(RichDoc::from_plain("   ").is_empty());
        assert!(!RichDoc::from_plain("x").is_empty());
    }

    #[test]
    fn first_paragraph_is_created_when_missing() {
        let mut doc = RichDoc::from_blocks(vec![Block::TimestampDivider {
            timestamp: parse_timestamp("2025-01-01 09:00:00").unwrap(),
        }]);
        doc.first_paragraph_mut().push(Inline::tag("tag_a"));
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(doc.tag_ids(), vec!["tag_a".to_string()]);
    }
}
