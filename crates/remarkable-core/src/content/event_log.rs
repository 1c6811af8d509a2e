//! Event body/log: one structured document with regenerable exports.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::markup::{looks_like_markup, markup_to_lines, strip_markup};
use super::rich::{Block, RichDoc, TIMESTAMP_FORMAT};

/// Per-body remote sync state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSyncState {
    #[default]
    Pending,
    Synced,
    Error,
}

/// Earlier content of a body, kept when an update changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogVersion {
    pub content_hash: String,
    pub document: RichDoc,
    pub recorded_at: DateTime<Utc>,
}

/// Canonical body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLog {
    pub document: RichDoc,
    pub html: String,
    pub plain_text: String,
    pub content_hash: String,
    #[serde(default)]
    pub versions: Vec<EventLogVersion>,
    #[serde(default)]
    pub sync_state: LogSyncState,
}

impl EventLog {
    /// Build a log whose exports and hash are derived from `document`.
    pub fn from_document(document: RichDoc) -> Self {
        EventLog {
            html: document.to_html(),
            plain_text: document.plain_text(),
            content_hash: content_hash(&document),
            document,
            versions: Vec::new(),
            sync_state: LogSyncState::Pending,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.document.is_empty()
    }

    /// Append the pre-update content to `versions` when the hash changed,
    /// keeping at most `limit` entries.
    pub fn record_previous(&mut self, previous: &EventLog, at: DateTime<Utc>, limit: usize) {
        self.versions = previous.versions.clone();
        if previous.content_hash == self.content_hash || previous.is_empty() {
            return;
        }
        self.versions.push(EventLogVersion {
            content_hash: previous.content_hash.clone(),
            document: previous.document.clone(),
            recorded_at: at,
        });
        if self.versions.len() > limit {
            let excess = self.versions.len() - limit;
            self.versions.drain(..excess);
        }
    }
}

/// SHA-256 over the document's canonical JSON, hex encoded.
pub fn content_hash(document: &RichDoc) -> String {
    let bytes = serde_json::to_vec(document).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// An EventLog with any subset of its fields. Legacy field names are accepted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialEventLog {
    #[serde(default, alias = "content", alias = "slateJson")]
    pub document: Option<RichDoc>,
    #[serde(default, alias = "descriptionHtml")]
    pub html: Option<String>,
    #[serde(default, alias = "descriptionPlainText")]
    pub plain_text: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub versions: Vec<EventLogVersion>,
    #[serde(default)]
    pub sync_state: Option<LogSyncState>,
}

/// Body input, classified once from its raw shape.
#[derive(Debug, Clone, PartialEq)]
pub enum EventLogInput {
    Canonical(PartialEventLog),
    Document(RichDoc),
    Markup(String),
    PlainText(String),
    Unknown(Value),
}

const CANONICAL_KEYS: &[&str] = &[
    "document",
    "content",
    "slateJson",
    "html",
    "descriptionHtml",
    "plainText",
    "descriptionPlainText",
];

const TEXT_KEYS: &[&str] = &["plainText", "text", "description", "body", "value", "html"];

impl EventLogInput {
    /// The only place the raw shape is inspected.
    pub fn classify(value: Value) -> Self {
        let canonical = value
            .as_object()
            .is_some_and(|map| CANONICAL_KEYS.iter().any(|k| map.contains_key(*k)));
        match value {
            Value::String(raw) => Self::classify_str(raw),
            Value::Object(_) if canonical => {
                match serde_json::from_value::<PartialEventLog>(value.clone()) {
                    Ok(partial) => EventLogInput::Canonical(partial),
                    Err(_) => match RichDoc::from_value(&value) {
                        Some(doc) => EventLogInput::Document(doc),
                        None => EventLogInput::Unknown(value),
                    },
                }
            }
            Value::Object(_) | Value::Array(_) => match RichDoc::from_value(&value) {
                Some(doc) => EventLogInput::Document(doc),
                None => EventLogInput::Unknown(value),
            },
            other => EventLogInput::Unknown(other),
        }
    }

    pub fn classify_str(raw: String) -> Self {
        if let Some(doc) = RichDoc::from_json_str(&raw) {
            EventLogInput::Document(doc)
        } else if looks_like_markup(&raw) {
            EventLogInput::Markup(raw)
        } else {
            EventLogInput::PlainText(raw)
        }
    }
}

impl From<EventLog> for EventLogInput {
    fn from(log: EventLog) -> Self {
        EventLogInput::Canonical(PartialEventLog {
            document: Some(log.document),
            html: Some(log.html),
            plain_text: Some(log.plain_text),
            content_hash: Some(log.content_hash),
            versions: log.versions,
            sync_state: Some(log.sync_state),
        })
    }
}

impl From<&str> for EventLogInput {
    fn from(raw: &str) -> Self {
        EventLogInput::classify_str(raw.to_string())
    }
}

/// Canonicalize a body. `fallback_plain` repairs a canonical log whose
/// document is empty.
pub fn normalize_event_log(input: EventLogInput, fallback_plain: Option<&str>) -> EventLog {
    match input {
        EventLogInput::Canonical(partial) => from_canonical(partial, fallback_plain),
        EventLogInput::Document(doc) => EventLog::from_document(doc),
        EventLogInput::Markup(markup) => EventLog::from_document(document_from_markup(&markup)),
        EventLogInput::PlainText(text) => EventLog::from_document(document_from_plain(&text)),
        EventLogInput::Unknown(value) => {
            let text = extract_text(&value);
            warn!(
                target: "remarkable::data_quality",
                recovered = text.is_some(),
                "unrecognized event log shape"
            );
            match text {
                Some(text) => normalize_event_log(EventLogInput::classify_str(text), None),
                None => EventLog::from_document(RichDoc::from_plain("")),
            }
        }
    }
}

fn from_canonical(partial: PartialEventLog, fallback_plain: Option<&str>) -> EventLog {
    let PartialEventLog {
        document,
        html,
        plain_text,
        content_hash: _,
        versions,
        sync_state,
    } = partial;

    let fallback = fallback_plain.filter(|text| !text.trim().is_empty());

    let (document, regenerated) = match document {
        Some(doc) if !doc.is_empty() => (doc, false),
        supplied => {
            if let Some(text) = fallback {
                warn!(
                    target: "remarkable::data_quality",
                    "event log document empty, regenerated from fallback text"
                );
                (document_from_plain(text), true)
            } else if let Some(markup) = html
                .as_deref()
                .filter(|h| !strip_markup(h).trim().is_empty())
            {
                warn!(target: "remarkable::data_quality", "event log document rebuilt from markup");
                (document_from_markup(markup), true)
            } else if let Some(text) = plain_text.as_deref().filter(|t| !t.trim().is_empty()) {
                warn!(target: "remarkable::data_quality", "event log document rebuilt from plain text");
                (document_from_plain(text), true)
            } else {
                (supplied.unwrap_or_else(|| RichDoc::from_plain("")), true)
            }
        }
    };

    let mut log = EventLog::from_document(document);
    if !regenerated {
        // Exports present alongside a real document are kept as supplied.
        if let Some(html) = html.filter(|h| !h.is_empty()) {
            log.html = html;
        }
        if let Some(text) = plain_text.filter(|t| !t.is_empty()) {
            log.plain_text = text;
        }
    }
    log.versions = versions;
    log.sync_state = sync_state.unwrap_or_default();
    log
}

/// Plain text with embedded `YYYY-MM-DD HH:MM:SS` lines becomes divider and
/// paragraph pairs; anything else becomes a single paragraph.
pub fn document_from_plain(text: &str) -> RichDoc {
    let lines: Vec<&str> = text.lines().collect();
    split_timestamped(&lines).unwrap_or_else(|| RichDoc::from_plain(text))
}

fn document_from_markup(markup: &str) -> RichDoc {
    let lines = markup_to_lines(markup);
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    if let Some(doc) = split_timestamped(&refs) {
        return doc;
    }
    if refs.is_empty() {
        return RichDoc::from_plain("");
    }
    RichDoc::from_blocks(refs.into_iter().map(Block::paragraph).collect())
}

/// A line that opens with a display-format timestamp, optionally followed by
/// annotation text (e.g. elapsed-time hints).
fn timestamp_line(line: &str) -> Option<NaiveDateTime> {
    let line = line.trim();
    let head = line.get(..19)?;
    let rest = &line[19..];
    if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
        return None;
    }
    NaiveDateTime::parse_from_str(head, TIMESTAMP_FORMAT).ok()
}

fn split_timestamped(lines: &[&str]) -> Option<RichDoc> {
    if !lines.iter().any(|line| timestamp_line(line).is_some()) {
        return None;
    }

    let mut blocks = Vec::new();
    let mut pending: Vec<&str> = Vec::new();
    let mut seen_divider = false;

    let flush = |pending: &mut Vec<&str>, blocks: &mut Vec<Block>, force: bool| {
        let text = pending.join("\n").trim().to_string();
        if force || !text.is_empty() {
            blocks.push(Block::paragraph(text));
        }
        pending.clear();
    };

    for line in lines {
        match timestamp_line(line) {
            Some(timestamp) => {
                flush(&mut pending, &mut blocks, seen_divider);
                blocks.push(Block::TimestampDivider { timestamp });
                seen_divider = true;
            }
            None => pending.push(line),
        }
    }
    flush(&mut pending, &mut blocks, true);

    warn!(
        target: "remarkable::data_quality",
        dividers = blocks
            .iter()
            .filter(|b| matches!(b, Block::TimestampDivider { .. }))
            .count(),
        "split timestamped plain text into divider blocks"
    );
    Some(RichDoc::from_blocks(blocks))
}

fn extract_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => TEXT_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(extract_text),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_text_becomes_single_block() {
        let log = normalize_event_log("just a note\nsecond line".into(), None);
        assert_eq!(log.document.blocks.len(), 1);
        assert_eq!(log.plain_text, "just a note\nsecond line");
        assert_eq!(log.content_hash.len(), 64);
    }

    #[test]
    fn timestamp_lines_split_into_dividers() {
        let text = "2025-10-19 10:21:18\nstarted draft\n2025-10-19 11:05:00 | 44min later\nsent for review";
        let log = normalize_event_log(text.into(), None);
        let kinds: Vec<bool> = log
            .document
            .blocks
            .iter()
            .map(|b| matches!(b, Block::TimestampDivider { .. }))
            .collect();
        assert_eq!(kinds, vec![true, false, true, false]);
        assert!(log.plain_text.starts_with("2025-10-19 10:21:18\nstarted draft"));
    }

    #[test]
    fn markup_is_parsed_into_paragraphs() {
        let log = normalize_event_log("<p>first</p><p>second</p>".into(), None);
        assert_eq!(log.document.blocks.len(), 2);
        assert_eq!(log.plain_text, "first\nsecond");
    }

    #[test]
    fn exported_markup_roundtrips_dividers() {
        let original = normalize_event_log("2025-01-02 08:00:00\nmorning".into(), None);
        let back = normalize_event_log(original.html.as_str().into(), None);
        assert_eq!(back.document, original.document);
        assert_eq!(back.content_hash, original.content_hash);
    }

    #[test]
    fn canonical_with_empty_document_uses_fallback() {
        let input = EventLogInput::classify(json!({
            "document": { "blocks": [] },
            "html": "",
            "plainText": ""
        }));
        let log = normalize_event_log(input, Some("from remote"));
        assert_eq!(log.plain_text, "from remote");
    }

    #[test]
    fn canonical_missing_views_are_regenerated() {
        let doc = RichDoc::from_plain("body");
        let input = EventLogInput::classify(json!({ "document": doc }));
        let log = normalize_event_log(input, None);
        assert_eq!(log.html, "<p>body</p>");
        assert_eq!(log.plain_text, "body");
    }

    #[test]
    fn legacy_field_names_are_understood() {
        let input = EventLogInput::classify(json!({
            "descriptionHtml": "<p>legacy</p>",
            "descriptionPlainText": "legacy"
        }));
        assert!(matches!(input, EventLogInput::Canonical(_)));
        assert_eq!(normalize_event_log(input, None).plain_text, "legacy");
    }

    #[test]
    fn document_string_is_classified() {
        let raw = r#"[{"type":"paragraph","children":[{"text":"slate"}]}]"#;
        assert!(matches!(
            EventLogInput::classify(Value::String(raw.into())),
            EventLogInput::Document(_)
        ));
    }

    #[test]
    fn unknown_objects_yield_best_effort_text() {
        let log = normalize_event_log(EventLogInput::classify(json!({ "text": "salvaged" })), None);
        assert_eq!(log.plain_text, "salvaged");

        let log = normalize_event_log(EventLogInput::classify(json!(true)), None);
        assert!(log.is_empty());
    }

    #[test]
    fn hash_tracks_document_only() {
        let a = normalize_event_log("same".into(), None);
        let mut b = normalize_event_log("same".into(), None);
        b.sync_state = LogSyncState::Synced;
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a.content_hash, normalize_event_log("other".into(), None).content_hash);
    }

    #[test]
    fn version_history_is_bounded() {
        let now = Utc::now();
        let mut log = normalize_event_log("v0".into(), None);
        for i in 1..=5 {
            let mut next = normalize_event_log(format!("v{i}").as_str().into(), None);
            next.record_previous(&log, now, 3);
            log = next;
        }
        assert_eq!(log.versions.len(), 3);
        assert_eq!(log.versions[0].document.plain_text(), "v2");
        assert_eq!(log.versions[2].document.plain_text(), "v4");
    }
}
