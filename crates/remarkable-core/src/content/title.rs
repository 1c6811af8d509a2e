//! Three-representation event titles.

use serde::{Deserialize, Serialize};

use super::markup::{escape_html, strip_markup};
use super::rich::{runs_to_markup, Inline, RichDoc};

/// Canonical title: `rich` is the source of truth, `styled` and `plain` are
/// derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTitle {
    pub rich: RichDoc,
    pub styled: String,
    pub plain: String,
}

/// Any subset of the three title fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleParts {
    #[serde(default, alias = "richTitle", alias = "fullTitle", skip_serializing_if = "Option::is_none")]
    pub rich: Option<RichDoc>,
    #[serde(default, alias = "styledTitle", alias = "colorTitle", skip_serializing_if = "Option::is_none")]
    pub styled: Option<String>,
    #[serde(default, alias = "plainTitle", alias = "simpleTitle", skip_serializing_if = "Option::is_none")]
    pub plain: Option<String>,
}

/// Title as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TitleInput {
    Plain(String),
    Parts(TitleParts),
}

impl From<&str> for TitleInput {
    fn from(value: &str) -> Self {
        TitleInput::Plain(value.to_string())
    }
}

impl From<String> for TitleInput {
    fn from(value: String) -> Self {
        TitleInput::Plain(value)
    }
}

impl From<EventTitle> for TitleInput {
    fn from(title: EventTitle) -> Self {
        TitleInput::Parts(TitleParts {
            rich: Some(title.rich),
            styled: Some(title.styled),
            plain: Some(title.plain),
        })
    }
}

/// Resolve a title input into all three representations, then reconcile tag
/// markers in the rich document against `tags`.
///
/// `previous_tags` is the tag set the title was last normalized with; tags in
/// it but absent from `tags` lose their marker. Every tag in `tags` ends up
/// with a marker.
pub fn normalize_title(
    input: TitleInput,
    tags: Option<&[String]>,
    previous_tags: Option<&[String]>,
) -> EventTitle {
    let mut title = match input {
        TitleInput::Plain(plain) => from_plain(plain),
        TitleInput::Parts(parts) => from_parts(parts),
    };

    if let Some(tags) = tags {
        sync_tag_markers(&mut title.rich, tags, previous_tags);
    }
    title
}

fn from_plain(plain: String) -> EventTitle {
    EventTitle {
        rich: RichDoc::from_plain(&plain),
        styled: escape_html(&plain),
        plain,
    }
}

fn from_parts(parts: TitleParts) -> EventTitle {
    match parts {
        TitleParts {
            rich: Some(rich),
            styled,
            plain,
        } => {
            let runs = rich.inline_runs();
            let styled = styled.unwrap_or_else(|| runs_to_markup(&runs));
            let plain = plain.unwrap_or_else(|| runs.iter().map(|(text, _)| text.as_str()).collect());
            EventTitle { rich, styled, plain }
        }
        // Styling does not survive the styled -> rich direction.
        TitleParts {
            rich: None,
            styled: Some(styled),
            plain,
        } => {
            let plain = plain.unwrap_or_else(|| strip_markup(&styled).trim().to_string());
            EventTitle {
                rich: RichDoc::from_plain(&plain),
                styled,
                plain,
            }
        }
        TitleParts {
            rich: None,
            styled: None,
            plain,
        } => from_plain(plain.unwrap_or_default()),
    }
}

fn sync_tag_markers(rich: &mut RichDoc, tags: &[String], previous_tags: Option<&[String]>) {
    let removed: Vec<&String> = previous_tags
        .unwrap_or_default()
        .iter()
        .filter(|tag| !tags.contains(tag))
        .collect();
    let present = rich.tag_ids();
    let added: Vec<&String> = tags
        .iter()
        .filter(|tag| !present.contains(tag))
        .collect();

    if removed.is_empty() && added.is_empty() {
        return;
    }

    let block = rich.first_paragraph_mut();
    block.retain(|inline| match inline {
        Inline::Tag { tag_id, .. } => !removed.contains(&tag_id),
        _ => true,
    });
    for tag in added {
        block.push(Inline::tag(tag.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::rich::{Block, Marks};

    fn tags(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_string_is_plain() {
        let title = normalize_title("Team <sync>".into(), None, None);
        assert_eq!(title.plain, "Team <sync>");
        assert_eq!(title.styled, "Team &lt;sync&gt;");
        assert_eq!(title.rich.plain_text(), "Team <sync>");
    }

    #[test]
    fn rich_only_derives_styled_and_plain() {
        let rich = RichDoc::from_blocks(vec![Block::Paragraph {
            children: vec![
                Inline::styled("Ship", Marks { bold: true, ..Marks::default() }),
                Inline::text(" release "),
                Inline::tag("tag_work"),
            ],
        }]);
        let title = normalize_title(
            TitleInput::Parts(TitleParts {
                rich: Some(rich),
                ..TitleParts::default()
            }),
            None,
            None,
        );
        assert_eq!(title.styled, "<b>Ship</b> release");
        assert_eq!(title.plain, "Ship release");
    }

    #[test]
    fn styled_only_loses_styling_in_rich() {
        let title = normalize_title(
            TitleInput::Parts(TitleParts {
                styled: Some("<b>Bold</b> &amp; plain".into()),
                ..TitleParts::default()
            }),
            None,
            None,
        );
        assert_eq!(title.plain, "Bold & plain");
        assert_eq!(title.styled, "<b>Bold</b> &amp; plain");
        assert_eq!(title.rich, RichDoc::from_plain("Bold & plain"));
    }

    #[test]
    fn supplied_fields_are_never_overwritten() {
        let title = normalize_title(
            TitleInput::Parts(TitleParts {
                rich: None,
                styled: Some("<i>x</i>".into()),
                plain: Some("something else".into()),
            }),
            None,
            None,
        );
        assert_eq!(title.styled, "<i>x</i>");
        assert_eq!(title.plain, "something else");
    }

    #[test]
    fn tags_are_added_once() {
        let wanted = tags(&["tag_a", "tag_b"]);
        let title = normalize_title("Plan".into(), Some(&wanted), None);
        assert_eq!(title.rich.tag_ids(), wanted);

        let again = normalize_title(title.clone().into(), Some(&wanted), None);
        assert_eq!(again, title);
    }

    #[test]
    fn removed_tags_lose_markers_and_formatting_survives() {
        let rich = RichDoc::from_blocks(vec![Block::Paragraph {
            children: vec![
                Inline::styled("Focus", Marks { underline: true, ..Marks::default() }),
                Inline::tag("tag_a"),
                Inline::tag("tag_b"),
            ],
        }]);
        let previous = tags(&["tag_a", "tag_b"]);
        let current = tags(&["tag_b", "tag_c"]);
        let title = normalize_title(
            TitleInput::Parts(TitleParts {
                rich: Some(rich),
                ..TitleParts::default()
            }),
            Some(&current),
            Some(&previous),
        );
        assert_eq!(title.rich.tag_ids(), tags(&["tag_b", "tag_c"]));
        assert_eq!(title.styled, "<u>Focus</u>");
    }

    #[test]
    fn replaced_title_keeps_markers_for_unchanged_tags() {
        let current = tags(&["tag_x"]);
        let title = normalize_title("B".into(), Some(&current), Some(&current));
        assert_eq!(title.rich.tag_ids(), current);
        assert_eq!(title.plain, "B");
    }

    #[test]
    fn legacy_field_names_deserialize() {
        let input: TitleInput =
            serde_json::from_str(r#"{"simpleTitle":"Lunch","colorTitle":"<b>Lunch</b>"}"#).unwrap();
        let title = normalize_title(input, None, None);
        assert_eq!(title.plain, "Lunch");
        assert_eq!(title.styled, "<b>Lunch</b>");
    }
}
