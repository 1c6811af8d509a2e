//! Markup helpers: escaping, stripping and line extraction.

use regex::Regex;
use std::sync::OnceLock;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"))
}

fn line_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>|</li\s*>|</h[1-6]\s*>").expect("static regex")
    })
}

fn markup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</?(p|div|br|span|b|i|u|s|strong|em|ul|ol|li|h[1-6])(\s[^>]*)?/?>")
            .expect("static regex")
    })
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Remove every tag and decode entities. Line structure is not preserved.
pub fn strip_markup(markup: &str) -> String {
    decode_entities(&tag_re().replace_all(markup, ""))
}

/// Plain lines of a markup fragment, split on line breaks and block ends.
/// Blank lines are dropped.
pub fn markup_to_lines(markup: &str) -> Vec<String> {
    let broken = line_break_re().replace_all(markup, "\n");
    strip_markup(&broken)
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Heuristic: does this string contain recognizable markup elements?
pub fn looks_like_markup(text: &str) -> bool {
    markup_re().is_match(text)
}
