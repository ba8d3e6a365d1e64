//! crates/blog_pipeline_core/src/markdown.rs
//!
//! Post-processing for generated article text: unwraps the reply, lifts the title and
//! subtitle out of the markdown, splits off the trailing metadata block, and counts
//! words and characters the same way the scorer does.

use regex::Regex;
use std::sync::LazyLock;

static MARKDOWN_SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#*`>\[\]()]").expect("static regex"));

static FIRST_H1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("static regex"));

static METADATA_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"---[ \t]*\r?\nmeta_description:[ \t]*(.+)\r?\nprimary_keywords:[ \t]*\[([^\]]+)\][ \t]*\r?\n---",
    )
    .expect("static regex")
});

const FENCE: &str = "```";
const FENCE_LANGS: [&str; 2] = ["markdown", "md"];

/// The metadata the writer is asked to append to every article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftMetadata {
    pub meta_description: String,
    pub primary_keywords: Vec<String>,
}

/// A generated article, split into the pieces a Draft stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedDraft {
    pub title: String,
    pub subtitle: Option<String>,
    /// Markdown body without the metadata block.
    pub content: String,
    pub word_count: usize,
    pub char_count: usize,
    /// `None` when the block was missing or did not match the fixed format.
    pub metadata: Option<DraftMetadata>,
}

/// Removes the characters that carry markdown syntax.
pub fn strip_markdown_syntax(text: &str) -> String {
    MARKDOWN_SYNTAX.replace_all(text, "").into_owned()
}

/// Whitespace-separated words after markdown syntax is removed.
pub fn count_words(text: &str) -> usize {
    strip_markdown_syntax(text).split_whitespace().count()
}

/// Non-whitespace characters after markdown syntax is removed.
pub fn count_chars(text: &str) -> usize {
    strip_markdown_syntax(text)
        .chars()
        .filter(|c| !c.is_whitespace())
        .count()
}

/// Splits a generated reply into title, subtitle, body, counts and metadata.
pub fn process_draft(raw: &str, fallback_title: &str) -> ProcessedDraft {
    let unwrapped = unwrap_fence(raw);

    let (content, metadata) = match METADATA_BLOCK.captures(unwrapped) {
        Some(caps) => {
            let metadata = parse_metadata(&caps[1], &caps[2]);
            let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let mut body = String::with_capacity(unwrapped.len());
            body.push_str(&unwrapped[..whole.start]);
            body.push_str(&unwrapped[whole.end..]);
            (body.trim().to_string(), metadata)
        }
        None => (unwrapped.trim().to_string(), None),
    };

    let title = FIRST_H1
        .captures(&content)
        .map(|caps| caps[1].trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_title.trim().to_string());

    let subtitle = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string);

    ProcessedDraft {
        word_count: count_words(&content),
        char_count: count_chars(&content),
        title,
        subtitle,
        content,
        metadata,
    }
}

/// Returns the body of a ```markdown fence if the reply is wrapped in one.
///
/// The closing fence is the last one in the text, so code blocks inside the article
/// survive.
fn unwrap_fence(raw: &str) -> &str {
    let Some(open) = raw.find(FENCE) else {
        return raw;
    };
    let after_ticks = &raw[open + FENCE.len()..];
    let Some(lang) = FENCE_LANGS.iter().find(|lang| after_ticks.starts_with(**lang)) else {
        return raw;
    };
    let after_lang = &after_ticks[lang.len()..];
    let body_start = match after_lang.find('\n') {
        Some(newline) => newline + 1,
        None => return raw,
    };
    let body = &after_lang[body_start..];
    match body.rfind(FENCE) {
        Some(close) => &body[..close],
        None => body,
    }
}

fn parse_metadata(description: &str, keywords: &str) -> Option<DraftMetadata> {
    let meta_description = description.trim().to_string();
    if meta_description.is_empty() {
        return None;
    }
    let primary_keywords = keywords
        .split(',')
        .map(|k| k.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    Some(DraftMetadata {
        meta_description,
        primary_keywords,
    })
}
