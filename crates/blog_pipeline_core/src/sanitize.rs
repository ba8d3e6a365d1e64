//! crates/blog_pipeline_core/src/sanitize.rs
//!
//! Neutralizes prompt-injection text before it is embedded in a provider prompt.
//!
//! Two entry points share one sweep:
//! - `sanitize_user` for fields typed by an authenticated user (keywords, audience,
//!   outline edits, tags).
//! - `sanitize_external` for text fetched from the outside world. Its output is always
//!   enclosed in an `<external_content>` delimiter pair, and the delimiters themselves are
//!   part of the pattern table, so a document can never close the block early.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// Marker written in place of a match in user-supplied text.
pub const USER_MARKER: &str = "[removed]";
/// Marker written in place of a match in external text.
pub const EXTERNAL_MARKER: &str = "[content removed]";

const EXTERNAL_OPEN: &str = "<external_content>";
const EXTERNAL_CLOSE: &str = "</external_content>";
const ELLIPSIS: &str = "...";

/// Known instruction-override and role-injection patterns, matched case-insensitively.
/// Each entry is `(name, pattern)`; the name only shows up in tests and debugging.
pub const INJECTION_PATTERNS: &[(&str, &str)] = &[
    ("ignore_previous", r"ignore\s+(all\s+)?(previous|above|prior)\s+instructions?"),
    ("forget_instructions", r"forget\s+(your|the|all)?\s*(previous\s+)?instructions?"),
    ("role_reassignment", r"you\s+are\s+now\s+(a|an|the)\s+"),
    ("system_tag", r"\[SYSTEM\]"),
    ("user_tag", r"\[USER\]"),
    ("assistant_tag", r"\[ASSISTANT\]"),
    ("im_start", r"<\|im_start\|>"),
    ("im_end", r"<\|im_end\|>"),
    ("end_of_text", r"<\|endoftext\|>"),
    ("dashed_system_banner", r"---+\s*SYSTEM\s*---+"),
    ("double_system_banner", r"===+\s*SYSTEM\s*===+"),
    ("new_instructions", r"new\s+instructions?\s*:"),
    ("override_instructions", r"override\s+(previous\s+)?instructions?"),
    ("disregard_instructions", r"disregard\s+(previous\s+|the\s+)?instructions?"),
    ("reveal_prompt", r"reveal\s+(your\s+)?(system\s+)?prompt"),
    ("print_secrets", r"print\s+(the\s+)?(api[_\s]key|anthropic|openai)"),
    ("data_delimiter", r"<\s*/?\s*external_content\s*>"),
];

static COMPILED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    INJECTION_PATTERNS
        .iter()
        .map(|(name, pattern)| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .unwrap_or_else(|e| panic!("injection pattern '{name}' is invalid: {e}"))
        })
        .collect()
});

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("static regex"));

/// Cleans a user-typed field and caps it at `max_len` characters (ellipsis included).
pub fn sanitize_user(text: &str, max_len: usize) -> String {
    sweep(text, max_len, USER_MARKER)
}

/// Cleans fetched text, caps it at `max_len` characters and encloses it as data.
///
/// Input that is already enclosed is unwrapped first, so applying this twice yields the
/// same result as applying it once.
pub fn sanitize_external(text: &str, max_len: usize) -> String {
    let inner = unwrap_external(text).unwrap_or(text);
    let cleaned = sweep(inner, max_len, EXTERNAL_MARKER);
    if cleaned.is_empty() {
        return cleaned;
    }
    format!("{EXTERNAL_OPEN}\n{cleaned}\n{EXTERNAL_CLOSE}")
}

/// Cleans a tag list: at most 20 entries of at most `max_item_len` characters, empties dropped.
pub fn sanitize_tags(tags: &[String], max_item_len: usize) -> Vec<String> {
    tags.iter()
        .take(20)
        .map(|tag| sanitize_user(tag, max_item_len))
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Returns true if `text` still contains any known injection pattern.
pub fn contains_injection(text: &str) -> bool {
    COMPILED_PATTERNS.iter().any(|re| re.is_match(text))
}

fn unwrap_external(text: &str) -> Option<&str> {
    text.trim()
        .strip_prefix(EXTERNAL_OPEN)?
        .strip_suffix(EXTERNAL_CLOSE)
}

fn sweep(text: &str, max_len: usize, marker: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    // Loose cut first so a huge page is not swept in full.
    let loose: String = text.chars().take(max_len.saturating_mul(2)).collect();
    let stripped = strip_control_chars(&loose);

    let mut result = stripped;
    for re in COMPILED_PATTERNS.iter() {
        if re.is_match(&result) {
            result = re.replace_all(&result, marker).into_owned();
        }
    }

    truncate_with_ellipsis(&result, max_len)
}

fn strip_control_chars(text: &str) -> String {
    let without: String = text.chars().filter(|c| *c != '\0' && *c != '\r').collect();
    EXCESS_NEWLINES
        .replace_all(&without, "\n\n")
        .trim()
        .to_string()
}

fn truncate_with_ellipsis(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let keep = max_len.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
