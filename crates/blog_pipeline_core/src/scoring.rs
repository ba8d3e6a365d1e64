//! crates/blog_pipeline_core/src/scoring.rs
//!
//! The content-quality scorer. Every function here is pure: it reads a finished draft
//! and a keyword list and produces the five sub-metrics, their weighted total, and a
//! short prioritized list of suggestions.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

use crate::domain::{
    ContentLengthMetric, DensityStatus, HeadingStatus, HeadingStructureMetric,
    KeywordDensityMetric, KeywordStat, LengthStatus, Priority, ReadabilityMetric,
    ReadabilityStatus, SeoMetrics, Suggestion, TitleMetric, TitleStatus,
};
use crate::markdown::strip_markdown_syntax;

/// Hard cap on a stored meta description.
pub const META_DESCRIPTION_MAX: usize = 160;
/// Length of the deterministic fallback description.
pub const META_FALLBACK_LEN: usize = 155;
/// Suggestions returned per analysis.
pub const MAX_SUGGESTIONS: usize = 5;

const WEIGHT_KEYWORD: f64 = 0.25;
const WEIGHT_READABILITY: f64 = 0.20;
const WEIGHT_LENGTH: f64 = 0.20;
const WEIGHT_HEADINGS: f64 = 0.20;
const WEIGHT_TITLE: f64 = 0.15;

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?。]+").expect("static regex"));
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\n+").expect("static regex"));
static H2: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^## .+$").expect("static regex"));
static H3: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^### .+$").expect("static regex"));

/// The outcome of scoring one draft.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub metrics: SeoMetrics,
    pub suggestions: Vec<Suggestion>,
}

/// Scores a draft against `keywords`.
pub fn score(title: &str, content: &str, keywords: &[String]) -> ScoreReport {
    let keyword_density = keyword_density(content, keywords);
    let readability = readability(content);
    let content_length = content_length(content);
    let heading_structure = heading_structure(content, keywords);
    let title_optimization = title_optimization(title, keywords);

    let mut metrics = SeoMetrics {
        overall_score: 0,
        keyword_density,
        readability,
        content_length,
        heading_structure,
        title_optimization,
    };
    metrics.overall_score = overall_score(&metrics);
    let suggestions = suggestions(&metrics);

    ScoreReport {
        metrics,
        suggestions,
    }
}

/// Weighted sum of the five sub-scores, rounded.
pub fn overall_score(metrics: &SeoMetrics) -> u32 {
    let total = f64::from(metrics.keyword_density.score) * WEIGHT_KEYWORD
        + f64::from(metrics.readability.score) * WEIGHT_READABILITY
        + f64::from(metrics.content_length.score) * WEIGHT_LENGTH
        + f64::from(metrics.heading_structure.score) * WEIGHT_HEADINGS
        + f64::from(metrics.title_optimization.score) * WEIGHT_TITLE;
    clamp_score(total)
}

//=========================================================================================
// Keyword density
//=========================================================================================

pub fn keyword_density(content: &str, keywords: &[String]) -> KeywordDensityMetric {
    let clean = strip_markdown_syntax(content).to_lowercase();
    let total_words = clean.split_whitespace().count();
    let keywords: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();

    if keywords.is_empty() || total_words == 0 {
        return KeywordDensityMetric {
            score: 50,
            value: 0.0,
            status: DensityStatus::Low,
            details: Vec::new(),
        };
    }

    let details: Vec<KeywordStat> = keywords
        .iter()
        .map(|keyword| {
            let count = occurrences(&clean, keyword);
            let density = count as f64 / total_words as f64 * 100.0;
            KeywordStat {
                keyword: keyword.to_string(),
                count,
                density: round_to(density, 2),
            }
        })
        .collect();

    let average = details.iter().map(|d| d.density).sum::<f64>() / details.len() as f64;
    let status = if average < 1.0 {
        DensityStatus::Low
    } else if average > 3.0 {
        DensityStatus::High
    } else {
        DensityStatus::Good
    };

    KeywordDensityMetric {
        score: clamp_score(density_score(average)),
        value: round_to(average, 2),
        status,
        details,
    }
}

/// Maps an average density (in percent) to a score that peaks at 2% and stays at or
/// below 30 outside 0.5%..4%.
pub fn density_score(density: f64) -> f64 {
    if density < 0.5 {
        density / 0.5 * 30.0
    } else if density < 1.0 {
        30.0 + (density - 0.5) * 110.0
    } else if density <= 3.0 {
        100.0 - (2.0 - density).abs() * 15.0
    } else if density <= 4.0 {
        85.0 - (density - 3.0) * 55.0
    } else {
        (30.0 - (density - 4.0) * 10.0).max(0.0)
    }
}

fn occurrences(haystack: &str, keyword: &str) -> usize {
    RegexBuilder::new(&regex::escape(&keyword.to_lowercase()))
        .case_insensitive(true)
        .build()
        .map(|re| re.find_iter(haystack).count())
        .unwrap_or(0)
}

//=========================================================================================
// Readability
//=========================================================================================

pub fn readability(content: &str) -> ReadabilityMetric {
    let clean = strip_markdown_syntax(content);
    let sentences = SENTENCE_BREAK
        .split(&clean)
        .filter(|s| !s.trim().is_empty())
        .count();
    let paragraphs = PARAGRAPH_BREAK
        .split(&clean)
        .filter(|p| !p.trim().is_empty())
        .count();
    let words = clean.split_whitespace().count();

    if sentences == 0 || paragraphs == 0 {
        return ReadabilityMetric {
            score: 50,
            avg_sentence_length: 0.0,
            avg_paragraph_length: 0.0,
            status: ReadabilityStatus::NeedsImprovement,
        };
    }

    let avg_sentence = words as f64 / sentences as f64;
    let avg_paragraph = sentences as f64 / paragraphs as f64;

    let mut score = 100.0;
    if avg_sentence < 15.0 {
        score -= (15.0 - avg_sentence) * 1.5;
    } else if avg_sentence > 30.0 {
        score -= (avg_sentence - 30.0) * 2.0;
    }
    if avg_paragraph > 7.0 {
        score -= (avg_paragraph - 7.0) * 5.0;
    } else if avg_paragraph < 2.0 {
        score -= (2.0 - avg_paragraph) * 10.0;
    }

    let score = clamp_score(score);
    let status = match score {
        80.. => ReadabilityStatus::Excellent,
        60..=79 => ReadabilityStatus::Good,
        _ => ReadabilityStatus::NeedsImprovement,
    };

    ReadabilityMetric {
        score,
        avg_sentence_length: round_to(avg_sentence, 1),
        avg_paragraph_length: round_to(avg_paragraph, 1),
        status,
    }
}

//=========================================================================================
// Content length
//=========================================================================================

pub fn content_length(content: &str) -> ContentLengthMetric {
    let clean = strip_markdown_syntax(content);
    let word_count = clean.split_whitespace().count();
    let char_count = clean.chars().filter(|c| !c.is_whitespace()).count();

    let status = if word_count < 1200 {
        LengthStatus::Short
    } else if word_count > 3000 {
        LengthStatus::Long
    } else {
        LengthStatus::Optimal
    };

    ContentLengthMetric {
        score: clamp_score(length_score(word_count)),
        word_count,
        char_count,
        status,
    }
}

/// Full marks for 1500..=2500 words, linear ramps down to 50 at 800 and 3500.
pub fn length_score(word_count: usize) -> f64 {
    let wc = word_count as f64;
    if wc < 800.0 {
        wc / 800.0 * 50.0
    } else if wc < 1500.0 {
        50.0 + (wc - 800.0) / 700.0 * 50.0
    } else if wc <= 2500.0 {
        100.0
    } else if wc <= 3500.0 {
        100.0 - (wc - 2500.0) / 1000.0 * 50.0
    } else {
        (50.0 - (wc - 3500.0) / 100.0).max(20.0)
    }
}

//=========================================================================================
// Headings
//=========================================================================================

pub fn heading_structure(content: &str, keywords: &[String]) -> HeadingStructureMetric {
    let h2: Vec<&str> = H2.find_iter(content).map(|m| m.as_str()).collect();
    let h3: Vec<&str> = H3.find_iter(content).map(|m| m.as_str()).collect();

    let lowered: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    let headings_with_keywords = h2
        .iter()
        .chain(h3.iter())
        .filter(|heading| {
            let heading = heading.to_lowercase();
            lowered.iter().any(|k| heading.contains(k.as_str()))
        })
        .count();

    let mut score = 40;
    score += match h2.len() {
        4.. => 25,
        3 => 20,
        2 => 15,
        1 => 5,
        _ => 0,
    };
    if !h3.is_empty() {
        score += 10;
    }
    if headings_with_keywords > 0 {
        score += 15;
    }
    if headings_with_keywords >= 2 {
        score += 10;
    }
    let score = score.min(100);

    let is_hierarchical = h2.len() >= 2;
    HeadingStructureMetric {
        score,
        h2_count: h2.len(),
        h3_count: h3.len(),
        headings_with_keywords,
        is_hierarchical,
        status: if is_hierarchical && score >= 70 {
            HeadingStatus::Good
        } else {
            HeadingStatus::NeedsImprovement
        },
    }
}

//=========================================================================================
// Title
//=========================================================================================

pub fn title_optimization(title: &str, keywords: &[String]) -> TitleMetric {
    let title = title.trim();
    let length = title.chars().count();
    let lowered = title.to_lowercase();
    let targets: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    let has_keyword = targets.iter().any(|k| lowered.contains(k.as_str()));

    let mut score: i32 = 100;
    let mut suggestions = Vec::new();
    let mut status = TitleStatus::Good;

    if length > 70 {
        score -= 25;
        status = TitleStatus::TooLong;
        suggestions.push("Shorten the title to 60 characters or fewer so it is not cut off in search results.".to_string());
    } else if length > 60 {
        score -= 10;
        status = TitleStatus::TooLong;
        suggestions.push("The title is slightly long. Aim for 60 characters or fewer.".to_string());
    } else if length < 20 {
        score -= 20;
        status = TitleStatus::TooShort;
        suggestions.push("The title is too short. Include more of the article's core message.".to_string());
    } else if length < 30 {
        score -= 10;
        status = TitleStatus::TooShort;
        suggestions.push("Add more specific detail to the title.".to_string());
    }

    if !has_keyword && !targets.is_empty() {
        score -= 25;
        if status == TitleStatus::Good {
            status = TitleStatus::MissingKeyword;
        }
        suggestions.push("Include a primary keyword in the title to improve search visibility.".to_string());
    }

    TitleMetric {
        score: score.max(0) as u32,
        length,
        has_keyword,
        status,
        suggestions,
    }
}

//=========================================================================================
// Suggestions and meta description
//=========================================================================================

/// Builds per-metric suggestions, highest priority first, at most `MAX_SUGGESTIONS`.
pub fn suggestions(metrics: &SeoMetrics) -> Vec<Suggestion> {
    let mut out = Vec::new();
    let mut push = |priority, category: &str, message: String| {
        out.push(Suggestion {
            priority,
            category: category.to_string(),
            message,
        })
    };

    match metrics.keyword_density.status {
        DensityStatus::Low => push(
            Priority::High,
            "keywords",
            "Keywords are underused. Work the primary keywords into the body more naturally.".into(),
        ),
        DensityStatus::High => push(
            Priority::Medium,
            "keywords",
            "Keywords repeat too often. Replace some with synonyms or related terms.".into(),
        ),
        DensityStatus::Good => {}
    }

    let readability = &metrics.readability;
    if readability.status == ReadabilityStatus::NeedsImprovement {
        if readability.avg_sentence_length > 30.0 {
            push(
                Priority::High,
                "readability",
                "Sentences are too long. Split long sentences to improve readability.".into(),
            );
        }
        if readability.avg_paragraph_length > 6.0 {
            push(
                Priority::Medium,
                "readability",
                "Paragraphs are too long. Three to five sentences per paragraph reads best.".into(),
            );
        }
    }

    match metrics.content_length.status {
        LengthStatus::Short => push(
            Priority::High,
            "length",
            format!(
                "The article has {} words. Expand it toward the 1500-2500 word range.",
                metrics.content_length.word_count
            ),
        ),
        LengthStatus::Long => push(
            Priority::Low,
            "length",
            "The article runs long. Tightening it around the core points reduces drop-off.".into(),
        ),
        LengthStatus::Optimal => {}
    }

    if metrics.heading_structure.h2_count < 2 {
        push(
            Priority::High,
            "structure",
            "Use at least two H2 headings to make the structure clear.".into(),
        );
    }
    if metrics.heading_structure.headings_with_keywords == 0 {
        push(
            Priority::Medium,
            "structure",
            "Include primary keywords in some of the headings.".into(),
        );
    }

    for message in &metrics.title_optimization.suggestions {
        push(Priority::Medium, "title", message.clone());
    }

    // stable: equal priorities keep metric order
    out.sort_by_key(|s| s.priority);
    out.truncate(MAX_SUGGESTIONS);
    out
}

/// Trims a generated meta description to the stored cap.
pub fn cap_meta_description(text: &str) -> String {
    text.trim().chars().take(META_DESCRIPTION_MAX).collect::<String>().trim_end().to_string()
}

/// The first body paragraph, stripped of markdown and cut to `META_FALLBACK_LEN`.
pub fn fallback_meta_description(content: &str) -> String {
    PARAGRAPH_BREAK
        .split(content)
        .map(str::trim)
        .find(|p| !p.is_empty() && !p.starts_with('#'))
        .map(|p| {
            let flat = strip_markdown_syntax(p).split_whitespace().collect::<Vec<_>>().join(" ");
            flat.chars().take(META_FALLBACK_LEN).collect()
        })
        .unwrap_or_default()
}

fn clamp_score(value: f64) -> u32 {
    value.round().clamp(0.0, 100.0) as u32
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
