//! crates/blog_pipeline_core/src/gateway.rs
//!
//! The single path from stage components to a generation provider, plus the
//! recovery chain that turns free-form provider text into typed JSON.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::{Arc, LazyLock};
use tracing::warn;

use crate::ports::{Generation, GenerationRequest, GenerationService, PortError};

const EXCERPT_CHARS: usize = 200;

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```json[ \t]*\r?\n?(.*?)```").expect("static regex"));

//=========================================================================================
// Errors
//=========================================================================================

/// No JSON value of the requested shape could be recovered from provider text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to parse JSON from provider response: {excerpt}")]
pub struct ParseFailure {
    /// The first characters of the offending text, never the full payload.
    pub excerpt: String,
}

impl ParseFailure {
    pub fn from_text(raw: &str) -> Self {
        let mut excerpt: String = raw.chars().take(EXCERPT_CHARS).collect();
        if raw.chars().count() > EXCERPT_CHARS {
            excerpt.push_str("...");
        }
        Self { excerpt }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("generation provider failed: {0}")]
    Provider(#[source] PortError),
    #[error(transparent)]
    Parse(#[from] ParseFailure),
}

//=========================================================================================
// JSON recovery chain
//=========================================================================================

/// Recovers a `T` from provider text.
///
/// Tried in order: a fenced ```json block, the whole text, then every balanced
/// top-level `{...}`/`[...]` span from largest to smallest. The first candidate that
/// deserializes into `T` wins.
pub fn extract_json<T: DeserializeOwned>(raw: &str) -> Result<T, ParseFailure> {
    for captures in FENCED_JSON.captures_iter(raw) {
        if let Some(body) = captures.get(1) {
            if let Ok(value) = serde_json::from_str(body.as_str().trim()) {
                return Ok(value);
            }
        }
    }

    if let Ok(value) = serde_json::from_str(raw.trim()) {
        return Ok(value);
    }

    let mut spans = balanced_spans(raw);
    spans.sort_by(|a, b| b.len().cmp(&a.len()));
    for span in spans {
        if let Ok(value) = serde_json::from_str(span) {
            return Ok(value);
        }
    }

    Err(ParseFailure::from_text(raw))
}

/// Finds every top-level bracketed span whose brackets balance, ignoring brackets that
/// appear inside JSON string literals. An opener that never closes is skipped and the
/// scan resumes right after it.
fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut offset = 0;
    while let Some(relative) = text[offset..].find(['{', '[']) {
        let start = offset + relative;
        match balanced_len(&text[start..]) {
            Some(len) => {
                spans.push(&text[start..start + len]);
                offset = start + len;
            }
            None => offset = start + 1,
        }
    }
    spans
}

/// Byte length of the balanced span opening at the start of `text`, if it closes.
fn balanced_len(text: &str) -> Option<usize> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

//=========================================================================================
// Gateway
//=========================================================================================

/// A typed provider result and the citations that came with it.
#[derive(Debug, Clone)]
pub struct JsonGeneration<T> {
    pub value: T,
    pub citations: Vec<String>,
}

/// Issues generation requests and recovers structured output from the replies.
#[derive(Clone)]
pub struct ProviderGateway {
    service: Arc<dyn GenerationService>,
}

impl ProviderGateway {
    pub fn new(service: Arc<dyn GenerationService>) -> Self {
        Self { service }
    }

    /// Returns the provider's raw reply.
    pub async fn generate(&self, request: GenerationRequest) -> Result<Generation, GatewayError> {
        self.service
            .generate(request)
            .await
            .map_err(GatewayError::Provider)
    }

    /// Calls the provider and recovers a `T` from its reply.
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        request: GenerationRequest,
    ) -> Result<JsonGeneration<T>, GatewayError> {
        let generation = self.generate(request).await?;
        match extract_json::<T>(&generation.text) {
            Ok(value) => Ok(JsonGeneration {
                value,
                citations: generation.citations,
            }),
            Err(failure) => {
                warn!(excerpt = %failure.excerpt, "provider reply held no usable JSON");
                Err(GatewayError::Parse(failure))
            }
        }
    }
}
