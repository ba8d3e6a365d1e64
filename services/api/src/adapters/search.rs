//! services/api/src/adapters/search.rs
//!
//! A search-grounded chat provider speaking the Perplexity chat completions wire format.
//! Unlike the plain generation adapter it reports the citation URLs the provider used.

use async_trait::async_trait;
use blog_pipeline_core::ports::{
    Generation, GenerationRequest, GenerationService, PortError, PortResult,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// How much of an upstream error body is kept for the logs.
const ERROR_BODY_CHARS: usize = 300;

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct SearchGenerationAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl SearchGenerationAdapter {
    pub fn new(client: Client, api_base: &str, api_key: String, model: String) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl GenerationService for SearchGenerationAdapter {
    async fn generate(&self, request: GenerationRequest) -> PortResult<Generation> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_message,
                },
            ],
            max_tokens: request.max_tokens,
        };

        debug!(model = %self.model, "Sending search request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let excerpt: String = text.chars().take(ERROR_BODY_CHARS).collect();
            error!(status = status.as_u16(), body = %excerpt, "Search provider returned an error");
            return Err(PortError::Unexpected(format!(
                "search provider returned {}",
                status.as_u16()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("invalid search response: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PortError::Unexpected("No content generated".to_string()))?;

        Ok(Generation {
            text,
            citations: parsed.citations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blog_pipeline_core::ports::ModelTier;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "You are a research assistant.".into(),
            user_message: "edge ai".into(),
            max_tokens: 512,
            tier: ModelTier::Standard,
        }
    }

    #[tokio::test]
    async fn returns_text_and_citations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer pplx-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "search-1",
                "choices": [{"message": {"role": "assistant", "content": "[]"}}],
                "citations": ["https://news.example/a", "https://news.example/b"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = SearchGenerationAdapter::new(
            Client::new(),
            &format!("{}/", server.uri()),
            "pplx-test".into(),
            "sonar".into(),
        );
        let generation = adapter.generate(request()).await.unwrap();

        assert_eq!(generation.text, "[]");
        assert_eq!(
            generation.citations,
            vec!["https://news.example/a", "https://news.example/b"]
        );
    }

    #[tokio::test]
    async fn upstream_error_body_is_not_propagated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key pplx-test"))
            .mount(&server)
            .await;

        let adapter =
            SearchGenerationAdapter::new(Client::new(), &server.uri(), "pplx-test".into(), "sonar".into());
        let err = adapter.generate(request()).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("401"));
        assert!(!message.contains("pplx-test"));
    }
}
