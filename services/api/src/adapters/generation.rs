use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use blog_pipeline_core::ports::{
    Generation, GenerationRequest, GenerationService, ModelTier, PortError, PortResult,
};
use tracing::debug;

/// Text generation backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiGenerationAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    light_model: String,
}

impl OpenAiGenerationAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String, light_model: String) -> Self {
        Self {
            client,
            model,
            light_model,
        }
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Standard => &self.model,
            ModelTier::Light => &self.light_model,
        }
    }
}

#[async_trait]
impl GenerationService for OpenAiGenerationAdapter {
    async fn generate(&self, request: GenerationRequest) -> PortResult<Generation> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system_prompt)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(request.user_message)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
        ];

        let model = self.model_for(request.tier);
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .max_completion_tokens(request.max_tokens)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!(model, max_tokens = request.max_tokens, "Sending generation request");
        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| PortError::Unexpected("No content generated".to_string()))?;

        Ok(Generation {
            text,
            citations: Vec::new(),
        })
    }
}
