//! OpenAI-compatible backend for the extraction pipeline.
//!
//! Maps an [`ExtractionRequest`] onto a chat completion. In constrained-call
//! mode the request declares the extraction function and forces the model to
//! call it; the call's arguments become the raw answer. A model that answers
//! in plain text instead is passed through as a free-form answer and parsed
//! leniently by the validator.

use async_trait::async_trait;
use extract_core::client::{
    ClientError, ExtractionClient, ExtractionResponse, ResponseMechanism, TokenUsage,
};
use extract_core::prompt::{ExtractionRequest, Role};
use openai_adapter::{ChatMessage, ChatRequest, FunctionSpec, OpenAiClient, OpenAiError};
use tracing::debug;

use crate::config::{ApiKey, ClientConfig};
use crate::errors::Error;

/// [`ExtractionClient`] backed by an OpenAI-compatible HTTP endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: OpenAiClient,
}

impl OpenAiBackend {
    /// Creates a backend from a resolved credential and client settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backend` if the HTTP client cannot be built.
    pub fn new(api_key: &ApiKey, config: &ClientConfig) -> Result<Self, Error> {
        let client = OpenAiClient::new(api_key.expose(), config.openai())?;
        Ok(Self { client })
    }

    /// Wraps an already configured client.
    #[must_use]
    pub const fn from_client(client: OpenAiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractionClient for OpenAiBackend {
    fn supports_constrained_calls(&self) -> bool {
        self.client.config().supports_tools
    }

    async fn send(&self, request: &ExtractionRequest) -> Result<ExtractionResponse, ClientError> {
        let chat = to_chat_request(request);
        let completion = self.client.chat_completion(&chat).await.map_err(to_client_error)?;

        let (raw, mechanism) = match request
            .tool
            .as_ref()
            .and_then(|tool| completion.function_arguments(&tool.name))
        {
            Some(arguments) => (arguments.to_string(), ResponseMechanism::ConstrainedCall),
            None => {
                if request.tool.is_some() {
                    debug!("model answered without calling the extraction function");
                }
                (
                    completion.content().unwrap_or_default().to_string(),
                    ResponseMechanism::FreeForm,
                )
            }
        };

        let mut response = ExtractionResponse::new(raw, mechanism);
        if let Some(model) = completion.model {
            response = response.with_model(model);
        }
        if let Some(usage) = completion.usage {
            response = response.with_usage(TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
            });
        }
        Ok(response)
    }
}

fn to_chat_request(request: &ExtractionRequest) -> ChatRequest {
    let mut chat = request
        .messages
        .iter()
        .fold(ChatRequest::new(request.model.clone()), |chat, message| {
            chat.message(match message.role {
                Role::System => ChatMessage::system(message.content.clone()),
                Role::User => ChatMessage::user(message.content.clone()),
            })
        })
        .temperature(request.temperature)
        .output_limit(request.max_output_tokens);

    if let Some(tool) = &request.tool {
        chat = chat.force_function(FunctionSpec {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        });
    }
    chat
}

fn to_client_error(error: OpenAiError) -> ClientError {
    match error {
        OpenAiError::RateLimited {
            message,
            retry_after,
        } => ClientError::RateLimited {
            message,
            retry_after,
        },
        OpenAiError::Api { status, message } => ClientError::Provider { status, message },
        // A 200 with an unreadable body is treated like a dropped connection.
        other @ (OpenAiError::Network(_)
        | OpenAiError::Timeout(_)
        | OpenAiError::Unauthorized { .. }
        | OpenAiError::Parse(_)
        | OpenAiError::InvalidConfig(_)) => ClientError::Transport(other.to_string()),
    }
}
