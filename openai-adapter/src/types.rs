//! Wire types for the chat-completions endpoint.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Connection settings for an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API root, without the trailing `/chat/completions`.
    pub base_url: String,
    /// Whole-request timeout enforced by the HTTP client.
    pub timeout: Duration,
    /// Whether the backend honours `tools` / `tool_choice`.
    ///
    /// Some OpenAI-compatible servers ignore tool declarations; turning this
    /// off makes callers fall back to instruction-embedded schemas.
    pub supports_tools: bool,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            supports_tools: true,
        }
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A function declaration offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Function name.
    pub name: String,
    /// What the function does.
    pub description: String,
    /// JSON Schema of the arguments.
    pub parameters: serde_json::Value,
}

/// Entry of the `tools` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Always `function`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The declaration.
    pub function: FunctionSpec,
}

/// Name reference used by `tool_choice`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionName {
    /// Function name.
    pub name: String,
}

/// `tool_choice` forcing a specific function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChoice {
    /// Always `function`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The function the model must call.
    pub function: FunctionName,
}

/// Chat completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Completion bound for older models.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Completion bound for reasoning models (o1, o3, gpt-5).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    /// Declared tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    /// Forced tool selection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

impl ChatRequest {
    /// Creates an empty request for `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
            max_completion_tokens: None,
            tools: None,
            tool_choice: None,
        }
    }

    /// Appends a message.
    #[must_use]
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Sets the temperature.
    ///
    /// Reasoning models (o1, o3, gpt-5) only accept their default sampling
    /// and reject the field, so it is left out for them.
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        if !Self::uses_max_completion_tokens(&self.model) {
            self.temperature = Some(temperature);
        }
        self
    }

    /// Sets the completion bound, using the field the model family expects.
    #[must_use]
    pub fn output_limit(mut self, limit: u32) -> Self {
        if Self::uses_max_completion_tokens(&self.model) {
            self.max_completion_tokens = Some(limit);
        } else {
            self.max_tokens = Some(limit);
        }
        self
    }

    /// Declares `function` and forces the model to call it.
    #[must_use]
    pub fn force_function(mut self, function: FunctionSpec) -> Self {
        self.tool_choice = Some(ToolChoice {
            kind: "function".to_string(),
            function: FunctionName {
                name: function.name.clone(),
            },
        });
        self.tools = Some(vec![ToolSpec {
            kind: "function".to_string(),
            function,
        }]);
        self
    }

    /// Check if a model requires `max_completion_tokens` instead of `max_tokens`.
    #[must_use]
    pub fn uses_max_completion_tokens(model: &str) -> bool {
        model.starts_with("o1")
            || model.starts_with("o3")
            || model.starts_with("gpt-5")
            || model.contains("-o1")
            || model.contains("-o3")
    }
}

/// Chat completion response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    /// Model that answered.
    #[serde(default)]
    pub model: Option<String>,
    /// Completion choices; only the first is used.
    pub choices: Vec<Choice>,
    /// Token usage.
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Arguments of the first call to `function` in the first choice.
    #[must_use]
    pub fn function_arguments(&self, function: &str) -> Option<&str> {
        self.choices
            .first()?
            .message
            .tool_calls
            .iter()
            .flatten()
            .find(|call| call.function.name == function)
            .map(|call| call.function.arguments.as_str())
    }

    /// Text content of the first choice.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.choices.first()?.message.content.as_deref()
    }
}

/// One completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    /// The assistant message.
    pub message: AssistantMessage,
    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Assistant message of a choice.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    /// Plain text content, absent when the model only called tools.
    #[serde(default)]
    pub content: Option<String>,
    /// Tool calls, if any.
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// A tool call made by the model.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    /// Call identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// The invoked function.
    pub function: FunctionCall,
}

/// Function name and JSON-encoded arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,
    /// Arguments as a JSON string.
    pub arguments: String,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt.
    pub prompt_tokens: u32,
    /// Tokens in the completion.
    pub completion_tokens: u32,
    /// Total tokens used.
    #[serde(default)]
    pub total_tokens: u32,
}

/// Error envelope returned with non-success statuses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub message: String,
}
