//! Construction of model requests from a schema and a source text.

use std::fmt;
use std::str::FromStr;

use rig::completion::ToolDefinition;
use serde::{Deserialize, Serialize};

use crate::schema::Schema;

/// Default system instruction.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are an assistant that extracts information from text and structures it according to a given JSON schema.";

/// Name of the operation the model is forced to call in constrained-call mode.
pub const DEFAULT_FUNCTION_NAME: &str = "extract_information";

/// Description attached to the forced operation.
pub const DEFAULT_FUNCTION_DESCRIPTION: &str = "Extract information according to the schema.";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default bound on completion size, in tokens.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;

const DETERMINISTIC_TEMPERATURE: f32 = 0.0;

/// How the schema is conveyed to the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Schema is the parameter declaration of a forced function call.
    #[default]
    ConstrainedCall,
    /// Schema is embedded in the system instruction; the reply is bare JSON.
    EmbeddedSchema,
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConstrainedCall => "constrained-call",
            Self::EmbeddedSchema => "embedded-schema",
        })
    }
}

impl FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "constrained-call" | "constrained" | "function" => Ok(Self::ConstrainedCall),
            "embedded-schema" | "embedded" | "prompt" => Ok(Self::EmbeddedSchema),
            other => Err(format!(
                "unknown extraction mode '{other}' (expected 'constrained-call' or 'embedded-schema')"
            )),
        }
    }
}

/// Chat role of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instruction channel; carries the schema in embedded-schema mode.
    System,
    /// Carries the literal source text and nothing else.
    User,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Message role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

/// A fully built model request.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest {
    /// Model identifier.
    pub model: String,
    /// Strategy the request was built for.
    pub mode: ExtractionMode,
    /// Sampling temperature. Always zero.
    pub temperature: f32,
    /// Bound on completion size, in tokens.
    pub max_output_tokens: u32,
    /// System message followed by the user message.
    pub messages: Vec<PromptMessage>,
    /// Forced operation declaration (constrained-call mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolDefinition>,
}

impl ExtractionRequest {
    /// Text of the system message.
    #[must_use]
    pub fn system_instruction(&self) -> &str {
        self.content_of(Role::System)
    }

    /// Text of the user message (the source text).
    #[must_use]
    pub fn source_text(&self) -> &str {
        self.content_of(Role::User)
    }

    fn content_of(&self, role: Role) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map_or("", |m| m.content.as_str())
    }
}

/// Builds [`ExtractionRequest`]s. Pure: no I/O, no clock, no randomness.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    model: String,
    max_output_tokens: u32,
    system_instruction: String,
    function_name: String,
    function_description: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            function_name: DEFAULT_FUNCTION_NAME.to_string(),
            function_description: DEFAULT_FUNCTION_DESCRIPTION.to_string(),
        }
    }
}

impl PromptBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the completion size bound.
    #[must_use]
    pub const fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = max;
        self
    }

    /// Replaces the opening sentence of the system instruction.
    #[must_use]
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Renames the forced operation.
    #[must_use]
    pub fn with_function(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.function_name = name.into();
        self.function_description = description.into();
        self
    }

    /// The configured model identifier.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Builds the initial request.
    #[must_use]
    pub fn build(&self, schema: &Schema, text: &str, mode: ExtractionMode) -> ExtractionRequest {
        self.build_corrective(schema, text, mode, &[])
    }

    /// Builds a request carrying corrective instructions from earlier attempts.
    ///
    /// Corrections go to the system channel in the order given; the user
    /// message stays the literal source text.
    #[must_use]
    pub fn build_corrective(
        &self,
        schema: &Schema,
        text: &str,
        mode: ExtractionMode,
        corrections: &[String],
    ) -> ExtractionRequest {
        let mut system = self.system_instruction.clone();

        let tool = match mode {
            ExtractionMode::ConstrainedCall => {
                system.push_str("\n\nCall the `");
                system.push_str(&self.function_name);
                system.push_str(
                    "` function with the information found in the user's message. \
                     Use only facts stated in the message.",
                );
                Some(ToolDefinition {
                    name: self.function_name.clone(),
                    description: self.function_description.clone(),
                    parameters: schema.document().clone(),
                })
            }
            ExtractionMode::EmbeddedSchema => {
                system.push_str(
                    "\n\nExtract the relevant information from the user's message and provide it \
                     in the following JSON schema format:\n\n",
                );
                system.push_str(&schema.to_pretty_string());
                system.push_str(
                    "\n\nEnsure that the output is valid JSON and follows the schema exactly. \
                     Provide only the JSON output, and no additional text.",
                );
                None
            }
        };

        if !corrections.is_empty() {
            system.push_str("\n\nYour previous answers were rejected.");
            for correction in corrections {
                system.push_str("\n\n");
                system.push_str(correction);
            }
        }

        ExtractionRequest {
            model: self.model.clone(),
            mode,
            temperature: DETERMINISTIC_TEMPERATURE,
            max_output_tokens: self.max_output_tokens,
            messages: vec![
                PromptMessage {
                    role: Role::System,
                    content: system,
                },
                PromptMessage {
                    role: Role::User,
                    content: text.to_string(),
                },
            ],
            tool,
        }
    }
}
