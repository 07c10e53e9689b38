use openai_api_rs::v1::chat_completion::{ChatCompletionMessage, Content, MessageRole};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const GPT_3_5_TURBO: &str = "gpt-3.5-turbo";
pub const GPT_4: &str = "gpt-4";

/// Context-window sizes (in tokens) of the supported model tiers.
///
/// Informational only: nothing in the gateway enforces these budgets.
pub const CONTEXT_WINDOW_SIZES: &[(&str, usize)] = &[(GPT_3_5_TURBO, 4000), (GPT_4, 8000)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Model {
    Gpt35Turbo,
    Gpt4,
}

impl Model {
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            GPT_3_5_TURBO => Some(Model::Gpt35Turbo),
            GPT_4 => Some(Model::Gpt4),
            _ => None,
        }
    }

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Model::Gpt35Turbo => GPT_3_5_TURBO,
            Model::Gpt4 => GPT_4,
        }
    }

    #[must_use]
    pub const fn context_window(self) -> usize {
        match self {
            Model::Gpt35Turbo => 4000,
            Model::Gpt4 => 8000,
        }
    }

    /// Whether calls against this tier are followed by a queue cooldown.
    #[must_use]
    pub const fn is_expensive(self) -> bool {
        matches!(self, Model::Gpt4)
    }
}

/// Look up the context-window size of a model id.
#[must_use]
pub fn context_window_size(model: &str) -> Option<usize> {
    CONTEXT_WINDOW_SIZES
        .iter()
        .find(|(id, _)| *id == model)
        .map(|(_, size)| *size)
}

/// Rough token estimation - assume ~4 characters per token for English-like text.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4 + 1
}

/// Chat-completion request payload.
///
/// Only `model` is inspected by the gateway; any additional request fields
/// (temperature, max_tokens, ...) are carried in `extra` and sent verbatim.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatCompletionMessage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatCompletionMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            extra: Map::new(),
        }
    }

    /// Set an additional top-level request field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn model_tier(&self) -> Option<Model> {
        Model::from_id(&self.model)
    }

    #[must_use]
    pub fn uses_expensive_model(&self) -> bool {
        self.model_tier().is_some_and(Model::is_expensive)
    }

    /// Sum of the estimated tokens of every text message.
    #[must_use]
    pub fn estimated_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|msg| match &msg.content {
                Content::Text(text) => estimate_tokens(text),
                Content::ImageUrl(_) => 0,
            })
            .sum()
    }
}

#[must_use]
pub fn text_message(role: MessageRole, text: &str) -> ChatCompletionMessage {
    ChatCompletionMessage {
        role,
        content: Content::Text(text.to_string()),
        name: None,
        tool_calls: None,
        tool_call_id: None,
    }
}

#[must_use]
pub fn system_message(text: &str) -> ChatCompletionMessage {
    text_message(MessageRole::system, text)
}

#[must_use]
pub fn user_message(text: &str) -> ChatCompletionMessage {
    text_message(MessageRole::user, text)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Chat-completion response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatResponse {
    /// Text of the first choice, if the provider returned one.
    #[must_use]
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }
}
