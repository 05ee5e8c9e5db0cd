//! Cooking assistant on top of the chat-completion providers.
//!
//! Conversations are not stored server side: the caller sends the history
//! with every message and gets it back extended by the new turns.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api_connection::{
    ApiConnectionError, ChatCompletionRequest, ChatMessage, Provider, ResponseFormat,
};
use crate::config::Settings;

const SYSTEM_PROMPT: &str = "You are an expert AI cooking assistant named Chef AI. \
Your expertise is in providing cooking guidance, recipe instructions, ingredient substitutions, \
cooking techniques, nutrition questions and meal planning advice. \
Be friendly, helpful, and provide clear, step-by-step instructions when explaining recipes or cooking methods. \
Feel free to suggest ingredient alternatives and cooking tips. \
Format your answers for readability, using bullet points and sections as needed. \
If you don't know something, admit it and suggest looking for recipes that might be more suitable.";

const ANALYSIS_PROMPT: &str = "You are a recipe analysis expert. Extract structured information from recipe text.
Provide the output as a JSON object with the following fields:
- title: The recipe title
- servings: Number of servings (integer)
- prep_time_mins: Preparation time in minutes (integer)
- cook_time_mins: Cooking time in minutes (integer)
- ingredients: Array of ingredient objects with 'name', 'amount', and 'unit' fields
- instructions: Array of step-by-step instructions
- cuisine_type: The type of cuisine (e.g., Italian, Mexican)
- difficulty: Cooking difficulty (Easy, Medium, Hard)
- tags: Array of recipe tags (e.g., Vegetarian, Gluten-Free, Quick)";

const SUGGESTION_PROMPT: &str = "You are a culinary expert that specializes in meal planning and recipe suggestions. \
Respond with detailed, creative meal ideas in JSON format.";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Older clients send `{user, assistant}` pairs instead of role-tagged turns.
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ExchangePair {
    pub user: Option<String>,
    pub assistant: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum HistoryEntry {
    Turn(ChatTurn),
    Exchange(ExchangePair),
}

/// Flattens history entries into turns, keeping arrival order.
pub fn normalize_history(entries: Vec<HistoryEntry>) -> Vec<ChatTurn> {
    let mut turns = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            HistoryEntry::Turn(turn) => turns.push(turn),
            HistoryEntry::Exchange(pair) => {
                if let Some(user) = pair.user {
                    turns.push(ChatTurn::user(user));
                }
                if let Some(assistant) = pair.assistant {
                    turns.push(ChatTurn::assistant(assistant));
                }
            }
        }
    }
    turns
}

pub fn build_messages(message: &str, history: &[ChatTurn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new("system", SYSTEM_PROMPT));
    messages.extend(
        history
            .iter()
            .map(|turn| ChatMessage::new(turn.role.as_str(), turn.content.clone())),
    );
    messages.push(ChatMessage::new("user", message));
    messages
}

/// Models sometimes wrap JSON in markdown fences even in JSON mode.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() >= 6 {
        let inner = &trimmed[3..trimmed.len() - 3];
        let inner = inner.strip_prefix("json").unwrap_or(inner);
        inner.trim()
    } else {
        trimmed
    }
}

#[derive(Debug, Clone)]
pub struct CookingAssistant {
    http: Client,
    provider: Provider,
}

impl CookingAssistant {
    pub fn new(http: Client, provider: Provider) -> Self {
        Self { http, provider }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// One assistant reply for `message` given the prior turns.
    pub async fn reply(&self, message: &str, history: &[ChatTurn]) -> Result<String, ApiConnectionError> {
        let (temperature, max_tokens) = self.provider.chat_sampling();
        let request = ChatCompletionRequest {
            model: self.provider.model().to_string(),
            messages: build_messages(message, history),
            response_format: None,
            temperature,
            max_tokens,
        };

        let response = self.provider.call_chat_completion(&self.http, &request).await?;
        debug!(provider = self.provider_name(), choices = response.choices.len(), "chat completion received");

        response
            .first_content()
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(str::to_string)
            .ok_or(ApiConnectionError::EmptyCompletion)
    }

    /// Extracts structured recipe fields from free text.
    pub async fn analyze_recipe(&self, recipe_text: &str) -> Result<Value, ApiConnectionError> {
        self.structured(ANALYSIS_PROMPT, recipe_text.to_string(), 0.2, 1000)
            .await
    }

    pub async fn suggest_meals(
        &self,
        preferences: &str,
        restrictions: Option<&str>,
        ingredients: &[String],
    ) -> Result<Value, ApiConnectionError> {
        let prompt = suggestion_prompt(preferences, restrictions, ingredients);
        self.structured(SUGGESTION_PROMPT, prompt, 0.7, 800).await
    }

    async fn structured(
        &self,
        system: &str,
        user: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Value, ApiConnectionError> {
        let request = ChatCompletionRequest {
            model: self.provider.model().to_string(),
            messages: vec![ChatMessage::new("system", system), ChatMessage::new("user", user)],
            response_format: Some(ResponseFormat::json_object()),
            temperature: Some(temperature),
            max_tokens: Some(max_tokens),
        };

        let response = self.provider.call_chat_completion(&self.http, &request).await?;
        let content = response
            .first_content()
            .ok_or(ApiConnectionError::EmptyCompletion)?;

        let json = strip_code_fences(content);
        if json.is_empty() {
            return Err(ApiConnectionError::EmptyCompletion);
        }

        serde_json::from_str(json).map_err(|e| {
            warn!(provider = self.provider_name(), "structured reply is not valid JSON: {e}");
            ApiConnectionError::SerializationError(e)
        })
    }
}

fn suggestion_prompt(preferences: &str, restrictions: Option<&str>, ingredients: &[String]) -> String {
    let mut prompt = String::from("Generate meal suggestions based on the following criteria:\n\n");
    prompt.push_str(&format!("Preferences: {preferences}\n"));

    if let Some(restrictions) = restrictions.filter(|r| !r.trim().is_empty()) {
        prompt.push_str(&format!("Dietary restrictions: {restrictions}\n"));
    }

    if !ingredients.is_empty() {
        prompt.push_str(&format!("Available ingredients: {}\n", ingredients.join(", ")));
    }

    prompt.push_str(
        "\nProvide 3-5 meal ideas with brief descriptions. Format as JSON with an array of meal objects.",
    );
    prompt
}

/// The assistants configured at startup. A provider without credentials is
/// simply absent.
#[derive(Debug, Clone, Default)]
pub struct Assistants {
    openrouter: Option<CookingAssistant>,
    openai: Option<CookingAssistant>,
}

impl Assistants {
    pub fn new(openrouter: Option<CookingAssistant>, openai: Option<CookingAssistant>) -> Self {
        Self { openrouter, openai }
    }

    pub fn from_settings(settings: &Settings, http: &Client) -> Self {
        let openrouter = settings.openrouter_api_key.as_ref().map(|key| {
            CookingAssistant::new(
                http.clone(),
                Provider::openrouter(key.clone(), settings.openrouter_api_url.clone()),
            )
        });
        let openai = settings.openai_api_key.as_ref().map(|key| {
            CookingAssistant::new(
                http.clone(),
                Provider::openai(key.clone(), settings.openai_base_url.clone()),
            )
        });
        Self::new(openrouter, openai)
    }

    pub fn openrouter_available(&self) -> bool {
        self.openrouter.is_some()
    }

    pub fn openai_available(&self) -> bool {
        self.openai.is_some()
    }

    /// The requested provider, or the other one when it is not configured.
    pub fn select(&self, requested: &str) -> Option<&CookingAssistant> {
        let selected = if requested.eq_ignore_ascii_case("openai") {
            self.openai.as_ref().or(self.openrouter.as_ref())
        } else {
            self.openrouter.as_ref().or(self.openai.as_ref())
        };

        if let Some(assistant) = selected {
            if !assistant.provider_name().eq_ignore_ascii_case(requested) {
                debug!(requested, used = assistant.provider_name(), "falling back to another provider");
            }
        }
        selected
    }

    /// Prefers OpenAI for JSON-mode requests.
    pub fn structured(&self) -> Option<&CookingAssistant> {
        self.openai.as_ref().or(self.openrouter.as_ref())
    }
}
