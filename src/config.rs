use std::env;

use tracing::{info, warn};

pub const DEFAULT_SESSION_SECRET: &str = "dev-secret-key";
pub const DEFAULT_SPOONACULAR_BASE_URL: &str = "https://api.spoonacular.com";
pub const DEFAULT_OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Process settings, read once at startup and handed to every client.
#[derive(Debug, Clone)]
pub struct Settings {
    pub session_secret: String,
    pub spoonacular_api_key: String,
    pub spoonacular_base_url: String,
    /// `None` disables the OpenRouter assistant.
    pub openrouter_api_key: Option<String>,
    pub openrouter_api_url: String,
    /// `None` disables the OpenAI assistant.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let session_secret = non_empty(&lookup, "SESSION_SECRET").unwrap_or_else(|| {
            warn!("SESSION_SECRET not set, using the development secret");
            DEFAULT_SESSION_SECRET.to_string()
        });

        let spoonacular_api_key = non_empty(&lookup, "SPOONACULAR_API_KEY").unwrap_or_else(|| {
            warn!("SPOONACULAR_API_KEY not set, recipe requests will be rejected upstream");
            String::new()
        });

        let openrouter_api_key = non_empty(&lookup, "OPENROUTER_API_KEY");
        if openrouter_api_key.is_none() {
            warn!("OPENROUTER_API_KEY not set, OpenRouter assistant disabled");
        }

        let openai_api_key = non_empty(&lookup, "OPENAI_API_KEY");
        if openai_api_key.is_none() {
            info!("OPENAI_API_KEY not set, OpenAI assistant disabled");
        }

        Self {
            session_secret,
            spoonacular_api_key,
            spoonacular_base_url: with_default(&lookup, "SPOONACULAR_BASE_URL", DEFAULT_SPOONACULAR_BASE_URL),
            openrouter_api_key,
            openrouter_api_url: with_default(&lookup, "OPENROUTER_API_URL", DEFAULT_OPENROUTER_API_URL),
            openai_api_key,
            openai_base_url: with_default(&lookup, "OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
        }
    }

    pub fn openrouter_available(&self) -> bool {
        self.openrouter_api_key.is_some()
    }

    pub fn openai_available(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn with_default<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key)
        .map(|value| value.trim_end_matches('/').to_string())
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = settings(&[]);
        assert_eq!(settings.session_secret, DEFAULT_SESSION_SECRET);
        assert_eq!(settings.spoonacular_api_key, "");
        assert_eq!(settings.spoonacular_base_url, DEFAULT_SPOONACULAR_BASE_URL);
        assert_eq!(settings.openrouter_api_url, DEFAULT_OPENROUTER_API_URL);
        assert!(!settings.openrouter_available());
        assert!(!settings.openai_available());
    }

    #[test]
    fn blank_ai_keys_disable_the_provider() {
        let settings = settings(&[("OPENROUTER_API_KEY", "  "), ("OPENAI_API_KEY", "sk-test")]);
        assert!(!settings.openrouter_available());
        assert!(settings.openai_available());
        assert_eq!(settings.openai_api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn base_urls_lose_trailing_slash() {
        let settings = settings(&[("SPOONACULAR_BASE_URL", "http://127.0.0.1:9000/")]);
        assert_eq!(settings.spoonacular_base_url, "http://127.0.0.1:9000");
    }
}
