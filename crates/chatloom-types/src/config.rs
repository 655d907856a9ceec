//! Global configuration types for Chatloom.
//!
//! `ChatConfig` represents the top-level `config.toml` that controls the
//! backend model, streaming throttle, and title derivation limits.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Top-level configuration for Chatloom.
///
/// Loaded from `~/.chatloom/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Model used for conversations.
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for one-shot title generation.
    #[serde(default = "default_model")]
    pub title_model: String,

    /// Minimum interval between visible transcript updates while streaming.
    #[serde(default = "default_throttle_window_ms")]
    pub throttle_window_ms: u64,

    /// Attach the search grounding tool to conversational turns.
    #[serde(default = "default_true")]
    pub enable_search: bool,

    /// Maximum length of a generated title, in characters.
    #[serde(default = "default_title_max_chars")]
    pub title_max_chars: usize,

    /// Length of the fallback title cut from the first user message.
    #[serde(default = "default_title_fallback_chars")]
    pub title_fallback_chars: usize,

    /// Override the backend base URL (proxies, tests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_throttle_window_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_title_max_chars() -> usize {
    40
}

fn default_title_fallback_chars() -> usize {
    30
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            title_model: default_model(),
            throttle_window_ms: default_throttle_window_ms(),
            enable_search: default_true(),
            title_max_chars: default_title_max_chars(),
            title_fallback_chars: default_title_fallback_chars(),
            base_url: None,
        }
    }
}

/// Appearance preference persisted alongside sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("invalid theme: '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_config_default_values() {
        let config = ChatConfig::default();
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.throttle_window_ms, 100);
        assert!(config.enable_search);
        assert_eq!(config.title_max_chars, 40);
        assert_eq!(config.title_fallback_chars, 30);
        assert!(config.base_url.is_none());
    }

    #[test]
    fn test_chat_config_deserialize_with_defaults() {
        let config: ChatConfig = toml::from_str("").unwrap();
        assert_eq!(config, ChatConfig::default());
    }

    #[test]
    fn test_chat_config_deserialize_with_values() {
        let toml_str = r#"
model = "gemini-2.5-pro"
throttle_window_ms = 250
enable_search = false
"#;
        let config: ChatConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.title_model, "gemini-2.5-flash");
        assert_eq!(config.throttle_window_ms, 250);
        assert!(!config.enable_search);
    }

    #[test]
    fn test_theme_roundtrip() {
        for theme in [Theme::Light, Theme::Dark] {
            let parsed: Theme = theme.to_string().parse().unwrap();
            assert_eq!(theme, parsed);
        }
        assert!("purple".parse::<Theme>().is_err());
    }
}
