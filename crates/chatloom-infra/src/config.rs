//! Configuration loader for Chatloom.
//!
//! Reads `config.toml` from the data directory (`~/.chatloom/` by default)
//! and deserializes it into [`ChatConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use chatloom_types::config::ChatConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CHATLOOM_DATA_DIR";

/// Resolve the data directory: `$CHATLOOM_DATA_DIR`, else `~/.chatloom`.
///
/// Falls back to `./.chatloom` when no home directory can be determined.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chatloom")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`ChatConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_chat_config(data_dir: &Path) -> ChatConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return ChatConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ChatConfig::default();
        }
    };

    match toml::from_str::<ChatConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            ChatConfig::default()
        }
    }
}
