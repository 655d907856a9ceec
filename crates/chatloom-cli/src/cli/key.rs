//! `set-key`: store the Gemini API key.

use std::time::Duration;

use anyhow::Result;
use console::style;
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};

use chatloom_core::service::credential::{normalize_credential, store_credential};
use chatloom_core::storage::KvStore;
use chatloom_infra::llm::{create_provider, test_provider_connection};

use crate::state::AppState;

/// Mask all but the last four characters.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

/// Store a key, verifying it against the API first unless `no_verify`.
///
/// # Examples
///
/// ```bash
/// # Secure prompt (recommended)
/// chatloom set-key
///
/// # Script/automation mode
/// chatloom set-key --value AIza... --no-verify
/// ```
pub async fn set_key<K: KvStore>(
    state: &AppState<K>,
    value: Option<&str>,
    no_verify: bool,
    json: bool,
) -> Result<()> {
    let raw = match value {
        Some(v) => v.to_string(),
        None => Password::new().with_prompt("  Gemini API key").interact()?,
    };
    let key = normalize_credential(&raw)?.to_string();

    if !no_verify {
        let provider = create_provider(&key, &state.config)?;
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("checking key...");
        spinner.enable_steady_tick(Duration::from_millis(80));
        let result = test_provider_connection(&provider, &state.config.title_model).await;
        spinner.finish_and_clear();
        result.map_err(|e| anyhow::anyhow!("key check failed: {e}"))?;
    }

    store_credential(state.kv.as_ref(), &key).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"set": true, "verified": !no_verify, "masked": mask_key(&key)})
        );
    } else {
        println!(
            "  {} API key stored ({})",
            style("✓").green().bold(),
            mask_key(&key)
        );
    }
    Ok(())
}
