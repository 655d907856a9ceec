//! Application state wiring storage, configuration and the chat service.
//!
//! `AppState` is generic over the key-value store so the same commands run
//! against SQLite or, with `--ephemeral`, an in-memory store.

use std::sync::Arc;

use anyhow::Context;
use console::style;
use dialoguer::Password;
use secrecy::ExposeSecret;

use chatloom_core::service::ChatService;
use chatloom_core::service::credential::store_credential;
use chatloom_core::storage::KvStore;
use chatloom_infra::credential::{resolve_credential, CredentialSource};
use chatloom_infra::image::PollinationsImageGenerator;
use chatloom_infra::llm::create_provider;
use chatloom_types::config::ChatConfig;

/// Chat service pinned to the concrete image generator.
pub type AppChatService<K> = ChatService<K, PollinationsImageGenerator>;

pub struct AppState<K: KvStore> {
    pub config: ChatConfig,
    pub kv: Arc<K>,
}

impl<K: KvStore> AppState<K> {
    pub fn new(config: ChatConfig, kv: K) -> Self {
        Self {
            config,
            kv: Arc::new(kv),
        }
    }

    /// Build the chat service, prompting for a key when none is configured.
    pub async fn connect(&self) -> anyhow::Result<AppChatService<K>> {
        let credential = match resolve_credential(self.kv.as_ref()).await? {
            Some(resolved) => {
                tracing::debug!(env = resolved.source == CredentialSource::Env, "using configured key");
                resolved.value.expose_secret().to_string()
            }
            None => self.prompt_and_store_key().await?,
        };

        let config = self.config.clone();
        let service = ChatService::init(
            &credential,
            |key| create_provider(key, &config),
            Arc::clone(&self.kv),
            PollinationsImageGenerator::new(),
            &self.config,
        )
        .await
        .context("could not start chat")?;
        Ok(service)
    }

    /// Ask for a key on the terminal and persist it.
    pub async fn prompt_and_store_key(&self) -> anyhow::Result<String> {
        println!();
        println!(
            "  {} A Gemini API key is required. Get one at {}",
            style("i").blue().bold(),
            style("https://aistudio.google.com/apikey").cyan()
        );
        let key = Password::new()
            .with_prompt("  Gemini API key")
            .interact()?;
        let stored = store_credential(self.kv.as_ref(), &key).await?;
        Ok(stored)
    }
}
