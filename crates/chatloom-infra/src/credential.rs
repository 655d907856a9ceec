//! Credential resolution.
//!
//! The backend credential comes from the `GEMINI_API_KEY` environment
//! variable when set, otherwise from the value stored under
//! `gemini-api-key`. Environment values are never written to storage.

use chatloom_core::service::credential::{load_credential, normalize_credential};
use chatloom_core::storage::KvStore;
use chatloom_types::error::ChatError;
use secrecy::SecretString;

/// Environment variable consulted before the stored credential.
pub const CREDENTIAL_ENV: &str = "GEMINI_API_KEY";

/// Where a resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Env,
    Stored,
}

/// A credential ready to hand to the provider factory.
#[derive(Debug)]
pub struct ResolvedCredential {
    pub value: SecretString,
    pub source: CredentialSource,
}

/// Resolve the credential from the process environment, then `kv`.
pub async fn resolve_credential<K: KvStore>(kv: &K) -> Result<Option<ResolvedCredential>, ChatError> {
    resolve_credential_with(kv, |name| std::env::var(name).ok()).await
}

/// Like [`resolve_credential`] with an injectable environment lookup.
pub async fn resolve_credential_with<K: KvStore>(
    kv: &K,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Option<ResolvedCredential>, ChatError> {
    if let Some(value) = env(CREDENTIAL_ENV) {
        if let Ok(trimmed) = normalize_credential(&value) {
            tracing::debug!(source = "env", "credential resolved");
            return Ok(Some(ResolvedCredential {
                value: SecretString::from(trimmed.to_string()),
                source: CredentialSource::Env,
            }));
        }
    }

    Ok(load_credential(kv).await?.map(|value| {
        tracing::debug!(source = "stored", "credential resolved");
        ResolvedCredential {
            value: SecretString::from(value),
            source: CredentialSource::Stored,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatloom_core::service::credential::store_credential;
    use chatloom_core::storage::InMemoryKvStore;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn test_env_wins_over_stored() {
        let kv = InMemoryKvStore::new();
        store_credential(&kv, "stored-key").await.unwrap();

        let resolved = resolve_credential_with(&kv, |_| Some("  env-key ".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.source, CredentialSource::Env);
        assert_eq!(resolved.value.expose_secret(), "env-key");
    }

    #[tokio::test]
    async fn test_blank_env_falls_back_to_stored() {
        let kv = InMemoryKvStore::new();
        store_credential(&kv, "stored-key").await.unwrap();

        let resolved = resolve_credential_with(&kv, |_| Some("   ".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.source, CredentialSource::Stored);
        assert_eq!(resolved.value.expose_secret(), "stored-key");
    }

    #[tokio::test]
    async fn test_nothing_configured() {
        let kv = InMemoryKvStore::new();
        let resolved = resolve_credential_with(&kv, |_| None).await.unwrap();
        assert!(resolved.is_none());
    }
}
