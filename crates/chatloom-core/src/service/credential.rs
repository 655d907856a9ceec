//! Stored backend credential.

use chatloom_types::error::ChatError;
use chatloom_types::storage::CREDENTIAL_KEY;
use tracing::{debug, warn};

use crate::storage::KvStore;

/// Trim a credential, rejecting blank input.
pub fn normalize_credential(raw: &str) -> Result<&str, ChatError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ChatError::CredentialInvalid);
    }
    Ok(trimmed)
}

/// Read the stored credential. Unreadable or blank values count as absent.
pub async fn load_credential<K: KvStore>(kv: &K) -> Result<Option<String>, ChatError> {
    let Some(bytes) = kv.get(CREDENTIAL_KEY).await? else {
        return Ok(None);
    };
    match String::from_utf8(bytes) {
        Ok(value) => Ok(normalize_credential(&value).ok().map(str::to_string)),
        Err(_) => {
            warn!("stored credential is not valid UTF-8, ignoring");
            Ok(None)
        }
    }
}

/// Store the trimmed credential and return it.
pub async fn store_credential<K: KvStore>(kv: &K, raw: &str) -> Result<String, ChatError> {
    let credential = normalize_credential(raw)?;
    kv.set(CREDENTIAL_KEY, credential.as_bytes()).await?;
    debug!("credential stored");
    Ok(credential.to_string())
}

pub async fn clear_credential<K: KvStore>(kv: &K) -> Result<(), ChatError> {
    kv.delete(CREDENTIAL_KEY).await?;
    debug!("credential cleared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryKvStore;

    #[tokio::test]
    async fn test_store_trims_and_load_reads_back() {
        let kv = InMemoryKvStore::new();
        assert_eq!(store_credential(&kv, "  AIza-key \n").await.unwrap(), "AIza-key");
        assert_eq!(load_credential(&kv).await.unwrap().as_deref(), Some("AIza-key"));

        clear_credential(&kv).await.unwrap();
        assert!(load_credential(&kv).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_credential_rejected() {
        let kv = InMemoryKvStore::new();
        assert!(matches!(
            store_credential(&kv, "   ").await,
            Err(ChatError::CredentialInvalid)
        ));
        assert!(kv.is_empty());
    }

    #[tokio::test]
    async fn test_blank_stored_value_counts_as_absent() {
        let kv = InMemoryKvStore::new();
        kv.set(CREDENTIAL_KEY, b"  ").await.unwrap();
        assert!(load_credential(&kv).await.unwrap().is_none());
    }
}
