//! Authoritative in-memory session table with write-through persistence.
//!
//! Sessions are held as `Arc<ChatSession>` snapshots and replaced whole on
//! every mutation, so readers never observe a half-applied edit. The table
//! lock is synchronous and never held across an `.await`; persistence runs
//! afterwards under a separate async lock that serializes writes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chatloom_types::chat::{SessionId, SessionRecord};
use chatloom_types::event::SessionEvent;
use chatloom_types::storage::SESSIONS_KEY;
use tracing::{debug, info, warn};

use super::codec::PersistenceCodec;
use super::session::ChatSession;
use crate::event::EventBus;
use crate::storage::KvStore;

#[derive(Default)]
struct Table {
    sessions: HashMap<SessionId, Arc<ChatSession>>,
    /// Display order, most recent first.
    order: Vec<SessionId>,
    active: Option<SessionId>,
}

impl Table {
    fn ordered(&self) -> Vec<Arc<ChatSession>> {
        self.order
            .iter()
            .filter_map(|id| self.sessions.get(id).cloned())
            .collect()
    }
}

/// Session table shared by the facade, the orchestrator and title tasks.
pub struct SessionStore<K: KvStore> {
    table: Mutex<Table>,
    kv: Arc<K>,
    codec: PersistenceCodec,
    events: EventBus,
    write_lock: tokio::sync::Mutex<()>,
}

impl<K: KvStore> SessionStore<K> {
    pub fn new(kv: Arc<K>, codec: PersistenceCodec, events: EventBus) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            kv,
            codec,
            events,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn codec(&self) -> &PersistenceCodec {
        &self.codec
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // --- Lifecycle ---

    /// Read the stored session list and restore it.
    ///
    /// A payload that cannot be parsed at all is deleted so the next start
    /// does not trip over it again. Returns the number of sessions restored.
    pub async fn load(&self) -> usize {
        let bytes = match self.kv.get(SESSIONS_KEY).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return 0,
            Err(e) => {
                warn!(error = %e, "failed to read stored sessions");
                return 0;
            }
        };

        match PersistenceCodec::decode(&bytes) {
            Ok(records) => self.restore(records).await.len(),
            Err(e) => {
                warn!(error = %e, "stored sessions are corrupt, clearing");
                if let Err(e) = self.kv.delete(SESSIONS_KEY).await {
                    warn!(error = %e, "failed to clear corrupt sessions");
                }
                0
            }
        }
    }

    /// Re-create live sessions from records, appending them in record order.
    ///
    /// Records whose id is already present are skipped. The first restored
    /// session becomes active when nothing is active yet.
    pub async fn restore(&self, records: Vec<SessionRecord>) -> Vec<Arc<ChatSession>> {
        let restored: Vec<Arc<ChatSession>> = {
            let mut table = self.table();
            let mut restored = Vec::with_capacity(records.len());
            for record in records {
                if table.sessions.contains_key(&record.id) {
                    debug!(session_id = %record.id, "session already loaded, skipping");
                    continue;
                }
                let session = Arc::new(self.codec.restore(record));
                table.order.push(session.id);
                table.sessions.insert(session.id, Arc::clone(&session));
                restored.push(session);
            }
            if table.active.is_none() {
                table.active = restored.first().map(|s| s.id);
            }
            restored
        };

        info!(count = restored.len(), "restored sessions");
        self.persist().await;
        self.publish_sessions_changed();
        restored
    }

    /// Allocate a new empty session at the front and make it active.
    pub async fn create(&self) -> Arc<ChatSession> {
        let session = Arc::new(ChatSession::new(self.codec.conversation(Vec::new())));
        {
            let mut table = self.table();
            table.order.insert(0, session.id);
            table.sessions.insert(session.id, Arc::clone(&session));
            table.active = Some(session.id);
        }
        debug!(session_id = %session.id, "created session");
        self.persist().await;
        self.publish_sessions_changed();
        session
    }

    /// Make `id` the active session. Unknown ids are ignored.
    pub fn select(&self, id: SessionId) -> bool {
        let selected = {
            let mut table = self.table();
            if table.sessions.contains_key(&id) {
                table.active = Some(id);
                true
            } else {
                false
            }
        };
        if selected {
            self.publish_sessions_changed();
        }
        selected
    }

    /// Remove a session. If it was active, the new front becomes active.
    pub async fn delete(&self, id: SessionId) -> bool {
        let removed = {
            let mut table = self.table();
            let removed = table.sessions.remove(&id).is_some();
            if removed {
                table.order.retain(|other| *other != id);
                if table.active == Some(id) {
                    table.active = table.order.first().copied();
                }
            }
            removed
        };
        if removed {
            debug!(session_id = %id, "deleted session");
            self.persist().await;
            self.publish_sessions_changed();
        }
        removed
    }

    /// Drop every in-memory session. Storage is left untouched.
    pub fn clear(&self) {
        {
            let mut table = self.table();
            *table = Table::default();
        }
        self.publish_sessions_changed();
    }

    // --- Reads ---

    /// Sessions in display order.
    pub fn list(&self) -> Vec<Arc<ChatSession>> {
        self.table().ordered()
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<ChatSession>> {
        self.table().sessions.get(&id).cloned()
    }

    pub fn active_id(&self) -> Option<SessionId> {
        self.table().active
    }

    pub fn active(&self) -> Option<Arc<ChatSession>> {
        let table = self.table();
        table.active.and_then(|id| table.sessions.get(&id).cloned())
    }

    pub fn len(&self) -> usize {
        self.table().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // --- Mutations ---

    /// Apply a structural mutation to one session and persist the result.
    ///
    /// Returns `None` if the session no longer exists.
    pub async fn update<R>(&self, id: SessionId, f: impl FnOnce(&mut ChatSession) -> R) -> Option<R> {
        let result = self.apply(id, f)?;
        self.persist().await;
        Some(result)
    }

    /// Apply a mutation that is visible immediately but not persisted.
    ///
    /// Used for streaming flushes, which are superseded by the final text.
    pub fn update_transient<R>(&self, id: SessionId, f: impl FnOnce(&mut ChatSession) -> R) -> Option<R> {
        self.apply(id, f)
    }

    /// Replace the title of a session and announce it.
    pub async fn set_title(&self, id: SessionId, title: String) -> bool {
        let updated = self
            .update(id, |session| session.title = title.clone())
            .await
            .is_some();
        if updated {
            info!(session_id = %id, title = %title, "session titled");
            self.events.publish(SessionEvent::TitleChanged {
                session_id: id,
                title,
            });
        }
        updated
    }

    fn apply<R>(&self, id: SessionId, f: impl FnOnce(&mut ChatSession) -> R) -> Option<R> {
        let mut table = self.table();
        let current = table.sessions.get(&id)?;
        let mut next = ChatSession::clone(current);
        let result = f(&mut next);
        table.sessions.insert(id, Arc::new(next));
        Some(result)
    }

    /// Write the full session list through to storage.
    ///
    /// The snapshot is taken after the write lock is acquired, so a slower
    /// writer can never overwrite a newer list with an older one.
    async fn persist(&self) {
        let _guard = self.write_lock.lock().await;
        let records: Vec<SessionRecord> = self
            .list()
            .iter()
            .map(|session| PersistenceCodec::to_record(session))
            .collect();

        let bytes = match PersistenceCodec::encode(&records) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode sessions");
                return;
            }
        };
        if let Err(e) = self.kv.set(SESSIONS_KEY, &bytes).await {
            warn!(error = %e, sessions = records.len(), "failed to persist sessions");
        }
    }

    fn publish_sessions_changed(&self) {
        let active = self.active_id();
        self.events.publish(SessionEvent::SessionsChanged { active });
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
