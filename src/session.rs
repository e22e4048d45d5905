use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::events::InboundFileRef;

/// In-flight upload awaiting a naming decision from the admin.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub file: InboundFileRef,
    pub original_name: String,
    /// Transport message the upload was initiated from, if the transport
    /// supplies one.
    pub origin_message: Option<i64>,
}

/// Tracks at most one pending upload per actor. All transitions lock the
/// whole map; nothing is held across an await, so the lock is never
/// contended for longer than a map operation.
#[derive(Default)]
pub struct UploadSessions {
    inner: Mutex<HashMap<i64, UploadSession>>,
}

impl UploadSessions {
    /// Opens a session for the actor. An already-pending session is
    /// silently replaced; returns whether one was.
    pub async fn begin(&self, actor_id: i64, session: UploadSession) -> bool {
        let mut guard = self.inner.lock().await;
        guard.insert(actor_id, session).is_some()
    }

    /// Consumes the pending session, if any. Resolution must only remove
    /// the session once the supplied name has been validated.
    pub async fn take(&self, actor_id: i64) -> Option<UploadSession> {
        let mut guard = self.inner.lock().await;
        guard.remove(&actor_id)
    }

    pub async fn is_pending(&self, actor_id: i64) -> bool {
        let guard = self.inner.lock().await;
        guard.contains_key(&actor_id)
    }

    /// Peeks at the pending original name without consuming the session.
    pub async fn original_name(&self, actor_id: i64) -> Option<String> {
        let guard = self.inner.lock().await;
        guard.get(&actor_id).map(|s| s.original_name.clone())
    }

    /// Drops the session with no catalog side effects; returns whether one
    /// existed.
    pub async fn cancel(&self, actor_id: i64) -> bool {
        let mut guard = self.inner.lock().await;
        guard.remove(&actor_id).is_some()
    }
}
