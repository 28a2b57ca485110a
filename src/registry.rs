//! Registry of active sessions
//!
//! Maps each logged-in handle to its session. Arbitrates name
//! uniqueness and provides the member list for WHO, broadcast and
//! DM routing.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RegistryError;
use crate::session::Session;
use crate::types::Handle;

/// Concurrent handle → session map
///
/// Writers (register, unregister) take the lock exclusively; readers
/// (lookup, snapshot, fan-out) share it. No await happens while the
/// lock is held.
#[derive(Debug, Default)]
pub struct Registry {
    members: RwLock<HashMap<Handle, Arc<Session>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim the session's handle
    ///
    /// Fails without touching the map if the handle is already held.
    pub async fn register(&self, session: Arc<Session>) -> Result<(), RegistryError> {
        let mut members = self.members.write().await;
        if members.contains_key(&session.handle) {
            return Err(RegistryError::AlreadyTaken(session.handle.to_string()));
        }
        debug!(handle = %session.handle, "registered");
        members.insert(session.handle.clone(), session);
        Ok(())
    }

    /// Remove a handle; a missing handle is not an error
    ///
    /// Returns whether anything was removed.
    pub async fn unregister(&self, handle: &str) -> bool {
        let removed = self.members.write().await.remove(handle).is_some();
        if removed {
            debug!(%handle, "unregistered");
        }
        removed
    }

    /// Look up a session by handle
    pub async fn lookup(&self, handle: &str) -> Option<Arc<Session>> {
        self.members.read().await.get(handle).cloned()
    }

    /// Point-in-time copy of all registered handles
    pub async fn snapshot(&self) -> Vec<String> {
        self.members
            .read()
            .await
            .keys()
            .map(|handle| handle.to_string())
            .collect()
    }

    /// Run `f` over every registered session under shared access
    ///
    /// `f` must not block; it runs inside the critical section.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Session),
    {
        let members = self.members.read().await;
        for session in members.values() {
            f(session);
        }
    }

    /// Membership checks for embedders; the server itself only logs `len`
    pub async fn contains(&self, handle: &str) -> bool {
        self.members.read().await.contains_key(handle)
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}
