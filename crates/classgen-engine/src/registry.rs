//! At most one live session per identity.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::session::{Connector, Identity, SessionHandle, SessionOptions, WsConnector};

/// Owns the live sessions, keyed by identity.
///
/// Opening a session for an identity that already has one closes the old
/// session first, so its events never mix with the new one's.
pub struct SessionRegistry {
    config: EngineConfig,
    connector: Arc<dyn Connector>,
    sessions: HashMap<Identity, SessionHandle>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("service_url", &self.config.service_url)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Creates a registry that opens transports with `connector`.
    #[must_use]
    pub fn new(config: EngineConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            sessions: HashMap::new(),
        }
    }

    /// Creates a registry that connects over WebSocket.
    #[must_use]
    pub fn websocket(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(WsConnector))
    }

    /// Returns the configuration sessions are opened with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens a session for `identity`, superseding any existing one.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPurpose` if the purpose has no endpoint.
    pub async fn open(&mut self, identity: Identity) -> Result<&mut SessionHandle> {
        let options = SessionOptions::from_config(&self.config, &identity)?;

        if let Some(mut previous) = self.sessions.remove(&identity) {
            info!(%identity, "Superseding existing session");
            previous.close().await;
        }

        let handle = SessionHandle::spawn(identity.clone(), options, Arc::clone(&self.connector));
        Ok(self.sessions.entry(identity).or_insert(handle))
    }

    /// Returns the live session for `identity`.
    pub fn get_mut(&mut self, identity: &Identity) -> Option<&mut SessionHandle> {
        self.sessions.get_mut(identity)
    }

    /// Returns `true` if `identity` has a live session.
    #[must_use]
    pub fn contains(&self, identity: &Identity) -> bool {
        self.sessions.contains_key(identity)
    }

    /// Closes and removes the session for `identity`.
    ///
    /// Returns `false` if there was none.
    pub async fn close(&mut self, identity: &Identity) -> bool {
        match self.sessions.remove(identity) {
            Some(mut handle) => {
                handle.close().await;
                true
            }
            None => false,
        }
    }

    /// Closes every session.
    pub async fn close_all(&mut self) {
        for (_, mut handle) in self.sessions.drain() {
            handle.close().await;
        }
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
