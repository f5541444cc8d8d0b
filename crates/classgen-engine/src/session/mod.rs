//! Connection sessions to the generation service.
//!
//! A session is keyed by an [`Identity`] (owner plus purpose) and owns one
//! long-lived transport. A background task drives it through
//! `Connecting -> Open <-> Streaming`, falls back to `Reconnecting` when the
//! transport drops, and stops for good at `Closed`.
//!
//! Every open and every close moves the session to a new epoch. Events are
//! tagged with the epoch they were emitted in, and both the driver and the
//! [`SessionHandle`] drop events from an epoch that has been closed, so
//! nothing reaches the caller after [`SessionHandle::close`].

mod connector;
mod driver;
mod machine;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use connector::{Connector, FrameSink, FrameStream, Transport, WsConnector};

use crate::assembler::FinalText;
use crate::config::{EngineConfig, PromptField};
use crate::error::{EngineError, Result};
use crate::protocol::encode_prompt;
use driver::{Command, Driver, Envelope};

const COMMAND_CAPACITY: usize = 16;

// ============================================================================
// Identity
// ============================================================================

/// The key a session is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    /// The user the session belongs to.
    pub owner: String,
    /// The purpose key, such as `quiz` or `lesson-plan`.
    pub purpose: String,
}

impl Identity {
    /// Creates a new identity.
    #[must_use]
    pub fn new(owner: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            purpose: purpose.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.purpose)
    }
}

// ============================================================================
// State and Events
// ============================================================================

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// The first transport is being opened.
    Connecting,
    /// The transport is open and no request is active.
    Open,
    /// A request is streaming.
    Streaming,
    /// The transport dropped and a retry is pending.
    Reconnecting,
    /// The session was closed. Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if no further transitions can happen.
    ///
    /// # Examples
    ///
    /// ```
    /// use classgen_engine::ConnectionState;
    ///
    /// assert!(ConnectionState::Closed.is_terminal());
    /// assert!(!ConnectionState::Reconnecting.is_terminal());
    /// ```
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns the state name as used in logs and errors.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the caller observes on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection state changed.
    State(ConnectionState),
    /// One streamed fragment of the active request.
    Fragment(String),
    /// The active request finished.
    Completed(FinalText),
    /// The service reported an error for the active request.
    Failed(String),
}

// ============================================================================
// Handle
// ============================================================================

/// Settings for spawning one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Full endpoint URL.
    pub url: String,
    /// Field the prompt is sent under.
    pub prompt_field: PromptField,
    /// Delay before each reconnect attempt.
    pub retry_delay: Duration,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl SessionOptions {
    /// Resolves the options for `identity` from the configuration.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPurpose` if the purpose has no endpoint.
    pub fn from_config(config: &EngineConfig, identity: &Identity) -> Result<Self> {
        let purpose = config.purpose(&identity.purpose)?;
        Ok(Self {
            url: config.endpoint(&identity.purpose, &identity.owner)?,
            prompt_field: purpose.prompt_field,
            retry_delay: config.retry_delay(),
            event_capacity: config.event_capacity,
        })
    }
}

/// The caller's side of a running session.
///
/// Dropping the handle without calling [`close`](Self::close) aborts the
/// background task.
#[derive(Debug)]
pub struct SessionHandle {
    identity: Identity,
    prompt_field: PromptField,
    commands: mpsc::Sender<Command>,
    events: mpsc::Receiver<Envelope>,
    epoch: Arc<AtomicU64>,
    floor: u64,
    state: ConnectionState,
    closed: bool,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Spawns the session task and starts connecting.
    #[must_use]
    pub fn spawn(
        identity: Identity,
        options: SessionOptions,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(options.event_capacity.max(1));
        let epoch = Arc::new(AtomicU64::new(0));

        let driver = Driver::new(
            identity.clone(),
            options.url,
            options.retry_delay,
            connector,
            command_rx,
            event_tx,
            Arc::clone(&epoch),
        );
        let task = tokio::spawn(driver.run());
        info!(%identity, "Session started");

        Self {
            identity,
            prompt_field: options.prompt_field,
            commands: command_tx,
            events: event_rx,
            epoch,
            floor: 0,
            state: ConnectionState::Connecting,
            closed: false,
            task: Some(task),
        }
    }

    /// Returns the session identity.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns the last state this handle observed.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns the current epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Sends a prompt, starting a new request.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if the transport is not open
    /// - `Busy` if another request is streaming
    /// - `SessionClosed` if the session was closed
    pub async fn send(&self, prompt: &str) -> Result<()> {
        if self.closed {
            return Err(EngineError::session_closed(&self.identity));
        }
        let (reply, response) = oneshot::channel();
        let payload = encode_prompt(self.prompt_field, prompt);
        self.commands
            .send(Command::Send { payload, reply })
            .await
            .map_err(|_| EngineError::session_closed(&self.identity))?;
        response
            .await
            .map_err(|_| EngineError::session_closed(&self.identity))?
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the session is closed.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if self.closed {
                return None;
            }
            let envelope = self.events.recv().await?;
            if envelope.epoch < self.floor {
                debug!(
                    identity = %self.identity,
                    epoch = envelope.epoch,
                    "Dropping event from closed epoch"
                );
                continue;
            }
            if let SessionEvent::State(state) = envelope.event {
                self.state = state;
            }
            return Some(envelope.event);
        }
    }

    /// Consumes events until the session reports `Open`.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the session stops first.
    pub async fn wait_until_open(&mut self) -> Result<()> {
        while self.state != ConnectionState::Open {
            if self.next_event().await.is_none() {
                return Err(EngineError::session_closed(&self.identity));
            }
        }
        Ok(())
    }

    /// Closes the session.
    ///
    /// Any pending retry becomes a no-op, the transport is dropped, and no
    /// event is delivered afterwards. Closing twice does nothing.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.state = ConnectionState::Closed;
        self.floor = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.close();

        if self
            .commands
            .send(Command::Close { floor: self.floor })
            .await
            .is_err()
        {
            debug!(identity = %self.identity, "Session task already stopped");
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(identity = %self.identity, error = %e, "Session task failed");
            }
        }
        info!(identity = %self.identity, "Session closed");
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
