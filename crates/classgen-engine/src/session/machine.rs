//! Sans-IO connection state machine.
//!
//! Every input returns the effects the driver must perform. Nothing here
//! touches the network or the clock, which keeps the reconnect and close
//! rules testable on their own.

use tracing::{debug, info, warn};

use super::{ConnectionState, SessionEvent};
use crate::assembler::StreamAssembler;
use crate::protocol::ServerFrame;

/// Work the driver performs on behalf of the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Effect {
    /// Start opening a transport for the current epoch.
    Connect,
    /// Start the retry timer.
    ScheduleRetry,
    /// Write an encoded prompt to the transport.
    Transmit(String),
    /// Drop the transport and any pending connect.
    DropTransport,
    /// Deliver an event to the handle.
    Emit(SessionEvent),
}

/// Why a send was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendRejection {
    NotConnected(ConnectionState),
    Busy,
    Closed,
}

#[derive(Debug)]
pub(crate) struct SessionMachine {
    state: ConnectionState,
    epoch: u64,
    closed: bool,
    assembler: StreamAssembler,
}

impl SessionMachine {
    pub(crate) fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
            epoch: 0,
            closed: false,
            assembler: StreamAssembler::new(),
        }
    }

    pub(crate) const fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) const fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Begins the first connection attempt.
    pub(crate) fn start(&mut self) -> Vec<Effect> {
        self.epoch += 1;
        self.state = ConnectionState::Connecting;
        vec![
            Effect::Emit(SessionEvent::State(ConnectionState::Connecting)),
            Effect::Connect,
        ]
    }

    /// A transport opened for `epoch`.
    pub(crate) fn on_connected(&mut self, epoch: u64) -> Vec<Effect> {
        if self.closed || epoch != self.epoch {
            debug!(epoch, current = self.epoch, "Discarding stale transport");
            return vec![Effect::DropTransport];
        }
        match self.state {
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                info!(epoch, "Connection open");
                self.state = ConnectionState::Open;
                vec![Effect::Emit(SessionEvent::State(ConnectionState::Open))]
            }
            _ => Vec::new(),
        }
    }

    /// Opening a transport for `epoch` failed.
    pub(crate) fn on_connect_failed(&mut self, epoch: u64, reason: &str) -> Vec<Effect> {
        if self.closed || epoch != self.epoch {
            return Vec::new();
        }
        debug!(epoch, reason, "Connect attempt failed");
        self.enter_reconnecting(reason)
    }

    /// The transport opened for `epoch` failed or was closed by the remote.
    pub(crate) fn on_transport_lost(&mut self, epoch: u64, reason: &str) -> Vec<Effect> {
        if self.closed || epoch != self.epoch {
            return Vec::new();
        }
        if !matches!(
            self.state,
            ConnectionState::Open | ConnectionState::Streaming
        ) {
            return Vec::new();
        }
        let mut effects = vec![Effect::DropTransport];
        effects.extend(self.enter_reconnecting(reason));
        effects
    }

    fn enter_reconnecting(&mut self, reason: &str) -> Vec<Effect> {
        let discarded = self.assembler.abandon();
        if discarded > 0 {
            warn!(discarded, "Abandoning in-flight generation");
        }

        let mut effects = Vec::with_capacity(2);
        if self.state != ConnectionState::Reconnecting {
            info!(reason, "Connection lost, will retry");
            self.state = ConnectionState::Reconnecting;
            effects.push(Effect::Emit(SessionEvent::State(
                ConnectionState::Reconnecting,
            )));
        }
        effects.push(Effect::ScheduleRetry);
        effects
    }

    /// The retry timer fired.
    pub(crate) fn on_retry_elapsed(&mut self) -> Vec<Effect> {
        if self.closed || self.state != ConnectionState::Reconnecting {
            return Vec::new();
        }
        self.epoch += 1;
        debug!(epoch = self.epoch, "Retrying connection");
        vec![Effect::Connect]
    }

    /// Starts a generation request with an already encoded payload.
    pub(crate) fn send(&mut self, payload: String) -> Result<Vec<Effect>, SendRejection> {
        match self.state {
            ConnectionState::Open => {
                self.assembler.begin();
                self.state = ConnectionState::Streaming;
                Ok(vec![
                    Effect::Emit(SessionEvent::State(ConnectionState::Streaming)),
                    Effect::Transmit(payload),
                ])
            }
            ConnectionState::Streaming => Err(SendRejection::Busy),
            ConnectionState::Closed => Err(SendRejection::Closed),
            state @ (ConnectionState::Connecting | ConnectionState::Reconnecting) => {
                Err(SendRejection::NotConnected(state))
            }
        }
    }

    /// A frame arrived on the transport opened for `epoch`.
    pub(crate) fn on_frame(&mut self, epoch: u64, frame: ServerFrame) -> Vec<Effect> {
        if self.closed || epoch != self.epoch {
            debug!(epoch, frame = frame.frame_name(), "Ignoring frame from stale transport");
            return Vec::new();
        }

        match frame {
            ServerFrame::Token { content } => {
                if self.assembler.on_fragment(&content) {
                    vec![Effect::Emit(SessionEvent::Fragment(content))]
                } else {
                    Vec::new()
                }
            }
            ServerFrame::Done { full_response } => match self.assembler.on_complete(full_response) {
                Some(text) => {
                    debug!(len = text.text.len(), source = ?text.source, "Generation complete");
                    self.state = ConnectionState::Open;
                    vec![
                        Effect::Emit(SessionEvent::Completed(text)),
                        Effect::Emit(SessionEvent::State(ConnectionState::Open)),
                    ]
                }
                None => {
                    debug!("Ignoring completion without an active request");
                    Vec::new()
                }
            },
            ServerFrame::Error { message } => {
                if self.state != ConnectionState::Streaming {
                    warn!(%message, "Service error outside a request");
                    return Vec::new();
                }
                self.assembler.abandon();
                self.state = ConnectionState::Open;
                vec![
                    Effect::Emit(SessionEvent::Failed(message)),
                    Effect::Emit(SessionEvent::State(ConnectionState::Open)),
                ]
            }
        }
    }

    /// Closes the session for good.
    ///
    /// The epoch moves past `floor`, the epoch the handle recorded when it
    /// asked to close, so every event tagged before the close is stale.
    pub(crate) fn close(&mut self, floor: u64) -> Vec<Effect> {
        if self.closed {
            return Vec::new();
        }
        self.closed = true;
        self.epoch = (self.epoch + 1).max(floor);
        self.assembler.abandon();
        self.state = ConnectionState::Closed;
        vec![Effect::DropTransport]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::assembler::{FinalSource, FinalText};

    fn open_machine() -> SessionMachine {
        let mut machine = SessionMachine::new();
        machine.start();
        machine.on_connected(machine.epoch());
        machine
    }

    fn emitted(effects: &[Effect]) -> Vec<SessionEvent> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Emit(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_and_open() {
        let mut machine = SessionMachine::new();
        let effects = machine.start();
        assert_eq!(effects.last(), Some(&Effect::Connect));
        assert_eq!(machine.epoch(), 1);

        let effects = machine.on_connected(1);
        assert_eq!(
            emitted(&effects),
            vec![SessionEvent::State(ConnectionState::Open)]
        );
        assert_eq!(machine.state(), ConnectionState::Open);
    }

    #[test]
    fn test_streaming_round_trip() {
        let mut machine = open_machine();
        let epoch = machine.epoch();

        let effects = machine.send(r#"{"prompt":"x"}"#.to_string()).unwrap();
        assert!(effects.contains(&Effect::Transmit(r#"{"prompt":"x"}"#.to_string())));
        assert_eq!(machine.state(), ConnectionState::Streaming);

        machine.on_frame(epoch, ServerFrame::token("Ques"));
        machine.on_frame(epoch, ServerFrame::token("tion"));
        let effects = machine.on_frame(epoch, ServerFrame::done(Some("ignored".into())));

        assert_eq!(
            emitted(&effects),
            vec![
                SessionEvent::Completed(FinalText {
                    text: "Question".to_string(),
                    source: FinalSource::Buffer,
                }),
                SessionEvent::State(ConnectionState::Open),
            ]
        );
        assert_eq!(machine.state(), ConnectionState::Open);
    }

    #[test]
    fn test_send_rejections() {
        let mut machine = SessionMachine::new();
        machine.start();
        assert_eq!(
            machine.send("p".into()),
            Err(SendRejection::NotConnected(ConnectionState::Connecting))
        );

        machine.on_connected(machine.epoch());
        machine.send("p".into()).unwrap();
        assert_eq!(machine.send("p".into()), Err(SendRejection::Busy));

        machine.close(0);
        assert_eq!(machine.send("p".into()), Err(SendRejection::Closed));
    }

    #[test]
    fn test_remote_error_returns_to_open() {
        let mut machine = open_machine();
        machine.send("p".into()).unwrap();
        let effects = machine.on_frame(machine.epoch(), ServerFrame::error("overloaded"));
        assert_eq!(
            emitted(&effects)[0],
            SessionEvent::Failed("overloaded".to_string())
        );
        assert_eq!(machine.state(), ConnectionState::Open);
    }

    #[test]
    fn test_transport_loss_abandons_request_and_retries() {
        let mut machine = open_machine();
        machine.send("p".into()).unwrap();
        machine.on_frame(machine.epoch(), ServerFrame::token("partial"));

        let effects = machine.on_transport_lost(machine.epoch(), "reset");
        assert_eq!(
            effects,
            vec![
                Effect::DropTransport,
                Effect::Emit(SessionEvent::State(ConnectionState::Reconnecting)),
                Effect::ScheduleRetry,
            ]
        );

        let old_epoch = machine.epoch();
        assert_eq!(machine.on_retry_elapsed(), vec![Effect::Connect]);
        assert_eq!(machine.epoch(), old_epoch + 1);

        // A failed retry schedules another one without repeating the state event
        let effects = machine.on_connect_failed(machine.epoch(), "refused");
        assert_eq!(effects, vec![Effect::ScheduleRetry]);

        machine.on_retry_elapsed();
        machine.on_connected(machine.epoch());
        assert_eq!(machine.state(), ConnectionState::Open);

        // The abandoned request produces no completion
        let effects = machine.on_frame(machine.epoch(), ServerFrame::done(None));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_close_makes_retry_a_no_op() {
        let mut machine = open_machine();
        machine.on_transport_lost(machine.epoch(), "reset");

        assert_eq!(machine.close(0), vec![Effect::DropTransport]);
        assert!(machine.on_retry_elapsed().is_empty());
        assert_eq!(machine.on_connected(machine.epoch()), vec![Effect::DropTransport]);
        assert!(machine
            .on_frame(machine.epoch(), ServerFrame::token("late"))
            .is_empty());
        assert!(machine.close(0).is_empty());
        assert_eq!(machine.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_close_moves_epoch_past_floor() {
        let mut machine = open_machine();
        machine.close(10);
        assert_eq!(machine.epoch(), 10);
    }

    #[test]
    fn test_stale_epoch_frames_are_ignored() {
        let mut machine = open_machine();
        machine.send("p".into()).unwrap();
        let stale = machine.epoch() - 1;
        assert!(machine.on_frame(stale, ServerFrame::token("x")).is_empty());
        assert!(machine.on_transport_lost(stale, "old").is_empty());
        assert_eq!(machine.state(), ConnectionState::Streaming);
    }
}
