//! The tokio task that runs one session.
//!
//! The driver owns the transport, the pending connect and the retry timer.
//! It feeds what happens on them into the [`SessionMachine`] and performs the
//! effects it returns.

use std::collections::VecDeque;
use std::future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tracing::{debug, warn};

use super::connector::{Connector, Transport};
use super::machine::{Effect, SendRejection, SessionMachine};
use super::{Identity, SessionEvent};
use crate::error::{EngineError, Result};
use crate::protocol::ServerFrame;

/// A request from the handle.
#[derive(Debug)]
pub(crate) enum Command {
    Send {
        payload: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        floor: u64,
    },
}

/// An event tagged with the epoch it was emitted in.
#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) epoch: u64,
    pub(crate) event: SessionEvent,
}

type PendingConnect = (u64, BoxFuture<'static, Result<Transport>>);

pub(crate) struct Driver {
    identity: Identity,
    url: String,
    retry_delay: Duration,
    connector: Arc<dyn Connector>,
    machine: SessionMachine,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<Envelope>,
    shared_epoch: Arc<AtomicU64>,
    transport: Option<Transport>,
    transport_epoch: u64,
    connecting: Option<PendingConnect>,
    retry: Option<Pin<Box<Sleep>>>,
}

impl Driver {
    pub(crate) fn new(
        identity: Identity,
        url: String,
        retry_delay: Duration,
        connector: Arc<dyn Connector>,
        commands: mpsc::Receiver<Command>,
        events: mpsc::Sender<Envelope>,
        shared_epoch: Arc<AtomicU64>,
    ) -> Self {
        Self {
            identity,
            url,
            retry_delay,
            connector,
            machine: SessionMachine::new(),
            commands,
            events,
            shared_epoch,
            transport: None,
            transport_epoch: 0,
            connecting: None,
            retry: None,
        }
    }

    pub(crate) async fn run(mut self) {
        let effects = self.machine.start();
        self.perform(effects).await;

        while !self.machine.is_closed() {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Send { payload, reply }) => {
                        self.handle_send(payload, reply).await;
                    }
                    Some(Command::Close { floor }) => {
                        let effects = self.machine.close(floor);
                        self.perform(effects).await;
                    }
                    None => {
                        debug!(identity = %self.identity, "Handle dropped, closing session");
                        let effects = self.machine.close(0);
                        self.perform(effects).await;
                    }
                },
                (epoch, result) = pending_connect(&mut self.connecting) => {
                    self.connecting = None;
                    let effects = match result {
                        Ok(transport) => {
                            self.transport = Some(transport);
                            self.transport_epoch = epoch;
                            self.machine.on_connected(epoch)
                        }
                        Err(e) => self.machine.on_connect_failed(epoch, &e.to_string()),
                    };
                    self.perform(effects).await;
                },
                frame = next_frame(&mut self.transport) => {
                    let epoch = self.transport_epoch;
                    let effects = match frame {
                        Some(Ok(text)) => match ServerFrame::decode(&text) {
                            Some(frame) => self.machine.on_frame(epoch, frame),
                            None => Vec::new(),
                        },
                        Some(Err(e)) => self.machine.on_transport_lost(epoch, &e.to_string()),
                        None => self.machine.on_transport_lost(epoch, "closed by remote"),
                    };
                    self.perform(effects).await;
                },
                () = retry_elapsed(&mut self.retry) => {
                    self.retry = None;
                    let effects = self.machine.on_retry_elapsed();
                    self.perform(effects).await;
                },
            }
        }

        self.shared_epoch
            .fetch_max(self.machine.epoch(), Ordering::SeqCst);
        debug!(identity = %self.identity, "Session driver stopped");
    }

    async fn handle_send(&mut self, payload: String, reply: oneshot::Sender<Result<()>>) {
        match self.machine.send(payload) {
            Ok(effects) => {
                self.perform(effects).await;
                let _ = reply.send(Ok(()));
            }
            Err(rejection) => {
                let error = match rejection {
                    SendRejection::NotConnected(state) => {
                        EngineError::not_connected(&self.identity, state)
                    }
                    SendRejection::Busy => EngineError::busy(&self.identity),
                    SendRejection::Closed => EngineError::session_closed(&self.identity),
                };
                let _ = reply.send(Err(error));
            }
        }
    }

    async fn perform(&mut self, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Connect => {
                    debug!(
                        identity = %self.identity,
                        url = %self.url,
                        epoch = self.machine.epoch(),
                        "Connecting"
                    );
                    let attempt = self.connector.connect(&self.url);
                    self.connecting = Some((self.machine.epoch(), attempt));
                }
                Effect::ScheduleRetry => {
                    self.retry = Some(Box::pin(tokio::time::sleep(self.retry_delay)));
                }
                Effect::DropTransport => {
                    self.transport = None;
                    self.connecting = None;
                    if self.machine.is_closed() {
                        self.retry = None;
                    }
                }
                Effect::Transmit(payload) => {
                    let sent = match self.transport.as_mut() {
                        Some(transport) => transport.sink.send(payload).await,
                        None => Err(EngineError::transport("no open transport")),
                    };
                    if let Err(e) = sent {
                        warn!(identity = %self.identity, error = %e, "Failed to send prompt");
                        queue.extend(
                            self.machine
                                .on_transport_lost(self.transport_epoch, &e.to_string()),
                        );
                    }
                }
                Effect::Emit(event) => self.emit(event).await,
            }
        }
        self.shared_epoch
            .fetch_max(self.machine.epoch(), Ordering::SeqCst);
    }

    async fn emit(&mut self, event: SessionEvent) {
        let epoch = self.machine.epoch();
        let current = self.shared_epoch.fetch_max(epoch, Ordering::SeqCst).max(epoch);
        if current != epoch {
            debug!(identity = %self.identity, epoch, current, "Dropping stale event");
            return;
        }
        if self.events.send(Envelope { epoch, event }).await.is_err() {
            debug!(identity = %self.identity, "Event receiver gone");
        }
    }
}

async fn pending_connect(connecting: &mut Option<PendingConnect>) -> (u64, Result<Transport>) {
    match connecting {
        Some((epoch, attempt)) => (*epoch, attempt.await),
        None => future::pending().await,
    }
}

async fn next_frame(transport: &mut Option<Transport>) -> Option<Result<String>> {
    match transport {
        Some(transport) => transport.stream.next().await,
        None => future::pending().await,
    }
}

async fn retry_elapsed(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}
