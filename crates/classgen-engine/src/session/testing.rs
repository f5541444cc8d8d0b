//! In-memory transports for driving sessions in tests.
#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::channel::mpsc as remote;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};

use super::{Connector, Transport};
use crate::error::{EngineError, Result};
use crate::protocol::ServerFrame;

/// Hands out prepared in-memory transports, one per connect attempt.
#[derive(Clone, Default)]
pub(crate) struct ScriptedConnector {
    plan: Arc<Mutex<VecDeque<Transport>>>,
    attempts: Arc<AtomicUsize>,
}

/// The service side of one prepared transport.
pub(crate) struct Remote {
    to_client: remote::UnboundedSender<Result<String>>,
    from_client: remote::UnboundedReceiver<String>,
}

impl ScriptedConnector {
    pub(crate) fn accept(&self) -> Remote {
        let (to_client, client_rx) = remote::unbounded();
        let (client_tx, from_client) = remote::unbounded();
        let transport = Transport {
            sink: Box::pin(client_tx.sink_map_err(|e| EngineError::transport(e.to_string()))),
            stream: client_rx.boxed(),
        };
        self.plan.lock().unwrap().push_back(transport);
        Remote {
            to_client,
            from_client,
        }
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, _url: &str) -> BoxFuture<'static, Result<Transport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.plan.lock().unwrap().pop_front();
        Box::pin(async move { next.ok_or_else(|| EngineError::transport("connection refused")) })
    }
}

impl Remote {
    pub(crate) fn frame(&self, frame: &ServerFrame) {
        let _ = self.to_client.unbounded_send(Ok(frame.encode()));
    }

    pub(crate) async fn prompt(&mut self) -> String {
        self.from_client.next().await.unwrap()
    }
}

