//! Connection registry and outbound delivery

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

use crate::ws::protocol::ServerMsg;

use super::SessionId;

/// One serialized text frame, shared between all recipients of a broadcast
pub type Frame = Arc<str>;

/// Write half of a session, drained by its socket writer task
pub type Outbound = mpsc::Sender<Frame>;

/// Outbound delivery failure for a single recipient
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Connection is closed")]
    Closed,

    #[error("Outbound queue is full")]
    Full,
}

/// Live connections keyed by server-assigned id
#[derive(Debug)]
pub struct ConnectionRegistry {
    // Ids only grow, so key order is insertion order
    connections: BTreeMap<SessionId, Outbound>,
    last_id: SessionId,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
            last_id: 0,
        }
    }

    /// Store a connection under the next id, starting at 1
    pub fn register(&mut self, outbound: Outbound) -> SessionId {
        self.last_id += 1;
        self.connections.insert(self.last_id, outbound);
        self.last_id
    }

    /// Drop a connection. Returns false if it was not registered.
    pub fn unregister(&mut self, id: SessionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub fn lookup(&self, id: SessionId) -> Option<&Outbound> {
        self.connections.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Visit every live connection in registration order
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(SessionId, &Outbound),
    {
        for (id, outbound) in &self.connections {
            f(*id, outbound);
        }
    }

    /// Unicast. Delivery faults are logged, never returned.
    pub fn send(&self, id: SessionId, msg: &ServerMsg) {
        let Some(outbound) = self.lookup(id) else {
            debug!(session_id = id, "Send to unknown session skipped");
            return;
        };
        let Some(frame) = encode(msg) else {
            return;
        };
        if let Err(e) = deliver(outbound, frame) {
            log_delivery_failure(id, &e);
        }
    }

    /// Serialize once and deliver to every session except `exclude`
    pub fn broadcast(&self, msg: &ServerMsg, exclude: Option<SessionId>) {
        let Some(frame) = encode(msg) else {
            return;
        };
        self.for_each(|id, outbound| {
            if Some(id) == exclude {
                return;
            }
            if let Err(e) = deliver(outbound, frame.clone()) {
                log_delivery_failure(id, &e);
            }
        });
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a server message into a shareable frame
fn encode(msg: &ServerMsg) -> Option<Frame> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Frame::from(json)),
        Err(e) => {
            error!(error = %e, "Failed to serialize server message");
            None
        }
    }
}

/// Queue a frame without waiting on the socket
fn deliver(outbound: &Outbound, frame: Frame) -> Result<(), DeliveryError> {
    outbound.try_send(frame).map_err(|e| match e {
        TrySendError::Full(_) => DeliveryError::Full,
        TrySendError::Closed(_) => DeliveryError::Closed,
    })
}

fn log_delivery_failure(id: SessionId, e: &DeliveryError) {
    match e {
        // The reader side reports the disconnect
        DeliveryError::Closed => debug!(session_id = id, error = %e, "Dropped frame"),
        DeliveryError::Full => warn!(session_id = id, error = %e, "Dropped frame for slow client"),
    }
}
