//! Authoritative game state and the event loop that owns it

pub mod registry;
pub mod respawn;
mod router;
pub mod server;
pub mod spawn;
pub mod world;

pub use registry::{ConnectionRegistry, Frame, Outbound};
pub use respawn::RespawnScheduler;
pub use server::{GameHandle, GameServer, ServerStats};
pub use spawn::{SpawnCycle, SpawnPoint};
pub use world::{PlayerPhase, PlayerRecord, WorldState};

use tokio::sync::oneshot;

/// Server-assigned connection identifier
pub type SessionId = u64;

/// Everything the event loop reacts to, processed strictly one at a time
#[derive(Debug)]
pub enum ServerEvent {
    /// A socket was accepted; reply with its id
    Connect {
        outbound: Outbound,
        reply: oneshot::Sender<SessionId>,
    },
    /// A text frame arrived from a session
    Inbound { id: SessionId, text: String },
    /// The socket closed or errored
    Disconnect { id: SessionId },
    /// A respawn timer elapsed
    RespawnDue { id: SessionId, ticket: u64 },
}
