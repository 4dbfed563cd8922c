use std::net::SocketAddr;

use glide::{ClientId, EntityId};

#[derive(Debug, Clone)]
pub enum ServerEvent {
    ClientConnected {
        client_id: ClientId,
        addr: SocketAddr,
        entity_id: EntityId,
    },
    ClientDisconnected {
        client_id: ClientId,
        reason: DisconnectReason,
    },
    ConnectionDenied {
        addr: SocketAddr,
        reason: String,
    },
    EntityOrphaned {
        entity_id: EntityId,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum DisconnectReason {
    Graceful,
    Timeout,
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Graceful => "disconnected",
            DisconnectReason::Timeout => "timed out",
            DisconnectReason::Shutdown => "dropped at shutdown",
        }
    }
}
