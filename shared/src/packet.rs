//! Wire packets and the bincode envelope carried over UDP

use crate::ecs::EntitySnapshot;
use crate::error::{SyncError, SyncResult};
use crate::input::InputDelta;
use crate::state::ComponentState;
use serde::{Deserialize, Serialize};

/// Bumped whenever the envelope layout changes
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityUpdateKind {
    Update,
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentUpdate {
    pub row: u16,
    pub state: ComponentState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub id: String,
    pub kind: EntityUpdateKind,
    /// Id of the controlling client
    pub owner: Option<String>,
    pub components: Option<Vec<ComponentUpdate>>,
}

impl EntityUpdate {
    pub fn update(id: impl Into<String>, owner: Option<String>, components: Vec<ComponentUpdate>) -> Self {
        Self {
            id: id.into(),
            kind: EntityUpdateKind::Update,
            owner,
            components: Some(components),
        }
    }

    pub fn destroyed(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: EntityUpdateKind::Destroyed,
            owner: None,
            components: None,
        }
    }
}

impl From<EntitySnapshot> for EntityUpdate {
    fn from(snapshot: EntitySnapshot) -> Self {
        let components = snapshot
            .components
            .into_iter()
            .map(|(row, state)| ComponentUpdate {
                row: row as u16,
                state,
            })
            .collect();
        EntityUpdate::update(snapshot.id, snapshot.owner, components)
    }
}

/// Server to client: full state of the relevant entities.
///
/// `ix` is the index of the last client packet the server applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerPacket {
    pub ix: u32,
    pub entities: Vec<EntityUpdate>,
}

/// Client to server: one input delta and its outgoing index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientPacket {
    pub ix: u32,
    pub input: Option<InputDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Connect { client_version: u32 },
    Connected { client_id: String },
    Disconnect,
    Disconnected { reason: String },
    State(ServerPacket),
    Input(ClientPacket),
}

pub fn encode(message: &Message) -> SyncResult<Vec<u8>> {
    bincode::serialize(message).map_err(|e| SyncError::Encode(e.to_string()))
}

pub fn decode(bytes: &[u8]) -> SyncResult<Message> {
    bincode::deserialize(bytes).map_err(|e| SyncError::Decode(e.to_string()))
}

/// Per-instance outgoing packet index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketCounter {
    current: u32,
}

impl PacketCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the counter and returns the new index
    pub fn next(&mut self) -> u32 {
        self.current = self.current.wrapping_add(1);
        self.current
    }

    pub fn current(&self) -> u32 {
        self.current
    }
}
