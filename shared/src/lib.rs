//! Shared state-synchronization core used by both the server and the client.
//!
//! The server runs an authoritative [`Ecs`] and ships component states in
//! [`ServerPacket`]s. Clients mirror it: components of the locally controlled
//! entity are predicted and reconciled against the server, everything else is
//! dead-reckoned between snapshots.

pub mod component;
pub mod components;
pub mod config;
pub mod ecs;
pub mod error;
pub mod input;
pub mod interpolation;
pub mod packet;
pub mod prediction;
pub mod state;
pub mod time;

pub use component::{Component, SyncComponent, SyncProperty, SyncSchema, Synced, TickContext};
pub use components::{demo_builder, Mover, MOVER_SIZE, WORLD_HEIGHT, WORLD_WIDTH};
pub use config::SyncConfig;
pub use ecs::{Ecs, EcsBuilder, Entity, EntityId, EntitySnapshot, RowOptions, SyncRole};
pub use error::{SyncError, SyncResult};
pub use input::{InputChannel, InputDelta, InputFrame, KeyCode};
pub use packet::{
    decode, encode, ClientPacket, ComponentUpdate, EntityUpdate, EntityUpdateKind, Message,
    PacketCounter, ServerPacket, PROTOCOL_VERSION,
};
pub use state::{compress_number, ComponentState, Value};
pub use time::Time;
