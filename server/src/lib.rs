//! # Synchronization Server Library
//!
//! Authoritative side of the state-synchronization protocol. The server owns
//! the canonical registry, applies client input deltas, runs the fixed-step
//! simulation and sends every client a packet with the current component
//! states and the index of the last input it applied for that client.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! [`game::ServerEcs`] wraps the shared registry with per-client
//! acknowledgement tracking, a destroyed-entity list and a pluggable
//! [`game::RelevancePolicy`]. Game wiring for joins and leaves goes through
//! [`game::SessionHandler`].
//!
//! ### Client Manager Module (`client_manager`)
//! Transport sessions: address to client id mapping, capacity and timeouts.
//!
//! ### Network Module (`network`)
//! UDP socket tasks and the `select!` loop that interleaves inbound messages
//! with simulation ticks.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game::{MoverSpawner, ServerEcs};
//! use server::network::{Server, ServerSettings};
//! use shared::time::utc_seconds;
//! use shared::{demo_builder, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let game = ServerEcs::new(demo_builder(SyncConfig::default()).build(), utc_seconds());
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         game,
//!         Box::new(MoverSpawner::new()),
//!         ServerSettings::default(),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The loop runs on the calling task. Receiving, sending and timeout checks
//! run on their own tokio tasks and talk to the loop through unbounded
//! channels, so the registry is only ever touched by the loop itself.

pub mod client_manager;
pub mod game;
pub mod network;
