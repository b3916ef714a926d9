//! # Synchronization Client Library
//!
//! Client side of the state-synchronization protocol. A client mirrors the
//! server's registry: components of entities it owns are predicted locally
//! and reconciled when the server acknowledges input, and every other entity
//! is dead-reckoned from the last two snapshots.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! [`game::ClientEcs`] drives the mirror. It records local input per frame,
//! queues one indexed input packet per frame and applies incoming server
//! packets.
//!
//! ### Input Module (`input`)
//! Maps window key events onto the key codes the simulation reads.
//!
//! ### Network Module (`network`)
//! A UDP transport on a background thread, with optional fake latency.
//!
//! ### Rendering Module (`rendering`)
//! Draws movers and a small HUD with connection and latency figures.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::ClientEcs;
//! use shared::time::utc_seconds;
//! use shared::{demo_builder, SyncConfig};
//!
//! let mut game = ClientEcs::new(demo_builder(SyncConfig::default()), "client-1", utc_seconds());
//! game.input_mut().set_key_down(shared::input::KEY_RIGHT);
//! game.tick(utc_seconds()).expect("tick");
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
