//! # Authoritative Game Server Library
//!
//! This library implements the server half of the multiplayer game: it owns
//! the shared world, resolves every player action against it, and streams
//! consistent snapshots to all connected clients over TCP.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server holds the canonical world: the tile map, every player and
//! enemy, and the growing plants. Clients only ever see snapshots; all
//! movement, combat, planting and harvesting decisions are recomputed here
//! regardless of what a client claims.
//!
//! ### Coordination
//! Every externally triggered mutation enters through the hub, which
//! serializes it against the world, runs collision detection, and fans the
//! resulting events out to dynamically registered observers and to the
//! connected clients.
//!
//! ### State Broadcasting
//! Every externally triggered event causes an immediate full-state
//! broadcast, and the fixed-rate simulation tick broadcasts once per step
//! on top of that. Broadcast fan-out never lets one slow or dead
//! connection block delivery to the rest.
//!
//! ## Module Organization
//!
//! - [`tiles`] / [`map`]: tile identity, enter side effects, and the
//!   tile grid loaded once at startup from a plain-text file.
//! - [`movement`]: movement strategies and the tile-driven transitions
//!   between them.
//! - [`entity`] / [`world`]: players, enemies, plants, and the root
//!   composite that owns them all behind defensive-copy accessors.
//! - [`combat`]: attack geometry per role, re-fire tracking, and the
//!   ordered damage-modifier pipeline with its difficulty presets.
//! - [`hub`]: the mediator everything above is wired into.
//! - [`network`]: TCP accept loop, per-connection receive loops, and the
//!   broadcast fan-out.
//! - [`error`]: the server error taxonomy.
//!
//! ## Concurrency Model
//!
//! One task accepts connections, one task per connection blocks on line
//! reads, and one dedicated task runs the fixed-rate tick. All three mutate
//! shared state exclusively through the hub's and world's locks; attack
//! geometry and damage math are pure and need no locking of their own.
//! Per-connection message order is preserved because each connection has a
//! single reader dispatching synchronously into the hub. Cross-connection
//! ordering is not guaranteed and the design tolerates last-writer-wins on
//! overlapping ticks.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::hub::Hub;
//! use server::map::{Map, DEFAULT_MAP};
//! use server::network::{Broadcaster, Server};
//! use server::world::World;
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let world = World::new(Map::parse(DEFAULT_MAP)?);
//!     let connections = Broadcaster::new();
//!     let hub = Arc::new(Hub::new(world, None, connections.clone()));
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//!     let mut server =
//!         Server::bind("127.0.0.1:5000", hub, connections, shutdown_rx).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod combat;
pub mod entity;
pub mod error;
pub mod hub;
pub mod map;
pub mod movement;
pub mod network;
pub mod tiles;
pub mod utils;
pub mod world;
