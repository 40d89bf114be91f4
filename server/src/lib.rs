//! # Boss Raid Server Library
//!
//! Authoritative server for a cooperative clicker boss battle: many
//! clients send attack events against one shared boss, and every
//! connected viewer sees every hit.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Combat State
//! The server owns the only copy of the boss HP, the shared hero stats,
//! the global combo streak, and the bounded attack log. Clients render
//! whatever the server broadcasts; they never compute damage themselves.
//!
//! ### Fairness
//! Attacks are rate-limited per username (500 ms cooldown). Usernames
//! are unauthenticated strings; the cooldown is a fairness mechanism,
//! not a security boundary.
//!
//! ### Shared-Spectacle Broadcasting
//! Every accepted attack result is fanned out to all connected clients,
//! as are resets and the (delayed) defeat announcement. Rejections go
//! only to the offending client.
//!
//! ## Architecture
//!
//! A single event-loop task owns all mutable game state. Receiver,
//! sender, and timeout-sweep tasks communicate with it over mpsc
//! channels, so no attack can interleave with another: the shared combo
//! counter and boss HP are mutated from exactly one place.
//!
//! ## Module Organization
//!
//! - [`engine`] — combat state machine: boss, hero, combo, attack log.
//! - [`session`] — acceptance rules in front of the engine: username
//!   validation and the per-user cooldown registry.
//! - [`client_manager`] — registry of connected clients for broadcast
//!   fan-out, with liveness timeouts.
//! - [`network`] — UDP transport, packet dispatch, and the event loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::session::GameSession;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = GameSession::default();
//!     let mut server = Server::new("127.0.0.1:8080", 64, session).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod engine;
pub mod network;
pub mod session;
