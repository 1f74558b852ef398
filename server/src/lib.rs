//! # Chat Relay Server Library
//!
//! The relay is the meeting point of every chat client. It does not play the
//! games itself: both players of a game run the rules locally, and the relay
//! only decides who is talking to whom.
//!
//! ## Core Responsibilities
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - The identity handshake (first line of every connection)
//! - Identity uniqueness and the capacity limit
//! - `LEFT:<identity>` notices when a connection goes away
//!
//! ### Relaying
//! - Untagged lines are chat, forwarded to everyone else as `sender: text`
//! - Game offers (`NEW_*`) are broadcast and replayed to late joiners
//! - The first join request for an open game wins; both players get the
//!   acknowledgement and everyone sees the `START_*` announcement
//! - Moves, results and reset negotiation go to the opponent only
//! - A player who exits or disconnects ends each of their games for everyone
//!
//! ## Architecture Design
//!
//! ### Single Relay Loop
//! Each socket gets a reader task and a writer task. Readers forward lines to
//! one relay loop over a channel; the loop owns the client registry and the
//! game table and handles messages one at a time, so relay decisions are
//! never racing each other. Arrival order at the loop is the tie breaker for
//! competing join requests.
//!
//! ## Module Organization
//!
//! - `client_manager`: connected clients keyed by connection id
//! - `relay`: the game table and the routing decision for every frame
//! - `network`: TCP accept loop, connection tasks and the relay loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bind on the default port and admit at most 32 clients
//!     let server = Server::new("127.0.0.1:12345", 32).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod network;
pub mod relay;
