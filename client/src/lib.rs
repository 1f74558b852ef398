//! # Chat Client Library
//!
//! Client side of a line-based chat room in which participants can challenge
//! each other to tic-tac-toe and four-in-a-row. The relay server only
//! forwards frames; every rule is evaluated here, by both players, after
//! every move.
//!
//! ## Architecture Overview
//!
//! Inbound lines flow leaf-first through the following components:
//!
//! ### Connection (`connection`)
//! One TCP stream per identity. The first line sent is the identity itself;
//! afterwards a writer task drains an outbound queue and a reader task hands
//! every inbound line to the subscribed listeners in arrival order.
//!
//! ### Router (`router`)
//! Parses each line once into a [`shared::Frame`] and fans it out to the
//! handlers registered for its [`shared::Category`]. Untagged lines are chat.
//!
//! ### Lobby and sessions (`lobby`, `session`)
//! The lobby keeps the invites this client has seen and one
//! [`session::GameSession`] per running game. Both are pure state machines:
//! they return [`events::Action`]s instead of touching the socket.
//!
//! ### Hub (`hub`)
//! Puts the lobby behind a mutex, performs the actions it returns and exposes
//! the entry points a front-end calls (`request_new_game`, `make_move`, ...).
//!
//! ### Presentation (`events`, `console`, `command`)
//! Front-ends implement [`events::GameObserver`]. The bundled terminal
//! front-end parses slash commands and prints events as text or JSON.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::{ChatClient, NullObserver};
//! use shared::GameKind;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ChatClient::new("127.0.0.1:12345", "alice", Arc::new(NullObserver))?;
//! client.connect().await?;
//! client.send_chat("hello everyone");
//! let game_id = client.hub().request_new_game(GameKind::TicTacToe);
//! println!("waiting for an opponent in game {}", game_id);
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod command;
pub mod connection;
pub mod console;
pub mod events;
pub mod hub;
pub mod lobby;
pub mod router;
pub mod session;

pub use chat::{ChatClient, ChatFeed};
pub use connection::{ConnectionError, ConnectionManager, FrameListener, FrameSink};
pub use events::{Action, GameEvent, GameObserver, NullObserver};
pub use hub::GameHub;
pub use lobby::{GameInvite, InviteState, Lobby, LobbyError};
pub use router::{FrameHandler, MessageRouter};
pub use session::{GameSession, MoveError, Phase, ResetState};
