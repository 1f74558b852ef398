//! Thread-safe front of the [`Lobby`].
//!
//! The hub is what the router feeds game frames into and what the
//! presentation layer calls. All state sits behind one mutex; the hub collects
//! the resulting actions under the lock and performs them (frames to the sink,
//! events to the observer) after releasing it, so observers may call back into
//! the hub.

use log::{debug, warn};
use shared::{Frame, GameId, GameKind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::connection::FrameSink;
use crate::events::{Action, GameObserver};
use crate::lobby::{GameInvite, Lobby, LobbyError};
use crate::router::FrameHandler;
use crate::session::GameSession;

pub struct GameHub {
    lobby: Mutex<Lobby>,
    sink: Arc<dyn FrameSink>,
    observer: Arc<dyn GameObserver>,
}

impl GameHub {
    pub fn new(
        identity: impl Into<String>,
        sink: Arc<dyn FrameSink>,
        observer: Arc<dyn GameObserver>,
    ) -> Self {
        Self {
            lobby: Mutex::new(Lobby::new(identity)),
            sink,
            observer,
        }
    }

    fn lobby(&self) -> MutexGuard<'_, Lobby> {
        self.lobby.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn perform(&self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send(frame) => {
                    if !self.sink.send_frame(&frame) {
                        warn!("Could not send {}", frame);
                    }
                }
                Action::Notify(event) => self.observer.on_event(&event),
            }
        }
    }

    pub fn identity(&self) -> String {
        self.lobby().identity().to_string()
    }

    /// Announces a new game and returns its id.
    pub fn request_new_game(&self, kind: GameKind) -> GameId {
        let (game_id, actions) = self.lobby().request_new_game(kind);
        self.perform(actions);
        game_id
    }

    pub fn request_join(&self, game_id: &GameId) -> Result<(), LobbyError> {
        let actions = self.lobby().request_join(game_id)?;
        self.perform(actions);
        Ok(())
    }

    pub fn make_move(&self, game_id: &GameId, row: usize, col: usize) -> Result<(), LobbyError> {
        let actions = self.lobby().make_move(game_id, row, col)?;
        self.perform(actions);
        Ok(())
    }

    pub fn request_reset(&self, game_id: &GameId) -> Result<(), LobbyError> {
        let actions = self.lobby().request_reset(game_id)?;
        self.perform(actions);
        Ok(())
    }

    pub fn exit_game(&self, game_id: &GameId) -> Result<(), LobbyError> {
        let actions = self.lobby().exit_game(game_id)?;
        self.perform(actions);
        Ok(())
    }

    /// Leaves every game; used when the client shuts down.
    pub fn exit_all(&self) {
        let actions = self.lobby().exit_all();
        self.perform(actions);
    }

    pub fn invites(&self) -> Vec<GameInvite> {
        self.lobby().invites().cloned().collect()
    }

    /// Snapshot of one running game.
    pub fn session(&self, game_id: &GameId) -> Option<GameSession> {
        self.lobby().session(game_id).cloned()
    }

    pub fn sessions(&self) -> Vec<GameSession> {
        let lobby = self.lobby();
        let mut sessions: Vec<GameSession> = lobby.sessions().cloned().collect();
        sessions.sort_by(|a, b| a.game_id().cmp(b.game_id()));
        sessions
    }
}

impl FrameHandler for GameHub {
    fn handle(&self, frame: &Frame) {
        debug!("Game frame: {}", frame);
        let actions = self.lobby().handle_frame(frame);
        self.perform(actions);
    }
}
