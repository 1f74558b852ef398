//! Notifications the game core raises toward the presentation layer.

use serde::Serialize;
use shared::{Frame, GameId, GameKind, Outcome, Player};

/// Everything the presentation layer may want to show.
///
/// Events serialize as tagged JSON objects so a frontend can consume them as a
/// stream (`{"event":"move_applied",...}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    ChatMessage {
        text: String,
    },
    InviteReceived {
        game_id: GameId,
        kind: GameKind,
        initiator: String,
        own: bool,
    },
    /// An open invite disappeared before this client took part in it.
    InviteWithdrawn {
        game_id: GameId,
    },
    JoinAcknowledged {
        game_id: GameId,
        kind: GameKind,
        players: Vec<String>,
    },
    GameStarted {
        game_id: GameId,
        kind: GameKind,
        player1: String,
        player2: String,
        local_player: Player,
    },
    /// Two other users started a game; nothing to play locally.
    GameAnnounced {
        game_id: GameId,
        kind: GameKind,
        player1: String,
        player2: String,
    },
    MoveApplied {
        game_id: GameId,
        row: usize,
        col: usize,
        player: Player,
        local_turn: bool,
    },
    GameEnded {
        game_id: GameId,
        outcome: Outcome,
        local_player: Player,
    },
    OpponentLeft {
        game_id: GameId,
    },
    ResetOffered {
        game_id: GameId,
        requester: String,
    },
    ResetApplied {
        game_id: GameId,
        local_turn: bool,
    },
    GameClosed {
        game_id: GameId,
    },
}

impl GameEvent {
    /// Calls the observer method matching this event.
    pub fn dispatch<O: GameObserver + ?Sized>(&self, observer: &O) {
        match self {
            GameEvent::ChatMessage { text } => observer.on_chat_message(text),
            GameEvent::InviteReceived {
                game_id,
                kind,
                initiator,
                own,
            } => observer.on_game_invite_received(game_id, *kind, initiator, *own),
            GameEvent::InviteWithdrawn { game_id } => observer.on_invite_withdrawn(game_id),
            GameEvent::JoinAcknowledged {
                game_id,
                kind,
                players,
            } => observer.on_join_acknowledged(game_id, *kind, players),
            GameEvent::GameStarted {
                game_id,
                kind,
                player1,
                player2,
                local_player,
            } => observer.on_game_started(game_id, *kind, player1, player2, *local_player),
            GameEvent::GameAnnounced {
                game_id,
                kind,
                player1,
                player2,
            } => observer.on_game_announced(game_id, *kind, player1, player2),
            GameEvent::MoveApplied {
                game_id,
                row,
                col,
                player,
                local_turn,
            } => observer.on_move_applied(game_id, *row, *col, *player, *local_turn),
            GameEvent::GameEnded {
                game_id,
                outcome,
                local_player,
            } => observer.on_game_ended(game_id, *outcome, *local_player),
            GameEvent::OpponentLeft { game_id } => observer.on_opponent_left(game_id),
            GameEvent::ResetOffered { game_id, requester } => {
                observer.on_reset_offered(game_id, requester)
            }
            GameEvent::ResetApplied {
                game_id,
                local_turn,
            } => observer.on_reset_applied(game_id, *local_turn),
            GameEvent::GameClosed { game_id } => observer.on_game_closed(game_id),
        }
    }
}

/// Presentation-side callbacks. Every method defaults to doing nothing, so an
/// observer only implements what it displays.
///
/// Callbacks run on the connection's reader task for remote frames and on the
/// caller's thread for local actions. They must not block.
pub trait GameObserver: Send + Sync {
    /// Entry point for every event. Override to consume events wholesale.
    fn on_event(&self, event: &GameEvent) {
        event.dispatch(self);
    }

    fn on_chat_message(&self, _text: &str) {}

    fn on_game_invite_received(
        &self,
        _game_id: &GameId,
        _kind: GameKind,
        _initiator: &str,
        _own: bool,
    ) {
    }

    fn on_invite_withdrawn(&self, _game_id: &GameId) {}

    fn on_join_acknowledged(&self, _game_id: &GameId, _kind: GameKind, _players: &[String]) {}

    fn on_game_started(
        &self,
        _game_id: &GameId,
        _kind: GameKind,
        _player1: &str,
        _player2: &str,
        _local_player: Player,
    ) {
    }

    fn on_game_announced(
        &self,
        _game_id: &GameId,
        _kind: GameKind,
        _player1: &str,
        _player2: &str,
    ) {
    }

    fn on_move_applied(
        &self,
        _game_id: &GameId,
        _row: usize,
        _col: usize,
        _player: Player,
        _local_turn: bool,
    ) {
    }

    fn on_game_ended(&self, _game_id: &GameId, _outcome: Outcome, _local_player: Player) {}

    fn on_opponent_left(&self, _game_id: &GameId) {}

    fn on_reset_offered(&self, _game_id: &GameId, _requester: &str) {}

    fn on_reset_applied(&self, _game_id: &GameId, _local_turn: bool) {}

    fn on_game_closed(&self, _game_id: &GameId) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl GameObserver for NullObserver {}

/// Side effect requested by the game core. Sessions and the lobby stay pure
/// and hand these back; the hub performs them once its lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send(Frame),
    Notify(GameEvent),
}
