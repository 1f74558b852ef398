//! Per-game state machine.
//!
//! A [`GameSession`] is the local player's view of one running game: seats,
//! board, whose turn it is, the verdict once there is one, and the reset
//! handshake. It performs no I/O. Every operation returns the [`Action`]s the
//! caller must carry out (frames to send, events to raise), which keeps the
//! session testable without a socket and lets the hub release its lock
//! before touching the network.

use log::{debug, warn};
use serde::Serialize;
use shared::{Board, Frame, GameId, GameKind, Outcome, PlacementError, Player};
use thiserror::Error;

use crate::events::{Action, GameEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("player {0} does not hold the turn")]
    OutOfTurn(Player),
    #[error("the game is over")]
    GameFinished,
    #[error("piece would land on row {expected}, not row {found}")]
    LandingMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Placement(#[from] PlacementError),
}

/// Lifecycle of a session. `Terminal` is sticky until a confirmed reset;
/// `Closed` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Active,
    Terminal(Outcome),
    Closed,
}

/// Where the reset handshake stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ResetState {
    #[default]
    Idle,
    /// We asked; waiting for the opponent.
    Requested,
    /// The opponent asked; our request would confirm.
    OfferedByPeer,
    /// Both sides asked; waiting for the relay's confirmation.
    Confirming,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameSession {
    game_id: GameId,
    kind: GameKind,
    player1: String,
    player2: String,
    local: Player,
    turn: Player,
    /// Seat that moves first in the current round. Toggles on every reset.
    starter: Player,
    board: Board,
    phase: Phase,
    reset: ResetState,
    rounds: u32,
}

impl GameSession {
    /// Creates the session for a started game, or `None` if `identity` holds
    /// neither seat.
    pub fn new(
        game_id: GameId,
        kind: GameKind,
        player1: impl Into<String>,
        player2: impl Into<String>,
        identity: &str,
    ) -> Option<Self> {
        let player1 = player1.into();
        let player2 = player2.into();
        let local = if player1 == identity {
            Player::One
        } else if player2 == identity {
            Player::Two
        } else {
            return None;
        };

        Some(Self {
            game_id,
            kind,
            player1,
            player2,
            local,
            turn: Player::One,
            starter: Player::One,
            board: kind.rules().new_board(),
            phase: Phase::Active,
            reset: ResetState::Idle,
            rounds: 1,
        })
    }

    pub fn game_id(&self) -> &GameId {
        &self.game_id
    }

    pub fn kind(&self) -> GameKind {
        self.kind
    }

    pub fn player_name(&self, player: Player) -> &str {
        match player {
            Player::One => &self.player1,
            Player::Two => &self.player2,
        }
    }

    pub fn local_player(&self) -> Player {
        self.local
    }

    pub fn opponent_name(&self) -> &str {
        self.player_name(self.local.opponent())
    }

    pub fn turn(&self) -> Player {
        self.turn
    }

    pub fn is_local_turn(&self) -> bool {
        self.phase == Phase::Active && self.turn == self.local
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.phase {
            Phase::Terminal(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    pub fn reset_state(&self) -> ResetState {
        self.reset
    }

    pub fn starter(&self) -> Player {
        self.starter
    }

    /// Rounds played, counting the current one.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Plays a move for the local player. For four-in-a-row only `col`
    /// matters; the piece lands on the lowest empty row.
    ///
    /// The caller is the one who sends `GAME_OVER` if this move ends the game.
    pub fn make_move(&mut self, row: usize, col: usize) -> Result<Vec<Action>, MoveError> {
        self.ensure_active()?;
        if self.turn != self.local {
            return Err(MoveError::NotYourTurn);
        }

        let (row, col) = self.kind.rules().resolve_target(&self.board, row, col)?;
        let mut actions = vec![Action::Send(Frame::Move {
            kind: self.kind,
            game_id: self.game_id.clone(),
            row,
            col,
            player: self.local,
        })];

        if let Some(outcome) = self.apply(row, col, self.local, &mut actions)? {
            actions.push(Action::Send(Frame::GameOver {
                kind: self.kind,
                game_id: self.game_id.clone(),
                outcome,
            }));
        }
        Ok(actions)
    }

    /// Applies a move announced by the opponent.
    pub fn apply_remote_move(
        &mut self,
        row: usize,
        col: usize,
        player: Player,
    ) -> Result<Vec<Action>, MoveError> {
        self.ensure_active()?;
        if player == self.local || player != self.turn {
            return Err(MoveError::OutOfTurn(player));
        }

        let (landing, col) = self.kind.rules().resolve_target(&self.board, row, col)?;
        if landing != row {
            return Err(MoveError::LandingMismatch {
                expected: landing,
                found: row,
            });
        }

        let mut actions = Vec::new();
        self.apply(row, col, player, &mut actions)?;
        Ok(actions)
    }

    /// Records a verdict announced by the opponent. Only the first verdict
    /// counts; repeats and verdicts for a closed game are ignored.
    pub fn apply_game_over(&mut self, outcome: Outcome) -> Vec<Action> {
        match self.phase {
            Phase::Active => {
                self.phase = Phase::Terminal(outcome);
                vec![self.ended(outcome)]
            }
            Phase::Terminal(known) => {
                if known != outcome {
                    warn!(
                        "Game {}: opponent reported {:?}, already decided {:?}",
                        self.game_id, outcome, known
                    );
                }
                Vec::new()
            }
            Phase::Closed => Vec::new(),
        }
    }

    /// Asks for a fresh board. Sends at most one request per handshake; if
    /// the opponent already asked, this request confirms.
    pub fn request_reset(&mut self) -> Vec<Action> {
        if self.phase == Phase::Closed {
            return Vec::new();
        }

        match self.reset {
            ResetState::Idle => self.reset = ResetState::Requested,
            ResetState::OfferedByPeer => self.reset = ResetState::Confirming,
            ResetState::Requested | ResetState::Confirming => {
                debug!("Game {}: reset already requested", self.game_id);
                return Vec::new();
            }
        }

        vec![Action::Send(Frame::ResetRequest {
            game_id: self.game_id.clone(),
        })]
    }

    /// The relay reports that `requester` asked for a reset.
    pub fn apply_reset_pending(&mut self, requester: &str) -> Vec<Action> {
        if self.phase == Phase::Closed {
            return Vec::new();
        }

        match self.reset {
            ResetState::Idle => {
                self.reset = ResetState::OfferedByPeer;
                vec![Action::Notify(GameEvent::ResetOffered {
                    game_id: self.game_id.clone(),
                    requester: requester.to_string(),
                })]
            }
            // Our own request crossed theirs and already confirms at the relay.
            ResetState::Requested => {
                self.reset = ResetState::Confirming;
                Vec::new()
            }
            ResetState::OfferedByPeer | ResetState::Confirming => Vec::new(),
        }
    }

    /// Both players agreed: clear the board and hand the first move to the
    /// seat that did not start the previous round.
    pub fn apply_reset_confirmed(&mut self) -> Vec<Action> {
        if self.phase == Phase::Closed {
            return Vec::new();
        }

        self.board.clear();
        self.phase = Phase::Active;
        self.reset = ResetState::Idle;
        self.starter = self.starter.opponent();
        self.turn = self.starter;
        self.rounds += 1;

        vec![Action::Notify(GameEvent::ResetApplied {
            game_id: self.game_id.clone(),
            local_turn: self.turn == self.local,
        })]
    }

    /// Leaves the game.
    pub fn exit(&mut self) -> Vec<Action> {
        if self.phase == Phase::Closed {
            return Vec::new();
        }
        self.phase = Phase::Closed;

        vec![
            Action::Send(Frame::Exit {
                kind: self.kind,
                game_id: self.game_id.clone(),
            }),
            Action::Notify(GameEvent::GameClosed {
                game_id: self.game_id.clone(),
            }),
        ]
    }

    /// The opponent left; nothing more will happen in this game.
    pub fn apply_opponent_exit(&mut self) -> Vec<Action> {
        if self.phase == Phase::Closed {
            return Vec::new();
        }
        self.phase = Phase::Closed;

        vec![Action::Notify(GameEvent::OpponentLeft {
            game_id: self.game_id.clone(),
        })]
    }

    fn ensure_active(&self) -> Result<(), MoveError> {
        match self.phase {
            Phase::Active => Ok(()),
            Phase::Terminal(_) | Phase::Closed => Err(MoveError::GameFinished),
        }
    }

    /// Places a resolved move, evaluates it and advances the turn.
    fn apply(
        &mut self,
        row: usize,
        col: usize,
        player: Player,
        actions: &mut Vec<Action>,
    ) -> Result<Option<Outcome>, MoveError> {
        self.board.place(row, col, player)?;
        let outcome = self.kind.rules().evaluate(&self.board, row, col, player);

        match outcome {
            Some(outcome) => self.phase = Phase::Terminal(outcome),
            None => self.turn = player.opponent(),
        }

        actions.push(Action::Notify(GameEvent::MoveApplied {
            game_id: self.game_id.clone(),
            row,
            col,
            player,
            local_turn: self.is_local_turn(),
        }));
        if let Some(outcome) = outcome {
            actions.push(self.ended(outcome));
        }
        Ok(outcome)
    }

    fn ended(&self, outcome: Outcome) -> Action {
        Action::Notify(GameEvent::GameEnded {
            game_id: self.game_id.clone(),
            outcome,
            local_player: self.local,
        })
    }
}
