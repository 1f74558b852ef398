//! Terminal presentation: prints events as text or as JSON lines.

use log::error;
use shared::{Board, Cell, GameId, GameKind, Outcome, Player};
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock, Weak};

use crate::events::{GameEvent, GameObserver};
use crate::hub::GameHub;

/// Draws a board with column numbers on top. Player one is `X`.
pub fn render_board(board: &Board) -> String {
    let mut out = String::new();
    for col in 0..board.cols() {
        let _ = write!(out, " {}", col);
    }
    out.push('\n');

    for row in 0..board.rows() {
        for col in 0..board.cols() {
            let mark = match board.get(row, col).unwrap_or_default() {
                Cell::Empty => '.',
                Cell::Player1 => 'X',
                Cell::Player2 => 'O',
            };
            out.push(' ');
            out.push(mark);
        }
        let _ = writeln!(out, "  {}", row);
    }
    out
}

/// Explains why a chat line was not sent.
pub fn chat_refused(connected: bool) -> &'static str {
    if connected {
        "Not sent: the message looks like a protocol frame."
    } else {
        "Not sent: not connected to the server."
    }
}

fn verdict(outcome: Outcome, local_player: Player) -> &'static str {
    match outcome {
        Outcome::Draw => "It's a draw!",
        Outcome::Win(winner) if winner == local_player => "You win!",
        Outcome::Win(_) => "Your opponent wins.",
    }
}

pub struct ConsoleObserver {
    json: bool,
    hub: OnceLock<Weak<GameHub>>,
}

impl ConsoleObserver {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            hub: OnceLock::new(),
        }
    }

    /// Lets the observer look up boards after moves. Only the first call counts.
    pub fn attach(&self, hub: &Arc<GameHub>) {
        let _ = self.hub.set(Arc::downgrade(hub));
    }

    fn print_board(&self, game_id: &GameId) {
        let session = self
            .hub
            .get()
            .and_then(Weak::upgrade)
            .and_then(|hub| hub.session(game_id));
        if let Some(session) = session {
            print!("{}", render_board(session.board()));
        }
    }
}

impl GameObserver for ConsoleObserver {
    fn on_event(&self, event: &GameEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to encode event: {}", e),
            }
        } else {
            event.dispatch(self);
        }
    }

    fn on_chat_message(&self, text: &str) {
        println!("{}", text);
    }

    fn on_game_invite_received(
        &self,
        game_id: &GameId,
        kind: GameKind,
        initiator: &str,
        own: bool,
    ) {
        if own {
            println!("[{}] Your {} game is waiting for an opponent", game_id, kind);
        } else {
            println!(
                "[{}] {} invites you to {}. Type /join {}",
                game_id, initiator, kind, game_id
            );
        }
    }

    fn on_invite_withdrawn(&self, game_id: &GameId) {
        println!("[{}] This game was closed.", game_id);
    }

    fn on_join_acknowledged(&self, game_id: &GameId, kind: GameKind, players: &[String]) {
        println!("[{}] {} joined: {}", game_id, kind, players.join(" vs "));
    }

    fn on_game_started(
        &self,
        game_id: &GameId,
        kind: GameKind,
        player1: &str,
        player2: &str,
        local_player: Player,
    ) {
        let mark = if local_player == Player::One { 'X' } else { 'O' };
        println!(
            "[{}] {} started: {} (X) vs {} (O). You play {}.",
            game_id, kind, player1, player2, mark
        );
        self.print_board(game_id);
        if local_player == Player::One {
            println!("[{}] Your turn.", game_id);
        }
    }

    fn on_game_announced(&self, game_id: &GameId, kind: GameKind, player1: &str, player2: &str) {
        println!("[{}] {} vs {} started {}", game_id, player1, player2, kind);
    }

    fn on_move_applied(
        &self,
        game_id: &GameId,
        _row: usize,
        _col: usize,
        _player: Player,
        local_turn: bool,
    ) {
        self.print_board(game_id);
        if local_turn {
            println!("[{}] Your turn.", game_id);
        }
    }

    fn on_game_ended(&self, game_id: &GameId, outcome: Outcome, local_player: Player) {
        println!("[{}] {}", game_id, verdict(outcome, local_player));
    }

    fn on_opponent_left(&self, game_id: &GameId) {
        println!("[{}] Your opponent left the game.", game_id);
    }

    fn on_reset_offered(&self, game_id: &GameId, requester: &str) {
        println!(
            "[{}] {} wants to play again. Type /reset {}",
            game_id, requester, game_id
        );
    }

    fn on_reset_applied(&self, game_id: &GameId, local_turn: bool) {
        println!("[{}] New round.", game_id);
        self.print_board(game_id);
        if local_turn {
            println!("[{}] Your turn.", game_id);
        }
    }

    fn on_game_closed(&self, game_id: &GameId) {
        println!("[{}] You left the game.", game_id);
    }
}
