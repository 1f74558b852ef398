use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rules::{FourInARowRules, RuleEngine, TicTacToeRules};

/// The two games that can be played inside the chat channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameKind {
    TicTacToe,
    FourInARow,
}

impl GameKind {
    /// Human readable name used in chat notices.
    pub fn display_name(self) -> &'static str {
        match self {
            GameKind::TicTacToe => "Tic Tac Toe",
            GameKind::FourInARow => "Four in a Row",
        }
    }

    /// Rule engine deciding placement, wins and draws for this game.
    pub fn rules(self) -> &'static dyn RuleEngine {
        match self {
            GameKind::TicTacToe => &TicTacToeRules,
            GameKind::FourInARow => &FourInARowRules,
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Seat of a participant. Player one always belongs to the invite's initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    One,
    Two,
}

impl Player {
    /// Wire representation of the seat (`1` or `2`).
    pub fn number(self) -> u8 {
        match self {
            Player::One => 1,
            Player::Two => 2,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Player::One),
            2 => Some(Player::Two),
            _ => None,
        }
    }

    pub fn opponent(self) -> Self {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// State of one board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Empty,
    Player1,
    Player2,
}

impl Cell {
    pub fn owner(self) -> Option<Player> {
        match self {
            Cell::Empty => None,
            Cell::Player1 => Some(Player::One),
            Cell::Player2 => Some(Player::Two),
        }
    }

    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }
}

impl From<Player> for Cell {
    fn from(player: Player) -> Self {
        match player {
            Player::One => Cell::Player1,
            Player::Two => Cell::Player2,
        }
    }
}

/// Result of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win(Player),
    Draw,
}

impl Outcome {
    /// Winner field of a `GAME_OVER` frame; `0` encodes a draw.
    pub fn winner_number(self) -> u8 {
        match self {
            Outcome::Win(player) => player.number(),
            Outcome::Draw => 0,
        }
    }

    pub fn from_winner_number(number: u8) -> Option<Self> {
        match number {
            0 => Some(Outcome::Draw),
            n => Player::from_number(n).map(Outcome::Win),
        }
    }
}

/// Opaque token correlating every frame that belongs to one game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        GameId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameId {
    fn from(id: &str) -> Self {
        GameId::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_numbers() {
        assert_eq!(Player::One.number(), 1);
        assert_eq!(Player::Two.number(), 2);
        assert_eq!(Player::from_number(1), Some(Player::One));
        assert_eq!(Player::from_number(2), Some(Player::Two));
        assert_eq!(Player::from_number(0), None);
        assert_eq!(Player::from_number(3), None);
    }

    #[test]
    fn test_player_opponent() {
        assert_eq!(Player::One.opponent(), Player::Two);
        assert_eq!(Player::Two.opponent(), Player::One);
    }

    #[test]
    fn test_cell_owner() {
        assert_eq!(Cell::Empty.owner(), None);
        assert_eq!(Cell::from(Player::One).owner(), Some(Player::One));
        assert_eq!(Cell::from(Player::Two).owner(), Some(Player::Two));
        assert!(Cell::default().is_empty());
    }

    #[test]
    fn test_outcome_winner_numbers() {
        assert_eq!(Outcome::Draw.winner_number(), 0);
        assert_eq!(Outcome::Win(Player::Two).winner_number(), 2);
        assert_eq!(Outcome::from_winner_number(0), Some(Outcome::Draw));
        assert_eq!(
            Outcome::from_winner_number(1),
            Some(Outcome::Win(Player::One))
        );
        assert_eq!(Outcome::from_winner_number(7), None);
    }

    #[test]
    fn test_game_kind_rules_dimensions() {
        let ttt = GameKind::TicTacToe.rules();
        assert_eq!((ttt.rows(), ttt.cols()), (3, 3));

        let four = GameKind::FourInARow.rules();
        assert_eq!((four.rows(), four.cols()), (6, 7));
    }
}
