//! Line-oriented wire grammar.
//!
//! Every frame is one UTF-8 line. Tagged frames are colon separated with the
//! tag in field 0; anything that does not start with a known tag is free-text
//! chat. Lines are parsed once into [`Frame`] at the edge of the system and
//! encoded back with [`std::fmt::Display`].

use std::fmt;
use thiserror::Error;

use crate::game::{GameId, GameKind, Outcome, Player};
use crate::FIELD_SEPARATOR;

/// A parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Untagged free text.
    Chat(String),
    /// `NEW_TICTACTOE` / `NEW_FOURINAROW`: a fresh invite.
    NewGame {
        kind: GameKind,
        game_id: GameId,
        initiator: String,
    },
    /// `JOIN_REQUEST` / `JOIN_REQUEST4`: `requester` asks to join `initiator`'s game.
    JoinRequest {
        kind: GameKind,
        game_id: GameId,
        initiator: String,
        requester: String,
    },
    /// `JOIN_TICTACTOE` / `JOIN_FOURINAROW`: the relay accepted a join.
    JoinAck {
        kind: GameKind,
        game_id: GameId,
        players: Vec<String>,
    },
    /// `START_TICTACTOE` / `START_FOURINAROW`: the game begins.
    Start {
        kind: GameKind,
        game_id: GameId,
        player1: String,
        player2: String,
    },
    /// `MOVE` / `MOVE4`.
    Move {
        kind: GameKind,
        game_id: GameId,
        row: usize,
        col: usize,
        player: Player,
    },
    /// `GAME_OVER` / `GAME_OVER4`; a winner of `0` on the wire is a draw.
    GameOver {
        kind: GameKind,
        game_id: GameId,
        outcome: Outcome,
    },
    ResetRequest {
        game_id: GameId,
    },
    ResetPending {
        game_id: GameId,
        requester: String,
    },
    ResetConfirmed {
        game_id: GameId,
    },
    /// `EXIT_TICTACTOE` / `EXIT_FOURINAROW`: a player left the game.
    Exit {
        kind: GameKind,
        game_id: GameId,
    },
    /// Farewell a client sends before closing its socket.
    Disconnect {
        identity: String,
    },
}

/// Coarse routing class of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Chat,
    Invite,
    Join,
    Start,
    Move,
    GameOver,
    Reset,
    Exit,
    Presence,
}

/// Why a tagged line could not be turned into a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("{tag}: expected {expected} fields, found {found}")]
    FieldCount {
        tag: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("{tag}: field {index} is empty")]
    EmptyField { tag: &'static str, index: usize },
    #[error("{tag}: `{value}` is not a number")]
    InvalidNumber { tag: &'static str, value: String },
    #[error("{tag}: `{value}` is not a player number")]
    InvalidPlayer { tag: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    New(GameKind),
    JoinRequest(GameKind),
    JoinAck(GameKind),
    Start(GameKind),
    Move(GameKind),
    GameOver(GameKind),
    ResetRequest,
    ResetPending,
    ResetConfirmed,
    Exit(GameKind),
    Disconnect,
}

/// Recognized tags in match order. Where one tag is a prefix of another the
/// longer one comes first.
const TAGS: [Tag; 18] = [
    Tag::New(GameKind::TicTacToe),
    Tag::New(GameKind::FourInARow),
    Tag::JoinRequest(GameKind::FourInARow),
    Tag::JoinRequest(GameKind::TicTacToe),
    Tag::JoinAck(GameKind::TicTacToe),
    Tag::JoinAck(GameKind::FourInARow),
    Tag::Start(GameKind::TicTacToe),
    Tag::Start(GameKind::FourInARow),
    Tag::Move(GameKind::FourInARow),
    Tag::Move(GameKind::TicTacToe),
    Tag::GameOver(GameKind::FourInARow),
    Tag::GameOver(GameKind::TicTacToe),
    Tag::ResetRequest,
    Tag::ResetPending,
    Tag::ResetConfirmed,
    Tag::Exit(GameKind::FourInARow),
    Tag::Exit(GameKind::TicTacToe),
    Tag::Disconnect,
];

impl Tag {
    fn as_str(self) -> &'static str {
        match self {
            Tag::New(GameKind::TicTacToe) => "NEW_TICTACTOE",
            Tag::New(GameKind::FourInARow) => "NEW_FOURINAROW",
            Tag::JoinRequest(GameKind::TicTacToe) => "JOIN_REQUEST",
            Tag::JoinRequest(GameKind::FourInARow) => "JOIN_REQUEST4",
            Tag::JoinAck(GameKind::TicTacToe) => "JOIN_TICTACTOE",
            Tag::JoinAck(GameKind::FourInARow) => "JOIN_FOURINAROW",
            Tag::Start(GameKind::TicTacToe) => "START_TICTACTOE",
            Tag::Start(GameKind::FourInARow) => "START_FOURINAROW",
            Tag::Move(GameKind::TicTacToe) => "MOVE",
            Tag::Move(GameKind::FourInARow) => "MOVE4",
            Tag::GameOver(GameKind::TicTacToe) => "GAME_OVER",
            Tag::GameOver(GameKind::FourInARow) => "GAME_OVER4",
            Tag::ResetRequest => "RESET_GAME_REQUEST",
            Tag::ResetPending => "RESET_GAME_PENDING",
            Tag::ResetConfirmed => "RESET_GAME_CONFIRMED",
            Tag::Exit(GameKind::TicTacToe) => "EXIT_TICTACTOE",
            Tag::Exit(GameKind::FourInARow) => "EXIT_FOURINAROW",
            Tag::Disconnect => "DISCONNECT",
        }
    }

    /// Finds the tag `line` starts with and returns it with the text after the
    /// separator (`None` for a bare tag). A tag only matches when followed by
    /// `:` or end of line.
    fn split(line: &str) -> Option<(Tag, Option<&str>)> {
        TAGS.iter().find_map(|&tag| {
            let rest = line.strip_prefix(tag.as_str())?;
            if rest.is_empty() {
                Some((tag, None))
            } else {
                rest.strip_prefix(FIELD_SEPARATOR)
                    .map(|fields| (tag, Some(fields)))
            }
        })
    }
}

fn exact<'a, const N: usize>(tag: Tag, fields: &[&'a str]) -> Result<[&'a str; N], FrameError> {
    let values: [&str; N] = fields.try_into().map_err(|_| FrameError::FieldCount {
        tag: tag.as_str(),
        expected: N,
        found: fields.len(),
    })?;
    non_empty(tag, &values)?;
    Ok(values)
}

fn non_empty(tag: Tag, fields: &[&str]) -> Result<(), FrameError> {
    match fields.iter().position(|field| field.is_empty()) {
        Some(index) => Err(FrameError::EmptyField {
            tag: tag.as_str(),
            index: index + 1,
        }),
        None => Ok(()),
    }
}

fn number(tag: Tag, value: &str) -> Result<usize, FrameError> {
    value.parse().map_err(|_| FrameError::InvalidNumber {
        tag: tag.as_str(),
        value: value.to_string(),
    })
}

fn player(tag: Tag, value: &str) -> Result<Player, FrameError> {
    value
        .parse()
        .ok()
        .and_then(Player::from_number)
        .ok_or_else(|| FrameError::InvalidPlayer {
            tag: tag.as_str(),
            value: value.to_string(),
        })
}

impl Frame {
    /// Parses one line. Lines without a recognized tag are chat and never fail.
    pub fn parse(line: &str) -> Result<Frame, FrameError> {
        let Some((tag, rest)) = Tag::split(line) else {
            return Ok(Frame::Chat(line.to_string()));
        };
        let fields: Vec<&str> = match rest {
            Some(rest) => rest.split(FIELD_SEPARATOR).collect(),
            None => Vec::new(),
        };

        let frame = match tag {
            Tag::New(kind) => {
                let [game_id, initiator] = exact(tag, &fields)?;
                Frame::NewGame {
                    kind,
                    game_id: GameId::new(game_id),
                    initiator: initiator.to_string(),
                }
            }
            Tag::JoinRequest(kind) => {
                let [game_id, initiator, requester] = exact(tag, &fields)?;
                Frame::JoinRequest {
                    kind,
                    game_id: GameId::new(game_id),
                    initiator: initiator.to_string(),
                    requester: requester.to_string(),
                }
            }
            Tag::JoinAck(kind) => {
                if fields.len() < 2 {
                    return Err(FrameError::FieldCount {
                        tag: tag.as_str(),
                        expected: 2,
                        found: fields.len(),
                    });
                }
                non_empty(tag, &fields)?;
                Frame::JoinAck {
                    kind,
                    game_id: GameId::new(fields[0]),
                    players: fields[1..].iter().map(|p| p.to_string()).collect(),
                }
            }
            Tag::Start(kind) => {
                let [game_id, player1, player2] = exact(tag, &fields)?;
                Frame::Start {
                    kind,
                    game_id: GameId::new(game_id),
                    player1: player1.to_string(),
                    player2: player2.to_string(),
                }
            }
            Tag::Move(kind) => {
                let [game_id, row, col, mover] = exact(tag, &fields)?;
                Frame::Move {
                    kind,
                    game_id: GameId::new(game_id),
                    row: number(tag, row)?,
                    col: number(tag, col)?,
                    player: player(tag, mover)?,
                }
            }
            Tag::GameOver(kind) => {
                let [game_id, winner] = exact(tag, &fields)?;
                let outcome = winner
                    .parse()
                    .ok()
                    .and_then(Outcome::from_winner_number)
                    .ok_or_else(|| FrameError::InvalidPlayer {
                        tag: tag.as_str(),
                        value: winner.to_string(),
                    })?;
                Frame::GameOver {
                    kind,
                    game_id: GameId::new(game_id),
                    outcome,
                }
            }
            Tag::ResetRequest => {
                let [game_id] = exact(tag, &fields)?;
                Frame::ResetRequest {
                    game_id: GameId::new(game_id),
                }
            }
            Tag::ResetPending => {
                let [game_id, requester] = exact(tag, &fields)?;
                Frame::ResetPending {
                    game_id: GameId::new(game_id),
                    requester: requester.to_string(),
                }
            }
            Tag::ResetConfirmed => {
                let [game_id] = exact(tag, &fields)?;
                Frame::ResetConfirmed {
                    game_id: GameId::new(game_id),
                }
            }
            Tag::Exit(kind) => {
                let [game_id] = exact(tag, &fields)?;
                Frame::Exit {
                    kind,
                    game_id: GameId::new(game_id),
                }
            }
            Tag::Disconnect => {
                let [identity] = exact(tag, &fields)?;
                Frame::Disconnect {
                    identity: identity.to_string(),
                }
            }
        };
        Ok(frame)
    }

    pub fn category(&self) -> Category {
        match self {
            Frame::Chat(_) => Category::Chat,
            Frame::NewGame { .. } => Category::Invite,
            Frame::JoinRequest { .. } | Frame::JoinAck { .. } => Category::Join,
            Frame::Start { .. } => Category::Start,
            Frame::Move { .. } => Category::Move,
            Frame::GameOver { .. } => Category::GameOver,
            Frame::ResetRequest { .. }
            | Frame::ResetPending { .. }
            | Frame::ResetConfirmed { .. } => Category::Reset,
            Frame::Exit { .. } => Category::Exit,
            Frame::Disconnect { .. } => Category::Presence,
        }
    }

    /// Game this frame belongs to, if any.
    pub fn game_id(&self) -> Option<&GameId> {
        match self {
            Frame::NewGame { game_id, .. }
            | Frame::JoinRequest { game_id, .. }
            | Frame::JoinAck { game_id, .. }
            | Frame::Start { game_id, .. }
            | Frame::Move { game_id, .. }
            | Frame::GameOver { game_id, .. }
            | Frame::ResetRequest { game_id }
            | Frame::ResetPending { game_id, .. }
            | Frame::ResetConfirmed { game_id }
            | Frame::Exit { game_id, .. } => Some(game_id),
            Frame::Chat(_) | Frame::Disconnect { .. } => None,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Chat(text) => f.write_str(text),
            Frame::NewGame {
                kind,
                game_id,
                initiator,
            } => write!(f, "{}:{}:{}", Tag::New(*kind).as_str(), game_id, initiator),
            Frame::JoinRequest {
                kind,
                game_id,
                initiator,
                requester,
            } => write!(
                f,
                "{}:{}:{}:{}",
                Tag::JoinRequest(*kind).as_str(),
                game_id,
                initiator,
                requester
            ),
            Frame::JoinAck {
                kind,
                game_id,
                players,
            } => {
                write!(f, "{}:{}", Tag::JoinAck(*kind).as_str(), game_id)?;
                for player in players {
                    write!(f, ":{}", player)?;
                }
                Ok(())
            }
            Frame::Start {
                kind,
                game_id,
                player1,
                player2,
            } => write!(
                f,
                "{}:{}:{}:{}",
                Tag::Start(*kind).as_str(),
                game_id,
                player1,
                player2
            ),
            Frame::Move {
                kind,
                game_id,
                row,
                col,
                player,
            } => write!(
                f,
                "{}:{}:{}:{}:{}",
                Tag::Move(*kind).as_str(),
                game_id,
                row,
                col,
                player
            ),
            Frame::GameOver {
                kind,
                game_id,
                outcome,
            } => write!(
                f,
                "{}:{}:{}",
                Tag::GameOver(*kind).as_str(),
                game_id,
                outcome.winner_number()
            ),
            Frame::ResetRequest { game_id } => {
                write!(f, "{}:{}", Tag::ResetRequest.as_str(), game_id)
            }
            Frame::ResetPending { game_id, requester } => write!(
                f,
                "{}:{}:{}",
                Tag::ResetPending.as_str(),
                game_id,
                requester
            ),
            Frame::ResetConfirmed { game_id } => {
                write!(f, "{}:{}", Tag::ResetConfirmed.as_str(), game_id)
            }
            Frame::Exit { kind, game_id } => {
                write!(f, "{}:{}", Tag::Exit(*kind).as_str(), game_id)
            }
            Frame::Disconnect { identity } => {
                write!(f, "{}:{}", Tag::Disconnect.as_str(), identity)
            }
        }
    }
}
