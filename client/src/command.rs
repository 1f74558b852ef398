//! Terminal input: turns one stdin line into a [`Command`].

use shared::{GameId, GameKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat(String),
    NewGame(GameKind),
    Join(GameId),
    Move { game_id: GameId, row: usize, col: usize },
    /// Four-in-a-row shorthand: only the column matters.
    Drop { game_id: GameId, col: usize },
    Reset(GameId),
    Exit(GameId),
    Games,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `/{0}`, try /help")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("`{0}` is not a number")]
    NotANumber(String),
}

pub const HELP: &str = "\
/tictactoe                 start a tic-tac-toe invite
/fourinarow                start a four-in-a-row invite
/join <game>               join someone's invite
/move <game> <row> <col>   place a mark (rows and columns start at 0)
/drop <game> <col>         drop a piece in four-in-a-row
/reset <game>              ask for a fresh board
/exit <game>               leave a game or withdraw your invite
/games                     list invites and running games
/quit                      leave every game and disconnect
anything else              is sent as chat";

impl Command {
    /// Parses one input line. Returns `Ok(None)` for blank lines.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let Some(body) = trimmed.strip_prefix('/') else {
            return Ok(Some(Command::Chat(line.trim_end().to_string())));
        };

        let mut words = body.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        let command = match (name, args.as_slice()) {
            ("tictactoe", []) => Command::NewGame(GameKind::TicTacToe),
            ("fourinarow", []) => Command::NewGame(GameKind::FourInARow),
            ("join", [game_id]) => Command::Join(GameId::new(*game_id)),
            ("move", [game_id, row, col]) => Command::Move {
                game_id: GameId::new(*game_id),
                row: number(row)?,
                col: number(col)?,
            },
            ("drop", [game_id, col]) => Command::Drop {
                game_id: GameId::new(*game_id),
                col: number(col)?,
            },
            ("reset", [game_id]) => Command::Reset(GameId::new(*game_id)),
            ("exit", [game_id]) => Command::Exit(GameId::new(*game_id)),
            ("games", []) => Command::Games,
            ("help", []) => Command::Help,
            ("quit", []) => Command::Quit,
            ("tictactoe" | "fourinarow" | "games" | "help" | "quit", _) => {
                return Err(CommandError::Usage(usage(name)))
            }
            ("join" | "move" | "drop" | "reset" | "exit", _) => {
                return Err(CommandError::Usage(usage(name)))
            }
            _ => return Err(CommandError::Unknown(name.to_string())),
        };
        Ok(Some(command))
    }
}

fn usage(name: &str) -> &'static str {
    match name {
        "join" => "/join <game>",
        "move" => "/move <game> <row> <col>",
        "drop" => "/drop <game> <col>",
        "reset" => "/reset <game>",
        "exit" => "/exit <game>",
        "tictactoe" => "/tictactoe",
        "fourinarow" => "/fourinarow",
        "games" => "/games",
        "help" => "/help",
        _ => "/quit",
    }
}

fn number(value: &str) -> Result<usize, CommandError> {
    value
        .parse()
        .map_err(|_| CommandError::NotANumber(value.to_string()))
}
