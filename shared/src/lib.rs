//! # Shared protocol vocabulary
//!
//! Everything the relay server and the chat client must agree on lives here:
//! the line-oriented wire grammar ([`Frame`]), the game vocabulary
//! ([`GameKind`], [`Player`], [`Cell`], [`GameId`], [`Outcome`]) and the rule
//! engines that decide wins and draws for both games.
//!
//! The crate is pure: no sockets, no tasks, no clocks. Both ends of the
//! connection parse and encode frames with the same code, and both players of
//! a game evaluate the same rule engine after every move.

pub mod frame;
pub mod game;
pub mod rules;

pub use frame::{Category, Frame, FrameError};
pub use game::{Cell, GameId, GameKind, Outcome, Player};
pub use rules::{
    check_win, connects_four, drop_row, Board, FourInARowRules, PlacementError, RuleEngine,
    TicTacToeRules,
};

/// Port the relay listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 12345;
/// Relay address the client dials unless told otherwise.
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:12345";

pub const TICTACTOE_SIZE: usize = 3;
pub const FOUR_IN_A_ROW_ROWS: usize = 6;
pub const FOUR_IN_A_ROW_COLS: usize = 7;

/// Field separator inside a frame.
pub const FIELD_SEPARATOR: char = ':';

/// Returns true if `name` can be used as an identity on the wire.
///
/// Identities travel inside colon-separated frames and are sent as the
/// handshake line, so they may not be empty, contain the field separator, or
/// contain line breaks. Relayed chat is prefixed with `<identity>: `, so a
/// name that is itself a frame tag (`MOVE`, `DISCONNECT`, ...) is refused as
/// well.
pub fn is_valid_identity(name: &str) -> bool {
    !name.trim().is_empty()
        && !name.contains(FIELD_SEPARATOR)
        && !name.contains('\n')
        && !name.contains('\r')
        && matches!(Frame::parse(&format!("{}: x", name)), Ok(Frame::Chat(_)))
}
