//! Invites and running sessions of one local identity.
//!
//! The lobby is the pure half of the game hub. Every inbound frame is routed
//! by its game id to the matching invite or session; frames for unknown or
//! closed games are ignored. Like [`GameSession`], it never performs I/O and
//! returns the [`Action`]s its caller must carry out.

use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;
use shared::{Frame, GameId, GameKind};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::events::{Action, GameEvent};
use crate::session::{GameSession, MoveError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    #[error("no open invite for game {0}")]
    UnknownInvite(GameId),
    #[error("game {0} is your own invite")]
    OwnInvite(GameId),
    #[error("already asked to join game {0}")]
    AlreadyRequested(GameId),
    #[error("you are not playing game {0}")]
    UnknownGame(GameId),
    #[error(transparent)]
    Move(#[from] MoveError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InviteState {
    Open,
    /// We asked to join and are waiting for the relay's verdict.
    Requested,
    /// The relay paired the game; a start is on its way.
    Joined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameInvite {
    pub game_id: GameId,
    pub kind: GameKind,
    pub initiator: String,
    pub state: InviteState,
}

/// Fresh game id: wall clock milliseconds plus a random offset below 1000.
pub fn generate_game_id() -> GameId {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    let offset: u128 = rand::thread_rng().gen_range(0..1000);
    GameId::new((millis + offset).to_string())
}

/// How many closed game ids the lobby remembers for dropping late frames.
pub const CLOSED_GAMES_REMEMBERED: usize = 256;

/// Most recently closed game ids, oldest evicted first.
#[derive(Debug, Default)]
struct ClosedGames {
    ids: HashSet<GameId>,
    order: VecDeque<GameId>,
}

impl ClosedGames {
    fn insert(&mut self, game_id: GameId) {
        if !self.ids.insert(game_id.clone()) {
            return;
        }
        self.order.push_back(game_id);
        if self.order.len() > CLOSED_GAMES_REMEMBERED {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, game_id: &GameId) -> bool {
        self.ids.contains(game_id)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.order.len()
    }
}

pub struct Lobby {
    identity: String,
    invites: BTreeMap<GameId, GameInvite>,
    sessions: HashMap<GameId, GameSession>,
    /// Games this client has left or seen closed. Late frames for them are dropped.
    closed: ClosedGames,
}

impl Lobby {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            invites: BTreeMap::new(),
            sessions: HashMap::new(),
            closed: ClosedGames::default(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Invites known to this client, oldest id first.
    pub fn invites(&self) -> impl Iterator<Item = &GameInvite> {
        self.invites.values()
    }

    pub fn session(&self, game_id: &GameId) -> Option<&GameSession> {
        self.sessions.get(game_id)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &GameSession> {
        self.sessions.values()
    }

    /// Announces a new game with this client as player one.
    pub fn request_new_game(&mut self, kind: GameKind) -> (GameId, Vec<Action>) {
        let mut game_id = generate_game_id();
        while self.is_known(&game_id) {
            game_id = generate_game_id();
        }

        self.invites.insert(
            game_id.clone(),
            GameInvite {
                game_id: game_id.clone(),
                kind,
                initiator: self.identity.clone(),
                state: InviteState::Open,
            },
        );
        info!("Created {} game {}", kind, game_id);

        let frame = Frame::NewGame {
            kind,
            game_id: game_id.clone(),
            initiator: self.identity.clone(),
        };
        (game_id, vec![Action::Send(frame)])
    }

    /// Asks to join someone else's open invite.
    pub fn request_join(&mut self, game_id: &GameId) -> Result<Vec<Action>, LobbyError> {
        let invite = self
            .invites
            .get_mut(game_id)
            .ok_or_else(|| LobbyError::UnknownInvite(game_id.clone()))?;

        if invite.initiator == self.identity {
            return Err(LobbyError::OwnInvite(game_id.clone()));
        }
        if invite.state != InviteState::Open {
            return Err(LobbyError::AlreadyRequested(game_id.clone()));
        }

        invite.state = InviteState::Requested;
        Ok(vec![Action::Send(Frame::JoinRequest {
            kind: invite.kind,
            game_id: game_id.clone(),
            initiator: invite.initiator.clone(),
            requester: self.identity.clone(),
        })])
    }

    pub fn make_move(
        &mut self,
        game_id: &GameId,
        row: usize,
        col: usize,
    ) -> Result<Vec<Action>, LobbyError> {
        Ok(self.session_mut(game_id)?.make_move(row, col)?)
    }

    pub fn request_reset(&mut self, game_id: &GameId) -> Result<Vec<Action>, LobbyError> {
        Ok(self.session_mut(game_id)?.request_reset())
    }

    /// Leaves a running game, or withdraws our own open invite.
    pub fn exit_game(&mut self, game_id: &GameId) -> Result<Vec<Action>, LobbyError> {
        if let Some(mut session) = self.sessions.remove(game_id) {
            self.closed.insert(game_id.clone());
            return Ok(session.exit());
        }

        match self.invites.get(game_id) {
            Some(invite) if invite.initiator == self.identity => {
                let kind = invite.kind;
                self.invites.remove(game_id);
                self.closed.insert(game_id.clone());
                Ok(vec![
                    Action::Send(Frame::Exit {
                        kind,
                        game_id: game_id.clone(),
                    }),
                    Action::Notify(GameEvent::GameClosed {
                        game_id: game_id.clone(),
                    }),
                ])
            }
            _ => Err(LobbyError::UnknownGame(game_id.clone())),
        }
    }

    /// Leaves every running game and withdraws every own invite.
    pub fn exit_all(&mut self) -> Vec<Action> {
        let mut ids: Vec<GameId> = self.sessions.keys().cloned().collect();
        ids.extend(
            self.invites
                .values()
                .filter(|invite| invite.initiator == self.identity)
                .map(|invite| invite.game_id.clone()),
        );

        ids.iter()
            .filter_map(|game_id| self.exit_game(game_id).ok())
            .flatten()
            .collect()
    }

    /// Applies one inbound game frame.
    pub fn handle_frame(&mut self, frame: &Frame) -> Vec<Action> {
        if let Some(game_id) = frame.game_id() {
            if self.closed.contains(game_id) {
                debug!("Ignoring frame for closed game {}", game_id);
                return Vec::new();
            }
        }

        match frame {
            Frame::NewGame {
                kind,
                game_id,
                initiator,
            } => self.on_invite(*kind, game_id, initiator),
            Frame::JoinRequest {
                game_id, requester, ..
            } => {
                if let Some(invite) = self.invites.get_mut(game_id) {
                    if invite.state == InviteState::Open {
                        debug!("{} asked to join game {}", requester, game_id);
                        invite.state = InviteState::Joined;
                    }
                }
                Vec::new()
            }
            Frame::JoinAck {
                kind,
                game_id,
                players,
            } => self.on_join_ack(*kind, game_id, players),
            Frame::Start {
                kind,
                game_id,
                player1,
                player2,
            } => self.on_start(*kind, game_id, player1, player2),
            Frame::Move {
                kind,
                game_id,
                row,
                col,
                player,
            } => self.with_session(*kind, game_id, |session| {
                session
                    .apply_remote_move(*row, *col, *player)
                    .unwrap_or_else(|e| {
                        warn!("Dropping move for game {}: {}", game_id, e);
                        Vec::new()
                    })
            }),
            Frame::GameOver {
                kind,
                game_id,
                outcome,
            } => self.with_session(*kind, game_id, |session| {
                session.apply_game_over(*outcome)
            }),
            Frame::ResetPending { game_id, requester } => match self.sessions.get_mut(game_id) {
                Some(session) => session.apply_reset_pending(requester),
                None => unknown(game_id),
            },
            Frame::ResetConfirmed { game_id } => match self.sessions.get_mut(game_id) {
                Some(session) => session.apply_reset_confirmed(),
                None => unknown(game_id),
            },
            Frame::Exit { game_id, .. } => self.on_exit(game_id),
            Frame::ResetRequest { .. } | Frame::Chat(_) | Frame::Disconnect { .. } => Vec::new(),
        }
    }

    fn is_known(&self, game_id: &GameId) -> bool {
        self.invites.contains_key(game_id)
            || self.sessions.contains_key(game_id)
            || self.closed.contains(game_id)
    }

    fn session_mut(&mut self, game_id: &GameId) -> Result<&mut GameSession, LobbyError> {
        self.sessions
            .get_mut(game_id)
            .ok_or_else(|| LobbyError::UnknownGame(game_id.clone()))
    }

    fn with_session(
        &mut self,
        kind: GameKind,
        game_id: &GameId,
        apply: impl FnOnce(&mut GameSession) -> Vec<Action>,
    ) -> Vec<Action> {
        match self.sessions.get_mut(game_id) {
            Some(session) if session.kind() == kind => apply(session),
            Some(session) => {
                warn!(
                    "Game {} is {}, dropping {} frame",
                    game_id,
                    session.kind(),
                    kind
                );
                Vec::new()
            }
            None => unknown(game_id),
        }
    }

    fn on_invite(&mut self, kind: GameKind, game_id: &GameId, initiator: &str) -> Vec<Action> {
        if self.sessions.contains_key(game_id) {
            debug!("Game {} is already running", game_id);
            return Vec::new();
        }

        let own = initiator == self.identity;
        self.invites.insert(
            game_id.clone(),
            GameInvite {
                game_id: game_id.clone(),
                kind,
                initiator: initiator.to_string(),
                state: InviteState::Open,
            },
        );

        vec![Action::Notify(GameEvent::InviteReceived {
            game_id: game_id.clone(),
            kind,
            initiator: initiator.to_string(),
            own,
        })]
    }

    fn on_join_ack(&mut self, kind: GameKind, game_id: &GameId, players: &[String]) -> Vec<Action> {
        if let Some(invite) = self.invites.get_mut(game_id) {
            invite.state = InviteState::Joined;
        }

        if !players.iter().any(|player| *player == self.identity) {
            return Vec::new();
        }

        vec![Action::Notify(GameEvent::JoinAcknowledged {
            game_id: game_id.clone(),
            kind,
            players: players.to_vec(),
        })]
    }

    fn on_start(
        &mut self,
        kind: GameKind,
        game_id: &GameId,
        player1: &str,
        player2: &str,
    ) -> Vec<Action> {
        self.invites.remove(game_id);

        if self.sessions.contains_key(game_id) {
            warn!("Game {} already started, ignoring duplicate start", game_id);
            return Vec::new();
        }

        match GameSession::new(game_id.clone(), kind, player1, player2, &self.identity) {
            Some(session) => {
                let local_player = session.local_player();
                info!(
                    "Game {} started: {} vs {}, playing as {}",
                    game_id, player1, player2, local_player
                );
                self.sessions.insert(game_id.clone(), session);
                vec![Action::Notify(GameEvent::GameStarted {
                    game_id: game_id.clone(),
                    kind,
                    player1: player1.to_string(),
                    player2: player2.to_string(),
                    local_player,
                })]
            }
            None => vec![Action::Notify(GameEvent::GameAnnounced {
                game_id: game_id.clone(),
                kind,
                player1: player1.to_string(),
                player2: player2.to_string(),
            })],
        }
    }

    fn on_exit(&mut self, game_id: &GameId) -> Vec<Action> {
        if let Some(mut session) = self.sessions.remove(game_id) {
            self.closed.insert(game_id.clone());
            return session.apply_opponent_exit();
        }

        if self.invites.remove(game_id).is_some() {
            return vec![Action::Notify(GameEvent::InviteWithdrawn {
                game_id: game_id.clone(),
            })];
        }

        unknown(game_id)
    }
}

fn unknown(game_id: &GameId) -> Vec<Action> {
    debug!("Ignoring frame for unknown game {}", game_id);
    Vec::new()
}
