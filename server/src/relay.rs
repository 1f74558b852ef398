//! Relay bookkeeping for the games played over the chat room
//!
//! The relay never evaluates moves. It remembers just enough about each game
//! to address frames: who created it, who joined first, and who has asked for
//! a reset. Every handler returns the [`Delivery`]s the network layer must
//! carry out, so the table can be tested without sockets.

use log::{debug, info, warn};
use shared::{Frame, GameId, GameKind};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    All,
    AllExcept(String),
    One(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: Recipient,
    pub line: String,
}

impl Delivery {
    fn all(line: impl ToString) -> Self {
        Self {
            to: Recipient::All,
            line: line.to_string(),
        }
    }

    fn all_except(identity: &str, line: impl ToString) -> Self {
        Self {
            to: Recipient::AllExcept(identity.to_string()),
            line: line.to_string(),
        }
    }

    fn one(identity: &str, line: impl ToString) -> Self {
        Self {
            to: Recipient::One(identity.to_string()),
            line: line.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct RelayGame {
    kind: GameKind,
    initiator: String,
    opponent: Option<String>,
    reset_requests: HashSet<String>,
}

impl RelayGame {
    fn is_player(&self, identity: &str) -> bool {
        self.initiator == identity || self.opponent.as_deref() == Some(identity)
    }

    fn other_player(&self, identity: &str) -> Option<&str> {
        let opponent = self.opponent.as_deref()?;
        if self.initiator == identity {
            Some(opponent)
        } else if opponent == identity {
            Some(&self.initiator)
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct GameTable {
    games: BTreeMap<GameId, RelayGame>,
}

impl GameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Number of games that have both players.
    pub fn running(&self) -> usize {
        self.games
            .values()
            .filter(|game| game.opponent.is_some())
            .count()
    }

    /// Greets a newly admitted client and replays the invites still open.
    pub fn on_connect(&self, identity: &str) -> Vec<Delivery> {
        let mut deliveries = vec![Delivery::all(format!("JOINED:{}", identity))];
        deliveries.extend(
            self.games
                .iter()
                .filter(|(_, game)| game.opponent.is_none())
                .map(|(game_id, game)| {
                    Delivery::one(
                        identity,
                        Frame::NewGame {
                            kind: game.kind,
                            game_id: game_id.clone(),
                            initiator: game.initiator.clone(),
                        },
                    )
                }),
        );
        deliveries
    }

    /// Handles one frame from `sender`.
    pub fn on_frame(&mut self, sender: &str, frame: Frame) -> Vec<Delivery> {
        match frame {
            Frame::Chat(text) => {
                vec![Delivery::all_except(sender, format!("{}: {}", sender, text))]
            }
            Frame::NewGame {
                kind,
                ref game_id,
                ref initiator,
            } => {
                if initiator != sender {
                    warn!("{} announced a game on behalf of {}", sender, initiator);
                    return Vec::new();
                }
                if self.games.contains_key(game_id) {
                    warn!("Game {} already exists", game_id);
                    return Vec::new();
                }

                info!("{} opened {} game {}", sender, kind, game_id);
                self.games.insert(
                    game_id.clone(),
                    RelayGame {
                        kind,
                        initiator: sender.to_string(),
                        opponent: None,
                        reset_requests: HashSet::new(),
                    },
                );
                vec![Delivery::all(&frame)]
            }
            Frame::JoinRequest {
                kind,
                game_id,
                requester,
                ..
            } => self.join(sender, kind, game_id, requester),
            Frame::Move { ref game_id, .. } | Frame::GameOver { ref game_id, .. } => {
                match self.games.get(game_id).and_then(|game| game.other_player(sender)) {
                    Some(opponent) => vec![Delivery::one(opponent, &frame)],
                    None => {
                        debug!("{} is not playing game {}", sender, game_id);
                        Vec::new()
                    }
                }
            }
            Frame::ResetRequest { game_id } => self.reset(sender, game_id),
            Frame::Exit { ref game_id, .. } => {
                let is_player = self
                    .games
                    .get(game_id)
                    .map_or(false, |game| game.is_player(sender));
                if !is_player {
                    debug!("{} cannot exit game {}", sender, game_id);
                    return Vec::new();
                }

                self.games.remove(game_id);
                info!("{} left game {}", sender, game_id);
                vec![Delivery::all_except(sender, &frame)]
            }
            Frame::JoinAck { .. }
            | Frame::Start { .. }
            | Frame::ResetPending { .. }
            | Frame::ResetConfirmed { .. }
            | Frame::Disconnect { .. } => {
                warn!("Ignoring relay-only frame from {}: {}", sender, frame);
                Vec::new()
            }
        }
    }

    /// Ends every game `identity` was part of and announces the departure.
    pub fn on_disconnect(&mut self, identity: &str) -> Vec<Delivery> {
        let abandoned: Vec<GameId> = self
            .games
            .iter()
            .filter(|(_, game)| game.is_player(identity))
            .map(|(game_id, _)| game_id.clone())
            .collect();

        let mut deliveries = Vec::new();
        for game_id in abandoned {
            if let Some(game) = self.games.remove(&game_id) {
                info!("Game {} ended because {} left", game_id, identity);
                deliveries.push(Delivery::all_except(
                    identity,
                    Frame::Exit {
                        kind: game.kind,
                        game_id,
                    },
                ));
            }
        }

        deliveries.push(Delivery::all_except(identity, format!("LEFT:{}", identity)));
        deliveries
    }

    fn join(
        &mut self,
        sender: &str,
        kind: GameKind,
        game_id: GameId,
        requester: String,
    ) -> Vec<Delivery> {
        if requester != sender {
            warn!("{} asked to join on behalf of {}", sender, requester);
            return Vec::new();
        }

        let Some(game) = self.games.get_mut(&game_id) else {
            debug!("{} asked to join unknown game {}", sender, game_id);
            return Vec::new();
        };
        if game.kind != kind || game.initiator == requester {
            warn!("{} cannot join game {}", requester, game_id);
            return Vec::new();
        }
        if game.opponent.is_some() {
            debug!("Game {} is already taken, ignoring {}", game_id, requester);
            return Vec::new();
        }

        game.opponent = Some(requester.clone());
        let initiator = game.initiator.clone();
        info!("{} joined {}'s game {}", requester, initiator, game_id);

        let ack = Frame::JoinAck {
            kind,
            game_id: game_id.clone(),
            players: vec![initiator.clone(), requester.clone()],
        };
        let start = Frame::Start {
            kind,
            game_id,
            player1: initiator.clone(),
            player2: requester.clone(),
        };
        vec![
            Delivery::one(&initiator, &ack),
            Delivery::one(&requester, &ack),
            Delivery::all(&start),
        ]
    }

    fn reset(&mut self, sender: &str, game_id: GameId) -> Vec<Delivery> {
        let Some(game) = self.games.get_mut(&game_id) else {
            debug!("Reset for unknown game {}", game_id);
            return Vec::new();
        };
        let Some(other) = game.other_player(sender).map(str::to_string) else {
            debug!("{} cannot reset game {}", sender, game_id);
            return Vec::new();
        };

        if game.reset_requests.remove(&other) {
            game.reset_requests.clear();
            info!("Game {} reset", game_id);
            let confirmed = Frame::ResetConfirmed { game_id };
            return vec![
                Delivery::one(sender, &confirmed),
                Delivery::one(&other, &confirmed),
            ];
        }

        if !game.reset_requests.insert(sender.to_string()) {
            debug!("{} already asked to reset game {}", sender, game_id);
            return Vec::new();
        }

        vec![Delivery::one(
            &other,
            Frame::ResetPending {
                game_id,
                requester: sender.to_string(),
            },
        )]
    }
}
