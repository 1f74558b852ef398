//! Integration tests for the relay server and chat clients
//!
//! Every test starts a real relay on a loopback port and drives it through
//! full `ChatClient`s, observing what each participant's front-end would see.

use client::connection::FrameListener;
use client::{ChatClient, ConnectionError, GameEvent, GameObserver, Phase};
use server::network::{Server, ShutdownHandle};
use shared::{Cell, GameId, GameKind, Outcome, Player};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};

/// Forwards every event to the test body.
struct EventTap {
    tx: mpsc::UnboundedSender<GameEvent>,
}

impl GameObserver for EventTap {
    fn on_event(&self, event: &GameEvent) {
        let _ = self.tx.send(event.clone());
    }
}

struct Participant {
    client: ChatClient,
    events: mpsc::UnboundedReceiver<GameEvent>,
}

impl Participant {
    fn new(addr: &str, name: &str) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let client = ChatClient::new(addr, name, Arc::new(EventTap { tx })).unwrap();
        Participant { client, events }
    }

    /// Connects and waits until the relay has admitted us.
    async fn join(addr: &str, name: &str) -> Self {
        let mut participant = Participant::new(addr, name);
        participant.client.connect().await.unwrap();
        let joined = format!("JOINED:{}", name);
        participant.expect(|e| is_chat(e, &joined)).await;
        participant
    }

    /// Waits for the first event matching `pred`, skipping the rest.
    async fn expect<F>(&mut self, mut pred: F) -> GameEvent
    where
        F: FnMut(&GameEvent) -> bool,
    {
        let wait = async {
            loop {
                let event = self.events.recv().await.expect("observer dropped");
                if pred(&event) {
                    return event;
                }
            }
        };
        timeout(Duration::from_secs(3), wait)
            .await
            .expect("timed out waiting for an event")
    }

    /// Collects everything that arrives within a short quiet period.
    async fn drain(&mut self) -> Vec<GameEvent> {
        sleep(Duration::from_millis(200)).await;
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    fn hub(&self) -> &Arc<client::GameHub> {
        self.client.hub()
    }
}

fn is_chat(event: &GameEvent, expected: &str) -> bool {
    matches!(event, GameEvent::ChatMessage { text } if text == expected)
}

async fn start_server() -> (String, ShutdownHandle) {
    let _ = env_logger::builder().is_test(true).try_init();
    let server = Server::new("127.0.0.1:0", 16).await.unwrap();
    let addr = server.local_addr().to_string();
    let handle = server.shutdown_handle();
    tokio::spawn(server.run());
    (addr, handle)
}

/// Opens a game as `host` and has `guest` join it. Returns once both sides
/// have seen the start.
async fn start_game(host: &mut Participant, guest: &mut Participant, kind: GameKind) -> GameId {
    let game_id = host.hub().request_new_game(kind);
    let id = game_id.clone();
    guest
        .expect(|e| {
            matches!(e, GameEvent::InviteReceived { game_id, own: false, .. } if *game_id == id)
        })
        .await;

    assert_ok!(guest.hub().request_join(&game_id));

    for participant in [&mut *host, &mut *guest] {
        let id = game_id.clone();
        participant
            .expect(|e| matches!(e, GameEvent::GameStarted { game_id, .. } if *game_id == id))
            .await;
    }
    game_id
}

/// Plays `(row, col)` for `mover` and waits until `other` has applied it.
async fn play(
    mover: &Participant,
    other: &mut Participant,
    game_id: &GameId,
    row: usize,
    col: usize,
) {
    assert_ok!(mover.hub().make_move(game_id, row, col));
    let id = game_id.clone();
    other
        .expect(|e| matches!(e, GameEvent::MoveApplied { game_id, .. } if *game_id == id))
        .await;
}

/// CHAT RELAY TESTS
mod chat_tests {
    use super::*;

    /// Free text reaches everyone else, prefixed with the sender's name
    #[tokio::test]
    async fn chat_reaches_other_participants() {
        let (addr, server) = start_server().await;
        let mut alice = Participant::join(&addr, "alice").await;
        let mut bob = Participant::join(&addr, "bob").await;
        alice.expect(|e| is_chat(e, "JOINED:bob")).await;

        assert!(alice.client.send_chat("hello bob"));
        bob.expect(|e| is_chat(e, "alice: hello bob")).await;

        let echoed = alice.drain().await;
        assert!(!echoed.iter().any(|e| is_chat(e, "alice: hello bob")));

        server.shutdown();
    }

    /// Chat text that looks like a protocol frame never leaves the client
    #[tokio::test]
    async fn protocol_lookalike_chat_is_refused() {
        let (addr, server) = start_server().await;
        let alice = Participant::join(&addr, "alice").await;

        assert!(!alice.client.send_chat("EXIT_TICTACTOE:1"));
        assert!(alice.client.send_chat("EXIT is not a frame"));

        server.shutdown();
    }

    /// Leaving the room is announced to the remaining participants
    #[tokio::test]
    async fn departure_is_announced() {
        let (addr, server) = start_server().await;
        let mut alice = Participant::join(&addr, "alice").await;
        let bob = Participant::join(&addr, "bob").await;

        bob.client.shutdown().await;
        alice.expect(|e| is_chat(e, "LEFT:bob")).await;
        assert!(!bob.client.is_connected());

        server.shutdown();
    }
}

/// GAMEPLAY TESTS
mod game_tests {
    use super::*;

    /// A complete tic-tac-toe game ending in a win for the host
    #[tokio::test]
    async fn tictactoe_full_game() {
        let (addr, server) = start_server().await;
        let mut alice = Participant::join(&addr, "alice").await;
        let mut bob = Participant::join(&addr, "bob").await;

        let game_id = start_game(&mut alice, &mut bob, GameKind::TicTacToe).await;

        let session = alice.hub().session(&game_id).unwrap();
        assert_eq!(session.local_player(), Player::One);
        assert!(session.is_local_turn());
        assert!(!bob.hub().session(&game_id).unwrap().is_local_turn());

        play(&alice, &mut bob, &game_id, 0, 0).await;
        play(&bob, &mut alice, &game_id, 1, 0).await;
        play(&alice, &mut bob, &game_id, 0, 1).await;
        play(&bob, &mut alice, &game_id, 1, 1).await;
        play(&alice, &mut bob, &game_id, 0, 2).await;

        for participant in [&mut alice, &mut bob] {
            let id = game_id.clone();
            let ended = participant
                .expect(|e| matches!(e, GameEvent::GameEnded { game_id, .. } if *game_id == id))
                .await;
            assert!(matches!(
                ended,
                GameEvent::GameEnded { outcome: Outcome::Win(Player::One), .. }
            ));
            let session = participant.hub().session(&game_id).unwrap();
            assert_eq!(session.phase(), Phase::Terminal(Outcome::Win(Player::One)));
        }

        assert_err!(bob.hub().make_move(&game_id, 2, 2));

        server.shutdown();
    }

    /// Four-in-a-row pieces fall to the lowest free row on both boards
    #[tokio::test]
    async fn four_in_a_row_vertical_win() {
        let (addr, server) = start_server().await;
        let mut alice = Participant::join(&addr, "alice").await;
        let mut bob = Participant::join(&addr, "bob").await;

        let game_id = start_game(&mut alice, &mut bob, GameKind::FourInARow).await;

        for _ in 0..3 {
            play(&alice, &mut bob, &game_id, 0, 3).await;
            play(&bob, &mut alice, &game_id, 0, 4).await;
        }
        play(&alice, &mut bob, &game_id, 0, 3).await;

        let id = game_id.clone();
        bob.expect(|e| matches!(e, GameEvent::GameEnded { game_id, .. } if *game_id == id))
            .await;

        let board = bob.hub().session(&game_id).unwrap().board().clone();
        assert_eq!(board.get(5, 3), Some(Cell::Player1));
        assert_eq!(board.get(2, 3), Some(Cell::Player1));
        assert_eq!(board.get(1, 3), Some(Cell::Empty));
        assert_eq!(board.get(3, 4), Some(Cell::Player2));
        assert_eq!(
            bob.hub().session(&game_id).unwrap().outcome(),
            Some(Outcome::Win(Player::One))
        );

        server.shutdown();
    }

    /// Two users race to join the same invite; exactly one gets the seat
    #[tokio::test]
    async fn first_join_wins() {
        let (addr, server) = start_server().await;
        let mut alice = Participant::join(&addr, "alice").await;
        let mut bob = Participant::join(&addr, "bob").await;
        let mut carol = Participant::join(&addr, "carol").await;

        let game_id = alice.hub().request_new_game(GameKind::TicTacToe);
        for participant in [&mut bob, &mut carol] {
            let id = game_id.clone();
            participant
                .expect(|e| {
                    matches!(e, GameEvent::InviteReceived { game_id, .. } if *game_id == id)
                })
                .await;
        }

        assert_ok!(bob.hub().request_join(&game_id));
        assert_ok!(carol.hub().request_join(&game_id));

        let id = game_id.clone();
        let started = alice
            .expect(|e| matches!(e, GameEvent::GameStarted { game_id, .. } if *game_id == id))
            .await;
        let GameEvent::GameStarted { player2, .. } = started else {
            unreachable!()
        };

        let (winner, loser) = if player2 == "bob" {
            (&mut bob, &mut carol)
        } else {
            (&mut carol, &mut bob)
        };

        let id = game_id.clone();
        winner
            .expect(|e| matches!(e, GameEvent::GameStarted { game_id, .. } if *game_id == id))
            .await;
        let id = game_id.clone();
        loser
            .expect(|e| matches!(e, GameEvent::GameAnnounced { game_id, .. } if *game_id == id))
            .await;

        assert!(winner.hub().session(&game_id).is_some());
        assert!(loser.hub().session(&game_id).is_none());
        let late = alice.drain().await;
        assert!(!late
            .iter()
            .any(|e| matches!(e, GameEvent::GameStarted { .. })));

        server.shutdown();
    }

    /// Both players asking for a rematch at once yields exactly one reset
    #[tokio::test]
    async fn simultaneous_reset_applies_once() {
        let (addr, server) = start_server().await;
        let mut alice = Participant::join(&addr, "alice").await;
        let mut bob = Participant::join(&addr, "bob").await;

        let game_id = start_game(&mut alice, &mut bob, GameKind::TicTacToe).await;
        play(&alice, &mut bob, &game_id, 1, 1).await;

        assert_ok!(alice.hub().request_reset(&game_id));
        assert_ok!(bob.hub().request_reset(&game_id));

        for participant in [&mut alice, &mut bob] {
            let id = game_id.clone();
            participant
                .expect(|e| matches!(e, GameEvent::ResetApplied { game_id, .. } if *game_id == id))
                .await;
            let extra = participant.drain().await;
            assert!(!extra
                .iter()
                .any(|e| matches!(e, GameEvent::ResetApplied { .. })));

            let session = participant.hub().session(&game_id).unwrap();
            assert!(session.board().is_empty());
            assert_eq!(session.starter(), Player::Two);
            assert_eq!(session.turn(), Player::Two);
            assert_eq!(session.rounds(), 2);
        }

        // The guest opens the second round.
        assert_err!(alice.hub().make_move(&game_id, 0, 0));
        play(&bob, &mut alice, &game_id, 0, 0).await;

        server.shutdown();
    }

    /// A reset offer shows up on the other side before it is confirmed
    #[tokio::test]
    async fn reset_after_game_over() {
        let (addr, server) = start_server().await;
        let mut alice = Participant::join(&addr, "alice").await;
        let mut bob = Participant::join(&addr, "bob").await;

        let game_id = start_game(&mut alice, &mut bob, GameKind::TicTacToe).await;
        play(&alice, &mut bob, &game_id, 0, 0).await;
        play(&bob, &mut alice, &game_id, 1, 0).await;
        play(&alice, &mut bob, &game_id, 0, 1).await;
        play(&bob, &mut alice, &game_id, 1, 1).await;
        play(&alice, &mut bob, &game_id, 0, 2).await;

        assert_ok!(bob.hub().request_reset(&game_id));
        let id = game_id.clone();
        alice
            .expect(|e| {
                matches!(e, GameEvent::ResetOffered { game_id, requester }
                    if *game_id == id && requester == "bob")
            })
            .await;

        assert_ok!(alice.hub().request_reset(&game_id));
        for participant in [&mut alice, &mut bob] {
            let id = game_id.clone();
            participant
                .expect(|e| matches!(e, GameEvent::ResetApplied { game_id, .. } if *game_id == id))
                .await;
            assert_eq!(
                participant.hub().session(&game_id).unwrap().phase(),
                Phase::Active
            );
        }

        server.shutdown();
    }
}

/// TEARDOWN TESTS
mod teardown_tests {
    use super::*;

    /// Exiting a game closes it for the opponent
    #[tokio::test]
    async fn exit_closes_game_for_opponent() {
        let (addr, server) = start_server().await;
        let mut alice = Participant::join(&addr, "alice").await;
        let mut bob = Participant::join(&addr, "bob").await;

        let game_id = start_game(&mut alice, &mut bob, GameKind::FourInARow).await;
        assert_ok!(alice.hub().exit_game(&game_id));

        let id = game_id.clone();
        bob.expect(|e| matches!(e, GameEvent::OpponentLeft { game_id } if *game_id == id))
            .await;
        assert_err!(bob.hub().make_move(&game_id, 0, 0));

        server.shutdown();
    }

    /// Disconnecting mid-game ends the game and announces the departure
    #[tokio::test]
    async fn disconnect_mid_game() {
        let (addr, server) = start_server().await;
        let mut alice = Participant::join(&addr, "alice").await;
        let mut bob = Participant::join(&addr, "bob").await;

        let game_id = start_game(&mut alice, &mut bob, GameKind::TicTacToe).await;
        play(&alice, &mut bob, &game_id, 0, 0).await;

        bob.client.connection().disconnect().await;

        let id = game_id.clone();
        alice
            .expect(|e| matches!(e, GameEvent::OpponentLeft { game_id } if *game_id == id))
            .await;
        alice.expect(|e| is_chat(e, "LEFT:bob")).await;

        server.shutdown();
    }

    /// An open invite disappears when its creator leaves
    #[tokio::test]
    async fn withdrawn_invite() {
        let (addr, server) = start_server().await;
        let alice = Participant::join(&addr, "alice").await;
        let mut bob = Participant::join(&addr, "bob").await;

        let game_id = alice.hub().request_new_game(GameKind::TicTacToe);
        let id = game_id.clone();
        bob.expect(|e| matches!(e, GameEvent::InviteReceived { game_id, .. } if *game_id == id))
            .await;

        alice.client.shutdown().await;
        let id = game_id.clone();
        bob.expect(|e| matches!(e, GameEvent::InviteWithdrawn { game_id } if *game_id == id))
            .await;
        assert_err!(bob.hub().request_join(&game_id));

        server.shutdown();
    }

    /// Late joiners are told about invites that are still open
    #[tokio::test]
    async fn open_invites_are_replayed() {
        let (addr, server) = start_server().await;
        let mut alice = Participant::join(&addr, "alice").await;
        let game_id = alice.hub().request_new_game(GameKind::FourInARow);
        let id = game_id.clone();
        alice
            .expect(|e| {
                matches!(e, GameEvent::InviteReceived { game_id, own: true, .. } if *game_id == id)
            })
            .await;

        let mut bob = Participant::new(&addr, "bob");
        bob.client.connect().await.unwrap();
        let id = game_id.clone();
        bob.expect(|e| {
            matches!(e, GameEvent::InviteReceived { game_id, kind: GameKind::FourInARow, .. }
                if *game_id == id)
        })
        .await;

        server.shutdown();
    }
}

/// ROBUSTNESS TESTS
mod robustness_tests {
    use super::*;

    /// Moves for games nobody started are dropped without side effects
    #[tokio::test]
    async fn move_for_unknown_game_is_ignored() {
        let (addr, server) = start_server().await;
        let alice = Participant::join(&addr, "alice").await;
        let mut bob = Participant::join(&addr, "bob").await;

        assert!(alice.client.connection().send("MOVE4:404:5:0:1"));
        assert!(alice.client.send_chat("still here"));

        let events = {
            bob.expect(|e| is_chat(e, "alice: still here")).await;
            bob.drain().await
        };
        assert!(!events
            .iter()
            .any(|e| matches!(e, GameEvent::MoveApplied { .. })));
        assert!(bob.hub().sessions().is_empty());

        server.shutdown();
    }

    /// Nothing can be sent before connecting
    #[tokio::test]
    async fn send_while_disconnected() {
        let (addr, server) = start_server().await;
        let alice = Participant::new(&addr, "alice");

        assert!(!alice.client.is_connected());
        assert!(!alice.client.send_chat("anyone?"));
        assert!(!alice.client.connection().send("hello"));

        server.shutdown();
    }

    /// A router can only be subscribed once
    #[tokio::test]
    async fn duplicate_subscriber_is_rejected() {
        let (addr, server) = start_server().await;
        let alice = Participant::join(&addr, "alice").await;

        let router: Arc<dyn FrameListener> = alice.client.router().clone();
        assert!(matches!(
            alice.client.connection().subscribe(router),
            Err(ConnectionError::DuplicateSubscriber)
        ));
        assert_eq!(alice.client.connection().listener_count(), 1);

        server.shutdown();
    }

    /// A second connection under a taken name is turned away
    #[tokio::test]
    async fn duplicate_identity_is_refused() {
        let (addr, server) = start_server().await;
        let _alice = Participant::join(&addr, "alice").await;

        let mut impostor = Participant::new(&addr, "alice");
        impostor.client.connect().await.unwrap();
        impostor
            .expect(|e| {
                matches!(e, GameEvent::ChatMessage { text }
                    if text.starts_with("Connection refused"))
            })
            .await;

        sleep(Duration::from_millis(200)).await;
        assert!(!impostor.client.is_connected());

        server.shutdown();
    }
}
