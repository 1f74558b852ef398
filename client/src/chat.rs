//! Wiring of one chat participant: connection, router, game hub and chat feed.

use log::warn;
use shared::{Category, Frame};
use std::sync::Arc;

use crate::connection::{ConnectionError, ConnectionManager};
use crate::events::{GameEvent, GameObserver};
use crate::hub::GameHub;
use crate::router::{FrameHandler, MessageRouter};

/// Categories the game hub consumes.
pub const GAME_CATEGORIES: [Category; 7] = [
    Category::Invite,
    Category::Join,
    Category::Start,
    Category::Move,
    Category::GameOver,
    Category::Reset,
    Category::Exit,
];

/// Forwards chat lines to the observer.
pub struct ChatFeed {
    observer: Arc<dyn GameObserver>,
}

impl ChatFeed {
    pub fn new(observer: Arc<dyn GameObserver>) -> Self {
        Self { observer }
    }
}

impl FrameHandler for ChatFeed {
    fn handle(&self, frame: &Frame) {
        if let Frame::Chat(text) = frame {
            self.observer.on_event(&GameEvent::ChatMessage { text: text.clone() });
        }
    }
}

/// A connected chat participant.
pub struct ChatClient {
    identity: String,
    connection: Arc<ConnectionManager>,
    router: Arc<MessageRouter>,
    hub: Arc<GameHub>,
}

impl ChatClient {
    /// Builds the component graph. Nothing is dialed until [`connect`](Self::connect).
    pub fn new(
        server_addr: &str,
        identity: &str,
        observer: Arc<dyn GameObserver>,
    ) -> Result<Self, ConnectionError> {
        if !shared::is_valid_identity(identity) {
            return Err(ConnectionError::InvalidIdentity(identity.to_string()));
        }

        let connection = Arc::new(ConnectionManager::new(server_addr));
        let hub = Arc::new(GameHub::new(identity, connection.clone(), observer.clone()));

        let router = Arc::new(MessageRouter::new());
        router.route(Category::Chat, Arc::new(ChatFeed::new(observer)));
        router.route_all(&GAME_CATEGORIES, hub.clone());
        connection.subscribe(router.clone())?;

        Ok(Self {
            identity: identity.to_string(),
            connection,
            router,
            hub,
        })
    }

    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.connection.connect(&self.identity).await
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn hub(&self) -> &Arc<GameHub> {
        &self.hub
    }

    /// Sends free text. Text that would parse as a protocol frame is refused.
    pub fn send_chat(&self, text: &str) -> bool {
        if !matches!(Frame::parse(text), Ok(Frame::Chat(_))) {
            warn!("Refusing to send chat text that looks like a protocol frame");
            return false;
        }
        self.connection.send(text)
    }

    /// Leaves all games and closes the connection.
    pub async fn shutdown(&self) {
        self.hub.exit_all();
        self.connection.disconnect().await;
    }
}
