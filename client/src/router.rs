//! Classifies inbound lines and hands them to the handler registered for
//! their [`Category`].

use log::{debug, warn};
use shared::{Category, Frame};
use std::sync::{Arc, PoisonError, RwLock};

use crate::connection::FrameListener;

pub trait FrameHandler: Send + Sync {
    fn handle(&self, frame: &Frame);
}

/// Routing table from frame category to handlers.
///
/// Each line is parsed exactly once. Malformed tagged lines are logged and
/// dropped; lines with no handler for their category are ignored. Handlers
/// for the same category run in registration order.
#[derive(Default)]
pub struct MessageRouter {
    routes: RwLock<Vec<(Category, Arc<dyn FrameHandler>)>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, category: Category, handler: Arc<dyn FrameHandler>) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((category, handler));
    }

    pub fn route_all(&self, categories: &[Category], handler: Arc<dyn FrameHandler>) {
        for &category in categories {
            self.route(category, handler.clone());
        }
    }

    /// Parses `line` and delivers it. Returns the category it was delivered
    /// under, or `None` if the line was dropped.
    pub fn dispatch(&self, line: &str) -> Option<Category> {
        let frame = match Frame::parse(line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed frame `{}`: {}", line, e);
                return None;
            }
        };
        let category = frame.category();

        let handlers: Vec<Arc<dyn FrameHandler>> = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(routed, _)| *routed == category)
            .map(|(_, handler)| handler.clone())
            .collect();

        if handlers.is_empty() {
            debug!("No handler for {:?} frame", category);
            return None;
        }

        for handler in handlers {
            handler.handle(&frame);
        }
        Some(category)
    }
}

impl FrameListener for MessageRouter {
    fn on_line(&self, line: &str) {
        self.dispatch(line);
    }
}
