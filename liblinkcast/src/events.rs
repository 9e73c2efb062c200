//! Progress events
//!
//! An in-process broadcast bus. Linking and publishing emit events as they go;
//! any number of subscribers may listen. With no subscribers events are
//! dropped immediately, and a lagging subscriber never blocks an emitter.
//!
//! ```no_run
//! use liblinkcast::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::PublishStarted {
//!     post_id: "abc123".to_string(),
//!     targets: 2,
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before the oldest events are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An account was linked (or re-linked)
    LinkCompleted {
        account_id: String,
        provider: String,
        created: bool,
    },

    /// A link attempt ended without linking anything
    LinkFailed {
        provider: Option<String>,
        code: String,
    },

    PublishStarted { post_id: String, targets: usize },

    /// One target finished, successfully or not
    TargetDelivered {
        post_id: String,
        account_id: String,
        provider: String,
        success: bool,
        error: Option<String>,
    },

    PublishCompleted {
        post_id: String,
        succeeded: usize,
        failed: usize,
    },
}
