use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Tree changes published after the owning transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    CategoryCreated {
        id: Uuid,
        parent_id: Option<Uuid>,
        path: String,
    },
    CategoryUpdated {
        id: Uuid,
        path: String,
        version: i32,
    },
    /// `affected` counts the moved node and all of its descendants.
    CategoryMoved {
        id: Uuid,
        old_parent_id: Option<Uuid>,
        new_parent_id: Option<Uuid>,
        old_path: String,
        new_path: String,
        affected: u64,
    },
    CategoryDeleted {
        id: Uuid,
        hard: bool,
        affected: u64,
    },
    CategoryTreeRebuilt {
        nodes: usize,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn category_id(&self) -> Option<Uuid> {
        match self {
            Event::CategoryCreated { id, .. }
            | Event::CategoryUpdated { id, .. }
            | Event::CategoryMoved { id, .. }
            | Event::CategoryDeleted { id, .. } => Some(*id),
            Event::CategoryTreeRebuilt { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when nobody is listening.
    /// The mutation that produced the event has already committed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Dropping category event");
        }
    }
}

/// Consumer hook for tree changes, e.g. a search indexer keeping
/// denormalized category paths on products in sync.
#[async_trait]
pub trait CategoryEventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Fans every received event out to all handlers until the channel closes.
pub async fn process_events(
    mut rx: mpsc::Receiver<Event>,
    handlers: Vec<Arc<dyn CategoryEventHandler>>,
) {
    info!(handlers = handlers.len(), "Starting category event processing loop");

    while let Some(event) = rx.recv().await {
        debug!(event = ?event, "Dispatching category event");

        let results = join_all(handlers.iter().map(|h| h.handle_event(&event))).await;
        for result in results {
            if let Err(e) = result {
                error!(
                    category_id = ?event.category_id(),
                    "Category event handler failed: {}", e
                );
            }
        }
    }

    info!("Category event channel closed");
}
