use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::Visibility;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Event {
    Created { id: Uuid, parent: Option<Uuid> },
    Updated { id: Uuid },
    Trashed { id: Uuid },
    Restored { id: Uuid },
    Purged { id: Uuid },
    Moved { id: Uuid, new_parent: Option<Uuid> },
    Merged { source: Uuid, into: Uuid },
    Copied { source: Uuid, copy: Uuid },
    VisibilityChanged { id: Uuid, visibility: Visibility },
    MembershipChanged { id: Uuid, documents: usize },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}
