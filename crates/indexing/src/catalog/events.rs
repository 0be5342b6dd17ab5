//! Catalog lifecycle notifications.

use tokio::sync::broadcast;

/// A catalog lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    /// `initialize` started.
    InitializeStarted,
    /// `initialize` finished with this many entries.
    InitializeCompleted {
        /// Entries in the catalog.
        count: usize,
    },
    /// `refresh` started.
    RefreshStarted,
    /// `refresh` finished with this many entries.
    RefreshCompleted {
        /// Entries in the catalog.
        count: usize,
    },
    /// An index was created.
    IndexCreated(String),
    /// An index was deleted.
    IndexDeleted(String),
    /// An index definition was updated.
    IndexUpdated(String),
}

/// Fan-out of catalog events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct CatalogEvents {
    sender: broadcast::Sender<CatalogEvent>,
}

impl Default for CatalogEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogEvents {
    /// Creates a channel with room for 64 undelivered events per subscriber.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Subscribes to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<CatalogEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event; having no subscribers is fine.
    pub fn emit(&self, event: CatalogEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let events = CatalogEvents::new();
        events.emit(CatalogEvent::RefreshStarted);

        let mut rx = events.subscribe();
        events.emit(CatalogEvent::IndexCreated("acme_orders".to_string()));
        assert_eq!(
            rx.recv().await.unwrap(),
            CatalogEvent::IndexCreated("acme_orders".to_string())
        );
    }
}
