//! State dispatcher for pub-sub pattern

use std::collections::VecDeque;
use tracing::{debug, info};

use crate::state::events::GridEvent;

const MAX_HISTORY: usize = 100;

/// Trait for components that subscribe to grid events
pub trait GridSubscriber: Send {
    /// Handle a grid event
    fn on_grid_event(&mut self, event: &GridEvent);

    /// Get subscriber name for debugging
    fn name(&self) -> &str;
}

/// Notifies subscribers of grid events and keeps a bounded history
pub struct StateDispatcher {
    /// List of subscribers
    subscribers: Vec<Box<dyn GridSubscriber>>,

    /// Event history for debugging
    event_history: VecDeque<GridEvent>,

    /// Maximum event history size
    max_history: usize,
}

impl Default for StateDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StateDispatcher {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
            event_history: VecDeque::new(),
            max_history: MAX_HISTORY,
        }
    }

    /// Add a subscriber
    pub fn subscribe(&mut self, subscriber: Box<dyn GridSubscriber>) {
        info!(target: "dispatcher", "Adding subscriber: {}", subscriber.name());
        self.subscribers.push(subscriber);
    }

    /// Record the event and notify every subscriber in registration order
    pub fn dispatch(&mut self, event: GridEvent) {
        debug!(target: "dispatcher", "Dispatching {}: {:?}", event.kind(), event);

        for subscriber in &mut self.subscribers {
            subscriber.on_grid_event(&event);
        }

        self.event_history.push_back(event);
        while self.event_history.len() > self.max_history {
            self.event_history.pop_front();
        }
    }

    /// Get event history for debugging
    pub fn history(&self) -> impl Iterator<Item = &GridEvent> {
        self.event_history.iter()
    }

    pub fn last_event(&self) -> Option<&GridEvent> {
        self.event_history.back()
    }

    /// Clear event history
    pub fn clear_history(&mut self) {
        self.event_history.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl GridSubscriber for Recorder {
        fn on_grid_event(&mut self, event: &GridEvent) {
            self.seen.lock().unwrap().push(event.kind());
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    #[test]
    fn test_subscribers_see_every_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = StateDispatcher::new();
        dispatcher.subscribe(Box::new(Recorder { seen: seen.clone() }));

        dispatcher.dispatch(GridEvent::PageChanged { from: 1, to: 2 });
        dispatcher.dispatch(GridEvent::GlobalSearchCleared);

        assert_eq!(*seen.lock().unwrap(), vec!["page_changed", "global_search_cleared"]);
        assert_eq!(dispatcher.last_event(), Some(&GridEvent::GlobalSearchCleared));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut dispatcher = StateDispatcher::new();
        for page in 0..150 {
            dispatcher.dispatch(GridEvent::PageChanged {
                from: page,
                to: page + 1,
            });
        }
        assert_eq!(dispatcher.history().count(), MAX_HISTORY);
        assert_eq!(
            dispatcher.history().next(),
            Some(&GridEvent::PageChanged { from: 50, to: 51 })
        );
    }
}
