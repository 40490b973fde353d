//! Observer Registry
//!
//! Observers register for [`AppEvent`]s and get back an id plus a receiving
//! channel. The registry never drops an entry on its own; observers call
//! [`ObserverRegistry::unregister`] when they go away.

use crate::domain::models::AppEvent;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

/// Handle to a registered observer. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

#[derive(Debug, Default)]
struct Slots {
    next_id: u64,
    senders: BTreeMap<u64, mpsc::UnboundedSender<AppEvent>>,
}

/// Shared table of observer channels
#[derive(Debug, Clone, Default)]
pub struct ObserverRegistry {
    slots: Arc<Mutex<Slots>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (ObserverId, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut slots = self.lock();
        let id = slots.next_id;
        slots.next_id += 1;
        slots.senders.insert(id, tx);
        (ObserverId(id), rx)
    }

    /// Returns false if the id was not registered
    pub fn unregister(&self, id: ObserverId) -> bool {
        self.lock().senders.remove(&id.0).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every registered observer, in registration order
    pub fn publish(&self, event: AppEvent) {
        let slots = self.lock();
        for (id, sender) in slots.senders.iter() {
            if sender.send(event.clone()).is_err() {
                trace!("Observer {} receiver dropped without unregistering", id);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::LinkState;

    #[test]
    fn test_register_and_publish() {
        let registry = ObserverRegistry::new();
        let (first, mut rx1) = registry.register();
        let (second, mut rx2) = registry.register();
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);

        registry.publish(AppEvent::StateChanged(LinkState::Scanning));
        assert_eq!(
            rx1.try_recv().unwrap(),
            AppEvent::StateChanged(LinkState::Scanning)
        );
        assert_eq!(
            rx2.try_recv().unwrap(),
            AppEvent::StateChanged(LinkState::Scanning)
        );
    }

    #[test]
    fn test_unregister_stops_delivery() {
        let registry = ObserverRegistry::new();
        let (id, mut rx) = registry.register();

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());

        registry.publish(AppEvent::StateChanged(LinkState::Idle));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let registry = ObserverRegistry::new();
        let (first, _rx1) = registry.register();
        registry.unregister(first);
        let (second, _rx2) = registry.register();
        assert!(second > first);
    }

    #[test]
    fn test_dropped_receiver_does_not_break_others() {
        let registry = ObserverRegistry::new();
        let (_dead, dead_rx) = registry.register();
        drop(dead_rx);
        let (_live, mut live_rx) = registry.register();

        registry.publish(AppEvent::CommandSent { sequence: 1 });
        assert_eq!(
            live_rx.try_recv().unwrap(),
            AppEvent::CommandSent { sequence: 1 }
        );
    }
}
