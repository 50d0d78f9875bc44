use std::sync::{Arc, Weak};

/// Notifications published by actors and composite nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeEvent {
    /// An evaluation attempt finished, successfully or not.
    DataModified,
    GraphModified,
    ConnectionModified,
    /// Carries the `modified` flag of the composite after evaluation.
    StatusModified(bool),
}

pub trait Listener: Send + Sync {
    fn notify(&self, event: &NodeEvent);
}

/// Weak subscriber list. Dropped listeners are skipped and pruned on the
/// next subscription.
#[derive(Default, Clone)]
pub struct ListenerList {
    listeners: Vec<Weak<dyn Listener>>,
}

impl ListenerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: &Arc<dyn Listener>) {
        self.listeners.retain(|l| l.strong_count() > 0);
        self.listeners.push(Arc::downgrade(listener));
    }

    pub fn unsubscribe(&mut self, listener: &Arc<dyn Listener>) {
        let target = Arc::downgrade(listener);
        self.listeners
            .retain(|l| l.strong_count() > 0 && !Weak::ptr_eq(l, &target));
    }

    pub fn publish(&self, event: &NodeEvent) {
        for listener in self.listeners.iter().filter_map(Weak::upgrade) {
            listener.notify(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.iter().filter(|l| l.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ListenerList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ListenerList({})", self.len())
    }
}
