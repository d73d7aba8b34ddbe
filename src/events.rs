use std::sync::{Arc, Mutex};

/// Lifecycle notifications emitted around export and preview operations.
/// The hosting UI typically maps these onto its notification area and onto
/// disabling the triggering controls while an operation is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    ExportStarted { target: String },
    ExportFinished { pages: usize },
    ExportFailed { message: String },
    PreviewOpened { title: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Explicit publish/subscribe hub with a subscribe/unsubscribe lifecycle,
/// passed by reference to consumers. Cloning shares the same subscriber set.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<HubState>>,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

struct Subscriber {
    id: u64,
    callback: Box<dyn Fn(&ExportEvent) + Send>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl Fn(&ExportEvent) + Send + 'static) -> SubscriptionId {
        let mut state = match self.inner.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.push(Subscriber {
            id,
            callback: Box::new(callback),
        });
        SubscriptionId(id)
    }

    /// Returns whether the subscription was still registered.
    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        if let Ok(mut state) = self.inner.lock() {
            let before = state.subscribers.len();
            state.subscribers.retain(|sub| sub.id != subscription.0);
            state.subscribers.len() != before
        } else {
            false
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .map(|state| state.subscribers.len())
            .unwrap_or(0)
    }

    pub(crate) fn emit(&self, event: &ExportEvent) {
        if let Ok(state) = self.inner.lock() {
            for subscriber in &state.subscribers {
                (subscriber.callback)(event);
            }
        }
    }
}
