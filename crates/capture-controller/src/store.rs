//! UI state store with synchronous subscribers

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::state::UiState;

type Subscriber = Arc<dyn Fn(&UiState) + Send + Sync>;

/// Handle returned by [`UiStateStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Inner {
    state: UiState,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_id: u64,
    /// States staged but not yet delivered, oldest first
    pending: VecDeque<UiState>,
    /// A thread is currently draining `pending`
    delivering: bool,
}

/// Holds the latest UI state and notifies subscribers on every change
///
/// Notifications are delivered in staging order, one at a time and never
/// under the store lock. A subscriber may read the store or stage a new
/// state; the nested state is delivered after the current one.
pub struct UiStateStore {
    inner: Mutex<Inner>,
}

/// Clears the delivering flag if a subscriber panics mid-delivery
struct DeliveryGuard<'a> {
    store: &'a UiStateStore,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.store.lock().delivering = false;
        }
    }
}

impl UiStateStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: UiState::default(),
                subscribers: Vec::new(),
                next_id: 0,
                pending: VecDeque::new(),
                delivering: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the state and notify subscribers in subscription order
    pub fn set(&self, state: UiState) {
        self.stage(state);
        self.notify();
    }

    /// Replace the state and queue it for delivery without calling subscribers
    ///
    /// `snapshot` reflects the staged state immediately.
    pub fn stage(&self, state: UiState) {
        let mut inner = self.lock();
        inner.state = state.clone();
        inner.pending.push_back(state);
    }

    /// Deliver queued states, unless another call is already delivering them
    pub fn notify(&self) {
        {
            let mut inner = self.lock();
            if inner.delivering {
                return;
            }
            inner.delivering = true;
        }
        let _guard = DeliveryGuard { store: self };

        loop {
            let (state, subscribers): (UiState, Vec<Subscriber>) = {
                let mut inner = self.lock();
                match inner.pending.pop_front() {
                    Some(state) => {
                        let subscribers =
                            inner.subscribers.iter().map(|(_, s)| s.clone()).collect();
                        (state, subscribers)
                    }
                    None => {
                        inner.delivering = false;
                        return;
                    }
                }
            };

            debug!(
                phase = ?state.phase,
                request = state.request_id,
                subscribers = subscribers.len(),
                "UI state updated"
            );
            for subscriber in subscribers {
                subscriber(&state);
            }
        }
    }

    /// Current state
    pub fn snapshot(&self) -> UiState {
        self.lock().state.clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&UiState) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscriber; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() != before
    }
}

impl Default for UiStateStore {
    fn default() -> Self {
        Self::new()
    }
}
