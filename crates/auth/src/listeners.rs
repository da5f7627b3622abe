//! Ordered publish/subscribe channel for session state changes.
//!
//! Listeners run synchronously on the notifying task, in registration order.
//! Subscribing, unsubscribing, or notifying from inside a listener is allowed:
//! those requests are queued and applied once the current pass finishes.
//! Queued membership changes are applied before queued notifications.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

enum Membership<T> {
    Add(u64, Listener<T>),
    Remove(u64),
}

struct Inner<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
    delivering: bool,
    pending_membership: Vec<Membership<T>>,
    pending_events: VecDeque<T>,
}

impl<T> Inner<T> {
    fn apply_membership(&mut self) {
        for change in std::mem::take(&mut self.pending_membership) {
            match change {
                Membership::Add(id, listener) => self.listeners.push((id, listener)),
                Membership::Remove(id) => self.listeners.retain(|(lid, _)| *lid != id),
            }
        }
    }

    fn remove(&mut self, id: u64) {
        if self.delivering {
            self.pending_membership.push(Membership::Remove(id));
        } else {
            self.listeners.retain(|(lid, _)| *lid != id);
        }
    }
}

/// Type-erased handle back to a listener set, so [`Subscription`] does not
/// carry the event type.
trait Detach: Send + Sync {
    fn detach(&self, id: u64);
}

impl<T: Send + 'static> Detach for Mutex<Inner<T>> {
    fn detach(&self, id: u64) {
        self.lock().unwrap_or_else(PoisonError::into_inner).remove(id);
    }
}

/// Handle returned by [`ListenerSet::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: u64,
    set: Weak<dyn Detach>,
}

impl Subscription {
    /// Remove the listener. Idempotent, and safe to call from inside a
    /// notification or after the listener set is gone.
    pub fn unsubscribe(&self) {
        if let Some(set) = self.set.upgrade() {
            set.detach(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

pub struct ListenerSet<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Send + 'static> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                next_id: 0,
                listeners: Vec::new(),
                delivering: false,
                pending_membership: Vec::new(),
                pending_events: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let listener: Listener<T> = Arc::new(listener);
        if inner.delivering {
            inner.pending_membership.push(Membership::Add(id, listener));
        } else {
            inner.listeners.push((id, listener));
        }
        drop(inner);

        let set: Arc<dyn Detach> = self.inner.clone();
        Subscription {
            id,
            set: Arc::downgrade(&set),
        }
    }

    /// Number of registered listeners, not counting queued changes.
    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every registered listener in order.
    ///
    /// When called while a pass is already running (from a listener, or
    /// concurrently from another task) the event is queued and delivered by
    /// the running pass after it completes.
    pub fn notify(&self, event: T) {
        {
            let mut inner = self.lock();
            inner.pending_events.push_back(event);
            if inner.delivering {
                return;
            }
            inner.delivering = true;
        }

        let guard = DeliveryGuard { inner: &self.inner };
        loop {
            let (event, snapshot) = {
                let mut inner = self.lock();
                inner.apply_membership();
                let Some(event) = inner.pending_events.pop_front() else {
                    // Ending the pass under the lock that saw the empty queue.
                    inner.delivering = false;
                    break;
                };
                let snapshot: Vec<Listener<T>> =
                    inner.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
                (event, snapshot)
            };

            for listener in &snapshot {
                listener(&event);
            }
        }
        std::mem::forget(guard);
    }
}

/// Ends a delivery pass when a listener panics. Events still queued stay
/// queued for the next pass.
struct DeliveryGuard<'a, T> {
    inner: &'a Mutex<Inner<T>>,
}

impl<T> Drop for DeliveryGuard<'_, T> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.apply_membership();
        inner.delivering = false;
    }
}
