//! Multicast events with weak, handle-owned registrations
//!
//! An [`Event`] owns a registry of callbacks. Subscribing returns an
//! [`EventHandle`]; the subscriber keeps the handle and the registration lives
//! exactly as long as the handle does. The event never keeps subscribers alive
//! and a handle that outlives its event is inert.
//!
//! Subscribing or dropping a handle while the event is broadcasting is allowed:
//! the change is queued and merged once the broadcast finishes.

use crate::safe_list::{EntryId, SafeList};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::trace;

type Callback<A> = Box<dyn FnMut(&A)>;

trait Unbind {
    fn unbind(&self, id: EntryId);
}

struct Registry<A> {
    callbacks: RefCell<SafeList<Callback<A>>>,
    dispatching: Cell<bool>,
}

impl<A> Registry<A> {
    fn synchronize(&self) {
        if self.dispatching.get() {
            return;
        }
        // Removed callbacks may own handles to this registry; drop them after
        // the borrow is released.
        let removed = self.callbacks.borrow_mut().synchronize();
        drop(removed);
    }
}

impl<A> Unbind for Registry<A> {
    fn unbind(&self, id: EntryId) {
        self.callbacks.borrow_mut().queue_remove(id);
        self.synchronize();
    }
}

/// Event source broadcasting `&A` to every live registration.
pub struct Event<A> {
    registry: Rc<Registry<A>>,
}

impl<A: 'static> Event<A> {
    pub fn new() -> Self {
        Self {
            registry: Rc::new(Registry {
                callbacks: RefCell::new(SafeList::new()),
                dispatching: Cell::new(false),
            }),
        }
    }

    /// Register `callback`; it stays registered until the returned handle is dropped.
    pub fn subscribe<F>(&self, callback: F) -> EventHandle
    where
        F: FnMut(&A) + 'static,
    {
        let id = self
            .registry
            .callbacks
            .borrow_mut()
            .queue_add(Box::new(callback));
        self.registry.synchronize();

        let registry: Rc<dyn Unbind> = self.registry.clone();
        EventHandle {
            registry: Rc::downgrade(&registry),
            id,
        }
    }

    /// True when at least one registration is live.
    pub fn has_subscribers(&self) -> bool {
        if self.registry.dispatching.get() {
            return true;
        }
        self.registry.synchronize();
        !self.registry.callbacks.borrow().is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.synchronize();
        self.registry.callbacks.borrow().len()
    }

    /// Invoke every live callback with `args`.
    ///
    /// Broadcasts are not re-entrant: broadcasting this same event from inside
    /// one of its callbacks is ignored.
    pub fn broadcast(&self, args: &A) {
        let registry = &self.registry;
        if registry.dispatching.get() {
            trace!("Ignoring nested broadcast");
            return;
        }

        registry.synchronize();
        let mut live = registry.callbacks.borrow_mut().take_live();

        registry.dispatching.set(true);
        for (id, callback) in live.iter_mut() {
            if registry.callbacks.borrow().is_pending_removal(*id) {
                continue;
            }
            callback(args);
        }
        registry.dispatching.set(false);

        registry.callbacks.borrow_mut().restore_live(live);
        registry.synchronize();
    }
}

impl<A: 'static> Default for Event<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("subscribers", &self.registry.callbacks.borrow().len())
            .finish()
    }
}

/// Registration token. Dropping it removes the registration if the event still exists.
#[must_use = "dropping the handle removes the registration immediately"]
pub struct EventHandle {
    registry: Weak<dyn Unbind>,
    id: EntryId,
}

impl EventHandle {
    /// True while the originating event is still alive.
    pub fn is_bound(&self) -> bool {
        self.registry.strong_count() > 0
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unbind(self.id);
        }
    }
}

impl fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandle")
            .field("id", &self.id)
            .field("bound", &self.is_bound())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_all_subscribers() {
        let event: Event<u32> = Event::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let a = seen.clone();
        let _h1 = event.subscribe(move |v| a.borrow_mut().push(("a", *v)));
        let b = seen.clone();
        let _h2 = event.subscribe(move |v| b.borrow_mut().push(("b", *v)));

        event.broadcast(&7);
        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_dropping_handle_unsubscribes() {
        let event: Event<()> = Event::new();
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        let handle = event.subscribe(move |_| c.set(c.get() + 1));
        event.broadcast(&());
        drop(handle);
        event.broadcast(&());

        assert_eq!(count.get(), 1);
        assert!(!event.has_subscribers());
    }

    #[test]
    fn test_handle_outliving_event_is_inert() {
        let event: Event<()> = Event::new();
        let handle = event.subscribe(|_| {});
        assert!(handle.is_bound());
        drop(event);
        assert!(!handle.is_bound());
        drop(handle);
    }

    #[test]
    fn test_unsubscribe_during_broadcast_is_deferred() {
        let event: Event<()> = Event::new();
        let slot: Rc<RefCell<Option<EventHandle>>> = Rc::new(RefCell::new(None));
        let calls = Rc::new(Cell::new(0));

        let s = slot.clone();
        let c = calls.clone();
        let handle = event.subscribe(move |_| {
            c.set(c.get() + 1);
            // Drops our own registration from inside the callback.
            s.borrow_mut().take();
        });
        *slot.borrow_mut() = Some(handle);

        event.broadcast(&());
        event.broadcast(&());
        assert_eq!(calls.get(), 1);
        assert_eq!(event.subscriber_count(), 0);
    }

    #[test]
    fn test_subscribe_during_broadcast_takes_effect_next_time() {
        let event: Rc<Event<()>> = Rc::new(Event::new());
        let late_calls = Rc::new(Cell::new(0));
        let handles: Rc<RefCell<Vec<EventHandle>>> = Rc::new(RefCell::new(Vec::new()));

        let ev = Rc::downgrade(&event);
        let lc = late_calls.clone();
        let hs = handles.clone();
        let _first = event.subscribe(move |_| {
            if let Some(ev) = ev.upgrade() {
                if hs.borrow().is_empty() {
                    let lc = lc.clone();
                    let h = ev.subscribe(move |_| lc.set(lc.get() + 1));
                    hs.borrow_mut().push(h);
                }
            }
        });

        event.broadcast(&());
        assert_eq!(late_calls.get(), 0);
        event.broadcast(&());
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn test_has_subscribers() {
        let event: Event<String> = Event::new();
        assert!(!event.has_subscribers());
        let _h = event.subscribe(|_| {});
        assert!(event.has_subscribers());
    }
}
