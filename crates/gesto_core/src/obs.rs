//! Observable value cell
//!
//! A value with synchronous change notification. Setting the value first
//! stores it, then invokes every subscriber in registration order with the
//! previous and the new value, so a subscriber never observes a stale cell.
//!
//! ```
//! use gesto_core::obs::ObsValue;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let mut cell = ObsValue::new(1);
//!
//! let sink = seen.clone();
//! cell.subscribe(move |old: &i32, new: &i32| sink.borrow_mut().push((*old, *new)));
//!
//! cell.set(2);
//! assert_eq!(*cell.get(), 2);
//! assert_eq!(*seen.borrow(), vec![(1, 2)]);
//! ```

use std::fmt;

/// Handle returned by [`ObsValue::subscribe`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber<T> = Box<dyn FnMut(&T, &T)>;

/// A value whose changes are broadcast to subscribers
pub struct ObsValue<T> {
    value: T,
    /// Kept in registration order
    subscribers: Vec<(SubscriptionId, Subscriber<T>)>,
    next_id: u64,
}

impl<T> ObsValue<T> {
    /// Create a cell holding `value`
    pub fn new(value: T) -> Self {
        Self {
            value,
            subscribers: Vec::new(),
            next_id: 0,
        }
    }

    /// Get the current value
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replace the value and notify subscribers with `(old, new)`
    pub fn set(&mut self, value: T) {
        let old = std::mem::replace(&mut self.value, value);
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&old, &self.value);
        }
    }

    /// Replace the value without notifying subscribers
    pub fn set_silent(&mut self, value: T) -> T {
        std::mem::replace(&mut self.value, value)
    }

    /// Subscribe to changes
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&T, &T) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscriber, returning whether it was registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        before != self.subscribers.len()
    }

    /// Remove every subscriber
    pub fn unsubscribe_all(&mut self) {
        self.subscribers.clear();
    }

    /// Number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T: fmt::Debug> fmt::Debug for ObsValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObsValue")
            .field("value", &self.value)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
