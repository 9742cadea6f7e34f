//! Event observation (mechanics only).
//!
//! Observers are in-process consumers notified **after** a state change has
//! been committed. They are deliberately one-way:
//!
//! - **Post-commit**: an observer never sees an event for a write that was
//!   rolled back, and a failing observer cannot undo the write.
//! - **Infallible contract**: `notify` returns nothing. Observers handle (and
//!   log) their own failures; the emitting operation has already succeeded.
//! - **Ordered fan-out**: observers run sequentially in attach order, so an
//!   audit line is written before a notification referencing it goes out.
//!
//! Cross-process distribution (message brokers, webhooks) would live behind
//! an observer that forwards, not in this contract.

use std::sync::Arc;

use async_trait::async_trait;

/// An in-process consumer of committed events.
#[async_trait]
pub trait EventObserver<E>: Send + Sync {
    async fn notify(&self, event: &E);
}

#[async_trait]
impl<E, O> EventObserver<E> for Arc<O>
where
    E: Send + Sync + 'static,
    O: EventObserver<E> + ?Sized,
{
    async fn notify(&self, event: &E) {
        (**self).notify(event).await;
    }
}

/// An ordered collection of observers sharing one event type.
///
/// Built once at wiring time and handed to the service that emits the events.
pub struct ObserverSet<E> {
    observers: Vec<Arc<dyn EventObserver<E>>>,
}

impl<E> Default for ObserverSet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ObserverSet<E> {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Append an observer. Attach order is delivery order.
    pub fn attach(&mut self, observer: Arc<dyn EventObserver<E>>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl<E: Send + Sync + 'static> ObserverSet<E> {
    /// Deliver `event` to every observer, in attach order.
    pub async fn notify_all(&self, event: &E) {
        for observer in &self.observers {
            observer.notify(event).await;
        }
    }
}

impl<E> core::fmt::Debug for ObserverSet<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    struct Ping(&'static str);

    struct Recorder {
        tag: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventObserver<Ping> for Recorder {
        async fn notify(&self, event: &Ping) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.tag, event.0));
        }
    }

    #[tokio::test]
    async fn delivers_in_attach_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut set = ObserverSet::new();
        set.attach(Arc::new(Recorder {
            tag: "first",
            seen: Arc::clone(&seen),
        }));
        set.attach(Arc::new(Recorder {
            tag: "second",
            seen: Arc::clone(&seen),
        }));

        set.notify_all(&Ping("a")).await;
        set.notify_all(&Ping("b")).await;

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec!["first:a", "second:a", "first:b", "second:b"]);
    }

    #[tokio::test]
    async fn empty_set_is_a_no_op() {
        let set: ObserverSet<Ping> = ObserverSet::new();
        assert!(set.is_empty());
        set.notify_all(&Ping("quiet")).await;
    }
}
