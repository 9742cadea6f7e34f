//! `cardvault-events` — event contract and in-process observation.

pub mod event;
pub mod observer;

pub use event::Event;
pub use observer::{EventObserver, ObserverSet};
