//! Module system API surface
//!
//! Event bus through which the registry and the loader report registrations,
//! loads and failures to subscribers.

pub mod events;

pub use events::{EventKind, EventManager, RegistryEvent, SubscriptionId};
