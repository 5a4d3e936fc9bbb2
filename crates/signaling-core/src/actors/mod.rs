//! Registry actor and its message set.
//!
//! All shared mutable state in the core (the online-endpoint directory and
//! both routing-entity directories) is owned by a single actor task.
//! Endpoints talk to it through [`registry::RegistryHandle`] using typed
//! request/response messages; nothing else ever touches the maps.

pub mod messages;
pub mod metrics;
pub mod registry;

pub use registry::{RegistryActor, RegistryHandle};
