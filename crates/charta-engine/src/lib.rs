//! Stateful half of the Charta engine: serialized version commits, the
//! debounced autosave pipeline, and the service facade that ties them to the
//! lifecycle rules and the interaction gate.

pub mod autosave;
pub mod error;
pub mod interactions;
pub mod service;
pub mod version_store;

pub use error::{Error, Result};
pub use service::ChartService;
pub use version_store::VersionStore;

#[cfg(test)]
mod tests;
