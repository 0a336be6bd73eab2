//! Core types and trait definitions for the Charta visit documentation engine.
//!
//! This crate has no HTTP, database or runtime dependencies. It holds the
//! visit data model, lifecycle rules, version diff, dosage calculators and
//! the interaction gate. Anything that needs a store or a timer lives in
//! `charta-engine`.

pub mod diagnosis;
pub mod diff;
pub mod dosage;
pub mod error;
pub mod gate;
pub mod interaction;
pub mod lifecycle;
pub mod prescription;
pub mod store;
pub mod visit;

pub use error::{Error, Result};
