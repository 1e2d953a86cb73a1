//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`service`] — Scripted [`ManagedService`](crate::service::ManagedService)
//!   double: `ScriptedService`, plus the shared `Journal` used to assert
//!   call ordering across services.

pub mod service;

pub use service::{journal, Journal, ScriptedService};
