//! Shared types for the qualified-network advisory service.
//!
//! This crate contains:
//! - **Vocabulary** — transports, radio access networks, capabilities,
//!   call types, coverage, preference modes
//! - **Restriction vocabulary** — restrict types, release events and masks
//! - **Event payloads** — telephony/data-connection/provisioning change
//!   notifications posted to an evaluator instance
//! - **Errors** — the crate-level error type

pub mod error;
pub mod events;
pub mod types;

pub use error::QnsError;
pub use types::*;
