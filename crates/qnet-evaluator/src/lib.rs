//! # qnet-evaluator
//!
//! Decision core of the qualified-networks advisory service: per
//! (slot, capability) it decides whether the cellular (WWAN) or Wi-Fi (WLAN)
//! transport currently qualifies to carry that capability's traffic and
//! republishes the answer whenever it changes.
//!
//! ## Crate structure
//!
//! - [`config`] — carrier configuration: thresholds, hysteresis timers,
//!   handover-policy matrix, fallback tables
//! - [`clock`] — injectable monotonic time source
//! - [`timer`] — binary-heap timer table with tombstone cancellation
//! - [`monitor`] — quality-monitor contract and the table-backed default
//! - [`tracker`] — call-status contract and data-connection bookkeeping
//! - [`policy`] — selection-policy matcher and the default table builder
//! - [`restrict`] — per-transport restriction ledger (guarding, throttling,
//!   RTP penalties, fallback locks)
//! - [`evaluator`] — the orchestrating state machine
//! - [`slot`] — published per-slot state shared across sibling instances
//! - [`runtime`] — one worker thread + bounded control channel per instance

pub mod clock;
pub mod config;
pub mod evaluator;
pub mod monitor;
pub mod policy;
pub mod registry;
pub mod restrict;
pub mod runtime;
pub mod slot;
pub mod timer;
pub mod tracker;

pub use clock::{ManualClock, MonotonicClock, TimeSource};
pub use config::CarrierConfig;
pub use evaluator::{AccessNetworkEvaluator, EvaluatorEvent, WfcSettings};
pub use monitor::{QualityMonitor, TableQualityMonitor};
pub use policy::{AccessNetworkSelectionPolicy, Precondition, Threshold, ThresholdGroup};
pub use restrict::{RestrictManager, RestrictionsSnapshot};
pub use runtime::EvaluatorRuntime;
pub use slot::{PublishedState, SlotStateRegistry};
