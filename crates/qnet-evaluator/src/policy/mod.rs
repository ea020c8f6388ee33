//! Access-network selection policies.
//!
//! A policy is a pure matcher: a precondition (call type, preference,
//! coverage, optional guarding phase) plus OR-combined threshold groups,
//! each group an AND over individual signal thresholds. The evaluator looks
//! policies up by precondition and asks whether live quality satisfies them;
//! nothing in here has side effects.

pub mod builder;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use qnet_common::{
    AccessNetwork, CallType, Coverage, GuardingPhase, MatchType, Measurement, NetCapability,
    TransportType, WfcMode,
};

use crate::monitor::QualityMonitor;

/// Lookup key narrowing which policies apply to the current situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Precondition {
    pub call_type: CallType,
    pub preference: WfcMode,
    pub coverage: Coverage,
    /// Guarding phase qualifier; `None` unless the carrier uses widened
    /// thresholds while guarded.
    pub guarding: GuardingPhase,
}

impl Precondition {
    pub fn new(call_type: CallType, preference: WfcMode, coverage: Coverage) -> Self {
        Precondition {
            call_type,
            preference,
            coverage,
            guarding: GuardingPhase::None,
        }
    }

    pub fn with_guarding(mut self, guarding: GuardingPhase) -> Self {
        self.guarding = guarding;
        self
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?}/{:?}/{:?}",
            self.call_type, self.preference, self.coverage, self.guarding
        )
    }
}

/// One comparison against a live signal sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Threshold {
    pub access_network: AccessNetwork,
    pub measurement: Measurement,
    pub value: i32,
    pub match_type: MatchType,
    /// Dwell (backhaul) time the quality monitor should require before
    /// reporting a crossing of this threshold.
    pub wait_time_ms: u32,
}

impl Threshold {
    /// Whether `sample` satisfies the comparison.
    pub fn matches(&self, sample: i32) -> bool {
        match self.match_type {
            MatchType::EqualTo => sample == self.value,
            MatchType::EqualOrLarger => sample >= self.value,
            MatchType::EqualOrSmaller => sample <= self.value,
        }
    }

    /// A "Wi-Fi is weak" comparison, used for the in-call IWLAN counter.
    pub fn is_wifi_bad(&self) -> bool {
        self.access_network == AccessNetwork::Iwlan
            && self.measurement != Measurement::Availability
            && self.match_type == MatchType::EqualOrSmaller
    }
}

/// AND-combined set of thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdGroup {
    thresholds: Vec<Threshold>,
}

impl ThresholdGroup {
    pub fn new(thresholds: Vec<Threshold>) -> Self {
        ThresholdGroup { thresholds }
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    /// Every threshold must hold against a live sample; a missing sample
    /// never matches.
    pub fn satisfied_by(&self, monitor: &dyn QualityMonitor) -> bool {
        self.thresholds.iter().all(|t| {
            monitor
                .current_quality(t.access_network, t.measurement)
                .is_some_and(|sample| t.matches(sample))
        })
    }

    /// Same threshold set regardless of order (used to drop duplicate
    /// groups at build time).
    pub fn same_thresholds(&self, other: &[Threshold]) -> bool {
        self.thresholds.len() == other.len()
            && other.iter().all(|t| self.thresholds.contains(t))
    }

    pub fn has_wifi_bad_threshold(&self) -> bool {
        self.thresholds.iter().any(Threshold::is_wifi_bad)
    }
}

/// Precondition + threshold groups → "does `target_transport` qualify".
#[derive(Debug, Clone)]
pub struct AccessNetworkSelectionPolicy {
    pub capability: NetCapability,
    pub target_transport: TransportType,
    pub precondition: Precondition,
    groups: Vec<ThresholdGroup>,
}

impl AccessNetworkSelectionPolicy {
    pub fn new(
        capability: NetCapability,
        target_transport: TransportType,
        precondition: Precondition,
        groups: Vec<ThresholdGroup>,
    ) -> Self {
        AccessNetworkSelectionPolicy {
            capability,
            target_transport,
            precondition,
            groups,
        }
    }

    pub fn groups(&self) -> &[ThresholdGroup] {
        &self.groups
    }

    /// OR across groups; an empty group list is always satisfied (pure
    /// RAT-availability gate).
    pub fn satisfied_by(&self, monitor: &dyn QualityMonitor) -> bool {
        self.first_satisfied_group(monitor).is_some() || self.groups.is_empty()
    }

    pub fn first_satisfied_group(&self, monitor: &dyn QualityMonitor) -> Option<&ThresholdGroup> {
        self.groups.iter().find(|g| g.satisfied_by(monitor))
    }

    /// Satisfied, and the satisfying group includes a weak-Wi-Fi condition.
    pub fn satisfied_with_wifi_low_signal(&self, monitor: &dyn QualityMonitor) -> bool {
        self.first_satisfied_group(monitor)
            .is_some_and(ThresholdGroup::has_wifi_bad_threshold)
    }

    /// All thresholds of all groups, for quality-monitor registration.
    pub fn thresholds(&self) -> impl Iterator<Item = &Threshold> {
        self.groups.iter().flat_map(|g| g.thresholds().iter())
    }
}

/// Policy table for one capability, indexed by precondition with insertion
/// order preserved inside each bucket.
#[derive(Default)]
pub struct PolicyTable {
    by_precondition: HashMap<Precondition, Vec<Arc<AccessNetworkSelectionPolicy>>>,
}

impl PolicyTable {
    pub fn new() -> Self {
        PolicyTable::default()
    }

    pub fn insert(&mut self, policy: AccessNetworkSelectionPolicy) {
        self.by_precondition
            .entry(policy.precondition)
            .or_default()
            .push(Arc::new(policy));
    }

    pub fn policies_for(&self, precondition: &Precondition) -> &[Arc<AccessNetworkSelectionPolicy>] {
        self.by_precondition
            .get(precondition)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_precondition.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_precondition.values().map(Vec::len).sum()
    }
}
