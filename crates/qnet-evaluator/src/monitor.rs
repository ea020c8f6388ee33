//! Quality-monitor contract.
//!
//! The decision core does not sample radios itself; it reads live quality
//! through this trait and tells the monitor which threshold crossings are
//! worth waking it up for (the unsatisfied directions of the current policy
//! set).

use qnet_common::{AccessNetwork, Measurement, NetCapability};

use crate::policy::Threshold;

/// Live signal quality per (access network, measurement) plus
/// threshold-crossing registration.
pub trait QualityMonitor: Send {
    /// Current sample, or `None` when the measurement is unavailable.
    /// A missing sample never matches any threshold.
    fn current_quality(&self, access_network: AccessNetwork, measurement: Measurement)
    -> Option<i32>;

    /// Replace the set of thresholds whose crossings should be reported for
    /// this capability.
    fn update_monitoring_thresholds(&mut self, capability: NetCapability, thresholds: &[Threshold]);

    /// Stop threshold monitoring for this capability.
    fn clear_monitoring(&mut self, capability: NetCapability);
}

/// Table-backed monitor: an external sampler writes readings in, the
/// evaluator reads them out. Also the workhorse of the test suites.
#[derive(Default)]
pub struct TableQualityMonitor {
    readings: std::collections::HashMap<(AccessNetwork, Measurement), i32>,
    monitored: std::collections::HashMap<NetCapability, Vec<Threshold>>,
}

impl TableQualityMonitor {
    pub fn new() -> Self {
        TableQualityMonitor::default()
    }

    pub fn set_quality(&mut self, access_network: AccessNetwork, measurement: Measurement, value: i32) {
        self.readings.insert((access_network, measurement), value);
    }

    pub fn clear_quality(&mut self, access_network: AccessNetwork, measurement: Measurement) {
        self.readings.remove(&(access_network, measurement));
    }

    /// Thresholds currently registered for a capability (diagnostics/tests).
    pub fn monitored_thresholds(&self, capability: NetCapability) -> &[Threshold] {
        self.monitored
            .get(&capability)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl QualityMonitor for TableQualityMonitor {
    fn current_quality(
        &self,
        access_network: AccessNetwork,
        measurement: Measurement,
    ) -> Option<i32> {
        self.readings.get(&(access_network, measurement)).copied()
    }

    fn update_monitoring_thresholds(&mut self, capability: NetCapability, thresholds: &[Threshold]) {
        self.monitored.insert(capability, thresholds.to_vec());
    }

    fn clear_monitoring(&mut self, capability: NetCapability) {
        self.monitored.remove(&capability);
    }
}
