//! Call-status contract and data-connection bookkeeping.
//!
//! The data-connection tracker is a small state machine fed by posted
//! lifecycle events; the evaluator and the restriction ledger only ever ask
//! it "active?", "mid-handover?", "which transport last carried us?".

use qnet_common::events::{DataConnectionChangedInfo, DataConnectionEvent};
use qnet_common::{NetCapability, TransportType};

/// Call idleness per capability, provided by the telephony side.
pub trait CallStatusTracker: Send {
    fn is_call_idle(&self, capability: NetCapability) -> bool;
}

/// Trivial tracker for deployments (and tests) that push call type through
/// evaluator events instead; answers from a settable flag.
#[derive(Default)]
pub struct StaticCallStatus {
    idle: bool,
}

impl StaticCallStatus {
    pub fn new(idle: bool) -> Self {
        StaticCallStatus { idle }
    }

    pub fn set_idle(&mut self, idle: bool) {
        self.idle = idle;
    }
}

impl CallStatusTracker for StaticCallStatus {
    fn is_call_idle(&self, _capability: NetCapability) -> bool {
        self.idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataConnectionState {
    Inactive,
    Connecting,
    Connected,
    HandoverInProgress,
}

/// Per-instance data connection status, derived from lifecycle events.
pub struct DataConnectionTracker {
    state: DataConnectionState,
    last_transport: TransportType,
    last_apn: Option<String>,
}

impl DataConnectionTracker {
    pub fn new() -> Self {
        DataConnectionTracker {
            state: DataConnectionState::Inactive,
            last_transport: TransportType::Invalid,
            last_apn: None,
        }
    }

    pub fn apply(&mut self, info: &DataConnectionChangedInfo) {
        match info.event {
            DataConnectionEvent::Started => {
                self.state = DataConnectionState::Connecting;
                self.last_transport = info.transport;
            }
            DataConnectionEvent::Connected => {
                self.state = DataConnectionState::Connected;
                self.last_transport = info.transport;
            }
            DataConnectionEvent::HandoverStarted => {
                self.state = DataConnectionState::HandoverInProgress;
            }
            DataConnectionEvent::HandoverSuccess => {
                self.state = DataConnectionState::Connected;
                self.last_transport = info.transport;
            }
            DataConnectionEvent::HandoverFailed => {
                self.state = DataConnectionState::Connected;
            }
            DataConnectionEvent::Disconnected | DataConnectionEvent::Failed => {
                self.state = DataConnectionState::Inactive;
            }
        }
        if let Some(apn) = &info.apn {
            self.last_apn = Some(apn.clone());
        }
    }

    pub fn state(&self) -> DataConnectionState {
        self.state
    }

    /// Connected or mid-handover; a connection exists that a decision could
    /// yank.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            DataConnectionState::Connected | DataConnectionState::HandoverInProgress
        )
    }

    pub fn is_inactive(&self) -> bool {
        self.state == DataConnectionState::Inactive
    }

    pub fn is_handover_in_progress(&self) -> bool {
        self.state == DataConnectionState::HandoverInProgress
    }

    /// Transport of the most recent setup/handover target; `Invalid` before
    /// the first attempt.
    pub fn last_transport(&self) -> TransportType {
        self.last_transport
    }

    pub fn last_apn(&self) -> Option<&str> {
        self.last_apn.as_deref()
    }
}

impl Default for DataConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(event: DataConnectionEvent, transport: TransportType) -> DataConnectionChangedInfo {
        DataConnectionChangedInfo {
            event,
            transport,
            apn: None,
        }
    }

    #[test]
    fn lifecycle_inactive_to_connected() {
        let mut tracker = DataConnectionTracker::new();
        assert!(tracker.is_inactive());
        tracker.apply(&ev(DataConnectionEvent::Started, TransportType::Wwan));
        assert_eq!(tracker.state(), DataConnectionState::Connecting);
        assert!(!tracker.is_active(), "connecting is not yet active");
        tracker.apply(&ev(DataConnectionEvent::Connected, TransportType::Wwan));
        assert!(tracker.is_active());
        assert_eq!(tracker.last_transport(), TransportType::Wwan);
    }

    #[test]
    fn handover_updates_transport_only_on_success() {
        let mut tracker = DataConnectionTracker::new();
        tracker.apply(&ev(DataConnectionEvent::Connected, TransportType::Wwan));
        tracker.apply(&ev(DataConnectionEvent::HandoverStarted, TransportType::Wlan));
        assert!(tracker.is_handover_in_progress());
        assert_eq!(tracker.last_transport(), TransportType::Wwan);

        tracker.apply(&ev(DataConnectionEvent::HandoverFailed, TransportType::Wlan));
        assert_eq!(tracker.state(), DataConnectionState::Connected);
        assert_eq!(tracker.last_transport(), TransportType::Wwan);

        tracker.apply(&ev(DataConnectionEvent::HandoverStarted, TransportType::Wlan));
        tracker.apply(&ev(DataConnectionEvent::HandoverSuccess, TransportType::Wlan));
        assert_eq!(tracker.last_transport(), TransportType::Wlan);
    }

    #[test]
    fn disconnect_and_failure_deactivate() {
        let mut tracker = DataConnectionTracker::new();
        tracker.apply(&ev(DataConnectionEvent::Connected, TransportType::Wlan));
        tracker.apply(&ev(DataConnectionEvent::Disconnected, TransportType::Wlan));
        assert!(tracker.is_inactive());
        // last transport survives disconnect for fallback decisions
        assert_eq!(tracker.last_transport(), TransportType::Wlan);

        tracker.apply(&ev(DataConnectionEvent::Started, TransportType::Wlan));
        tracker.apply(&ev(DataConnectionEvent::Failed, TransportType::Wlan));
        assert!(tracker.is_inactive());
    }

    #[test]
    fn apn_is_remembered() {
        let mut tracker = DataConnectionTracker::new();
        tracker.apply(&DataConnectionChangedInfo {
            event: DataConnectionEvent::Connected,
            transport: TransportType::Wwan,
            apn: Some("ims".into()),
        });
        tracker.apply(&ev(DataConnectionEvent::Disconnected, TransportType::Wwan));
        assert_eq!(tracker.last_apn(), Some("ims"));
    }
}
