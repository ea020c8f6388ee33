//! Published per-slot state shared across capability instances.
//!
//! Cross-instance coordination happens only by reading a sibling's already
//! published snapshot; instances never share mutable decision state. The one
//! consumer today is the handover lock: a sibling with a non-idle,
//! non-emergency call whose own move is policy-disallowed pins every other
//! capability on its current transport (emergency always overrides).

use std::collections::HashMap;
use std::sync::Mutex;

use qnet_common::{CallType, NetCapability, TransportType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedState {
    pub call_type: CallType,
    pub transport: TransportType,
    /// The instance's own latest `move_transport_allowed()` verdict.
    pub handover_allowed: bool,
}

/// Registry of published snapshots for one subscription slot.
#[derive(Default)]
pub struct SlotStateRegistry {
    states: Mutex<HashMap<NetCapability, PublishedState>>,
}

impl SlotStateRegistry {
    pub fn new() -> Self {
        SlotStateRegistry::default()
    }

    pub fn publish(&self, capability: NetCapability, state: PublishedState) {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).insert(capability, state);
    }

    pub fn remove(&self, capability: NetCapability) {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).remove(&capability);
    }

    pub fn snapshot(&self, capability: NetCapability) -> Option<PublishedState> {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&capability)
            .copied()
    }

    /// Whether some other capability on this slot holds a handover lock
    /// against `me`: a non-idle, non-emergency call whose own move is
    /// disallowed.
    pub fn sibling_handover_lock(&self, me: NetCapability) -> bool {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.iter().any(|(capability, state)| {
            *capability != me
                && state.call_type != CallType::Idle
                && state.call_type != CallType::Emergency
                && !state.handover_allowed
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_requires_non_idle_non_emergency_disallowed_sibling() {
        let registry = SlotStateRegistry::new();
        assert!(!registry.sibling_handover_lock(NetCapability::Eims));

        registry.publish(
            NetCapability::Ims,
            PublishedState {
                call_type: CallType::Voice,
                transport: TransportType::Wlan,
                handover_allowed: false,
            },
        );
        assert!(registry.sibling_handover_lock(NetCapability::Mms));
        // An instance never locks itself.
        assert!(!registry.sibling_handover_lock(NetCapability::Ims));
    }

    #[test]
    fn idle_or_emergency_siblings_do_not_lock() {
        let registry = SlotStateRegistry::new();
        registry.publish(
            NetCapability::Ims,
            PublishedState {
                call_type: CallType::Idle,
                transport: TransportType::Wwan,
                handover_allowed: false,
            },
        );
        registry.publish(
            NetCapability::Eims,
            PublishedState {
                call_type: CallType::Emergency,
                transport: TransportType::Wwan,
                handover_allowed: false,
            },
        );
        assert!(!registry.sibling_handover_lock(NetCapability::Mms));
    }

    #[test]
    fn remove_clears_snapshot() {
        let registry = SlotStateRegistry::new();
        registry.publish(
            NetCapability::Ims,
            PublishedState {
                call_type: CallType::Voice,
                transport: TransportType::Wlan,
                handover_allowed: true,
            },
        );
        assert!(registry.snapshot(NetCapability::Ims).is_some());
        registry.remove(NetCapability::Ims);
        assert!(registry.snapshot(NetCapability::Ims).is_none());
    }
}
