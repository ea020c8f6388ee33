//! Per-(slot, capability) decision orchestrator.
//!
//! The evaluator consumes posted collaborator events, resolves the matching
//! selection policies, filters through the restriction ledger and publishes
//! an ordered qualified-network list whenever the answer actually changes.
//! One instance exists per (slot, capability); instances on the same slot
//! coordinate only through [`SlotStateRegistry`] snapshots.

use std::sync::Arc;

use tracing::{debug, info};

use qnet_common::events::{
    DataConnectionChangedInfo, DataConnectionEvent, ImsRegistrationEvent, ImsRegistrationInfo,
    IwlanStatus, ProvisioningInfo, TelephonyInfo,
};
use qnet_common::{
    AccessNetwork, CallType, Coverage, GuardingPhase, MatchType, Measurement, NetCapability,
    QualifiedNetworksUpdate, RatPreference, ReleaseEvent, RestrictType, RtpReasons,
    SipDialogPolicy, TransportType, WfcMode,
};

use crate::clock::TimeSource;
use crate::config::CarrierConfig;
use crate::monitor::QualityMonitor;
use crate::policy::{builder, AccessNetworkSelectionPolicy, Precondition, PolicyTable, Threshold};
use crate::registry::{CallbackList, RegistrantId};
use crate::restrict::RestrictManager;
use crate::slot::{PublishedState, SlotStateRegistry};
use crate::tracker::DataConnectionTracker;

/// Wi-Fi-calling settings as pushed by the settings layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WfcSettings {
    pub user_enabled: bool,
    pub platform_enabled: bool,
    pub roaming_enabled: bool,
    pub home_mode: WfcMode,
    pub roam_mode: WfcMode,
}

impl Default for WfcSettings {
    fn default() -> Self {
        WfcSettings {
            user_enabled: true,
            platform_enabled: true,
            roaming_enabled: true,
            home_mode: WfcMode::CellularPreferred,
            roam_mode: WfcMode::CellularPreferred,
        }
    }
}

/// Everything that can be posted into an evaluator instance.
#[derive(Debug, Clone)]
pub enum EvaluatorEvent {
    TelephonyInfoChanged(TelephonyInfo),
    IwlanStatusChanged(IwlanStatus),
    CallTypeChanged(CallType),
    EmergencyPreferredTransportChanged(TransportType),
    WfcUserEnabledChanged(bool),
    WfcPlatformEnabledChanged(bool),
    WfcRoamingEnabledChanged(bool),
    WfcModeChanged { coverage: Coverage, mode: WfcMode },
    AirplaneModeChanged(bool),
    ProvisioningChanged(ProvisioningInfo),
    DataConnectionChanged(DataConnectionChangedInfo),
    ImsRegistrationChanged(ImsRegistrationInfo),
    SipDialogSessionChanged(bool),
    /// The quality monitor saw a registered threshold crossing; state lives
    /// in the monitor, the event only wakes the evaluator up.
    SignalThresholdCrossed,
    WlanRttFailed,
    RtpLowQuality(RtpReasons),
    /// Connectivity-layer throttling of new attempts on one transport.
    /// `until_elapsed_ms == u64::MAX` throttles until explicitly lifted.
    ThrottlingChanged {
        enable: bool,
        until_elapsed_ms: u64,
        transport: TransportType,
    },
    CarrierConfigChanged(Arc<CarrierConfig>),
}

pub struct AccessNetworkEvaluator {
    slot: u8,
    capability: NetCapability,
    config: Arc<CarrierConfig>,
    monitor: Box<dyn QualityMonitor>,
    restrict: RestrictManager,
    connection: DataConnectionTracker,
    slot_registry: Arc<SlotStateRegistry>,
    policies: PolicyTable,

    telephony: TelephonyInfo,
    iwlan: IwlanStatus,
    call_type: CallType,
    sip_dialog_active: bool,
    airplane_mode: bool,
    wfc: WfcSettings,
    ims_registered_on_wlan: bool,
    /// Emergency preferred transport, cached while the EIMS connection has
    /// not gone inactive yet.
    emergency_preferred: Option<TransportType>,
    /// `None` until the first report; an empty list is a real "nothing
    /// qualified" state, distinct from "never reported".
    last_notified: Option<Vec<AccessNetwork>>,

    registrants: CallbackList<QualifiedNetworksUpdate>,
    initialized: bool,
    closed: bool,
}

impl AccessNetworkEvaluator {
    pub fn new(
        slot: u8,
        capability: NetCapability,
        config: Arc<CarrierConfig>,
        clock: Arc<dyn TimeSource>,
        monitor: Box<dyn QualityMonitor>,
        slot_registry: Arc<SlotStateRegistry>,
    ) -> Self {
        let restrict = RestrictManager::new(slot, capability, config.clone(), clock);
        let mut evaluator = AccessNetworkEvaluator {
            slot,
            capability,
            config,
            monitor,
            restrict,
            connection: DataConnectionTracker::new(),
            slot_registry,
            policies: PolicyTable::new(),
            telephony: TelephonyInfo::default(),
            iwlan: IwlanStatus::default(),
            call_type: CallType::Idle,
            sip_dialog_active: false,
            airplane_mode: false,
            wfc: WfcSettings::default(),
            ims_registered_on_wlan: false,
            emergency_preferred: None,
            last_notified: None,
            registrants: CallbackList::new(),
            initialized: false,
            closed: false,
        };
        evaluator.policies = builder::build(&evaluator.config, capability);
        evaluator
            .restrict
            .set_preference(evaluator.current_preference());
        evaluator.restrict.restrict_non_preferred_at_powerup();
        evaluator.initialized = true;
        info!(
            slot,
            capability = %capability,
            policies = evaluator.policies.len(),
            "evaluator created"
        );
        evaluator
    }

    // ─── Event intake ───────────────────────────────────────────────

    pub fn handle_event(&mut self, event: EvaluatorEvent) {
        if self.closed {
            return;
        }
        match event {
            EvaluatorEvent::TelephonyInfoChanged(info) => {
                self.telephony = info;
                self.restrict.set_cellular_coverage(self.coverage());
                self.restrict
                    .set_cellular_access_network(info.access_network);
            }
            EvaluatorEvent::IwlanStatusChanged(status) => {
                if status.ap_changed {
                    for transport in TransportType::BOTH {
                        self.restrict
                            .process_release_event(transport, ReleaseEvent::WifiApChanged);
                    }
                }
                self.iwlan = status;
            }
            EvaluatorEvent::CallTypeChanged(call_type) => {
                self.call_type = call_type;
                self.restrict.set_qns_call_type(call_type);
            }
            EvaluatorEvent::EmergencyPreferredTransportChanged(transport) => {
                if self.capability == NetCapability::Eims {
                    self.emergency_preferred = transport.is_valid().then_some(transport);
                }
            }
            EvaluatorEvent::WfcUserEnabledChanged(enabled) => self.wfc.user_enabled = enabled,
            EvaluatorEvent::WfcPlatformEnabledChanged(enabled) => {
                self.wfc.platform_enabled = enabled;
            }
            EvaluatorEvent::WfcRoamingEnabledChanged(enabled) => {
                self.wfc.roaming_enabled = enabled;
            }
            EvaluatorEvent::WfcModeChanged { coverage, mode } => {
                match coverage {
                    Coverage::Roam => self.wfc.roam_mode = mode,
                    _ => self.wfc.home_mode = mode,
                }
                for transport in TransportType::BOTH {
                    self.restrict
                        .process_release_event(transport, ReleaseEvent::WfcModeChanged);
                }
                self.restrict.set_preference(self.current_preference());
            }
            EvaluatorEvent::AirplaneModeChanged(on) => {
                self.airplane_mode = on;
                self.restrict.set_airplane_mode(on);
            }
            EvaluatorEvent::ProvisioningChanged(info) => {
                let mut config = (*self.config).clone();
                let thresholds_changed = config.apply_provisioning(info);
                self.config = Arc::new(config);
                self.restrict.set_config(self.config.clone());
                if thresholds_changed {
                    self.rebuild();
                    return;
                }
            }
            EvaluatorEvent::DataConnectionChanged(info) => {
                self.connection.apply(&info);
                self.restrict.on_data_connection_changed(&info);
                if self.capability == NetCapability::Eims
                    && matches!(
                        info.event,
                        DataConnectionEvent::Disconnected | DataConnectionEvent::Failed
                    )
                {
                    self.emergency_preferred = None;
                }
            }
            EvaluatorEvent::ImsRegistrationChanged(info) => {
                self.ims_registered_on_wlan = info.event == ImsRegistrationEvent::Registered
                    && info.transport == TransportType::Wlan;
                if self.capability.is_ims_class()
                    && info.transport == TransportType::Wlan
                    && info.event == ImsRegistrationEvent::AccessNetworkChangeFailed
                {
                    self.restrict.add_restriction(
                        TransportType::Wlan,
                        RestrictType::FallbackToWwanImsRegiFail,
                        RestrictType::FallbackToWwanImsRegiFail.default_release_events(),
                        0,
                    );
                }
            }
            EvaluatorEvent::SipDialogSessionChanged(active) => self.sip_dialog_active = active,
            EvaluatorEvent::SignalThresholdCrossed => {}
            EvaluatorEvent::WlanRttFailed => self.restrict.on_wlan_rtt_fail(),
            EvaluatorEvent::RtpLowQuality(reasons) => {
                self.restrict.on_low_rtp_quality_event(reasons);
            }
            EvaluatorEvent::ThrottlingChanged {
                enable,
                until_elapsed_ms,
                transport,
            } => {
                self.restrict
                    .notify_throttling(enable, until_elapsed_ms, transport);
            }
            EvaluatorEvent::CarrierConfigChanged(config) => {
                self.config = config.clone();
                self.restrict.set_config(config);
                self.rebuild();
                return;
            }
        }
        self.restrict.take_dirty();
        self.evaluate();
        // Evaluation side effects (guarding a vacated transport, in-call
        // counters) may themselves change the ledger; one follow-up pass.
        if self.restrict.take_dirty() {
            self.evaluate();
        }
    }

    /// Earliest pending restriction expiry, for the runtime's wait.
    pub fn next_timer_deadline(&mut self) -> Option<u64> {
        self.restrict.next_timer_deadline()
    }

    /// Drain due restriction timers and re-evaluate if anything lapsed.
    pub fn process_timers(&mut self) {
        if self.closed {
            return;
        }
        if self.restrict.process_due_timers() {
            self.restrict.take_dirty();
            self.evaluate();
        }
    }

    // ─── Evaluation ─────────────────────────────────────────────────

    /// Recompute the qualified-network list from current state; idempotent.
    pub fn evaluate(&mut self) {
        if self.closed || !self.initialized {
            return;
        }
        if self.capability == NetCapability::Eims {
            if let Some(preferred) = self.emergency_preferred {
                // Don't yank an emergency PDN that is being set up.
                let candidates = self.networks_on(preferred);
                self.report_qualified_network(candidates);
                self.publish_state();
                return;
            }
            if self.connection.is_inactive() && self.effective_call_type() != CallType::Emergency {
                self.publish_state();
                return;
            }
        }

        if self.need_handover_policy_check() && !self.move_transport_allowed() {
            debug!(
                slot = self.slot,
                capability = %self.capability,
                "handover disallowed by policy, keeping current transport"
            );
            self.publish_state();
            return;
        }

        self.restrict
            .set_transport_reachable(self.telephony.cellular_available, self.iwlan.available);

        let wwan_avail = self.telephony.cellular_available
            && self.telephony.access_network.is_cellular()
            && self.is_allowed(TransportType::Wwan)
            && self.rat_preference_allows(TransportType::Wwan);
        let wlan_avail = self.iwlan.available
            && self.is_allowed(TransportType::Wlan)
            && (self.rat_preference_allows(TransportType::Wlan) || self.is_cellular_limited());

        let wwan_clear = !self.restrict.is_restricted(TransportType::Wwan);
        let wlan_clear = !self.restrict.is_restricted(TransportType::Wlan);
        let wwan_usable = wwan_avail
            && (wwan_clear
                || (self
                    .restrict
                    .is_allowed_on_single_transport(TransportType::Wwan)
                    && !(wlan_avail && wlan_clear)));
        let wlan_usable = wlan_avail
            && (wlan_clear
                || (self
                    .restrict
                    .is_allowed_on_single_transport(TransportType::Wlan)
                    && !(wwan_avail && wwan_clear)));

        let both = wwan_usable && wlan_usable;
        let mut allow_empty = false;
        let mut candidates = if both {
            self.match_policies()
        } else if wlan_usable {
            let qualified = self.standalone_wifi_qualifies();
            self.monitor_standalone_wifi(qualified);
            if qualified {
                vec![AccessNetwork::Iwlan]
            } else {
                allow_empty = true;
                Vec::new()
            }
        } else if wwan_usable {
            self.monitor.clear_monitoring(self.capability);
            vec![self.telephony.access_network]
        } else if self.last_qualified_transport() == TransportType::Wlan && !self.iwlan.available {
            // Wi-Fi was carrying us and just went away entirely.
            allow_empty = true;
            Vec::new()
        } else {
            // Nothing usable but nothing got cut either; hold the last
            // report rather than flapping to empty.
            self.publish_state();
            return;
        };

        if both && self.last_notified.is_none() {
            let preferred = self.current_preference().preferred_transport();
            if candidates.is_empty() {
                candidates = self.networks_on(preferred);
            } else if candidates.len() > 1
                && let Some(pos) = candidates.iter().position(|n| n.transport() == preferred)
                && pos > 0
            {
                let network = candidates.remove(pos);
                candidates.insert(0, network);
            }
        }

        let call_type = self.effective_call_type();
        let coverage = self.coverage();
        candidates.retain(|n| {
            !(self.vops_check_required(*n, coverage, call_type) && !self.telephony.vops_supported)
        });

        if self.connection.is_active() {
            if !(self.is_handover_needed(&candidates) || self.is_fallback_case(&candidates)) {
                self.publish_state();
                return;
            }
        } else if candidates.is_empty() && !allow_empty {
            self.publish_state();
            return;
        }

        self.report_qualified_network(candidates);
        self.publish_state();
    }

    /// Policy matching while both transports are usable. Registers the
    /// thresholds of unsatisfied policies for monitoring so a crossing wakes
    /// us up.
    fn match_policies(&mut self) -> Vec<AccessNetwork> {
        let precondition = self.current_precondition();
        let policies = self.lookup_policies(&precondition);
        let serving = self.telephony.access_network;
        let in_call = matches!(
            self.effective_call_type(),
            CallType::Voice | CallType::Emergency
        );
        let wifi_fallback_engaged = self
            .config
            .iwlan_in_call_fallback_reason
            .is_some_and(|r| r.covers_wifi());

        let mut candidates: Vec<AccessNetwork> = Vec::new();
        let mut pending: Vec<Threshold> = Vec::new();
        for policy in &policies {
            if policy.satisfied_by(self.monitor.as_ref()) {
                let network = match policy.target_transport {
                    TransportType::Wlan => Some(AccessNetwork::Iwlan),
                    TransportType::Wwan if serving.is_cellular() => Some(serving),
                    _ => None,
                };
                if let Some(network) = network
                    && !candidates.contains(&network)
                {
                    candidates.push(network);
                }
                if in_call
                    && wifi_fallback_engaged
                    && policy.target_transport == TransportType::Wwan
                    && self.last_qualified_transport() == TransportType::Wlan
                    && policy.satisfied_with_wifi_low_signal(self.monitor.as_ref())
                {
                    self.restrict.increment_iwlan_in_call_counter();
                }
            } else {
                pending.extend(policy.thresholds().cloned());
            }
        }
        self.monitor
            .update_monitoring_thresholds(self.capability, &pending);
        candidates
    }

    fn current_precondition(&self) -> Precondition {
        let call_type = match self.effective_call_type() {
            // The policy table keys emergency lookups by voice conditions.
            CallType::Emergency => CallType::Voice,
            other => other,
        };
        let preference = match self.current_preference() {
            WfcMode::WifiOnly => WfcMode::WifiPreferred,
            other => other,
        };
        let mut precondition = Precondition::new(call_type, preference, self.coverage());
        if self.config.has_guard_timer_threshold_gap() {
            if self
                .restrict
                .has_restriction_type(TransportType::Wlan, RestrictType::Guarding)
            {
                precondition = precondition.with_guarding(GuardingPhase::Wifi);
            } else if self
                .restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Guarding)
            {
                precondition = precondition.with_guarding(GuardingPhase::Cellular);
            }
        }
        precondition
    }

    /// Guarded lookups fall back to the unguarded bucket for the directions
    /// the guarded bucket does not cover.
    fn lookup_policies(
        &self,
        precondition: &Precondition,
    ) -> Vec<Arc<AccessNetworkSelectionPolicy>> {
        let mut result = self.policies.policies_for(precondition).to_vec();
        if precondition.guarding != GuardingPhase::None {
            let base = precondition.with_guarding(GuardingPhase::None);
            for policy in self.policies.policies_for(&base) {
                if !result
                    .iter()
                    .any(|p| p.target_transport == policy.target_transport)
                {
                    result.push(policy.clone());
                }
            }
        }
        result
    }

    /// Wi-Fi qualification while it is the only usable transport. Without
    /// standalone thresholds reachability alone qualifies it.
    fn standalone_wifi_qualifies(&self) -> bool {
        let Some(entry) = self
            .config
            .wifi_threshold_without_cellular(self.effective_call_type())
        else {
            return true;
        };
        let sample = self
            .monitor
            .current_quality(AccessNetwork::Iwlan, Measurement::Rssi);
        let currently_on_wifi = self.last_qualified_transport() == TransportType::Wlan
            && self.last_notified.as_ref().is_some_and(|l| !l.is_empty());
        if currently_on_wifi {
            entry.bad.is_none_or(|bad| sample.is_some_and(|s| s > bad))
        } else {
            entry
                .good
                .is_none_or(|good| sample.is_some_and(|s| s >= good))
        }
    }

    /// Monitor registration for Wi-Fi-only operation: watch the rove-out
    /// bound while Wi-Fi qualifies, the rove-in bound while it does not.
    fn monitor_standalone_wifi(&mut self, qualified: bool) {
        let Some(entry) = self
            .config
            .wifi_threshold_without_cellular(self.effective_call_type())
        else {
            self.monitor.clear_monitoring(self.capability);
            return;
        };
        let (value, match_type) = if qualified {
            (entry.bad, MatchType::EqualOrSmaller)
        } else {
            (entry.good, MatchType::EqualOrLarger)
        };
        let thresholds: Vec<Threshold> = value
            .map(|value| Threshold {
                access_network: AccessNetwork::Iwlan,
                measurement: Measurement::Rssi,
                value,
                match_type,
                wait_time_ms: self.config.backhaul_timer_ms(AccessNetwork::Iwlan),
            })
            .into_iter()
            .collect();
        self.monitor
            .update_monitoring_thresholds(self.capability, &thresholds);
    }

    // ─── Gates ──────────────────────────────────────────────────────

    fn is_allowed(&self, transport: TransportType) -> bool {
        match transport {
            TransportType::Wwan => {
                !self.airplane_mode && self.current_preference() != WfcMode::WifiOnly
            }
            TransportType::Wlan => {
                if self.airplane_mode && !self.config.allow_wfc_on_airplane_mode {
                    return false;
                }
                if self.config.block_iwlan_in_international_roam_without_wwan
                    && self.coverage() == Coverage::Roam
                    && self.is_cellular_limited()
                {
                    return false;
                }
                if self.is_wfc_enabled() {
                    return true;
                }
                // WFC is off; cellular-limited carve-outs may still admit
                // Wi-Fi for IMS.
                if self.capability == NetCapability::Ims && self.is_cellular_limited() {
                    let call_type = self.effective_call_type();
                    if self.config.allow_ims_over_iwlan_cellular_limited
                        && call_type == CallType::Idle
                    {
                        return true;
                    }
                    if self.config.allow_video_over_iwlan_cellular_limited
                        && call_type == CallType::Video
                    {
                        return true;
                    }
                }
                false
            }
            TransportType::Invalid => false,
        }
    }

    fn rat_preference_allows(&self, transport: TransportType) -> bool {
        match self.config.rat_preference(self.capability) {
            RatPreference::Default => true,
            RatPreference::WifiOnly => transport == TransportType::Wlan,
            RatPreference::WifiWhenWfcAvailable => match transport {
                TransportType::Wlan => self.ims_registered_on_wlan,
                _ => true,
            },
            RatPreference::WifiWhenNoCellular => match transport {
                TransportType::Wlan => !self.telephony.cellular_available,
                _ => true,
            },
            RatPreference::WifiWhenHomeIsNotAvailable => match transport {
                TransportType::Wlan => {
                    !self.telephony.cellular_available || self.coverage() == Coverage::Roam
                }
                _ => true,
            },
        }
    }

    fn is_wfc_enabled(&self) -> bool {
        if !self.wfc.platform_enabled {
            return false;
        }
        match self.coverage() {
            Coverage::Roam => self.wfc.roaming_enabled,
            _ => self.wfc.user_enabled,
        }
    }

    /// Cellular is around but its serving RAN cannot carry this capability.
    fn is_cellular_limited(&self) -> bool {
        self.telephony.cellular_available
            && self.telephony.access_network.is_cellular()
            && !self
                .config
                .is_access_network_allowed(self.telephony.access_network, self.capability)
    }

    fn vops_check_required(
        &self,
        access_network: AccessNetwork,
        coverage: Coverage,
        call_type: CallType,
    ) -> bool {
        if !matches!(access_network, AccessNetwork::Eutran | AccessNetwork::Ngran) {
            return false;
        }
        if !self.config.is_mmtel_required(coverage) {
            return false;
        }
        // Mid-call WLAN→WWAN may proceed without VOPS when the carrier says
        // so; the override never applies to idle.
        if call_type != CallType::Idle
            && self.config.in_call_wlan_to_wwan_without_vops
            && self.last_qualified_transport() == TransportType::Wlan
        {
            return false;
        }
        true
    }

    // ─── Reporting ──────────────────────────────────────────────────

    fn report_qualified_network(&mut self, mut candidates: Vec<AccessNetwork>) {
        candidates.retain(|n| *n != AccessNetwork::Unknown);
        if self.is_cellular_limited() {
            let filtered: Vec<AccessNetwork> = candidates
                .iter()
                .copied()
                .filter(|n| {
                    *n == AccessNetwork::Iwlan
                        || self.config.is_access_network_allowed(*n, self.capability)
                })
                .collect();
            if filtered.is_empty() && !candidates.is_empty() {
                debug!(
                    slot = self.slot,
                    capability = %self.capability,
                    "cellular-limited filter emptied the candidates, keeping previous report"
                );
                return;
            }
            candidates = filtered;
        }
        if self.last_notified.as_deref() == Some(candidates.as_slice()) {
            return;
        }
        info!(
            slot = self.slot,
            capability = %self.capability,
            networks = ?candidates,
            "qualified networks changed"
        );
        self.last_notified = Some(candidates.clone());
        if let Some(transport) = candidates.first().map(|n| n.transport())
            && transport.is_valid()
        {
            self.restrict.update_last_notified_transport(transport);
        }
        let update = QualifiedNetworksUpdate {
            slot: self.slot,
            capability: self.capability,
            access_networks: candidates,
        };
        self.registrants.notify(&update);
    }

    fn publish_state(&self) {
        self.slot_registry.publish(
            self.capability,
            PublishedState {
                call_type: self.effective_call_type(),
                transport: self.last_qualified_transport(),
                handover_allowed: self.move_transport_allowed(),
            },
        );
    }

    // ─── Queries ────────────────────────────────────────────────────

    /// Transport of the last report; WWAN when nothing was reported yet or
    /// the report is empty/cellular.
    pub fn last_qualified_transport(&self) -> TransportType {
        match self.last_notified.as_deref() {
            Some([first, ..]) if *first == AccessNetwork::Iwlan => TransportType::Wlan,
            _ => TransportType::Wwan,
        }
    }

    /// Transport a candidate list would move traffic to. Empty ⇒ `Invalid`.
    pub fn target_transport(candidates: &[AccessNetwork]) -> TransportType {
        if candidates.contains(&AccessNetwork::Iwlan) {
            TransportType::Wlan
        } else if candidates.iter().any(|n| n.is_cellular()) {
            TransportType::Wwan
        } else {
            TransportType::Invalid
        }
    }

    /// Whether the handover-policy matrix (and sibling instances on this
    /// slot) permit moving off the current transport.
    pub fn move_transport_allowed(&self) -> bool {
        let call_type = self.effective_call_type();
        if call_type == CallType::Emergency || self.capability == NetCapability::Eims {
            return true;
        }
        let src = if self.connection.last_transport().is_valid() {
            self.connection.last_transport()
        } else {
            self.last_qualified_transport()
        };
        let dst = src.other();
        if self.capability == NetCapability::Ims && call_type == CallType::Idle {
            return true;
        }
        if !self.capability.is_ims_class() && dst == TransportType::Wlan {
            // Non-IMS traffic re-attaches over its own APN rather than
            // handing the bearer over.
            return true;
        }
        if self.config.rat_preference(self.capability) == RatPreference::WifiWhenNoCellular
            && dst == TransportType::Wwan
            && self.telephony.cellular_available
        {
            return true;
        }
        if self.slot_registry.sibling_handover_lock(self.capability) {
            return false;
        }
        let ran_of = |t: TransportType| match t {
            TransportType::Wlan => AccessNetwork::Iwlan,
            _ => self.telephony.access_network,
        };
        self.config.is_handover_allowed_by_policy(
            self.capability,
            ran_of(src),
            ran_of(dst),
            self.coverage(),
        )
    }

    /// An active connection sits on the transport we last qualified and the
    /// counterpart network is around, so any move is a policy-checked
    /// handover.
    pub fn need_handover_policy_check(&self) -> bool {
        if !self.connection.is_active() {
            return false;
        }
        let active = self.connection.last_transport();
        if !active.is_valid() || active != self.last_qualified_transport() {
            return false;
        }
        match active.other() {
            TransportType::Wwan => self.telephony.cellular_available,
            TransportType::Wlan => self.iwlan.available,
            TransportType::Invalid => false,
        }
    }

    pub fn is_handover_needed(&self, candidates: &[AccessNetwork]) -> bool {
        if !self.connection.is_active() || self.connection.is_handover_in_progress() {
            return false;
        }
        let target = Self::target_transport(candidates);
        target.is_valid() && target != self.connection.last_transport()
    }

    /// The preferred network dropped while inactive: the target differs from
    /// both the last active transport and the last reported one.
    pub fn is_fallback_case(&self, candidates: &[AccessNetwork]) -> bool {
        if !self.connection.is_inactive() {
            return false;
        }
        let target = Self::target_transport(candidates);
        if !target.is_valid() || !self.connection.last_transport().is_valid() {
            return false;
        }
        target != self.connection.last_transport() && target != self.last_qualified_transport()
    }

    /// Swap the policy table for the current configuration and re-evaluate;
    /// fires at most one notification.
    pub fn rebuild(&mut self) {
        if self.closed {
            return;
        }
        self.policies = builder::build(&self.config, self.capability);
        debug!(
            slot = self.slot,
            capability = %self.capability,
            policies = self.policies.len(),
            "policy table rebuilt"
        );
        self.evaluate();
    }

    /// Idempotent teardown: releases restrictions, timers, monitoring and
    /// registrations.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.restrict.clear();
        self.monitor.clear_monitoring(self.capability);
        self.slot_registry.remove(self.capability);
        self.registrants.clear();
        info!(slot = self.slot, capability = %self.capability, "evaluator closed");
    }

    pub fn register_qualified_networks_changed(
        &mut self,
        callback: impl Fn(&QualifiedNetworksUpdate) + Send + 'static,
    ) -> RegistrantId {
        self.registrants.register(callback)
    }

    pub fn unregister_qualified_networks_changed(&mut self, id: RegistrantId) {
        self.registrants.unregister(id);
    }

    // ─── Derived state ──────────────────────────────────────────────

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn capability(&self) -> NetCapability {
        self.capability
    }

    fn coverage(&self) -> Coverage {
        match self.telephony.coverage {
            Coverage::Roam => Coverage::Roam,
            _ => Coverage::Home,
        }
    }

    fn current_preference(&self) -> WfcMode {
        match self.coverage() {
            Coverage::Roam => self.wfc.roam_mode,
            _ => self.wfc.home_mode,
        }
    }

    /// Call type used for policy lookups; an active SIP dialog may override
    /// an idle call tracker.
    fn effective_call_type(&self) -> CallType {
        if self.call_type == CallType::Idle && self.sip_dialog_active {
            match self.config.sip_dialog_session_policy {
                SipDialogPolicy::FollowVoiceCall => return CallType::Voice,
                SipDialogPolicy::FollowVideoCall => return CallType::Video,
                SipDialogPolicy::None => {}
            }
        }
        self.call_type
    }

    fn networks_on(&self, transport: TransportType) -> Vec<AccessNetwork> {
        match transport {
            TransportType::Wlan => vec![AccessNetwork::Iwlan],
            TransportType::Wwan if self.telephony.access_network.is_cellular() => {
                vec![self.telephony.access_network]
            }
            _ => Vec::new(),
        }
    }

    #[cfg(test)]
    fn last_notified(&self) -> Option<&[AccessNetwork]> {
        self.last_notified.as_deref()
    }
}
