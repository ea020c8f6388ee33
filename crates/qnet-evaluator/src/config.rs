//! Carrier configuration.
//!
//! A plain struct of pure getters. Deployments may override any subset from
//! TOML ([`CarrierConfig::from_toml_str`]); absent keys fall back to built-in
//! defaults so evaluation never fails for lack of configuration. Carrier
//! provisioning updates patch the effective thresholds on top
//! ([`CarrierConfig::apply_provisioning`]).

use std::collections::HashMap;

use serde::Deserialize;

use qnet_common::events::ProvisioningInfo;
use qnet_common::{
    AccessNetwork, CallType, Coverage, FallbackReason, GuardingPhase, Measurement, NetCapability,
    QnsError, RatPreference, RoveDirection, SipDialogPolicy, TransportType, WfcMode,
};

/// Hysteresis span used when no per-call-type timer is configured.
pub const DEFAULT_HYSTERESIS_TIMER_MS: u64 = 30_000;
/// Guard applied to the source transport when a handover starts.
pub const HANDOVER_INIT_GUARD_TIMER_MS: u64 = 30_000;
/// Default floor under every guarding timer.
pub const DEFAULT_MIN_GUARDING_TIMER_MS: u64 = 3_000;
/// Upper bound the minimum-guarding floor is clamped to.
pub const MIN_GUARDING_TIMER_LIMIT_MS: u64 = 5_000;
/// Default Wi-Fi RSSI backhaul (threshold dwell) timer.
pub const DEFAULT_WIFI_BACKHAUL_TIMER_MS: u32 = 3_000;
/// Default avoid-time after a low-RTP-quality breach, either transport.
pub const DEFAULT_RTP_RESTRICT_TIME_MS: u64 = 60_000;

// Built-in good/bad signal thresholds per RAN primary measurement.
const DEFAULT_SSRSRP_GOOD: i32 = -110;
const DEFAULT_SSRSRP_BAD: i32 = -115;
const DEFAULT_RSRP_GOOD: i32 = -115;
const DEFAULT_RSRP_BAD: i32 = -120;
const DEFAULT_RSCP_GOOD: i32 = -105;
const DEFAULT_RSCP_BAD: i32 = -115;
const DEFAULT_GERAN_RSSI_GOOD: i32 = -100;
const DEFAULT_GERAN_RSSI_BAD: i32 = -105;
const DEFAULT_WIFI_RSSI_GOOD: i32 = -75;
const DEFAULT_WIFI_RSSI_BAD: i32 = -80;

/// Good/bad/worst triple for one (RAN, measurement, call type) slot.
/// `None` means "not configured"; a policy condition over it degrades to an
/// availability gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ThresholdSet {
    pub good: Option<i32>,
    pub bad: Option<i32>,
    pub worst: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdEntry {
    pub access_network: AccessNetwork,
    pub measurement: Measurement,
    /// `None` applies to every call type.
    #[serde(default)]
    pub call_type: Option<CallType>,
    /// `None` applies to every Wi-Fi-calling preference.
    #[serde(default)]
    pub preference: Option<WfcMode>,
    #[serde(flatten)]
    pub set: ThresholdSet,
}

/// Standalone Wi-Fi thresholds used when no cellular network is around.
#[derive(Debug, Clone, Deserialize)]
pub struct WifiOnlyThresholdEntry {
    #[serde(default)]
    pub call_type: Option<CallType>,
    pub good: Option<i32>,
    pub bad: Option<i32>,
}

/// One row of the handover-policy matrix. Empty `src`/`dst` match any RAN.
/// First matching rule wins; no match means allowed.
#[derive(Debug, Clone, Deserialize)]
pub struct HandoverRule {
    #[serde(default)]
    pub src: Vec<AccessNetwork>,
    #[serde(default)]
    pub dst: Vec<AccessNetwork>,
    #[serde(default = "coverage_both")]
    pub coverage: Coverage,
    pub allow: bool,
}

fn coverage_both() -> Coverage {
    Coverage::Both
}

/// Fallback-on-initial-connection-failure policy for one capability.
#[derive(Debug, Clone, Deserialize)]
pub struct FallbackOnFailPolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Failures on one transport before the restriction arms. 0 disables the
    /// count trigger.
    #[serde(default)]
    pub max_retry_count: u32,
    /// Time window since the first failure that also arms the restriction.
    /// 0 disables the timer trigger.
    #[serde(default)]
    pub retry_timer_ms: u64,
    /// How long the armed restriction lasts.
    #[serde(default)]
    pub guard_timer_ms: u64,
    /// How many times the restriction may re-arm before a successful
    /// connect is required. 0 = unlimited.
    #[serde(default)]
    pub max_fallback_count: u32,
}

/// Per-call-type guarding spans for one transport direction.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CallTypeTimers {
    pub idle: u64,
    pub voice: u64,
    pub video: u64,
}

impl Default for CallTypeTimers {
    fn default() -> Self {
        CallTypeTimers {
            idle: DEFAULT_HYSTERESIS_TIMER_MS,
            voice: DEFAULT_HYSTERESIS_TIMER_MS,
            video: DEFAULT_HYSTERESIS_TIMER_MS,
        }
    }
}

impl CallTypeTimers {
    pub fn for_call_type(&self, call_type: CallType) -> u64 {
        match call_type {
            CallType::Idle => self.idle,
            CallType::Voice | CallType::Emergency => self.voice,
            CallType::Video => self.video,
        }
    }
}

/// Widened threshold while a transport is guarded, per (RAN, measurement).
#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdGapEntry {
    pub access_network: AccessNetwork,
    pub measurement: Measurement,
    pub gap: i32,
}

/// Carrier override of the built-in policy-condition table for a specific
/// precondition shape. Conditions use the `"Condition:WIFI_GOOD,..."` DSL.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyOverride {
    pub direction: RoveDirection,
    pub preference: WfcMode,
    #[serde(default)]
    pub call_type: Option<CallType>,
    #[serde(default)]
    pub coverage: Option<Coverage>,
    #[serde(default)]
    pub guarding: Option<GuardingPhase>,
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CarrierConfig {
    pub rat_preference: HashMap<NetCapability, RatPreference>,
    pub handover_rules: HashMap<NetCapability, Vec<HandoverRule>>,

    /// Guarding spans for a vacated WWAN (after a move to Wi-Fi).
    pub wwan_hysteresis_ms: CallTypeTimers,
    /// Guarding spans for a vacated WLAN.
    pub wlan_hysteresis_ms: CallTypeTimers,
    /// Floor under every guarding timer; clamped to
    /// [`MIN_GUARDING_TIMER_LIMIT_MS`].
    pub min_guarding_timer_ms: u64,
    /// Coverage in which hysteresis guarding applies at all.
    pub hysteresis_timer_coverage: Coverage,
    /// When set, guard only the transport the current Wi-Fi-calling
    /// preference disprefers.
    pub guard_timer_follows_preference: bool,

    pub fallback_on_connection_fail: HashMap<NetCapability, FallbackOnFailPolicy>,

    pub wwan_rtp_restrict_time_ms: u64,
    pub wlan_rtp_restrict_time_ms: u64,
    /// Which breach classes count toward the in-call IWLAN handover limit.
    pub iwlan_in_call_fallback_reason: Option<FallbackReason>,
    /// In-call handovers to Wi-Fi tolerated before IWLAN is restricted for
    /// the rest of the call. 0 disables the policy.
    pub max_iwlan_handover_count_in_call: u32,
    /// Duration of the WLAN restriction after an RTT backhaul check fails.
    /// 0 disables.
    pub wlan_rtt_fallback_timer_ms: u64,

    pub thresholds: Vec<ThresholdEntry>,
    pub wifi_thresholds_without_cellular: Vec<WifiOnlyThresholdEntry>,
    pub wifi_backhaul_timer_ms: u32,
    pub cellular_backhaul_timer_ms: u32,
    pub guard_timer_threshold_gaps: Vec<ThresholdGapEntry>,
    pub policy_overrides: Vec<PolicyOverride>,

    /// Whether voice on EUTRAN/NGRAN requires VOPS, per coverage.
    pub mmtel_required_home: bool,
    pub mmtel_required_roam: bool,
    /// Suppress the VOPS condition for mid-call WLAN→WWAN decisions.
    pub in_call_wlan_to_wwan_without_vops: bool,

    pub allow_wfc_on_airplane_mode: bool,
    pub block_iwlan_in_international_roam_without_wwan: bool,
    pub allow_ims_over_iwlan_cellular_limited: bool,
    pub allow_video_over_iwlan_cellular_limited: bool,
    pub sip_dialog_session_policy: SipDialogPolicy,
    /// Preferences for which "both sides bad" keeps the preferred transport.
    pub prefer_current_in_both_bad: Vec<WfcMode>,
    /// Rove-out during a voice call considers only Wi-Fi degradation.
    pub voice_rove_out_on_current_transport: bool,
    /// In roaming, qualify on availability alone (no signal thresholds).
    pub availability_only_in_roam: bool,
    /// Cellular RANs on which IMS may be carried.
    pub ims_allowed_cellular_rats: Vec<AccessNetwork>,

    /// Transport preferred at bring-up per capability; the other side is
    /// blocked for `powerup_waiting_timer_ms`.
    pub powerup_preferred_transport: HashMap<NetCapability, TransportType>,
    pub powerup_waiting_timer_ms: u64,

    #[serde(skip)]
    provisioning: ProvisioningInfo,
}

impl Default for CarrierConfig {
    fn default() -> Self {
        CarrierConfig {
            rat_preference: HashMap::new(),
            handover_rules: HashMap::new(),
            wwan_hysteresis_ms: CallTypeTimers::default(),
            wlan_hysteresis_ms: CallTypeTimers::default(),
            min_guarding_timer_ms: DEFAULT_MIN_GUARDING_TIMER_MS,
            hysteresis_timer_coverage: Coverage::Both,
            guard_timer_follows_preference: false,
            fallback_on_connection_fail: HashMap::new(),
            wwan_rtp_restrict_time_ms: DEFAULT_RTP_RESTRICT_TIME_MS,
            wlan_rtp_restrict_time_ms: DEFAULT_RTP_RESTRICT_TIME_MS,
            iwlan_in_call_fallback_reason: None,
            max_iwlan_handover_count_in_call: 0,
            wlan_rtt_fallback_timer_ms: 0,
            thresholds: Vec::new(),
            wifi_thresholds_without_cellular: Vec::new(),
            wifi_backhaul_timer_ms: DEFAULT_WIFI_BACKHAUL_TIMER_MS,
            cellular_backhaul_timer_ms: 0,
            guard_timer_threshold_gaps: Vec::new(),
            policy_overrides: Vec::new(),
            mmtel_required_home: false,
            mmtel_required_roam: false,
            in_call_wlan_to_wwan_without_vops: false,
            allow_wfc_on_airplane_mode: false,
            block_iwlan_in_international_roam_without_wwan: false,
            allow_ims_over_iwlan_cellular_limited: false,
            allow_video_over_iwlan_cellular_limited: false,
            sip_dialog_session_policy: SipDialogPolicy::None,
            prefer_current_in_both_bad: Vec::new(),
            voice_rove_out_on_current_transport: false,
            availability_only_in_roam: false,
            ims_allowed_cellular_rats: vec![AccessNetwork::Eutran, AccessNetwork::Ngran],
            powerup_preferred_transport: HashMap::new(),
            powerup_waiting_timer_ms: 0,
            provisioning: ProvisioningInfo::default(),
        }
    }
}

impl CarrierConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, QnsError> {
        toml::from_str(input).map_err(|e| QnsError::Config(e.to_string()))
    }

    pub fn rat_preference(&self, capability: NetCapability) -> RatPreference {
        self.rat_preference
            .get(&capability)
            .copied()
            .unwrap_or_default()
    }

    /// Handover-policy matrix lookup. First matching rule wins; no rule
    /// means allowed.
    pub fn is_handover_allowed_by_policy(
        &self,
        capability: NetCapability,
        src: AccessNetwork,
        dst: AccessNetwork,
        coverage: Coverage,
    ) -> bool {
        let Some(rules) = self.handover_rules.get(&capability) else {
            return true;
        };
        for rule in rules {
            let src_hit = rule.src.is_empty() || rule.src.contains(&src);
            let dst_hit = rule.dst.is_empty() || rule.dst.contains(&dst);
            if src_hit && dst_hit && rule.coverage.covers(coverage) {
                return rule.allow;
            }
        }
        true
    }

    /// Guarding span when `guarded` was just vacated, by capability class
    /// and call type.
    pub fn hysteresis_timer_ms(
        &self,
        capability: NetCapability,
        call_type: CallType,
        guarded: TransportType,
    ) -> u64 {
        let timers = match guarded {
            TransportType::Wwan => &self.wwan_hysteresis_ms,
            TransportType::Wlan => &self.wlan_hysteresis_ms,
            TransportType::Invalid => return 0,
        };
        if capability.is_ims_class() {
            timers.for_call_type(call_type)
        } else {
            // MMS/XCAP/CBS only distinguish idle from in-call.
            match call_type {
                CallType::Idle => timers.idle,
                _ => timers.voice,
            }
        }
    }

    pub fn is_hysteresis_enabled(&self, coverage: Coverage) -> bool {
        self.hysteresis_timer_coverage.covers(coverage)
    }

    pub fn min_guarding_timer_ms(&self) -> u64 {
        self.min_guarding_timer_ms.min(MIN_GUARDING_TIMER_LIMIT_MS)
    }

    /// Whether preference-aware guarding says to skip guarding `guarded`.
    pub fn guard_skipped_by_preference(&self, preference: WfcMode, guarded: TransportType) -> bool {
        self.guard_timer_follows_preference && preference.preferred_transport() == guarded
    }

    pub fn fallback_policy(&self, capability: NetCapability) -> Option<&FallbackOnFailPolicy> {
        self.fallback_on_connection_fail
            .get(&capability)
            .filter(|p| p.enabled)
    }

    pub fn rtp_restrict_time_ms(&self, transport: TransportType) -> u64 {
        match transport {
            TransportType::Wwan => self.wwan_rtp_restrict_time_ms,
            TransportType::Wlan => self.wlan_rtp_restrict_time_ms,
            TransportType::Invalid => 0,
        }
    }

    /// Effective thresholds for one (RAN, measurement) under a call type and
    /// preference: explicit entry, else provisioning patch over the built-in
    /// defaults.
    pub fn threshold_for(
        &self,
        access_network: AccessNetwork,
        call_type: CallType,
        measurement: Measurement,
        preference: WfcMode,
    ) -> ThresholdSet {
        let matching = |want_pref: Option<WfcMode>| {
            self.thresholds.iter().find(|e| {
                e.access_network == access_network
                    && e.measurement == measurement
                    && e.call_type.is_none_or(|ct| ct == call_type)
                    && e.preference == want_pref
            })
        };
        let entry = matching(Some(preference)).or_else(|| matching(None));
        let mut set = entry
            .map(|e| e.set)
            .unwrap_or_else(|| default_threshold(access_network, measurement));
        self.patch_with_provisioning(access_network, measurement, &mut set);
        set
    }

    fn patch_with_provisioning(
        &self,
        access_network: AccessNetwork,
        measurement: Measurement,
        set: &mut ThresholdSet,
    ) {
        let p = &self.provisioning;
        match (access_network, measurement) {
            (AccessNetwork::Eutran, Measurement::Rsrp) => {
                if p.lte_threshold_1.is_some() {
                    set.good = p.lte_threshold_1;
                }
                if p.lte_threshold_2.is_some() {
                    set.bad = p.lte_threshold_2;
                }
                if p.lte_threshold_3.is_some() {
                    set.worst = p.lte_threshold_3;
                }
            }
            (AccessNetwork::Iwlan, Measurement::Rssi) => {
                if p.wifi_threshold_a.is_some() {
                    set.good = p.wifi_threshold_a;
                }
                if p.wifi_threshold_b.is_some() {
                    set.bad = p.wifi_threshold_b;
                }
            }
            _ => {}
        }
    }

    pub fn wifi_threshold_without_cellular(&self, call_type: CallType) -> Option<&WifiOnlyThresholdEntry> {
        self.wifi_thresholds_without_cellular
            .iter()
            .find(|e| e.call_type.is_none_or(|ct| ct == call_type))
    }

    pub fn backhaul_timer_ms(&self, access_network: AccessNetwork) -> u32 {
        if access_network == AccessNetwork::Iwlan {
            self.wifi_backhaul_timer_ms
        } else {
            self.cellular_backhaul_timer_ms
        }
    }

    pub fn has_guard_timer_threshold_gap(&self) -> bool {
        !self.guard_timer_threshold_gaps.is_empty()
    }

    pub fn guard_timer_threshold_gap(
        &self,
        access_network: AccessNetwork,
        measurement: Measurement,
    ) -> i32 {
        self.guard_timer_threshold_gaps
            .iter()
            .find(|e| e.access_network == access_network && e.measurement == measurement)
            .map(|e| e.gap)
            .unwrap_or(0)
    }

    /// Carrier override of the policy-condition table for one precondition
    /// shape, if any.
    pub fn policy_override(
        &self,
        direction: RoveDirection,
        preference: WfcMode,
        call_type: CallType,
        coverage: Coverage,
        guarding: GuardingPhase,
    ) -> Option<&[String]> {
        self.policy_overrides
            .iter()
            .find(|o| {
                o.direction == direction
                    && o.preference == preference
                    && o.call_type.is_none_or(|ct| ct == call_type)
                    && o.coverage.is_none_or(|c| c.covers(coverage))
                    && o.guarding.is_none_or(|g| g == guarding)
            })
            .map(|o| o.conditions.as_slice())
    }

    pub fn is_mmtel_required(&self, coverage: Coverage) -> bool {
        match coverage {
            Coverage::Home => self.mmtel_required_home,
            Coverage::Roam => self.mmtel_required_roam,
            Coverage::Both => self.mmtel_required_home || self.mmtel_required_roam,
        }
    }

    /// Whether a cellular RAN may carry this capability. Only IMS-class
    /// capabilities are RAN-limited.
    pub fn is_access_network_allowed(
        &self,
        access_network: AccessNetwork,
        capability: NetCapability,
    ) -> bool {
        if !capability.is_ims_class() {
            return true;
        }
        match access_network {
            AccessNetwork::Iwlan => true,
            AccessNetwork::Unknown => false,
            _ => self.ims_allowed_cellular_rats.contains(&access_network),
        }
    }

    /// Merge a provisioning update. Returns true when a threshold-relevant
    /// item changed (callers rebuild the policy table then).
    pub fn apply_provisioning(&mut self, info: ProvisioningInfo) -> bool {
        let thresholds_changed = (
            info.lte_threshold_1,
            info.lte_threshold_2,
            info.lte_threshold_3,
            info.wifi_threshold_a,
            info.wifi_threshold_b,
        ) != (
            self.provisioning.lte_threshold_1,
            self.provisioning.lte_threshold_2,
            self.provisioning.lte_threshold_3,
            self.provisioning.wifi_threshold_a,
            self.provisioning.wifi_threshold_b,
        );
        self.provisioning = info;
        thresholds_changed
    }

    pub fn provisioning(&self) -> &ProvisioningInfo {
        &self.provisioning
    }
}

/// Built-in good/bad thresholds per RAN primary measurement.
fn default_threshold(access_network: AccessNetwork, measurement: Measurement) -> ThresholdSet {
    let (good, bad) = match (access_network, measurement) {
        (AccessNetwork::Ngran, Measurement::Ssrsrp) => (DEFAULT_SSRSRP_GOOD, DEFAULT_SSRSRP_BAD),
        (AccessNetwork::Eutran, Measurement::Rsrp) => (DEFAULT_RSRP_GOOD, DEFAULT_RSRP_BAD),
        (AccessNetwork::Utran, Measurement::Rscp) => (DEFAULT_RSCP_GOOD, DEFAULT_RSCP_BAD),
        (AccessNetwork::Geran, Measurement::Rssi) => {
            (DEFAULT_GERAN_RSSI_GOOD, DEFAULT_GERAN_RSSI_BAD)
        }
        (AccessNetwork::Iwlan, Measurement::Rssi) => {
            (DEFAULT_WIFI_RSSI_GOOD, DEFAULT_WIFI_RSSI_BAD)
        }
        _ => return ThresholdSet::default(),
    };
    ThresholdSet {
        good: Some(good),
        bad: Some(bad),
        worst: None,
    }
}

/// The primary measurement policies use for each RAN.
pub fn primary_measurement(access_network: AccessNetwork) -> Measurement {
    match access_network {
        AccessNetwork::Ngran => Measurement::Ssrsrp,
        AccessNetwork::Eutran => Measurement::Rsrp,
        AccessNetwork::Utran => Measurement::Rscp,
        AccessNetwork::Geran | AccessNetwork::Iwlan | AccessNetwork::Unknown => Measurement::Rssi,
    }
}
