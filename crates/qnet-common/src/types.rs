//! Core vocabulary for transport qualification decisions.
//!
//! These types are shared between the evaluator, the restriction ledger and
//! anything that registers for qualified-network updates.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

// ── Transports and access networks ──────────────────────────────────

/// Which side of the radio a data connection rides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    /// Sentinel for "no transport" / unresolvable. Queries against it are
    /// defined to return false rather than fail.
    Invalid,
    /// Wide-area cellular (2G..5G).
    Wwan,
    /// Wi-Fi (IWLAN).
    Wlan,
}

impl TransportType {
    /// The opposite transport. `Invalid` maps to itself.
    pub fn other(self) -> TransportType {
        match self {
            TransportType::Wwan => TransportType::Wlan,
            TransportType::Wlan => TransportType::Wwan,
            TransportType::Invalid => TransportType::Invalid,
        }
    }

    pub fn is_valid(self) -> bool {
        self != TransportType::Invalid
    }

    /// The two real transports, in WWAN-first order.
    pub const BOTH: [TransportType; 2] = [TransportType::Wwan, TransportType::Wlan];
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Invalid => write!(f, "INVALID"),
            TransportType::Wwan => write!(f, "WWAN"),
            TransportType::Wlan => write!(f, "WLAN"),
        }
    }
}

/// Radio access network identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessNetwork {
    Unknown,
    /// 2G.
    Geran,
    /// 3G.
    Utran,
    /// LTE.
    Eutran,
    /// 5G NR.
    Ngran,
    /// Wi-Fi as a cellular access network.
    Iwlan,
}

impl AccessNetwork {
    /// All access networks the selection policies reason about.
    pub const SUPPORTED: [AccessNetwork; 5] = [
        AccessNetwork::Ngran,
        AccessNetwork::Eutran,
        AccessNetwork::Utran,
        AccessNetwork::Geran,
        AccessNetwork::Iwlan,
    ];

    /// The cellular subset of [`Self::SUPPORTED`].
    pub const CELLULAR: [AccessNetwork; 4] = [
        AccessNetwork::Ngran,
        AccessNetwork::Eutran,
        AccessNetwork::Utran,
        AccessNetwork::Geran,
    ];

    pub fn is_cellular(self) -> bool {
        matches!(
            self,
            AccessNetwork::Geran | AccessNetwork::Utran | AccessNetwork::Eutran | AccessNetwork::Ngran
        )
    }

    /// Transport this access network rides on. `Unknown` is `Invalid`.
    pub fn transport(self) -> TransportType {
        match self {
            AccessNetwork::Unknown => TransportType::Invalid,
            AccessNetwork::Iwlan => TransportType::Wlan,
            _ => TransportType::Wwan,
        }
    }
}

impl fmt::Display for AccessNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Conventional RAN spelling (EUTRAN, NGRAN, ...).
        write!(f, "{}", format!("{self:?}").to_uppercase())
    }
}

// ── Capabilities, call state, coverage ──────────────────────────────

/// Network capability a data connection is established for. One evaluator
/// instance exists per (slot, capability).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetCapability {
    /// IMS voice/video.
    Ims,
    /// Emergency IMS.
    Eims,
    Mms,
    Xcap,
    Cbs,
}

impl NetCapability {
    /// IMS-class capabilities share hysteresis/guarding configuration keyed
    /// by call type; the others use a simpler idle/voice split.
    pub fn is_ims_class(self) -> bool {
        matches!(self, NetCapability::Ims | NetCapability::Eims)
    }
}

impl fmt::Display for NetCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{self:?}").to_uppercase())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    #[default]
    Idle,
    Voice,
    Video,
    Emergency,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    #[default]
    Home,
    Roam,
    /// Wildcard used in configuration entries.
    Both,
}

impl Coverage {
    /// Whether a configuration entry with this coverage applies to `other`.
    pub fn covers(self, other: Coverage) -> bool {
        self == Coverage::Both || self == other
    }
}

// ── Preferences ─────────────────────────────────────────────────────

/// Wi-Fi-calling mode as configured by the user (per coverage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WfcMode {
    WifiOnly,
    WifiPreferred,
    CellularPreferred,
}

impl WfcMode {
    /// The transport this mode prefers when both qualify.
    pub fn preferred_transport(self) -> TransportType {
        match self {
            WfcMode::CellularPreferred => TransportType::Wwan,
            WfcMode::WifiOnly | WfcMode::WifiPreferred => TransportType::Wlan,
        }
    }
}

/// Carrier RAT-preference gate applied before policy matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatPreference {
    /// Defer entirely to the selection policies.
    #[default]
    Default,
    WifiOnly,
    /// Wi-Fi only while IMS is registered over WLAN.
    WifiWhenWfcAvailable,
    WifiWhenNoCellular,
    WifiWhenHomeIsNotAvailable,
}

/// SIP dialog session policy: while a dialog is active and the call tracker
/// still reports idle, policy lookup may follow the dialog's media type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SipDialogPolicy {
    #[default]
    None,
    FollowVoiceCall,
    FollowVideoCall,
}

// ── Measurements and matching ───────────────────────────────────────

/// Signal measurement kinds a threshold can be expressed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    /// Pseudo-measurement: 1 = reachable, 0 = not.
    Availability,
    Rssi,
    Rsrp,
    Rsrq,
    Rssnr,
    Ssrsrp,
    Ssrsrq,
    Sssinr,
    Rscp,
    Ecno,
}

impl Measurement {
    /// Value reported for an available network on [`Measurement::Availability`].
    pub const AVAILABLE: i32 = 1;
    /// Value reported for an unavailable network.
    pub const UNAVAILABLE: i32 = 0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    EqualTo,
    EqualOrLarger,
    EqualOrSmaller,
}

/// Direction a selection policy moves traffic when satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoveDirection {
    /// Toward cellular (target WWAN).
    RoveOut,
    /// Toward Wi-Fi (target WLAN).
    RoveIn,
}

impl RoveDirection {
    pub fn target_transport(self) -> TransportType {
        match self {
            RoveDirection::RoveOut => TransportType::Wwan,
            RoveDirection::RoveIn => TransportType::Wlan,
        }
    }
}

/// Guarding phase qualifier on a policy precondition. While a transport is
/// guarded the matching policies may differ (threshold gap).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardingPhase {
    #[default]
    None,
    Cellular,
    Wifi,
}

// ── Restrictions ────────────────────────────────────────────────────

/// Kinds of restriction a transport can carry in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictType {
    /// Time-boxed block on returning to a just-vacated transport.
    Guarding,
    /// Connectivity-layer throttling of new connection attempts.
    Throttling,
    HandoverNotAllowed,
    /// Non-preferred transport blocked for a while at bring-up.
    NonPreferredTransport,
    RtpLowQuality,
    /// Wi-Fi penalized after too many in-call handovers to it.
    IwlanInCall,
    /// Wi-Fi blocked during a circuit-switched call.
    IwlanCsCall,
    FallbackToWwanImsRegiFail,
    FallbackOnDataConnectionFail,
    FallbackToWwanRttBackhaulFail,
}

impl RestrictType {
    /// Restrictions that do not forbid using a transport when it is the only
    /// reachable one.
    pub fn ignorable_on_single_transport(self) -> bool {
        matches!(
            self,
            RestrictType::Guarding
                | RestrictType::RtpLowQuality
                | RestrictType::IwlanInCall
                | RestrictType::FallbackToWwanImsRegiFail
                | RestrictType::FallbackOnDataConnectionFail
                | RestrictType::FallbackToWwanRttBackhaulFail
        )
    }

    /// Default release-event mask for this restriction kind.
    pub fn default_release_events(self) -> ReleaseEventMask {
        use ReleaseEvent::*;
        match self {
            RestrictType::Guarding => Disconnect | WfcModeChanged,
            RestrictType::RtpLowQuality => CallEnd | WifiApChanged,
            RestrictType::IwlanInCall => CallEnd.into(),
            RestrictType::IwlanCsCall => CallEnd.into(),
            RestrictType::FallbackToWwanImsRegiFail => Disconnect | ImsNotSupportRat,
            RestrictType::FallbackOnDataConnectionFail => {
                Disconnect | WifiApChanged | WfcModeChanged | ImsNotSupportRat
            }
            RestrictType::FallbackToWwanRttBackhaulFail => {
                Disconnect | WifiApChanged | ImsNotSupportRat
            }
            RestrictType::Throttling
            | RestrictType::HandoverNotAllowed
            | RestrictType::NonPreferredTransport => ReleaseEventMask::empty(),
        }
    }
}

/// Events that release restrictions whose mask contains them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseEvent {
    Disconnect,
    WifiApChanged,
    WfcModeChanged,
    CallEnd,
    ImsNotSupportRat,
}

impl ReleaseEvent {
    fn bit(self) -> u8 {
        match self {
            ReleaseEvent::Disconnect => 1 << 0,
            ReleaseEvent::WifiApChanged => 1 << 1,
            ReleaseEvent::WfcModeChanged => 1 << 2,
            ReleaseEvent::CallEnd => 1 << 3,
            ReleaseEvent::ImsNotSupportRat => 1 << 4,
        }
    }
}

/// Small bitmask over [`ReleaseEvent`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEventMask(u8);

impl ReleaseEventMask {
    pub const fn empty() -> Self {
        ReleaseEventMask(0)
    }

    pub fn contains(self, event: ReleaseEvent) -> bool {
        self.0 & event.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<ReleaseEvent> for ReleaseEventMask {
    fn from(event: ReleaseEvent) -> Self {
        ReleaseEventMask(event.bit())
    }
}

impl BitOr for ReleaseEvent {
    type Output = ReleaseEventMask;
    fn bitor(self, rhs: ReleaseEvent) -> ReleaseEventMask {
        ReleaseEventMask(self.bit() | rhs.bit())
    }
}

impl BitOr<ReleaseEvent> for ReleaseEventMask {
    type Output = ReleaseEventMask;
    fn bitor(self, rhs: ReleaseEvent) -> ReleaseEventMask {
        ReleaseEventMask(self.0 | rhs.bit())
    }
}

// ── RTP quality / fallback reasons ──────────────────────────────────

/// Bitmask of low-RTP-quality breach reasons reported by the media stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpReasons(pub u32);

impl RtpReasons {
    pub const JITTER: RtpReasons = RtpReasons(1 << 1);
    pub const PACKET_LOSS: RtpReasons = RtpReasons(1 << 2);
    pub const NO_RTP: RtpReasons = RtpReasons(1 << 3);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn has(self, other: RtpReasons) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for RtpReasons {
    type Output = RtpReasons;
    fn bitor(self, rhs: RtpReasons) -> RtpReasons {
        RtpReasons(self.0 | rhs.0)
    }
}

/// Which breach classes are allowed to penalize in-call Wi-Fi handovers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    RtpOnly,
    WifiOnly,
    RtpOrWifi,
}

impl FallbackReason {
    pub fn covers_rtp(self) -> bool {
        matches!(self, FallbackReason::RtpOnly | FallbackReason::RtpOrWifi)
    }

    pub fn covers_wifi(self) -> bool {
        matches!(self, FallbackReason::WifiOnly | FallbackReason::RtpOrWifi)
    }
}

// ── Published output ────────────────────────────────────────────────

/// One qualified-network decision, delivered to registrants once per real
/// change. An empty list is a valid, distinct "nothing qualified" state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedNetworksUpdate {
    pub slot: u8,
    pub capability: NetCapability,
    /// Ordered candidates; first entry decides the transport.
    pub access_networks: Vec<AccessNetwork>,
}

impl QualifiedNetworksUpdate {
    /// WLAN if the first entry is IWLAN, WWAN otherwise (including empty).
    pub fn transport(&self) -> TransportType {
        match self.access_networks.first() {
            Some(AccessNetwork::Iwlan) => TransportType::Wlan,
            _ => TransportType::Wwan,
        }
    }
}
