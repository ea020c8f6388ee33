//! Restriction ledger per transport.
//!
//! Each transport owns a set of restriction records; a record dies only by
//! explicit release, a matching release-event, or timer expiry. Re-adding a
//! (transport, type) pair refreshes its expiry instead of stacking. The
//! ledger also runs the guarding/hysteresis timers, the
//! fallback-on-connection-failure counters, RTP-quality penalties and
//! throttling deferral; the evaluator consults it through `is_restricted`
//! and friends on every pass.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use qnet_common::events::{DataConnectionChangedInfo, DataConnectionEvent};
use qnet_common::{
    AccessNetwork, CallType, Coverage, NetCapability, ReleaseEvent, ReleaseEventMask,
    RestrictType, RtpReasons, TransportType, WfcMode,
};

use crate::clock::TimeSource;
use crate::config::{CarrierConfig, HANDOVER_INIT_GUARD_TIMER_MS};
use crate::registry::{CallbackList, RegistrantId};
use crate::timer::{TimerHeap, TimerId};

/// One live restriction record.
#[derive(Debug, Clone)]
pub struct Restriction {
    pub restrict_type: RestrictType,
    pub release_events: ReleaseEventMask,
    /// Expiry on the injected timeline; 0 = no auto-expiry.
    pub release_at_ms: u64,
    /// Breach reasons, meaningful for RtpLowQuality records.
    pub rtp_reasons: RtpReasons,
}

impl Restriction {
    fn is_active(&self, now_ms: u64) -> bool {
        self.release_at_ms == 0 || self.release_at_ms > now_ms
    }
}

/// Aggregate ledger state delivered to restriction listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestrictionsSnapshot {
    pub wwan: Vec<RestrictType>,
    pub wlan: Vec<RestrictType>,
}

pub struct RestrictManager {
    slot: u8,
    capability: NetCapability,
    config: Arc<CarrierConfig>,
    clock: Arc<dyn TimeSource>,

    restrictions: HashMap<TransportType, HashMap<RestrictType, Restriction>>,
    timers: TimerHeap<(TransportType, RestrictType)>,
    timer_ids: HashMap<(TransportType, RestrictType), TimerId>,

    call_type: CallType,
    coverage: Coverage,
    cellular_ran: AccessNetwork,
    preference: WfcMode,
    airplane_mode: bool,
    wwan_reachable: bool,
    wlan_reachable: bool,

    data_active: bool,
    active_transport: TransportType,
    last_notified_transport: TransportType,

    // Guarding bookkeeping for call-type-driven resizing.
    guarding_started_at_ms: u64,

    // Fallback-on-initial-connection-failure state.
    retry_counts: HashMap<TransportType, u32>,
    first_failure_at: HashMap<TransportType, u64>,
    fallback_uses: u32,

    iwlan_in_call_count: u32,
    deferred_throttling: Option<(TransportType, u64)>,

    listeners: CallbackList<RestrictionsSnapshot>,
    dirty: bool,
}

impl RestrictManager {
    pub fn new(
        slot: u8,
        capability: NetCapability,
        config: Arc<CarrierConfig>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        RestrictManager {
            slot,
            capability,
            config,
            clock,
            restrictions: HashMap::new(),
            timers: TimerHeap::new(),
            timer_ids: HashMap::new(),
            call_type: CallType::Idle,
            coverage: Coverage::Home,
            cellular_ran: AccessNetwork::Unknown,
            preference: WfcMode::CellularPreferred,
            airplane_mode: false,
            wwan_reachable: false,
            wlan_reachable: false,
            data_active: false,
            active_transport: TransportType::Invalid,
            last_notified_transport: TransportType::Invalid,
            guarding_started_at_ms: 0,
            retry_counts: HashMap::new(),
            first_failure_at: HashMap::new(),
            fallback_uses: 0,
            iwlan_in_call_count: 0,
            deferred_throttling: None,
            listeners: CallbackList::new(),
            dirty: false,
        }
    }

    pub fn set_config(&mut self, config: Arc<CarrierConfig>) {
        self.config = config;
    }

    fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    // ─── Record bookkeeping ─────────────────────────────────────────

    /// Insert or refresh a restriction. Refresh re-arms the expiry and keeps
    /// the record without re-notifying; genuine inserts notify listeners.
    pub fn add_restriction(
        &mut self,
        transport: TransportType,
        restrict_type: RestrictType,
        release_events: ReleaseEventMask,
        duration_ms: u64,
    ) {
        if !transport.is_valid() {
            return;
        }
        let now = self.now();
        let release_at_ms = if duration_ms == 0 {
            0
        } else {
            now.saturating_add(duration_ms)
        };
        let existed = self
            .restrictions
            .get(&transport)
            .is_some_and(|m| m.contains_key(&restrict_type));
        self.restrictions.entry(transport).or_default().insert(
            restrict_type,
            Restriction {
                restrict_type,
                release_events,
                release_at_ms,
                rtp_reasons: RtpReasons::default(),
            },
        );
        self.arm_expiry(transport, restrict_type, release_at_ms);
        if restrict_type == RestrictType::Guarding {
            self.guarding_started_at_ms = now;
        }
        debug!(
            slot = self.slot,
            capability = %self.capability,
            %transport,
            ?restrict_type,
            duration_ms,
            refreshed = existed,
            "restriction added"
        );
        if !existed {
            self.mark_changed();
        }
    }

    /// Remove a record and cancel its timer. Removing nothing is a no-op.
    pub fn release_restriction(
        &mut self,
        transport: TransportType,
        restrict_type: RestrictType,
        skip_notify: bool,
    ) -> bool {
        if !transport.is_valid() {
            return false;
        }
        let removed = self
            .restrictions
            .get_mut(&transport)
            .is_some_and(|m| m.remove(&restrict_type).is_some());
        if removed {
            self.cancel_expiry(transport, restrict_type);
            debug!(
                slot = self.slot,
                capability = %self.capability,
                %transport,
                ?restrict_type,
                "restriction released"
            );
            if !skip_notify {
                self.mark_changed();
            }
        }
        removed
    }

    /// Release every record on `transport` whose mask contains `event`;
    /// a single aggregate notification covers all of them.
    pub fn process_release_event(&mut self, transport: TransportType, event: ReleaseEvent) {
        if !transport.is_valid() {
            return;
        }
        let due: Vec<RestrictType> = self
            .restrictions
            .get(&transport)
            .map(|m| {
                m.values()
                    .filter(|r| r.release_events.contains(event))
                    .map(|r| r.restrict_type)
                    .collect()
            })
            .unwrap_or_default();
        let mut any = false;
        for restrict_type in due {
            any |= self.release_restriction(transport, restrict_type, true);
        }
        if any {
            self.mark_changed();
        }
    }

    fn arm_expiry(&mut self, transport: TransportType, restrict_type: RestrictType, at_ms: u64) {
        self.cancel_expiry(transport, restrict_type);
        if at_ms > 0 && at_ms < u64::MAX {
            let id: TimerId = self.timers.schedule(at_ms, (transport, restrict_type));
            self.timer_ids.insert((transport, restrict_type), id);
        }
    }

    fn cancel_expiry(&mut self, transport: TransportType, restrict_type: RestrictType) {
        if let Some(id) = self.timer_ids.remove(&(transport, restrict_type)) {
            self.timers.cancel(id);
        }
    }

    /// Re-arm an existing record's expiry without treating it as a new
    /// restriction.
    fn refresh_expiry(&mut self, transport: TransportType, restrict_type: RestrictType, remaining_ms: u64) {
        let now = self.now();
        if let Some(record) = self
            .restrictions
            .get_mut(&transport)
            .and_then(|m| m.get_mut(&restrict_type))
        {
            record.release_at_ms = now.saturating_add(remaining_ms);
            let at = record.release_at_ms;
            self.arm_expiry(transport, restrict_type, at);
        }
    }

    // ─── Queries ────────────────────────────────────────────────────

    pub fn is_restricted(&self, transport: TransportType) -> bool {
        let now = self.now();
        self.restrictions
            .get(&transport)
            .is_some_and(|m| m.values().any(|r| r.is_active(now)))
    }

    pub fn has_restriction_type(&self, transport: TransportType, restrict_type: RestrictType) -> bool {
        let now = self.now();
        self.restrictions
            .get(&transport)
            .and_then(|m| m.get(&restrict_type))
            .is_some_and(|r| r.is_active(now))
    }

    /// Any active record other than guarding; used by handover-allowed
    /// checks, where guarding alone must not veto.
    pub fn is_restricted_except_guarding(&self, transport: TransportType) -> bool {
        let now = self.now();
        self.restrictions.get(&transport).is_some_and(|m| {
            m.values()
                .any(|r| r.restrict_type != RestrictType::Guarding && r.is_active(now))
        })
    }

    /// Whether `transport` may still be used when it is the only reachable
    /// one: every active record on it must be single-transport-ignorable.
    pub fn is_allowed_on_single_transport(&self, transport: TransportType) -> bool {
        let now = self.now();
        self.restrictions.get(&transport).is_none_or(|m| {
            m.values()
                .filter(|r| r.is_active(now))
                .all(|r| r.restrict_type.ignorable_on_single_transport())
        })
    }

    pub fn snapshot(&self) -> RestrictionsSnapshot {
        let now = self.now();
        let collect = |t: TransportType| {
            let mut types: Vec<RestrictType> = self
                .restrictions
                .get(&t)
                .map(|m| {
                    m.values()
                        .filter(|r| r.is_active(now))
                        .map(|r| r.restrict_type)
                        .collect()
                })
                .unwrap_or_default();
            types.sort();
            types
        };
        RestrictionsSnapshot {
            wwan: collect(TransportType::Wwan),
            wlan: collect(TransportType::Wlan),
        }
    }

    // ─── Guarding ───────────────────────────────────────────────────

    /// Guard `transport` (the vacated side) for `duration_ms`. Guarding on
    /// the other side is silently released; an existing longer guard on the
    /// same side is kept.
    pub fn start_guarding(&mut self, duration_ms: u64, transport: TransportType) {
        if !transport.is_valid() {
            return;
        }
        if duration_ms == 0 {
            self.cancel_guarding(transport);
            return;
        }
        self.release_restriction(transport.other(), RestrictType::Guarding, true);
        let now = self.now();
        if let Some(existing) = self
            .restrictions
            .get(&transport)
            .and_then(|m| m.get(&RestrictType::Guarding))
            && existing.is_active(now)
            && existing.release_at_ms >= now.saturating_add(duration_ms)
        {
            // Never shrink a live guard below what was already promised.
            return;
        }
        self.add_restriction(
            transport,
            RestrictType::Guarding,
            RestrictType::Guarding.default_release_events(),
            duration_ms,
        );
    }

    pub fn cancel_guarding(&mut self, transport: TransportType) {
        self.release_restriction(transport, RestrictType::Guarding, false);
    }

    /// Effective guarding span for a vacated transport under `call_type`,
    /// including the coverage/preference gates and the configured floor.
    fn guarding_span_ms(&self, call_type: CallType, guarded: TransportType) -> u64 {
        if !self.config.is_hysteresis_enabled(self.coverage) {
            return 0;
        }
        if self.config.guard_skipped_by_preference(self.preference, guarded) {
            return 0;
        }
        let span = self
            .config
            .hysteresis_timer_ms(self.capability, call_type, guarded);
        if span == 0 {
            0
        } else {
            span.max(self.config.min_guarding_timer_ms())
        }
    }

    /// Guard the side a connection just moved away from.
    fn guard_vacated_transport(&mut self, vacated: TransportType) {
        let span = self.guarding_span_ms(self.call_type, vacated);
        if span > 0 {
            self.start_guarding(span, vacated);
        } else {
            self.cancel_guarding(vacated);
        }
    }

    /// Call-type change re-evaluates a live guard against the new call
    /// type's span: remaining = new span − elapsed; nonpositive cancels.
    fn resize_guarding_on_call_change(&mut self, previous: CallType, current: CallType) {
        for transport in TransportType::BOTH {
            if !self.has_restriction_type(transport, RestrictType::Guarding) {
                continue;
            }
            let prev_span = self.guarding_span_ms(previous, transport);
            if prev_span == 0 {
                // The running guard was not sized from call type; leave it.
                continue;
            }
            let new_span = self.guarding_span_ms(current, transport);
            if new_span == 0 {
                self.cancel_guarding(transport);
                continue;
            }
            let elapsed = self.now().saturating_sub(self.guarding_started_at_ms);
            let remaining = new_span.saturating_sub(elapsed);
            if remaining == 0 {
                self.cancel_guarding(transport);
            } else {
                self.refresh_expiry(transport, RestrictType::Guarding, remaining);
            }
        }
    }

    // ─── State setters ──────────────────────────────────────────────

    pub fn set_qns_call_type(&mut self, call_type: CallType) {
        if call_type == self.call_type {
            return;
        }
        let previous = std::mem::replace(&mut self.call_type, call_type);
        if call_type == CallType::Idle {
            self.process_release_event(TransportType::Wwan, ReleaseEvent::CallEnd);
            self.process_release_event(TransportType::Wlan, ReleaseEvent::CallEnd);
            self.iwlan_in_call_count = 0;
        }
        self.resize_guarding_on_call_change(previous, call_type);
    }

    pub fn set_cellular_coverage(&mut self, coverage: Coverage) {
        self.coverage = coverage;
    }

    pub fn set_cellular_access_network(&mut self, access_network: AccessNetwork) {
        self.cellular_ran = access_network;
        if self.capability.is_ims_class()
            && access_network.is_cellular()
            && !self
                .config
                .is_access_network_allowed(access_network, self.capability)
        {
            // Serving cell cannot carry IMS; WLAN-side fallback locks lift.
            self.process_release_event(TransportType::Wlan, ReleaseEvent::ImsNotSupportRat);
        }
    }

    pub fn set_preference(&mut self, preference: WfcMode) {
        self.preference = preference;
    }

    pub fn set_airplane_mode(&mut self, on: bool) {
        self.airplane_mode = on;
    }

    pub fn set_transport_reachable(&mut self, wwan: bool, wlan: bool) {
        self.wwan_reachable = wwan;
        self.wlan_reachable = wlan;
    }

    /// Called when the evaluator publishes a new qualified transport; an
    /// active connection moving sides guards the vacated one.
    pub fn update_last_notified_transport(&mut self, transport: TransportType) {
        if transport == self.last_notified_transport {
            return;
        }
        let vacated = std::mem::replace(&mut self.last_notified_transport, transport);
        if self.data_active && vacated.is_valid() && transport.is_valid() {
            self.guard_vacated_transport(vacated);
        }
    }

    pub fn last_notified_transport(&self) -> TransportType {
        self.last_notified_transport
    }

    // ─── Data connection lifecycle ──────────────────────────────────

    pub fn on_data_connection_changed(&mut self, info: &DataConnectionChangedInfo) {
        match info.event {
            DataConnectionEvent::Started => self.process_connection_started(info.transport),
            DataConnectionEvent::Connected => self.process_connected(info.transport),
            DataConnectionEvent::Disconnected => self.process_disconnected(),
            DataConnectionEvent::Failed => {
                self.data_active = false;
                if !self.airplane_mode {
                    self.check_fallback_on_failure(info.transport);
                }
            }
            DataConnectionEvent::HandoverStarted => {
                let src = self.active_transport;
                if src.is_valid()
                    && !self.has_restriction_type(TransportType::Wwan, RestrictType::Guarding)
                    && !self.has_restriction_type(TransportType::Wlan, RestrictType::Guarding)
                {
                    self.start_guarding(HANDOVER_INIT_GUARD_TIMER_MS, src);
                }
            }
            DataConnectionEvent::HandoverSuccess => {
                let target = info.transport;
                self.active_transport = target;
                self.guard_vacated_transport(target.other());
                self.release_restriction(target, RestrictType::RtpLowQuality, false);
            }
            DataConnectionEvent::HandoverFailed => {
                // Still on the source side; its guard has no purpose now.
                self.cancel_guarding(self.active_transport);
            }
        }
    }

    fn process_connection_started(&mut self, transport: TransportType) {
        let previous = std::mem::replace(&mut self.active_transport, transport);
        if previous.is_valid() && previous != transport {
            self.retry_counts.clear();
            self.first_failure_at.clear();
            if self.has_restriction_type(previous, RestrictType::FallbackOnDataConnectionFail) {
                // The restriction did its job: this attempt is the fallback.
                self.fallback_uses += 1;
            }
        }
    }

    fn process_connected(&mut self, transport: TransportType) {
        self.data_active = true;
        self.active_transport = transport;
        self.retry_counts.clear();
        self.first_failure_at.clear();
        self.fallback_uses = 0;
        let mut any = false;
        for t in TransportType::BOTH {
            any |= self.release_restriction(t, RestrictType::FallbackOnDataConnectionFail, true);
        }
        if any {
            self.mark_changed();
        }
        self.guard_vacated_transport(transport.other());
    }

    fn process_disconnected(&mut self) {
        self.data_active = false;
        self.process_release_event(TransportType::Wwan, ReleaseEvent::Disconnect);
        self.process_release_event(TransportType::Wlan, ReleaseEvent::Disconnect);
        self.iwlan_in_call_count = 0;
        if let Some((transport, until_ms)) = self.deferred_throttling.take() {
            // Duration recomputed against disconnect time.
            self.apply_throttling(transport, until_ms);
        }
    }

    // ─── Fallback on initial connection failure ─────────────────────

    fn check_fallback_on_failure(&mut self, transport: TransportType) {
        if !transport.is_valid() {
            return;
        }
        let Some(policy) = self.config.fallback_policy(self.capability) else {
            return;
        };
        let (max_retry, retry_timer, guard_timer, max_fallbacks) = (
            policy.max_retry_count,
            policy.retry_timer_ms,
            policy.guard_timer_ms,
            policy.max_fallback_count,
        );
        // The sole usable path must never be fallback-restricted.
        let other_reachable = match transport.other() {
            TransportType::Wwan => self.wwan_reachable,
            TransportType::Wlan => self.wlan_reachable,
            TransportType::Invalid => false,
        };
        if !other_reachable {
            return;
        }
        if max_fallbacks > 0 && self.fallback_uses >= max_fallbacks {
            return;
        }
        let now = self.now();
        let first = *self.first_failure_at.entry(transport).or_insert(now);
        let count = self.retry_counts.entry(transport).or_insert(0);
        *count += 1;
        let count_hit = max_retry > 0 && *count >= max_retry;
        let timer_hit = retry_timer > 0 && now.saturating_sub(first) >= retry_timer;
        if count_hit || timer_hit {
            self.retry_counts.remove(&transport);
            self.first_failure_at.remove(&transport);
            self.add_restriction(
                transport,
                RestrictType::FallbackOnDataConnectionFail,
                RestrictType::FallbackOnDataConnectionFail.default_release_events(),
                guard_timer,
            );
        }
    }

    // ─── RTP quality ────────────────────────────────────────────────

    pub fn on_low_rtp_quality_event(&mut self, reasons: RtpReasons) {
        let transport = self.active_transport;
        let restrict_ms = self.config.rtp_restrict_time_ms(transport);
        if restrict_ms == 0
            || !transport.is_valid()
            || !matches!(self.call_type, CallType::Voice | CallType::Emergency)
        {
            return;
        }
        if reasons.is_empty() {
            self.release_restriction(transport, RestrictType::RtpLowQuality, false);
            return;
        }
        // A breach on the active side supersedes a prior breach on the
        // other side instead of stacking with it.
        let mut superseded =
            self.release_restriction(transport.other(), RestrictType::RtpLowQuality, true);
        if reasons.has(RtpReasons::NO_RTP) {
            superseded |= self.release_restriction(transport.other(), RestrictType::Guarding, true);
        }
        self.add_restriction(
            transport,
            RestrictType::RtpLowQuality,
            RestrictType::RtpLowQuality.default_release_events(),
            restrict_ms,
        );
        if let Some(record) = self
            .restrictions
            .get_mut(&transport)
            .and_then(|m| m.get_mut(&RestrictType::RtpLowQuality))
        {
            record.rtp_reasons = reasons;
        }
        if transport == TransportType::Wlan
            && self
                .config
                .iwlan_in_call_fallback_reason
                .is_some_and(|r| r.covers_rtp())
        {
            self.increment_iwlan_in_call_counter();
        }
        if superseded {
            self.mark_changed();
        }
    }

    /// One more in-call degradation pointing away from Wi-Fi; reaching the
    /// carrier's maximum restricts IWLAN for the rest of the call.
    pub fn increment_iwlan_in_call_counter(&mut self) {
        let max = self.config.max_iwlan_handover_count_in_call;
        if max == 0 {
            return;
        }
        self.iwlan_in_call_count += 1;
        debug!(
            slot = self.slot,
            capability = %self.capability,
            count = self.iwlan_in_call_count,
            max,
            "in-call IWLAN degradation counter"
        );
        if self.iwlan_in_call_count >= max {
            self.add_restriction(
                TransportType::Wlan,
                RestrictType::IwlanInCall,
                RestrictType::IwlanInCall.default_release_events(),
                0,
            );
        }
    }

    #[cfg(test)]
    fn iwlan_in_call_count(&self) -> u32 {
        self.iwlan_in_call_count
    }

    // ─── Throttling ─────────────────────────────────────────────────

    /// Connectivity-layer throttling. `until_elapsed_ms == u64::MAX` means
    /// indefinite; while a connection is active the application is deferred
    /// to disconnect.
    pub fn notify_throttling(
        &mut self,
        enable: bool,
        until_elapsed_ms: u64,
        transport: TransportType,
    ) {
        if !transport.is_valid() {
            return;
        }
        if !enable {
            self.deferred_throttling = None;
            self.release_restriction(transport, RestrictType::Throttling, false);
            return;
        }
        if self.data_active {
            self.deferred_throttling = Some((transport, until_elapsed_ms));
            return;
        }
        self.apply_throttling(transport, until_elapsed_ms);
    }

    fn apply_throttling(&mut self, transport: TransportType, until_elapsed_ms: u64) {
        let duration_ms = if until_elapsed_ms == u64::MAX {
            0 // no auto-expiry until an explicit unthrottle
        } else {
            let remaining = until_elapsed_ms.saturating_sub(self.now());
            if remaining == 0 {
                return; // already in the past
            }
            remaining
        };
        self.add_restriction(
            transport,
            RestrictType::Throttling,
            ReleaseEventMask::empty(),
            duration_ms,
        );
    }

    // ─── Wi-Fi RTT backhaul ─────────────────────────────────────────

    pub fn on_wlan_rtt_fail(&mut self) {
        let duration_ms = self.config.wlan_rtt_fallback_timer_ms;
        if duration_ms == 0 {
            return;
        }
        if self.cellular_ran.is_cellular()
            && !self
                .config
                .is_access_network_allowed(self.cellular_ran, self.capability)
        {
            // Falling back to a cell that cannot carry the capability would
            // strand the connection.
            return;
        }
        let ignorable: Vec<RestrictType> = self
            .restrictions
            .get(&TransportType::Wwan)
            .map(|m| {
                m.keys()
                    .copied()
                    .filter(|rt| rt.ignorable_on_single_transport())
                    .collect()
            })
            .unwrap_or_default();
        for restrict_type in ignorable {
            self.release_restriction(TransportType::Wwan, restrict_type, true);
        }
        self.add_restriction(
            TransportType::Wlan,
            RestrictType::FallbackToWwanRttBackhaulFail,
            RestrictType::FallbackToWwanRttBackhaulFail.default_release_events(),
            duration_ms,
        );
    }

    // ─── Bring-up ───────────────────────────────────────────────────

    /// Blocks the non-preferred transport for the configured window at
    /// power-up, when the carrier asks for it.
    pub fn restrict_non_preferred_at_powerup(&mut self) {
        let Some(&preferred) = self
            .config
            .powerup_preferred_transport
            .get(&self.capability)
        else {
            return;
        };
        let duration_ms = self.config.powerup_waiting_timer_ms;
        if duration_ms == 0 || !preferred.is_valid() {
            return;
        }
        self.add_restriction(
            preferred.other(),
            RestrictType::NonPreferredTransport,
            ReleaseEventMask::empty(),
            duration_ms,
        );
    }

    // ─── Timers / listeners / teardown ──────────────────────────────

    pub fn next_timer_deadline(&mut self) -> Option<u64> {
        self.timers.next_deadline()
    }

    /// Drop every record whose expiry has passed. Returns whether the
    /// ledger changed.
    pub fn process_due_timers(&mut self) -> bool {
        let now = self.now();
        let mut changed = false;
        while let Some((_, (transport, restrict_type))) = self.timers.pop_due(now) {
            self.timer_ids.remove(&(transport, restrict_type));
            if self
                .restrictions
                .get_mut(&transport)
                .is_some_and(|m| m.remove(&restrict_type).is_some())
            {
                debug!(
                    slot = self.slot,
                    capability = %self.capability,
                    %transport,
                    ?restrict_type,
                    "restriction expired"
                );
                changed = true;
            }
        }
        if changed {
            self.mark_changed();
        }
        changed
    }

    pub fn register_restrictions_changed(
        &mut self,
        callback: impl Fn(&RestrictionsSnapshot) + Send + 'static,
    ) -> RegistrantId {
        self.listeners.register(callback)
    }

    pub fn unregister_restrictions_changed(&mut self, id: RegistrantId) {
        self.listeners.unregister(id);
    }

    /// Whether the ledger changed since the last call; the evaluator polls
    /// this after dispatching each event.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn mark_changed(&mut self) {
        self.dirty = true;
        let snapshot = self.snapshot();
        self.listeners.notify(&snapshot);
    }

    /// Drop everything: records, timers, counters, deferred work.
    pub fn clear(&mut self) {
        let had_records = self.restrictions.values().any(|m| !m.is_empty());
        self.restrictions.clear();
        self.timers.clear();
        self.timer_ids.clear();
        self.retry_counts.clear();
        self.first_failure_at.clear();
        self.fallback_uses = 0;
        self.iwlan_in_call_count = 0;
        self.deferred_throttling = None;
        if had_records {
            self.mark_changed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::FallbackOnFailPolicy;
    use proptest::prelude::*;
    use qnet_common::FallbackReason;

    struct Harness {
        clock: ManualClock,
        restrict: RestrictManager,
    }

    fn harness_with(config: CarrierConfig) -> Harness {
        let clock = ManualClock::new();
        let restrict = RestrictManager::new(
            0,
            NetCapability::Ims,
            Arc::new(config),
            Arc::new(clock.clone()),
        );
        Harness { clock, restrict }
    }

    fn harness() -> Harness {
        harness_with(CarrierConfig::default())
    }

    fn advance_and_fire(h: &mut Harness, ms: u64) {
        h.clock.advance(ms);
        h.restrict.process_due_timers();
    }

    fn data_event(event: DataConnectionEvent, transport: TransportType) -> DataConnectionChangedInfo {
        DataConnectionChangedInfo {
            event,
            transport,
            apn: None,
        }
    }

    // ─── Ledger determinism ─────────────────────────────────────────

    #[test]
    fn add_then_release_is_immediate() {
        let mut h = harness();
        h.restrict.add_restriction(
            TransportType::Wwan,
            RestrictType::Throttling,
            ReleaseEventMask::empty(),
            10_000,
        );
        assert!(h.restrict.is_restricted(TransportType::Wwan));
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Throttling)
        );
        h.restrict
            .release_restriction(TransportType::Wwan, RestrictType::Throttling, false);
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Throttling)
        );
        assert!(!h.restrict.is_restricted(TransportType::Wwan));
        // Double release is a defined no-op.
        assert!(
            !h.restrict
                .release_restriction(TransportType::Wwan, RestrictType::Throttling, false)
        );
    }

    #[test]
    fn readd_refreshes_instead_of_stacking() {
        let mut h = harness();
        let mask = ReleaseEventMask::empty();
        h.restrict
            .add_restriction(TransportType::Wlan, RestrictType::Throttling, mask, 5_000);
        advance_and_fire(&mut h, 4_000);
        // Refresh with a new 5s window at t=4s.
        h.restrict
            .add_restriction(TransportType::Wlan, RestrictType::Throttling, mask, 5_000);
        advance_and_fire(&mut h, 4_000);
        assert!(
            h.restrict.is_restricted(TransportType::Wlan),
            "refreshed expiry must outlive the original window"
        );
        advance_and_fire(&mut h, 1_500);
        assert!(!h.restrict.is_restricted(TransportType::Wlan));
    }

    #[test]
    fn expired_record_is_inactive_even_before_timer_runs() {
        let mut h = harness();
        h.restrict.add_restriction(
            TransportType::Wwan,
            RestrictType::Throttling,
            ReleaseEventMask::empty(),
            1_000,
        );
        h.clock.advance(2_000);
        // Timer not yet processed, but queries must already say no.
        assert!(!h.restrict.is_restricted(TransportType::Wwan));
    }

    #[test]
    fn invalid_transport_queries_are_false() {
        let mut h = harness();
        h.restrict.add_restriction(
            TransportType::Invalid,
            RestrictType::Guarding,
            ReleaseEventMask::empty(),
            1_000,
        );
        assert!(!h.restrict.is_restricted(TransportType::Invalid));
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Invalid, RestrictType::Guarding)
        );
    }

    #[test]
    fn zero_duration_never_expires() {
        let mut h = harness();
        h.restrict.add_restriction(
            TransportType::Wlan,
            RestrictType::IwlanInCall,
            RestrictType::IwlanInCall.default_release_events(),
            0,
        );
        advance_and_fire(&mut h, u64::MAX / 2);
        assert!(h.restrict.is_restricted(TransportType::Wlan));
    }

    // ─── Guarding ───────────────────────────────────────────────────

    #[test]
    fn guarding_monotonicity() {
        let mut h = harness();
        h.restrict.start_guarding(30_000, TransportType::Wwan);
        advance_and_fire(&mut h, 1_000);
        // A shorter follow-up request must not shrink the live guard.
        h.restrict.start_guarding(5_000, TransportType::Wwan);
        advance_and_fire(&mut h, 10_000);
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Guarding),
            "guard shrank below the larger requested duration"
        );
        advance_and_fire(&mut h, 20_000);
        assert!(!h.restrict.is_restricted(TransportType::Wwan));
    }

    #[test]
    fn guarding_extends_when_new_request_is_longer() {
        let mut h = harness();
        h.restrict.start_guarding(5_000, TransportType::Wlan);
        advance_and_fire(&mut h, 2_000);
        h.restrict.start_guarding(30_000, TransportType::Wlan);
        advance_and_fire(&mut h, 10_000);
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wlan, RestrictType::Guarding)
        );
    }

    #[test]
    fn guarding_is_single_sided() {
        let mut h = harness();
        h.restrict.start_guarding(30_000, TransportType::Wwan);
        h.restrict.start_guarding(30_000, TransportType::Wlan);
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Guarding),
            "guarding the other side must release the first guard"
        );
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wlan, RestrictType::Guarding)
        );
    }

    #[test]
    fn call_type_change_resizes_guard() {
        let mut config = CarrierConfig::default();
        config.wwan_hysteresis_ms.idle = 30_000;
        config.wwan_hysteresis_ms.voice = 10_000;
        let mut h = harness_with(config);

        h.restrict.set_qns_call_type(CallType::Idle);
        let span = 30_000;
        h.restrict.start_guarding(span, TransportType::Wwan);
        advance_and_fire(&mut h, 8_000);
        // Voice span is 10s; 8s already elapsed → 2s remain.
        h.restrict.set_qns_call_type(CallType::Voice);
        advance_and_fire(&mut h, 1_000);
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Guarding)
        );
        advance_and_fire(&mut h, 1_500);
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Guarding),
            "guard must end 10s after it started under the voice span"
        );
    }

    #[test]
    fn call_type_change_with_elapsed_past_new_span_cancels() {
        let mut config = CarrierConfig::default();
        config.wwan_hysteresis_ms.idle = 30_000;
        config.wwan_hysteresis_ms.voice = 5_000;
        let mut h = harness_with(config);

        h.restrict.start_guarding(30_000, TransportType::Wwan);
        advance_and_fire(&mut h, 10_000);
        h.restrict.set_qns_call_type(CallType::Voice);
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Guarding)
        );
    }

    // ─── Release events ─────────────────────────────────────────────

    #[test]
    fn disconnect_releases_guarding_and_applies_deferred_throttling() {
        let mut h = harness();
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Connected, TransportType::Wlan));
        h.restrict.start_guarding(30_000, TransportType::Wwan);

        // Throttle request arrives while the connection is active: deferred.
        h.restrict
            .notify_throttling(true, h.clock.now_ms() + 12_000, TransportType::Wwan);
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Throttling),
            "throttling must defer while the connection is active"
        );

        advance_and_fire(&mut h, 2_000);
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Disconnected, TransportType::Wlan));
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Guarding),
            "disconnect releases guarding"
        );
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Throttling),
            "deferred throttling applies at disconnect"
        );
        // Recomputed against disconnect time: 10s remain.
        advance_and_fire(&mut h, 9_000);
        assert!(h.restrict.is_restricted(TransportType::Wwan));
        advance_and_fire(&mut h, 1_500);
        assert!(!h.restrict.is_restricted(TransportType::Wwan));
    }

    #[test]
    fn throttling_scenario_guarded_wwan_clears_after_expiry() {
        let mut h = harness();
        // WLAN carries an active, guarded connection; WWAN was just vacated.
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Connected, TransportType::Wlan));
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Guarding),
            "connect guards the vacated transport"
        );
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Disconnected, TransportType::Wlan));
        h.restrict.start_guarding(30_000, TransportType::Wwan);
        h.restrict
            .notify_throttling(true, h.clock.now_ms() + 12_000, TransportType::Wwan);
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Guarding)
        );
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Throttling)
        );
        advance_and_fire(&mut h, 13_000);
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Throttling),
            "throttling expired after 13s"
        );
        advance_and_fire(&mut h, 20_000);
        assert!(!h.restrict.is_restricted(TransportType::Wwan));
    }

    #[test]
    fn indefinite_throttling_waits_for_explicit_unthrottle() {
        let mut h = harness();
        h.restrict
            .notify_throttling(true, u64::MAX, TransportType::Wlan);
        advance_and_fire(&mut h, 3_600_000);
        assert!(h.restrict.is_restricted(TransportType::Wlan));
        h.restrict.notify_throttling(false, 0, TransportType::Wlan);
        assert!(!h.restrict.is_restricted(TransportType::Wlan));
    }

    #[test]
    fn stale_throttle_timestamp_is_ignored() {
        let mut h = harness();
        h.clock.set(50_000);
        h.restrict.notify_throttling(true, 20_000, TransportType::Wwan);
        assert!(!h.restrict.is_restricted(TransportType::Wwan));
    }

    // ─── RTP low quality ────────────────────────────────────────────

    #[test]
    fn rtp_scenario_thirty_seconds_then_idle() {
        let mut config = CarrierConfig::default();
        config.wwan_rtp_restrict_time_ms = 30_000;
        let mut h = harness_with(config);

        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Connected, TransportType::Wwan));
        h.restrict.set_qns_call_type(CallType::Voice);
        h.restrict.on_low_rtp_quality_event(RtpReasons::PACKET_LOSS);
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::RtpLowQuality)
        );

        advance_and_fire(&mut h, 30_000);
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::RtpLowQuality),
            "released after exactly the configured 30s"
        );

        h.restrict.set_qns_call_type(CallType::Idle);
        assert!(!h.restrict.is_restricted(TransportType::Wwan));
        assert!(!h.restrict.is_restricted(TransportType::Wlan));
    }

    #[test]
    fn rtp_event_requires_active_call() {
        let mut h = harness();
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Connected, TransportType::Wwan));
        h.restrict.on_low_rtp_quality_event(RtpReasons::JITTER);
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::RtpLowQuality),
            "idle call type must ignore RTP breaches"
        );
    }

    #[test]
    fn rtp_breach_supersedes_other_side() {
        let mut h = harness();
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Connected, TransportType::Wlan));
        h.restrict.set_qns_call_type(CallType::Voice);
        h.restrict.on_low_rtp_quality_event(RtpReasons::PACKET_LOSS);
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wlan, RestrictType::RtpLowQuality)
        );

        // Handover to WWAN, then a NO_RTP breach there.
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::HandoverStarted, TransportType::Wwan));
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::HandoverSuccess, TransportType::Wwan));
        h.restrict.on_low_rtp_quality_event(RtpReasons::NO_RTP);
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::RtpLowQuality)
        );
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wlan, RestrictType::RtpLowQuality),
            "breach on the active side supersedes the other side's record"
        );
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wlan, RestrictType::Guarding),
            "NO_RTP also lifts guarding on the other side"
        );
    }

    #[test]
    fn repeated_wlan_breaches_restrict_iwlan_in_call() {
        let mut config = CarrierConfig::default();
        config.iwlan_in_call_fallback_reason = Some(FallbackReason::RtpOrWifi);
        config.max_iwlan_handover_count_in_call = 2;
        let mut h = harness_with(config);

        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Connected, TransportType::Wlan));
        h.restrict.set_qns_call_type(CallType::Voice);
        h.restrict.on_low_rtp_quality_event(RtpReasons::JITTER);
        assert_eq!(h.restrict.iwlan_in_call_count(), 1);
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wlan, RestrictType::IwlanInCall)
        );
        h.restrict.on_low_rtp_quality_event(RtpReasons::JITTER);
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wlan, RestrictType::IwlanInCall)
        );

        // Call end releases the penalty and resets the counter.
        h.restrict.set_qns_call_type(CallType::Idle);
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wlan, RestrictType::IwlanInCall)
        );
        assert_eq!(h.restrict.iwlan_in_call_count(), 0);
    }

    // ─── Fallback on connection failure ─────────────────────────────

    fn fallback_config(max_retry: u32, guard_ms: u64, max_fallbacks: u32) -> CarrierConfig {
        let mut config = CarrierConfig::default();
        config.fallback_on_connection_fail.insert(
            NetCapability::Ims,
            FallbackOnFailPolicy {
                enabled: true,
                max_retry_count: max_retry,
                retry_timer_ms: 0,
                guard_timer_ms: guard_ms,
                max_fallback_count: max_fallbacks,
            },
        );
        config
    }

    #[test]
    fn fallback_arms_after_max_retries() {
        let mut h = harness_with(fallback_config(3, 60_000, 0));
        h.restrict.set_transport_reachable(true, true);
        for _ in 0..2 {
            h.restrict
                .on_data_connection_changed(&data_event(DataConnectionEvent::Failed, TransportType::Wlan));
            assert!(!h.restrict.has_restriction_type(
                TransportType::Wlan,
                RestrictType::FallbackOnDataConnectionFail
            ));
        }
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Failed, TransportType::Wlan));
        assert!(h.restrict.has_restriction_type(
            TransportType::Wlan,
            RestrictType::FallbackOnDataConnectionFail
        ));
        // Guard-timer expiry releases independently of events.
        advance_and_fire(&mut h, 60_500);
        assert!(!h.restrict.has_restriction_type(
            TransportType::Wlan,
            RestrictType::FallbackOnDataConnectionFail
        ));
    }

    #[test]
    fn single_rat_failures_never_arm_fallback() {
        let mut h = harness_with(fallback_config(2, 60_000, 0));
        // Only WLAN is reachable.
        h.restrict.set_transport_reachable(false, true);
        for _ in 0..10 {
            h.restrict
                .on_data_connection_changed(&data_event(DataConnectionEvent::Failed, TransportType::Wlan));
        }
        assert!(
            !h.restrict.has_restriction_type(
                TransportType::Wlan,
                RestrictType::FallbackOnDataConnectionFail
            ),
            "the sole usable path must never be fallback-restricted"
        );
    }

    #[test]
    fn connected_resets_retry_state() {
        let mut h = harness_with(fallback_config(3, 60_000, 0));
        h.restrict.set_transport_reachable(true, true);
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Failed, TransportType::Wlan));
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Failed, TransportType::Wlan));
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Connected, TransportType::Wlan));
        // Counter restarted: two more failures are not enough.
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Disconnected, TransportType::Wlan));
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Failed, TransportType::Wlan));
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Failed, TransportType::Wlan));
        assert!(!h.restrict.has_restriction_type(
            TransportType::Wlan,
            RestrictType::FallbackOnDataConnectionFail
        ));
    }

    #[test]
    fn airplane_mode_suppresses_fallback_policy() {
        let mut h = harness_with(fallback_config(1, 60_000, 0));
        h.restrict.set_transport_reachable(true, true);
        h.restrict.set_airplane_mode(true);
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Failed, TransportType::Wlan));
        assert!(!h.restrict.is_restricted(TransportType::Wlan));
    }

    #[test]
    fn fallback_rearm_capped_by_max_fallback_count() {
        let mut h = harness_with(fallback_config(1, 5_000, 1));
        h.restrict.set_transport_reachable(true, true);
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Failed, TransportType::Wlan));
        assert!(h.restrict.has_restriction_type(
            TransportType::Wlan,
            RestrictType::FallbackOnDataConnectionFail
        ));
        // The connectivity layer falls back to WWAN.
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Started, TransportType::Wlan));
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Started, TransportType::Wwan));
        advance_and_fire(&mut h, 6_000);
        // WLAN fails again; one fallback already used, cap is 1.
        h.restrict
            .on_data_connection_changed(&data_event(DataConnectionEvent::Failed, TransportType::Wlan));
        assert!(
            !h.restrict.has_restriction_type(
                TransportType::Wlan,
                RestrictType::FallbackOnDataConnectionFail
            ),
            "re-arming past the fallback cap requires a successful connect"
        );
    }

    // ─── Misc ───────────────────────────────────────────────────────

    #[test]
    fn single_transport_allowance() {
        let mut h = harness();
        h.restrict.start_guarding(30_000, TransportType::Wlan);
        assert!(h.restrict.is_allowed_on_single_transport(TransportType::Wlan));
        h.restrict.add_restriction(
            TransportType::Wlan,
            RestrictType::Throttling,
            ReleaseEventMask::empty(),
            30_000,
        );
        assert!(!h.restrict.is_allowed_on_single_transport(TransportType::Wlan));
        assert!(h.restrict.is_allowed_on_single_transport(TransportType::Wwan));
    }

    #[test]
    fn except_guarding_query() {
        let mut h = harness();
        h.restrict.start_guarding(30_000, TransportType::Wwan);
        assert!(h.restrict.is_restricted(TransportType::Wwan));
        assert!(!h.restrict.is_restricted_except_guarding(TransportType::Wwan));
        h.restrict.add_restriction(
            TransportType::Wwan,
            RestrictType::RtpLowQuality,
            RestrictType::RtpLowQuality.default_release_events(),
            30_000,
        );
        assert!(h.restrict.is_restricted_except_guarding(TransportType::Wwan));
    }

    #[test]
    fn ims_unsupported_rat_releases_wlan_fallback() {
        let mut h = harness();
        h.restrict.add_restriction(
            TransportType::Wlan,
            RestrictType::FallbackToWwanImsRegiFail,
            RestrictType::FallbackToWwanImsRegiFail.default_release_events(),
            0,
        );
        // GERAN is not IMS-allowed by default.
        h.restrict.set_cellular_access_network(AccessNetwork::Geran);
        assert!(!h.restrict.has_restriction_type(
            TransportType::Wlan,
            RestrictType::FallbackToWwanImsRegiFail
        ));
    }

    #[test]
    fn wlan_rtt_fail_restricts_wlan_when_cell_can_carry_ims() {
        let mut config = CarrierConfig::default();
        config.wlan_rtt_fallback_timer_ms = 20_000;
        let mut h = harness_with(config);
        h.restrict.set_cellular_access_network(AccessNetwork::Eutran);
        h.restrict.start_guarding(30_000, TransportType::Wwan);
        h.restrict.on_wlan_rtt_fail();
        assert!(h.restrict.has_restriction_type(
            TransportType::Wlan,
            RestrictType::FallbackToWwanRttBackhaulFail
        ));
        assert!(
            !h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::Guarding),
            "WWAN must be usable for the fallback"
        );
        advance_and_fire(&mut h, 20_500);
        assert!(!h.restrict.is_restricted(TransportType::Wlan));
    }

    #[test]
    fn powerup_restriction_blocks_non_preferred_side() {
        let mut config = CarrierConfig::default();
        config
            .powerup_preferred_transport
            .insert(NetCapability::Ims, TransportType::Wlan);
        config.powerup_waiting_timer_ms = 10_000;
        let mut h = harness_with(config);
        h.restrict.restrict_non_preferred_at_powerup();
        assert!(
            h.restrict
                .has_restriction_type(TransportType::Wwan, RestrictType::NonPreferredTransport)
        );
        advance_and_fire(&mut h, 10_500);
        assert!(!h.restrict.is_restricted(TransportType::Wwan));
    }

    #[test]
    fn listener_sees_aggregate_changes() {
        use std::sync::Mutex;
        let mut h = harness();
        let seen: Arc<Mutex<Vec<RestrictionsSnapshot>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        h.restrict.register_restrictions_changed(move |snap| {
            sink.lock().unwrap().push(snap.clone());
        });
        h.restrict.start_guarding(30_000, TransportType::Wwan);
        h.restrict.cancel_guarding(TransportType::Wwan);
        let snapshots = seen.lock().unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].wwan, vec![RestrictType::Guarding]);
        assert!(snapshots[1].wwan.is_empty());
    }

    proptest! {
        // is_restricted must agree with the live record set under any
        // interleaving of adds/releases for one transport.
        #[test]
        fn restriction_determinism(ops in proptest::collection::vec((0u8..2, 0u8..4), 1..40)) {
            let mut h = harness();
            let types = [
                RestrictType::Guarding,
                RestrictType::Throttling,
                RestrictType::RtpLowQuality,
                RestrictType::HandoverNotAllowed,
            ];
            let mut live = std::collections::HashSet::new();
            for (op, idx) in ops {
                let rt = types[idx as usize];
                if op == 0 {
                    h.restrict.add_restriction(
                        TransportType::Wwan,
                        rt,
                        ReleaseEventMask::empty(),
                        0,
                    );
                    live.insert(rt);
                } else {
                    h.restrict.release_restriction(TransportType::Wwan, rt, false);
                    live.remove(&rt);
                }
                prop_assert_eq!(h.restrict.is_restricted(TransportType::Wwan), !live.is_empty());
                for rt in types {
                    prop_assert_eq!(
                        h.restrict.has_restriction_type(TransportType::Wwan, rt),
                        live.contains(&rt)
                    );
                }
            }
        }
    }
}
