//! Default selection-policy construction.
//!
//! Policies are described by a tiny condition DSL (`"Condition:WIFI_GOOD,
//! CELLULAR_BAD"`); each token names a scope (WIFI/CELLULAR/one RAN) and a
//! quality level (AVAILABLE/UNAVAILABLE/GOOD/BAD/TOLERABLE). The builder
//! expands tokens into concrete thresholds using the carrier's configured
//! values, assembles AND-groups per rove direction, and fills the policy
//! table over the full precondition cross product. Carrier overrides plug in
//! at the condition layer, so they compose with threshold configuration.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::warn;

use qnet_common::{
    AccessNetwork, CallType, Coverage, GuardingPhase, MatchType, Measurement, NetCapability,
    QnsError, RoveDirection, WfcMode,
};

use super::{AccessNetworkSelectionPolicy, PolicyTable, Precondition, Threshold, ThresholdGroup};
use crate::config::{CarrierConfig, primary_measurement};

/// Built-in condition table keyed by (direction, preference).
static DEFAULT_CONDITIONS: Lazy<HashMap<(RoveDirection, WfcMode), &'static [&'static str]>> =
    Lazy::new(|| {
        let mut map: HashMap<(RoveDirection, WfcMode), &'static [&'static str]> = HashMap::new();
        map.insert(
            (RoveDirection::RoveIn, WfcMode::WifiPreferred),
            &["Condition:WIFI_GOOD"],
        );
        map.insert(
            (RoveDirection::RoveOut, WfcMode::WifiPreferred),
            &["Condition:WIFI_BAD"],
        );
        map.insert(
            (RoveDirection::RoveIn, WfcMode::CellularPreferred),
            &["Condition:WIFI_GOOD,CELLULAR_BAD"],
        );
        map.insert(
            (RoveDirection::RoveOut, WfcMode::CellularPreferred),
            &["Condition:CELLULAR_GOOD", "Condition:WIFI_BAD,CELLULAR_TOLERABLE"],
        );
        map
    });

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quality {
    Available,
    Unavailable,
    Good,
    Bad,
    Tolerable,
}

#[derive(Debug, Clone, Copy)]
struct ConditionItem {
    access_network: AccessNetwork,
    quality: Quality,
}

/// Expand one condition string into per-RAN items. `"Condition:"` with no
/// tokens is valid and yields an empty list (always-satisfied policy).
fn parse_condition(condition: &str) -> Result<Vec<ConditionItem>, QnsError> {
    let rest = condition
        .strip_prefix("Condition:")
        .ok_or_else(|| QnsError::PolicyToken(condition.to_string()))?;
    let mut items = Vec::new();
    for token in rest.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (scope, quality) = token
            .rsplit_once('_')
            .ok_or_else(|| QnsError::PolicyToken(token.to_string()))?;
        let quality = match quality {
            "AVAILABLE" => Quality::Available,
            "UNAVAILABLE" => Quality::Unavailable,
            "GOOD" => Quality::Good,
            "BAD" => Quality::Bad,
            "TOLERABLE" => Quality::Tolerable,
            _ => return Err(QnsError::PolicyToken(token.to_string())),
        };
        let networks: &[AccessNetwork] = match scope {
            "WIFI" | "IWLAN" => &[AccessNetwork::Iwlan],
            "CELLULAR" => &AccessNetwork::CELLULAR,
            "NGRAN" => &[AccessNetwork::Ngran],
            "EUTRAN" => &[AccessNetwork::Eutran],
            "UTRAN" => &[AccessNetwork::Utran],
            "GERAN" => &[AccessNetwork::Geran],
            _ => return Err(QnsError::PolicyToken(token.to_string())),
        };
        for &access_network in networks {
            items.push(ConditionItem {
                access_network,
                quality,
            });
        }
    }
    Ok(items)
}

/// Build the full policy table for one capability.
pub fn build(config: &CarrierConfig, capability: NetCapability) -> PolicyTable {
    let mut table = PolicyTable::new();
    let gap_enabled = config.has_guard_timer_threshold_gap();
    let phases: &[GuardingPhase] = if gap_enabled {
        &[GuardingPhase::None, GuardingPhase::Cellular, GuardingPhase::Wifi]
    } else {
        &[GuardingPhase::None]
    };

    for coverage in [Coverage::Home, Coverage::Roam] {
        for preference in [WfcMode::WifiPreferred, WfcMode::CellularPreferred] {
            for call_type in [CallType::Idle, CallType::Voice, CallType::Video] {
                for direction in [RoveDirection::RoveIn, RoveDirection::RoveOut] {
                    for &guarding in phases {
                        // Guarding narrows toward the transport being left,
                        // so the opposite pairings never occur.
                        if direction == RoveDirection::RoveIn && guarding == GuardingPhase::Cellular
                        {
                            continue;
                        }
                        if direction == RoveDirection::RoveOut && guarding == GuardingPhase::Wifi {
                            continue;
                        }
                        let precondition = Precondition {
                            call_type,
                            preference,
                            coverage,
                            guarding,
                        };
                        let groups = assemble_groups(config, capability, direction, &precondition);
                        table.insert(AccessNetworkSelectionPolicy::new(
                            capability,
                            direction.target_transport(),
                            precondition,
                            groups,
                        ));
                    }
                }
            }
        }
    }
    table
}

/// Condition strings applying to one (direction, precondition) slot.
fn conditions_for(
    config: &CarrierConfig,
    capability: NetCapability,
    direction: RoveDirection,
    pre: &Precondition,
) -> Vec<String> {
    if let Some(overrides) = config.policy_override(
        direction,
        pre.preference,
        pre.call_type,
        pre.coverage,
        pre.guarding,
    ) {
        return overrides.to_vec();
    }

    // Roaming deployments that qualify on availability alone.
    if config.availability_only_in_roam && pre.coverage == Coverage::Roam {
        let toward_preferred = (pre.preference == WfcMode::CellularPreferred
            && direction == RoveDirection::RoveOut)
            || (pre.preference == WfcMode::WifiPreferred && direction == RoveDirection::RoveIn);
        if config.allow_ims_over_iwlan_cellular_limited {
            let mut out = Vec::new();
            for an in AccessNetwork::CELLULAR {
                let allowed = config.is_access_network_allowed(an, capability);
                // RANs that cannot carry the capability still gate the
                // rove-in on Wi-Fi being reachable beside them.
                let wanted = if allowed {
                    toward_preferred
                } else {
                    direction == RoveDirection::RoveIn
                };
                if wanted {
                    out.push(format!("Condition:WIFI_AVAILABLE,{an}_AVAILABLE"));
                }
            }
            return out;
        }
        if toward_preferred {
            return vec!["Condition:WIFI_AVAILABLE".to_string()];
        }
        return vec!["Condition:".to_string()];
    }

    if config.voice_rove_out_on_current_transport
        && direction == RoveDirection::RoveOut
        && pre.call_type == CallType::Voice
        && pre.preference == WfcMode::CellularPreferred
    {
        return vec!["Condition:WIFI_BAD".to_string()];
    }

    if config.prefer_current_in_both_bad.contains(&pre.preference) {
        if direction == RoveDirection::RoveOut && pre.preference == WfcMode::CellularPreferred {
            return vec![
                "Condition:WIFI_BAD".to_string(),
                "Condition:CELLULAR_GOOD".to_string(),
            ];
        }
        if direction == RoveDirection::RoveIn && pre.preference == WfcMode::WifiPreferred {
            return vec![
                "Condition:WIFI_GOOD".to_string(),
                "Condition:CELLULAR_BAD".to_string(),
            ];
        }
    }

    DEFAULT_CONDITIONS
        .get(&(direction, pre.preference))
        .map(|c| c.iter().map(|s| s.to_string()).collect())
        .unwrap_or_default()
}

fn assemble_groups(
    config: &CarrierConfig,
    capability: NetCapability,
    direction: RoveDirection,
    pre: &Precondition,
) -> Vec<ThresholdGroup> {
    let mut groups = Vec::new();
    for condition in conditions_for(config, capability, direction, pre) {
        match parse_condition(&condition) {
            Ok(items) => {
                let (wifi, cell) = resolve_items(config, &items, direction, pre);
                add_groups(&mut groups, &wifi, &cell, direction);
            }
            Err(e) => {
                warn!(capability = %capability, condition, error = %e, "skipping malformed policy condition");
            }
        }
    }
    if let Some(standalone) = standalone_wifi_group(config, direction, pre) {
        push_unique(&mut groups, standalone);
    }
    groups
}

/// Turn parsed items into concrete thresholds, split by Wi-Fi vs cellular.
/// A RAN whose quality level has no configured threshold degrades to an
/// availability gate, attached only when the opposite side carries real
/// thresholds.
fn resolve_items(
    config: &CarrierConfig,
    items: &[ConditionItem],
    direction: RoveDirection,
    pre: &Precondition,
) -> (Vec<Threshold>, Vec<Threshold>) {
    let mut wifi = Vec::new();
    let mut cell = Vec::new();
    let mut wifi_available = Vec::new();
    let mut cell_available = Vec::new();

    for an in AccessNetwork::SUPPORTED {
        let mut has_threshold = false;
        let mut wants_availability = false;
        for item in items.iter().filter(|i| i.access_network == an) {
            match concrete_threshold(config, an, item.quality, direction, pre) {
                Some(threshold) => {
                    has_threshold = true;
                    if an == AccessNetwork::Iwlan {
                        wifi.push(threshold);
                    } else {
                        cell.push(threshold);
                    }
                }
                None => wants_availability = true,
            }
        }
        if !has_threshold && wants_availability {
            let available = availability_threshold(config, an, true);
            if an == AccessNetwork::Iwlan {
                wifi_available.push(available);
            } else {
                cell_available.push(available);
            }
        }
    }

    if !wifi.is_empty() && !cell_available.is_empty() {
        cell.extend(cell_available);
    }
    if !cell.is_empty() && !wifi_available.is_empty() {
        wifi.extend(wifi_available);
    }
    (wifi, cell)
}

/// Threshold for one (RAN, quality) pair, or `None` when unconfigured.
fn concrete_threshold(
    config: &CarrierConfig,
    an: AccessNetwork,
    quality: Quality,
    direction: RoveDirection,
    pre: &Precondition,
) -> Option<Threshold> {
    if matches!(quality, Quality::Available | Quality::Unavailable) {
        return Some(availability_threshold(config, an, quality == Quality::Available));
    }
    let measurement = primary_measurement(an);
    let set = config.threshold_for(an, pre.call_type, measurement, pre.preference);
    let (value, match_type) = match quality {
        Quality::Good => (set.good?, MatchType::EqualOrLarger),
        Quality::Bad => (set.bad?, MatchType::EqualOrSmaller),
        Quality::Tolerable => (set.worst.or(set.bad)?, MatchType::EqualOrLarger),
        Quality::Available | Quality::Unavailable => unreachable!(),
    };
    // Wi-Fi rove-in thresholds widen while Wi-Fi is guarded.
    let gap = if direction == RoveDirection::RoveIn && pre.guarding == GuardingPhase::Wifi {
        config.guard_timer_threshold_gap(an, measurement)
    } else {
        0
    };
    Some(Threshold {
        access_network: an,
        measurement,
        value: value + gap,
        match_type,
        wait_time_ms: config.backhaul_timer_ms(an),
    })
}

fn availability_threshold(config: &CarrierConfig, an: AccessNetwork, available: bool) -> Threshold {
    Threshold {
        access_network: an,
        measurement: Measurement::Availability,
        value: if available {
            Measurement::AVAILABLE
        } else {
            Measurement::UNAVAILABLE
        },
        match_type: MatchType::EqualTo,
        wait_time_ms: config.backhaul_timer_ms(an),
    }
}

/// Combine Wi-Fi-side and cellular-side thresholds into AND-groups.
fn add_groups(
    groups: &mut Vec<ThresholdGroup>,
    wifi: &[Threshold],
    cell: &[Threshold],
    direction: RoveDirection,
) {
    if wifi.is_empty() && cell.is_empty() {
        return;
    }
    match direction {
        RoveDirection::RoveIn => {
            if !wifi.is_empty() && !cell.is_empty() {
                for w in wifi {
                    for c in cell {
                        push_unique(groups, ThresholdGroup::new(vec![w.clone(), c.clone()]));
                    }
                }
            } else {
                for t in cell.iter().chain(wifi.iter()) {
                    push_unique(groups, ThresholdGroup::new(vec![t.clone()]));
                }
            }
        }
        RoveDirection::RoveOut => {
            // One group per cellular RAN; Wi-Fi conditions ride along in
            // each.
            for an in AccessNetwork::CELLULAR {
                let mut thresholds: Vec<Threshold> = wifi.to_vec();
                if !cell.is_empty() {
                    let mut added = false;
                    for t in cell.iter().filter(|t| t.access_network == an) {
                        thresholds.push(t.clone());
                        added = true;
                    }
                    if !added {
                        continue;
                    }
                }
                if !thresholds.is_empty() {
                    push_unique(groups, ThresholdGroup::new(thresholds));
                }
            }
        }
    }
}

/// Standalone Wi-Fi qualification when no cellular network is around:
/// Wi-Fi RSSI plus every cellular RAN unavailable.
fn standalone_wifi_group(
    config: &CarrierConfig,
    direction: RoveDirection,
    pre: &Precondition,
) -> Option<ThresholdGroup> {
    let entry = config.wifi_threshold_without_cellular(pre.call_type)?;
    let wifi = match direction {
        RoveDirection::RoveIn => Threshold {
            access_network: AccessNetwork::Iwlan,
            measurement: Measurement::Rssi,
            value: entry.good?,
            match_type: MatchType::EqualOrLarger,
            wait_time_ms: config.backhaul_timer_ms(AccessNetwork::Iwlan),
        },
        RoveDirection::RoveOut => Threshold {
            access_network: AccessNetwork::Iwlan,
            measurement: Measurement::Rssi,
            value: entry.bad?,
            match_type: MatchType::EqualOrSmaller,
            wait_time_ms: config.backhaul_timer_ms(AccessNetwork::Iwlan),
        },
    };
    let mut thresholds = vec![wifi];
    for an in AccessNetwork::CELLULAR {
        thresholds.push(availability_threshold(config, an, false));
    }
    Some(ThresholdGroup::new(thresholds))
}

fn push_unique(groups: &mut Vec<ThresholdGroup>, group: ThresholdGroup) {
    if !groups.iter().any(|g| g.same_thresholds(group.thresholds())) {
        groups.push(group);
    }
}
