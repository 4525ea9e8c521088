//! Capability glue between the wire codec (`bgp_packet::caps`) and the FSM-level policy
//! spec §4.2 layers on top of pure intersection: role-pair validation and graceful-restart
//! state reconstruction.

use crate::config::PeerConfig;
use bgp_common::{Aid, AidSet};
use bgp_packet::caps::{
    AddPathDirection, AddPathEntry, Capability, CapabilitySet, GracefulRestartCap,
    GracefulRestartEntry, MultiprotocolCap, RestartFlags, Role,
};
use bgp_packet::open::OptionalParameter;

/// Builds the `CapabilitySet` we announce from a peer's static configuration.
pub fn announced_capabilities(config: &PeerConfig) -> CapabilitySet {
    CapabilitySet {
        multiprotocol: config.announced_multiprotocol,
        route_refresh: config.announced_route_refresh,
        enhanced_route_refresh: config.announced_enhanced_refresh,
        four_octet_as: config.announced_four_octet_as.then_some(config.local_as),
        add_path_recv: config.announced_add_path_recv,
        add_path_send: config.announced_add_path_send,
        graceful_restart: config.graceful_restart_time.map(|restart_time| {
            bgp_packet::caps::GracefulRestartState {
                restart_time,
                restarting: false,
                forward: config.announced_multiprotocol,
                restarting_aids: AidSet::empty(),
            }
        }),
        role: config.role,
    }
}

/// Renders an announced `CapabilitySet` into the OPEN optional-parameter list, in the wire
/// order spec §4.2 specifies: multiprotocol, route-refresh, role, graceful-restart,
/// four-octet AS, ADD-PATH, enhanced route-refresh.
pub fn encode_capabilities(set: &CapabilitySet, restarting: AidSet, is_ebgp: bool) -> Vec<OptionalParameter> {
    let mut caps = Vec::new();

    for aid in set.multiprotocol.iter() {
        let (afi, safi) = aid.afi_safi();
        caps.push(Capability::Multiprotocol(MultiprotocolCap { afi, safi }));
    }
    if set.route_refresh {
        caps.push(Capability::RouteRefresh);
    }
    if is_ebgp {
        if let Some(role) = set.role {
            if set.multiprotocol.contains(Aid::Inet) || set.multiprotocol.contains(Aid::Inet6) || set.multiprotocol.is_empty()
            {
                caps.push(Capability::Role(role));
            }
        }
    }
    if let Some(gr) = &set.graceful_restart {
        let flags = if restarting.is_empty() {
            RestartFlags::RESTARTING
        } else {
            RestartFlags::empty()
        };
        let entries = Aid::ALL
            .into_iter()
            .filter(|aid| gr.forward.contains(*aid))
            .map(|aid| {
                let (afi, safi) = aid.afi_safi();
                GracefulRestartEntry {
                    afi,
                    safi,
                    flags: if gr.forward.contains(aid) {
                        bgp_packet::caps::GracefulRestartAidFlags::FORWARD
                    } else {
                        bgp_packet::caps::GracefulRestartAidFlags::empty()
                    },
                }
            })
            .collect();
        caps.push(Capability::GracefulRestart(GracefulRestartCap {
            flags,
            restart_time: gr.restart_time,
            entries,
        }));
    }
    if let Some(asn) = set.four_octet_as {
        caps.push(Capability::FourOctetAs(asn));
    }
    let add_path_entries = add_path_entries(set);
    if !add_path_entries.is_empty() {
        caps.push(Capability::AddPath(add_path_entries));
    }
    if set.enhanced_route_refresh {
        caps.push(Capability::EnhancedRouteRefresh);
    }

    if caps.is_empty() {
        Vec::new()
    } else {
        vec![OptionalParameter::Capabilities(caps)]
    }
}

fn add_path_entries(set: &CapabilitySet) -> Vec<AddPathEntry> {
    Aid::ALL
        .into_iter()
        .filter_map(|aid| {
            let recv = set.add_path_recv.contains(aid);
            let send = set.add_path_send.contains(aid);
            if !recv && !send {
                return None;
            }
            let mut direction = AddPathDirection::empty();
            if recv {
                direction |= AddPathDirection::RECEIVE;
            }
            if send {
                direction |= AddPathDirection::SEND;
            }
            let (afi, safi) = aid.afi_safi();
            Some(AddPathEntry { afi, safi, direction })
        })
        .collect()
}

/// Parses the peer-announced `CapabilitySet` out of an OPEN's optional parameters.
pub fn parse_peer_capabilities(params: &[OptionalParameter]) -> CapabilitySet {
    let mut set = CapabilitySet::default();
    for param in params {
        let OptionalParameter::Capabilities(caps) = param else {
            continue;
        };
        for cap in caps {
            apply_capability(&mut set, cap);
        }
    }
    set
}

fn apply_capability(set: &mut CapabilitySet, cap: &Capability) {
    match cap {
        Capability::Multiprotocol(mp) => {
            if let Some(aid) = Aid::from_afi_safi(mp.afi, mp.safi) {
                set.multiprotocol.insert(aid);
            }
        }
        Capability::RouteRefresh => set.route_refresh = true,
        Capability::EnhancedRouteRefresh => set.enhanced_route_refresh = true,
        Capability::FourOctetAs(asn) => set.four_octet_as = Some(*asn),
        Capability::Role(role) => set.role = Some(*role),
        Capability::AddPath(entries) => {
            for entry in entries {
                if let Some(aid) = Aid::from_afi_safi(entry.afi, entry.safi) {
                    if entry.direction.contains(AddPathDirection::RECEIVE) {
                        set.add_path_recv.insert(aid);
                    }
                    if entry.direction.contains(AddPathDirection::SEND) {
                        set.add_path_send.insert(aid);
                    }
                }
            }
        }
        Capability::GracefulRestart(gr) => {
            let mut forward = AidSet::empty();
            for entry in &gr.entries {
                if let Some(aid) = Aid::from_afi_safi(entry.afi, entry.safi) {
                    if entry
                        .flags
                        .contains(bgp_packet::caps::GracefulRestartAidFlags::FORWARD)
                    {
                        forward.insert(aid);
                    }
                }
            }
            set.graceful_restart = Some(bgp_packet::caps::GracefulRestartState {
                restart_time: gr.restart_time,
                restarting: gr.flags.contains(RestartFlags::RESTARTING),
                forward,
                restarting_aids: AidSet::empty(),
            });
        }
        Capability::Unknown { .. } => {}
    }
}

/// RFC 9234 role-pair validation (spec §4.2): only on eBGP, only when both sides
/// announced a role. Returns `Err` when the pairing or strict-enforcement policy fails.
pub fn check_role(is_ebgp: bool, our_role: Option<Role>, peer_role: Option<Role>, strict: bool) -> Result<(), ()> {
    if !is_ebgp {
        return Ok(());
    }
    match (our_role, peer_role) {
        (Some(ours), Some(theirs)) => {
            if ours.required_peer_role() == Some(theirs) {
                Ok(())
            } else {
                Err(())
            }
        }
        (Some(_), None) if strict => Err(()),
        _ => Ok(()),
    }
}
