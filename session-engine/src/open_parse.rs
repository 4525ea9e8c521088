//! `parse_open` (spec §4.6): OPEN-message semantic validation beyond the wire codec —
//! version, AS, hold-time, BGP-ID, template adoption, and capability/role negotiation.

use crate::cap;
use crate::peer::Peer;
use bgp_packet::caps::CapabilitySet;
use bgp_packet::open::OpenMessage;

const AS_TRANS: u16 = 23456;

pub type OpenFailure = (u8, u8, Vec<u8>);

pub fn parse_open(peer: &mut Peer, open: &OpenMessage) -> Result<CapabilitySet, OpenFailure> {
    if open.version != 4 {
        let data = vec![open.version.max(4).saturating_sub(4)];
        return Err((2, 1, data));
    }

    if open.hold_time == 1 || open.hold_time == 2 || open.hold_time < peer.config.min_holdtime {
        return Err((2, 6, open.hold_time.to_be_bytes().to_vec()));
    }

    if open.bgp_identifier == 0 {
        return Err((2, 3, Vec::new()));
    }

    if peer.config.template && peer.config.remote_as.is_none() {
        if open.autonomous_system != AS_TRANS {
            peer.config.remote_as = Some(open.autonomous_system as u32);
        }
    } else if let Some(remote_as) = peer.config.remote_as {
        if open.autonomous_system as u32 != remote_as {
            return Err((2, 2, Vec::new()));
        }
    }

    if !peer.config.is_ebgp() && open.bgp_identifier == peer.local_bgp_id {
        return Err((2, 3, Vec::new()));
    }

    let peer_caps = cap::parse_peer_capabilities(&open.optional_parameters);

    cap::check_role(
        peer.config.is_ebgp(),
        peer.capabilities.announced.role,
        peer_caps.role,
        peer.config.strict_role_enforcement,
    )
    .map_err(|_| (2u8, 11u8, Vec::new()))?;

    Ok(peer_caps)
}
