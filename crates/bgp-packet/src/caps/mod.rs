//! Capability codec (spec §4.2): serialization of capabilities announced in the OPEN
//! message's optional parameters, parsing of the peer's announced set, and the
//! announced/peer -> negotiated reduction.

pub mod addpath;
pub mod as4;
pub mod graceful;
pub mod mp;
pub mod role;

use alloc::vec::Vec;
use bgp_common::{Aid, AidSet};
use nom::{
    bytes::complete::take,
    number::complete::be_u8,
    IResult,
};

pub use addpath::{AddPathDirection, AddPathEntry};
pub use graceful::{GracefulRestartCap, GracefulRestartEntry};
pub use mp::MultiprotocolCap;
pub use role::Role;

pub const CODE_MULTIPROTOCOL: u8 = 1;
pub const CODE_ROUTE_REFRESH: u8 = 2;
pub const CODE_ROLE: u8 = 9;
pub const CODE_GRACEFUL_RESTART: u8 = 64;
pub const CODE_FOUR_OCTET_AS: u8 = 65;
pub const CODE_ADD_PATH: u8 = 69;
pub const CODE_ENHANCED_ROUTE_REFRESH: u8 = 70;

/// A single capability, RFC 3392/4760/2918/7313/4724/6793/7911/9234.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Multiprotocol(MultiprotocolCap),
    RouteRefresh,
    Role(Role),
    GracefulRestart(GracefulRestartCap),
    FourOctetAs(u32),
    AddPath(Vec<AddPathEntry>),
    EnhancedRouteRefresh,
    Unknown { code: u8, data: Vec<u8> },
}

impl Capability {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, code) = be_u8(input)?;
        let (input, length) = be_u8(input)?;
        let (input, data) = take(length as usize)(input)?;
        let cap = match code {
            CODE_MULTIPROTOCOL => Self::Multiprotocol(MultiprotocolCap::unpack(data)?.1),
            CODE_ROUTE_REFRESH => Self::RouteRefresh,
            CODE_ROLE => Self::Role(Role::unpack(data)?.1),
            CODE_GRACEFUL_RESTART => Self::GracefulRestart(GracefulRestartCap::unpack(data)?.1),
            CODE_FOUR_OCTET_AS => Self::FourOctetAs(as4::unpack(data)?.1),
            CODE_ADD_PATH => Self::AddPath(addpath::unpack_many(data)?.1),
            CODE_ENHANCED_ROUTE_REFRESH => Self::EnhancedRouteRefresh,
            _ => Self::Unknown { code, data: data.to_vec() },
        };
        Ok((input, cap))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        match self {
            Self::Multiprotocol(cap) => push_tlv(&mut buffer, CODE_MULTIPROTOCOL, &cap.pack()),
            Self::RouteRefresh => push_tlv(&mut buffer, CODE_ROUTE_REFRESH, &[]),
            Self::Role(role) => push_tlv(&mut buffer, CODE_ROLE, &role.pack()),
            Self::GracefulRestart(cap) => push_tlv(&mut buffer, CODE_GRACEFUL_RESTART, &cap.pack()),
            Self::FourOctetAs(asn) => push_tlv(&mut buffer, CODE_FOUR_OCTET_AS, &asn.to_be_bytes()),
            Self::AddPath(entries) => {
                let mut data = Vec::new();
                for entry in entries {
                    data.extend(entry.pack());
                }
                push_tlv(&mut buffer, CODE_ADD_PATH, &data);
            }
            Self::EnhancedRouteRefresh => push_tlv(&mut buffer, CODE_ENHANCED_ROUTE_REFRESH, &[]),
            Self::Unknown { code, data } => push_tlv(&mut buffer, *code, data),
        }
        buffer
    }
}

fn push_tlv(buffer: &mut Vec<u8>, code: u8, data: &[u8]) {
    buffer.push(code);
    buffer.push(data.len() as u8);
    buffer.extend_from_slice(data);
}

/// The three parallel capability shapes tracked per peer (spec §3): what we announce,
/// what the peer announced, and the negotiated intersection.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    pub multiprotocol: AidSet,
    pub route_refresh: bool,
    pub enhanced_route_refresh: bool,
    pub four_octet_as: Option<u32>,
    pub add_path_recv: AidSet,
    pub add_path_send: AidSet,
    pub graceful_restart: Option<GracefulRestartState>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default)]
pub struct GracefulRestartState {
    pub restart_time: u16,
    pub restarting: bool,
    /// Per-AID forward-preserving flag, as advertised (by us) or received (from the peer).
    pub forward: AidSet,
    /// Per-AID state currently considered RESTARTING by this engine (spec §3: PRESENT/
    /// FORWARD/RESTART/RESTARTING).
    pub restarting_aids: AidSet,
}

/// Computes the negotiated capability set from what we announced and what the peer
/// announced, per spec §4.2 "Negotiated computation". `previous` is the graceful-restart
/// state negotiated before this OPEN, if any (carried across a restart-window reconnect).
pub fn negotiate(
    announced: &CapabilitySet,
    peer: &CapabilitySet,
    previous: Option<&GracefulRestartState>,
) -> CapabilitySet {
    let mut negotiated = CapabilitySet {
        multiprotocol: announced.multiprotocol.intersection(peer.multiprotocol),
        route_refresh: announced.route_refresh && peer.route_refresh,
        enhanced_route_refresh: announced.enhanced_route_refresh && peer.enhanced_route_refresh,
        four_octet_as: match (announced.four_octet_as, peer.four_octet_as) {
            (Some(_), Some(peer_as)) => Some(peer_as),
            _ => None,
        },
        add_path_recv: AidSet::empty(),
        add_path_send: AidSet::empty(),
        graceful_restart: negotiate_graceful_restart(
            announced.graceful_restart.as_ref(),
            peer.graceful_restart.as_ref(),
            previous,
        ),
        role: None,
    };

    if negotiated.multiprotocol.is_empty() && announced.multiprotocol.is_empty() && peer.multiprotocol.is_empty() {
        negotiated.multiprotocol.insert(Aid::Inet);
    }

    for aid in Aid::ALL {
        // Our RECV is accepted iff we announced RECV and the peer announced SEND.
        if announced.add_path_recv.contains(aid) && peer.add_path_send.contains(aid) {
            negotiated.add_path_recv.insert(aid);
        }
        // Our SEND is accepted iff we announced SEND and the peer announced RECV.
        if announced.add_path_send.contains(aid) && peer.add_path_recv.contains(aid) {
            negotiated.add_path_send.insert(aid);
        }
    }

    negotiated
}

/// Graceful-restart half of `negotiate` (spec §4.2): both sides must have offered GR at
/// all; RESTARTING survives a reconnect only where the peer still forwards-preserves the
/// AID, otherwise it's cleared so the caller knows to flush that AID's stale routes.
fn negotiate_graceful_restart(
    announced: Option<&GracefulRestartState>,
    peer: Option<&GracefulRestartState>,
    previous: Option<&GracefulRestartState>,
) -> Option<GracefulRestartState> {
    let (_announced, peer) = (announced?, peer?);
    let mut restarting_aids = AidSet::empty();
    if let Some(previous) = previous {
        for aid in Aid::ALL {
            if previous.restarting_aids.contains(aid) && peer.forward.contains(aid) {
                restarting_aids.insert(aid);
            }
        }
    }
    Some(GracefulRestartState {
        restart_time: peer.restart_time,
        restarting: peer.restarting,
        forward: peer.forward,
        restarting_aids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_intersects_refresh_and_mp() {
        let mut a = CapabilitySet::default();
        a.route_refresh = true;
        a.multiprotocol.insert(Aid::Inet);
        a.multiprotocol.insert(Aid::Inet6);

        let mut p = CapabilitySet::default();
        p.route_refresh = true;
        p.multiprotocol.insert(Aid::Inet6);

        let n = negotiate(&a, &p, None);
        assert!(n.route_refresh);
        assert!(!n.multiprotocol.contains(Aid::Inet));
        assert!(n.multiprotocol.contains(Aid::Inet6));
    }

    #[test]
    fn negotiate_implies_ipv4_unicast_when_neither_side_announces_mp() {
        let a = CapabilitySet::default();
        let p = CapabilitySet::default();
        let n = negotiate(&a, &p, None);
        assert!(n.multiprotocol.contains(Aid::Inet));
    }

    #[test]
    fn negotiate_addpath_directions() {
        let mut a = CapabilitySet::default();
        a.add_path_recv.insert(Aid::Inet);
        let mut p = CapabilitySet::default();
        p.add_path_send.insert(Aid::Inet);
        p.add_path_recv.insert(Aid::Inet);

        let n = negotiate(&a, &p, None);
        assert!(n.add_path_recv.contains(Aid::Inet));
        assert!(!n.add_path_send.contains(Aid::Inet));
    }

    #[test]
    fn negotiate_graceful_restart_requires_both_sides() {
        let mut a = CapabilitySet::default();
        a.graceful_restart = Some(GracefulRestartState {
            restart_time: 120,
            restarting: false,
            forward: {
                let mut set = AidSet::empty();
                set.insert(Aid::Inet);
                set
            },
            restarting_aids: AidSet::empty(),
        });
        let p = CapabilitySet::default();

        let n = negotiate(&a, &p, None);
        assert!(n.graceful_restart.is_none());
    }

    #[test]
    fn negotiate_graceful_restart_keeps_restarting_only_while_peer_still_forwards() {
        let mut forward = AidSet::empty();
        forward.insert(Aid::Inet);

        let mut a = CapabilitySet::default();
        a.graceful_restart = Some(GracefulRestartState {
            restart_time: 120,
            restarting: false,
            forward,
            restarting_aids: AidSet::empty(),
        });
        let mut p = CapabilitySet::default();
        p.graceful_restart = Some(GracefulRestartState {
            restart_time: 120,
            restarting: false,
            forward,
            restarting_aids: AidSet::empty(),
        });

        let mut previous_restarting = AidSet::empty();
        previous_restarting.insert(Aid::Inet);
        let previous = GracefulRestartState {
            restart_time: 120,
            restarting: false,
            forward,
            restarting_aids: previous_restarting,
        };

        let kept = negotiate(&a, &p, Some(&previous));
        assert!(kept.graceful_restart.unwrap().restarting_aids.contains(Aid::Inet));

        p.graceful_restart.as_mut().unwrap().forward = AidSet::empty();
        let cleared = negotiate(&a, &p, Some(&previous));
        assert!(!cleared.graceful_restart.unwrap().restarting_aids.contains(Aid::Inet));
    }
}
