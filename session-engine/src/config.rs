//! The engine's configuration surface: typed structs carried over the reconfiguration
//! protocol (spec §6), never parsed from a file by this crate (spec §1 Non-goals).

use bgp_common::{Aid, AidSet, Prefix};
use bgp_packet::caps::Role;
use std::net::{IpAddr, SocketAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    Md5,
    Ipsec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconfAction {
    #[default]
    None,
    Keep,
    Reinit,
    Delete,
}

/// Global, engine-wide settings supplied as `ReconfConf` (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConfig {
    pub local_as: u32,
    pub router_id: IpAddr,
    pub hold_cloned: std::time::Duration,
}

/// Per-peer configuration, supplied as `ReconfPeer`. Also used, with `remote_addr` absent,
/// as a template matched against inbound connections from unconfigured addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerConfig {
    pub peer_id: u32,
    pub template: bool,
    pub template_prefix: Option<Prefix>,
    pub remote_addr: Option<IpAddr>,
    pub local_addr: Option<IpAddr>,
    pub remote_as: Option<u32>,
    pub local_as: u32,
    pub passive: bool,
    pub hold_time: u16,
    /// §11 supplemented feature: a peer-specific floor above the protocol minimum of 3.
    pub min_holdtime: u16,
    pub ttl_security: bool,
    pub ttl: u8,
    pub auth: AuthMethod,
    pub role: Option<Role>,
    pub strict_role_enforcement: bool,
    pub announced_multiprotocol: AidSet,
    pub announced_route_refresh: bool,
    pub announced_enhanced_refresh: bool,
    pub announced_four_octet_as: bool,
    pub announced_add_path_recv: AidSet,
    pub announced_add_path_send: AidSet,
    pub graceful_restart_time: Option<u16>,
}

impl PeerConfig {
    pub fn is_ebgp(&self) -> bool {
        match self.remote_as {
            Some(remote_as) => remote_as != self.local_as,
            None => true,
        }
    }

    /// Whether `candidate` falls inside this template's matched prefix (best-prefix
    /// matching against inbound connections from unconfigured IPs, spec §4.5).
    pub fn matches_template(&self, candidate: IpAddr) -> bool {
        let Some(prefix) = self.template_prefix else {
            return false;
        };
        match (prefix.address, candidate) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX.checked_shl(32 - prefix.mask as u32).unwrap_or(0);
                (u32::from(net) & mask) == (u32::from(addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX.checked_shl(128 - prefix.mask as u32).unwrap_or(0);
                (u128::from(net) & mask) == (u128::from(addr) & mask)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListenerConfig {
    pub bind_addr: SocketAddr,
    pub action: ReconfAction,
}

/// A distinct TLV each AID can be in during the graceful-restart reconstruction window
/// (spec §3 "PRESENT/FORWARD/RESTART/RESTARTING").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GracefulAidState {
    Present,
    Forward,
    Restart,
    Restarting,
}

pub fn default_aid_set_unicast_v4() -> AidSet {
    let mut set = AidSet::empty();
    set.insert(Aid::Inet);
    set
}
