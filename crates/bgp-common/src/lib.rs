#![no_std]
extern crate alloc;

pub mod macros;

use alloc::string::{String, ToString};
use core::{
    fmt::{Debug, Display, Formatter},
    net::{AddrParseError, IpAddr, Ipv4Addr, Ipv6Addr},
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("expected format <address>/<mask> (e.g. 192.168.2.0/24), got '{0}'")]
    InvalidPrefixFormat(String),
    #[error("unable to parse address '{0}'")]
    IpAddrParse(#[from] AddrParseError),
    #[error("unable to parse int '{0}'")]
    IntParse(#[from] ParseIntError),
}

/// An IPv4 or IPv6 network prefix: address plus mask length.
#[derive(Ord, PartialOrd, Eq, PartialEq, Hash, Clone, Copy)]
pub struct Prefix {
    pub address: IpAddr,
    pub mask: u8,
}

impl FromStr for Prefix {
    type Err = CommonError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let (addr, mask) = string
            .split_once('/')
            .ok_or_else(|| CommonError::InvalidPrefixFormat(string.to_string()))?;
        Ok(Self {
            address: IpAddr::from_str(addr)?,
            mask: mask.parse()?,
        })
    }
}

impl Debug for Prefix {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> core::fmt::Result {
        write!(formatter, "{}/{}", self.address, self.mask)
    }
}

impl Display for Prefix {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> core::fmt::Result {
        write!(formatter, "{}/{}", self.address, self.mask)
    }
}

impl Prefix {
    pub const ANY_IPV4: Prefix = Prefix {
        address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
        mask: 0,
    };
    pub const ANY_IPV6: Prefix = Prefix {
        address: IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 0)),
        mask: 0,
    };
}

/// IANA Address Family Identifier (16-bit, on the wire).
pub type Afi = u16;
/// IANA Subsequent Address Family Identifier (8-bit, on the wire).
pub type Safi = u8;

pub const AFI_IPV4: Afi = 1;
pub const AFI_IPV6: Afi = 2;
pub const SAFI_UNICAST: Safi = 1;
pub const SAFI_MPLS_VPN: Safi = 128;

/// Address-family identifier: the engine's internal enumeration combining AFI and SAFI
/// into a single compact value so capability bitmaps and per-AID state can be indexed by
/// it directly instead of carrying the wire (afi, safi) pair everywhere.
#[derive(Ord, PartialOrd, Eq, PartialEq, Hash, Clone, Copy, Debug)]
pub enum Aid {
    Inet,
    Inet6,
    VpnInet,
    VpnInet6,
}

impl Aid {
    /// Every AID known to this engine, in a stable order used for array indexing.
    pub const ALL: [Aid; 4] = [Aid::Inet, Aid::Inet6, Aid::VpnInet, Aid::VpnInet6];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        match self {
            Aid::Inet => 0,
            Aid::Inet6 => 1,
            Aid::VpnInet => 2,
            Aid::VpnInet6 => 3,
        }
    }

    pub fn from_afi_safi(afi: Afi, safi: Safi) -> Option<Aid> {
        match (afi, safi) {
            (AFI_IPV4, SAFI_UNICAST) => Some(Aid::Inet),
            (AFI_IPV6, SAFI_UNICAST) => Some(Aid::Inet6),
            (AFI_IPV4, SAFI_MPLS_VPN) => Some(Aid::VpnInet),
            (AFI_IPV6, SAFI_MPLS_VPN) => Some(Aid::VpnInet6),
            _ => None,
        }
    }

    pub fn afi_safi(self) -> (Afi, Safi) {
        match self {
            Aid::Inet => (AFI_IPV4, SAFI_UNICAST),
            Aid::Inet6 => (AFI_IPV6, SAFI_UNICAST),
            Aid::VpnInet => (AFI_IPV4, SAFI_MPLS_VPN),
            Aid::VpnInet6 => (AFI_IPV6, SAFI_MPLS_VPN),
        }
    }
}

impl Display for Aid {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Aid::Inet => "IPv4 unicast",
            Aid::Inet6 => "IPv6 unicast",
            Aid::VpnInet => "VPNv4 unicast",
            Aid::VpnInet6 => "VPNv6 unicast",
        };
        write!(formatter, "{name}")
    }
}

/// A bitmap over every known [`Aid`], used for multiprotocol/ADD-PATH capability sets.
#[derive(Eq, PartialEq, Hash, Clone, Copy, Default, Debug)]
pub struct AidSet(u8);

impl AidSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, aid: Aid) -> bool {
        self.0 & (1 << aid.index()) != 0
    }

    pub fn insert(&mut self, aid: Aid) {
        self.0 |= 1 << aid.index();
    }

    pub fn remove(&mut self, aid: Aid) {
        self.0 &= !(1 << aid.index());
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = Aid> {
        Aid::ALL.into_iter().filter(move |aid| self.contains(*aid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_roundtrip_display() {
        let p: Prefix = "192.168.100.0/24".parse().unwrap();
        assert_eq!(p.to_string(), "192.168.100.0/24");
    }

    #[test]
    fn aid_set_intersection() {
        let mut a = AidSet::empty();
        a.insert(Aid::Inet);
        a.insert(Aid::Inet6);
        let mut b = AidSet::empty();
        b.insert(Aid::Inet6);
        let both = a.intersection(b);
        assert!(!both.contains(Aid::Inet));
        assert!(both.contains(Aid::Inet6));
    }

    #[test]
    fn aid_afi_safi_roundtrip() {
        for aid in Aid::ALL {
            let (afi, safi) = aid.afi_safi();
            assert_eq!(Aid::from_afi_safi(afi, safi), Some(aid));
        }
    }
}
