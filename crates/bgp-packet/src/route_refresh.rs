//! ROUTE-REFRESH message (RFC 2918) with the RFC 7313 enhanced-refresh subtype octet.

use alloc::vec::Vec;
use bgp_common::{Afi, Safi};
use nom::{
    number::complete::{be_u16, be_u8},
    IResult,
};

/// RFC 7313 §3 subtypes, carried in the byte RFC 2918 reserved for future use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshSubtype {
    Normal,
    BeginOfRoute,
    EndOfRoute,
    Unknown(u8),
}

impl RefreshSubtype {
    fn from_byte(byte: u8) -> Self {
        match byte {
            0 => RefreshSubtype::Normal,
            1 => RefreshSubtype::BeginOfRoute,
            2 => RefreshSubtype::EndOfRoute,
            other => RefreshSubtype::Unknown(other),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            RefreshSubtype::Normal => 0,
            RefreshSubtype::BeginOfRoute => 1,
            RefreshSubtype::EndOfRoute => 2,
            RefreshSubtype::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRefreshMessage {
    pub afi: Afi,
    pub subtype: RefreshSubtype,
    pub safi: Safi,
}

impl RouteRefreshMessage {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, afi) = be_u16(input)?;
        let (input, subtype) = be_u8(input)?;
        let (input, safi) = be_u8(input)?;
        Ok((
            input,
            Self {
                afi,
                subtype: RefreshSubtype::from_byte(subtype),
                safi,
            },
        ))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(4);
        buffer.extend_from_slice(&self.afi.to_be_bytes());
        buffer.push(self.subtype.to_byte());
        buffer.push(self.safi);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgp_common::AFI_IPV4;

    #[test]
    fn route_refresh_roundtrip() {
        let msg = RouteRefreshMessage {
            afi: AFI_IPV4,
            subtype: RefreshSubtype::BeginOfRoute,
            safi: 1,
        };
        let bytes = msg.pack();
        let (rest, parsed) = RouteRefreshMessage::unpack(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, msg);
    }
}
