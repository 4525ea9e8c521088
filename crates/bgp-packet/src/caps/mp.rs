use alloc::vec::Vec;
use bgp_common::{Afi, Safi};
use nom::{
    number::complete::{be_u16, be_u8},
    IResult,
};

/// RFC 4760 multiprotocol extensions capability: `afi:u16 reserved:u8 safi:u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiprotocolCap {
    pub afi: Afi,
    pub safi: Safi,
}

impl MultiprotocolCap {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, afi) = be_u16(input)?;
        let (input, _reserved) = be_u8(input)?;
        let (input, safi) = be_u8(input)?;
        Ok((input, Self { afi, safi }))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(4);
        buffer.extend_from_slice(&self.afi.to_be_bytes());
        buffer.push(0);
        buffer.push(self.safi);
        buffer
    }
}
