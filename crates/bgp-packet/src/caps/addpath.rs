use alloc::vec::Vec;
use bgp_common::{Afi, Safi};
use bitflags::bitflags;
use nom::{
    multi::many0,
    number::complete::{be_u16, be_u8},
    IResult, Parser,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AddPathDirection: u8 {
        const RECEIVE = 0b01;
        const SEND = 0b10;
    }
}

/// RFC 7911 ADD-PATH capability entry: `afi:u16 safi:u8 flags:u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddPathEntry {
    pub afi: Afi,
    pub safi: Safi,
    pub direction: AddPathDirection,
}

impl AddPathEntry {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, afi) = be_u16(input)?;
        let (input, safi) = be_u8(input)?;
        let (input, flags) = be_u8(input)?;
        Ok((
            input,
            Self {
                afi,
                safi,
                direction: AddPathDirection::from_bits_truncate(flags),
            },
        ))
    }

    pub fn pack(&self) -> [u8; 4] {
        let mut out = [0u8; 4];
        out[0..2].copy_from_slice(&self.afi.to_be_bytes());
        out[2] = self.safi;
        out[3] = self.direction.bits();
        out
    }
}

pub fn unpack_many(input: &[u8]) -> IResult<&[u8], Vec<AddPathEntry>> {
    many0(AddPathEntry::unpack).parse(input)
}
