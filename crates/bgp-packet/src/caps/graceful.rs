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
    pub struct RestartFlags: u8 {
        /// R-bit: the sender has restarted its BGP process (RFC 4724 §3).
        const RESTARTING = 0b1000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GracefulRestartAidFlags: u8 {
        /// F-bit: forwarding state for this AID has been preserved.
        const FORWARD = 0b1000_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GracefulRestartEntry {
    pub afi: Afi,
    pub safi: Safi,
    pub flags: GracefulRestartAidFlags,
}

/// RFC 4724 graceful restart capability: a 2-octet header (4-bit restart flags, 12-bit
/// restart time) followed by zero or more per-AID entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GracefulRestartCap {
    pub flags: RestartFlags,
    pub restart_time: u16,
    pub entries: Vec<GracefulRestartEntry>,
}

impl GracefulRestartCap {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, header) = be_u16(input)?;
        let flags = RestartFlags::from_bits_truncate(((header >> 12) & 0xF) as u8);
        let restart_time = header & 0x0FFF;
        let (input, entries) = many0(Self::unpack_entry).parse(input)?;
        Ok((
            input,
            Self {
                flags,
                restart_time,
                entries,
            },
        ))
    }

    fn unpack_entry(input: &[u8]) -> IResult<&[u8], GracefulRestartEntry> {
        let (input, afi) = be_u16(input)?;
        let (input, safi) = be_u8(input)?;
        let (input, flag_byte) = be_u8(input)?;
        Ok((
            input,
            GracefulRestartEntry {
                afi,
                safi,
                flags: GracefulRestartAidFlags::from_bits_truncate(flag_byte),
            },
        ))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        let header = ((self.flags.bits() as u16) << 12) | (self.restart_time & 0x0FFF);
        buffer.extend_from_slice(&header.to_be_bytes());
        for entry in &self.entries {
            buffer.extend_from_slice(&entry.afi.to_be_bytes());
            buffer.push(entry.safi);
            buffer.push(entry.flags.bits());
        }
        buffer
    }
}
