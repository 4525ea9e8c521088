use nom::{number::complete::be_u32, IResult};

/// RFC 6793 four-octet AS number capability: a single `u32` local AS.
pub fn unpack(input: &[u8]) -> IResult<&[u8], u32> {
    be_u32(input)
}
