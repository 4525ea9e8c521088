use crate::error::HeaderError;
use nom::{
    bytes::complete::{tag, take},
    number::complete::{be_u16, be_u8},
    IResult,
};

/// BGP message type octet (RFC 4271 §4.1).
#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone, Copy)]
pub enum MessageType {
    Open,
    Update,
    Notification,
    KeepAlive,
    RouteRefresh,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Open),
            2 => Some(Self::Update),
            3 => Some(Self::Notification),
            4 => Some(Self::KeepAlive),
            5 => Some(Self::RouteRefresh),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Open => 1,
            Self::Update => 2,
            Self::Notification => 3,
            Self::KeepAlive => 4,
            Self::RouteRefresh => 5,
        }
    }

    /// Per-type minimum total message length (marker + length + type + body), spec §4.1.
    pub fn min_length(self) -> u16 {
        match self {
            Self::Open => 29,
            Self::Update => 23,
            Self::Notification => 21,
            Self::KeepAlive => 19,
            Self::RouteRefresh => 23,
        }
    }
}

pub const MARKER: [u8; 16] = [0xFF; 16];
pub const HEADER_LEN: u16 = 19;
pub const MAX_PKTSIZE: u16 = 4096;

/// Parsed 19-octet header: total message length and the message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub length: u16,
    pub kind: MessageType,
}

/// Validates and parses the fixed 19-octet BGP header. `max_pktsize` lets a caller that
/// negotiated RFC 8654 extended messages raise the ceiling; pass [`MAX_PKTSIZE`] otherwise.
pub fn parse_header(input: &[u8], max_pktsize: u16) -> Result<Header, HeaderError> {
    fn raw(input: &[u8]) -> IResult<&[u8], (u16, u8)> {
        let (input, _marker) = take(16usize)(input)?;
        let (input, length) = be_u16(input)?;
        let (input, kind) = be_u8(input)?;
        Ok((input, (length, kind)))
    }

    if input.len() < HEADER_LEN as usize {
        return Err(HeaderError::BadLength(input.len() as u16));
    }
    if tag::<_, _, nom::error::Error<&[u8]>>(&MARKER[..])(input).is_err() {
        return Err(HeaderError::BadMarker);
    }

    let (_, (length, kind_byte)) = raw(input).map_err(|_| HeaderError::BadMarker)?;
    let kind = MessageType::from_byte(kind_byte).ok_or(HeaderError::BadType(kind_byte))?;

    if length < HEADER_LEN || length > max_pktsize || length < kind.min_length() {
        return Err(HeaderError::BadLength(length));
    }
    if kind == MessageType::KeepAlive && length != HEADER_LEN {
        return Err(HeaderError::BadLength(length));
    }

    Ok(Header { length, kind })
}

/// Writes the 19-octet header for a body of `body_len` bytes of the given type.
pub fn emit_header(out: &mut alloc::vec::Vec<u8>, kind: MessageType, body_len: usize) {
    out.extend_from_slice(&MARKER);
    out.extend_from_slice(&((HEADER_LEN as usize + body_len) as u16).to_be_bytes());
    out.push(kind.to_byte());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_marker() {
        let mut bytes = [0xFFu8; 19];
        bytes[15] = 0x00;
        assert_eq!(parse_header(&bytes, MAX_PKTSIZE), Err(HeaderError::BadMarker));
    }

    #[test]
    fn rejects_short_length() {
        let mut bytes = [0xFFu8; 19];
        bytes[16] = 0;
        bytes[17] = 18;
        bytes[18] = 4;
        assert_eq!(parse_header(&bytes, MAX_PKTSIZE), Err(HeaderError::BadLength(18)));
    }

    #[test]
    fn rejects_unknown_type() {
        let mut bytes = [0xFFu8; 19];
        bytes[16] = 0;
        bytes[17] = 19;
        bytes[18] = 9;
        assert_eq!(parse_header(&bytes, MAX_PKTSIZE), Err(HeaderError::BadType(9)));
    }

    #[test]
    fn accepts_keepalive() {
        let mut bytes = [0xFFu8; 19];
        bytes[16] = 0;
        bytes[17] = 19;
        bytes[18] = 4;
        let header = parse_header(&bytes, MAX_PKTSIZE).unwrap();
        assert_eq!(header.length, 19);
        assert_eq!(header.kind, MessageType::KeepAlive);
    }

    #[test]
    fn rejects_open_below_minimum() {
        let mut bytes = [0xFFu8; 19];
        bytes[16] = 0;
        bytes[17] = 20;
        bytes[18] = 1;
        assert_eq!(parse_header(&bytes, MAX_PKTSIZE), Err(HeaderError::BadLength(20)));
    }
}
