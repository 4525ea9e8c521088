//! OPEN message (spec §4.6) and its optional-parameters framing (spec §4.2, RFC 9072).

use crate::caps::Capability;
use alloc::vec::Vec;
use nom::{
    bytes::complete::take,
    multi::many0,
    number::complete::{be_u16, be_u32, be_u8},
    IResult, Parser,
};

pub const OPT_PARAM_CAPABILITIES: u8 = 2;
pub const OPT_PARAM_EXT_LEN: u8 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionalParameter {
    Capabilities(Vec<Capability>),
    Unknown { kind: u8, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenMessage {
    pub version: u8,
    pub autonomous_system: u16,
    pub hold_time: u16,
    pub bgp_identifier: u32,
    pub optional_parameters: Vec<OptionalParameter>,
}

impl OpenMessage {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, version) = be_u8(input)?;
        let (input, autonomous_system) = be_u16(input)?;
        let (input, hold_time) = be_u16(input)?;
        let (input, bgp_identifier) = be_u32(input)?;
        let (input, optparamlen) = be_u8(input)?;
        let (input, raw_params) = take(optparamlen as usize)(input)?;

        let optional_parameters = if optparamlen == OPT_PARAM_EXT_LEN && starts_with_ext_marker(raw_params) {
            parse_extended_params(raw_params)?
        } else {
            many0(parse_classical_param).parse(raw_params)?.1
        };

        Ok((
            input,
            Self {
                version,
                autonomous_system,
                hold_time,
                bgp_identifier,
                optional_parameters,
            },
        ))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.push(self.version);
        buffer.extend_from_slice(&self.autonomous_system.to_be_bytes());
        buffer.extend_from_slice(&self.hold_time.to_be_bytes());
        buffer.extend_from_slice(&self.bgp_identifier.to_be_bytes());

        let classical = pack_classical(&self.optional_parameters);
        if classical.len() + 2 >= OPT_PARAM_EXT_LEN as usize {
            let extended = pack_extended(&self.optional_parameters);
            buffer.push(OPT_PARAM_EXT_LEN);
            buffer.extend(extended);
        } else {
            buffer.push(classical.len() as u8);
            buffer.extend(classical);
        }
        buffer
    }
}

fn starts_with_ext_marker(params: &[u8]) -> bool {
    params.first() == Some(&OPT_PARAM_EXT_LEN)
}

fn parse_classical_param(input: &[u8]) -> IResult<&[u8], OptionalParameter> {
    let (input, kind) = be_u8(input)?;
    let (input, length) = be_u8(input)?;
    let (input, data) = take(length as usize)(input)?;
    Ok((input, dispatch_param(kind, data)?))
}

fn parse_extended_params(params: &[u8]) -> IResult<&[u8], Vec<OptionalParameter>> {
    let (rest, _marker_kind) = be_u8(params)?;
    let (rest, _ext_len) = be_u16(rest)?;
    many0(parse_extended_param).parse(rest)
}

fn parse_extended_param(input: &[u8]) -> IResult<&[u8], OptionalParameter> {
    let (input, kind) = be_u8(input)?;
    let (input, length) = be_u16(input)?;
    let (input, data) = take(length as usize)(input)?;
    Ok((input, dispatch_param(kind, data)?))
}

fn dispatch_param(kind: u8, data: &[u8]) -> Result<OptionalParameter, nom::Err<nom::error::Error<&[u8]>>> {
    Ok(match kind {
        OPT_PARAM_CAPABILITIES => OptionalParameter::Capabilities(many0(Capability::unpack).parse(data)?.1),
        _ => OptionalParameter::Unknown { kind, data: data.to_vec() },
    })
}

fn pack_classical(params: &[OptionalParameter]) -> Vec<u8> {
    let mut buffer = Vec::new();
    for param in params {
        let (kind, data) = param_kind_and_data(param);
        buffer.push(kind);
        buffer.push(data.len() as u8);
        buffer.extend(data);
    }
    buffer
}

fn pack_extended(params: &[OptionalParameter]) -> Vec<u8> {
    let mut inner = Vec::new();
    for param in params {
        let (kind, data) = param_kind_and_data(param);
        inner.push(kind);
        inner.extend_from_slice(&(data.len() as u16).to_be_bytes());
        inner.extend(data);
    }

    let mut buffer = Vec::new();
    buffer.push(OPT_PARAM_EXT_LEN);
    buffer.extend_from_slice(&(inner.len() as u16).to_be_bytes());
    buffer.extend(inner);
    buffer
}

fn param_kind_and_data(param: &OptionalParameter) -> (u8, Vec<u8>) {
    match param {
        OptionalParameter::Capabilities(caps) => {
            let mut data = Vec::new();
            for cap in caps {
                data.extend(cap.pack());
            }
            (OPT_PARAM_CAPABILITIES, data)
        }
        OptionalParameter::Unknown { kind, data } => (*kind, data.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caps::Capability;
    use alloc::vec;

    #[test]
    fn open_roundtrip_classical() {
        let open = OpenMessage {
            version: 4,
            autonomous_system: 65001,
            hold_time: 90,
            bgp_identifier: 0x0A000001,
            optional_parameters: vec![OptionalParameter::Capabilities(vec![
                Capability::RouteRefresh,
                Capability::FourOctetAs(65001),
            ])],
        };
        let bytes = open.pack();
        let (rest, parsed) = OpenMessage::unpack(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, open);
    }

    #[test]
    fn open_roundtrip_extended_when_large() {
        let many_unknown = (0..40)
            .map(|i| Capability::Unknown { code: 200, data: vec![i; 6] })
            .collect::<Vec<_>>();
        let open = OpenMessage {
            version: 4,
            autonomous_system: 65001,
            hold_time: 90,
            bgp_identifier: 0x0A000001,
            optional_parameters: vec![OptionalParameter::Capabilities(many_unknown)],
        };
        let bytes = open.pack();
        assert_eq!(bytes[9], OPT_PARAM_EXT_LEN);
        let (rest, parsed) = OpenMessage::unpack(&bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, open);
    }
}
