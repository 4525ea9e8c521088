//! NOTIFICATION message (RFC 4271 §4.5) plus the errcode/subcode name tables used for
//! user-visible logging (spec §7) and the RFC 8203 shutdown-communication encoding.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use nom::{number::complete::be_u8, IResult};

pub const ERR_HEADER: u8 = 1;
pub const ERR_OPEN: u8 = 2;
pub const ERR_UPDATE: u8 = 3;
pub const ERR_HOLDTIMER_EXPIRED: u8 = 4;
pub const ERR_FSM: u8 = 5;
pub const ERR_CEASE: u8 = 6;
pub const ERR_ROUTE_REFRESH: u8 = 7;
pub const ERR_SENDHOLDTIMER_EXPIRED: u8 = 8;

pub const CEASE_ADMIN_SHUTDOWN: u8 = 2;
pub const CEASE_PEER_UNCONFIGURED: u8 = 3;
pub const CEASE_ADMIN_RESET: u8 = 4;
pub const CEASE_MAX_PREFIX: u8 = 1;

/// Maximum bytes of RFC 8203 shutdown-communication text carried in a CEASE
/// NOTIFICATION's data field.
pub const REASON_LEN: usize = 128;

#[derive(Ord, PartialOrd, Eq, PartialEq, Debug, Hash, Clone)]
pub struct NotificationMessage {
    pub error_code: u8,
    pub error_subcode: u8,
    pub data: Vec<u8>,
}

impl NotificationMessage {
    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, error_code) = be_u8(input)?;
        let (data, error_subcode) = be_u8(input)?;
        Ok((
            &[],
            Self {
                error_code,
                error_subcode,
                data: data.to_vec(),
            },
        ))
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(2 + self.data.len());
        buffer.push(self.error_code);
        buffer.push(self.error_subcode);
        buffer.extend_from_slice(&self.data);
        buffer
    }

    /// Builds a CEASE NOTIFICATION carrying an RFC 8203 shutdown-communication reason,
    /// truncated to [`REASON_LEN`] UTF-8 bytes (never splitting a multi-byte char).
    pub fn cease_with_reason(subcode: u8, reason: &str) -> Self {
        let mut truncated = reason;
        while truncated.len() > REASON_LEN {
            let mut end = REASON_LEN;
            while !truncated.is_char_boundary(end) {
                end -= 1;
            }
            truncated = &truncated[..end];
        }
        let mut data = Vec::with_capacity(1 + truncated.len());
        data.push(truncated.len() as u8);
        data.extend_from_slice(truncated.as_bytes());
        Self {
            error_code: ERR_CEASE,
            error_subcode: subcode,
            data,
        }
    }

    /// Recovers the shutdown-communication text from a CEASE notification's data field,
    /// if present and valid UTF-8.
    pub fn shutdown_reason(&self) -> Option<String> {
        if self.error_code != ERR_CEASE {
            return None;
        }
        let len = *self.data.first()? as usize;
        let text = self.data.get(1..1 + len)?;
        core::str::from_utf8(text).ok().map(|s| s.to_string())
    }
}

pub fn errcode_name(code: u8) -> &'static str {
    match code {
        ERR_HEADER => "MessageHeaderError",
        ERR_OPEN => "OpenMessageError",
        ERR_UPDATE => "UpdateMessageError",
        ERR_HOLDTIMER_EXPIRED => "HoldTimerExpired",
        ERR_FSM => "FiniteStateMachineError",
        ERR_CEASE => "Cease",
        ERR_ROUTE_REFRESH => "RouteRefreshMessageError",
        ERR_SENDHOLDTIMER_EXPIRED => "SendHoldTimerExpired",
        _ => "Unknown",
    }
}

pub fn subcode_name(code: u8, subcode: u8) -> &'static str {
    match (code, subcode) {
        (ERR_HEADER, 1) => "ConnectionNotSynchronized",
        (ERR_HEADER, 2) => "BadMessageLength",
        (ERR_HEADER, 3) => "BadMessageType",
        (ERR_OPEN, 1) => "UnsupportedVersionNumber",
        (ERR_OPEN, 2) => "BadPeerAS",
        (ERR_OPEN, 3) => "BadBGPIdentifier",
        (ERR_OPEN, 4) => "UnsupportedOptionalParameter",
        (ERR_OPEN, 6) => "UnacceptableHoldTime",
        (ERR_OPEN, 7) => "UnsupportedCapability",
        (ERR_OPEN, 11) => "RoleMismatch",
        (ERR_UPDATE, _) => "UpdateMessageError",
        (ERR_FSM, 1) => "UnexpectedMessageInOpenSent",
        (ERR_FSM, 2) => "UnexpectedMessageInOpenConfirm",
        (ERR_FSM, 3) => "UnexpectedMessageInEstablished",
        (ERR_CEASE, CEASE_MAX_PREFIX) => "MaximumNumberOfPrefixesReached",
        (ERR_CEASE, CEASE_ADMIN_SHUTDOWN) => "AdministrativeShutdown",
        (ERR_CEASE, CEASE_PEER_UNCONFIGURED) => "PeerDeConfigured",
        (ERR_CEASE, CEASE_ADMIN_RESET) => "AdministrativeReset",
        _ => "Unknown",
    }
}
