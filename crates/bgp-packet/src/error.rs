use thiserror::Error;

/// Header-level parse failures (spec §4.1). Every variant forces the peer FSM event
/// `ConFatal` after at most one NOTIFICATION is sent.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    #[error("marker octet is not all-ones")]
    BadMarker,
    #[error("length {0} is below the 19-octet minimum, above MAX_PKTSIZE, or below the per-type minimum")]
    BadLength(u16),
    #[error("unknown message type {0}")]
    BadType(u8),
}

impl HeaderError {
    /// (errcode, subcode) exactly as transmitted in the NOTIFICATION, per RFC 4271 §4.5.
    pub fn notification_code(self) -> (u8, u8) {
        match self {
            HeaderError::BadMarker => (1, 1),
            HeaderError::BadLength(_) => (1, 2),
            HeaderError::BadType(_) => (1, 3),
        }
    }

    /// The data field to attach to the NOTIFICATION: the raw length field (network byte
    /// order) for `BadLength`, the offending type byte for `BadType`, empty otherwise.
    pub fn notification_data(self) -> alloc::vec::Vec<u8> {
        match self {
            HeaderError::BadMarker => alloc::vec::Vec::new(),
            HeaderError::BadLength(len) => len.to_be_bytes().to_vec(),
            HeaderError::BadType(kind) => alloc::vec![kind],
        }
    }
}

/// OPEN-message parse/validation failures (spec §4.6).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OpenError {
    #[error("unsupported version {got}")]
    Version { got: u8 },
    #[error("AS number mismatch")]
    BadPeerAs,
    #[error("unacceptable hold-time {0}")]
    BadHoldtime(u16),
    #[error("zero or colliding BGP identifier")]
    BadBgpId,
    #[error("malformed optional parameter")]
    OptParam,
    #[error("unsupported or malformed capability")]
    Capability,
    #[error("open policy role mismatch or missing")]
    Role,
    #[error("authentication failure")]
    Auth,
}

impl OpenError {
    pub fn notification_code(&self) -> (u8, u8) {
        match self {
            OpenError::Version { .. } => (2, 1),
            OpenError::BadPeerAs => (2, 2),
            OpenError::BadHoldtime(_) => (2, 6),
            OpenError::BadBgpId => (2, 3),
            OpenError::OptParam => (2, 4),
            OpenError::Capability => (2, 7),
            OpenError::Role => (2, 11),
            OpenError::Auth => (2, 5),
        }
    }
}
