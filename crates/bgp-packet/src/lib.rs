//! BGP-4 wire codec: header framing, OPEN/capability negotiation, NOTIFICATION,
//! ROUTE-REFRESH and an opaque UPDATE passthrough (spec §4).
//!
//! `no_std` so the session engine can link it without pulling in libstd's allocator
//! assumptions; callers that want `std::io` glue should reach for the `std` feature.

#![no_std]

extern crate alloc;

pub mod caps;
pub mod error;
pub mod header;
pub mod notification;
pub mod open;
pub mod route_refresh;
pub mod update;

use alloc::vec::Vec;
pub use error::{HeaderError, OpenError};
pub use header::{parse_header, Header, MessageType, HEADER_LEN, MARKER, MAX_PKTSIZE};
pub use notification::NotificationMessage;
pub use open::OpenMessage;
pub use route_refresh::RouteRefreshMessage;
pub use update::UpdateMessage;

/// A fully parsed BGP message body, dispatched on the header's [`MessageType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BgpMessage {
    Open(OpenMessage),
    Update(UpdateMessage),
    Notification(NotificationMessage),
    KeepAlive,
    RouteRefresh(RouteRefreshMessage),
}

impl BgpMessage {
    /// Parses one complete on-the-wire message (header included). `input` must hold
    /// exactly `header.length` bytes, as already sliced off the peer's read buffer by
    /// the caller using [`parse_header`].
    pub fn unpack(header: Header, body: &[u8]) -> Result<Self, BgpMessageError> {
        match header.kind {
            MessageType::Open => {
                let (_, open) = OpenMessage::unpack(body).map_err(|_| BgpMessageError::Malformed(header.kind))?;
                Ok(Self::Open(open))
            }
            MessageType::Update => Ok(Self::Update(UpdateMessage::unpack(body))),
            MessageType::Notification => {
                let (_, notif) =
                    NotificationMessage::unpack(body).map_err(|_| BgpMessageError::Malformed(header.kind))?;
                Ok(Self::Notification(notif))
            }
            MessageType::KeepAlive => Ok(Self::KeepAlive),
            MessageType::RouteRefresh => {
                let (_, rr) =
                    RouteRefreshMessage::unpack(body).map_err(|_| BgpMessageError::Malformed(header.kind))?;
                Ok(Self::RouteRefresh(rr))
            }
        }
    }

    pub fn kind(&self) -> MessageType {
        match self {
            Self::Open(_) => MessageType::Open,
            Self::Update(_) => MessageType::Update,
            Self::Notification(_) => MessageType::Notification,
            Self::KeepAlive => MessageType::KeepAlive,
            Self::RouteRefresh(_) => MessageType::RouteRefresh,
        }
    }

    fn body(&self) -> Vec<u8> {
        match self {
            Self::Open(open) => open.pack(),
            Self::Update(update) => update.pack(),
            Self::Notification(notif) => notif.pack(),
            Self::KeepAlive => Vec::new(),
            Self::RouteRefresh(rr) => rr.pack(),
        }
    }

    /// Serializes the complete on-the-wire message, header included.
    pub fn pack(&self) -> Vec<u8> {
        let body = self.body();
        let mut out = Vec::with_capacity(HEADER_LEN as usize + body.len());
        header::emit_header(&mut out, self.kind(), body.len());
        out.extend(body);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgpMessageError {
    Header(HeaderError),
    Malformed(MessageType),
}

impl From<HeaderError> for BgpMessageError {
    fn from(e: HeaderError) -> Self {
        Self::Header(e)
    }
}
