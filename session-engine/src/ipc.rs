//! IPC bridge (spec §6): the framed typed envelope exchanged with the parent supervisor
//! and the RDE sibling process. Framing is a fixed header plus an opaque payload; message
//! bodies are encoded/decoded by the caller (the engine never needs a generic serde layer
//! here, just the header and byte-counting discipline).

use crate::error::IpcError;
use byteorder::{BigEndian, ByteOrder};
use std::collections::VecDeque;
use std::io::{Read, Write};

pub const ENVELOPE_HEADER_LEN: usize = 4 + 4 + 4 + 2;

/// Message types on the parent channel (spec §6 "Inbound types").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentMsgType {
    SocketConn,
    SocketConnCtl,
    ReconfConf,
    ReconfPeer,
    ReconfListener,
    ReconfCtrl,
    ReconfDrain,
    ReconfDone,
    SessionDependOn,
    MrtOpen,
    MrtReopen,
    MrtClose,
    Shutdown,
}

/// Message types exchanged with the RDE (spec §6 "Inter-process messages (to/from RDE)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdeMsgType {
    SessionAdd,
    SessionUp,
    SessionDown,
    SessionStale,
    SessionNoGrace,
    SessionFlush,
    SessionRestarted,
    Update,
    UpdateErr,
    Refresh,
    XOn,
    XOff,
    PfkeyReload,
}

impl ParentMsgType {
    fn to_u32(self) -> u32 {
        self as u32
    }

    fn from_u32(value: u32) -> Option<Self> {
        const VARIANTS: [ParentMsgType; 13] = [
            ParentMsgType::SocketConn,
            ParentMsgType::SocketConnCtl,
            ParentMsgType::ReconfConf,
            ParentMsgType::ReconfPeer,
            ParentMsgType::ReconfListener,
            ParentMsgType::ReconfCtrl,
            ParentMsgType::ReconfDrain,
            ParentMsgType::ReconfDone,
            ParentMsgType::SessionDependOn,
            ParentMsgType::MrtOpen,
            ParentMsgType::MrtReopen,
            ParentMsgType::MrtClose,
            ParentMsgType::Shutdown,
        ];
        VARIANTS.get(value as usize).copied()
    }
}

/// One parsed envelope: `{type:u32, peer_id:u32, pid:u32, len:u16}` plus payload, per
/// spec §6's wire description. `fd` is carried out of band by the platform FD-passing
/// mechanism (SCM_RIGHTS) and is not part of the byte-counted body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub msg_type: u32,
    pub peer_id: u32,
    pub pid: u32,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENVELOPE_HEADER_LEN + self.payload.len());
        let mut header = [0u8; ENVELOPE_HEADER_LEN];
        BigEndian::write_u32(&mut header[0..4], self.msg_type);
        BigEndian::write_u32(&mut header[4..8], self.peer_id);
        BigEndian::write_u32(&mut header[8..12], self.pid);
        BigEndian::write_u16(&mut header[12..14], self.payload.len() as u16);
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&self.payload);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<(Self, usize), IpcError> {
        if buf.len() < ENVELOPE_HEADER_LEN {
            return Err(IpcError::Truncated {
                need: ENVELOPE_HEADER_LEN,
                have: buf.len(),
            });
        }
        let msg_type = BigEndian::read_u32(&buf[0..4]);
        let peer_id = BigEndian::read_u32(&buf[4..8]);
        let pid = BigEndian::read_u32(&buf[8..12]);
        let len = BigEndian::read_u16(&buf[12..14]) as usize;
        let total = ENVELOPE_HEADER_LEN + len;
        if buf.len() < total {
            return Err(IpcError::Truncated { need: total, have: buf.len() });
        }
        Ok((
            Self {
                msg_type,
                peer_id,
                pid,
                payload: buf[ENVELOPE_HEADER_LEN..total].to_vec(),
            },
            total,
        ))
    }
}

/// A framed, byte-oriented IPC channel. Production wires this to a `UnixStream`; tests
/// (spec §9 "tests instantiate Engine with mock channels") use an in-memory pair instead.
pub trait IpcChannel {
    fn send(&mut self, envelope: &Envelope) -> Result<(), IpcError>;
    /// Drains every complete envelope currently buffered; partial envelopes remain queued.
    fn poll(&mut self) -> Result<Vec<Envelope>, IpcError>;
}

/// An in-memory channel pair for tests: writes to one side arrive as readable bytes on
/// the other by sharing a `VecDeque<u8>` the test drives directly.
pub struct MockChannel {
    pub inbound: VecDeque<u8>,
    pub sent: Vec<Envelope>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    pub fn push_inbound(&mut self, envelope: &Envelope) {
        self.inbound.extend(envelope.encode());
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcChannel for MockChannel {
    fn send(&mut self, envelope: &Envelope) -> Result<(), IpcError> {
        self.sent.push(envelope.clone());
        Ok(())
    }

    fn poll(&mut self) -> Result<Vec<Envelope>, IpcError> {
        let mut out = Vec::new();
        loop {
            let contiguous: Vec<u8> = self.inbound.iter().copied().collect();
            match Envelope::decode(&contiguous) {
                Ok((envelope, consumed)) => {
                    self.inbound.drain(..consumed);
                    out.push(envelope);
                }
                Err(IpcError::Truncated { .. }) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }
}

/// A `std::io`-backed channel, for the real Unix-domain-socket connections to the parent
/// and RDE.
pub struct StreamChannel<S> {
    stream: S,
    read_buf: Vec<u8>,
}

impl<S: Read + Write> StreamChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { stream, read_buf: Vec::new() }
    }
}

impl<S: Read + Write> IpcChannel for StreamChannel<S> {
    fn send(&mut self, envelope: &Envelope) -> Result<(), IpcError> {
        self.stream.write_all(&envelope.encode()).map_err(IpcError::Io)
    }

    fn poll(&mut self) -> Result<Vec<Envelope>, IpcError> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(IpcError::Io(e)),
            }
        }

        let mut out = Vec::new();
        let mut offset = 0;
        loop {
            match Envelope::decode(&self.read_buf[offset..]) {
                Ok((envelope, consumed)) => {
                    offset += consumed;
                    out.push(envelope);
                }
                Err(IpcError::Truncated { .. }) => break,
                Err(err) => return Err(err),
            }
        }
        self.read_buf.drain(..offset);
        Ok(out)
    }
}
