use thiserror::Error;

/// Failures from the connection manager (spec §4.5). These never produce a NOTIFICATION —
/// the socket is already unusable — they drive the FSM straight to `ConFatal`/`ConOpenFail`.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("socket creation failed: {0}")]
    Socket(#[source] std::io::Error),
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
    #[error("socket option {0} failed: {1}")]
    SockOpt(&'static str, #[source] std::io::Error),
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("SO_ERROR reported connect failure: {0}")]
    DeferredConnect(std::io::Error),
}

/// Failures on the IPC bridge to the parent or RDE (spec §6).
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("channel closed")]
    Closed,
    #[error("truncated envelope: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("unknown message type {0}")]
    UnknownType(u32),
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),
}
