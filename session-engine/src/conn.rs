//! Connection manager (spec §4.5): outbound connect, inbound accept, and the socket
//! tuning both paths share. Grounded on the teacher's `create_tcp_server` (raw `socket2`
//! socket, non-blocking, handed to `mio` once built) but without the tokio listener glue.

use crate::error::ConnError;
use mio::net::{TcpListener, TcpStream};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::os::fd::{FromRawFd, IntoRawFd};

pub const IPTOS_PREC_INTERNETCONTROL: u32 = 0xc0;
const RCVBUF_INITIAL: usize = 65535;
const RCVBUF_FLOOR: usize = 8192;

/// Creates the non-blocking, close-on-exec outbound socket for connecting to `remote`,
/// applying TTL/TOS/buffer tuning before the connect attempt (spec §4.5 Outbound).
pub fn create_outbound_socket(
    remote: SocketAddr,
    local: Option<SocketAddr>,
    ttl: u8,
    ttl_security: bool,
) -> Result<TcpStream, ConnError> {
    let socket = Socket::new(Domain::for_address(remote), Type::STREAM, Some(Protocol::TCP))
        .map_err(ConnError::Socket)?;
    socket.set_nonblocking(true).map_err(ConnError::Socket)?;
    socket.set_cloexec(true).map_err(ConnError::Socket)?;

    if let Some(local) = local {
        socket.bind(&local.into()).map_err(ConnError::Bind)?;
    }

    tune_socket(&socket, remote.is_ipv6(), ttl, ttl_security)?;

    match socket.connect(&remote.into()) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
        Err(err) if err.raw_os_error() == Some(libc_errno::EINPROGRESS) => {}
        Err(err) => return Err(ConnError::Connect(err)),
    }

    Ok(unsafe { TcpStream::from_raw_fd(socket.into_raw_fd()) })
}

/// Binds and starts listening (parent-owned in production; used directly in tests).
pub fn create_listener(bind_addr: SocketAddr) -> Result<TcpListener, ConnError> {
    let socket = Socket::new(Domain::for_address(bind_addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(ConnError::Socket)?;
    socket.set_reuse_address(true).map_err(ConnError::Socket)?;
    socket.set_nonblocking(true).map_err(ConnError::Socket)?;
    socket.set_cloexec(true).map_err(ConnError::Socket)?;
    socket.bind(&bind_addr.into()).map_err(ConnError::Bind)?;
    socket.listen(1024).map_err(ConnError::Bind)?;
    Ok(unsafe { TcpListener::from_raw_fd(socket.into_raw_fd()) })
}

/// Accepts one inbound connection, applying the same close-on-exec/non-blocking/tuning
/// pass as the outbound path (spec §4.5 Inbound).
pub fn accept_inbound(listener: &TcpListener, ttl: u8, ttl_security: bool) -> Result<(TcpStream, SocketAddr), ConnError> {
    let (stream, addr) = listener.accept().map_err(ConnError::Accept)?;
    let socket = socket2::SockRef::from(&stream);
    tune_socket(&socket, addr.is_ipv6(), ttl, ttl_security)?;
    Ok((stream, addr))
}

fn tune_socket(socket: &socket2::SockRef<'_>, is_v6: bool, ttl: u8, ttl_security: bool) -> Result<(), ConnError> {
    socket.set_tcp_nodelay(true).map_err(|e| ConnError::SockOpt("TCP_NODELAY", e))?;

    if is_v6 {
        socket
            .set_unicast_hops_v6(ttl as u32)
            .map_err(|e| ConnError::SockOpt("IPV6_UNICAST_HOPS", e))?;
    } else {
        socket.set_ttl(ttl as u32).map_err(|e| ConnError::SockOpt("IP_TTL", e))?;
        socket
            .set_tos(IPTOS_PREC_INTERNETCONTROL)
            .map_err(|e| ConnError::SockOpt("IP_TOS", e))?;
    }
    let _ = ttl_security; // MINTTL/MINHOPCOUNT require raw setsockopt not exposed by socket2; parent installs via pfkey today.

    let mut rcvbuf = RCVBUF_INITIAL;
    while rcvbuf >= RCVBUF_FLOOR {
        match socket.set_recv_buffer_size(rcvbuf) {
            Ok(()) => break,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => rcvbuf /= 2,
            Err(e) => return Err(ConnError::SockOpt("SO_RCVBUF", e)),
        }
    }
    let mut sndbuf = RCVBUF_INITIAL;
    while sndbuf >= RCVBUF_FLOOR {
        match socket.set_send_buffer_size(sndbuf) {
            Ok(()) => break,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => sndbuf /= 2,
            Err(e) => return Err(ConnError::SockOpt("SO_SNDBUF", e)),
        }
    }
    Ok(())
}

/// Consults `SO_ERROR` after a writable-readiness on a connecting socket to distinguish a
/// completed connect from a failed one (spec §4.5).
pub fn take_connect_error(stream: &TcpStream) -> Result<(), ConnError> {
    match stream.take_error() {
        Ok(None) => Ok(()),
        Ok(Some(err)) => Err(ConnError::DeferredConnect(err)),
        Err(err) => Err(ConnError::DeferredConnect(err)),
    }
}

mod libc_errno {
    #[cfg(unix)]
    pub const EINPROGRESS: i32 = 115;
    #[cfg(not(unix))]
    pub const EINPROGRESS: i32 = -1;
}
