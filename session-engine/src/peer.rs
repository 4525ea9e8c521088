//! The `Peer` entity (spec §3): identity, configuration, and every runtime field the FSM
//! and event loop mutate across a session's lifetime.

use crate::config::PeerConfig;
use crate::fsm::{State, INITIAL_IDLE_HOLD};
use crate::timer::TimerWheel;
use bgp_packet::caps::CapabilitySet;
use bytes::BytesMut;
use mio::Token;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

pub const RING_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub announced: CapabilitySet,
    pub peer: CapabilitySet,
    pub negotiated: CapabilitySet,
}

#[derive(Debug, Clone, Default)]
pub struct PeerStats {
    pub opens_sent: u64,
    pub opens_received: u64,
    pub updates_sent: u64,
    pub updates_received: u64,
    pub keepalives_sent: u64,
    pub keepalives_received: u64,
    pub last_updown: Option<Instant>,
    pub last_sent_errcode: Option<(u8, u8)>,
    pub last_recv_errcode: Option<(u8, u8)>,
    pub error_count: u32,
}

pub struct Peer {
    pub peer_id: u32,
    pub config: PeerConfig,
    pub template_parent: Option<u32>,

    pub state: State,
    pub previous_state: State,
    pub token: Option<Token>,
    pub remote_addr: Option<SocketAddr>,
    pub local_addr: Option<SocketAddr>,
    pub alt_local_addr: Option<std::net::IpAddr>,
    pub scope_id: Option<u32>,

    pub read_buf: BytesMut,
    pub read_buf_len: usize,
    pub write_queue: VecDeque<Vec<u8>>,
    pub write_queue_len: usize,
    pub throttled: bool,
    pub rpending: bool,

    pub timers: TimerWheel,
    pub connect_retry_secs: u64,
    pub negotiated_hold_time: u16,
    pub local_bgp_id: u32,
    pub peer_bgp_id: u32,

    pub capabilities: Capabilities,
    pub notification_sent: bool,
    pub idle_hold: Duration,
    pub transient_passive: bool,
    pub demoted: bool,
    pub demotion_counter: u32,
    pub last_reason: Option<String>,
    pub stats: PeerStats,
}

impl Peer {
    pub fn new(peer_id: u32, config: PeerConfig, local_bgp_id: u32) -> Self {
        Self {
            peer_id,
            connect_retry_secs: 120,
            template_parent: None,
            state: State::None,
            previous_state: State::None,
            token: None,
            remote_addr: config.remote_addr.map(|ip| SocketAddr::new(ip, 179)),
            local_addr: None,
            alt_local_addr: None,
            scope_id: None,
            read_buf: BytesMut::new(),
            read_buf_len: 0,
            write_queue: VecDeque::new(),
            write_queue_len: 0,
            throttled: false,
            rpending: false,
            timers: TimerWheel::new(),
            negotiated_hold_time: 0,
            local_bgp_id,
            peer_bgp_id: 0,
            capabilities: Capabilities::default(),
            notification_sent: false,
            idle_hold: INITIAL_IDLE_HOLD,
            transient_passive: false,
            demoted: false,
            demotion_counter: 0,
            last_reason: None,
            stats: PeerStats::default(),
            config,
        }
    }

    /// Clones a template peer into a concrete per-connection peer on inbound accept from
    /// an address that only matched a template prefix (spec §4.5).
    pub fn clone_from_template(template: &Peer, peer_id: u32, remote: SocketAddr, local_bgp_id: u32) -> Self {
        let mut config = template.config.clone();
        config.peer_id = peer_id;
        config.template = false;
        config.remote_addr = Some(remote.ip());
        let mut peer = Self::new(peer_id, config, local_bgp_id);
        peer.template_parent = Some(template.peer_id);
        peer.remote_addr = Some(remote);
        peer
    }

    pub fn allocate_buffers(&mut self) {
        if self.read_buf.capacity() == 0 {
            self.read_buf = BytesMut::with_capacity(RING_CAPACITY);
        }
        self.read_buf_len = 0;
    }

    pub fn free_buffers(&mut self) {
        self.read_buf = BytesMut::new();
        self.write_queue.clear();
        self.write_queue_len = 0;
    }

    pub fn description(&self) -> String {
        match self.remote_addr {
            Some(addr) => format!("peer#{} ({addr})", self.peer_id),
            None => format!("peer#{}", self.peer_id),
        }
    }
}
