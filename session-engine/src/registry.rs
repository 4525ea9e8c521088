//! Peer registry (spec §4.5/§9): an ordered map keyed by peer-id plus a secondary index
//! by remote address, used for exact-match lookup and best-prefix template matching on
//! inbound connections. Linear scan over templates is adequate at fleet sizes in the
//! hundreds (spec §9 Design Notes).

use crate::peer::Peer;
use std::collections::BTreeMap;
use std::net::IpAddr;

#[derive(Default)]
pub struct PeerRegistry {
    peers: BTreeMap<u32, Peer>,
    next_cloned_id: u32,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: BTreeMap::new(),
            next_cloned_id: 1 << 24,
        }
    }

    pub fn insert(&mut self, peer: Peer) {
        self.peers.insert(peer.peer_id, peer);
    }

    pub fn remove(&mut self, peer_id: u32) -> Option<Peer> {
        self.peers.remove(&peer_id)
    }

    pub fn get(&self, peer_id: u32) -> Option<&Peer> {
        self.peers.get(&peer_id)
    }

    pub fn get_mut(&mut self, peer_id: u32) -> Option<&mut Peer> {
        self.peers.get_mut(&peer_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Peer> {
        self.peers.values_mut()
    }

    pub fn by_remote_addr(&self, addr: IpAddr) -> Option<&Peer> {
        self.peers
            .values()
            .find(|peer| peer.config.remote_addr == Some(addr) && !peer.config.template)
    }

    pub fn by_remote_addr_mut(&mut self, addr: IpAddr) -> Option<&mut Peer> {
        self.peers
            .values_mut()
            .find(|peer| peer.config.remote_addr == Some(addr) && !peer.config.template)
    }

    /// Best-prefix template match: the template with the longest matching prefix wins.
    pub fn best_matching_template(&self, addr: IpAddr) -> Option<&Peer> {
        self.peers
            .values()
            .filter(|peer| peer.config.template && peer.config.matches_template(addr))
            .max_by_key(|peer| peer.config.template_prefix.map(|p| p.mask).unwrap_or(0))
    }

    /// Allocates an id for a connection cloned off a template.
    pub fn next_cloned_id(&mut self) -> u32 {
        let id = self.next_cloned_id;
        self.next_cloned_id += 1;
        id
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
