use nom::{number::complete::be_u8, IResult};

/// RFC 9234 open policy role, exchanged on eBGP sessions to enforce route-leak
/// prevention at the AS-pair level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Provider,
    RouteServer,
    RouteServerClient,
    Customer,
    Peer,
    Unknown(u8),
}

impl Role {
    pub fn to_byte(self) -> u8 {
        match self {
            Role::Provider => 0,
            Role::RouteServer => 1,
            Role::RouteServerClient => 2,
            Role::Customer => 3,
            Role::Peer => 4,
            Role::Unknown(v) => v,
        }
    }

    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Role::Provider,
            1 => Role::RouteServer,
            2 => Role::RouteServerClient,
            3 => Role::Customer,
            4 => Role::Peer,
            other => Role::Unknown(other),
        }
    }

    /// The role the peer must announce for `self` to be a valid pairing (spec §4.2).
    pub fn required_peer_role(self) -> Option<Role> {
        match self {
            Role::Provider => Some(Role::Customer),
            Role::Customer => Some(Role::Provider),
            Role::RouteServer => Some(Role::RouteServerClient),
            Role::RouteServerClient => Some(Role::RouteServer),
            Role::Peer => Some(Role::Peer),
            Role::Unknown(_) => None,
        }
    }

    pub fn unpack(input: &[u8]) -> IResult<&[u8], Self> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_byte(byte)))
    }

    pub fn pack(self) -> [u8; 1] {
        [self.to_byte()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_pairs() {
        assert_eq!(Role::Provider.required_peer_role(), Some(Role::Customer));
        assert_eq!(Role::RouteServer.required_peer_role(), Some(Role::RouteServerClient));
        assert_eq!(Role::Peer.required_peer_role(), Some(Role::Peer));
    }
}
