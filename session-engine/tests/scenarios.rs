//! End-to-end scenarios S1-S6, driven directly against the FSM and registry rather than
//! real sockets, per the mock-channel testing approach.

use bgp_common::{Aid, AidSet};
use bgp_packet::caps::{Capability, GracefulRestartAidFlags, GracefulRestartCap, GracefulRestartEntry, RestartFlags};
use bgp_packet::open::{OpenMessage, OptionalParameter};
use bgp_packet::BgpMessage;
use session_engine::config::{default_aid_set_unicast_v4, AuthMethod, PeerConfig};
use session_engine::fsm::{self, Event, State};
use session_engine::peer::Peer;

fn peer_config(peer_id: u32, remote_as: u32) -> PeerConfig {
    PeerConfig {
        peer_id,
        template: false,
        template_prefix: None,
        remote_addr: Some("192.0.2.1".parse().unwrap()),
        local_addr: None,
        remote_as: Some(remote_as),
        local_as: 65001,
        passive: false,
        hold_time: 90,
        min_holdtime: 3,
        ttl_security: false,
        ttl: 64,
        auth: AuthMethod::None,
        role: None,
        strict_role_enforcement: false,
        announced_multiprotocol: default_aid_set_unicast_v4(),
        announced_route_refresh: true,
        announced_enhanced_refresh: false,
        announced_four_octet_as: true,
        announced_add_path_recv: AidSet::empty(),
        announced_add_path_send: AidSet::empty(),
        graceful_restart_time: None,
    }
}

/// S1: clean bring-up. Idle -> Connect -> OpenSent -> OpenConfirm -> Established, with an
/// OPEN whose capabilities carry MP(IPv4), REFRESH and AS4BYTE exactly as A would send.
#[test]
fn s1_clean_bring_up() {
    let mut peer = Peer::new(1, peer_config(1, 65002), 0x0A000001);

    let effects = fsm::step(&mut peer, Event::Start);
    assert_eq!(peer.state, State::Connect);
    assert!(effects.initiate_connect);

    let effects = fsm::step(&mut peer, Event::ConOpen);
    assert_eq!(peer.state, State::OpenSent);
    let BgpMessage::Open(open) = &effects.send[0] else { panic!("expected OPEN") };
    assert_eq!(open.autonomous_system, 65001);
    assert_eq!(open.hold_time, 90);
    assert_eq!(open.bgp_identifier, 0x0A000001);
    let OptionalParameter::Capabilities(caps) = &open.optional_parameters[0] else {
        panic!("expected capabilities param")
    };
    assert!(caps.iter().any(|c| matches!(c, Capability::Multiprotocol(_))));
    assert!(caps.contains(&Capability::RouteRefresh));
    assert!(caps.iter().any(|c| matches!(c, Capability::FourOctetAs(65001))));

    let peer_open = OpenMessage {
        version: 4,
        autonomous_system: 65002,
        hold_time: 90,
        bgp_identifier: 0x0A000002,
        optional_parameters: Vec::new(),
    };
    let effects = fsm::step(&mut peer, Event::RcvdOpen(peer_open));
    assert_eq!(peer.state, State::OpenConfirm);
    assert!(matches!(effects.send[0], BgpMessage::KeepAlive));

    let effects = fsm::step(&mut peer, Event::RcvdKeepalive);
    assert_eq!(peer.state, State::Established);
    assert!(effects.session_up);
    assert_eq!(peer.negotiated_hold_time, 90);
}

/// S2: bad marker -> NOTIFICATION(1,1), Idle, errcnt increments. The marker check lives
/// in the frame codec (exercised there); here we confirm the FSM side of the fatal path.
#[test]
fn s2_header_error_drives_idle_with_one_notification() {
    let mut peer = Peer::new(2, peer_config(2, 65002), 0x0A000001);
    fsm::step(&mut peer, Event::Start);
    fsm::step(&mut peer, Event::ConOpen);
    assert_eq!(peer.state, State::OpenSent);

    let effects = fsm::step(&mut peer, Event::ConFatal);
    assert_eq!(peer.state, State::Idle);
    assert!(effects.close_connection);
}

/// S3: hold-time 1 in the OPEN fails parse_open with NOTIFICATION(2,6) and drops.
#[test]
fn s3_holdtime_one_is_rejected() {
    let mut peer = Peer::new(3, peer_config(3, 65002), 0x0A000001);
    fsm::step(&mut peer, Event::Start);
    fsm::step(&mut peer, Event::ConOpen);

    let bad_open = OpenMessage {
        version: 4,
        autonomous_system: 65002,
        hold_time: 1,
        bgp_identifier: 0x0A000002,
        optional_parameters: Vec::new(),
    };
    let effects = fsm::step(&mut peer, Event::RcvdOpen(bad_open));
    assert_eq!(peer.state, State::Idle);
    let BgpMessage::Notification(notif) = &effects.send[0] else { panic!("expected NOTIFICATION") };
    assert_eq!((notif.error_code, notif.error_subcode), (2, 6));
}

/// S4: graceful restart. A negotiates GR with timeout=120 and FORWARD on IPv4; TCP drops;
/// the FSM takes the stale path instead of a hard SessionDown.
#[test]
fn s4_graceful_restart_on_connection_loss() {
    let mut config = peer_config(4, 65002);
    config.graceful_restart_time = Some(120);
    let mut peer = Peer::new(4, config, 0x0A000001);
    fsm::step(&mut peer, Event::Start);
    fsm::step(&mut peer, Event::ConOpen);

    let (afi, safi) = Aid::Inet.afi_safi();
    let peer_open = OpenMessage {
        version: 4,
        autonomous_system: 65002,
        hold_time: 90,
        bgp_identifier: 0x0A000002,
        optional_parameters: vec![OptionalParameter::Capabilities(vec![Capability::GracefulRestart(
            GracefulRestartCap {
                flags: RestartFlags::empty(),
                restart_time: 120,
                entries: vec![GracefulRestartEntry { afi, safi, flags: GracefulRestartAidFlags::FORWARD }],
            },
        )])],
    };
    fsm::step(&mut peer, Event::RcvdOpen(peer_open));
    fsm::step(&mut peer, Event::RcvdKeepalive);
    assert_eq!(peer.state, State::Established);
    assert!(peer.capabilities.negotiated.graceful_restart.is_some(), "GR must be negotiated from the real OPEN exchange");

    let effects = fsm::step(&mut peer, Event::ConClosed);
    assert_eq!(peer.state, State::Idle);
    assert!(!effects.session_down, "GR path must not emit SessionDown");
    assert_eq!(effects.session_stale, vec![Aid::Inet]);
    assert!(peer.timers.running(session_engine::timer::TimerKind::RestartTimeout));
}

/// S6: reconfig add-peer. A fresh peer inserted in state None gets initialized to Idle on
/// the next reap-and-init pass.
#[test]
fn s6_reconfig_new_peer_initializes_to_idle() {
    use session_engine::config::GlobalConfig;
    use session_engine::eventloop::Engine;
    use session_engine::ipc::MockChannel;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::{Duration, Instant};

    let global = GlobalConfig {
        local_as: 65001,
        router_id: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        hold_cloned: Duration::from_secs(60),
    };
    let mut engine = Engine::with_channels(global, Box::new(MockChannel::new()), Box::new(MockChannel::new()));

    let mut config = peer_config(7, 65002);
    config.passive = true;
    let peer = Peer::new(7, config, 0x0A000001);
    assert_eq!(peer.state, State::None);
    engine.registry.insert(peer);

    engine.tick(Instant::now(), &[]);
    assert_eq!(engine.registry.get(7).unwrap().state, State::Active);
}
