//! Integration-level wire tests: whole messages built through [`BgpMessage`] and run
//! through the header parser the way a peer socket's read loop would, rather than
//! exercising a single codec function in isolation (see the unit tests for that).

use bgp_packet::caps::graceful::{GracefulRestartAidFlags, GracefulRestartEntry, RestartFlags};
use bgp_packet::caps::{Capability, GracefulRestartCap, MultiprotocolCap, Role};
use bgp_packet::notification::{self, NotificationMessage};
use bgp_packet::open::{OpenMessage, OptionalParameter};
use bgp_packet::route_refresh::{RefreshSubtype, RouteRefreshMessage};
use bgp_packet::update::UpdateMessage;
use bgp_packet::{parse_header, BgpMessage, HeaderError, HEADER_LEN, MAX_PKTSIZE};

#[test]
fn open_with_full_capability_set_roundtrips() {
    let caps = vec![
        Capability::Multiprotocol(MultiprotocolCap { afi: 1, safi: 1 }),
        Capability::RouteRefresh,
        Capability::EnhancedRouteRefresh,
        Capability::FourOctetAs(4200000000),
        Capability::Role(Role::RouteServer),
        Capability::GracefulRestart(GracefulRestartCap {
            flags: RestartFlags::RESTARTING,
            restart_time: 120,
            entries: vec![GracefulRestartEntry {
                afi: 1,
                safi: 1,
                flags: GracefulRestartAidFlags::FORWARD,
            }],
        }),
    ];
    let msg = BgpMessage::Open(OpenMessage {
        version: 4,
        autonomous_system: 23456,
        hold_time: 180,
        bgp_identifier: 0xC0000201,
        optional_parameters: vec![OptionalParameter::Capabilities(caps)],
    });

    let wire = msg.pack();
    let header = parse_header(&wire, MAX_PKTSIZE).expect("valid header");
    let parsed = BgpMessage::unpack(header, &wire[HEADER_LEN as usize..]).expect("valid body");
    assert_eq!(parsed, msg);
}

#[test]
fn notification_with_shutdown_reason_roundtrips_through_envelope() {
    let notif = NotificationMessage::cease_with_reason(notification::CEASE_ADMIN_SHUTDOWN, "maintenance window");
    let msg = BgpMessage::Notification(notif.clone());
    let wire = msg.pack();

    let header = parse_header(&wire, MAX_PKTSIZE).unwrap();
    assert_eq!(header.kind, bgp_packet::MessageType::Notification);
    let BgpMessage::Notification(parsed) = BgpMessage::unpack(header, &wire[HEADER_LEN as usize..]).unwrap() else {
        panic!("expected NOTIFICATION");
    };
    assert_eq!(parsed.shutdown_reason().as_deref(), Some("maintenance window"));
    assert_eq!(parsed, notif);
}

#[test]
fn route_refresh_begin_and_end_of_route_roundtrip() {
    for subtype in [RefreshSubtype::BeginOfRoute, RefreshSubtype::EndOfRoute, RefreshSubtype::Normal] {
        let msg = BgpMessage::RouteRefresh(RouteRefreshMessage { afi: 2, subtype, safi: 1 });
        let wire = msg.pack();
        let header = parse_header(&wire, MAX_PKTSIZE).unwrap();
        let parsed = BgpMessage::unpack(header, &wire[HEADER_LEN as usize..]).unwrap();
        assert_eq!(parsed, msg);
    }
}

#[test]
fn end_of_rib_marker_is_a_zero_length_update() {
    let msg = BgpMessage::Update(UpdateMessage::end_of_rib());
    let wire = msg.pack();
    assert_eq!(wire.len(), HEADER_LEN as usize);
    let header = parse_header(&wire, MAX_PKTSIZE).unwrap();
    let BgpMessage::Update(update) = BgpMessage::unpack(header, &wire[HEADER_LEN as usize..]).unwrap() else {
        panic!("expected UPDATE");
    };
    assert!(update.is_end_of_rib());
}

#[test]
fn truncated_header_is_rejected_before_a_type_is_known() {
    let wire = [0xFFu8; 10];
    assert_eq!(parse_header(&wire, MAX_PKTSIZE), Err(HeaderError::BadLength(10)));
}

#[test]
fn oversized_length_field_is_rejected() {
    let mut wire = [0xFFu8; 19];
    wire[16..18].copy_from_slice(&5000u16.to_be_bytes());
    wire[18] = 4;
    assert_eq!(parse_header(&wire, MAX_PKTSIZE), Err(HeaderError::BadLength(5000)));
}

#[test]
fn keepalive_is_the_minimum_possible_message() {
    let msg = BgpMessage::KeepAlive;
    let wire = msg.pack();
    assert_eq!(wire.len(), HEADER_LEN as usize);
}
