//! The six-state peer FSM (spec §4.3). Pure-ish: transitions take the peer and an event,
//! mutate peer state and timers, and return the side-effects the caller (the event loop or
//! a test harness) must carry out — sending frames, touching sockets, talking to the RDE.
//! No I/O happens in here.

use crate::cap;
use crate::peer::Peer;
use crate::timer::TimerKind;
use bgp_common::Aid;
use bgp_packet::notification::{self, NotificationMessage};
use bgp_packet::open::OpenMessage;
use bgp_packet::BgpMessage;
use std::time::Duration;

pub const INITIAL_HOLDTIME: u16 = 240;
pub const INITIAL_IDLE_HOLD: Duration = Duration::from_secs(30);
pub const MAX_IDLE_HOLD: Duration = Duration::from_secs(3600);
pub const INTERVAL_HOLD: u16 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    None,
    Idle,
    Connect,
    Active,
    OpenSent,
    OpenConfirm,
    Established,
}

#[derive(Debug, Clone)]
pub enum Event {
    Start,
    Stop,
    ConOpen,
    ConOpenFail,
    ConClosed,
    ConFatal,
    TimerConnRetry,
    TimerHoldtime,
    TimerSendHold,
    TimerKeepalive,
    TimerIdleHold,
    RcvdOpen(OpenMessage),
    RcvdKeepalive,
    RcvdUpdate(Vec<u8>),
    RcvdNotification(NotificationMessage),
}

/// What the caller must do in response to a transition. FSM code never performs I/O
/// itself; it only describes the actions.
#[derive(Debug, Clone, Default)]
pub struct Effects {
    pub send: Vec<BgpMessage>,
    pub initiate_connect: bool,
    pub close_connection: bool,
    pub session_up: bool,
    pub session_down: bool,
    pub session_stale: Vec<Aid>,
    pub session_flush: Vec<Aid>,
    pub reload_auth_keys: bool,
}

/// Runs one `(state, event)` transition to completion (spec §8 property 4: total, never
/// panics). Returns the side-effects the caller must carry out.
pub fn step(peer: &mut Peer, event: Event) -> Effects {
    let mut effects = Effects::default();
    let from_state = peer.state;

    match (from_state, event) {
        (State::None, Event::Start) => enter_idle(peer, &mut effects, true),
        (State::Idle, Event::Start) => on_idle_start(peer, &mut effects),

        (State::Connect, Event::ConOpen) => on_connect_established(peer, &mut effects, State::Connect),
        (State::Connect, Event::ConOpenFail) => {
            effects.close_connection = true;
            peer.timers.set(TimerKind::ConnectRetry, Duration::from_secs(peer.connect_retry_secs));
            peer.state = State::Active;
        }
        (State::Connect, Event::TimerConnRetry) => {
            peer.timers.set(TimerKind::ConnectRetry, Duration::from_secs(peer.connect_retry_secs));
            effects.initiate_connect = true;
        }
        (State::Connect, _) => enter_idle(peer, &mut effects, false),

        (State::Active, Event::ConOpen) => on_connect_established(peer, &mut effects, State::Active),
        (State::Active, Event::ConOpenFail) => {
            peer.timers.set(TimerKind::ConnectRetry, Duration::from_secs(peer.connect_retry_secs));
        }
        (State::Active, Event::TimerConnRetry) => {
            peer.timers.set(TimerKind::ConnectRetry, Duration::from_secs(peer.connect_retry_secs));
            peer.state = State::Connect;
            effects.initiate_connect = true;
        }
        (State::Active, _) => enter_idle(peer, &mut effects, false),

        (State::OpenSent, Event::RcvdOpen(open)) => on_rcvd_open(peer, &mut effects, open),
        (State::OpenSent, Event::ConClosed) => {
            effects.close_connection = true;
            peer.timers.set(TimerKind::ConnectRetry, Duration::from_secs(peer.connect_retry_secs));
            peer.state = State::Active;
        }
        (State::OpenSent, Event::TimerHoldtime) => {
            notify_then_idle(peer, &mut effects, notification::ERR_HOLDTIMER_EXPIRED, 0, Vec::new());
        }
        (State::OpenSent, Event::TimerSendHold) => {
            notify_then_idle(peer, &mut effects, notification::ERR_SENDHOLDTIMER_EXPIRED, 0, Vec::new());
        }
        (State::OpenSent, Event::RcvdNotification(notif)) => {
            peer.last_reason = notif.shutdown_reason();
            peer.idle_hold = halve(peer.idle_hold);
            enter_idle(peer, &mut effects, false);
        }
        (State::OpenSent, _) => {
            notify_then_idle(peer, &mut effects, notification::ERR_FSM, 1, Vec::new());
        }

        (State::OpenConfirm, Event::RcvdKeepalive) => {
            peer.timers.set(TimerKind::Hold, Duration::from_secs(peer.negotiated_hold_time as u64));
            enter_established(peer, &mut effects);
        }
        (State::OpenConfirm, Event::TimerKeepalive) => send_keepalive(peer, &mut effects),
        (State::OpenConfirm, Event::ConClosed) => {
            effects.close_connection = true;
            peer.timers.set(TimerKind::ConnectRetry, Duration::from_secs(peer.connect_retry_secs));
            peer.state = State::Active;
        }
        (State::OpenConfirm, Event::TimerHoldtime) => {
            notify_then_idle(peer, &mut effects, notification::ERR_HOLDTIMER_EXPIRED, 0, Vec::new());
        }
        (State::OpenConfirm, Event::TimerSendHold) => {
            notify_then_idle(peer, &mut effects, notification::ERR_SENDHOLDTIMER_EXPIRED, 0, Vec::new());
        }
        (State::OpenConfirm, Event::RcvdNotification(notif)) => {
            peer.last_reason = notif.shutdown_reason();
            enter_idle(peer, &mut effects, false);
        }
        (State::OpenConfirm, _) => {
            notify_then_idle(peer, &mut effects, notification::ERR_FSM, 2, Vec::new());
        }

        (State::Established, Event::RcvdKeepalive) => {
            peer.timers.set(TimerKind::Hold, Duration::from_secs(peer.negotiated_hold_time as u64));
        }
        (State::Established, Event::RcvdUpdate(_body)) => {
            peer.timers.set(TimerKind::Hold, Duration::from_secs(peer.negotiated_hold_time as u64));
            peer.stats.updates_received += 1;
        }
        (State::Established, Event::TimerKeepalive) => send_keepalive(peer, &mut effects),
        (State::Established, Event::TimerHoldtime) => established_teardown(
            peer,
            &mut effects,
            notification::ERR_HOLDTIMER_EXPIRED,
            0,
        ),
        (State::Established, Event::TimerSendHold) => established_teardown(
            peer,
            &mut effects,
            notification::ERR_SENDHOLDTIMER_EXPIRED,
            0,
        ),
        (State::Established, Event::ConClosed) | (State::Established, Event::ConFatal) => {
            established_connection_lost(peer, &mut effects)
        }
        (State::Established, _) => {
            notify_then_idle(peer, &mut effects, notification::ERR_FSM, 3, Vec::new());
        }

        (_, Event::Stop) => enter_idle(peer, &mut effects, true),
        (_, Event::ConFatal) => enter_idle(peer, &mut effects, false),
        _ => {}
    }

    effects
}

fn on_idle_start(peer: &mut Peer, effects: &mut Effects) {
    peer.allocate_buffers();
    if peer.config.passive || peer.config.template || peer.transient_passive {
        peer.timers.stop(TimerKind::ConnectRetry);
        peer.state = State::Active;
    } else {
        peer.timers.set(TimerKind::ConnectRetry, Duration::from_secs(peer.connect_retry_secs));
        peer.state = State::Connect;
        effects.initiate_connect = true;
    }
}

fn on_connect_established(peer: &mut Peer, effects: &mut Effects, _from: State) {
    peer.negotiated_hold_time = INITIAL_HOLDTIME;
    peer.timers.set(TimerKind::Hold, Duration::from_secs(INITIAL_HOLDTIME as u64));
    let announced = cap::announced_capabilities(&peer.config);
    let restarting = peer
        .capabilities
        .negotiated
        .graceful_restart
        .as_ref()
        .map(|gr| gr.restarting_aids)
        .unwrap_or_default();
    let params = cap::encode_capabilities(&announced, restarting, peer.config.is_ebgp());
    effects.send.push(BgpMessage::Open(OpenMessage {
        version: 4,
        autonomous_system: truncate_as(peer.config.local_as),
        hold_time: peer.config.hold_time,
        bgp_identifier: peer.local_bgp_id,
        optional_parameters: params,
    }));
    peer.capabilities.announced = announced;
    peer.state = State::OpenSent;
}

fn truncate_as(asn: u32) -> u16 {
    if asn > u16::MAX as u32 {
        23456 // AS_TRANS
    } else {
        asn as u16
    }
}

fn on_rcvd_open(peer: &mut Peer, effects: &mut Effects, open: OpenMessage) {
    match crate::open_parse::parse_open(peer, &open) {
        Ok(peer_caps) => {
            peer.capabilities.peer = peer_caps.clone();
            let previous_gr = peer.capabilities.negotiated.graceful_restart.clone();
            peer.capabilities.negotiated =
                bgp_packet::caps::negotiate(&peer.capabilities.announced, &peer_caps, previous_gr.as_ref());
            peer.peer_bgp_id = open.bgp_identifier;
            effects.send.push(BgpMessage::KeepAlive);
            peer.state = State::OpenConfirm;
        }
        Err((code, subcode, data)) => {
            notify_then_idle(peer, effects, code, subcode, data);
        }
    }
}

fn send_keepalive(peer: &mut Peer, effects: &mut Effects) {
    effects.send.push(BgpMessage::KeepAlive);
    if peer.negotiated_hold_time > 0 {
        peer.timers.set(
            TimerKind::Keepalive,
            Duration::from_secs((peer.negotiated_hold_time / 3) as u64),
        );
    }
}

fn notify_then_idle(peer: &mut Peer, effects: &mut Effects, code: u8, subcode: u8, data: Vec<u8>) {
    if !peer.notification_sent {
        effects.send.push(BgpMessage::Notification(NotificationMessage {
            error_code: code,
            error_subcode: subcode,
            data,
        }));
        peer.notification_sent = true;
        peer.stats.last_sent_errcode = Some((code, subcode));
    }
    enter_idle(peer, effects, false);
}

/// Hold-timer and send-hold-timer expiry always NOTIFICATION-and-teardown: the
/// graceful-restart exception (spec §4.3) applies only to `ConClosed`/`ConFatal`, handled
/// separately by `established_connection_lost`.
fn established_teardown(peer: &mut Peer, effects: &mut Effects, code: u8, subcode: u8) {
    notify_then_idle(peer, effects, code, subcode, Vec::new());
}

fn established_connection_lost(peer: &mut Peer, effects: &mut Effects) {
    effects.close_connection = true;
    if try_graceful_restart(peer, effects) {
        return;
    }
    enter_idle(peer, effects, false);
}

/// Spec §4.3 Established exception: GR-capable peers get a stale/RestartTimeout path
/// instead of a hard `SessionDown`. Returns `true` when this path was taken.
fn try_graceful_restart(peer: &mut Peer, effects: &mut Effects) -> bool {
    let Some(gr) = peer.capabilities.negotiated.graceful_restart.clone() else {
        return false;
    };
    if gr.restart_time == 0 {
        return false;
    }
    peer.timers.set(TimerKind::IdleHold, Duration::ZERO);
    peer.idle_hold = halve(peer.idle_hold);
    peer.capabilities.negotiated.graceful_restart = Some(bgp_packet::caps::GracefulRestartState {
        restarting_aids: gr.forward,
        ..gr
    });
    effects.session_stale = gr.forward.iter().collect();
    peer.timers.set(TimerKind::RestartTimeout, Duration::from_secs(gr.restart_time as u64));
    peer.state = State::Idle;
    teardown_connection_state(peer, false);
    true
}

fn enter_idle(peer: &mut Peer, effects: &mut Effects, is_stop: bool) {
    let came_from_established = peer.state == State::Established;
    effects.close_connection = true;
    effects.reload_auth_keys = true;
    teardown_connection_state(peer, true);
    peer.state = State::Idle;

    if !is_stop {
        peer.timers.set(TimerKind::IdleHold, peer.idle_hold);
        peer.idle_hold = next_idle_hold(peer.idle_hold);
    }
    if came_from_established && !matches!(peer.capabilities.negotiated.graceful_restart, Some(ref gr) if !gr.restarting_aids.is_empty())
    {
        effects.session_down = true;
    }
    peer.notification_sent = false;
}

fn teardown_connection_state(peer: &mut Peer, full: bool) {
    if full {
        peer.timers.stop_all();
    } else {
        peer.timers.stop(TimerKind::Hold);
        peer.timers.stop(TimerKind::Keepalive);
        peer.timers.stop(TimerKind::SendHold);
    }
    peer.read_buf_len = 0;
    peer.write_queue_len = 0;
    peer.capabilities.peer = Default::default();
}

fn enter_established(peer: &mut Peer, effects: &mut Effects) {
    peer.state = State::Established;
    peer.timers.set(TimerKind::IdleHoldReset, INITIAL_IDLE_HOLD * 2);
    if peer.demoted {
        peer.timers.set(TimerKind::CarpUndemote, Duration::from_secs(1));
    }
    effects.session_up = true;
}

fn next_idle_hold(current: Duration) -> Duration {
    (current * 2).min(MAX_IDLE_HOLD / 2)
}

fn halve(current: Duration) -> Duration {
    current / 2
}

impl Peer {
    /// Resolves `IdleHoldReset`'s effect on the backoff ladder (spec §4.3: reset to
    /// INITIAL, zero errcnt).
    pub fn on_idle_hold_reset(&mut self) {
        self.idle_hold = INITIAL_IDLE_HOLD;
        self.stats.error_count = 0;
    }
}
