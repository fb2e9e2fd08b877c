//! Connection state and reconnection recovery tests

mod common;

use std::sync::Arc;
use std::thread;

use ble_mic_streamer::config::{StreamConfig, DEFAULT_ATT_MTU, MAX_ATT_MTU};
use ble_mic_streamer::connection::{ConnectionEvent, ConnectionState, LinkState};
use ble_mic_streamer::fault::{FaultCode, FaultState};
use ble_mic_streamer::logging::LogStream;
use ble_mic_streamer::supervisor::{LinkAction, LinkSupervisor};
use ble_mic_streamer::transport::TransportFault;

use common::RecordingTransport;

#[test]
fn test_handlers_are_idempotent() {
    let link = ConnectionState::new();
    link.on_connect();
    link.on_connect();
    assert_eq!(link.state(), LinkState::Connected);
    assert_eq!(link.connect_count(), 1);

    link.on_disconnect();
    link.on_disconnect();
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(link.disconnect_count(), 1);
}

#[test]
fn test_mtu_change_keeps_state() {
    let link = ConnectionState::new();
    link.on_mtu_changed(247);
    assert_eq!(link.state(), LinkState::Disconnected);

    link.on_connect();
    link.on_mtu_changed(185);
    assert_eq!(link.state(), LinkState::Connected);
    assert_eq!(link.mtu(), 185);
}

#[test]
fn test_mtu_always_in_range() {
    let link = ConnectionState::new();
    for mtu in [0u16, 1, 22, 23, 100, 517, 518, u16::MAX] {
        link.on_mtu_changed(mtu);
        assert!((DEFAULT_ATT_MTU..=MAX_ATT_MTU).contains(&link.mtu()));
    }
}

#[test]
fn test_cross_core_reader_sees_consistent_state() {
    let link = Arc::new(ConnectionState::new());
    let writer = {
        let link = Arc::clone(&link);
        thread::spawn(move || {
            for i in 0..1_000u16 {
                link.on_connect();
                link.on_mtu_changed(23 + i % 495);
                link.on_disconnect();
            }
        })
    };

    for _ in 0..10_000 {
        let payload = link.max_payload();
        assert!((20..=514).contains(&payload));
    }
    writer.join().unwrap();
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(link.connect_count(), 1_000);
}

#[test]
fn test_every_disconnect_restarts_advertising() {
    let cfg = StreamConfig::live_microphone();
    let link = ConnectionState::new();
    let fault = FaultState::new();
    let log = LogStream::new();
    let mut supervisor = LinkSupervisor::new(&cfg, &link, &fault, &log);
    let mut transport = RecordingTransport::new(&link);
    let settle = u64::from(cfg.reconnect_settle_ms);

    let mut now = 0;
    for round in 1..=3 {
        link.on_connect();
        link.on_disconnect();
        supervisor.poll(&mut transport, now);
        now += settle;
        assert_eq!(supervisor.poll(&mut transport, now), LinkAction::Advertised);
        assert_eq!(transport.advertisements, round);
        now += 1_000;
    }
}

#[test]
fn test_reconnect_before_settle_cancels_restart() {
    let cfg = StreamConfig::live_microphone();
    let link = ConnectionState::new();
    let fault = FaultState::new();
    let log = LogStream::new();
    let mut supervisor = LinkSupervisor::new(&cfg, &link, &fault, &log);
    let mut transport = RecordingTransport::new(&link);

    link.on_connect();
    link.on_disconnect();
    supervisor.poll(&mut transport, 0);
    link.on_connect();
    supervisor.poll(&mut transport, 100);
    assert_eq!(supervisor.pending_restart_ms(), None);
    assert_eq!(supervisor.poll(&mut transport, 10_000), LinkAction::None);
    assert_eq!(transport.advertisements, 0);
}

#[test]
fn test_lost_events_still_restart_advertising() {
    let cfg = StreamConfig::live_microphone();
    let link = ConnectionState::new();
    let fault = FaultState::new();
    let log = LogStream::new();
    let mut supervisor = LinkSupervisor::new(&cfg, &link, &fault, &log);
    let mut transport = RecordingTransport::new(&link);

    link.on_connect();
    for _ in 0..40 {
        link.on_mtu_changed(100);
    }
    // Queue is full, this Disconnected event is lost
    link.on_disconnect();
    while link.poll_event().is_some_and(|e| e != ConnectionEvent::Disconnected) {}

    supervisor.poll(&mut transport, 0);
    assert_eq!(
        supervisor.poll(&mut transport, u64::from(cfg.reconnect_settle_ms)),
        LinkAction::Advertised
    );
}

#[test]
fn test_stalled_advertising_raises_and_clears_fault() {
    let mut cfg = StreamConfig::live_microphone();
    cfg.max_advertise_attempts = 2;
    let link = ConnectionState::new();
    let fault = FaultState::new();
    let log = LogStream::new();
    let mut supervisor = LinkSupervisor::new(&cfg, &link, &fault, &log);
    let mut transport = RecordingTransport::new(&link);
    transport
        .advertise_faults
        .extend([TransportFault::Advertising(-1), TransportFault::Advertising(-1)]);

    link.on_disconnect();
    supervisor.poll(&mut transport, 0);
    let settle = u64::from(cfg.reconnect_settle_ms);
    let retry = u64::from(cfg.advertise_retry_ms);

    assert!(matches!(
        supervisor.poll(&mut transport, settle),
        LinkAction::AdvertiseFailed(_)
    ));
    assert!(!fault.is_active());

    // Not due yet
    assert_eq!(supervisor.poll(&mut transport, settle + retry - 1), LinkAction::None);

    assert!(matches!(
        supervisor.poll(&mut transport, settle + retry),
        LinkAction::AdvertiseFailed(_)
    ));
    assert!(fault.is_active());
    assert_eq!(fault.code(), FaultCode::AdvertisingStalled);
    assert_eq!(fault.data(), 2);

    assert_eq!(
        supervisor.poll(&mut transport, settle + 2 * retry),
        LinkAction::Advertised
    );
    assert!(!fault.is_active());
    assert_eq!(fault.count(), 1);
}
