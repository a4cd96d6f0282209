use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::error::GpsNtpError;
use crate::gps::edge::{EdgeCapture, EdgeSource};
use crate::protocol::ntp::{NtpPacket, NtpTimestamp, nanos_to_fraction};
use crate::server::{ServerConfig, ServerState, TimeServer};
use crate::testing::{ManualClock, MockGps};

const E: i64 = 1_382_872_926;
const E_NTP: u32 = 3_591_861_726;

#[derive(Clone, Default)]
struct FlagEdges(Arc<AtomicBool>);

impl EdgeSource for FlagEdges {
    fn disable(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn loopback_config() -> ServerConfig {
    ServerConfig::builder()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .build()
}

async fn exchange(client: &UdpSocket, request: &NtpPacket) -> Option<NtpPacket> {
    let mut buf = [0u8; 128];
    client.send(&request.encode()).await.unwrap();
    let len = tokio::time::timeout(Duration::from_millis(300), client.recv(&mut buf))
        .await
        .ok()?
        .unwrap();
    NtpPacket::decode(&buf[..len]).ok()
}

#[tokio::test]
async fn test_bind_rejects_invalid_config() {
    let config = ServerConfig::builder()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .sentence_tag("GPZDA")
        .build();
    let clock = ManualClock::new(Duration::ZERO);
    let err = TimeServer::bind(config, Arc::new(EdgeCapture::new()), clock)
        .await
        .unwrap_err();
    assert!(matches!(err, GpsNtpError::InvalidConfig { .. }));
}

#[tokio::test]
async fn test_bind_reports_address_in_use() {
    let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap();
    let config = ServerConfig::builder().bind_addr(addr).build();
    let clock = ManualClock::new(Duration::ZERO);

    let err = TimeServer::bind(config, Arc::new(EdgeCapture::new()), clock)
        .await
        .unwrap_err();
    match err {
        GpsNtpError::Bind { addr: failed, .. } => assert_eq!(failed, addr),
        other => panic!("expected Bind error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_serves_disciplined_time_and_drains() {
    let clock = ManualClock::new(Duration::from_secs(E as u64));
    let capture = Arc::new(EdgeCapture::with_clock(clock.clone()));
    let server = TimeServer::bind(loopback_config(), capture.clone(), clock.clone())
        .await
        .unwrap();
    assert_eq!(server.state(), ServerState::Starting);

    let addr = server.local_addr().unwrap();
    let mut state = server.subscribe_state();
    let mut offsets = server.offsets();
    let (mut gps, device) = MockGps::new(capture, clock.clone());
    let edges = FlagEdges::default();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(server.run(device, edges.clone(), cancel.clone()));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(addr).await.unwrap();
    let request = NtpPacket::client_request(NtpTimestamp::new(0xDEAD_BEEF, 0x1234_5678));

    assert!(exchange(&client, &request).await.is_none());

    gps.pulse(E, Duration::from_millis(4), Duration::from_millis(150))
        .await
        .unwrap();
    let sample = offsets.wait_ready().await.unwrap();
    assert_eq!(sample.offset_nanos(), 4_000_000);
    state
        .wait_for(|s| *s == ServerState::Serving)
        .await
        .unwrap();

    // Local clock now reads E + 0.154; the reply carries E + 0.158.
    let reply = exchange(&client, &request).await.unwrap();
    assert_eq!(reply.originate_time, request.transmit_time);
    assert_eq!(reply.receive_time.seconds, E_NTP);
    assert_eq!(reply.receive_time.fraction, nanos_to_fraction(158_000_000));
    assert_eq!(reply.transmit_time, reply.receive_time);
    assert_eq!(reply.reference_time, NtpTimestamp::new(E_NTP, 0));
    assert_eq!(reply.reference_id_tag(), "GPS");

    client.send(&[0u8; 20]).await.unwrap();
    assert!(exchange(&client, &request).await.is_some());

    cancel.cancel();
    let report = task.await.unwrap().unwrap();
    assert_eq!(*state.borrow(), ServerState::Stopped);
    assert!(edges.0.load(Ordering::SeqCst));
    assert_eq!(report.ingest.published, 1);
    assert_eq!(report.responder.premature, 1);
    assert_eq!(report.responder.malformed, 1);
    assert_eq!(report.responder.served, 2);

    // The ingestion loop released the device.
    assert!(gps.send_line("$GPZDA").await.is_err());
}

#[tokio::test]
async fn test_device_loss_stops_server() {
    let clock = ManualClock::new(Duration::from_secs(E as u64));
    let capture = Arc::new(EdgeCapture::with_clock(clock.clone()));
    let server = TimeServer::bind(loopback_config(), capture.clone(), clock.clone())
        .await
        .unwrap();
    let mut state = server.subscribe_state();
    let offsets = server.offsets();
    let (gps, device) = MockGps::new(capture, clock);
    let edges = FlagEdges::default();

    let task = tokio::spawn(server.run(device, edges.clone(), CancellationToken::new()));
    state
        .wait_for(|s| *s == ServerState::Disciplining)
        .await
        .unwrap();
    gps.unplug();

    // Losing the device before the first sample reports the device error.
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, GpsNtpError::DeviceClosed));
    assert!(offsets.current().is_none());
    assert!(edges.0.load(Ordering::SeqCst));
    assert_eq!(*state.borrow(), ServerState::Stopped);
}
