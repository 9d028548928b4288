//! Integration tests for the tracking server.
//!
//! These tests drive the public API end to end:
//! - Datagram rules across several clients (fixes, traffic, thermals)
//! - OGN reports merged into traffic responses and user name lookups
//! - Snapshot save and restore feeding a fresh server
//! - The UDP event loop answering pings and saving on shutdown
//!
//! Run with: `cargo test --test server_integration`

use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use glidecloud::geo::GeoPoint;
use glidecloud::ogn::{parse_line, OgnClientConfig};
use glidecloud::persist::Database;
use glidecloud::protocol::{
    decode, encode, Datagram, DatagramSink, Fix, Packet, ThermalRecord, SERVER_KEY,
    TRAFFIC_FLAG_NEAR, USER_NAME_FLAG_NOT_FOUND,
};
use glidecloud::registry::FIRST_TRAFFIC_ID;
use glidecloud::server::{Server, ServerConfig, ServerRuntime};

// ============================================================================
// Test Helpers
// ============================================================================

/// Sink that keeps every datagram for inspection.
#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
}

impl DatagramSink for Recorder {
    fn send_datagram(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()> {
        self.sent.lock().unwrap().push((datagram.to_vec(), target));
        Ok(())
    }
}

impl Recorder {
    fn take(&self) -> Vec<(Datagram, SocketAddr)> {
        self.sent
            .lock()
            .unwrap()
            .drain(..)
            .map(|(bytes, target)| (decode(&bytes).unwrap(), target))
            .collect()
    }
}

const ALICE: u64 = 0xa11ce;
const BOB: u64 = 0xb0b;

/// Close to the OGN beacon below (44.2568N, 6.0005E).
const SISTERON: GeoPoint = GeoPoint::new(44.25, 6.0);
const SISTERON_EAST: GeoPoint = GeoPoint::new(44.26, 6.02);

const OGN_LINE: &str = "FLRDDA5BA>APRS,qAS,LFMX:/160829h4415.41N/00600.03E'342/049/A=005524 id0ADDA5BA -454fpm -1.1rot 8.8dB 0e +51.2kHz gps4x5";

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([192, 0, 2, 1], port))
}

fn keyed(key: u64, packet: Packet) -> Vec<u8> {
    encode(key, &packet).to_vec()
}

fn send_fix(server: &mut Server<Recorder>, key: u64, from: SocketAddr, at: GeoPoint, now: Instant) {
    let fix = Fix {
        time_of_day_ms: 12 * 3_600_000,
        location: Some(at),
        altitude: Some(1500),
        track: Some(90),
        vario: Some(1.5),
        ..Default::default()
    };
    server.handle_datagram(&keyed(key, Packet::Fix(fix)), from, now);
}

// ============================================================================
// Dispatch Scenarios
// ============================================================================

#[test]
fn test_fix_then_near_traffic_request() {
    let now = Instant::now();
    let mut server = Server::new(ServerConfig::default(), Recorder::default());

    send_fix(&mut server, ALICE, addr(1), SISTERON, now);
    send_fix(&mut server, BOB, addr(2), SISTERON_EAST, now);
    server.sink().take();

    let request = keyed(BOB, Packet::TrafficRequest { flags: TRAFFIC_FLAG_NEAR });
    server.handle_datagram(&request, addr(2), now + Duration::from_secs(1));

    let sent = server.sink().take();
    assert_eq!(sent.len(), 1);
    let (datagram, target) = &sent[0];
    assert_eq!(*target, addr(2));
    assert_eq!(datagram.key, SERVER_KEY);
    let Packet::TrafficResponse(records) = &datagram.packet else {
        panic!("expected traffic response, got {:?}", datagram.packet);
    };
    let alice_id = server.registries().clients.find(&ALICE).unwrap().value.id;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pilot_id, alice_id);
    assert_eq!(records[0].altitude, 1500);
    assert_eq!(records[0].location, SISTERON);
}

#[test]
fn test_subscribed_client_receives_pushed_fix() {
    let now = Instant::now();
    let mut server = Server::new(ServerConfig::default(), Recorder::default());

    send_fix(&mut server, BOB, addr(2), SISTERON_EAST, now);
    let request = keyed(BOB, Packet::TrafficRequest { flags: 0 });
    server.handle_datagram(&request, addr(2), now);
    server.sink().take();

    send_fix(&mut server, ALICE, addr(1), SISTERON, now + Duration::from_secs(2));

    let sent = server.sink().take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, addr(2));
    assert!(matches!(&sent[0].0.packet, Packet::TrafficResponse(r) if r.len() == 1));
}

#[test]
fn test_anonymous_thermal_is_rejected() {
    let now = Instant::now();
    let mut server = Server::new(ServerConfig::default(), Recorder::default());

    let thermal = ThermalRecord {
        time_of_day_ms: 0,
        bottom: SISTERON,
        top: SISTERON,
        bottom_altitude: 800,
        top_altitude: 2100,
        lift: 2.5,
    };
    server.handle_datagram(&keyed(ALICE, Packet::ThermalSubmit(thermal.clone())), addr(1), now);
    assert!(server.registries().thermals.is_empty());

    // Once known, the same submission is stored and served to others.
    server.handle_datagram(&keyed(ALICE, Packet::Ping { id: 1 }), addr(1), now);
    server.handle_datagram(&keyed(ALICE, Packet::ThermalSubmit(thermal)), addr(1), now);
    assert_eq!(server.registries().thermals.len(), 1);

    send_fix(&mut server, BOB, addr(2), SISTERON_EAST, now);
    server.sink().take();
    server.handle_datagram(&keyed(BOB, Packet::ThermalRequest { flags: 0 }), addr(2), now);

    let sent = server.sink().take();
    assert_eq!(sent.len(), 1);
    let Packet::ThermalResponse(records) = &sent[0].0.packet else {
        panic!("expected thermal response");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].top_altitude, 2100);
}

// ============================================================================
// OGN Traffic
// ============================================================================

#[test]
fn test_ogn_report_served_as_traffic_and_named() {
    let now = Instant::now();
    let mut server = Server::new(ServerConfig::default(), Recorder::default());

    let report = parse_line(OGN_LINE).expect("beacon parses");
    server.apply_traffic_report(report, now);
    assert_eq!(server.registries().traffic.len(), 1);

    send_fix(&mut server, BOB, addr(2), SISTERON_EAST, now);
    server.sink().take();
    let request = keyed(BOB, Packet::TrafficRequest { flags: TRAFFIC_FLAG_NEAR });
    server.handle_datagram(&request, addr(2), now);

    let sent = server.sink().take();
    let Packet::TrafficResponse(records) = &sent[0].0.packet else {
        panic!("expected traffic response");
    };
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pilot_id, FIRST_TRAFFIC_ID);
    assert_eq!(records[0].track, 342);

    let lookup = keyed(BOB, Packet::UserNameRequest { user_id: FIRST_TRAFFIC_ID });
    server.handle_datagram(&lookup, addr(2), now);
    let sent = server.sink().take();
    let Packet::UserNameResponse(response) = &sent[0].0.packet else {
        panic!("expected user name response");
    };
    assert_eq!(response.name, "FLRDDA5BA");
    assert_eq!(response.flags, 0);

    let missing = keyed(BOB, Packet::UserNameRequest { user_id: FIRST_TRAFFIC_ID + 7 });
    server.handle_datagram(&missing, addr(2), now);
    let sent = server.sink().take();
    let Packet::UserNameResponse(response) = &sent[0].0.packet else {
        panic!("expected user name response");
    };
    assert_eq!(response.flags, USER_NAME_FLAG_NOT_FOUND);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_snapshot_restores_into_new_server() {
    let dir = tempfile::tempdir().unwrap();
    let database = Database::new(dir.path().join("state.db"));
    let now = Instant::now();

    let mut server = Server::new(ServerConfig::default(), Recorder::default());
    send_fix(&mut server, ALICE, addr(1), SISTERON, now);
    server.apply_traffic_report(parse_line(OGN_LINE).unwrap(), now);
    database.save(server.registries()).unwrap();

    let restored = database.load().unwrap();
    assert_eq!(restored.clients.len(), 1);
    assert_eq!(restored.traffic.len(), 1);

    let mut server = Server::with_state(
        ServerConfig::default(),
        Recorder::default(),
        restored,
        Instant::now(),
    );
    send_fix(&mut server, BOB, addr(2), SISTERON_EAST, Instant::now());
    server.sink().take();
    let request = keyed(BOB, Packet::TrafficRequest { flags: TRAFFIC_FLAG_NEAR });
    server.handle_datagram(&request, addr(2), Instant::now());

    let sent = server.sink().take();
    let Packet::TrafficResponse(records) = &sent[0].0.packet else {
        panic!("expected traffic response");
    };
    assert_eq!(records.len(), 2);
}

#[test]
fn test_missing_database_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let database = Database::new(dir.path().join("absent.db"));
    assert!(database.load().unwrap().is_empty());
}

// ============================================================================
// Event Loop
// ============================================================================

#[tokio::test]
async fn test_runtime_answers_ping_and_saves_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");

    let runtime = ServerRuntime::bind(
        "127.0.0.1:0".parse().unwrap(),
        ServerConfig::default(),
        Database::new(&path),
        OgnClientConfig::default(),
    )
    .await
    .unwrap();
    let server_addr = runtime.local_addr();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(runtime.run(shutdown.clone()));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(&keyed(ALICE, Packet::Ping { id: 42 }), server_addr)
        .await
        .unwrap();

    let mut buf = [0u8; 1024];
    let (len, from) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("ack within timeout")
        .unwrap();
    assert_eq!(from, server_addr);
    let ack = decode(&buf[..len]).unwrap();
    assert_eq!(ack.key, SERVER_KEY);
    assert_eq!(ack.packet, Packet::Ack { id: 42, flags: 0 });

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server stops")
        .unwrap()
        .unwrap();

    let restored = Database::new(&path).load().unwrap();
    assert_eq!(restored.clients.len(), 1);
}

#[tokio::test]
async fn test_runtime_rejects_corrupt_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.db");
    std::fs::write(&path, b"definitely not a snapshot").unwrap();

    let result = ServerRuntime::bind(
        "127.0.0.1:0".parse().unwrap(),
        ServerConfig::default(),
        Database::new(&path),
        OgnClientConfig::default(),
    )
    .await;
    assert!(matches!(
        result,
        Err(glidecloud::server::ServerError::Load(_))
    ));
}
