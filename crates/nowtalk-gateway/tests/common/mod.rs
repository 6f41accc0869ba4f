//! Shared fixtures for gateway integration tests.
//!
//! A [`DuplexOpener`] replaces the serial port with an in-process pipe and
//! hands the far end to the test as a [`BridgeSide`]. A
//! [`RecordingDashboard`] captures everything the gateway pushes to the
//! operator. Time is real; the gateway config shrinks every timeout to a
//! few hundred milliseconds.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nowtalk_core::{BridgeInfo, MacAddress, MessageCode};
use nowtalk_gateway::{
    BadgeSnapshot, Dashboard, Gateway, GatewayConfig, GatewayHandle, NotifyCategory, PortOpener,
};
use nowtalk_protocol::{OutboundFrame, TrafficRecord};
use nowtalk_storage::{Database, SqliteBadgeRepository};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

pub const BANNER: &[u8] = b"#**1.0~aabbcc~6~BR123";
pub const EXTERNAL_IP: &str = "203.0.113.7";
pub const SERVER_NAME: &str = "nowTalk";

/// Longer than the configured inter-byte silence.
const FRAME_GAP: Duration = Duration::from_millis(60);

const STEP_LIMIT: Duration = Duration::from_secs(5);

pub fn mac(raw: u64) -> MacAddress {
    MacAddress::new(raw).unwrap()
}

pub fn test_config() -> GatewayConfig {
    GatewayConfig {
        serialport: Some("/dev/ttyNOWTALK".to_string()),
        external_ip: EXTERNAL_IP.to_string(),
        server_name: SERVER_NAME.to_string(),
        firmware_dir: "/nonexistent/nowtalk/firmware".into(),
        inter_byte_timeout_ms: 20,
        handshake_timeout_ms: 300,
        reconnect_delay_ms: 200,
        pairing_timeout_ms: 400,
        ..GatewayConfig::default()
    }
}

/// Raw inbound application frame as the bridge would emit it.
pub fn badge_frame(mac: MacAddress, code: MessageCode, payload: &str) -> Vec<u8> {
    let mut raw = vec![0x02];
    raw.extend_from_slice(&mac.to_bytes());
    raw.push(1 + payload.len() as u8);
    raw.push(code.as_u8());
    raw.extend_from_slice(payload.as_bytes());
    raw
}

#[derive(Default)]
struct DashboardLog {
    notes: Vec<(NotifyCategory, String)>,
    form_requests: usize,
    dismissed: usize,
    bridge: Option<BridgeInfo>,
    config_changes: usize,
    traffic: Vec<TrafficRecord>,
    badges: Vec<BadgeSnapshot>,
}

#[derive(Clone, Default)]
pub struct RecordingDashboard {
    accepts_form: Arc<AtomicBool>,
    log: Arc<Mutex<DashboardLog>>,
}

impl RecordingDashboard {
    pub fn set_accepts_form(&self, accepts: bool) {
        self.accepts_form.store(accepts, Ordering::SeqCst);
    }

    pub fn notes(&self) -> Vec<(NotifyCategory, String)> {
        self.log.lock().unwrap().notes.clone()
    }

    pub fn has_note(&self, category: NotifyCategory, message: &str) -> bool {
        self.notes()
            .iter()
            .any(|(c, m)| *c == category && m == message)
    }

    pub fn form_requests(&self) -> usize {
        self.log.lock().unwrap().form_requests
    }

    pub fn dismissed(&self) -> usize {
        self.log.lock().unwrap().dismissed
    }

    pub fn bridge(&self) -> Option<BridgeInfo> {
        self.log.lock().unwrap().bridge.clone()
    }

    pub fn config_changes(&self) -> usize {
        self.log.lock().unwrap().config_changes
    }

    pub fn traffic(&self) -> Vec<TrafficRecord> {
        self.log.lock().unwrap().traffic.clone()
    }

    pub fn badges(&self) -> Vec<BadgeSnapshot> {
        self.log.lock().unwrap().badges.clone()
    }
}

impl Dashboard for RecordingDashboard {
    fn notify(&self, category: NotifyCategory, message: &str) {
        self.log
            .lock()
            .unwrap()
            .notes
            .push((category, message.to_string()));
    }

    fn request_new_badge_form(&self) -> bool {
        self.log.lock().unwrap().form_requests += 1;
        self.accepts_form.load(Ordering::SeqCst)
    }

    fn dismiss_new_badge_form(&self) {
        self.log.lock().unwrap().dismissed += 1;
    }

    fn on_config_changed(&self, bridge: Option<&BridgeInfo>) {
        let mut log = self.log.lock().unwrap();
        log.bridge = bridge.cloned();
        log.config_changes += 1;
    }

    fn on_badges_updated(&self, badges: &[BadgeSnapshot]) {
        self.log.lock().unwrap().badges = badges.to_vec();
    }

    fn traffic(&self, record: &TrafficRecord) {
        self.log.lock().unwrap().traffic.push(record.clone());
    }
}

#[derive(Clone, Default)]
pub struct DuplexOpener {
    peers: Arc<Mutex<VecDeque<DuplexStream>>>,
    opens: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl DuplexOpener {
    /// Number of open attempts, failed ones included.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Far end of the most recently opened port that was not taken yet.
    pub fn take_bridge(&self) -> BridgeSide {
        let stream = self
            .peers
            .lock()
            .unwrap()
            .pop_front()
            .expect("no port opened");
        BridgeSide { stream }
    }
}

impl PortOpener for DuplexOpener {
    type Port = DuplexStream;

    fn open(&self, _path: &str, _baud_rate: u32) -> io::Result<DuplexStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such device"));
        }
        let (gateway, bridge) = tokio::io::duplex(4096);
        self.peers.lock().unwrap().push_back(bridge);
        Ok(gateway)
    }
}

/// The bridge end of the fake serial line.
pub struct BridgeSide {
    stream: DuplexStream,
}

impl BridgeSide {
    pub async fn expect_sentinel(&mut self) {
        let mut sentinel = [0u8; 5];
        self.stream.read_exact(&mut sentinel).await.unwrap();
        assert_eq!(&sentinel, b"***\n\0");
    }

    /// Write one frame and wait long enough for the line to go silent.
    pub async fn send(&mut self, raw: &[u8]) {
        self.stream.write_all(raw).await.unwrap();
        tokio::time::sleep(FRAME_GAP).await;
    }

    pub async fn expect_frame(&mut self, expected: &OutboundFrame) {
        let expected = expected.to_bytes().unwrap();
        let mut received = vec![0u8; expected.len()];
        tokio::time::timeout(STEP_LIMIT, self.stream.read_exact(&mut received))
            .await
            .expect("no frame from gateway")
            .unwrap();
        assert_eq!(received, expected.to_vec());
    }

    pub async fn expect_silence(&mut self) {
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(Duration::from_millis(100), self.stream.read(&mut buf)).await;
        assert!(read.is_err(), "unexpected bytes from gateway: {read:?}");
    }
}

pub type TestGateway = Gateway<DuplexOpener, SqliteBadgeRepository, RecordingDashboard>;

pub struct Rig {
    pub gateway: TestGateway,
    pub handle: GatewayHandle,
    pub opener: DuplexOpener,
    pub dashboard: RecordingDashboard,
    pub repo: SqliteBadgeRepository,
    pub db: Database,
}

impl Rig {
    pub async fn new(config: GatewayConfig) -> Self {
        let db = Database::in_memory().await.unwrap();
        let repo = SqliteBadgeRepository::new(db.pool().clone());
        let opener = DuplexOpener::default();
        let dashboard = RecordingDashboard::default();
        let gateway = Gateway::new(config, opener.clone(), repo.clone(), dashboard.clone());
        let handle = gateway.handle();
        Self {
            gateway,
            handle,
            opener,
            dashboard,
            repo,
            db,
        }
    }

    /// Process the next event, failing the test if none arrives.
    pub async fn step(&mut self) -> bool {
        tokio::time::timeout(STEP_LIMIT, self.gateway.step())
            .await
            .expect("gateway saw no event")
    }

    /// Start the gateway and complete the handshake.
    pub async fn ready(config: GatewayConfig) -> (Self, BridgeSide) {
        let mut rig = Self::new(config).await;
        rig.gateway.start().await.unwrap();
        let mut bridge = rig.opener.take_bridge();
        bridge.expect_sentinel().await;
        bridge.send(BANNER).await;
        assert!(rig.step().await);
        (rig, bridge)
    }
}
