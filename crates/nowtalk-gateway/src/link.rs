//! Serial link to the bridge.
//!
//! # State machine
//!
//! ```text
//!                 connect()
//! Disconnected ────────────> Opening ──open ok──> Handshaking ──banner──> Ready
//!      ^                        │                      │                    │
//!      │   reconnect timer      │ open failed          │ timeout / reject   │ EOF / error
//!      └────────────────────────┴──────────────────────┴────────────────────┘
//!
//! any state ──disconnect()──> Closed   (no reconnect until connect() again)
//! ```
//!
//! The port is split into a reader task, which cuts the byte stream into
//! frames on line silence, and a writer task fed through a channel. Both
//! report back to the gateway event loop tagged with the port generation.

use std::fmt;
use std::io;
use std::time::Duration;

use futures::SinkExt;
use nowtalk_core::BridgeInfo;
use nowtalk_protocol::{BridgeCodec, FrameAssembler, OutboundFrame, parse_banner};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::FramedWrite;
use tracing::{debug, info, trace, warn};

use crate::config::GatewayConfig;
use crate::event::GatewayEvent;
use crate::timer::{TimerFired, TimerHandle, TimerKind, Timers};

/// Size of a single read from the port.
const READ_CHUNK: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Opening,
    Handshaking,
    Ready,
    /// Closed on request; stays closed until `connect()`.
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Opening => "opening",
            LinkState::Handshaking => "handshaking",
            LinkState::Ready => "ready",
            LinkState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Opens the byte stream the bridge is attached to.
pub trait PortOpener {
    type Port: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn open(&self, path: &str, baud_rate: u32) -> io::Result<Self::Port>;
}

/// Opens a real serial device through `tokio-serial`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortOpener;

impl PortOpener for SerialPortOpener {
    type Port = tokio_serial::SerialStream;

    fn open(&self, path: &str, baud_rate: u32) -> io::Result<Self::Port> {
        tokio_serial::new(path, baud_rate)
            .open_native_async()
            .map_err(io::Error::from)
    }
}

/// Anything application frames can be sent through.
pub trait FrameSink {
    /// Queue `frame` for sending. Returns `false` if the link is not ready.
    fn send_frame(&self, frame: OutboundFrame) -> bool;
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Bridge was rejected: {0:?}")]
    Rejected(String),

    #[error("Bridge did not respond on time.")]
    TimedOut,
}

#[derive(Debug)]
pub enum ConnectOutcome {
    AlreadyOpen,
    /// No serial path is configured.
    NotConfigured,
    Opened,
    Failed(io::Error),
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub path: Option<String>,
    pub baud_rate: u32,
    pub handshake_timeout: Duration,
    pub reconnect_delay: Duration,
    pub inter_byte_timeout: Duration,
}

impl From<&GatewayConfig> for LinkSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            path: config.serialport.clone(),
            baud_rate: config.baudrate,
            handshake_timeout: config.handshake_timeout(),
            reconnect_delay: config.reconnect_delay(),
            inter_byte_timeout: config.inter_byte_timeout(),
        }
    }
}

struct PortTasks {
    writer_tx: UnboundedSender<OutboundFrame>,
    reader: JoinHandle<()>,
}

pub struct LinkManager<O: PortOpener> {
    opener: O,
    settings: LinkSettings,
    state: LinkState,
    /// Incremented on every successful open.
    generation: u64,
    intentional_close: bool,
    port: Option<PortTasks>,
    bridge: Option<BridgeInfo>,
    handshake_timer: Option<TimerHandle>,
    reconnect_timer: Option<TimerHandle>,
    timers: Timers,
    events: UnboundedSender<GatewayEvent>,
    unconfigured_reported: bool,
}

impl<O: PortOpener> LinkManager<O> {
    pub fn new(
        opener: O,
        settings: LinkSettings,
        timers: Timers,
        events: UnboundedSender<GatewayEvent>,
    ) -> Self {
        Self {
            opener,
            settings,
            state: LinkState::Disconnected,
            generation: 0,
            intentional_close: false,
            port: None,
            bridge: None,
            handshake_timer: None,
            reconnect_timer: None,
            timers,
            events,
            unconfigured_reported: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.state == LinkState::Ready
    }

    pub fn is_intentionally_closed(&self) -> bool {
        self.intentional_close
    }

    pub fn bridge(&self) -> Option<&BridgeInfo> {
        self.bridge.as_ref()
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.settings.reconnect_delay
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    /// Open the port and start the handshake.
    ///
    /// A no-op if the port is already open. Without a configured path the
    /// link stays down; this is reported once.
    pub fn connect(&mut self) -> ConnectOutcome {
        if self.is_open() {
            return ConnectOutcome::AlreadyOpen;
        }
        self.intentional_close = false;
        if self.state == LinkState::Closed {
            self.state = LinkState::Disconnected;
        }

        let Some(path) = self.settings.path.clone() else {
            if !self.unconfigured_reported {
                warn!("No serial port configured, the bridge link stays down");
                self.unconfigured_reported = true;
            }
            return ConnectOutcome::NotConfigured;
        };
        self.open(&path)
    }

    fn open(&mut self, path: &str) -> ConnectOutcome {
        self.reconnect_timer = None;
        self.state = LinkState::Opening;
        info!(
            path,
            baud_rate = self.settings.baud_rate,
            "Opening serial port"
        );

        match self.opener.open(path, self.settings.baud_rate) {
            Ok(port) => {
                self.attach(port);
                self.begin_handshake();
                ConnectOutcome::Opened
            }
            Err(e) => {
                warn!(path, error = %e, "Failed to open serial port");
                self.state = LinkState::Disconnected;
                ConnectOutcome::Failed(e)
            }
        }
    }

    fn attach(&mut self, port: O::Port) {
        self.generation += 1;
        let generation = self.generation;
        let (read_half, write_half) = tokio::io::split(port);
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_frames(
            read_half,
            generation,
            self.settings.inter_byte_timeout,
            self.events.clone(),
        ));
        tokio::spawn(write_frames(
            write_half,
            writer_rx,
            generation,
            self.events.clone(),
        ));

        self.port = Some(PortTasks { writer_tx, reader });
        debug!(generation, "Serial port attached");
    }

    fn begin_handshake(&mut self) {
        self.state = LinkState::Handshaking;
        self.queue(OutboundFrame::Handshake);
        self.handshake_timer = Some(
            self.timers
                .arm(TimerKind::Handshake, self.settings.handshake_timeout),
        );
        debug!(generation = self.generation, "Handshake sent");
    }

    /// Consume the first frame received while handshaking.
    ///
    /// On success the link is `Ready` and the parsed bridge metadata is
    /// returned. On failure the caller closes the port.
    pub fn complete_handshake(&mut self, raw: &[u8]) -> Result<&BridgeInfo, HandshakeError> {
        self.handshake_timer = None;
        let text = String::from_utf8_lossy(raw);
        match parse_banner(&text) {
            Ok(info) => {
                self.state = LinkState::Ready;
                info!(bridge = %info, "Bridge is alive");
                Ok(self.bridge.insert(info))
            }
            Err(e) => {
                debug!(error = %e, "Handshake response rejected");
                Err(HandshakeError::Rejected(text.into_owned()))
            }
        }
    }

    /// `true` if `fired` is the live handshake timer.
    pub fn handshake_expired(&mut self, fired: &TimerFired) -> bool {
        let live = self.state == LinkState::Handshaking
            && self
                .handshake_timer
                .as_ref()
                .is_some_and(|timer| timer.matches(fired));
        if live {
            self.handshake_timer = None;
        }
        live
    }

    /// Arm the reconnect timer unless the link was closed on request.
    pub fn schedule_reconnect(&mut self) {
        if self.intentional_close {
            return;
        }
        self.reconnect_timer = Some(
            self.timers
                .arm(TimerKind::Reconnect, self.settings.reconnect_delay),
        );
    }

    /// Handle a reconnect timer. Returns `None` for a stale timer or when
    /// reconnecting is not wanted.
    pub fn reconnect_due(&mut self, fired: &TimerFired) -> Option<ConnectOutcome> {
        if !self
            .reconnect_timer
            .as_ref()
            .is_some_and(|timer| timer.matches(fired))
        {
            return None;
        }
        self.reconnect_timer = None;
        self.reconnect()
    }

    fn reconnect(&mut self) -> Option<ConnectOutcome> {
        if self.intentional_close || self.is_open() {
            return None;
        }
        let path = self.settings.path.clone()?;
        Some(self.open(&path))
    }

    /// Drop the port. Returns `false` if it was not open.
    pub fn close_port(&mut self) -> bool {
        self.handshake_timer = None;
        self.bridge = None;
        let Some(port) = self.port.take() else {
            return false;
        };
        port.reader.abort();
        // the writer drains what is queued, then releases its half
        drop(port.writer_tx);
        if self.state != LinkState::Closed {
            self.state = LinkState::Disconnected;
        }
        info!(generation = self.generation, "Serial port closed");
        true
    }

    /// Close on request and suppress reconnects.
    pub fn disconnect(&mut self) {
        self.intentional_close = true;
        self.reconnect_timer = None;
        self.close_port();
        self.state = LinkState::Closed;
    }

    fn queue(&self, frame: OutboundFrame) -> bool {
        self.port
            .as_ref()
            .is_some_and(|port| port.writer_tx.send(frame).is_ok())
    }
}

impl<O: PortOpener> FrameSink for LinkManager<O> {
    fn send_frame(&self, frame: OutboundFrame) -> bool {
        if self.state != LinkState::Ready {
            return false;
        }
        self.queue(frame)
    }
}

/// Cut the inbound byte stream into frames on `silence` and forward them.
async fn read_frames<R>(
    mut reader: R,
    generation: u64,
    silence: Duration,
    events: UnboundedSender<GatewayEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; READ_CHUNK];

    let error = loop {
        let read = if assembler.is_pending() {
            match tokio::time::timeout(silence, reader.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => {
                    if let Some(raw) = assembler.take_frame() {
                        trace!(generation, len = raw.len(), "Frame received");
                        if events.send(GatewayEvent::Frame { generation, raw }).is_err() {
                            return;
                        }
                    }
                    continue;
                }
            }
        } else {
            reader.read(&mut buf).await
        };

        match read {
            Ok(0) => break None,
            Ok(n) => {
                if !assembler.feed(&buf[..n]) {
                    warn!(
                        generation,
                        discarded = assembler.discarded(),
                        "Inbound buffer overflow, bytes discarded"
                    );
                }
            }
            Err(e) => break Some(e.to_string()),
        }
    };

    if let Some(raw) = assembler.take_frame() {
        let _ = events.send(GatewayEvent::Frame { generation, raw });
    }
    let _ = events.send(GatewayEvent::LinkClosed { generation, error });
}

async fn write_frames<W>(
    writer: W,
    mut frames: UnboundedReceiver<OutboundFrame>,
    generation: u64,
    events: UnboundedSender<GatewayEvent>,
) where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, BridgeCodec::new());
    while let Some(frame) = frames.recv().await {
        match sink.send(frame).await {
            Ok(()) => {}
            Err(nowtalk_core::Error::Io(e)) => {
                let _ = events.send(GatewayEvent::LinkClosed {
                    generation,
                    error: Some(e.to_string()),
                });
                return;
            }
            Err(e) => warn!(generation, error = %e, "Outbound frame dropped"),
        }
    }
}
