//! The gateway event loop.
//!
//! [`Gateway`] owns the link, the dispatch table, the badge registry and the
//! pairing coordinator, and reacts to one [`GatewayEvent`] at a time. Port
//! I/O and timers run as tasks that only post events, so no two reactions
//! ever overlap.

use nowtalk_core::{BadgeStatus, BridgeInfo, MacAddress};
use nowtalk_protocol::{
    InboundFrame, InboundMessage, OutboundFrame, StatusKind, StatusLine, TrafficRecord,
};
use nowtalk_storage::BadgeRepository;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::badge::{BadgeSnapshot, PairingIdentity};
use crate::config::GatewayConfig;
use crate::dashboard::{Dashboard, NotifyCategory, notify};
use crate::dispatch::{GatewayHandler, HandlerKey, Route, Router};
use crate::error::{GatewayError, Result};
use crate::event::{
    BadgeEdit, DashboardRequest, GatewayEvent, NewBadgeSubmission, parse_edit_target,
};
use crate::firmware::{FirmwareCheck, FirmwareMonitor};
use crate::link::{
    ConnectOutcome, FrameSink, HandshakeError, LinkManager, LinkSettings, LinkState, PortOpener,
};
use crate::pairing::{
    PairingContext, PairingCoordinator, PairingFailure, PairingOutcome, PairingSettings,
};
use crate::registry::{Admission, EditOutcome, Registry};
use crate::timer::{TimerFired, TimerKind, Timers};

/// Serializable view of the gateway for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySnapshot {
    pub link: LinkState,
    pub bridge: Option<BridgeInfo>,
    pub badges: Vec<BadgeSnapshot>,
    /// Badge currently being commissioned.
    pub pairing: Option<MacAddress>,
}

/// Pull direction of the dashboard contract, plus process control.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    events: UnboundedSender<GatewayEvent>,
}

impl GatewayHandle {
    fn post(&self, event: GatewayEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| GatewayError::ChannelClosed)
    }

    /// `action` is one of `disable`, `friend` or `name`.
    pub fn submit_badge_edit(
        &self,
        mac: impl Into<String>,
        action: impl Into<String>,
        value: Value,
    ) -> Result<()> {
        self.post(GatewayEvent::Dashboard(DashboardRequest::EditBadge {
            mac: mac.into(),
            action: action.into(),
            value,
        }))
    }

    /// Answer to the onboarding form; `false` cancels.
    pub fn submit_new_badge_form(&self, payload: Value) -> Result<()> {
        self.post(GatewayEvent::Dashboard(DashboardRequest::NewBadgeForm(
            NewBadgeSubmission::from_json(payload),
        )))
    }

    pub fn firmware_changed(&self) -> Result<()> {
        self.post(GatewayEvent::FirmwareChanged)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.post(GatewayEvent::Shutdown)
    }
}

/// Sends through the link and mirrors delivered frames to the dashboard.
struct MirroredSink<'a> {
    link: &'a dyn FrameSink,
    dashboard: &'a dyn Dashboard,
}

impl FrameSink for MirroredSink<'_> {
    fn send_frame(&self, frame: OutboundFrame) -> bool {
        let record = TrafficRecord::outbound(&frame);
        let sent = self.link.send_frame(frame);
        if sent && let Some(record) = record {
            self.dashboard.traffic(&record);
        }
        sent
    }
}

pub struct Gateway<O, R, D>
where
    O: PortOpener,
    R: BadgeRepository,
    D: Dashboard,
{
    config: GatewayConfig,
    link: LinkManager<O>,
    router: Router,
    registry: Registry<R>,
    pairing: PairingCoordinator,
    dashboard: D,
    firmware: FirmwareMonitor,
    events_tx: UnboundedSender<GatewayEvent>,
    events_rx: UnboundedReceiver<GatewayEvent>,
}

impl<O, R, D> Gateway<O, R, D>
where
    O: PortOpener,
    R: BadgeRepository,
    D: Dashboard,
{
    pub fn new(config: GatewayConfig, opener: O, repo: R, dashboard: D) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let timers = Timers::new(events_tx.clone());

        Self {
            link: LinkManager::new(
                opener,
                LinkSettings::from(&config),
                timers.clone(),
                events_tx.clone(),
            ),
            router: Router::new(),
            registry: Registry::new(repo, config.allow_guests),
            pairing: PairingCoordinator::new(PairingSettings::from(&config), timers),
            dashboard,
            firmware: FirmwareMonitor::new(&config.firmware_dir),
            events_tx,
            events_rx,
            config,
        }
    }

    pub fn handle(&self) -> GatewayHandle {
        GatewayHandle {
            events: self.events_tx.clone(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn dashboard(&self) -> &D {
        &self.dashboard
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn bridge(&self) -> Option<&BridgeInfo> {
        self.link.bridge()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn registry(&self) -> &Registry<R> {
        &self.registry
    }

    pub fn pairing(&self) -> &PairingCoordinator {
        &self.pairing
    }

    pub fn snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            link: self.link.state(),
            bridge: self.link.bridge().cloned(),
            badges: self.registry.snapshot(),
            pairing: self.pairing.active_mac(),
        }
    }

    /// Load known badges and open the link.
    pub async fn start(&mut self) -> Result<()> {
        if self.config.external_ip.is_empty() {
            warn!("No external IP configured, pairing offers will carry an empty address");
        }
        self.registry.load().await?;
        self.connect();
        Ok(())
    }

    /// Open the link if it is not open. Clears a previous `disconnect()`.
    pub fn connect(&mut self) {
        if let ConnectOutcome::Failed(e) = self.link.connect() {
            debug!(error = %e, "Initial connect failed");
            self.port_unavailable();
        }
    }

    /// Close the link on request; no reconnect follows.
    pub fn disconnect(&mut self) {
        self.teardown();
        self.link.disconnect();
        info!("Gateway disconnected");
    }

    /// Run until a shutdown is requested.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let period = self.config.tick_interval();
        let mut tick = tokio::time::interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                event = self.events_rx.recv() => event,
                _ = tick.tick() => Some(GatewayEvent::Tick),
            };
            let Some(event) = event else { break };
            if !self.handle_event(event).await {
                break;
            }
        }
        Ok(())
    }

    /// Wait for and process a single event. Returns `false` after shutdown.
    pub async fn step(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => self.handle_event(event).await,
            None => false,
        }
    }

    /// React to one event. Returns `false` after shutdown.
    pub async fn handle_event(&mut self, event: GatewayEvent) -> bool {
        match event {
            GatewayEvent::Frame { generation, raw } => {
                if generation != self.link.generation() || !self.link.is_open() {
                    trace!(generation, "Frame from a closed port dropped");
                    return true;
                }
                match self.link.state() {
                    LinkState::Handshaking => self.on_handshake_response(&raw).await,
                    LinkState::Ready => self.on_frame(&raw).await,
                    state => debug!(%state, "Frame outside handshake or ready state dropped"),
                }
            }
            GatewayEvent::LinkClosed { generation, error } => {
                if generation == self.link.generation() && self.link.is_open() {
                    self.on_link_lost(error);
                }
            }
            GatewayEvent::Timer(fired) => self.on_timer(fired).await,
            GatewayEvent::Dashboard(request) => self.on_dashboard(request).await,
            GatewayEvent::FirmwareChanged => self.on_firmware_changed().await,
            GatewayEvent::Tick => self.on_tick().await,
            GatewayEvent::Shutdown => {
                self.disconnect();
                return false;
            }
        }
        true
    }

    async fn on_handshake_response(&mut self, raw: &[u8]) {
        let bridge = match self.link.complete_handshake(raw) {
            Ok(bridge) => bridge.clone(),
            Err(e) => return self.handshake_failed(e),
        };

        notify(&self.dashboard, NotifyCategory::Success, "Bridge is alive.");
        self.dashboard.on_config_changed(Some(&bridge));
        self.router.install_defaults();
        self.registry.start_all();
        self.check_firmware().await;
        self.publish_badges();
    }

    fn handshake_failed(&mut self, e: HandshakeError) {
        warn!(error = %e, "Handshake failed");
        notify(&self.dashboard, NotifyCategory::Danger, &e.to_string());
        self.teardown();
        self.schedule_reconnect("Serial port closed");
    }

    fn on_link_lost(&mut self, error: Option<String>) {
        match &error {
            Some(error) => warn!(%error, "Serial port failed"),
            None => info!("Serial port reached end of stream"),
        }
        self.teardown();
        if !self.link.is_intentionally_closed() {
            self.schedule_reconnect("Serial port closed");
        }
    }

    fn port_unavailable(&mut self) {
        self.schedule_reconnect("Serial port not found");
    }

    fn schedule_reconnect(&mut self, reason: &str) {
        let wait = self.link.reconnect_delay().as_secs_f64();
        notify(
            &self.dashboard,
            NotifyCategory::Warning,
            &format!("{reason}... waiting {wait} sec."),
        );
        self.link.schedule_reconnect();
    }

    /// Deregister all handlers, stop all badges, end any pairing attempt and
    /// drop the port.
    fn teardown(&mut self) {
        let had_bridge = self.link.bridge().is_some();
        self.pairing.cancel(PairingContext {
            router: &mut self.router,
            link: &self.link,
            dashboard: &self.dashboard,
        });
        self.router.clear();
        self.registry.stop_all();
        self.link.close_port();
        if had_bridge {
            self.dashboard.on_config_changed(None);
        }
    }

    async fn on_frame(&mut self, raw: &[u8]) {
        match InboundFrame::decode(raw) {
            InboundFrame::Message(msg) => self.dispatch(msg).await,
            InboundFrame::Released(mac) => info!(%mac, "Badge released from bridge roster"),
            InboundFrame::Status(line) => self.on_status(line),
            InboundFrame::Truncated(bytes) => {
                debug!(len = bytes.len(), "Truncated frame dropped");
            }
        }
    }

    fn on_status(&mut self, line: StatusLine) {
        match self.router.route_status(&line) {
            Route::Gateway(GatewayHandler::BridgeStatus) => {
                let category = match line.kind {
                    StatusKind::Error => NotifyCategory::Danger,
                    StatusKind::Warning => NotifyCategory::Warning,
                    StatusKind::Info | StatusKind::Banner => NotifyCategory::Info,
                };
                notify(&self.dashboard, category, &line.text);
            }
            _ => debug!(kind = ?line.kind, text = %line.text, "Unhandled bridge line"),
        }
    }

    async fn dispatch(&mut self, msg: InboundMessage) {
        trace!(mac = %msg.mac, code = %msg.code, data = %msg.data, "Message received");
        self.dashboard.traffic(&TrafficRecord::inbound(&msg));

        match self.router.route(&msg, self.registry.badge_mut(msg.mac)) {
            Route::Badge => {}
            Route::Gateway(handler) => self.run_handler(handler, &msg).await,
            Route::Unhandled => debug!(mac = %msg.mac, code = %msg.code, "Unhandled message code"),
        }
    }

    async fn run_handler(&mut self, handler: GatewayHandler, msg: &InboundMessage) {
        match handler {
            GatewayHandler::Ping => match self.registry.get(msg.mac, Admission::Guest).await {
                Ok(Some(badge)) => badge.on_ping(),
                Ok(None) => debug!(mac = %msg.mac, "Ping from unknown badge ignored"),
                Err(e) => self.report("Badge lookup failed", e),
            },
            GatewayHandler::NewDevice => self.on_new_device(msg.mac).await,
            GatewayHandler::PairingAccept => {
                let outcome = self.pairing.on_badge_accept(msg.mac, &mut self.router);
                self.resolve_pairing(outcome).await;
            }
            GatewayHandler::PairingReject => {
                let outcome = self.pairing.on_badge_reject(msg.mac, &mut self.router);
                self.resolve_pairing(outcome).await;
            }
            GatewayHandler::OperatorSubmission | GatewayHandler::BridgeStatus => {
                debug!(?handler, code = %msg.code, "Handler does not take badge messages");
            }
        }
    }

    async fn on_new_device(&mut self, mac: MacAddress) {
        if self.pairing.is_active() {
            self.pairing.reject_busy(mac, &self.dashboard);
            return;
        }

        let existing = match self.registry.get(mac, Admission::Always).await {
            Ok(badge) => badge.and_then(|badge| badge.pairing_identity(&self.config.external_ip)),
            Err(e) => return self.report("Badge lookup failed", e),
        };
        if existing.is_none()
            && let Err(e) = self.registry.reset_persisted(mac).await
        {
            self.report("Badge reset failed", e);
        }

        let outcome = self.pairing.begin(
            mac,
            existing,
            PairingContext {
                router: &mut self.router,
                link: &MirroredSink {
                    link: &self.link,
                    dashboard: &self.dashboard,
                },
                dashboard: &self.dashboard,
            },
        );
        self.resolve_pairing(outcome).await;
    }

    async fn resolve_pairing(&mut self, outcome: PairingOutcome) {
        match outcome {
            PairingOutcome::Ignored | PairingOutcome::Busy | PairingOutcome::Pending => {}
            PairingOutcome::Aborted { mac } => debug!(%mac, "Pairing ended without un-peer"),
            PairingOutcome::Confirmed { mac, identity } => {
                match self.finalize_badge(mac, &identity).await {
                    Ok(()) => notify(
                        &self.dashboard,
                        NotifyCategory::Success,
                        "New badge has been added.",
                    ),
                    Err(e) => self.report("Saving the new badge failed", e),
                }
                self.dashboard.dismiss_new_badge_form();
                self.publish_badges();
            }
            PairingOutcome::Failed { mac, reason } => {
                let sink = MirroredSink {
                    link: &self.link,
                    dashboard: &self.dashboard,
                };
                if let Err(e) = self.registry.unpeer(mac, &sink).await {
                    self.report("Un-peer failed", e);
                }
                let message = match reason {
                    PairingFailure::Rejected => "Badge refused the pairing offer.",
                    PairingFailure::TimedOut => "Timeout while adding new device.",
                    PairingFailure::InvalidOffer => "Pairing offer could not be built.",
                };
                notify(&self.dashboard, NotifyCategory::Danger, message);
                self.dashboard.dismiss_new_badge_form();
                self.publish_badges();
            }
        }
    }

    /// Apply the agreed identity, mark the badge confirmed and online, and
    /// store it.
    async fn finalize_badge(&mut self, mac: MacAddress, identity: &PairingIdentity) -> Result<()> {
        if let Some(badge) = self.registry.get(mac, Admission::Always).await? {
            badge.fill_info(identity);
            badge.set_status(BadgeStatus::CONFIRMED, true);
            badge.set_status(BadgeStatus::SESSION, true);
            badge.touch();
        }
        self.registry.persist(mac).await
    }

    async fn on_timer(&mut self, fired: TimerFired) {
        match fired.kind {
            TimerKind::Handshake => {
                if self.link.handshake_expired(&fired) {
                    self.handshake_failed(HandshakeError::TimedOut);
                }
            }
            TimerKind::Reconnect => match self.link.reconnect_due(&fired) {
                Some(ConnectOutcome::Failed(_)) => self.port_unavailable(),
                Some(outcome) => debug!(?outcome, "Reconnect attempted"),
                None => trace!(id = fired.id, "Reconnect timer ignored"),
            },
            TimerKind::Pairing => {
                let outcome = self.pairing.on_timeout(&fired, &mut self.router);
                self.resolve_pairing(outcome).await;
            }
        }
    }

    async fn on_dashboard(&mut self, request: DashboardRequest) {
        match request {
            DashboardRequest::EditBadge { mac, action, value } => {
                self.on_badge_edit(&mac, &action, &value).await;
            }
            DashboardRequest::NewBadgeForm(submission) => {
                if !self
                    .router
                    .is_registered(HandlerKey::NewBadgeForm, GatewayHandler::OperatorSubmission)
                {
                    debug!("Onboarding form submitted while none is open");
                    return;
                }
                let outcome = self.pairing.on_operator_submission(
                    submission,
                    PairingContext {
                        router: &mut self.router,
                        link: &MirroredSink {
                            link: &self.link,
                            dashboard: &self.dashboard,
                        },
                        dashboard: &self.dashboard,
                    },
                );
                self.resolve_pairing(outcome).await;
            }
        }
    }

    async fn on_badge_edit(&mut self, mac: &str, action: &str, value: &Value) {
        let outcome = match (parse_edit_target(mac), BadgeEdit::parse(action, value)) {
            (Some(mac), Ok(edit)) => match self.registry.edit(mac, edit).await {
                Ok(outcome) => outcome,
                Err(e) => return self.report("Saving the badge failed", e),
            },
            (target, edit) => {
                debug!(
                    mac,
                    action,
                    valid_target = target.is_some(),
                    valid_edit = edit.is_ok(),
                    "Badge edit refused"
                );
                EditOutcome::rejected(true)
            }
        };
        notify(&self.dashboard, outcome.category, outcome.message);
        self.publish_badges();
    }

    async fn on_firmware_changed(&mut self) {
        info!("Marking all badges for firmware update");
        if let Err(e) = self
            .registry
            .set_field_on_all(BadgeStatus::FIRMWARE_PENDING, true)
            .await
        {
            self.report("Saving firmware status failed", e);
        }
        self.publish_badges();
    }

    async fn on_tick(&mut self) {
        let expired = self
            .registry
            .expire_sessions(Instant::now(), self.config.liveness_timeout());
        if !expired.is_empty() {
            debug!(count = expired.len(), "Badge sessions expired");
            self.publish_badges();
        }
        if self.link.is_ready() {
            self.check_firmware().await;
        }
    }

    async fn check_firmware(&mut self) {
        match self.firmware.check().await {
            Ok(FirmwareCheck::Changed) => self.on_firmware_changed().await,
            Ok(check) => trace!(?check, "Firmware unchanged"),
            Err(e) => warn!(
                path = %self.firmware.path().display(),
                error = %e,
                "Firmware check failed"
            ),
        }
    }

    fn publish_badges(&self) {
        self.dashboard.on_badges_updated(&self.registry.snapshot());
    }

    fn report(&self, context: &str, e: GatewayError) {
        notify(&self.dashboard, NotifyCategory::Danger, &format!("{context}: {e}"));
    }
}
