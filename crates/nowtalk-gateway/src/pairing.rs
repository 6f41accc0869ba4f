//! Badge commissioning.
//!
//! ```text
//!            h05, no identity                 form submitted
//!   Idle ───────────────────> AwaitingOperator ─────────────> AwaitingBadgeConfirm
//!    ^  \                          │                              │
//!    │   \ h05, confirmed badge    │ cancel / timeout             │ h10 / h11 / timeout
//!    │    └───────────────────────────────────────────────────────>
//!    └─────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Only one attempt runs at a time. The attempt owns every transient
//! handler it registers and releases exactly those on each exit path. Its
//! timeout is matched by timer id, so a fire that races a transition is
//! ignored.

use std::mem;
use std::time::Duration;

use nowtalk_core::{MacAddress, MessageCode};
use nowtalk_protocol::{OutboundFrame, PairingOffer};
use tracing::{debug, info, warn};

use crate::badge::PairingIdentity;
use crate::config::GatewayConfig;
use crate::dashboard::{Dashboard, NotifyCategory, notify};
use crate::dispatch::{GatewayHandler, HandlerKey, Router};
use crate::event::NewBadgeSubmission;
use crate::link::FrameSink;
use crate::timer::{TimerFired, TimerHandle, TimerKind, Timers};

const FORM_HANDLERS: &[(HandlerKey, GatewayHandler)] =
    &[(HandlerKey::NewBadgeForm, GatewayHandler::OperatorSubmission)];

const CONFIRM_HANDLERS: &[(HandlerKey, GatewayHandler)] = &[
    (
        HandlerKey::Code(MessageCode::PAIRING_ACCEPT),
        GatewayHandler::PairingAccept,
    ),
    (
        HandlerKey::Code(MessageCode::PAIRING_REJECT),
        GatewayHandler::PairingReject,
    ),
];

#[derive(Debug, Clone)]
pub struct PairingSettings {
    pub external_ip: String,
    pub server_name: String,
    pub timeout: Duration,
}

impl From<&GatewayConfig> for PairingSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            external_ip: config.external_ip.clone(),
            server_name: config.server_name.clone(),
            timeout: config.pairing_timeout(),
        }
    }
}

/// Collaborators a transition may touch.
pub struct PairingContext<'a> {
    pub router: &'a mut Router,
    pub link: &'a dyn FrameSink,
    pub dashboard: &'a dyn Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingFailure {
    /// The badge answered `h11`.
    Rejected,
    TimedOut,
    /// The offer could not be encoded.
    InvalidOffer,
}

/// What the gateway has to do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// Not addressed to the active attempt.
    Ignored,
    /// Another attempt is running; nothing changed.
    Busy,
    /// The attempt is still running.
    Pending,
    /// Ended without an un-peer.
    Aborted { mac: MacAddress },
    /// The badge accepted; finalize it with `identity`.
    Confirmed {
        mac: MacAddress,
        identity: PairingIdentity,
    },
    /// Un-peer the badge and report the failure.
    Failed {
        mac: MacAddress,
        reason: PairingFailure,
    },
}

#[derive(Debug)]
struct PairingAttempt {
    generation: u64,
    mac: MacAddress,
    identity: Option<PairingIdentity>,
    timeout: Option<TimerHandle>,
    handlers: Vec<(HandlerKey, GatewayHandler)>,
}

impl PairingAttempt {
    fn register(&mut self, router: &mut Router, handlers: &[(HandlerKey, GatewayHandler)]) {
        for &(key, handler) in handlers {
            router.register(key, handler);
            if !self.handlers.contains(&(key, handler)) {
                self.handlers.push((key, handler));
            }
        }
    }

    fn deregister(&mut self, router: &mut Router, handlers: &[(HandlerKey, GatewayHandler)]) {
        for &(key, handler) in handlers {
            router.deregister(key, handler);
            self.handlers.retain(|entry| *entry != (key, handler));
        }
    }

    /// Drop the timeout and every handler this attempt registered.
    fn release(mut self, router: &mut Router) -> MacAddress {
        self.timeout = None;
        for (key, handler) in self.handlers.drain(..) {
            router.deregister(key, handler);
        }
        debug!(generation = self.generation, mac = %self.mac, "Pairing attempt released");
        self.mac
    }
}

#[derive(Debug, Default)]
enum PairingState {
    #[default]
    Idle,
    AwaitingOperator(PairingAttempt),
    AwaitingBadgeConfirm(PairingAttempt),
}

pub struct PairingCoordinator {
    state: PairingState,
    generation: u64,
    timers: Timers,
    settings: PairingSettings,
}

impl PairingCoordinator {
    pub fn new(settings: PairingSettings, timers: Timers) -> Self {
        Self {
            state: PairingState::Idle,
            generation: 0,
            timers,
            settings,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.state, PairingState::Idle)
    }

    /// MAC of the badge being commissioned.
    pub fn active_mac(&self) -> Option<MacAddress> {
        match &self.state {
            PairingState::Idle => None,
            PairingState::AwaitingOperator(attempt)
            | PairingState::AwaitingBadgeConfirm(attempt) => Some(attempt.mac),
        }
    }

    pub fn is_awaiting_operator(&self) -> bool {
        matches!(self.state, PairingState::AwaitingOperator(_))
    }

    pub fn is_awaiting_badge(&self) -> bool {
        matches!(self.state, PairingState::AwaitingBadgeConfirm(_))
    }

    /// Tell the requester that an attempt is already running.
    pub fn reject_busy(&self, mac: MacAddress, dashboard: &dyn Dashboard) -> PairingOutcome {
        warn!(%mac, active = ?self.active_mac(), "Pairing already in progress");
        notify(dashboard, NotifyCategory::Danger, "New Badge in use.");
        PairingOutcome::Busy
    }

    /// Start commissioning `mac` after a new-device announcement.
    ///
    /// With an `existing` identity the offer is re-sent straight away;
    /// otherwise the operator is asked to name the badge.
    pub fn begin(
        &mut self,
        mac: MacAddress,
        existing: Option<PairingIdentity>,
        ctx: PairingContext<'_>,
    ) -> PairingOutcome {
        if self.is_active() {
            return self.reject_busy(mac, ctx.dashboard);
        }
        self.generation += 1;
        let mut attempt = PairingAttempt {
            generation: self.generation,
            mac,
            identity: None,
            timeout: None,
            handlers: Vec::new(),
        };

        match existing {
            Some(identity) => {
                info!(%mac, generation = self.generation, "Re-pairing confirmed badge");
                self.offer(attempt, identity, ctx)
            }
            None => {
                if !ctx.dashboard.request_new_badge_form() {
                    warn!(%mac, "No dashboard session to name the new badge, pairing aborted");
                    return PairingOutcome::Aborted { mac };
                }
                info!(%mac, generation = self.generation, "Waiting for operator to name the badge");
                attempt.register(ctx.router, FORM_HANDLERS);
                attempt.timeout = Some(self.arm_timeout());
                self.state = PairingState::AwaitingOperator(attempt);
                PairingOutcome::Pending
            }
        }
    }

    /// Operator answer to the onboarding form.
    pub fn on_operator_submission(
        &mut self,
        submission: NewBadgeSubmission,
        ctx: PairingContext<'_>,
    ) -> PairingOutcome {
        let mut attempt = match mem::take(&mut self.state) {
            PairingState::AwaitingOperator(attempt) => attempt,
            other => {
                self.state = other;
                debug!("Onboarding form submitted with no attempt waiting for it");
                return PairingOutcome::Ignored;
            }
        };

        match submission {
            NewBadgeSubmission::Form { badge_id, username } => {
                attempt.deregister(ctx.router, FORM_HANDLERS);
                let identity = PairingIdentity {
                    badge_id,
                    name: username,
                    ip: self.settings.external_ip.clone(),
                };
                self.offer(attempt, identity, ctx)
            }
            NewBadgeSubmission::Cancel => {
                let mac = attempt.release(ctx.router);
                info!(%mac, "Pairing cancelled by operator");
                PairingOutcome::Aborted { mac }
            }
            NewBadgeSubmission::Inconclusive(value) => {
                debug!(%value, "Inconclusive onboarding submission, keeping the form open");
                attempt.register(ctx.router, FORM_HANDLERS);
                attempt.timeout = Some(self.arm_timeout());
                self.state = PairingState::AwaitingOperator(attempt);
                PairingOutcome::Pending
            }
        }
    }

    /// `h10` from a badge.
    pub fn on_badge_accept(&mut self, mac: MacAddress, router: &mut Router) -> PairingOutcome {
        let Some(attempt) = self.take_confirming(mac) else {
            return PairingOutcome::Ignored;
        };
        let identity = attempt.identity.clone();
        let mac = attempt.release(router);
        match identity {
            Some(identity) => {
                info!(%mac, "Badge accepted the pairing offer");
                PairingOutcome::Confirmed { mac, identity }
            }
            None => PairingOutcome::Failed {
                mac,
                reason: PairingFailure::InvalidOffer,
            },
        }
    }

    /// `h11` from a badge.
    pub fn on_badge_reject(&mut self, mac: MacAddress, router: &mut Router) -> PairingOutcome {
        let Some(attempt) = self.take_confirming(mac) else {
            return PairingOutcome::Ignored;
        };
        let mac = attempt.release(router);
        warn!(%mac, "Badge rejected the pairing offer");
        PairingOutcome::Failed {
            mac,
            reason: PairingFailure::Rejected,
        }
    }

    /// Pairing timer fired. Stale timers are ignored.
    pub fn on_timeout(&mut self, fired: &TimerFired, router: &mut Router) -> PairingOutcome {
        let live = match &self.state {
            PairingState::Idle => false,
            PairingState::AwaitingOperator(attempt)
            | PairingState::AwaitingBadgeConfirm(attempt) => attempt
                .timeout
                .as_ref()
                .is_some_and(|timer| timer.matches(fired)),
        };
        if !live {
            debug!(id = fired.id, "Stale pairing timer ignored");
            return PairingOutcome::Ignored;
        }

        let attempt = match mem::take(&mut self.state) {
            PairingState::AwaitingOperator(attempt)
            | PairingState::AwaitingBadgeConfirm(attempt) => attempt,
            PairingState::Idle => return PairingOutcome::Ignored,
        };
        let mac = attempt.release(router);
        warn!(%mac, "Pairing timed out");
        PairingOutcome::Failed {
            mac,
            reason: PairingFailure::TimedOut,
        }
    }

    /// End the active attempt without an un-peer. Idempotent.
    pub fn cancel(&mut self, ctx: PairingContext<'_>) -> PairingOutcome {
        match mem::take(&mut self.state) {
            PairingState::Idle => PairingOutcome::Ignored,
            PairingState::AwaitingOperator(attempt) => {
                ctx.dashboard.dismiss_new_badge_form();
                let mac = attempt.release(ctx.router);
                info!(%mac, "Pairing aborted");
                PairingOutcome::Aborted { mac }
            }
            PairingState::AwaitingBadgeConfirm(attempt) => {
                let mac = attempt.release(ctx.router);
                info!(%mac, "Pairing aborted");
                PairingOutcome::Aborted { mac }
            }
        }
    }

    fn take_confirming(&mut self, mac: MacAddress) -> Option<PairingAttempt> {
        match mem::take(&mut self.state) {
            PairingState::AwaitingBadgeConfirm(attempt) if attempt.mac == mac => Some(attempt),
            other => {
                if let PairingState::AwaitingBadgeConfirm(attempt) = &other {
                    debug!(%mac, expected = %attempt.mac, "Pairing answer from another badge ignored");
                }
                self.state = other;
                None
            }
        }
    }

    /// Send the signed offer and wait for the badge to answer.
    fn offer(
        &mut self,
        mut attempt: PairingAttempt,
        identity: PairingIdentity,
        ctx: PairingContext<'_>,
    ) -> PairingOutcome {
        let offer = PairingOffer::new(
            identity.badge_id.as_str(),
            identity.ip.as_str(),
            identity.name.as_str(),
            self.settings.server_name.as_str(),
        );
        let frame = match OutboundFrame::deliver(attempt.mac, MessageCode::PAIRING_OFFER, offer.signed()) {
            Ok(frame) => frame,
            Err(e) => {
                let mac = attempt.release(ctx.router);
                warn!(%mac, error = %e, "Pairing offer could not be built");
                return PairingOutcome::Failed {
                    mac,
                    reason: PairingFailure::InvalidOffer,
                };
            }
        };

        if !ctx.link.send_frame(frame) {
            warn!(mac = %attempt.mac, "Pairing offer not sent, link is not ready");
        }
        attempt.identity = Some(identity);
        attempt.register(ctx.router, CONFIRM_HANDLERS);
        attempt.timeout = Some(self.arm_timeout());
        debug!(mac = %attempt.mac, "Pairing offer sent");
        self.state = PairingState::AwaitingBadgeConfirm(attempt);
        PairingOutcome::Pending
    }

    fn arm_timeout(&self) -> TimerHandle {
        self.timers.arm(TimerKind::Pairing, self.settings.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::GatewayEvent;
    use nowtalk_core::BridgeInfo;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    #[derive(Default)]
    struct Sink {
        frames: RefCell<Vec<OutboundFrame>>,
    }

    impl FrameSink for Sink {
        fn send_frame(&self, frame: OutboundFrame) -> bool {
            self.frames.borrow_mut().push(frame);
            true
        }
    }

    #[derive(Default)]
    struct Operator {
        accepts_form: bool,
        notes: RefCell<Vec<(NotifyCategory, String)>>,
        dismissed: Cell<usize>,
    }

    impl Dashboard for Operator {
        fn notify(&self, category: NotifyCategory, message: &str) {
            self.notes.borrow_mut().push((category, message.to_string()));
        }

        fn request_new_badge_form(&self) -> bool {
            self.accepts_form
        }

        fn dismiss_new_badge_form(&self) {
            self.dismissed.set(self.dismissed.get() + 1);
        }

        fn on_config_changed(&self, _bridge: Option<&BridgeInfo>) {}
    }

    struct Fixture {
        coordinator: PairingCoordinator,
        router: Router,
        sink: Sink,
        operator: Operator,
        events: UnboundedReceiver<GatewayEvent>,
    }

    impl Fixture {
        fn new(accepts_form: bool) -> Self {
            let (tx, events) = mpsc::unbounded_channel();
            let settings = PairingSettings {
                external_ip: "203.0.113.7".to_string(),
                server_name: "nowTalk".to_string(),
                timeout: Duration::from_secs(90),
            };
            Self {
                coordinator: PairingCoordinator::new(settings, Timers::new(tx)),
                router: Router::new(),
                sink: Sink::default(),
                operator: Operator {
                    accepts_form,
                    ..Default::default()
                },
                events,
            }
        }

        fn ctx(&mut self) -> (&mut PairingCoordinator, PairingContext<'_>) {
            (
                &mut self.coordinator,
                PairingContext {
                    router: &mut self.router,
                    link: &self.sink,
                    dashboard: &self.operator,
                },
            )
        }

        fn begin(&mut self, mac: MacAddress, existing: Option<PairingIdentity>) -> PairingOutcome {
            let (coordinator, ctx) = self.ctx();
            coordinator.begin(mac, existing, ctx)
        }

        fn submit(&mut self, submission: NewBadgeSubmission) -> PairingOutcome {
            let (coordinator, ctx) = self.ctx();
            coordinator.on_operator_submission(submission, ctx)
        }

        fn cancel(&mut self) -> PairingOutcome {
            let (coordinator, ctx) = self.ctx();
            coordinator.cancel(ctx)
        }

        async fn next_timer(&mut self) -> TimerFired {
            match self.events.recv().await {
                Some(GatewayEvent::Timer(fired)) => fired,
                other => panic!("expected timer, got {other:?}"),
            }
        }
    }

    fn mac(raw: u64) -> MacAddress {
        MacAddress::new(raw).unwrap()
    }

    fn form() -> NewBadgeSubmission {
        NewBadgeSubmission::Form {
            badge_id: "BDG1".to_string(),
            username: "Ann".to_string(),
        }
    }

    #[tokio::test]
    async fn test_no_dashboard_session_aborts() {
        let mut fx = Fixture::new(false);
        assert_eq!(fx.begin(mac(1), None), PairingOutcome::Aborted { mac: mac(1) });
        assert!(!fx.coordinator.is_active());
        assert!(fx.router.is_empty());
        assert!(fx.sink.frames.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_operator_form_sends_signed_offer() {
        let mut fx = Fixture::new(true);
        assert_eq!(fx.begin(mac(1), None), PairingOutcome::Pending);
        assert!(fx.coordinator.is_awaiting_operator());
        assert!(fx.router.is_registered(HandlerKey::NewBadgeForm, GatewayHandler::OperatorSubmission));

        assert_eq!(fx.submit(form()), PairingOutcome::Pending);
        assert!(fx.coordinator.is_awaiting_badge());
        assert!(fx.router.handler(HandlerKey::NewBadgeForm).is_none());
        assert_eq!(fx.router.len(), 2);

        let expected = PairingOffer::new("BDG1", "203.0.113.7", "Ann", "nowTalk").signed();
        let frames = fx.sink.frames.borrow();
        assert_eq!(
            frames.as_slice(),
            &[OutboundFrame::deliver(mac(1), MessageCode::PAIRING_OFFER, expected).unwrap()]
        );
    }

    #[tokio::test]
    async fn test_accept_releases_handlers() {
        let mut fx = Fixture::new(true);
        fx.begin(mac(1), None);
        fx.submit(form());

        assert_eq!(
            fx.coordinator.on_badge_accept(mac(2), &mut fx.router),
            PairingOutcome::Ignored
        );
        let outcome = fx.coordinator.on_badge_accept(mac(1), &mut fx.router);
        let PairingOutcome::Confirmed { mac: confirmed, identity } = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert_eq!(confirmed, mac(1));
        assert_eq!(identity.badge_id, "BDG1");
        assert_eq!(identity.name, "Ann");
        assert!(fx.router.is_empty());
        assert!(!fx.coordinator.is_active());
    }

    #[tokio::test]
    async fn test_reject_fails_attempt() {
        let mut fx = Fixture::new(true);
        fx.begin(mac(1), None);
        fx.submit(form());

        assert_eq!(
            fx.coordinator.on_badge_reject(mac(1), &mut fx.router),
            PairingOutcome::Failed {
                mac: mac(1),
                reason: PairingFailure::Rejected
            }
        );
        assert!(fx.router.is_empty());
    }

    #[tokio::test]
    async fn test_second_announcement_is_rejected() {
        let mut fx = Fixture::new(true);
        fx.begin(mac(1), None);
        fx.submit(form());
        let handlers = fx.router.len();

        assert_eq!(fx.begin(mac(2), None), PairingOutcome::Busy);
        assert_eq!(fx.coordinator.active_mac(), Some(mac(1)));
        assert!(fx.coordinator.is_awaiting_badge());
        assert_eq!(fx.router.len(), handlers);
        assert_eq!(fx.sink.frames.borrow().len(), 1);
        assert_eq!(
            fx.operator.notes.borrow().as_slice(),
            &[(NotifyCategory::Danger, "New Badge in use.".to_string())]
        );
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let mut fx = Fixture::new(true);
        fx.begin(mac(1), None);

        assert_eq!(fx.cancel(), PairingOutcome::Aborted { mac: mac(1) });
        assert_eq!(fx.cancel(), PairingOutcome::Ignored);
        assert_eq!(fx.operator.dismissed.get(), 1);
        assert!(fx.sink.frames.borrow().is_empty());
        assert!(fx.router.is_empty());
    }

    #[tokio::test]
    async fn test_operator_cancel_sends_nothing() {
        let mut fx = Fixture::new(true);
        fx.begin(mac(1), None);

        assert_eq!(
            fx.submit(NewBadgeSubmission::Cancel),
            PairingOutcome::Aborted { mac: mac(1) }
        );
        assert!(fx.sink.frames.borrow().is_empty());
        assert!(fx.router.is_empty());
        assert!(fx.operator.notes.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_inconclusive_submission_keeps_form_open() {
        let mut fx = Fixture::new(true);
        fx.begin(mac(1), None);

        let outcome = fx.submit(NewBadgeSubmission::from_json(json!({"username": "Ann"})));
        assert_eq!(outcome, PairingOutcome::Pending);
        assert!(fx.coordinator.is_awaiting_operator());
        assert_eq!(fx.router.len(), 1);
        assert!(fx.sink.frames.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_existing_identity_skips_operator() {
        let mut fx = Fixture::new(false);
        let identity = PairingIdentity {
            badge_id: "BDG9".to_string(),
            name: "Bob".to_string(),
            ip: "203.0.113.7".to_string(),
        };

        assert_eq!(fx.begin(mac(9), Some(identity)), PairingOutcome::Pending);
        assert!(fx.coordinator.is_awaiting_badge());
        assert_eq!(fx.sink.frames.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_offer_fails() {
        let mut fx = Fixture::new(true);
        fx.begin(mac(1), None);

        let outcome = fx.submit(NewBadgeSubmission::Form {
            badge_id: "B".repeat(300),
            username: "Ann".to_string(),
        });
        assert_eq!(
            outcome,
            PairingOutcome::Failed {
                mac: mac(1),
                reason: PairingFailure::InvalidOffer
            }
        );
        assert!(fx.router.is_empty());
        assert!(!fx.coordinator.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_attempt() {
        let mut fx = Fixture::new(true);
        fx.begin(mac(1), None);
        fx.submit(form());

        let fired = fx.next_timer().await;
        assert_eq!(
            fx.coordinator.on_timeout(&fired, &mut fx.router),
            PairingOutcome::Failed {
                mac: mac(1),
                reason: PairingFailure::TimedOut
            }
        );
        assert!(fx.router.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_accept_is_stale() {
        let mut fx = Fixture::new(true);
        fx.begin(mac(1), None);
        fx.submit(form());
        let stale = TimerFired {
            kind: TimerKind::Pairing,
            id: 2,
        };
        fx.coordinator.on_badge_accept(mac(1), &mut fx.router);

        assert_eq!(
            fx.coordinator.on_timeout(&stale, &mut fx.router),
            PairingOutcome::Ignored
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_refreshed_timeout_ignores_old_timer() {
        let mut fx = Fixture::new(true);
        fx.begin(mac(1), None);
        let first = TimerFired {
            kind: TimerKind::Pairing,
            id: 1,
        };
        fx.submit(form());

        assert_eq!(
            fx.coordinator.on_timeout(&first, &mut fx.router),
            PairingOutcome::Ignored
        );
        assert!(fx.coordinator.is_awaiting_badge());
    }
}
