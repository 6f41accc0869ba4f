//! Two-tier dispatch of inbound messages.
//!
//! ```text
//! InboundMessage ──> Badge::handle ──(not handled)──> gateway handler table ──> log
//! ```
//!
//! The gateway table maps a [`HandlerKey`] to one [`GatewayHandler`].
//! Registration and removal are idempotent, so a pairing attempt can
//! deregister on every exit path without tracking what is still present.

use std::collections::HashMap;

use nowtalk_core::MessageCode;
use nowtalk_protocol::{InboundMessage, StatusKind, StatusLine};
use tracing::{trace, warn};

use crate::badge::Badge;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    /// Application code from a badge.
    Code(MessageCode),
    /// Category of a bridge status line.
    Status(StatusKind),
    /// Operator answer to the onboarding form.
    NewBadgeForm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayHandler {
    /// `h01`: forward a liveness ping to its badge.
    Ping,
    /// `h05`: start onboarding.
    NewDevice,
    /// `h10` while a pairing offer is outstanding.
    PairingAccept,
    /// `h11` while a pairing offer is outstanding.
    PairingReject,
    /// Onboarding form submission.
    OperatorSubmission,
    /// Bridge info/warning/error line.
    BridgeStatus,
}

/// Where a message was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Badge,
    Gateway(GatewayHandler),
    Unhandled,
}

#[derive(Debug, Default)]
pub struct Router {
    handlers: HashMap<HandlerKey, GatewayHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the permanent handlers active while the bridge is ready.
    pub fn install_defaults(&mut self) {
        self.register(HandlerKey::Code(MessageCode::PING), GatewayHandler::Ping);
        self.register(HandlerKey::Code(MessageCode::NEW_DEVICE), GatewayHandler::NewDevice);
        for kind in [StatusKind::Info, StatusKind::Warning, StatusKind::Error] {
            self.register(HandlerKey::Status(kind), GatewayHandler::BridgeStatus);
        }
    }

    /// Returns `true` if the handler was not registered before.
    pub fn register(&mut self, key: HandlerKey, handler: GatewayHandler) -> bool {
        match self.handlers.get(&key) {
            Some(existing) if *existing == handler => false,
            Some(existing) => {
                warn!(?key, ?existing, ?handler, "Handler key already taken");
                false
            }
            None => {
                trace!(?key, ?handler, "Handler registered");
                self.handlers.insert(key, handler);
                true
            }
        }
    }

    /// Returns `true` if `handler` was registered under `key`.
    pub fn deregister(&mut self, key: HandlerKey, handler: GatewayHandler) -> bool {
        if self.handlers.get(&key) == Some(&handler) {
            self.handlers.remove(&key);
            trace!(?key, ?handler, "Handler removed");
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn handler(&self, key: HandlerKey) -> Option<GatewayHandler> {
        self.handlers.get(&key).copied()
    }

    pub fn is_registered(&self, key: HandlerKey, handler: GatewayHandler) -> bool {
        self.handler(key) == Some(handler)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Offer `msg` to its badge first, then to the gateway table.
    pub fn route(&self, msg: &InboundMessage, badge: Option<&mut Badge>) -> Route {
        if let Some(badge) = badge
            && badge.handle(msg)
        {
            return Route::Badge;
        }
        match self.handler(HandlerKey::Code(msg.code)) {
            Some(handler) => Route::Gateway(handler),
            None => Route::Unhandled,
        }
    }

    pub fn route_status(&self, line: &StatusLine) -> Route {
        match self.handler(HandlerKey::Status(line.kind)) {
            Some(handler) => Route::Gateway(handler),
            None => Route::Unhandled,
        }
    }
}
