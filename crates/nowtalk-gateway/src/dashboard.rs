//! Seam to the operator dashboard.
//!
//! The dashboard itself (web UI, sessions, forms) lives outside the gateway.
//! The gateway pushes notifications and state through [`Dashboard`]; the
//! dashboard pulls back through [`GatewayHandle`](crate::GatewayHandle).

use nowtalk_core::BridgeInfo;
use nowtalk_protocol::TrafficRecord;
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::badge::BadgeSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyCategory {
    Success,
    Danger,
    Warning,
    Info,
}

impl NotifyCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            NotifyCategory::Success => "success",
            NotifyCategory::Danger => "danger",
            NotifyCategory::Warning => "warning",
            NotifyCategory::Info => "info",
        }
    }
}

/// Push direction of the dashboard contract.
pub trait Dashboard {
    fn notify(&self, category: NotifyCategory, message: &str);

    /// Ask an open session to show the onboarding form.
    ///
    /// Returns `false` when no session accepted the prompt.
    fn request_new_badge_form(&self) -> bool;

    /// Close the onboarding form after the attempt resolved.
    fn dismiss_new_badge_form(&self) {}

    /// Bridge metadata changed (handshake completed or link lost).
    fn on_config_changed(&self, bridge: Option<&BridgeInfo>);

    fn on_badges_updated(&self, _badges: &[BadgeSnapshot]) {}

    /// Mirror of one application frame.
    fn traffic(&self, _record: &TrafficRecord) {}
}

/// Send a notification and mirror it to the process log.
pub fn notify(dashboard: &dyn Dashboard, category: NotifyCategory, message: &str) {
    match category {
        NotifyCategory::Success | NotifyCategory::Info => info!(category = category.as_str(), "{message}"),
        NotifyCategory::Warning => warn!(category = category.as_str(), "{message}"),
        NotifyCategory::Danger => error!(category = category.as_str(), "{message}"),
    }
    dashboard.notify(category, message);
}

/// Dashboard that only writes to the log.
///
/// Used when no UI is attached. It never accepts an onboarding form, so
/// new badges cannot be commissioned through it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDashboard;

impl Dashboard for LogDashboard {
    fn notify(&self, _category: NotifyCategory, _message: &str) {
        // already mirrored by `notify`
    }

    fn request_new_badge_form(&self) -> bool {
        warn!("No dashboard session available for onboarding");
        false
    }

    fn on_config_changed(&self, bridge: Option<&BridgeInfo>) {
        match bridge {
            Some(bridge) => info!(%bridge, "Bridge configuration updated"),
            None => info!("Bridge disconnected"),
        }
    }

    fn on_badges_updated(&self, badges: &[BadgeSnapshot]) {
        debug!(count = badges.len(), "Badge list updated");
    }

    fn traffic(&self, record: &TrafficRecord) {
        trace!(direction = record.direction.as_str(), "{}", record.to_json());
    }
}
