//! Events consumed by the gateway's single event loop.

use bytes::Bytes;
use nowtalk_core::MacAddress;
use serde_json::Value;

use crate::timer::TimerFired;

/// Everything the gateway reacts to arrives as one of these.
///
/// Link events carry the generation of the port they came from, so events
/// from a port that has since been closed are recognised and dropped.
#[derive(Debug)]
pub enum GatewayEvent {
    /// One raw frame, cut from the serial stream on line silence.
    Frame { generation: u64, raw: Bytes },

    /// The port reached end of stream or failed.
    LinkClosed {
        generation: u64,
        error: Option<String>,
    },

    Timer(TimerFired),

    Dashboard(DashboardRequest),

    /// The badge firmware image changed on disk.
    FirmwareChanged,

    /// Periodic housekeeping.
    Tick,

    Shutdown,
}

/// Requests pulled from the operator dashboard.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardRequest {
    EditBadge {
        mac: String,
        action: String,
        value: Value,
    },
    NewBadgeForm(NewBadgeSubmission),
}

/// Operator answer to the onboarding form.
#[derive(Debug, Clone, PartialEq)]
pub enum NewBadgeSubmission {
    /// Identity token and display name for the new badge.
    Form { badge_id: String, username: String },
    /// The operator dismissed the form.
    Cancel,
    /// Anything else; keeps the form open.
    Inconclusive(Value),
}

impl NewBadgeSubmission {
    /// Interpret a raw dashboard payload.
    ///
    /// `false` cancels, an object with `badgeid` and `username` strings is a
    /// form, and everything else is inconclusive.
    ///
    /// ```
    /// use nowtalk_gateway::NewBadgeSubmission;
    /// use serde_json::json;
    ///
    /// let form = NewBadgeSubmission::from_json(json!({"badgeid": "BDG1", "username": "Ann"}));
    /// assert!(matches!(form, NewBadgeSubmission::Form { .. }));
    /// assert_eq!(NewBadgeSubmission::from_json(json!(false)), NewBadgeSubmission::Cancel);
    /// ```
    pub fn from_json(value: Value) -> Self {
        if value == Value::Bool(false) {
            return NewBadgeSubmission::Cancel;
        }
        let badge_id = value.get("badgeid").and_then(Value::as_str);
        let username = value.get("username").and_then(Value::as_str);
        match (badge_id, username) {
            (Some(badge_id), Some(username)) => NewBadgeSubmission::Form {
                badge_id: badge_id.to_string(),
                username: username.to_string(),
            },
            _ => NewBadgeSubmission::Inconclusive(value),
        }
    }
}

/// Dashboard edit of a single badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadgeEdit {
    /// `true` disables the badge (clears the enabled bit).
    Disable(bool),
    Friend(bool),
    Rename(String),
}

impl BadgeEdit {
    /// Parse a dashboard `(action, value)` pair.
    ///
    /// # Errors
    /// Returns `Error::UnknownEditAction` for an unknown action or a value of
    /// the wrong type.
    pub fn parse(action: &str, value: &Value) -> nowtalk_core::Result<Self> {
        let unknown = || nowtalk_core::Error::UnknownEditAction(action.to_string());
        match action {
            "disable" => value.as_bool().map(BadgeEdit::Disable).ok_or_else(unknown),
            "friend" => value.as_bool().map(BadgeEdit::Friend).ok_or_else(unknown),
            "name" => value
                .as_str()
                .map(|name| BadgeEdit::Rename(name.to_string()))
                .ok_or_else(unknown),
            _ => Err(unknown()),
        }
    }
}

/// A badge a dashboard edit was addressed to, if its MAC text parses.
pub(crate) fn parse_edit_target(mac: &str) -> Option<MacAddress> {
    mac.parse().ok()
}
