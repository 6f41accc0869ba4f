//! Badge entity.
//!
//! A badge reacts to some protocol codes itself before the gateway's own
//! handlers see them (see [`Badge::handle`]). It also tracks its liveness
//! from the pings it receives while started.

use std::time::Duration;

use nowtalk_core::{BadgeStatus, MacAddress, MessageCode};
use nowtalk_protocol::InboundMessage;
use nowtalk_storage::{BadgeRecord, StorageResult};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Identity a badge receives when pairing completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingIdentity {
    /// Device-issued identity token.
    pub badge_id: String,
    pub name: String,
    pub ip: String,
}

#[derive(Debug, Clone)]
pub struct Badge {
    mac: MacAddress,
    status: BadgeStatus,
    ip: String,
    name: String,
    badge_id: Option<String>,
    /// Rename staged for a confirmed badge until the badge acknowledges it.
    pending_name: Option<String>,
    started: bool,
    last_seen: Option<Instant>,
}

impl Badge {
    /// Transient badge with no identity and a zero status.
    pub fn new(mac: MacAddress) -> Self {
        Self {
            mac,
            status: BadgeStatus::default(),
            ip: String::new(),
            name: String::new(),
            badge_id: None,
            pending_name: None,
            started: false,
            last_seen: None,
        }
    }

    pub fn from_record(record: &BadgeRecord) -> StorageResult<Self> {
        let mut badge = Badge::new(record.mac_address()?);
        badge.status = record.badge_status();
        badge.ip = record.ip.clone().unwrap_or_default();
        badge.name = record.name.clone();
        badge.badge_id = record.key.clone().filter(|key| !key.is_empty());
        Ok(badge)
    }

    pub fn to_record(&self) -> BadgeRecord {
        BadgeRecord::new(
            self.mac,
            self.status,
            self.ip.as_str(),
            self.name.as_str(),
            self.badge_id.as_deref(),
        )
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn status(&self) -> BadgeStatus {
        self.status
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn badge_id(&self) -> Option<&str> {
        self.badge_id.as_deref()
    }

    pub fn pending_name(&self) -> Option<&str> {
        self.pending_name.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }

    pub fn is_status(&self, mask: u8) -> bool {
        self.status.contains(mask)
    }

    pub fn set_status(&mut self, mask: u8, on: bool) {
        self.status.set(mask, on);
    }

    /// Clear the persisted high nibble.
    pub fn reset_persisted_status(&mut self) {
        self.status.set(BadgeStatus::PERSISTED_MASK, false);
    }

    /// A status of exactly `0x01` after an edit is promoted to `0x03`.
    pub fn promote_session(&mut self) {
        if self.status.bits() == BadgeStatus::SESSION {
            self.status.set(BadgeStatus::SESSION_AUX, true);
        }
    }

    /// Begin periodic behavior. Starting twice is a no-op.
    pub fn start(&mut self) {
        if !self.started {
            self.started = true;
            self.last_seen = Some(Instant::now());
            debug!(mac = %self.mac, "Badge started");
        }
    }

    pub fn stop(&mut self) {
        if self.started {
            self.started = false;
            debug!(mac = %self.mac, "Badge stopped");
        }
    }

    /// Badge-level reaction to a protocol code.
    ///
    /// Returns `true` if the badge consumed the message; the gateway's own
    /// handlers are skipped in that case. A stopped badge handles nothing.
    pub fn handle(&mut self, msg: &InboundMessage) -> bool {
        if !self.started {
            return false;
        }
        match msg.code {
            MessageCode::PING => {
                self.on_ping();
                true
            }
            _ => false,
        }
    }

    /// Record a liveness ping.
    pub fn on_ping(&mut self) {
        trace!(mac = %self.mac, "Ping");
        self.status.set(BadgeStatus::SESSION, true);
        self.touch();
    }

    /// Restart the liveness deadline.
    pub fn touch(&mut self) {
        self.last_seen = Some(Instant::now());
    }

    /// Drop the session bit of a started badge silent for longer than
    /// `timeout`. Returns `true` if the status changed.
    pub fn expire_session(&mut self, now: Instant, timeout: Duration) -> bool {
        if !self.started || !self.status.contains(BadgeStatus::SESSION) {
            return false;
        }
        let silent = self
            .last_seen
            .is_none_or(|seen| now.saturating_duration_since(seen) > timeout);
        if silent {
            self.status.set(BadgeStatus::SESSION, false);
            debug!(mac = %self.mac, "Badge session expired");
        }
        silent
    }

    /// Apply the identity agreed during pairing.
    pub fn fill_info(&mut self, identity: &PairingIdentity) {
        self.badge_id = Some(identity.badge_id.clone());
        self.name = identity.name.clone();
        self.ip = identity.ip.clone();
        self.pending_name = None;
    }

    /// Identity to re-offer when a confirmed badge announces itself again.
    pub fn pairing_identity(&self, external_ip: &str) -> Option<PairingIdentity> {
        if !self.status.is_confirmed() {
            return None;
        }
        self.badge_id.as_ref().map(|badge_id| PairingIdentity {
            badge_id: badge_id.clone(),
            name: self.name.clone(),
            ip: external_ip.to_string(),
        })
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn stage_name(&mut self, name: Option<String>) {
        self.pending_name = name;
    }

    /// Make the staged rename effective. Returns `false` if none was staged.
    pub fn commit_pending_name(&mut self) -> bool {
        match self.pending_name.take() {
            Some(name) => {
                self.name = name;
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> BadgeSnapshot {
        BadgeSnapshot {
            mac: self.mac,
            status: self.status,
            ip: self.ip.clone(),
            name: self.name.clone(),
            pending_name: self.pending_name.clone(),
            online: self.started && self.status.contains(BadgeStatus::SESSION),
        }
    }
}

/// Serializable view of a badge for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeSnapshot {
    pub mac: MacAddress,
    pub status: BadgeStatus,
    pub ip: String,
    pub name: String,
    pub pending_name: Option<String>,
    pub online: bool,
}
