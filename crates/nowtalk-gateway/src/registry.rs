//! In-memory badge registry backed by the persistence layer.

use std::collections::BTreeMap;
use std::time::Duration;

use nowtalk_core::{BadgeStatus, MacAddress};
use nowtalk_protocol::OutboundFrame;
use nowtalk_storage::BadgeRepository;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::badge::{Badge, BadgeSnapshot};
use crate::dashboard::NotifyCategory;
use crate::error::Result;
use crate::event::BadgeEdit;
use crate::link::FrameSink;

/// Whether [`Registry::get`] may create a badge it cannot find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Only badges in memory or storage.
    KnownOnly,
    /// Create unknown badges if guest admission is configured.
    Guest,
    /// Always create unknown badges.
    Always,
}

/// Result of a dashboard edit, to be reported back to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub category: NotifyCategory,
    pub message: &'static str,
    /// The dashboard's badge list is stale and should be refreshed.
    pub refresh: bool,
}

impl EditOutcome {
    fn success(message: &'static str) -> Self {
        Self {
            category: NotifyCategory::Success,
            message,
            refresh: false,
        }
    }

    pub fn rejected(refresh: bool) -> Self {
        Self {
            category: NotifyCategory::Danger,
            message: "Change was not allowed.",
            refresh,
        }
    }
}

pub struct Registry<R: BadgeRepository> {
    repo: R,
    badges: BTreeMap<MacAddress, Badge>,
    allow_guests: bool,
}

impl<R: BadgeRepository> Registry<R> {
    pub fn new(repo: R, allow_guests: bool) -> Self {
        Self {
            repo,
            badges: BTreeMap::new(),
            allow_guests,
        }
    }

    /// Load confirmed and friend badges from storage. Badges start stopped.
    pub async fn load(&mut self) -> Result<usize> {
        let rows = self.repo.load_all(BadgeStatus::LOAD_MASK).await?;
        let mut loaded = 0;
        for row in &rows {
            match Badge::from_record(row) {
                Ok(badge) => {
                    self.badges.insert(badge.mac(), badge);
                    loaded += 1;
                }
                Err(e) => warn!(mac = %row.mac, error = %e, "Skipping unreadable badge row"),
            }
        }
        info!(count = loaded, "Badges loaded");
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.badges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.badges.is_empty()
    }

    pub fn contains(&self, mac: MacAddress) -> bool {
        self.badges.contains_key(&mac)
    }

    /// In-memory lookup only.
    pub fn badge(&self, mac: MacAddress) -> Option<&Badge> {
        self.badges.get(&mac)
    }

    pub fn badge_mut(&mut self, mac: MacAddress) -> Option<&mut Badge> {
        self.badges.get_mut(&mac)
    }

    /// Find a badge in memory, then in storage, then create it if
    /// `admission` allows. The returned badge is started.
    pub async fn get(&mut self, mac: MacAddress, admission: Admission) -> Result<Option<&mut Badge>> {
        if !self.badges.contains_key(&mac) {
            let badge = match self.repo.find(mac).await? {
                Some(row) => Badge::from_record(&row)?,
                None if self.admits(admission) => {
                    debug!(%mac, ?admission, "Admitting new badge");
                    Badge::new(mac)
                }
                None => return Ok(None),
            };
            self.badges.insert(mac, badge);
        }

        Ok(self.badges.get_mut(&mac).map(|badge| {
            badge.start();
            badge
        }))
    }

    fn admits(&self, admission: Admission) -> bool {
        match admission {
            Admission::KnownOnly => false,
            Admission::Guest => self.allow_guests,
            Admission::Always => true,
        }
    }

    /// Write the badge to storage, or delete its row if its persisted
    /// nibble is zero.
    pub async fn persist(&self, mac: MacAddress) -> Result<()> {
        let Some(badge) = self.badges.get(&mac) else {
            return Ok(());
        };
        if badge.status().is_persistable() {
            self.repo.upsert(&badge.to_record()).await?;
        } else if self.repo.delete(mac).await? {
            debug!(%mac, "Badge row deleted");
        }
        Ok(())
    }

    /// Clear the persisted status of a badge and drop its stored row.
    pub async fn reset_persisted(&mut self, mac: MacAddress) -> Result<()> {
        if let Some(badge) = self.badges.get_mut(&mac) {
            badge.reset_persisted_status();
        }
        self.repo.delete(mac).await?;
        Ok(())
    }

    /// Remove a badge from the bridge roster.
    ///
    /// An unconfirmed badge is also stopped and forgotten, in memory and in
    /// storage. A confirmed badge stays registered.
    pub async fn unpeer(&mut self, mac: MacAddress, link: &dyn FrameSink) -> Result<()> {
        if !link.send_frame(OutboundFrame::unpeer(mac)) {
            warn!(%mac, "Un-peer not sent, link is not ready");
        }

        let confirmed = self
            .badges
            .get(&mac)
            .is_some_and(|badge| badge.status().is_confirmed());
        if !confirmed {
            if let Some(mut badge) = self.badges.remove(&mac) {
                badge.stop();
            }
            self.repo.delete(mac).await?;
            info!(%mac, "Badge un-peered and removed");
        }
        Ok(())
    }

    /// Set or clear `mask` on every badge and persist each one.
    pub async fn set_field_on_all(&mut self, mask: u8, on: bool) -> Result<()> {
        for badge in self.badges.values_mut() {
            badge.set_status(mask, on);
        }
        let macs: Vec<MacAddress> = self.badges.keys().copied().collect();
        for mac in macs {
            self.persist(mac).await?;
        }
        Ok(())
    }

    /// Set or clear `mask` on one badge and persist it.
    pub async fn set_status(&mut self, mac: MacAddress, mask: u8, on: bool) -> Result<bool> {
        let Some(badge) = self.badges.get_mut(&mac) else {
            return Ok(false);
        };
        badge.set_status(mask, on);
        self.persist(mac).await?;
        Ok(true)
    }

    /// Apply a dashboard edit to a known badge.
    pub async fn edit(&mut self, mac: MacAddress, edit: BadgeEdit) -> Result<EditOutcome> {
        let Some(badge) = self.badges.get_mut(&mac) else {
            return Ok(EditOutcome::rejected(true));
        };

        let outcome = match edit {
            BadgeEdit::Disable(disable) => {
                badge.set_status(BadgeStatus::ENABLED, !disable);
                badge.promote_session();
                EditOutcome::success("Badge's disable status is now changed.")
            }
            BadgeEdit::Friend(friend) => {
                badge.set_status(BadgeStatus::FRIEND, friend);
                badge.promote_session();
                EditOutcome::success("Badge's friend status is now changed.")
            }
            BadgeEdit::Rename(name) if badge.status().is_confirmed() => {
                if badge.name() == name {
                    badge.stage_name(None);
                    return Ok(EditOutcome::success("Name has been reset to the original."));
                }
                badge.stage_name(Some(name));
                return Ok(EditOutcome::success("Name has been changed."));
            }
            BadgeEdit::Rename(name) => {
                badge.rename(name);
                EditOutcome::success("Name has been changed.")
            }
        };

        self.persist(mac).await?;
        Ok(outcome)
    }

    pub fn start_all(&mut self) {
        self.badges.values_mut().for_each(Badge::start);
    }

    pub fn stop_all(&mut self) {
        self.badges.values_mut().for_each(Badge::stop);
    }

    /// Expire sessions of silent badges; returns the affected MACs.
    pub fn expire_sessions(&mut self, now: Instant, timeout: Duration) -> Vec<MacAddress> {
        self.badges
            .values_mut()
            .filter_map(|badge| badge.expire_session(now, timeout).then(|| badge.mac()))
            .collect()
    }

    pub fn snapshot(&self) -> Vec<BadgeSnapshot> {
        self.badges.values().map(Badge::snapshot).collect()
    }
}
