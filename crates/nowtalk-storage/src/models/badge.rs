use nowtalk_core::{BadgeStatus, MacAddress};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// One row of the `users` table.
///
/// `mac` is kept in its text form (`h` + 12 hex digits) and `key` holds the
/// badge identity token issued during pairing.
///
/// # Examples
///
/// ```
/// use nowtalk_core::{BadgeStatus, MacAddress};
/// use nowtalk_storage::models::BadgeRecord;
///
/// let mac = MacAddress::new(0x1122334455).unwrap();
/// let record = BadgeRecord::new(mac, BadgeStatus::from_bits(0x11), "", "Ann", Some("BDG1"));
///
/// // only the high nibble is stored
/// assert_eq!(record.status, 0x10);
/// assert_eq!(record.mac, "h001122334455");
/// assert_eq!(record.mac_address().unwrap(), mac);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BadgeRecord {
    pub mac: String,
    pub status: i64,
    pub ip: Option<String>,
    pub name: String,
    pub key: Option<String>,
}

impl BadgeRecord {
    pub fn new(
        mac: MacAddress,
        status: BadgeStatus,
        ip: impl Into<String>,
        name: impl Into<String>,
        key: Option<&str>,
    ) -> Self {
        Self {
            mac: mac.to_string(),
            status: i64::from(status.persisted()),
            ip: Some(ip.into()),
            name: name.into(),
            key: key.map(str::to_string),
        }
    }

    /// Parse the stored MAC text back into an address.
    pub fn mac_address(&self) -> StorageResult<MacAddress> {
        self.mac.parse().map_err(|e: nowtalk_core::Error| StorageError::InvalidRow {
            mac: self.mac.clone(),
            reason: e.to_string(),
        })
    }

    /// Stored status; bits outside one byte are dropped.
    pub fn badge_status(&self) -> BadgeStatus {
        BadgeStatus::from_bits((self.status & 0xFF) as u8)
    }

    pub fn is_persistable(&self) -> bool {
        self.badge_status().is_persistable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_mac_text() {
        let record = BadgeRecord {
            mac: "hzz".to_string(),
            status: 0x10,
            ip: None,
            name: String::new(),
            key: None,
        };
        assert!(matches!(
            record.mac_address(),
            Err(StorageError::InvalidRow { .. })
        ));
    }

    #[test]
    fn test_low_nibble_not_stored() {
        let mac = MacAddress::new(7).unwrap();
        let record = BadgeRecord::new(mac, BadgeStatus::from_bits(0x03), "", "x", None);
        assert_eq!(record.status, 0);
        assert!(!record.is_persistable());
    }
}
