//! Signed pairing offer sent to a badge during commissioning.
//!
//! ```text
//! <badgeID>~<externalIP>~<name>~<serverName>~<checksum>
//! ```
//!
//! `checksum` is the decimal CRC-16 of `nowTalkSrv!` followed by the
//! unsigned offer (the first four fields joined by `~`).

use nowtalk_core::constants::{FIELD_DELIMITER, OFFER_CHECKSUM_SALT};
use serde::{Deserialize, Serialize};

use crate::checksum::checksum;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingOffer {
    pub badge_id: String,
    pub external_ip: String,
    pub name: String,
    pub server_name: String,
}

impl PairingOffer {
    pub fn new(
        badge_id: impl Into<String>,
        external_ip: impl Into<String>,
        name: impl Into<String>,
        server_name: impl Into<String>,
    ) -> Self {
        Self {
            badge_id: badge_id.into(),
            external_ip: external_ip.into(),
            name: name.into(),
            server_name: server_name.into(),
        }
    }

    /// The four offer fields joined by `~`.
    pub fn unsigned(&self) -> String {
        [
            self.badge_id.as_str(),
            self.external_ip.as_str(),
            self.name.as_str(),
            self.server_name.as_str(),
        ]
        .join(&FIELD_DELIMITER.to_string())
    }

    /// Checksum over the salted unsigned offer.
    pub fn signature(&self) -> u16 {
        let salted = format!("{OFFER_CHECKSUM_SALT}{}", self.unsigned());
        checksum(salted.as_bytes())
    }

    /// Offer text with its checksum appended, ready to send.
    ///
    /// # Example
    ///
    /// ```
    /// use nowtalk_protocol::PairingOffer;
    ///
    /// let offer = PairingOffer::new("BDG1", "203.0.113.7", "Ann", "office");
    /// let signed = offer.signed();
    /// assert!(signed.starts_with("BDG1~203.0.113.7~Ann~office~"));
    /// ```
    pub fn signed(&self) -> String {
        format!(
            "{}{FIELD_DELIMITER}{}",
            self.unsigned(),
            self.signature()
        )
    }
}
