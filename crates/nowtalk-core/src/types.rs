use crate::{Result, constants::MAC_LEN, error::Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest value a 48-bit MAC address can hold.
const MAC_MAX: u64 = (1 << 48) - 1;

/// 48-bit badge (or bridge) hardware address.
///
/// The textual form is `h` followed by 12 lowercase hex digits. This is the
/// form used as the persistence key and in dashboard traffic records.
///
/// ```
/// use nowtalk_core::MacAddress;
///
/// let mac = MacAddress::new(0x1122334455).unwrap();
/// assert_eq!(mac.to_string(), "h001122334455");
/// assert_eq!("h001122334455".parse::<MacAddress>().unwrap(), mac);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MacAddress(u64);

impl MacAddress {
    /// Create a MAC address from its integer value.
    ///
    /// # Errors
    /// Returns `Error::MacOutOfRange` if the value needs more than 48 bits.
    pub fn new(value: u64) -> Result<Self> {
        if value > MAC_MAX {
            return Err(Error::MacOutOfRange(value));
        }
        Ok(MacAddress(value))
    }

    /// Build a MAC address from its big-endian wire bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; MAC_LEN]) -> Self {
        let value = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
        MacAddress(value)
    }

    /// Big-endian wire bytes.
    #[must_use]
    pub fn to_bytes(self) -> [u8; MAC_LEN] {
        let be = self.0.to_be_bytes();
        let mut out = [0u8; MAC_LEN];
        out.copy_from_slice(&be[2..]);
        out
    }

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "h{:012x}", self.0)
    }
}

impl std::str::FromStr for MacAddress {
    type Err = Error;

    /// Accepts `h`-prefixed or bare hex text.
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix('h').unwrap_or(s);
        if digits.is_empty() || digits.len() > 12 {
            return Err(Error::InvalidMac(s.to_string()));
        }
        let value = u64::from_str_radix(digits, 16).map_err(|_| Error::InvalidMac(s.to_string()))?;
        MacAddress::new(value)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

impl TryFrom<String> for MacAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// One-byte application code carried in byte 8 of a badge frame.
///
/// Rendered as `h` plus two lowercase hex digits, which is also the key
/// dispatch handlers are registered under.
///
/// ```
/// use nowtalk_core::MessageCode;
///
/// assert_eq!(MessageCode::PING.to_string(), "h01");
/// assert_eq!(MessageCode::new(0x7f).to_string(), "h7f");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageCode(u8);

impl MessageCode {
    pub const PING: MessageCode = MessageCode(crate::constants::CODE_PING);
    pub const NEW_DEVICE: MessageCode = MessageCode(crate::constants::CODE_NEW_DEVICE);
    pub const PAIRING_OFFER: MessageCode = MessageCode(crate::constants::CODE_PAIRING_OFFER);
    pub const PAIRING_ACCEPT: MessageCode = MessageCode(crate::constants::CODE_PAIRING_ACCEPT);
    pub const PAIRING_REJECT: MessageCode = MessageCode(crate::constants::CODE_PAIRING_REJECT);

    #[must_use]
    pub const fn new(code: u8) -> Self {
        MessageCode(code)
    }

    #[must_use]
    pub fn as_u8(self) -> u8 {
        self.0
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "h{:02x}", self.0)
    }
}

impl std::str::FromStr for MessageCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix('h')
            .ok_or_else(|| Error::InvalidMessageCode(s.to_string()))?;
        if digits.len() != 2 {
            return Err(Error::InvalidMessageCode(s.to_string()));
        }
        u8::from_str_radix(digits, 16)
            .map(MessageCode)
            .map_err(|_| Error::InvalidMessageCode(s.to_string()))
    }
}

/// Badge status bitfield.
///
/// The high nibble is persisted; the low nibble holds transient session
/// flags that only live in memory.
///
/// | bit    | meaning |
/// |--------|---------|
/// | `0x01` | session flag |
/// | `0x02` | secondary session flag |
/// | `0x10` | confirmed: paired at least once |
/// | `0x20` | friend |
/// | `0x40` | firmware update pending |
/// | `0x80` | enabled |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BadgeStatus(u8);

impl BadgeStatus {
    pub const SESSION: u8 = 0x01;
    pub const SESSION_AUX: u8 = 0x02;
    pub const CONFIRMED: u8 = 0x10;
    pub const FRIEND: u8 = 0x20;
    pub const FIRMWARE_PENDING: u8 = 0x40;
    pub const ENABLED: u8 = 0x80;

    /// Bits that make a stored badge eligible for loading at startup.
    pub const LOAD_MASK: u8 = Self::CONFIRMED | Self::FRIEND;

    /// Bits that are written to storage.
    pub const PERSISTED_MASK: u8 = 0xF0;

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        BadgeStatus(bits)
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// `true` when every bit of `mask` is set.
    #[must_use]
    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    /// Set or clear `mask`.
    pub fn set(&mut self, mask: u8, on: bool) {
        if on {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    /// The persisted high nibble.
    #[must_use]
    pub fn persisted(self) -> u8 {
        self.0 & Self::PERSISTED_MASK
    }

    /// A badge whose persisted nibble is zero is not kept in storage.
    #[must_use]
    pub fn is_persistable(self) -> bool {
        self.persisted() != 0
    }

    #[must_use]
    pub fn is_confirmed(self) -> bool {
        self.contains(Self::CONFIRMED)
    }
}

impl fmt::Display for BadgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Metadata reported by the bridge in its handshake banner.
///
/// Replaced wholesale on every successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeInfo {
    pub version: String,
    pub mac: String,
    pub channel: String,
    pub bridge_id: String,
    /// When the handshake completed.
    pub connected_at: DateTime<Utc>,
}

impl BridgeInfo {
    pub fn new(
        version: impl Into<String>,
        mac: impl Into<String>,
        channel: impl Into<String>,
        bridge_id: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            mac: mac.into(),
            channel: channel.into(),
            bridge_id: bridge_id.into(),
            connected_at: Utc::now(),
        }
    }
}

impl fmt::Display for BridgeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "bridge {} (version {}, mac {}, channel {})",
            self.bridge_id, self.version, self.mac, self.channel
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_mac_rejects_more_than_48_bits() {
        assert!(MacAddress::new(MAC_MAX).is_ok());
        assert!(matches!(
            MacAddress::new(MAC_MAX + 1),
            Err(Error::MacOutOfRange(_))
        ));
    }

    #[test]
    fn test_mac_bytes_are_big_endian() {
        let mac = MacAddress::new(0x0011_2233_4455).unwrap();
        assert_eq!(mac.to_bytes(), [0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(MacAddress::from_bytes(mac.to_bytes()), mac);
    }

    #[rstest]
    #[case("h001122334455", 0x1122334455)]
    #[case("001122334455", 0x1122334455)]
    #[case("hffffffffffff", MAC_MAX)]
    #[case("h1", 1)]
    fn test_mac_parse(#[case] input: &str, #[case] expected: u64) {
        assert_eq!(input.parse::<MacAddress>().unwrap().as_u64(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("h")]
    #[case("hzz")]
    #[case("h0011223344556")]
    fn test_mac_parse_rejects(#[case] input: &str) {
        assert!(input.parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_mac_serializes_as_text() {
        let mac = MacAddress::new(0xaabbcc).unwrap();
        let json = serde_json::to_string(&mac).unwrap();
        assert_eq!(json, "\"h000000aabbcc\"");
        let back: MacAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mac);
    }

    #[rstest]
    #[case(0x01, "h01")]
    #[case(0x05, "h05")]
    #[case(0x10, "h10")]
    #[case(0xab, "hab")]
    fn test_message_code_display(#[case] code: u8, #[case] expected: &str) {
        assert_eq!(MessageCode::new(code).to_string(), expected);
        assert_eq!(expected.parse::<MessageCode>().unwrap().as_u8(), code);
    }

    #[test]
    fn test_message_code_rejects_missing_prefix() {
        assert!("01".parse::<MessageCode>().is_err());
        assert!("h1".parse::<MessageCode>().is_err());
    }

    #[test]
    fn test_status_set_and_clear() {
        let mut status = BadgeStatus::default();
        status.set(BadgeStatus::CONFIRMED, true);
        status.set(BadgeStatus::SESSION, true);
        assert_eq!(status.bits(), 0x11);
        assert!(status.is_confirmed());

        status.set(BadgeStatus::CONFIRMED, false);
        assert_eq!(status.bits(), 0x01);
        assert!(!status.is_confirmed());
    }

    #[rstest]
    #[case(0x00, false)]
    #[case(0x03, false)]
    #[case(0x10, true)]
    #[case(0x20, true)]
    #[case(0x41, true)]
    #[case(0x80, true)]
    fn test_status_persistable(#[case] bits: u8, #[case] persistable: bool) {
        assert_eq!(BadgeStatus::from_bits(bits).is_persistable(), persistable);
    }

    #[test]
    fn test_status_persisted_drops_low_nibble() {
        assert_eq!(BadgeStatus::from_bits(0x93).persisted(), 0x90);
    }
}
