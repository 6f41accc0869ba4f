//! Bridge handshake banner parsing.
//!
//! After the gateway writes the sentinel, a live bridge answers with a
//! banner of the form:
//!
//! ```text
//! #**~<version>~<mac>~<channel>~<bridgeID>
//! ```
//!
//! Some bridge builds glue the version directly onto the prefix
//! (`#**1.0~aabbcc~6~BR123`); both forms are accepted.

use nowtalk_core::{
    BridgeInfo, Error, Result,
    constants::{FIELD_DELIMITER, HANDSHAKE_BANNER_PREFIX},
};

/// Parse the bridge's answer to the handshake sentinel.
///
/// # Errors
/// Returns `Error::InvalidBanner` if the text does not start with `#**` or
/// does not carry all four bridge fields.
///
/// # Example
///
/// ```
/// use nowtalk_protocol::parse_banner;
///
/// let info = parse_banner("#**1.0~aabbcc~6~BR123").unwrap();
/// assert_eq!(info.version, "1.0");
/// assert_eq!(info.bridge_id, "BR123");
/// ```
pub fn parse_banner(text: &str) -> Result<BridgeInfo> {
    let text = text.trim_end_matches(['\0', '\r', '\n', ' ']);
    if !text.starts_with(HANDSHAKE_BANNER_PREFIX) {
        return Err(Error::InvalidBanner(text.to_string()));
    }

    let fields: Vec<&str> = text.split(FIELD_DELIMITER).collect();
    let values: &[&str] = if fields.len() >= 5 {
        &fields[1..5]
    } else if fields.len() == 4 && fields[0].len() > HANDSHAKE_BANNER_PREFIX.len() {
        // version glued onto the prefix
        return Ok(BridgeInfo::new(
            &fields[0][HANDSHAKE_BANNER_PREFIX.len()..],
            fields[1],
            fields[2],
            fields[3],
        ));
    } else {
        return Err(Error::InvalidBanner(text.to_string()));
    };

    Ok(BridgeInfo::new(values[0], values[1], values[2], values[3]))
}
