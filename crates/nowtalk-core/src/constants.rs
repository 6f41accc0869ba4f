//! Core constants for the nowTalk bridge link protocol.
//!
//! The bridge speaks a small binary protocol over the serial link. Every
//! badge-addressed frame shares a fixed 9-byte header:
//!
//! ```text
//! +--------+-----------------+------+------+-------------+
//! | opcode | MAC (6, BE)     | size | code | payload ... |
//! +--------+-----------------+------+------+-------------+
//!   byte 0   bytes 1..=6      b7     b8     b9..
//! ```
//!
//! `size` counts the code byte plus the payload, so an empty payload has
//! `size == 1`. Payload text is split into fields on `~`.
//!
//! Frames whose first byte is not a known opcode are status lines emitted by
//! the bridge itself. The first character names the category.
//!
//! # Usage
//!
//! ```
//! use nowtalk_core::constants::*;
//!
//! assert_eq!(HEADER_LEN, 9);
//! assert_eq!(OPCODE_DELIVER, 0x02);
//! ```

use std::time::Duration;

// ============================================================================
// Frame layout
// ============================================================================

/// Length of the fixed header of a badge-addressed frame.
pub const HEADER_LEN: usize = 9;

/// Length of a MAC address on the wire.
pub const MAC_LEN: usize = 6;

/// Offset of the size byte inside the header.
pub const SIZE_OFFSET: usize = 7;

/// Offset of the application code byte inside the header.
pub const CODE_OFFSET: usize = 8;

/// Largest payload that still fits the one-byte size field (`1 + len <= 255`).
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - 1;

/// Field delimiter inside application payloads and handshake banners.
///
/// ```
/// use nowtalk_core::constants::FIELD_DELIMITER;
///
/// let fields: Vec<&str> = "BDG1~10.0.0.1~Ann".split(FIELD_DELIMITER).collect();
/// assert_eq!(fields, vec!["BDG1", "10.0.0.1", "Ann"]);
/// ```
pub const FIELD_DELIMITER: char = '~';

// ============================================================================
// Opcodes
// ============================================================================

/// Gateway → bridge: deliver an application message to a badge.
/// Bridge → gateway: application message received from a badge.
pub const OPCODE_DELIVER: u8 = 0x02;

/// Gateway → bridge: remove a badge from the bridge's peer roster.
pub const OPCODE_UNPEER: u8 = 0x03;

/// Bridge → gateway: a badge was released from the peer roster.
pub const OPCODE_RELEASED: u8 = 0x04;

// ============================================================================
// Application codes
// ============================================================================

/// Liveness ping sent by a badge.
pub const CODE_PING: u8 = 0x01;

/// New-device announcement.
pub const CODE_NEW_DEVICE: u8 = 0x05;

/// Signed pairing offer sent to a badge.
pub const CODE_PAIRING_OFFER: u8 = 0x07;

/// Badge accepted the pairing offer.
pub const CODE_PAIRING_ACCEPT: u8 = 0x10;

/// Badge rejected the pairing offer.
pub const CODE_PAIRING_REJECT: u8 = 0x11;

// ============================================================================
// Handshake
// ============================================================================

/// Sentinel written to the bridge as soon as the port opens.
pub const HANDSHAKE_SENTINEL: &[u8] = b"***\n\0";

/// Prefix of the banner a live bridge answers the sentinel with.
pub const HANDSHAKE_BANNER_PREFIX: &str = "#**";

// ============================================================================
// Pairing
// ============================================================================

/// Salt prepended to the unsigned offer before checksumming it.
pub const OFFER_CHECKSUM_SALT: &str = "nowTalkSrv!";

// ============================================================================
// Timing
// ============================================================================

/// Window the bridge has to answer the handshake sentinel.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(1500);

/// Fixed delay before a reconnect attempt after an unintentional close.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Onboarding window, refreshed on every relevant pairing event.
pub const DEFAULT_PAIRING_TIMEOUT: Duration = Duration::from_secs(90);

/// Serial silence that terminates one inbound frame.
pub const DEFAULT_INTER_BYTE_TIMEOUT: Duration = Duration::from_millis(30);

/// A badge that has not pinged for this long loses its session bit.
pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(120);

/// Period of the gateway housekeeping tick.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);

// ============================================================================
// Serial defaults
// ============================================================================

/// Default serial baud rate of the bridge.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
