//! Binary frames exchanged with the bridge.
//!
//! # Wire Format
//!
//! Badge-addressed frames share a 9-byte header (see
//! [`nowtalk_core::constants`]). Outbound:
//!
//! ```text
//! 02 | 00 11 22 33 44 55 | 05 | 07 | 'B' 'D' 'G' '1'
//! op   MAC (BE)           size code payload (size - 1 bytes)
//! ```
//!
//! Inbound frames are classified by their first byte:
//! - `0x02`: application message from a badge
//! - `0x04`: badge released from the bridge roster
//! - anything else: a text status line from the bridge
//!
//! Decoding never fails. Length fields that point past the end of the frame
//! are truncated to the bytes actually present, and frames too short to
//! carry their header decode to [`InboundFrame::Truncated`].

use bytes::{BufMut, Bytes, BytesMut};
use nowtalk_core::{
    Error, MacAddress, MessageCode, Result,
    constants::{
        CODE_OFFSET, HANDSHAKE_SENTINEL, HEADER_LEN, MAC_LEN, MAX_PAYLOAD_LEN, OPCODE_DELIVER,
        OPCODE_RELEASED, OPCODE_UNPEER, SIZE_OFFSET,
    },
};

use crate::message::{InboundMessage, StatusLine};

/// Frame written by the gateway to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Sentinel that asks the bridge to identify itself.
    Handshake,

    /// Application message for a badge (opcode `0x02`).
    Deliver {
        mac: MacAddress,
        code: MessageCode,
        payload: String,
    },

    /// Remove a badge from the bridge's roster (opcode `0x03`).
    Unpeer { mac: MacAddress },
}

impl OutboundFrame {
    /// Build a deliver frame, checking that the payload fits the size byte.
    ///
    /// # Errors
    /// Returns `Error::PayloadTooLarge` if the payload exceeds 254 bytes.
    pub fn deliver(mac: MacAddress, code: MessageCode, payload: impl Into<String>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(OutboundFrame::Deliver { mac, code, payload })
    }

    pub fn unpeer(mac: MacAddress) -> Self {
        OutboundFrame::Unpeer { mac }
    }

    /// Number of bytes the encoded frame occupies.
    pub fn encoded_len(&self) -> usize {
        match self {
            OutboundFrame::Handshake => HANDSHAKE_SENTINEL.len(),
            OutboundFrame::Deliver { payload, .. } => HEADER_LEN + payload.len(),
            OutboundFrame::Unpeer { .. } => HEADER_LEN,
        }
    }

    /// Append the wire form of this frame to `dst`.
    ///
    /// # Errors
    /// Returns `Error::PayloadTooLarge` for a deliver frame built without
    /// [`OutboundFrame::deliver`] whose payload does not fit.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(self.encoded_len());
        match self {
            OutboundFrame::Handshake => dst.put_slice(HANDSHAKE_SENTINEL),
            OutboundFrame::Deliver { mac, code, payload } => {
                let bytes = payload.as_bytes();
                if bytes.len() > MAX_PAYLOAD_LEN {
                    return Err(Error::PayloadTooLarge {
                        len: bytes.len(),
                        max: MAX_PAYLOAD_LEN,
                    });
                }
                dst.put_u8(OPCODE_DELIVER);
                dst.put_slice(&mac.to_bytes());
                dst.put_u8(1 + bytes.len() as u8);
                dst.put_u8(code.as_u8());
                dst.put_slice(bytes);
            }
            OutboundFrame::Unpeer { mac } => {
                dst.put_u8(OPCODE_UNPEER);
                dst.put_slice(&mac.to_bytes());
                // size and code stay zero
                dst.put_u8(0);
                dst.put_u8(0);
            }
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// Frame received from the bridge, classified by its first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Application message from a badge.
    Message(InboundMessage),

    /// A badge was released from the bridge roster. Informational only.
    Released(MacAddress),

    /// Text status line from the bridge itself.
    Status(StatusLine),

    /// Opcode recognised but the frame is too short for its header.
    Truncated(Bytes),
}

impl InboundFrame {
    /// Classify and decode one raw frame.
    ///
    /// # Example
    ///
    /// ```
    /// use nowtalk_protocol::{InboundFrame, StatusKind};
    ///
    /// let frame = InboundFrame::decode(b"! low battery on peer 3");
    /// match frame {
    ///     InboundFrame::Status(line) => assert_eq!(line.kind, StatusKind::Warning),
    ///     other => panic!("unexpected frame {other:?}"),
    /// }
    /// ```
    pub fn decode(raw: &[u8]) -> InboundFrame {
        match raw.first() {
            Some(&OPCODE_DELIVER) => Self::decode_message(raw),
            Some(&OPCODE_RELEASED) => match read_mac(raw) {
                Some(mac) => InboundFrame::Released(mac),
                None => InboundFrame::Truncated(Bytes::copy_from_slice(raw)),
            },
            _ => InboundFrame::Status(StatusLine::classify(
                String::from_utf8_lossy(raw).into_owned(),
            )),
        }
    }

    fn decode_message(raw: &[u8]) -> InboundFrame {
        if raw.len() < HEADER_LEN {
            return InboundFrame::Truncated(Bytes::copy_from_slice(raw));
        }
        let Some(mac) = read_mac(raw) else {
            return InboundFrame::Truncated(Bytes::copy_from_slice(raw));
        };
        let size = raw[SIZE_OFFSET];
        let code = MessageCode::new(raw[CODE_OFFSET]);

        let data = if size > 1 {
            let declared_end = HEADER_LEN + usize::from(size) - 1;
            let end = declared_end.min(raw.len());
            String::from_utf8_lossy(&raw[HEADER_LEN..end]).into_owned()
        } else {
            String::new()
        };

        InboundFrame::Message(InboundMessage::new(mac, code, size, data))
    }
}

fn read_mac(raw: &[u8]) -> Option<MacAddress> {
    let bytes: [u8; MAC_LEN] = raw.get(1..1 + MAC_LEN)?.try_into().ok()?;
    Some(MacAddress::from_bytes(bytes))
}
