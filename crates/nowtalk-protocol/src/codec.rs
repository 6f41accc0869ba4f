//! Tokio codec for writing bridge frames.
//!
//! Only the encoding half lives here. Inbound frames are delimited by line
//! silence rather than by bytes, so the reader uses [`FrameAssembler`]
//! directly instead of a `Decoder`.
//!
//! ```rust,no_run
//! use futures::SinkExt;
//! use tokio_util::codec::FramedWrite;
//! use nowtalk_protocol::{BridgeCodec, OutboundFrame};
//!
//! # async fn example(port: tokio::io::DuplexStream) -> nowtalk_core::Result<()> {
//! let mut sink = FramedWrite::new(port, BridgeCodec::new());
//! sink.send(OutboundFrame::Handshake).await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`FrameAssembler`]: crate::FrameAssembler

use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::OutboundFrame;
use nowtalk_core::{Error, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct BridgeCodec;

impl BridgeCodec {
    pub fn new() -> Self {
        BridgeCodec
    }
}

impl Encoder<OutboundFrame> for BridgeCodec {
    type Error = Error;

    fn encode(&mut self, item: OutboundFrame, dst: &mut BytesMut) -> Result<()> {
        item.encode(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nowtalk_core::{MacAddress, MessageCode};

    #[test]
    fn test_encode_appends_frames() {
        let mut codec = BridgeCodec::new();
        let mut buffer = BytesMut::new();
        let mac = MacAddress::new(0x1122334455).unwrap();

        codec.encode(OutboundFrame::Handshake, &mut buffer).unwrap();
        codec
            .encode(
                OutboundFrame::deliver(mac, MessageCode::PING, "x").unwrap(),
                &mut buffer,
            )
            .unwrap();

        assert_eq!(buffer.len(), 5 + 10);
        assert_eq!(&buffer[..5], b"***\n\0");
        assert_eq!(buffer[5], 0x02);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let mut codec = BridgeCodec::new();
        let mut buffer = BytesMut::new();
        let frame = OutboundFrame::Deliver {
            mac: MacAddress::new(1).unwrap(),
            code: MessageCode::PING,
            payload: "y".repeat(300),
        };
        assert!(matches!(
            codec.encode(frame, &mut buffer),
            Err(Error::PayloadTooLarge { len: 300, .. })
        ));
    }
}
