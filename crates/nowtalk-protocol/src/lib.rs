//! Wire protocol between the gateway and the nowTalk bridge.
//!
//! - [`checksum`]: CRC-16 used to sign pairing offers
//! - [`frame`]: outbound encoding and inbound classification of frames
//! - [`assembler`]: cuts the serial byte stream into frames on line silence
//! - [`codec`]: tokio-util `Encoder` for writing frames to the port
//! - [`handshake`]: bridge banner parsing
//! - [`offer`]: signed commissioning offer

pub mod assembler;
pub mod checksum;
pub mod codec;
pub mod frame;
pub mod handshake;
pub mod message;
pub mod offer;
pub mod traffic;

pub use assembler::FrameAssembler;
pub use checksum::checksum;
pub use codec::BridgeCodec;
pub use frame::{InboundFrame, OutboundFrame};
pub use handshake::parse_banner;
pub use message::{InboundMessage, StatusKind, StatusLine};
pub use offer::PairingOffer;
pub use traffic::{TrafficDirection, TrafficRecord};
