//! Traffic records mirrored to the operator dashboard.
//!
//! Each application frame sent to or received from a badge is rendered as a
//! compact JSON array `[mac, size, code, data]`, e.g.
//! `["h001122334455",5,"h07","BDG1"]`.

use nowtalk_core::{MacAddress, MessageCode};
use serde::Serialize;

use crate::{InboundMessage, OutboundFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficDirection {
    Send,
    Recv,
}

impl TrafficDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TrafficDirection::Send => "send",
            TrafficDirection::Recv => "recv",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficRecord {
    pub direction: TrafficDirection,
    pub mac: MacAddress,
    pub size: u8,
    pub code: MessageCode,
    pub data: String,
}

impl TrafficRecord {
    pub fn inbound(msg: &InboundMessage) -> Self {
        Self {
            direction: TrafficDirection::Recv,
            mac: msg.mac,
            size: msg.size,
            code: msg.code,
            data: msg.data.clone(),
        }
    }

    /// Record for an outbound deliver frame; other frames are not mirrored.
    pub fn outbound(frame: &OutboundFrame) -> Option<Self> {
        match frame {
            OutboundFrame::Deliver { mac, code, payload } => Some(Self {
                direction: TrafficDirection::Send,
                mac: *mac,
                size: u8::try_from(1 + payload.len()).unwrap_or(u8::MAX),
                code: *code,
                data: payload.clone(),
            }),
            _ => None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!([
            self.mac.to_string(),
            self.size,
            self.code.to_string(),
            self.data
        ])
        .to_string()
    }
}
