use nowtalk_core::{MacAddress, MessageCode, constants::FIELD_DELIMITER};
use serde::Serialize;

/// Application message received from a badge (opcode `0x02`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboundMessage {
    pub mac: MacAddress,
    pub code: MessageCode,
    /// Raw size byte as sent: code byte plus payload length.
    pub size: u8,
    pub data: String,
    pub fields: Vec<String>,
}

impl InboundMessage {
    pub fn new(mac: MacAddress, code: MessageCode, size: u8, data: String) -> Self {
        let fields = if data.is_empty() {
            Vec::new()
        } else {
            data.split(FIELD_DELIMITER).map(str::to_string).collect()
        };
        InboundMessage {
            mac,
            code,
            size,
            data,
            fields,
        }
    }

    /// Get field by index
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(|s| s.as_str())
    }

    /// Number of fields in the message
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

/// Category of a status line emitted by the bridge itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Info,
    Warning,
    Error,
    /// Handshake banner (`#**...`).
    Banner,
}

/// Text line emitted by the bridge, not addressed to or from a badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLine {
    pub kind: StatusKind,
    pub text: String,
}

impl StatusLine {
    /// Classify a raw bridge line by its first character.
    ///
    /// `E` (either case) is an error, `!` a warning, a `#**` prefix the
    /// handshake banner, and anything else informational.
    pub fn classify(text: String) -> Self {
        let kind = if text.starts_with(nowtalk_core::constants::HANDSHAKE_BANNER_PREFIX) {
            StatusKind::Banner
        } else {
            match text.chars().next().map(|c| c.to_ascii_uppercase()) {
                Some('E') => StatusKind::Error,
                Some('!') => StatusKind::Warning,
                _ => StatusKind::Info,
            }
        };
        StatusLine { kind, text }
    }
}
