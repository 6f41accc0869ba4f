use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Protocol errors
    #[error("Payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("MAC address out of range: {0:#x}")]
    MacOutOfRange(u64),

    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("Invalid message code: {0}")]
    InvalidMessageCode(String),

    #[error("Invalid handshake banner: {0}")]
    InvalidBanner(String),

    // Dashboard edits
    #[error("Unknown badge edit action: {0}")]
    UnknownEditAction(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
