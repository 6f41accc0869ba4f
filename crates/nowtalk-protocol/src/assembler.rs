//! Inter-byte-timeout frame assembly for the serial link.
//!
//! The bridge does not delimit its frames; it writes one frame in a single
//! burst and then goes quiet. The reader feeds every chunk it receives into
//! a [`FrameAssembler`] and, once the line has been silent for the
//! inter-byte timeout, takes the accumulated bytes as one frame.
//!
//! ```text
//!  bytes ──feed──> [buffer] ──(silence ≥ 30 ms)──take_frame──> raw frame
//! ```
//!
//! # Usage
//!
//! ```
//! use nowtalk_protocol::FrameAssembler;
//!
//! let mut assembler = FrameAssembler::new();
//! assembler.feed(&[0x02, 0x00, 0x11]);
//! assembler.feed(&[0x22, 0x33, 0x44, 0x55, 0x01, 0x01]);
//!
//! // the reader saw no byte for a full inter-byte window
//! let frame = assembler.take_frame().unwrap();
//! assert_eq!(frame.len(), 9);
//! assert!(assembler.take_frame().is_none());
//! ```

use bytes::{Bytes, BytesMut};

/// Maximum buffer size to prevent memory exhaustion from a chattering line.
const MAX_BUFFER_SIZE: usize = 64 * 1024; // 64 KB

/// Initial buffer capacity; frames are at most a few hundred bytes.
const INITIAL_BUFFER_CAPACITY: usize = 512;

#[derive(Debug)]
pub struct FrameAssembler {
    buffer: BytesMut,
    /// Bytes discarded because the buffer overflowed since creation.
    discarded: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            discarded: 0,
        }
    }

    /// Append bytes read from the port.
    ///
    /// Returns `false` if the buffer overflowed and its contents were
    /// dropped; the bytes of this call are dropped with it.
    pub fn feed(&mut self, bytes: &[u8]) -> bool {
        if self.buffer.len() + bytes.len() > MAX_BUFFER_SIZE {
            self.discarded += self.buffer.len() + bytes.len();
            self.buffer.clear();
            return false;
        }
        self.buffer.extend_from_slice(bytes);
        true
    }

    /// Take everything accumulated since the last frame.
    pub fn take_frame(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.split().freeze())
        }
    }

    /// `true` when bytes are waiting for the line to go quiet.
    pub fn is_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
