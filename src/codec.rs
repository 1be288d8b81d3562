// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Wire format of a measurement datagram.
//!
//! Every datagram is exactly [`MESSAGE_SIZE`] bytes, big-endian:
//!
//! | offset | width | field |
//! |--------|-------|-------|
//! | 0      | 8     | timestamp, signed ns since UTC midnight |
//! | 8      | 8     | sequence number, unsigned |
//! | 16     | 2     | kind, unsigned |
//!
//! There is no checksum beyond UDP's own.

use thiserror::Error;

/// Encoded size of a [`MessageFormat`]
pub const MESSAGE_SIZE: usize = 18;

/// Receive buffer size; large enough for any Ethernet-MTU datagram so
/// oversized foreign traffic is read whole instead of truncated.
pub const RECV_BUFFER_SIZE: usize = 1500;

const TIMESTAMP_OFFSET: usize = 0;
const SEQUENCE_OFFSET: usize = 8;
const KIND_OFFSET: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Datagram too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
}

/// Traffic class carried in the `kind` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Test traffic; the only kind the sender produces
    Test,
    /// Reserved for control traffic
    Operation,
    /// Any other value seen on the wire, kept as-is
    Other(u16),
}

impl From<u16> for MessageKind {
    fn from(value: u16) -> Self {
        match value {
            0 => MessageKind::Test,
            1 => MessageKind::Operation,
            other => MessageKind::Other(other),
        }
    }
}

impl From<MessageKind> for u16 {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Test => 0,
            MessageKind::Operation => 1,
            MessageKind::Other(value) => value,
        }
    }
}

/// Decoded measurement datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFormat {
    /// Nanoseconds since UTC midnight on the sender's clock
    pub timestamp: i64,
    /// Per-sender counter, starting at 0
    pub sequence: u64,
    pub kind: MessageKind,
}

impl MessageFormat {
    pub fn encode(&self) -> [u8; MESSAGE_SIZE] {
        encode(self.timestamp, self.sequence, self.kind)
    }
}

impl std::fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{timestamp: {}, sequence: {}, kind: {}}}",
            self.timestamp,
            self.sequence,
            u16::from(self.kind)
        )
    }
}

pub fn encode(timestamp: i64, sequence: u64, kind: MessageKind) -> [u8; MESSAGE_SIZE] {
    let mut buf = [0u8; MESSAGE_SIZE];
    buf[TIMESTAMP_OFFSET..SEQUENCE_OFFSET].copy_from_slice(&timestamp.to_be_bytes());
    buf[SEQUENCE_OFFSET..KIND_OFFSET].copy_from_slice(&sequence.to_be_bytes());
    buf[KIND_OFFSET..MESSAGE_SIZE].copy_from_slice(&u16::from(kind).to_be_bytes());
    buf
}

/// Decode the fixed header from the start of `data`; trailing bytes are ignored.
pub fn decode(data: &[u8]) -> Result<MessageFormat, DecodeError> {
    if data.len() < MESSAGE_SIZE {
        return Err(DecodeError::TooShort {
            expected: MESSAGE_SIZE,
            actual: data.len(),
        });
    }

    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&data[TIMESTAMP_OFFSET..SEQUENCE_OFFSET]);
    let mut sequence = [0u8; 8];
    sequence.copy_from_slice(&data[SEQUENCE_OFFSET..KIND_OFFSET]);
    let kind = u16::from_be_bytes([data[KIND_OFFSET], data[KIND_OFFSET + 1]]);

    Ok(MessageFormat {
        timestamp: i64::from_be_bytes(timestamp),
        sequence: u64::from_be_bytes(sequence),
        kind: MessageKind::from(kind),
    })
}
