//! Delta production: the ordered edit-operation stream that rebuilds a new
//! stream from an old one.

pub mod produce;
pub mod wire;

pub use produce::spawn_delta;
pub use wire::{read_delta_ops, write_delta};

use std::fmt;

/// Number of ops buffered between the producer task and its consumer.
pub const OP_CHANNEL_CAPACITY: usize = 20;

/// Length in bytes of the content digest carried by [`Op::Eof`]
pub const DIGEST_LEN: usize = 20;

/// One edit operation.
///
/// Concatenating the byte interpretation of every non-`Eof` op in order
/// reproduces the new stream exactly; `Eof` terminates the sequence and
/// carries the SHA-1 of that stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Copy one block out of the old stream (the tail block may be short).
    Block { index: u32 },
    /// Literal bytes of the new stream.
    Raw { data: Vec<u8> },
    /// End-of-stream marker with the content digest of the new stream.
    Eof { digest: [u8; DIGEST_LEN] },
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Block { index } => write!(f, "BLOCK {}", index),
            Op::Raw { data } => write!(f, "RAW {} bytes", data.len()),
            Op::Eof { digest } => write!(f, "EOF sha1={}", hex::encode(digest)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(Op::Block { index: 3 }.to_string(), "BLOCK 3");
        assert_eq!(Op::Raw { data: vec![0; 10] }.to_string(), "RAW 10 bytes");
        let eof = Op::Eof { digest: [0xab; DIGEST_LEN] };
        assert_eq!(eof.to_string(), format!("EOF sha1={}", "ab".repeat(DIGEST_LEN)));
    }
}
