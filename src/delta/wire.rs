//! Delta artifact reading and writing.
//!
//! A delta file is the magic and version followed by a concatenation of
//! encoded ops, with the end-of-stream op as the final record. Each op is a
//! tag byte plus its payload: a little-endian `u32` block index, or a
//! `u32`-length-prefixed byte array for raw data and the content digest.

use std::io::{Read, Write};
use tokio::sync::{mpsc, oneshot};

use super::{produce::spawn_delta, Op, DIGEST_LEN, OP_CHANNEL_CAPACITY};
use crate::error::{Error, Result};
use crate::rolling::BLOCK_SIZE;
use crate::signature::Signature;

/// Magic bytes for delta artifacts
pub const DELTA_MAGIC: &[u8; 6] = b"DVDLT\x01";

/// Current delta format version
pub const DELTA_VERSION: u8 = 1;

const TAG_BLOCK: u8 = 0;
const TAG_RAW: u8 = 1;
const TAG_EOF: u8 = 2;

/// The producer never emits a raw op larger than its flush bound; anything
/// bigger in an artifact is corruption, not data.
const MAX_RAW_LEN: usize = 2 * BLOCK_SIZE;

/// Write the artifact header.
pub fn write_delta_header<W: Write>(out: &mut W) -> Result<()> {
    out.write_all(DELTA_MAGIC)
        .and_then(|_| out.write_all(&[DELTA_VERSION]))
        .map_err(|e| Error::sink_write("writing delta header", e))
}

/// Append one encoded op.
pub fn write_op<W: Write>(out: &mut W, op: &Op) -> Result<()> {
    let write = |out: &mut W, bytes: &[u8]| {
        out.write_all(bytes)
            .map_err(|e| Error::sink_write("writing delta op", e))
    };
    match op {
        Op::Block { index } => {
            write(out, &[TAG_BLOCK])?;
            write(out, &index.to_le_bytes())
        }
        Op::Raw { data } => {
            write(out, &[TAG_RAW])?;
            write(out, &(data.len() as u32).to_le_bytes())?;
            write(out, data)
        }
        Op::Eof { digest } => {
            write(out, &[TAG_EOF])?;
            write(out, &(digest.len() as u32).to_le_bytes())?;
            write(out, digest)
        }
    }
}

/// Validate the artifact header.
pub fn read_delta_header<R: Read>(input: &mut R) -> Result<()> {
    let mut magic = [0u8; DELTA_MAGIC.len()];
    input
        .read_exact(&mut magic)
        .map_err(|e| map_read_err(e, "delta artifact is truncated"))?;
    if &magic != DELTA_MAGIC {
        return Err(Error::serialization("delta artifact has bad magic"));
    }
    let mut version = [0u8; 1];
    input
        .read_exact(&mut version)
        .map_err(|e| map_read_err(e, "delta artifact is truncated"))?;
    if version[0] != DELTA_VERSION {
        return Err(Error::serialization(format!(
            "unsupported delta version {} (expected {})",
            version[0], DELTA_VERSION
        )));
    }
    Ok(())
}

/// Decode the next op, or `None` at a clean end of the artifact.
pub fn read_op<R: Read>(input: &mut R) -> Result<Option<Op>> {
    let mut tag = [0u8; 1];
    loop {
        match input.read(&mut tag) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::source_read("reading delta artifact", e)),
        }
    }

    match tag[0] {
        TAG_BLOCK => {
            let index = read_u32(input)?;
            Ok(Some(Op::Block { index }))
        }
        TAG_RAW => {
            let len = read_u32(input)? as usize;
            if len > MAX_RAW_LEN {
                return Err(Error::serialization(format!(
                    "raw op of {} bytes exceeds the {} byte bound",
                    len, MAX_RAW_LEN
                )));
            }
            let mut data = vec![0u8; len];
            read_payload(input, &mut data)?;
            Ok(Some(Op::Raw { data }))
        }
        TAG_EOF => {
            let len = read_u32(input)? as usize;
            if len != DIGEST_LEN {
                return Err(Error::serialization(format!(
                    "end-of-stream digest is {} bytes, expected {}",
                    len, DIGEST_LEN
                )));
            }
            let mut digest = [0u8; DIGEST_LEN];
            read_payload(input, &mut digest)?;
            Ok(Some(Op::Eof { digest }))
        }
        other => Err(Error::serialization(format!("unknown op tag {}", other))),
    }
}

/// Stream a delta artifact back into the channel shape the live producer
/// uses, so the patch applier consumes both identically.
pub fn read_delta_ops<R>(input: R) -> (mpsc::Receiver<Op>, oneshot::Receiver<Result<()>>)
where
    R: Read + Send + 'static,
{
    let (op_tx, op_rx) = mpsc::channel(OP_CHANNEL_CAPACITY);
    let (result_tx, result_rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        let mut input = input;
        let result = (|| {
            read_delta_header(&mut input)?;
            while let Some(op) = read_op(&mut input)? {
                if op_tx.blocking_send(op).is_err() {
                    break;
                }
            }
            Ok(())
        })();
        let _ = result_tx.send(result);
    });
    (op_rx, result_rx)
}

/// Produce the delta of `new_data` against `signature` and encode it to
/// `out` as each op arrives.
pub async fn write_delta<R, W>(signature: Signature, new_data: R, out: &mut W) -> Result<()>
where
    R: Read + Send + 'static,
    W: Write,
{
    let (mut ops, result) = spawn_delta(signature, new_data);
    write_delta_header(out)?;
    let mut op_count = 0u64;
    while let Some(op) = ops.recv().await {
        write_op(out, &op)?;
        op_count += 1;
    }
    result
        .await
        .map_err(|_| Error::invalid_op("delta producer terminated without a result"))??;
    tracing::debug!(op_count, "delta artifact written");
    Ok(())
}

fn read_u32<R: Read>(input: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_payload(input, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_payload<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<()> {
    input
        .read_exact(buf)
        .map_err(|e| map_read_err(e, "delta artifact is truncated mid-op"))
}

fn map_read_err(e: std::io::Error, truncated: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => Error::serialization(truncated),
        _ => Error::source_read("reading delta artifact", e),
    }
}
