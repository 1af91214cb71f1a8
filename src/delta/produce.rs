//! The delta producer: a streaming match loop between the new stream and an
//! old stream's signature.
//!
//! The producer runs as a blocking task and talks to its consumer through a
//! bounded op channel (backpressure) plus a one-shot result slot. Ops arrive
//! in production order; the result must be checked after the channel drains.

use md5::{Digest, Md5};
use sha1::Sha1;
use std::io::Read;
use tokio::sync::{mpsc, oneshot};

use super::{Op, OP_CHANNEL_CAPACITY};
use crate::error::{Error, Result};
use crate::rolling::{RollingChecksum, BLOCK_SIZE};
use crate::signature::{Signature, StrongHash};

/// Spawn the producer for `new_data` against `signature`.
///
/// On a source read error the error lands in the result slot, the op channel
/// closes, and no [`Op::Eof`] is emitted. On success the producer enqueues
/// `Eof` last, then reports `Ok(())`.
pub fn spawn_delta<R>(
    signature: Signature,
    new_data: R,
) -> (mpsc::Receiver<Op>, oneshot::Receiver<Result<()>>)
where
    R: Read + Send + 'static,
{
    let (op_tx, op_rx) = mpsc::channel(OP_CHANNEL_CAPACITY);
    let (result_tx, result_rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        let result = produce(&signature, new_data, &op_tx);
        let _ = result_tx.send(result);
    });
    (op_rx, result_rx)
}

fn produce<R: Read>(sig: &Signature, mut new_data: R, ops: &mpsc::Sender<Op>) -> Result<()> {
    let mut weak = RollingChecksum::new();
    let mut content = Sha1::new();
    let mut pending: Vec<u8> = Vec::with_capacity(2 * BLOCK_SIZE);
    let mut block_buf = vec![0u8; BLOCK_SIZE];
    let mut byte_buf = [0u8; 1];

    let mut blocks_matched = 0u64;
    let mut raw_bytes = 0u64;

    'aligned: loop {
        // The accumulator and pending buffer are freshly reset here, so try
        // to take a whole block at once before falling back to the
        // byte-by-byte search.
        let n = read_full(&mut new_data, &mut block_buf)?;
        pending.extend_from_slice(&block_buf[..n]);
        weak.feed(&block_buf[..n]);
        content.update(&block_buf[..n]);
        if n < BLOCK_SIZE {
            break 'aligned;
        }

        loop {
            if let Some(candidates) = sig.candidates(weak.sum32()) {
                let window = &pending[pending.len() - BLOCK_SIZE..];
                let strong: StrongHash = Md5::digest(window).into();
                if let Some(&index) = candidates.get(&strong) {
                    let unmatched = pending.len() - BLOCK_SIZE;
                    if unmatched > 0 {
                        raw_bytes += unmatched as u64;
                        send(ops, Op::Raw { data: pending[..unmatched].to_vec() })?;
                    }
                    blocks_matched += 1;
                    send(ops, Op::Block { index })?;
                    weak.reset();
                    pending.clear();
                    continue 'aligned;
                }
                tracing::debug!(weak = weak.sum32(), "weak hash hit without strong match");
            }

            // Bound the live buffer while sliding through unmatched data.
            if pending.len() >= 2 * BLOCK_SIZE {
                let flushed: Vec<u8> = pending.drain(..BLOCK_SIZE).collect();
                raw_bytes += flushed.len() as u64;
                send(ops, Op::Raw { data: flushed })?;
            }

            if read_full(&mut new_data, &mut byte_buf)? == 0 {
                break 'aligned;
            }
            pending.push(byte_buf[0]);
            weak.feed(&byte_buf);
            content.update(&byte_buf);
        }
    }

    if !pending.is_empty() {
        // A residue shorter than a block can only be the fresh read of an
        // aligned search, so the accumulator holds exactly these bytes and
        // the old stream's tail block may match at its own length.
        let tail_index = if pending.len() < BLOCK_SIZE {
            sig.lookup(weak.sum32(), &Md5::digest(&pending).into())
        } else {
            None
        };
        match tail_index {
            Some(index) => {
                blocks_matched += 1;
                send(ops, Op::Block { index })?;
            }
            None => {
                raw_bytes += pending.len() as u64;
                send(ops, Op::Raw { data: std::mem::take(&mut pending) })?;
            }
        }
    }
    send(ops, Op::Eof { digest: content.finalize().into() })?;

    tracing::debug!(blocks_matched, raw_bytes, "delta production complete");
    Ok(())
}

fn send(ops: &mpsc::Sender<Op>, op: Op) -> Result<()> {
    ops.blocking_send(op).map_err(|_| {
        Error::sink_write(
            "op channel receiver dropped",
            std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        )
    })
}

/// Read until `buf` is full or the stream ends; the count covers everything
/// read. Short counts happen only at end of stream.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::source_read("reading new stream", e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::build_signature;
    use std::io::Cursor;

    async fn collect(sig: Signature, new_data: Vec<u8>) -> (Vec<Op>, Result<()>) {
        let (mut rx, result) = spawn_delta(sig, Cursor::new(new_data));
        let mut ops = Vec::new();
        while let Some(op) = rx.recv().await {
            ops.push(op);
        }
        let result = result.await.expect("producer dropped its result");
        (ops, result)
    }

    fn sig_of(data: &[u8]) -> Signature {
        build_signature(Cursor::new(data.to_vec())).unwrap()
    }

    #[tokio::test]
    async fn empty_new_stream_is_a_lone_eof() {
        let (ops, result) = collect(Signature::new(), Vec::new()).await;
        result.unwrap();
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], Op::Eof { .. }));
    }

    #[tokio::test]
    async fn identical_streams_have_no_raw_ops() {
        let mut data = vec![0u8; 2 * BLOCK_SIZE];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 255) as u8;
        }
        data.extend_from_slice(b"short tail bytes");
        let (ops, result) = collect(sig_of(&data), data.clone()).await;
        result.unwrap();
        assert!(ops.iter().all(|op| !matches!(op, Op::Raw { .. })));
        let blocks: Vec<u32> = ops
            .iter()
            .filter_map(|op| match op {
                Op::Block { index } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(blocks, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn unknown_data_becomes_raw() {
        let old = vec![1u8; BLOCK_SIZE];
        let new: Vec<u8> = (0..BLOCK_SIZE / 2).map(|i| (i % 7) as u8).collect();
        let (ops, result) = collect(sig_of(&old), new.clone()).await;
        result.unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0], Op::Raw { data: new });
        assert!(matches!(ops[1], Op::Eof { .. }));
    }

    #[tokio::test]
    async fn weak_collision_without_strong_match_is_not_fatal() {
        // Two blocks engineered to share an Adler-32 sum: a 2 at offset 2
        // weighs the same as 1s at offsets 1 and 3.
        let mut block_a = vec![0u8; BLOCK_SIZE];
        block_a[2] = 2;
        let mut block_b = vec![0u8; BLOCK_SIZE];
        block_b[1] = 1;
        block_b[3] = 1;
        assert_eq!(
            crate::rolling::weak_checksum(&block_a),
            crate::rolling::weak_checksum(&block_b)
        );

        let mut new = block_b.clone();
        new.extend_from_slice(&block_a);
        let (ops, result) = collect(sig_of(&block_a), new).await;
        result.unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], Op::Raw { data: block_b });
        assert_eq!(ops[1], Op::Block { index: 0 });
        assert!(matches!(ops[2], Op::Eof { .. }));
    }

    #[tokio::test]
    async fn source_error_aborts_without_eof() {
        struct FailAfter {
            remaining: usize,
        }
        impl Read for FailAfter {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.remaining == 0 {
                    return Err(std::io::Error::new(std::io::ErrorKind::Other, "torn cable"));
                }
                let n = self.remaining.min(buf.len());
                buf[..n].fill(0x55);
                self.remaining -= n;
                Ok(n)
            }
        }

        let (mut rx, result) = spawn_delta(Signature::new(), FailAfter { remaining: 3 * BLOCK_SIZE });
        let mut ops = Vec::new();
        while let Some(op) = rx.recv().await {
            ops.push(op);
        }
        let err = result.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Source { .. }));
        assert!(ops.iter().all(|op| !matches!(op, Op::Eof { .. })));
    }
}
