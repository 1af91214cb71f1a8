//! Patch application: rebuild the new stream from the old stream plus an
//! op sequence, verifying the end-to-end content digest.

use sha1::{Digest, Sha1};
use std::io::Write;
use tokio::sync::{mpsc, oneshot};

use crate::delta::Op;
use crate::error::{Error, Result};
use crate::rolling::BLOCK_SIZE;

/// Positioned reads over the basis stream.
///
/// Implementations fill as much of `buf` as the stream allows starting at
/// `offset`; a short count happens only at end of input. The signature pass
/// and the patch pass read the old stream through different handles; this
/// trait covers only the positional side.
pub trait PositionedRead {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize>;
}

impl PositionedRead for std::fs::File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        use std::os::unix::fs::FileExt;
        let mut filled = 0;
        let mut offset = offset;
        while filled < buf.len() {
            match FileExt::read_at(self, &mut buf[filled..], offset) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    offset += n as u64;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl PositionedRead for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        let start = (offset as usize).min(self.len());
        let n = (self.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl<T: PositionedRead + ?Sized> PositionedRead for &T {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

/// Apply an op stream to `old_data`, writing the reconstruction to `out`.
///
/// The ops and result channels come from [`spawn_delta`] or
/// [`read_delta_ops`]; the producer's result is always consulted after the
/// op channel drains and supersedes an otherwise clean run. On failure the
/// output may hold partial data; discarding it is the caller's policy.
///
/// [`spawn_delta`]: crate::delta::spawn_delta
/// [`read_delta_ops`]: crate::delta::read_delta_ops
pub async fn apply<R, W>(
    old_data: &R,
    mut ops: mpsc::Receiver<Op>,
    producer_result: oneshot::Receiver<Result<()>>,
    out: &mut W,
) -> Result<()>
where
    R: PositionedRead + ?Sized,
    W: Write,
{
    let mut content = Sha1::new();
    let mut block_buf = vec![0u8; BLOCK_SIZE];
    let mut verified = false;

    while let Some(op) = ops.recv().await {
        if verified {
            return Err(Error::invalid_op("operation after the end-of-stream marker"));
        }
        match op {
            Op::Block { index } => {
                let offset = u64::from(index) * BLOCK_SIZE as u64;
                let n = old_data
                    .read_at(&mut block_buf, offset)
                    .map_err(|e| Error::source_read("reading basis block", e))?;
                out.write_all(&block_buf[..n])
                    .map_err(|e| Error::sink_write("writing reconstructed block", e))?;
                content.update(&block_buf[..n]);
            }
            Op::Raw { data } => {
                out.write_all(&data)
                    .map_err(|e| Error::sink_write("writing literal bytes", e))?;
                content.update(&data);
            }
            Op::Eof { digest } => {
                let actual: [u8; 20] = content.finalize_reset().into();
                if actual != digest {
                    return Err(Error::Integrity);
                }
                verified = true;
            }
        }
    }

    // A producer error supersedes a clean drain.
    producer_result
        .await
        .map_err(|_| Error::invalid_op("delta producer terminated without a result"))??;

    if !verified {
        return Err(Error::invalid_op("delta ended without an end-of-stream marker"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DIGEST_LEN;

    fn channel_of(ops: Vec<Op>) -> (mpsc::Receiver<Op>, oneshot::Receiver<Result<()>>) {
        let (op_tx, op_rx) = mpsc::channel(ops.len().max(1));
        let (result_tx, result_rx) = oneshot::channel();
        for op in ops {
            op_tx.try_send(op).unwrap();
        }
        let _ = result_tx.send(Ok(()));
        (op_rx, result_rx)
    }

    fn digest_of(data: &[u8]) -> [u8; DIGEST_LEN] {
        Sha1::digest(data).into()
    }

    #[tokio::test]
    async fn raw_and_block_reconstruct() {
        let old = vec![0x11u8; BLOCK_SIZE];
        let mut expected = b"prefix".to_vec();
        expected.extend_from_slice(&old);
        let ops = vec![
            Op::Raw { data: b"prefix".to_vec() },
            Op::Block { index: 0 },
            Op::Eof { digest: digest_of(&expected) },
        ];
        let (rx, result) = channel_of(ops);
        let mut out = Vec::new();
        apply(old.as_slice(), rx, result, &mut out).await.unwrap();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn short_tail_block_is_copied_short() {
        let mut old = vec![0x22u8; BLOCK_SIZE];
        old.extend_from_slice(b"tail");
        let ops = vec![
            Op::Block { index: 0 },
            Op::Block { index: 1 },
            Op::Eof { digest: digest_of(&old) },
        ];
        let (rx, result) = channel_of(ops);
        let mut out = Vec::new();
        apply(old.as_slice(), rx, result, &mut out).await.unwrap();
        assert_eq!(out, old);
    }

    #[tokio::test]
    async fn digest_mismatch_is_integrity_error() {
        let ops = vec![
            Op::Raw { data: b"data".to_vec() },
            Op::Eof { digest: [0u8; DIGEST_LEN] },
        ];
        let (rx, result) = channel_of(ops);
        let mut out = Vec::new();
        let err = apply(b"".as_slice(), rx, result, &mut out).await.unwrap_err();
        assert!(matches!(err, Error::Integrity));
    }

    #[tokio::test]
    async fn op_after_eof_is_invalid() {
        let ops = vec![
            Op::Eof { digest: digest_of(b"") },
            Op::Raw { data: b"late".to_vec() },
        ];
        let (rx, result) = channel_of(ops);
        let mut out = Vec::new();
        let err = apply(b"".as_slice(), rx, result, &mut out).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOp { .. }));
    }

    #[tokio::test]
    async fn missing_eof_is_invalid() {
        let ops = vec![Op::Raw { data: b"data".to_vec() }];
        let (rx, result) = channel_of(ops);
        let mut out = Vec::new();
        let err = apply(b"".as_slice(), rx, result, &mut out).await.unwrap_err();
        assert!(matches!(err, Error::InvalidOp { .. }));
    }

    #[tokio::test]
    async fn producer_error_supersedes_clean_drain() {
        let (_op_tx, op_rx) = mpsc::channel::<Op>(1);
        let (result_tx, result_rx) = oneshot::channel();
        result_tx
            .send(Err(Error::source_read(
                "reading new stream",
                std::io::Error::new(std::io::ErrorKind::Other, "gone"),
            )))
            .unwrap();
        drop(_op_tx);
        let mut out = Vec::new();
        let err = apply(b"".as_slice(), op_rx, result_rx, &mut out).await.unwrap_err();
        assert!(matches!(err, Error::Source { .. }));
    }

    #[test]
    fn slice_positioned_read_is_short_at_end() {
        let data = b"0123456789";
        let mut buf = [0u8; 8];
        assert_eq!(data.as_slice().read_at(&mut buf, 6).unwrap(), 4);
        assert_eq!(&buf[..4], b"6789");
        assert_eq!(data.as_slice().read_at(&mut buf, 100).unwrap(), 0);
    }
}
