//! Snapshot composition: full and incremental backups over the delta
//! engine, and chain restore.
//!
//! A full snapshot is the raw bytes plus their signature. An incremental
//! snapshot is a delta against the previous signature plus a fresh signature
//! of the new bytes, so the chain can keep growing. Restore folds a full
//! snapshot through a sequence of deltas.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::delta::wire;
use crate::error::{Error, Result};
use crate::patch::{apply, PositionedRead};
use crate::rolling::BLOCK_SIZE;
use crate::signature::{write_signature, Signature, SignatureBuilder};

/// Reader wrapper that feeds every byte it hands out into a running
/// signature builder.
struct SignatureTee<R> {
    inner: R,
    builder: Arc<Mutex<SignatureBuilder>>,
}

impl<R: Read> Read for SignatureTee<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.builder
                .lock()
                .expect("signature builder lock poisoned")
                .update(&buf[..n]);
        }
        Ok(n)
    }
}

/// Stream `src` into both the raw full-snapshot sink and a signature
/// artifact.
pub fn full_backup<R, WS, WF>(mut src: R, sig_out: &mut WS, full_out: &mut WF) -> Result<()>
where
    R: Read,
    WS: Write,
    WF: Write,
{
    let mut builder = SignatureBuilder::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut total = 0u64;
    loop {
        match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                full_out
                    .write_all(&buf[..n])
                    .map_err(|e| Error::sink_write("writing full snapshot", e))?;
                builder.update(&buf[..n]);
                total += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::source_read("reading snapshot source", e)),
        }
    }
    write_signature(&builder.finish(), sig_out)?;
    tracing::debug!(bytes = total, "full snapshot written");
    Ok(())
}

/// Stream `src` into a delta against `prev_sig` and a fresh signature of
/// the new bytes. The two artifacts are independent: the delta alone
/// restores this version; the signature chains to the next incremental.
///
/// A producer error aborts the snapshot and propagates.
pub async fn incremental_backup<R, WS, WD>(
    prev_sig: Signature,
    src: R,
    sig_out: &mut WS,
    delta_out: &mut WD,
) -> Result<()>
where
    R: Read + Send + 'static,
    WS: Write,
    WD: Write,
{
    let builder = Arc::new(Mutex::new(SignatureBuilder::new()));
    let tee = SignatureTee {
        inner: src,
        builder: Arc::clone(&builder),
    };

    wire::write_delta(prev_sig, tee, delta_out).await?;

    let builder = std::mem::take(
        &mut *builder.lock().expect("signature builder lock poisoned"),
    );
    write_signature(&builder.finish(), sig_out)?;
    Ok(())
}

/// Reconstruct a version by folding `full` through a chain of deltas,
/// writing the final reconstruction to `dst`.
///
/// Every step needs positioned reads over the previous reconstruction, so
/// intermediates stage to anonymous temp files; two alternate so a step can
/// read the last reconstruction while writing the next. The files are
/// unlinked on creation and vanish on every exit path. With an empty chain
/// the full snapshot itself is the target version and is copied through.
pub async fn restore<F, W>(
    full: &F,
    deltas: Vec<Box<dyn Read + Send>>,
    dst: &mut W,
    staging_dir: Option<&Path>,
) -> Result<()>
where
    F: PositionedRead,
    W: Write,
{
    if deltas.is_empty() {
        return copy_positioned(full, dst);
    }

    let count = deltas.len();
    let mut prev: Option<std::fs::File> = None;
    for (i, delta) in deltas.into_iter().enumerate() {
        let (ops, result) = wire::read_delta_ops(delta);
        let basis: &dyn PositionedRead = match &prev {
            None => full,
            Some(file) => file,
        };
        if i + 1 == count {
            apply(basis, ops, result, dst).await?;
        } else {
            let mut stage = open_staging(staging_dir)?;
            apply(basis, ops, result, &mut stage).await?;
            prev = Some(stage);
        }
        tracing::debug!(step = i + 1, chain_len = count, "restore step applied");
    }
    Ok(())
}

fn open_staging(dir: Option<&Path>) -> Result<std::fs::File> {
    match dir {
        Some(dir) => tempfile::tempfile_in(dir),
        None => tempfile::tempfile(),
    }
    .map_err(|e| Error::storage(format!("creating restore staging file: {}", e)))
}

fn copy_positioned<F, W>(full: &F, dst: &mut W) -> Result<()>
where
    F: PositionedRead + ?Sized,
    W: Write,
{
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut offset = 0u64;
    loop {
        let n = full
            .read_at(&mut buf, offset)
            .map_err(|e| Error::source_read("reading full snapshot", e))?;
        if n == 0 {
            return Ok(());
        }
        dst.write_all(&buf[..n])
            .map_err(|e| Error::sink_write("writing restored version", e))?;
        offset += n as u64;
    }
}
