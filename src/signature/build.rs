//! Signature construction: one sequential pass over the old stream.

use md5::{Digest, Md5};
use std::io::Read;

use super::Signature;
use crate::error::{Error, Result};
use crate::rolling::{weak_checksum, BLOCK_SIZE};

/// Streaming signature builder.
///
/// Feed it bytes in any chunking; it seals a block each time [`BLOCK_SIZE`]
/// bytes accumulate and records the short tail, whatever its length, on
/// [`finish`](SignatureBuilder::finish). An empty stream produces an empty
/// signature; a stream whose length is an exact multiple of the block size
/// produces no zero-length tail block.
#[derive(Default)]
pub struct SignatureBuilder {
    sig: Signature,
    buf: Vec<u8>,
    index: u32,
}

impl SignatureBuilder {
    pub fn new() -> Self {
        Self {
            sig: Signature::new(),
            buf: Vec::with_capacity(BLOCK_SIZE),
            index: 0,
        }
    }

    /// Append a chunk of the old stream.
    pub fn update(&mut self, data: &[u8]) {
        let mut data = data;
        while !data.is_empty() {
            let take = (BLOCK_SIZE - self.buf.len()).min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buf.len() == BLOCK_SIZE {
                self.seal_block();
            }
        }
    }

    /// Seal any pending tail and hand back the signature.
    pub fn finish(mut self) -> Signature {
        if !self.buf.is_empty() {
            self.seal_block();
        }
        self.sig
    }

    fn seal_block(&mut self) {
        let weak = weak_checksum(&self.buf);
        let strong = Md5::digest(&self.buf).into();
        self.sig.insert(weak, strong, self.index);
        self.index += 1;
        self.buf.clear();
    }
}

/// Build the signature of the whole of `old_data`.
///
/// A read failure discards the partial signature and surfaces the error.
pub fn build_signature<R: Read>(mut old_data: R) -> Result<Signature> {
    let mut builder = SignatureBuilder::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        match old_data.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => builder.update(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::source_read("reading basis stream", e)),
        }
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn empty_stream_yields_empty_signature() {
        let sig = build_signature(Cursor::new(Vec::new())).unwrap();
        assert!(sig.is_empty());
    }

    #[test]
    fn exact_multiple_has_no_tail_block() {
        let data = vec![7u8; 3 * BLOCK_SIZE];
        let sig = build_signature(Cursor::new(data)).unwrap();
        // All three blocks are identical, so first-wins collapses them.
        assert_eq!(sig.len(), 1);
        let strong = Md5::digest(&vec![7u8; BLOCK_SIZE]).into();
        assert_eq!(sig.lookup(weak_checksum(&vec![7u8; BLOCK_SIZE]), &strong), Some(0));
    }

    #[test]
    fn tail_recorded_at_its_index() {
        let mut data = vec![1u8; BLOCK_SIZE];
        data.extend_from_slice(b"short tail");
        let sig = build_signature(Cursor::new(data)).unwrap();
        assert_eq!(sig.len(), 2);
        let tail_strong = Md5::digest(b"short tail").into();
        assert_eq!(sig.lookup(weak_checksum(b"short tail"), &tail_strong), Some(1));
    }

    #[test]
    fn duplicate_blocks_keep_first_index() {
        let block = vec![0xabu8; BLOCK_SIZE];
        let mut data = block.clone();
        data.extend_from_slice(&block);
        data.extend_from_slice(&vec![0xcdu8; BLOCK_SIZE]);
        let sig = build_signature(Cursor::new(data)).unwrap();
        let strong = Md5::digest(&block).into();
        assert_eq!(sig.lookup(weak_checksum(&block), &strong), Some(0));
    }

    #[test]
    fn chunking_does_not_change_result() {
        let data: Vec<u8> = (0..2 * BLOCK_SIZE + 100).map(|i| (i % 256) as u8).collect();
        let whole = build_signature(Cursor::new(data.clone())).unwrap();
        let mut builder = SignatureBuilder::new();
        for chunk in data.chunks(1234) {
            builder.update(chunk);
        }
        assert_eq!(builder.finish(), whole);
    }

    #[test]
    fn read_error_is_surfaced() {
        struct FailingReader;
        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
            }
        }
        let err = build_signature(FailingReader).unwrap_err();
        assert!(matches!(err, Error::Source { .. }));
    }
}
