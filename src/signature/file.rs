//! Signature artifact reading and writing.
//!
//! Layout: magic, version byte, then the nested map as outer-count +
//! (weak, inner-count + (strong, index)*)*. All integers little-endian.

use std::io::{Read, Write};

use super::{Signature, StrongHash, SIGNATURE_MAGIC, SIGNATURE_VERSION, STRONG_LEN};
use crate::error::{Error, Result};

/// Serialize a signature.
pub fn write_signature<W: Write>(sig: &Signature, out: &mut W) -> Result<()> {
    let write = |out: &mut W, bytes: &[u8]| {
        out.write_all(bytes)
            .map_err(|e| Error::sink_write("writing signature artifact", e))
    };

    write(out, SIGNATURE_MAGIC)?;
    write(out, &[SIGNATURE_VERSION])?;
    write(out, &(sig.blocks.len() as u32).to_le_bytes())?;
    for (weak, strongs) in &sig.blocks {
        write(out, &weak.to_le_bytes())?;
        write(out, &(strongs.len() as u32).to_le_bytes())?;
        for (strong, index) in strongs {
            write(out, strong)?;
            write(out, &index.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Deserialize a signature, validating magic and version.
pub fn read_signature<R: Read>(input: &mut R) -> Result<Signature> {
    let mut magic = [0u8; SIGNATURE_MAGIC.len()];
    read_exact(input, &mut magic)?;
    if &magic != SIGNATURE_MAGIC {
        return Err(Error::serialization("signature artifact has bad magic"));
    }

    let mut version = [0u8; 1];
    read_exact(input, &mut version)?;
    if version[0] != SIGNATURE_VERSION {
        return Err(Error::serialization(format!(
            "unsupported signature version {} (expected {})",
            version[0], SIGNATURE_VERSION
        )));
    }

    let mut sig = Signature::new();
    let outer = read_u32(input)?;
    for _ in 0..outer {
        let weak = read_u32(input)?;
        let inner = read_u32(input)?;
        for _ in 0..inner {
            let mut strong: StrongHash = [0u8; STRONG_LEN];
            read_exact(input, &mut strong)?;
            let index = read_u32(input)?;
            sig.insert(weak, strong, index);
        }
    }
    Ok(sig)
}

fn read_u32<R: Read>(input: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(input, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_exact<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<()> {
    input.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => {
            Error::serialization("signature artifact is truncated")
        }
        _ => Error::source_read("reading signature artifact", e),
    })
}
