use std::io::{self, Read};

use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};

/// Body codings the runner knows how to undo.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
    Deflate,
    /// Absent, `identity`, or anything unrecognised: bytes pass through.
    Passthrough,
}

impl ContentEncoding {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => Self::Gzip,
            Some("deflate") => Self::Deflate,
            _ => Self::Passthrough,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Passthrough => "identity",
        }
    }
}

/// Ceiling on decoded output; a small compressed body must not be able to
/// expand without bound.
pub const MAX_DECODED_SIZE: usize = 64 * 1024 * 1024;

pub fn decode_body(encoding: ContentEncoding, body: &[u8]) -> io::Result<Vec<u8>> {
    decode_body_limited(encoding, body, MAX_DECODED_SIZE)
}

fn decode_body_limited(
    encoding: ContentEncoding,
    body: &[u8],
    limit: usize,
) -> io::Result<Vec<u8>> {
    let decoded = match encoding {
        // Every member of a multi-member stream is decoded, not just the first.
        ContentEncoding::Gzip => read_limited(MultiGzDecoder::new(body), body.len(), limit)?,
        ContentEncoding::Deflate => inflate(body, limit)?,
        ContentEncoding::Passthrough => return Ok(body.to_vec()),
    };
    if decoded.len() > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("decoded body exceeds {limit} bytes"),
        ));
    }
    Ok(decoded)
}

/// Reads at most one byte past `limit`, enough for the caller to tell an
/// oversized stream apart.
fn read_limited<R: Read>(reader: R, wire_len: usize, limit: usize) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(wire_len.saturating_mul(3).min(limit));
    reader.take(limit as u64 + 1).read_to_end(&mut out)?;
    Ok(out)
}

/// `deflate` is specified as zlib-wrapped, but plenty of servers send raw
/// DEFLATE; try the wrapper first and fall back.
fn inflate(body: &[u8], limit: usize) -> io::Result<Vec<u8>> {
    match read_limited(ZlibDecoder::new(body), body.len(), limit) {
        Ok(out) => Ok(out),
        Err(zlib_err) => {
            log::trace!("zlib inflate failed ({zlib_err}), retrying as raw deflate");
            read_limited(DeflateDecoder::new(body), body.len(), limit)
        }
    }
}
