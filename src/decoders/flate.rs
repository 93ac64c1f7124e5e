//! FlateDecode (zlib, with a raw deflate fallback).

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use std::io::Read;

/// zlib/deflate filter with a cap on inflated size.
pub struct FlateDecoder {
    limit: usize,
}

impl FlateDecoder {
    /// Decoder that refuses to inflate beyond `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    fn inflate<R: Read>(&self, reader: R) -> (Vec<u8>, std::io::Result<usize>) {
        let mut out = Vec::new();
        let result = reader.take(self.limit as u64 + 1).read_to_end(&mut out);
        (out, result)
    }
}

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let (out, result) = self.inflate(ZlibDecoder::new(input));
        let out = match result {
            Ok(_) => out,
            // Truncated streams are common; keep what inflated cleanly
            Err(e) if !out.is_empty() => {
                log::warn!("FlateDecode recovered {} bytes before error: {}", out.len(), e);
                out
            },
            Err(zlib_err) => {
                log::debug!("zlib header rejected ({}), trying raw deflate", zlib_err);
                let (raw, result) = self.inflate(DeflateDecoder::new(input));
                match result {
                    Ok(_) => raw,
                    Err(_) if !raw.is_empty() => raw,
                    Err(e) => return Err(Error::Decode(format!("FlateDecode: {}", e))),
                }
            },
        };

        if out.len() > self.limit {
            return Err(Error::Decode(format!(
                "FlateDecode output exceeds {} bytes",
                self.limit
            )));
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}
