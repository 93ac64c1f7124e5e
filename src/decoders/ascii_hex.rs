//! ASCIIHexDecode.

use crate::decoders::StreamDecoder;
use crate::error::Result;

/// Pairs of hex digits, whitespace ignored, terminated by `>`.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let body = match input.iter().position(|&c| c == b'>') {
            Some(end) => &input[..end],
            None => input,
        };
        crate::parser::decode_hex(body)
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}
