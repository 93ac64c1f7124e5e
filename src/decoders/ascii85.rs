//! ASCII85Decode: five characters in `!`..=`u` encode four bytes, `z` is four
//! zero bytes, `~>` ends the data.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCII base-85 filter.
pub struct Ascii85Decoder;

fn group_value(digits: &[u8]) -> Result<u32> {
    digits.iter().try_fold(0u32, |acc, &d| {
        acc.checked_mul(85)
            .and_then(|v| v.checked_add(u32::from(d)))
            .ok_or_else(|| Error::Decode("ASCII85Decode: group out of range".to_string()))
    })
}

impl StreamDecoder for Ascii85Decoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let body = input.strip_prefix(b"<~").unwrap_or(input);
        let mut out = Vec::with_capacity(body.len() * 4 / 5);
        let mut group = [0u8; 5];
        let mut len = 0;

        for &c in body {
            match c {
                b'~' => break,
                b'z' if len == 0 => out.extend_from_slice(&[0; 4]),
                b'!'..=b'u' => {
                    group[len] = c - b'!';
                    len += 1;
                    if len == 5 {
                        out.extend_from_slice(&group_value(&group)?.to_be_bytes());
                        len = 0;
                    }
                },
                c if crate::lexer::is_whitespace(c) => {},
                other => {
                    return Err(Error::Decode(format!(
                        "ASCII85Decode: unexpected byte 0x{:02X}",
                        other
                    )))
                },
            }
        }

        match len {
            0 => {},
            1 => return Err(Error::Decode("ASCII85Decode: dangling single character".to_string())),
            n => {
                for slot in group.iter_mut().skip(n) {
                    *slot = 84;
                }
                out.extend_from_slice(&group_value(&group)?.to_be_bytes()[..n - 1]);
            },
        }

        Ok(out)
    }

    fn name(&self) -> &str {
        "ASCII85Decode"
    }
}
