//! `/ByteRange` handling for PDF signatures.
//!
//! The ByteRange is an array of four integers:
//! `[offset1, length1, offset2, length2]`
//!
//! Where:
//! - `offset1` = 0 (start of file)
//! - `length1` = byte offset where the signature value begins
//! - `offset2` = byte offset where the signature value ends
//! - `length2` = bytes signed after the signature value
//!
//! The gap between the two ranges is the hex-encoded `/Contents` value,
//! delimited by `<` and `>`.

use crate::error::{Error, Result};

/// How much of the file a signature's byte range spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Coverage {
    /// Signed range reaches the end of the file
    EntireFile,
    /// Signed range ends at a revision boundary; later updates follow
    EntireRevision,
    /// Signed range ends somewhere else
    Partial,
}

impl Coverage {
    /// Modification level token used in the status summary.
    pub fn modification_token(&self) -> &'static str {
        match self {
            Coverage::EntireFile => "UNTOUCHED",
            Coverage::EntireRevision => "EXTENDED",
            Coverage::Partial => "PARTIAL",
        }
    }
}

/// A validated `/ByteRange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Start of the first range (always 0)
    pub start1: usize,
    /// Length of the first range
    pub len1: usize,
    /// Start of the second range
    pub start2: usize,
    /// Length of the second range
    pub len2: usize,
}

impl ByteRange {
    /// Validate raw `/ByteRange` values against a file of `file_len` bytes.
    pub fn parse(values: &[i64], file_len: usize) -> Result<Self> {
        let [o1, l1, o2, l2] = match values {
            [a, b, c, d] => [*a, *b, *c, *d],
            _ => {
                return Err(Error::InvalidPdf(format!(
                    "ByteRange must have 4 entries, got {}",
                    values.len()
                )))
            },
        };

        let as_usize = |v: i64| {
            usize::try_from(v)
                .map_err(|_| Error::InvalidPdf(format!("ByteRange has negative entry {}", v)))
        };
        let start1 = as_usize(o1)?;
        let len1 = as_usize(l1)?;
        let start2 = as_usize(o2)?;
        let len2 = as_usize(l2)?;

        if start1 != 0 {
            return Err(Error::InvalidPdf(format!("ByteRange must start at 0, got {}", start1)));
        }
        if len1 > start2 {
            return Err(Error::InvalidPdf(format!(
                "ByteRange first range ({}) overlaps with second range start ({})",
                len1, start2
            )));
        }
        let end = start2
            .checked_add(len2)
            .ok_or_else(|| Error::InvalidPdf("ByteRange overflows".to_string()))?;
        if end > file_len {
            return Err(Error::InvalidPdf(format!(
                "ByteRange ends at {} but the file is {} bytes",
                end, file_len
            )));
        }

        Ok(Self {
            start1,
            len1,
            start2,
            len2,
        })
    }

    /// Offset just past the last signed byte.
    pub fn end(&self) -> usize {
        self.start2 + self.len2
    }

    /// The gap must be exactly one hex string: `<` hex digits `>`.
    pub fn check_contents_gap(&self, data: &[u8]) -> Result<()> {
        let gap = data
            .get(self.len1..self.start2)
            .ok_or_else(|| Error::InvalidPdf("ByteRange gap is outside the file".to_string()))?;
        let well_formed = gap.len() >= 2
            && gap[0] == b'<'
            && gap[gap.len() - 1] == b'>'
            && gap[1..gap.len() - 1].iter().all(u8::is_ascii_hexdigit);
        if !well_formed {
            return Err(Error::InvalidPdf(format!(
                "ByteRange gap {}..{} does not hold exactly the /Contents hex string",
                self.len1, self.start2
            )));
        }
        Ok(())
    }

    /// Concatenation of both signed ranges.
    pub fn extract_signed_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        let first = data.get(self.start1..self.start1 + self.len1);
        let second = data.get(self.start2..self.end());
        match (first, second) {
            (Some(a), Some(b)) => {
                let mut signed = Vec::with_capacity(a.len() + b.len());
                signed.extend_from_slice(a);
                signed.extend_from_slice(b);
                Ok(signed)
            },
            _ => Err(Error::InvalidPdf(format!(
                "ByteRange exceeds file size {}",
                data.len()
            ))),
        }
    }

    /// Classify how much of the file is signed.
    ///
    /// `revision_ends` are the offsets just past each `%%EOF` marker.
    pub fn coverage(&self, file_len: usize, revision_ends: &[usize]) -> Coverage {
        let end = self.end();
        if end == file_len {
            Coverage::EntireFile
        } else if revision_ends.contains(&end) {
            Coverage::EntireRevision
        } else {
            Coverage::Partial
        }
    }
}
