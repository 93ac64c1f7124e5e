//! Cross-reference data.
//!
//! Reads classic `xref` tables, cross-reference streams and hybrid files, and
//! follows the `/Prev` chain through every incremental update. Newer sections
//! win over older ones. When the chain cannot be read at all the table is
//! rebuilt by scanning the file for `N G obj` headers.

use crate::error::{Error, Result};
use crate::lexer::{bare_word, skip_ws, token, Token};
use crate::object::{Dict, Object};
use crate::parser::{find_keyword, parse_indirect_object, parse_object};
use std::collections::{HashMap, HashSet};

/// Maximum number of sections followed through `/Prev` and `/XRefStm`.
pub const MAX_XREF_SECTIONS: usize = 100;

/// Where an object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Object number is free
    Free,
    /// Stored directly at a byte offset
    Uncompressed {
        /// Byte offset of `N G obj`
        offset: usize,
        /// Generation number
        generation: u16,
    },
    /// Stored inside an object stream
    Compressed {
        /// Object number of the containing `/Type /ObjStm` stream
        stream: u32,
        /// Index within that stream
        index: u32,
    },
}

/// Object-number to location map plus the newest trailer dictionary.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Option<Dict>,
}

impl CrossRefTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record where `object_number` lives, replacing any earlier entry.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Location of `object_number`, if known.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Trailer dictionary (the stream dictionary for xref streams).
    pub fn trailer(&self) -> Option<&Dict> {
        self.trailer.as_ref()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dict) {
        self.trailer = Some(trailer);
    }

    /// Fold in an older section: entries already present are kept.
    pub fn merge_from(&mut self, older: CrossRefTable) {
        for (number, entry) in older.entries {
            self.entries.entry(number).or_insert(entry);
        }
        if self.trailer.is_none() {
            self.trailer = older.trailer;
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Offset given by the last `startxref` in the final 2 KiB of the file.
pub fn find_xref_offset(data: &[u8]) -> Result<usize> {
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];
    let pos = tail
        .windows(b"startxref".len())
        .rposition(|w| w == b"startxref")
        .ok_or(Error::InvalidXref)?;

    match token(&tail[pos + b"startxref".len()..]) {
        Ok((_, Token::Integer(offset))) => usize::try_from(offset).map_err(|_| Error::InvalidXref),
        _ => Err(Error::InvalidXref),
    }
}

fn offset_of(obj: Option<&Object>) -> Option<usize> {
    obj.and_then(Object::as_integer)
        .and_then(|n| usize::try_from(n).ok())
}

/// Read the section at `start` and everything reachable from it.
pub fn parse_xref_chain(data: &[u8], start: usize) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    let mut pending = vec![start];
    let mut merged: Option<CrossRefTable> = None;

    while let Some(offset) = pending.pop() {
        if !visited.insert(offset) {
            log::warn!("xref chain revisits offset {}, stopping", offset);
            continue;
        }
        if visited.len() > MAX_XREF_SECTIONS {
            return Err(Error::InvalidPdf(format!(
                "more than {} cross-reference sections",
                MAX_XREF_SECTIONS
            )));
        }

        let mut section = parse_xref_section(data, offset)?;
        let trailer = section.trailer().cloned().unwrap_or_default();

        // Hybrid files: entries in the companion stream rank below the table's own
        if let Some(stm_offset) = offset_of(trailer.get("XRefStm")) {
            if visited.insert(stm_offset) {
                match parse_xref_section(data, stm_offset) {
                    Ok(stream_section) => section.merge_from(stream_section),
                    Err(e) => log::warn!("ignoring unreadable /XRefStm at {}: {}", stm_offset, e),
                }
            }
        }

        merged = Some(match merged {
            Some(mut newer) => {
                newer.merge_from(section);
                newer
            },
            None => section,
        });

        if let Some(prev) = offset_of(trailer.get("Prev")) {
            pending.push(prev);
        }
    }

    merged.ok_or(Error::InvalidXref)
}

/// Read one section (a table with its trailer, or one xref stream) at `offset`.
pub fn parse_xref_section(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let input = data.get(offset..).ok_or(Error::InvalidXref)?;
    match bare_word(input) {
        Ok((rest, b"xref")) => parse_table(rest, offset),
        _ => parse_xref_stream(input, offset),
    }
}

fn parse_error(offset: usize, reason: impl Into<String>) -> Error {
    Error::ParseError {
        offset,
        reason: reason.into(),
    }
}

fn next_integer(input: &[u8], offset: usize) -> Result<(&[u8], i64)> {
    match token(input) {
        Ok((rest, Token::Integer(n))) => Ok((rest, n)),
        _ => Err(parse_error(offset, "expected integer in xref table")),
    }
}

fn parse_table(mut input: &[u8], offset: usize) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();

    loop {
        if let Ok((rest, b"trailer")) = bare_word(input) {
            input = rest;
            break;
        }

        let (rest, first) = next_integer(input, offset)?;
        let (rest, count) = next_integer(rest, offset)?;
        let (Ok(first), Ok(count)) = (u32::try_from(first), u32::try_from(count)) else {
            return Err(parse_error(offset, "negative xref subsection header"));
        };
        input = rest;

        for number in first..first.saturating_add(count) {
            let (rest, position) = next_integer(input, offset)?;
            let (rest, generation) = next_integer(rest, offset)?;
            let (rest, kind) =
                bare_word(rest).map_err(|_| parse_error(offset, "missing xref entry type"))?;
            input = rest;

            let entry = match kind {
                b"n" => XRefEntry::Uncompressed {
                    offset: usize::try_from(position)
                        .map_err(|_| parse_error(offset, "negative object offset"))?,
                    generation: u16::try_from(generation).unwrap_or(u16::MAX),
                },
                b"f" => XRefEntry::Free,
                other => {
                    return Err(parse_error(
                        offset,
                        format!("bad xref entry type {:?}", String::from_utf8_lossy(other)),
                    ))
                },
            };
            table.add_entry(number, entry);
        }
    }

    let (_, trailer) =
        parse_object(input).map_err(|_| parse_error(offset, "unreadable trailer dictionary"))?;
    match trailer {
        Object::Dictionary(dict) => table.set_trailer(dict),
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: other.type_name().to_string(),
            })
        },
    }

    log::debug!("xref table at {}: {} entries", offset, table.len());
    Ok(table)
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

fn parse_xref_stream(input: &[u8], offset: usize) -> Result<CrossRefTable> {
    let (_, (_, stream)) = parse_indirect_object(input)
        .map_err(|_| parse_error(offset, "no xref table or xref stream here"))?;
    let dict = match &stream {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };
    if dict.get("Type").and_then(Object::as_name) != Some("XRef") {
        return Err(parse_error(offset, "stream is not /Type /XRef"));
    }

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Object::as_array)
        .map(|w| {
            w.iter()
                .filter_map(|o| o.as_integer().and_then(|n| usize::try_from(n).ok()))
                .collect()
        })
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|&w| w > 8) {
        return Err(parse_error(offset, "invalid /W in xref stream"));
    }
    let (w1, w2, w3) = (widths[0], widths[1], widths[2]);
    let row = w1 + w2 + w3;
    if row == 0 {
        return Err(parse_error(offset, "zero-width xref stream rows"));
    }

    let size = dict.get("Size").and_then(Object::as_integer).unwrap_or(0);
    let index: Vec<i64> = match dict.get("Index").and_then(Object::as_array) {
        Some(items) => items.iter().filter_map(Object::as_integer).collect(),
        None => vec![0, size],
    };

    let body = stream.decode_stream_data()?;
    let mut rows = body.chunks_exact(row);
    let mut table = CrossRefTable::new();

    for pair in index.chunks_exact(2) {
        let (Ok(first), Ok(count)) = (u32::try_from(pair[0]), u32::try_from(pair[1])) else {
            return Err(parse_error(offset, "negative /Index in xref stream"));
        };
        for number in first..first.saturating_add(count) {
            let Some(fields) = rows.next() else {
                return Err(parse_error(offset, "xref stream shorter than /Index"));
            };
            let kind = if w1 == 0 { 1 } else { read_be(&fields[..w1]) };
            let second = read_be(&fields[w1..w1 + w2]);
            let third = read_be(&fields[w1 + w2..]);

            let entry = match kind {
                0 => XRefEntry::Free,
                1 => XRefEntry::Uncompressed {
                    offset: usize::try_from(second)
                        .map_err(|_| parse_error(offset, "object offset out of range"))?,
                    generation: u16::try_from(third).unwrap_or(u16::MAX),
                },
                2 => XRefEntry::Compressed {
                    stream: u32::try_from(second)
                        .map_err(|_| parse_error(offset, "object stream number out of range"))?,
                    index: u32::try_from(third).unwrap_or(u32::MAX),
                },
                // Unknown types are references to the null object
                _ => continue,
            };
            table.add_entry(number, entry);
        }
    }

    log::debug!("xref stream at {}: {} entries", offset, table.len());
    table.set_trailer(dict.clone());
    Ok(table)
}

/// Rebuild a table by scanning for `N G obj` at line starts.
///
/// The trailer is the last `trailer` dictionary in the file, falling back to
/// the last xref stream dictionary.
pub fn reconstruct(data: &[u8]) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();
    let mut xref_stream_dict = None;

    for pos in 0..data.len() {
        let at_line_start = pos == 0 || matches!(data[pos - 1], b'\n' | b'\r');
        if !at_line_start || !data[pos].is_ascii_digit() {
            continue;
        }
        let Ok((_, (id, object))) = parse_indirect_object(&data[pos..]) else {
            continue;
        };
        if let Object::Stream { dict, .. } = &object {
            if dict.get("Type").and_then(Object::as_name) == Some("XRef") {
                xref_stream_dict = Some(dict.clone());
            }
        }
        table.add_entry(
            id.id,
            XRefEntry::Uncompressed {
                offset: pos,
                generation: id.gen,
            },
        );
    }

    if table.is_empty() {
        return Err(Error::InvalidPdf("no objects found while rebuilding xref".to_string()));
    }

    let mut search_end = data.len();
    while let Some(pos) = data[..search_end]
        .windows(b"trailer".len())
        .rposition(|w| w == b"trailer")
    {
        if let Ok((_, Object::Dictionary(dict))) = parse_object(skip_ws(&data[pos + 7..])) {
            table.set_trailer(dict);
            break;
        }
        search_end = pos;
    }
    if table.trailer().is_none() {
        if let Some(dict) = xref_stream_dict {
            table.set_trailer(dict);
        }
    }

    log::warn!("rebuilt xref with {} objects by scanning", table.len());
    Ok(table)
}

/// Offsets just past each `%%EOF` marker (and its end-of-line), in file order.
pub fn revision_ends(data: &[u8]) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut from = 0;

    while let Some(found) = find_keyword(&data[from..], b"%%EOF") {
        let mut end = from + found + b"%%EOF".len();
        if data.get(end) == Some(&b'\r') {
            end += 1;
        }
        if data.get(end) == Some(&b'\n') {
            end += 1;
        }
        ends.push(end);
        from = end;
    }

    ends
}
