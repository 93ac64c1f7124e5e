//! Object streams (`/Type /ObjStm`).
//!
//! The decoded stream starts with `/N` pairs of integers (object number and
//! offset relative to `/First`), followed by the objects themselves without
//! `obj`/`endobj` wrappers.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::Object;
use crate::parser::parse_object;
use std::collections::HashMap;

const MAX_OBJECTS_PER_STREAM: i64 = 1_000_000;

/// Decode an object stream and parse every object it holds.
///
/// Objects that fail to parse are skipped with a warning; the rest are still
/// returned.
pub fn parse_object_stream(stream_obj: &Object) -> Result<HashMap<u32, Object>> {
    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };
    if let Some(kind) = dict.get("Type").and_then(Object::as_name) {
        if kind != "ObjStm" {
            return Err(Error::InvalidPdf(format!("expected /Type /ObjStm, got /{}", kind)));
        }
    }

    let count = dict
        .get("N")
        .and_then(Object::as_integer)
        .filter(|n| (0..=MAX_OBJECTS_PER_STREAM).contains(n))
        .ok_or_else(|| Error::InvalidPdf("object stream without a usable /N".to_string()))?;
    let first = dict
        .get("First")
        .and_then(Object::as_integer)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| Error::InvalidPdf("object stream without a usable /First".to_string()))?;

    let data = stream_obj.decode_stream_data()?;
    if data.len() < first {
        return Err(Error::InvalidPdf(format!(
            "object stream is {} bytes but /First is {}",
            data.len(),
            first
        )));
    }

    let mut header = &data[..first];
    let mut slots = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (rest, number) = match token(header) {
            Ok((rest, Token::Integer(n))) => (rest, n),
            _ => break,
        };
        let (rest, offset) = match token(rest) {
            Ok((rest, Token::Integer(n))) => (rest, n),
            _ => break,
        };
        header = rest;
        if let (Ok(number), Ok(offset)) = (u32::try_from(number), usize::try_from(offset)) {
            slots.push((number, offset));
        }
    }
    if slots.len() as i64 != count {
        log::warn!("object stream header lists {} of {} objects", slots.len(), count);
    }

    let body = &data[first..];
    let mut objects = HashMap::with_capacity(slots.len());
    for (number, offset) in slots {
        let Some(input) = body.get(offset..) else {
            log::warn!("object {} offset {} is past the end of its stream", number, offset);
            continue;
        };
        match parse_object(input) {
            Ok((_, object)) => {
                objects.insert(number, object);
            },
            Err(e) => log::warn!("object {} in object stream does not parse: {:?}", number, e),
        }
    }

    Ok(objects)
}
