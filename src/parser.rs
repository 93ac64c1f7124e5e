//! PDF object parser.
//!
//! Recursive descent over lexer tokens: primitives map straight to [`Object`]
//! variants, `[` and `<<` recurse, and an integer may turn out to be the start
//! of an indirect reference (`12 0 R`).

use crate::error::{Error, Result};
use crate::lexer::{is_whitespace, token, Token};
use crate::object::{Dict, Object, ObjectRef};
use nom::IResult;

fn fail<T>(input: &[u8], kind: nom::error::ErrorKind) -> IResult<&[u8], T> {
    Err(nom::Err::Error(nom::error::Error::new(input, kind)))
}

/// Decode escape sequences in a literal string body.
///
/// Handles the single-character escapes, `\ddd` octal codes (1-3 digits) and
/// backslash line continuations. Unknown escapes keep the backslash.
///
/// ```
/// # use pdf_sigcheck::parser::decode_literal_string_escapes;
/// assert_eq!(decode_literal_string_escapes(b"a\\(b\\)\\101"), b"a(b)A");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 == raw.len() {
            out.push(raw[i]);
            i += 1;
            continue;
        }

        let escaped = raw[i + 1];
        i += 2;
        match escaped {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'(' | b')' | b'\\' => out.push(escaped),
            b'\n' => {},
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut code = u32::from(escaped - b'0');
                for _ in 0..2 {
                    match raw.get(i) {
                        Some(d @ b'0'..=b'7') => {
                            code = code * 8 + u32::from(d - b'0');
                            i += 1;
                        },
                        _ => break,
                    }
                }
                out.push((code & 0xFF) as u8);
            },
            other => {
                out.push(b'\\');
                out.push(other);
            },
        }
    }

    out
}

/// Decode the body of a hex string; whitespace is ignored and an odd trailing
/// digit is padded with `0`.
///
/// ```
/// # use pdf_sigcheck::parser::decode_hex;
/// assert_eq!(decode_hex(b"48 65 6C 6C 6F").unwrap(), b"Hello");
/// assert_eq!(decode_hex(b"A").unwrap(), vec![0xA0]);
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(hex_bytes.len() / 2 + 1);
    let mut high: Option<u8> = None;

    for &c in hex_bytes {
        if is_whitespace(c) {
            continue;
        }
        let nibble = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            _ => return Err(Error::Decode(format!("invalid hex digit 0x{:02X}", c))),
        };
        match high.take() {
            Some(h) => out.push((h << 4) | nibble),
            None => high = Some(nibble),
        }
    }

    if let Some(h) = high {
        out.push(h << 4);
    }

    Ok(out)
}

/// Parse one PDF object.
///
/// ```
/// use pdf_sigcheck::object::Object;
/// use pdf_sigcheck::parser::parse_object;
///
/// let (_, obj) = parse_object(b"<< /ByteRange [0 10 20 5] /V 3 0 R >>").unwrap();
/// let dict = obj.as_dict().unwrap();
/// assert_eq!(dict["ByteRange"].as_array().unwrap().len(), 4);
/// assert!(matches!(dict["V"], Object::Reference(_)));
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (rest, tok) = token(input)?;

    match tok {
        Token::Null => Ok((rest, Object::Null)),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Real(r) => Ok((rest, Object::Real(r))),
        Token::Name(name) => Ok((rest, Object::Name(name))),
        Token::Integer(n) => {
            // `id gen R` is a reference; otherwise a plain integer
            if let Ok((after_gen, Token::Integer(gen))) = token(rest) {
                if let Ok((after_r, Token::R)) = token(after_gen) {
                    if let (Ok(id), Ok(gen)) = (u32::try_from(n), u16::try_from(gen)) {
                        return Ok((after_r, Object::Reference(ObjectRef::new(id, gen))));
                    }
                }
            }
            Ok((rest, Object::Integer(n)))
        },
        Token::LiteralString(raw) => Ok((rest, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(raw) => match decode_hex(raw) {
            Ok(decoded) => Ok((rest, Object::String(decoded))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::HexDigit,
            ))),
        },
        Token::ArrayStart => parse_array(rest),
        Token::DictStart => {
            let (rest, dict) = parse_dictionary(rest)?;
            match token(rest) {
                Ok((body, Token::StreamStart)) => {
                    let (rest, data) = parse_stream_data(body, &dict)?;
                    Ok((
                        rest,
                        Object::Stream {
                            dict,
                            data: bytes::Bytes::from(data),
                        },
                    ))
                },
                _ => Ok((rest, Object::Dictionary(dict))),
            }
        },
        _ => fail(input, nom::error::ErrorKind::Tag),
    }
}

fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    let mut remaining = input;

    loop {
        if let Ok((rest, Token::ArrayEnd)) = token(remaining) {
            return Ok((rest, Object::Array(items)));
        }
        let (rest, item) = parse_object(remaining)?;
        items.push(item);
        remaining = rest;
    }
}

fn parse_dictionary(input: &[u8]) -> IResult<&[u8], Dict> {
    let mut dict = Dict::new();
    let mut remaining = input;

    loop {
        let (rest, tok) = token(remaining)?;
        match tok {
            Token::DictEnd => return Ok((rest, dict)),
            Token::Name(key) => {
                let (rest, value) = parse_object(rest)?;
                dict.insert(key, value);
                remaining = rest;
            },
            _ => return fail(remaining, nom::error::ErrorKind::Tag),
        }
    }
}

/// Read stream bytes after the `stream` keyword.
///
/// A direct `/Length` is trusted when `endstream` follows it; otherwise the
/// data runs up to the next `endstream`, minus the end-of-line before it.
fn parse_stream_data<'a>(input: &'a [u8], dict: &Dict) -> IResult<&'a [u8], Vec<u8>> {
    let body = if let Some(rest) = input.strip_prefix(b"\r\n") {
        rest
    } else if let Some(rest) = input.strip_prefix(b"\n").or_else(|| input.strip_prefix(b"\r")) {
        rest
    } else {
        log::warn!("Stream keyword not followed by an end-of-line marker");
        input
    };

    let declared = dict
        .get("Length")
        .and_then(Object::as_integer)
        .and_then(|n| usize::try_from(n).ok())
        .filter(|&n| n <= body.len());

    if let Some(length) = declared {
        if let Ok((rest, Token::StreamEnd)) = token(&body[length..]) {
            return Ok((rest, body[..length].to_vec()));
        }
        log::debug!("Stream /Length {} does not end at endstream, scanning instead", length);
    }

    let Some(pos) = find_keyword(body, b"endstream") else {
        return fail(input, nom::error::ErrorKind::Eof);
    };
    let mut end = pos;
    if end > 0 && body[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && body[end - 1] == b'\r' {
        end -= 1;
    }
    Ok((&body[pos + b"endstream".len()..], body[..end].to_vec()))
}

pub(crate) fn find_keyword(haystack: &[u8], keyword: &[u8]) -> Option<usize> {
    haystack
        .windows(keyword.len())
        .position(|window| window == keyword)
}

/// Parse an indirect object definition: `id gen obj <object> endobj`.
///
/// A missing `endobj` is tolerated.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], (ObjectRef, Object)> {
    let (rest, id) = match token(input)? {
        (rest, Token::Integer(id)) => (rest, id),
        _ => return fail(input, nom::error::ErrorKind::Digit),
    };
    let (rest, gen) = match token(rest)? {
        (rest, Token::Integer(gen)) => (rest, gen),
        _ => return fail(input, nom::error::ErrorKind::Digit),
    };
    let rest = match token(rest)? {
        (rest, Token::ObjStart) => rest,
        _ => return fail(input, nom::error::ErrorKind::Tag),
    };
    let (Ok(id), Ok(gen)) = (u32::try_from(id), u16::try_from(gen)) else {
        return fail(input, nom::error::ErrorKind::Digit);
    };

    let (rest, object) = parse_object(rest)?;
    let rest = match token(rest) {
        Ok((after, Token::ObjEnd)) => after,
        _ => rest,
    };

    Ok((rest, (ObjectRef::new(id, gen), object)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Object {
        parse_object(input).expect("parse failed").1
    }

    #[test]
    fn test_primitives() {
        assert_eq!(parse(b"null"), Object::Null);
        assert_eq!(parse(b"true"), Object::Boolean(true));
        assert_eq!(parse(b"-17"), Object::Integer(-17));
        assert_eq!(parse(b"1.5"), Object::Real(1.5));
        assert_eq!(parse(b"/Sig"), Object::Name("Sig".to_string()));
    }

    #[test]
    fn test_reference_versus_integers() {
        assert_eq!(parse(b"12 0 R"), Object::Reference(ObjectRef::new(12, 0)));

        let arr = parse(b"[0 1024 2048 512]");
        assert_eq!(arr.as_array().unwrap().len(), 4);

        let mixed = parse(b"[1 2 3 0 R 4]");
        assert_eq!(
            mixed.as_array().unwrap(),
            &vec![
                Object::Integer(1),
                Object::Integer(2),
                Object::Reference(ObjectRef::new(3, 0)),
                Object::Integer(4),
            ]
        );
    }

    #[test]
    fn test_literal_string_escapes() {
        assert_eq!(parse(b"(line\\nbreak)"), Object::String(b"line\nbreak".to_vec()));
        assert_eq!(parse(b"(\\0533)"), Object::String(b"+3".to_vec()));
        assert_eq!(parse(b"(a\\\nb)"), Object::String(b"ab".to_vec()));
        assert_eq!(parse(b"(\\q)"), Object::String(b"\\q".to_vec()));
    }

    #[test]
    fn test_hex_string() {
        assert_eq!(parse(b"<3082 0001>"), Object::String(vec![0x30, 0x82, 0x00, 0x01]));
        assert_eq!(parse(b"<>"), Object::String(vec![]));
    }

    #[test]
    fn test_hex_string_with_zero_padding() {
        let obj = parse(b"<30030201000000000000>");
        assert_eq!(obj.as_string().unwrap().len(), 10);
    }

    #[test]
    fn test_nested_dictionary() {
        let obj = parse(b"<< /Type /Sig /Prop_Build << /App << /Name /Test >> >> /ByteRange [0 1 2 3] >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict["Type"].as_name(), Some("Sig"));
        let app = dict["Prop_Build"].as_dict().unwrap()["App"].as_dict().unwrap();
        assert_eq!(app["Name"].as_name(), Some("Test"));
    }

    #[test]
    fn test_dictionary_with_non_name_key_fails() {
        assert!(parse_object(b"<< 1 2 >>").is_err());
    }

    #[test]
    fn test_unclosed_array_fails() {
        assert!(parse_object(b"[1 2 3").is_err());
    }

    #[test]
    fn test_stream_with_direct_length() {
        let (rest, obj) = parse_object(b"<< /Length 5 >>\nstream\nHello\nendstream\nendobj").unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"Hello"),
            other => panic!("expected stream, got {:?}", other),
        }
        assert_eq!(token(rest).unwrap().1, Token::ObjEnd);
    }

    #[test]
    fn test_stream_with_indirect_length_scans_for_endstream() {
        let (_, obj) = parse_object(b"<< /Length 9 0 R >>\r\nstream\r\nabc def\r\nendstream").unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"abc def"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_with_wrong_length_recovers() {
        let (_, obj) = parse_object(b"<< /Length 2 >>\nstream\nHello\nendstream").unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"Hello"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_indirect_object() {
        let (_, (id, obj)) = parse_indirect_object(b"7 0 obj\n<< /FT /Sig >>\nendobj\n").unwrap();
        assert_eq!(id, ObjectRef::new(7, 0));
        assert_eq!(obj.as_dict().unwrap()["FT"].as_name(), Some("Sig"));
    }

    #[test]
    fn test_indirect_object_requires_obj_keyword() {
        assert!(parse_indirect_object(b"7 0 << >>").is_err());
    }

    #[test]
    fn test_decode_hex_rejects_garbage() {
        assert!(decode_hex(b"4G").is_err());
    }
}
