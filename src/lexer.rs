//! PDF tokenizer.
//!
//! Splits raw PDF bytes into tokens: numbers, literal and hex strings, names,
//! keywords and delimiters. Whitespace and `%` comments between tokens are
//! skipped. Escape sequences inside strings are left alone here and decoded by
//! the parser; `#xx` escapes in names are decoded here.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, value},
    sequence::{delimited, preceded},
    IResult,
};

/// Token types recognized by the lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),
    /// Real number (e.g., 3.14, -.5)
    Real(f64),
    /// Raw literal string content between the outer parentheses
    LiteralString(&'a [u8]),
    /// Raw hex string content between `<` and `>`
    HexString(&'a [u8]),
    /// Name without the leading slash, escapes decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R` in an indirect reference
    R,
}

/// PDF whitespace: NUL, TAB, LF, FF, CR, SPACE.
pub(crate) fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

fn is_delimiter(c: u8) -> bool {
    matches!(c, b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}')
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip any run of whitespace and comments.
pub(crate) fn skip_ws(input: &[u8]) -> &[u8] {
    let mut remaining = input;
    loop {
        let (rest, ws) = take_while::<_, _, nom::error::Error<&[u8]>>(is_whitespace)(remaining)
            .unwrap_or((remaining, &[]));
        remaining = rest;
        match comment(remaining) {
            Ok((rest, _)) => remaining = rest,
            Err(_) if ws.is_empty() => return remaining,
            Err(_) => {},
        }
    }
}

fn number_error(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
}

/// Integers (`42`, `-7`, `+3`) and reals (`3.14`, `.5`, `5.`, `-.002`).
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, sign) = opt(one_of("+-"))(input)?;
    let (rest, int_part) = opt(digit1)(rest)?;
    let (rest, frac_part) = opt(preceded(char('.'), opt(digit1)))(rest)?;

    // Needs digits on at least one side of the point
    if int_part.is_none() && !matches!(frac_part, Some(Some(_))) {
        return Err(number_error(input));
    }

    let negative = sign == Some('-');
    let digits = |bytes: &[u8]| std::str::from_utf8(bytes).map(str::to_owned);

    match frac_part {
        Some(frac) => {
            let int_str = int_part
                .map(digits)
                .transpose()
                .map_err(|_| number_error(input))?
                .unwrap_or_else(|| "0".to_string());
            let frac_str = frac
                .map(digits)
                .transpose()
                .map_err(|_| number_error(input))?
                .unwrap_or_else(|| "0".to_string());
            let magnitude: f64 = format!("{}.{}", int_str, frac_str)
                .parse()
                .map_err(|_| number_error(input))?;
            Ok((rest, Token::Real(if negative { -magnitude } else { magnitude })))
        },
        None => {
            let int_bytes = int_part.ok_or_else(|| number_error(input))?;
            let text = std::str::from_utf8(int_bytes).map_err(|_| number_error(input))?;
            match text.parse::<i64>() {
                Ok(n) => Ok((rest, Token::Integer(if negative { -n } else { n }))),
                // Out-of-range integers degrade to reals
                Err(_) => {
                    let magnitude: f64 = text.parse().map_err(|_| number_error(input))?;
                    Ok((rest, Token::Real(if negative { -magnitude } else { magnitude })))
                },
            }
        },
    }
}

/// Literal string with balanced parentheses; escapes are skipped, not decoded.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0usize;

    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)))
}

fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#xx` escape sequences in a name. Malformed escapes are kept verbatim.
///
/// ```
/// # use pdf_sigcheck::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes("Adobe#20PPKLite"), "Adobe PPKLite");
/// assert_eq!(decode_name_escapes("A#"), "A#");
/// ```
pub fn decode_name_escapes(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'#' && i + 2 < bytes.len() {
            let pair = [bytes[i + 1], bytes[i + 2]];
            let byte = std::str::from_utf8(&pair)
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = byte {
                decoded.push(byte);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(decoded)
        .unwrap_or_else(|err| err.into_bytes().into_iter().map(|b| b as char).collect())
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(
            take_while(|c: u8| !is_whitespace(c) && !is_delimiter(c)),
            |raw: &[u8]| Token::Name(decode_name_escapes(&String::from_utf8_lossy(raw))),
        ),
    )(input)
}

/// Keywords must not run into a following regular character (`nullx` is not `null`).
fn keyword<'a>(
    word: &'static [u8],
    tok: Token<'static>,
) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], Token<'a>> {
    move |input: &'a [u8]| {
        let (rest, _) = tag(word)(input)?;
        if rest
            .first()
            .is_some_and(|&c| !is_whitespace(c) && !is_delimiter(c))
        {
            return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
        }
        Ok((rest, tok.clone()))
    }
}

fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        keyword(b"false", Token::False),
        keyword(b"true", Token::True),
        keyword(b"null", Token::Null),
        keyword(b"endobj", Token::ObjEnd),
        keyword(b"endstream", Token::StreamEnd),
        keyword(b"obj", Token::ObjStart),
        keyword(b"stream", Token::StreamStart),
        keyword(b"R", Token::R),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
    ))(input)
}

/// Parse one token after skipping leading whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let input = skip_ws(input);
    alt((
        parse_keyword,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
    ))(input)
}

/// Read a bare keyword such as `xref` or `trailer` (regular characters only).
pub(crate) fn bare_word(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let input = skip_ws(input);
    take_while1(|c: u8| !is_whitespace(c) && !is_delimiter(c))(input)
}
