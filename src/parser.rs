//! PDF object parser.
//!
//! Combines tokens from the lexer into complete objects. Recursive
//! descent: read a token, dispatch on its type, recurse for arrays and
//! dictionaries. A dictionary followed by the `stream` keyword becomes a
//! stream object whose payload is read by `/Length` when that entry is a
//! usable integer, or by scanning for `endstream` otherwise.
//!
//! The parser is deliberately lenient about truncated input: an array or
//! dictionary cut off at end of file yields the elements seen so far
//! rather than an error, which lets damaged documents still open.

use crate::error::{Error, Result};
use crate::lexer::{Token, token};
use crate::object::{Object, ObjectRef};
use nom::IResult;
use std::collections::HashMap;

/// Decode escape sequences in a literal string.
///
/// Escapes per ISO 32000-1 section 7.3.4.2: `\n` `\r` `\t` `\b` `\f`
/// `\(` `\)` `\\`, octal `\ddd` (1-3 digits), and `\<newline>` line
/// continuation (the escaped newline disappears). A backslash before
/// anything else is kept literally.
///
/// # Examples
///
/// ```
/// # use pdf_smith::parser::decode_literal_string_escapes;
/// let decoded = decode_literal_string_escapes(b"Section \\247 71.01");
/// assert_eq!(decoded, b"Section \xa7 71.01");
/// ```
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            result.push(raw[i]);
            i += 1;
            continue;
        }

        match raw[i + 1] {
            b'n' => {
                result.push(b'\n');
                i += 2;
            },
            b'r' => {
                result.push(b'\r');
                i += 2;
            },
            b't' => {
                result.push(b'\t');
                i += 2;
            },
            b'b' => {
                result.push(0x08);
                i += 2;
            },
            b'f' => {
                result.push(0x0C);
                i += 2;
            },
            b'(' | b')' | b'\\' => {
                result.push(raw[i + 1]);
                i += 2;
            },
            // line continuation: backslash + EOL vanishes
            b'\n' => {
                i += 2;
            },
            b'\r' => {
                i += 2;
                if i < raw.len() && raw[i] == b'\n' {
                    i += 1;
                }
            },
            b'0'..=b'7' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 3 && i + 1 + digits < raw.len() {
                    let d = raw[i + 1 + digits];
                    if !(b'0'..=b'7').contains(&d) {
                        break;
                    }
                    value = value * 8 + (d - b'0') as u32;
                    digits += 1;
                }
                // high bits of overlong octal values are dropped
                result.push((value & 0xFF) as u8);
                i += 1 + digits;
            },
            // unknown escape: the backslash stays, the next byte is
            // handled on its own in the following iteration
            _ => {
                result.push(b'\\');
                i += 1;
            },
        }
    }

    result
}

/// Decode a hex string to bytes.
///
/// Whitespace between digits is ignored; an odd number of digits is
/// padded with a trailing 0, so `<901FA>` decodes as `90 1F A0`.
///
/// # Examples
///
/// ```
/// use pdf_smith::parser::decode_hex;
///
/// assert_eq!(decode_hex(b"48656C6C6F").unwrap(), b"Hello");
/// assert_eq!(decode_hex(b"48 65 6").unwrap(), vec![0x48, 0x65, 0x60]);
/// ```
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(hex_bytes.len() / 2 + 1);
    let mut pending: Option<u8> = None;

    for &c in hex_bytes {
        if c.is_ascii_whitespace() {
            continue;
        }
        let digit = (c as char).to_digit(16).ok_or_else(|| Error::MalformedDocument {
            offset: 0,
            reason: format!("invalid hex digit 0x{:02X} in hex string", c),
        })? as u8;

        match pending.take() {
            Some(high) => result.push(high << 4 | digit),
            None => pending = Some(digit),
        }
    }

    if let Some(high) = pending {
        result.push(high << 4);
    }

    Ok(result)
}

/// Parse a single object from input bytes.
///
/// Handles every object type: primitives, arrays, dictionaries, streams,
/// and indirect references (`10 0 R`, recognized by two-token lookahead
/// after an integer).
///
/// # Examples
///
/// ```
/// use pdf_smith::parser::parse_object;
///
/// let (_, obj) = parse_object(b"[ 1 2 /Name ]").unwrap();
/// assert!(obj.as_array().is_some());
/// ```
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),

        Token::Integer(i) => {
            // An integer may begin a reference: obj_num gen R. Only a
            // non-negative id and a generation that fits u16 qualify;
            // anything else stays a plain integer.
            if i >= 0 && i <= u32::MAX as i64 {
                if let Ok((input2, Token::Integer(gen))) = token(input) {
                    if (0..=u16::MAX as i64).contains(&gen) {
                        if let Ok((input3, Token::R)) = token(input2) {
                            return Ok((
                                input3,
                                Object::Reference(ObjectRef::new(i as u32, gen as u16)),
                            ));
                        }
                    }
                }
            }

            Ok((input, Object::Integer(i)))
        },

        Token::Real(r) => Ok((input, Object::Real(r))),

        Token::LiteralString(bytes) => {
            Ok((input, Object::String(decode_literal_string_escapes(bytes))))
        },

        Token::HexString(hex_bytes) => match decode_hex(hex_bytes) {
            Ok(decoded) => Ok((input, Object::String(decoded))),
            Err(_) => {
                Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Fail)))
            },
        },

        Token::Name(name) => Ok((input, Object::Name(name))),

        Token::ArrayStart => parse_array(input),

        Token::DictStart => {
            let (remaining, dict_obj) = parse_dictionary(input)?;

            // A stream keyword straight after the dictionary makes this a
            // stream object.
            if let Ok((stream_input, Token::StreamStart)) = token(remaining) {
                let dict = match dict_obj {
                    Object::Dictionary(d) => d,
                    _ => {
                        return Err(nom::Err::Error(nom::error::Error::new(
                            input,
                            nom::error::ErrorKind::Tag,
                        )));
                    },
                };

                let (final_input, stream_data) = parse_stream_data(stream_input, &dict)?;

                return Ok((
                    final_input,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::from(stream_data),
                    },
                ));
            }

            Ok((remaining, dict_obj))
        },

        _ => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag))),
    }
}

/// Parse a full indirect object: `N G obj <object> endobj`.
///
/// A missing `endobj` is tolerated with a warning; plenty of generators
/// drop it on the last object before the xref.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], (ObjectRef, Object)> {
    let (rest, id_tok) = token(input)?;
    let (rest, gen_tok) = token(rest)?;
    let (rest, obj_tok) = token(rest)?;

    let (id, gen) = match (id_tok, gen_tok, obj_tok) {
        (Token::Integer(id), Token::Integer(gen), Token::ObjStart)
            if id >= 0 && (0..=u16::MAX as i64).contains(&gen) =>
        {
            (id as u32, gen as u16)
        },
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )));
        },
    };

    let (rest, object) = parse_object(rest)?;

    let rest = match token(rest) {
        Ok((after, Token::ObjEnd)) => after,
        _ => {
            log::warn!("object {} {} has no endobj keyword", id, gen);
            rest
        },
    };

    Ok((rest, (ObjectRef::new(id, gen), object)))
}

/// Read stream payload bytes after the `stream` keyword.
///
/// The keyword must be followed by CRLF or LF; a lone CR or nothing at
/// all is tolerated with a warning. `/Length` drives the read when it is
/// a direct integer that actually lands on `endstream`; otherwise the
/// payload is found by scanning. An indirect `/Length` always takes the
/// scanning path, which keeps the parser free of xref knowledge.
fn parse_stream_data<'a>(
    input: &'a [u8],
    dict: &HashMap<String, Object>,
) -> IResult<&'a [u8], Vec<u8>> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") {
        &input[1..]
    } else if input.starts_with(b"\r") {
        log::warn!("stream keyword followed by CR alone, accepting");
        &input[1..]
    } else {
        log::warn!("no newline after stream keyword, accepting");
        input
    };

    if let Some(length) = dict.get("Length").and_then(|obj| obj.as_integer()) {
        if length >= 0 && (length as usize) <= input.len() {
            let length = length as usize;
            let after = &input[length..];
            // Token-level check also accepts whitespace before endstream
            if let Ok((remaining, Token::StreamEnd)) = token(after) {
                return Ok((remaining, input[..length].to_vec()));
            }
            log::warn!("stream /Length {} does not land on endstream, rescanning", length);
        } else {
            log::warn!("stream /Length {} out of bounds ({} bytes left)", length, input.len());
        }
    }

    // Missing, indirect, or wrong /Length: scan for the endstream keyword
    if let Some(pos) = find_endstream(input) {
        let data = trim_one_trailing_eol(&input[..pos]);
        let (remaining, _) = token(&input[pos..])?;
        return Ok((remaining, data.to_vec()));
    }

    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Eof)))
}

/// Find the byte position of the `endstream` keyword.
fn find_endstream(input: &[u8]) -> Option<usize> {
    let keyword = b"endstream";
    input
        .windows(keyword.len())
        .position(|window| window == keyword)
}

/// Drop one EOL (CRLF, LF, or CR) from the end of scanned stream data.
///
/// The EOL before `endstream` belongs to the file structure, not the
/// payload; a /Length-driven read would not have included it either.
fn trim_one_trailing_eol(data: &[u8]) -> &[u8] {
    if data.ends_with(b"\r\n") {
        &data[..data.len() - 2]
    } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
        &data[..data.len() - 1]
    } else {
        data
    }
}

/// Parse array elements after the `[` token, through the closing `]`.
fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let mut objects = Vec::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((rest, Token::ArrayEnd)) => return Ok((rest, Object::Array(objects))),
            Ok(_) => match parse_object(remaining) {
                Ok((rest, obj)) => {
                    objects.push(obj);
                    remaining = rest;
                },
                Err(e) => {
                    if remaining.is_empty() {
                        // truncated file, keep the elements seen so far
                        return Ok((remaining, Object::Array(objects)));
                    }
                    return Err(e);
                },
            },
            Err(_) if remaining.is_empty() => {
                return Ok((remaining, Object::Array(objects)));
            },
            Err(e) => return Err(e),
        }
    }
}

/// Parse dictionary entries after the `<<` token, through the closing `>>`.
///
/// Keys must be names; a duplicate key keeps the later value, matching
/// the behavior viewers exhibit for malformed producers.
fn parse_dictionary(input: &[u8]) -> IResult<&[u8], Object> {
    let mut dict = HashMap::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((rest, Token::DictEnd)) => return Ok((rest, Object::Dictionary(dict))),
            Ok((rest, Token::Name(key))) => match parse_object(rest) {
                Ok((rest, value)) => {
                    dict.insert(key, value);
                    remaining = rest;
                },
                Err(e) => {
                    if rest.is_empty() {
                        return Ok((rest, Object::Dictionary(dict)));
                    }
                    return Err(e);
                },
            },
            Ok(_) => {
                if remaining.is_empty() {
                    return Ok((remaining, Object::Dictionary(dict)));
                }
                // key that is not a name
                return Err(nom::Err::Error(nom::error::Error::new(
                    remaining,
                    nom::error::ErrorKind::Tag,
                )));
            },
            Err(_) if remaining.is_empty() => {
                return Ok((remaining, Object::Dictionary(dict)));
            },
            Err(e) => return Err(e),
        }
    }
}
