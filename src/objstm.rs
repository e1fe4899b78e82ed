//! Object stream extraction (PDF 1.5+).
//!
//! An object stream (`/Type /ObjStm`) packs many small non-stream objects
//! into one compressed stream. The decoded payload starts with `/N` pairs
//! of integers (object number, byte offset relative to `/First`), followed
//! by the member objects themselves:
//!
//! ```text
//! << /Type /ObjStm /N 3 /First 14 /Filter /FlateDecode >>
//! stream
//! 10 0 11 6 12 13
//! 42 /Name << /K 1 >>
//! endstream
//! ```
//!
//! Members always have generation 0. When the document is encrypted the
//! container stream is decrypted once as a whole; member objects are never
//! individually encrypted.

use crate::error::{Error, Result};
use crate::lexer::{self, Token};
use crate::object::Object;
use crate::parser::parse_object;
use std::collections::HashMap;

/// Largest member count accepted from /N.
const MAX_MEMBERS: i64 = 1_000_000;

/// Largest /First offset accepted.
const MAX_FIRST: i64 = 10_000_000;

/// Extract every member object from an unencrypted object stream.
pub fn parse_object_stream(stream_obj: &Object) -> Result<HashMap<u32, Object>> {
    parse_object_stream_with_decryption(stream_obj, None, 0, 0)
}

/// Extract every member object, decrypting the container first if a
/// decryption closure is given.
///
/// `obj_num` and `gen_num` identify the object stream itself for key
/// derivation. Members that fail to parse are skipped with a warning so
/// one corrupt entry does not take down the rest of the stream.
pub fn parse_object_stream_with_decryption(
    stream_obj: &Object,
    decryption_fn: Option<&dyn Fn(&[u8]) -> Result<Vec<u8>>>,
    obj_num: u32,
    gen_num: u32,
) -> Result<HashMap<u32, Object>> {
    let dict = match stream_obj {
        Object::Stream { dict, .. } => dict,
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            });
        },
    };

    if let Some(type_name) = dict.get("Type").and_then(|t| t.as_name()) {
        if type_name != "ObjStm" {
            return Err(Error::MalformedDocument {
                offset: 0,
                reason: format!("expected /Type /ObjStm, found /{}", type_name),
            });
        }
    }

    let n = dict
        .get("N")
        .and_then(|o| o.as_integer())
        .ok_or_else(|| Error::MalformedDocument {
            offset: 0,
            reason: "object stream missing /N".to_string(),
        })?;
    let first = dict
        .get("First")
        .and_then(|o| o.as_integer())
        .ok_or_else(|| Error::MalformedDocument {
            offset: 0,
            reason: "object stream missing /First".to_string(),
        })?;

    if !(0..=MAX_MEMBERS).contains(&n) {
        return Err(Error::MalformedDocument {
            offset: 0,
            reason: format!("object stream /N {} out of range", n),
        });
    }
    if !(0..=MAX_FIRST).contains(&first) {
        return Err(Error::MalformedDocument {
            offset: 0,
            reason: format!("object stream /First {} out of range", first),
        });
    }

    let n = n as usize;
    let first = first as usize;

    let decoded = stream_obj.decode_stream_data_with_decryption(decryption_fn, obj_num, gen_num)?;

    if decoded.len() < first {
        return Err(Error::MalformedDocument {
            offset: 0,
            reason: format!(
                "object stream payload is {} bytes but /First is {}",
                decoded.len(),
                first
            ),
        });
    }

    let index = parse_member_index(&decoded[..first], n)?;
    let members_data = &decoded[first..];

    let mut members = HashMap::with_capacity(n);
    for (member_num, offset) in index {
        if offset >= members_data.len() {
            log::warn!(
                "object {} offset {} lies beyond the {} member bytes, skipping",
                member_num,
                offset,
                members_data.len()
            );
            continue;
        }

        match parse_object(&members_data[offset..]) {
            Ok((_, obj)) => {
                members.insert(member_num, obj);
            },
            Err(e) => {
                log::warn!("object {} in stream does not parse, skipping: {:?}", member_num, e);
            },
        }
    }

    Ok(members)
}

/// Parse the index section: `/N` whitespace-separated integer pairs.
fn parse_member_index(data: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut input = data;

    for i in 0..count {
        let (rest, member_num) = next_integer(input).ok_or_else(|| Error::MalformedDocument {
            offset: 0,
            reason: format!("object stream index truncated at pair {} of {}", i, count),
        })?;
        let (rest, offset) = next_integer(rest).ok_or_else(|| Error::MalformedDocument {
            offset: 0,
            reason: format!("object stream index missing offset for pair {}", i),
        })?;

        if member_num < 0 || member_num > u32::MAX as i64 || offset < 0 {
            return Err(Error::MalformedDocument {
                offset: 0,
                reason: format!("object stream index pair {} {} is invalid", member_num, offset),
            });
        }

        pairs.push((member_num as u32, offset as usize));
        input = rest;
    }

    Ok(pairs)
}

/// Lex one integer token, skipping surrounding whitespace.
fn next_integer(input: &[u8]) -> Option<(&[u8], i64)> {
    match lexer::token(input) {
        Ok((rest, Token::Integer(value))) => Some((rest, value)),
        _ => None,
    }
}
