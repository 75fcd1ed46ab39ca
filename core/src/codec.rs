//! Shift-JIS transcoding and form encoding for the wire.
//!
//! # Design
//! The service only understands Shift-JIS. Outbound form values are
//! transcoded first and the resulting bytes percent-encoded, so the body is
//! plain ASCII whose escapes denote Shift-JIS bytes. Transcoding never
//! substitutes: a character outside the Shift-JIS repertoire is an
//! `Error::Encoding`.
//!
//! Responses use a line protocol: one line is a success payload, more than
//! one line is an error message.

use std::borrow::Cow;

use encoding_rs::SHIFT_JIS;
use percent_encoding::percent_decode;

use crate::error::Error;

pub fn encode_shift_jis(text: &str) -> Result<Vec<u8>, Error> {
    let (bytes, _, had_errors) = SHIFT_JIS.encode(text);
    if had_errors {
        let mut buf = [0u8; 4];
        let offending = text
            .chars()
            .find(|c| SHIFT_JIS.encode(c.encode_utf8(&mut buf)).2)
            .map(|c| format!(" ({c:?})"))
            .unwrap_or_default();
        return Err(Error::Encoding(format!(
            "text is not representable in Shift-JIS{offending}"
        )));
    }
    Ok(bytes.into_owned())
}

pub fn decode_shift_jis(bytes: &[u8]) -> Result<String, Error> {
    SHIFT_JIS
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(Cow::into_owned)
        .ok_or_else(|| Error::Encoding("malformed Shift-JIS byte sequence".to_string()))
}

/// Decodes with U+FFFD replacement. Used for error bodies, which must never
/// be dropped.
pub fn decode_shift_jis_lossy(bytes: &[u8]) -> String {
    SHIFT_JIS.decode_without_bom_handling(bytes).0.into_owned()
}

/// Serializes ordered form fields as `application/x-www-form-urlencoded`,
/// with every key and value transcoded to Shift-JIS before escaping.
pub fn encode_form<K: AsRef<str>, V: AsRef<str>>(fields: &[(K, V)]) -> Result<Vec<u8>, Error> {
    let mut out = String::new();
    for (key, value) in fields {
        if !out.is_empty() {
            out.push('&');
        }
        out.extend(form_urlencoded::byte_serialize(&encode_shift_jis(key.as_ref())?));
        out.push('=');
        out.extend(form_urlencoded::byte_serialize(&encode_shift_jis(value.as_ref())?));
    }
    Ok(out.into_bytes())
}

/// Parses an urlencoded body whose escapes denote Shift-JIS bytes.
pub fn decode_form(body: &[u8]) -> Result<Vec<(String, String)>, Error> {
    decode_form_pairs(body).collect()
}

/// Decodes each pair independently, so one malformed pair does not hide the
/// others.
pub fn decode_form_pairs(body: &[u8]) -> impl Iterator<Item = Result<(String, String), Error>> + '_ {
    body.split(|b| *b == b'&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = match pair.iter().position(|b| *b == b'=') {
                Some(i) => (&pair[..i], &pair[i + 1..]),
                None => (pair, &[][..]),
            };
            Ok((decode_component(key)?, decode_component(value)?))
        })
}

fn decode_component(raw: &[u8]) -> Result<String, Error> {
    let plus_as_space: Vec<u8> = raw.iter().map(|b| if *b == b'+' { b' ' } else { *b }).collect();
    let bytes: Vec<u8> = percent_decode(&plus_as_space).collect();
    decode_shift_jis(&bytes)
}

/// Interprets a form-request response: HTTP 200 with a single line yields
/// that line; anything else is an `Error::Server` carrying the whole body.
///
/// One trailing line terminator is not counted as a second line.
pub fn read_single_line(status: u16, body: &[u8]) -> Result<String, Error> {
    if status != 200 {
        return Err(Error::Server {
            status,
            body: decode_shift_jis_lossy(body),
        });
    }
    let text = decode_shift_jis(body)?;
    let trimmed = text
        .strip_suffix('\n')
        .map(|t| t.strip_suffix('\r').unwrap_or(t))
        .unwrap_or(text.as_str());
    if trimmed.contains('\n') {
        return Err(Error::Server { status, body: text });
    }
    Ok(trimmed.to_string())
}
