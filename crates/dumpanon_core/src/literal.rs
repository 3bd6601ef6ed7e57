// literal.rs: encode/decode single SQL literals as mysqldump writes them
use memchr::memchr2;

use crate::error::MalformedLiteral;
use crate::value::Value;

const NULL_TOKEN: &[u8] = b"NULL";
const BINARY_INTRODUCER: &[u8] = b"_binary";
const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Textual form a literal was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    /// `NULL`
    Null,
    /// `'...'`
    Quoted,
    /// `_binary '...'`
    Binary,
    /// `0x...`
    Hex,
    /// Unquoted token, e.g. a number.
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub kind: LiteralKind,
    pub value: Value,
}

/// Decode one literal. Surrounding ASCII whitespace is ignored.
pub fn decode(literal: &[u8]) -> Result<Decoded, MalformedLiteral> {
    let lit = literal.trim_ascii();
    if lit.is_empty() {
        return Err(MalformedLiteral::Empty);
    }
    if lit.eq_ignore_ascii_case(NULL_TOKEN) {
        return Ok(Decoded { kind: LiteralKind::Null, value: Value::empty() });
    }
    if let Some(rest) = lit.strip_prefix(BINARY_INTRODUCER) {
        let quoted = rest.trim_ascii_start();
        if quoted.first() == Some(&b'\'') {
            let value = unquote(quoted)?;
            return Ok(Decoded { kind: LiteralKind::Binary, value: Value::new(value) });
        }
    }
    match lit {
        [b'\'', ..] => Ok(Decoded { kind: LiteralKind::Quoted, value: Value::new(unquote(lit)?) }),
        [b'0', b'x' | b'X', digits @ ..] if !digits.is_empty() => {
            Ok(Decoded { kind: LiteralKind::Hex, value: Value::new(decode_hex(digits)?) })
        }
        _ if is_unquoted_literal(lit) => Ok(Decoded { kind: LiteralKind::Bare, value: Value::from(lit) }),
        _ => Err(MalformedLiteral::InvalidBareToken),
    }
}

/// Encode a value in the given form.
///
/// `Bare` falls back to `Quoted` when the value would not survive unquoted,
/// and an empty `Hex` value is written as `''`.
pub fn encode(kind: LiteralKind, value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 2);
    encode_into(kind, value.as_bytes(), &mut out);
    out
}

pub fn encode_into(kind: LiteralKind, value: &[u8], out: &mut Vec<u8>) {
    match kind {
        LiteralKind::Null => out.extend_from_slice(NULL_TOKEN),
        LiteralKind::Bare if is_bare_token(value) => out.extend_from_slice(value),
        LiteralKind::Hex if !value.is_empty() => {
            out.reserve(2 + value.len() * 2);
            out.extend_from_slice(b"0x");
            for &b in value {
                out.push(HEX_DIGITS[(b >> 4) as usize]);
                out.push(HEX_DIGITS[(b & 0x0f) as usize]);
            }
        }
        LiteralKind::Binary => {
            out.extend_from_slice(BINARY_INTRODUCER);
            out.push(b' ');
            quote_into(value, out);
        }
        LiteralKind::Quoted | LiteralKind::Bare | LiteralKind::Hex => quote_into(value, out),
    }
}

fn quote_into(value: &[u8], out: &mut Vec<u8>) {
    out.push(b'\'');
    escape_into(value, out);
    out.push(b'\'');
}

/// Escape bytes the way `mysql_real_escape_string` does.
pub fn escape(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    escape_into(value, &mut out);
    out
}

pub fn escape_into(value: &[u8], out: &mut Vec<u8>) {
    out.reserve(value.len());
    for &b in value {
        match b {
            0 => out.extend_from_slice(b"\\0"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\'' => out.extend_from_slice(b"\\'"),
            b'"' => out.extend_from_slice(b"\\\""),
            0x1a => out.extend_from_slice(b"\\Z"),
            _ => out.push(b),
        }
    }
}

/// Reverse [`escape`] on the body of a quoted literal (without its quotes).
/// Also accepts the doubled-quote style `''`.
pub fn unescape(body: &[u8]) -> Result<Vec<u8>, MalformedLiteral> {
    unescape_at(body, 0)
}

fn unescape_at(body: &[u8], base: usize) -> Result<Vec<u8>, MalformedLiteral> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0usize;
    while let Some(pos) = memchr2(b'\\', b'\'', &body[i..]) {
        out.extend_from_slice(&body[i..i + pos]);
        i += pos;
        if body[i] == b'\'' {
            if body.get(i + 1) != Some(&b'\'') {
                return Err(MalformedLiteral::UnescapedQuote { offset: base + i });
            }
            out.push(b'\'');
            i += 2;
            continue;
        }
        let token = *body.get(i + 1).ok_or(MalformedLiteral::TruncatedEscape { offset: base + i })?;
        match token {
            b'0' => out.push(0),
            b'\'' => out.push(b'\''),
            b'"' => out.push(b'"'),
            b'b' => out.push(0x08),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'Z' => out.push(0x1a),
            b'\\' => out.push(b'\\'),
            // LIKE wildcards keep their backslash
            b'%' | b'_' => out.extend_from_slice(&[b'\\', token]),
            _ => return Err(MalformedLiteral::UnknownEscape { token, offset: base + i }),
        }
        i += 2;
    }
    out.extend_from_slice(&body[i..]);
    Ok(out)
}

fn unquote(lit: &[u8]) -> Result<Vec<u8>, MalformedLiteral> {
    if lit.len() < 2 || lit.last() != Some(&b'\'') {
        return Err(MalformedLiteral::Unterminated);
    }
    unescape_at(&lit[1..lit.len() - 1], 1)
}

fn decode_hex(digits: &[u8]) -> Result<Vec<u8>, MalformedLiteral> {
    if digits.len() % 2 != 0 {
        return Err(MalformedLiteral::InvalidHex);
    }
    digits
        .chunks_exact(2)
        .map(|pair| match (hex_val(pair[0]), hex_val(pair[1])) {
            (Some(hi), Some(lo)) => Ok(hi << 4 | lo),
            _ => Err(MalformedLiteral::InvalidHex),
        })
        .collect()
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Unquoted forms a dump may contain: numbers, keywords, and bit literals `b'0101'`.
fn is_unquoted_literal(lit: &[u8]) -> bool {
    match lit {
        [b'b' | b'B', b'\'', bits @ .., b'\''] => bits.iter().all(|&b| b == b'0' || b == b'1'),
        _ => lit.iter().all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'+' | b'-' | b'_')),
    }
}

/// True when `value` decodes back to itself as a bare token.
pub fn is_bare_token(value: &[u8]) -> bool {
    !value.is_empty()
        && !value.eq_ignore_ascii_case(NULL_TOKEN)
        && !matches!(value, [b'0', b'x' | b'X', ..])
        && value.iter().all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'+' | b'-' | b'_'))
}
