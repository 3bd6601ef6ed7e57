// tokenizer.rs: split VALUES tuples into literal spans
use std::ops::Range;

use memchr::{memchr, memchr2, memmem};

use crate::error::MalformedRow;

const VALUES_KEYWORD: &[u8] = b"VALUES";

/// A tuple split into the byte ranges of its literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleSpans {
    /// Range of each literal, whitespace trimmed.
    pub literals: Vec<Range<usize>>,
    /// One past the closing parenthesis.
    pub end: usize,
}

/// The VALUES list of an INSERT/REPLACE statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesList {
    /// Everything before the first tuple, including ` VALUES `.
    pub prefix_end: usize,
    /// Range of each `( ... )` tuple, parentheses included.
    pub tuples: Vec<Range<usize>>,
}

/// Split a single tuple `(a,'b',NULL)`. Ranges are relative to `row`.
/// Only whitespace may follow the closing parenthesis.
pub fn split_tuple(row: &[u8]) -> Result<Vec<Range<usize>>, MalformedRow> {
    let start = skip_ws(row, 0);
    let spans = scan_tuple(row, start)?;
    if skip_ws(row, spans.end) != row.len() {
        return Err(MalformedRow::at(spans.end, "trailing bytes after tuple"));
    }
    Ok(spans.literals)
}

/// Scan the tuple opening at `pos`.
pub fn scan_tuple(bytes: &[u8], pos: usize) -> Result<TupleSpans, MalformedRow> {
    if bytes.get(pos) != Some(&b'(') {
        return Err(MalformedRow::at(pos, "expected '('"));
    }
    let mut literals: Vec<Range<usize>> = Vec::with_capacity(8);
    let mut i = skip_ws(bytes, pos + 1);
    if bytes.get(i) == Some(&b')') {
        return Ok(TupleSpans { literals, end: i + 1 });
    }
    loop {
        let lit_end = scan_literal(bytes, i)?;
        literals.push(i..trim_end(bytes, i, lit_end));
        i = skip_ws(bytes, lit_end);
        match bytes.get(i) {
            Some(b',') => i = skip_ws(bytes, i + 1),
            Some(b')') => return Ok(TupleSpans { literals, end: i + 1 }),
            Some(_) => return Err(MalformedRow::at(i, "expected ',' or ')'")),
            None => return Err(MalformedRow::at(i, "unterminated tuple")),
        }
    }
}

/// End of the literal starting at `pos` (exclusive, may include trailing whitespace
/// for unquoted tokens).
fn scan_literal(bytes: &[u8], pos: usize) -> Result<usize, MalformedRow> {
    let n = bytes.len();
    let mut i = pos;
    if bytes[pos..].starts_with(b"_binary") {
        let q = skip_ws(bytes, pos + 7);
        if bytes.get(q) == Some(&b'\'') {
            i = q;
        }
    }
    if bytes.get(i) == Some(&b'\'') {
        return scan_quoted(bytes, i);
    }
    match memchr2(b',', b')', &bytes[i..]) {
        Some(off) => Ok(i + off),
        None => Ok(n),
    }
}

/// End of the quoted string opening at `pos`, one past its closing quote.
fn scan_quoted(bytes: &[u8], pos: usize) -> Result<usize, MalformedRow> {
    let n = bytes.len();
    let mut i = pos + 1;
    while let Some(off) = memchr2(b'\\', b'\'', &bytes[i..]) {
        i += off;
        if bytes[i] == b'\\' {
            // the escaped byte is skipped whatever it is, decode validates it
            i += 2;
            if i > n {
                break;
            }
        } else if bytes.get(i + 1) == Some(&b'\'') {
            i += 2;
        } else {
            return Ok(i + 1);
        }
    }
    Err(MalformedRow::at(pos, "unterminated string"))
}

/// Locate the VALUES list of an INSERT/REPLACE line. `None` for any other line.
/// An INSERT/REPLACE line without a `VALUES (` list is malformed. Bytes after the
/// last tuple (`;`, newline) are left to the caller.
pub fn split_values(line: &[u8]) -> Result<Option<ValuesList>, MalformedRow> {
    if !is_insert_statement(line) {
        return Ok(None);
    }
    let prefix_end = find_values_keyword(line).ok_or(MalformedRow::at(0, "missing VALUES list"))?;
    let mut tuples = Vec::new();
    let mut i = skip_ws(line, prefix_end);
    loop {
        let spans = scan_tuple(line, i)?;
        tuples.push(i..spans.end);
        i = skip_ws(line, spans.end);
        if line.get(i) == Some(&b',') {
            i = skip_ws(line, i + 1);
        } else {
            break;
        }
    }
    Ok(Some(ValuesList { prefix_end, tuples }))
}

/// End of the first `VALUES` keyword (upper or lower case) that follows
/// whitespace or `)` and is followed, after optional whitespace, by `(`.
fn find_values_keyword(line: &[u8]) -> Option<usize> {
    [VALUES_KEYWORD, b"values".as_slice()].iter().find_map(|keyword| {
        memmem::find_iter(line, keyword).find_map(|pos| {
            let before = pos.checked_sub(1).map(|p| line[p]);
            let end = pos + keyword.len();
            let bounded = matches!(before, Some(b) if b.is_ascii_whitespace() || b == b')');
            (bounded && line.get(skip_ws(line, end)) == Some(&b'(')).then_some(end)
        })
    })
}

/// True for lines starting (after whitespace) with `INSERT` or `REPLACE`, in any case.
pub fn is_insert_statement(line: &[u8]) -> bool {
    let (word, _) = next_word(line, skip_ws(line, 0));
    word.eq_ignore_ascii_case(b"INSERT") || word.eq_ignore_ascii_case(b"REPLACE")
}

/// Table name of an `INSERT`/`REPLACE` line, backquoted or bare.
/// For `db.table` the table part is returned.
pub fn statement_table(line: &[u8]) -> Option<&str> {
    if !is_insert_statement(line) {
        return None;
    }
    let (_, mut i) = next_word(line, skip_ws(line, 0));
    loop {
        i = skip_ws(line, i);
        let (word, end) = next_word(line, i);
        if word.eq_ignore_ascii_case(b"INTO") {
            i = end;
            break;
        }
        if !MODIFIERS.iter().any(|m| word.eq_ignore_ascii_case(m)) {
            // INTO is optional, the table name starts here
            break;
        }
        i = end;
    }
    let (mut name, mut i) = identifier(line, skip_ws(line, i))?;
    while line.get(i) == Some(&b'.') {
        (name, i) = identifier(line, i + 1)?;
    }
    std::str::from_utf8(name).ok()
}

const MODIFIERS: [&[u8]; 4] = [b"LOW_PRIORITY", b"DELAYED", b"HIGH_PRIORITY", b"IGNORE"];

/// Word of `[A-Za-z_]` starting at `i`, and its end.
fn next_word(bytes: &[u8], i: usize) -> (&[u8], usize) {
    let i = i.min(bytes.len());
    let len = bytes[i..].iter().take_while(|b| b.is_ascii_alphabetic() || **b == b'_').count();
    (&bytes[i..i + len], i + len)
}

/// Backquoted or bare identifier at `i`, and the position after it.
fn identifier(bytes: &[u8], i: usize) -> Option<(&[u8], usize)> {
    if bytes.get(i) == Some(&b'`') {
        let len = memchr(b'`', &bytes[i + 1..])?;
        return Some((&bytes[i + 1..i + 1 + len], i + len + 2));
    }
    let len = bytes[i..].iter().take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$')).count();
    (len > 0).then(|| (&bytes[i..i + len], i + len))
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn trim_end(bytes: &[u8], start: usize, mut end: usize) -> usize {
    while end > start && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    end
}
