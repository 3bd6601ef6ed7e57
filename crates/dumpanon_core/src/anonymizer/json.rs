// anonymizer/json.rs: per-path rules inside JSON documents stored in a column
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::transforms::{Quoting, Transform};
use crate::classify::{LengthClass, ThresholdPolicy};
use crate::error::TransformError;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    /// `[]`: every element of an array
    Each,
    /// `[n]`
    Index(usize),
}

/// A path such as `contact.email`, `items[].sku` or `[0].name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Keys may hold ASCII alphanumerics and `_`; a leading `.` is ignored.
    pub fn parse(path: &str) -> Result<Self, &'static str> {
        let path = path.strip_prefix('.').unwrap_or(path);
        let mut segments = Vec::new();
        let mut key = String::new();
        let mut chars = path.chars();
        let mut after_bracket = false;
        while let Some(c) = chars.next() {
            match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '_' => {
                    if after_bracket {
                        return Err("expected '.' or '[' after ']'");
                    }
                    key.push(c);
                }
                '.' => {
                    if key.is_empty() && !after_bracket {
                        return Err("empty key in json path");
                    }
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    after_bracket = false;
                }
                '[' => {
                    if !key.is_empty() {
                        segments.push(Segment::Key(std::mem::take(&mut key)));
                    }
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err("unterminated '[' in json path");
                    }
                    segments.push(match inner.as_str() {
                        "" => Segment::Each,
                        digits => Segment::Index(digits.parse().map_err(|_| "invalid array index in json path")?),
                    });
                    after_bracket = true;
                }
                _ => return Err("invalid character in json path"),
            }
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key));
        } else if !after_bracket {
            return Err("empty key in json path");
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

fn visit(
    node: &mut JsonValue,
    path: &[Segment],
    leaf: &mut dyn FnMut(&mut JsonValue) -> Result<(), TransformError>,
) -> Result<(), TransformError> {
    let Some((head, rest)) = path.split_first() else {
        return leaf(node);
    };
    match head {
        Segment::Key(k) => match node.as_object_mut().and_then(|m| m.get_mut(k)) {
            Some(child) => visit(child, rest, leaf),
            None => Ok(()),
        },
        Segment::Each => match node.as_array_mut() {
            Some(items) => items.iter_mut().try_for_each(|item| visit(item, rest, leaf)),
            None => Ok(()),
        },
        Segment::Index(i) => match node.as_array_mut().and_then(|a| a.get_mut(*i)) {
            Some(child) => visit(child, rest, leaf),
            None => Ok(()),
        },
    }
}

/// Applies a transform to the string leaves selected by each path of a JSON
/// value and re-serializes it. Missing paths and non-string leaves are left
/// alone; a transform quoting as `Null` turns the leaf into JSON `null`.
/// Values that are not JSON are an error.
pub struct JsonPaths {
    rules: Vec<(JsonPath, Arc<dyn Transform>)>,
    policy: ThresholdPolicy,
}

impl JsonPaths {
    pub fn new(rules: Vec<(JsonPath, Arc<dyn Transform>)>, policy: ThresholdPolicy) -> Self {
        Self { rules, policy }
    }

    fn replace(&self, transform: &dyn Transform, leaf: &mut JsonValue) -> Result<(), TransformError> {
        let JsonValue::String(s) = leaf else {
            return Ok(());
        };
        if s.is_empty() {
            return Ok(());
        }
        if transform.quoting() == Quoting::Null {
            *leaf = JsonValue::Null;
            return Ok(());
        }
        let input = Value::from(s.as_str());
        let out = transform.apply(&input, self.policy.classify(&input))?;
        *s = String::from_utf8(out.into_bytes()).map_err(|_| TransformError::new("json field replacement is not UTF-8"))?;
        Ok(())
    }
}

impl Transform for JsonPaths {
    fn apply(&self, value: &Value, _class: LengthClass) -> Result<Value, TransformError> {
        let mut doc: JsonValue =
            serde_json::from_slice(value.as_bytes()).map_err(|_| TransformError::new("value is not valid JSON"))?;
        for (path, transform) in &self.rules {
            visit(&mut doc, path.segments(), &mut |leaf: &mut JsonValue| self.replace(transform.as_ref(), leaf))?;
        }
        let out = serde_json::to_vec(&doc).map_err(|e| TransformError::new(e.to_string()))?;
        Ok(Value::new(out))
    }
}
