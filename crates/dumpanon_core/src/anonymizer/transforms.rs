// anonymizer/transforms.rs: the Transform capability and the non-hash built-ins
use std::sync::Arc;

use memchr::memmem;
use serde::Deserialize;

use crate::classify::{LengthClass, ThresholdPolicy};
use crate::error::TransformError;
use crate::value::Value;

/// How a transform's output is embedded back into the row.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quoting {
    /// Same literal form as the input.
    #[default]
    AsInput,
    Quoted,
    Unquoted,
    Null,
}

/// A column transform. Receives the decoded value and its length class,
/// which is computed once by the dispatcher.
pub trait Transform: Send + Sync {
    fn apply(&self, value: &Value, class: LengthClass) -> Result<Value, TransformError>;

    fn quoting(&self) -> Quoting {
        Quoting::AsInput
    }
}

/// Wraps a closure as a [`Transform`].
pub struct FnTransform<F> {
    f: F,
    quoting: Quoting,
}

impl<F> FnTransform<F>
where
    F: Fn(&Value, LengthClass) -> Result<Value, TransformError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f, quoting: Quoting::AsInput }
    }

    pub fn with_quoting(mut self, quoting: Quoting) -> Self {
        self.quoting = quoting;
        self
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(&Value, LengthClass) -> Result<Value, TransformError> + Send + Sync,
{
    fn apply(&self, value: &Value, class: LengthClass) -> Result<Value, TransformError> {
        (self.f)(value, class)
    }

    fn quoting(&self) -> Quoting {
        self.quoting
    }
}

pub fn transform_fn<F>(f: F) -> Arc<dyn Transform>
where
    F: Fn(&Value, LengthClass) -> Result<Value, TransformError> + Send + Sync + 'static,
{
    Arc::new(FnTransform::new(f))
}

pub struct Fixed {
    value: Value,
    quoting: Quoting,
}

impl Fixed {
    pub fn new(value: impl Into<Value>, quoting: Quoting) -> Self {
        Self { value: value.into(), quoting }
    }
}

impl Transform for Fixed {
    fn apply(&self, _value: &Value, _class: LengthClass) -> Result<Value, TransformError> {
        Ok(self.value.clone())
    }

    fn quoting(&self) -> Quoting {
        self.quoting
    }
}

/// Replaces the value with `NULL`.
pub struct NullOut;

impl Transform for NullOut {
    fn apply(&self, _value: &Value, _class: LengthClass) -> Result<Value, TransformError> {
        Ok(Value::empty())
    }

    fn quoting(&self) -> Quoting {
        Quoting::Null
    }
}

/// Keeps the first `len` characters (bytes, when the value is not UTF-8).
pub struct Substring {
    len: usize,
}

impl Substring {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Transform for Substring {
    fn apply(&self, value: &Value, _class: LengthClass) -> Result<Value, TransformError> {
        let end = match value.as_str() {
            Some(s) => s.char_indices().nth(self.len).map_or(s.len(), |(i, _)| i),
            None => self.len.min(value.len()),
        };
        Ok(Value::from(&value.as_bytes()[..end]))
    }
}

/// Rewrites `marker: payload` lines inside a multi-line value.
///
/// Lines are split on LF. A line containing `marker:` keeps everything before
/// the marker (its indentation) and becomes `marker: replacement`; a trailing
/// CR is kept. Other lines are copied untouched.
pub struct LineField {
    marker: Vec<u8>,
    replacement: Vec<u8>,
    finder: memmem::Finder<'static>,
}

impl LineField {
    pub fn new(marker: impl Into<String>, replacement: impl Into<String>) -> Self {
        let marker = marker.into().into_bytes();
        let mut needle = marker.clone();
        needle.push(b':');
        let finder = memmem::Finder::new(&needle).into_owned();
        Self { marker, replacement: replacement.into().into_bytes(), finder }
    }
}

impl Transform for LineField {
    fn apply(&self, value: &Value, _class: LengthClass) -> Result<Value, TransformError> {
        let mut out = Vec::with_capacity(value.len());
        for (i, line) in value.as_bytes().split(|&b| b == b'\n').enumerate() {
            if i > 0 {
                out.push(b'\n');
            }
            let (body, cr) = match line.strip_suffix(b"\r") {
                Some(body) => (body, true),
                None => (line, false),
            };
            match self.finder.find(body) {
                Some(pos) => {
                    out.extend_from_slice(&body[..pos]);
                    out.extend_from_slice(&self.marker);
                    out.extend_from_slice(b": ");
                    out.extend_from_slice(&self.replacement);
                    if cr {
                        out.push(b'\r');
                    }
                }
                None => out.extend_from_slice(line),
            }
        }
        Ok(Value::new(out))
    }
}

/// Applies an inner transform to each part of a separator-delimited value.
/// Each part is classified on its own length; empty parts stay empty.
pub struct Separated {
    separator: u8,
    inner: Arc<dyn Transform>,
    policy: ThresholdPolicy,
}

impl Separated {
    /// `separator` must be ASCII so splitting never cuts a UTF-8 sequence.
    pub fn new(separator: u8, inner: Arc<dyn Transform>, policy: ThresholdPolicy) -> Self {
        Self { separator, inner, policy }
    }
}

impl Transform for Separated {
    fn apply(&self, value: &Value, _class: LengthClass) -> Result<Value, TransformError> {
        let mut out = Vec::with_capacity(value.len());
        for (i, part) in value.as_bytes().split(|&b| b == self.separator).enumerate() {
            if i > 0 {
                out.push(self.separator);
            }
            if part.is_empty() {
                continue;
            }
            let part = Value::from(part);
            let replaced = self.inner.apply(&part, self.policy.classify(&part))?;
            out.extend_from_slice(replaced.as_bytes());
        }
        Ok(Value::new(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_and_null() {
        let f = Fixed::new("redacted", Quoting::Quoted);
        assert_eq!(f.apply(&Value::from("x"), LengthClass::Short).unwrap(), Value::from("redacted"));
        assert_eq!(f.quoting(), Quoting::Quoted);
        assert_eq!(NullOut.quoting(), Quoting::Null);
    }

    #[test]
    fn test_substring_respects_utf8() {
        let t = Substring::new(3);
        assert_eq!(t.apply(&Value::from("héllo"), LengthClass::Short).unwrap(), Value::from("hél"));
        assert_eq!(t.apply(&Value::from("ab"), LengthClass::Short).unwrap(), Value::from("ab"));
        let bin = Value::from(vec![0xff, 0xfe, 0xfd, 0xfc]);
        assert_eq!(t.apply(&bin, LengthClass::Short).unwrap().as_bytes(), &[0xff, 0xfe, 0xfd]);
    }

    #[test]
    fn test_line_field_preserves_unrelated_lines() {
        let t = LineField::new("s_paypal_email", "hidden@example.com");
        let input = "settings:\n  theme: dark\n  s_paypal_email: original@x.com\n  lang: fr";
        let out = t.apply(&Value::from(input), LengthClass::Long).unwrap();
        assert_eq!(
            out.as_str().unwrap(),
            "settings:\n  theme: dark\n  s_paypal_email: hidden@example.com\n  lang: fr"
        );
        assert_eq!(out.as_str().unwrap().lines().count(), 4);
    }

    #[test]
    fn test_line_field_keeps_crlf_and_trailing_newline() {
        let t = LineField::new("token", "x");
        let out = t.apply(&Value::from("a\r\n\ttoken:secret\r\nb\n"), LengthClass::Short).unwrap();
        assert_eq!(out.as_str().unwrap(), "a\r\n\ttoken: x\r\nb\n");

        let untouched = "no marker here\nnor here";
        let out = t.apply(&Value::from(untouched), LengthClass::Short).unwrap();
        assert_eq!(out.as_str().unwrap(), untouched);
    }

    #[test]
    fn test_separated_applies_per_part() {
        let upper = transform_fn(|v: &Value, class: LengthClass| {
            let tag = if class == LengthClass::Long { "L" } else { "S" };
            Ok(Value::from(format!("{}{}", tag, v.len())))
        });
        let t = Separated::new(b',', upper, ThresholdPolicy::new(3));
        let out = t.apply(&Value::from("ab,,abcd"), LengthClass::Long).unwrap();
        assert_eq!(out.as_str().unwrap(), "S2,,L4");
    }

    #[test]
    fn test_fn_transform_quoting() {
        let t = FnTransform::new(|v: &Value, _: LengthClass| Ok(v.clone())).with_quoting(Quoting::Unquoted);
        assert_eq!(t.quoting(), Quoting::Unquoted);
    }
}
