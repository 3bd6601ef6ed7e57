// anonymizer/hashing.rs: HMAC-SHA256 pseudonyms with a short/long strategy
use std::ops::RangeInclusive;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::transforms::Transform;
use crate::classify::{LengthClass, ThresholdPolicy, SHA256_DIGEST_SIZE};
use crate::error::TransformError;
use crate::value::Value;

type HmacSha256 = Hmac<Sha256>;

/// Keyed byte stream: block `i` is HMAC-SHA256(secret, i_be32 || value).
#[derive(Clone)]
pub struct KeyedDigest {
    secret: Arc<[u8]>,
}

impl KeyedDigest {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self { secret: Arc::from(secret.as_ref()) }
    }

    pub fn stream(&self, value: &[u8], n: usize) -> Result<Vec<u8>, TransformError> {
        let mut out = Vec::with_capacity(n);
        let mut block: u32 = 0;
        while out.len() < n {
            let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
                .map_err(|_| TransformError::new("invalid HMAC key"))?;
            mac.update(&block.to_be_bytes());
            mac.update(value);
            let digest = mac.finalize().into_bytes();
            let take = (n - out.len()).min(digest.len());
            out.extend_from_slice(&digest[..take]);
            block += 1;
        }
        Ok(out)
    }
}

fn pick(b: u8, range: RangeInclusive<u8>) -> u8 {
    let span = range.end() - range.start() + 1;
    range.start() + b % span
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashKind {
    /// `a..z`
    Text,
    /// `1..9`
    Int,
    /// `a..z` local part, fixed domain.
    Email { domain: String },
}

/// Hash-based pseudonymizer.
///
/// Long values are replaced by a fixed-width digest of `width` characters.
/// The width never exceeds the threshold, so a digest is never longer than
/// the long value it replaces. Short values keep their length and character
/// classes (letters stay letters, digits stay digits, punctuation is kept) so
/// they do not grow or look like digests. Integers only have their digits
/// replaced.
pub struct HashTransform {
    digest: KeyedDigest,
    kind: HashKind,
    width: usize,
}

impl HashTransform {
    /// `len` is capped at the digest size and at the policy threshold;
    /// `None` means as wide as those caps allow.
    pub fn new(secret: impl AsRef<[u8]>, kind: HashKind, len: Option<usize>, policy: ThresholdPolicy) -> Self {
        let width = len.unwrap_or(SHA256_DIGEST_SIZE).min(SHA256_DIGEST_SIZE).min(policy.threshold);
        Self { digest: KeyedDigest::new(secret), kind, width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    fn readable(&self, value: &[u8], range: RangeInclusive<u8>) -> Result<Vec<u8>, TransformError> {
        let stream = self.digest.stream(value, self.width)?;
        Ok(stream.into_iter().map(|b| pick(b, range.clone())).collect())
    }

    /// `numeric` keeps letters (exponents, hex markers) and forces a
    /// non-zero leading digit.
    fn substitute(&self, value: &[u8], numeric: bool) -> Result<Vec<u8>, TransformError> {
        let stream = self.digest.stream(value, value.len())?;
        let mut seen_digit = false;
        let out = value
            .iter()
            .zip(stream)
            .map(|(&c, k)| match c {
                b'a'..=b'z' if !numeric => pick(k, b'a'..=b'z'),
                b'A'..=b'Z' if !numeric => pick(k, b'A'..=b'Z'),
                b'0'..=b'9' => {
                    let lead = numeric && !seen_digit;
                    seen_digit = true;
                    if lead { pick(k, b'1'..=b'9') } else { pick(k, b'0'..=b'9') }
                }
                _ => c,
            })
            .collect();
        Ok(out)
    }
}

impl Transform for HashTransform {
    fn apply(&self, value: &Value, class: LengthClass) -> Result<Value, TransformError> {
        let raw = value.as_bytes();
        let out = match (&self.kind, class) {
            (HashKind::Text, LengthClass::Long) => self.readable(raw, b'a'..=b'z')?,
            (HashKind::Text, LengthClass::Short) => self.substitute(raw, false)?,
            (HashKind::Int, LengthClass::Long) => self.readable(raw, b'1'..=b'9')?,
            (HashKind::Int, LengthClass::Short) => self.substitute(raw, true)?,
            (HashKind::Email { domain }, class) => {
                let mut local = match class {
                    LengthClass::Long => self.readable(raw, b'a'..=b'z')?,
                    LengthClass::Short => {
                        let end = raw.iter().rposition(|&b| b == b'@').unwrap_or(raw.len());
                        self.substitute(&raw[..end], false)?
                    }
                };
                local.push(b'@');
                local.extend_from_slice(domain.as_bytes());
                local
            }
        };
        Ok(Value::new(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_deterministic_and_extends_past_one_block() {
        let d = KeyedDigest::new("lapin");
        let a = d.stream(b"hello", 80).unwrap();
        assert_eq!(a.len(), 80);
        assert_eq!(a, d.stream(b"hello", 80).unwrap());
        assert_eq!(&a[..32], &d.stream(b"hello", 32).unwrap()[..]);
        assert_ne!(a, KeyedDigest::new("other").stream(b"hello", 80).unwrap());
    }

    #[test]
    fn test_long_text_hash_is_fixed_width() {
        let t = HashTransform::new("lapin", HashKind::Text, None, ThresholdPolicy::default());
        let out = t.apply(&Value::from("A".repeat(33)), LengthClass::Long).unwrap();
        assert_eq!(out.len(), SHA256_DIGEST_SIZE);
        assert!(out.as_bytes().iter().all(|b| b.is_ascii_lowercase()));

        let short = HashTransform::new("lapin", HashKind::Int, Some(5), ThresholdPolicy::default());
        let out = short.apply(&Value::from("1".repeat(40)), LengthClass::Long).unwrap();
        assert_eq!(out.len(), 5);
        assert!(out.as_bytes().iter().all(|b| (b'1'..=b'9').contains(b)));

        assert_eq!(HashTransform::new("k", HashKind::Text, Some(100), ThresholdPolicy::default()).width(), 32);
    }

    #[test]
    fn test_short_values_keep_shape() {
        let t = HashTransform::new("lapin", HashKind::Text, None, ThresholdPolicy::default());
        let out = t.apply(&Value::from("Jean-Luc 42"), LengthClass::Short).unwrap();
        let out = out.as_str().unwrap();
        assert_eq!(out.len(), 11);
        assert_eq!(&out[4..5], "-");
        assert_eq!(&out[8..9], " ");
        assert!(out[..1].chars().all(|c| c.is_ascii_uppercase()));
        assert!(out[9..].chars().all(|c| c.is_ascii_digit()));

        let n = HashTransform::new("lapin", HashKind::Int, None, ThresholdPolicy::default());
        let out = n.apply(&Value::from("0012"), LengthClass::Short).unwrap();
        assert_eq!(out.len(), 4);
        assert_ne!(out.as_bytes()[0], b'0');
    }

    #[test]
    fn test_email_hash() {
        let t = HashTransform::new("lapin", HashKind::Email { domain: "example.com".into() }, Some(10), ThresholdPolicy::default());
        let short = t.apply(&Value::from("bob@corp.io"), LengthClass::Short).unwrap();
        let short = short.as_str().unwrap();
        assert!(short.ends_with("@example.com"));
        assert_eq!(short.len(), 3 + "@example.com".len());

        let long = t.apply(&Value::from("a.very.long.address@somewhere.example"), LengthClass::Long).unwrap();
        assert_eq!(long.len(), 10 + "@example.com".len());
    }

    #[test]
    fn test_digest_never_wider_than_threshold() {
        let policy = ThresholdPolicy::new(16);
        let t = HashTransform::new("lapin", HashKind::Text, None, policy);
        assert_eq!(t.width(), 16);
        let input = Value::from("x".repeat(20));
        let out = t.apply(&input, policy.classify(&input)).unwrap();
        assert_eq!(out.len(), 16);

        let boundary = Value::from("y".repeat(16));
        assert_eq!(t.apply(&boundary, policy.classify(&boundary)).unwrap().len(), 16);
    }

    #[test]
    fn test_short_int_keeps_non_digits() {
        let t = HashTransform::new("lapin", HashKind::Int, None, ThresholdPolicy::default());
        let out = t.apply(&Value::from("-1.5e+3"), LengthClass::Short).unwrap();
        let out = out.as_str().unwrap();
        assert_eq!(out.len(), 7);
        for (i, keep) in [(0, '-'), (2, '.'), (4, 'e'), (5, '+')] {
            assert_eq!(out.as_bytes()[i] as char, keep, "byte {} of {}", i, out);
        }
        assert!((b'1'..=b'9').contains(&out.as_bytes()[1]));
        assert!(out.as_bytes()[3].is_ascii_digit() && out.as_bytes()[6].is_ascii_digit());
        assert_eq!(t.apply(&Value::from("0xFF"), LengthClass::Short).unwrap().as_bytes()[1..], *b"xFF");
    }
}
