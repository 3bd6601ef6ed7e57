// classify.rs: short/long split of values around the digest size
use crate::value::Value;

/// Output size of HMAC-SHA256, the default threshold.
pub const SHA256_DIGEST_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LengthClass {
    Short,
    Long,
}

impl LengthClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Long => "long",
        }
    }
}

/// Values with `len >= threshold` are long, everything else is short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub threshold: usize,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self { threshold: SHA256_DIGEST_SIZE }
    }
}

impl ThresholdPolicy {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn classify(&self, value: &Value) -> LengthClass {
        self.classify_len(value.len())
    }

    pub fn classify_len(&self, len: usize) -> LengthClass {
        if len < self.threshold {
            LengthClass::Short
        } else {
            LengthClass::Long
        }
    }
}
