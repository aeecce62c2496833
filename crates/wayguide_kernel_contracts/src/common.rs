#![forbid(unsafe_code)]

use std::fmt;

/// Nanoseconds on a process-local monotonic clock. Never wall-clock time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct MonotonicTimeNs(pub u64);

impl MonotonicTimeNs {
    pub const NS_PER_MS: u64 = 1_000_000;
    pub const NS_PER_SEC: u64 = 1_000_000_000;

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(Self::NS_PER_SEC))
    }

    pub fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(Self::NS_PER_MS))
    }

    pub fn saturating_add_ms(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms.saturating_mul(Self::NS_PER_MS)))
    }

    /// Milliseconds elapsed since `earlier`; zero when `earlier` is in the future.
    pub fn elapsed_ms_since(self, earlier: MonotonicTimeNs) -> u64 {
        self.0.saturating_sub(earlier.0) / Self::NS_PER_MS
    }

    pub fn elapsed_secs_since(self, earlier: MonotonicTimeNs) -> f64 {
        self.0.saturating_sub(earlier.0) as f64 / Self::NS_PER_SEC as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReasonCodeId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
        got: f64,
    },
    NotFinite {
        field: &'static str,
    },
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractViolation::InvalidValue { field, reason } => write!(f, "{field}: {reason}"),
            ContractViolation::InvalidRange {
                field,
                min,
                max,
                got,
            } => write!(f, "{field}: {got} outside [{min}, {max}]"),
            ContractViolation::NotFinite { field } => write!(f, "{field}: must be finite"),
        }
    }
}

impl std::error::Error for ContractViolation {}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

pub(crate) fn validate_token(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if value.is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be non-empty",
        });
    }
    if value.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds max length",
        });
    }
    if value.chars().any(|c| {
        !(c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.')
    }) {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must contain token-safe ASCII only",
        });
    }
    Ok(())
}

pub(crate) fn validate_text(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if value.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must be non-empty",
        });
    }
    if value.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds max length",
        });
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not contain control characters",
        });
    }
    Ok(())
}

pub(crate) fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ContractViolation> {
    if !value.is_finite() {
        return Err(ContractViolation::NotFinite { field });
    }
    if value < 0.0 {
        return Err(ContractViolation::InvalidRange {
            field,
            min: 0.0,
            max: f64::MAX,
            got: value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_common_01_elapsed_never_underflows() {
        let earlier = MonotonicTimeNs::from_secs(10);
        let later = MonotonicTimeNs::from_secs(4);
        assert_eq!(later.elapsed_ms_since(earlier), 0);
        assert_eq!(earlier.elapsed_ms_since(later), 6_000);
        assert!((earlier.elapsed_secs_since(later) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn at_common_02_token_rejects_spaces() {
        assert!(validate_token("t", "abc-1:2", 16).is_ok());
        assert!(validate_token("t", "abc def", 16).is_err());
        assert!(validate_token("t", "", 16).is_err());
    }
}
