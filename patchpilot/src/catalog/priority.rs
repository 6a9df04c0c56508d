//! Criticality classification and apply ordering.
//!
//! The catalog's criticality field is free-form text. Everything that needs to
//! interpret it goes through [`Criticality::classify`] so the vocabulary lives
//! in one place.

use std::fmt;

/// Values (compared case-insensitively) that mark a patch as must-apply-first.
const HIGH_PRIORITY_VOCABULARY: &[&str] = &["security", "true", "critical"];

/// Normalized criticality class of a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Criticality {
    /// Security or critical fix, applied before everything else.
    High,
    /// Anything else, including empty or unknown values.
    Normal,
}

impl Criticality {
    /// Classify a raw catalog criticality string.
    ///
    /// # Example
    ///
    /// ```
    /// use patchpilot::catalog::Criticality;
    ///
    /// assert_eq!(Criticality::classify("Security"), Criticality::High);
    /// assert_eq!(Criticality::classify(" TRUE "), Criticality::High);
    /// assert_eq!(Criticality::classify("low"), Criticality::Normal);
    /// ```
    pub fn classify(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        if HIGH_PRIORITY_VOCABULARY.contains(&normalized.as_str()) {
            Self::High
        } else {
            Self::Normal
        }
    }

    /// Whether this is the high-priority class.
    pub fn is_high(&self) -> bool {
        matches!(self, Self::High)
    }
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "critical"),
            Self::Normal => write!(f, "non-critical"),
        }
    }
}

/// Sort key for apply ordering: high-priority first, then release date.
///
/// Release dates compare lexically, which is exact for zero-padded ISO-like
/// dates. Use with a stable sort so equal keys keep discovery order.
pub fn apply_order_key(critical: &str, release_date: &str) -> (bool, String) {
    (
        !Criticality::classify(critical).is_high(),
        release_date.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_vocabulary() {
        for raw in ["security", "Security", "SECURITY", "true", "True", "critical", "Critical"] {
            assert_eq!(Criticality::classify(raw), Criticality::High, "{}", raw);
        }
        for raw in ["low", "false", "", "Unknown", "recommended", "high"] {
            assert_eq!(Criticality::classify(raw), Criticality::Normal, "{}", raw);
        }
    }

    #[test]
    fn test_order_key_high_first() {
        let critical = apply_order_key("Critical", "2024-01-01");
        let low = apply_order_key("low", "2023-01-01");
        assert!(critical < low);
    }

    #[test]
    fn test_order_key_date_within_class() {
        let older = apply_order_key("low", "2022-05-01");
        let newer = apply_order_key("low", "2023-01-01");
        assert!(older < newer);
    }

    #[test]
    fn test_display() {
        assert_eq!(Criticality::High.to_string(), "critical");
        assert_eq!(Criticality::Normal.to_string(), "non-critical");
    }
}
