// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Label resolution from raw dataset values to canonical boolean labels
//!
//! `true` always means the condition is present (disease, recurrence, ...).

use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label value exactly as it appears in a record source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawLabel {
    Numeric(f64),
    Token(String),
}

impl fmt::Display for RawLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawLabel::Numeric(v) => write!(f, "{}", v),
            RawLabel::Token(t) => write!(f, "{}", t),
        }
    }
}

/// Total mapping over the two raw values a dataset uses for its label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelMapping {
    /// e.g. 1.0 = positive, 0.0 = negative
    Numeric { positive: f64, negative: f64 },
    /// e.g. "Yes" = positive, "No" = negative (trimmed, case-insensitive)
    Token { positive: String, negative: String },
}

impl LabelMapping {
    /// The usual 1/0 encoding
    pub fn binary() -> Self {
        LabelMapping::Numeric {
            positive: 1.0,
            negative: 0.0,
        }
    }

    pub fn tokens(positive: &str, negative: &str) -> Self {
        LabelMapping::Token {
            positive: positive.to_string(),
            negative: negative.to_string(),
        }
    }

    /// Build the raw representation a loader should hand to `resolve`.
    ///
    /// Text that does not parse under a numeric mapping is kept as a token so
    /// that resolution reports it as unmapped.
    pub fn parse_raw(&self, text: &str) -> RawLabel {
        let trimmed = text.trim();
        match self {
            LabelMapping::Numeric { .. } => trimmed
                .parse::<f64>()
                .map(RawLabel::Numeric)
                .unwrap_or_else(|_| RawLabel::Token(trimmed.to_string())),
            LabelMapping::Token { .. } => RawLabel::Token(trimmed.to_string()),
        }
    }

    /// Map a raw label to its canonical boolean value
    pub fn resolve(&self, raw: &RawLabel) -> Result<bool> {
        let resolved = match (self, raw) {
            (LabelMapping::Numeric { positive, negative }, RawLabel::Numeric(v)) => {
                if v == positive {
                    Some(true)
                } else if v == negative {
                    Some(false)
                } else {
                    None
                }
            }
            (LabelMapping::Token { positive, negative }, raw) => {
                let value = raw.to_string();
                let value = value.trim();
                if value.eq_ignore_ascii_case(positive.trim()) {
                    Some(true)
                } else if value.eq_ignore_ascii_case(negative.trim()) {
                    Some(false)
                } else {
                    None
                }
            }
            (LabelMapping::Numeric { .. }, RawLabel::Token(_)) => None,
        };

        resolved.ok_or_else(|| self.unmapped(raw))
    }

    /// Resolve a whole partition, failing on the first unmapped value
    pub fn resolve_all<'a, I>(&self, raws: I) -> Result<Vec<bool>>
    where
        I: IntoIterator<Item = &'a RawLabel>,
    {
        raws.into_iter().map(|raw| self.resolve(raw)).collect()
    }

    pub fn positive_raw(&self) -> RawLabel {
        match self {
            LabelMapping::Numeric { positive, .. } => RawLabel::Numeric(*positive),
            LabelMapping::Token { positive, .. } => RawLabel::Token(positive.clone()),
        }
    }

    pub fn negative_raw(&self) -> RawLabel {
        match self {
            LabelMapping::Numeric { negative, .. } => RawLabel::Numeric(*negative),
            LabelMapping::Token { negative, .. } => RawLabel::Token(negative.clone()),
        }
    }

    fn unmapped(&self, raw: &RawLabel) -> BenchError {
        BenchError::UnmappedLabel {
            value: raw.to_string(),
            positive: self.positive_raw().to_string(),
            negative: self.negative_raw().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_mapping() {
        let mapping = LabelMapping::tokens("Yes", "No");

        assert!(mapping.resolve(&RawLabel::Token("Yes".to_string())).unwrap());
        assert!(!mapping.resolve(&RawLabel::Token("No".to_string())).unwrap());
        assert!(mapping.resolve(&RawLabel::Token(" yes ".to_string())).unwrap());
    }

    #[test]
    fn test_unknown_token_is_an_error() {
        let mapping = LabelMapping::tokens("Yes", "No");
        let err = mapping
            .resolve(&RawLabel::Token("Maybe".to_string()))
            .unwrap_err();

        match err {
            BenchError::UnmappedLabel { value, .. } => assert_eq!(value, "Maybe"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_numeric_mapping() {
        let mapping = LabelMapping::binary();

        assert!(mapping.resolve(&mapping.parse_raw("1")).unwrap());
        assert!(!mapping.resolve(&mapping.parse_raw("0.0")).unwrap());
        assert!(mapping.resolve(&mapping.parse_raw("2")).is_err());
        assert!(mapping.resolve(&mapping.parse_raw("yes")).is_err());
    }

    #[test]
    fn test_resolve_all_stops_on_unmapped() {
        let mapping = LabelMapping::binary();
        let raws = vec![RawLabel::Numeric(1.0), RawLabel::Numeric(0.0)];
        assert_eq!(mapping.resolve_all(&raws).unwrap(), vec![true, false]);

        let raws = vec![RawLabel::Numeric(1.0), RawLabel::Numeric(0.5)];
        assert!(mapping.resolve_all(&raws).is_err());
    }
}
