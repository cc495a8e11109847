//! Tagged values for stage-specific catalog fields.
//!
//! Stage qualifiers become storage-path segments, so their encoding must be
//! deterministic. The shape of a value is declared at construction time via
//! [`FieldValue`]; the derivation rule is chosen by tag, never inferred from
//! a runtime type.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator used when joining multi-element values into one path segment.
///
/// Elements containing the separator are joined verbatim; distinct values
/// can collide in that case. Identical values always encode identically.
pub const SEGMENT_JOIN: &str = "_";

/// A stage-specific field value with an explicit shape tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    /// An ordered sequence; element order is preserved in the encoding.
    Sequence(Vec<String>),
    /// An unordered set; elements are sorted before encoding.
    Set(BTreeSet<String>),
    /// A single opaque string, passed through unchanged.
    Scalar(String),
    /// No value. Renders as the literal segment `none`.
    Absent,
}

impl FieldValue {
    /// Convenience constructor for a sequence value.
    #[must_use]
    pub fn sequence<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Sequence(elements.into_iter().map(Into::into).collect())
    }

    /// Convenience constructor for a set value.
    #[must_use]
    pub fn set<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Set(elements.into_iter().map(Into::into).collect())
    }

    /// Convenience constructor for a scalar value.
    #[must_use]
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    /// Returns the storage-path segment for this value.
    ///
    /// One rule per tag:
    /// - `Sequence` joins elements in given order,
    /// - `Set` joins elements in sorted order,
    /// - `Scalar` passes through,
    /// - `Absent` renders as `none`.
    #[must_use]
    pub fn path_segment(&self) -> String {
        match self {
            Self::Sequence(elements) => elements.join(SEGMENT_JOIN),
            Self::Set(elements) => elements
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(SEGMENT_JOIN),
            Self::Scalar(value) => value.clone(),
            Self::Absent => "none".to_string(),
        }
    }

    /// Returns the canonical text form used for query matching, or `None`
    /// for an absent value.
    ///
    /// The text form equals the path segment, so a query written against a
    /// record's persisted representation matches what the path encodes.
    #[must_use]
    pub fn canonical_text(&self) -> Option<String> {
        match self {
            Self::Absent => None,
            other => Some(other.path_segment()),
        }
    }

    /// Returns true if this value is absent.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path_segment())
    }
}
