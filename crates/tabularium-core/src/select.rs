//! Declarative column selection.
//!
//! A [`ColumnFilter`] is a list of qualifiers. A column is selected when it
//! matches any include qualifier and no exclude qualifier. Filters are
//! applied after a table is materialized; the catalog only carries them
//! alongside deferred load references.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wire shape of one column qualifier.
///
/// All fields are optional; an empty qualifier matches nothing. Set
/// `exclude` to subtract matching columns from the selection instead of
/// adding them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorSpec {
    /// Literal column names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exact: Vec<String>,
    /// Column-name prefixes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub starts_with: Vec<String>,
    /// Column-name suffixes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ends_with: Vec<String>,
    /// Regular-expression patterns.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub regex: Vec<String>,
    /// When true, matching columns are removed from the selection.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub exclude: bool,
}

impl SelectorSpec {
    /// Creates a qualifier matching the given literal column names.
    #[must_use]
    pub fn exact<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exact: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Creates a qualifier matching the given column-name prefixes.
    #[must_use]
    pub fn starts_with<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            starts_with: prefixes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Marks this qualifier as an exclusion.
    #[must_use]
    pub const fn excluded(mut self) -> Self {
        self.exclude = true;
        self
    }
}

/// One compiled column qualifier.
#[derive(Debug, Clone)]
pub struct ColumnSelector {
    exact: Vec<String>,
    starts_with: Vec<String>,
    ends_with: Vec<String>,
    patterns: Vec<Regex>,
    exclude: bool,
}

impl ColumnSelector {
    /// Compiles a qualifier from its wire shape.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if any regex pattern fails to compile.
    pub fn from_spec(spec: &SelectorSpec) -> Result<Self> {
        let mut patterns = Vec::with_capacity(spec.regex.len());
        for pattern in &spec.regex {
            let compiled = Regex::new(pattern)
                .map_err(|e| Error::InvalidInput(format!("bad column pattern {pattern:?}: {e}")))?;
            patterns.push(compiled);
        }
        Ok(Self {
            exact: spec.exact.clone(),
            starts_with: spec.starts_with.clone(),
            ends_with: spec.ends_with.clone(),
            patterns,
            exclude: spec.exclude,
        })
    }

    /// Returns true if this qualifier subtracts rather than adds.
    #[must_use]
    pub const fn is_exclude(&self) -> bool {
        self.exclude
    }

    /// Returns true if the column name matches any criterion of this
    /// qualifier.
    #[must_use]
    pub fn matches(&self, column: &str) -> bool {
        self.exact.iter().any(|name| name == column)
            || self.starts_with.iter().any(|p| column.starts_with(p))
            || self.ends_with.iter().any(|s| column.ends_with(s))
            || self.patterns.iter().any(|re| re.is_match(column))
    }
}

/// An ordered list of column qualifiers.
#[derive(Debug, Clone, Default)]
pub struct ColumnFilter {
    selectors: Vec<ColumnSelector>,
}

impl ColumnFilter {
    /// Compiles a filter from a list of qualifier wire shapes.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if any qualifier fails to compile.
    pub fn from_specs(specs: &[SelectorSpec]) -> Result<Self> {
        let selectors = specs
            .iter()
            .map(ColumnSelector::from_spec)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { selectors })
    }

    /// Parses and compiles a filter from a JSON array of qualifier objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not an array of qualifier objects
    /// or any qualifier fails to compile.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let specs: Vec<SelectorSpec> = serde_json::from_value(value.clone())?;
        Self::from_specs(&specs)
    }

    /// Selects columns: any include qualifier matches and no exclude
    /// qualifier matches. Input order is preserved.
    #[must_use]
    pub fn apply(&self, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .filter(|column| {
                let included = self
                    .selectors
                    .iter()
                    .any(|s| !s.is_exclude() && s.matches(column));
                let excluded = self
                    .selectors
                    .iter()
                    .any(|s| s.is_exclude() && s.matches(column));
                included && !excluded
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> Vec<String> {
        ["pba_open", "pba_close", "vol_open", "vol_close", "sentiment"]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_prefix_selection() {
        let filter =
            ColumnFilter::from_specs(&[SelectorSpec::starts_with(["pba_"])]).expect("compile");
        assert_eq!(filter.apply(&columns()), ["pba_open", "pba_close"]);
    }

    #[test]
    fn test_any_qualifier_unions() {
        let filter = ColumnFilter::from_specs(&[
            SelectorSpec::starts_with(["pba_"]),
            SelectorSpec::exact(["sentiment"]),
        ])
        .expect("compile");
        assert_eq!(
            filter.apply(&columns()),
            ["pba_open", "pba_close", "sentiment"]
        );
    }

    #[test]
    fn test_exclude_subtracts() {
        let filter = ColumnFilter::from_specs(&[
            SelectorSpec::starts_with(["pba_", "vol_"]),
            SelectorSpec {
                ends_with: vec!["_close".into()],
                exclude: true,
                ..SelectorSpec::default()
            },
        ])
        .expect("compile");
        assert_eq!(filter.apply(&columns()), ["pba_open", "vol_open"]);
    }

    #[test]
    fn test_regex_qualifier() {
        let filter = ColumnFilter::from_json(&json!([{ "regex": ["^vol_.*"] }])).expect("compile");
        assert_eq!(filter.apply(&columns()), ["vol_open", "vol_close"]);
    }

    #[test]
    fn test_bad_regex_is_rejected() {
        let result = ColumnFilter::from_json(&json!([{ "regex": ["("] }]));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_empty_filter_selects_nothing() {
        let filter = ColumnFilter::default();
        assert!(filter.apply(&columns()).is_empty());
    }
}
