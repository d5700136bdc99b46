#![forbid(unsafe_code)]

//! Index metadata: row labels, index levels, and monotonicity classification.
//!
//! An index is one or more ordered levels, each backed by a plan field. The
//! label values themselves live in the engine; this crate only describes the
//! levels and classifies realized label sequences so the resolver can choose
//! between range predicates and exact-presence checks.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wb_types::Scalar;

/// A single row-label value. Labels are ordered and hashable, unlike general
/// cell scalars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexLabel {
    Int64(i64),
    Utf8(String),
}

impl From<i64> for IndexLabel {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<&str> for IndexLabel {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for IndexLabel {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

impl IndexLabel {
    #[must_use]
    pub fn to_scalar(&self) -> Scalar {
        match self {
            Self::Int64(v) => Scalar::Int64(*v),
            Self::Utf8(v) => Scalar::Utf8(v.clone()),
        }
    }

    /// Convert an engine cell back into a label. Missing cells and non-label
    /// dtypes have no label form.
    pub fn from_scalar(value: &Scalar) -> Result<Self, IndexError> {
        match value {
            Scalar::Int64(v) => Ok(Self::Int64(*v)),
            Scalar::Utf8(v) => Ok(Self::Utf8(v.clone())),
            other => Err(IndexError::UnsupportedLabelDtype {
                dtype: format!("{:?}", other.dtype()),
            }),
        }
    }

    /// Same-dtype ordering; cross-dtype labels are unordered.
    #[must_use]
    pub fn try_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => Some(a.cmp(b)),
            (Self::Utf8(a), Self::Utf8(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// A full or partial multi-level row label: one entry per leading level.
pub type IndexKey = Vec<IndexLabel>;

/// Compare a (possibly partial) bound against a full key over the bound's
/// depth. `None` when any component pair is cross-dtype.
#[must_use]
pub fn cmp_prefix(bound: &[IndexLabel], key: &[IndexLabel]) -> Option<Ordering> {
    for (b, k) in bound.iter().zip(key.iter()) {
        match b.try_cmp(k)? {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(Ordering::Equal)
}

/// Full lexicographic key comparison (equal-depth keys).
#[must_use]
pub fn cmp_keys(left: &[IndexLabel], right: &[IndexLabel]) -> Option<Ordering> {
    for (a, b) in left.iter().zip(right.iter()) {
        match a.try_cmp(b)? {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    Some(left.len().cmp(&right.len()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monotonicity {
    Increasing,
    Decreasing,
    Neither,
}

/// Classify a realized single-level label sequence. Non-decreasing counts as
/// increasing and non-increasing as decreasing, matching pandas
/// `is_monotonic_increasing` / `is_monotonic_decreasing`.
#[must_use]
pub fn classify(labels: &[IndexLabel]) -> Monotonicity {
    if labels.len() <= 1 {
        return Monotonicity::Increasing;
    }
    let mut non_decreasing = true;
    let mut non_increasing = true;
    for pair in labels.windows(2) {
        match pair[0].try_cmp(&pair[1]) {
            Some(Ordering::Less) => non_increasing = false,
            Some(Ordering::Greater) => non_decreasing = false,
            Some(Ordering::Equal) => {}
            None => return Monotonicity::Neither,
        }
    }
    if non_decreasing {
        Monotonicity::Increasing
    } else if non_increasing {
        Monotonicity::Decreasing
    } else {
        Monotonicity::Neither
    }
}

/// Deepest prefix depth (0..=max_depth) at which the key sequence is
/// lexicographically non-decreasing. A slice bound of depth `d` is admissible
/// only when `sorted_prefix_depth(keys, max_depth) >= d`.
#[must_use]
pub fn sorted_prefix_depth(keys: &[IndexKey], max_depth: usize) -> usize {
    let mut depth = max_depth;
    while depth > 0 {
        let sorted = keys.windows(2).all(|pair| {
            let a = &pair[0][..depth.min(pair[0].len())];
            let b = &pair[1][..depth.min(pair[1].len())];
            matches!(cmp_keys(a, b), Some(Ordering::Less | Ordering::Equal))
        });
        if sorted {
            return depth;
        }
        depth -= 1;
    }
    0
}

/// One index level: a display name and the plan field that stores its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexLevel {
    pub name: Option<String>,
    pub field: String,
}

impl IndexLevel {
    #[must_use]
    pub fn new(name: Option<String>, field: impl Into<String>) -> Self {
        Self {
            name,
            field: field.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("index must have at least one level")]
    Empty,
    #[error("Too many levels: Index has only {nlevels} level{}, not {position}", if *nlevels == 1 { "" } else { "s" })]
    TooManyLevels { nlevels: usize, position: usize },
    #[error("Level {name} not found")]
    LevelNotFound { name: String },
    #[error("Level {name} must be same as name ({actual})")]
    LevelNameMismatch { name: String, actual: String },
    #[error("ambiguous level name {name}: appears {count} times")]
    AmbiguousLevelName { name: String, count: usize },
    #[error("index labels of dtype {dtype} are not supported")]
    UnsupportedLabelDtype { dtype: String },
}

/// Ordered, non-empty index levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    levels: Vec<IndexLevel>,
}

impl IndexMeta {
    pub fn new(levels: Vec<IndexLevel>) -> Result<Self, IndexError> {
        if levels.is_empty() {
            return Err(IndexError::Empty);
        }
        Ok(Self { levels })
    }

    #[must_use]
    pub fn nlevels(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn levels(&self) -> &[IndexLevel] {
        &self.levels
    }

    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.levels.iter().map(|l| l.field.as_str()).collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<Option<&str>> {
        self.levels.iter().map(|l| l.name.as_deref()).collect()
    }

    /// Position lookup with pandas-style 1-based overflow reporting.
    pub fn level_by_position(&self, position: usize) -> Result<usize, IndexError> {
        if position >= self.levels.len() {
            return Err(IndexError::TooManyLevels {
                nlevels: self.levels.len(),
                position: position + 1,
            });
        }
        Ok(position)
    }

    /// Name lookup. Ambiguous names are an error rather than first-match; a
    /// miss on a single-level index reports the actual name, a miss on a
    /// multi-level index reports "not found".
    pub fn level_by_name(&self, name: &str) -> Result<usize, IndexError> {
        let hits: Vec<usize> = self
            .levels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.name.as_deref() == Some(name))
            .map(|(i, _)| i)
            .collect();
        match hits.len() {
            0 => {
                if self.levels.len() == 1 {
                    Err(IndexError::LevelNameMismatch {
                        name: name.to_owned(),
                        actual: self.levels[0].name.clone().unwrap_or_default(),
                    })
                } else {
                    Err(IndexError::LevelNotFound {
                        name: name.to_owned(),
                    })
                }
            }
            1 => Ok(hits[0]),
            n => Err(IndexError::AmbiguousLevelName {
                name: name.to_owned(),
                count: n,
            }),
        }
    }

    /// Distinct level names must be distinguishable for name-based lookup.
    #[must_use]
    pub fn has_ambiguous_names(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.levels
            .iter()
            .filter_map(|l| l.name.as_deref())
            .any(|name| !seen.insert(name))
    }

    /// Keep only the levels at the given positions, in their given order.
    pub fn retain(&self, keep: &[usize]) -> Result<Self, IndexError> {
        let levels = keep.iter().map(|&i| self.levels[i].clone()).collect();
        Self::new(levels)
    }

    /// Drop the first `n` levels (after a partial multi-level match).
    pub fn drop_leading(&self, n: usize) -> Result<Self, IndexError> {
        Self::new(self.levels[n..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        classify, cmp_prefix, sorted_prefix_depth, IndexError, IndexKey, IndexLabel, IndexLevel,
        IndexMeta, Monotonicity,
    };
    use std::cmp::Ordering;

    fn keys(raw: &[&[&str]]) -> Vec<IndexKey> {
        raw.iter()
            .map(|t| t.iter().map(|s| IndexLabel::from(*s)).collect())
            .collect()
    }

    #[test]
    fn classify_non_unique_increasing() {
        let labels: Vec<IndexLabel> = [0, 1, 1, 2, 2, 2, 4, 5, 6]
            .iter()
            .map(|&v| IndexLabel::Int64(v))
            .collect();
        assert_eq!(classify(&labels), Monotonicity::Increasing);
    }

    #[test]
    fn classify_decreasing() {
        let labels: Vec<IndexLabel> = [6, 5, 5, 4, 4, 4, 2, 1, 0]
            .iter()
            .map(|&v| IndexLabel::Int64(v))
            .collect();
        assert_eq!(classify(&labels), Monotonicity::Decreasing);
    }

    #[test]
    fn classify_neither() {
        let labels: Vec<IndexLabel> = [10, 30, 20].iter().map(|&v| IndexLabel::Int64(v)).collect();
        assert_eq!(classify(&labels), Monotonicity::Neither);
    }

    #[test]
    fn classify_mixed_dtypes_is_neither() {
        let labels = vec![IndexLabel::Int64(1), IndexLabel::Utf8("a".into())];
        assert_eq!(classify(&labels), Monotonicity::Neither);
    }

    #[test]
    fn prefix_compare_uses_bound_depth() {
        let bound = vec![IndexLabel::from("y")];
        let key = vec![IndexLabel::from("y"), IndexLabel::from("c")];
        assert_eq!(cmp_prefix(&bound, &key), Some(Ordering::Equal));

        let bound = vec![IndexLabel::from("x"), IndexLabel::from("b")];
        assert_eq!(cmp_prefix(&bound, &key), Some(Ordering::Less));
    }

    #[test]
    fn sorted_prefix_depth_full_lexsort() {
        let tuples = keys(&[&["x", "a"], &["x", "b"], &["y", "c"], &["y", "d"], &["z", "e"]]);
        assert_eq!(sorted_prefix_depth(&tuples, 2), 2);
    }

    #[test]
    fn sorted_prefix_depth_first_level_only() {
        let tuples = keys(&[&["x", "a"], &["x", "b"], &["y", "c"], &["y", "a"], &["z", "e"]]);
        assert_eq!(sorted_prefix_depth(&tuples, 2), 1);
    }

    #[test]
    fn sorted_prefix_depth_reversed_is_zero() {
        let tuples = keys(&[&["z", "e"], &["y", "d"], &["y", "c"], &["x", "b"], &["x", "a"]]);
        assert_eq!(sorted_prefix_depth(&tuples, 2), 0);
    }

    #[test]
    fn level_lookup_by_position_overflow_message() {
        let meta = IndexMeta::new(vec![IndexLevel::new(Some("month".into()), "__index_0__")])
            .expect("meta");
        let err = meta.level_by_position(2).expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Too many levels: Index has only 1 level, not 3"
        );
    }

    #[test]
    fn level_lookup_plural_message() {
        let meta = IndexMeta::new(vec![
            IndexLevel::new(Some("year".into()), "__index_0__"),
            IndexLevel::new(Some("month".into()), "__index_1__"),
        ])
        .expect("meta");
        let err = meta.level_by_position(3).expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Too many levels: Index has only 2 levels, not 4"
        );
    }

    #[test]
    fn name_miss_single_level_reports_actual() {
        let meta = IndexMeta::new(vec![IndexLevel::new(Some("month".into()), "__index_0__")])
            .expect("meta");
        let err = meta.level_by_name("unknown").expect_err("must fail");
        assert_eq!(err.to_string(), "Level unknown must be same as name (month)");
    }

    #[test]
    fn name_miss_multi_level_reports_not_found() {
        let meta = IndexMeta::new(vec![
            IndexLevel::new(Some("year".into()), "__index_0__"),
            IndexLevel::new(Some("month".into()), "__index_1__"),
        ])
        .expect("meta");
        let err = meta.level_by_name("unknown").expect_err("must fail");
        assert_eq!(err.to_string(), "Level unknown not found");
    }

    #[test]
    fn ambiguous_names_rejected_not_first_match() {
        let meta = IndexMeta::new(vec![
            IndexLevel::new(Some("k".into()), "__index_0__"),
            IndexLevel::new(Some("k".into()), "__index_1__"),
        ])
        .expect("meta");
        assert!(meta.has_ambiguous_names());
        let err = meta.level_by_name("k").expect_err("must fail");
        assert!(matches!(err, IndexError::AmbiguousLevelName { .. }));
    }

    #[test]
    fn empty_meta_rejected() {
        assert_eq!(IndexMeta::new(vec![]), Err(IndexError::Empty));
    }

    #[test]
    fn drop_leading_keeps_remainder() {
        let meta = IndexMeta::new(vec![
            IndexLevel::new(None, "__index_0__"),
            IndexLevel::new(Some("b".into()), "__index_1__"),
        ])
        .expect("meta");
        let rest = meta.drop_leading(1).expect("non-empty remainder");
        assert_eq!(rest.nlevels(), 1);
        assert_eq!(rest.names(), vec![Some("b")]);
    }
}
