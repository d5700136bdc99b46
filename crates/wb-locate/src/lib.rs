#![forbid(unsafe_code)]

//! Indexer resolution: classify a bracket key once, then translate it into a
//! plan predicate plus index bookkeeping.
//!
//! Resolution never executes a plan. Callers realize the current row labels up
//! front and hand them over as an [`IndexView`]; everything the resolver emits
//! is an [`Expr`] over the index fields or the hidden sequence field, so the
//! selection stays lazy until the owning frame collects.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wb_index::{
    classify, cmp_prefix, sorted_prefix_depth, IndexError, IndexKey, IndexLabel, IndexLevel,
    IndexMeta, Monotonicity,
};
use wb_plan::{CmpOp, Expr};
use wb_types::Scalar;

// ── keys ────────────────────────────────────────────────────────────────────

/// One bracket component, classified at the API boundary. The same shape is
/// used for both axes; each resolver entry point rejects the kinds its
/// accessor does not accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Key {
    /// A single scalar label.
    Label(IndexLabel),
    /// A full or partial multi-level label.
    Tuple(IndexKey),
    /// A list of labels or tuples.
    List(Vec<IndexKey>),
    /// A label-based range, both endpoints inclusive.
    LabelSlice {
        start: Option<IndexKey>,
        stop: Option<IndexKey>,
        step: Option<i64>,
    },
    /// A boolean predicate over the frame's fields.
    Mask(Expr),
    /// A single ordinal, negative counting from the end.
    Position(i64),
    /// A list of ordinals.
    Positions(Vec<i64>),
    /// A Python-style half-open ordinal range.
    PositionSlice {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
    /// A boolean per row (or per column), length-checked against the axis.
    Bools(Vec<bool>),
    /// The bare-colon selector.
    All,
}

impl Key {
    #[must_use]
    pub fn label(value: impl Into<IndexLabel>) -> Self {
        Self::Label(value.into())
    }

    #[must_use]
    pub fn tuple(parts: IndexKey) -> Self {
        Self::Tuple(parts)
    }

    /// A list of scalar labels.
    #[must_use]
    pub fn labels<T: Into<IndexLabel>>(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(|v| vec![v.into()]).collect())
    }

    #[must_use]
    pub fn label_range(start: impl Into<IndexLabel>, stop: impl Into<IndexLabel>) -> Self {
        Self::LabelSlice {
            start: Some(vec![start.into()]),
            stop: Some(vec![stop.into()]),
            step: None,
        }
    }

    #[must_use]
    pub fn label_from(start: impl Into<IndexLabel>) -> Self {
        Self::LabelSlice {
            start: Some(vec![start.into()]),
            stop: None,
            step: None,
        }
    }

    #[must_use]
    pub fn label_to(stop: impl Into<IndexLabel>) -> Self {
        Self::LabelSlice {
            start: None,
            stop: Some(vec![stop.into()]),
            step: None,
        }
    }

    #[must_use]
    pub fn position_range(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self::PositionSlice { start, stop, step }
    }
}

// ── errors ──────────────────────────────────────────────────────────────────

/// The pandas exception class a [`LocateError`] corresponds to. Callers that
/// mirror pandas surfaces dispatch on this rather than on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// `KeyError`
    Key,
    /// `IndexError`
    Position,
    /// `TypeError`
    Type,
    /// `ValueError`
    Value,
    /// Malformed indexer arity (`SparkPandasIndexingError` in the original).
    Indexing,
    /// `NotImplementedError`
    Unsupported,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocateError {
    #[error("key not found: {key}")]
    KeyNotFound { key: String },
    #[error("Key length ({key_len}) exceeds index depth ({depth})")]
    KeyDepthExceeded { key_len: usize, depth: usize },
    #[error("positional indexer is out of range for axis of length {len}")]
    OutOfRange { len: usize },
    #[error("Only accepts pairs of candidates")]
    PairsOnly,
    #[error("Too many indexers")]
    TooManyIndexers,
    #[error("Duplicated row selection is not currently supported")]
    DuplicatedRows,
    #[error("cannot do slice indexing with these indexers")]
    NonPositionalSlice,
    #[error("cannot perform reduce with flexible type")]
    FlexibleTypeReduce,
    #[error("Location based indexing can only have [integer, integer slice, listlike of integers, boolean array] types")]
    LocationBasedOnly,
    #[error("Boolean index has wrong length: {actual} instead of {expected}")]
    BoolLengthMismatch { actual: usize, expected: usize },
    #[error("shape mismatch: value could not be broadcast to indexing result")]
    ShapeMismatch,
    #[error("Only a dataframe with one column can be assigned")]
    MultiColumnValue,
    #[error("Incompatible indexer with {kind}")]
    IncompatibleIndexer { kind: &'static str },
    #[error("Level should be all int or all string.")]
    MixedLevelTypes,
    #[error("slice step is not supported for label-based indexing")]
    LabelSliceStep,
    #[error("slice step cannot be zero")]
    ZeroStep,
    #[error("{0}")]
    InvalidKey(String),
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl LocateError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::KeyNotFound { .. } | Self::KeyDepthExceeded { .. } => ErrorKind::Key,
            Self::OutOfRange { .. } | Self::BoolLengthMismatch { .. } => ErrorKind::Position,
            Self::PairsOnly | Self::TooManyIndexers => ErrorKind::Indexing,
            Self::DuplicatedRows | Self::LabelSliceStep => ErrorKind::Unsupported,
            Self::NonPositionalSlice | Self::FlexibleTypeReduce | Self::InvalidKey(_) => {
                ErrorKind::Type
            }
            Self::LocationBasedOnly
            | Self::ShapeMismatch
            | Self::MultiColumnValue
            | Self::IncompatibleIndexer { .. }
            | Self::MixedLevelTypes
            | Self::ZeroStep => ErrorKind::Value,
            Self::Index(err) => match err {
                IndexError::TooManyLevels { .. } => ErrorKind::Position,
                IndexError::LevelNotFound { .. } | IndexError::LevelNameMismatch { .. } => {
                    ErrorKind::Key
                }
                _ => ErrorKind::Value,
            },
        }
    }
}

// ── inputs and outputs ──────────────────────────────────────────────────────

/// A realized snapshot of an index: its level metadata plus one full key per
/// row, in the frame's current row order.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexView {
    pub meta: IndexMeta,
    pub keys: Vec<IndexKey>,
}

impl IndexView {
    #[must_use]
    pub fn new(meta: IndexMeta, keys: Vec<IndexKey>) -> Self {
        Self { meta, keys }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// The row half of a resolved indexer. `predicate: None` selects every row;
/// `descending` flips realization order (negative-step slices); `drop_levels`
/// counts leading index levels consumed by a scalar or tuple key.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSelection {
    pub predicate: Option<Expr>,
    pub descending: bool,
    pub drop_levels: usize,
}

impl RowSelection {
    #[must_use]
    pub fn all() -> Self {
        Self {
            predicate: None,
            descending: false,
            drop_levels: 0,
        }
    }

    fn filtered(predicate: Expr, drop_levels: usize) -> Self {
        Self {
            predicate: Some(predicate),
            descending: false,
            drop_levels,
        }
    }
}

/// The column half: ordinals into the frame's column list, in selection
/// order. `reduced` means a single full-label pick that collapses to a
/// series; `drop_levels` counts leading column-label levels consumed by a
/// partial pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColSelection {
    pub picks: Vec<usize>,
    pub drop_levels: usize,
    pub reduced: bool,
}

impl ColSelection {
    fn every(ncols: usize) -> Self {
        Self {
            picks: (0..ncols).collect(),
            drop_levels: 0,
            reduced: false,
        }
    }
}

/// Which surface a bracket expression came from. Series accessors take one
/// component; frame accessors take one or two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Frame,
    Series,
}

/// Split a bracket argument list into a row key and an optional column key.
pub fn split_pair(keys: Vec<Key>, target: Target) -> Result<(Key, Option<Key>), LocateError> {
    let mut parts = keys.into_iter();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(row), None, _) => Ok((row, None)),
        (Some(_), Some(_), None) if target == Target::Series => Err(LocateError::TooManyIndexers),
        (Some(row), Some(col), None) => Ok((row, Some(col))),
        (None, ..) => Err(LocateError::InvalidKey("empty indexer".to_owned())),
        _ => Err(LocateError::PairsOnly),
    }
}

// ── label-based rows ────────────────────────────────────────────────────────

/// Resolve a `loc`-style row key against the realized index.
pub fn resolve_loc_rows(
    view: &IndexView,
    seq_field: &str,
    key: &Key,
) -> Result<RowSelection, LocateError> {
    match key {
        Key::All => Ok(RowSelection::all()),
        Key::Mask(expr) => Ok(RowSelection::filtered(expr.clone(), 0)),
        Key::Bools(mask) => bools_rows(seq_field, mask, view.len()),
        Key::Label(label) => {
            let full = vec![label.clone()];
            let drop = if view.meta.nlevels() == 1 { 0 } else { 1 };
            resolve_exact(view, &full, drop)
        }
        Key::Tuple(tuple) => resolve_exact(view, tuple, tuple.len()),
        Key::List(members) => resolve_label_list(view, members),
        Key::LabelSlice { start, stop, step } => {
            resolve_label_slice(view, seq_field, start.as_deref(), stop.as_deref(), *step)
        }
        Key::Position(_) | Key::Positions(_) | Key::PositionSlice { .. } => Err(
            LocateError::InvalidKey("label-based indexing does not accept positional keys".into()),
        ),
    }
}

/// Scalar and tuple keys are strict: a miss is a key error, and the matched
/// leading levels are consumed from the result's index.
fn resolve_exact(
    view: &IndexView,
    key: &IndexKey,
    drop_levels: usize,
) -> Result<RowSelection, LocateError> {
    let nlevels = view.meta.nlevels();
    if key.len() > nlevels {
        return Err(LocateError::KeyDepthExceeded {
            key_len: key.len(),
            depth: nlevels,
        });
    }
    let present = view
        .keys
        .iter()
        .any(|row| cmp_prefix(key, row) == Some(Ordering::Equal));
    if !present {
        return Err(LocateError::KeyNotFound {
            key: display_key(key),
        });
    }
    Ok(RowSelection::filtered(
        prefix_eq(view.meta.levels(), key),
        drop_levels,
    ))
}

/// List keys filter: members absent from the index select nothing rather
/// than erroring, and the index is kept as-is.
fn resolve_label_list(view: &IndexView, members: &[IndexKey]) -> Result<RowSelection, LocateError> {
    let nlevels = view.meta.nlevels();
    let levels = view.meta.levels();
    for member in members {
        if member.len() > nlevels {
            return Err(LocateError::KeyDepthExceeded {
                key_len: member.len(),
                depth: nlevels,
            });
        }
    }
    if nlevels == 1 && members.iter().all(|m| m.len() == 1) {
        let values: Vec<Scalar> = members.iter().map(|m| m[0].to_scalar()).collect();
        let predicate = Expr::col(levels[0].field.clone()).is_in(values);
        return Ok(RowSelection::filtered(predicate, 0));
    }
    let predicate = members
        .iter()
        .map(|m| prefix_eq(levels, m))
        .reduce(Expr::or)
        .unwrap_or_else(|| Expr::lit(false));
    Ok(RowSelection::filtered(predicate, 0))
}

/// Label slices are inclusive on both ends. Monotonic single-level indexes
/// and lexsorted multi-level prefixes become range predicates; a
/// non-monotonic single-level index falls back to the ordinal block between
/// the first occurrence of `start` and the last occurrence of `stop`, both of
/// which must then be present.
fn resolve_label_slice(
    view: &IndexView,
    seq_field: &str,
    start: Option<&[IndexLabel]>,
    stop: Option<&[IndexLabel]>,
    step: Option<i64>,
) -> Result<RowSelection, LocateError> {
    match step {
        Some(0) => return Err(LocateError::ZeroStep),
        Some(s) if s != 1 => return Err(LocateError::LabelSliceStep),
        _ => {}
    }
    // An empty tuple bound constrains nothing.
    let start = start.filter(|b| !b.is_empty());
    let stop = stop.filter(|b| !b.is_empty());
    if start.is_none() && stop.is_none() {
        return Ok(RowSelection::all());
    }
    let nlevels = view.meta.nlevels();
    let levels = view.meta.levels();
    for bound in [start, stop].into_iter().flatten() {
        if bound.len() > nlevels {
            return Err(LocateError::KeyDepthExceeded {
                key_len: bound.len(),
                depth: nlevels,
            });
        }
    }

    if nlevels == 1 {
        let labels: Vec<IndexLabel> = view.keys.iter().map(|k| k[0].clone()).collect();
        match classify(&labels) {
            Monotonicity::Increasing => {
                let lower = start.map(|b| lex_cmp(levels, b, CmpOp::Ge, CmpOp::Gt));
                let upper = stop.map(|b| lex_cmp(levels, b, CmpOp::Le, CmpOp::Lt));
                Ok(RowSelection::filtered(and_opt(lower, upper), 0))
            }
            Monotonicity::Decreasing => {
                let lower = start.map(|b| lex_cmp(levels, b, CmpOp::Le, CmpOp::Lt));
                let upper = stop.map(|b| lex_cmp(levels, b, CmpOp::Ge, CmpOp::Gt));
                Ok(RowSelection::filtered(and_opt(lower, upper), 0))
            }
            Monotonicity::Neither => ordinal_block(seq_field, &labels, start, stop),
        }
    } else {
        let sorted_depth = sorted_prefix_depth(&view.keys, nlevels);
        for bound in [start, stop].into_iter().flatten() {
            if bound.len() > sorted_depth {
                return Err(LocateError::KeyNotFound {
                    key: display_key(bound),
                });
            }
        }
        let lower = start.map(|b| lex_cmp(levels, b, CmpOp::Ge, CmpOp::Gt));
        let upper = stop.map(|b| lex_cmp(levels, b, CmpOp::Le, CmpOp::Lt));
        Ok(RowSelection::filtered(and_opt(lower, upper), 0))
    }
}

fn ordinal_block(
    seq_field: &str,
    labels: &[IndexLabel],
    start: Option<&[IndexLabel]>,
    stop: Option<&[IndexLabel]>,
) -> Result<RowSelection, LocateError> {
    let first = match start {
        Some(bound) => labels
            .iter()
            .position(|l| *l == bound[0])
            .ok_or_else(|| LocateError::KeyNotFound {
                key: display_key(bound),
            })?,
        None => 0,
    };
    let last = match stop {
        Some(bound) => labels
            .iter()
            .rposition(|l| *l == bound[0])
            .ok_or_else(|| LocateError::KeyNotFound {
                key: display_key(bound),
            })?,
        None => labels.len().saturating_sub(1),
    };
    if labels.is_empty() {
        return Ok(RowSelection::filtered(Expr::lit(false), 0));
    }
    let predicate = Expr::col(seq_field)
        .cmp(CmpOp::Ge, Expr::lit(first as i64))
        .and(Expr::col(seq_field).cmp(CmpOp::Le, Expr::lit(last as i64)));
    Ok(RowSelection::filtered(predicate, 0))
}

// ── position-based rows ─────────────────────────────────────────────────────

/// Resolve an `iloc`-style row key. Ordinals refer to the frame's current row
/// order; the emitted predicates compare against the hidden sequence field.
pub fn resolve_iloc_rows(
    len: usize,
    seq_field: &str,
    key: &Key,
) -> Result<RowSelection, LocateError> {
    match key {
        Key::All => Ok(RowSelection::all()),
        Key::Position(p) => {
            let ord = normalize_position(*p, len)?;
            let predicate = Expr::col(seq_field).cmp(CmpOp::Eq, Expr::lit(ord));
            Ok(RowSelection::filtered(predicate, 0))
        }
        Key::Positions(raw) => {
            let ords = raw
                .iter()
                .map(|&p| normalize_position(p, len))
                .collect::<Result<Vec<i64>, _>>()?;
            let mut seen = BTreeSet::new();
            if !ords.iter().all(|&p| seen.insert(p)) {
                return Err(LocateError::DuplicatedRows);
            }
            Ok(RowSelection::filtered(seq_in(seq_field, &ords), 0))
        }
        Key::PositionSlice { start, stop, step } => {
            let ords = py_slice(*start, *stop, *step, len)?;
            let descending = step.unwrap_or(1) < 0;
            if !descending && ords.len() == len {
                return Ok(RowSelection::all());
            }
            Ok(RowSelection {
                predicate: Some(seq_in(seq_field, &ords)),
                descending,
                drop_levels: 0,
            })
        }
        Key::Bools(mask) => bools_rows(seq_field, mask, len),
        Key::LabelSlice { .. } => Err(LocateError::NonPositionalSlice),
        Key::Label(_) | Key::Tuple(_) | Key::List(_) | Key::Mask(_) => {
            Err(LocateError::LocationBasedOnly)
        }
    }
}

fn bools_rows(seq_field: &str, mask: &[bool], len: usize) -> Result<RowSelection, LocateError> {
    if mask.len() != len {
        return Err(LocateError::BoolLengthMismatch {
            actual: mask.len(),
            expected: len,
        });
    }
    let ords: Vec<i64> = mask
        .iter()
        .enumerate()
        .filter(|(_, &keep)| keep)
        .map(|(i, _)| i as i64)
        .collect();
    Ok(RowSelection::filtered(seq_in(seq_field, &ords), 0))
}

// ── columns ─────────────────────────────────────────────────────────────────

/// Resolve a label-based column key against the ordered column labels.
/// `allow_partial` distinguishes `loc` (a prefix picks the matching block)
/// from `at` (only a full label is accepted).
pub fn resolve_loc_cols(
    columns: &[IndexKey],
    depth: usize,
    key: &Key,
    allow_partial: bool,
) -> Result<ColSelection, LocateError> {
    match key {
        Key::All => Ok(ColSelection::every(columns.len())),
        Key::Label(label) => {
            let full = vec![label.clone()];
            resolve_col_label(columns, depth, &full, allow_partial)
        }
        Key::Tuple(tuple) => resolve_col_label(columns, depth, tuple, allow_partial),
        Key::List(members) => {
            let mut picks = Vec::new();
            for member in members {
                if member.len() > depth {
                    return Err(LocateError::KeyDepthExceeded {
                        key_len: member.len(),
                        depth,
                    });
                }
                let before = picks.len();
                for (i, label) in columns.iter().enumerate() {
                    if cmp_prefix(member, label) == Some(Ordering::Equal) {
                        picks.push(i);
                    }
                }
                if picks.len() == before {
                    return Err(LocateError::KeyNotFound {
                        key: display_key(member),
                    });
                }
            }
            Ok(ColSelection {
                picks,
                drop_levels: 0,
                reduced: false,
            })
        }
        Key::LabelSlice { start, stop, step } => {
            resolve_col_slice(columns, depth, start.as_deref(), stop.as_deref(), *step)
        }
        Key::Mask(_) => Err(LocateError::InvalidKey(
            "boolean masks cannot select columns".into(),
        )),
        Key::Position(_) | Key::Positions(_) | Key::PositionSlice { .. } | Key::Bools(_) => Err(
            LocateError::InvalidKey("label-based indexing does not accept positional keys".into()),
        ),
    }
}

fn resolve_col_label(
    columns: &[IndexKey],
    depth: usize,
    key: &IndexKey,
    allow_partial: bool,
) -> Result<ColSelection, LocateError> {
    if key.len() > depth {
        return Err(LocateError::KeyDepthExceeded {
            key_len: key.len(),
            depth,
        });
    }
    if key.len() < depth && !allow_partial {
        return Err(LocateError::KeyNotFound {
            key: display_key(key),
        });
    }
    let picks: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, label)| cmp_prefix(key, label) == Some(Ordering::Equal))
        .map(|(i, _)| i)
        .collect();
    if picks.is_empty() {
        return Err(LocateError::KeyNotFound {
            key: display_key(key),
        });
    }
    let reduced = key.len() == depth;
    Ok(ColSelection {
        picks,
        drop_levels: if reduced { 0 } else { key.len() },
        reduced,
    })
}

/// Column label slices need the column labels lexsorted at least as deep as
/// the deepest bound, mirroring the row-side rule.
fn resolve_col_slice(
    columns: &[IndexKey],
    depth: usize,
    start: Option<&[IndexLabel]>,
    stop: Option<&[IndexLabel]>,
    step: Option<i64>,
) -> Result<ColSelection, LocateError> {
    match step {
        Some(0) => return Err(LocateError::ZeroStep),
        Some(s) if s != 1 => return Err(LocateError::LabelSliceStep),
        _ => {}
    }
    let start = start.filter(|b| !b.is_empty());
    let stop = stop.filter(|b| !b.is_empty());
    if start.is_none() && stop.is_none() {
        return Ok(ColSelection::every(columns.len()));
    }
    let sorted_depth = sorted_prefix_depth(columns, depth);
    for bound in [start, stop].into_iter().flatten() {
        if bound.len() > depth {
            return Err(LocateError::KeyDepthExceeded {
                key_len: bound.len(),
                depth,
            });
        }
        if bound.len() > sorted_depth {
            return Err(LocateError::KeyNotFound {
                key: display_key(bound),
            });
        }
    }
    let picks: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, label)| {
            let above = start.map_or(true, |b| {
                matches!(cmp_prefix(b, label), Some(Ordering::Less | Ordering::Equal))
            });
            let below = stop.map_or(true, |b| {
                matches!(
                    cmp_prefix(b, label),
                    Some(Ordering::Greater | Ordering::Equal)
                )
            });
            above && below
        })
        .map(|(i, _)| i)
        .collect();
    Ok(ColSelection {
        picks,
        drop_levels: 0,
        reduced: false,
    })
}

/// Resolve a position-based column key. Label-shaped keys are rejected with
/// the message pandas produces for each shape.
pub fn resolve_iloc_cols(ncols: usize, key: &Key) -> Result<ColSelection, LocateError> {
    match key {
        Key::All => Ok(ColSelection::every(ncols)),
        Key::Position(p) => {
            let ord = normalize_position(*p, ncols)?;
            Ok(ColSelection {
                picks: vec![ord as usize],
                drop_levels: 0,
                reduced: true,
            })
        }
        Key::Positions(raw) => {
            let picks = raw
                .iter()
                .map(|&p| normalize_position(p, ncols).map(|i| i as usize))
                .collect::<Result<Vec<usize>, _>>()?;
            Ok(ColSelection {
                picks,
                drop_levels: 0,
                reduced: false,
            })
        }
        Key::PositionSlice { start, stop, step } => {
            let picks = py_slice(*start, *stop, *step, ncols)?
                .into_iter()
                .map(|i| i as usize)
                .collect();
            Ok(ColSelection {
                picks,
                drop_levels: 0,
                reduced: false,
            })
        }
        Key::Bools(mask) => {
            if mask.len() != ncols {
                return Err(LocateError::BoolLengthMismatch {
                    actual: mask.len(),
                    expected: ncols,
                });
            }
            let picks = mask
                .iter()
                .enumerate()
                .filter(|(_, &keep)| keep)
                .map(|(i, _)| i)
                .collect();
            Ok(ColSelection {
                picks,
                drop_levels: 0,
                reduced: false,
            })
        }
        Key::LabelSlice { .. } => Err(LocateError::NonPositionalSlice),
        Key::List(_) => Err(LocateError::FlexibleTypeReduce),
        Key::Label(_) | Key::Tuple(_) | Key::Mask(_) => Err(LocateError::LocationBasedOnly),
    }
}

// ── shared helpers ──────────────────────────────────────────────────────────

fn display_key(key: &[IndexLabel]) -> String {
    if key.len() == 1 {
        return key[0].to_string();
    }
    let mut out = String::from("(");
    for (i, part) in key.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{part}");
    }
    out.push(')');
    out
}

/// Equality over the key's leading levels.
fn prefix_eq(levels: &[IndexLevel], key: &[IndexLabel]) -> Expr {
    levels
        .iter()
        .zip(key.iter())
        .map(|(level, label)| {
            Expr::col(level.field.clone()).cmp(CmpOp::Eq, Expr::lit(label.to_scalar()))
        })
        .reduce(Expr::and)
        .unwrap_or_else(|| Expr::lit(true))
}

/// Lexicographic bound over the key's leading levels: strict comparison on
/// every level but the last, `last_op` on the last.
fn lex_cmp(levels: &[IndexLevel], bound: &[IndexLabel], last_op: CmpOp, strict_op: CmpOp) -> Expr {
    let depth = bound.len();
    let mut alternatives = Vec::with_capacity(depth);
    for i in 0..depth {
        let op = if i + 1 == depth { last_op } else { strict_op };
        let cmp = Expr::col(levels[i].field.clone()).cmp(op, Expr::lit(bound[i].to_scalar()));
        let alt = (0..i)
            .map(|j| {
                Expr::col(levels[j].field.clone()).cmp(CmpOp::Eq, Expr::lit(bound[j].to_scalar()))
            })
            .reduce(Expr::and)
            .map_or_else(|| cmp.clone(), |eqs| eqs.and(cmp.clone()));
        alternatives.push(alt);
    }
    alternatives
        .into_iter()
        .reduce(Expr::or)
        .unwrap_or_else(|| Expr::lit(true))
}

fn and_opt(lower: Option<Expr>, upper: Option<Expr>) -> Expr {
    match (lower, upper) {
        (Some(a), Some(b)) => a.and(b),
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => Expr::lit(true),
    }
}

fn seq_in(seq_field: &str, ords: &[i64]) -> Expr {
    Expr::col(seq_field).is_in(ords.iter().map(|&p| Scalar::Int64(p)).collect())
}

fn normalize_position(p: i64, len: usize) -> Result<i64, LocateError> {
    let n = len as i64;
    let ord = if p < 0 { p + n } else { p };
    if ord < 0 || ord >= n {
        return Err(LocateError::OutOfRange { len });
    }
    Ok(ord)
}

/// Python slice semantics: out-of-range bounds clamp instead of erroring,
/// negative bounds count from the end, negative steps walk backwards.
fn py_slice(
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
    len: usize,
) -> Result<Vec<i64>, LocateError> {
    let n = len as i64;
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(LocateError::ZeroStep);
    }
    let clamp = |v: i64, lo: i64, hi: i64| v.max(lo).min(hi);
    let adjust = |bound: Option<i64>, default: i64| match bound {
        None => default,
        Some(b) => {
            let b = if b < 0 { b + n } else { b };
            if step > 0 {
                clamp(b, 0, n)
            } else {
                clamp(b, -1, n - 1)
            }
        }
    };
    let (def_start, def_stop) = if step > 0 { (0, n) } else { (n - 1, -1) };
    let start = adjust(start, def_start);
    let stop = adjust(stop, def_stop);
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i);
        i += step;
    }
    Ok(out)
}
