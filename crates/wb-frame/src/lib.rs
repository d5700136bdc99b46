#![forbid(unsafe_code)]

//! DataFrame and Series handles over a shared lazy frame.
//!
//! A handle owns an `Rc<RefCell<InternalFrame>>`. The internal frame is a
//! value: an immutable plan, index metadata, and an ordered column list.
//! Mutation never edits a plan node; it builds a new plan and swaps it into
//! the shared cell, so every handle anchored on the same cell observes the
//! update. A series extracted from a frame shares the frame's cell, which is
//! what lets `s.loc[mask] = v` write through to the frame it came from.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wb_index::{IndexError, IndexKey, IndexLabel, IndexLevel, IndexMeta};
use wb_locate::{
    resolve_iloc_cols, resolve_iloc_rows, resolve_loc_cols, resolve_loc_rows, split_pair,
    ColSelection, ErrorKind, IndexView, Key, LocateError, RowSelection, Target,
};
use wb_plan::{BinOp, CmpOp, Column, Expr, Plan, PlanError, Table};
use wb_types::{Scalar, TypeError};

/// Hidden field preserving insertion order across plan rebuilds.
const ORDER_FIELD: &str = "__natural_order__";
/// Hidden field carrying the current ordinal of each row, attached on demand.
const SEQ_FIELD: &str = "__sequence__";
/// Scratch ordinal used when a selection re-numbers its output.
const REORDER_FIELD: &str = "__reorder__";

// ── errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("key not found: {key}")]
    ColumnNotFound { key: String },
    #[error("Cannot combine the series or dataframe because it comes from a different dataframe")]
    DifferentAnchor,
    #[error("Use {usage}")]
    AccessorUsage { usage: &'static str },
    #[error("At based indexing on a single index can only have a single value")]
    ScalarRowExpected,
    #[error("At based indexing on multi-index can only have tuple values")]
    TupleRowExpected,
    #[error("iAt based indexing can only have integer indexers")]
    IntegerExpected,
    #[error("Cannot reset_index inplace on a Series to create a DataFrame")]
    InplaceSeriesReset,
    #[error("cannot insert {name}, already exists")]
    DuplicateColumn { name: String },
    #[error("Length of values ({values}) does not match length of index ({index})")]
    LengthMismatch { values: usize, index: usize },
    #[error("column labels must all have the same number of levels")]
    RaggedColumnLabels,
    #[error("column {name} does not resolve to a single series")]
    AmbiguousColumn { name: String },
    #[error("selection produced no columns")]
    EmptySelection,
    #[error("selection yielded a series where a frame was expected")]
    ExpectedFrame,
    #[error("selection yielded a frame where a series was expected")]
    ExpectedSeries,
}

impl FrameError {
    /// The pandas exception class this error corresponds to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Locate(err) => err.kind(),
            Self::Index(err) => LocateError::Index(err.clone()).kind(),
            Self::ColumnNotFound { .. } => ErrorKind::Key,
            Self::AccessorUsage { .. }
            | Self::InplaceSeriesReset
            | Self::ExpectedFrame
            | Self::ExpectedSeries => ErrorKind::Type,
            _ => ErrorKind::Value,
        }
    }
}

// ── building blocks ─────────────────────────────────────────────────────────

/// One visible column: its (possibly multi-level) label and the plan field
/// that stores its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub label: IndexKey,
    pub field: String,
}

/// An index level reference for `reset_index`: either a 0-based position or
/// a level name. Mixing the two in one call is rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelRef {
    Position(i64),
    Name(String),
}

/// The right-hand side of an indexed assignment.
#[derive(Debug, Clone)]
pub enum AssignValue {
    Scalar(Scalar),
    Series(Series),
    Frame(DataFrame),
}

impl From<Scalar> for AssignValue {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<i64> for AssignValue {
    fn from(value: i64) -> Self {
        Self::Scalar(Scalar::Int64(value))
    }
}

impl From<f64> for AssignValue {
    fn from(value: f64) -> Self {
        Self::Scalar(Scalar::Float64(value))
    }
}

impl From<&str> for AssignValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Scalar::Utf8(value.to_owned()))
    }
}

/// What a scalar accessor hands back: one cell when the key named exactly one
/// row, the matching cells when the index held duplicates or the key was a
/// partial tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum AtValue {
    Scalar(Scalar),
    Values(Vec<Scalar>),
}

/// A selection result that may or may not have collapsed to a single column.
#[derive(Debug, Clone)]
pub enum Indexed {
    Frame(DataFrame),
    Series(Series),
}

impl Indexed {
    pub fn into_frame(self) -> Result<DataFrame, FrameError> {
        match self {
            Self::Frame(frame) => Ok(frame),
            Self::Series(_) => Err(FrameError::ExpectedFrame),
        }
    }

    pub fn into_series(self) -> Result<Series, FrameError> {
        match self {
            Self::Series(series) => Ok(series),
            Self::Frame(_) => Err(FrameError::ExpectedSeries),
        }
    }
}

// ── internal frame ──────────────────────────────────────────────────────────

/// The shared state behind every handle: a lazy plan plus the metadata that
/// maps index levels and column labels onto plan fields.
#[derive(Debug, Clone)]
struct InternalFrame {
    plan: Plan,
    index: IndexMeta,
    columns: Vec<ColumnMeta>,
    column_depth: usize,
}

fn fresh_field(used: &BTreeSet<String>, stem: &str) -> String {
    let mut i = 0usize;
    loop {
        let candidate = format!("__{stem}_{i}__");
        if !used.contains(&candidate) {
            return candidate;
        }
        i += 1;
    }
}

impl InternalFrame {
    fn fields_in_use(&self) -> BTreeSet<String> {
        let mut used = BTreeSet::new();
        used.insert(ORDER_FIELD.to_owned());
        for level in self.index.levels() {
            used.insert(level.field.clone());
        }
        for column in &self.columns {
            used.insert(column.field.clone());
        }
        used
    }

    /// Identity projection over every field the metadata references. Applying
    /// it drops latent fields left behind by earlier plan rebuilds.
    fn identity_projection(&self) -> Vec<(String, Expr)> {
        let mut exprs = Vec::new();
        let mut seen = BTreeSet::new();
        let mut push = |name: &str, exprs: &mut Vec<(String, Expr)>, seen: &mut BTreeSet<String>| {
            if seen.insert(name.to_owned()) {
                exprs.push((name.to_owned(), Expr::col(name)));
            }
        };
        push(ORDER_FIELD, &mut exprs, &mut seen);
        for level in self.index.levels() {
            push(&level.field, &mut exprs, &mut seen);
        }
        for column in &self.columns {
            push(&column.field, &mut exprs, &mut seen);
        }
        exprs
    }

    /// Materialize in insertion order. The only place row order is pinned.
    fn realize(&self) -> Result<Table, PlanError> {
        self.plan.sort(vec![ORDER_FIELD.to_owned()], true).collect()
    }

    /// The plan with the current row ordinal attached, for predicates that
    /// address rows by position.
    fn seq_base(&self) -> Plan {
        self.plan
            .sort(vec![ORDER_FIELD.to_owned()], true)
            .with_row_number(SEQ_FIELD)
    }

    fn num_rows(&self) -> Result<usize, PlanError> {
        self.plan.count()
    }

    /// Realize the index labels for the resolver.
    fn index_view(&self) -> Result<IndexView, FrameError> {
        let table = self.realize()?;
        let mut level_columns = Vec::with_capacity(self.index.nlevels());
        for field in self.index.fields() {
            level_columns.push(table.column(field)?.values().to_vec());
        }
        let mut keys = Vec::with_capacity(table.num_rows());
        for row in 0..table.num_rows() {
            let mut key = Vec::with_capacity(level_columns.len());
            for column in &level_columns {
                key.push(IndexLabel::from_scalar(&column[row])?);
            }
            keys.push(key);
        }
        Ok(IndexView::new(self.index.clone(), keys))
    }

    /// Apply a resolved selection: filter, reorder, renumber, and project down
    /// to the surviving index levels and picked columns.
    fn select(&self, rows: &RowSelection, cols: &ColSelection) -> Result<Self, FrameError> {
        let mut picked = Vec::with_capacity(cols.picks.len());
        for &i in &cols.picks {
            let meta = self.columns.get(i).ok_or(FrameError::EmptySelection)?;
            let label = if cols.drop_levels < meta.label.len() {
                meta.label[cols.drop_levels..].to_vec()
            } else {
                meta.label.clone()
            };
            picked.push(ColumnMeta {
                label,
                field: meta.field.clone(),
            });
        }

        let base = self.seq_base();
        let filtered = match &rows.predicate {
            Some(predicate) => base.filter(predicate.clone()),
            None => base,
        };
        let ordered = if rows.descending {
            filtered.sort(vec![SEQ_FIELD.to_owned()], false)
        } else {
            filtered
        };
        let renumbered = ordered.with_row_number(REORDER_FIELD);

        let mut exprs = vec![(ORDER_FIELD.to_owned(), Expr::col(REORDER_FIELD))];
        let mut seen: BTreeSet<String> = BTreeSet::new();
        seen.insert(ORDER_FIELD.to_owned());

        let drop = rows.drop_levels.min(self.index.nlevels());
        let index = if drop == self.index.nlevels() {
            // Every level was consumed by the key: fall back to a positional
            // index over the selection's own order.
            let used: BTreeSet<String> = picked.iter().map(|c| c.field.clone()).collect();
            let field = fresh_field(&used, "index_level");
            seen.insert(field.clone());
            exprs.push((field.clone(), Expr::col(REORDER_FIELD)));
            IndexMeta::new(vec![IndexLevel::new(None, field)])?
        } else {
            self.index.drop_leading(drop)?
        };
        for level in index.levels() {
            if seen.insert(level.field.clone()) {
                exprs.push((level.field.clone(), Expr::col(level.field.clone())));
            }
        }
        for column in &picked {
            if seen.insert(column.field.clone()) {
                exprs.push((column.field.clone(), Expr::col(column.field.clone())));
            }
        }

        Ok(Self {
            plan: renumbered.project(exprs),
            index,
            columns: picked,
            column_depth: (self.column_depth - cols.drop_levels).max(1),
        })
    }

    /// Conditional write: every target field becomes `when(cond, value, old)`
    /// in a single rebuilt projection. A new column gets nulls outside the
    /// matched rows.
    fn assign(
        &mut self,
        predicate: Option<&Expr>,
        target_fields: &BTreeSet<String>,
        new_column: Option<ColumnMeta>,
        value: Expr,
    ) -> Result<(), FrameError> {
        let base = self.seq_base();
        let mut exprs = vec![(ORDER_FIELD.to_owned(), Expr::col(ORDER_FIELD))];
        let mut seen: BTreeSet<String> = BTreeSet::new();
        seen.insert(ORDER_FIELD.to_owned());

        for column in &self.columns {
            if !seen.insert(column.field.clone()) {
                continue;
            }
            let expr = if target_fields.contains(&column.field) {
                match predicate {
                    Some(cond) => {
                        Expr::when(cond.clone(), value.clone(), Expr::col(column.field.clone()))
                    }
                    None => value.clone(),
                }
            } else {
                Expr::col(column.field.clone())
            };
            exprs.push((column.field.clone(), expr));
        }
        for level in self.index.levels() {
            if seen.insert(level.field.clone()) {
                exprs.push((level.field.clone(), Expr::col(level.field.clone())));
            }
        }
        if let Some(meta) = new_column {
            let expr = match predicate {
                Some(cond) => Expr::when(cond.clone(), value.clone(), Expr::lit(Scalar::Null)),
                None => value.clone(),
            };
            exprs.push((meta.field.clone(), expr));
            self.columns.push(meta);
        }

        log::debug!(
            "assign rewrote {} of {} columns",
            target_fields.len(),
            self.columns.len()
        );
        self.plan = base.project(exprs);
        Ok(())
    }

    fn set_index(&self, names: &[&str], drop: bool, append: bool) -> Result<Self, FrameError> {
        let mut levels = if append {
            self.index.levels().to_vec()
        } else {
            Vec::new()
        };
        let mut columns = self.columns.clone();
        for name in names {
            let mut wanted: IndexKey = vec![IndexLabel::from(*name)];
            while wanted.len() < self.column_depth {
                wanted.push(IndexLabel::Utf8(String::new()));
            }
            let position = columns
                .iter()
                .position(|c| c.label == wanted)
                .ok_or_else(|| FrameError::ColumnNotFound {
                    key: (*name).to_owned(),
                })?;
            levels.push(IndexLevel::new(
                Some((*name).to_owned()),
                columns[position].field.clone(),
            ));
            if drop {
                columns.remove(position);
            }
        }
        let mut out = Self {
            plan: self.plan.clone(),
            index: IndexMeta::new(levels)?,
            columns,
            column_depth: self.column_depth,
        };
        out.plan = out.plan.project(out.identity_projection());
        Ok(out)
    }

    fn reset_index(&self, levels: Option<&[LevelRef]>, drop: bool) -> Result<Self, FrameError> {
        let nlevels = self.index.nlevels();
        let selected: Vec<usize> = match levels {
            None => (0..nlevels).collect(),
            Some(refs) => {
                let all_positions = refs.iter().all(|r| matches!(r, LevelRef::Position(_)));
                let all_names = refs.iter().all(|r| matches!(r, LevelRef::Name(_)));
                if !(all_positions || all_names) {
                    return Err(LocateError::MixedLevelTypes.into());
                }
                let mut out = Vec::with_capacity(refs.len());
                for level_ref in refs {
                    let position = match level_ref {
                        LevelRef::Position(p) if *p < 0 => {
                            return Err(LocateError::InvalidKey(
                                "level position must be non-negative".to_owned(),
                            )
                            .into())
                        }
                        LevelRef::Position(p) => self.index.level_by_position(*p as usize)?,
                        LevelRef::Name(name) => self.index.level_by_name(name)?,
                    };
                    out.push(position);
                }
                out
            }
        };
        let remaining: Vec<usize> = (0..nlevels).filter(|i| !selected.contains(i)).collect();

        let mut columns = self.columns.clone();
        if !drop {
            let mut demoted = Vec::with_capacity(selected.len());
            for &i in &selected {
                let level = &self.index.levels()[i];
                let name = match &level.name {
                    Some(name) => name.clone(),
                    None if nlevels == 1 => "index".to_owned(),
                    None => format!("level_{i}"),
                };
                let mut label: IndexKey = vec![IndexLabel::Utf8(name.clone())];
                while label.len() < self.column_depth {
                    label.push(IndexLabel::Utf8(String::new()));
                }
                if columns.iter().any(|c| c.label == label) {
                    return Err(FrameError::DuplicateColumn { name });
                }
                demoted.push(ColumnMeta {
                    label,
                    field: level.field.clone(),
                });
            }
            demoted.extend(columns);
            columns = demoted;
        }

        let mut plan = self.plan.clone();
        let index = if remaining.is_empty() {
            let mut used: BTreeSet<String> = columns.iter().map(|c| c.field.clone()).collect();
            used.insert(ORDER_FIELD.to_owned());
            let field = fresh_field(&used, "index_level");
            plan = plan
                .sort(vec![ORDER_FIELD.to_owned()], true)
                .with_row_number(field.clone());
            IndexMeta::new(vec![IndexLevel::new(None, field)])?
        } else {
            self.index.retain(&remaining)?
        };

        let mut out = Self {
            plan,
            index,
            columns,
            column_depth: self.column_depth,
        };
        out.plan = out.plan.project(out.identity_projection());
        Ok(out)
    }
}

fn wrap(internal: InternalFrame, reduced: bool) -> Result<Indexed, FrameError> {
    if reduced {
        let meta = internal
            .columns
            .first()
            .cloned()
            .ok_or(FrameError::EmptySelection)?;
        Ok(Indexed::Series(Series {
            state: Rc::new(RefCell::new(internal)),
            expr: Expr::col(meta.field),
            label: meta.label,
        }))
    } else {
        Ok(Indexed::Frame(DataFrame {
            state: Rc::new(RefCell::new(internal)),
        }))
    }
}

fn series_from_internal(internal: InternalFrame) -> Result<Series, FrameError> {
    wrap(internal, true).and_then(Indexed::into_series)
}

// ── DataFrame ───────────────────────────────────────────────────────────────

/// A labeled, lazily-evaluated table handle. Cloning shares the anchor.
#[derive(Debug, Clone)]
pub struct DataFrame {
    state: Rc<RefCell<InternalFrame>>,
}

impl DataFrame {
    /// Build a frame from labeled columns and explicit index levels. An empty
    /// `index` produces the default positional index.
    pub fn new(
        columns: Vec<(IndexKey, Vec<Scalar>)>,
        index: Vec<(Option<String>, Vec<IndexLabel>)>,
    ) -> Result<Self, FrameError> {
        let nrows = columns
            .first()
            .map(|(_, values)| values.len())
            .or_else(|| index.first().map(|(_, labels)| labels.len()))
            .unwrap_or(0);
        let depth = columns.first().map_or(1, |(label, _)| label.len()).max(1);

        let ordinals: Vec<Scalar> = (0..nrows as i64).map(Scalar::Int64).collect();
        let mut fields = vec![(ORDER_FIELD.to_owned(), Column::from_values(ordinals.clone())?)];

        let mut levels = Vec::new();
        if index.is_empty() {
            let field = "__index_level_0__".to_owned();
            fields.push((field.clone(), Column::from_values(ordinals)?));
            levels.push(IndexLevel::new(None, field));
        } else {
            for (i, (name, labels)) in index.into_iter().enumerate() {
                if labels.len() != nrows {
                    return Err(FrameError::LengthMismatch {
                        values: labels.len(),
                        index: nrows,
                    });
                }
                let field = format!("__index_level_{i}__");
                let values = labels.iter().map(IndexLabel::to_scalar).collect();
                fields.push((field.clone(), Column::from_values(values)?));
                levels.push(IndexLevel::new(name, field));
            }
        }

        let mut metas = Vec::new();
        for (i, (label, values)) in columns.into_iter().enumerate() {
            if label.len() != depth {
                return Err(FrameError::RaggedColumnLabels);
            }
            if values.len() != nrows {
                return Err(FrameError::LengthMismatch {
                    values: values.len(),
                    index: nrows,
                });
            }
            let field = format!("__data_{i}__");
            fields.push((field.clone(), Column::from_values(values)?));
            metas.push(ColumnMeta { label, field });
        }

        Ok(Self {
            state: Rc::new(RefCell::new(InternalFrame {
                plan: Plan::source(Table::new(fields)?),
                index: IndexMeta::new(levels)?,
                columns: metas,
                column_depth: depth,
            })),
        })
    }

    /// Named columns over the default positional index.
    pub fn from_columns(columns: Vec<(&str, Vec<Scalar>)>) -> Result<Self, FrameError> {
        let columns = columns
            .into_iter()
            .map(|(name, values)| (vec![IndexLabel::from(name)], values))
            .collect();
        Self::new(columns, Vec::new())
    }

    pub fn from_columns_with_index(
        columns: Vec<(&str, Vec<Scalar>)>,
        index_name: Option<&str>,
        labels: Vec<IndexLabel>,
    ) -> Result<Self, FrameError> {
        let columns = columns
            .into_iter()
            .map(|(name, values)| (vec![IndexLabel::from(name)], values))
            .collect();
        Self::new(columns, vec![(index_name.map(str::to_owned), labels)])
    }

    /// A detached deep copy; the new handle has its own anchor.
    #[must_use]
    pub fn copy(&self) -> Self {
        Self {
            state: Rc::new(RefCell::new(self.state.borrow().clone())),
        }
    }

    pub fn num_rows(&self) -> Result<usize, FrameError> {
        Ok(self.state.borrow().num_rows()?)
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.state.borrow().columns.len()
    }

    #[must_use]
    pub fn column_labels(&self) -> Vec<IndexKey> {
        self.state
            .borrow()
            .columns
            .iter()
            .map(|c| c.label.clone())
            .collect()
    }

    #[must_use]
    pub fn index_names(&self) -> Vec<Option<String>> {
        self.state
            .borrow()
            .index
            .names()
            .into_iter()
            .map(|n| n.map(str::to_owned))
            .collect()
    }

    #[must_use]
    pub fn nlevels(&self) -> usize {
        self.state.borrow().index.nlevels()
    }

    /// The realized index labels, row by row.
    pub fn index_keys(&self) -> Result<Vec<IndexKey>, FrameError> {
        Ok(self.state.borrow().index_view()?.keys)
    }

    /// Extract one column as a series sharing this frame's anchor.
    pub fn column(&self, name: &str) -> Result<Series, FrameError> {
        match self.get(&Key::label(name))? {
            Indexed::Series(series) => Ok(series),
            Indexed::Frame(_) => Err(FrameError::AmbiguousColumn {
                name: name.to_owned(),
            }),
        }
    }

    /// A boolean mask key from a series, rejected unless the series comes
    /// from this frame.
    pub fn mask(&self, cond: &Series) -> Result<Key, FrameError> {
        if !Rc::ptr_eq(&self.state, &cond.state) {
            return Err(FrameError::DifferentAnchor);
        }
        Ok(Key::Mask(cond.expr.clone()))
    }

    /// `frame[key]`: labels and label lists pick columns (lists are strict);
    /// masks, boolean arrays, and slices pick rows. Position slices are
    /// half-open, label slices inclusive.
    pub fn get(&self, key: &Key) -> Result<Indexed, FrameError> {
        match key {
            Key::Label(_) | Key::Tuple(_) | Key::List(_) => {
                let st = self.state.borrow();
                let labels: Vec<IndexKey> = st.columns.iter().map(|c| c.label.clone()).collect();
                let cols = resolve_loc_cols(&labels, st.column_depth, key, true)?;
                let internal = st.select(&RowSelection::all(), &cols)?;
                drop(st);
                wrap(internal, cols.reduced)
            }
            Key::Mask(_) | Key::Bools(_) | Key::LabelSlice { .. } => {
                let st = self.state.borrow();
                let view = st.index_view()?;
                let rows = resolve_loc_rows(&view, SEQ_FIELD, key)?;
                let cols = resolve_loc_cols(
                    &st.columns.iter().map(|c| c.label.clone()).collect::<Vec<_>>(),
                    st.column_depth,
                    &Key::All,
                    true,
                )?;
                let internal = st.select(&rows, &cols)?;
                drop(st);
                wrap(internal, false)
            }
            Key::PositionSlice { .. } => {
                let st = self.state.borrow();
                let rows = resolve_iloc_rows(st.num_rows()?, SEQ_FIELD, key)?;
                let cols = resolve_iloc_cols(st.columns.len(), &Key::All)?;
                let internal = st.select(&rows, &cols)?;
                drop(st);
                wrap(internal, false)
            }
            Key::All => {
                let st = self.state.borrow();
                let cols = resolve_iloc_cols(st.columns.len(), &Key::All)?;
                let internal = st.select(&RowSelection::all(), &cols)?;
                drop(st);
                wrap(internal, false)
            }
            Key::Position(_) | Key::Positions(_) => Err(LocateError::InvalidKey(
                "bare positions do not select from a frame".to_owned(),
            )
            .into()),
        }
    }

    /// `frame[name] = value`.
    pub fn set(&mut self, name: &str, value: &AssignValue) -> Result<(), FrameError> {
        self.loc().set(&[Key::All, Key::label(name)], value)
    }

    #[must_use]
    pub fn loc(&self) -> Loc {
        Loc {
            frame: self.clone(),
        }
    }

    #[must_use]
    pub fn iloc(&self) -> ILoc {
        ILoc {
            frame: self.clone(),
        }
    }

    /// Scalar access by label pair. Returns all matching cells when the index
    /// holds duplicates or the row key is a partial tuple. Read-only.
    pub fn at(&self, keys: &[Key]) -> Result<AtValue, FrameError> {
        let (row_key, col_key) = match keys {
            [row, col] => (row, col),
            _ => {
                return Err(FrameError::AccessorUsage {
                    usage: "DataFrame.at like .at[row_index, column_name]",
                })
            }
        };
        let st = self.state.borrow();
        let nlevels = st.index.nlevels();
        let row: IndexKey = match (nlevels, row_key) {
            (1, Key::Label(label)) => vec![label.clone()],
            (1, _) => return Err(FrameError::ScalarRowExpected),
            (_, Key::Tuple(tuple)) => tuple.clone(),
            (_, _) => return Err(FrameError::TupleRowExpected),
        };
        let view = st.index_view()?;
        let rows = resolve_loc_rows(&view, SEQ_FIELD, &Key::Tuple(row.clone()))?;
        let labels: Vec<IndexKey> = st.columns.iter().map(|c| c.label.clone()).collect();
        let cols = resolve_loc_cols(&labels, st.column_depth, col_key, false)?;
        let internal = st.select(&rows, &cols)?;
        drop(st);
        at_value(&internal, row.len() == nlevels)
    }

    /// Scalar access by position pair. Read-only; misses are key errors.
    pub fn iat(&self, keys: &[Key]) -> Result<Scalar, FrameError> {
        let (row_key, col_key) = match keys {
            [row, col] => (row, col),
            _ => {
                return Err(FrameError::AccessorUsage {
                    usage: "DataFrame.iat like .iat[row_integer_position, column_integer_position]",
                })
            }
        };
        if !matches!(row_key, Key::Position(_)) || !matches!(col_key, Key::Position(_)) {
            return Err(FrameError::IntegerExpected);
        }
        let st = self.state.borrow();
        let rows =
            resolve_iloc_rows(st.num_rows()?, SEQ_FIELD, row_key).map_err(out_of_range_as_key)?;
        let cols = resolve_iloc_cols(st.columns.len(), col_key).map_err(out_of_range_as_key)?;
        let internal = st.select(&rows, &cols)?;
        drop(st);
        single_value(&internal)
    }

    /// `set_index(names, drop, append)`: promote data columns to index levels.
    pub fn set_index(&self, names: &[&str], drop: bool, append: bool) -> Result<Self, FrameError> {
        let internal = self.state.borrow().set_index(names, drop, append)?;
        Ok(Self {
            state: Rc::new(RefCell::new(internal)),
        })
    }

    pub fn set_index_inplace(
        &mut self,
        names: &[&str],
        drop: bool,
        append: bool,
    ) -> Result<(), FrameError> {
        let internal = self.state.borrow().set_index(names, drop, append)?;
        *self.state.borrow_mut() = internal;
        Ok(())
    }

    /// `reset_index(level, drop)`: demote index levels back to columns (or
    /// discard them). Demoting every level installs a fresh positional index.
    pub fn reset_index(
        &self,
        levels: Option<&[LevelRef]>,
        drop: bool,
    ) -> Result<Self, FrameError> {
        let internal = self.state.borrow().reset_index(levels, drop)?;
        Ok(Self {
            state: Rc::new(RefCell::new(internal)),
        })
    }

    pub fn reset_index_inplace(
        &mut self,
        levels: Option<&[LevelRef]>,
        drop: bool,
    ) -> Result<(), FrameError> {
        let internal = self.state.borrow().reset_index(levels, drop)?;
        *self.state.borrow_mut() = internal;
        Ok(())
    }

    fn value_expr(
        &self,
        value: &AssignValue,
        scalar_row: bool,
        width: usize,
    ) -> Result<Expr, FrameError> {
        match value {
            AssignValue::Scalar(scalar) => Ok(Expr::lit(scalar.clone())),
            AssignValue::Series(series) => {
                if scalar_row {
                    return Err(LocateError::IncompatibleIndexer { kind: "Series" }.into());
                }
                if !Rc::ptr_eq(&self.state, &series.state) {
                    return Err(FrameError::DifferentAnchor);
                }
                if width != 1 {
                    return Err(LocateError::ShapeMismatch.into());
                }
                Ok(series.expr.clone())
            }
            AssignValue::Frame(frame) => {
                if scalar_row {
                    return Err(LocateError::IncompatibleIndexer { kind: "DataFrame" }.into());
                }
                let other = frame.state.borrow();
                if other.columns.len() != 1 {
                    return Err(LocateError::MultiColumnValue.into());
                }
                if !Rc::ptr_eq(&self.state, &frame.state) {
                    return Err(FrameError::DifferentAnchor);
                }
                if width != 1 {
                    return Err(LocateError::ShapeMismatch.into());
                }
                Ok(Expr::col(other.columns[0].field.clone()))
            }
        }
    }

    fn write(
        &self,
        rows: RowSelection,
        targets: Vec<usize>,
        new_column: Option<ColumnMeta>,
        value: &AssignValue,
        scalar_row: bool,
    ) -> Result<(), FrameError> {
        let width = targets.len() + usize::from(new_column.is_some());
        let value_expr = self.value_expr(value, scalar_row, width)?;
        let target_fields: BTreeSet<String> = {
            let st = self.state.borrow();
            let mut fields = BTreeSet::new();
            for &i in &targets {
                let meta = st.columns.get(i).ok_or(FrameError::EmptySelection)?;
                fields.insert(meta.field.clone());
            }
            fields
        };
        self.state
            .borrow_mut()
            .assign(rows.predicate.as_ref(), &target_fields, new_column, value_expr)
    }
}

/// A row key targets a single cell only when it consumes every index level;
/// a partial label on a multi-level index selects a block of rows and
/// broadcasts like any other multi-row selection.
fn collapses_to_cell(key: &Key, nlevels: usize) -> bool {
    match key {
        Key::Label(_) => nlevels == 1,
        Key::Tuple(tuple) => tuple.len() == nlevels,
        _ => false,
    }
}

fn out_of_range_as_key(err: LocateError) -> LocateError {
    match err {
        LocateError::OutOfRange { len } => LocateError::KeyNotFound {
            key: format!("position out of range for axis of length {len}"),
        },
        other => other,
    }
}

fn at_value(internal: &InternalFrame, full_key: bool) -> Result<AtValue, FrameError> {
    let meta = internal.columns.first().ok_or(FrameError::EmptySelection)?;
    let table = internal.realize()?;
    let values = table.column(&meta.field)?.values();
    match (full_key, values) {
        (_, []) => Err(FrameError::EmptySelection),
        (true, [single]) => Ok(AtValue::Scalar(single.clone())),
        _ => Ok(AtValue::Values(values.to_vec())),
    }
}

fn single_value(internal: &InternalFrame) -> Result<Scalar, FrameError> {
    let meta = internal.columns.first().ok_or(FrameError::EmptySelection)?;
    let table = internal.realize()?;
    table
        .column(&meta.field)?
        .values()
        .first()
        .cloned()
        .ok_or(FrameError::EmptySelection)
}

fn new_column_meta(st: &InternalFrame, mut label: IndexKey) -> ColumnMeta {
    while label.len() < st.column_depth {
        label.push(IndexLabel::Utf8(String::new()));
    }
    let field = fresh_field(&st.fields_in_use(), "data");
    ColumnMeta { label, field }
}

// ── accessors ───────────────────────────────────────────────────────────────

/// Label-based selection, `frame.loc()[rows]` / `[rows, cols]`.
pub struct Loc {
    frame: DataFrame,
}

impl Loc {
    pub fn get(&self, keys: &[Key]) -> Result<Indexed, FrameError> {
        let (row_key, col_key) = split_pair(keys.to_vec(), Target::Frame)?;
        let st = self.frame.state.borrow();
        let view = st.index_view()?;
        let rows = resolve_loc_rows(&view, SEQ_FIELD, &row_key)?;
        let labels: Vec<IndexKey> = st.columns.iter().map(|c| c.label.clone()).collect();
        let cols = resolve_loc_cols(
            &labels,
            st.column_depth,
            &col_key.unwrap_or(Key::All),
            true,
        )?;
        let internal = st.select(&rows, &cols)?;
        drop(st);
        wrap(internal, cols.reduced)
    }

    /// Assignment. A label-shaped column key that misses creates a new
    /// column; matched rows take the value, others keep theirs (nulls for a
    /// fresh column).
    pub fn set(&self, keys: &[Key], value: &AssignValue) -> Result<(), FrameError> {
        let (row_key, col_key) = split_pair(keys.to_vec(), Target::Frame)?;
        let col_key = col_key.unwrap_or(Key::All);
        let (rows, targets, new_column, scalar_row) = {
            let st = self.frame.state.borrow();
            let scalar_row = collapses_to_cell(&row_key, st.index.nlevels());
            let view = st.index_view()?;
            let rows = resolve_loc_rows(&view, SEQ_FIELD, &row_key)?;
            let labels: Vec<IndexKey> = st.columns.iter().map(|c| c.label.clone()).collect();
            match resolve_loc_cols(&labels, st.column_depth, &col_key, true) {
                Ok(sel) => (rows, sel.picks, None, scalar_row),
                Err(LocateError::KeyNotFound { .. }) => match &col_key {
                    Key::Label(label) => {
                        let meta = new_column_meta(&st, vec![label.clone()]);
                        (rows, Vec::new(), Some(meta), scalar_row)
                    }
                    Key::Tuple(tuple) => {
                        let meta = new_column_meta(&st, tuple.clone());
                        (rows, Vec::new(), Some(meta), scalar_row)
                    }
                    _ => {
                        return Err(LocateError::KeyNotFound {
                            key: "column selection".to_owned(),
                        }
                        .into())
                    }
                },
                Err(err) => return Err(err.into()),
            }
        };
        self.frame.write(rows, targets, new_column, value, scalar_row)
    }
}

/// Position-based selection, `frame.iloc()[rows]` / `[rows, cols]`.
pub struct ILoc {
    frame: DataFrame,
}

impl ILoc {
    pub fn get(&self, keys: &[Key]) -> Result<Indexed, FrameError> {
        let (row_key, col_key) = split_pair(keys.to_vec(), Target::Frame)?;
        let st = self.frame.state.borrow();
        let rows = resolve_iloc_rows(st.num_rows()?, SEQ_FIELD, &row_key)?;
        let cols = resolve_iloc_cols(st.columns.len(), &col_key.unwrap_or(Key::All))?;
        let internal = st.select(&rows, &cols)?;
        drop(st);
        wrap(internal, cols.reduced)
    }

    pub fn set(&self, keys: &[Key], value: &AssignValue) -> Result<(), FrameError> {
        let (row_key, col_key) = split_pair(keys.to_vec(), Target::Frame)?;
        let scalar_row = matches!(row_key, Key::Position(_));
        let (rows, targets) = {
            let st = self.frame.state.borrow();
            let rows = resolve_iloc_rows(st.num_rows()?, SEQ_FIELD, &row_key)?;
            let cols = resolve_iloc_cols(st.columns.len(), &col_key.unwrap_or(Key::All))?;
            (rows, cols.picks)
        };
        self.frame.write(rows, targets, None, value, scalar_row)
    }
}

// ── Series ──────────────────────────────────────────────────────────────────

/// A single labeled column: an expression over a shared anchor frame.
/// Column extractions are direct (`Col` expressions) and write through to
/// their frame; arithmetic produces derived series on the same anchor.
#[derive(Debug, Clone)]
pub struct Series {
    state: Rc<RefCell<InternalFrame>>,
    expr: Expr,
    label: IndexKey,
}

impl Series {
    pub fn from_values(name: &str, values: Vec<Scalar>) -> Result<Self, FrameError> {
        Self::from_values_with_index(name, values, None, Vec::new())
    }

    /// An empty `index` means the default positional index.
    pub fn from_values_with_index(
        name: &str,
        values: Vec<Scalar>,
        index_name: Option<&str>,
        labels: Vec<IndexLabel>,
    ) -> Result<Self, FrameError> {
        let index = if labels.is_empty() {
            Vec::new()
        } else {
            vec![(index_name.map(str::to_owned), labels)]
        };
        let frame = DataFrame::new(vec![(vec![IndexLabel::from(name)], values)], index)?;
        frame.column(name)
    }

    #[must_use]
    pub fn label(&self) -> &IndexKey {
        &self.label
    }

    #[must_use]
    pub fn rename(&self, name: &str) -> Self {
        Self {
            state: Rc::clone(&self.state),
            expr: self.expr.clone(),
            label: vec![IndexLabel::from(name)],
        }
    }

    pub fn num_rows(&self) -> Result<usize, FrameError> {
        Ok(self.state.borrow().num_rows()?)
    }

    /// Realized cell values in index order.
    pub fn values(&self) -> Result<Vec<Scalar>, FrameError> {
        let st = self.state.borrow();
        let table = st.realize()?;
        Ok(wb_plan::eval(&self.expr, &table)?.values().to_vec())
    }

    pub fn index_keys(&self) -> Result<Vec<IndexKey>, FrameError> {
        Ok(self.state.borrow().index_view()?.keys)
    }

    /// A detached single-column frame with this series' values.
    pub fn to_frame(&self) -> Result<DataFrame, FrameError> {
        Ok(DataFrame {
            state: Rc::new(RefCell::new(self.series_frame()?)),
        })
    }

    fn derived(&self, expr: Expr) -> Self {
        Self {
            state: Rc::clone(&self.state),
            expr,
            label: self.label.clone(),
        }
    }

    pub fn cmp_value(&self, op: CmpOp, value: impl Into<Scalar>) -> Self {
        self.derived(self.expr.clone().cmp(op, Expr::lit(value)))
    }

    pub fn gt(&self, value: impl Into<Scalar>) -> Self {
        self.cmp_value(CmpOp::Gt, value)
    }

    pub fn ge(&self, value: impl Into<Scalar>) -> Self {
        self.cmp_value(CmpOp::Ge, value)
    }

    pub fn lt(&self, value: impl Into<Scalar>) -> Self {
        self.cmp_value(CmpOp::Lt, value)
    }

    pub fn le(&self, value: impl Into<Scalar>) -> Self {
        self.cmp_value(CmpOp::Le, value)
    }

    pub fn eq_value(&self, value: impl Into<Scalar>) -> Self {
        self.cmp_value(CmpOp::Eq, value)
    }

    pub fn ne_value(&self, value: impl Into<Scalar>) -> Self {
        self.cmp_value(CmpOp::Ne, value)
    }

    pub fn bin_value(&self, op: BinOp, value: impl Into<Scalar>) -> Self {
        self.derived(self.expr.clone().bin(op, Expr::lit(value)))
    }

    #[must_use]
    pub fn neg(&self) -> Self {
        self.derived(self.expr.clone().neg())
    }

    #[must_use]
    pub fn not(&self) -> Self {
        self.derived(self.expr.clone().not())
    }

    #[must_use]
    pub fn is_in(&self, values: Vec<Scalar>) -> Self {
        self.derived(self.expr.clone().is_in(values))
    }

    pub fn cmp_series(&self, op: CmpOp, other: &Self) -> Result<Self, FrameError> {
        self.combine(other, |a, b| a.cmp(op, b))
    }

    pub fn bin_series(&self, op: BinOp, other: &Self) -> Result<Self, FrameError> {
        self.combine(other, |a, b| a.bin(op, b))
    }

    pub fn and(&self, other: &Self) -> Result<Self, FrameError> {
        self.combine(other, Expr::and)
    }

    pub fn or(&self, other: &Self) -> Result<Self, FrameError> {
        self.combine(other, Expr::or)
    }

    fn combine(
        &self,
        other: &Self,
        build: impl FnOnce(Expr, Expr) -> Expr,
    ) -> Result<Self, FrameError> {
        if !Rc::ptr_eq(&self.state, &other.state) {
            return Err(FrameError::DifferentAnchor);
        }
        Ok(self.derived(build(self.expr.clone(), other.expr.clone())))
    }

    /// A mask key over this series' anchor, checked against `cond`'s anchor.
    pub fn mask(&self, cond: &Self) -> Result<Key, FrameError> {
        if !Rc::ptr_eq(&self.state, &cond.state) {
            return Err(FrameError::DifferentAnchor);
        }
        Ok(Key::Mask(cond.expr.clone()))
    }

    /// The anchor's state narrowed to this series: same plan (so masks over
    /// sibling columns still resolve), a single visible column.
    fn series_frame(&self) -> Result<InternalFrame, FrameError> {
        let st = self.state.borrow();
        if let Expr::Col { name } = &self.expr {
            return Ok(InternalFrame {
                plan: st.plan.clone(),
                index: st.index.clone(),
                columns: vec![ColumnMeta {
                    label: self.label.clone(),
                    field: name.clone(),
                }],
                column_depth: self.label.len().max(1),
            });
        }
        let field = fresh_field(&st.fields_in_use(), "data");
        let mut exprs = st.identity_projection();
        exprs.push((field.clone(), self.expr.clone()));
        Ok(InternalFrame {
            plan: st.plan.project(exprs),
            index: st.index.clone(),
            columns: vec![ColumnMeta {
                label: self.label.clone(),
                field,
            }],
            column_depth: self.label.len().max(1),
        })
    }

    pub fn loc_get(&self, keys: &[Key]) -> Result<Self, FrameError> {
        let (row_key, _) = split_pair(keys.to_vec(), Target::Series)?;
        let internal = self.series_frame()?;
        let view = internal.index_view()?;
        let rows = resolve_loc_rows(&view, SEQ_FIELD, &row_key)?;
        let selected = internal.select(&rows, &single_column())?;
        series_from_internal(selected)
    }

    pub fn iloc_get(&self, keys: &[Key]) -> Result<Self, FrameError> {
        let (row_key, _) = split_pair(keys.to_vec(), Target::Series)?;
        let internal = self.series_frame()?;
        let rows = resolve_iloc_rows(internal.num_rows()?, SEQ_FIELD, &row_key)?;
        let selected = internal.select(&rows, &single_column())?;
        series_from_internal(selected)
    }

    /// `series[key]`: label-shaped keys, masks, and label slices resolve by
    /// label; position slices by ordinal.
    pub fn get(&self, key: &Key) -> Result<Self, FrameError> {
        match key {
            Key::PositionSlice { .. } => self.iloc_get(std::slice::from_ref(key)),
            _ => self.loc_get(std::slice::from_ref(key)),
        }
    }

    /// Scalar access by label. Read-only.
    pub fn at(&self, keys: &[Key]) -> Result<AtValue, FrameError> {
        let key = match keys {
            [key] => key,
            _ => {
                return Err(FrameError::AccessorUsage {
                    usage: "Series.at like .at[column_name]",
                })
            }
        };
        let internal = self.series_frame()?;
        let nlevels = internal.index.nlevels();
        let row: IndexKey = match (nlevels, key) {
            (1, Key::Label(label)) => vec![label.clone()],
            (1, _) => return Err(FrameError::ScalarRowExpected),
            (_, Key::Tuple(tuple)) => tuple.clone(),
            (_, _) => return Err(FrameError::TupleRowExpected),
        };
        let view = internal.index_view()?;
        let rows = resolve_loc_rows(&view, SEQ_FIELD, &Key::Tuple(row.clone()))?;
        let selected = internal.select(&rows, &single_column())?;
        at_value(&selected, row.len() == nlevels)
    }

    /// Scalar access by position. Read-only; misses are key errors.
    pub fn iat(&self, keys: &[Key]) -> Result<Scalar, FrameError> {
        let key = match keys {
            [key] => key,
            _ => {
                return Err(FrameError::AccessorUsage {
                    usage: "Series.iat like .iat[row_integer_position]",
                })
            }
        };
        if !matches!(key, Key::Position(_)) {
            return Err(FrameError::IntegerExpected);
        }
        let internal = self.series_frame()?;
        let rows = resolve_iloc_rows(internal.num_rows()?, SEQ_FIELD, key)
            .map_err(out_of_range_as_key)?;
        let selected = internal.select(&rows, &single_column())?;
        single_value(&selected)
    }

    /// Direct column extractions write through to the anchor frame; derived
    /// series are first detached onto a private anchor.
    pub fn loc_set(&mut self, key: &Key, value: &AssignValue) -> Result<(), FrameError> {
        let field = self.ensure_direct()?;
        let (rows, scalar_row) = {
            let st = self.state.borrow();
            let view = st.index_view()?;
            (
                resolve_loc_rows(&view, SEQ_FIELD, key)?,
                collapses_to_cell(key, st.index.nlevels()),
            )
        };
        self.write(field, rows, value, scalar_row)
    }

    pub fn iloc_set(&mut self, key: &Key, value: &AssignValue) -> Result<(), FrameError> {
        let field = self.ensure_direct()?;
        let scalar_row = matches!(key, Key::Position(_));
        let rows = {
            let st = self.state.borrow();
            resolve_iloc_rows(st.num_rows()?, SEQ_FIELD, key)?
        };
        self.write(field, rows, value, scalar_row)
    }

    fn ensure_direct(&mut self) -> Result<String, FrameError> {
        if let Expr::Col { name } = &self.expr {
            return Ok(name.clone());
        }
        let internal = self.series_frame()?;
        let field = internal
            .columns
            .first()
            .map(|c| c.field.clone())
            .ok_or(FrameError::EmptySelection)?;
        self.state = Rc::new(RefCell::new(internal));
        self.expr = Expr::col(field.clone());
        Ok(field)
    }

    fn write(
        &self,
        field: String,
        rows: RowSelection,
        value: &AssignValue,
        scalar_row: bool,
    ) -> Result<(), FrameError> {
        let value_expr = match value {
            AssignValue::Scalar(scalar) => Expr::lit(scalar.clone()),
            AssignValue::Series(series) => {
                if scalar_row {
                    return Err(LocateError::IncompatibleIndexer { kind: "Series" }.into());
                }
                if !Rc::ptr_eq(&self.state, &series.state) {
                    return Err(FrameError::DifferentAnchor);
                }
                series.expr.clone()
            }
            AssignValue::Frame(_) => {
                return Err(LocateError::IncompatibleIndexer { kind: "DataFrame" }.into())
            }
        };
        let mut fields = BTreeSet::new();
        fields.insert(field);
        self.state
            .borrow_mut()
            .assign(rows.predicate.as_ref(), &fields, None, value_expr)
    }

    /// Demote index levels into a frame (or, with `drop`, discard them and
    /// keep a series over the default index). `name` renames the value
    /// column first.
    pub fn reset_index(
        &self,
        levels: Option<&[LevelRef]>,
        drop: bool,
        name: Option<&str>,
    ) -> Result<Indexed, FrameError> {
        let mut base = self.series_frame()?;
        if let Some(name) = name {
            let meta = base.columns.first_mut().ok_or(FrameError::EmptySelection)?;
            meta.label = vec![IndexLabel::from(name)];
        }
        let internal = base.reset_index(levels, drop)?;
        if drop {
            series_from_internal(internal).map(Indexed::Series)
        } else {
            Ok(Indexed::Frame(DataFrame {
                state: Rc::new(RefCell::new(internal)),
            }))
        }
    }

    /// In-place reset is only possible when the index is dropped; keeping it
    /// would turn the series into a frame.
    pub fn reset_index_inplace(&mut self, drop: bool) -> Result<(), FrameError> {
        if !drop {
            return Err(FrameError::InplaceSeriesReset);
        }
        let series = self.reset_index(None, true, None)?.into_series()?;
        self.state = series.state;
        self.expr = series.expr;
        self.label = series.label;
        Ok(())
    }
}

fn single_column() -> ColSelection {
    ColSelection {
        picks: vec![0],
        drop_levels: 0,
        reduced: true,
    }
}

#[cfg(test)]
mod tests {
    use super::{AssignValue, AtValue, DataFrame, FrameError, Key, LevelRef};
    use wb_index::{IndexKey, IndexLabel};
    use wb_locate::ErrorKind;
    use wb_plan::{BinOp, CmpOp};
    use wb_types::Scalar;

    fn ints(values: &[i64]) -> Vec<Scalar> {
        values.iter().map(|&v| Scalar::Int64(v)).collect()
    }

    fn labels(values: &[i64]) -> Vec<IndexLabel> {
        values.iter().map(|&v| IndexLabel::Int64(v)).collect()
    }

    fn sample() -> DataFrame {
        DataFrame::from_columns_with_index(
            vec![
                ("a", ints(&[1, 2, 3, 4, 5, 6, 7, 8, 9])),
                ("b", ints(&[4, 5, 6, 3, 2, 1, 0, 0, 0])),
            ],
            None,
            labels(&[0, 1, 3, 5, 6, 8, 9, 9, 9]),
        )
        .expect("frame")
    }

    #[test]
    fn column_extraction_shares_anchor() {
        let frame = sample();
        let a = frame.column("a").expect("column");
        assert_eq!(a.values().expect("values"), ints(&[1, 2, 3, 4, 5, 6, 7, 8, 9]));
        assert_eq!(a.index_keys().expect("index").len(), 9);
    }

    #[test]
    fn loc_scalar_label_keeps_duplicates() {
        let frame = sample();
        let b = frame
            .loc()
            .get(&[Key::label(9), Key::label("b")])
            .expect("selects")
            .into_series()
            .expect("series");
        assert_eq!(b.values().expect("values"), ints(&[0, 0, 0]));
    }

    #[test]
    fn loc_slice_is_inclusive() {
        let frame = sample();
        let a = frame
            .loc()
            .get(&[Key::label_range(5i64, 8i64), Key::label("a")])
            .expect("selects")
            .into_series()
            .expect("series");
        assert_eq!(a.values().expect("values"), ints(&[4, 5, 6]));
    }

    #[test]
    fn loc_missing_label_errors() {
        let frame = sample();
        let err = frame.loc().get(&[Key::label(10)]).expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Key);
    }

    #[test]
    fn iloc_negative_step_reverses() {
        let frame = sample();
        let a = frame
            .iloc()
            .get(&[Key::position_range(None, None, Some(-1)), Key::Position(0)])
            .expect("selects")
            .into_series()
            .expect("series");
        assert_eq!(a.values().expect("values"), ints(&[9, 8, 7, 6, 5, 4, 3, 2, 1]));
    }

    #[test]
    fn iloc_duplicate_rows_rejected() {
        let frame = sample();
        let err = frame
            .iloc()
            .get(&[Key::Positions(vec![1, 1])])
            .expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Duplicated row selection is not currently supported"
        );
    }

    #[test]
    fn at_scalar_and_duplicate_forms() {
        let frame = sample();
        assert_eq!(
            frame.at(&[Key::label(3), Key::label("b")]).expect("cell"),
            AtValue::Scalar(Scalar::Int64(6))
        );
        assert_eq!(
            frame.at(&[Key::label(9), Key::label("b")]).expect("cells"),
            AtValue::Values(ints(&[0, 0, 0]))
        );
        let err = frame
            .at(&[Key::label(99), Key::label("b")])
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Key);
    }

    #[test]
    fn at_arity_is_a_type_error() {
        let frame = sample();
        let err = frame.at(&[Key::label(3)]).expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Use DataFrame.at like .at[row_index, column_name]"
        );
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn iat_miss_is_a_key_error() {
        let frame = sample();
        assert_eq!(
            frame
                .iat(&[Key::Position(7), Key::Position(0)])
                .expect("cell"),
            Scalar::Int64(8)
        );
        let err = frame
            .iat(&[Key::Position(99), Key::Position(0)])
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Key);
    }

    #[test]
    fn mask_filters_rows() {
        let frame = sample();
        let cond = frame.column("a").expect("column").gt(7i64);
        let key = frame.mask(&cond).expect("same anchor");
        let picked = frame.get(&key).expect("filters").into_frame().expect("frame");
        assert_eq!(
            picked.column("a").expect("column").values().expect("values"),
            ints(&[8, 9])
        );
    }

    #[test]
    fn mask_from_other_frame_rejected() {
        let frame = sample();
        let other = sample();
        let cond = other.column("a").expect("column").gt(7i64);
        let err = frame.mask(&cond).expect_err("must fail");
        assert!(matches!(err, FrameError::DifferentAnchor));
    }

    #[test]
    fn loc_set_scalar_on_mask() {
        let frame = sample();
        let cond = frame.column("a").expect("column").gt(7i64);
        let key = frame.mask(&cond).expect("same anchor");
        frame
            .loc()
            .set(&[key, Key::label("b")], &AssignValue::from(100i64))
            .expect("assigns");
        assert_eq!(
            frame.column("b").expect("column").values().expect("values"),
            ints(&[4, 5, 6, 3, 2, 1, 0, 100, 100])
        );
        // untouched column keeps its values
        assert_eq!(
            frame.column("a").expect("column").values().expect("values"),
            ints(&[1, 2, 3, 4, 5, 6, 7, 8, 9])
        );
    }

    #[test]
    fn loc_set_creates_missing_column() {
        let mut frame = sample();
        frame
            .set("c", &AssignValue::from(0i64))
            .expect("creates column");
        assert_eq!(frame.num_columns(), 3);
        assert_eq!(
            frame.column("c").expect("column").values().expect("values"),
            ints(&[0; 9])
        );
    }

    #[test]
    fn loc_set_series_value_writes_expression() {
        let frame = sample();
        let negated = frame.column("a").expect("column").neg();
        frame
            .loc()
            .set(&[Key::All, Key::label("a")], &AssignValue::Series(negated))
            .expect("assigns");
        assert_eq!(
            frame.column("a").expect("column").values().expect("values"),
            ints(&[-1, -2, -3, -4, -5, -6, -7, -8, -9])
        );
    }

    #[test]
    fn scalar_row_with_series_value_rejected() {
        let frame = sample();
        let b = frame.column("b").expect("column");
        let err = frame
            .loc()
            .set(&[Key::label(3), Key::label("a")], &AssignValue::Series(b))
            .expect_err("must fail");
        assert!(err.to_string().contains("Incompatible indexer with Series"));
    }

    #[test]
    fn series_setitem_writes_through_to_frame() {
        let frame = sample();
        let mut b = frame.column("b").expect("column");
        let odd = b.bin_value(BinOp::Mod, 2i64).cmp_value(CmpOp::Eq, 1i64);
        let key = b.mask(&odd).expect("same anchor");
        b.loc_set(&key, &AssignValue::from(-1i64)).expect("assigns");
        assert_eq!(
            frame.column("b").expect("column").values().expect("values"),
            ints(&[4, -1, 6, -1, 2, -1, 0, 0, 0])
        );
    }

    #[test]
    fn partial_label_series_assignment_broadcasts() {
        let frame = DataFrame::new(
            vec![(vec![IndexLabel::from("n")], ints(&[1, 2, 3]))],
            vec![
                (
                    None,
                    vec!["x", "x", "y"]
                        .into_iter()
                        .map(IndexLabel::from)
                        .collect(),
                ),
                (
                    None,
                    vec!["cobra", "viper", "sidewinder"]
                        .into_iter()
                        .map(IndexLabel::from)
                        .collect(),
                ),
            ],
        )
        .expect("frame");
        let mut n = frame.column("n").expect("column");
        let scaled = n.bin_value(BinOp::Mul, 10i64);
        n.loc_set(&Key::label("x"), &AssignValue::Series(scaled))
            .expect("partial label selects a block");
        assert_eq!(n.values().expect("values"), ints(&[10, 20, 3]));

        // consuming every level still targets a single cell
        let scaled = n.bin_value(BinOp::Mul, 10i64);
        let err = n
            .loc_set(
                &Key::Tuple(vec![IndexLabel::from("y"), IndexLabel::from("sidewinder")]),
                &AssignValue::Series(scaled),
            )
            .expect_err("must fail");
        assert_eq!(err.to_string(), "Incompatible indexer with Series");
    }

    #[test]
    fn loc_set_partial_row_label_takes_series_value() {
        let frame = sample().set_index(&["b"], true, true).expect("stack");
        let negated = frame.column("a").expect("column").neg();
        frame
            .loc()
            .set(
                &[Key::label(9), Key::label("a")],
                &AssignValue::Series(negated),
            )
            .expect("assigns");
        assert_eq!(
            frame.column("a").expect("column").values().expect("values"),
            ints(&[1, 2, 3, 4, 5, 6, -7, -8, -9])
        );
    }

    #[test]
    fn derived_series_setitem_detaches() {
        let frame = sample();
        let mut shifted = frame
            .column("b")
            .expect("column")
            .bin_value(BinOp::Add, 1i64);
        shifted
            .iloc_set(&Key::Position(0), &AssignValue::from(99i64))
            .expect("assigns");
        assert_eq!(
            shifted.values().expect("values"),
            ints(&[99, 6, 7, 4, 3, 2, 1, 1, 1])
        );
        // the anchor frame is untouched
        assert_eq!(
            frame.column("b").expect("column").values().expect("values"),
            ints(&[4, 5, 6, 3, 2, 1, 0, 0, 0])
        );
    }

    #[test]
    fn set_index_and_reset_round_trip() {
        let frame = DataFrame::from_columns(vec![
            ("year", ints(&[2012, 2014, 2013, 2014])),
            ("sale", ints(&[55, 40, 84, 31])),
        ])
        .expect("frame");
        let indexed = frame.set_index(&["year"], true, false).expect("set_index");
        assert_eq!(indexed.index_names(), vec![Some("year".to_owned())]);
        assert_eq!(indexed.num_columns(), 1);

        let back = indexed.reset_index(None, false).expect("reset");
        assert_eq!(
            back.column_labels(),
            vec![
                vec![IndexLabel::from("year")],
                vec![IndexLabel::from("sale")]
            ]
        );
        assert_eq!(
            back.column("year").expect("column").values().expect("values"),
            ints(&[2012, 2014, 2013, 2014])
        );
        assert_eq!(back.index_names(), vec![None]);
    }

    #[test]
    fn set_index_unknown_column() {
        let frame = sample();
        let err = frame
            .set_index(&["unknown"], true, false)
            .expect_err("must fail");
        assert_eq!(err.to_string(), "key not found: unknown");
        assert_eq!(err.kind(), ErrorKind::Key);
    }

    #[test]
    fn set_index_append_builds_multi_index() {
        let frame = sample();
        let stacked = frame.set_index(&["b"], true, true).expect("append");
        assert_eq!(stacked.nlevels(), 2);
        assert_eq!(stacked.index_names(), vec![None, Some("b".to_owned())]);
        let keys = stacked.index_keys().expect("keys");
        assert_eq!(keys[0], vec![IndexLabel::Int64(0), IndexLabel::Int64(4)]);
    }

    #[test]
    fn reset_index_too_many_levels() {
        let frame = sample()
            .set_index(&["b"], true, false)
            .expect("single level");
        let err = frame
            .reset_index(Some(&[LevelRef::Position(2)]), false)
            .expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Too many levels: Index has only 1 level, not 3"
        );
    }

    #[test]
    fn reset_index_mixed_level_types() {
        let frame = sample();
        let err = frame
            .reset_index(
                Some(&[LevelRef::Position(0), LevelRef::Name("b".to_owned())]),
                false,
            )
            .expect_err("must fail");
        assert_eq!(err.to_string(), "Level should be all int or all string.");
    }

    #[test]
    fn series_reset_index_inplace_needs_drop() {
        let frame = sample();
        let mut a = frame.column("a").expect("column");
        let err = a.reset_index_inplace(false).expect_err("must fail");
        assert_eq!(
            err.to_string(),
            "Cannot reset_index inplace on a Series to create a DataFrame"
        );
        a.reset_index_inplace(true).expect("drops index");
        assert_eq!(
            a.index_keys().expect("keys"),
            (0..9)
                .map(|i| vec![IndexLabel::Int64(i)])
                .collect::<Vec<IndexKey>>()
        );
    }

    #[test]
    fn getitem_column_list_is_strict() {
        let frame = sample();
        let err = frame
            .get(&Key::labels(vec!["a", "x"]))
            .expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::Key);
    }

    #[test]
    fn getitem_position_slice_is_half_open() {
        let frame = sample();
        let sliced = frame
            .get(&Key::position_range(Some(2), Some(5), None))
            .expect("slices")
            .into_frame()
            .expect("frame");
        assert_eq!(
            sliced.column("a").expect("column").values().expect("values"),
            ints(&[3, 4, 5])
        );
        assert_eq!(
            sliced.index_keys().expect("keys"),
            vec![
                vec![IndexLabel::Int64(3)],
                vec![IndexLabel::Int64(5)],
                vec![IndexLabel::Int64(6)]
            ]
        );
    }

    #[test]
    fn full_tuple_selection_installs_positional_index() {
        let frame = sample().set_index(&["b"], true, true).expect("stack");
        let picked = frame
            .loc()
            .get(&[Key::Tuple(vec![IndexLabel::Int64(9), IndexLabel::Int64(0)])])
            .expect("selects")
            .into_frame()
            .expect("frame");
        assert_eq!(
            picked.column("a").expect("column").values().expect("values"),
            ints(&[7, 8, 9])
        );
        assert_eq!(
            picked.index_keys().expect("keys"),
            vec![
                vec![IndexLabel::Int64(0)],
                vec![IndexLabel::Int64(1)],
                vec![IndexLabel::Int64(2)]
            ]
        );
    }
}
