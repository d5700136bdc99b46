#![forbid(unsafe_code)]

//! In-process facade over the columnar query engine.
//!
//! The indexing layers above only ever build [`Plan`] trees; nothing runs
//! until [`Plan::collect`] is called. This mirrors a deferred distributed
//! engine: storage has no inherent row order, so callers that care about
//! order carry an explicit row-number field through the plan.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wb_types::{common_dtype, infer_dtype, DType, Scalar, TypeError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanError {
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("duplicate field: {0}")]
    DuplicateField(String),
    #[error("field {field} has length {actual}, expected {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },
    #[error("filter predicate must be boolean; found dtype {0:?}")]
    NonBooleanPredicate(DType),
    #[error("cannot apply {op} to dtypes {left:?} and {right:?}")]
    InvalidOperand {
        op: &'static str,
        left: DType,
        right: DType,
    },
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// A dtype-homogeneous vector of cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    dtype: DType,
    values: Vec<Scalar>,
}

impl Column {
    pub fn from_values(values: Vec<Scalar>) -> Result<Self, PlanError> {
        let dtype = infer_dtype(&values)?;
        Ok(Self { dtype, values })
    }

    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    #[must_use]
    pub fn take(&self, positions: &[usize]) -> Self {
        Self {
            dtype: self.dtype,
            values: positions.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }

}

/// An ordered set of uniquely named, equal-length columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    fields: Vec<(String, Column)>,
}

impl Table {
    pub fn new(fields: Vec<(String, Column)>) -> Result<Self, PlanError> {
        let mut seen = BTreeSet::new();
        for (name, _) in &fields {
            if !seen.insert(name.clone()) {
                return Err(PlanError::DuplicateField(name.clone()));
            }
        }
        if let Some((first_name, first)) = fields.first() {
            let expected = first.len();
            let _ = first_name;
            for (name, column) in &fields {
                if column.len() != expected {
                    return Err(PlanError::LengthMismatch {
                        field: name.clone(),
                        expected,
                        actual: column.len(),
                    });
                }
            }
        }
        Ok(Self { fields })
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.fields.first().map_or(0, |(_, c)| c.len())
    }

    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Result<&Column, PlanError> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
            .ok_or_else(|| PlanError::UnknownField(name.to_owned()))
    }

    fn take(&self, positions: &[usize]) -> Self {
        Self {
            fields: self
                .fields
                .iter()
                .map(|(n, c)| (n.clone(), c.take(positions)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// A column expression evaluated row-wise at collect time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Col { name: String },
    Lit { value: Scalar },
    Cmp { op: CmpOp, left: Box<Expr>, right: Box<Expr> },
    Bin { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Neg { expr: Box<Expr> },
    And { left: Box<Expr>, right: Box<Expr> },
    Or { left: Box<Expr>, right: Box<Expr> },
    Not { expr: Box<Expr> },
    IsIn { expr: Box<Expr>, values: Vec<Scalar> },
    When { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
}

impl Expr {
    #[must_use]
    pub fn col(name: impl Into<String>) -> Self {
        Self::Col { name: name.into() }
    }

    #[must_use]
    pub fn lit(value: impl Into<Scalar>) -> Self {
        Self::Lit { value: value.into() }
    }

    #[must_use]
    pub fn cmp(self, op: CmpOp, right: Self) -> Self {
        Self::Cmp {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn bin(self, op: BinOp, right: Self) -> Self {
        Self::Bin {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn neg(self) -> Self {
        Self::Neg { expr: Box::new(self) }
    }

    #[must_use]
    pub fn and(self, right: Self) -> Self {
        Self::And {
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn or(self, right: Self) -> Self {
        Self::Or {
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn not(self) -> Self {
        Self::Not { expr: Box::new(self) }
    }

    #[must_use]
    pub fn is_in(self, values: Vec<Scalar>) -> Self {
        Self::IsIn {
            expr: Box::new(self),
            values,
        }
    }

    #[must_use]
    pub fn when(cond: Self, then: Self, otherwise: Self) -> Self {
        Self::When {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }
}

/// An immutable logical plan node. Plans share subtrees through `Arc` and are
/// never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Plan {
    Source { table: Arc<Table> },
    Filter { input: Arc<Plan>, predicate: Expr },
    Project { input: Arc<Plan>, exprs: Vec<(String, Expr)> },
    Sort { input: Arc<Plan>, by: Vec<String>, ascending: bool },
    WithRowNumber { input: Arc<Plan>, name: String },
}

impl Plan {
    #[must_use]
    pub fn source(table: Table) -> Self {
        Self::Source {
            table: Arc::new(table),
        }
    }

    #[must_use]
    pub fn filter(&self, predicate: Expr) -> Self {
        Self::Filter {
            input: Arc::new(self.clone()),
            predicate,
        }
    }

    /// Projection covers select / with_column / drop_column: the output has
    /// exactly the named expressions, in order.
    #[must_use]
    pub fn project(&self, exprs: Vec<(String, Expr)>) -> Self {
        Self::Project {
            input: Arc::new(self.clone()),
            exprs,
        }
    }

    #[must_use]
    pub fn sort(&self, by: Vec<String>, ascending: bool) -> Self {
        Self::Sort {
            input: Arc::new(self.clone()),
            by,
            ascending,
        }
    }

    /// Stable ordinal assignment over the plan's current order.
    #[must_use]
    pub fn with_row_number(&self, name: impl Into<String>) -> Self {
        Self::WithRowNumber {
            input: Arc::new(self.clone()),
            name: name.into(),
        }
    }

    /// Execute the plan. This is the only materializing boundary.
    pub fn collect(&self) -> Result<Table, PlanError> {
        match self {
            Self::Source { table } => Ok(table.as_ref().clone()),
            Self::Filter { input, predicate } => {
                let table = input.collect()?;
                let mask = eval(predicate, &table)?;
                if !matches!(mask.dtype(), DType::Bool | DType::Null) {
                    return Err(PlanError::NonBooleanPredicate(mask.dtype()));
                }
                let keep: Vec<usize> = mask
                    .values()
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| matches!(v, Scalar::Bool(true)))
                    .map(|(i, _)| i)
                    .collect();
                log::debug!(
                    "filter kept {} of {} rows",
                    keep.len(),
                    table.num_rows()
                );
                Ok(table.take(&keep))
            }
            Self::Project { input, exprs } => {
                let table = input.collect()?;
                let mut fields = Vec::with_capacity(exprs.len());
                for (name, expr) in exprs {
                    fields.push((name.clone(), eval(expr, &table)?));
                }
                Table::new(fields)
            }
            Self::Sort { input, by, ascending } => {
                let table = input.collect()?;
                let keys: Vec<&Column> = by
                    .iter()
                    .map(|name| table.column(name))
                    .collect::<Result<_, _>>()?;
                let mut order: Vec<usize> = (0..table.num_rows()).collect();
                order.sort_by(|&a, &b| {
                    for key in &keys {
                        let cmp = compare_cells(&key.values()[a], &key.values()[b]);
                        if cmp != Ordering::Equal {
                            return if *ascending { cmp } else { cmp.reverse() };
                        }
                    }
                    Ordering::Equal
                });
                Ok(table.take(&order))
            }
            Self::WithRowNumber { input, name } => {
                let table = input.collect()?;
                let ordinals: Vec<Scalar> =
                    (0..table.num_rows() as i64).map(Scalar::Int64).collect();
                let mut fields = table.fields.clone();
                fields.push((name.clone(), Column::from_values(ordinals)?));
                Table::new(fields)
            }
        }
    }

    /// Realized row count. Collect-based; callers treat it as an engine job.
    pub fn count(&self) -> Result<usize, PlanError> {
        Ok(self.collect()?.num_rows())
    }
}

/// Missing-aware cell ordering: missing sorts last, mixed dtypes order by dtype.
fn compare_cells(left: &Scalar, right: &Scalar) -> Ordering {
    match (left.is_missing(), right.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match (left, right) {
            (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
            (Scalar::Int64(a), Scalar::Int64(b)) => a.cmp(b),
            (Scalar::Utf8(a), Scalar::Utf8(b)) => a.cmp(b),
            (Scalar::Float64(a), Scalar::Float64(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Scalar::Int64(a), Scalar::Float64(b)) => (*a as f64)
                .partial_cmp(b)
                .unwrap_or(Ordering::Equal),
            (Scalar::Float64(a), Scalar::Int64(b)) => a
                .partial_cmp(&(*b as f64))
                .unwrap_or(Ordering::Equal),
            _ => left.dtype().cmp(&right.dtype()),
        },
    }
}

fn compare_for_cmp(left: &Scalar, right: &Scalar) -> Option<Ordering> {
    if left.is_missing() || right.is_missing() {
        return None;
    }
    match (left, right) {
        (Scalar::Utf8(a), Scalar::Utf8(b)) => Some(a.cmp(b)),
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Scalar::Utf8(_), _) | (_, Scalar::Utf8(_)) => None,
        (Scalar::Bool(_), _) | (_, Scalar::Bool(_)) => None,
        _ => {
            let a = left.to_f64().ok()?;
            let b = right.to_f64().ok()?;
            a.partial_cmp(&b)
        }
    }
}

fn numeric_bin(op: BinOp, left: &Scalar, right: &Scalar) -> Result<Scalar, PlanError> {
    if left.is_missing() || right.is_missing() {
        return Ok(Scalar::Null);
    }

    if let (Scalar::Int64(a), Scalar::Int64(b)) = (left, right) {
        let out = match op {
            BinOp::Add => a.checked_add(*b),
            BinOp::Sub => a.checked_sub(*b),
            BinOp::Mul => a.checked_mul(*b),
            BinOp::Div => {
                // Integer division promotes, matching pandas truediv.
                return Ok(if *b == 0 {
                    Scalar::Null
                } else {
                    Scalar::Float64(*a as f64 / *b as f64)
                });
            }
            BinOp::Mod => {
                if *b == 0 {
                    None
                } else {
                    Some(a.rem_euclid(*b))
                }
            }
        };
        return Ok(out.map_or(Scalar::Null, Scalar::Int64));
    }

    let a = left.to_f64().map_err(|_| PlanError::InvalidOperand {
        op: bin_op_name(op),
        left: left.dtype(),
        right: right.dtype(),
    })?;
    let b = right.to_f64().map_err(|_| PlanError::InvalidOperand {
        op: bin_op_name(op),
        left: left.dtype(),
        right: right.dtype(),
    })?;
    let out = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Mod => a.rem_euclid(b),
    };
    Ok(Scalar::Float64(out))
}

fn bin_op_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Mod => "mod",
    }
}

fn bool_cell(value: &Scalar) -> Option<bool> {
    match value {
        Scalar::Bool(v) => Some(*v),
        _ => None,
    }
}

/// Evaluate an expression against a realized table, producing one cell per row.
pub fn eval(expr: &Expr, table: &Table) -> Result<Column, PlanError> {
    let n = table.num_rows();
    match expr {
        Expr::Col { name } => table.column(name).cloned(),
        Expr::Lit { value } => Column::from_values(vec![value.clone(); n]),
        Expr::Cmp { op, left, right } => {
            let l = eval(left, table)?;
            let r = eval(right, table)?;
            let values = l
                .values()
                .iter()
                .zip(r.values().iter())
                .map(|(a, b)| match compare_for_cmp(a, b) {
                    None => {
                        if a.is_missing() || b.is_missing() {
                            Scalar::Null
                        } else {
                            // Cross-dtype comparisons: only equality is defined.
                            match op {
                                CmpOp::Eq => Scalar::Bool(false),
                                CmpOp::Ne => Scalar::Bool(true),
                                _ => Scalar::Null,
                            }
                        }
                    }
                    Some(ord) => {
                        let hit = match op {
                            CmpOp::Eq => ord == Ordering::Equal,
                            CmpOp::Ne => ord != Ordering::Equal,
                            CmpOp::Lt => ord == Ordering::Less,
                            CmpOp::Le => ord != Ordering::Greater,
                            CmpOp::Gt => ord == Ordering::Greater,
                            CmpOp::Ge => ord != Ordering::Less,
                        };
                        Scalar::Bool(hit)
                    }
                })
                .collect();
            Column::from_values(values)
        }
        Expr::Bin { op, left, right } => {
            let l = eval(left, table)?;
            let r = eval(right, table)?;
            let values = l
                .values()
                .iter()
                .zip(r.values().iter())
                .map(|(a, b)| numeric_bin(*op, a, b))
                .collect::<Result<_, _>>()?;
            Column::from_values(values)
        }
        Expr::Neg { expr } => {
            let input = eval(expr, table)?;
            let values = input
                .values()
                .iter()
                .map(|v| numeric_bin(BinOp::Sub, &Scalar::Int64(0), v))
                .collect::<Result<_, _>>()?;
            Column::from_values(values)
        }
        Expr::And { left, right } => {
            let l = eval(left, table)?;
            let r = eval(right, table)?;
            let values = l
                .values()
                .iter()
                .zip(r.values().iter())
                .map(|(a, b)| match (bool_cell(a), bool_cell(b)) {
                    (Some(false), _) | (_, Some(false)) => Scalar::Bool(false),
                    (Some(true), Some(true)) => Scalar::Bool(true),
                    _ => Scalar::Null,
                })
                .collect();
            Column::from_values(values)
        }
        Expr::Or { left, right } => {
            let l = eval(left, table)?;
            let r = eval(right, table)?;
            let values = l
                .values()
                .iter()
                .zip(r.values().iter())
                .map(|(a, b)| match (bool_cell(a), bool_cell(b)) {
                    (Some(true), _) | (_, Some(true)) => Scalar::Bool(true),
                    (Some(false), Some(false)) => Scalar::Bool(false),
                    _ => Scalar::Null,
                })
                .collect();
            Column::from_values(values)
        }
        Expr::Not { expr } => {
            let input = eval(expr, table)?;
            let values = input
                .values()
                .iter()
                .map(|v| match bool_cell(v) {
                    Some(b) => Scalar::Bool(!b),
                    None => Scalar::Null,
                })
                .collect();
            Column::from_values(values)
        }
        Expr::IsIn { expr, values: members } => {
            let input = eval(expr, table)?;
            let values = input
                .values()
                .iter()
                .map(|v| {
                    if v.is_missing() {
                        Scalar::Null
                    } else {
                        Scalar::Bool(members.iter().any(|m| {
                            compare_for_cmp(v, m) == Some(Ordering::Equal)
                        }))
                    }
                })
                .collect();
            Column::from_values(values)
        }
        Expr::When { cond, then, otherwise } => {
            let c = eval(cond, table)?;
            let t = eval(then, table)?;
            let o = eval(otherwise, table)?;
            // Branch dtypes must be coercible so the output stays homogeneous.
            let _ = common_dtype(t.dtype(), o.dtype())?;
            let values = c
                .values()
                .iter()
                .zip(t.values().iter().zip(o.values().iter()))
                .map(|(cv, (tv, ov))| {
                    if matches!(cv, Scalar::Bool(true)) {
                        tv.clone()
                    } else {
                        ov.clone()
                    }
                })
                .collect();
            Column::from_values(values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BinOp, CmpOp, Column, Expr, Plan, PlanError, Table};
    use wb_types::Scalar;

    fn table() -> Table {
        Table::new(vec![
            (
                "a".to_owned(),
                Column::from_values(vec![
                    Scalar::Int64(1),
                    Scalar::Int64(2),
                    Scalar::Int64(3),
                    Scalar::Int64(4),
                ])
                .expect("column"),
            ),
            (
                "b".to_owned(),
                Column::from_values(vec![
                    Scalar::Utf8("w".into()),
                    Scalar::Utf8("x".into()),
                    Scalar::Utf8("y".into()),
                    Scalar::Utf8("z".into()),
                ])
                .expect("column"),
            ),
        ])
        .expect("table")
    }

    fn int_values(column: &Column) -> Vec<i64> {
        column
            .values()
            .iter()
            .map(|v| match v {
                Scalar::Int64(i) => *i,
                other => panic!("expected Int64, got {other:?}"),
            })
            .collect()
    }

    #[test]
    fn filter_keeps_matching_rows() {
        let plan = Plan::source(table()).filter(Expr::col("a").cmp(CmpOp::Gt, Expr::lit(2_i64)));
        let out = plan.collect().expect("collect");
        assert_eq!(int_values(out.column("a").expect("a")), vec![3, 4]);
    }

    #[test]
    fn filter_rejects_non_boolean_predicate() {
        let plan = Plan::source(table()).filter(Expr::col("a"));
        let err = plan.collect().expect_err("must fail");
        assert!(matches!(err, PlanError::NonBooleanPredicate(_)));
    }

    #[test]
    fn project_renames_and_computes() {
        let plan = Plan::source(table()).project(vec![
            ("a2".to_owned(), Expr::col("a").bin(BinOp::Mul, Expr::lit(2_i64))),
        ]);
        let out = plan.collect().expect("collect");
        assert_eq!(out.field_names(), vec!["a2"]);
        assert_eq!(int_values(out.column("a2").expect("a2")), vec![2, 4, 6, 8]);
    }

    #[test]
    fn sort_descending_reverses() {
        let plan = Plan::source(table()).sort(vec!["a".to_owned()], false);
        let out = plan.collect().expect("collect");
        assert_eq!(int_values(out.column("a").expect("a")), vec![4, 3, 2, 1]);
    }

    #[test]
    fn row_number_tracks_current_order() {
        let plan = Plan::source(table())
            .sort(vec!["a".to_owned()], false)
            .with_row_number("seq");
        let out = plan.collect().expect("collect");
        assert_eq!(int_values(out.column("seq").expect("seq")), vec![0, 1, 2, 3]);
        assert_eq!(int_values(out.column("a").expect("a")), vec![4, 3, 2, 1]);
    }

    #[test]
    fn modulo_supports_parity_masks() {
        let parity = Expr::col("a")
            .bin(BinOp::Mod, Expr::lit(2_i64))
            .cmp(CmpOp::Eq, Expr::lit(0_i64));
        let plan = Plan::source(table()).filter(parity);
        let out = plan.collect().expect("collect");
        assert_eq!(int_values(out.column("a").expect("a")), vec![2, 4]);
    }

    #[test]
    fn when_overwrites_conditionally() {
        let expr = Expr::when(
            Expr::col("a").cmp(CmpOp::Lt, Expr::lit(3_i64)),
            Expr::lit(0_i64),
            Expr::col("a"),
        );
        let plan = Plan::source(table()).project(vec![("a".to_owned(), expr)]);
        let out = plan.collect().expect("collect");
        assert_eq!(int_values(out.column("a").expect("a")), vec![0, 0, 3, 4]);
    }

    #[test]
    fn is_in_membership() {
        let plan = Plan::source(table()).filter(
            Expr::col("b").is_in(vec![Scalar::Utf8("x".into()), Scalar::Utf8("z".into())]),
        );
        let out = plan.collect().expect("collect");
        assert_eq!(int_values(out.column("a").expect("a")), vec![2, 4]);
    }

    #[test]
    fn null_propagates_through_comparisons() {
        let t = Table::new(vec![(
            "a".to_owned(),
            Column::from_values(vec![Scalar::Int64(1), Scalar::Null]).expect("column"),
        )])
        .expect("table");
        let plan = Plan::source(t).filter(Expr::col("a").cmp(CmpOp::Gt, Expr::lit(0_i64)));
        let out = plan.collect().expect("collect");
        assert_eq!(out.num_rows(), 1);
    }

    #[test]
    fn count_reports_realized_rows() {
        let plan = Plan::source(table()).filter(Expr::col("a").cmp(CmpOp::Le, Expr::lit(2_i64)));
        assert_eq!(plan.count().expect("count"), 2);
    }

    #[test]
    fn duplicate_fields_rejected() {
        let col = Column::from_values(vec![Scalar::Int64(1)]).expect("column");
        let err = Table::new(vec![("a".to_owned(), col.clone()), ("a".to_owned(), col)])
            .expect_err("must fail");
        assert!(matches!(err, PlanError::DuplicateField(_)));
    }
}
