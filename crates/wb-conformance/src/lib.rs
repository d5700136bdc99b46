#![forbid(unsafe_code)]

//! Shared fixtures for the indexing conformance suites.
//!
//! Every fixture mirrors a frame the reference behavior was pinned against,
//! so the end-to-end tests can assert exact values rather than shapes.

use wb_frame::{DataFrame, FrameError, Series};
use wb_index::{IndexKey, IndexLabel};
use wb_types::Scalar;

pub fn ints(values: &[i64]) -> Vec<Scalar> {
    values.iter().map(|&v| Scalar::Int64(v)).collect()
}

pub fn int_labels(values: &[i64]) -> Vec<IndexLabel> {
    values.iter().map(|&v| IndexLabel::Int64(v)).collect()
}

pub fn str_labels(values: &[&str]) -> Vec<IndexLabel> {
    values.iter().map(|&v| IndexLabel::from(v)).collect()
}

/// The canonical two-column frame: a duplicated, non-contiguous but
/// monotonic integer index with three rows labeled 9.
///
/// ```text
///    a  b
/// 0  1  4
/// 1  2  5
/// 3  3  6
/// 5  4  3
/// 6  5  2
/// 8  6  1
/// 9  7  0
/// 9  8  0
/// 9  9  0
/// ```
pub fn canonical_frame() -> Result<DataFrame, FrameError> {
    DataFrame::from_columns_with_index(
        vec![
            ("a", ints(&[1, 2, 3, 4, 5, 6, 7, 8, 9])),
            ("b", ints(&[4, 5, 6, 3, 2, 1, 0, 0, 0])),
        ],
        None,
        int_labels(&[0, 1, 3, 5, 6, 8, 9, 9, 9]),
    )
}

pub fn canonical_series() -> Result<Series, FrameError> {
    canonical_frame()?.column("a")
}

/// A frame whose index is out of order, for ordinal-block slice scenarios.
pub fn shuffled_frame() -> Result<DataFrame, FrameError> {
    DataFrame::from_columns_with_index(
        vec![("a", ints(&[10, 20, 30, 40, 50]))],
        None,
        int_labels(&[2, 1, 5, 0, 3]),
    )
}

/// A two-level row index lexsorted to full depth.
pub fn multi_index_frame() -> Result<DataFrame, FrameError> {
    DataFrame::new(
        vec![(vec![IndexLabel::from("a")], ints(&[1, 2, 3, 4]))],
        vec![
            (Some("x".to_owned()), str_labels(&["bar", "bar", "baz", "baz"])),
            (Some("y".to_owned()), int_labels(&[1, 2, 1, 2])),
        ],
    )
}

/// A two-level row index lexsorted only on the first level.
pub fn partially_sorted_frame() -> Result<DataFrame, FrameError> {
    DataFrame::new(
        vec![(vec![IndexLabel::from("a")], ints(&[1, 2, 3, 4]))],
        vec![
            (Some("x".to_owned()), str_labels(&["bar", "bar", "baz", "baz"])),
            (Some("y".to_owned()), int_labels(&[2, 1, 1, 2])),
        ],
    )
}

/// Two-level column labels, lexsorted only on the first level.
pub fn multi_column_frame() -> Result<DataFrame, FrameError> {
    let bar_two: IndexKey = vec![IndexLabel::from("bar"), IndexLabel::from("two")];
    let bar_one: IndexKey = vec![IndexLabel::from("bar"), IndexLabel::from("one")];
    let baz_one: IndexKey = vec![IndexLabel::from("baz"), IndexLabel::from("one")];
    let baz_two: IndexKey = vec![IndexLabel::from("baz"), IndexLabel::from("two")];
    DataFrame::new(
        vec![
            (bar_two, ints(&[1, 2, 3])),
            (bar_one, ints(&[4, 5, 6])),
            (baz_one, ints(&[7, 8, 9])),
            (baz_two, ints(&[10, 11, 12])),
        ],
        vec![(None, int_labels(&[0, 1, 2]))],
    )
}

/// Two-level column labels lexsorted to full depth, for column slices.
pub fn sorted_multi_column_frame() -> Result<DataFrame, FrameError> {
    let bar_one: IndexKey = vec![IndexLabel::from("bar"), IndexLabel::from("one")];
    let bar_two: IndexKey = vec![IndexLabel::from("bar"), IndexLabel::from("two")];
    let baz_one: IndexKey = vec![IndexLabel::from("baz"), IndexLabel::from("one")];
    let baz_two: IndexKey = vec![IndexLabel::from("baz"), IndexLabel::from("two")];
    DataFrame::new(
        vec![
            (bar_one, ints(&[1, 2, 3])),
            (bar_two, ints(&[4, 5, 6])),
            (baz_one, ints(&[7, 8, 9])),
            (baz_two, ints(&[10, 11, 12])),
        ],
        vec![(None, int_labels(&[0, 1, 2]))],
    )
}

/// The sales table used by the index reshaping scenarios.
pub fn sales_frame() -> Result<DataFrame, FrameError> {
    DataFrame::from_columns(vec![
        ("month", ints(&[1, 4, 7, 10])),
        ("year", ints(&[2012, 2014, 2013, 2014])),
        ("sale", ints(&[55, 40, 84, 31])),
    ])
}
