use arrow::array::{BooleanArray, Int64Array, Scalar};
use arrow::compute::kernels::cmp;
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use common_error::{FloeError, FloeResult};

use crate::Error;

/// Minimal filter dialect for the in-memory backend: `true`, `false`, or a
/// single `<column> <cmp> <integer>` comparison. Real format backends bring
/// their own filter language; this one exists so scans with row filters are
/// exercisable end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Predicate {
    Literal(bool),
    Compare {
        column: String,
        op: CompareOp,
        value: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl Predicate {
    pub(crate) fn parse(expression: &str) -> Result<Self, Error> {
        let tokens: Vec<&str> = expression.split_whitespace().collect();
        match tokens.as_slice() {
            ["true"] => Ok(Self::Literal(true)),
            ["false"] => Ok(Self::Literal(false)),
            [column, op, literal] => {
                let op = match *op {
                    "=" | "==" => CompareOp::Eq,
                    "!=" | "<>" => CompareOp::NotEq,
                    "<" => CompareOp::Lt,
                    "<=" => CompareOp::LtEq,
                    ">" => CompareOp::Gt,
                    ">=" => CompareOp::GtEq,
                    other => {
                        return Err(Error::InvalidFilter {
                            expression: expression.to_string(),
                            reason: format!("unknown comparison operator \"{other}\""),
                        })
                    }
                };
                let value = literal.parse::<i64>().map_err(|_| Error::InvalidFilter {
                    expression: expression.to_string(),
                    reason: format!("expected an integer literal, got \"{literal}\""),
                })?;
                Ok(Self::Compare {
                    column: (*column).to_string(),
                    op,
                    value,
                })
            }
            _ => Err(Error::InvalidFilter {
                expression: expression.to_string(),
                reason: "expected `true`, `false`, or `<column> <cmp> <integer>`".to_string(),
            }),
        }
    }

    pub(crate) fn apply(&self, batch: &RecordBatch) -> FloeResult<RecordBatch> {
        match self {
            Self::Literal(true) => Ok(batch.clone()),
            Self::Literal(false) => Ok(batch.slice(0, 0)),
            Self::Compare { column, op, value } => {
                let column = batch.column_by_name(column).ok_or_else(|| {
                    FloeError::FieldNotFound(format!(
                        "filter column \"{column}\" not found in batch schema"
                    ))
                })?;
                let column = cast(column.as_ref(), &DataType::Int64)?;
                let rhs = Scalar::new(Int64Array::from(vec![*value]));
                let mask: BooleanArray = match op {
                    CompareOp::Eq => cmp::eq(&column, &rhs)?,
                    CompareOp::NotEq => cmp::neq(&column, &rhs)?,
                    CompareOp::Lt => cmp::lt(&column, &rhs)?,
                    CompareOp::LtEq => cmp::lt_eq(&column, &rhs)?,
                    CompareOp::Gt => cmp::gt(&column, &rhs)?,
                    CompareOp::GtEq => cmp::gt_eq(&column, &rhs)?,
                };
                Ok(filter_record_batch(batch, &mask)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::Int64Array;
    use arrow::datatypes::{Field, Schema};
    use rstest::rstest;

    use super::*;

    fn batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        RecordBatch::try_new(
            schema,
            vec![Arc::new(Int64Array::from_iter_values(0..10))],
        )
        .unwrap()
    }

    #[rstest]
    #[case("id = 3", 1)]
    #[case("id == 3", 1)]
    #[case("id != 3", 9)]
    #[case("id < 3", 3)]
    #[case("id <= 3", 4)]
    #[case("id > 3", 6)]
    #[case("id >= 3", 7)]
    #[case("true", 10)]
    #[case("false", 0)]
    fn comparisons_select_expected_rows(#[case] expression: &str, #[case] expected: usize) {
        let predicate = Predicate::parse(expression).unwrap();
        let filtered = predicate.apply(&batch()).unwrap();
        assert_eq!(filtered.num_rows(), expected);
    }

    #[rstest]
    #[case("id ~ 3")]
    #[case("id = three")]
    #[case("id =")]
    #[case("")]
    fn malformed_expressions_are_rejected(#[case] expression: &str) {
        let err = Predicate::parse(expression).unwrap_err();
        assert!(matches!(err, Error::InvalidFilter { .. }));
    }

    #[test]
    fn unknown_filter_column_is_reported() {
        let predicate = Predicate::parse("missing = 1").unwrap();
        let err = predicate.apply(&batch()).unwrap_err();
        assert!(matches!(err, FloeError::FieldNotFound(_)));
    }
}
