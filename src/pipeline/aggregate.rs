//! Aggregation constructors for [`Pipeline::agg`](super::Pipeline::agg).
//!
//! ```no_run
//! use shellspark::aggregate::{count, sum};
//! use shellspark::{Format, Pipeline};
//!
//! # fn demo() -> shellspark::SparkResult<()> {
//! let cmd = Pipeline::with_format("sales.csv", Format::Csv)
//!     .parse_csv()
//!     .group_by(["region"])?
//!     .agg([("orders", count()), ("quantity", sum("quantity"))])?
//!     .to_shell()?;
//! # Ok(())
//! # }
//! ```

use crate::error::{SparkError, SparkResult};
use crate::plan::{AggFunc, ColumnRef};

/// An aggregation before its alias is attached by `agg()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agg {
    pub(crate) func: AggFunc,
    pub(crate) column: Option<ColumnRef>,
}

impl Agg {
    /// Build from a string function name, for surfaces that carry
    /// aggregations as text (the CLI's `ALIAS=FUNC(COL)` flags).
    /// `column = "*"` with COUNT normalizes to no column.
    pub fn named(column: &str, func: &str) -> SparkResult<Agg> {
        let func = AggFunc::from_name(&func.to_lowercase())
            .ok_or_else(|| SparkError::UnknownAggFunc(func.to_string()))?;
        let column = if column == "*" {
            None
        } else {
            Some(ColumnRef::from(column))
        };
        Ok(Agg { func, column })
    }
}

/// COUNT(*): rows per group.
pub fn count() -> Agg {
    Agg {
        func: AggFunc::Count,
        column: None,
    }
}

/// COUNT over a column.
pub fn count_col(column: impl Into<ColumnRef>) -> Agg {
    Agg {
        func: AggFunc::Count,
        column: Some(column.into()),
    }
}

/// SUM of a numeric column.
pub fn sum(column: impl Into<ColumnRef>) -> Agg {
    Agg {
        func: AggFunc::Sum,
        column: Some(column.into()),
    }
}

/// AVG (mean) of a numeric column.
pub fn avg(column: impl Into<ColumnRef>) -> Agg {
    Agg {
        func: AggFunc::Avg,
        column: Some(column.into()),
    }
}

/// Alias for [`avg`].
pub fn mean(column: impl Into<ColumnRef>) -> Agg {
    avg(column)
}

/// MIN of a numeric column.
pub fn min(column: impl Into<ColumnRef>) -> Agg {
    Agg {
        func: AggFunc::Min,
        column: Some(column.into()),
    }
}

/// MAX of a numeric column.
pub fn max(column: impl Into<ColumnRef>) -> Agg {
    Agg {
        func: AggFunc::Max,
        column: Some(column.into()),
    }
}

/// First value seen per group.
pub fn first(column: impl Into<ColumnRef>) -> Agg {
    Agg {
        func: AggFunc::First,
        column: Some(column.into()),
    }
}

/// Last value seen per group.
pub fn last(column: impl Into<ColumnRef>) -> Agg {
    Agg {
        func: AggFunc::Last,
        column: Some(column.into()),
    }
}

/// Count of distinct values per group.
pub fn count_distinct(column: impl Into<ColumnRef>) -> Agg {
    Agg {
        func: AggFunc::CountDistinct,
        column: Some(column.into()),
    }
}
