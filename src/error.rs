//! ShellSpark Error Types

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by pipeline construction, compilation, and execution
#[derive(Error, Debug)]
pub enum SparkError {
    /// select() called with no columns
    #[error("select() requires at least one column")]
    EmptySelect,

    /// group_by() called with no key columns
    #[error("group_by() requires at least one column")]
    EmptyGroupBy,

    /// agg() called without a preceding group_by()
    #[error("agg() must be called after group_by()")]
    AggWithoutGroupBy,

    /// agg() called with no aggregations
    #[error("agg() requires at least one aggregation")]
    EmptyAgg,

    /// Two aggregations in one group_by share an alias
    #[error("duplicate aggregation alias '{0}'")]
    DuplicateAlias(String),

    /// Unrecognized filter operation name
    #[error(
        "unknown filter operation '{0}'. Supported: eq, ne, lt, le, lte, gt, ge, gte, \
         contains, regex, startswith, endswith"
    )]
    UnknownFilterOp(String),

    /// Unrecognized aggregation function name
    #[error(
        "unknown aggregation function '{0}'. Supported: count, sum, avg, mean, min, max, \
         first, last, countdistinct"
    )]
    UnknownAggFunc(String),

    /// limit() called with a zero row count
    #[error("limit count must be >= 1")]
    ZeroLimit,

    /// parallel() wrapped an operation that needs global state
    #[error("cannot parallelize a pipeline with {op}. {reason}")]
    ParallelConflict {
        op: &'static str,
        reason: &'static str,
    },

    /// A column name could not be mapped to a concrete field
    #[error("cannot resolve column '{column}': {reason}")]
    ColumnResolution { column: String, reason: String },

    /// A backend tool required by the plan is not installed
    #[error("required tool '{tool}' not found. {hint}")]
    MissingTool { tool: String, hint: String },

    /// The code generator cannot express the plan
    #[error("cannot generate code: {0}")]
    Compile(String),

    /// The emitted pipeline exited non-zero with diagnostics on stderr
    #[error("command failed with exit code {status}: {stderr}")]
    Execution { status: i32, stderr: String },

    /// The emitted pipeline exceeded its execution deadline
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// jq output line was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for ShellSpark operations
pub type SparkResult<T> = Result<T, SparkError>;
