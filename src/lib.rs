//! # ShellSpark
//!
//! Compiles declarative, method-chained data transformations over
//! text/CSV/JSON files into single POSIX shell pipelines built from the
//! standard line-oriented tools (grep/ripgrep, awk/mawk/gawk, sort,
//! head, tail, find, xargs, jq), then executes them.
//!
//! User code describes *what* to transform; the compiler decides *how*:
//! it picks the right tool per subtree, fuses adjacent operations into
//! one invocation, and pushes filters toward the source.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Pipeline builder
//!     ↓
//! [Plan IR]              → immutable PlanNode tree
//!     ↓
//! [Optimizer]            → filter pushdown, redundancy elimination,
//!     ↓                    limit merging
//! [Code Generator]       → backend per subtree (grep / awk / jq /
//!     ↓                    sort-chain / parallel wrap), fused stages
//! shell command string
//!     ↓
//! [Executor]             → sh -c, captured streams
//!     ↓
//! Results (lines / records / JSON values)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use shellspark::aggregate::{count, sum};
//! use shellspark::{FilterOp, Format, Pipeline, SortOrder};
//!
//! // grep -F 'ERROR' 'access.log'
//! let errors = Pipeline::new("access.log")
//!     .filter_line(FilterOp::Contains, "ERROR")
//!     .run()?;
//!
//! // One fused awk stage, then a sort stage:
//! let by_region = Pipeline::with_format("sales.csv", Format::Csv)
//!     .parse_csv()
//!     .filter("quantity", FilterOp::Gt, 0)
//!     .group_by(["region"])?
//!     .agg([("orders", count()), ("quantity", sum("quantity"))])?
//!     .sort("quantity", SortOrder::Desc, true)
//!     .to_shell()?;
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `plan` | Plan IR: node tree, enums, walking, hashing |
//! | `pipeline` | Fluent builder + execution surface |
//! | `optimizer` | Rule-based plan rewrites |
//! | `format` | Per-format field separators and field references |
//! | `codegen` | Backend dispatch, fusion, shell command assembly |
//! | `tools` | Tool capability probe (memoized) |
//! | `executor` | `sh -c` execution with captured streams |
//! | `output` | Structured output deserialization |
//! | `config` | figment-based configuration |

pub mod codegen;
pub mod config;
pub mod error;
pub mod executor;
pub mod format;
pub mod optimizer;
pub mod output;
pub mod pipeline;
pub mod plan;
pub mod tools;

pub use codegen::{clear_command_cache, compile, set_command_cache_capacity};
pub use config::Config;
pub use error::{SparkError, SparkResult};
pub use executor::{CommandStream, ExecutionResult};
pub use optimizer::QueryOptimizer;
pub use output::{Record, Value};
pub use pipeline::aggregate;
pub use pipeline::{Pipeline, RunOutput};
pub use plan::{
    AggFunc, Aggregation, ColumnRef, FilterOp, FilterValue, Format, JoinKind, PlanNode,
    SortOrder,
};
pub use tools::{clear_tool_cache, ToolInfo};
