//! # Pipeline Builder
//!
//! Fluent surface for assembling plan trees, plus the execution
//! entry points.
//!
//! ```text
//! Pipeline::new("access.log").filter_line(Contains, "ERROR").to_shell()
//!     => grep -F 'ERROR' 'access.log'
//! ```
//!
//! Each method stacks one plan node on the root (group_by is the
//! exception: it records pending keys that the next `agg` call resolves
//! into a single `GroupBy`). Malformed constructions fail at the call
//! site, not at compile time. `to_shell` optimizes, generates, and
//! memoizes the command keyed by the plan hash and the detected
//! awk/grep paths.

pub mod aggregate;

use std::path::Path;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::codegen::{self, cached_command, store_command, CacheKey};
use crate::error::{SparkError, SparkResult};
use crate::executor::{self, CommandStream, ExecutionResult};
use crate::format;
use crate::optimizer::QueryOptimizer;
use crate::output::{parse_json_lines, parse_records, Record};
use crate::plan::{
    Aggregation, ColumnRef, FilterOp, FilterValue, Format, PlanNode, SortOrder,
};
use crate::tools;

use aggregate::Agg;

/// Builder for data-transformation pipelines compiled to shell commands.
#[derive(Debug, Clone)]
pub struct Pipeline {
    root: PlanNode,
    pending_group_keys: Option<Vec<ColumnRef>>,
}

/// Deserialized output of [`Pipeline::run`], shaped by the plan.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    /// Raw lines from text pipelines
    Lines(Vec<String>),
    /// Structured rows from group-by pipelines
    Records(Vec<Record>),
    /// Parsed objects from jq pipelines
    Json(Vec<JsonValue>),
}

impl RunOutput {
    pub fn lines(&self) -> Option<&[String]> {
        match self {
            RunOutput::Lines(lines) => Some(lines),
            _ => None,
        }
    }

    pub fn records(&self) -> Option<&[Record]> {
        match self {
            RunOutput::Records(records) => Some(records),
            _ => None,
        }
    }

    pub fn json(&self) -> Option<&[JsonValue]> {
        match self {
            RunOutput::Json(values) => Some(values),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RunOutput::Lines(v) => v.len(),
            RunOutput::Records(v) => v.len(),
            RunOutput::Json(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Pipeline {
    /// Start a pipeline over a line-oriented text file.
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_format(path, Format::Text)
    }

    /// Start a pipeline with an explicit source format.
    pub fn with_format(path: impl Into<String>, format: Format) -> Self {
        Pipeline {
            root: PlanNode::Source {
                path: path.into(),
                format,
            },
            pending_group_keys: None,
        }
    }

    /// Bind a parse format: delimiter and header handling for csv,
    /// record-per-line for json.
    pub fn parse(mut self, format: Format, delimiter: &str, header: bool) -> Self {
        self.root = PlanNode::Parse {
            child: Box::new(self.root),
            format,
            delimiter: delimiter.to_string(),
            has_header: header,
        };
        self
    }

    /// Comma-separated csv with a header row.
    pub fn parse_csv(self) -> Self {
        self.parse(Format::Csv, ",", true)
    }

    /// Newline-delimited JSON.
    pub fn parse_json(self) -> Self {
        self.parse(Format::Json, ",", false)
    }

    /// Column-qualified filter.
    pub fn filter(
        self,
        column: impl Into<ColumnRef>,
        op: FilterOp,
        value: impl Into<FilterValue>,
    ) -> Self {
        self.filter_opts(Some(column.into()), op, value, true)
    }

    /// Whole-line filter.
    pub fn filter_line(self, op: FilterOp, value: impl Into<FilterValue>) -> Self {
        self.filter_opts(None, op, value, true)
    }

    /// Fully-specified filter.
    pub fn filter_opts(
        mut self,
        column: Option<ColumnRef>,
        op: FilterOp,
        value: impl Into<FilterValue>,
        case_sensitive: bool,
    ) -> Self {
        self.root = PlanNode::Filter {
            child: Box::new(self.root),
            column,
            op,
            value: value.into(),
            case_sensitive,
        };
        self
    }

    /// Keyword-style filter: `"column__op"` keys, with `line` naming the
    /// whole line (`filter_named("line__contains", "ERROR")`).
    pub fn filter_named(
        self,
        key: &str,
        value: impl Into<FilterValue>,
    ) -> SparkResult<Self> {
        let (column_name, op_name) = key.split_once("__").ok_or_else(|| {
            SparkError::UnknownFilterOp(format!("{key} (expected 'column__op')"))
        })?;
        let op = FilterOp::from_name(op_name)
            .ok_or_else(|| SparkError::UnknownFilterOp(op_name.to_string()))?;
        let column = (column_name != "line").then(|| ColumnRef::from(column_name));
        Ok(self.filter_opts(column, op, value, true))
    }

    /// Project columns, by header name or 1-based index.
    pub fn select<C>(mut self, columns: impl IntoIterator<Item = C>) -> SparkResult<Self>
    where
        C: Into<ColumnRef>,
    {
        let columns: Vec<ColumnRef> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(SparkError::EmptySelect);
        }
        self.root = PlanNode::Select {
            child: Box::new(self.root),
            columns,
        };
        Ok(self)
    }

    /// Record group keys; the next [`agg`](Self::agg) call resolves them
    /// into one `GroupBy` node.
    pub fn group_by<C>(mut self, keys: impl IntoIterator<Item = C>) -> SparkResult<Self>
    where
        C: Into<ColumnRef>,
    {
        let keys: Vec<ColumnRef> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Err(SparkError::EmptyGroupBy);
        }
        self.pending_group_keys = Some(keys);
        Ok(self)
    }

    /// Attach aggregations to the pending group keys. Aliases must be
    /// unique; an empty alias falls back to the aggregated column name
    /// (or `value` for COUNT(*)).
    pub fn agg<A>(mut self, aggregations: impl IntoIterator<Item = (A, Agg)>) -> SparkResult<Self>
    where
        A: Into<String>,
    {
        let keys = self
            .pending_group_keys
            .take()
            .ok_or(SparkError::AggWithoutGroupBy)?;

        let mut nodes: Vec<Aggregation> = Vec::new();
        for (alias, agg) in aggregations {
            let alias: String = alias.into();
            let alias = if alias.is_empty() {
                agg.column
                    .as_ref()
                    .map_or_else(|| "value".to_string(), ToString::to_string)
            } else {
                alias
            };
            if nodes.iter().any(|existing| existing.alias == alias) {
                return Err(SparkError::DuplicateAlias(alias));
            }
            nodes.push(Aggregation {
                func: agg.func,
                column: agg.column,
                alias,
            });
        }
        if nodes.is_empty() {
            return Err(SparkError::EmptyAgg);
        }

        self.root = PlanNode::GroupBy {
            child: Box::new(self.root),
            keys,
            aggregations: nodes,
        };
        Ok(self)
    }

    /// Sort by one column.
    pub fn sort(self, column: impl Into<ColumnRef>, order: SortOrder, numeric: bool) -> Self {
        self.sort_by([(column.into(), order)], numeric)
    }

    /// Sort by several keys in precedence order.
    pub fn sort_by(
        mut self,
        keys: impl IntoIterator<Item = (ColumnRef, SortOrder)>,
        numeric: bool,
    ) -> Self {
        self.root = PlanNode::Sort {
            child: Box::new(self.root),
            keys: keys.into_iter().collect(),
            numeric,
        };
        self
    }

    /// Take `count` rows after skipping `offset`.
    pub fn limit(mut self, count: usize, offset: usize) -> SparkResult<Self> {
        if count == 0 {
            return Err(SparkError::ZeroLimit);
        }
        self.root = PlanNode::Limit {
            child: Box::new(self.root),
            count,
            offset,
        };
        Ok(self)
    }

    /// Deduplicate on specific columns.
    pub fn distinct<C>(mut self, columns: impl IntoIterator<Item = C>) -> Self
    where
        C: Into<ColumnRef>,
    {
        let columns: Vec<ColumnRef> = columns.into_iter().map(Into::into).collect();
        self.root = PlanNode::Distinct {
            child: Box::new(self.root),
            columns: (!columns.is_empty()).then_some(columns),
        };
        self
    }

    /// Deduplicate whole rows.
    pub fn distinct_all(mut self) -> Self {
        self.root = PlanNode::Distinct {
            child: Box::new(self.root),
            columns: None,
        };
        self
    }

    /// Fan the pipeline out across files matching the source glob via
    /// `find | xargs -P`. Rejected when the plan needs global state
    /// across files.
    pub fn parallel(mut self, workers: Option<usize>) -> SparkResult<Self> {
        validate_parallel(&self.root)?;
        self.root = PlanNode::Parallel {
            child: Box::new(self.root),
            workers,
        };
        Ok(self)
    }

    /// The plan tree, for inspection.
    pub fn plan(&self) -> &PlanNode {
        &self.root
    }

    fn cache_key(&self) -> SparkResult<CacheKey> {
        let awk = tools::detect_awk()?;
        let grep = tools::detect_grep()?;
        Ok((self.root.plan_hash(), awk.path, grep.path))
    }

    /// Compile the plan to a shell command string (memoized).
    pub fn to_shell(&self) -> SparkResult<String> {
        let key = self.cache_key()?;
        if let Some(command) = cached_command(&key) {
            debug!("command cache hit");
            return Ok(command);
        }

        let optimized = QueryOptimizer::new().optimize(self.root.clone());
        let command = codegen::compile(&optimized)?;
        debug!(%command, "compiled pipeline");

        store_command(key, command.clone());
        Ok(command)
    }

    /// Output column names when the plan produces structured rows
    /// (a group-by): group keys, then aggregation aliases.
    pub fn output_columns(&self) -> Option<Vec<String>> {
        match self.root.find_group_by() {
            Some(PlanNode::GroupBy {
                keys, aggregations, ..
            }) => Some(crate::plan::group_by_schema(keys, aggregations)),
            _ => None,
        }
    }

    /// Execute and deserialize according to the plan shape.
    ///
    /// Exit code 1 with empty stderr (grep's "no matches") yields an
    /// empty result of the right shape rather than an error.
    pub fn run(&self) -> SparkResult<RunOutput> {
        self.run_with(None, None)
    }

    /// [`run`](Self::run) with an execution deadline and working
    /// directory.
    pub fn run_with(
        &self,
        timeout: Option<Duration>,
        cwd: Option<&Path>,
    ) -> SparkResult<RunOutput> {
        let result = self.run_result_with(timeout, cwd)?;
        let no_match = result.is_no_match();
        if result.status != 0 && !no_match {
            return Err(SparkError::Execution {
                status: result.status,
                stderr: result.stderr,
            });
        }

        if let Some(columns) = self.output_columns() {
            if no_match {
                return Ok(RunOutput::Records(Vec::new()));
            }
            let delimiter = format::output_delimiter(&self.root);
            return Ok(RunOutput::Records(parse_records(
                &result.stdout,
                &columns,
                &delimiter,
            )));
        }
        if self.root.contains_json_parse() {
            if no_match {
                return Ok(RunOutput::Json(Vec::new()));
            }
            return Ok(RunOutput::Json(parse_json_lines(&result.stdout)?));
        }
        if no_match {
            return Ok(RunOutput::Lines(Vec::new()));
        }
        Ok(RunOutput::Lines(
            result.stdout.lines().map(str::to_string).collect(),
        ))
    }

    /// Execute and return raw stdout.
    pub fn run_raw(&self) -> SparkResult<String> {
        let result = self.run_result()?;
        if result.status != 0 {
            if result.is_no_match() {
                return Ok(String::new());
            }
            return Err(SparkError::Execution {
                status: result.status,
                stderr: result.stderr,
            });
        }
        Ok(result.stdout)
    }

    /// Execute and return the full capture, whatever the exit code.
    pub fn run_result(&self) -> SparkResult<ExecutionResult> {
        self.run_result_with(None, None)
    }

    /// [`run_result`](Self::run_result) with a deadline and working
    /// directory.
    pub fn run_result_with(
        &self,
        timeout: Option<Duration>,
        cwd: Option<&Path>,
    ) -> SparkResult<ExecutionResult> {
        let command = self.to_shell()?;
        executor::execute(&command, timeout, cwd)
    }

    /// Execute and stream stdout line by line.
    pub fn stream(&self) -> SparkResult<CommandStream> {
        let command = self.to_shell()?;
        executor::stream(&command, None)
    }
}

/// Operations needing global state across files cannot fan out.
fn validate_parallel(plan: &PlanNode) -> SparkResult<()> {
    let mut conflict: Option<(&'static str, &'static str)> = None;
    plan.walk(&mut |node| {
        if conflict.is_some() {
            return;
        }
        conflict = match node {
            PlanNode::Sort { .. } => Some((
                "sort()",
                "Sorting requires all data to be collected first.",
            )),
            PlanNode::Distinct { .. } => Some((
                "distinct()",
                "Deduplication requires all data to be collected first.",
            )),
            PlanNode::GroupBy { .. } => Some((
                "group_by()/agg()",
                "Aggregations require all data to be collected first.",
            )),
            PlanNode::Limit { .. } => Some((
                "limit()",
                "Row limits require all data to be collected first.",
            )),
            _ => None,
        };
    });
    match conflict {
        Some((op, reason)) => Err(SparkError::ParallelConflict { op, reason }),
        None => Ok(()),
    }
}
