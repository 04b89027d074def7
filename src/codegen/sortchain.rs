//! sort / head / tail backend: the barrier stages.
//!
//! Sort and Distinct compile to `sort` (with `-t`, `-k`, and GNU
//! parallel flags where supported); Limit compiles to `head`, with a
//! `tail -n +N` prefix when an offset is present. Column names sort by
//! position: the output schema of an upstream group-by resolves names to
//! 1-based indices, and a bare numeric literal is taken as the index
//! itself.

use crate::codegen::quote::sh_quote;
use crate::error::{SparkError, SparkResult};
use crate::plan::{group_by_schema, ColumnRef, Format, PlanNode, SortOrder};
use crate::tools;

/// Compile one barrier node. `input_cmd` is the already-compiled child
/// stage; `None` means the child is a bare source and the tool reads the
/// file directly.
pub(crate) fn generate(node: &PlanNode, input_cmd: Option<String>) -> SparkResult<String> {
    match node {
        PlanNode::Sort { child, keys, numeric } => {
            generate_sort(child, keys, *numeric, input_cmd)
        }
        PlanNode::Limit { child, count, offset } => {
            generate_limit(child, *count, *offset, input_cmd)
        }
        PlanNode::Distinct { child, columns } => {
            generate_distinct(child, columns.as_deref(), input_cmd)
        }
        other => Err(SparkError::Compile(format!(
            "sort backend cannot handle {} node",
            other.kind_name()
        ))),
    }
}

/// The `-t` delimiter for a subtree: present when a delimited parse (or
/// the group-by output it shapes) establishes one.
fn subtree_delimiter(child: &PlanNode) -> Option<String> {
    match child.find_parse() {
        Some(PlanNode::Parse {
            format: Format::Csv,
            delimiter,
            ..
        }) => Some(delimiter.clone()),
        _ => None,
    }
}

/// Resolve a sort/distinct column to a 1-based field index.
///
/// Preference order: the output schema of an upstream group-by, then a
/// numeric parse of the literal.
fn resolve_column_index(column: &ColumnRef, child: &PlanNode) -> SparkResult<usize> {
    if let Some(PlanNode::GroupBy {
        keys, aggregations, ..
    }) = child.find_group_by()
    {
        let schema = group_by_schema(keys, aggregations);
        if let ColumnRef::Name(name) = column {
            if let Some(position) = schema.iter().position(|s| s == name) {
                return Ok(position + 1);
            }
        }
    }
    column.numeric_index().ok_or_else(|| SparkError::ColumnResolution {
        column: column.to_string(),
        reason: "no group_by schema upstream resolves this name; \
                 use a 1-based column index"
            .to_string(),
    })
}

fn gnu_parallel_flags(flags: &mut Vec<String>) {
    if tools::sort_supports_parallel() {
        let cpus = tools::cpu_count();
        if cpus > 1 {
            flags.push(format!("--parallel={cpus}"));
            flags.push("-S 80%".to_string());
        }
    }
}

fn assemble(
    tool_path: String,
    flags: Vec<String>,
    input_cmd: Option<String>,
    file: Option<&str>,
) -> String {
    let mut cmd_parts = vec![tool_path];
    cmd_parts.extend(flags);
    match input_cmd {
        Some(input) => format!("{input} | {}", cmd_parts.join(" ")),
        None => {
            if let Some(path) = file {
                cmd_parts.push(sh_quote(path));
            }
            cmd_parts.join(" ")
        }
    }
}

fn generate_sort(
    child: &PlanNode,
    keys: &[(ColumnRef, SortOrder)],
    numeric: bool,
    input_cmd: Option<String>,
) -> SparkResult<String> {
    let sort = tools::detect_sort()?;

    let mut flags = Vec::new();
    if let Some(delimiter) = subtree_delimiter(child) {
        flags.push(format!("-t{}", sh_quote(&delimiter)));
    }
    for (column, order) in keys {
        let index = resolve_column_index(column, child)?;
        let mut key_spec = format!("-k{index},{index}");
        if numeric {
            key_spec.push('n');
        }
        if *order == SortOrder::Desc {
            key_spec.push('r');
        }
        flags.push(key_spec);
    }
    gnu_parallel_flags(&mut flags);

    Ok(assemble(
        sort.path.display().to_string(),
        flags,
        input_cmd,
        child.source_path(),
    ))
}

fn generate_limit(
    child: &PlanNode,
    count: usize,
    offset: usize,
    input_cmd: Option<String>,
) -> SparkResult<String> {
    let head_cmd = format!("head -n {count}");
    if offset == 0 {
        return Ok(assemble(head_cmd, Vec::new(), input_cmd, child.source_path()));
    }

    // Skip `offset` rows, then take `count`.
    let tail_cmd = format!("tail -n +{}", offset + 1);
    let front = assemble(tail_cmd, Vec::new(), input_cmd, child.source_path());
    Ok(format!("{front} | {head_cmd}"))
}

fn generate_distinct(
    child: &PlanNode,
    columns: Option<&[ColumnRef]>,
    input_cmd: Option<String>,
) -> SparkResult<String> {
    let sort = tools::detect_sort()?;

    let mut flags = Vec::new();
    if let Some(delimiter) = subtree_delimiter(child) {
        flags.push(format!("-t{}", sh_quote(&delimiter)));
    }
    flags.push("-u".to_string());
    if let Some(columns) = columns {
        for column in columns {
            let index = resolve_column_index(column, child)?;
            flags.push(format!("-k{index},{index}"));
        }
    }
    gnu_parallel_flags(&mut flags);

    Ok(assemble(
        sort.path.display().to_string(),
        flags,
        input_cmd,
        child.source_path(),
    ))
}
