//! jq backend: newline-delimited JSON subtrees.
//!
//! Filters become `select(...)` stages, projections become field
//! extraction or object construction, all chained with ` | ` into one
//! `jq -c` invocation. Aggregations are not expressible here — plans
//! combining JSON input with group_by are rejected rather than silently
//! rerouted to a row-oriented backend.

use crate::codegen::quote::{escape_jq_string, sh_quote};
use crate::error::{SparkError, SparkResult};
use crate::plan::{ColumnRef, FilterOp, FilterValue, PlanNode};
use crate::tools;

/// Compile a fused JSON subtree into a single jq invocation.
pub(crate) fn generate(node: &PlanNode) -> SparkResult<String> {
    let jq = tools::detect_jq().ok_or_else(|| SparkError::MissingTool {
        tool: "jq".to_string(),
        hint: "Install it with `apt install jq` or `brew install jq` \
               (https://jqlang.github.io/jq/download/)."
            .to_string(),
    })?;

    let mut stages: Vec<String> = Vec::new();
    let mut select_columns: Option<&[ColumnRef]> = None;
    let mut source_path = None;

    let mut current = node;
    loop {
        match current {
            PlanNode::Filter {
                child,
                column,
                op,
                value,
                ..
            } => {
                let Some(column) = column else {
                    return Err(SparkError::Compile(
                        "whole-line filters are not supported for JSON input; \
                         filter on a field instead"
                            .to_string(),
                    ));
                };
                stages.push(format!("select({})", filter_expr(column, *op, value)?));
                current = child.as_ref();
            }
            PlanNode::Select { child, columns } => {
                if select_columns.is_none() {
                    select_columns = Some(columns);
                }
                current = child.as_ref();
            }
            PlanNode::GroupBy { .. } => {
                return Err(SparkError::Compile(
                    "aggregations over JSON input are not supported; \
                     convert the data to delimited text first".to_string(),
                ));
            }
            PlanNode::Parse { child, .. } => {
                current = child.as_ref();
            }
            PlanNode::Source { path, .. } => {
                source_path = Some(path.as_str());
                break;
            }
            other => {
                return Err(SparkError::Compile(format!(
                    "jq backend cannot handle {} node",
                    other.kind_name()
                )))
            }
        }
    }
    // Filters were collected root-first; jq applies them source-first.
    stages.reverse();

    if let Some(columns) = select_columns {
        stages.push(projection_expr(columns)?);
    }

    let expr = if stages.is_empty() {
        ".".to_string()
    } else {
        stages.join(" | ")
    };

    let mut cmd_parts = vec![jq.path.display().to_string(), "-c".to_string(), sh_quote(&expr)];
    if let Some(path) = source_path {
        cmd_parts.push(sh_quote(path));
    }
    Ok(cmd_parts.join(" "))
}

/// `.a.b` field path for a column name; dotted names traverse nesting.
fn field_path(column: &ColumnRef) -> SparkResult<String> {
    match column {
        ColumnRef::Index(i) => Err(SparkError::ColumnResolution {
            column: i.to_string(),
            reason: "integer column indices are not supported for JSON; use a field name"
                .to_string(),
        }),
        ColumnRef::Name(name) => {
            if name.starts_with('.') {
                Ok(name.clone())
            } else {
                Ok(format!(".{name}"))
            }
        }
    }
}

fn filter_expr(column: &ColumnRef, op: FilterOp, value: &FilterValue) -> SparkResult<String> {
    let field = field_path(column)?;
    let literal = match value {
        FilterValue::Str(s) => format!("\"{}\"", escape_jq_string(s)),
        FilterValue::Int(i) => i.to_string(),
        FilterValue::Float(f) => f.to_string(),
    };
    Ok(match op {
        FilterOp::Eq => format!("{field} == {literal}"),
        FilterOp::Ne => format!("{field} != {literal}"),
        FilterOp::Lt => format!("{field} < {literal}"),
        FilterOp::Le => format!("{field} <= {literal}"),
        FilterOp::Gt => format!("{field} > {literal}"),
        FilterOp::Ge => format!("{field} >= {literal}"),
        FilterOp::Contains => format!("{field} | contains({literal})"),
        FilterOp::Regex => format!("{field} | test({literal})"),
        FilterOp::StartsWith => format!("{field} | startswith({literal})"),
        FilterOp::EndsWith => format!("{field} | endswith({literal})"),
    })
}

/// Single field extraction, or an object literal for several fields.
fn projection_expr(columns: &[ColumnRef]) -> SparkResult<String> {
    if columns.len() == 1 {
        return field_path(&columns[0]);
    }
    let mut fields = Vec::with_capacity(columns.len());
    for column in columns {
        match column {
            ColumnRef::Name(name) => fields.push(name.clone()),
            ColumnRef::Index(i) => {
                return Err(SparkError::ColumnResolution {
                    column: i.to_string(),
                    reason: "integer column indices are not supported for JSON; \
                             use a field name"
                        .to_string(),
                })
            }
        }
    }
    Ok(format!("{{{}}}", fields.join(", ")))
}
