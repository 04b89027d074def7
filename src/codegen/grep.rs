//! grep backend: whole-line filter stacks.
//!
//! Each filter becomes one grep invocation; filters closest to the
//! source run first and later ones consume the pipe. Only string-shaped
//! operations land here — ordering comparisons on whole lines are routed
//! to the awk backend by the dispatcher.

use crate::codegen::quote::{escape_ere, sh_quote};
use crate::error::{SparkError, SparkResult};
use crate::plan::{FilterOp, FilterValue, PlanNode};
use crate::tools::{self, ToolInfo};

/// Whole-line operations grep can express.
pub(crate) fn grep_can_express(op: FilterOp) -> bool {
    matches!(
        op,
        FilterOp::Contains | FilterOp::Regex | FilterOp::StartsWith | FilterOp::EndsWith
    )
}

struct LineFilter<'a> {
    op: FilterOp,
    value: &'a FilterValue,
    case_sensitive: bool,
}

/// Compile a stack of whole-line filters over a source. The
/// source-side invocation names the file; later ones consume the pipe.
pub(crate) fn generate(node: &PlanNode) -> SparkResult<String> {
    let grep = tools::detect_grep()?;

    let mut filters = Vec::new();
    let mut source_path = None;
    let mut current = node;
    loop {
        match current {
            PlanNode::Filter {
                child,
                column: None,
                op,
                value,
                case_sensitive,
            } => {
                filters.push(LineFilter {
                    op: *op,
                    value,
                    case_sensitive: *case_sensitive,
                });
                current = child.as_ref();
            }
            PlanNode::Source { path, .. } => {
                source_path = Some(path.as_str());
                break;
            }
            other => {
                return Err(SparkError::Compile(format!(
                    "grep backend cannot handle {} node",
                    other.kind_name()
                )))
            }
        }
    }
    // Collected root-to-source; the pipe runs source-side first.
    filters.reverse();

    let mut stages = Vec::with_capacity(filters.len());
    for (i, filter) in filters.iter().enumerate() {
        let file = (i == 0).then_some(source_path).flatten();
        stages.push(single_invocation(&grep, filter, file)?);
    }
    Ok(stages.join(" | "))
}

fn single_invocation(
    grep: &ToolInfo,
    filter: &LineFilter<'_>,
    file: Option<&str>,
) -> SparkResult<String> {
    let value = filter.value.raw();
    let is_rg = grep.name == "rg";

    let mut flags: Vec<String> = Vec::new();
    if !filter.case_sensitive {
        flags.push("-i".to_string());
    }

    let pattern = match filter.op {
        FilterOp::Contains => {
            flags.push("-F".to_string());
            value
        }
        FilterOp::Regex => {
            if tools::grep_supports_pcre() {
                flags.push("-P".to_string());
            } else {
                flags.push("-E".to_string());
            }
            value
        }
        FilterOp::StartsWith => {
            // ripgrep patterns are regexes by default; grep needs -E
            if !is_rg {
                flags.push("-E".to_string());
            }
            format!("^{}", escape_ere(&value))
        }
        FilterOp::EndsWith => {
            if !is_rg {
                flags.push("-E".to_string());
            }
            format!("{}$", escape_ere(&value))
        }
        other => {
            return Err(SparkError::Compile(format!(
                "grep backend cannot express whole-line {other:?} filter"
            )))
        }
    };

    if is_rg {
        // Deterministic single-file output: never prefix filenames.
        flags.push("--no-filename".to_string());
    }

    let mut parts = vec![grep.path.display().to_string()];
    parts.extend(flags);
    parts.push(sh_quote(&pattern));
    if let Some(path) = file {
        parts.push(sh_quote(path));
    }
    Ok(parts.join(" "))
}
