//! # Code Generator
//!
//! Turns an optimized plan tree into one POSIX shell command string.
//!
//! ## Pipeline Position
//!
//! ```text
//! Optimized PlanNode -> [Code Generator] -> shell command -> Executor
//! ```
//!
//! The walk is top-down. Barrier nodes (`Sort`, `Limit`, `Distinct`,
//! `Parallel`) each open a pipeline stage fed by their child's stage;
//! everything between barriers fuses into a single tool invocation
//! chosen by backend dispatch:
//!
//! 1. a JSON parse anywhere in the subtree selects **jq**;
//! 2. a parse, projection, group-by, or any column-qualified filter
//!    (or a whole-line comparison grep cannot express) selects **awk**;
//! 3. a stack of whole-line string filters over the source selects
//!    **grep**, one invocation per filter;
//! 4. a bare source becomes `cat`.

pub mod quote;

mod awk;
mod cache;
mod grep;
mod jq;
mod parallel;
mod sortchain;

pub use cache::{clear_command_cache, set_command_cache_capacity};
pub(crate) use cache::{cached_command, store_command, CacheKey};
pub(crate) use cache::DEFAULT_CAPACITY as DEFAULT_CACHE_CAPACITY;

use crate::error::{SparkError, SparkResult};
use crate::plan::{FilterOp, PlanNode};
use quote::sh_quote;

/// Compile an optimized plan into a shell command.
///
/// Plans containing `Join` are rejected here: the node exists in the IR
/// but no backend implements it.
pub fn compile(plan: &PlanNode) -> SparkResult<String> {
    if plan.contains(&|n| matches!(n, PlanNode::Join { .. })) {
        return Err(SparkError::Compile(
            "join plans are not supported by any backend yet".to_string(),
        ));
    }
    generate(plan)
}

fn generate(node: &PlanNode) -> SparkResult<String> {
    match node {
        PlanNode::Parallel { child, workers } => {
            parallel::generate(child, *workers, &generate_fused)
        }
        PlanNode::Sort { child, .. }
        | PlanNode::Limit { child, .. }
        | PlanNode::Distinct { child, .. } => {
            // A bare-source child is read directly by the tool instead
            // of being piped through cat.
            let input_cmd = match child.as_ref() {
                PlanNode::Source { .. } => None,
                inner => Some(generate(inner)?),
            };
            sortchain::generate(node, input_cmd)
        }
        fused => generate_fused(fused),
    }
}

/// Whole-line ops the grep backend handles; anything else needs awk's
/// `$0` predicates.
fn needs_awk(node: &PlanNode) -> bool {
    node.contains(&|n| match n {
        PlanNode::Parse { .. } | PlanNode::Select { .. } | PlanNode::GroupBy { .. } => true,
        PlanNode::Filter {
            column: Some(_), ..
        } => true,
        PlanNode::Filter {
            column: None, op, ..
        } => !grep::grep_can_express(*op),
        _ => false,
    })
}

/// Dispatch a fused (barrier-free) subtree to one backend.
fn generate_fused(node: &PlanNode) -> SparkResult<String> {
    if let Some(barrier) = node.find_first(&PlanNode::is_barrier) {
        return Err(SparkError::Compile(format!(
            "{} cannot appear inside a fused stage",
            barrier.kind_name()
        )));
    }

    if node.contains_json_parse() {
        return jq::generate(node);
    }
    if needs_awk(node) {
        return awk::generate(node);
    }
    match node {
        PlanNode::Filter { .. } => grep::generate(node),
        PlanNode::Source { path, .. } => Ok(format!("cat {}", sh_quote(path))),
        other => Err(SparkError::Compile(format!(
            "no backend can generate code for {} node",
            other.kind_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ColumnRef, FilterValue, Format, JoinKind};

    fn source(path: &str, format: Format) -> PlanNode {
        PlanNode::Source {
            path: path.to_string(),
            format,
        }
    }

    #[test]
    fn test_bare_source_compiles_to_cat() {
        let cmd = compile(&source("a.log", Format::Text)).expect("compile");
        assert_eq!(cmd, "cat 'a.log'");
    }

    #[test]
    fn test_join_is_rejected() {
        let plan = PlanNode::Join {
            left: Box::new(source("a.csv", Format::Csv)),
            right: Box::new(source("b.csv", Format::Csv)),
            on: ColumnRef::Name("id".to_string()),
            how: JoinKind::Inner,
        };
        let err = compile(&plan).unwrap_err();
        assert!(matches!(err, SparkError::Compile(_)), "got: {err}");
    }

    #[test]
    fn test_whole_line_comparison_routes_to_awk() {
        let plan = PlanNode::Filter {
            child: Box::new(source("nums.txt", Format::Text)),
            column: None,
            op: FilterOp::Gt,
            value: FilterValue::Int(10),
            case_sensitive: true,
        };
        let cmd = compile(&plan).expect("compile");
        assert!(cmd.contains("$0>10"), "command: {cmd}");
    }

    #[test]
    fn test_whole_line_contains_routes_to_grep() {
        let plan = PlanNode::Filter {
            child: Box::new(source("a.log", Format::Text)),
            column: None,
            op: FilterOp::Contains,
            value: FilterValue::Str("ERROR".to_string()),
            case_sensitive: true,
        };
        let cmd = compile(&plan).expect("compile");
        assert!(cmd.contains("-F 'ERROR'"), "command: {cmd}");
        assert!(!cmd.contains("awk"), "command: {cmd}");
    }

    #[test]
    fn test_barrier_over_fused_stage_pipes() {
        let plan = PlanNode::Limit {
            child: Box::new(PlanNode::Filter {
                child: Box::new(source("a.log", Format::Text)),
                column: None,
                op: FilterOp::Contains,
                value: FilterValue::Str("ERROR".to_string()),
                case_sensitive: true,
            }),
            count: 5,
            offset: 0,
        };
        let cmd = compile(&plan).expect("compile");
        assert!(cmd.contains("-F 'ERROR' 'a.log' | head -n 5"), "command: {cmd}");
    }

    #[test]
    fn test_stacked_barriers_chain() {
        let plan = PlanNode::Limit {
            child: Box::new(PlanNode::Sort {
                child: Box::new(source("a.log", Format::Text)),
                keys: vec![(ColumnRef::Index(1), crate::plan::SortOrder::Asc)],
                numeric: true,
            }),
            count: 3,
            offset: 0,
        };
        let cmd = compile(&plan).expect("compile");
        assert!(cmd.contains("-k1,1n"), "command: {cmd}");
        assert!(cmd.ends_with("| head -n 3"), "command: {cmd}");
    }

    #[test]
    fn test_parallel_emits_find_xargs() {
        let plan = PlanNode::Parallel {
            child: Box::new(PlanNode::Filter {
                child: Box::new(source("logs/*.log", Format::Text)),
                column: None,
                op: FilterOp::Contains,
                value: FilterValue::Str("ERROR".to_string()),
                case_sensitive: true,
            }),
            workers: Some(4),
        };
        let cmd = compile(&plan).expect("compile");
        assert!(
            cmd.starts_with("find 'logs' -name '*.log' -print0 | xargs -0 -P4 "),
            "command: {cmd}"
        );
        assert!(cmd.contains("-F 'ERROR'"), "command: {cmd}");
        assert!(!cmd.contains("'logs/*.log'"), "command: {cmd}");
    }
}
