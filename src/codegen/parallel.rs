//! Parallel wrapper: multi-file fan-out via `find | xargs -P`.
//!
//! The child pipeline compiles normally, then loses its source-path
//! argument ("headless" form) so `xargs` can hand each matching file to
//! the first stage. Builder validation guarantees the child holds no
//! operation needing global state across files.

use std::path::Path;

use crate::codegen::quote::sh_quote;
use crate::error::{SparkError, SparkResult};
use crate::plan::PlanNode;
use crate::tools;

/// Split a glob source path into `find`'s directory and `-name` pattern.
fn split_glob(pattern: &str) -> (String, String) {
    let path = Path::new(pattern);
    let directory = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ".".to_string());
    let file_pattern = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| pattern.to_string());
    (directory, file_pattern)
}

/// Remove the source-path argument from a compiled command so `xargs`
/// can supply one.
///
/// The path sits at the tail of the stage that reads the file — the
/// first stage of a multi-stage pipeline. Input-redirected forms
/// (`< path`) lose the whole redirection.
fn strip_source(command: &str, source_path: &str) -> String {
    let quoted = sh_quote(source_path);

    let strip_stage = |stage: &str| -> Option<String> {
        if let Some(rest) = stage.strip_suffix(&quoted) {
            return Some(rest.trim_end().to_string());
        }
        if let Some(rest) = stage.strip_suffix(source_path) {
            return Some(rest.trim_end().to_string());
        }
        let redirect = format!("< {quoted}");
        if stage.contains(&redirect) {
            return Some(stage.replacen(&redirect, "", 1).trim_end().to_string());
        }
        None
    };

    match command.split_once(" | ") {
        Some((first, rest)) => match strip_stage(first) {
            Some(stripped) => format!("{stripped} | {rest}"),
            None => command.to_string(),
        },
        None => strip_stage(command).unwrap_or_else(|| command.to_string()),
    }
}

/// Compile `Parallel(child, workers)` into a `find | xargs -P` pipeline.
pub(crate) fn generate(
    child: &PlanNode,
    workers: Option<usize>,
    compile_child: &dyn Fn(&PlanNode) -> SparkResult<String>,
) -> SparkResult<String> {
    let source_path = child.source_path().ok_or_else(|| {
        SparkError::Compile("parallel pipeline has no source".to_string())
    })?;
    let (directory, file_pattern) = split_glob(source_path);
    let worker_count = tools::parallel_workers(workers);

    let child_cmd = compile_child(child)?;
    let headless = strip_source(&child_cmd, source_path);

    Ok(format!(
        "find {} -name {} -print0 | xargs -0 -P{} {}",
        sh_quote(&directory),
        sh_quote(&file_pattern),
        worker_count,
        headless
    ))
}
