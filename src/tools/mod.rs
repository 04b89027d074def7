//! # Tool Capability Probe
//!
//! Detects which line-oriented tools are installed, which implementation
//! variant each one is (mawk vs gawk, ripgrep vs grep, GNU vs BSD sort),
//! and which optional features they support (PCRE, `sort --parallel`).
//!
//! Every probe is memoized in a module-scoped cache; [`clear_tool_cache`]
//! drops all memos, which is required after changing the `SHELLSPARK_*`
//! override environment variables. Probes run the candidate tool with a
//! short timeout and treat timeout or permission failures as absence.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{SparkError, SparkResult};
use crate::executor::run_with_timeout;

/// Deadline for any single probe invocation.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Information about one detected tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInfo {
    /// Short name as invoked (`mawk`, `rg`, `sort`, …)
    pub name: String,
    /// Absolute path found on `PATH`
    pub path: PathBuf,
    /// First line of `--version` output, if the tool produced one
    pub version: Option<String>,
    /// GNU implementation (enables `--parallel`, `-P`, …)
    pub is_gnu: bool,
}

/// One memo slot: not yet probed, probed-and-found, or probed-and-absent.
#[derive(Debug, Clone, Default)]
enum Probe {
    #[default]
    Unknown,
    Found(ToolInfo),
    Absent,
}

#[derive(Debug, Default)]
struct ProbeCache {
    awk: Probe,
    grep: Probe,
    sort: Probe,
    jq: Probe,
    pcre: Option<bool>,
    sort_parallel: Option<bool>,
    cpus: Option<usize>,
}

static PROBES: RwLock<ProbeCache> = RwLock::new(ProbeCache {
    awk: Probe::Unknown,
    grep: Probe::Unknown,
    sort: Probe::Unknown,
    jq: Probe::Unknown,
    pcre: None,
    sort_parallel: None,
    cpus: None,
});

/// Drop every memoized probe result.
///
/// Call after installing tools or changing the `SHELLSPARK_AWK`,
/// `SHELLSPARK_GREP`, `SHELLSPARK_SORT`, or `SHELLSPARK_JQ` overrides.
/// The compiled-command cache must be cleared alongside this; see
/// [`crate::codegen::clear_command_cache`].
pub fn clear_tool_cache() {
    *PROBES.write() = ProbeCache::default();
}

/// Locate an executable on `PATH` (or verify an explicit path).
pub fn which(name: &str) -> Option<PathBuf> {
    fn is_executable(path: &Path) -> bool {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            path.metadata()
                .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        }
        #[cfg(not(unix))]
        {
            path.is_file()
        }
    }

    if name.contains('/') {
        let path = PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// First line of `<tool> --version`, from stdout if the tool exited
/// cleanly, else from stderr. `None` on timeout, spawn failure, or
/// silence.
fn tool_version(path: &Path) -> Option<String> {
    let mut cmd = Command::new(path);
    cmd.arg("--version");
    let captured = run_with_timeout(&mut cmd, Some(PROBE_TIMEOUT)).ok()?;
    let stream = match captured.status {
        Some(0) => &captured.stdout,
        _ => &captured.stderr,
    };
    let first_line = String::from_utf8_lossy(stream)
        .lines()
        .next()
        .map(str::to_string)?;
    (!first_line.is_empty()).then_some(first_line)
}

fn version_is_gnu(version: Option<&str>) -> bool {
    version
        .map(|v| {
            let v = v.to_lowercase();
            v.contains("gnu") || v.contains("gawk")
        })
        .unwrap_or(false)
}

/// Probe a single candidate by name: locate it and read its version.
fn probe_named(name: &str) -> Option<ToolInfo> {
    let path = which(name)?;
    let version = tool_version(&path);
    let is_gnu = version_is_gnu(version.as_deref()) || name == "gawk";
    let short_name = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    Some(ToolInfo {
        name: short_name,
        path,
        version,
        is_gnu,
    })
}

/// Probe an environment override first, then each candidate in
/// preference order.
fn probe_with_override(env_var: &str, candidates: &[&str]) -> Option<ToolInfo> {
    if let Ok(override_name) = env::var(env_var) {
        if !override_name.is_empty() {
            if let Some(info) = probe_named(&override_name) {
                info!(tool = %info.name, path = %info.path.display(), "using {env_var} override");
                return Some(info);
            }
            debug!(%override_name, "{env_var} override not found; falling back to detection");
        }
    }
    for name in candidates {
        if let Some(info) = probe_named(name) {
            info!(tool = %info.name, path = %info.path.display(), gnu = info.is_gnu, "detected");
            return Some(info);
        }
    }
    None
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Awk,
    Grep,
    Sort,
    Jq,
}

impl ProbeCache {
    fn get(&self, slot: Slot) -> &Probe {
        match slot {
            Slot::Awk => &self.awk,
            Slot::Grep => &self.grep,
            Slot::Sort => &self.sort,
            Slot::Jq => &self.jq,
        }
    }

    fn set(&mut self, slot: Slot, probe: Probe) {
        match slot {
            Slot::Awk => self.awk = probe,
            Slot::Grep => self.grep = probe,
            Slot::Sort => self.sort = probe,
            Slot::Jq => self.jq = probe,
        }
    }
}

fn detect_cached(slot: Slot, env_var: &str, candidates: &[&str]) -> Option<ToolInfo> {
    match PROBES.read().get(slot) {
        Probe::Found(info) => return Some(info.clone()),
        Probe::Absent => return None,
        Probe::Unknown => {}
    }
    let probed = probe_with_override(env_var, candidates);
    let cached = match &probed {
        Some(info) => Probe::Found(info.clone()),
        None => Probe::Absent,
    };
    PROBES.write().set(slot, cached);
    probed
}

/// Best available awk: `SHELLSPARK_AWK` override, then mawk, gawk, awk.
pub fn detect_awk() -> SparkResult<ToolInfo> {
    detect_cached(Slot::Awk, "SHELLSPARK_AWK", &["mawk", "gawk", "awk"]).ok_or_else(|| {
        SparkError::MissingTool {
            tool: "awk".to_string(),
            hint: "Install mawk or gawk, or point SHELLSPARK_AWK at an awk binary.".to_string(),
        }
    })
}

/// Best available grep: `SHELLSPARK_GREP` override, then ripgrep, grep.
pub fn detect_grep() -> SparkResult<ToolInfo> {
    detect_cached(Slot::Grep, "SHELLSPARK_GREP", &["rg", "grep"]).ok_or_else(|| {
        SparkError::MissingTool {
            tool: "grep".to_string(),
            hint: "Install grep or ripgrep, or point SHELLSPARK_GREP at a grep binary."
                .to_string(),
        }
    })
}

/// The sort command (`SHELLSPARK_SORT` override honored).
pub fn detect_sort() -> SparkResult<ToolInfo> {
    detect_cached(Slot::Sort, "SHELLSPARK_SORT", &["sort"]).ok_or_else(|| {
        SparkError::MissingTool {
            tool: "sort".to_string(),
            hint: "Install coreutils, or point SHELLSPARK_SORT at a sort binary.".to_string(),
        }
    })
}

/// jq, if installed. Absence is only fatal once a JSON plan is compiled.
pub fn detect_jq() -> Option<ToolInfo> {
    detect_cached(Slot::Jq, "SHELLSPARK_JQ", &["jq"])
}

/// Whether the detected grep accepts `-P` (PCRE patterns).
pub fn grep_supports_pcre() -> bool {
    if let Some(cached) = PROBES.read().pcre {
        return cached;
    }
    let supported = probe_pcre();
    PROBES.write().pcre = Some(supported);
    supported
}

fn probe_pcre() -> bool {
    let Ok(grep) = detect_grep() else {
        return false;
    };
    // ripgrep ships PCRE behind the same flag
    if grep.name == "rg" {
        return true;
    }
    if !grep.is_gnu {
        return false;
    }
    let mut cmd = Command::new(&grep.path);
    cmd.args(["-P", "test", "/dev/null"]);
    match run_with_timeout(&mut cmd, Some(PROBE_TIMEOUT)) {
        // 0 = match, 1 = no match; anything else means -P was rejected
        Ok(captured) => matches!(captured.status, Some(0 | 1)),
        Err(_) => false,
    }
}

/// Whether the detected sort accepts GNU `--parallel=N`.
pub fn sort_supports_parallel() -> bool {
    if let Some(cached) = PROBES.read().sort_parallel {
        return cached;
    }
    let supported = probe_sort_parallel();
    PROBES.write().sort_parallel = Some(supported);
    supported
}

fn probe_sort_parallel() -> bool {
    let Ok(sort) = detect_sort() else {
        return false;
    };
    if !sort.is_gnu {
        return false;
    }
    let mut cmd = Command::new(&sort.path);
    cmd.args(["--parallel=1", "--version"]);
    match run_with_timeout(&mut cmd, Some(PROBE_TIMEOUT)) {
        Ok(captured) => captured.status == Some(0),
        Err(_) => false,
    }
}

/// Logical CPU count, queried once per process.
pub fn cpu_count() -> usize {
    if let Some(cached) = PROBES.read().cpus {
        return cached;
    }
    let cpus = num_cpus::get().max(1);
    PROBES.write().cpus = Some(cpus);
    cpus
}

/// Worker count for `xargs -P`: an explicit request floored at 1, or the
/// CPU count.
pub fn parallel_workers(requested: Option<usize>) -> usize {
    match requested {
        Some(n) => n.max(1),
        None => cpu_count(),
    }
}
