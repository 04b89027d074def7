//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - shellspark.toml (default configuration)
//! - shellspark.local.toml (git-ignored local overrides)
//! - Environment variables (SHELLSPARK_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # shellspark.toml
//! [tools]
//! awk = "gawk"
//! grep = "rg"
//!
//! [cache]
//! max_commands = 256
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! SHELLSPARK_TOOLS__AWK=gawk
//! SHELLSPARK_CACHE__MAX_COMMANDS=256
//! ```
//!
//! The plain `SHELLSPARK_AWK` / `SHELLSPARK_GREP` / `SHELLSPARK_SORT` /
//! `SHELLSPARK_JQ` variables are read directly by the tool probe and
//! always win; [`Config::apply`] forwards the `[tools]` section into
//! those variables for processes that configure through files.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::codegen;
use crate::tools;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tool override names; unset fields fall back to auto-detection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub awk: Option<String>,
    pub grep: Option<String>,
    pub sort: Option<String>,
    pub jq: Option<String>,
}

/// Compiled-command cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum cached shell commands before the oldest half is dropped
    #[serde(default = "default_max_commands")]
    pub max_commands: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_max_commands() -> usize {
    codegen::DEFAULT_CACHE_CAPACITY
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_commands: default_max_commands(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. shellspark.toml (base configuration)
    /// 2. shellspark.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (SHELLSPARK_* prefix, `__` nesting)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("shellspark.toml"))
            .merge(Toml::file("shellspark.local.toml"))
            .merge(Env::prefixed("SHELLSPARK_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("SHELLSPARK_").split("__"))
            .extract()
    }

    /// Install this configuration process-wide: forward tool overrides
    /// to the probe's environment variables, resize the command cache,
    /// and drop both caches so stale detections cannot leak through.
    pub fn apply(&self) {
        let overrides = [
            ("SHELLSPARK_AWK", &self.tools.awk),
            ("SHELLSPARK_GREP", &self.tools.grep),
            ("SHELLSPARK_SORT", &self.tools.sort),
            ("SHELLSPARK_JQ", &self.tools.jq),
        ];
        for (var, value) in overrides {
            if let Some(name) = value {
                std::env::set_var(var, name);
            }
        }
        codegen::set_command_cache_capacity(self.cache.max_commands);
        tools::clear_tool_cache();
        codegen::clear_command_cache();
    }
}
