//! Compiled-command cache.
//!
//! Shell strings are pure functions of the plan hash and the detected
//! awk/grep paths, so entries never go stale while the toolchain is
//! unchanged. When tool overrides change, callers clear this cache
//! together with the probe cache.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::OnceLock;

use parking_lot::Mutex;
use tracing::debug;

/// Cache key: plan digest plus the tool paths baked into the command.
pub(crate) type CacheKey = (u64, PathBuf, PathBuf);

pub(crate) const DEFAULT_CAPACITY: usize = 128;

struct CommandCache {
    entries: HashMap<CacheKey, String>,
    order: VecDeque<CacheKey>,
    capacity: usize,
}

impl CommandCache {
    fn new(capacity: usize) -> Self {
        CommandCache {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, key: &CacheKey) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: CacheKey, command: String) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, command);
            return;
        }
        if self.entries.len() >= self.capacity {
            // Simple eviction: drop the oldest half.
            let drop_count = (self.entries.len() / 2).max(1);
            for _ in 0..drop_count {
                if let Some(old) = self.order.pop_front() {
                    self.entries.remove(&old);
                }
            }
            debug!(dropped = drop_count, "command cache evicted oldest entries");
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, command);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

static COMMANDS: OnceLock<Mutex<CommandCache>> = OnceLock::new();

fn commands() -> &'static Mutex<CommandCache> {
    COMMANDS.get_or_init(|| Mutex::new(CommandCache::new(DEFAULT_CAPACITY)))
}

pub(crate) fn cached_command(key: &CacheKey) -> Option<String> {
    commands().lock().get(key)
}

pub(crate) fn store_command(key: CacheKey, command: String) {
    commands().lock().insert(key, command);
}

/// Drop every cached command. Must be called when tool-detection
/// overrides change.
pub fn clear_command_cache() {
    commands().lock().clear();
}

/// Resize the cache (floored at 1 entry). Existing entries beyond the
/// new bound are evicted on the next insert.
pub fn set_command_cache_capacity(capacity: usize) {
    commands().lock().capacity = capacity.max(1);
}
