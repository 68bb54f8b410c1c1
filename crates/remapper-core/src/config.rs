//! Environment-variable configuration surface (spec.md §5).
//!
//! `remapper` has no config file: every knob is an environment variable,
//! with the CLI adapter translating `--flag` equivalents into the same
//! variables before building a [`crate::LaunchRequest`]. This module only
//! owns parsing and defaulting; it does not read `std::env` itself so it
//! stays testable without process-global state.

use std::path::PathBuf;

/// Names of every environment variable this crate reads or writes.
pub mod vars {
    /// Serialized mapping list the CLI adapter hands to the Darwin dylib
    /// and the Linux launcher passes to itself across `exec`.
    pub const MAPPINGS: &str = "RMP_MAPPINGS";
    /// Absolute path to the resolved redirection target for this launch.
    pub const TARGET: &str = "RMP_TARGET";
    /// Root configuration directory, defaulting to `~/.remapper`. `RMP_CACHE`
    /// defaults to `${RMP_CONFIG}/cache` when unset.
    pub const CONFIG: &str = "RMP_CONFIG";
    /// Root directory under which per-launch target directories and the
    /// trampoline cache are created. Defaults to a user cache directory.
    pub const CACHE: &str = "RMP_CACHE";
    /// Optional path receiving detailed `trace`-level diagnostics from
    /// both the launcher and the interposed dylib.
    pub const DEBUG_LOG: &str = "RMP_DEBUG_LOG";
    /// Set by the launcher on the child so a re-exec through a shebang or
    /// trampoline never re-applies mappings that already fired.
    pub const REENTRY_GUARD: &str = "RMP_ACTIVE";
}

/// Runtime configuration resolved from the environment (component C8/C9's
/// shared setup step).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// `RMP_CONFIG`, defaulting to `~/.remapper` (spec.md §5/§6).
    pub config_root: PathBuf,
    pub cache_root: PathBuf,
    pub debug_log: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Build a [`RuntimeConfig`] from already-read environment strings,
    /// falling back to `~/.remapper` when `RMP_CONFIG` is unset and to
    /// `dirs::cache_dir()/remapper` when `RMP_CACHE` is unset.
    pub fn from_env(cache: Option<String>, debug_log: Option<String>) -> Self {
        Self::with_config(None, cache, debug_log)
    }

    /// Like [`RuntimeConfig::from_env`] but also accepts an explicit
    /// `RMP_CONFIG` override.
    pub fn with_config(config: Option<String>, cache: Option<String>, debug_log: Option<String>) -> Self {
        let config_root = config
            .map(PathBuf::from)
            .or_else(|| crate::pathutil::home_dir().ok().map(|d| d.join(".remapper")))
            .unwrap_or_else(|| PathBuf::from("/tmp/remapper-config"));
        let cache_root = cache
            .map(PathBuf::from)
            .or_else(|| dirs::cache_dir().map(|d| d.join("remapper")))
            .unwrap_or_else(|| config_root.join("cache"));
        RuntimeConfig {
            config_root,
            cache_root,
            debug_log: debug_log.map(PathBuf::from),
        }
    }

    /// Where the trampoline cache (component C4) stores re-signed
    /// interpreter copies.
    pub fn trampoline_dir(&self) -> PathBuf {
        self.cache_root.join("trampolines")
    }

    /// Where per-launch redirection targets are created when the user did
    /// not pin one explicitly.
    pub fn targets_dir(&self) -> PathBuf {
        self.cache_root.join("targets")
    }

    /// Where the Darwin launcher installs its on-disk copy of the
    /// interpose library (component C3), separate from the trampoline
    /// cache so a `RMP_CACHE` wipe doesn't race a launch in progress.
    pub fn interpose_lib_dir(&self) -> PathBuf {
        self.cache_root.join("lib")
    }
}

/// Join mappings into the single-string form carried across `RMP_MAPPINGS`:
/// NUL-separated so no mapping's own characters (including spaces or `:`)
/// need escaping.
pub fn encode_mapping_list(mappings: &[String]) -> String {
    mappings.join("\u{0}")
}

/// Inverse of [`encode_mapping_list`].
pub fn decode_mapping_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split('\u{0}').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_list_round_trips() {
        let mappings = vec!["/a/b/*".to_string(), "/c/d/.e*".to_string()];
        let encoded = encode_mapping_list(&mappings);
        assert_eq!(decode_mapping_list(&encoded), mappings);
    }

    #[test]
    fn empty_mapping_list_decodes_empty() {
        assert!(decode_mapping_list("").is_empty());
    }

    #[test]
    fn runtime_config_falls_back_when_cache_unset() {
        let cfg = RuntimeConfig::from_env(None, None);
        assert!(cfg.cache_root.to_string_lossy().contains("remapper"));
    }

    #[test]
    fn runtime_config_honours_explicit_cache() {
        let cfg = RuntimeConfig::from_env(Some("/custom/cache".to_string()), None);
        assert_eq!(cfg.cache_root, PathBuf::from("/custom/cache"));
        assert_eq!(cfg.trampoline_dir(), PathBuf::from("/custom/cache/trampolines"));
    }
}
