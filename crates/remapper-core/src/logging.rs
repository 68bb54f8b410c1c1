//! Structured logging (spec.md §6 ambient stack).
//!
//! The launcher uses `tracing` + `tracing-subscriber` normally: a `fmt`
//! layer on stderr at the user's chosen verbosity, and, when
//! `RMP_DEBUG_LOG`/`--debug-log` is set, a second unfiltered layer writing
//! to that file. The interposed dylib cannot use `tracing` at all (see
//! `remapper_interpose`'s module docs for why) so it appends lines in the
//! same textual shape by hand with raw `write(2)`; both sides tag every
//! line with a `component` field so `grep component=INTERPOSE debug.log`
//! finds exactly the library's own output even interleaved with the
//! launcher's.

use std::fs::OpenOptions;
use std::path::Path;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry};

/// Component identifiers shared by both the launcher's `tracing` output
/// and the dylib's hand-formatted lines.
pub struct Component;

impl Component {
    pub const CLI: &'static str = "CLI";
    pub const DARWIN: &'static str = "DARWIN";
    pub const LINUX: &'static str = "LINUX";
    pub const MAPPING: &'static str = "MAPPING";
    pub const TRAMPOLINE: &'static str = "TRAMPOLINE";
    pub const INTERPOSE: &'static str = "INTERPOSE";
}

/// Install the global `tracing` subscriber for the `remapper` binary.
/// `debug_log`, when present, receives every event regardless of the
/// ambient `RMP_LOG` filter, matching the dylib's own unconditional
/// append-on-write behaviour so a single file tells the whole story.
pub fn init(debug_log: Option<&Path>) -> std::io::Result<()> {
    let stderr_filter =
        EnvFilter::try_from_env("RMP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let registry = Registry::default().with(stderr_layer);

    if let Some(path) = debug_log {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(BoxMakeWriter::new(std::sync::Mutex::new(file)))
            .with_ansi(false)
            .with_target(false)
            .with_filter(EnvFilter::new("trace"));
        registry.with(file_layer).init();
    } else {
        registry.init();
    }
    Ok(())
}

// === CLI logging macros ===

#[macro_export]
macro_rules! log_cli_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "CLI", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_cli_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "CLI", $($key = $value,)* $msg)
    };
}

// === DARWIN logging macros ===

#[macro_export]
macro_rules! log_darwin_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "DARWIN", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_darwin_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "DARWIN", $($key = $value,)* $msg)
    };
}

// === LINUX logging macros ===

#[macro_export]
macro_rules! log_linux_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "LINUX", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_linux_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "LINUX", $($key = $value,)* $msg)
    };
}

// === TRAMPOLINE logging macros ===

#[macro_export]
macro_rules! log_trampoline_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "TRAMPOLINE", $($key = $value,)* $msg)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::CLI, "CLI");
        assert_eq!(Component::DARWIN, "DARWIN");
        assert_eq!(Component::INTERPOSE, "INTERPOSE");
    }
}
