//! `remapper`: launch a program with a private, redirected view of parts
//! of the filesystem.
//!
//! See `adapter` for the argv grammar, `darwin`/`linux` for the two
//! platform launchers, and the crate root of `remapper-core` for the
//! shared mapping/path model both of them build on.

mod adapter;

#[cfg(target_os = "macos")]
mod darwin;

#[cfg(target_os = "linux")]
mod linux;

use std::process::ExitCode;

use adapter::TopLevel;
use remapper_core::config::RuntimeConfig;

const USAGE: &str = "\
remapper - launch a program with a private, redirected view of the filesystem

USAGE:
    remapper [--debug-log FILE] <target-dir> MAPPING [MAPPING...] [--] COMMAND [ARGS...]
    remapper <target-dir> MAPPING COMMAND [ARGS...]    (shortcut for a single mapping)
    remapper --version
    remapper --help

A MAPPING has the form PARENT_DIR/GLOB, e.g. ~/.claude* — anything under
PARENT_DIR whose next path component matches GLOB is redirected into a
private target directory for the duration of COMMAND.
";

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();

    // Re-exec guard: a child process of an already-launched remapper
    // invocation (e.g. a shebang interpreter re-exec'd by the dylib on
    // Darwin) must never re-parse argv as a fresh remapper invocation.
    if std::env::var(remapper_core::config::vars::REENTRY_GUARD).is_ok() {
        eprintln!("remapper: refusing to re-enter an active launch");
        return ExitCode::from(127);
    }

    match adapter::parse(&argv) {
        Ok(TopLevel::ShowVersion) => {
            println!("remapper {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Ok(TopLevel::ShowHelp) => {
            print!("{USAGE}");
            ExitCode::SUCCESS
        }
        Ok(TopLevel::Launch(parsed)) => run(parsed),
        Err(e) => {
            // argument-error (spec.md §7): malformed CLI, missing
            // command, missing mappings, unknown flag.
            eprintln!("remapper: {e}");
            eprint!("{USAGE}");
            ExitCode::from(1)
        }
    }
}

fn run(parsed: adapter::ParsedArgs) -> ExitCode {
    let debug_log = std::env::var("RMP_DEBUG_LOG")
        .ok()
        .map(std::path::PathBuf::from)
        .or_else(|| parsed.debug_log.clone());

    if let Err(e) = remapper_core::logging::init(debug_log.as_deref()) {
        eprintln!("remapper: failed to initialize logging: {e}");
        return ExitCode::from(127);
    }

    let runtime = RuntimeConfig::with_config(
        std::env::var("RMP_CONFIG").ok(),
        std::env::var("RMP_CACHE").ok(),
        debug_log.as_ref().map(|p| p.to_string_lossy().into_owned()),
    );

    let target_dir = parsed.target_dir.clone();
    let target = match adapter::resolve_target(target_dir) {
        Ok(t) => t,
        Err(e) => {
            // io-error (spec.md §7): fatal in the launcher.
            eprintln!("remapper: failed to prepare target directory: {e}");
            return ExitCode::from(127);
        }
    };

    let request = match adapter::build_request(parsed, target) {
        Ok(r) => r,
        Err(e) => {
            // argument-error (spec.md §7): bad mapping syntax, too many
            // mappings, or no command given.
            eprintln!("remapper: {e}");
            eprint!("{USAGE}");
            return ExitCode::from(1);
        }
    };

    let result = dispatch(request, &runtime);
    match result {
        Ok(infallible) => match infallible {},
        Err(e) => {
            eprintln!("remapper: {e:#}");
            ExitCode::from(127)
        }
    }
}

#[cfg(target_os = "macos")]
fn dispatch(
    request: remapper_core::LaunchRequest,
    runtime: &RuntimeConfig,
) -> anyhow::Result<std::convert::Infallible> {
    darwin::launch(request, runtime)
}

#[cfg(target_os = "linux")]
fn dispatch(
    request: remapper_core::LaunchRequest,
    runtime: &RuntimeConfig,
) -> anyhow::Result<std::convert::Infallible> {
    linux::launch(request, runtime)
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn dispatch(
    _request: remapper_core::LaunchRequest,
    _runtime: &RuntimeConfig,
) -> anyhow::Result<std::convert::Infallible> {
    anyhow::bail!("remapper supports macOS and Linux only")
}
