//! Darwin launcher (component C8, spec.md §4.8): materialises the
//! `remapper-interpose` dylib onto disk (C3), builds the environment the
//! dylib reads on process start, resolves the target program through the
//! same shebang/trampoline logic the dylib itself applies to execs it
//! intercepts, and finally `exec`s it with `DYLD_INSERT_LIBRARIES` set.

use std::fs;
use std::io::Write;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use remapper_core::config::{encode_mapping_list, vars, RuntimeConfig};
use remapper_core::logging::Component;
use remapper_core::LaunchRequest;
use remapper_interpose::{shebang, trampoline};

const DYLIB_FILE_NAME: &str = "libremapper_interpose.dylib";

/// Find the compiled `remapper_interpose` cdylib that C3 will install. A
/// genuine `include_bytes!` of the sibling crate's cdylib output would
/// need Cargo's artifact-dependency feature, which isn't stable; this
/// searches the same places the reference's own launcher searches for its
/// shared library, next to the running executable first (the layout once
/// installed), falling back to the Cargo build directories for
/// development runs.
fn find_interpose_dylib() -> Result<PathBuf> {
    let candidates = [
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.join(DYLIB_FILE_NAME))),
        Some(PathBuf::from("target/release").join(DYLIB_FILE_NAME)),
        Some(PathBuf::from("target/debug").join(DYLIB_FILE_NAME)),
        Some(PathBuf::from("/usr/local/lib/remapper").join(DYLIB_FILE_NAME)),
    ];

    for candidate in candidates.into_iter().flatten() {
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    bail!(
        "could not find {DYLIB_FILE_NAME}; build it with \
         `cargo build -p remapper-interpose --release`"
    );
}

/// Component C3: materialise the interpose library under `lib_dir`,
/// rewriting it only when missing or size-mismatched against `source`.
/// The size-only check is deliberate — the launcher and the library it
/// installs are built in lockstep, so a size match is sufficient evidence
/// the on-disk copy is current, and skipping a full hash avoids rereading
/// a multi-megabyte dylib on every launch.
fn extract_interpose_library(source: &Path, lib_dir: &Path) -> Result<PathBuf> {
    let installed = lib_dir.join(DYLIB_FILE_NAME);
    let source_len = fs::metadata(source)
        .with_context(|| format!("stat {}", source.display()))?
        .len();

    if let Ok(existing) = fs::metadata(&installed) {
        if existing.len() == source_len {
            return Ok(installed);
        }
    }

    remapper_core::pathutil::mkdirs(lib_dir).context("creating interpose library directory")?;
    let tmp_path = lib_dir.join(format!(".{DYLIB_FILE_NAME}.tmp.{}", std::process::id()));
    let bytes = fs::read(source).with_context(|| format!("reading {}", source.display()))?;
    {
        let mut tmp = fs::File::create(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        tmp.write_all(&bytes)
            .with_context(|| format!("writing {}", tmp_path.display()))?;
    }
    fs::rename(&tmp_path, &installed)
        .with_context(|| format!("installing {}", installed.display()))?;
    Ok(installed)
}

/// Run `request` under Darwin library interposition.
pub fn launch(request: LaunchRequest, runtime: &RuntimeConfig) -> Result<std::convert::Infallible> {
    let found = find_interpose_dylib()?;
    let dylib_path = extract_interpose_library(&found, &runtime.interpose_lib_dir())?;

    let (program_path, exec_argv) = resolve_exec_target(&request.program, &request.args, runtime)?;

    let encoded_mappings = encode_mapping_list(
        &request
            .mappings
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>(),
    );

    tracing::info!(
        component = Component::DARWIN,
        program = %program_path.display(),
        mappings = request.mappings.len(),
        "launching under interposition"
    );

    // If the caller already has injections of its own, preserve them by
    // prepending ours (spec.md §6: "If the dyld-injection variable is
    // already set in the environment, prepend (colon-separated) so
    // existing injections are preserved").
    let dyld_insert = match std::env::var("DYLD_INSERT_LIBRARIES") {
        Ok(existing) if !existing.is_empty() => {
            format!("{}:{}", dylib_path.display(), existing)
        }
        _ => dylib_path.display().to_string(),
    };

    let mut cmd = Command::new(&program_path);
    cmd.arg0(&exec_argv[0]);
    cmd.args(&exec_argv[1..]);
    cmd.env(vars::MAPPINGS, &encoded_mappings);
    cmd.env(vars::TARGET, request.target.as_prefix());
    cmd.env(vars::CONFIG, &runtime.config_root);
    cmd.env(vars::CACHE, &runtime.cache_root);
    cmd.env("DYLD_INSERT_LIBRARIES", &dyld_insert);
    cmd.env("DYLD_FORCE_FLAT_NAMESPACE", "1");
    cmd.env(vars::REENTRY_GUARD, "1");
    if let Some(log) = &request.debug_log {
        cmd.env(vars::DEBUG_LOG, log);
    }

    let err = cmd.exec();
    bail!("failed to exec {}: {err}", program_path.display());
}

/// Resolve `program`/`args` into the actual binary and argv to exec, the
/// same way the interposed `execve`/`posix_spawn` wrappers do (component
/// C6, spec.md §4.6): locate `program` on `PATH`, then try C5's shebang
/// rewrite (which replaces both the binary and argv) before falling back
/// to C4's trampoline substitution (which replaces only the binary — the
/// caller's argv is passed through unchanged). C4 and C5 are mutually
/// exclusive for a given target.
fn resolve_exec_target(program: &str, args: &[String], runtime: &RuntimeConfig) -> Result<(PathBuf, Vec<String>)> {
    let located =
        remapper_core::pathutil::find_in_path(program).unwrap_or_else(|| PathBuf::from(program));

    let mut full_argv = vec![program.to_string()];
    full_argv.extend(args.iter().cloned());

    if let Some((new_binary, new_argv)) =
        shebang::resolve_for_exec(&located, &full_argv, &runtime.trampoline_dir())
    {
        return Ok((new_binary, new_argv));
    }

    // Trampoline-only substitution: the binary changes but argv is
    // passed through exactly as the caller gave it (spec.md §4.6 step 4).
    let trampolined = trampoline::resolve(&located, &runtime.trampoline_dir())
        .with_context(|| format!("resolving trampoline for {}", located.display()))?;
    Ok((trampolined, full_argv))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_interpose_dylib_errors_clearly_when_absent() {
        // In this sandboxed test environment no build output exists, so
        // the lookup should fail with a helpful message rather than panic.
        let result = find_interpose_dylib();
        if let Err(e) = result {
            assert!(e.to_string().contains(DYLIB_FILE_NAME));
        }
    }

    #[test]
    fn extract_interpose_library_copies_once_then_skips_matching_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.dylib");
        fs::write(&source, b"fake mach-o bytes").unwrap();
        let lib_dir = dir.path().join("lib");

        let installed = extract_interpose_library(&source, &lib_dir).unwrap();
        assert_eq!(fs::read(&installed).unwrap(), b"fake mach-o bytes");

        fs::write(&installed, b"tampered").unwrap();
        let installed_again = extract_interpose_library(&source, &lib_dir).unwrap();
        assert_eq!(fs::read(&installed_again).unwrap(), b"tampered");
    }

    #[test]
    fn extract_interpose_library_rewrites_on_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.dylib");
        fs::write(&source, b"fake mach-o bytes").unwrap();
        let lib_dir = dir.path().join("lib");
        fs::create_dir_all(&lib_dir).unwrap();
        fs::write(lib_dir.join(DYLIB_FILE_NAME), b"short").unwrap();

        let installed = extract_interpose_library(&source, &lib_dir).unwrap();
        assert_eq!(fs::read(&installed).unwrap(), b"fake mach-o bytes");
    }
}
