//! Adapter around the system code-signing tool (component C4's
//! dependency on an external "signer").
//!
//! Every invocation below builds an argv vector and hands it straight to
//! [`std::process::Command`] — never a shell — so a path containing shell
//! metacharacters can never be misinterpreted.

use std::io;
use std::path::{Path, PathBuf};

use remapper_core::pathutil;

/// Entitlements granted to a trampoline copy: enough to let `remapper`
/// inject its interposition library into an otherwise hardened-runtime
/// binary, and nothing else.
const ENTITLEMENTS_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>com.apple.security.cs.allow-dyld-environment-variables</key>
    <true/>
    <key>com.apple.security.cs.disable-library-validation</key>
    <true/>
</dict>
</plist>
"#;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("failed to launch signer: {0}")]
    Spawn(#[source] io::Error),
    #[error("signer exited with status {0}")]
    NonZeroExit(i32),
    #[error("failed to write entitlements plist: {0}")]
    Io(#[source] io::Error),
}

/// Query whether `binary` was built with the hardened runtime enabled
/// (hardened-detection step 4, spec.md §4.4). `codesign -d --verbose=4`
/// prints `flags=0x10000(runtime)` for hardened-runtime binaries; anything
/// else (unsigned, ad-hoc signed, signed without the runtime flag) is
/// treated as not hardened. Routed through `remapper_core`'s
/// pipe-subprocess helper (component C2) rather than a raw `Command`, like
/// every other signer invocation here.
pub fn query_runtime_flag(binary: &Path) -> Result<bool, SignerError> {
    let argv = vec![
        "codesign".to_string(),
        "-d".to_string(),
        "--verbose=4".to_string(),
        pathutil::to_utf8(binary)
            .map_err(|_| SignerError::Spawn(io::Error::new(io::ErrorKind::InvalidInput, "non-UTF-8 path")))?,
    ];
    let output = pipe_subprocess(&argv)?;
    // codesign writes its -d output to stderr, not stdout.
    let text = String::from_utf8_lossy(&output.stderr);
    Ok(text
        .lines()
        .find(|l| l.starts_with("flags="))
        .map(|l| l.contains("runtime"))
        .unwrap_or(false))
}

/// Query whether `binary` carries the "allow dyld environment variables"
/// entitlement (hardened-detection step 5, spec.md §4.4): a binary that
/// already opts in doesn't need a trampoline at all.
pub fn has_dyld_env_entitlement(binary: &Path) -> Result<bool, SignerError> {
    let argv = vec![
        "codesign".to_string(),
        "-d".to_string(),
        "--entitlements".to_string(),
        ":-".to_string(),
        pathutil::to_utf8(binary)
            .map_err(|_| SignerError::Spawn(io::Error::new(io::ErrorKind::InvalidInput, "non-UTF-8 path")))?,
    ];
    let output = pipe_subprocess(&argv)?;
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text.contains("com.apple.security.cs.allow-dyld-environment-variables"))
}

/// Route every signer invocation in this module through the shared
/// pipe-subprocess helper (component C2), never a raw shell.
fn pipe_subprocess(argv: &[String]) -> Result<pathutil::SubprocessOutput, SignerError> {
    pathutil::pipe_subprocess(argv).map_err(SignerError::Spawn)
}

/// Write the entitlements plist used by [`resign_ad_hoc`] into `dir`,
/// returning its path. Written atomically (temp file + rename) so a
/// concurrent reader never observes a partial file.
pub fn write_entitlements(dir: &Path) -> Result<PathBuf, SignerError> {
    let final_path = dir.join("entitlements.plist");
    let tmp_path = dir.join(".entitlements.plist.tmp");
    std::fs::write(&tmp_path, ENTITLEMENTS_PLIST).map_err(SignerError::Io)?;
    std::fs::rename(&tmp_path, &final_path).map_err(SignerError::Io)?;
    Ok(final_path)
}

/// Ad-hoc re-sign `binary` in place with the entitlements at
/// `entitlements_path`, replacing any existing signature. This is what
/// strips the hardened-runtime bit from a trampoline copy so
/// `DYLD_INSERT_LIBRARIES` is honoured on it.
pub fn resign_ad_hoc(binary: &Path, entitlements_path: &Path) -> Result<(), SignerError> {
    let argv = vec![
        "codesign".to_string(),
        "-f".to_string(),
        "-s".to_string(),
        "-".to_string(),
        "--entitlements".to_string(),
        pathutil::to_utf8(entitlements_path)
            .map_err(|_| SignerError::Spawn(io::Error::new(io::ErrorKind::InvalidInput, "non-UTF-8 path")))?,
        pathutil::to_utf8(binary)
            .map_err(|_| SignerError::Spawn(io::Error::new(io::ErrorKind::InvalidInput, "non-UTF-8 path")))?,
    ];
    let output = pipe_subprocess(&argv)?;
    if output.code == 0 {
        Ok(())
    } else {
        Err(SignerError::NonZeroExit(output.code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entitlements_plist_grants_exactly_the_two_keys() {
        assert!(ENTITLEMENTS_PLIST.contains("allow-dyld-environment-variables"));
        assert!(ENTITLEMENTS_PLIST.contains("disable-library-validation"));
    }

    #[test]
    fn write_entitlements_is_atomic_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_entitlements(dir.path()).unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents, ENTITLEMENTS_PLIST);
    }
}
