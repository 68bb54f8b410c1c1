//! Path utilities shared by the CLI adapter, the mapping model and both
//! launchers (spec.md §4.2, component C2).
//!
//! Nothing here touches a shell: wherever a subprocess is needed the
//! argv vector is built by hand and handed to `execv`/`posix_spawn`-style
//! primitives, matching the rest of the crate's "never `/bin/sh -c`" rule.

use std::env;
use std::ffi::{CStr, CString, OsString};
use std::fs;
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

/// Errors surfaced by the path utilities.
#[derive(Debug, thiserror::Error)]
pub enum PathUtilError {
    #[error("could not determine the current user's home directory")]
    NoHomeDir,
    #[error("could not determine the current working directory: {0}")]
    NoCwd(#[source] io::Error),
    #[error("failed to create directory {path}: {source}")]
    Mkdir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("path is not valid UTF-8: {0:?}")]
    NotUtf8(OsString),
}

/// Expand a leading `~` or `~/...` using [`home_dir`]. A bare `~user` is
/// left untouched: this crate only launches processes as the invoking
/// user, so resolving other users' home directories is out of scope.
pub fn expand_tilde(raw: &str) -> Result<String, PathUtilError> {
    if raw == "~" {
        return home_dir().map(|h| h.to_string_lossy().into_owned());
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        let home = home_dir()?;
        return Ok(format!("{}/{}", home.to_string_lossy().trim_end_matches('/'), rest));
    }
    Ok(raw.to_string())
}

/// Resolve the invoking user's home directory: `$HOME` first, then
/// `getpwuid_r` as a fallback for environments where `HOME` is unset
/// (cron jobs, stripped-down containers).
pub fn home_dir() -> Result<PathBuf, PathUtilError> {
    if let Ok(h) = env::var("HOME") {
        if !h.is_empty() {
            return Ok(PathBuf::from(h));
        }
    }
    getpwuid_home().ok_or(PathUtilError::NoHomeDir)
}

#[cfg(unix)]
fn getpwuid_home() -> Option<PathBuf> {
    // SAFETY: getpwuid_r is called with a correctly sized buffer and its
    // output pointer is checked before use; no data escapes this function
    // without being copied into owned Rust memory first.
    unsafe {
        let uid = libc::getuid();
        let mut buf = vec![0i8; 16384];
        let mut pwd: libc::passwd = std::mem::zeroed();
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = libc::getpwuid_r(
            uid,
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        );
        if rc != 0 || result.is_null() || pwd.pw_dir.is_null() {
            return None;
        }
        let dir = CStr::from_ptr(pwd.pw_dir);
        Some(PathBuf::from(OsString::from_vec(dir.to_bytes().to_vec())))
    }
}

/// Make `raw` absolute by joining it onto the current working directory if
/// it is relative, then normalise it lexically (collapse `.` and resolve
/// `..` against the path *text*, never touching the filesystem). Symlinks
/// are intentionally left unresolved: redirection should apply to the path
/// the user typed, not whatever it happens to point at today.
pub fn absolutise(raw: &str) -> Result<String, PathUtilError> {
    let joined = if raw.starts_with('/') {
        PathBuf::from(raw)
    } else {
        let cwd = env::current_dir().map_err(PathUtilError::NoCwd)?;
        cwd.join(raw)
    };
    Ok(normalize_lexically(&joined))
}

/// Collapse `.` and `..` components and repeated slashes without touching
/// the filesystem or following symlinks.
fn normalize_lexically(path: &Path) -> String {
    use std::path::Component;

    let mut out: Vec<String> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::RootDir => {
                if out.is_empty() {
                    out.push(String::new());
                }
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if out.len() > 1 {
                    out.pop();
                }
            }
            Component::Normal(part) => {
                out.push(part.to_string_lossy().into_owned());
            }
            Component::Prefix(_) => {}
        }
    }
    if out.len() <= 1 {
        "/".to_string()
    } else {
        out.join("/")
    }
}

/// Create `dir` and all missing ancestors, mirroring `mkdir -p`
/// (component C2, used by the trampoline cache and the Linux target
/// scaffolding).
pub fn mkdirs(dir: &Path) -> Result<(), PathUtilError> {
    fs::create_dir_all(dir).map_err(|source| PathUtilError::Mkdir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Search `$PATH` for an executable named `name`, mirroring what the
/// kernel does when `execvp` is given a bare name (used by shebang
/// resolution and `/usr/bin/env PROG` lookups).
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let p = PathBuf::from(name);
        return is_executable(&p).then_some(p);
    }
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// The outcome of running a subprocess to completion with both of its
/// output streams captured.
pub struct SubprocessOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Run `argv[0]` with `argv[1..]` to completion, capturing stdout and
/// stderr, with no shell involved anywhere (component C2's "pipe
/// subprocess" helper; the signer adapter and hardened-runtime probe are
/// the only callers, since `codesign` writes its interesting output to
/// stderr).
pub fn pipe_subprocess(argv: &[String]) -> io::Result<SubprocessOutput> {
    let output = std::process::Command::new(&argv[0]).args(&argv[1..]).output()?;
    Ok(SubprocessOutput {
        code: output.status.code().unwrap_or(-1),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Convert an `OsStr`-bearing path into UTF-8, the representation this
/// crate uses throughout (spec.md assumes UTF-8 paths; see Non-goals).
pub fn to_utf8(path: &Path) -> Result<String, PathUtilError> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| PathUtilError::NotUtf8(path.as_os_str().to_owned()))
}

/// Build a `CString` from a path for use with raw libc calls, failing
/// cleanly on embedded NULs rather than truncating.
pub fn to_cstring(path: &str) -> io::Result<CString> {
    CString::new(path).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dot_and_dotdot() {
        assert_eq!(normalize_lexically(Path::new("/a/./b/../c")), "/a/c");
        assert_eq!(normalize_lexically(Path::new("/a//b")), "/a/b");
        assert_eq!(normalize_lexically(Path::new("/")), "/");
    }

    #[test]
    fn normalize_does_not_escape_root() {
        assert_eq!(normalize_lexically(Path::new("/../../a")), "/a");
    }

    #[test]
    fn expand_tilde_only_rewrites_leading_tilde() {
        std::env::set_var("HOME", "/home/person");
        assert_eq!(expand_tilde("~/project").unwrap(), "/home/person/project");
        assert_eq!(expand_tilde("/not~/project").unwrap(), "/not~/project");
        assert_eq!(expand_tilde("~otheruser/x").unwrap(), "~otheruser/x");
    }

    #[test]
    fn absolutise_is_idempotent_for_absolute_input() {
        assert_eq!(absolutise("/a/b/c").unwrap(), "/a/b/c");
    }

    #[test]
    fn find_in_path_rejects_nonexecutable() {
        assert!(find_in_path("definitely-not-a-real-binary-xyz").is_none());
    }
}
