//! Exec/spawn routing (component C6, spec.md §4.6): `execve`, `execv`,
//! `execvp`, `posix_spawn`, `posix_spawnp`.
//!
//! Every entry point resolves its target to an absolute path (searching
//! `PATH` for the `*p` variants, via component C2), then tries C5's
//! shebang rewrite before falling back to C4's trampoline substitution —
//! the two are mutually exclusive for a given target, since a binary
//! either needs its argv rebuilt around a resolved interpreter or it
//! doesn't need anything but a re-signed copy. [`crate::state::ReentrancyGuard`]
//! also covers C5/C4 probing, since both can themselves trigger an
//! interposed `execve` (the signer subprocess).

use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_void};
use std::path::Path;

use remapper_core::pathutil;

use crate::interpose::{read_c_path, real_execv, real_execve, real_execvp, real_posix_spawn, real_posix_spawnp};
use crate::state::{InterposerState, ReentrancyGuard};
use crate::{shebang, trampoline};

/// Upper bound on argv slots this library will read or rebuild, matching
/// spec.md §4.6's cap on exec/spawn routing.
const MAX_ARGV: usize = 256;

enum ExecRewrite {
    None,
    PathOnly(CString),
    Full(CString, Vec<CString>),
}

fn cache_dir() -> std::path::PathBuf {
    let cache = std::env::var(remapper_core::config::vars::CACHE).ok();
    remapper_core::config::RuntimeConfig::from_env(cache, None).trampoline_dir()
}

/// Read a NUL-terminated C argv array into owned strings, capped at
/// [`MAX_ARGV`] entries.
unsafe fn read_argv(argv: *const *const c_char) -> Vec<String> {
    let mut out = Vec::new();
    if argv.is_null() {
        return out;
    }
    for i in 0..MAX_ARGV {
        let ptr = *argv.add(i);
        if ptr.is_null() {
            break;
        }
        out.push(read_c_path(ptr).unwrap_or_default());
    }
    out
}

/// Build a NUL-terminated pointer array over `args`, valid only as long as
/// `args` itself stays alive.
fn build_argv_ptrs(args: &[CString]) -> Vec<*const c_char> {
    let mut ptrs: Vec<*const c_char> = args.iter().take(MAX_ARGV).map(|c| c.as_ptr()).collect();
    ptrs.push(std::ptr::null());
    ptrs
}

/// Run the C6 routing decision for a target already resolved to an
/// absolute path. Returns [`ExecRewrite::None`] whenever this process
/// wasn't launched under `remapper`, or neither C5 nor C4 has anything to
/// do for this target.
fn route(absolute_path: &str, orig_argv: &[String]) -> ExecRewrite {
    if InterposerState::get().is_none() {
        return ExecRewrite::None;
    }
    let cache_dir = cache_dir();
    let script_path = Path::new(absolute_path);

    if let Some((new_binary, new_argv)) = shebang::resolve_for_exec(script_path, orig_argv, &cache_dir) {
        let Ok(new_binary_c) = pathutil::to_cstring(&new_binary.to_string_lossy()) else {
            return ExecRewrite::None;
        };
        let new_argv_c: Vec<CString> = new_argv
            .iter()
            .filter_map(|s| CString::new(s.as_str()).ok())
            .collect();
        if new_argv_c.len() != new_argv.len() {
            return ExecRewrite::None;
        }
        return ExecRewrite::Full(new_binary_c, new_argv_c);
    }

    match trampoline::resolve(script_path, &cache_dir) {
        Ok(resolved) if resolved != script_path => match pathutil::to_cstring(&resolved.to_string_lossy()) {
            Ok(c) => ExecRewrite::PathOnly(c),
            Err(_) => ExecRewrite::None,
        },
        _ => ExecRewrite::None,
    }
}

#[no_mangle]
pub unsafe extern "C" fn rmp_execve(
    path: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let guard = ReentrancyGuard::enter();
    if guard.is_reentrant() {
        return real_execve(path, argv, envp);
    }
    let Some(path_str) = read_c_path(path).and_then(|p| pathutil::absolutise(&p).ok()) else {
        return real_execve(path, argv, envp);
    };
    let orig_argv = read_argv(argv);
    match route(&path_str, &orig_argv) {
        ExecRewrite::None => real_execve(path, argv, envp),
        ExecRewrite::PathOnly(new_path) => real_execve(new_path.as_ptr(), argv, envp),
        ExecRewrite::Full(new_path, new_argv) => {
            let ptrs = build_argv_ptrs(&new_argv);
            real_execve(new_path.as_ptr(), ptrs.as_ptr(), envp)
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn rmp_execv(path: *const c_char, argv: *const *const c_char) -> c_int {
    let guard = ReentrancyGuard::enter();
    if guard.is_reentrant() {
        return real_execv(path, argv);
    }
    let Some(path_str) = read_c_path(path).and_then(|p| pathutil::absolutise(&p).ok()) else {
        return real_execv(path, argv);
    };
    let orig_argv = read_argv(argv);
    match route(&path_str, &orig_argv) {
        ExecRewrite::None => real_execv(path, argv),
        ExecRewrite::PathOnly(new_path) => real_execv(new_path.as_ptr(), argv),
        ExecRewrite::Full(new_path, new_argv) => {
            let ptrs = build_argv_ptrs(&new_argv);
            real_execv(new_path.as_ptr(), ptrs.as_ptr())
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn rmp_execvp(file: *const c_char, argv: *const *const c_char) -> c_int {
    let guard = ReentrancyGuard::enter();
    if guard.is_reentrant() {
        return real_execvp(file, argv);
    }
    let Some(file_str) = read_c_path(file) else {
        return real_execvp(file, argv);
    };
    let Some(located) = locate_on_path(&file_str) else {
        return real_execvp(file, argv);
    };
    let orig_argv = read_argv(argv);
    match route(&located, &orig_argv) {
        ExecRewrite::None => real_execvp(file, argv),
        // The located path is already absolute, so the substituted call
        // goes through `execv`, not `execvp`, to avoid a second PATH
        // search against a name that may no longer exist verbatim.
        ExecRewrite::PathOnly(new_path) => real_execv(new_path.as_ptr(), argv),
        ExecRewrite::Full(new_path, new_argv) => {
            let ptrs = build_argv_ptrs(&new_argv);
            real_execv(new_path.as_ptr(), ptrs.as_ptr())
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn rmp_posix_spawn(
    pid: *mut libc::pid_t,
    path: *const c_char,
    file_actions: *const c_void,
    attrp: *const c_void,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let guard = ReentrancyGuard::enter();
    if guard.is_reentrant() {
        return real_posix_spawn(pid, path, file_actions, attrp, argv, envp);
    }
    let Some(path_str) = read_c_path(path).and_then(|p| pathutil::absolutise(&p).ok()) else {
        return real_posix_spawn(pid, path, file_actions, attrp, argv, envp);
    };
    let orig_argv = read_argv(argv);
    match route(&path_str, &orig_argv) {
        ExecRewrite::None => real_posix_spawn(pid, path, file_actions, attrp, argv, envp),
        ExecRewrite::PathOnly(new_path) => real_posix_spawn(pid, new_path.as_ptr(), file_actions, attrp, argv, envp),
        ExecRewrite::Full(new_path, new_argv) => {
            let ptrs = build_argv_ptrs(&new_argv);
            real_posix_spawn(pid, new_path.as_ptr(), file_actions, attrp, ptrs.as_ptr(), envp)
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn rmp_posix_spawnp(
    pid: *mut libc::pid_t,
    file: *const c_char,
    file_actions: *const c_void,
    attrp: *const c_void,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    let guard = ReentrancyGuard::enter();
    if guard.is_reentrant() {
        return real_posix_spawnp(pid, file, file_actions, attrp, argv, envp);
    }
    let Some(file_str) = read_c_path(file) else {
        return real_posix_spawnp(pid, file, file_actions, attrp, argv, envp);
    };
    let Some(located) = locate_on_path(&file_str) else {
        return real_posix_spawnp(pid, file, file_actions, attrp, argv, envp);
    };
    let orig_argv = read_argv(argv);
    match route(&located, &orig_argv) {
        ExecRewrite::None => real_posix_spawnp(pid, file, file_actions, attrp, argv, envp),
        ExecRewrite::PathOnly(new_path) => {
            real_posix_spawn(pid, new_path.as_ptr(), file_actions, attrp, argv, envp)
        }
        ExecRewrite::Full(new_path, new_argv) => {
            let ptrs = build_argv_ptrs(&new_argv);
            real_posix_spawn(pid, new_path.as_ptr(), file_actions, attrp, ptrs.as_ptr(), envp)
        }
    }
}

fn locate_on_path(name: &str) -> Option<String> {
    pathutil::find_in_path(name).map(|p| p.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_argv_ptrs_null_terminates() {
        let args = vec![CString::new("a").unwrap(), CString::new("b").unwrap()];
        let ptrs = build_argv_ptrs(&args);
        assert_eq!(ptrs.len(), 3);
        assert!(ptrs.last().unwrap().is_null());
    }

    #[test]
    fn read_argv_stops_at_null_terminator() {
        let a = CString::new("one").unwrap();
        let b = CString::new("two").unwrap();
        let raw: [*const c_char; 3] = [a.as_ptr(), b.as_ptr(), std::ptr::null()];
        let result = unsafe { read_argv(raw.as_ptr()) };
        assert_eq!(result, vec!["one".to_string(), "two".to_string()]);
    }
}
