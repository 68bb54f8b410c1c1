//! `__DATA,__interpose` table and the shared plumbing every interposed
//! wrapper builds on (components C6 exec/spawn routing and C7 filesystem
//! call redirection, spec.md §4.6/§4.7). The wrapper functions themselves
//! live one file per libc family under [`crate::syscalls`]; this module
//! holds only the `real_*` symbol declarations they call through to, the
//! rewrite helper they share, and the interpose table that wires each
//! `rmp_*` entry point to the libc symbol it replaces.
//!
//! Every wrapper follows the same shape: try to rewrite the path
//! argument(s) through the process's [`InterposerState`], then call
//! straight through to the real libc symbol with either the rewritten or
//! the original path. Nothing here may fail loudly — on any internal error
//! (state not ready, path not valid UTF-8, rewrite overflow) the original
//! argument is used unchanged, matching spec.md §9's "never break a call
//! the user didn't ask us to redirect" principle.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};

use remapper_core::mapping;

use crate::state::{debug_log, InterposerState, ReentrancyGuard};

/// Rewrite a raw C string path argument if it matches a mapping, returning
/// an owned `CString` to keep the rewritten bytes alive for the real call.
/// Returns `None` when nothing should change, in which case the caller
/// must pass the original pointer through untouched.
pub(crate) unsafe fn rewrite_c_path(raw: *const c_char) -> Option<CString> {
    if raw.is_null() {
        return None;
    }
    let state = InterposerState::get()?;
    let candidate = CStr::from_ptr(raw).to_str().ok()?;
    let rewritten = mapping::rewrite(candidate, &state.mappings, &state.target_prefix)?;
    debug_log("INTERPOSE", format!("{candidate} -> {rewritten}").as_bytes());
    CString::new(rewritten).ok()
}

/// Read a raw C string path argument into an owned `String`, without
/// rewriting it. Used by `*at` wrappers that only rewrite when the input
/// is absolute (spec.md §4.7).
pub(crate) unsafe fn read_c_path(raw: *const c_char) -> Option<String> {
    if raw.is_null() {
        return None;
    }
    CStr::from_ptr(raw).to_str().ok().map(str::to_string)
}

pub(crate) fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
}

macro_rules! with_rewritten_path {
    ($raw_path:expr, $real:expr, $body:expr) => {{
        let guard = ReentrancyGuard::enter();
        if guard.is_reentrant() {
            return $real;
        }
        match $crate::interpose::rewrite_c_path($raw_path) {
            Some(owned) => {
                let f = $body;
                f(owned.as_ptr())
            }
            None => $real,
        }
    }};
}
pub(crate) use with_rewritten_path;

/// Like [`with_rewritten_path`] but only attempts a rewrite when `$raw_path`
/// is absolute, matching the `*at` family's rewrite rule (spec.md §4.7): a
/// relative path is resolved against `$dirfd`, which this library has no
/// visibility into, so rewriting it would silently change the path's
/// meaning.
macro_rules! with_rewritten_path_if_absolute {
    ($raw_path:expr, $real:expr, $body:expr) => {{
        let guard = ReentrancyGuard::enter();
        if guard.is_reentrant() {
            return $real;
        }
        match $crate::interpose::read_c_path($raw_path) {
            Some(ref s) if $crate::interpose::is_absolute(s) => match $crate::interpose::rewrite_c_path($raw_path) {
                Some(owned) => {
                    let f = $body;
                    f(owned.as_ptr())
                }
                None => $real,
            },
            _ => $real,
        }
    }};
}
pub(crate) use with_rewritten_path_if_absolute;

extern "C" {
    #[link_name = "stat"]
    pub(crate) fn real_stat(path: *const c_char, buf: *mut libc::stat) -> c_int;
    #[link_name = "lstat"]
    pub(crate) fn real_lstat(path: *const c_char, buf: *mut libc::stat) -> c_int;
    #[link_name = "fstatat"]
    pub(crate) fn real_fstatat(dirfd: c_int, path: *const c_char, buf: *mut libc::stat, flags: c_int) -> c_int;

    #[link_name = "access"]
    pub(crate) fn real_access(path: *const c_char, mode: c_int) -> c_int;
    #[link_name = "faccessat"]
    pub(crate) fn real_faccessat(dirfd: c_int, path: *const c_char, mode: c_int, flags: c_int) -> c_int;

    #[link_name = "mkdir"]
    pub(crate) fn real_mkdir(path: *const c_char, mode: libc::mode_t) -> c_int;
    #[link_name = "mkdirat"]
    pub(crate) fn real_mkdirat(dirfd: c_int, path: *const c_char, mode: libc::mode_t) -> c_int;

    #[link_name = "unlink"]
    pub(crate) fn real_unlink(path: *const c_char) -> c_int;
    #[link_name = "unlinkat"]
    pub(crate) fn real_unlinkat(dirfd: c_int, path: *const c_char, flags: c_int) -> c_int;
    #[link_name = "rmdir"]
    pub(crate) fn real_rmdir(path: *const c_char) -> c_int;

    #[link_name = "rename"]
    pub(crate) fn real_rename(old: *const c_char, new: *const c_char) -> c_int;
    #[link_name = "renameat"]
    pub(crate) fn real_renameat(olddirfd: c_int, old: *const c_char, newdirfd: c_int, new: *const c_char) -> c_int;

    #[link_name = "symlink"]
    pub(crate) fn real_symlink(target: *const c_char, linkpath: *const c_char) -> c_int;
    #[link_name = "symlinkat"]
    pub(crate) fn real_symlinkat(target: *const c_char, newdirfd: c_int, linkpath: *const c_char) -> c_int;

    #[link_name = "link"]
    pub(crate) fn real_link(old: *const c_char, new: *const c_char) -> c_int;
    #[link_name = "linkat"]
    pub(crate) fn real_linkat(
        olddirfd: c_int,
        old: *const c_char,
        newdirfd: c_int,
        new: *const c_char,
        flags: c_int,
    ) -> c_int;

    #[link_name = "truncate"]
    pub(crate) fn real_truncate(path: *const c_char, len: libc::off_t) -> c_int;

    #[link_name = "readlink"]
    pub(crate) fn real_readlink(path: *const c_char, buf: *mut c_char, bufsz: libc::size_t) -> libc::ssize_t;
    #[link_name = "readlinkat"]
    pub(crate) fn real_readlinkat(
        dirfd: c_int,
        path: *const c_char,
        buf: *mut c_char,
        bufsz: libc::size_t,
    ) -> libc::ssize_t;

    #[link_name = "chmod"]
    pub(crate) fn real_chmod(path: *const c_char, mode: libc::mode_t) -> c_int;
    #[link_name = "fchmodat"]
    pub(crate) fn real_fchmodat(dirfd: c_int, path: *const c_char, mode: libc::mode_t, flags: c_int) -> c_int;

    #[link_name = "chown"]
    pub(crate) fn real_chown(path: *const c_char, owner: libc::uid_t, group: libc::gid_t) -> c_int;
    #[link_name = "lchown"]
    pub(crate) fn real_lchown(path: *const c_char, owner: libc::uid_t, group: libc::gid_t) -> c_int;
    #[link_name = "fchownat"]
    pub(crate) fn real_fchownat(
        dirfd: c_int,
        path: *const c_char,
        owner: libc::uid_t,
        group: libc::gid_t,
        flags: c_int,
    ) -> c_int;

    #[link_name = "chdir"]
    pub(crate) fn real_chdir(path: *const c_char) -> c_int;
    #[link_name = "opendir"]
    pub(crate) fn real_opendir(path: *const c_char) -> *mut libc::DIR;

    #[link_name = "realpath"]
    pub(crate) fn real_realpath(path: *const c_char, resolved: *mut c_char) -> *mut c_char;

    #[link_name = "execve"]
    pub(crate) fn real_execve(path: *const c_char, argv: *const *const c_char, envp: *const *const c_char) -> c_int;
    #[link_name = "execv"]
    pub(crate) fn real_execv(path: *const c_char, argv: *const *const c_char) -> c_int;
    #[link_name = "execvp"]
    pub(crate) fn real_execvp(file: *const c_char, argv: *const *const c_char) -> c_int;
    #[link_name = "posix_spawn"]
    pub(crate) fn real_posix_spawn(
        pid: *mut libc::pid_t,
        path: *const c_char,
        file_actions: *const c_void,
        attrp: *const c_void,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> c_int;
    #[link_name = "posix_spawnp"]
    pub(crate) fn real_posix_spawnp(
        pid: *mut libc::pid_t,
        file: *const c_char,
        file_actions: *const c_void,
        attrp: *const c_void,
        argv: *const *const c_char,
        envp: *const *const c_char,
    ) -> c_int;

    // Variadic open/openat/creat are bridged through a small C shim
    // (build.rs compiles src/c/variadic.c) because stable Rust cannot
    // portably read a C va_list; these take a fixed-arity mode argument
    // that the shim only forwards to the real call when O_CREAT/O_TMPFILE
    // is set, matching glibc/libSystem's own contract.
    pub(crate) fn rmp_shim_open(path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int;
    pub(crate) fn rmp_shim_openat(dirfd: c_int, path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int;
    pub(crate) fn rmp_shim_creat(path: *const c_char, mode: libc::mode_t) -> c_int;
}

/// The Mach-O interpose record: `{ new, old }` pairs placed in a section
/// `dyld` scans at load time and rewrites every call site referencing
/// `old` (within this image and anything loaded after it) to call `new`
/// instead.
#[repr(C)]
struct Interpose {
    new_func: *const c_void,
    old_func: *const c_void,
}

unsafe impl Sync for Interpose {}

macro_rules! interpose_entry {
    ($name:ident, $new:expr, $old:expr) => {
        #[used]
        #[link_section = "__DATA,__interpose"]
        static $name: Interpose = Interpose {
            new_func: $new as *const c_void,
            old_func: $old as *const c_void,
        };
    };
}

#[cfg(target_os = "macos")]
mod table {
    use super::*;
    use crate::syscalls::{dir, exec, open, path_ops, stat};

    extern "C" {
        fn open(path: *const c_char, flags: c_int, ...) -> c_int;
        fn openat(dirfd: c_int, path: *const c_char, flags: c_int, ...) -> c_int;
        fn creat(path: *const c_char, mode: libc::mode_t) -> c_int;
        fn stat(path: *const c_char, buf: *mut libc::stat) -> c_int;
        fn lstat(path: *const c_char, buf: *mut libc::stat) -> c_int;
        fn fstatat(dirfd: c_int, path: *const c_char, buf: *mut libc::stat, flags: c_int) -> c_int;
        fn access(path: *const c_char, mode: c_int) -> c_int;
        fn faccessat(dirfd: c_int, path: *const c_char, mode: c_int, flags: c_int) -> c_int;
        fn mkdir(path: *const c_char, mode: libc::mode_t) -> c_int;
        fn mkdirat(dirfd: c_int, path: *const c_char, mode: libc::mode_t) -> c_int;
        fn unlink(path: *const c_char) -> c_int;
        fn unlinkat(dirfd: c_int, path: *const c_char, flags: c_int) -> c_int;
        fn rmdir(path: *const c_char) -> c_int;
        fn rename(old: *const c_char, new: *const c_char) -> c_int;
        fn renameat(olddirfd: c_int, old: *const c_char, newdirfd: c_int, new: *const c_char) -> c_int;
        fn symlink(target: *const c_char, linkpath: *const c_char) -> c_int;
        fn symlinkat(target: *const c_char, newdirfd: c_int, linkpath: *const c_char) -> c_int;
        fn link(old: *const c_char, new: *const c_char) -> c_int;
        fn linkat(olddirfd: c_int, old: *const c_char, newdirfd: c_int, new: *const c_char, flags: c_int) -> c_int;
        fn truncate(path: *const c_char, len: libc::off_t) -> c_int;
        fn readlink(path: *const c_char, buf: *mut c_char, bufsz: libc::size_t) -> libc::ssize_t;
        fn readlinkat(dirfd: c_int, path: *const c_char, buf: *mut c_char, bufsz: libc::size_t) -> libc::ssize_t;
        fn chmod(path: *const c_char, mode: libc::mode_t) -> c_int;
        fn fchmodat(dirfd: c_int, path: *const c_char, mode: libc::mode_t, flags: c_int) -> c_int;
        fn chown(path: *const c_char, owner: libc::uid_t, group: libc::gid_t) -> c_int;
        fn lchown(path: *const c_char, owner: libc::uid_t, group: libc::gid_t) -> c_int;
        fn fchownat(dirfd: c_int, path: *const c_char, owner: libc::uid_t, group: libc::gid_t, flags: c_int) -> c_int;
        fn chdir(path: *const c_char) -> c_int;
        fn opendir(path: *const c_char) -> *mut libc::DIR;
        fn realpath(path: *const c_char, resolved: *mut c_char) -> *mut c_char;
        #[link_name = "realpath$DARWIN_EXTSN"]
        fn realpath_darwin_extsn(path: *const c_char, resolved: *mut c_char) -> *mut c_char;
        fn execve(path: *const c_char, argv: *const *const c_char, envp: *const *const c_char) -> c_int;
        fn execv(path: *const c_char, argv: *const *const c_char) -> c_int;
        fn execvp(file: *const c_char, argv: *const *const c_char) -> c_int;
        fn posix_spawn(
            pid: *mut libc::pid_t,
            path: *const c_char,
            file_actions: *const c_void,
            attrp: *const c_void,
            argv: *const *const c_char,
            envp: *const *const c_char,
        ) -> c_int;
        fn posix_spawnp(
            pid: *mut libc::pid_t,
            file: *const c_char,
            file_actions: *const c_void,
            attrp: *const c_void,
            argv: *const *const c_char,
            envp: *const *const c_char,
        ) -> c_int;
    }

    interpose_entry!(IT_OPEN, open::rmp_open, open);
    interpose_entry!(IT_OPENAT, open::rmp_openat, openat);
    interpose_entry!(IT_CREAT, open::rmp_creat, creat);

    interpose_entry!(IT_STAT, stat::rmp_stat, stat);
    interpose_entry!(IT_LSTAT, stat::rmp_lstat, lstat);
    interpose_entry!(IT_FSTATAT, stat::rmp_fstatat, fstatat);
    interpose_entry!(IT_ACCESS, stat::rmp_access, access);
    interpose_entry!(IT_FACCESSAT, stat::rmp_faccessat, faccessat);

    interpose_entry!(IT_MKDIR, path_ops::rmp_mkdir, mkdir);
    interpose_entry!(IT_MKDIRAT, path_ops::rmp_mkdirat, mkdirat);
    interpose_entry!(IT_UNLINK, path_ops::rmp_unlink, unlink);
    interpose_entry!(IT_UNLINKAT, path_ops::rmp_unlinkat, unlinkat);
    interpose_entry!(IT_RMDIR, path_ops::rmp_rmdir, rmdir);
    interpose_entry!(IT_RENAME, path_ops::rmp_rename, rename);
    interpose_entry!(IT_RENAMEAT, path_ops::rmp_renameat, renameat);
    interpose_entry!(IT_SYMLINK, path_ops::rmp_symlink, symlink);
    interpose_entry!(IT_SYMLINKAT, path_ops::rmp_symlinkat, symlinkat);
    interpose_entry!(IT_LINK, path_ops::rmp_link, link);
    interpose_entry!(IT_LINKAT, path_ops::rmp_linkat, linkat);
    interpose_entry!(IT_TRUNCATE, path_ops::rmp_truncate, truncate);
    interpose_entry!(IT_READLINK, path_ops::rmp_readlink, readlink);
    interpose_entry!(IT_READLINKAT, path_ops::rmp_readlinkat, readlinkat);
    interpose_entry!(IT_CHMOD, path_ops::rmp_chmod, chmod);
    interpose_entry!(IT_FCHMODAT, path_ops::rmp_fchmodat, fchmodat);
    interpose_entry!(IT_CHOWN, path_ops::rmp_chown, chown);
    interpose_entry!(IT_LCHOWN, path_ops::rmp_lchown, lchown);
    interpose_entry!(IT_FCHOWNAT, path_ops::rmp_fchownat, fchownat);
    interpose_entry!(IT_REALPATH, path_ops::rmp_realpath, realpath);
    interpose_entry!(IT_REALPATH_EXTSN, path_ops::rmp_realpath, realpath_darwin_extsn);

    interpose_entry!(IT_CHDIR, dir::rmp_chdir, chdir);
    interpose_entry!(IT_OPENDIR, dir::rmp_opendir, opendir);

    interpose_entry!(IT_EXECVE, exec::rmp_execve, execve);
    interpose_entry!(IT_EXECV, exec::rmp_execv, execv);
    interpose_entry!(IT_EXECVP, exec::rmp_execvp, execvp);
    interpose_entry!(IT_POSIX_SPAWN, exec::rmp_posix_spawn, posix_spawn);
    interpose_entry!(IT_POSIX_SPAWNP, exec::rmp_posix_spawnp, posix_spawnp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_c_path_passes_through_when_state_absent() {
        std::env::remove_var(remapper_core::config::vars::MAPPINGS);
        std::env::remove_var(remapper_core::config::vars::TARGET);
        let c = CString::new("/some/path").unwrap();
        let result = unsafe { rewrite_c_path(c.as_ptr()) };
        assert!(result.is_none());
    }

    #[test]
    fn rewrite_c_path_rejects_null() {
        let result = unsafe { rewrite_c_path(std::ptr::null()) };
        assert!(result.is_none());
    }

    #[test]
    fn is_absolute_distinguishes_relative_paths() {
        assert!(is_absolute("/a/b"));
        assert!(!is_absolute("a/b"));
        assert!(!is_absolute(""));
    }
}
