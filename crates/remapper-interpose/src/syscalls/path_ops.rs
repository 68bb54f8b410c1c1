//! Single- and two-path filesystem call wrappers (component C7, spec.md
//! §4.7): everything but `open`/`stat`/`access` and their `*at` cousins,
//! which live in `open.rs`/`stat.rs`, and `chdir`/`opendir`, which live in
//! `dir.rs`.
//!
//! Two-path operations (`rename`, `link`, `symlink` and their `*at`
//! cousins) rewrite each path argument independently, per spec.md §4.7.

use std::os::raw::c_char;

use crate::interpose::{
    read_c_path, real_chmod, real_chown, real_fchmodat, real_fchownat, real_lchown, real_link, real_linkat,
    real_mkdir, real_mkdirat, real_readlink, real_readlinkat, real_realpath, real_rename, real_renameat, real_rmdir,
    real_symlink, real_symlinkat, real_truncate, real_unlink, real_unlinkat, rewrite_c_path, with_rewritten_path,
    with_rewritten_path_if_absolute,
};
use crate::state::ReentrancyGuard;

#[no_mangle]
pub unsafe extern "C" fn rmp_mkdir(path: *const c_char, mode: libc::mode_t) -> libc::c_int {
    with_rewritten_path!(path, real_mkdir(path, mode), |p| real_mkdir(p, mode))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_mkdirat(dirfd: libc::c_int, path: *const c_char, mode: libc::mode_t) -> libc::c_int {
    with_rewritten_path_if_absolute!(path, real_mkdirat(dirfd, path, mode), |p| real_mkdirat(dirfd, p, mode))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_unlink(path: *const c_char) -> libc::c_int {
    with_rewritten_path!(path, real_unlink(path), |p| real_unlink(p))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_unlinkat(dirfd: libc::c_int, path: *const c_char, flags: libc::c_int) -> libc::c_int {
    with_rewritten_path_if_absolute!(path, real_unlinkat(dirfd, path, flags), |p| {
        real_unlinkat(dirfd, p, flags)
    })
}

#[no_mangle]
pub unsafe extern "C" fn rmp_rmdir(path: *const c_char) -> libc::c_int {
    with_rewritten_path!(path, real_rmdir(path), |p| real_rmdir(p))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_truncate(path: *const c_char, len: libc::off_t) -> libc::c_int {
    with_rewritten_path!(path, real_truncate(path, len), |p| real_truncate(p, len))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_readlink(
    path: *const c_char,
    buf: *mut c_char,
    bufsz: libc::size_t,
) -> libc::ssize_t {
    with_rewritten_path!(path, real_readlink(path, buf, bufsz), |p| real_readlink(
        p, buf, bufsz
    ))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_readlinkat(
    dirfd: libc::c_int,
    path: *const c_char,
    buf: *mut c_char,
    bufsz: libc::size_t,
) -> libc::ssize_t {
    with_rewritten_path_if_absolute!(path, real_readlinkat(dirfd, path, buf, bufsz), |p| {
        real_readlinkat(dirfd, p, buf, bufsz)
    })
}

#[no_mangle]
pub unsafe extern "C" fn rmp_chmod(path: *const c_char, mode: libc::mode_t) -> libc::c_int {
    with_rewritten_path!(path, real_chmod(path, mode), |p| real_chmod(p, mode))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_fchmodat(
    dirfd: libc::c_int,
    path: *const c_char,
    mode: libc::mode_t,
    flags: libc::c_int,
) -> libc::c_int {
    with_rewritten_path_if_absolute!(path, real_fchmodat(dirfd, path, mode, flags), |p| {
        real_fchmodat(dirfd, p, mode, flags)
    })
}

#[no_mangle]
pub unsafe extern "C" fn rmp_chown(path: *const c_char, owner: libc::uid_t, group: libc::gid_t) -> libc::c_int {
    with_rewritten_path!(path, real_chown(path, owner, group), |p| real_chown(
        p, owner, group
    ))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_lchown(path: *const c_char, owner: libc::uid_t, group: libc::gid_t) -> libc::c_int {
    with_rewritten_path!(path, real_lchown(path, owner, group), |p| real_lchown(
        p, owner, group
    ))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_fchownat(
    dirfd: libc::c_int,
    path: *const c_char,
    owner: libc::uid_t,
    group: libc::gid_t,
    flags: libc::c_int,
) -> libc::c_int {
    with_rewritten_path_if_absolute!(path, real_fchownat(dirfd, path, owner, group, flags), |p| {
        real_fchownat(dirfd, p, owner, group, flags)
    })
}

#[no_mangle]
pub unsafe extern "C" fn rmp_realpath(path: *const c_char, resolved: *mut c_char) -> *mut c_char {
    let guard = ReentrancyGuard::enter();
    if guard.is_reentrant() {
        return real_realpath(path, resolved);
    }
    match rewrite_c_path(path) {
        Some(owned) => real_realpath(owned.as_ptr(), resolved),
        None => real_realpath(path, resolved),
    }
}

#[no_mangle]
pub unsafe extern "C" fn rmp_rename(old: *const c_char, new: *const c_char) -> libc::c_int {
    let guard = ReentrancyGuard::enter();
    if guard.is_reentrant() {
        return real_rename(old, new);
    }
    let owned_old = rewrite_c_path(old);
    let owned_new = rewrite_c_path(new);
    let old_ptr = owned_old.as_ref().map(|c| c.as_ptr()).unwrap_or(old);
    let new_ptr = owned_new.as_ref().map(|c| c.as_ptr()).unwrap_or(new);
    real_rename(old_ptr, new_ptr)
}

#[no_mangle]
pub unsafe extern "C" fn rmp_renameat(
    olddirfd: libc::c_int,
    old: *const c_char,
    newdirfd: libc::c_int,
    new: *const c_char,
) -> libc::c_int {
    let guard = ReentrancyGuard::enter();
    if guard.is_reentrant() {
        return real_renameat(olddirfd, old, newdirfd, new);
    }
    let old_ptr = rewrite_if_absolute(old);
    let new_ptr = rewrite_if_absolute(new);
    real_renameat(
        olddirfd,
        old_ptr.as_ref().map(|c| c.as_ptr()).unwrap_or(old),
        newdirfd,
        new_ptr.as_ref().map(|c| c.as_ptr()).unwrap_or(new),
    )
}

#[no_mangle]
pub unsafe extern "C" fn rmp_link(old: *const c_char, new: *const c_char) -> libc::c_int {
    let guard = ReentrancyGuard::enter();
    if guard.is_reentrant() {
        return real_link(old, new);
    }
    let owned_old = rewrite_c_path(old);
    let owned_new = rewrite_c_path(new);
    real_link(
        owned_old.as_ref().map(|c| c.as_ptr()).unwrap_or(old),
        owned_new.as_ref().map(|c| c.as_ptr()).unwrap_or(new),
    )
}

#[no_mangle]
pub unsafe extern "C" fn rmp_linkat(
    olddirfd: libc::c_int,
    old: *const c_char,
    newdirfd: libc::c_int,
    new: *const c_char,
    flags: libc::c_int,
) -> libc::c_int {
    let guard = ReentrancyGuard::enter();
    if guard.is_reentrant() {
        return real_linkat(olddirfd, old, newdirfd, new, flags);
    }
    let old_ptr = rewrite_if_absolute(old);
    let new_ptr = rewrite_if_absolute(new);
    real_linkat(
        olddirfd,
        old_ptr.as_ref().map(|c| c.as_ptr()).unwrap_or(old),
        newdirfd,
        new_ptr.as_ref().map(|c| c.as_ptr()).unwrap_or(new),
        flags,
    )
}

#[no_mangle]
pub unsafe extern "C" fn rmp_symlink(target: *const c_char, linkpath: *const c_char) -> libc::c_int {
    // `target` is the literal text stored in the symlink, not itself a
    // path this process resolves right now — only `linkpath`, the new
    // link's own location, is subject to redirection.
    let guard = ReentrancyGuard::enter();
    if guard.is_reentrant() {
        return real_symlink(target, linkpath);
    }
    match rewrite_c_path(linkpath) {
        Some(owned) => real_symlink(target, owned.as_ptr()),
        None => real_symlink(target, linkpath),
    }
}

#[no_mangle]
pub unsafe extern "C" fn rmp_symlinkat(
    target: *const c_char,
    newdirfd: libc::c_int,
    linkpath: *const c_char,
) -> libc::c_int {
    let guard = ReentrancyGuard::enter();
    if guard.is_reentrant() {
        return real_symlinkat(target, newdirfd, linkpath);
    }
    match rewrite_if_absolute(linkpath) {
        Some(owned) => real_symlinkat(target, newdirfd, owned.as_ptr()),
        None => real_symlinkat(target, newdirfd, linkpath),
    }
}

unsafe fn rewrite_if_absolute(raw: *const c_char) -> Option<std::ffi::CString> {
    let s = read_c_path(raw)?;
    if !s.starts_with('/') {
        return None;
    }
    rewrite_c_path(raw)
}
