//! `stat`/`lstat`/`fstatat`/`access`/`faccessat` wrappers (component C7,
//! spec.md §4.7).

use std::os::raw::c_char;

use crate::interpose::{
    real_access, real_faccessat, real_fstatat, real_lstat, real_stat, with_rewritten_path,
    with_rewritten_path_if_absolute,
};
use crate::state::ReentrancyGuard;

#[no_mangle]
pub unsafe extern "C" fn rmp_stat(path: *const c_char, buf: *mut libc::stat) -> libc::c_int {
    with_rewritten_path!(path, real_stat(path, buf), |p| real_stat(p, buf))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_lstat(path: *const c_char, buf: *mut libc::stat) -> libc::c_int {
    with_rewritten_path!(path, real_lstat(path, buf), |p| real_lstat(p, buf))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_fstatat(
    dirfd: libc::c_int,
    path: *const c_char,
    buf: *mut libc::stat,
    flags: libc::c_int,
) -> libc::c_int {
    with_rewritten_path_if_absolute!(path, real_fstatat(dirfd, path, buf, flags), |p| {
        real_fstatat(dirfd, p, buf, flags)
    })
}

#[no_mangle]
pub unsafe extern "C" fn rmp_access(path: *const c_char, mode: libc::c_int) -> libc::c_int {
    with_rewritten_path!(path, real_access(path, mode), |p| real_access(p, mode))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_faccessat(
    dirfd: libc::c_int,
    path: *const c_char,
    mode: libc::c_int,
    flags: libc::c_int,
) -> libc::c_int {
    with_rewritten_path_if_absolute!(path, real_faccessat(dirfd, path, mode, flags), |p| {
        real_faccessat(dirfd, p, mode, flags)
    })
}
