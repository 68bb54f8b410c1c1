//! `open`/`openat`/`creat` wrappers (component C7, spec.md §4.7).
//!
//! All three are variadic in their real libc form, so the actual call goes
//! through the fixed-arity C shim (`rmp_shim_*`, see `src/c/variadic.c`)
//! rather than the raw `real_*` declarations `interpose.rs` keeps for the
//! other families.

use std::os::raw::c_char;

use crate::interpose::{
    rmp_shim_creat, rmp_shim_open, rmp_shim_openat, with_rewritten_path, with_rewritten_path_if_absolute,
};
use crate::state::ReentrancyGuard;

#[no_mangle]
pub unsafe extern "C" fn rmp_open(path: *const c_char, flags: libc::c_int, mode: libc::mode_t) -> libc::c_int {
    with_rewritten_path!(path, rmp_shim_open(path, flags, mode), |p| rmp_shim_open(
        p, flags, mode
    ))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_openat(
    dirfd: libc::c_int,
    path: *const c_char,
    flags: libc::c_int,
    mode: libc::mode_t,
) -> libc::c_int {
    with_rewritten_path_if_absolute!(path, rmp_shim_openat(dirfd, path, flags, mode), |p| {
        rmp_shim_openat(dirfd, p, flags, mode)
    })
}

#[no_mangle]
pub unsafe extern "C" fn rmp_creat(path: *const c_char, mode: libc::mode_t) -> libc::c_int {
    with_rewritten_path!(path, rmp_shim_creat(path, mode), |p| rmp_shim_creat(p, mode))
}
