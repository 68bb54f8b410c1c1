//! `chdir`/`opendir` wrappers (component C7, spec.md §4.7).

use std::os::raw::c_char;

use crate::interpose::{real_chdir, real_opendir, with_rewritten_path};
use crate::state::ReentrancyGuard;

#[no_mangle]
pub unsafe extern "C" fn rmp_chdir(path: *const c_char) -> libc::c_int {
    with_rewritten_path!(path, real_chdir(path), |p| real_chdir(p))
}

#[no_mangle]
pub unsafe extern "C" fn rmp_opendir(path: *const c_char) -> *mut libc::DIR {
    with_rewritten_path!(path, real_opendir(path), |p| real_opendir(p))
}
