//! # remapper-interpose
//!
//! `DYLD_INSERT_LIBRARIES` interposition engine for `remapper` on Darwin.
//!
//! ## TLS safety during dyld bootstrap
//!
//! This library is loaded by `dyld` into every process the launched program
//! (or anything it execs) spins up, which means an interposed function can
//! in principle run before `dyld` has finished this image's own
//! initializers. The only Rust state touched that early is
//! [`state::ReentrancyGuard`] (a `thread_local!` `Cell<bool>`) and
//! [`state::InterposerState::get`] (a `std::sync::OnceLock`); both are safe
//! arbitrarily early since neither needs prior runtime setup. Nothing on
//! this path may `panic!`: a panic would unwind through a stack dyld does
//! not expect, so every interposed function catches its own errors and
//! falls through to the real libc call on anything unexpected.
//!
//! Logging from this library never goes through `tracing` — the subscriber
//! registry is launcher-process state that does not exist here. Instead
//! [`state::debug_log`] appends raw lines to the file named by
//! `RMP_DEBUG_LOG` through a pre-opened `O_APPEND` file descriptor.

#![allow(clippy::missing_safety_doc)]

pub mod interpose;
pub mod shebang;
pub mod signer;
pub mod state;
pub mod syscalls;
pub mod trampoline;

pub use state::InterposerState;
