//! Process-wide state for the interposed library: the one-shot setup read
//! from the environment on first use, a bounded hardened-runtime lookup
//! cache, the re-entrancy guard, and the raw debug-log writer.
//!
//! See the crate root docs for why none of this may allocate through
//! `tracing` or panic.

use std::cell::Cell;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use remapper_core::config::vars;
use remapper_core::Mapping;

/// Everything this library needs for the lifetime of the process, read
/// once from the environment the launcher set up before `exec`.
pub struct InterposerState {
    pub mappings: Vec<Mapping>,
    pub target_prefix: String,
    /// Raw fd for the debug log, pre-opened so no allocation or syscall
    /// racy with dyld init is needed on the hot path. `-1` when disabled.
    debug_fd: RawFd,
}

static STATE: OnceLock<Option<InterposerState>> = OnceLock::new();

impl InterposerState {
    /// Returns `None` if `RMP_MAPPINGS`/`RMP_TARGET` are absent, meaning
    /// this process was not launched by `remapper` (e.g. a child that
    /// inherited `DYLD_INSERT_LIBRARIES` from its own environment some
    /// other way) and every interposed call should simply pass through.
    pub fn get() -> Option<&'static InterposerState> {
        STATE.get_or_init(Self::load).as_ref()
    }

    fn load() -> Option<InterposerState> {
        let raw_mappings = std::env::var(vars::MAPPINGS).ok()?;
        let target_prefix = std::env::var(vars::TARGET).ok()?;

        let mappings: Vec<Mapping> = raw_mappings
            .split('\u{0}')
            .filter(|s| !s.is_empty())
            .filter_map(|s| Mapping::parse(s).ok())
            .collect();

        let debug_fd = std::env::var(vars::DEBUG_LOG)
            .ok()
            .and_then(|path| open_append(&path))
            .unwrap_or(-1);

        Some(InterposerState {
            mappings,
            target_prefix,
            debug_fd,
        })
    }
}

fn open_append(path: &str) -> Option<RawFd> {
    let c_path = std::ffi::CString::new(path).ok()?;
    // SAFETY: c_path is a valid NUL-terminated string for the duration of
    // the call; the returned fd is owned by this process for its lifetime.
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_WRONLY | libc::O_APPEND | libc::O_CREAT, 0o644) };
    (fd >= 0).then_some(fd)
}

/// Append a single line to the debug log, if one is configured. Uses raw
/// `write(2)` only: no buffering, no allocation beyond the caller's own
/// formatted bytes.
pub fn debug_log(component: &str, message: &[u8]) {
    let Some(state) = InterposerState::get() else {
        return;
    };
    if state.debug_fd < 0 {
        return;
    }
    let prefix = format!("component={component} ");
    // SAFETY: debug_fd was opened successfully by this process and is
    // never closed elsewhere; short writes are acceptable for a log line.
    unsafe {
        libc::write(state.debug_fd, prefix.as_ptr() as *const _, prefix.len());
        libc::write(state.debug_fd, message.as_ptr() as *const _, message.len());
        libc::write(state.debug_fd, b"\n".as_ptr() as *const _, 1);
    }
}

thread_local! {
    static REENTRANT: Cell<bool> = const { Cell::new(false) };
}

/// Guard against an interposed call re-entering itself: the signer
/// subprocess spawned by the trampoline cache (component C4) calls
/// `execve` internally, which would otherwise recurse into this same
/// library's `execve` interposition forever. Only one thread ever reads
/// or writes its own cell, so a plain `Cell` suffices — no mutex needed.
pub struct ReentrancyGuard {
    already_active: bool,
}

impl ReentrancyGuard {
    /// Enter the guarded region. If already inside one on this thread,
    /// `already_active` is `true` and the caller must fall through to the
    /// real libc function without reapplying any redirection.
    pub fn enter() -> ReentrancyGuard {
        let already_active = REENTRANT.with(|r| r.replace(true));
        ReentrancyGuard { already_active }
    }

    pub fn is_reentrant(&self) -> bool {
        self.already_active
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        if !self.already_active {
            REENTRANT.with(|r| r.set(false));
        }
    }
}

/// Bounded, eviction-free cache mapping an interpreter path to whether it
/// carries the macOS hardened runtime bit (component C4). Capacity is
/// fixed at 128 entries: once full, new lookups simply stop being cached
/// and the trampoline layer re-probes the signer each time. A lookup racing
/// an insert is benign — at worst it redoes one signer probe.
pub struct HardenedCache {
    slots: [OnceLock<(String, bool)>; HardenedCache::CAPACITY],
    len: AtomicUsize,
}

impl HardenedCache {
    const CAPACITY: usize = 128;

    pub const fn new() -> Self {
        HardenedCache {
            slots: [const { OnceLock::new() }; Self::CAPACITY],
            len: AtomicUsize::new(0),
        }
    }

    pub fn get(&self, path: &str) -> Option<bool> {
        self.slots.iter().find_map(|slot| {
            slot.get()
                .and_then(|(k, v)| (k == path).then_some(*v))
        })
    }

    /// Insert `(path, hardened)` into the first free slot. If the cache is
    /// full, the value is simply not cached; correctness never depends on
    /// a cache hit.
    pub fn insert(&self, path: &str, hardened: bool) {
        if self.get(path).is_some() {
            return;
        }
        let idx = self.len.fetch_add(1, Ordering::Relaxed);
        if idx >= Self::CAPACITY {
            return;
        }
        let _ = self.slots[idx].set((path.to_string(), hardened));
    }
}

pub static HARDENED_CACHE: HardenedCache = HardenedCache::new();

thread_local! {
    static TRAMPOLINE_RESOLVING: Cell<bool> = const { Cell::new(false) };
}

/// Guard against `trampoline::resolve` recursing into itself on the same
/// thread (component C4): the signer subprocess it spawns while building a
/// trampoline can itself trigger an interposed `execve`, which must not
/// re-enter the resolver. Spec.md §4.4 requires this to be thread-local,
/// not process-wide — a process-wide counter would make one thread's
/// trampoline build spuriously block every other thread's unrelated
/// `resolve` call.
pub struct TrampolineGuard {
    already_active: bool,
}

impl TrampolineGuard {
    pub fn enter() -> TrampolineGuard {
        let already_active = TRAMPOLINE_RESOLVING.with(|r| r.replace(true));
        TrampolineGuard { already_active }
    }

    pub fn is_reentrant(&self) -> bool {
        self.already_active
    }
}

impl Drop for TrampolineGuard {
    fn drop(&mut self) {
        if !self.already_active {
            TRAMPOLINE_RESOLVING.with(|r| r.set(false));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardened_cache_round_trips() {
        let cache = HardenedCache::new();
        assert_eq!(cache.get("/usr/bin/foo"), None);
        cache.insert("/usr/bin/foo", true);
        assert_eq!(cache.get("/usr/bin/foo"), Some(true));
        cache.insert("/usr/bin/foo", false);
        assert_eq!(cache.get("/usr/bin/foo"), Some(true));
    }

    #[test]
    fn trampoline_guard_detects_nesting_on_same_thread() {
        let outer = TrampolineGuard::enter();
        assert!(!outer.is_reentrant());
        let inner = TrampolineGuard::enter();
        assert!(inner.is_reentrant());
        drop(inner);
        drop(outer);
        let after = TrampolineGuard::enter();
        assert!(!after.is_reentrant());
    }

    #[test]
    fn reentrancy_guard_detects_nesting_on_same_thread() {
        let outer = ReentrancyGuard::enter();
        assert!(!outer.is_reentrant());
        let inner = ReentrancyGuard::enter();
        assert!(inner.is_reentrant());
        drop(inner);
        let next = ReentrancyGuard::enter();
        assert!(next.is_reentrant());
        drop(next);
        drop(outer);
        let after = ReentrancyGuard::enter();
        assert!(!after.is_reentrant());
    }
}
