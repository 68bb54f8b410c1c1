//! # remapper-core
//!
//! Platform-independent pieces of `remapper`'s path-redirection engine: the
//! mapping model (parsing and matching), a handful of path utilities, and the
//! `LaunchRequest` data model that the CLI adapter builds and the two
//! launchers (Darwin library-interposition, Linux mount-namespace) consume.
//!
//! This crate is linked into the `remapper` binary directly, and on Darwin it
//! is also linked into `remapper-interpose`'s dylib, so the launcher and the
//! injected library always agree on what a mapping matches.

pub mod config;
pub mod logging;
pub mod mapping;
pub mod model;
pub mod pathutil;

pub use mapping::Mapping;
pub use model::{LaunchRequest, MountEntry, MountKind, TargetDir};

/// Mirrors spec.md §3: at most 64 mappings per launch.
pub const MAX_MAPPINGS: usize = 64;

/// Mirrors spec.md §3: at most 256 mount entries per launch (Linux).
pub const MAX_MOUNT_ENTRIES: usize = 256;

/// Mirrors spec.md §4.1: a path component longer than this is rejected.
pub const MAX_COMPONENT_LEN: usize = 256;

/// Generous ceiling for the joined `RMP_MAPPINGS` string (spec.md §7,
/// over-capacity argument-error).
pub const MAX_MAPPING_STRING_LEN: usize = 64 * 1024;
