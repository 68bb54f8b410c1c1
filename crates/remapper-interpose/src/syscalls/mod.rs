//! Interposed wrapper functions, one file per libc family, mirroring how
//! the launcher side of this workspace is split into one module per
//! platform. [`crate::interpose`] owns the shared rewrite helpers, the
//! `real_*` symbol declarations, and the `__DATA,__interpose` table that
//! wires each `rmp_*` entry point below to the libc symbol it replaces.

pub mod dir;
pub mod exec;
pub mod open;
pub mod path_ops;
pub mod stat;
