//! Linux mount-namespace launcher (component C9, spec.md §4.9).
//!
//! Unlike the Darwin launcher, Linux has no per-call interposition layer:
//! instead, every existing path a mapping's glob matches is bind-mounted
//! onto the corresponding path under the target directory inside a
//! private mount namespace, so the child process (and nothing outside it)
//! sees the redirected view. This means mappings are resolved against
//! whatever already exists on disk at launch time — a file created by the
//! child after launch under a matched directory is not itself redirected,
//! matching spec.md §4.9's "snapshot, not a live filter" invariant.

use std::fs;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use nix::sched::{unshare, CloneFlags};
use nix::unistd::{getgid, getuid};
use remapper_core::config::{vars, RuntimeConfig};
use remapper_core::logging::Component;
use remapper_core::{LaunchRequest, Mapping, MountEntry, MountKind, MAX_MOUNT_ENTRIES};

/// Run `request` inside a private user + mount namespace with every
/// matched path bind-mounted onto its redirected target.
pub fn launch(request: LaunchRequest, _runtime: &RuntimeConfig) -> Result<std::convert::Infallible> {
    let uid = getuid();
    let gid = getgid();

    let mounts = plan_mounts(&request.mappings, &request.target)?;

    if mounts.is_empty() {
        // spec.md §4.9 step 1: no matching entries is a warning, not an
        // error — exec the command unmodified rather than entering an
        // empty, pointless namespace.
        tracing::warn!(
            component = Component::LINUX,
            program = %request.program,
            "no mapping matched an existing path; running unmodified"
        );
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);
        if let Some(log) = &request.debug_log {
            cmd.env(vars::DEBUG_LOG, log);
        }
        let err = cmd.exec();
        bail!("failed to exec {}: {err}", request.program);
    }

    tracing::info!(
        component = Component::LINUX,
        mount_count = mounts.len(),
        "entering private namespace"
    );

    if let Err(errno) = unshare(CloneFlags::CLONE_NEWUSER | CloneFlags::CLONE_NEWNS) {
        if errno == nix::errno::Errno::EPERM {
            bail!(
                "unshare(CLONE_NEWUSER|CLONE_NEWNS) failed: permission denied \
                 (unprivileged user namespaces may be disabled on this system; \
                 check /proc/sys/kernel/unprivileged_userns_clone or your \
                 distro's sysctl/AppArmor policy)"
            );
        }
        return Err(errno).context("unshare(CLONE_NEWUSER|CLONE_NEWNS) failed");
    }

    // Older kernels have no /proc/self/setgroups control file; absence is
    // harmless since there's nothing to restrict (spec.md §4.9 step 3:
    // "ignore ENOENT on older kernels").
    match fs::write(Path::new("/proc/self/setgroups"), "deny") {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).context("writing /proc/self/setgroups"),
    }
    // Map this process to UID/GID 0 *inside* the namespace, not its real
    // id, per spec.md §4.9 step 3 and the `/proc/self/uid_map` testable
    // invariant (spec.md §8.5).
    write_id_map(Path::new("/proc/self/uid_map"), &format!("0 {} 1", uid.as_raw()))?;
    write_id_map(Path::new("/proc/self/gid_map"), &format!("0 {} 1", gid.as_raw()))?;

    for mount in &mounts {
        apply_mount(mount)?;
    }

    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args);
    cmd.env(vars::REENTRY_GUARD, "1");
    if let Some(log) = &request.debug_log {
        cmd.env(vars::DEBUG_LOG, log);
    }

    let err = cmd.exec();
    bail!("failed to exec {}: {err}", request.program);
}

/// Enumerate the existing filesystem entries each mapping's glob
/// currently matches under its `parent_dir`, and build the ordered list
/// of bind mounts that will redirect them. First-match-wins is preserved
/// by skipping a path already claimed by an earlier mapping.
fn plan_mounts(mappings: &[Mapping], target: &remapper_core::TargetDir) -> Result<Vec<MountEntry>> {
    let mut mounts = Vec::new();
    let mut claimed = std::collections::HashSet::new();

    for mapping in mappings {
        let parent = Path::new(&mapping.parent_dir);
        let Ok(entries) = fs::read_dir(parent) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if !remapper_core::mapping::fnmatch(&mapping.glob, &name_str) {
                continue;
            }
            let source = entry.path();
            if !claimed.insert(source.clone()) {
                continue;
            }

            let dest = target.root.join(name_str.trim_start_matches('/'));
            if let Some(parent_dest) = dest.parent() {
                fs::create_dir_all(parent_dest)
                    .with_context(|| format!("scaffolding {}", parent_dest.display()))?;
            }
            let kind = if source.is_dir() {
                fs::create_dir_all(&dest)
                    .with_context(|| format!("scaffolding {}", dest.display()))?;
                MountKind::Dir
            } else {
                fs::write(&dest, []).ok();
                MountKind::File
            };

            mounts.push(MountEntry { source, dest, kind });

            if mounts.len() > MAX_MOUNT_ENTRIES {
                bail!("too many mount entries (> {MAX_MOUNT_ENTRIES}); narrow your mapping globs");
            }
        }
    }

    Ok(mounts)
}

fn write_id_map(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

/// Recursive bind mount `mount.dest` (the redirected target) onto
/// `mount.source` (the original reference path), matching `mount --rbind`
/// so that every lookup of the original path resolves through to the
/// target's content instead.
fn apply_mount(mount: &MountEntry) -> Result<()> {
    use nix::mount::{mount as bind_mount, MsFlags};
    // `MS_REC` only matters for a directory source with nested mounts of
    // its own; it's a harmless no-op on a file bind mount (MountKind::File).
    bind_mount(
        Some(&mount.dest),
        &mount.source,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .with_context(|| {
        format!(
            "bind mount {} -> {} failed",
            mount.dest.display(),
            mount.source.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use remapper_core::TargetDir;
    use tempfile::tempdir;

    #[test]
    fn plan_mounts_matches_glob_against_existing_entries() {
        let home = tempdir().unwrap();
        fs::create_dir_all(home.path().join(".claude")).unwrap();
        fs::create_dir_all(home.path().join("Documents")).unwrap();

        let raw = format!("{}/.claude*", home.path().display());
        let mapping = Mapping::parse(&raw).unwrap();
        let target = TargetDir::new(tempdir().unwrap().path().to_path_buf());

        let mounts = plan_mounts(&[mapping], &target).unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].source, home.path().join(".claude"));
        assert_eq!(mounts[0].dest, target.root.join(".claude"));
    }

    #[test]
    fn plan_mounts_ignores_parent_with_no_matches() {
        let home = tempdir().unwrap();
        fs::create_dir_all(home.path().join("Documents")).unwrap();

        let raw = format!("{}/.claude*", home.path().display());
        let mapping = Mapping::parse(&raw).unwrap();
        let target = TargetDir::new(tempdir().unwrap().path().to_path_buf());

        let mounts = plan_mounts(&[mapping], &target).unwrap();
        assert!(mounts.is_empty());
    }
}
