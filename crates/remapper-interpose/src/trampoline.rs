//! Hardened-runtime trampoline cache (component C4, spec.md §4.4).
//!
//! `DYLD_INSERT_LIBRARIES` is silently ignored for any binary built with
//! the hardened runtime unless it carries the
//! "allow dyld environment variables" and "disable library validation"
//! entitlements. When `remapper` needs to inject itself into such a
//! binary it keeps a re-signed copy ("trampoline") in its cache directory
//! and execs that copy instead of the original.
//!
//! The cache key is the tuple `(mtime, size)` of the *original* binary, not
//! a content hash: spec.md treats an unexpected mtime/size change as
//! sufficient evidence the original changed (package upgrade, rebuild) and
//! accepts the minor risk of a mtime-preserving in-place edit slipping
//! through, trading a rare staleness window for not hashing potentially
//! large interpreter binaries on every launch. A sidecar `.meta` file
//! records the exact key a cached copy was built for so a collision in the
//! hashed cache filename can still be detected and rebuilt.

use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use remapper_core::pathutil::{self, PathUtilError};

/// Process-wide counter combined with the pid in every temp file name this
/// module creates, so two threads (or two processes) resolving the same or
/// different original paths concurrently never write through the same
/// temp path (spec.md §4.4/§5: "Temp file names combine pid with an atomic
/// process-wide counter so simultaneous resolutions ... never collide").
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn unique_tmp_suffix() -> String {
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}.{}", std::process::id(), seq)
}

use crate::signer::{self, SignerError};
use crate::state::{TrampolineGuard, HARDENED_CACHE};

/// First 4 bytes of a Mach-O or fat-Mach-O binary (hardened-detection step
/// 2, spec.md §4.4), in whichever byte order the file was written.
const MACHO_MAGICS: [[u8; 4]; 6] = [
    0xfeed_face_u32.to_be_bytes(),
    0xcefa_edfe_u32.to_be_bytes(),
    0xfeed_facf_u32.to_be_bytes(),
    0xcffa_edfe_u32.to_be_bytes(),
    0xcafe_babe_u32.to_be_bytes(),
    0xbeba_feca_u32.to_be_bytes(),
];

/// SIP-protected path prefixes that are always treated as hardened
/// regardless of their actual code signature (spec.md Glossary).
const SIP_PREFIXES: [&str; 3] = ["/usr/", "/bin/", "/sbin/"];

pub fn is_sip_protected(path: &Path) -> bool {
    let Some(s) = path.to_str() else { return false };
    SIP_PREFIXES.iter().any(|p| s.starts_with(p))
}

#[derive(Debug, thiserror::Error)]
pub enum TrampolineError {
    #[error(transparent)]
    PathUtil(#[from] PathUtilError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error("io error building trampoline for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("refusing to build a trampoline while already inside one (depth guard tripped)")]
    RecursionGuard,
}

/// Cache key derived from the original binary's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheKey {
    mtime: i64,
    size: u64,
}

impl CacheKey {
    fn of(metadata: &fs::Metadata) -> Self {
        CacheKey {
            mtime: metadata.mtime(),
            size: metadata.size(),
        }
    }

    fn to_meta_line(self) -> String {
        format!("{} {}", self.mtime, self.size)
    }

    fn matches_meta_line(self, line: &str) -> bool {
        line.trim() == self.to_meta_line()
    }
}

/// Given the original interpreter path, return the path it should be
/// exec'd as: either the original (not hardened, or trampoline unusable)
/// or a cached/freshly-built re-signed copy.
///
/// `cache_dir` is `RuntimeConfig::trampoline_dir()` from `remapper-core`.
pub fn resolve(original: &Path, cache_dir: &Path) -> Result<PathBuf, TrampolineError> {
    let guard = TrampolineGuard::enter();
    if guard.is_reentrant() {
        return Err(TrampolineError::RecursionGuard);
    }

    let original_str = pathutil::to_utf8(original)?;
    if let Some(cached_hardened) = HARDENED_CACHE.get(&original_str) {
        if !cached_hardened {
            return Ok(original.to_path_buf());
        }
    } else {
        let hardened = classify_hardened(original);
        HARDENED_CACHE.insert(&original_str, hardened);
        if !hardened {
            return Ok(original.to_path_buf());
        }
    }

    let metadata = fs::metadata(original).map_err(|source| TrampolineError::Io {
        path: original.to_path_buf(),
        source,
    })?;
    let key = CacheKey::of(&metadata);

    let cache_path = cache_file_path(cache_dir, original);
    let meta_path = meta_file_path(&cache_path);

    if is_cache_valid(&cache_path, &meta_path, key) {
        return Ok(cache_path);
    }

    build_trampoline(original, &cache_path, &meta_path, key)?;
    Ok(cache_path)
}

/// `cache_dir + P`: the original absolute path appended verbatim to the
/// cache directory (spec.md §4.4's cache-path derivation), e.g.
/// `/h/bin/H` under cache dir `/cache` becomes `/cache/h/bin/H`.
fn cache_file_path(cache_dir: &Path, original: &Path) -> PathBuf {
    let relative = original.strip_prefix("/").unwrap_or(original);
    cache_dir.join(relative)
}

fn meta_file_path(cache_path: &Path) -> PathBuf {
    let mut p = cache_path.as_os_str().to_owned();
    p.push(".meta");
    PathBuf::from(p)
}

/// Run the 5-step hardened-detection algorithm of spec.md §4.4 and return
/// whether `original` needs a trampoline at all.
fn classify_hardened(original: &Path) -> bool {
    if is_sip_protected(original) {
        return true;
    }

    let Ok(metadata) = fs::metadata(original) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    if !has_macho_magic(original) {
        return false;
    }

    // Step 3: if the signer itself can't be reached, fail closed.
    let runtime_flag = match signer::query_runtime_flag(original) {
        Ok(flag) => flag,
        Err(_) => return true,
    };
    if !runtime_flag {
        return false;
    }

    // Step 5: a binary that already opts in via the entitlement doesn't
    // need a trampoline, even though it carries the runtime flag.
    match signer::has_dyld_env_entitlement(original) {
        Ok(has_entitlement) => !has_entitlement,
        Err(_) => true,
    }
}

fn has_macho_magic(path: &Path) -> bool {
    use std::io::Read;
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() {
        return false;
    }
    MACHO_MAGICS.contains(&magic)
}

fn is_cache_valid(cache_path: &Path, meta_path: &Path, key: CacheKey) -> bool {
    let Ok(meta_contents) = fs::read_to_string(meta_path) else {
        return false;
    };
    if !key.matches_meta_line(&meta_contents) {
        return false;
    }
    cache_path.is_file()
}

fn build_trampoline(
    original: &Path,
    cache_path: &Path,
    meta_path: &Path,
    key: CacheKey,
) -> Result<(), TrampolineError> {
    let cache_dir = cache_path.parent().expect("cache_path has a parent");
    pathutil::mkdirs(cache_dir)?;

    let tmp_path = cache_dir.join(format!(
        ".tmp-{}.{}",
        cache_path.file_name().unwrap().to_string_lossy(),
        unique_tmp_suffix()
    ));
    fs::copy(original, &tmp_path).map_err(|source| TrampolineError::Io {
        path: tmp_path.clone(),
        source,
    })?;

    let mut perms = fs::metadata(&tmp_path)
        .map_err(|source| TrampolineError::Io {
            path: tmp_path.clone(),
            source,
        })?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&tmp_path, perms).map_err(|source| TrampolineError::Io {
        path: tmp_path.clone(),
        source,
    })?;

    // `resolve`'s `TrampolineGuard` is still held for the duration of this
    // call, so the signer's own interposed `execve` (if any) is already
    // guarded against recursing back into us.
    let entitlements = signer::write_entitlements(cache_dir)?;
    signer::resign_ad_hoc(&tmp_path, &entitlements)?;

    fs::rename(&tmp_path, cache_path).map_err(|source| TrampolineError::Io {
        path: cache_path.to_path_buf(),
        source,
    })?;

    let tmp_meta = meta_path.with_extension("meta.tmp");
    fs::write(&tmp_meta, key.to_meta_line()).map_err(|source| TrampolineError::Io {
        path: tmp_meta.clone(),
        source,
    })?;
    fs::rename(&tmp_meta, meta_path).map_err(|source| TrampolineError::Io {
        path: meta_path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_meta_line_round_trips() {
        let key = CacheKey { mtime: 1234, size: 5678 };
        assert!(key.matches_meta_line(&key.to_meta_line()));
        assert!(key.matches_meta_line(&format!("{}\n", key.to_meta_line())));
        assert!(!key.matches_meta_line("1234 9999"));
    }

    #[test]
    fn cache_file_path_mirrors_the_verbatim_absolute_path() {
        let dir = Path::new("/cache");
        let original = Path::new("/h/bin/H");
        assert_eq!(cache_file_path(dir, original), PathBuf::from("/cache/h/bin/H"));
    }

    #[test]
    fn sip_prefixes_are_always_hardened() {
        assert!(is_sip_protected(Path::new("/usr/bin/python3")));
        assert!(is_sip_protected(Path::new("/bin/sh")));
        assert!(is_sip_protected(Path::new("/sbin/ping")));
        assert!(!is_sip_protected(Path::new("/h/bin/H")));
    }

    #[test]
    fn is_cache_valid_rejects_missing_meta() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("copy");
        let meta_path = dir.path().join("copy.meta");
        fs::write(&cache_path, b"x").unwrap();
        assert!(!is_cache_valid(&cache_path, &meta_path, CacheKey { mtime: 1, size: 1 }));
    }

    #[test]
    fn is_cache_valid_rejects_stale_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("copy");
        let meta_path = dir.path().join("copy.meta");
        fs::write(&cache_path, b"x").unwrap();
        fs::write(&meta_path, "1 1").unwrap();
        assert!(!is_cache_valid(&cache_path, &meta_path, CacheKey { mtime: 2, size: 1 }));
    }

    #[test]
    fn is_cache_valid_accepts_matching_key() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("copy");
        let meta_path = dir.path().join("copy.meta");
        fs::write(&cache_path, b"x").unwrap();
        let key = CacheKey { mtime: 7, size: 3 };
        fs::write(&meta_path, key.to_meta_line()).unwrap();
        assert!(is_cache_valid(&cache_path, &meta_path, key));
    }

    #[test]
    fn touching_the_original_binary_invalidates_its_cache_key() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("interp");
        fs::write(&original, b"binary contents").unwrap();

        let key_before = CacheKey::of(&fs::metadata(&original).unwrap());

        let newer = filetime::FileTime::from_unix_time(key_before.mtime + 120, 0);
        filetime::set_file_mtime(&original, newer).unwrap();

        let key_after = CacheKey::of(&fs::metadata(&original).unwrap());
        assert_ne!(key_before, key_after);

        let cache_path = dir.path().join("cached-copy");
        let meta_path = dir.path().join("cached-copy.meta");
        fs::write(&cache_path, b"stale copy").unwrap();
        fs::write(&meta_path, key_before.to_meta_line()).unwrap();

        assert!(!is_cache_valid(&cache_path, &meta_path, key_after));
    }
}
