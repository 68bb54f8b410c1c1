//! End-to-end coverage of the platform-independent pieces: parsing raw
//! mapping arguments, rewriting real filesystem paths under a temporary
//! target, and round-tripping the environment-variable transport format
//! the two launchers use to pass mappings across `exec`.

use remapper_core::config::{decode_mapping_list, encode_mapping_list, RuntimeConfig};
use remapper_core::mapping::rewrite;
use remapper_core::{Mapping, TargetDir};
use tempfile::tempdir;

#[test]
fn parse_rewrite_and_transport_round_trip() {
    let home = tempdir().unwrap();
    std::env::set_var("HOME", home.path());

    let raw = vec![format!("{}/.claude*", home.path().display())];
    let mappings = Mapping::parse_all(&raw).unwrap();
    assert_eq!(mappings.len(), 1);

    let target = TargetDir::new(tempdir().unwrap().path().to_path_buf());
    let candidate = format!("{}/.claude/settings.json", home.path().display());
    let rewritten = rewrite(&candidate, &mappings, &target.as_prefix()).unwrap();
    assert!(rewritten.starts_with(&target.as_prefix()));
    assert!(rewritten.ends_with(".claude/settings.json"));

    let encoded = encode_mapping_list(&raw);
    assert_eq!(decode_mapping_list(&encoded), raw);
}

#[test]
fn unrelated_paths_pass_through_untouched() {
    let home = tempdir().unwrap();
    std::env::set_var("HOME", home.path());

    let raw = vec![format!("{}/.claude*", home.path().display())];
    let mappings = Mapping::parse_all(&raw).unwrap();
    let target = TargetDir::new(tempdir().unwrap().path().to_path_buf());

    let candidate = format!("{}/Documents/report.pdf", home.path().display());
    assert!(rewrite(&candidate, &mappings, &target.as_prefix()).is_none());
}

#[test]
fn runtime_config_builds_trampoline_and_targets_under_cache_root() {
    let cache = tempdir().unwrap();
    let cfg = RuntimeConfig::from_env(
        Some(cache.path().to_string_lossy().into_owned()),
        None,
    );
    assert_eq!(cfg.trampoline_dir(), cache.path().join("trampolines"));
    assert_eq!(cfg.targets_dir(), cache.path().join("targets"));
}

#[test]
fn multiple_mappings_preserve_first_match_order() {
    let raw = vec!["/h/.a*".to_string(), "/h/.ab".to_string()];
    let mappings = Mapping::parse_all(&raw).unwrap();
    let target = TargetDir::new(std::path::PathBuf::from("/tgt"));
    // Both mappings could match "/h/.ab"; the first one in argv order wins.
    let rewritten = rewrite("/h/.ab", &mappings, &target.as_prefix()).unwrap();
    assert_eq!(rewritten, "/tgt/.ab");
}
