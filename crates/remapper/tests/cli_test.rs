//! Black-box tests against the built `remapper` binary: the paths that
//! don't require privileged namespace or dylib-injection machinery
//! (`--version`, `--help`, and argument-error handling).

use std::process::Command;

fn remapper() -> Command {
    Command::new(env!("CARGO_BIN_EXE_remapper"))
}

#[test]
fn version_flag_prints_version_and_succeeds() {
    let output = remapper().arg("--version").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("remapper"));
}

#[test]
fn help_flag_prints_usage_and_succeeds() {
    let output = remapper().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("USAGE"));
}

#[test]
fn no_arguments_exits_1_with_usage_on_stderr() {
    // spec.md §7: argument-error (malformed CLI, missing mappings/command)
    // exits 1, not the pre-exec-failure code 127.
    let output = remapper().output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("USAGE") || stderr.contains("usage"));
}

#[test]
fn mapping_without_command_exits_1() {
    let output = remapper().arg("/tmp/.nonexistent*").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn reentry_guard_env_var_blocks_nested_invocation() {
    let output = remapper()
        .env(remapper_core::config::vars::REENTRY_GUARD, "1")
        .arg("/tmp/.nonexistent*")
        .arg("--")
        .arg("true")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(127));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("refusing to re-enter"));
}
