//! CLI adapter (component C10, spec.md §4.10): turns `argv` into an
//! immutable [`LaunchRequest`] without any external parsing crate.
//!
//! `clap`'s derive/subcommand model does not fit this grammar well:
//! `remapper` takes a mandatory target directory, then a *list* of mapping
//! arguments followed by a command to run, where the separator between the
//! mapping list and the command is only mandatory once more than one
//! mapping is given (so a single mapping can be written without `--` at
//! all, since there is no ambiguity about where the mapping list ends).
//! Hand-rolling the parse keeps that shortcut simple; see `DESIGN.md` for
//! the full rationale behind dropping `clap`.
//!
//! Grammar (spec.md §6):
//! ```text
//! remapper <target-dir> MAPPING -- COMMAND [ARGS...]
//! remapper <target-dir> MAPPING COMMAND [ARGS...]   (single mapping shortcut)
//! remapper <target-dir> MAPPING MAPPING... -- COMMAND [ARGS...]
//! remapper [--debug-log FILE] <target-dir> MAPPING... -- COMMAND [ARGS...]
//! remapper --version | --help
//! ```

use std::path::PathBuf;

use remapper_core::{Mapping, TargetDir, MAX_MAPPINGS};

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("usage: remapper [--debug-log FILE] <target-dir> MAPPING [MAPPING...] [--] COMMAND [ARGS...]")]
    Usage,
    #[error("at most {MAX_MAPPINGS} mappings are supported, got {0}")]
    TooManyMappings(usize),
    #[error("no command given to run")]
    NoCommand,
    #[error(transparent)]
    Mapping(#[from] remapper_core::mapping::MappingError),
    #[error("--debug-log requires a file argument")]
    MissingDebugLogArg,
}

/// Parsed, not-yet-resolved request: [`crate::darwin`]/[`crate::linux`]
/// still need to create the target directory on disk before this becomes
/// a [`remapper_core::LaunchRequest`].
pub struct ParsedArgs {
    pub raw_mappings: Vec<String>,
    pub target_dir: PathBuf,
    pub debug_log: Option<PathBuf>,
    pub program: String,
    pub args: Vec<String>,
}

/// One of the two flags this binary understands before any mapping
/// argument.
pub enum TopLevel {
    ShowVersion,
    ShowHelp,
    Launch(ParsedArgs),
}

pub fn parse(argv: &[String]) -> Result<TopLevel, AdapterError> {
    if argv.iter().any(|a| a == "--version" || a == "-V") {
        return Ok(TopLevel::ShowVersion);
    }
    if argv.iter().any(|a| a == "--help" || a == "-h") {
        return Ok(TopLevel::ShowHelp);
    }

    let mut iter = argv.iter().peekable();
    let mut debug_log = None;

    // Consume leading flags; everything from here on is
    // "<target-dir> MAPPING... -- COMMAND..." or the single-mapping
    // shortcut "<target-dir> MAPPING COMMAND...".
    loop {
        match iter.peek().map(|s| s.as_str()) {
            Some("--debug-log") => {
                iter.next();
                let file = iter.next().ok_or(AdapterError::MissingDebugLogArg)?;
                debug_log = Some(PathBuf::from(file));
            }
            _ => break,
        }
    }

    // The first non-flag token is the mandatory target directory
    // (spec.md §6), never an optional flag.
    let target_dir = PathBuf::from(iter.next().ok_or(AdapterError::Usage)?);

    let rest: Vec<String> = iter.cloned().collect();
    if rest.is_empty() {
        return Err(AdapterError::Usage);
    }

    // If "--" appears, everything before it is the mapping list (one or
    // more) and everything after is the command. If it never appears,
    // only the *first* token is taken as a mapping (the single-mapping
    // shortcut) and the remainder is the command — so a caller who wants
    // two or more mappings must use "--", or their second mapping simply
    // becomes the program name.
    let (raw_mappings, remainder) = match rest.iter().position(|a| a == "--") {
        Some(idx) => (rest[..idx].to_vec(), rest[idx + 1..].to_vec()),
        None => (vec![rest[0].clone()], rest[1..].to_vec()),
    };

    if raw_mappings.is_empty() {
        return Err(AdapterError::Usage);
    }
    if raw_mappings.len() > MAX_MAPPINGS {
        return Err(AdapterError::TooManyMappings(raw_mappings.len()));
    }

    let (program, args) = remainder
        .split_first()
        .map(|(p, rest)| (p.clone(), rest.to_vec()))
        .ok_or(AdapterError::NoCommand)?;

    Ok(TopLevel::Launch(ParsedArgs {
        raw_mappings,
        target_dir,
        debug_log,
        program,
        args,
    }))
}

/// Finish building a [`remapper_core::LaunchRequest`] once the caller has
/// decided on a concrete target directory (darwin.rs/linux.rs each create
/// one differently: darwin always makes a fresh per-launch directory,
/// linux may reuse `--target` verbatim since its mounts are torn down
/// with the namespace).
pub fn build_request(
    parsed: ParsedArgs,
    target: TargetDir,
) -> Result<remapper_core::LaunchRequest, AdapterError> {
    let mappings = Mapping::parse_all(&parsed.raw_mappings)?;
    Ok(remapper_core::LaunchRequest {
        mappings,
        target,
        program: parsed.program,
        args: parsed.args,
        debug_log: parsed.debug_log,
    })
}

/// Create the user-supplied target directory (spec.md §6's mandatory
/// `<target-dir>` positional) if it doesn't already exist.
pub fn resolve_target(target_dir: PathBuf) -> std::io::Result<TargetDir> {
    std::fs::create_dir_all(&target_dir)?;
    Ok(TargetDir::new(target_dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn single_mapping_without_separator() {
        let parsed = match parse(&args(&["/tgt", "/h/.app*", "echo", "hi"])).unwrap() {
            TopLevel::Launch(p) => p,
            _ => panic!("expected Launch"),
        };
        assert_eq!(parsed.target_dir, PathBuf::from("/tgt"));
        assert_eq!(parsed.raw_mappings, vec!["/h/.app*"]);
        assert_eq!(parsed.program, "echo");
        assert_eq!(parsed.args, vec!["hi"]);
    }

    #[test]
    fn multiple_mappings_require_separator() {
        let parsed = match parse(&args(&["/tgt", "/h/.a*", "/h/.b*", "--", "echo", "hi"])).unwrap() {
            TopLevel::Launch(p) => p,
            _ => panic!("expected Launch"),
        };
        assert_eq!(parsed.target_dir, PathBuf::from("/tgt"));
        assert_eq!(parsed.raw_mappings, vec!["/h/.a*", "/h/.b*"]);
        assert_eq!(parsed.program, "echo");
    }

    #[test]
    fn without_separator_only_the_first_token_is_a_mapping() {
        // No "--": only "/h/.a*" is taken as a mapping, so "/h/.b*" ends
        // up as the program name — exactly why "--" is required once
        // there is more than one mapping.
        let parsed = match parse(&args(&["/tgt", "/h/.a*", "/h/.b*", "echo"])).unwrap() {
            TopLevel::Launch(p) => p,
            _ => panic!("expected Launch"),
        };
        assert_eq!(parsed.raw_mappings, vec!["/h/.a*"]);
        assert_eq!(parsed.program, "/h/.b*");
        assert_eq!(parsed.args, vec!["echo"]);
    }

    #[test]
    fn target_dir_is_mandatory_positional_and_debug_log_flag_parses() {
        let parsed = match parse(&args(&[
            "--debug-log",
            "/tmp/log",
            "/tgt",
            "/h/.a*",
            "--",
            "echo",
        ]))
        .unwrap()
        {
            TopLevel::Launch(p) => p,
            _ => panic!("expected Launch"),
        };
        assert_eq!(parsed.target_dir, PathBuf::from("/tgt"));
        assert_eq!(parsed.debug_log, Some(PathBuf::from("/tmp/log")));
    }

    #[test]
    fn version_flag_short_circuits() {
        assert!(matches!(
            parse(&args(&["--version"])).unwrap(),
            TopLevel::ShowVersion
        ));
    }

    #[test]
    fn no_mapping_is_usage_error() {
        assert!(matches!(parse(&args(&[])), Err(AdapterError::Usage)));
    }

    #[test]
    fn target_dir_without_mapping_is_usage_error() {
        assert!(matches!(parse(&args(&["/tgt"])), Err(AdapterError::Usage)));
    }
}
