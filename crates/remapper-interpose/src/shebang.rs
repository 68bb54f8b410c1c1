//! Shebang parsing and resolution (component C5, spec.md §4.5).
//!
//! Matches kernel `execve(2)` semantics exactly: a shebang line is
//! `#!interpreter [single-argument]`, with leading whitespace after `#!`
//! skipped and everything up to the first whitespace (or end of line)
//! taken as the interpreter path; at most one further word is taken as
//! its argument, and anything after that is ignored by the kernel, so
//! this parser ignores it too.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use remapper_core::pathutil;

/// A parsed `#!` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shebang {
    pub interpreter: String,
    pub arg: Option<String>,
}

/// Read up to 512 bytes of `path` and parse a leading shebang line, if
/// present. Returns `None` for binaries, empty files, or anything not
/// starting with `#!`.
pub fn read(path: &Path) -> io::Result<Option<Shebang>> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; 512];
    let n = file.read(&mut buf)?;
    Ok(parse(&buf[..n]))
}

fn parse(bytes: &[u8]) -> Option<Shebang> {
    if !bytes.starts_with(b"#!") {
        return None;
    }
    let line_end = bytes.iter().position(|&b| b == b'\n').unwrap_or(bytes.len());
    let line = std::str::from_utf8(&bytes[2..line_end]).ok()?;
    let trimmed = line.trim_start();

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let interpreter = parts.next()?.to_string();
    if interpreter.is_empty() {
        return None;
    }
    let arg = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Some(Shebang { interpreter, arg })
}

/// How the interpreter named by a shebang should actually be launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// `#!/usr/bin/env PROG [arg]`: resolve `PROG` against `PATH` at
    /// launch time, exactly like the shell would.
    EnvLookup { program: String, arg: Option<String> },
    /// A direct interpreter path, launched as-is (after any trampoline
    /// substitution the caller applies separately).
    Direct { interpreter: PathBuf, arg: Option<String> },
}

/// Turn a [`Shebang`] into a [`Resolution`], special-casing the
/// `/usr/bin/env` wrapper the same way the kernel's own exec path does not
/// (the kernel treats `env` as just another interpreter; the *shell*
/// convention of `env PROG` resolving `PROG` against `PATH` is userspace
/// behaviour this function reproduces so redirected interpreters under
/// `env` still get matched against mappings).
pub fn resolve(shebang: &Shebang) -> Resolution {
    if shebang.interpreter == "/usr/bin/env" || shebang.interpreter == "env" {
        if let Some(arg) = &shebang.arg {
            let mut words = arg.splitn(2, char::is_whitespace);
            let program = words.next().unwrap_or_default().to_string();
            let rest = words.next().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
            return Resolution::EnvLookup { program, arg: rest };
        }
    }
    Resolution::Direct {
        interpreter: PathBuf::from(&shebang.interpreter),
        arg: shebang.arg.clone(),
    }
}

/// Resolve an `EnvLookup` program name against `PATH`, the one place this
/// module needs filesystem access beyond reading the shebang itself.
pub fn lookup_env_program(program: &str) -> Option<PathBuf> {
    pathutil::find_in_path(program)
}

/// Run the full C5 algorithm (spec.md §4.5 steps 1-6): given the script
/// being exec'd and its original argv (`orig_argv[0]` is the script path
/// as invoked), return the substitute `(new_binary, new_argv)` to exec
/// instead, or `None` if the kernel's own shebang handling should run
/// unmodified.
pub fn resolve_for_exec(
    script_path: &Path,
    orig_argv: &[String],
    cache_dir: &Path,
) -> Option<(PathBuf, Vec<String>)> {
    let shebang = read(script_path).ok().flatten()?;
    let script_path_str = script_path.to_string_lossy().into_owned();
    let rest = orig_argv.get(1..).unwrap_or(&[]);

    match resolve(&shebang) {
        Resolution::EnvLookup { program, arg } => {
            let resolved = lookup_env_program(&program)?;
            let mut argv = vec![resolved.to_string_lossy().into_owned()];
            if let Some(a) = arg {
                argv.push(a);
            }
            argv.push(script_path_str);
            argv.extend(rest.iter().cloned());
            Some((resolved, argv))
        }
        Resolution::Direct { interpreter, arg } => {
            // `trampoline::resolve` already folds in the SIP-protected
            // check and the hardened-runtime probe; it returns the
            // interpreter path unchanged when neither applies.
            let resolved = crate::trampoline::resolve(&interpreter, cache_dir).ok()?;
            if resolved == interpreter {
                return None;
            }
            let mut argv = vec![resolved.to_string_lossy().into_owned()];
            if let Some(a) = arg {
                argv.push(a);
            }
            argv.push(script_path_str);
            argv.extend(rest.iter().cloned());
            Some((resolved, argv))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interpreter_with_single_argument() {
        let s = parse(b"#!/usr/bin/env python3\nprint(1)\n").unwrap();
        assert_eq!(s.interpreter, "/usr/bin/env");
        assert_eq!(s.arg.as_deref(), Some("python3"));
    }

    #[test]
    fn parses_interpreter_with_no_argument() {
        let s = parse(b"#!/bin/sh\necho hi\n").unwrap();
        assert_eq!(s.interpreter, "/bin/sh");
        assert_eq!(s.arg, None);
    }

    #[test]
    fn rejects_non_shebang_content() {
        assert!(parse(b"\x7fELF\x02\x01\x01").is_none());
    }

    #[test]
    fn skips_whitespace_after_hashbang() {
        let s = parse(b"#!  /usr/bin/perl -w\n").unwrap();
        assert_eq!(s.interpreter, "/usr/bin/perl");
        assert_eq!(s.arg.as_deref(), Some("-w"));
    }

    #[test]
    fn env_shebang_resolves_to_env_lookup() {
        let s = Shebang {
            interpreter: "/usr/bin/env".to_string(),
            arg: Some("node".to_string()),
        };
        assert_eq!(
            resolve(&s),
            Resolution::EnvLookup { program: "node".to_string(), arg: None }
        );
    }

    #[test]
    fn direct_interpreter_resolves_to_direct() {
        let s = Shebang {
            interpreter: "/usr/bin/perl".to_string(),
            arg: Some("-w".to_string()),
        };
        assert_eq!(
            resolve(&s),
            Resolution::Direct {
                interpreter: PathBuf::from("/usr/bin/perl"),
                arg: Some("-w".to_string()),
            }
        );
    }
}
