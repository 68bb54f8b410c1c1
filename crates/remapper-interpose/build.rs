//! Compiles the C shim that bridges variadic `open`/`openat`/`creat` into
//! fixed-arity functions the Rust side can call directly. Stable Rust has
//! no portable way to forward a C `va_list`, so the third argument to
//! `open`/`openat` (only meaningful when `O_CREAT`/`O_TMPFILE` is set) is
//! handled in C instead.

fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "macos" || target_os == "linux" {
        println!("cargo:rerun-if-changed=src/c/variadic.c");

        cc::Build::new()
            .file("src/c/variadic.c")
            .define("_GNU_SOURCE", None)
            .opt_level(2)
            .compile("remapper_variadic");
    }
}
