//! Generates `agristat.h` for the desktop shell.
//!
//! The header always lands in `OUT_DIR`. Setting `AGRISTAT_HEADER_DIR`
//! copies it to that directory as well, which is how the shell project
//! picks it up without reaching into the cargo target tree.

use std::env;
use std::path::PathBuf;

const HEADER_DIR_VAR: &str = "AGRISTAT_HEADER_DIR";

fn main() {
    println!("cargo:rerun-if-changed=src/ffi.rs");
    println!("cargo:rerun-if-changed=cbindgen.toml");
    println!("cargo:rerun-if-env-changed={HEADER_DIR_VAR}");

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("set by cargo"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("set by cargo"));
    let header = format!("{}.h", env::var("CARGO_PKG_NAME").expect("set by cargo"));

    let config = match cbindgen::Config::from_file(crate_dir.join("cbindgen.toml")) {
        Ok(config) => config,
        Err(e) => {
            println!("cargo:warning=cbindgen.toml unreadable ({e}); using defaults");
            cbindgen::Config::default()
        }
    };

    let bindings = match cbindgen::generate_with_config(&crate_dir, config) {
        Ok(bindings) => bindings,
        Err(e) => {
            // A half-edited ffi.rs should not block `cargo test`.
            println!("cargo:warning=C header not generated: {e}");
            return;
        }
    };

    bindings.write_to_file(out_dir.join(&header));
    if let Some(dir) = env::var_os(HEADER_DIR_VAR).map(PathBuf::from) {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            println!("cargo:warning=cannot create {}: {e}", dir.display());
            return;
        }
        bindings.write_to_file(dir.join(&header));
    }
}
