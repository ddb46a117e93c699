//! Passes the board's linker script to the final link step.
//!
//! Mirrors the standard `cortex-m-rt`/rp2040-hal boilerplate: `memory.x`
//! defines the flash/RAM layout and the `.ram_code` section that the PDM
//! modulator is pinned into (see memory.x and SPEC_FULL.md #10.3).

use std::env;
use std::path::PathBuf;

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());
    std::fs::copy("memory.x", out.join("memory.x")).unwrap();
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}
