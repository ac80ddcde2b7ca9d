//! # `json-ext-build`
//!
//! Build support for the `json` gem's native generator extension.
//!
//! On TruffleRuby the extension is never compiled, since the pure-Ruby
//! generator is faster there. On every other engine the generator's C
//! sources are compiled against the current Ruby's headers and archived into
//! a static library that Cargo links into the extension crate.
//!
//! ## Usage
//!
//! Add this to the extension crate's `Cargo.toml`:
//!
//! ```toml
//! [build-dependencies]
//! json-ext-build = "0.2"
//! ```
//!
//! Then, in its `build.rs`:
//!
//! ```rust,no_run
//! pub fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let plan = json_ext_build::activate("ext/generator")?;
//!
//!     if !plan.is_native() {
//!         println!("cargo:warning=falling back to the pure-Ruby generator");
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! The extension crate can gate its native entry points on the
//! `json_ext_native` cfg, which is only set when the C sources were
//! compiled.

pub mod cc;
pub mod utils;

mod ext_conf;
mod link;
mod rb_config;
mod simd;

pub use ext_conf::*;
pub use link::{Library, LibraryKind, LinkArgs, SearchPath, SearchPathKind};
pub use rb_config::*;
pub use simd::Simd;

use std::error::Error;
use std::path::Path;

/// The current RbConfig.
pub fn rb_config() -> RbConfig {
    RbConfig::current()
}

/// Selects the build path for the current Ruby and carries it out. `src_dir`
/// is the directory holding the extension's C sources, relative to the
/// consuming crate's root.
pub fn activate<P: AsRef<Path>>(src_dir: P) -> Result<BuildPlan, Box<dyn Error>> {
    let rb = RbConfig::current();
    let plan = configure(&rb, src_dir.as_ref());

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=JSON_EXT_BUILD_DEBUG");

    if std::env::var_os("JSON_EXT_BUILD_DEBUG").is_some() {
        debug_and_exit(&rb, &plan);
    }

    plan.execute(&rb)?;

    Ok(plan)
}

fn debug_and_exit(rb: &RbConfig, plan: &BuildPlan) {
    eprintln!("========== RbConfig\n");
    dbg!(rb);

    eprintln!("========== BuildPlan\n");
    dbg!(plan);

    eprintln!("==========\n");
    eprintln!("The \"JSON_EXT_BUILD_DEBUG\" env var was detected, aborting build.");
    std::process::exit(1);
}
