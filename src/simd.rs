//! Target probe for the SIMD string-escaping fast path.
//!
//! The generator ships NEON and SSE2 variants of its escape scanner, gated
//! in C behind `HAVE_SIMD_NEON` and `HAVE_SIMD_SSE2`. Cargo already knows
//! the compile target, so the probe reads the build-script environment
//! instead of test-compiling intrinsics.

use std::env;

/// A SIMD flavor the generator has an escape-scanner variant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Simd {
    Neon,
    Sse2,
}

impl Simd {
    /// Probes the Cargo target for a usable SIMD flavor. Setting
    /// `JSON_DISABLE_SIMD` forces the portable scanner.
    pub fn detect() -> Option<Simd> {
        println!("cargo:rerun-if-env-changed=JSON_DISABLE_SIMD");

        if env::var_os("JSON_DISABLE_SIMD").is_some() {
            return None;
        }

        let arch = env::var("CARGO_CFG_TARGET_ARCH").ok()?;

        match arch.as_str() {
            "aarch64" => Some(Simd::Neon),
            // SSE2 is baseline on x86_64.
            "x86_64" => Some(Simd::Sse2),
            "x86" if has_target_feature("sse2") => Some(Simd::Sse2),
            _ => None,
        }
    }

    /// The preprocessor symbol gating this variant.
    pub fn define(self) -> &'static str {
        match self {
            Simd::Neon => "HAVE_SIMD_NEON",
            Simd::Sse2 => "HAVE_SIMD_SSE2",
        }
    }

    /// The source file implementing this variant.
    pub fn src(self) -> &'static str {
        match self {
            Simd::Neon => "generator_neon.c",
            Simd::Sse2 => "generator_sse2.c",
        }
    }
}

fn has_target_feature(feature: &str) -> bool {
    match env::var("CARGO_CFG_TARGET_FEATURE") {
        Ok(features) => features.split(',').any(|f| f == feature),
        Err(_) => false,
    }
}
