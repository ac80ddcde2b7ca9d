//! Build-path selection for the generator extension.
//!
//! Mirrors the gem's `extconf.rb`: TruffleRuby gets no native extension at
//! all, every other engine compiles the C generator together with the ryu
//! float formatter.

use crate::cc;
use crate::rb_config::RbConfig;
use crate::simd::Simd;
use std::error::Error;
use std::path::PathBuf;

/// Engine whose pure-Ruby generator outruns the native one.
const PURE_RUBY_ENGINE: &str = "truffleruby";

/// Archive name for the compiled extension.
const EXT_NAME: &str = "json_ext_generator";

/// The cfg set for the extension crate when the native generator is built.
const NATIVE_CFG: &str = "json_ext_native";

/// Accumulated compiler configuration for the generator extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtConf {
    src_dir: PathBuf,
    cflags: Vec<String>,
    defines: Vec<String>,
    srcs: Vec<String>,
}

impl ExtConf {
    /// Creates an empty configuration rooted at the given source directory.
    pub fn new<P: Into<PathBuf>>(src_dir: P) -> Self {
        ExtConf {
            src_dir: src_dir.into(),
            cflags: Vec::new(),
            defines: Vec::new(),
            srcs: Vec::new(),
        }
    }

    /// Shell-splits the given string and appends each compiler flag,
    /// skipping duplicates.
    pub fn append_cflags(&mut self, cflags: &str) -> &mut Self {
        for flag in crate::utils::shellsplit(cflags) {
            if !self.cflags.contains(&flag) {
                self.cflags.push(flag);
            }
        }

        self
    }

    /// Appends a preprocessor define.
    pub fn append_define(&mut self, define: &str) -> &mut Self {
        self.defines.push(define.to_owned());
        self
    }

    /// Replaces the source file list.
    pub fn set_srcs(&mut self, srcs: &[&str]) -> &mut Self {
        self.srcs = srcs.iter().map(|src| (*src).to_owned()).collect();
        self
    }

    /// Adds the escape-scanner variant for the given SIMD flavor.
    pub fn enable_simd(&mut self, simd: Simd) -> &mut Self {
        self.append_define("HAVE_SIMD");
        self.append_define(simd.define());
        self.srcs.push(simd.src().to_owned());
        self
    }

    /// The accumulated compiler flags.
    pub fn cflags(&self) -> &[String] {
        &self.cflags
    }

    /// The accumulated preprocessor defines.
    pub fn defines(&self) -> &[String] {
        &self.defines
    }

    /// The source file list, in compile order.
    pub fn srcs(&self) -> &[String] {
        &self.srcs
    }

    fn to_build(&self) -> cc::Build {
        let mut build = cc::Build::new();

        for src in &self.srcs {
            build.file(self.src_dir.join(src));
        }

        for flag in &self.cflags {
            build.flag(flag);
        }

        for define in &self.defines {
            build.define(define);
        }

        build
    }
}

/// What the build script will do for the current Ruby. Exactly one variant
/// is produced per selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildPlan {
    /// Nothing to compile; the gem falls back to its pure-Ruby generator.
    PureRuby,
    /// Compile the native generator with the given configuration.
    Native(ExtConf),
}

impl BuildPlan {
    /// Selects the build path for a Ruby engine. The choice depends only on
    /// the engine string.
    pub fn new<P: Into<PathBuf>>(engine: &str, src_dir: P, simd: Option<Simd>) -> BuildPlan {
        if engine == PURE_RUBY_ENGINE {
            // The pure-Ruby generator is faster on TruffleRuby, so skip
            // compiling the generator extension.
            return BuildPlan::PureRuby;
        }

        let mut conf = ExtConf::new(src_dir);
        conf.append_cflags("-std=c99");
        conf.append_define("JSON_GENERATOR");
        conf.set_srcs(&["generator.c", "ryu.c", "ryu_platform.c"]);

        if let Some(simd) = simd {
            conf.enable_simd(simd);
        }

        BuildPlan::Native(conf)
    }

    /// Whether the native extension will be compiled.
    pub fn is_native(&self) -> bool {
        match self {
            BuildPlan::Native(_) => true,
            BuildPlan::PureRuby => false,
        }
    }

    /// The Cargo directives this plan emits. A pure-Ruby plan produces only
    /// the cfg registration, so the extension crate never sees
    /// `json_ext_native`.
    pub fn cargo_args(&self, rb: &RbConfig) -> Vec<String> {
        let mut result = vec![format!("cargo:rustc-check-cfg=cfg({})", NATIVE_CFG)];

        if let BuildPlan::Native(_) = self {
            result.push(format!("cargo:rustc-cfg={}", NATIVE_CFG));
            result.extend(rb.link_args().cargo_args());
        }

        result
    }

    /// Prints the directives and compiles the extension when the plan calls
    /// for it.
    pub fn execute(&self, rb: &RbConfig) -> Result<(), Box<dyn Error>> {
        for arg in self.cargo_args(rb) {
            println!("{}", arg);
        }

        if let BuildPlan::Native(conf) = self {
            conf.to_build().try_compile(rb, EXT_NAME)?;
        }

        Ok(())
    }
}

/// Selects and configures the build plan for the given Ruby.
pub fn configure<P: Into<PathBuf>>(rb: &RbConfig, src_dir: P) -> BuildPlan {
    BuildPlan::new(&rb.engine(), src_dir, Simd::detect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truffleruby_skips_native_extension() {
        let plan = BuildPlan::new("truffleruby", "ext", None);

        assert_eq!(plan, BuildPlan::PureRuby);
    }

    #[test]
    fn test_truffleruby_ignores_simd() {
        let plan = BuildPlan::new("truffleruby", "ext", Some(Simd::Neon));

        assert_eq!(plan, BuildPlan::PureRuby);
    }

    #[test]
    fn test_cruby_compiles_generator_and_ryu() {
        let plan = BuildPlan::new("ruby", "ext", None);

        match plan {
            BuildPlan::Native(conf) => {
                assert_eq!(conf.cflags(), ["-std=c99"]);
                assert_eq!(conf.defines(), ["JSON_GENERATOR"]);
                assert_eq!(conf.srcs(), ["generator.c", "ryu.c", "ryu_platform.c"]);
            }
            BuildPlan::PureRuby => panic!("expected a native plan"),
        }
    }

    #[test]
    fn test_other_engines_get_the_native_extension() {
        assert!(BuildPlan::new("jruby", "ext", None).is_native());
        assert!(BuildPlan::new("mruby", "ext", None).is_native());
        assert!(BuildPlan::new("", "ext", None).is_native());
    }

    #[test]
    fn test_selection_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(BuildPlan::new("truffleruby", "ext", None), BuildPlan::PureRuby);
            assert!(BuildPlan::new("ruby", "ext", None).is_native());
        }
    }

    #[test]
    fn test_simd_appends_after_base_srcs() {
        let plan = BuildPlan::new("ruby", "ext", Some(Simd::Sse2));

        match plan {
            BuildPlan::Native(conf) => {
                assert_eq!(
                    conf.srcs(),
                    ["generator.c", "ryu.c", "ryu_platform.c", "generator_sse2.c"]
                );
                assert_eq!(
                    conf.defines(),
                    ["JSON_GENERATOR", "HAVE_SIMD", "HAVE_SIMD_SSE2"]
                );
            }
            BuildPlan::PureRuby => panic!("expected a native plan"),
        }
    }

    #[test]
    fn test_pure_ruby_descriptor_is_noop() {
        let rb = RbConfig::new();
        let plan = BuildPlan::new("truffleruby", "ext", None);

        assert_eq!(
            plan.cargo_args(&rb),
            ["cargo:rustc-check-cfg=cfg(json_ext_native)"]
        );
    }

    #[test]
    fn test_native_descriptor_sets_cfg_and_link_args() {
        let mut rb = RbConfig::new();
        rb.set_value_for_key("DLDFLAGS", "-L/opt/ruby/lib -Wl,--export-dynamic".into());

        let plan = BuildPlan::new("ruby", "ext", None);

        assert_eq!(
            plan.cargo_args(&rb),
            [
                "cargo:rustc-check-cfg=cfg(json_ext_native)",
                "cargo:rustc-cfg=json_ext_native",
                "cargo:rustc-link-search=native=/opt/ruby/lib",
                "cargo:rustc-link-arg=-Wl,--export-dynamic",
            ]
        );
    }

    #[test]
    fn test_append_cflags_dedupes() {
        let mut conf = ExtConf::new("ext");
        conf.append_cflags("-std=c99 -Wall");
        conf.append_cflags("-std=c99");

        assert_eq!(conf.cflags(), ["-std=c99", "-Wall"]);
    }
}
