//! Compiles the extension's C sources into a static archive that Cargo then
//! links into the extension crate.

use crate::rb_config::RbConfig;
use crate::utils::is_msvc;
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// A set of C sources and the flags and defines to compile them with.
#[derive(Default, Debug)]
pub struct Build {
    files: Vec<PathBuf>,
    flags: Vec<String>,
    defines: Vec<String>,
}

impl Build {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source file to the build.
    pub fn file<P: Into<PathBuf>>(&mut self, file: P) -> &mut Self {
        let file = file.into();
        println!("cargo:rerun-if-changed={}", file.display());
        self.files.push(file);
        self
    }

    /// Adds a raw compiler flag.
    pub fn flag(&mut self, flag: &str) -> &mut Self {
        self.flags.push(flag.to_owned());
        self
    }

    /// Defines a preprocessor symbol.
    pub fn define(&mut self, name: &str) -> &mut Self {
        self.defines.push(name.to_owned());
        self
    }

    /// Compiles and archives the sources, then tells Cargo to link the
    /// resulting static library.
    pub fn try_compile(&self, rb: &RbConfig, name: &str) -> Result<()> {
        let out_dir = PathBuf::from(env::var("OUT_DIR")?).join("cc");
        fs::create_dir_all(&out_dir)?;

        let mut objects = Vec::new();
        for file in &self.files {
            objects.push(self.compile_object(rb, file, &out_dir)?);
        }

        let lib_name = self.archive(rb, name, &out_dir, &objects)?;

        println!("cargo:rustc-link-search=native={}", out_dir.display());
        println!("cargo:rustc-link-lib=static={}", lib_name);

        Ok(())
    }

    fn compile_object(&self, rb: &RbConfig, file: &Path, out_dir: &Path) -> Result<PathBuf> {
        let object = object_path(out_dir, file)?;
        let (compiler, compiler_args) = tool(rb, "CC", "cc");

        let mut cmd = new_command(&compiler);
        cmd.args(&compiler_args)
            .args(&include_args(rb))
            .arg("-c")
            .arg(file)
            .args(&rb.cflags)
            .args(&profile_flags())
            .args(&self.flags)
            .args(self.defines.iter().map(|name| format!("-D{}", name)))
            .args(&output_file_args(&object));

        run_command(cmd)?;

        Ok(object)
    }

    fn archive(
        &self,
        rb: &RbConfig,
        name: &str,
        out_dir: &Path,
        objects: &[PathBuf],
    ) -> Result<String> {
        let mut hasher = DefaultHasher::new();
        for object in objects {
            hasher.write(object.to_string_lossy().as_bytes());
        }

        let lib_name = format!("{}-{}", name, hasher.finish());
        let dst = out_dir.join(format!("lib{}.a", lib_name));

        let (archiver, archiver_args) = tool(rb, "AR", "ar");
        let mut cmd = new_command(&archiver);
        cmd.args(&archiver_args);

        // The argument structure differs for MSVC and GCC.
        if is_msvc() {
            cmd.arg(format!("/OUT:{}", dst.display()));
        } else {
            cmd.env("ZERO_AR_DATE", "1").arg("crs").arg(&dst);
        }

        cmd.args(objects);

        run_command(cmd)?;

        // The Rust compiler will look for libfoo.a, but the MSVC linker is
        // also handed foo.lib, so make sure both exist.
        if is_msvc() {
            let lib_dst = dst.with_file_name(format!("{}.lib", lib_name));
            let _ = fs::remove_file(&lib_dst);
            fs::hard_link(&dst, &lib_dst)
                .or_else(|_| fs::copy(&dst, &lib_dst).map(|_| ()))
                .map_err(|_| "could not copy or hard-link the generated lib file")?;
        }

        Ok(lib_name)
    }
}

// Object files are named after their content hash, so an unchanged source
// reuses its object across rebuilds.
fn object_path(out_dir: &Path, file: &Path) -> Result<PathBuf> {
    let mut hasher = DefaultHasher::new();
    hasher.write(fs::read(file)?.as_slice());

    Ok(out_dir
        .join(hasher.finish().to_string())
        .with_extension("o"))
}

fn include_args(rb: &RbConfig) -> Vec<String> {
    vec![
        format!("-I{}", rb.get("rubyhdrdir")),
        format!("-I{}", rb.get("rubyarchhdrdir")),
    ]
}

fn profile_flags() -> Vec<String> {
    let mut flags = Vec::new();

    if let Ok(val) = env::var("DEBUG") {
        if val == "true" {
            if is_msvc() {
                flags.push("-Z7".into());
            } else if cfg!(target_os = "linux") {
                flags.push("-gdwarf-4".into());
            } else {
                flags.push("-gdwarf-2".into());
            }
        }
    }

    if !is_msvc() {
        flags.push("-ffunction-sections".into());
        flags.push("-fdata-sections".into());
        flags.push("-fPIC".into());
        flags.push("-fno-omit-frame-pointer".into());
    }

    if let Ok(level) = env::var("OPT_LEVEL") {
        match level.as_str() {
            // MSVC uses /O1 for all optimizations that minimize code size.
            "z" | "s" | "1" if is_msvc() => flags.push("-O1".into()),
            // -O3 is valid for gcc and clang, but not MSVC. Cap to /O2.
            "2" | "3" if is_msvc() => flags.push("-O2".into()),
            level => flags.push(format!("-O{}", level)),
        }
    }

    flags
}

// Tools come from rbconfig (CC/AR), which may carry leading args such as
// `ccache cc`.
fn tool(rb: &RbConfig, key: &str, default: &str) -> (String, Vec<String>) {
    let value = rb.get_optional(key).unwrap_or_default();
    let mut words = value.split_whitespace();
    let tool = words.next().unwrap_or(default).to_owned();
    let args: Vec<String> = words.map(Into::into).collect();

    if key == "AR" && tool == "libtool" {
        return ("ar".into(), Vec::new());
    }

    (tool, args)
}

fn output_file_args(file: &Path) -> Vec<OsString> {
    if is_msvc() {
        vec![format!("-Fo{}", file.display()).into()]
    } else {
        vec!["-o".into(), file.into()]
    }
}

fn new_command(name: &str) -> Command {
    let mut cmd = Command::new(name);
    cmd.stderr(Stdio::inherit()).stdout(Stdio::inherit());
    cmd
}

fn run_command(mut cmd: Command) -> Result<ExitStatus> {
    eprintln!("Running {:?}", cmd);
    let status = cmd.status()?;

    if !status.success() {
        Err(format!("Command '{:?}' failed with status: {}", cmd, status).into())
    } else {
        Ok(status)
    }
}
