use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::process::Command;

use regex::{Captures, Regex};

use crate::link::LinkArgs;
use crate::utils::shellsplit;

lazy_static::lazy_static! {
    static ref SHELL_VAR_REGEX: Regex = Regex::new(r"\$\((?P<name>[^)]+)\)( ?)").unwrap();
}

/// Queries and caches `RbConfig::CONFIG` values for the Ruby the extension
/// is being compiled for.
#[derive(Debug, PartialEq, Eq)]
pub struct RbConfig {
    pub cflags: Vec<String>,
    value_map: HashMap<String, String>,
}

impl Default for RbConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RbConfig {
    /// Creates a new, blank `RbConfig`. You likely want `RbConfig::current()`
    /// instead.
    pub fn new() -> RbConfig {
        RbConfig {
            cflags: Vec::new(),
            value_map: HashMap::new(),
        }
    }

    /// Instantiates an `RbConfig` for the current Ruby by spawning it once.
    /// The interpreter is taken from the `RUBY` env var and defaults to
    /// `ruby`.
    pub fn current() -> RbConfig {
        println!("cargo:rerun-if-env-changed=RUBY");

        let ruby = env::var_os("RUBY").unwrap_or_else(|| OsString::from("ruby"));

        let config = Command::new(ruby)
            .arg("--disable-gems")
            .arg("-rrbconfig")
            .arg("-e")
            .arg("print(([[\"RUBY_ENGINE\", RUBY_ENGINE]] + RbConfig::CONFIG.to_a).map {|kv| kv.join(\"\x1F\")}.join(\"\x1E\"))")
            .output()
            .unwrap_or_else(|e| panic!("ruby not found: {}", e));

        let output = String::from_utf8(config.stdout).expect("RbConfig value not UTF-8!");

        let mut rbconfig = RbConfig::new();

        for entry in output.split('\x1E') {
            let mut parts = entry.splitn(2, '\x1F');
            if let (Some(key), Some(val)) = (parts.next(), parts.next()) {
                rbconfig.value_map.insert(key.to_owned(), val.to_owned());
            }
        }

        if let Some(cflags) = rbconfig.get_optional("cflags") {
            rbconfig.push_cflags(&cflags);
        }

        rbconfig
    }

    /// The engine identifier of the targeted Ruby (`"ruby"`,
    /// `"truffleruby"`, `"jruby"`, ...). Defaults to `"ruby"` when the
    /// interpreter did not report one.
    pub fn engine(&self) -> String {
        self.get_optional("RUBY_ENGINE")
            .unwrap_or_else(|| "ruby".to_owned())
    }

    /// Returns the value of the given key from either the matching
    /// `RBCONFIG_{key}` environment variable or the cached
    /// `RbConfig::CONFIG` hash.
    pub fn get(&self, key: &str) -> String {
        self.get_optional(key)
            .unwrap_or_else(|| panic!("Key not found: {}", key))
    }

    /// Same as `get`, but returns `None` for missing keys.
    pub fn get_optional(&self, key: &str) -> Option<String> {
        println!("cargo:rerun-if-env-changed=RBCONFIG_{}", key);

        match env::var(format!("RBCONFIG_{}", key)) {
            Ok(val) => Some(val),
            _ => self.value_map.get(key).map(|val| val.to_owned()),
        }
    }

    /// Shell-splits the given string and appends each flag, skipping
    /// duplicates.
    pub fn push_cflags(&mut self, cflags: &str) -> &mut Self {
        for flag in shellsplit(cflags) {
            if !self.cflags.contains(&flag) {
                self.cflags.push(flag);
            }
        }

        self
    }

    /// Get major/minor version tuple of Ruby.
    pub fn major_minor(&self) -> (u32, u32) {
        let major = self.get("MAJOR").parse::<u32>().unwrap();
        let minor = self.get("MINOR").parse::<u32>().unwrap();
        (major, minor)
    }

    /// Structured linker arguments for the extension, extracted from
    /// `DLDFLAGS`.
    pub fn link_args(&self) -> LinkArgs {
        match self.get_optional("DLDFLAGS") {
            Some(flags) => LinkArgs::parse(&self.subst_shell_variables(&flags)),
            None => LinkArgs::default(),
        }
    }

    /// Sets a value for a key.
    pub fn set_value_for_key(&mut self, key: &str, value: String) {
        self.value_map.insert(key.to_owned(), value);
    }

    // Expands $(VAR) references from the value map or the process env. An
    // unknown variable is removed together with one trailing space, which is
    // what make would leave behind.
    fn subst_shell_variables(&self, input: &str) -> String {
        SHELL_VAR_REGEX
            .replace_all(input, |caps: &Captures| {
                let name = &caps["name"];

                match self.get_optional(name).or_else(|| env::var(name).ok()) {
                    Some(val) => format!("{}{}", val, &caps[2]),
                    None => String::new(),
                }
            })
            .into_owned()
    }
}
