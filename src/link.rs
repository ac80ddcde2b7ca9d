//! Structured linker arguments for the extension link line.
//!
//! rbconfig hands out `DLDFLAGS` as one shell string, while Cargo wants
//! discrete `rustc-link-*` directives. This module classifies each flag the
//! way mkmf would pass it to the linker.

use std::fmt;

use regex::Regex;

lazy_static::lazy_static! {
    static ref SEARCH_PATH_REGEX: Regex = Regex::new(r"^-L\s*(?P<name>.*)$").unwrap();
    static ref LIB_SHORT_REGEX: Regex = Regex::new(r"^-l\s*(?P<name>\w+\S+)$").unwrap();
    static ref LIB_LONG_REGEX: Regex = Regex::new(r"^--library=(?P<name>\w+\S+)$").unwrap();
    static ref STATIC_LIB_REGEX: Regex = Regex::new(r"^-l\s*:lib(?P<name>\S+)\.a$").unwrap();
    static ref DYLIB_REGEX: Regex = Regex::new(r"^-l\s*:lib(?P<name>\S+)\.(so|dylib|dll)$").unwrap();
    static ref FRAMEWORK_PATH_REGEX: Regex = Regex::new(r"^-F\s*(?P<name>.*)$").unwrap();
    static ref FRAMEWORK_REGEX: Regex = Regex::new(r"^-framework\s*(?P<name>.*)$").unwrap();
}

/// The kind of library to link.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LibraryKind {
    Framework,
    Dylib,
    Static,
    Unspecified,
}

/// A library to link with Cargo.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Library {
    pub kind: LibraryKind,
    pub name: String,
}

impl Library {
    fn new<T: Into<String>>(kind: LibraryKind, name: T) -> Self {
        Library {
            kind,
            name: name.into(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.kind == LibraryKind::Static
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            LibraryKind::Framework => write!(f, "framework={}", self.name),
            LibraryKind::Dylib => write!(f, "dylib={}", self.name),
            LibraryKind::Static => write!(f, "static={}", self.name),
            LibraryKind::Unspecified => write!(f, "{}", self.name),
        }
    }
}

/// The kind of linker search path.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SearchPathKind {
    Native,
    Framework,
}

/// A linker search path that can be handed to Cargo.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SearchPath {
    pub kind: SearchPathKind,
    pub name: String,
}

impl fmt::Display for SearchPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            SearchPathKind::Native => write!(f, "native={}", self.name),
            SearchPathKind::Framework => write!(f, "framework={}", self.name),
        }
    }
}

/// Ordered, deduplicated linker arguments parsed from a `DLDFLAGS`-style
/// string.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LinkArgs {
    pub search_paths: Vec<SearchPath>,
    pub libs: Vec<Library>,
    pub link_args: Vec<String>,
}

impl LinkArgs {
    /// Classifies every flag in the input. Anything that is not a search
    /// path, library, or framework is kept as a raw link arg.
    pub fn parse(input: &str) -> LinkArgs {
        let mut args = LinkArgs::default();

        for flag in Flags::new(input) {
            if let Some(name) = capture(&SEARCH_PATH_REGEX, flag) {
                args.push_search_path(SearchPath {
                    kind: SearchPathKind::Native,
                    name,
                });
            } else if let Some(name) = capture(&LIB_LONG_REGEX, flag) {
                args.push_lib(Library::new(LibraryKind::Unspecified, name));
            } else if let Some(name) = capture(&STATIC_LIB_REGEX, flag) {
                args.push_lib(Library::new(LibraryKind::Static, name));
            } else if let Some(name) = capture(&DYLIB_REGEX, flag) {
                args.push_lib(Library::new(LibraryKind::Dylib, name));
            } else if let Some(name) = capture(&LIB_SHORT_REGEX, flag) {
                // libruby-static is handed out as a plain -l flag.
                if name.contains("ruby") && name.contains("-static") {
                    args.push_lib(Library::new(LibraryKind::Static, name));
                } else {
                    args.push_lib(Library::new(LibraryKind::Unspecified, name));
                }
            } else if let Some(name) = capture(&FRAMEWORK_PATH_REGEX, flag) {
                args.push_search_path(SearchPath {
                    kind: SearchPathKind::Framework,
                    name,
                });
            } else if let Some(name) = capture(&FRAMEWORK_REGEX, flag) {
                args.push_lib(Library::new(LibraryKind::Framework, name));
            } else {
                args.push_link_arg(flag.to_owned());
            }
        }

        args
    }

    /// Renders the Cargo directives for these link arguments.
    pub fn cargo_args(&self) -> Vec<String> {
        let mut result = Vec::new();

        for search_path in &self.search_paths {
            result.push(format!("cargo:rustc-link-search={}", search_path));
        }

        for lib in &self.libs {
            result.push(format!("cargo:rustc-link-lib={}", lib));
        }

        for link_arg in &self.link_args {
            result.push(format!("cargo:rustc-link-arg={}", link_arg));
        }

        result
    }

    fn push_search_path(&mut self, path: SearchPath) {
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
    }

    fn push_lib(&mut self, lib: Library) {
        if !self.libs.contains(&lib) {
            self.libs.push(lib);
        }
    }

    fn push_link_arg(&mut self, arg: String) {
        if !self.link_args.contains(&arg) {
            self.link_args.push(arg);
        }
    }
}

fn capture(regex: &Regex, flag: &str) -> Option<String> {
    regex
        .captures(flag)
        .map(|cap| cap.name("name").unwrap().as_str().trim().to_owned())
}

/// Iterator over a flag string that starts a new flag only at a `-`
/// following whitespace, so values containing spaces stay attached to their
/// flag.
pub(crate) struct Flags<'a> {
    rest: &'a str,
}

impl<'a> Flags<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Flags { rest: input.trim() }
    }
}

impl<'a> Iterator for Flags<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }

        let bytes = self.rest.as_bytes();
        let mut split = self.rest.len();

        for i in 1..bytes.len() {
            if bytes[i] == b'-' && bytes[i - 1] == b' ' {
                split = i;
                break;
            }
        }

        let (flag, rest) = self.rest.split_at(split);
        self.rest = rest.trim_start();

        Some(flag.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_paths() {
        let args = LinkArgs::parse("-L/usr/local/lib -L /usr/lib");

        assert_eq!(
            args.cargo_args(),
            [
                "cargo:rustc-link-search=native=/usr/local/lib",
                "cargo:rustc-link-search=native=/usr/lib"
            ]
        );
    }

    #[test]
    fn test_search_path_with_space_in_path() {
        let args = LinkArgs::parse("-L/usr/local/my lib");

        assert_eq!(
            args.search_paths,
            [SearchPath {
                kind: SearchPathKind::Native,
                name: "/usr/local/my lib".into(),
            }]
        );
    }

    #[test]
    fn test_simple_lib() {
        let args = LinkArgs::parse("-lfoo");

        assert_eq!(args.cargo_args(), ["cargo:rustc-link-lib=foo"]);
    }

    #[test]
    fn test_lib_with_space() {
        let args = LinkArgs::parse("-l foo");

        assert_eq!(args.cargo_args(), ["cargo:rustc-link-lib=foo"]);
    }

    #[test]
    fn test_long_lib() {
        let args = LinkArgs::parse("--library=foo");

        assert_eq!(args.cargo_args(), ["cargo:rustc-link-lib=foo"]);
    }

    #[test]
    fn test_static_lib_with_colon() {
        let args = LinkArgs::parse("-l:libssp.a");

        assert_eq!(args.cargo_args(), ["cargo:rustc-link-lib=static=ssp"]);
    }

    #[test]
    fn test_dylib_with_colon_space() {
        let args = LinkArgs::parse("-l :libssp.so");

        assert_eq!(args.cargo_args(), ["cargo:rustc-link-lib=dylib=ssp"]);
    }

    #[test]
    fn test_unconventional_colon_lib_is_passed_through() {
        let args = LinkArgs::parse("-l:ssp.a");

        assert_eq!(args.cargo_args(), ["cargo:rustc-link-arg=-l:ssp.a"]);
    }

    #[test]
    fn test_libruby_static_naming() {
        let args = LinkArgs::parse("-lruby.3.4-static");

        assert!(args.libs[0].is_static());
        assert_eq!(
            args.cargo_args(),
            ["cargo:rustc-link-lib=static=ruby.3.4-static"]
        );
    }

    #[test]
    fn test_frameworks() {
        let args = LinkArgs::parse("-F /Library/Frameworks -framework CoreFoundation");

        assert_eq!(
            args.cargo_args(),
            [
                "cargo:rustc-link-search=framework=/Library/Frameworks",
                "cargo:rustc-link-lib=framework=CoreFoundation"
            ]
        );
    }

    #[test]
    fn test_passthrough_link_args() {
        let args = LinkArgs::parse("-Wl,-undefined,dynamic_lookup -static-libgcc");

        assert_eq!(
            args.cargo_args(),
            [
                "cargo:rustc-link-arg=-Wl,-undefined,dynamic_lookup",
                "cargo:rustc-link-arg=-static-libgcc"
            ]
        );
    }

    #[test]
    fn test_non_flag_input_is_passed_through() {
        let args = LinkArgs::parse("test_rubygems_20220413-976-lemgf9/prefix");

        assert_eq!(
            args.link_args,
            ["test_rubygems_20220413-976-lemgf9/prefix"]
        );
    }

    #[test]
    fn test_dedupes_repeated_flags() {
        let args = LinkArgs::parse("-L/opt/lib -lfoo -L/opt/lib -lfoo");

        assert_eq!(
            args.cargo_args(),
            [
                "cargo:rustc-link-search=native=/opt/lib",
                "cargo:rustc-link-lib=foo"
            ]
        );
    }

    #[test]
    fn test_real_dldflags() {
        let args = LinkArgs::parse(
            "-L/opt/rubies/3.4.1/lib -L/opt/homebrew/opt/openssl@3/lib -Wl,-undefined,dynamic_lookup -Wl,-multiply_defined,suppress",
        );

        assert_eq!(
            args.search_paths,
            [
                SearchPath {
                    kind: SearchPathKind::Native,
                    name: "/opt/rubies/3.4.1/lib".into(),
                },
                SearchPath {
                    kind: SearchPathKind::Native,
                    name: "/opt/homebrew/opt/openssl@3/lib".into(),
                },
            ]
        );
        assert_eq!(
            args.link_args,
            ["-Wl,-undefined,dynamic_lookup", "-Wl,-multiply_defined,suppress"]
        );
    }

    #[test]
    fn test_flags_split_on_flag_boundaries() {
        let flags: Vec<_> = Flags::new("--foo --bar -baz").collect();

        assert_eq!(flags, ["--foo", "--bar", "-baz"]);
    }

    #[test]
    fn test_flags_keep_values_with_spaces() {
        let flags: Vec<_> = Flags::new("-ltest     --library test").collect();

        assert_eq!(flags, ["-ltest", "--library test"]);
    }

    #[test]
    fn test_flags_keep_dashed_values() {
        let flags: Vec<_> = Flags::new("-ltest -fsomething-foo bar-val").collect();

        assert_eq!(flags, ["-ltest", "-fsomething-foo bar-val"]);
    }
}
