use std::env;

/// Check if the build target is MSVC.
pub fn is_msvc() -> bool {
    env::var("TARGET")
        .map(|target| target.contains("msvc"))
        .unwrap_or(false)
}

/// Splits a flag string into shell words, falling back to plain whitespace
/// splitting when the input is unbalanced.
pub fn shellsplit(s: &str) -> Vec<String> {
    match shell_words::split(s) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("shellsplit failed: {}", e);
            s.split_whitespace().map(Into::into).collect()
        }
    }
}
