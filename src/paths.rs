//! Reserved naming scheme and path string helpers.
//!
//! The filesystem view reserves a short prefix for names it derives itself:
//! `@scalar` wraps a scalar document root, `@<index>` keys a reified array
//! element, and `@2F` stands in for `/` inside user-supplied object keys.
//! Every boundary layer uses these tokens through this module.

/// Prefix reserved for derived names.
pub const PREFIX: &str = "@";

/// Key wrapping a scalar document root.
pub const SCALAR_KEY: &str = "@scalar";

/// Token substituted for `/` in user object keys.
pub const SLASH_TOKEN: &str = "@2F";

/// Virtual file reporting the dirty state.
pub const STATUS_PATH: &str = "/.status";

/// Virtual file that flushes the document when written.
pub const SAVE_PATH: &str = "/.save";

/// Basenames at or beyond this length are rejected.
pub const MAX_NAME_LEN: usize = 64;

/// True for the two virtual control files at the mount root.
pub fn is_control_file(path: &str) -> bool {
    path == STATUS_PATH || path == SAVE_PATH
}

/// The reserved key for array index `index`.
pub fn index_key(index: usize) -> String {
    format!("{PREFIX}{index}")
}

/// Parse an `@<decimal>` key back into its array index.
///
/// Keys with leading zeros (other than `@0` itself) are rejected so that
/// `@00` can never collide with `@0` during array reconstruction.
pub fn parse_index_key(key: &str) -> Option<usize> {
    let digits = key.strip_prefix(PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

/// Split an absolute path into (parent, basename).
///
/// `/a` splits to `("/", "a")` and `/a/b` to `("/a", "b")`. A string with
/// no slash at all has no parent here and yields `(".", input)`.
pub fn split(path: &str) -> (String, String) {
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(pos) => (path[..pos].to_string(), path[pos + 1..].to_string()),
        None => (".".to_string(), path.to_string()),
    }
}

/// Replace each `/` in a user key with the reserved token.
pub fn escape_slash(key: &str) -> String {
    key.replace('/', SLASH_TOKEN)
}

/// Restore `/` in a key that went through `escape_slash`.
pub fn unescape_slash(key: &str) -> String {
    key.replace(SLASH_TOKEN, "/")
}
