//! Utility Functions
//!
//! Corresponds to packages/compiler/src/util.ts; trimmed to the helpers the
//! archetype compiler actually uses (regex escaping, debug stringification,
//! content hashing).

use std::fmt;

/// Escape characters that have special meaning in regular expressions.
pub fn escape_regex(s: &str) -> String {
    let mut result = String::new();
    for ch in s.chars() {
        if matches!(
            ch,
            '.' | '*' | '+' | '?' | '^' | '=' | '!' | ':' | '$' | '{' | '}' | '(' | ')' | '|'
                | '[' | ']' | '/' | '\\'
        ) {
            result.push('\\');
        }
        result.push(ch);
    }
    result
}

/// Escape `${...}` interpolation tokens in a replacement string so a folded
/// `FileOp` chain cannot accidentally reintroduce interpolation (see
/// `output::fileops::fold`).
pub fn escape_interpolation(s: &str) -> String {
    s.replace('$', "$$")
}

/// Normalize all line endings to `\n`, matching the "newline normalization"
/// required before blob content is hashed (spec §3, §6).
pub fn normalize_newlines(bytes: &[u8]) -> Vec<u8> {
    // Work byte-wise: CRLF -> LF, lone CR -> LF. Content is assumed to be
    // UTF-8 text; normalization never splits a multi-byte sequence because
    // \r and \n are single ASCII bytes that never appear as continuation
    // bytes in valid UTF-8.
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                out.push(b'\n');
                if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                    i += 1;
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    out
}

/// Lower-hex MD5 digest of content, after newline normalization.
pub fn blob_id(content: &[u8]) -> String {
    use md5::{Digest, Md5};
    let normalized = normalize_newlines(content);
    let mut hasher = Md5::new();
    hasher.update(&normalized);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Debug-format a value, truncated to its first line (mirrors the
/// teacher's `stringify` contract of never emitting embedded newlines).
pub fn stringify_debug<T: fmt::Debug>(value: &T) -> String {
    let result = format!("{:?}", value);
    match result.find('\n') {
        Some(pos) => result[..pos].to_string(),
        None => result,
    }
}
