//! Cache key derivation: logical file name -> safe single path component.

use sha2::{Digest, Sha256};

/// Longest key we produce, leaving room for the temp prefix and suffix
/// within Linux NAME_MAX (255 bytes).
const KEY_MAX: usize = 240;

/// Hex digits of the name digest appended to rewritten keys.
const DIGEST_LEN: usize = 16;

/// Maps a logical file name to a single path component.
///
/// Names that are already safe are used as-is. Anything else is rewritten:
///
/// - NUL, `/`, `\` and control characters become `_` (runs collapse)
/// - leading dots and surrounding whitespace are trimmed (no hidden files)
/// - the stem is cut on a char boundary to fit `KEY_MAX`
///
/// and then gets `~` plus a digest of the original name, so two distinct
/// names never share a key. Returns `None` for empty names, `.` and `..`.
pub fn sanitize_cache_name(name: &str) -> Option<String> {
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    let mut out = String::with_capacity(name.len());
    let mut prev_replaced = false;
    for c in name.chars() {
        if c == '\0' || c == '/' || c == '\\' || c.is_control() {
            if !prev_replaced {
                out.push('_');
            }
            prev_replaced = true;
        } else {
            out.push(c);
            prev_replaced = false;
        }
    }
    let stem = out.trim().trim_start_matches('.').trim_end();

    if stem == name && name.len() <= KEY_MAX {
        return Some(name.to_string());
    }

    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    let mut take = stem.len().min(KEY_MAX - DIGEST_LEN - 1);
    while take > 0 && !stem.is_char_boundary(take) {
        take -= 1;
    }
    Some(format!("{}~{}", &stem[..take], &digest[..DIGEST_LEN]))
}
