//! Object key helpers: generated names, prefix joins and rewrites.

use chrono::{DateTime, Utc};

use crate::timex;

/// Build a fresh object name from a path hint.
///
/// The directory part of the hint is kept and the file name is prefixed with
/// a microsecond timestamp: `notes/x.txt` becomes `notes/<timestamp>_x.txt`.
/// Uniqueness is best-effort.
pub fn generate_object_name(path_hint: &str) -> String {
    object_name_at(path_hint, Utc::now())
}

pub(crate) fn object_name_at(path_hint: &str, at: DateTime<Utc>) -> String {
    let (dir, file) = match path_hint.rfind('/') {
        Some(idx) => (&path_hint[..idx], &path_hint[idx + 1..]),
        None => ("", path_hint),
    };
    let name = format!("{}_{}", timex::format_timestamp(at), file);
    join_key(&[dir, &name])
}

/// Join key segments with `/`, dropping empty and `.` segments.
///
/// A trailing slash on the last part is kept, so `join_key(&["public", "a/"])`
/// stays a directory-style prefix (`public/a/`) instead of also matching
/// `public/ab`.
pub fn join_key(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");

    let keeps_slash = parts
        .iter()
        .rev()
        .find(|part| !part.is_empty())
        .is_some_and(|part| part.ends_with('/'));

    if keeps_slash && !joined.is_empty() {
        format!("{}/", joined)
    } else {
        joined
    }
}

/// Rewrite `key` by replacing the first occurrence of `src` with `dst`.
///
/// This is a literal substring replacement, not segment-aware.
pub fn rewrite_prefix(key: &str, src: &str, dst: &str) -> String {
    if src.is_empty() {
        return join_key(&[dst, key]);
    }
    key.replacen(src, dst, 1)
}

/// Directory portion of a listing prefix, including the trailing slash.
pub(crate) fn list_dir(prefix: &str) -> &str {
    match prefix.rfind('/') {
        Some(idx) => &prefix[..=idx],
        None => "",
    }
}

/// Children of `dir` for a non-recursive listing: the direct object, or the
/// sub-prefix up to the next slash.
pub(crate) fn direct_child<'a>(dir: &str, key: &'a str) -> Option<(&'a str, bool)> {
    let rest = key.strip_prefix(dir)?;
    if rest.is_empty() {
        return None;
    }
    match rest.find('/') {
        Some(idx) => Some((&key[..dir.len() + idx + 1], true)),
        None => Some((key, false)),
    }
}
