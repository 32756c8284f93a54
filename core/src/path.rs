//! Path helpers shared by the providers and the resource tree.
//!
//! Every path handled by the tree is absolute and `/`-separated. `..` never
//! climbs above `/`.

#[must_use]
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return "/".to_string();
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in trimmed.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }

    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Joins `relative` onto the absolute `base` and normalizes the result.
/// An absolute `relative` replaces `base`.
#[must_use]
pub fn join_path(base: &str, relative: &str) -> String {
    if relative.starts_with('/') {
        normalize_path(relative)
    } else {
        normalize_path(&format!("{base}/{relative}"))
    }
}

#[must_use]
pub fn parent_path(path: &str) -> Option<String> {
    let path = normalize_path(path);
    if path == "/" {
        return None;
    }
    match path.rsplit_once('/') {
        Some(("", _)) | None => Some("/".to_string()),
        Some((parent, _)) => Some(parent.to_string()),
    }
}

/// Maps a root-relative path onto the provider path below `base`.
#[must_use]
pub fn rebase_path(base: &str, path: &str) -> String {
    if base == "/" {
        path.to_string()
    } else if path == "/" {
        base.to_string()
    } else {
        format!("{base}{path}")
    }
}

/// Returns true if `path` is `prefix` or lies below it.
#[must_use]
pub fn is_within(prefix: &str, path: &str) -> bool {
    prefix == "/"
        || path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}
