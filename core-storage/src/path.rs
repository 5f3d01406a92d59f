//! Storage key normalization

/// Canonical form of a storage key.
///
/// Backslashes become `/`, empty and `.` segments are dropped, and `..` pops
/// the previous segment without ever climbing above the root. The result has
/// no leading or trailing slash.
pub fn normalize_key(key: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in key.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// `prefix/key`, or whichever side is non-empty.
pub fn join_key(prefix: &str, key: &str) -> String {
    match (prefix.is_empty(), key.is_empty()) {
        (true, _) => key.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, key),
    }
}
