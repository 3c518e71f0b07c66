//! Utility functions and helpers

pub mod time;

/// Truncate `s` to at most `max` bytes without splitting a UTF-8 sequence
pub fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// One directory level plus the file name: `/a/b/c/d/foo.tpl` → `d/foo.tpl`
pub fn base_filename(path: &str) -> &str {
    let mut found = 0;
    for (idx, byte) in path.bytes().enumerate().rev() {
        if byte == b'/' {
            found += 1;
            if found == 2 {
                return &path[idx + 1..];
            }
        }
    }
    path
}

/// Reduce a URL to `scheme://host[:port]/path`, dropping credentials, query
/// and fragment. Returns `None` for strings without a scheme (local paths).
pub fn url_summary(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
        return None;
    }

    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let (authority, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    let host_port = authority.rsplit('@').next().unwrap_or_default();

    Some(format!("{}://{}{}", scheme, host_port, path))
}
