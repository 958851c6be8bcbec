//! URL path canonicalisation used by the router's fixed-path redirects.

/// Returns the canonical form of `p`.
///
/// Rules, applied in one pass:
///
/// 1. doubled slashes collapse into one;
/// 2. `.` segments are dropped;
/// 3. `..` drops itself and the segment before it (never above the root);
/// 4. the result always starts with `/`, and keeps a trailing `/` when `p`
///    ended with `/` or `/.`.
///
/// ```rust
/// use httpkit::clean_path;
///
/// assert_eq!(clean_path("/abc//def/../ghi/"), "/abc/ghi/");
/// assert_eq!(clean_path("abc/./../def"), "/def");
/// assert_eq!(clean_path(""), "/");
/// ```
pub fn clean_path(p: &str) -> String {
    if p.is_empty() {
        return "/".to_owned();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in p.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut out = String::with_capacity(p.len() + 1);
    for s in &segments {
        out.push('/');
        out.push_str(s);
    }
    if out.is_empty() || p.ends_with('/') || p.ends_with("/.") {
        out.push('/');
    }
    out
}
