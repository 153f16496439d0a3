//! String-level path relations.
//!
//! These work on path strings without allocating segments. They assume
//! well-formed input; callers validate with [`parse_path`](crate::parse_path)
//! at the API boundary.

/// Join a parent path and a relative child path.
///
/// ```
/// use json_store_path::join_path;
///
/// assert_eq!(join_path("", "todos"), "todos");
/// assert_eq!(join_path("todos", "[id=3]"), "todos[id=3]");
/// assert_eq!(join_path("todos[id=3]", "title"), "todos[id=3].title");
/// assert_eq!(join_path("todos", ""), "todos");
/// ```
pub fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        return child.to_string();
    }
    if child.is_empty() {
        return parent.to_string();
    }
    let mut out = String::with_capacity(parent.len() + child.len() + 1);
    out.push_str(parent);
    if !child.starts_with('[') {
        out.push('.');
    }
    out.push_str(child);
    out
}

/// Check whether `prefix` addresses `path` or one of its ancestors.
///
/// The match respects segment boundaries: `a` is a prefix of `a.b` and
/// `a[0]` but not of `ab`. The root path is a prefix of everything.
///
/// ```
/// use json_store_path::is_path_prefix;
///
/// assert!(is_path_prefix("", "a"));
/// assert!(is_path_prefix("a", "a"));
/// assert!(is_path_prefix("a", "a.b"));
/// assert!(is_path_prefix("a", "a[id=1]"));
/// assert!(!is_path_prefix("a", "ab"));
/// assert!(!is_path_prefix("a.b", "a"));
/// ```
pub fn is_path_prefix(prefix: &str, path: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    if !path.starts_with(prefix) {
        return false;
    }
    match path.as_bytes().get(prefix.len()) {
        None => true,
        Some(b'.') | Some(b'[') => true,
        Some(_) => false,
    }
}

/// Check whether either path is a prefix of the other.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    is_path_prefix(a, b) || is_path_prefix(b, a)
}

/// Split a path into its parent and its last segment.
///
/// Returns `None` for the root path. The last segment keeps its brackets
/// but loses the joining dot.
///
/// ```
/// use json_store_path::split_last;
///
/// assert_eq!(split_last(""), None);
/// assert_eq!(split_last("a"), Some(("", "a")));
/// assert_eq!(split_last("a.b"), Some(("a", "b")));
/// assert_eq!(split_last("a[k=x.y]"), Some(("a", "[k=x.y]")));
/// ```
pub fn split_last(path: &str) -> Option<(&str, &str)> {
    if path.is_empty() {
        return None;
    }
    let mut boundary = 0;
    let mut in_bracket = false;
    for (i, c) in path.char_indices() {
        match c {
            '[' if !in_bracket => {
                in_bracket = true;
                boundary = i;
            }
            ']' if in_bracket => in_bracket = false,
            '.' if !in_bracket => boundary = i,
            _ => {}
        }
    }
    let (parent, last) = path.split_at(boundary);
    Some((parent, last.strip_prefix('.').unwrap_or(last)))
}

/// Get the parent path, or `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    split_last(path).map(|(parent, _)| parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_overlap_both_directions() {
        assert!(paths_overlap("a", "a.b.c"));
        assert!(paths_overlap("a.b.c", "a"));
        assert!(!paths_overlap("a.b", "a.c"));
        assert!(paths_overlap("", "anything"));
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path(""), None);
        assert_eq!(parent_path("list"), Some(""));
        assert_eq!(parent_path("list[2]"), Some("list"));
        assert_eq!(parent_path("list[2].name"), Some("list[2]"));
        assert_eq!(parent_path("[0]"), Some(""));
    }
}
