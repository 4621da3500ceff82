//! Helpers for `/`-separated tree paths.
//!
//! The empty string is the root. Segments carry no reserved characters other
//! than `/`, so the helpers only ever split on that.

/// Joins a child segment onto a parent path.
///
/// ```rust
/// # use treelike::path::join;
/// assert_eq!(join("", "settings"), "settings");
/// assert_eq!(join("settings", "theme"), "settings/theme");
/// ```
pub fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}/{child}")
    }
}

/// The path with its last segment removed; the root for single-segment paths.
pub fn parent(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// The last segment of a path.
pub fn last_segment(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, last)| last)
}

/// The part of `path` below `ancestor`, if `path` is a strict descendant.
fn remainder<'a>(ancestor: &str, path: &'a str) -> Option<&'a str> {
    let rest = if ancestor.is_empty() {
        path
    } else {
        path.strip_prefix(ancestor)?.strip_prefix('/')?
    };
    (!rest.is_empty()).then_some(rest)
}

/// True iff `path` is exactly one segment below `parent`.
///
/// ```rust
/// # use treelike::path::is_direct_child;
/// assert!(is_direct_child("root/chats", "root/chats/abc"));
/// assert!(!is_direct_child("root/chats", "root/chats/abc/latest"));
/// assert!(!is_direct_child("root/chats", "root/chatsabc"));
/// ```
pub fn is_direct_child(parent: &str, path: &str) -> bool {
    remainder(parent, path).is_some_and(|rest| !rest.contains('/'))
}

/// For any descendant of `parent`, the direct child of `parent` it lives under.
///
/// ```rust
/// # use treelike::path::direct_child_of;
/// assert_eq!(direct_child_of("root/chats", "root/chats/abc/latest"), Some("root/chats/abc"));
/// assert_eq!(direct_child_of("root/chats", "root/chats/abc"), Some("root/chats/abc"));
/// assert_eq!(direct_child_of("root/chats", "root/other"), None);
/// ```
pub fn direct_child_of<'a>(parent: &str, path: &'a str) -> Option<&'a str> {
    let rest = remainder(parent, path)?;
    match rest.find('/') {
        None => Some(path),
        Some(idx) => Some(&path[..path.len() - rest.len() + idx]),
    }
}

/// Every strict ancestor of `path`, nearest first, ending with the root.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut current = (!path.is_empty()).then_some(path);
    std::iter::from_fn(move || {
        let here = current?;
        if here.is_empty() {
            current = None;
            return None;
        }
        let up = parent(here);
        current = Some(up);
        Some(up)
    })
}
