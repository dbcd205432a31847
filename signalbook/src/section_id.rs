//! Dotted hierarchical section identifiers
//!
//! Section ids encode their position in the tree: "1.6.2" is the second
//! subsection of section "1.6", which belongs to chapter "1". Ids are stored
//! as plain strings in the document; this module only interprets them.

/// Separator between id components
pub const SEPARATOR: char = '.';

/// Id of the chapter or section directly above `id`
///
/// `None` for an id without a separator.
pub fn parent_of(id: &str) -> Option<&str> {
    id.rsplit_once(SEPARATOR).map(|(parent, _)| parent)
}

/// Numeric value of the last component of an id
///
/// Non-numeric or out-of-range suffixes count as 0, so they never push the
/// next sibling number up.
pub fn trailing_suffix(id: &str) -> u64 {
    id.rsplit(SEPARATOR)
        .next()
        .and_then(|last| last.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

/// Id for the next child of `parent_id`, given the ids of its existing children
///
/// The suffix is one more than the largest existing suffix, so the first
/// child of a childless parent gets suffix 1. When the largest suffix is
/// `u64::MAX` the lowest free suffix is used instead.
pub fn next_child_id<'a>(
    parent_id: &str,
    sibling_ids: impl IntoIterator<Item = &'a str>,
) -> String {
    let siblings: Vec<&str> = sibling_ids.into_iter().collect();
    let child = |suffix: u64| format!("{}{}{}", parent_id, SEPARATOR, suffix);
    let is_free = |id: &String| !siblings.contains(&id.as_str());

    let max_suffix = siblings.iter().map(|id| trailing_suffix(id)).max().unwrap_or(0);
    if let Some(id) = max_suffix.checked_add(1).map(child).filter(is_free) {
        return id;
    }

    // at most `siblings.len()` suffixes are taken, so one of these is free
    (1..)
        .map(child)
        .find(is_free)
        .unwrap_or_else(|| child(0))
}
