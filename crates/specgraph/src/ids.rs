//! Deterministic identifier scheme for IR nodes.
//!
//! Every parent-to-child identifier is derived from the parent identifier
//! plus the child's semantic key: `{parent_id}|{component}|{key}` with an
//! optional trailing `|{index}` for positionally keyed children. Re-deriving
//! an id from the same inputs always yields the same string, which is what
//! makes MERGE-based upserts idempotent.

/// Separator between id segments.
pub const ID_SEPARATOR: char = '|';

/// Derive a child id from its parent and semantic key.
///
/// # Example
///
/// ```
/// use specgraph::ids::child_id;
///
/// let id = child_id("A1|domain_model", "entity", "Product");
/// assert_eq!(id, "A1|domain_model|entity|Product");
/// ```
#[must_use]
pub fn child_id(parent_id: &str, component: &str, key: &str) -> String {
    format!("{parent_id}{ID_SEPARATOR}{component}{ID_SEPARATOR}{key}")
}

/// Derive a positionally keyed child id (steps, scenario fixtures).
#[must_use]
pub fn indexed_child_id(parent_id: &str, component: &str, key: &str, index: usize) -> String {
    format!("{parent_id}{ID_SEPARATOR}{component}{ID_SEPARATOR}{key}{ID_SEPARATOR}{index}")
}

/// Derive a submodel root id from the application id.
#[must_use]
pub fn submodel_id(app_id: &str, component: &str) -> String {
    format!("{app_id}{ID_SEPARATOR}{component}")
}

/// The parent segment of an id, i.e. everything before the last two
/// segments. Returns `None` when the id has fewer than three segments.
#[must_use]
pub fn parent_of(id: &str) -> Option<&str> {
    let mut cut = None;
    let mut seen = 0;
    for (pos, ch) in id.char_indices().rev() {
        if ch == ID_SEPARATOR {
            seen += 1;
            if seen == 2 {
                cut = Some(pos);
                break;
            }
        }
    }
    cut.map(|pos| &id[..pos])
}
