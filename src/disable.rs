use crate::dom::{Document, NodeId};

/// Whether `node` sits in a disabled subtree.
///
/// Text nodes defer to their nearest element ancestor. Elements are disabled
/// when they, or any ancestor, carry `attribute`. Recomputed on every call so
/// attribute changes apply immediately.
pub fn is_disabled(doc: &Document, node: NodeId, attribute: &str) -> bool {
    let start = if doc.is_element(node) {
        Some(node)
    } else {
        doc.ancestors(node).find(|&a| doc.is_element(a))
    };
    let Some(element) = start else {
        return false;
    };
    std::iter::once(element)
        .chain(doc.ancestors(element))
        .any(|n| doc.has_attribute(n, attribute))
}
