use std::borrow::Cow;

use tracing::{debug, trace};

use crate::dom::{Document, NodeId};
use crate::engine::Core;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ScanReport {
    pub texts_updated: usize,
    pub properties_bound: usize,
    pub pruned: usize,
}

/// Depth-first pass over `root`: substitute text nodes, bind prefixed attributes.
///
/// A disabled element is neither processed nor descended into.
pub(crate) fn scan(core: &Core, doc: &mut Document, root: NodeId) -> ScanReport {
    let mut report = ScanReport::default();
    if core.is_disabled(doc, root) {
        report.pruned += 1;
    } else {
        visit(core, doc, root, &mut report);
    }
    debug!(
        ?root,
        texts = report.texts_updated,
        properties = report.properties_bound,
        pruned = report.pruned,
        "scan complete"
    );
    report
}

fn visit(core: &Core, doc: &mut Document, node: NodeId, report: &mut ScanReport) {
    if doc.is_text(node) {
        if substitute_text(core, doc, node) {
            report.texts_updated += 1;
        }
        return;
    }
    // Ancestors were checked on the way down; only the node's own marker matters here.
    if doc.has_attribute(node, &core.config.disable_attribute) {
        report.pruned += 1;
        return;
    }
    report.properties_bound += bind_attributes(core, doc, node);
    let children = doc.children(node).to_vec();
    for child in children {
        visit(core, doc, child, report);
    }
}

/// Re-render one text node in place. Returns whether its payload changed.
pub(crate) fn substitute_text(core: &Core, doc: &mut Document, node: NodeId) -> bool {
    let Some(current) = doc.text(node) else {
        return false;
    };
    let rendered = match core.evaluate_text(current) {
        Cow::Borrowed(_) => return false,
        Cow::Owned(rendered) => rendered,
    };
    if rendered == current {
        return false;
    }
    trace!(?node, %rendered, "text substituted");
    doc.set_node_value(node, rendered);
    true
}

/// Evaluate every `<prefix><property>` attribute and assign the live property.
pub(crate) fn bind_attributes(core: &Core, doc: &mut Document, element: NodeId) -> usize {
    let prefix = core.config.attribute_prefix.as_str();
    let bindings: Vec<(String, String)> = doc
        .attributes(element)
        .iter()
        .filter_map(|(name, expression)| {
            name.strip_prefix(prefix)
                .filter(|property| !property.is_empty())
                .map(|property| (property.to_string(), expression.clone()))
        })
        .collect();
    for (property, expression) in &bindings {
        let value = core.evaluate(expression, None);
        trace!(?element, %property, ?value, "property bound");
        doc.set_property(element, property, value);
    }
    bindings.len()
}
