use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::dom::{ContentWriter, Document, NodeId};
use crate::engine::Core;

/// Decorates the native writer so direct content writes are template-expanded.
///
/// Writes to disabled elements, and writes of the disable attribute itself,
/// are committed unmodified.
pub struct InterceptingWriter {
    native: Rc<dyn ContentWriter>,
    core: Rc<RefCell<Core>>,
}

impl InterceptingWriter {
    pub(crate) fn new(native: Rc<dyn ContentWriter>, core: Rc<RefCell<Core>>) -> Self {
        Self { native, core }
    }

    fn rewrite(&self, doc: &Document, node: NodeId, value: String) -> String {
        let core = self.core.borrow();
        if core.is_disabled(doc, node) {
            return value;
        }
        let rendered = core.evaluate_text(&value).into_owned();
        if rendered != value {
            trace!(?node, %rendered, "intercepted write expanded");
        }
        rendered
    }
}

impl ContentWriter for InterceptingWriter {
    fn write_text(&self, doc: &mut Document, node: NodeId, value: String) {
        let value = self.rewrite(doc, node, value);
        self.native.write_text(doc, node, value);
    }

    fn write_markup(&self, doc: &mut Document, node: NodeId, value: String) {
        let value = self.rewrite(doc, node, value);
        self.native.write_markup(doc, node, value);
    }

    fn write_attribute(&self, doc: &mut Document, node: NodeId, name: &str, value: String) {
        let is_marker = name.eq_ignore_ascii_case(&self.core.borrow().config.disable_attribute);
        let value = if is_marker {
            value
        } else {
            self.rewrite(doc, node, value)
        };
        self.native.write_attribute(doc, node, name, value);
    }
}
