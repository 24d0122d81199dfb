//! In-memory document model the engine synchronizes.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Removed nodes stay
//! in the arena (detached) so ids held by observers remain valid.

pub mod markup;

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use crate::errors::DomError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Clone, Debug, PartialEq)]
pub struct ElementData {
    pub tag: String,
    attributes: Vec<(String, String)>,
    properties: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Element(ElementData),
    Text(String),
}

#[derive(Clone, Debug)]
struct NodeData {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MutationRecord {
    ChildList {
        target: NodeId,
        added: Vec<NodeId>,
        removed: Vec<NodeId>,
    },
    Attributes {
        target: NodeId,
        name: String,
        old_value: Option<String>,
    },
    CharacterData {
        target: NodeId,
        old_value: String,
    },
}

impl MutationRecord {
    pub fn target(&self) -> NodeId {
        match self {
            MutationRecord::ChildList { target, .. }
            | MutationRecord::Attributes { target, .. }
            | MutationRecord::CharacterData { target, .. } => *target,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Observer {
    id: ObserverId,
    root: NodeId,
    queue: Vec<MutationRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentEvent {
    Ready,
}

/// The three content write paths a host can intercept.
pub trait ContentWriter {
    fn write_text(&self, doc: &mut Document, node: NodeId, value: String);
    fn write_markup(&self, doc: &mut Document, node: NodeId, value: String);
    fn write_attribute(&self, doc: &mut Document, node: NodeId, name: &str, value: String);
}

/// Commits writes unmodified.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeWriter;

impl ContentWriter for NativeWriter {
    fn write_text(&self, doc: &mut Document, node: NodeId, value: String) {
        doc.native_set_text_content(node, value);
    }

    fn write_markup(&self, doc: &mut Document, node: NodeId, value: String) {
        doc.native_set_inner_html(node, &value);
    }

    fn write_attribute(&self, doc: &mut Document, node: NodeId, name: &str, value: String) {
        doc.native_set_attribute(node, name, value);
    }
}

pub struct Document {
    nodes: Vec<NodeData>,
    root: NodeId,
    observers: Vec<Observer>,
    next_observer: u64,
    ready_state: ReadyState,
    events: Vec<DocumentEvent>,
    writer: Rc<dyn ContentWriter>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty, fully loaded `<html><head></head><body></body></html>` document.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            observers: Vec::new(),
            next_observer: 0,
            ready_state: ReadyState::Complete,
            events: Vec::new(),
            writer: Rc::new(NativeWriter),
        };
        doc.root = doc.create_element("html");
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        doc.link(doc.root, head, None);
        doc.link(doc.root, body, None);
        doc
    }

    /// Same as [`Document::new`] but still loading; see [`Document::finish_loading`].
    pub fn loading() -> Self {
        let mut doc = Self::new();
        doc.ready_state = ReadyState::Loading;
        doc
    }

    /// Build a loaded document from markup. `html`/`head`/`body` wrappers are unwrapped.
    pub fn parse(markup: &str) -> Self {
        let mut doc = Self::new();
        let body = doc.body().unwrap_or(doc.root);
        let head = doc.head().unwrap_or(doc.root);
        let mut pending: Vec<(NodeId, NodeId)> = markup::parse_fragment(&mut doc, markup)
            .into_iter()
            .map(|n| (body, n))
            .collect();
        let mut i = 0;
        while i < pending.len() {
            let (parent, node) = pending[i];
            i += 1;
            match doc.tag_name(node) {
                Some("html") => pending.extend(doc.children(node).iter().map(|&c| (body, c))),
                Some("body") => pending.extend(doc.children(node).iter().map(|&c| (body, c))),
                Some("head") => pending.extend(doc.children(node).iter().map(|&c| (head, c))),
                _ => {
                    doc.unlink(node);
                    doc.link(parent, node, None);
                }
            }
        }
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn body(&self) -> Option<NodeId> {
        self.child_by_tag(self.root, "body")
    }

    pub fn head(&self) -> Option<NodeId> {
        self.child_by_tag(self.root, "head")
    }

    fn child_by_tag(&self, parent: NodeId, tag: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.tag_name(c) == Some(tag))
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state
    }

    /// Mark the document loaded and queue a one-shot [`DocumentEvent::Ready`].
    pub fn finish_loading(&mut self) {
        if self.ready_state == ReadyState::Loading {
            self.ready_state = ReadyState::Complete;
            self.events.push(DocumentEvent::Ready);
        }
    }

    pub fn take_events(&mut self) -> Vec<DocumentEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- node creation and inspection -------------------------------------

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            properties: BTreeMap::new(),
        }))
    }

    pub fn create_text(&mut self, data: impl Into<String>) -> NodeId {
        self.push(NodeKind::Text(data.into()))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    fn element(&self, node: NodeId) -> Option<&ElementData> {
        match &self.nodes[node.0].kind {
            NodeKind::Element(el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes[node.0].kind {
            NodeKind::Element(el) => Some(el),
            NodeKind::Text(_) => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.kind(node), NodeKind::Text(_))
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|el| el.tag.as_str())
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Proper ancestors, nearest first.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), move |&n| self.parent(n))
    }

    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        ancestor == node || self.ancestors(node).any(|a| a == ancestor)
    }

    /// Pre-order walk of `root` and everything below it.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.children(node).iter().rev());
        }
        out
    }

    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|&n| self.tag_name(n) == Some(tag))
            .collect()
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&n| self.attribute(n, "id") == Some(id))
    }

    // ---- tree mutation ----------------------------------------------------

    fn link(&mut self, parent: NodeId, child: NodeId, index: Option<usize>) {
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        match index {
            Some(i) if i <= children.len() => children.insert(i, child),
            _ => children.push(child),
        }
    }

    fn unlink(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes[child.0].parent.take()?;
        self.nodes[parent.0].children.retain(|&c| c != child);
        Some(parent)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        if !self.is_element(parent) {
            return Err(DomError::Hierarchy("parent is not an element".into()));
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::Hierarchy("node would contain itself".into()));
        }
        if let Some(r) = reference {
            if self.parent(r) != Some(parent) {
                return Err(DomError::NotFound);
            }
        }
        if let Some(old_parent) = self.unlink(child) {
            self.queue(MutationRecord::ChildList {
                target: old_parent,
                added: Vec::new(),
                removed: vec![child],
            });
        }
        let index = reference.and_then(|r| self.children(parent).iter().position(|&c| c == r));
        self.link(parent, child, index);
        self.queue(MutationRecord::ChildList {
            target: parent,
            added: vec![child],
            removed: Vec::new(),
        });
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if self.parent(child) != Some(parent) {
            return Err(DomError::NotFound);
        }
        self.unlink(child);
        self.queue(MutationRecord::ChildList {
            target: parent,
            added: Vec::new(),
            removed: vec![child],
        });
        Ok(())
    }

    fn replace_children(&mut self, parent: NodeId, added: Vec<NodeId>) {
        let removed = std::mem::take(&mut self.nodes[parent.0].children);
        for &old in &removed {
            self.nodes[old.0].parent = None;
        }
        for &new in &added {
            self.unlink(new);
            self.link(parent, new, None);
        }
        if removed.is_empty() && added.is_empty() {
            return;
        }
        self.queue(MutationRecord::ChildList {
            target: parent,
            added,
            removed,
        });
    }

    // ---- character data ---------------------------------------------------

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.kind(node) {
            NodeKind::Text(data) => Some(data),
            NodeKind::Element(_) => None,
        }
    }

    /// Replace a text node's payload in place; the node keeps its identity.
    pub fn set_node_value(&mut self, node: NodeId, data: impl Into<String>) {
        let data = data.into();
        if let NodeKind::Text(current) = &mut self.nodes[node.0].kind {
            let old_value = std::mem::replace(current, data);
            self.queue(MutationRecord::CharacterData {
                target: node,
                old_value,
            });
        }
    }

    // ---- attributes and properties ----------------------------------------

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self, node: NodeId) -> &[(String, String)] {
        self.element(node).map(|el| el.attributes.as_slice()).unwrap_or(&[])
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        let name = name.to_ascii_lowercase();
        let Some(el) = self.element_mut(node) else {
            return;
        };
        let Some(pos) = el.attributes.iter().position(|(n, _)| *n == name) else {
            return;
        };
        let (_, old) = el.attributes.remove(pos);
        self.queue(MutationRecord::Attributes {
            target: node,
            name,
            old_value: Some(old),
        });
    }

    pub fn property(&self, node: NodeId, name: &str) -> Option<&Value> {
        self.element(node)?.properties.get(name)
    }

    /// Assign a live property; `None` deletes it. Properties are not attributes
    /// and produce no mutation records.
    pub fn set_property(&mut self, node: NodeId, name: &str, value: Option<Value>) {
        if let Some(el) = self.element_mut(node) {
            match value {
                Some(v) => {
                    el.properties.insert(name.to_string(), v);
                }
                None => {
                    el.properties.remove(name);
                }
            }
        }
    }

    // ---- content ----------------------------------------------------------

    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        markup::serialize_children(self, node)
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        markup::serialize(self, node)
    }

    /// `textContent = value`, routed through the installed writer.
    pub fn set_text_content(&mut self, node: NodeId, value: impl Into<String>) {
        let writer = Rc::clone(&self.writer);
        writer.write_text(self, node, value.into());
    }

    /// `innerHTML = value`, routed through the installed writer.
    pub fn set_inner_html(&mut self, node: NodeId, value: impl Into<String>) {
        let writer = Rc::clone(&self.writer);
        writer.write_markup(self, node, value.into());
    }

    /// `setAttribute(name, value)`, routed through the installed writer.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        let writer = Rc::clone(&self.writer);
        writer.write_attribute(self, node, name, value.into());
    }

    pub fn native_set_text_content(&mut self, node: NodeId, value: String) {
        if self.is_text(node) {
            self.set_node_value(node, value);
            return;
        }
        let added = if value.is_empty() {
            Vec::new()
        } else {
            vec![self.create_text(value)]
        };
        self.replace_children(node, added);
    }

    pub fn native_set_inner_html(&mut self, node: NodeId, value: &str) {
        if self.is_text(node) {
            self.set_node_value(node, value);
            return;
        }
        let added = markup::parse_fragment(self, value);
        self.replace_children(node, added);
    }

    pub fn native_set_attribute(&mut self, node: NodeId, name: &str, value: String) {
        let name = name.to_ascii_lowercase();
        let Some(el) = self.element_mut(node) else {
            return;
        };
        let old_value = match el.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                el.attributes.push((name.clone(), value));
                None
            }
        };
        self.queue(MutationRecord::Attributes {
            target: node,
            name,
            old_value,
        });
    }

    /// Attribute write used while building detached nodes; never observed.
    pub(crate) fn init_attribute(&mut self, node: NodeId, name: String, value: String) {
        if let Some(el) = self.element_mut(node) {
            if !el.attributes.iter().any(|(n, _)| *n == name) {
                el.attributes.push((name, value));
            }
        }
    }

    pub(crate) fn init_child(&mut self, parent: NodeId, child: NodeId) {
        self.link(parent, child, None);
    }

    // ---- writer slot ------------------------------------------------------

    pub fn writer(&self) -> Rc<dyn ContentWriter> {
        Rc::clone(&self.writer)
    }

    pub fn set_writer(&mut self, writer: Rc<dyn ContentWriter>) {
        self.writer = writer;
    }

    // ---- mutation observation ---------------------------------------------

    /// Observe child-list, attribute and character-data changes under `root`.
    pub fn observe(&mut self, root: NodeId) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push(Observer {
            id,
            root,
            queue: Vec::new(),
        });
        trace!(?id, ?root, "observer registered");
        id
    }

    pub fn disconnect(&mut self, id: ObserverId) {
        self.observers.retain(|o| o.id != id);
        trace!(?id, "observer disconnected");
    }

    pub fn is_observing(&self, id: ObserverId) -> bool {
        self.observers.iter().any(|o| o.id == id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn take_records(&mut self, id: ObserverId) -> Vec<MutationRecord> {
        self.observers
            .iter_mut()
            .find(|o| o.id == id)
            .map(|o| std::mem::take(&mut o.queue))
            .unwrap_or_default()
    }

    fn queue(&mut self, record: MutationRecord) {
        if self.observers.is_empty() {
            return;
        }
        let target = record.target();
        let interested: Vec<usize> = self
            .observers
            .iter()
            .enumerate()
            .filter(|(_, o)| self.is_inclusive_ancestor(o.root, target))
            .map(|(i, _)| i)
            .collect();
        for i in interested {
            self.observers[i].queue.push(record.clone());
        }
    }
}
