//! Minimal in-memory document model used by the machine.
//!
//! Nodes are stored in an arena and addressed by [`NodeId`]. Documents are
//! built once through the `add_*` methods and then only read.

use core::cmp::Ordering;

use ecow::EcoString;
use hashbrown::HashMap;

use crate::{
    QName, String, Vec, format,
    syntax::{Axis, NodeKind, NodeTest},
    vm::StepTest,
};

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug)]
struct DomNode {
    kind: NodeKind,
    name: Option<QName>,
    value: EcoString,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<NodeId>,
}

#[derive(Debug)]
pub struct Document {
    nodes: Vec<DomNode>,
    entities: HashMap<EcoString, EcoString>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let root = DomNode {
            kind: NodeKind::Root,
            name: None,
            value: EcoString::new(),
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
        };
        Self {
            nodes: crate::vec![root],
            entities: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind, name: Option<QName>, value: EcoString) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(DomNode {
            kind,
            name,
            value,
            parent: Some(parent),
            children: Vec::new(),
            attributes: Vec::new(),
        });
        let parent = &mut self.nodes[parent.0 as usize];
        if kind == NodeKind::Attribute {
            parent.attributes.push(id);
        } else {
            parent.children.push(id);
        }
        id
    }

    pub fn add_element(&mut self, parent: NodeId, name: impl Into<QName>) -> NodeId {
        self.push(parent, NodeKind::Element, Some(name.into()), EcoString::new())
    }

    pub fn add_attribute(
        &mut self,
        element: NodeId,
        name: impl Into<QName>,
        value: impl Into<EcoString>,
    ) -> NodeId {
        debug_assert_eq!(self.kind(element), NodeKind::Element);
        self.push(element, NodeKind::Attribute, Some(name.into()), value.into())
    }

    pub fn add_text(&mut self, parent: NodeId, text: impl Into<EcoString>) -> NodeId {
        self.push(parent, NodeKind::Text, None, text.into())
    }

    pub fn add_comment(&mut self, parent: NodeId, text: impl Into<EcoString>) -> NodeId {
        self.push(parent, NodeKind::Comment, None, text.into())
    }

    /// Declare an unparsed entity, as a DTD would.
    pub fn declare_entity(&mut self, name: impl Into<EcoString>, uri: impl Into<EcoString>) {
        self.entities.insert(name.into(), uri.into());
    }

    fn node(&self, id: NodeId) -> &DomNode {
        &self.nodes[id.0 as usize]
    }

    pub fn contains(&self, id: NodeId) -> bool {
        (id.0 as usize) < self.nodes.len()
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn name(&self, id: NodeId) -> Option<&QName> {
        self.node(id).name.as_ref()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).attributes
    }

    /// XPath string-value of a node.
    pub fn string_value(&self, id: NodeId) -> EcoString {
        let node = self.node(id);
        match node.kind {
            NodeKind::Text | NodeKind::Attribute | NodeKind::Comment => node.value.clone(),
            NodeKind::Root | NodeKind::Element => {
                let mut text = String::new();
                self.collect_text(id, &mut text);
                text.into()
            }
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for child in self.children(id) {
            match self.kind(*child) {
                NodeKind::Text => out.push_str(&self.node(*child).value),
                NodeKind::Element => self.collect_text(*child, out),
                _ => {}
            }
        }
    }

    /// Stable identifier of a node, unique within the document.
    pub fn generate_id(&self, id: NodeId) -> EcoString {
        format!("N{}", id.0).into()
    }

    pub fn unparsed_entity_uri(&self, name: &str) -> EcoString {
        self.entities.get(name).cloned().unwrap_or_default()
    }

    /// The `lang()` test: the nearest `xml:lang` on the node or its
    /// ancestors equals `lang`, or starts with it followed by `-`, ignoring
    /// ASCII case.
    pub fn lang(&self, id: NodeId, lang: &str) -> bool {
        let xml_lang = QName::new(Some(XML_NAMESPACE), Some("xml"), "lang");
        let mut cursor = Some(id);
        while let Some(node) = cursor {
            let found = self
                .attributes(node)
                .iter()
                .find(|attr| self.name(**attr) == Some(&xml_lang));
            if let Some(attr) = found {
                let value = &self.node(*attr).value;
                return value.len() >= lang.len()
                    && value[..lang.len()].eq_ignore_ascii_case(lang)
                    && (value.len() == lang.len() || value.as_bytes()[lang.len()] == b'-');
            }
            cursor = self.parent(node);
        }
        false
    }

    pub fn matches(&self, id: NodeId, test: &StepTest) -> bool {
        let node = self.node(id);
        match &test.test {
            NodeTest::Name(name) => node.kind == test.principal && node.name.as_ref() == Some(name),
            NodeTest::NamespaceWildcard(uri) => {
                node.kind == test.principal
                    && node.name.as_ref().and_then(|n| n.namespace()) == Some(uri.as_str())
            }
            NodeTest::Wildcard => node.kind == test.principal,
            NodeTest::Kind(kind) => node.kind == *kind,
            NodeTest::AnyNode => true,
            NodeTest::Root => node.kind == NodeKind::Root,
        }
    }

    /// Nodes reached from `id` along `axis` that pass `test`, in document order.
    pub fn axis(&self, id: NodeId, axis: Axis, test: &StepTest) -> Vec<NodeId> {
        let mut out = Vec::new();
        match axis {
            Axis::Child => out.extend(self.children(id).iter().copied()),
            Axis::Attribute => out.extend(self.attributes(id).iter().copied()),
            Axis::Parent => out.extend(self.parent(id)),
            Axis::SelfAxis => out.push(id),
            Axis::Descendant => self.collect_descendants(id, &mut out),
        }
        out.retain(|node| self.matches(*node, test));
        out
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for child in self.children(id) {
            out.push(*child);
            self.collect_descendants(*child, out);
        }
    }

    /// Position path from the root; comparing two paths lexicographically
    /// gives document order. Attributes sort before children.
    fn order_path(&self, id: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut cursor = id;
        while let Some(parent) = self.parent(cursor) {
            let node = self.node(parent);
            let index = match node.attributes.iter().position(|a| *a == cursor) {
                Some(index) => index,
                None => {
                    let child = node.children.iter().position(|c| *c == cursor).unwrap_or(0);
                    node.attributes.len() + child
                }
            };
            path.push(index);
            cursor = parent;
        }
        path.reverse();
        path
    }

    pub fn document_order(&self, a: NodeId, b: NodeId) -> Ordering {
        self.order_path(a).cmp(&self.order_path(b))
    }

    /// Sort `nodes` into document order and drop duplicates.
    pub fn sort_unique(&self, nodes: &mut Vec<NodeId>) {
        nodes.sort_by(|a, b| self.document_order(*a, *b));
        nodes.dedup();
    }
}
