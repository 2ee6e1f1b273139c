//! The tree vertex stored in the arena
//!
//! A `DomNode` owns its child list; every other relation (parent, owning
//! document) is a plain index that never keeps its target alive.

use smallvec::SmallVec;
use std::fmt;

use crate::arena::DomArena;
use crate::document::DocumentState;
use crate::node_list::NodeList;
use crate::types::{NodeFlags, NodeId, NodeType};

/// Non-owning reference from a node to its document
///
/// The arena never reuses a slot, so an id that no longer resolves to a
/// live document node means the document was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeakDocument(Option<NodeId>);

impl WeakDocument {
    pub fn new(document: NodeId) -> Self {
        Self(Some(document))
    }

    pub fn none() -> Self {
        Self(None)
    }

    /// Resolve the handle, `None` when unset or when the document is gone
    pub fn upgrade(&self, arena: &DomArena) -> Option<NodeId> {
        let id = self.0?;
        arena
            .get(id)
            .ok()
            .filter(|node| node.node_type == NodeType::Document)
            .map(|_| id)
    }
}

/// Optional per-node reactions to tree changes
///
/// Only nodes that carry an implementation get called; plain nodes pay
/// nothing. Hooks see ids only and cannot reenter the arena.
pub trait NodeLifecycle: fmt::Debug {
    /// The node moved from `old_document` to a new owner
    fn adopted(&mut self, node: NodeId, old_document: Option<NodeId>) {
        let _ = (node, old_document);
    }

    /// The node was attached under `parent`
    fn inserted(&mut self, node: NodeId, parent: NodeId) {
        let _ = (node, parent);
    }

    /// The node was detached from `old_parent`
    fn removed(&mut self, node: NodeId, old_parent: NodeId) {
        let _ = (node, old_parent);
    }
}

/// A locally declared prefix → namespace binding (`xmlns:p="uri"`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDeclaration {
    pub prefix: Option<String>,
    pub uri: String,
}

/// Element-specific data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementData {
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub local_name: String,
    pub(crate) declarations: SmallVec<[NamespaceDeclaration; 2]>,
}

impl ElementData {
    pub fn new(namespace: Option<String>, prefix: Option<String>, local_name: String) -> Self {
        Self {
            namespace,
            prefix,
            local_name,
            declarations: SmallVec::new(),
        }
    }

    pub fn declarations(&self) -> &[NamespaceDeclaration] {
        &self.declarations
    }

    /// Namespace bound to `prefix` by this element alone
    pub(crate) fn resolve_prefix(&self, prefix: Option<&str>) -> Option<&str> {
        if self.namespace.is_some() && self.prefix.as_deref() == prefix {
            return self.namespace.as_deref();
        }
        self.declarations
            .iter()
            .find(|decl| decl.prefix.as_deref() == prefix)
            .map(|decl| decl.uri.as_str())
    }

    /// Prefix bound to `namespace` by this element alone
    pub(crate) fn resolve_namespace(&self, namespace: &str) -> Option<&str> {
        if self.namespace.as_deref() == Some(namespace) {
            if let Some(prefix) = self.prefix.as_deref() {
                return Some(prefix);
            }
        }
        self.declarations
            .iter()
            .find(|decl| decl.uri == namespace && decl.prefix.is_some())
            .and_then(|decl| decl.prefix.as_deref())
    }
}

/// Node-specific data
#[derive(Debug)]
pub enum NodeData {
    Document(Box<DocumentState>),
    DocumentType { public_id: String, system_id: String },
    DocumentFragment,
    Element(ElementData),
    Text(String),
    CdataSection(String),
    Comment(String),
    ProcessingInstruction { data: String },
}

impl NodeData {
    /// Character data of text-like nodes
    pub fn character_data(&self) -> Option<&str> {
        match self {
            NodeData::Text(data) | NodeData::CdataSection(data) | NodeData::Comment(data) => {
                Some(data)
            }
            NodeData::ProcessingInstruction { data } => Some(data),
            _ => None,
        }
    }

    pub(crate) fn character_data_mut(&mut self) -> Option<&mut String> {
        match self {
            NodeData::Text(data) | NodeData::CdataSection(data) | NodeData::Comment(data) => {
                Some(data)
            }
            NodeData::ProcessingInstruction { data } => Some(data),
            _ => None,
        }
    }

    /// Structural copy used by cloning; documents get fresh coordinator state
    pub(crate) fn duplicate(&self) -> NodeData {
        match self {
            NodeData::Document(state) => NodeData::Document(Box::new(state.fork())),
            NodeData::DocumentType {
                public_id,
                system_id,
            } => NodeData::DocumentType {
                public_id: public_id.clone(),
                system_id: system_id.clone(),
            },
            NodeData::DocumentFragment => NodeData::DocumentFragment,
            NodeData::Element(element) => NodeData::Element(element.clone()),
            NodeData::Text(data) => NodeData::Text(data.clone()),
            NodeData::CdataSection(data) => NodeData::CdataSection(data.clone()),
            NodeData::Comment(data) => NodeData::Comment(data.clone()),
            NodeData::ProcessingInstruction { data } => {
                NodeData::ProcessingInstruction { data: data.clone() }
            }
        }
    }

    /// Content equality, ignoring document coordinator state
    pub(crate) fn same_content(&self, other: &NodeData) -> bool {
        match (self, other) {
            (NodeData::Document(_), NodeData::Document(_)) => true,
            (NodeData::DocumentFragment, NodeData::DocumentFragment) => true,
            (
                NodeData::DocumentType {
                    public_id: a_public,
                    system_id: a_system,
                },
                NodeData::DocumentType {
                    public_id: b_public,
                    system_id: b_system,
                },
            ) => a_public == b_public && a_system == b_system,
            (NodeData::Element(a), NodeData::Element(b)) => {
                a.namespace == b.namespace && a.prefix == b.prefix && a.local_name == b.local_name
            }
            _ => match (self.character_data(), other.character_data()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// The main DOM tree node structure
///
/// Design philosophy:
/// - Identity fields (`node_type`, `node_name`, `flags`) are fixed at creation
/// - Use indices instead of pointers
/// - Hooks are boxed and optional
pub struct DomNode {
    pub(crate) node_id: NodeId,
    pub(crate) node_type: NodeType,
    pub(crate) node_name: String,
    pub(crate) flags: NodeFlags,
    pub(crate) base_uri: Option<String>,
    pub(crate) owner: WeakDocument,
    pub(crate) parent_id: Option<NodeId>,
    pub(crate) children: NodeList,
    pub data: NodeData,
    pub(crate) hooks: Option<Box<dyn NodeLifecycle>>,
}

impl DomNode {
    pub(crate) fn new(
        node_id: NodeId,
        node_type: NodeType,
        node_name: String,
        flags: NodeFlags,
        owner: WeakDocument,
        data: NodeData,
    ) -> Self {
        Self {
            node_id,
            node_type,
            node_name,
            flags,
            base_uri: None,
            owner,
            parent_id: None,
            children: NodeList::new(),
            data,
            hooks: None,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    pub fn children(&self) -> &NodeList {
        &self.children
    }

    pub fn owner(&self) -> WeakDocument {
        self.owner
    }

    /// The explicit base URI override, if any
    pub fn base_uri_override(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    pub fn is_element(&self) -> bool {
        self.node_type == NodeType::Element
    }

    pub fn is_text(&self) -> bool {
        self.node_type == NodeType::Text
    }

    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn character_data(&self) -> Option<&str> {
        self.data.character_data()
    }

    /// DOM node length: characters for character data, children otherwise
    pub fn length(&self) -> u32 {
        match self.data.character_data() {
            Some(data) => data.chars().count() as u32,
            None => self.children.len() as u32,
        }
    }

    pub(crate) fn document_state(&self) -> Option<&DocumentState> {
        match &self.data {
            NodeData::Document(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn document_state_mut(&mut self) -> Option<&mut DocumentState> {
        match &mut self.data {
            NodeData::Document(state) => Some(state),
            _ => None,
        }
    }
}

impl fmt::Debug for DomNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomNode")
            .field("node_id", &self.node_id)
            .field("node_type", &self.node_type)
            .field("node_name", &self.node_name)
            .field("parent_id", &self.parent_id)
            .field("children", &self.children)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_prefix_resolution() {
        let mut element = ElementData::new(
            Some("urn:a".to_string()),
            Some("a".to_string()),
            "item".to_string(),
        );
        element.declarations.push(NamespaceDeclaration {
            prefix: Some("b".to_string()),
            uri: "urn:b".to_string(),
        });

        assert_eq!(element.resolve_prefix(Some("a")), Some("urn:a"));
        assert_eq!(element.resolve_prefix(Some("b")), Some("urn:b"));
        assert_eq!(element.resolve_prefix(None), None);
        assert_eq!(element.resolve_namespace("urn:b"), Some("b"));
        assert_eq!(element.resolve_namespace("urn:c"), None);
    }

    #[test]
    fn test_character_data_equality() {
        assert!(NodeData::Text("x".into()).same_content(&NodeData::Text("x".into())));
        assert!(!NodeData::Text("x".into()).same_content(&NodeData::Text("y".into())));
        assert!(!NodeData::DocumentFragment.same_content(&NodeData::Text(String::new())));
    }
}
