//! Arena-based DOM tree storage
//!
//! "Bad programmers worry about the code. Good programmers worry about
//! data structures and their relationships."
//!
//! Every node of every document lives in one `Vec`. Parents own their
//! children through `NodeList`; back-references (parent, owning document)
//! are plain indices. Slots are never reused, so a released node leaves a
//! hole and any stale id fails with `UnknownNode` instead of aliasing.
//!
//! ```text
//! Arena: Vec<Option<DomNode>>
//!        [Doc0][Elem1][Text2][None]...
//!         ↑ 4-byte index, not 8-byte pointer
//! ```

use ahash::AHashSet;

use crate::document::{DocumentConfig, DocumentState};
use crate::error::{DomError, Result};
use crate::names;
use crate::node::{DomNode, ElementData, NodeData, NodeLifecycle, WeakDocument};
use crate::node_list::{ChildListMut, NodeList};
use crate::range::RangeRegistry;
use crate::types::{NodeFlags, NodeId, NodeType, ObserverId};

/// Arena allocator for DOM nodes
#[derive(Debug)]
pub struct DomArena {
    /// All nodes stored sequentially; `None` marks a released slot
    nodes: Vec<Option<DomNode>>,

    /// Number of occupied slots
    live: usize,

    /// Next mutation observer id
    next_observer: u32,

    /// Live ranges of every document
    pub(crate) ranges: RangeRegistry,
}

impl DomArena {
    /// Create a new empty arena
    pub fn new() -> Self {
        Self::with_capacity(1024) // Pre-allocate for typical page
    }

    /// Create arena with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            live: 0,
            next_observer: 0,
            ranges: RangeRegistry::default(),
        }
    }

    fn push(
        &mut self,
        node_type: NodeType,
        node_name: String,
        flags: NodeFlags,
        owner: WeakDocument,
        data: NodeData,
    ) -> NodeId {
        let node_id = self.nodes.len() as NodeId;
        self.nodes.push(Some(DomNode::new(
            node_id, node_type, node_name, flags, owner, data,
        )));
        self.live += 1;
        node_id
    }

    /// Add a node shaped like `source`: same identity, data and base URI,
    /// no parent and no children
    pub(crate) fn push_copy(&mut self, source: NodeId, owner: WeakDocument) -> Result<NodeId> {
        let node = self.get(source)?;
        let (node_type, node_name, flags) = (node.node_type, node.node_name.clone(), node.flags);
        let base_uri = node.base_uri.clone();
        let data = node.data.duplicate();

        let id = self.push(node_type, node_name, flags, owner, data);
        self.get_mut(id)?.base_uri = base_uri;
        Ok(id)
    }

    /// Text node with an already-resolved owner
    pub(crate) fn push_text(&mut self, owner: WeakDocument, data: &str) -> NodeId {
        self.push(
            NodeType::Text,
            "#text".to_string(),
            NodeFlags::NONE,
            owner,
            NodeData::Text(data.to_string()),
        )
    }

    /// Owner handle for nodes created by `document`
    fn owner_for(&self, document: NodeId) -> Result<WeakDocument> {
        let node = self.get(document)?;
        if node.node_type != NodeType::Document {
            return Err(DomError::InvalidNodeType {
                expected: "Document",
                actual: node.node_type,
            });
        }
        Ok(WeakDocument::new(document))
    }

    /// Create a new document node with its own observer and mutation state
    pub fn create_document(&mut self, config: DocumentConfig) -> NodeId {
        let state = DocumentState::new(config);
        let id = self.push(
            NodeType::Document,
            "#document".to_string(),
            NodeFlags::NONE,
            WeakDocument::none(),
            NodeData::Document(Box::new(state)),
        );
        tracing::debug!(document = id, "created document");
        id
    }

    /// Create an HTML-style element with no namespace
    pub fn create_element(&mut self, document: NodeId, local_name: &str) -> Result<NodeId> {
        self.create_element_with_flags(document, local_name, NodeFlags::NONE)
    }

    pub fn create_element_with_flags(
        &mut self,
        document: NodeId,
        local_name: &str,
        flags: NodeFlags,
    ) -> Result<NodeId> {
        names::validate_name(local_name)?;
        let owner = self.owner_for(document)?;
        let element = ElementData::new(None, None, local_name.to_string());
        Ok(self.push(
            NodeType::Element,
            local_name.to_string(),
            flags,
            owner,
            NodeData::Element(element),
        ))
    }

    /// Create a namespaced element from a qualified name
    pub fn create_element_ns(
        &mut self,
        document: NodeId,
        namespace: Option<&str>,
        qualified_name: &str,
    ) -> Result<NodeId> {
        let owner = self.owner_for(document)?;
        let (namespace, prefix, local_name) =
            names::validate_and_extract(namespace, qualified_name)?;
        let element = ElementData::new(namespace, prefix, local_name);
        Ok(self.push(
            NodeType::Element,
            qualified_name.to_string(),
            NodeFlags::NONE,
            owner,
            NodeData::Element(element),
        ))
    }

    pub fn create_text(&mut self, document: NodeId, data: &str) -> Result<NodeId> {
        let owner = self.owner_for(document)?;
        Ok(self.push(
            NodeType::Text,
            "#text".to_string(),
            NodeFlags::NONE,
            owner,
            NodeData::Text(data.to_string()),
        ))
    }

    pub fn create_cdata_section(&mut self, document: NodeId, data: &str) -> Result<NodeId> {
        let owner = self.owner_for(document)?;
        if data.contains("]]>") {
            return Err(DomError::InvalidCharacter(data.to_string()));
        }
        Ok(self.push(
            NodeType::CdataSection,
            "#cdata-section".to_string(),
            NodeFlags::NONE,
            owner,
            NodeData::CdataSection(data.to_string()),
        ))
    }

    pub fn create_comment(&mut self, document: NodeId, data: &str) -> Result<NodeId> {
        let owner = self.owner_for(document)?;
        Ok(self.push(
            NodeType::Comment,
            "#comment".to_string(),
            NodeFlags::NONE,
            owner,
            NodeData::Comment(data.to_string()),
        ))
    }

    pub fn create_processing_instruction(
        &mut self,
        document: NodeId,
        target: &str,
        data: &str,
    ) -> Result<NodeId> {
        let owner = self.owner_for(document)?;
        names::validate_name(target)?;
        if data.contains("?>") {
            return Err(DomError::InvalidCharacter(data.to_string()));
        }
        Ok(self.push(
            NodeType::ProcessingInstruction,
            target.to_string(),
            NodeFlags::NONE,
            owner,
            NodeData::ProcessingInstruction {
                data: data.to_string(),
            },
        ))
    }

    pub fn create_document_fragment(&mut self, document: NodeId) -> Result<NodeId> {
        let owner = self.owner_for(document)?;
        Ok(self.push(
            NodeType::DocumentFragment,
            "#document-fragment".to_string(),
            NodeFlags::NONE,
            owner,
            NodeData::DocumentFragment,
        ))
    }

    pub fn create_doctype(
        &mut self,
        document: NodeId,
        name: &str,
        public_id: &str,
        system_id: &str,
    ) -> Result<NodeId> {
        let owner = self.owner_for(document)?;
        Ok(self.push(
            NodeType::DocumentType,
            name.to_string(),
            NodeFlags::NONE,
            owner,
            NodeData::DocumentType {
                public_id: public_id.to_string(),
                system_id: system_id.to_string(),
            },
        ))
    }

    /// Attach lifecycle hooks to a node, replacing any previous ones
    pub fn set_lifecycle(&mut self, node_id: NodeId, hooks: Box<dyn NodeLifecycle>) -> Result<()> {
        self.get_mut(node_id)?.hooks = Some(hooks);
        Ok(())
    }

    /// Get node by ID (immutable)
    pub fn get(&self, node_id: NodeId) -> Result<&DomNode> {
        self.nodes
            .get(node_id as usize)
            .and_then(Option::as_ref)
            .ok_or(DomError::UnknownNode(node_id))
    }

    /// Get node by ID (mutable)
    pub(crate) fn get_mut(&mut self, node_id: NodeId) -> Result<&mut DomNode> {
        self.nodes
            .get_mut(node_id as usize)
            .and_then(Option::as_mut)
            .ok_or(DomError::UnknownNode(node_id))
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.get(node_id).is_ok()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if arena has no live nodes
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterator over all live node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| i as NodeId)
    }

    /// Iterator over all live document nodes
    pub fn documents(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().flatten().filter_map(|node| {
            (node.node_type == NodeType::Document).then_some(node.node_id)
        })
    }

    pub fn node_type(&self, node_id: NodeId) -> Result<NodeType> {
        Ok(self.get(node_id)?.node_type)
    }

    pub fn children(&self, node_id: NodeId) -> Result<&NodeList> {
        Ok(&self.get(node_id)?.children)
    }

    pub fn parent(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.get(node_id)?.parent_id)
    }

    pub(crate) fn child_list_mut(&mut self, parent: NodeId) -> Result<ChildListMut<'_>> {
        ChildListMut::new(self, parent)
    }

    /// Position of a node among its parent's children
    pub fn index_of(&self, node_id: NodeId) -> Result<Option<usize>> {
        let node = self.get(node_id)?;
        match node.parent_id {
            Some(parent) => Ok(self.children(parent)?.index_of(node_id)),
            None => Ok(None),
        }
    }

    pub fn previous_sibling(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        let Some(parent) = self.parent(node_id)? else {
            return Ok(None);
        };
        let siblings = self.children(parent)?;
        Ok(siblings
            .index_of(node_id)
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| siblings.get(i)))
    }

    pub fn next_sibling(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        let Some(parent) = self.parent(node_id)? else {
            return Ok(None);
        };
        let siblings = self.children(parent)?;
        Ok(siblings.index_of(node_id).and_then(|i| siblings.get(i + 1)))
    }

    /// The document a node belongs to: itself for documents, else its owner
    pub fn node_document(&self, node_id: NodeId) -> Result<Option<NodeId>> {
        let node = self.get(node_id)?;
        if node.node_type == NodeType::Document {
            return Ok(Some(node_id));
        }
        Ok(node.owner.upgrade(self))
    }

    /// Ancestors of a node, nearest first (exclusive)
    ///
    /// The walk is bounded by the arena size, so a corrupted parent chain
    /// ends the iteration instead of looping forever.
    pub fn ancestors(&self, node_id: NodeId) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            current: self.get(node_id).ok().and_then(|node| node.parent_id),
            remaining: self.nodes.len(),
        }
    }

    /// Topmost inclusive ancestor
    pub fn root(&self, node_id: NodeId) -> Result<NodeId> {
        self.get(node_id)?;
        Ok(self.ancestors(node_id).last().unwrap_or(node_id))
    }

    /// `ancestor` is `node` or one of its ancestors
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        ancestor == node || self.ancestors(node).any(|id| id == ancestor)
    }

    /// Descendants of a node in tree order (exclusive), iterative
    pub fn descendants(&self, node_id: NodeId) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        self.traverse_df(node_id, |node| {
            if node.node_id != node_id {
                out.push(node.node_id);
            }
            Ok(())
        })?;
        Ok(out)
    }

    /// Traverse tree depth-first (iterative, no recursion)
    pub fn traverse_df<F>(&self, start_id: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&DomNode) -> Result<()>,
    {
        let mut stack = vec![start_id];

        while let Some(node_id) = stack.pop() {
            let node = self.get(node_id)?;
            visit(node)?;

            // Push children in reverse order (so they're visited left-to-right)
            for child_id in node.children.iter().rev() {
                stack.push(child_id);
            }
        }

        Ok(())
    }

    /// Find all elements by node name in a subtree, tree order
    pub fn find_by_name(&self, root: NodeId, name: &str) -> Result<Vec<NodeId>> {
        let mut found = Vec::new();
        self.traverse_df(root, |node| {
            if node.node_type == NodeType::Element && node.node_name == name {
                found.push(node.node_id);
            }
            Ok(())
        })?;
        Ok(found)
    }

    pub fn new_observer(&mut self) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        id
    }

    pub(crate) fn document_state(&self, document: NodeId) -> Result<&DocumentState> {
        let node = self.get(document)?;
        node.document_state().ok_or(DomError::InvalidNodeType {
            expected: "Document",
            actual: node.node_type,
        })
    }

    pub(crate) fn document_state_mut(&mut self, document: NodeId) -> Result<&mut DocumentState> {
        let node = self.get_mut(document)?;
        let node_type = node.node_type;
        node.document_state_mut().ok_or(DomError::InvalidNodeType {
            expected: "Document",
            actual: node_type,
        })
    }

    /// Free a parentless subtree, returning the number of nodes released
    ///
    /// Releasing a document drops the ranges it created and its pending
    /// records with it; nodes it still owns elsewhere see their owner handle
    /// go dead. Ranges pointing into the freed nodes are unregistered.
    pub fn release(&mut self, root: NodeId) -> Result<usize> {
        if self.get(root)?.parent_id.is_some() {
            return Err(DomError::HierarchyRequest("cannot release an attached node"));
        }

        let mut freed = AHashSet::new();
        freed.insert(root);
        freed.extend(self.descendants(root)?);

        for &id in &freed {
            self.nodes[id as usize] = None;
        }
        self.live -= freed.len();

        let dropped = self.ranges.forget_nodes(&freed);
        if dropped > 0 {
            tracing::debug!(root, dropped, "unregistered ranges into released nodes");
        }
        let documents: Vec<NodeId> = self.documents().collect();
        for document in documents {
            self.document_state_mut(document)?.observers.forget_nodes(&freed);
        }

        tracing::debug!(root, count = freed.len(), "released subtree");
        Ok(freed.len())
    }
}

impl Default for DomArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Upward walk produced by [`DomArena::ancestors`]
pub struct Ancestors<'a> {
    arena: &'a DomArena,
    current: Option<NodeId>,
    remaining: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.current?;
        if self.remaining == 0 {
            tracing::warn!(node = id, "ancestor walk exceeded arena size; parent chain is cyclic");
            self.current = None;
            return None;
        }
        self.remaining -= 1;
        self.current = self.arena.get(id).ok().and_then(|node| node.parent_id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> (DomArena, NodeId, NodeId, NodeId, NodeId) {
        let mut arena = DomArena::new();
        let doc = arena.create_document(DocumentConfig::default());
        let html = arena.create_element(doc, "html").unwrap();
        let body = arena.create_element(doc, "body").unwrap();
        let text = arena.create_text(doc, "hi").unwrap();
        arena.append_child(doc, html).unwrap();
        arena.append_child(html, body).unwrap();
        arena.append_child(body, text).unwrap();
        (arena, doc, html, body, text)
    }

    #[test]
    fn test_arena_basic() {
        let mut arena = DomArena::new();
        let doc = arena.create_document(DocumentConfig::default());
        let div = arena.create_element(doc, "div").unwrap();

        let node = arena.get(div).unwrap();
        assert_eq!(node.node_name(), "div");
        assert_eq!(node.node_type(), NodeType::Element);
        assert_eq!(arena.node_document(div).unwrap(), Some(doc));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_factories_reject_bad_input() {
        let mut arena = DomArena::new();
        let doc = arena.create_document(DocumentConfig::default());
        let text = arena.create_text(doc, "x").unwrap();

        assert!(matches!(
            arena.create_element(doc, "1div"),
            Err(DomError::InvalidCharacter(_))
        ));
        assert!(matches!(
            arena.create_element(text, "div"),
            Err(DomError::InvalidNodeType { .. })
        ));
        assert!(matches!(
            arena.create_comment(999, "x"),
            Err(DomError::UnknownNode(999))
        ));
        assert!(arena.create_processing_instruction(doc, "xml-stylesheet", "a?>b").is_err());
    }

    #[test]
    fn test_traverse_df() {
        let (arena, doc, ..) = small_tree();

        let mut visited = Vec::new();
        arena
            .traverse_df(doc, |node| {
                visited.push(node.node_name().to_string());
                Ok(())
            })
            .unwrap();

        assert_eq!(visited, vec!["#document", "html", "body", "#text"]);
    }

    #[test]
    fn test_find_by_name() {
        let (mut arena, doc, html, body, _) = small_tree();
        let inner = arena.create_element(doc, "body").unwrap();
        arena.append_child(body, inner).unwrap();

        assert_eq!(arena.find_by_name(doc, "body").unwrap(), vec![body, inner]);
        assert_eq!(arena.find_by_name(html, "#text").unwrap(), Vec::<NodeId>::new());
        assert_eq!(arena.descendants(html).unwrap().len(), 3);
    }

    #[test]
    fn test_ancestors_and_root() {
        let (arena, doc, html, body, text) = small_tree();

        let chain: Vec<_> = arena.ancestors(text).collect();
        assert_eq!(chain, vec![body, html, doc]);
        assert_eq!(arena.root(text).unwrap(), doc);
        assert!(arena.is_inclusive_ancestor(html, text));
        assert!(arena.is_inclusive_ancestor(text, text));
        assert!(!arena.is_inclusive_ancestor(text, html));
    }

    #[test]
    fn test_release_makes_owner_handle_dead() {
        let mut arena = DomArena::new();
        let doc = arena.create_document(DocumentConfig::default());
        let orphan = arena.create_element(doc, "div").unwrap();

        assert_eq!(arena.release(doc).unwrap(), 1);
        assert!(!arena.contains(doc));
        assert_eq!(arena.node_document(orphan).unwrap(), None);
        assert!(matches!(arena.get(doc), Err(DomError::UnknownNode(_))));
    }

    #[test]
    fn test_release_drops_ranges_of_released_document() {
        let mut arena = DomArena::new();
        let doc = arena.create_document(DocumentConfig::default());
        let other = arena.create_document(DocumentConfig::default());
        let div = arena.create_element(other, "div").unwrap();
        arena.append_child(other, div).unwrap();

        let own = arena.create_range(doc).unwrap();
        let elsewhere = arena.create_range(doc).unwrap();
        arena.set_range_start(elsewhere, div, 0).unwrap();
        let kept = arena.create_range(other).unwrap();

        arena.release(doc).unwrap();
        assert!(matches!(arena.range(own), Err(DomError::UnknownRange(_))));
        assert!(matches!(arena.range(elsewhere), Err(DomError::UnknownRange(_))));
        assert!(arena.range(kept).is_ok());
    }

    #[test]
    fn test_release_refuses_attached_nodes() {
        let (mut arena, _, _, body, _) = small_tree();
        assert!(matches!(
            arena.release(body),
            Err(DomError::HierarchyRequest(_))
        ));
        assert_eq!(arena.len(), 4);
    }
}
