//! Tree mutation algorithms
//!
//! Insertion, removal, replacement, adoption and text normalization.
//! Every public entry point validates first and mutates second, so a
//! rejected call leaves the tree, ranges and mutation queue untouched.
//! Bookkeeping flows up: each structural step tells the parent's document
//! which ranges to adjust and which record to queue.

use smallvec::{smallvec, SmallVec};

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::mutation::MutationRecord;
use crate::node::{NodeLifecycle, WeakDocument};
use crate::range::RangeMutation;
use crate::types::{NodeFlags, NodeId, NodeType};

type Nodes = SmallVec<[NodeId; 4]>;

impl DomArena {
    /// Append `node` (or a fragment's children) as the last child(ren)
    pub fn append_child(&mut self, parent: NodeId, node: NodeId) -> Result<NodeId> {
        self.pre_insert(parent, node, None)
    }

    /// Insert `node` before `child`, or append when `child` is `None`
    ///
    /// Fragments are consumed: their children move over in order and the
    /// fragment is left empty.
    pub fn pre_insert(
        &mut self,
        parent: NodeId,
        node: NodeId,
        child: Option<NodeId>,
    ) -> Result<NodeId> {
        self.ensure_pre_insertion_validity(parent, node, child)?;

        let reference = if child == Some(node) {
            self.next_sibling(node)?
        } else {
            child
        };

        let document = self.node_document(parent)?;
        self.adopt(node, document)?;
        self.insert(parent, node, reference, false)?;
        Ok(node)
    }

    /// Remove `child` from `parent`
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId> {
        self.get(parent)?;
        if self.get(child)?.parent_id != Some(parent) {
            return Err(DomError::NotFound("node to remove is not a child of parent"));
        }
        self.remove(child, false)?;
        Ok(child)
    }

    /// Put `node` where `child` is, as one atomic change
    ///
    /// Returns the replaced child.
    pub fn replace_child(&mut self, parent: NodeId, node: NodeId, child: NodeId) -> Result<NodeId> {
        self.check_parent_and_cycle(parent, node)?;
        if self.get(child)?.parent_id != Some(parent) {
            return Err(DomError::NotFound("node to replace is not a child of parent"));
        }
        self.check_node_placement(parent, node)?;
        if self.get(parent)?.node_type == NodeType::Document {
            self.check_document_children(parent, node, Some(child), true)?;
        }

        let mut reference = self.next_sibling(child)?;
        if reference == Some(node) {
            reference = self.next_sibling(node)?;
        }
        let mut previous = self.previous_sibling(child)?;
        if previous == Some(node) {
            previous = self.previous_sibling(node)?;
        }

        let document = self.node_document(parent)?;
        self.adopt(node, document)?;

        let mut removed: Nodes = SmallVec::new();
        if self.get(child)?.parent_id.is_some() {
            removed.push(child);
            self.remove(child, true)?;
        }

        let added = self.nodes_to_insert(node)?;
        self.insert(parent, node, reference, true)?;
        self.queue_tree_mutation(MutationRecord {
            target: parent,
            added_nodes: added,
            removed_nodes: removed,
            previous_sibling: previous,
            next_sibling: reference,
        })?;
        Ok(child)
    }

    /// Replace every child of `parent` with `node` (or nothing)
    pub fn replace_all(&mut self, parent: NodeId, node: Option<NodeId>) -> Result<()> {
        if let Some(node) = node {
            self.check_parent_and_cycle(parent, node)?;
            self.check_node_placement(parent, node)?;
            if self.get(parent)?.node_type == NodeType::Document {
                // Judged against the child list after every child is gone
                self.check_document_slots(&[], node, None, false)?;
            }
            let document = self.node_document(parent)?;
            self.adopt(node, document)?;
        }

        let added = match node {
            Some(node) => self.nodes_to_insert(node)?,
            None => SmallVec::new(),
        };

        let removed = self.remove_all_children(parent)?;
        if let Some(node) = node {
            self.insert(parent, node, None, true)?;
        }

        if !added.is_empty() || !removed.is_empty() {
            self.queue_tree_mutation(MutationRecord {
                target: parent,
                added_nodes: added,
                removed_nodes: removed,
                previous_sibling: None,
                next_sibling: None,
            })?;
        }
        Ok(())
    }

    /// Move `node` (and its subtree) into `document`
    pub fn adopt_node(&mut self, document: NodeId, node: NodeId) -> Result<NodeId> {
        self.document_state(document)?;
        if self.get(node)?.node_type == NodeType::Document {
            return Err(DomError::NotSupported("documents cannot be adopted"));
        }
        self.adopt(node, Some(document))?;
        Ok(node)
    }

    /// Merge adjacent text nodes and drop empty ones, below `node`
    pub fn normalize(&mut self, node: NodeId) -> Result<()> {
        let texts: Vec<NodeId> = self
            .descendants(node)?
            .into_iter()
            .filter(|&id| self.get(id).map(|n| n.is_text()).unwrap_or(false))
            .collect();

        for text in texts {
            // Already merged into an earlier node of its run
            if !self.ancestors(text).any(|id| id == node) {
                continue;
            }

            let length = self.get(text)?.length();
            if length == 0 {
                self.remove(text, false)?;
                continue;
            }

            let mut run: Nodes = SmallVec::new();
            let mut data = String::new();
            let mut current = self.next_sibling(text)?;
            while let Some(sibling) = current {
                let next = self.get(sibling)?;
                if !next.is_text() {
                    break;
                }
                data.push_str(next.character_data().unwrap_or_default());
                run.push(sibling);
                current = self.next_sibling(sibling)?;
            }
            if run.is_empty() {
                continue;
            }

            if let Some(own) = self.get_mut(text)?.data.character_data_mut() {
                own.push_str(&data);
            }

            let Some(parent) = self.parent(text)? else {
                continue;
            };
            let mut offset = length;
            for &sibling in &run {
                let index = self.index_of(sibling)?.unwrap_or(0) as u32;
                self.adjust_ranges(RangeMutation::TextMerged {
                    from: sibling,
                    into: text,
                    delta: offset,
                    parent,
                    index,
                });
                offset += self.get(sibling)?.length();
            }
            for sibling in run {
                self.remove(sibling, false)?;
            }
        }
        Ok(())
    }

    /// Split a text node at a character offset, returning the new tail node
    pub fn split_text(&mut self, node: NodeId, offset: u32) -> Result<NodeId> {
        let target = self.get(node)?;
        if !matches!(target.node_type, NodeType::Text | NodeType::CdataSection) {
            return Err(DomError::InvalidNodeType {
                expected: "Text",
                actual: target.node_type,
            });
        }
        let length = target.length();
        if offset > length {
            return Err(DomError::IndexSize { offset, length });
        }
        let data = target.character_data().unwrap_or_default();
        let split_at = byte_offset(data, offset);
        let tail = data[split_at..].to_string();

        let owner = target.owner;
        let new_node = self.push_copy(node, owner)?;
        if let Some(new_data) = self.get_mut(new_node)?.data.character_data_mut() {
            *new_data = tail;
        }

        if let Some(parent) = self.parent(node)? {
            let index = self.index_of(node)?.unwrap_or(0) as u32;
            let reference = self.next_sibling(node)?;
            self.insert(parent, new_node, reference, false)?;
            self.adjust_ranges(RangeMutation::TextSplit {
                node,
                offset,
                new_node,
                parent,
                index,
            });
        }

        if let Some(own) = self.get_mut(node)?.data.character_data_mut() {
            own.truncate(split_at);
        }
        self.adjust_ranges(RangeMutation::DataTruncated { node, offset });
        Ok(new_node)
    }

    /// Append character data to a text-like node
    pub fn append_data(&mut self, node: NodeId, data: &str) -> Result<()> {
        let target = self.get_mut(node)?;
        let node_type = target.node_type;
        match target.data.character_data_mut() {
            Some(own) => {
                own.push_str(data);
                Ok(())
            }
            None => Err(DomError::InvalidNodeType {
                expected: "character data",
                actual: node_type,
            }),
        }
    }

    /// Concatenated text below elements and fragments, own data for
    /// character data, `None` for documents and doctypes
    pub fn text_content(&self, node: NodeId) -> Result<Option<String>> {
        let target = self.get(node)?;
        match target.node_type {
            NodeType::Element | NodeType::DocumentFragment => {
                let mut text = String::new();
                self.traverse_df(node, |n| {
                    if matches!(n.node_type, NodeType::Text | NodeType::CdataSection) {
                        text.push_str(n.character_data().unwrap_or_default());
                    }
                    Ok(())
                })?;
                Ok(Some(text))
            }
            _ => Ok(target.character_data().map(str::to_string)),
        }
    }

    pub fn set_text_content(&mut self, node: NodeId, value: &str) -> Result<()> {
        let target = self.get(node)?;
        match target.node_type {
            NodeType::Element | NodeType::DocumentFragment => {
                let replacement = if value.is_empty() {
                    None
                } else {
                    let owner = target.owner;
                    Some(self.push_text(owner, value))
                };
                self.replace_all(node, replacement)
            }
            node_type if node_type.is_character_data() => {
                if let Some(own) = self.get_mut(node)?.data.character_data_mut() {
                    *own = value.to_string();
                }
                self.adjust_ranges(RangeMutation::DataTruncated { node, offset: 0 });
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn check_parent_and_cycle(&self, parent: NodeId, node: NodeId) -> Result<()> {
        let target = self.get(parent)?;
        self.get(node)?;
        if !target.node_type.is_container() || target.flags.contains(NodeFlags::END_POINT) {
            tracing::debug!(parent, node, "rejected: parent cannot have children");
            return Err(DomError::HierarchyRequest("parent cannot have children"));
        }
        if self.is_inclusive_ancestor(node, parent) {
            tracing::debug!(parent, node, "rejected: insertion would create a cycle");
            return Err(DomError::HierarchyRequest("node is an inclusive ancestor of parent"));
        }
        Ok(())
    }

    /// Node-type rules that hold for any parent
    fn check_node_placement(&self, parent: NodeId, node: NodeId) -> Result<()> {
        let parent_type = self.get(parent)?.node_type;
        let node_type = self.get(node)?.node_type;
        match node_type {
            NodeType::DocumentFragment
            | NodeType::DocumentType
            | NodeType::Element
            | NodeType::Text
            | NodeType::CdataSection
            | NodeType::ProcessingInstruction
            | NodeType::Comment => {}
            NodeType::Document => {
                return Err(DomError::HierarchyRequest("a document cannot be inserted"))
            }
        }
        if node_type == NodeType::Text && parent_type == NodeType::Document {
            return Err(DomError::HierarchyRequest("a document cannot hold text"));
        }
        if node_type == NodeType::DocumentType && parent_type != NodeType::Document {
            return Err(DomError::HierarchyRequest("doctypes belong under a document"));
        }
        self.check_self_nesting(parent, node)
    }

    fn ensure_pre_insertion_validity(
        &self,
        parent: NodeId,
        node: NodeId,
        child: Option<NodeId>,
    ) -> Result<()> {
        self.check_parent_and_cycle(parent, node)?;
        if let Some(child) = child {
            if self.get(child)?.parent_id != Some(parent) {
                return Err(DomError::NotFound("reference node is not a child of parent"));
            }
        }
        self.check_node_placement(parent, node)?;
        if self.get(parent)?.node_type == NodeType::Document {
            self.check_document_children(parent, node, child, false)?;
        }
        Ok(())
    }

    /// A `NO_SELF_NESTING` node may not land below a same-named ancestor
    fn check_self_nesting(&self, parent: NodeId, node: NodeId) -> Result<()> {
        let candidates = self.nodes_to_insert(node)?;
        for candidate in candidates {
            let incoming = self.get(candidate)?;
            if !incoming.flags.contains(NodeFlags::NO_SELF_NESTING) {
                continue;
            }
            let clash = std::iter::once(parent)
                .chain(self.ancestors(parent))
                .filter_map(|id| self.get(id).ok())
                .any(|ancestor| ancestor.is_element() && ancestor.node_name == incoming.node_name);
            if clash {
                tracing::debug!(parent, node = candidate, "rejected: self-nesting element");
                return Err(DomError::HierarchyRequest("node may not nest inside itself"));
            }
        }
        Ok(())
    }

    /// Single element, single doctype, doctype before element
    ///
    /// `child` is the reference node when inserting, or the node being
    /// replaced when `replacing`.
    fn check_document_children(
        &self,
        document: NodeId,
        node: NodeId,
        child: Option<NodeId>,
        replacing: bool,
    ) -> Result<()> {
        let children: Nodes = self.children(document)?.iter().collect();
        self.check_document_slots(&children, node, child, replacing)
    }

    /// Document child rules over an explicit child list
    fn check_document_slots(
        &self,
        children: &[NodeId],
        node: NodeId,
        child: Option<NodeId>,
        replacing: bool,
    ) -> Result<()> {
        let kind = |id: NodeId| self.get(id).map(|n| n.node_type).ok();
        let ignored = if replacing { child } else { None };
        let has_other = |node_type: NodeType| {
            children
                .iter()
                .any(|&id| Some(id) != ignored && kind(id) == Some(node_type))
        };
        let position = child.and_then(|c| children.iter().position(|&id| id == c));
        let doctype_after = position.is_some_and(|i| {
            let from = if replacing { i + 1 } else { i };
            children[from..]
                .iter()
                .any(|&id| kind(id) == Some(NodeType::DocumentType))
        });
        let element_before = position.is_some_and(|i| {
            children[..i]
                .iter()
                .any(|&id| kind(id) == Some(NodeType::Element))
        });

        match self.get(node)?.node_type {
            NodeType::DocumentFragment => {
                let mut elements = 0;
                for c in self.children(node)? {
                    match kind(c) {
                        Some(NodeType::Element) => elements += 1,
                        Some(NodeType::Text) => {
                            return Err(DomError::HierarchyRequest("a document cannot hold text"))
                        }
                        _ => {}
                    }
                }
                if elements > 1 {
                    return Err(DomError::HierarchyRequest(
                        "a document has at most one element child",
                    ));
                }
                if elements == 1 && (has_other(NodeType::Element) || doctype_after) {
                    return Err(DomError::HierarchyRequest(
                        "document element already present or doctype would follow it",
                    ));
                }
            }
            NodeType::Element => {
                if has_other(NodeType::Element) || doctype_after {
                    return Err(DomError::HierarchyRequest(
                        "document element already present or doctype would follow it",
                    ));
                }
            }
            NodeType::DocumentType => {
                let appending_after_element =
                    !replacing && child.is_none() && has_other(NodeType::Element);
                if has_other(NodeType::DocumentType) || element_before || appending_after_element
                {
                    return Err(DomError::HierarchyRequest(
                        "doctype already present or would follow the document element",
                    ));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// What actually lands in the parent: a fragment's children, or the node
    fn nodes_to_insert(&self, node: NodeId) -> Result<Nodes> {
        let target = self.get(node)?;
        if target.node_type == NodeType::DocumentFragment {
            Ok(target.children.iter().collect())
        } else {
            Ok(smallvec![node])
        }
    }

    /// Unchecked insertion; validation already happened
    pub(crate) fn insert(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
        suppress_observers: bool,
    ) -> Result<()> {
        let nodes = self.nodes_to_insert(node)?;
        let count = nodes.len() as u32;
        if count == 0 {
            return Ok(());
        }

        if let Some(reference) = reference {
            let index = self
                .index_of(reference)?
                .ok_or(DomError::NotFound("reference node is detached"))?;
            self.adjust_ranges(RangeMutation::Inserted {
                parent,
                index: index as u32,
                count,
            });
        }

        if self.get(node)?.node_type == NodeType::DocumentFragment {
            for &child in &nodes {
                self.remove(child, true)?;
            }
        }

        let (previous, mut index) = match reference {
            Some(reference) => (
                self.previous_sibling(reference)?,
                self.index_of(reference)?.unwrap_or(0),
            ),
            None => {
                let siblings = self.children(parent)?;
                (siblings.last(), siblings.len())
            }
        };

        let mut list = self.child_list_mut(parent)?;
        for &id in &nodes {
            list.insert(index, id)?;
            index += 1;
        }

        for &id in &nodes {
            self.fire_lifecycle(id, |hooks| hooks.inserted(id, parent));
        }

        if !suppress_observers {
            self.queue_tree_mutation(MutationRecord {
                target: parent,
                added_nodes: nodes,
                removed_nodes: SmallVec::new(),
                previous_sibling: previous,
                next_sibling: reference,
            })?;
        }
        Ok(())
    }

    /// Unchecked removal of an attached node
    pub(crate) fn remove(&mut self, node: NodeId, suppress_observers: bool) -> Result<()> {
        let parent = self
            .get(node)?
            .parent_id
            .ok_or(DomError::NotFound("node has no parent"))?;
        let index = self
            .index_of(node)?
            .ok_or(DomError::NotFound("node is missing from its parent"))?;

        self.adjust_ranges(RangeMutation::Removed {
            parent,
            index: index as u32,
            child: node,
        });

        let previous = self.previous_sibling(node)?;
        let next = self.next_sibling(node)?;
        self.register_transient_observers(parent, node)?;

        if !suppress_observers {
            self.queue_tree_mutation(MutationRecord {
                target: parent,
                added_nodes: SmallVec::new(),
                removed_nodes: smallvec![node],
                previous_sibling: previous,
                next_sibling: next,
            })?;
        }

        self.child_list_mut(parent)?.remove(index)?;
        self.fire_lifecycle(node, |hooks| hooks.removed(node, parent));
        Ok(())
    }

    /// Detach every child at once; no record is queued
    fn remove_all_children(&mut self, parent: NodeId) -> Result<Nodes> {
        let children: Nodes = self.children(parent)?.iter().collect();
        for &child in &children {
            // Each child is at index 0 once its predecessors are gone
            self.adjust_ranges(RangeMutation::Removed {
                parent,
                index: 0,
                child,
            });
            self.register_transient_observers(parent, child)?;
        }

        let removed = self.child_list_mut(parent)?.replace_all(std::iter::empty())?;
        for &child in &removed {
            self.fire_lifecycle(child, |hooks| hooks.removed(child, parent));
        }
        Ok(removed)
    }

    /// Detach from the old parent and re-own the subtree
    pub(crate) fn adopt(&mut self, node: NodeId, document: Option<NodeId>) -> Result<()> {
        let old_document = self.node_document(node)?;
        if self.get(node)?.parent_id.is_some() {
            self.remove(node, false)?;
        }
        if old_document == document {
            return Ok(());
        }

        let mut subtree = vec![node];
        subtree.extend(self.descendants(node)?);
        let owner = document.map(WeakDocument::new).unwrap_or_default();
        for &id in &subtree {
            self.get_mut(id)?.owner = owner;
        }
        for &id in &subtree {
            self.fire_lifecycle(id, |hooks| hooks.adopted(id, old_document));
        }
        tracing::debug!(
            node,
            ?old_document,
            ?document,
            count = subtree.len(),
            "adopted subtree"
        );
        Ok(())
    }

    fn fire_lifecycle(&mut self, node: NodeId, call: impl FnOnce(&mut dyn NodeLifecycle)) {
        if let Ok(target) = self.get_mut(node) {
            if let Some(hooks) = target.hooks.as_mut() {
                call(hooks.as_mut());
            }
        }
    }
}

/// Byte index of the `offset`-th character (clamped to the end)
fn byte_offset(data: &str, offset: u32) -> usize {
    data.char_indices()
        .nth(offset as usize)
        .map(|(i, _)| i)
        .unwrap_or(data.len())
}
