//! Ordered child sequences
//!
//! `NodeList` is the read side, owned by its parent node. All writes go
//! through `ChildListMut`, which updates the child's `parent_id` in the same
//! step as the membership change so the two can never disagree.

use smallvec::SmallVec;

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::NodeId;

/// Children of one node, in tree order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeList {
    ids: SmallVec<[NodeId; 4]>, // Most nodes have <4 children
}

impl NodeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.ids.get(index).copied()
    }

    pub fn first(&self) -> Option<NodeId> {
        self.ids.first().copied()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.ids.last().copied()
    }

    pub fn index_of(&self, child: NodeId) -> Option<usize> {
        self.ids.iter().position(|&id| id == child)
    }

    pub fn contains(&self, child: NodeId) -> bool {
        self.ids.contains(&child)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.ids.iter().copied()
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.ids
    }
}

impl<'a> IntoIterator for &'a NodeList {
    type Item = NodeId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, NodeId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter().copied()
    }
}

/// Mutable view of one parent's child list
///
/// Callers (the tree algorithms) have already validated the operation;
/// the checks here only guard the back-reference invariant.
pub(crate) struct ChildListMut<'a> {
    arena: &'a mut DomArena,
    parent: NodeId,
}

impl<'a> ChildListMut<'a> {
    pub(crate) fn new(arena: &'a mut DomArena, parent: NodeId) -> Result<Self> {
        arena.get(parent)?;
        Ok(Self { arena, parent })
    }

    pub(crate) fn len(&self) -> usize {
        self.arena
            .get(self.parent)
            .map(|node| node.children.len())
            .unwrap_or(0)
    }

    pub(crate) fn append(&mut self, child: NodeId) -> Result<()> {
        let index = self.len();
        self.insert(index, child)
    }

    pub(crate) fn insert(&mut self, index: usize, child: NodeId) -> Result<()> {
        let node = self.arena.get_mut(child)?;
        if node.parent_id.is_some() {
            return Err(DomError::HierarchyRequest("child is still attached elsewhere"));
        }
        node.parent_id = Some(self.parent);

        let parent = self.arena.get_mut(self.parent)?;
        let index = index.min(parent.children.ids.len());
        parent.children.ids.insert(index, child);
        Ok(())
    }

    pub(crate) fn remove(&mut self, index: usize) -> Result<NodeId> {
        let parent = self.arena.get_mut(self.parent)?;
        if index >= parent.children.ids.len() {
            return Err(DomError::NotFound("child index out of bounds"));
        }
        let child = parent.children.ids.remove(index);
        self.arena.get_mut(child)?.parent_id = None;
        Ok(child)
    }

    /// Swap in a whole new child sequence, returning the old one
    pub(crate) fn replace_all(
        &mut self,
        children: impl IntoIterator<Item = NodeId>,
    ) -> Result<SmallVec<[NodeId; 4]>> {
        let parent = self.arena.get_mut(self.parent)?;
        let old = std::mem::take(&mut parent.children.ids);
        for &id in &old {
            self.arena.get_mut(id)?.parent_id = None;
        }
        for child in children {
            self.append(child)?;
        }
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentConfig;

    #[test]
    fn test_insert_and_remove_keep_back_references() {
        let mut arena = DomArena::new();
        let doc = arena.create_document(DocumentConfig::default());
        let parent = arena.create_element(doc, "div").unwrap();
        let a = arena.create_text(doc, "a").unwrap();
        let b = arena.create_text(doc, "b").unwrap();

        {
            let mut list = ChildListMut::new(&mut arena, parent).unwrap();
            list.append(b).unwrap();
            list.insert(0, a).unwrap();
            assert_eq!(list.len(), 2);
        }
        assert_eq!(arena.children(parent).unwrap().as_slice(), &[a, b]);
        assert_eq!(arena.get(a).unwrap().parent_id(), Some(parent));

        let removed = ChildListMut::new(&mut arena, parent)
            .unwrap()
            .remove(0)
            .unwrap();
        assert_eq!(removed, a);
        assert_eq!(arena.get(a).unwrap().parent_id(), None);
        assert_eq!(arena.children(parent).unwrap().index_of(b), Some(0));
    }

    #[test]
    fn test_attached_child_is_rejected() {
        let mut arena = DomArena::new();
        let doc = arena.create_document(DocumentConfig::default());
        let p1 = arena.create_element(doc, "p").unwrap();
        let p2 = arena.create_element(doc, "p").unwrap();
        let t = arena.create_text(doc, "t").unwrap();

        ChildListMut::new(&mut arena, p1).unwrap().append(t).unwrap();
        let err = ChildListMut::new(&mut arena, p2).unwrap().append(t);
        assert!(matches!(err, Err(DomError::HierarchyRequest(_))));
        assert!(arena.children(p2).unwrap().is_empty());
    }

    #[test]
    fn test_replace_all_detaches_old_children() {
        let mut arena = DomArena::new();
        let doc = arena.create_document(DocumentConfig::default());
        let parent = arena.create_element(doc, "ul").unwrap();
        let old = arena.create_element(doc, "li").unwrap();
        let new = arena.create_element(doc, "li").unwrap();

        ChildListMut::new(&mut arena, parent).unwrap().append(old).unwrap();
        let removed = ChildListMut::new(&mut arena, parent)
            .unwrap()
            .replace_all([new])
            .unwrap();

        assert_eq!(removed.as_slice(), &[old]);
        assert_eq!(arena.get(old).unwrap().parent_id(), None);
        assert_eq!(arena.get(new).unwrap().parent_id(), Some(parent));
    }
}
