//! Live ranges and the adjustment rules that keep them valid
//!
//! Ranges are created through a document but live in one arena-wide
//! registry, never on nodes, so a boundary in another document or in a
//! subtree that later moves stays tracked. Each tree algorithm describes
//! what it did as a [`RangeMutation`] and the registry rewrites every
//! matching boundary in place. The rule set is fixed and
//! small on purpose: each variant below is one paragraph of the DOM
//! standard's "live range" bookkeeping.

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use std::cmp::Ordering;

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::{DocumentPosition, NodeId, NodeType, RangeId};

/// A (node, offset) position in a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BoundaryPoint {
    pub node: NodeId,
    pub offset: u32,
}

impl BoundaryPoint {
    pub fn new(node: NodeId, offset: u32) -> Self {
        Self { node, offset }
    }
}

/// Start and end boundary of a live range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Range {
    pub start: BoundaryPoint,
    pub end: BoundaryPoint,
}

impl Range {
    pub fn collapsed_at(point: BoundaryPoint) -> Self {
        Self {
            start: point,
            end: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// What a tree algorithm just did, in the terms ranges care about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RangeMutation {
    /// `count` nodes are about to be inserted into `parent` at `index`
    Inserted { parent: NodeId, index: u32, count: u32 },
    /// `child` (still attached) is about to leave `parent` at `index`
    Removed {
        parent: NodeId,
        index: u32,
        child: NodeId,
    },
    /// Text node `from` (at `index` in `parent`) merges into `into`,
    /// its data landing at offset `delta`
    TextMerged {
        from: NodeId,
        into: NodeId,
        delta: u32,
        parent: NodeId,
        index: u32,
    },
    /// `node` (at `index` in `parent`) was split at `offset`; the tail
    /// already sits at `index + 1` as `new_node`
    TextSplit {
        node: NodeId,
        offset: u32,
        new_node: NodeId,
        parent: NodeId,
        index: u32,
    },
    /// Character data of `node` after `offset` was dropped
    DataTruncated { node: NodeId, offset: u32 },
}

impl RangeMutation {
    fn adjust(&self, point: &mut BoundaryPoint, arena: &DomArena) {
        match *self {
            RangeMutation::Inserted {
                parent,
                index,
                count,
            } => {
                if point.node == parent && point.offset > index {
                    point.offset += count;
                }
            }
            RangeMutation::Removed {
                parent,
                index,
                child,
            } => {
                if arena.is_inclusive_ancestor(child, point.node) {
                    *point = BoundaryPoint::new(parent, index);
                } else if point.node == parent && point.offset > index {
                    point.offset -= 1;
                }
            }
            RangeMutation::TextMerged {
                from,
                into,
                delta,
                parent,
                index,
            } => {
                if point.node == from {
                    *point = BoundaryPoint::new(into, point.offset + delta);
                } else if point.node == parent && point.offset == index {
                    *point = BoundaryPoint::new(into, delta);
                }
            }
            RangeMutation::TextSplit {
                node,
                offset,
                new_node,
                parent,
                index,
            } => {
                if point.node == node && point.offset > offset {
                    *point = BoundaryPoint::new(new_node, point.offset - offset);
                } else if point.node == parent && point.offset == index + 1 {
                    point.offset += 1;
                }
            }
            RangeMutation::DataTruncated { node, offset } => {
                if point.node == node && point.offset > offset {
                    point.offset = offset;
                }
            }
        }
    }
}

/// A registered range and the document that created it
#[derive(Debug, Clone, Copy)]
struct Entry {
    document: NodeId,
    range: Range,
}

/// Every live range in the arena
///
/// Boundaries may sit in any tree, so each mutation is offered to all of
/// them; the rules only touch points whose node the mutation names.
#[derive(Debug, Default)]
pub(crate) struct RangeRegistry {
    ranges: AHashMap<u32, Entry>,
    next_slot: u32,
}

impl RangeRegistry {
    pub(crate) fn register(&mut self, document: NodeId, range: Range) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        self.ranges.insert(slot, Entry { document, range });
        slot
    }

    pub(crate) fn get(&self, slot: u32) -> Option<&Range> {
        self.ranges.get(&slot).map(|entry| &entry.range)
    }

    pub(crate) fn get_mut(&mut self, slot: u32) -> Option<&mut Range> {
        self.ranges.get_mut(&slot).map(|entry| &mut entry.range)
    }

    pub(crate) fn unregister(&mut self, slot: u32) -> Option<Range> {
        self.ranges.remove(&slot).map(|entry| entry.range)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Ranges created by `document`
    pub(crate) fn created_by(&self, document: NodeId) -> impl Iterator<Item = (u32, &Range)> {
        self.ranges
            .iter()
            .filter(move |(_, entry)| entry.document == document)
            .map(|(&slot, entry)| (slot, &entry.range))
    }

    /// Rewrite every boundary the mutation touches
    pub(crate) fn apply(&mut self, mutation: &RangeMutation, arena: &DomArena) {
        for entry in self.ranges.values_mut() {
            mutation.adjust(&mut entry.range.start, arena);
            mutation.adjust(&mut entry.range.end, arena);
        }
    }

    /// Drop ranges created by, or with a boundary in, `nodes`; returns how
    /// many went
    pub(crate) fn forget_nodes(&mut self, nodes: &AHashSet<NodeId>) -> usize {
        let before = self.ranges.len();
        self.ranges.retain(|_, entry| {
            !nodes.contains(&entry.document)
                && !nodes.contains(&entry.range.start.node)
                && !nodes.contains(&entry.range.end.node)
        });
        before - self.ranges.len()
    }
}

impl DomArena {
    /// Run one adjustment over every live range
    ///
    /// The registry is taken out of the arena for the duration so the
    /// rules can walk the (immutable) tree.
    pub(crate) fn adjust_ranges(&mut self, mutation: RangeMutation) {
        if self.ranges.is_empty() {
            return;
        }
        let mut registry = std::mem::take(&mut self.ranges);
        registry.apply(&mutation, self);
        tracing::trace!(?mutation, "adjusted live ranges");
        self.ranges = registry;
    }

    /// Register a new range collapsed at the start of `document`
    pub fn create_range(&mut self, document: NodeId) -> Result<RangeId> {
        self.document_state(document)?;
        let slot = self
            .ranges
            .register(document, Range::collapsed_at(BoundaryPoint::new(document, 0)));
        Ok(RangeId { document, slot })
    }

    pub fn range(&self, id: RangeId) -> Result<Range> {
        self.ranges
            .get(id.slot)
            .copied()
            .ok_or(DomError::UnknownRange(id.slot))
    }

    pub fn range_collapsed(&self, id: RangeId) -> Result<bool> {
        Ok(self.range(id)?.is_collapsed())
    }

    /// Stop tracking a range, returning its last position
    pub fn detach_range(&mut self, id: RangeId) -> Result<Range> {
        self.ranges
            .unregister(id.slot)
            .ok_or(DomError::UnknownRange(id.slot))
    }

    /// Every live range created through a document
    pub fn live_ranges(&self, document: NodeId) -> Result<Vec<(RangeId, Range)>> {
        self.document_state(document)?;
        let mut ranges: Vec<_> = self
            .ranges
            .created_by(document)
            .map(|(slot, range)| (RangeId { document, slot }, *range))
            .collect();
        ranges.sort_by_key(|(id, _)| id.slot);
        Ok(ranges)
    }

    fn checked_boundary(&self, node: NodeId, offset: u32) -> Result<BoundaryPoint> {
        let target = self.get(node)?;
        if target.node_type() == NodeType::DocumentType {
            return Err(DomError::InvalidNodeType {
                expected: "non-doctype boundary",
                actual: NodeType::DocumentType,
            });
        }
        let length = target.length();
        if offset > length {
            return Err(DomError::IndexSize { offset, length });
        }
        Ok(BoundaryPoint::new(node, offset))
    }

    fn range_mut(&mut self, id: RangeId) -> Result<&mut Range> {
        self.ranges
            .get_mut(id.slot)
            .ok_or(DomError::UnknownRange(id.slot))
    }

    /// Move the start; an end before it (or in another tree) collapses onto it
    pub fn set_range_start(&mut self, id: RangeId, node: NodeId, offset: u32) -> Result<()> {
        let point = self.checked_boundary(node, offset)?;
        let range = self.range(id)?;
        let keep_end = matches!(
            self.boundary_order(point, range.end)?,
            Some(Ordering::Less | Ordering::Equal)
        );
        let range = self.range_mut(id)?;
        range.start = point;
        if !keep_end {
            range.end = point;
        }
        Ok(())
    }

    /// Move the end; a start after it (or in another tree) collapses onto it
    pub fn set_range_end(&mut self, id: RangeId, node: NodeId, offset: u32) -> Result<()> {
        let point = self.checked_boundary(node, offset)?;
        let range = self.range(id)?;
        let keep_start = matches!(
            self.boundary_order(range.start, point)?,
            Some(Ordering::Less | Ordering::Equal)
        );
        let range = self.range_mut(id)?;
        range.end = point;
        if !keep_start {
            range.start = point;
        }
        Ok(())
    }

    /// Make the range span all of `node`'s contents
    pub fn select_node_contents(&mut self, id: RangeId, node: NodeId) -> Result<()> {
        let start = self.checked_boundary(node, 0)?;
        let end = BoundaryPoint::new(node, self.get(node)?.length());
        let range = self.range_mut(id)?;
        range.start = start;
        range.end = end;
        Ok(())
    }

    pub fn collapse_range(&mut self, id: RangeId, to_start: bool) -> Result<()> {
        let range = self.range_mut(id)?;
        if to_start {
            range.end = range.start;
        } else {
            range.start = range.end;
        }
        Ok(())
    }

    /// Tree-order comparison of two boundary points, `None` across trees
    pub fn boundary_order(&self, a: BoundaryPoint, b: BoundaryPoint) -> Result<Option<Ordering>> {
        if a.node == b.node {
            return Ok(Some(a.offset.cmp(&b.offset)));
        }
        let position = self.compare_document_position(a.node, b.node)?;
        if position.contains(DocumentPosition::DISCONNECTED) {
            return Ok(None);
        }
        if position.is_preceding() {
            return Ok(self.boundary_order(b, a)?.map(Ordering::reverse));
        }
        if position.contains(DocumentPosition::CONTAINED_BY) {
            let child = self
                .ancestors(b.node)
                .take_while(|&id| id != a.node)
                .last()
                .unwrap_or(b.node);
            let index = self.index_of(child)?.unwrap_or(0) as u32;
            if index < a.offset {
                return Ok(Some(Ordering::Greater));
            }
        }
        Ok(Some(Ordering::Less))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentConfig;

    fn list(n: usize) -> (DomArena, NodeId, NodeId, Vec<NodeId>) {
        let mut arena = DomArena::new();
        let doc = arena.create_document(DocumentConfig::default());
        let ul = arena.create_element(doc, "ul").unwrap();
        arena.append_child(doc, ul).unwrap();
        let items = (0..n)
            .map(|_| {
                let li = arena.create_element(doc, "li").unwrap();
                arena.append_child(ul, li).unwrap();
                li
            })
            .collect();
        (arena, doc, ul, items)
    }

    #[test]
    fn test_create_range_starts_collapsed_at_document() {
        let (mut arena, doc, ..) = list(0);
        let id = arena.create_range(doc).unwrap();
        let range = arena.range(id).unwrap();
        assert!(range.is_collapsed());
        assert_eq!(range.start, BoundaryPoint::new(doc, 0));
        assert_eq!(id.document(), doc);
        assert!(arena.range_collapsed(id).unwrap());
    }

    #[test]
    fn test_boundary_validation() {
        let (mut arena, doc, ul, _) = list(2);
        let id = arena.create_range(doc).unwrap();
        assert!(matches!(
            arena.set_range_start(id, ul, 3),
            Err(DomError::IndexSize { offset: 3, length: 2 })
        ));
        let doctype = arena.create_doctype(doc, "html", "", "").unwrap();
        assert!(matches!(
            arena.set_range_end(id, doctype, 0),
            Err(DomError::InvalidNodeType { .. })
        ));
        assert_eq!(arena.range(id).unwrap().start, BoundaryPoint::new(doc, 0));
    }

    #[test]
    fn test_start_after_end_collapses() {
        let (mut arena, doc, ul, items) = list(3);
        let id = arena.create_range(doc).unwrap();
        arena.set_range_end(id, ul, 1).unwrap();
        arena.set_range_start(id, items[2], 0).unwrap();

        let range = arena.range(id).unwrap();
        assert!(range.is_collapsed());
        assert_eq!(range.end, BoundaryPoint::new(items[2], 0));
    }

    #[test]
    fn test_boundary_order_parent_offsets() {
        let (arena, _, ul, items) = list(3);
        // (ul, 2) is after everything inside items[0] and before items[2]
        let inside_first = BoundaryPoint::new(items[0], 0);
        let inside_last = BoundaryPoint::new(items[2], 0);
        let between = BoundaryPoint::new(ul, 2);

        assert_eq!(
            arena.boundary_order(between, inside_first).unwrap(),
            Some(Ordering::Greater)
        );
        assert_eq!(
            arena.boundary_order(between, inside_last).unwrap(),
            Some(Ordering::Less)
        );
        assert_eq!(
            arena.boundary_order(inside_last, between).unwrap(),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_select_contents_and_detach() {
        let (mut arena, doc, ul, _) = list(4);
        let id = arena.create_range(doc).unwrap();
        arena.select_node_contents(id, ul).unwrap();
        assert_eq!(arena.range(id).unwrap().end, BoundaryPoint::new(ul, 4));

        arena.collapse_range(id, false).unwrap();
        assert_eq!(arena.range(id).unwrap().start, BoundaryPoint::new(ul, 4));

        arena.detach_range(id).unwrap();
        assert!(matches!(arena.range(id), Err(DomError::UnknownRange(_))));
        assert!(arena.live_ranges(doc).unwrap().is_empty());
    }

    #[test]
    fn test_rules_in_isolation() {
        let (arena, _, ul, items) = list(3);
        let mut point = BoundaryPoint::new(ul, 2);

        RangeMutation::Inserted { parent: ul, index: 1, count: 2 }.adjust(&mut point, &arena);
        assert_eq!(point.offset, 4);

        RangeMutation::Inserted { parent: ul, index: 4, count: 1 }.adjust(&mut point, &arena);
        assert_eq!(point.offset, 4, "insertion at the boundary leaves it in place");

        let mut inside = BoundaryPoint::new(items[1], 0);
        RangeMutation::Removed { parent: ul, index: 1, child: items[1] }
            .adjust(&mut inside, &arena);
        assert_eq!(inside, BoundaryPoint::new(ul, 1));

        let mut data = BoundaryPoint::new(items[0], 5);
        RangeMutation::DataTruncated { node: items[0], offset: 3 }.adjust(&mut data, &arena);
        assert_eq!(data.offset, 3);
    }

    #[test]
    fn test_forget_nodes() {
        let mut registry = RangeRegistry::default();
        registry.register(0, Range::collapsed_at(BoundaryPoint::new(1, 0)));
        registry.register(0, Range::collapsed_at(BoundaryPoint::new(2, 0)));
        registry.register(5, Range::collapsed_at(BoundaryPoint::new(1, 0)));

        let gone: AHashSet<NodeId> = [2, 5].into_iter().collect();
        assert_eq!(registry.forget_nodes(&gone), 2);
        assert_eq!(registry.created_by(0).count(), 1);
        assert_eq!(registry.created_by(5).count(), 0);
    }
}
