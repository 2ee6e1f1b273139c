//! Core type definitions shared by the tree algorithms
//!
//! Key design principles:
//! 1. Use u32 for indices (4 bytes vs 8 bytes pointer)
//! 2. Small copyable bitsets instead of bool fields
//! 3. Handles (ids) instead of references, so nothing borrows the arena

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// Node identifier (index into arena)
/// u32 allows 4 billion nodes, enough for any document
pub type NodeId = u32;

/// Node type codes as defined by the DOM standard
///
/// Only the kinds the arena can create; the legacy attribute, entity and
/// notation codes have no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    CdataSection = 4,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    DocumentFragment = 11,
}

impl NodeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NodeType::Element),
            3 => Some(NodeType::Text),
            4 => Some(NodeType::CdataSection),
            7 => Some(NodeType::ProcessingInstruction),
            8 => Some(NodeType::Comment),
            9 => Some(NodeType::Document),
            10 => Some(NodeType::DocumentType),
            11 => Some(NodeType::DocumentFragment),
            _ => None,
        }
    }

    /// Node types that may hold children at all
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeType::Document | NodeType::DocumentFragment | NodeType::Element
        )
    }

    /// Text, CDATA, comment and processing instruction nodes
    pub fn is_character_data(self) -> bool {
        matches!(
            self,
            NodeType::Text
                | NodeType::CdataSection
                | NodeType::Comment
                | NodeType::ProcessingInstruction
        )
    }
}

/// Immutable per-node flags, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NodeFlags(u8);

impl NodeFlags {
    pub const NONE: NodeFlags = NodeFlags(0);
    /// Parser "special" category; carried, never interpreted by the tree
    pub const SPECIAL: NodeFlags = NodeFlags(0x01);
    /// Void node: can never hold children
    pub const END_POINT: NodeFlags = NodeFlags(0x02);
    /// Refuses to be inserted below an ancestor with the same name
    pub const NO_SELF_NESTING: NodeFlags = NodeFlags(0x04);

    pub fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for NodeFlags {
    type Output = NodeFlags;

    fn bitor(self, rhs: NodeFlags) -> NodeFlags {
        NodeFlags(self.0 | rhs.0)
    }
}

/// Result of `compare_document_position`, as a bitmask
///
/// An empty mask means both arguments are the same node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DocumentPosition(u16);

impl DocumentPosition {
    pub const SAME: DocumentPosition = DocumentPosition(0);
    pub const DISCONNECTED: DocumentPosition = DocumentPosition(0x01);
    pub const PRECEDING: DocumentPosition = DocumentPosition(0x02);
    pub const FOLLOWING: DocumentPosition = DocumentPosition(0x04);
    pub const CONTAINS: DocumentPosition = DocumentPosition(0x08);
    pub const CONTAINED_BY: DocumentPosition = DocumentPosition(0x10);
    pub const IMPLEMENTATION_SPECIFIC: DocumentPosition = DocumentPosition(0x20);

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn contains(self, flag: DocumentPosition) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn is_same(self) -> bool {
        self.0 == 0
    }

    pub fn is_preceding(self) -> bool {
        self.contains(Self::PRECEDING)
    }

    pub fn is_following(self) -> bool {
        self.contains(Self::FOLLOWING)
    }
}

impl BitOr for DocumentPosition {
    type Output = DocumentPosition;

    fn bitor(self, rhs: DocumentPosition) -> DocumentPosition {
        DocumentPosition(self.0 | rhs.0)
    }
}

impl fmt::Debug for DocumentPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(DocumentPosition, &str); 6] = [
            (DocumentPosition::DISCONNECTED, "DISCONNECTED"),
            (DocumentPosition::PRECEDING, "PRECEDING"),
            (DocumentPosition::FOLLOWING, "FOLLOWING"),
            (DocumentPosition::CONTAINS, "CONTAINS"),
            (DocumentPosition::CONTAINED_BY, "CONTAINED_BY"),
            (DocumentPosition::IMPLEMENTATION_SPECIFIC, "IMPLEMENTATION_SPECIFIC"),
        ];
        if self.is_same() {
            return f.write_str("DocumentPosition(SAME)");
        }
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "DocumentPosition({})", names.join(" | "))
    }
}

/// Handle to a live range registered with a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeId {
    pub(crate) document: NodeId,
    pub(crate) slot: u32,
}

impl RangeId {
    /// Document the range is registered with
    pub fn document(&self) -> NodeId {
        self.document
    }
}

/// Mutation observer identity, allocated by the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObserverId(pub(crate) u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_roundtrip_discriminant() {
        assert_eq!(NodeType::from_u8(11), Some(NodeType::DocumentFragment));
        assert_eq!(NodeType::from_u8(0), None);
        assert_eq!(NodeType::from_u8(2), None);
        assert!(NodeType::Element.is_container());
        assert!(!NodeType::Text.is_container());
        assert!(NodeType::Comment.is_character_data());
    }

    #[test]
    fn test_flags_combine() {
        let flags = NodeFlags::SPECIAL | NodeFlags::END_POINT;
        assert!(flags.contains(NodeFlags::END_POINT));
        assert!(!flags.contains(NodeFlags::NO_SELF_NESTING));
        assert!(NodeFlags::NONE.contains(NodeFlags::NONE));
    }

    #[test]
    fn test_position_debug_lists_flags() {
        let pos = DocumentPosition::CONTAINS | DocumentPosition::PRECEDING;
        assert!(pos.is_preceding());
        assert!(!pos.is_following());
        assert_eq!(
            format!("{:?}", pos),
            "DocumentPosition(PRECEDING | CONTAINS)"
        );
        assert_eq!(format!("{:?}", DocumentPosition::SAME), "DocumentPosition(SAME)");
    }
}
