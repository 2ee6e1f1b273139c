//! Error types for DOM operations
//!
//! Simple, flat error hierarchy. Every tree algorithm validates before it
//! mutates, so an `Err` always means nothing changed.

use thiserror::Error;

use crate::types::{NodeId, NodeType};

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("Hierarchy request error: {0}")]
    HierarchyRequest(&'static str),

    #[error("Not found: {0}")]
    NotFound(&'static str),

    #[error("Invalid character in name: {0:?}")]
    InvalidCharacter(String),

    #[error("Namespace error: {0}")]
    Namespace(&'static str),

    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("Offset {offset} exceeds node length {length}")]
    IndexSize { offset: u32, length: u32 },

    #[error("Invalid node type: expected {expected}, got {actual:?}")]
    InvalidNodeType {
        expected: &'static str,
        actual: NodeType,
    },

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Unknown range: {0}")]
    UnknownRange(u32),

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
}

impl DomError {
    /// True for the pre-mutation validation failures a DOM binding would
    /// surface as a `DOMException`.
    pub fn is_dom_exception(&self) -> bool {
        matches!(
            self,
            DomError::HierarchyRequest(_)
                | DomError::NotFound(_)
                | DomError::InvalidCharacter(_)
                | DomError::Namespace(_)
                | DomError::NotSupported(_)
                | DomError::IndexSize { .. }
                | DomError::InvalidNodeType { .. }
        )
    }
}
