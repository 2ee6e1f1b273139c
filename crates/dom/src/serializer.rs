//! Tree serializer - markup hook and debug snapshots
//!
//! Markup formatting itself lives outside this crate. A formatter plugs in
//! through [`MarkupHook`]; the default rendering is the node's text
//! content. [`TreeSnapshot`] is a serde view of a subtree used to diff and
//! log trees.

use serde::{Deserialize, Serialize};

use crate::arena::DomArena;
use crate::error::Result;
use crate::types::{NodeId, NodeType};

/// Per-node "render as markup" entry point for an external formatter
pub trait MarkupHook {
    fn render(&self, arena: &DomArena, node: NodeId) -> Result<String> {
        Ok(arena.text_content(node)?.unwrap_or_default())
    }
}

/// The default rendering: text content only
#[derive(Debug, Clone, Copy, Default)]
pub struct TextContentHook;

impl MarkupHook for TextContentHook {}

/// Snapshot configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Record character data of text-like nodes
    pub include_text: bool,
    /// Characters kept per text before it is cut with "..."
    pub max_text_length: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            include_text: true,
            max_text_length: 200,
        }
    }
}

/// Serializable view of a subtree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeSnapshot {
    pub node_id: NodeId,
    pub node_type: NodeType,
    pub node_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeSnapshot>,
}

/// DOM tree serializer
#[derive(Debug, Clone, Default)]
pub struct TreeSerializer {
    config: SnapshotConfig,
}

impl TreeSerializer {
    pub fn new() -> Self {
        Self::with_config(SnapshotConfig::default())
    }

    pub fn with_config(config: SnapshotConfig) -> Self {
        Self { config }
    }

    /// Snapshot the subtree rooted at `root`
    pub fn snapshot(&self, arena: &DomArena, root: NodeId) -> Result<TreeSnapshot> {
        let node = arena.get(root)?;
        let text = match node.character_data() {
            Some(data) if self.config.include_text => {
                Some(cap_text_length(data, self.config.max_text_length))
            }
            _ => None,
        };

        let mut children = Vec::with_capacity(node.children().len());
        for child in node.children() {
            children.push(self.snapshot(arena, child)?);
        }

        Ok(TreeSnapshot {
            node_id: root,
            node_type: node.node_type(),
            node_name: node.node_name().to_string(),
            text,
            children,
        })
    }

    /// Pretty JSON of [`TreeSerializer::snapshot`]
    pub fn to_json(&self, arena: &DomArena, root: NodeId) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot(arena, root)?)?)
    }

    /// Render through a formatter's hook
    pub fn render(&self, arena: &DomArena, node: NodeId, hook: &dyn MarkupHook) -> Result<String> {
        hook.render(arena, node)
    }
}

/// Cap text length to avoid huge snapshots; counts characters, not bytes
pub fn cap_text_length(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        None => text.to_string(),
        Some((end, _)) => format!("{}...", &text[..end]),
    }
}
