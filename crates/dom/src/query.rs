//! Read-only tree queries and cloning
//!
//! Position comparison, namespace lookup, structural equality and base
//! URI resolution never touch ranges or the mutation queue.

use uuid::Uuid;

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::names::{self, XMLNS_NAMESPACE, XML_NAMESPACE};
use crate::node::{NamespaceDeclaration, WeakDocument};
use crate::types::{DocumentPosition, NodeId, NodeType};

impl DomArena {
    /// Where `other` sits relative to `node`
    ///
    /// Nodes in different trees are reported as disconnected with a
    /// direction that is arbitrary but stable for the lifetime of both
    /// trees.
    pub fn compare_document_position(
        &self,
        node: NodeId,
        other: NodeId,
    ) -> Result<DocumentPosition> {
        self.get(node)?;
        self.get(other)?;
        if node == other {
            return Ok(DocumentPosition::SAME);
        }

        let node_chain = self.inclusive_ancestors_root_first(node);
        let other_chain = self.inclusive_ancestors_root_first(other);

        if node_chain.first() != other_chain.first() {
            let direction = if self.tree_key(&other_chain) < self.tree_key(&node_chain) {
                DocumentPosition::PRECEDING
            } else {
                DocumentPosition::FOLLOWING
            };
            return Ok(DocumentPosition::DISCONNECTED
                | DocumentPosition::IMPLEMENTATION_SPECIFIC
                | direction);
        }

        if node_chain.contains(&other) {
            return Ok(DocumentPosition::CONTAINS | DocumentPosition::PRECEDING);
        }
        if other_chain.contains(&node) {
            return Ok(DocumentPosition::CONTAINED_BY | DocumentPosition::FOLLOWING);
        }

        // Neither contains the other, so both chains continue past the
        // last shared ancestor
        let shared = node_chain
            .iter()
            .zip(&other_chain)
            .take_while(|(a, b)| a == b)
            .count();
        let node_branch = self.index_of(node_chain[shared])?;
        let other_branch = self.index_of(other_chain[shared])?;
        if other_branch < node_branch {
            Ok(DocumentPosition::PRECEDING)
        } else {
            Ok(DocumentPosition::FOLLOWING)
        }
    }

    fn inclusive_ancestors_root_first(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain: Vec<NodeId> = std::iter::once(node).chain(self.ancestors(node)).collect();
        chain.reverse();
        chain
    }

    /// Total order over tree roots: owning document identity, then root id
    fn tree_key(&self, chain_root_first: &[NodeId]) -> (Uuid, NodeId) {
        let root = chain_root_first.first().copied().unwrap_or_default();
        let uuid = self
            .node_document(root)
            .ok()
            .flatten()
            .and_then(|document| self.document_uuid(document).ok())
            .unwrap_or_else(Uuid::nil);
        (uuid, root)
    }

    /// Element where namespace lookups start for `node`
    fn lookup_start(&self, node: NodeId) -> Result<Option<NodeId>> {
        let target = self.get(node)?;
        match target.node_type {
            NodeType::Element => Ok(Some(node)),
            NodeType::Document => self.document_element(node),
            NodeType::DocumentType | NodeType::DocumentFragment => Ok(None),
            _ => match target.parent_id {
                Some(parent) if self.get(parent)?.is_element() => Ok(Some(parent)),
                _ => Ok(None),
            },
        }
    }

    /// Namespace bound to `prefix` in scope at `node`
    ///
    /// A prefixed lookup returns the nearest binding. The default namespace
    /// (`prefix == None`) resolves to the root-most binding on the
    /// ancestor chain.
    pub fn lookup_namespace_uri(&self, node: NodeId, prefix: Option<&str>) -> Result<Option<String>> {
        let prefix = prefix.filter(|p| !p.is_empty());
        match prefix {
            Some("xml") => return Ok(Some(XML_NAMESPACE.to_string())),
            Some("xmlns") => return Ok(Some(XMLNS_NAMESPACE.to_string())),
            _ => {}
        }
        let Some(start) = self.lookup_start(node)? else {
            return Ok(None);
        };

        let mut found = None;
        for id in std::iter::once(start).chain(self.ancestors(start)) {
            let Some(element) = self.get(id)?.as_element() else {
                continue;
            };
            if let Some(uri) = element.resolve_prefix(prefix) {
                if prefix.is_some() {
                    return Ok(Some(uri.to_string()).filter(|uri| !uri.is_empty()));
                }
                found = Some(uri);
            }
        }
        Ok(found.filter(|uri| !uri.is_empty()).map(str::to_string))
    }

    /// Nearest prefix bound to `namespace` in scope at `node`
    pub fn lookup_prefix(&self, node: NodeId, namespace: Option<&str>) -> Result<Option<String>> {
        let Some(namespace) = namespace.filter(|ns| !ns.is_empty()) else {
            self.get(node)?;
            return Ok(None);
        };
        let Some(start) = self.lookup_start(node)? else {
            return Ok(None);
        };
        for id in std::iter::once(start).chain(self.ancestors(start)) {
            if let Some(prefix) = self
                .get(id)?
                .as_element()
                .and_then(|element| element.resolve_namespace(namespace))
            {
                return Ok(Some(prefix.to_string()));
            }
        }
        Ok(None)
    }

    pub fn is_default_namespace(&self, node: NodeId, namespace: Option<&str>) -> Result<bool> {
        let namespace = namespace.filter(|ns| !ns.is_empty());
        Ok(self.lookup_namespace_uri(node, None)?.as_deref() == namespace)
    }

    /// Bind `prefix` (or the default namespace) to `uri` on an element
    ///
    /// Re-declaring a prefix replaces its previous binding.
    pub fn declare_namespace(&mut self, element: NodeId, prefix: Option<&str>, uri: &str) -> Result<()> {
        names::validate_declaration(prefix, uri)?;
        let node = self.get_mut(element)?;
        let node_type = node.node_type;
        let data = node.as_element_mut().ok_or(DomError::InvalidNodeType {
            expected: "Element",
            actual: node_type,
        })?;
        let declaration = NamespaceDeclaration {
            prefix: prefix.map(str::to_string),
            uri: uri.to_string(),
        };
        match data
            .declarations
            .iter_mut()
            .find(|existing| existing.prefix == declaration.prefix)
        {
            Some(existing) => *existing = declaration,
            None => data.declarations.push(declaration),
        }
        Ok(())
    }

    /// Structural equality of two subtrees
    pub fn is_equal_node(&self, a: NodeId, b: NodeId) -> Result<bool> {
        let mut stack = vec![(a, b)];
        while let Some((left, right)) = stack.pop() {
            let (l, r) = (self.get(left)?, self.get(right)?);
            let same = l.node_type == r.node_type
                && l.node_name == r.node_name
                && l.base_uri == r.base_uri
                && l.data.same_content(&r.data)
                && l.children.len() == r.children.len();
            if !same {
                return Ok(false);
            }
            stack.extend(l.children.iter().zip(r.children.iter()));
        }
        Ok(true)
    }

    /// Copy a node (and, when `deep`, its subtree)
    ///
    /// The copy is unowned until it is inserted or adopted somewhere; the
    /// descendants of a cloned document belong to the new document.
    /// Ranges, observers and lifecycle hooks are not copied.
    pub fn clone_node(&mut self, node: NodeId, deep: bool) -> Result<NodeId> {
        let root = self.push_copy(node, WeakDocument::none())?;
        if !deep {
            return Ok(root);
        }
        let owner = if self.get(root)?.node_type == NodeType::Document {
            WeakDocument::new(root)
        } else {
            WeakDocument::none()
        };

        let mut stack = vec![(node, root)];
        while let Some((source, copy)) = stack.pop() {
            let children: Vec<NodeId> = self.children(source)?.iter().collect();
            for child in children {
                let child_copy = self.push_copy(child, owner)?;
                self.child_list_mut(copy)?.append(child_copy)?;
                stack.push((child, child_copy));
            }
        }
        tracing::trace!(node, copy = root, "cloned subtree");
        Ok(root)
    }

    /// Effective base URI: nearest override on the inclusive ancestor
    /// chain, else the owning document's URL
    pub fn base_uri(&self, node: NodeId) -> Result<Option<String>> {
        self.get(node)?;
        for id in std::iter::once(node).chain(self.ancestors(node)) {
            if let Some(uri) = self.get(id)?.base_uri_override() {
                return Ok(Some(uri.to_string()));
            }
        }
        match self.node_document(node)? {
            Some(document) => Ok(Some(self.document_config(document)?.url.clone())),
            None => Ok(None),
        }
    }

    pub fn set_base_uri(&mut self, node: NodeId, uri: Option<&str>) -> Result<()> {
        self.get_mut(node)?.base_uri = uri.map(str::to_string);
        Ok(())
    }
}
