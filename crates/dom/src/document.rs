//! Document coordinator state
//!
//! A document node carries everything that must outlive a single tree
//! operation: its identity, observer registrations (including transient
//! ones created by removals) and the pending mutation queue. Live ranges
//! are created through a document but tracked by the arena.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::arena::DomArena;
use crate::error::Result;
use crate::mutation::{MutationQueue, ObserverRegistry};
use crate::types::NodeId;

/// Per-document configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Document URL, the fallback base URI for every node it owns
    pub url: String,
    /// Queue mutation records at all
    pub record_mutations: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            url: "about:blank".to_string(),
            record_mutations: true,
        }
    }
}

impl DocumentConfig {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load a config from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Coordinator state owned by a document node
#[derive(Debug)]
pub struct DocumentState {
    pub(crate) config: DocumentConfig,
    pub(crate) uuid: Uuid,
    pub(crate) observers: ObserverRegistry,
    pub(crate) queue: MutationQueue,
}

impl DocumentState {
    pub(crate) fn new(config: DocumentConfig) -> Self {
        Self {
            config,
            uuid: Uuid::new_v4(),
            observers: ObserverRegistry::default(),
            queue: MutationQueue::default(),
        }
    }

    /// Same configuration, fresh identity and empty registries
    pub(crate) fn fork(&self) -> Self {
        Self::new(self.config.clone())
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl DomArena {
    pub fn document_config(&self, document: NodeId) -> Result<&DocumentConfig> {
        Ok(&self.document_state(document)?.config)
    }

    /// Stable identity of a document, used to order disconnected trees
    pub fn document_uuid(&self, document: NodeId) -> Result<Uuid> {
        Ok(self.document_state(document)?.uuid)
    }

    /// The single element child of a document, if any
    pub fn document_element(&self, document: NodeId) -> Result<Option<NodeId>> {
        self.document_state(document)?;
        for child in self.children(document)? {
            if self.get(child)?.is_element() {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// The doctype child of a document, if any
    pub fn doctype(&self, document: NodeId) -> Result<Option<NodeId>> {
        self.document_state(document)?;
        for child in self.children(document)? {
            if self.get(child)?.node_type() == crate::types::NodeType::DocumentType {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomError;

    #[test]
    fn test_config_from_json_fills_defaults() {
        let config = DocumentConfig::from_json(r#"{"url": "https://example.com/a/"}"#).unwrap();
        assert_eq!(config.url, "https://example.com/a/");
        assert!(config.record_mutations);

        let config = DocumentConfig::from_json(r#"{"record_mutations": false}"#).unwrap();
        assert_eq!(config.url, "about:blank");
        assert!(!config.record_mutations);
    }

    #[test]
    fn test_config_from_bad_json() {
        assert!(matches!(
            DocumentConfig::from_json("{url: nope"),
            Err(DomError::ParseError(_))
        ));
    }

    #[test]
    fn test_documents_have_distinct_identity() {
        let mut arena = DomArena::new();
        let a = arena.create_document(DocumentConfig::default());
        let b = arena.create_document(DocumentConfig::with_url("https://b.test/"));

        assert_ne!(arena.document_uuid(a).unwrap(), arena.document_uuid(b).unwrap());
        assert_eq!(arena.document_config(b).unwrap().url, "https://b.test/");
    }

    #[test]
    fn test_document_element_and_doctype() {
        let mut arena = DomArena::new();
        let doc = arena.create_document(DocumentConfig::default());
        let doctype = arena.create_doctype(doc, "html", "", "").unwrap();
        let html = arena.create_element(doc, "html").unwrap();
        arena.append_child(doc, doctype).unwrap();
        arena.append_child(doc, html).unwrap();

        assert_eq!(arena.document_element(doc).unwrap(), Some(html));
        assert_eq!(arena.doctype(doc).unwrap(), Some(doctype));
        assert!(arena.document_element(html).is_err());
    }
}
