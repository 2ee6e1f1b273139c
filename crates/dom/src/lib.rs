//! DOM Node-Tree Mutation Engine
//!
//! The mutable tree core of a DOM: insertion, removal, replacement,
//! adoption across documents, text normalization and document-position
//! comparison, with live ranges and mutation records kept in step.
//!
//! ## Philosophy
//!
//! - **Data structures first**: one arena, `u32` handles, no `Rc` graphs
//! - **Validate, then mutate**: an `Err` never leaves a half-applied change
//! - **Bookkeeping flows up**: tree edits go down to child lists, range and
//!   record updates go up to the owning document
//!
//! ## Core Design
//!
//! ```text
//! factories → DomArena (Vec<Option<DomNode>>) ← tree_ops (insert/remove/...)
//!                  │                                   │
//!                  ├── RangeRegistry (all documents) ←─┤ RangeMutation
//!                  └── Document node ── ObserverRegistry
//!                                     └─ MutationQueue ←┘ MutationRecord
//! ```
//!
//! ```
//! use dom_tree::{DocumentConfig, DomArena};
//!
//! let mut arena = DomArena::new();
//! let doc = arena.create_document(DocumentConfig::default());
//! let html = arena.create_element(doc, "html")?;
//! arena.append_child(doc, html)?;
//!
//! let records = arena.take_mutation_records(doc)?;
//! assert_eq!(records[0].record.added_nodes.as_slice(), &[html]);
//! # Ok::<(), dom_tree::DomError>(())
//! ```

pub mod arena;
pub mod document;
pub mod error;
pub mod mutation;
pub mod names;
pub mod node;
pub mod node_list;
pub mod query;
pub mod range;
pub mod serializer;
pub mod tree_ops;
pub mod types;

pub use arena::DomArena;
pub use document::{DocumentConfig, DocumentState};
pub use error::{DomError, Result};
pub use mutation::{MutationRecord, ObserveOptions, QueuedRecord};
pub use node::{DomNode, ElementData, NodeData, NodeLifecycle, WeakDocument};
pub use node_list::NodeList;
pub use range::{BoundaryPoint, Range};
pub use serializer::{MarkupHook, SnapshotConfig, TextContentHook, TreeSerializer, TreeSnapshot};
pub use types::*;
