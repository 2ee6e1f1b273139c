//! Mutation records, the per-document queue, and observer registrations
//!
//! Dispatch is someone else's job: this module only decides which
//! observers care about a record and keeps records in commit order until
//! the dispatcher drains them.

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use smallvec::SmallVec;

use crate::arena::DomArena;
use crate::error::Result;
use crate::types::{NodeId, ObserverId};

/// Immutable snapshot of one committed child-list change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationRecord {
    pub target: NodeId,
    pub added_nodes: SmallVec<[NodeId; 4]>,
    pub removed_nodes: SmallVec<[NodeId; 4]>,
    pub previous_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
}

/// A record plus the observers it must be delivered to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedRecord {
    pub record: MutationRecord,
    pub observers: SmallVec<[ObserverId; 2]>,
}

/// Ordered, append-only buffer drained by the dispatcher
#[derive(Debug, Default)]
pub(crate) struct MutationQueue {
    records: Vec<QueuedRecord>,
}

impl MutationQueue {
    pub(crate) fn push(&mut self, record: QueuedRecord) {
        self.records.push(record);
    }

    pub(crate) fn as_slice(&self) -> &[QueuedRecord] {
        &self.records
    }

    pub(crate) fn drain(&mut self) -> Vec<QueuedRecord> {
        std::mem::take(&mut self.records)
    }
}

/// Options for [`DomArena::observe`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserveOptions {
    /// Also report changes anywhere below the target
    pub subtree: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Registration {
    observer: ObserverId,
    subtree: bool,
    /// Set for registrations copied onto a removed node
    transient: bool,
}

/// Observer registrations of one document, keyed by observed node
#[derive(Debug, Default)]
pub(crate) struct ObserverRegistry {
    by_node: AHashMap<NodeId, SmallVec<[Registration; 1]>>,
}

impl ObserverRegistry {
    fn add(&mut self, node: NodeId, registration: Registration) {
        let entry = self.by_node.entry(node).or_default();
        match entry
            .iter_mut()
            .find(|r| r.observer == registration.observer && r.transient == registration.transient)
        {
            Some(existing) => existing.subtree = registration.subtree,
            None => entry.push(registration),
        }
    }

    fn on(&self, node: NodeId) -> &[Registration] {
        self.by_node.get(&node).map(|r| r.as_slice()).unwrap_or(&[])
    }

    fn retain(&mut self, mut keep: impl FnMut(&Registration) -> bool) {
        self.by_node.retain(|_, registrations| {
            registrations.retain(|r| keep(r));
            !registrations.is_empty()
        });
    }

    pub(crate) fn clear_transient(&mut self) {
        self.retain(|r| !r.transient);
    }

    pub(crate) fn forget_nodes(&mut self, nodes: &AHashSet<NodeId>) {
        self.by_node.retain(|node, _| !nodes.contains(node));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

impl DomArena {
    /// Register `observer` on `target` in the target's document
    pub fn observe(
        &mut self,
        target: NodeId,
        observer: ObserverId,
        options: ObserveOptions,
    ) -> Result<()> {
        let Some(document) = self.node_document(target)? else {
            tracing::debug!(target, "observe on a node without a document ignored");
            return Ok(());
        };
        self.document_state_mut(document)?.observers.add(
            target,
            Registration {
                observer,
                subtree: options.subtree,
                transient: false,
            },
        );
        Ok(())
    }

    /// Remove every registration of `observer`, in every document
    pub fn disconnect_observer(&mut self, observer: ObserverId) {
        let documents: Vec<NodeId> = self.documents().collect();
        for document in documents {
            if let Ok(state) = self.document_state_mut(document) {
                state.observers.retain(|r| r.observer != observer);
            }
        }
    }

    /// Pending records of a document, oldest first
    pub fn pending_mutation_records(&self, document: NodeId) -> Result<&[QueuedRecord]> {
        Ok(self.document_state(document)?.queue.as_slice())
    }

    /// Hand all pending records to the dispatcher
    ///
    /// Ends the current dispatch cycle, so transient registrations go too.
    pub fn take_mutation_records(&mut self, document: NodeId) -> Result<Vec<QueuedRecord>> {
        let state = self.document_state_mut(document)?;
        state.observers.clear_transient();
        Ok(state.queue.drain())
    }

    /// Observers interested in a change to `target`
    fn interested_observers(&self, document: NodeId, target: NodeId) -> SmallVec<[ObserverId; 2]> {
        let mut observers = SmallVec::new();
        let Ok(state) = self.document_state(document) else {
            return observers;
        };
        if state.observers.is_empty() {
            return observers;
        }
        let chain = std::iter::once(target).chain(self.ancestors(target));
        for node in chain {
            for registration in state.observers.on(node) {
                if node != target && !registration.subtree {
                    continue;
                }
                if !observers.contains(&registration.observer) {
                    observers.push(registration.observer);
                }
            }
        }
        observers.sort();
        observers
    }

    /// Queue a child-list record on `target`'s document
    pub(crate) fn queue_tree_mutation(&mut self, record: MutationRecord) -> Result<()> {
        let Some(document) = self.node_document(record.target)? else {
            return Ok(());
        };
        if !self.document_state(document)?.config.record_mutations {
            return Ok(());
        }
        let observers = self.interested_observers(document, record.target);
        tracing::trace!(
            target = record.target,
            added = record.added_nodes.len(),
            removed = record.removed_nodes.len(),
            "queued mutation record"
        );
        self.document_state_mut(document)?
            .queue
            .push(QueuedRecord { record, observers });
        Ok(())
    }

    /// Copy subtree registrations of `parent`'s inclusive ancestors onto
    /// `removed`, so they keep hearing about the detached subtree
    pub(crate) fn register_transient_observers(
        &mut self,
        parent: NodeId,
        removed: NodeId,
    ) -> Result<()> {
        let Some(document) = self.node_document(parent)? else {
            return Ok(());
        };
        let state = self.document_state(document)?;
        if state.observers.is_empty() {
            return Ok(());
        }
        let mut copies: SmallVec<[Registration; 2]> = SmallVec::new();
        let chain = std::iter::once(parent).chain(self.ancestors(parent));
        for node in chain {
            for registration in state.observers.on(node) {
                if registration.subtree {
                    copies.push(Registration {
                        transient: true,
                        ..*registration
                    });
                }
            }
        }
        let state = self.document_state_mut(document)?;
        for registration in copies {
            state.observers.add(removed, registration);
        }
        Ok(())
    }
}
