//! Property-based tests for tree mutation
//!
//! Random sequences of insert/remove/replace/normalize against a small
//! pool of nodes. After every step the tree must be consistent; a step that
//! fails must leave the tree, ranges and queue exactly as they were.

use proptest::prelude::*;

use dom_tree::{BoundaryPoint, DocumentConfig, DocumentPosition, DomArena, NodeId, NodeType, RangeId};

#[derive(Debug, Clone)]
enum Op {
    Append { parent: usize, node: usize },
    InsertBefore { parent: usize, node: usize, reference: usize },
    Remove { node: usize },
    Replace { parent: usize, node: usize, old: usize },
    Normalize { node: usize },
    SplitText { node: usize, offset: u32 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<usize>(), any::<usize>()).prop_map(|(parent, node)| Op::Append { parent, node }),
        (any::<usize>(), any::<usize>(), any::<usize>())
            .prop_map(|(parent, node, reference)| Op::InsertBefore { parent, node, reference }),
        any::<usize>().prop_map(|node| Op::Remove { node }),
        (any::<usize>(), any::<usize>(), any::<usize>())
            .prop_map(|(parent, node, old)| Op::Replace { parent, node, old }),
        any::<usize>().prop_map(|node| Op::Normalize { node }),
        (any::<usize>(), 0u32..4).prop_map(|(node, offset)| Op::SplitText { node, offset }),
    ]
}

struct World {
    arena: DomArena,
    doc: NodeId,
    pool: Vec<NodeId>,
    ranges: Vec<RangeId>,
}

fn world() -> World {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut arena = DomArena::new();
    let doc = arena.create_document(DocumentConfig::default());
    let mut pool = vec![doc];
    for name in ["html", "body", "div", "p", "span"] {
        pool.push(arena.create_element(doc, name).unwrap());
    }
    for data in ["ab", "cd", "", "ef"] {
        pool.push(arena.create_text(doc, data).unwrap());
    }
    pool.push(arena.create_comment(doc, "c").unwrap());
    pool.push(arena.create_doctype(doc, "html", "", "").unwrap());
    pool.push(arena.create_document_fragment(doc).unwrap());

    let ranges = (0..3).map(|_| arena.create_range(doc).unwrap()).collect();
    World {
        arena,
        doc,
        pool,
        ranges,
    }
}

/// Parent and children of every node, range boundaries, queue length
type State = (
    Vec<(Option<NodeId>, Vec<NodeId>)>,
    Vec<(BoundaryPoint, BoundaryPoint)>,
    usize,
);

/// Everything a failed operation must not touch
fn observable_state(w: &World) -> State {
    let tree = w
        .arena
        .node_ids()
        .map(|id| {
            (
                w.arena.parent(id).unwrap(),
                w.arena.children(id).unwrap().iter().collect(),
            )
        })
        .collect();
    let ranges = w
        .ranges
        .iter()
        .map(|&id| {
            let range = w.arena.range(id).unwrap();
            (range.start, range.end)
        })
        .collect();
    let queued = w.arena.pending_mutation_records(w.doc).unwrap().len();
    (tree, ranges, queued)
}

fn apply(w: &mut World, op: &Op) -> dom_tree::Result<()> {
    let n = w.pool.len();
    let pick = |i: usize| w.pool[i % n];
    match *op {
        Op::Append { parent, node } => w.arena.append_child(pick(parent), pick(node)).map(drop),
        Op::InsertBefore {
            parent,
            node,
            reference,
        } => w
            .arena
            .pre_insert(pick(parent), pick(node), Some(pick(reference)))
            .map(drop),
        Op::Remove { node } => {
            let node = pick(node);
            match w.arena.parent(node)? {
                Some(parent) => w.arena.remove_child(parent, node).map(drop),
                None => Ok(()),
            }
        }
        Op::Replace { parent, node, old } => w
            .arena
            .replace_child(pick(parent), pick(node), pick(old))
            .map(drop),
        Op::Normalize { node } => w.arena.normalize(pick(node)),
        Op::SplitText { node, offset } => {
            let node = pick(node);
            let new_node = w.arena.split_text(node, offset)?;
            w.pool.push(new_node);
            Ok(())
        }
    }
}

/// Spread the ranges over whatever the document tree currently holds
fn place_ranges(w: &mut World) {
    let mut in_tree = vec![w.doc];
    in_tree.extend(w.arena.descendants(w.doc).unwrap());
    for (i, &id) in w.ranges.clone().iter().enumerate() {
        let node = in_tree[(i * 7) % in_tree.len()];
        if w.arena.node_type(node).unwrap() == NodeType::DocumentType {
            continue;
        }
        let length = w.arena.get(node).unwrap().length();
        w.arena.set_range_start(id, node, length / 2).unwrap();
        w.arena.set_range_end(id, node, length).unwrap();
    }
}

fn check_invariants(w: &World) {
    let arena = &w.arena;

    for id in arena.node_ids() {
        let children = arena.children(id).unwrap();
        for child in children {
            assert_eq!(arena.parent(child).unwrap(), Some(id));
            assert_eq!(children.iter().filter(|&c| c == child).count(), 1);
        }
        if let Some(parent) = arena.parent(id).unwrap() {
            assert!(arena.children(parent).unwrap().contains(id));
        }
    }

    let kinds: Vec<NodeType> = arena
        .children(w.doc)
        .unwrap()
        .iter()
        .map(|id| arena.node_type(id).unwrap())
        .collect();
    let elements = kinds.iter().filter(|&&k| k == NodeType::Element).count();
    let doctypes = kinds.iter().filter(|&&k| k == NodeType::DocumentType).count();
    assert!(elements <= 1 && doctypes <= 1, "document children {:?}", kinds);
    if let (Some(e), Some(d)) = (
        kinds.iter().position(|&k| k == NodeType::Element),
        kinds.iter().position(|&k| k == NodeType::DocumentType),
    ) {
        assert!(d < e, "doctype follows element: {:?}", kinds);
    }

    for &id in &w.ranges {
        let range = arena.range(id).unwrap();
        for point in [range.start, range.end] {
            assert_eq!(arena.root(point.node).unwrap(), w.doc, "range escaped the tree");
            assert!(point.offset <= arena.get(point.node).unwrap().length());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_tree_stays_consistent(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut w = world();
        place_ranges(&mut w);
        for op in &ops {
            let before = observable_state(&w);
            if let Err(err) = apply(&mut w, op) {
                prop_assert!(err.is_dom_exception(), "{:?} failed with {}", op, err);
                prop_assert_eq!(&before, &observable_state(&w), "failed {:?} mutated state", op);
            }
            check_invariants(&w);
            place_ranges(&mut w);
        }
    }

    #[test]
    fn prop_position_is_antisymmetric(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let mut w = world();
        for op in &ops {
            let _ = apply(&mut w, op);
        }
        let nodes: Vec<NodeId> = w.arena.node_ids().collect();
        for &a in &nodes {
            for &b in &nodes {
                let ab = w.arena.compare_document_position(a, b).unwrap();
                let ba = w.arena.compare_document_position(b, a).unwrap();
                if a == b {
                    prop_assert!(ab.is_same());
                    continue;
                }
                prop_assert!(ab.is_preceding() != ab.is_following());
                prop_assert_eq!(ab.is_preceding(), ba.is_following());
                prop_assert_eq!(
                    ab.contains(DocumentPosition::CONTAINS),
                    ba.contains(DocumentPosition::CONTAINED_BY)
                );
            }
        }
    }

    #[test]
    fn prop_normalize_is_idempotent(parts in prop::collection::vec(prop::option::of("[a-c]{0,3}"), 1..12)) {
        let mut w = world();
        let body = w.pool[2];
        for part in &parts {
            let node = match part {
                Some(text) => w.arena.create_text(w.doc, text).unwrap(),
                None => w.arena.create_element(w.doc, "span").unwrap(),
            };
            w.arena.append_child(body, node).unwrap();
        }
        let expected: String = parts.iter().flatten().cloned().collect();

        w.arena.normalize(body).unwrap();
        let once: Vec<NodeId> = w.arena.children(body).unwrap().iter().collect();
        let texts_once: Vec<Option<String>> = once
            .iter()
            .map(|&id| w.arena.get(id).unwrap().character_data().map(str::to_string))
            .collect();

        w.arena.normalize(body).unwrap();
        let twice: Vec<NodeId> = w.arena.children(body).unwrap().iter().collect();
        prop_assert_eq!(&once, &twice);

        for pair in texts_once.windows(2) {
            prop_assert!(!(pair[0].is_some() && pair[1].is_some()), "adjacent text survived");
        }
        for text in texts_once.iter().flatten() {
            prop_assert!(!text.is_empty());
        }
        prop_assert_eq!(w.arena.text_content(body).unwrap(), Some(expected));
    }
}
