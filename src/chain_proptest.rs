#![cfg(test)]

// Property tests kept inside the crate so they can walk sibling chains
// directly instead of inferring them from `is_unique`.

use crate::node::Node;
use crate::Linked;
use proptest::prelude::*;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::ptr::NonNull;
use std::rc::Rc;

const SLOTS: usize = 6;
const NODES: usize = 8;

struct Counted {
    id: usize,
    log: Rc<RefCell<Vec<usize>>>,
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.log.borrow_mut().push(self.id);
    }
}

#[derive(Clone, Debug)]
enum Op {
    Adopt(usize),
    CloneInto(usize, usize),
    Assign(usize, usize),
    Swap(usize, usize),
    Reset(usize),
    ResetTo(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    let slot = 0..SLOTS;
    prop_oneof![
        slot.clone().prop_map(Op::Adopt),
        (slot.clone(), slot.clone()).prop_map(|(s, d)| Op::CloneInto(s, d)),
        (slot.clone(), slot.clone()).prop_map(|(s, d)| Op::Assign(s, d)),
        (slot.clone(), slot.clone()).prop_map(|(a, b)| Op::Swap(a, b)),
        slot.clone().prop_map(Op::Reset),
        slot.prop_map(Op::ResetTo),
    ]
}

fn pair_mut<T>(v: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b);
    if a < b {
        let (lo, hi) = v.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = v.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

// Invariants checked after every step:
// - every chain is a well-formed doubly-linked list;
// - an empty handle carries no node;
// - all handles over one object form exactly one chain;
// - `is_unique` holds iff the object has exactly one owner;
// - an object is dropped exactly once, and only after its last owner left.
fn check(pool: &[Linked<Counted>], adopted: usize, log: &[usize]) -> Result<(), TestCaseError> {
    let mut owners: BTreeMap<usize, usize> = BTreeMap::new();
    for h in pool {
        if let Some(p) = Linked::get(h) {
            *owners.entry(p.id).or_default() += 1;
        }
    }
    for h in pool {
        let Some(node) = Linked::node(h) else {
            // Empty handles carry no node at all.
            prop_assert!(Linked::get(h).is_none());
            prop_assert!(!Linked::is_unique(h));
            continue;
        };
        unsafe { node.assert_valid() };
        let members = unsafe { node.members() }.len();
        match Linked::get(h) {
            None => prop_assert!(false, "empty handle kept a node"),
            Some(p) => {
                let n = owners[&p.id];
                prop_assert_eq!(members, n);
                prop_assert_eq!(Linked::is_unique(h), n == 1);
                prop_assert!(!log.contains(&p.id), "live object {} was dropped", p.id);
            }
        }
    }
    for id in 0..adopted {
        let times = log.iter().filter(|&&x| x == id).count();
        let expected = usize::from(!owners.contains_key(&id));
        prop_assert_eq!(times, expected, "object {} dropped {} times", id, times);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_chains_track_owners(ops in proptest::collection::vec(arb_op(), 1..80)) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut pool: Vec<Linked<Counted>> = (0..SLOTS).map(|_| Linked::empty()).collect();
        let mut adopted = 0;

        for op in ops {
            match op {
                Op::Adopt(d) => {
                    pool[d] = Linked::new(Counted { id: adopted, log: log.clone() });
                    adopted += 1;
                }
                Op::CloneInto(s, d) => {
                    pool[d] = pool[s].clone();
                }
                Op::Assign(s, d) if s == d => {
                    let alias = pool[d].clone();
                    Linked::assign(&mut pool[d], &alias);
                }
                Op::Assign(s, d) => {
                    let (dst, src) = pair_mut(&mut pool, d, s);
                    Linked::assign(dst, src);
                }
                Op::Swap(a, b) if a == b => {}
                Op::Swap(a, b) => {
                    let (x, y) = pair_mut(&mut pool, a, b);
                    crate::swap(x, y);
                }
                Op::Reset(d) => Linked::reset(&mut pool[d]),
                Op::ResetTo(d) => {
                    let fresh = Box::new(Counted { id: adopted, log: log.clone() });
                    Linked::reset_to(&mut pool[d], fresh);
                    adopted += 1;
                }
            }
            check(&pool, adopted, &log.borrow())?;
        }

        drop(pool);
        let log = log.borrow();
        prop_assert_eq!(log.len(), adopted);
        prop_assert_eq!(log.iter().collect::<BTreeSet<_>>().len(), adopted);
    }
}

#[derive(Clone, Debug)]
enum NodeOp {
    Attach(usize, usize),
    Detach(usize),
    Swap(usize, usize),
}

fn arb_node_op() -> impl Strategy<Value = NodeOp> {
    let idx = 0..NODES;
    prop_oneof![
        (idx.clone(), idx.clone()).prop_map(|(a, b)| NodeOp::Attach(a, b)),
        idx.clone().prop_map(NodeOp::Detach),
        (idx.clone(), idx).prop_map(|(a, b)| NodeOp::Swap(a, b)),
    ]
}

// Model: each node carries a group id; a chain is the set of nodes sharing
// an id. Isolated nodes get a group of their own.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_node_ops_match_partition_model(ops in proptest::collection::vec(arb_node_op(), 1..100)) {
        let nodes: [Node; NODES] = core::array::from_fn(|_| Node::new());
        let mut group: Vec<usize> = (0..NODES).collect();
        let mut next_group = NODES;

        for op in ops {
            match op {
                NodeOp::Attach(a, b) => {
                    // Only isolated newcomers may join.
                    if a == b || !nodes[b].is_isolated() {
                        continue;
                    }
                    unsafe { nodes[a].attach(&nodes[b]) };
                    group[b] = group[a];
                }
                NodeOp::Detach(a) => {
                    unsafe { nodes[a].detach() };
                    group[a] = next_group;
                    next_group += 1;
                }
                NodeOp::Swap(a, b) => {
                    unsafe { nodes[a].swap(&nodes[b]) };
                    group.swap(a, b);
                }
            }

            for (i, n) in nodes.iter().enumerate() {
                unsafe { n.assert_valid() };
                let expected: BTreeSet<NonNull<Node>> = (0..NODES)
                    .filter(|&j| group[j] == group[i])
                    .map(|j| NonNull::from(&nodes[j]))
                    .collect();
                prop_assert_eq!(unsafe { n.members() }, expected);
            }
        }
    }
}
