//! Turn-restriction lookup keyed by (from-node, via-node), with the
//! re-anchoring operations the graph compressor needs.
//!
//! A `no` entry forbids exactly its target; an `only` entry forbids every
//! other target. When compression deletes a chain node, restrictions whose
//! from/to endpoint was that node are re-anchored to the surviving
//! neighbor so the (from, via, to) semantics are preserved.

use std::collections::{HashMap, HashSet};

use crate::types::{NodeID, TurnRestriction};

#[derive(Debug, Clone, Copy)]
struct RestrictionTarget {
    target: NodeID,
    is_only: bool,
}

pub struct RestrictionMap {
    /// (from, via) -> index into `buckets`.
    index: HashMap<(NodeID, NodeID), usize>,
    buckets: Vec<Vec<RestrictionTarget>>,
    via_nodes: HashSet<NodeID>,
    count: usize,
}

impl RestrictionMap {
    pub fn new(restrictions: &[TurnRestriction]) -> Self {
        let mut map = Self {
            index: HashMap::new(),
            buckets: Vec::new(),
            via_nodes: HashSet::new(),
            count: restrictions.len(),
        };
        for restriction in restrictions {
            map.via_nodes.insert(restriction.via);
            let bucket = map.bucket_for(restriction.from, restriction.via);
            bucket.push(RestrictionTarget {
                target: restriction.to,
                is_only: restriction.is_only(),
            });
        }
        map
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn bucket_for(&mut self, from: NodeID, via: NodeID) -> &mut Vec<RestrictionTarget> {
        let next = self.buckets.len();
        let idx = *self.index.entry((from, via)).or_insert_with(|| {
            next
        });
        if idx == self.buckets.len() {
            self.buckets.push(Vec::new());
        }
        &mut self.buckets[idx]
    }

    /// Is this node the via node of any restriction? Such nodes must stay
    /// real nodes through compression.
    pub fn is_via_node(&self, node: NodeID) -> bool {
        self.via_nodes.contains(&node)
    }

    /// Is the movement `from -> via -> to` forbidden?
    pub fn is_restricted(&self, from: NodeID, via: NodeID, to: NodeID) -> bool {
        let Some(&idx) = self.index.get(&(from, via)) else {
            return false;
        };
        self.buckets[idx].iter().any(|entry| {
            if entry.is_only {
                entry.target != to
            } else {
                entry.target == to
            }
        })
    }

    /// The mandated continuation at `via` coming from `from`, if an `only`
    /// restriction applies there.
    pub fn only_target(&self, from: NodeID, via: NodeID) -> Option<NodeID> {
        let &idx = self.index.get(&(from, via))?;
        self.buckets[idx]
            .iter()
            .find(|entry| entry.is_only)
            .map(|entry| entry.target)
    }

    /// Re-anchor restrictions starting at the deleted node `deleted` via
    /// `via`: their from-node becomes `survivor`.
    pub fn fixup_starting(&mut self, survivor: NodeID, deleted: NodeID, via: NodeID) {
        if let Some(idx) = self.index.remove(&(deleted, via)) {
            let moved = std::mem::take(&mut self.buckets[idx]);
            self.bucket_for(survivor, via).extend(moved);
        }
    }

    /// Re-anchor restrictions arriving at the deleted node `deleted` via
    /// `via`: their target becomes `survivor`.
    pub fn fixup_arriving(&mut self, via: NodeID, deleted: NodeID, survivor: NodeID) {
        for (&(_, entry_via), &idx) in self.index.iter() {
            if entry_via != via {
                continue;
            }
            for entry in &mut self.buckets[idx] {
                if entry.target == deleted {
                    entry.target = survivor;
                }
            }
        }
    }
}
