//! Innovation tracking for one evolutionary run.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gene::{InnovationId, NodeId};

/// Registry of every structural change seen during a run.
///
/// Adding an edge between the same two nodes, or splitting the same edge, resolves to the
/// same identifier no matter which genome does it or when. The registry only grows.
///
/// Mutation operators take it as `&mut GeneHistory`, so lookups and inserts are serialized
/// by the borrow checker. Callers mutating genomes from several threads must wrap it in a
/// lock and hold the lock for each whole mutation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneHistory {
    #[serde(with = "edge_entries")]
    edges: BTreeMap<(NodeId, NodeId), InnovationId>,
    splits: BTreeMap<InnovationId, NodeId>,
    next_innovation: u64,
    next_node: u64,
}

impl GeneHistory {
    /// Create the registry of a run whose genomes start fully connected from `inputs` to
    /// `outputs`.
    ///
    /// Node ids `0..inputs` are the inputs, `inputs..inputs + outputs` the outputs. The edge
    /// from input `i` to output `j` carries innovation `i * outputs + j`.
    pub fn new(inputs: usize, outputs: usize) -> Self {
        let mut history = GeneHistory {
            edges: BTreeMap::new(),
            splits: BTreeMap::new(),
            next_innovation: 0,
            next_node: (inputs + outputs) as u64,
        };
        for i in 0..inputs {
            for o in inputs..inputs + outputs {
                history.record_edge_innovation(NodeId(i as u64), NodeId(o as u64));
            }
        }
        history
    }

    /// Innovation id of the edge `source -> target`, minted on first sight.
    pub fn record_edge_innovation(&mut self, source: NodeId, target: NodeId) -> InnovationId {
        let next = &mut self.next_innovation;
        *self.edges.entry((source, target)).or_insert_with(|| {
            let id = InnovationId(*next);
            *next += 1;
            id
        })
    }

    /// Id of the node inserted when the edge `innovation` is split, minted on first sight.
    pub fn record_node_split(&mut self, innovation: InnovationId) -> NodeId {
        let next = &mut self.next_node;
        *self.splits.entry(innovation).or_insert_with(|| {
            let id = NodeId(*next);
            *next += 1;
            id
        })
    }

    /// Get the innovation of the edge from source to target, if it was ever recorded.
    pub fn edge_innovation(&self, source: NodeId, target: NodeId) -> Option<InnovationId> {
        self.edges.get(&(source, target)).copied()
    }

    /// Get the node created by splitting `innovation`, if that ever happened.
    pub fn split_node(&self, innovation: InnovationId) -> Option<NodeId> {
        self.splits.get(&innovation).copied()
    }

    /// The id the next new edge will receive.
    pub fn next_innovation(&self) -> InnovationId {
        InnovationId(self.next_innovation)
    }

    /// The id the next new node will receive.
    pub fn next_node_id(&self) -> NodeId {
        NodeId(self.next_node)
    }

    /// Number of distinct edges recorded so far.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of distinct splits recorded so far.
    pub fn split_count(&self) -> usize {
        self.splits.len()
    }
}

/// Tuple keys have no map representation in most formats; store the edge table as a list.
mod edge_entries {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use crate::gene::{InnovationId, NodeId};

    pub fn serialize<S>(
        map: &BTreeMap<(NodeId, NodeId), InnovationId>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<(NodeId, NodeId), InnovationId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries: Vec<((NodeId, NodeId), InnovationId)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}
