use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a node across all genomes of a run. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

/// Historical marking of an edge: the same structural addition carries the same id in
/// every genome of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InnovationId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for InnovationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Role of a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Input,
    Output,
    Hidden,
}

/// Activation function tag carried by a node. Evaluating networks is left to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Sigmoid,
    Tanh,
    Relu,
    Step,
    Identity,
}

/// A node gene. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    pub id: NodeId,
    pub kind: NodeKind,
    pub activation: Activation,
}

impl NodeGene {
    pub fn input(id: NodeId) -> NodeGene {
        NodeGene { id, kind: NodeKind::Input, activation: Activation::Identity }
    }

    pub fn output(id: NodeId) -> NodeGene {
        NodeGene { id, kind: NodeKind::Output, activation: Activation::Sigmoid }
    }

    pub fn hidden(id: NodeId) -> NodeGene {
        NodeGene { id, kind: NodeKind::Hidden, activation: Activation::Sigmoid }
    }

    pub fn is_input(&self) -> bool {
        self.kind == NodeKind::Input
    }

    pub fn is_output(&self) -> bool {
        self.kind == NodeKind::Output
    }
}

/// A connection gene
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeGene {
    /// The innovation number of that gene
    pub innovation: InnovationId,
    pub source: NodeId,
    pub target: NodeId,
    /// The connection strength
    pub weight: f64,
    /// Disabled edges stay in the genome for alignment but carry no signal.
    pub enabled: bool,
}

impl EdgeGene {
    /// Create a new enabled gene with a specific connection
    pub fn new(innovation: InnovationId, source: NodeId, target: NodeId, weight: f64) -> EdgeGene {
        EdgeGene { innovation, source, target, weight, enabled: true }
    }

    /// Set gene enabled
    pub fn enable(&mut self) {
        self.enabled = true;
    }
    /// Set gene disabled
    pub fn disable(&mut self) {
        self.enabled = false;
    }
    /// Toggle the enable state
    pub fn toggle(&mut self) { self.enabled = !self.enabled; }

    /// The (source, target) pair this gene connects.
    pub fn endpoints(&self) -> (NodeId, NodeId) {
        (self.source, self.target)
    }
}
