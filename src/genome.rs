use std::collections::BTreeMap;

use itertools::EitherOrBoth::{self, Both, Left, Right};
use itertools::Itertools;
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};

use crate::compatibility::{Compatibility, DefaultCompatibility};
use crate::config::{MutationConfig, SpeciesConfig};
use crate::error::{NeatError, Result};
use crate::gene::{EdgeGene, InnovationId, NodeGene, NodeId, NodeKind};
use crate::history::GeneHistory;
use crate::rng::NeatRng;

/// The neat genome: node genes keyed by id and connection genes keyed by innovation.
///
/// Node ids `0..inputs` are the inputs, `inputs..inputs + outputs` the outputs, every other
/// node is hidden. Both maps are ordered, so iteration and alignment by innovation number are
/// deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub(crate) nodes: BTreeMap<NodeId, NodeGene>,
    pub(crate) edges: BTreeMap<InnovationId, EdgeGene>,
    n_inputs: usize,
    n_outputs: usize,
    /// Raw fitness, supplied by the caller after evaluation.
    fitness: Option<f64>,
    /// Fitness shared among the members of the genome's species.
    adjusted_fitness: f64,
}

fn invalid<T>(message: String) -> Result<T> {
    Err(NeatError::InvalidGenome(message))
}

impl Genome {
    /// A genome with only its input and output nodes and no edges.
    fn bare(inputs: usize, outputs: usize) -> Genome {
        let nodes = (0..inputs)
            .map(|i| NodeGene::input(NodeId(i as u64)))
            .chain((inputs..inputs + outputs).map(|o| NodeGene::output(NodeId(o as u64))))
            .map(|n| (n.id, n))
            .collect();
        Genome {
            nodes,
            edges: BTreeMap::new(),
            n_inputs: inputs,
            n_outputs: outputs,
            fitness: None,
            adjusted_fitness: 0.,
        }
    }

    /// Initialize a genome with every input connected to every output, weights drawn
    /// uniformly from `config.weight_range`.
    pub fn minimal(
        inputs: usize,
        outputs: usize,
        history: &mut GeneHistory,
        config: &MutationConfig,
        rng: &mut NeatRng,
    ) -> Genome {
        let mut genome = Genome::bare(inputs, outputs);
        for i in 0..inputs {
            for o in inputs..inputs + outputs {
                let (source, target) = (NodeId(i as u64), NodeId(o as u64));
                let innovation = history.record_edge_innovation(source, target);
                let weight = rng.symmetric(config.weight_range);
                genome.edges.insert(innovation, EdgeGene::new(innovation, source, target, weight));
            }
        }
        genome
    }

    /// Assemble a genome from explicit genes, e.g. when restoring a saved run.
    ///
    /// Input and output nodes missing from `nodes` are added. Fails if the genes break a
    /// genome invariant.
    pub fn from_parts(
        inputs: usize,
        outputs: usize,
        nodes: impl IntoIterator<Item = NodeGene>,
        edges: impl IntoIterator<Item = EdgeGene>,
    ) -> Result<Genome> {
        if inputs == 0 || outputs == 0 {
            return Err(NeatError::InvalidTopology { inputs, outputs });
        }
        let mut genome = Genome::bare(inputs, outputs);
        for node in nodes {
            genome.nodes.insert(node.id, node);
        }
        for edge in edges {
            if genome.edges.insert(edge.innovation, edge).is_some() {
                return invalid(format!("duplicate innovation {}", edge.innovation));
            }
        }
        genome.validate()?;
        Ok(genome)
    }

    /// Check the structural invariants: input/output nodes in place, every edge endpoint
    /// present, no edge into an input and no two edges between the same pair of nodes.
    pub fn validate(&self) -> Result<()> {
        for (index, id) in (0..self.n_inputs + self.n_outputs).map(|i| (i, NodeId(i as u64))) {
            let expected = if index < self.n_inputs { NodeKind::Input } else { NodeKind::Output };
            match self.nodes.get(&id) {
                Some(node) if node.kind == expected => {}
                _ => return invalid(format!("node {id} must be an {expected:?} node")),
            }
        }
        for (id, node) in &self.nodes {
            if *id != node.id {
                return invalid(format!("node {} stored under {id}", node.id));
            }
            if node.kind != NodeKind::Hidden && id.0 >= (self.n_inputs + self.n_outputs) as u64 {
                return invalid(format!("node {id} must be hidden"));
            }
        }
        let mut pairs = std::collections::BTreeSet::new();
        for (innovation, edge) in &self.edges {
            if *innovation != edge.innovation {
                return invalid(format!("edge {} stored under {innovation}", edge.innovation));
            }
            for endpoint in [edge.source, edge.target] {
                if !self.nodes.contains_key(&endpoint) {
                    return invalid(format!("edge {innovation} references missing node {endpoint}"));
                }
            }
            if self.nodes[&edge.target].is_input() {
                return invalid(format!("edge {innovation} leads into input {}", edge.target));
            }
            if !pairs.insert(edge.endpoints()) {
                return Err(NeatError::InvalidGenome(format!(
                    "edge {innovation} duplicates connection {} -> {}",
                    edge.source, edge.target
                )));
            }
        }
        Ok(())
    }

    /// Node genes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeGene> + '_ {
        self.nodes.values()
    }

    /// Connection genes in ascending innovation order.
    pub fn edges(&self) -> impl Iterator<Item = &EdgeGene> + '_ {
        self.edges.values()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeGene> {
        self.nodes.get(&id)
    }

    pub fn edge(&self, innovation: InnovationId) -> Option<&EdgeGene> {
        self.edges.get(&innovation)
    }

    /// Get the connection between given source and target node, enabled or not.
    pub fn connection(&self, source: NodeId, target: NodeId) -> Option<&EdgeGene> {
        self.edges.values().find(|e| e.source == source && e.target == target)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The number of input or sensor nodes.
    pub fn input_count(&self) -> usize {
        self.n_inputs
    }

    /// The number of output nodes.
    pub fn output_count(&self) -> usize {
        self.n_outputs
    }

    /// Largest innovation number of the genome, `None` without edges.
    pub fn max_innovation(&self) -> Option<InnovationId> {
        self.edges.keys().next_back().copied()
    }

    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = Some(fitness);
    }

    pub fn clear_fitness(&mut self) {
        self.fitness = None;
        self.adjusted_fitness = 0.;
    }

    pub fn adjusted_fitness(&self) -> f64 {
        self.adjusted_fitness
    }

    pub(crate) fn set_adjusted_fitness(&mut self, adjusted: f64) {
        self.adjusted_fitness = adjusted;
    }

    /// Walk the connection genes of both genomes side by side in innovation order.
    pub fn align<'a>(
        &'a self,
        other: &'a Genome,
    ) -> impl Iterator<Item = EitherOrBoth<&'a EdgeGene, &'a EdgeGene>> + 'a {
        self.edges
            .values()
            .merge_join_by(other.edges.values(), |a, b| a.innovation.cmp(&b.innovation))
    }

    /// Genetic distance to `other` under the coefficients of `config`.
    pub fn distance(&self, other: &Genome, config: &SpeciesConfig) -> f64 {
        DefaultCompatibility::from(config).distance(self, other)
    }

    /// Whether an edge `source -> target` would close a cycle. Disabled edges count, since
    /// they may be re-enabled later.
    pub fn would_create_cycle(&self, source: NodeId, target: NodeId) -> bool {
        if source == target {
            return true;
        }
        let mut graph: DiGraphMap<NodeId, ()> =
            DiGraphMap::from_edges(self.edges.values().map(|e| (e.source, e.target)));
        graph.add_node(source);
        graph.add_node(target);
        has_path_connecting(&graph, target, source, None)
    }

    /// Insert `edge`, copying the node genes it needs from `donors`. Skips edges whose
    /// connection already exists or that would break the feed-forward constraint.
    fn inherit(&mut self, edge: EdgeGene, donors: [&Genome; 2], feed_forward: bool) -> bool {
        if self.edges.contains_key(&edge.innovation)
            || self.connection(edge.source, edge.target).is_some()
        {
            return false;
        }
        if feed_forward && self.would_create_cycle(edge.source, edge.target) {
            return false;
        }
        for id in [edge.source, edge.target] {
            if !self.nodes.contains_key(&id) {
                let node = donors
                    .iter()
                    .find_map(|g| g.node(id).copied())
                    .unwrap_or_else(|| NodeGene::hidden(id));
                self.nodes.insert(id, node);
            }
        }
        self.edges.insert(edge.innovation, edge);
        true
    }

    /// Mate two genomes, aligning their genes by innovation number.
    ///
    /// Matching genes come from either parent with equal chance. Disjoint and excess genes
    /// come from the fitter parent; with equal fitness each one is inherited from either
    /// parent with `config.disjoint_inherit_rate`. A missing fitness counts as 0.
    pub fn crossover(&self, other: &Genome, config: &MutationConfig, rng: &mut NeatRng) -> Genome {
        let own = self.fitness.unwrap_or(0.);
        let theirs = other.fitness.unwrap_or(0.);
        let equal = own == theirs;
        let (fitter, weaker) = if theirs > own { (other, self) } else { (self, other) };

        let mut child = Genome::bare(fitter.n_inputs, fitter.n_outputs);
        let mut weaker_only = Vec::new();
        for pair in fitter.align(weaker) {
            match pair {
                Both(a, b) => {
                    let mut gene = if rng.chance(0.5) { *a } else { *b };
                    if !(a.enabled && b.enabled) {
                        gene.enabled = rng.chance(config.reenable_rate);
                    }
                    child.inherit(gene, [fitter, weaker], false);
                }
                Left(a) => {
                    if !equal || rng.chance(config.disjoint_inherit_rate) {
                        child.inherit(*a, [fitter, weaker], false);
                    }
                }
                Right(b) => {
                    if equal && rng.chance(config.disjoint_inherit_rate) {
                        weaker_only.push(*b);
                    }
                }
            }
        }
        // genes unique to the other parent go last so the cycle check sees the whole
        // structure taken from the first one
        for gene in weaker_only {
            child.inherit(gene, [weaker, fitter], config.feed_forward);
        }
        child
    }
}


#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::test_support::{genome, with_fitness};
    use super::*;

    #[test]
    fn new_genome_should_be_fully_connected() {
        let mut history = GeneHistory::new(3, 2);
        let config = MutationConfig::default();
        let g = Genome::minimal(3, 2, &mut history, &config, &mut NeatRng::new(1));
        assert_eq!(g.node_count(), 5);
        assert_eq!(g.edge_count(), 6);
        for i in 0..3 {
            for o in 3..5 {
                assert!(g.connection(NodeId(i), NodeId(o)).is_some());
            }
        }
        g.validate().unwrap();
    }

    #[test]
    fn two_new_genomes_should_be_fully_aligned() {
        let mut history = GeneHistory::new(3, 3);
        let mut rng = NeatRng::new(2);
        let g1 = Genome::minimal(3, 3, &mut history, &MutationConfig::default(), &mut rng);
        let g2 = Genome::minimal(3, 3, &mut history, &MutationConfig::default(), &mut rng);
        assert_eq!(g1.align(&g2).filter(|p| p.is_both()).count(), 9);
        assert_eq!(history.edge_count(), 9);
    }

    #[test]
    fn from_parts_rejects_dangling_edges() {
        let edges = [EdgeGene::new(InnovationId(0), NodeId(0), NodeId(7), 1.)];
        let err = Genome::from_parts(1, 1, Vec::new(), edges).unwrap_err();
        assert!(matches!(err, NeatError::InvalidGenome(_)));
    }

    #[test]
    fn from_parts_rejects_duplicate_connections() {
        let edges = [
            EdgeGene::new(InnovationId(0), NodeId(0), NodeId(1), 1.),
            EdgeGene::new(InnovationId(1), NodeId(0), NodeId(1), 1.),
        ];
        assert!(Genome::from_parts(1, 1, Vec::new(), edges).is_err());
    }

    #[test]
    fn from_parts_rejects_edges_into_inputs() {
        let edges = [EdgeGene::new(InnovationId(0), NodeId(1), NodeId(0), 1.)];
        assert!(Genome::from_parts(1, 1, Vec::new(), edges).is_err());
    }

    #[test]
    fn cycles_are_detected_through_disabled_edges() {
        let mut g = genome(1, 1, &[(0, 0, 1, 1.), (1, 0, 2, 1.), (2, 2, 1, 1.)]);
        assert!(g.would_create_cycle(NodeId(1), NodeId(2)));
        assert!(!g.would_create_cycle(NodeId(2), NodeId(1)));
        g.edges.get_mut(&InnovationId(2)).unwrap().disable();
        assert!(g.would_create_cycle(NodeId(1), NodeId(2)));
        assert!(g.would_create_cycle(NodeId(2), NodeId(2)));
    }

    #[test]
    fn crossover_takes_unmatched_genes_from_the_fitter_parent() {
        let a = with_fitness(
            genome(
                2,
                1,
                &[(1, 0, 2, 1.), (2, 1, 2, 1.), (3, 0, 3, 1.), (4, 3, 2, 1.), (7, 1, 3, 1.)],
            ),
            5.,
        );
        let b = with_fitness(
            genome(
                2,
                1,
                &[(1, 0, 2, -1.), (2, 1, 2, -1.), (3, 0, 3, -1.), (5, 0, 4, -1.), (6, 4, 2, -1.)],
            ),
            2.,
        );
        let shared: BTreeSet<InnovationId> = [1, 2, 3].into_iter().map(InnovationId).collect();
        let config = MutationConfig::default();
        let mut rng = NeatRng::new(42);
        for _ in 0..50 {
            for child in [a.crossover(&b, &config, &mut rng), b.crossover(&a, &config, &mut rng)] {
                child.validate().unwrap();
                assert_eq!(child.fitness(), None);
                let innovations: BTreeSet<InnovationId> =
                    child.edges().map(|e| e.innovation).collect();
                let expected: BTreeSet<InnovationId> = a.edges().map(|e| e.innovation).collect();
                assert_eq!(innovations, expected);
                for edge in child.edges().filter(|e| !shared.contains(&e.innovation)) {
                    assert_eq!(edge, a.edge(edge.innovation).unwrap());
                }
                assert!(child.node(NodeId(4)).is_none());
            }
        }
    }

    #[test]
    fn crossover_picks_matching_genes_from_both_parents() {
        let a = with_fitness(genome(2, 1, &[(0, 0, 2, 1.), (1, 1, 2, 1.)]), 1.);
        let b = with_fitness(genome(2, 1, &[(0, 0, 2, 2.), (1, 1, 2, 2.)]), 1.);
        let config = MutationConfig::default();
        let mut rng = NeatRng::new(9);
        let weights: BTreeSet<u64> = (0..100)
            .flat_map(|_| {
                let child = a.crossover(&b, &config, &mut rng);
                child.edges().map(|e| e.weight as u64).collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(weights, [1, 2].into_iter().collect());
    }

    #[test]
    fn crossover_of_equal_parents_can_inherit_from_both() {
        let a = with_fitness(genome(1, 1, &[(0, 0, 1, 1.), (1, 0, 2, 1.), (2, 2, 1, 1.)]), 3.);
        let b = with_fitness(genome(1, 1, &[(0, 0, 1, 1.), (3, 0, 3, 1.), (4, 3, 1, 1.)]), 3.);
        let config = MutationConfig { disjoint_inherit_rate: 1.0, ..MutationConfig::default() };
        let child = a.crossover(&b, &config, &mut NeatRng::new(4));
        child.validate().unwrap();
        assert_eq!(child.edge_count(), 5);
        assert_eq!(child.node_count(), 4);

        let config = MutationConfig { disjoint_inherit_rate: 0.0, ..MutationConfig::default() };
        let child = a.crossover(&b, &config, &mut NeatRng::new(4));
        assert_eq!(child.edge_count(), 1);
        assert_eq!(child.node_count(), 2);
    }

    #[test]
    fn crossover_of_equal_parents_never_closes_a_cycle() {
        // a: 0 -> 2 -> 3 -> 1, b: 0 -> 3 -> 2 -> 1
        let a = with_fitness(genome(1, 1, &[(0, 0, 2, 1.), (1, 2, 3, 1.), (2, 3, 1, 1.)]), 1.);
        let b = with_fitness(genome(1, 1, &[(3, 0, 3, 1.), (4, 3, 2, 1.), (5, 2, 1, 1.)]), 1.);
        let config = MutationConfig {
            disjoint_inherit_rate: 1.0,
            feed_forward: true,
            ..MutationConfig::default()
        };
        let child = a.crossover(&b, &config, &mut NeatRng::new(0));
        child.validate().unwrap();
        assert!(child.edge(InnovationId(1)).is_some());
        assert!(child.edge(InnovationId(4)).is_none());
    }

    #[test]
    fn disabled_matching_genes_are_mostly_kept_disabled() {
        let a = with_fitness(genome(1, 1, &[(0, 0, 1, 1.)]), 1.);
        let mut b = with_fitness(genome(1, 1, &[(0, 0, 1, 1.)]), 1.);
        b.edges.get_mut(&InnovationId(0)).unwrap().disable();
        let config = MutationConfig { reenable_rate: 0.0, ..MutationConfig::default() };
        let mut rng = NeatRng::new(1);
        for _ in 0..20 {
            assert!(!a.crossover(&b, &config, &mut rng).edge(InnovationId(0)).unwrap().enabled);
        }
        let config = MutationConfig { reenable_rate: 1.0, ..MutationConfig::default() };
        assert!(a.crossover(&b, &config, &mut rng).edge(InnovationId(0)).unwrap().enabled);
    }

    #[test]
    fn distance_uses_species_coefficients() {
        let g1 = genome(2, 1, &[(0, 0, 2, 1.)]);
        let g2 = genome(2, 1, &[(0, 0, 2, 1.), (1, 1, 2, 1.)]);
        let config = SpeciesConfig { excess_coefficient: 2.5, ..SpeciesConfig::default() };
        assert_eq!(g1.distance(&g2, &config), 2.5);
    }
}
