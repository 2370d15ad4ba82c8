//! Mutation operators on a genome.
//!
//! Structural operators never fail: when no valid target exists they leave the genome
//! untouched and return `false`.
use tracing::trace;

use crate::config::MutationConfig;
use crate::gene::{EdgeGene, NodeGene, NodeId};
use crate::genome::Genome;
use crate::history::GeneHistory;
use crate::rng::NeatRng;

impl Genome {
    /// Mutate the genome.
    /// - may add a node in an already existing connection splitting the existing connection into
    ///   two. The old connection is disabled, the connection leading into the node will be
    ///   initialized with weight 1, the connection from the new node will receive the weight of the
    ///   disabled connection.
    /// - may connect two previously disconnected nodes with a random weight
    /// - may toggle the expression of one connection
    /// - may modify the weights of existing connections.
    pub fn mutate(
        &mut self,
        config: &MutationConfig,
        history: &mut GeneHistory,
        rng: &mut NeatRng,
    ) {
        if rng.chance(config.add_node_rate) {
            self.mutate_add_node(history, rng);
        }
        if rng.chance(config.add_edge_rate) {
            self.mutate_add_edge(config, history, rng);
        }
        if rng.chance(config.toggle_edge_rate) {
            self.mutate_toggle_edge(rng);
        }
        self.mutate_weights(config, rng);
    }

    /// Each enabled connection mutates with `weight_mutate_rate`: mostly a Gaussian
    /// perturbation, with `weight_replace_rate` a fresh uniform weight.
    pub fn mutate_weights(&mut self, config: &MutationConfig, rng: &mut NeatRng) {
        for gene in self.edges.values_mut().filter(|e| e.enabled) {
            if !rng.chance(config.weight_mutate_rate) {
                continue;
            }
            if rng.chance(config.weight_replace_rate) {
                gene.weight = rng.symmetric(config.weight_range);
            } else {
                gene.weight += rng.gaussian(0., config.weight_perturb_stddev);
            }
        }
    }

    /// Connect a random pair of not yet connected nodes.
    ///
    /// Inputs never receive connections. With `feed_forward`, outputs never send and no
    /// cycle may be closed. Gives up after `max_add_edge_attempts` rejected pairs.
    pub fn mutate_add_edge(
        &mut self,
        config: &MutationConfig,
        history: &mut GeneHistory,
        rng: &mut NeatRng,
    ) -> bool {
        let sources: Vec<NodeId> = self
            .nodes()
            .filter(|n| !(config.feed_forward && n.is_output()))
            .map(|n| n.id)
            .collect();
        let targets: Vec<NodeId> = self.nodes().filter(|n| !n.is_input()).map(|n| n.id).collect();
        if sources.is_empty() || targets.is_empty() {
            trace!("add-edge skipped: no candidate nodes");
            return false;
        }

        for _ in 0..config.max_add_edge_attempts {
            let source = sources[rng.index(sources.len())];
            let target = targets[rng.index(targets.len())];
            if self.connection(source, target).is_some() {
                continue;
            }
            if config.feed_forward && self.would_create_cycle(source, target) {
                continue;
            }
            let innovation = history.record_edge_innovation(source, target);
            let weight = rng.symmetric(config.weight_range);
            self.edges.insert(innovation, EdgeGene::new(innovation, source, target, weight));
            return true;
        }
        trace!(
            attempts = config.max_add_edge_attempts,
            "add-edge skipped: no free node pair found"
        );
        false
    }

    /// Split a random enabled connection with a new hidden node.
    pub fn mutate_add_node(&mut self, history: &mut GeneHistory, rng: &mut NeatRng) -> bool {
        let enabled: Vec<EdgeGene> = self.edges().filter(|e| e.enabled).copied().collect();
        if enabled.is_empty() {
            trace!("add-node skipped: no enabled connection");
            return false;
        }
        let old = enabled[rng.index(enabled.len())];

        let node = history.record_node_split(old.innovation);
        if self.nodes.contains_key(&node) {
            // this genome split the same connection before and re-enabled it since
            trace!(
                %node,
                innovation = %old.innovation,
                "add-node skipped: split node already present"
            );
            return false;
        }

        if let Some(gene) = self.edges.get_mut(&old.innovation) {
            gene.disable();
        }
        self.nodes.insert(node, NodeGene::hidden(node));

        let head = history.record_edge_innovation(old.source, node);
        let tail = history.record_edge_innovation(node, old.target);
        self.edges.insert(head, EdgeGene::new(head, old.source, node, 1.));
        self.edges.insert(tail, EdgeGene::new(tail, node, old.target, old.weight));
        true
    }

    /// Flip the enabled flag of one random connection.
    pub fn mutate_toggle_edge(&mut self, rng: &mut NeatRng) -> bool {
        if self.edges.is_empty() {
            trace!("toggle skipped: genome has no connections");
            return false;
        }
        let pick = rng.index(self.edges.len());
        if let Some(gene) = self.edges.values_mut().nth(pick) {
            gene.toggle();
        }
        true
    }
}
