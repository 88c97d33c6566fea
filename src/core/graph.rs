use std::collections::{HashMap, HashSet};

use crate::error::{OrchestratorError, Result};

/// Directed acyclic graph of allowed data flow between services.
///
/// Nodes are service names. By default a node may have at most one successor,
/// which keeps every pipeline a simple chain. [`allow_branching`](Self::allow_branching)
/// lifts that restriction for graphs whose consumers can handle fan-out.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: Vec<String>,
    successors: HashMap<String, Vec<String>>,
    predecessors: HashMap<String, Vec<String>>,
    allow_branching: bool,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permits nodes with more than one outgoing edge.
    pub fn allow_branching(mut self) -> Self {
        self.allow_branching = true;
        self
    }

    pub fn branching_allowed(&self) -> bool {
        self.allow_branching
    }

    /// Declares a node. Declaring the same node twice is a no-op.
    pub fn add_node(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.successors.contains_key(&name) {
            self.successors.insert(name.clone(), Vec::new());
            self.predecessors.insert(name.clone(), Vec::new());
            self.nodes.push(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.successors.contains_key(name)
    }

    pub fn successors(&self, name: &str) -> &[String] {
        self.successors.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, name: &str) -> &[String] {
        self.predecessors.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All edges, grouped by source in node declaration order.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.nodes
            .iter()
            .flat_map(|from| {
                self.successors(from)
                    .iter()
                    .map(move |to| (from.as_str(), to.as_str()))
            })
            .collect()
    }

    /// Adds `from -> to`.
    ///
    /// Every check runs before the graph is touched, so a rejected edge leaves
    /// the graph exactly as it was.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        for name in [from, to] {
            if !self.contains(name) {
                return Err(OrchestratorError::UnknownService(name.to_string()));
            }
        }

        if self.successors(from).iter().any(|s| s == to) {
            log::warn!("Edge {} -> {} was already declared, ignoring.", from, to);
            return Ok(());
        }

        if from == to || self.reaches(to, from) {
            return Err(OrchestratorError::Cycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        if !self.allow_branching && !self.successors(from).is_empty() {
            let mut successors = self.successors(from).to_vec();
            successors.push(to.to_string());
            return Err(OrchestratorError::AmbiguousFlow {
                stage: from.to_string(),
                successors,
            });
        }

        log::debug!("Adding flow edge {} -> {}", from, to);
        if let Some(succ) = self.successors.get_mut(from) {
            succ.push(to.to_string());
        }
        if let Some(pred) = self.predecessors.get_mut(to) {
            pred.push(from.to_string());
        }
        Ok(())
    }

    /// Whether `target` can be reached from `start` by following edges.
    pub fn reaches(&self, start: &str, target: &str) -> bool {
        self.reachable_from(start).contains(target)
    }

    fn reachable_from(&self, start: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack = vec![start.to_string()];
        while let Some(node) = stack.pop() {
            if seen.insert(node.clone()) {
                stack.extend(self.successors(&node).iter().cloned());
            }
        }
        seen
    }

    /// Nodes reachable from `entry`, sources before sinks.
    ///
    /// An isolated node is a valid single-stage pipeline. A node that only
    /// receives data (a sink of some longer chain) is not a pipeline entry.
    pub fn topological_order(&self, entry: &str) -> Result<Vec<String>> {
        if !self.contains(entry) {
            return Err(OrchestratorError::UnknownService(entry.to_string()));
        }
        if self.successors(entry).is_empty() {
            if !self.predecessors(entry).is_empty() {
                return Err(OrchestratorError::DisconnectedPipeline(entry.to_string()));
            }
            return Ok(vec![entry.to_string()]);
        }

        let reachable = self.reachable_from(entry);

        // Kahn's algorithm restricted to the reachable subgraph; ties are broken
        // by declaration order so the result is deterministic.
        let mut in_degree: HashMap<&str, usize> = reachable
            .iter()
            .map(|node| {
                let degree = self
                    .predecessors(node)
                    .iter()
                    .filter(|p| reachable.contains(*p))
                    .count();
                (node.as_str(), degree)
            })
            .collect();

        let mut order = Vec::with_capacity(reachable.len());
        let mut ready: Vec<&str> = vec![entry];
        while let Some(node) = ready.pop() {
            order.push(node.to_string());
            let mut released = Vec::new();
            for succ in self.successors(node) {
                if let Some(degree) = in_degree.get_mut(succ.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        released.push(succ.as_str());
                    }
                }
            }
            // `ready` is a stack, push in reverse declaration order
            released.sort_by_key(|n| std::cmp::Reverse(self.position(n)));
            ready.extend(released);
        }
        Ok(order)
    }

    /// Like [`topological_order`](Self::topological_order) but insists on a
    /// simple chain, which is all the executor can run.
    pub fn chain(&self, entry: &str) -> Result<Vec<String>> {
        let order = self.topological_order(entry)?;
        for stage in &order {
            let successors = self.successors(stage);
            if successors.len() > 1 {
                return Err(OrchestratorError::AmbiguousFlow {
                    stage: stage.clone(),
                    successors: successors.to_vec(),
                });
            }
        }
        Ok(order)
    }

    fn position(&self, name: &str) -> usize {
        self.nodes
            .iter()
            .position(|n| n == name)
            .unwrap_or(usize::MAX)
    }
}
