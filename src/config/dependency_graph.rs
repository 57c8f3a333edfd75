use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Adjacency-list view of a workflow: each node id maps to the ids that
/// depend on it. The forward representation makes Kahn's algorithm and
/// dependency counting cheap, which is what the runner needs.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph(pub HashMap<String, Vec<String>>);

impl DependencyGraph {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Record that `dependent` consumes `node`'s output.
    pub fn add_edge(&mut self, node: &str, dependent: &str) {
        self.0
            .entry(node.to_string())
            .or_default()
            .push(dependent.to_string());
        self.0.entry(dependent.to_string()).or_default();
    }

    /// Ensure a node exists even if nothing connects to it.
    pub fn add_node(&mut self, node: &str) {
        self.0.entry(node.to_string()).or_default();
    }

    pub fn dependents(&self, node: &str) -> &[String] {
        self.0.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of incoming dependencies per node.
    pub fn dependency_counts(&self) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> =
            self.0.keys().map(|id| (id.clone(), 0)).collect();
        for dependents in self.0.values() {
            for dependent in dependents {
                *counts.entry(dependent.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Reverse mapping: node id -> the ids it depends on. Used when
    /// gathering a node's inputs from its inbound edges.
    pub fn reverse_dependencies(&self) -> HashMap<String, Vec<String>> {
        let mut reverse: HashMap<String, Vec<String>> =
            self.0.keys().map(|id| (id.clone(), Vec::new())).collect();
        for (node, dependents) in &self.0 {
            for dependent in dependents {
                reverse
                    .entry(dependent.clone())
                    .or_default()
                    .push(node.clone());
            }
        }
        reverse
    }

    /// Topological order via Kahn's algorithm, breaking ties
    /// lexicographically so the schedule is deterministic.
    /// Returns `None` when the graph contains a cycle.
    pub fn topological_sort(&self) -> Option<Vec<String>> {
        let mut counts = self.dependency_counts();
        let mut ready: BinaryHeap<Reverse<String>> = counts
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(id, _)| Reverse(id.clone()))
            .collect();

        let mut order = Vec::with_capacity(self.0.len());
        while let Some(Reverse(node)) = ready.pop() {
            if let Some(dependents) = self.0.get(&node) {
                for dependent in dependents {
                    if let Some(count) = counts.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push(Reverse(dependent.clone()));
                        }
                    }
                }
            }
            order.push(node);
        }

        // Any node left unvisited sits on a cycle
        if order.len() == self.0.len() {
            Some(order)
        } else {
            None
        }
    }

    /// Locate one cycle, if any, via DFS colouring. The returned path starts
    /// and ends at the same node, e.g. `["a", "b", "a"]`.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        const UNVISITED: u8 = 0;
        const VISITING: u8 = 1;
        const VISITED: u8 = 2;

        fn dfs<'a>(
            graph: &'a HashMap<String, Vec<String>>,
            node: &'a str,
            state: &mut HashMap<&'a str, u8>,
            path: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            state.insert(node, VISITING);
            path.push(node.to_string());

            if let Some(dependents) = graph.get(node) {
                for next in dependents {
                    match state.get(next.as_str()).copied().unwrap_or(UNVISITED) {
                        VISITING => {
                            // Back edge: slice the current path from the
                            // first occurrence of `next` and close the loop
                            let start = path.iter().position(|n| n == next).unwrap_or(0);
                            let mut cycle: Vec<String> = path[start..].to_vec();
                            cycle.push(next.clone());
                            return Some(cycle);
                        }
                        UNVISITED => {
                            if let Some(cycle) = dfs(graph, next, state, path) {
                                return Some(cycle);
                            }
                        }
                        _ => {}
                    }
                }
            }

            state.insert(node, VISITED);
            path.pop();
            None
        }

        let mut state: HashMap<&str, u8> = HashMap::new();
        for node in self.0.keys() {
            if state.get(node.as_str()).copied().unwrap_or(UNVISITED) == UNVISITED {
                let mut path = Vec::new();
                if let Some(cycle) = dfs(&self.0, node, &mut state, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }
}

impl From<HashMap<String, Vec<String>>> for DependencyGraph {
    fn from(graph: HashMap<String, Vec<String>>) -> Self {
        Self(graph)
    }
}
