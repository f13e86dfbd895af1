//! Dependency graph: edges from constructor signatures, cycle detection,
//! topological order (spec §4.2).

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use crate::descriptor::{resolve_capability, CapabilityResolution, ComponentDescriptor, ComponentKey, DependencyKind};

/// An immutable (once the graph is frozen) edge from one component to a
/// required type (spec §3 "Dependency edge").
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub from: ComponentKey,
    pub to: ComponentKey,
    pub parameter_name: String,
    pub optional: bool,
    pub lazy: bool,
}

struct Node {
    key: ComponentKey,
    insertion_index: usize,
}

/// Built once per container bootstrap from the component manifest; never
/// mutated after `DependencyGraph::build` returns (spec §3: "immutable once
/// graph is frozen").
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index_of: HashMap<ComponentKey, usize>,
    /// Outgoing edges per node index, restricted to edges whose target
    /// resolves to a known node. A capability-typed dependency resolves to
    /// its single implementor (or its primary-marked one, if ambiguous); a
    /// well-known property resolves to a descriptor registered under that
    /// same name; either failing to resolve leaves no edge and is reported
    /// separately by the validator rather than here, so an unresolved
    /// dependency never collapses the whole graph into one false cycle.
    outgoing: Vec<Vec<DependencyEdge>>,
}

impl DependencyGraph {
    pub fn build(descriptors: &[ComponentDescriptor]) -> Self {
        let mut nodes = Vec::with_capacity(descriptors.len());
        let mut index_of = HashMap::with_capacity(descriptors.len());
        for d in descriptors {
            index_of.insert(d.key.clone(), nodes.len());
            nodes.push(Node {
                key: d.key.clone(),
                insertion_index: d.insertion_index,
            });
        }

        let mut outgoing = vec![Vec::new(); nodes.len()];
        for d in descriptors {
            let from_idx = index_of[&d.key];
            for dep in &d.dependencies {
                let target = match &dep.kind {
                    DependencyKind::Type(required_type) => {
                        index_of.contains_key(required_type).then(|| required_type.clone())
                    }
                    DependencyKind::FeatureProvided { required_type, .. } => {
                        index_of.contains_key(required_type).then(|| required_type.clone())
                    }
                    DependencyKind::WellKnownProperty(name) => {
                        let key = ComponentKey::new(name.clone());
                        index_of.contains_key(&key).then_some(key)
                    }
                    DependencyKind::Capability(capability) => match resolve_capability(descriptors, capability) {
                        CapabilityResolution::Unique(key) => Some(key),
                        CapabilityResolution::Missing | CapabilityResolution::Ambiguous => None,
                    },
                };

                if let Some(to) = target {
                    outgoing[from_idx].push(DependencyEdge {
                        from: d.key.clone(),
                        to,
                        parameter_name: dep.parameter_name.clone(),
                        optional: dep.optional,
                        lazy: dep.lazy,
                    });
                }
            }
        }

        Self {
            nodes,
            index_of,
            outgoing,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edges_from(&self, key: &ComponentKey) -> &[DependencyEdge] {
        match self.index_of.get(key) {
            Some(&idx) => &self.outgoing[idx],
            None => &[],
        }
    }

    /// Components with zero outgoing edges (spec §4.2 `getLeafComponents`).
    pub fn leaf_components(&self) -> Vec<ComponentKey> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.outgoing[*idx].is_empty())
            .map(|(_, n)| n.key.clone())
            .collect()
    }

    /// Depth-first cycle detection. Records the current path and reports
    /// every back-edge encountered as a cycle (in member order), then
    /// keeps searching so independent cycles elsewhere in the graph are
    /// also reported (spec §4.2, testable property 2).
    pub fn detect_cycles(&self) -> Vec<Vec<ComponentKey>> {
        #[derive(PartialEq, Clone, Copy)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color = vec![Color::White; self.nodes.len()];
        let mut path: Vec<usize> = Vec::new();
        let mut cycles = Vec::new();

        fn visit(
            idx: usize,
            graph: &DependencyGraph,
            color: &mut [Color],
            path: &mut Vec<usize>,
            cycles: &mut Vec<Vec<ComponentKey>>,
        ) {
            color[idx] = Color::Gray;
            path.push(idx);

            for edge in &graph.outgoing[idx] {
                let next = graph.index_of[&edge.to];
                match color[next] {
                    Color::White => visit(next, graph, color, path, cycles),
                    Color::Gray => {
                        let start = path.iter().position(|&n| n == next).unwrap_or(0);
                        let cycle = path[start..]
                            .iter()
                            .map(|&n| graph.nodes[n].key.clone())
                            .collect();
                        cycles.push(cycle);
                    }
                    Color::Black => {}
                }
            }

            path.pop();
            color[idx] = Color::Black;
        }

        for idx in 0..self.nodes.len() {
            if color[idx] == Color::White {
                visit(idx, self, &mut color, &mut path, &mut cycles);
            }
        }

        cycles
    }

    /// Kahn's algorithm, tie-broken by declared insertion order for
    /// determinism (spec §4.2). `Err` carries the cycles blocking a full
    /// order (already found via [`detect_cycles`]).
    pub fn topological_order(&self) -> Result<Vec<ComponentKey>, Vec<Vec<ComponentKey>>> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        for edges in &self.outgoing {
            for edge in edges {
                in_degree[self.index_of[&edge.to]] += 1;
            }
        }

        // in_degree above counts "this node is depended upon by"; Kahn's
        // needs in-degree counting *incoming* edges to a node, i.e. how
        // many dependencies *it* has outstanding. Our edges point
        // from-depends-on-to, so a node's in-degree for Kahn's purposes is
        // its own outgoing edge count (number of unresolved dependencies).
        let mut remaining: Vec<usize> = self.outgoing.iter().map(|e| e.len()).collect();

        // Reverse adjacency: for node `to`, which nodes (`from`) are waiting
        // on it.
        let mut waiters: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (from_idx, edges) in self.outgoing.iter().enumerate() {
            for edge in edges {
                waiters[self.index_of[&edge.to]].push(from_idx);
            }
        }

        let mut ready: Vec<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
        ready.sort_by_key(|&i| self.nodes[i].insertion_index);

        let mut order = Vec::with_capacity(n);
        let mut processed = vec![false; n];

        while !ready.is_empty() {
            let idx = ready.remove(0);
            if processed[idx] {
                continue;
            }
            processed[idx] = true;
            order.push(self.nodes[idx].key.clone());

            let mut newly_ready = Vec::new();
            for &waiter in &waiters[idx] {
                remaining[waiter] -= 1;
                if remaining[waiter] == 0 {
                    newly_ready.push(waiter);
                }
            }
            newly_ready.sort_by_key(|&i| self.nodes[i].insertion_index);
            // Insert newly-ready nodes keeping overall ascending
            // insertion-index ordering among currently-ready nodes.
            for w in newly_ready {
                ready.push(w);
            }
            ready.sort_by_key(|&i| self.nodes[i].insertion_index);
        }

        if order.len() != n {
            Err(self.detect_cycles())
        } else {
            Ok(order)
        }
    }

    /// `1 + max(group of each dependency)`, with a re-entrancy guard that
    /// returns 0 for a component participating in a cycle that would
    /// otherwise recurse forever (spec §4.2).
    pub fn instantiation_group(&self, key: &ComponentKey) -> usize {
        let mut visiting = HashSet::new();
        self.instantiation_group_inner(key, &mut visiting)
    }

    fn instantiation_group_inner(&self, key: &ComponentKey, visiting: &mut HashSet<ComponentKey>) -> usize {
        if !visiting.insert(key.clone()) {
            return 0;
        }
        let edges = self.edges_from(key);
        let group = if edges.is_empty() {
            0
        } else {
            1 + edges
                .iter()
                .map(|e| self.instantiation_group_inner(&e.to, visiting))
                .max()
                .unwrap_or(0)
        };
        visiting.remove(key);
        group
    }

    /// Human-readable render of every node and its edges, for diagnostics.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            let edges = self.edges_from(&node.key);
            if edges.is_empty() {
                let _ = writeln!(out, "{} (leaf)", node.key);
            } else {
                let deps: Vec<String> = edges
                    .iter()
                    .map(|e| {
                        format!(
                            "{}{}",
                            e.to,
                            if e.optional { "?" } else { "" }
                        )
                    })
                    .collect();
                let _ = writeln!(out, "{} -> [{}]", node.key, deps.join(", "));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ComponentBuilder;

    fn component(key: &str, deps: &[&str]) -> ComponentDescriptor {
        let mut builder = ComponentBuilder::with_key(ComponentKey::new(key));
        for dep in deps {
            builder = builder.depends_on(*dep, ComponentKey::new(*dep));
        }
        builder.build(|_| Ok(Box::new(())))
    }

    /// S1: A(B, C), B(C), C() -> topological order [C, B, A].
    #[test]
    fn s1_topological_order_respects_dependencies() {
        let descriptors = vec![
            component("A", &["B", "C"]),
            component("B", &["C"]),
            component("C", &[]),
        ];
        let graph = DependencyGraph::build(&descriptors);
        let order = graph.topological_order().expect("acyclic graph sorts");
        let names: Vec<_> = order.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["C", "B", "A"]);

        for edges in [graph.edges_from(&ComponentKey::new("A")), graph.edges_from(&ComponentKey::new("B"))] {
            for edge in edges {
                let pos_from = names.iter().position(|n| n == edge.from.as_str());
                let pos_to = names.iter().position(|n| n == edge.to.as_str());
                assert!(pos_to < pos_from, "dependency must come before dependent");
            }
        }
    }

    /// S2: A(B), B(C), C(A) -> one CircularDependency with cycle [A, B, C].
    #[test]
    fn s2_cycle_is_reported_with_full_path() {
        let descriptors = vec![
            component("A", &["B"]),
            component("B", &["C"]),
            component("C", &["A"]),
        ];
        let graph = DependencyGraph::build(&descriptors);
        let result = graph.topological_order();
        assert!(result.is_err());

        let cycles = result.unwrap_err();
        assert_eq!(cycles.len(), 1);
        let names: Vec<_> = cycles[0].iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn leaf_components_have_no_outgoing_edges() {
        let descriptors = vec![component("A", &["B"]), component("B", &[])];
        let graph = DependencyGraph::build(&descriptors);
        let leaves: Vec<_> = graph.leaf_components().iter().map(|k| k.to_string()).collect();
        assert_eq!(leaves, vec!["B"]);
    }

    #[test]
    fn instantiation_group_increases_with_depth() {
        let descriptors = vec![
            component("A", &["B", "C"]),
            component("B", &["C"]),
            component("C", &[]),
        ];
        let graph = DependencyGraph::build(&descriptors);
        assert_eq!(graph.instantiation_group(&ComponentKey::new("C")), 0);
        assert_eq!(graph.instantiation_group(&ComponentKey::new("B")), 1);
        assert_eq!(graph.instantiation_group(&ComponentKey::new("A")), 2);
    }

    #[test]
    fn instantiation_group_guards_against_cycles() {
        let descriptors = vec![component("A", &["B"]), component("B", &["A"])];
        let graph = DependencyGraph::build(&descriptors);
        assert_eq!(graph.instantiation_group(&ComponentKey::new("A")), 0);
    }

    #[test]
    fn topological_order_ties_broken_by_insertion_order() {
        // Both B and C depend on nothing and are ready simultaneously;
        // insertion order is B, C, so B must come first.
        let descriptors = vec![
            component("B", &[]),
            component("C", &[]),
            component("A", &["B", "C"]),
        ];
        let graph = DependencyGraph::build(&descriptors);
        let order = graph.topological_order().unwrap();
        let names: Vec<_> = order.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["B", "C", "A"]);
    }

    #[test]
    fn capability_dependency_becomes_an_edge_to_its_single_implementor() {
        let descriptors = vec![
            ComponentBuilder::with_key(ComponentKey::new("Notifier"))
                .capability("Notifier")
                .build(|_| Ok(Box::new(()))),
            ComponentBuilder::with_key(ComponentKey::new("App"))
                .depends_on_capability("notifier", "Notifier")
                .build(|_| Ok(Box::new(()))),
        ];
        let graph = DependencyGraph::build(&descriptors);
        let edges = graph.edges_from(&ComponentKey::new("App"));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to, ComponentKey::new("Notifier"));
    }

    #[test]
    fn ambiguous_capability_dependency_adds_no_edge() {
        let descriptors = vec![
            ComponentBuilder::with_key(ComponentKey::new("a"))
                .capability("Notifier")
                .build(|_| Ok(Box::new(()))),
            ComponentBuilder::with_key(ComponentKey::new("b"))
                .capability("Notifier")
                .build(|_| Ok(Box::new(()))),
            ComponentBuilder::with_key(ComponentKey::new("App"))
                .depends_on_capability("notifier", "Notifier")
                .build(|_| Ok(Box::new(()))),
        ];
        let graph = DependencyGraph::build(&descriptors);
        assert!(graph.edges_from(&ComponentKey::new("App")).is_empty());
    }

    #[test]
    fn well_known_property_dependency_becomes_an_edge_when_registered() {
        let descriptors = vec![
            ComponentBuilder::with_key(ComponentKey::new("Clock")).build(|_| Ok(Box::new(()))),
            ComponentBuilder::with_key(ComponentKey::new("App"))
                .depends_on_well_known_property("clock", "Clock")
                .build(|_| Ok(Box::new(()))),
        ];
        let graph = DependencyGraph::build(&descriptors);
        let edges = graph.edges_from(&ComponentKey::new("App"));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to, ComponentKey::new("Clock"));
    }
}
