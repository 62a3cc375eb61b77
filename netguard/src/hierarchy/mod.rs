//! Instantiation hierarchy
//!
//! Per-instance results (bubble ranges, clock trees, gated flags) are keyed
//! by [`HierarchyPath`]: the canonical labels of the subcircuit instances
//! walked from the top. Definitions themselves are built once each.

pub mod bubbles;
pub mod clock;
pub mod gated;

pub use bubbles::{
    BubbleAllocator, BubbleCounts, BubbleInformationContainer, BubbleMap, BubbleRange,
    MappableResource,
};
pub use clock::{
    ClockAnalysis, ClockSourceContainer, ClockTiming, ClockTree, ClockTreeAnalyzer,
    ClockTreeContainer,
};
pub use gated::{GatedClockDetector, GatedClockReport};

use crate::design::{ComponentId, ComponentKind, Design};
use crate::netlist::{Netlist, NetlistError};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HierarchyPath(Vec<String>);

impl HierarchyPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, label: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(label.to_string());
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for HierarchyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl Serialize for HierarchyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Definitions reachable from the top, with an edge per subcircuit
/// instance (parent -> child, weighted by the instance id).
#[derive(Debug, Clone)]
pub struct InstanceTree {
    graph: DiGraph<String, ComponentId>,
    nodes: BTreeMap<String, NodeIndex>,
    top: NodeIndex,
}

impl InstanceTree {
    /// Returns `None` when `top` names no circuit.
    pub fn build(design: &Design, top: &str) -> Option<Self> {
        design.circuit(top)?;
        let mut graph = DiGraph::new();
        let mut nodes = BTreeMap::new();
        let top_node = graph.add_node(top.to_string());
        nodes.insert(top.to_string(), top_node);

        let mut visited = HashSet::new();
        let mut stack = vec![top.to_string()];
        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let Some(circuit) = design.circuit(&name) else {
                continue;
            };
            let parent = nodes[&name];
            for (index, component) in circuit.components.iter().enumerate() {
                let ComponentKind::Subcircuit { definition, .. } = &component.kind else {
                    continue;
                };
                let child = *nodes
                    .entry(definition.clone())
                    .or_insert_with(|| graph.add_node(definition.clone()));
                graph.add_edge(parent, child, ComponentId(index));
                if !visited.contains(definition) {
                    stack.push(definition.clone());
                }
            }
        }

        Some(Self {
            graph,
            nodes,
            top: top_node,
        })
    }

    pub fn top(&self) -> &str {
        &self.graph[self.top]
    }

    pub fn definitions(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Instances placed directly inside `definition`, as (instance, child definition).
    pub fn children(&self, definition: &str) -> Vec<(ComponentId, &str)> {
        let Some(&node) = self.nodes.get(definition) else {
            return Vec::new();
        };
        let mut children: Vec<(ComponentId, &str)> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|edge| (*edge.weight(), self.graph[edge.target()].as_str()))
            .collect();
        children.sort();
        children
    }

    /// Definitions ordered children before parents. On recursive
    /// instantiation, returns the name of a definition on the cycle.
    pub fn build_order(&self) -> Result<Vec<String>, String> {
        let mut order = toposort(&self.graph, None)
            .map_err(|cycle| self.graph[cycle.node_id()].clone())?;
        order.reverse();
        Ok(order.into_iter().map(|n| self.graph[n].clone()).collect())
    }
}

/// One level of an instance walk: the netlist in view and the slot of
/// the subcircuit instance (in the parent netlist) that led here.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame<'a> {
    pub netlist: &'a Netlist,
    pub instance: Option<usize>,
}

/// Netlist of a definition that must already be built.
pub(crate) fn built<'a>(
    netlists: &'a BTreeMap<String, Netlist>,
    definition: &str,
) -> Result<&'a Netlist, NetlistError> {
    netlists
        .get(definition)
        .ok_or_else(|| NetlistError::internal(format!("no netlist for definition '{}'", definition)))
}
