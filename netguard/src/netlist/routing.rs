//! Hidden routing across splitter hops.
//!
//! Child nets share their root's bit addresses, so plain inheritance needs no
//! walking. What remains are hops between distinct root bits, created where a
//! fan-out net could not inherit (a forced root). Each hop is an undirected
//! edge labelled with the splitter carrying it; every bit reachable from an
//! address is the same electrical node.

use crate::design::ComponentId;
use crate::netlist::connection::{ConnectionPoint, PointKind};
use crate::netlist::net::{Net, NetBit, NetId};
use crate::netlist::splitter::{root_address, SplitterLink};
use crate::netlist::NetlistError;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::{Dfs, EdgeFiltered};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct HiddenRouting {
    graph: UnGraph<NetBit, ComponentId>,
    base: Vec<Option<usize>>,
}

impl HiddenRouting {
    pub fn build(nets: &[Net], links: &[SplitterLink]) -> Result<Self, NetlistError> {
        let mut graph = UnGraph::new_undirected();
        let mut base = vec![None; nets.len()];
        for (index, net) in nets.iter().enumerate() {
            if !net.is_root() {
                continue;
            }
            base[index] = Some(graph.node_count());
            for bit in 0..net.width() as usize {
                graph.add_node(NetBit::new(NetId(index), bit));
            }
        }

        let mut routing = Self { graph, base };
        for link in links {
            for fanout in &link.fanouts {
                for (bit, &bus_bit) in fanout.bus_bits.iter().enumerate() {
                    let near = root_address(nets, NetBit::new(fanout.net, bit))?;
                    let far = root_address(nets, NetBit::new(link.bus, bus_bit))?;
                    if near == far {
                        continue;
                    }
                    let (a, b) = match (routing.node(near), routing.node(far)) {
                        (Some(a), Some(b)) => (a, b),
                        _ => {
                            return Err(NetlistError::internal(format!(
                                "splitter hop {} -> {} leaves the routing graph",
                                near, far
                            )))
                        }
                    };
                    routing.graph.add_edge(a, b, link.component);
                }
            }
        }
        Ok(routing)
    }

    fn node(&self, address: NetBit) -> Option<NodeIndex> {
        let base = self.base.get(address.net.0).copied().flatten()?;
        let index = NodeIndex::new(base + address.bit);
        match self.graph.node_weight(index) {
            Some(found) if *found == address => Some(index),
            _ => None,
        }
    }

    /// Number of splitter hops in the graph.
    pub fn hop_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether `address` is joined to anything through a splitter hop.
    pub fn has_hops(&self, address: NetBit) -> bool {
        self.node(address)
            .map(|n| self.graph.neighbors(n).next().is_some())
            .unwrap_or(false)
    }

    /// Every root bit electrically joined to `start`, `start` first.
    pub fn reach(&self, start: NetBit) -> Vec<NetBit> {
        let Some(node) = self.node(start) else {
            return vec![start];
        };
        let mut found = Vec::new();
        let mut dfs = Dfs::new(&self.graph, node);
        while let Some(next) = dfs.next(&self.graph) {
            found.push(self.graph[next]);
        }
        found
    }

    /// Like [`reach`](Self::reach) but never crossing hops of `splitter`.
    pub fn reach_excluding(&self, start: NetBit, splitter: ComponentId) -> Vec<NetBit> {
        let Some(node) = self.node(start) else {
            return vec![start];
        };
        let filtered = EdgeFiltered::from_fn(&self.graph, move |edge| *edge.weight() != splitter);
        let mut found = Vec::new();
        let mut dfs = Dfs::new(&filtered, node);
        while let Some(next) = dfs.next(&filtered) {
            found.push(self.graph[next]);
        }
        found
    }

    /// Distinct real drivers over a set of addresses, in discovery order.
    pub fn drivers_over(nets: &[Net], addresses: &[NetBit]) -> Vec<ConnectionPoint> {
        collect_points(addresses, |a| nets_bit(nets, a, true))
    }

    /// Real consumers over a set of addresses, in discovery order.
    pub fn consumers_over(nets: &[Net], addresses: &[NetBit]) -> Vec<ConnectionPoint> {
        collect_points(addresses, |a| nets_bit(nets, a, false))
    }

    /// Distinct component outputs driving the node of `start`.
    pub fn drivers(&self, nets: &[Net], start: NetBit) -> Vec<ConnectionPoint> {
        Self::drivers_over(nets, &self.reach(start))
    }

    /// The driver a hidden-source walk from `start` lands on first.
    pub fn hidden_source(&self, nets: &[Net], start: NetBit) -> Option<ConnectionPoint> {
        self.drivers(nets, start).into_iter().next()
    }

    /// Driver reachable from `start` without crossing `splitter`.
    pub fn hidden_source_excluding(
        &self,
        nets: &[Net],
        start: NetBit,
        splitter: ComponentId,
    ) -> Option<ConnectionPoint> {
        Self::drivers_over(nets, &self.reach_excluding(start, splitter))
            .into_iter()
            .next()
    }

    /// Component inputs fed by the node of `start`, direct and hidden.
    pub fn hidden_sinks(&self, nets: &[Net], start: NetBit) -> Vec<ConnectionPoint> {
        Self::consumers_over(nets, &self.reach(start))
    }
}

fn nets_bit(nets: &[Net], address: NetBit, sources: bool) -> &[ConnectionPoint] {
    match nets.get(address.net.0) {
        Some(net) if sources => net.bit_sources(address.bit),
        Some(net) => net.bit_sinks(address.bit),
        None => &[],
    }
}

fn collect_points<'n>(
    addresses: &[NetBit],
    lookup: impl Fn(NetBit) -> &'n [ConnectionPoint],
) -> Vec<ConnectionPoint> {
    let mut seen = BTreeSet::new();
    let mut points = Vec::new();
    for &address in addresses {
        for point in lookup(address) {
            if point.kind == PointKind::Port && seen.insert((point.component, point.end, point.bit))
            {
                points.push(*point);
            }
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Location;
    use crate::netlist::net::NetRole;
    use crate::netlist::splitter::FanoutLink;

    fn root(width: u32, x: i32) -> Net {
        let mut net = Net::single_point(Location::new(x, 0), width);
        net.set_role(NetRole::Root);
        net.initialize_source_sinks();
        net
    }

    fn port(component: usize, end: usize) -> ConnectionPoint {
        ConnectionPoint::new(ComponentId(component), end, 0, PointKind::Port)
    }

    /// Two buses hop onto one shared 1-bit net through splitters 10 and 11.
    fn two_hop_nets() -> (Vec<Net>, Vec<SplitterLink>) {
        let nets = vec![root(2, 0), root(2, 10), root(1, 20)];
        let links = vec![
            SplitterLink {
                component: ComponentId(10),
                bus: NetId(0),
                fanouts: vec![FanoutLink {
                    end: 1,
                    net: NetId(2),
                    bus_bits: vec![1],
                }],
            },
            SplitterLink {
                component: ComponentId(11),
                bus: NetId(1),
                fanouts: vec![FanoutLink {
                    end: 1,
                    net: NetId(2),
                    bus_bits: vec![0],
                }],
            },
        ];
        (nets, links)
    }

    #[test]
    fn test_reach_crosses_hops() {
        let (nets, links) = two_hop_nets();
        let routing = HiddenRouting::build(&nets, &links).unwrap();
        assert_eq!(routing.hop_count(), 2);

        let start = NetBit::new(NetId(0), 1);
        let reach: BTreeSet<NetBit> = routing.reach(start).into_iter().collect();
        assert_eq!(
            reach,
            BTreeSet::from([start, NetBit::new(NetId(2), 0), NetBit::new(NetId(1), 0)])
        );
        // bit 0 of the first bus is not routed anywhere
        assert_eq!(routing.reach(NetBit::new(NetId(0), 0)).len(), 1);
        assert!(!routing.has_hops(NetBit::new(NetId(0), 0)));
    }

    #[test]
    fn test_reach_excluding_splitter() {
        let (nets, links) = two_hop_nets();
        let routing = HiddenRouting::build(&nets, &links).unwrap();
        let reach = routing.reach_excluding(NetBit::new(NetId(2), 0), ComponentId(10));
        assert_eq!(reach.len(), 2);
        assert!(!reach.contains(&NetBit::new(NetId(0), 1)));
    }

    #[test]
    fn test_drivers_and_sinks_over_reach() {
        let (mut nets, links) = two_hop_nets();
        nets[0].add_source(1, port(1, 0));
        nets[1].add_sink(0, port(2, 0));
        nets[2].add_sink(0, port(3, 0));
        let routing = HiddenRouting::build(&nets, &links).unwrap();

        let start = NetBit::new(NetId(1), 0);
        assert_eq!(routing.hidden_source(&nets, start), Some(port(1, 0)));
        assert_eq!(routing.hidden_sinks(&nets, start).len(), 2);
        assert!(routing
            .hidden_source_excluding(&nets, NetBit::new(NetId(2), 0), ComponentId(10))
            .is_none());
    }
}
