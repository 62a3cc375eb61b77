//! Splitter Resolver
//!
//! Links fan-out nets to the bus nets they are cut from. A fan-out net fed
//! by exactly one splitter edge becomes a child and inherits its bits from
//! the bus; nets fed by several edges, and the bus at the top of a tree,
//! stay forced roots and are joined later by hidden routing.

use crate::design::{CircuitDef, ComponentId, ComponentKind, Location, PortEnd};
use crate::drc::{issue, rule_ids, Diagnostics};
use crate::netlist::net::{Net, NetBit, NetId, NetRole};
use crate::netlist::NetlistError;
use fixedbitset::FixedBitSet;
use serde::Serialize;

/// One connected fan-out end of a live splitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanoutLink {
    pub end: usize,
    pub net: NetId,
    /// `bus_bits[k]` is the bus bit carried on bit `k` of this end.
    pub bus_bits: Vec<usize>,
}

/// A splitter that survived duplicate and degenerate elimination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitterLink {
    pub component: ComponentId,
    pub bus: NetId,
    pub fanouts: Vec<FanoutLink>,
}

struct SplitterView<'a> {
    id: ComponentId,
    name: String,
    location: Location,
    ends: &'a [PortEnd],
    bit_map: &'a [Option<usize>],
    no_connect: &'a [usize],
}

impl SplitterView<'_> {
    fn bus_bits_of(&self, end: usize) -> Vec<usize> {
        self.bit_map
            .iter()
            .enumerate()
            .filter(|(_, e)| **e == Some(end))
            .map(|(bit, _)| bit)
            .collect()
    }

    /// Explicitly flagged, or carrying no bus bit at all.
    fn is_no_connect(&self, end: usize) -> bool {
        self.no_connect.contains(&end) || !self.bit_map.contains(&Some(end))
    }

    fn same_geometry(&self, other: &SplitterView<'_>) -> bool {
        self.location == other.location
            && self.ends.len() == other.ends.len()
            && self
                .ends
                .iter()
                .zip(other.ends)
                .all(|(a, b)| a.location == b.location)
    }
}

pub struct SplitterResolver<'a> {
    circuit: &'a CircuitDef,
}

impl<'a> SplitterResolver<'a> {
    pub fn new(circuit: &'a CircuitDef) -> Self {
        Self { circuit }
    }

    pub fn resolve(
        &self,
        nets: &mut Vec<Net>,
        diag: &mut Diagnostics<'_>,
    ) -> Result<Vec<SplitterLink>, NetlistError> {
        let splitters = self.remove_duplicates(self.collect(), diag);
        let splitters = self.merge_degenerate(splitters, nets, diag)?;

        let mut links = Vec::with_capacity(splitters.len());
        for splitter in &splitters {
            links.push(self.link(splitter, nets, diag)?);
        }

        assign_roles(nets, &links)?;
        tracing::debug!(
            "circuit '{}': {} live splitters, {} child nets, {} forced roots",
            self.circuit.name,
            links.len(),
            nets.iter().filter(|n| !n.is_root()).count(),
            nets.iter().filter(|n| n.is_forced_root()).count()
        );
        Ok(links)
    }

    fn collect(&self) -> Vec<SplitterView<'a>> {
        self.circuit
            .components
            .iter()
            .enumerate()
            .filter_map(|(index, component)| match &component.kind {
                ComponentKind::Splitter {
                    bit_map,
                    no_connect,
                } => Some(SplitterView {
                    id: ComponentId(index),
                    name: component.display_name(),
                    location: component.location,
                    ends: &component.ends,
                    bit_map,
                    no_connect,
                }),
                _ => None,
            })
            .collect()
    }

    fn remove_duplicates(
        &self,
        splitters: Vec<SplitterView<'a>>,
        diag: &mut Diagnostics<'_>,
    ) -> Vec<SplitterView<'a>> {
        let mut kept: Vec<SplitterView<'a>> = Vec::with_capacity(splitters.len());
        let mut dropped = Vec::new();
        for splitter in splitters {
            if kept.iter().any(|k| k.same_geometry(&splitter)) {
                dropped.push((splitter.id, splitter.name));
            } else {
                kept.push(splitter);
            }
        }
        if !dropped.is_empty() {
            let mut finding = issue(
                rule_ids::DUPLICATE_SPLITTER,
                &self.circuit.name,
                format!("removed {} stacked duplicate splitter(s)", dropped.len()),
            );
            for (id, name) in dropped {
                finding.add_component(id, name);
            }
            diag.emit(finding);
        }
        kept
    }

    /// Splitters whose bus equals their widest fan-out act as plain wires.
    fn merge_degenerate(
        &self,
        splitters: Vec<SplitterView<'a>>,
        nets: &mut Vec<Net>,
        diag: &mut Diagnostics<'_>,
    ) -> Result<Vec<SplitterView<'a>>, NetlistError> {
        let mut live = Vec::with_capacity(splitters.len());
        for splitter in splitters {
            let bus_width = splitter.ends[0].width;
            let widest = (1..splitter.ends.len())
                .max_by_key(|&i| (splitter.ends[i].width, std::cmp::Reverse(i)))
                .unwrap_or(1);
            if splitter.ends[widest].width != bus_width {
                live.push(splitter);
                continue;
            }

            let bus = find_net(nets, splitter.ends[0].location);
            let fanout = find_net(nets, splitter.ends[widest].location);
            match (bus, fanout) {
                (Some(a), Some(b)) if a != b => {
                    let (keep, gone) = (a.min(b), a.max(b));
                    let other = nets.remove(gone);
                    nets[keep].merge(other).map_err(|e| {
                        NetlistError::internal(format!("wire-like splitter merge: {}", e))
                    })?;
                }
                (Some(_), Some(_)) => {}
                _ => {
                    diag.emit(
                        issue(
                            rule_ids::SPLITTER_END_UNCONNECTED,
                            &self.circuit.name,
                            format!("splitter {} has an open side", splitter.name),
                        )
                        .with_component(splitter.id, splitter.name.clone()),
                    );
                }
            }
        }
        Ok(live)
    }

    fn link(
        &self,
        splitter: &SplitterView<'_>,
        nets: &[Net],
        diag: &mut Diagnostics<'_>,
    ) -> Result<SplitterLink, NetlistError> {
        let bus = find_net(nets, splitter.ends[0].location).ok_or_else(|| {
            NetlistError::internal(format!(
                "splitter {} in '{}' has no net on its bus end",
                splitter.name, self.circuit.name
            ))
        })?;

        let mut fanouts = Vec::new();
        let mut open = Vec::new();
        let mut wired_no_connect = Vec::new();
        for end in 1..splitter.ends.len() {
            let net = find_net(nets, splitter.ends[end].location);
            match (net, splitter.is_no_connect(end)) {
                (Some(net), false) => fanouts.push(FanoutLink {
                    end,
                    net: NetId(net),
                    bus_bits: splitter.bus_bits_of(end),
                }),
                (Some(_), true) => wired_no_connect.push(end),
                (None, false) => open.push(end),
                (None, true) => {}
            }
        }

        if !open.is_empty() {
            diag.emit(
                issue(
                    rule_ids::SPLITTER_END_UNCONNECTED,
                    &self.circuit.name,
                    format!(
                        "splitter {} has unconnected fan-out end(s) {:?}",
                        splitter.name, open
                    ),
                )
                .with_component(splitter.id, splitter.name.clone()),
            );
        }
        if !wired_no_connect.is_empty() {
            diag.emit(
                issue(
                    rule_ids::SPLITTER_NO_CONNECT_WIRED,
                    &self.circuit.name,
                    format!(
                        "splitter {} has nets on end(s) {:?} that carry no bits",
                        splitter.name, wired_no_connect
                    ),
                )
                .with_component(splitter.id, splitter.name.clone()),
            );
        }

        Ok(SplitterLink {
            component: splitter.id,
            bus: NetId(bus),
            fanouts,
        })
    }
}

fn find_net(nets: &[Net], location: Location) -> Option<usize> {
    nets.iter().position(|n| n.contains(location))
}

fn assign_roles(nets: &mut [Net], links: &[SplitterLink]) -> Result<(), NetlistError> {
    let mut edges = vec![0usize; nets.len()];
    let mut first: Vec<Option<(NetId, Vec<usize>)>> = vec![None; nets.len()];
    let mut is_bus = FixedBitSet::with_capacity(nets.len());

    for link in links {
        is_bus.insert(link.bus.0);
        for fanout in &link.fanouts {
            edges[fanout.net.0] += 1;
            if first[fanout.net.0].is_none() {
                first[fanout.net.0] = Some((link.bus, fanout.bus_bits.clone()));
            }
        }
    }

    for (index, net) in nets.iter_mut().enumerate() {
        let role = match (edges[index], first[index].take()) {
            (1, Some((parent, inherited))) if parent.0 != index => {
                if inherited.len() != net.width() as usize {
                    return Err(NetlistError::internal(format!(
                        "net {} inherits {} bits but is {} bits wide",
                        index,
                        inherited.len(),
                        net.width()
                    )));
                }
                NetRole::Child { parent, inherited }
            }
            (0, _) if !is_bus.contains(index) => NetRole::Root,
            _ => NetRole::ForcedRoot,
        };
        net.set_role(role);
    }

    break_parent_cycles(nets);
    Ok(())
}

/// Splitters wired in a loop would make a net its own ancestor.
fn break_parent_cycles(nets: &mut [Net]) {
    for start in 0..nets.len() {
        let mut seen = FixedBitSet::with_capacity(nets.len());
        let mut current = start;
        while let Some(parent) = nets[current].parent() {
            if seen.put(current) {
                tracing::debug!("net {} closes a splitter loop, forcing root", current);
                nets[current].force_root();
                break;
            }
            current = parent.0;
        }
    }
}

/// Follows child nets up to the root net actually carrying `start`.
pub fn root_address(nets: &[Net], start: NetBit) -> Result<NetBit, NetlistError> {
    let mut address = start;
    for _ in 0..=nets.len() {
        let net = nets
            .get(address.net.0)
            .ok_or_else(|| NetlistError::internal(format!("unknown net {}", address.net)))?;
        let Some(parent) = net.parent() else {
            return Ok(address);
        };
        let bit = net.inherited_bit(address.bit).ok_or_else(|| {
            NetlistError::internal(format!("bit {} has no inherited source", address))
        })?;
        address = NetBit::new(parent, bit);
    }
    Err(NetlistError::internal(format!(
        "parent chain from {} does not terminate",
        start
    )))
}
