//! Net Builder
//!
//! Turns a circuit's wire segments into nets. Segments sharing an endpoint
//! are flood-filled into one net; component ends then fix each net's width;
//! tunnels join nets carrying the same name.

use crate::design::{CircuitDef, ComponentId, ComponentInstance, ComponentKind, Location};
use crate::drc::{issue, rule_ids, Diagnostics, DrcStatus};
use crate::netlist::net::Net;
use crate::netlist::NetlistError;
use fixedbitset::FixedBitSet;
use std::collections::{BTreeMap, HashMap, HashSet};

pub struct NetBuilder<'a> {
    circuit: &'a CircuitDef,
    nets: Vec<Net>,
    failed: bool,
}

impl<'a> NetBuilder<'a> {
    pub fn new(circuit: &'a CircuitDef) -> Self {
        Self {
            circuit,
            nets: Vec::new(),
            failed: false,
        }
    }

    /// Runs every net-forming step; fatal findings are reported through `diag`.
    pub fn build(mut self, diag: &mut Diagnostics<'_>) -> Result<Vec<Net>, NetlistError> {
        // Step 1: connected components over shared wire endpoints
        self.collect_wire_nets();

        // Step 2: ends touching each other without a wire get a point net
        self.synthesize_point_nets();

        // Step 3: widths from component ends
        self.assign_widths(diag);
        if self.failed {
            return Err(self.abort());
        }

        // Step 4: tunnel names join nets
        self.merge_tunnels(diag)?;
        if self.failed {
            return Err(self.abort());
        }

        // Step 5: drop nets nothing attaches to
        self.prune_empty_nets(diag);

        tracing::debug!(
            "circuit '{}': {} wires formed {} nets",
            self.circuit.name,
            self.circuit.wires.len(),
            self.nets.len()
        );
        Ok(self.nets)
    }

    fn abort(&self) -> NetlistError {
        NetlistError::DrcFailed {
            circuit: self.circuit.name.clone(),
            status: DrcStatus::ERROR,
        }
    }

    /// Components whose ends take part in connectivity. Probes only observe.
    fn attached(&self) -> impl Iterator<Item = (ComponentId, &'a ComponentInstance)> {
        self.circuit
            .components
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c.kind, ComponentKind::Probe))
            .map(|(i, c)| (ComponentId(i), c))
    }

    fn find_net(&self, location: Location) -> Option<usize> {
        self.nets.iter().position(|n| n.contains(location))
    }

    fn collect_wire_nets(&mut self) {
        let wires = &self.circuit.wires;
        let mut at: HashMap<Location, Vec<usize>> = HashMap::new();
        for (index, wire) in wires.iter().enumerate() {
            for point in wire.endpoints() {
                at.entry(point).or_default().push(index);
            }
        }

        let mut visited = FixedBitSet::with_capacity(wires.len());
        for seed in 0..wires.len() {
            if visited.put(seed) {
                continue;
            }
            let mut net = Net::new();
            let mut stack = vec![seed];
            while let Some(index) = stack.pop() {
                let wire = &wires[index];
                net.add_segment(index, wire.endpoints());
                for point in wire.endpoints() {
                    for &next in at.get(&point).into_iter().flatten() {
                        if !visited.put(next) {
                            stack.push(next);
                        }
                    }
                }
            }
            self.nets.push(net);
        }
    }

    fn synthesize_point_nets(&mut self) {
        let mut first_width: HashMap<Location, u32> = HashMap::new();
        let mut created: HashSet<Location> = HashSet::new();
        let mut synthesized = Vec::new();
        for (_, component) in self.attached() {
            for end in &component.ends {
                match first_width.get(&end.location) {
                    None => {
                        first_width.insert(end.location, end.width);
                    }
                    Some(&width) => {
                        if created.contains(&end.location) || self.find_net(end.location).is_some()
                        {
                            continue;
                        }
                        created.insert(end.location);
                        synthesized.push(Net::single_point(end.location, width));
                    }
                }
            }
        }
        self.nets.extend(synthesized);
    }

    fn assign_widths(&mut self, diag: &mut Diagnostics<'_>) {
        let mut conflicts: BTreeMap<usize, Vec<(ComponentId, String, u32, u32)>> = BTreeMap::new();
        let attached: Vec<_> = self.attached().collect();
        for (id, component) in attached {
            for end in &component.ends {
                let Some(index) = self.find_net(end.location) else {
                    continue;
                };
                if let Err(NetlistError::WidthConflict {
                    existing,
                    requested,
                }) = self.nets[index].set_width(end.width)
                {
                    conflicts.entry(index).or_default().push((
                        id,
                        component.display_name(),
                        existing,
                        requested,
                    ));
                }
            }
        }

        for (index, entries) in conflicts {
            let net = &self.nets[index];
            // a net with no segments was synthesized from touching ends
            let rule = if net.segments().next().is_none() {
                rule_ids::COMPONENT_WIDTH_MISMATCH
            } else {
                rule_ids::NET_WIDTH_CONFLICT
            };
            let detail: Vec<String> = entries
                .iter()
                .map(|(_, name, existing, requested)| {
                    format!("{} ({} bits, net has {})", name, requested, existing)
                })
                .collect();
            let mut finding = issue(
                rule,
                &self.circuit.name,
                format!("bit width conflict on one net: {}", detail.join(", ")),
            );
            finding.add_wires(net.segments());
            for (id, name, _, _) in entries {
                finding.add_component(id, name);
            }
            diag.emit(finding);
            self.failed = true;
        }
    }

    fn merge_tunnels(&mut self, diag: &mut Diagnostics<'_>) -> Result<(), NetlistError> {
        for (_, component) in self.attached() {
            if !matches!(component.kind, ComponentKind::Tunnel) || component.label.is_empty() {
                continue;
            }
            for end in &component.ends {
                if let Some(index) = self.find_net(end.location) {
                    self.nets[index].add_tunnel(&component.label);
                }
            }
        }

        let mut i = 0;
        while i < self.nets.len() {
            let mut j = i + 1;
            while j < self.nets.len() {
                if !self.nets[i].shares_tunnel(&self.nets[j]) {
                    j += 1;
                    continue;
                }
                let (a, b) = (&self.nets[i], &self.nets[j]);
                if a.has_width() && b.has_width() && a.width() != b.width() {
                    let names: Vec<&str> = a
                        .tunnels()
                        .intersection(b.tunnels())
                        .map(String::as_str)
                        .collect();
                    let mut finding = issue(
                        rule_ids::TUNNEL_WIDTH_MISMATCH,
                        &self.circuit.name,
                        format!(
                            "tunnel '{}' joins a {}-bit net with a {}-bit net",
                            names.join(","),
                            a.width(),
                            b.width()
                        ),
                    );
                    finding.add_wires(a.segments().chain(b.segments()));
                    diag.emit(finding);
                    self.failed = true;
                    j += 1;
                    continue;
                }
                let other = self.nets.remove(j);
                self.nets[i]
                    .merge(other)
                    .map_err(|e| NetlistError::internal(format!("tunnel merge: {}", e)))?;
                // new tunnel names may now match earlier candidates
                j = i + 1;
            }
            i += 1;
        }
        Ok(())
    }

    fn prune_empty_nets(&mut self, diag: &mut Diagnostics<'_>) {
        let (kept, empty): (Vec<Net>, Vec<Net>) =
            self.nets.drain(..).partition(Net::has_width);
        self.nets = kept;
        if empty.is_empty() {
            return;
        }
        let mut finding = issue(
            rule_ids::EMPTY_NETS,
            &self.circuit.name,
            format!("removed {} net(s) not attached to any component", empty.len()),
        );
        finding.add_wires(empty.iter().flat_map(|n| n.segments().collect::<Vec<_>>()));
        diag.emit(finding);
    }
}
