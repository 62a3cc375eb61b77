//! Netlist construction
//!
//! One [`Netlist`] per circuit definition: nets grown from wires, splitters
//! resolved into parent/child bit inheritance, and every component port bit
//! registered as a source or sink on its root net.

pub mod builder;
pub mod component;
pub mod connection;
pub mod net;
pub mod routing;
pub mod splitter;

pub use builder::NetBuilder;
pub use component::{ComponentRole, NetlistComponent};
pub use connection::{ChildPort, ConnectionEnd, ConnectionPoint, PointKind, PortList};
pub use net::{Net, NetBit, NetId, NetRole};
pub use routing::HiddenRouting;
pub use splitter::{root_address, FanoutLink, SplitterLink, SplitterResolver};

use crate::design::{CircuitDef, ComponentId, ComponentKind, Location, PortDirection};
use crate::drc::{Diagnostics, DrcStatus};
use crate::hierarchy::clock::ClockTiming;
use crate::labels::LabelPolicy;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum NetlistError {
    #[error("net width conflict: {existing} bits vs {requested} bits")]
    WidthConflict { existing: u32, requested: u32 },
    #[error("circuit '{circuit}' failed design rule checks ({status})")]
    DrcFailed { circuit: String, status: DrcStatus },
    #[error("internal error: {message} (at {provenance})")]
    Internal { message: String, provenance: String },
}

impl NetlistError {
    /// Engine invariant violation, tagged with the caller's source position.
    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        let caller = std::panic::Location::caller();
        NetlistError::Internal {
            message: message.into(),
            provenance: format!("{}:{}", caller.file(), caller.line()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Netlist {
    name: String,
    nets: Vec<Net>,
    splitters: Vec<SplitterLink>,
    components: Vec<NetlistComponent>,
    index: BTreeMap<ComponentId, usize>,
    normal: Vec<usize>,
    subcircuits: Vec<usize>,
    clocks: Vec<usize>,
    inputs: Vec<usize>,
    outputs: Vec<usize>,
    inouts: Vec<usize>,
    routing: HiddenRouting,
    requires_global_clock: bool,
}

impl Netlist {
    fn empty(name: &str, nets: Vec<Net>, splitters: Vec<SplitterLink>) -> Self {
        Self {
            name: name.to_string(),
            nets,
            splitters,
            components: Vec::new(),
            index: BTreeMap::new(),
            normal: Vec::new(),
            subcircuits: Vec::new(),
            clocks: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            inouts: Vec::new(),
            routing: HiddenRouting::default(),
            requires_global_clock: false,
        }
    }

    /// Builds the netlist of one definition. Child definitions it
    /// instantiates must already be present in `children`.
    pub fn build(
        circuit: &CircuitDef,
        children: &BTreeMap<String, Netlist>,
        labels: &dyn LabelPolicy,
        diag: &mut Diagnostics<'_>,
    ) -> Result<Self, NetlistError> {
        tracing::info!("building netlist for '{}'", circuit.name);

        let mut nets = NetBuilder::new(circuit).build(diag)?;
        let splitters = SplitterResolver::new(circuit).resolve(&mut nets, diag)?;
        for net in &mut nets {
            net.initialize_source_sinks();
        }

        let mut netlist = Self::empty(&circuit.name, nets, splitters);
        netlist.register_components(circuit, children, labels)?;
        netlist.routing = HiddenRouting::build(&netlist.nets, &netlist.splitters)?;
        netlist.register_splitter_taps()?;

        tracing::info!(
            "circuit '{}': {} nets, {} buses, {} components, {} splitter hops",
            netlist.name,
            netlist.number_of_nets(),
            netlist.number_of_buses(),
            netlist.components.len(),
            netlist.routing.hop_count()
        );
        Ok(netlist)
    }

    fn register_components(
        &mut self,
        circuit: &CircuitDef,
        children: &BTreeMap<String, Netlist>,
        labels: &dyn LabelPolicy,
    ) -> Result<(), NetlistError> {
        for (index, component) in circuit.components.iter().enumerate() {
            let id = ComponentId(index);
            let role = match &component.kind {
                ComponentKind::Splitter { .. } | ComponentKind::Tunnel | ComponentKind::Probe => {
                    continue
                }
                ComponentKind::Pin => match component.ends.first().map(|e| e.direction) {
                    Some(PortDirection::Output) => ComponentRole::InputPort,
                    Some(PortDirection::Input) => ComponentRole::OutputPort,
                    _ => ComponentRole::InOutPort,
                },
                ComponentKind::Clock {
                    high_ticks,
                    low_ticks,
                } => ComponentRole::Clock {
                    timing: ClockTiming::new(*high_ticks, *low_ticks),
                },
                ComponentKind::Subcircuit { definition, .. } => ComponentRole::Subcircuit {
                    definition: definition.clone(),
                },
                ComponentKind::Logic(_) => ComponentRole::Normal,
            };

            let mut entry = NetlistComponent::new(
                id,
                component.display_name(),
                labels.canonical(&component.label),
                role,
            );
            if let ComponentKind::Logic(traits) = &component.kind {
                entry = entry
                    .with_clock_pins(traits.clock_pins.clone())
                    .with_io(traits.io)
                    .with_global_clock(traits.requires_global_clock);
            }

            for (end_index, end) in component.ends.iter().enumerate() {
                let mut connection = ConnectionEnd::new(id, end_index, end.direction, end.width);
                if let ComponentKind::Subcircuit { definition, ports } = &component.kind {
                    let port = self.child_port(children, definition, ports.get(end_index), labels)?;
                    for point in connection.points_mut() {
                        point.set_child_port(port);
                    }
                }
                if let Some(net) = self.net_at(end.location) {
                    for bit in 0..end.width as usize {
                        self.attach(&mut connection, bit, net, end.direction)?;
                    }
                }
                entry.push_end(connection);
            }

            let slot = self.components.len();
            match entry.role() {
                ComponentRole::Normal => self.normal.push(slot),
                ComponentRole::Subcircuit { .. } => self.subcircuits.push(slot),
                ComponentRole::Clock { .. } => self.clocks.push(slot),
                ComponentRole::InputPort => self.inputs.push(slot),
                ComponentRole::OutputPort => self.outputs.push(slot),
                ComponentRole::InOutPort => self.inouts.push(slot),
            }
            self.requires_global_clock |= entry.requires_global_clock();
            self.index.insert(id, slot);
            self.components.push(entry);
        }
        Ok(())
    }

    fn child_port(
        &self,
        children: &BTreeMap<String, Netlist>,
        definition: &str,
        label: Option<&String>,
        labels: &dyn LabelPolicy,
    ) -> Result<ChildPort, NetlistError> {
        let child = children.get(definition).ok_or_else(|| {
            NetlistError::internal(format!(
                "'{}' instantiates '{}' before it was built",
                self.name, definition
            ))
        })?;
        let label = label.map(|l| labels.canonical(l)).unwrap_or_default();
        child.port_index(&label).ok_or_else(|| {
            NetlistError::internal(format!(
                "unable to find pin '{}' in circuit '{}'",
                label, definition
            ))
        })
    }

    fn attach(
        &mut self,
        connection: &mut ConnectionEnd,
        bit: usize,
        net: NetId,
        direction: PortDirection,
    ) -> Result<(), NetlistError> {
        let address = root_address(&self.nets, NetBit::new(net, bit))?;
        let point = connection
            .get_mut(bit)
            .ok_or_else(|| NetlistError::internal(format!("end has no bit {}", bit)))?;
        point.bind(address);
        let point = *point;
        let root = &mut self.nets[address.net.0];
        let added = if direction.is_input() {
            root.add_sink(address.bit, point)
        } else {
            root.add_source(address.bit, point)
        };
        if !added {
            return Err(NetlistError::internal(format!(
                "root address {} has no source/sink slot",
                address
            )));
        }
        Ok(())
    }

    /// Registers a tap for every splitter hop on the fan-out side. A tap
    /// drives its bit when nothing local does and the far side has a driver.
    fn register_splitter_taps(&mut self) -> Result<(), NetlistError> {
        let mut taps = Vec::new();
        for link in &self.splitters {
            for fanout in &link.fanouts {
                for (bit, &bus_bit) in fanout.bus_bits.iter().enumerate() {
                    let near = root_address(&self.nets, NetBit::new(fanout.net, bit))?;
                    let far = root_address(&self.nets, NetBit::new(link.bus, bus_bit))?;
                    if near == far {
                        continue;
                    }
                    let tap = ConnectionPoint::new(link.component, fanout.end, bit, PointKind::SplitterTap)
                        .bound_to(far);
                    let sourced = !self.nets[near.net.0].has_bit_source(near.bit)
                        && self
                            .routing
                            .hidden_source_excluding(&self.nets, far, link.component)
                            .is_some();
                    taps.push((near, tap, sourced));
                }
            }
        }
        for (near, tap, sourced) in taps {
            let net = &mut self.nets[near.net.0];
            if sourced {
                net.add_source(near.bit, tap);
            } else {
                net.add_sink(near.bit, tap);
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nets(&self) -> &[Net] {
        &self.nets
    }

    pub fn net(&self, id: NetId) -> Option<&Net> {
        self.nets.get(id.0)
    }

    pub(crate) fn nets_mut(&mut self) -> &mut [Net] {
        &mut self.nets
    }

    pub fn net_at(&self, location: Location) -> Option<NetId> {
        self.nets.iter().position(|n| n.contains(location)).map(NetId)
    }

    pub fn splitters(&self) -> &[SplitterLink] {
        &self.splitters
    }

    pub fn routing(&self) -> &HiddenRouting {
        &self.routing
    }

    pub fn components(&self) -> &[NetlistComponent] {
        &self.components
    }

    /// Component at a registration slot.
    pub fn component(&self, slot: usize) -> Option<&NetlistComponent> {
        self.components.get(slot)
    }

    pub fn slot_of(&self, id: ComponentId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn component_by_id(&self, id: ComponentId) -> Option<&NetlistComponent> {
        self.slot_of(id).and_then(|slot| self.components.get(slot))
    }

    fn slots<'s>(&'s self, slots: &'s [usize]) -> impl Iterator<Item = (usize, &'s NetlistComponent)> {
        slots.iter().map(move |&slot| (slot, &self.components[slot]))
    }

    pub fn normal_components(&self) -> impl Iterator<Item = (usize, &NetlistComponent)> {
        self.slots(&self.normal)
    }

    pub fn subcircuits(&self) -> impl Iterator<Item = (usize, &NetlistComponent)> {
        self.slots(&self.subcircuits)
    }

    pub fn clock_generators(&self) -> impl Iterator<Item = (usize, &NetlistComponent)> {
        self.slots(&self.clocks)
    }

    pub fn input_ports(&self) -> impl Iterator<Item = (usize, &NetlistComponent)> {
        self.slots(&self.inputs)
    }

    pub fn output_ports(&self) -> impl Iterator<Item = (usize, &NetlistComponent)> {
        self.slots(&self.outputs)
    }

    pub fn inout_ports(&self) -> impl Iterator<Item = (usize, &NetlistComponent)> {
        self.slots(&self.inouts)
    }

    fn port_slots(&self, list: PortList) -> &[usize] {
        match list {
            PortList::Input => &self.inputs,
            PortList::Output => &self.outputs,
            PortList::InOut => &self.inouts,
        }
    }

    /// Slot of the `index`-th port in `list`.
    pub fn port_slot(&self, port: ChildPort) -> Option<usize> {
        self.port_slots(port.list).get(port.index).copied()
    }

    /// Position of the port component in `slot` within its port list.
    pub fn child_port_of(&self, slot: usize) -> Option<ChildPort> {
        let list = self.components.get(slot)?.role().port_list()?;
        self.port_slots(list)
            .iter()
            .position(|&s| s == slot)
            .map(|index| ChildPort { list, index })
    }

    pub fn port_count(&self) -> usize {
        self.inputs.len() + self.outputs.len() + self.inouts.len()
    }

    fn port_bits(&self, list: PortList) -> usize {
        self.port_slots(list)
            .iter()
            .map(|&slot| self.components[slot].width())
            .sum()
    }

    pub fn input_port_bits(&self) -> usize {
        self.port_bits(PortList::Input)
    }

    pub fn output_port_bits(&self) -> usize {
        self.port_bits(PortList::Output)
    }

    pub fn inout_port_bits(&self) -> usize {
        self.port_bits(PortList::InOut)
    }

    /// Finds a port by canonical label: inputs first, then inouts, then outputs.
    pub fn port_index(&self, label: &str) -> Option<ChildPort> {
        [PortList::Input, PortList::InOut, PortList::Output]
            .into_iter()
            .find_map(|list| {
                self.port_slots(list)
                    .iter()
                    .position(|&slot| self.components[slot].label() == label)
                    .map(|index| ChildPort { list, index })
            })
    }

    /// End of the port labelled `label` among the ports of `direction`.
    pub fn port_end(&self, label: &str, direction: PortDirection) -> Option<&ConnectionEnd> {
        let list = match direction {
            PortDirection::Input => PortList::Input,
            PortDirection::Output => PortList::Output,
            PortDirection::InOut => PortList::InOut,
        };
        self.port_slots(list)
            .iter()
            .map(|&slot| &self.components[slot])
            .find(|component| component.label() == label)
            .and_then(|component| component.end(0))
    }

    /// Root nets of width one.
    pub fn number_of_nets(&self) -> usize {
        self.nets
            .iter()
            .filter(|n| n.is_root() && !n.is_bus())
            .count()
    }

    pub fn number_of_buses(&self) -> usize {
        self.nets.iter().filter(|n| n.is_root() && n.is_bus()).count()
    }

    pub fn requires_global_clock(&self) -> bool {
        self.requires_global_clock
    }

    /// Bit `bit` of the instance end attached to child port `port`.
    pub fn connection_for_subcircuit(
        &self,
        instance: usize,
        port: ChildPort,
        bit: usize,
    ) -> Option<ConnectionPoint> {
        let component = self.components.get(instance)?;
        let end = component.end_for_child_port(port.list, port.index)?;
        component.point(end, bit).copied()
    }

    /// True when an end's bits land on consecutive bits of one root net.
    pub fn is_continuous_bus(&self, slot: usize, end: usize) -> bool {
        let Some(end) = self.components.get(slot).and_then(|c| c.end(end)) else {
            return false;
        };
        let addresses: Option<Vec<NetBit>> = end.points().iter().map(|p| p.net_bit()).collect();
        match addresses.as_deref() {
            Some([first, rest @ ..]) => rest.iter().enumerate().all(|(offset, address)| {
                address.net == first.net && address.bit == first.bit + offset + 1
            }),
            _ => false,
        }
    }

    pub fn drivers(&self, address: NetBit) -> Vec<ConnectionPoint> {
        self.routing.drivers(&self.nets, address)
    }

    pub fn hidden_source(&self, address: NetBit) -> Option<ConnectionPoint> {
        self.routing.hidden_source(&self.nets, address)
    }

    pub fn hidden_sinks(&self, address: NetBit) -> Vec<ConnectionPoint> {
        self.routing.hidden_sinks(&self.nets, address)
    }

    /// Two or more distinct component outputs drive the node of `address`.
    pub fn has_short_circuit(&self, address: NetBit) -> bool {
        self.drivers(address).len() >= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{ComponentInstance, Location};
    use crate::drc::IssueCollector;
    use crate::labels::HdlLabels;
    use std::collections::BTreeSet;

    fn build(circuit: &CircuitDef, children: &BTreeMap<String, Netlist>) -> Netlist {
        let mut collector = IssueCollector::new();
        let suppressed = BTreeSet::new();
        let mut diag = Diagnostics::new(&mut collector, &suppressed);
        Netlist::build(circuit, children, &HdlLabels, &mut diag).unwrap()
    }

    /// in -> NOT -> out, plus an 8-bit bus pin split into single bits.
    fn inverter() -> CircuitDef {
        let mut circuit = CircuitDef::new("inv");
        circuit.add(ComponentInstance::input_pin("a", Location::new(0, 0), 1));
        circuit.add(
            ComponentInstance::logic("NOT_GATE", Location::new(20, 0))
                .with_end(Location::new(10, 0), 1, PortDirection::Input)
                .with_end(Location::new(20, 0), 1, PortDirection::Output),
        );
        circuit.add(ComponentInstance::output_pin("y", Location::new(30, 0), 1));
        circuit
            .wire(Location::new(0, 0), Location::new(10, 0))
            .wire(Location::new(20, 0), Location::new(30, 0));
        circuit
    }

    #[test]
    fn test_register_sources_and_sinks() {
        let netlist = build(&inverter(), &BTreeMap::new());
        assert_eq!(netlist.number_of_nets(), 2);
        assert_eq!(netlist.number_of_buses(), 0);
        assert_eq!(netlist.input_ports().count(), 1);
        assert_eq!(netlist.output_ports().count(), 1);
        assert_eq!(netlist.normal_components().count(), 1);

        let first = NetBit::new(NetId(0), 0);
        assert_eq!(netlist.nets()[0].bit_sources(0).len(), 1);
        assert_eq!(netlist.nets()[0].bit_sinks(0).len(), 1);
        assert!(!netlist.has_short_circuit(first));
        assert_eq!(
            netlist.hidden_source(first).map(|p| p.component),
            Some(ComponentId(0))
        );
    }

    #[test]
    fn test_port_lookup_and_child_ports() {
        let child = build(&inverter(), &BTreeMap::new());
        assert_eq!(
            child.port_index("y"),
            Some(ChildPort {
                list: PortList::Output,
                index: 0
            })
        );
        assert_eq!(child.port_index("missing"), None);
        assert_eq!(
            child
                .port_end("a", PortDirection::Input)
                .map(|end| end.points().len()),
            Some(1)
        );
        assert!(child.port_end("a", PortDirection::Output).is_none());
        let y = child
            .output_ports()
            .map(|(slot, _)| slot)
            .next()
            .unwrap();
        assert_eq!(
            child.child_port_of(y),
            Some(ChildPort {
                list: PortList::Output,
                index: 0
            })
        );
        let (gate, _) = child.normal_components().next().unwrap();
        assert_eq!(child.child_port_of(gate), None);

        let mut children = BTreeMap::new();
        children.insert("inv".to_string(), child);
        let mut top = CircuitDef::new("top");
        top.add(ComponentInstance::input_pin("x", Location::new(0, 0), 1));
        top.add(
            ComponentInstance::new(
                ComponentKind::Subcircuit {
                    definition: "inv".into(),
                    ports: vec!["a".into(), "y".into()],
                },
                Location::new(10, 0),
            )
            .with_label("u1")
            .with_end(Location::new(0, 0), 1, PortDirection::Input)
            .with_end(Location::new(20, 0), 1, PortDirection::Output),
        );
        let netlist = build(&top, &children);
        let (slot, _) = netlist.subcircuits().next().unwrap();
        let point = netlist
            .connection_for_subcircuit(
                slot,
                ChildPort {
                    list: PortList::Input,
                    index: 0,
                },
                0,
            )
            .unwrap();
        assert!(point.is_bound());
        assert!(netlist.is_continuous_bus(slot, 0));
        // the output end touches nothing
        assert!(!netlist.is_continuous_bus(slot, 1));
    }

    #[test]
    fn test_internal_error_has_provenance() {
        let error = NetlistError::internal("boom");
        match error {
            NetlistError::Internal { provenance, .. } => assert!(provenance.contains("mod.rs")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
