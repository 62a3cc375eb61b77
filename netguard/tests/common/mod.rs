//! Circuit layouts shared by the integration tests.
#![allow(dead_code)]

use netguard::design::{
    CircuitDef, ComponentInstance, ComponentKind, Design, IoBubbles, Location, PortDirection,
};
use netguard::drc::{Diagnostics, IssueCollector};
use netguard::labels::HdlLabels;
use netguard::netlist::Netlist;
use netguard::pipeline::DesignSnapshot;
use netguard::{CheckOptions, NetguardCore};
use std::collections::{BTreeMap, BTreeSet};

pub fn at(x: i32, y: i32) -> Location {
    Location::new(x, y)
}

pub fn source(label: &str, location: Location, width: u32) -> ComponentInstance {
    ComponentInstance::logic("SRC", location)
        .with_label(label)
        .with_end(location, width, PortDirection::Output)
}

pub fn sink(location: Location, width: u32) -> ComponentInstance {
    ComponentInstance::logic("SINK", location).with_end(location, width, PortDirection::Input)
}

/// Edge-triggered register: end 0 clock, end 1 data, end 2 output.
pub fn flip_flop(clock: Location, d: Location, q: Location) -> ComponentInstance {
    ComponentInstance::logic("DFF", clock)
        .with_end(clock, 1, PortDirection::Input)
        .with_end(d, 1, PortDirection::Input)
        .with_end(q, 1, PortDirection::Output)
        .with_traits(|traits| traits.clock_pins = vec![0])
}

pub fn and_gate(a: Location, b: Location, y: Location) -> ComponentInstance {
    ComponentInstance::logic("AND_GATE", y)
        .with_end(a, 1, PortDirection::Input)
        .with_end(b, 1, PortDirection::Input)
        .with_end(y, 1, PortDirection::Output)
}

/// Mappable board component with the given bubble counts.
pub fn board_io(
    hdl_name: &str,
    label: &str,
    end: (Location, u32, PortDirection),
    io: IoBubbles,
) -> ComponentInstance {
    ComponentInstance::logic(hdl_name, end.0)
        .with_label(label)
        .with_end(end.0, end.1, end.2)
        .with_traits(|traits| traits.io = Some(io))
}

pub fn splitter(
    bus: Location,
    bus_width: u32,
    fanouts: &[(Location, u32)],
    bit_map: Vec<Option<usize>>,
) -> ComponentInstance {
    let mut component = ComponentInstance::new(
        ComponentKind::Splitter {
            bit_map,
            no_connect: vec![],
        },
        bus,
    )
    .with_end(bus, bus_width, PortDirection::InOut);
    for (location, width) in fanouts {
        component = component.with_end(*location, *width, PortDirection::InOut);
    }
    component
}

/// Instance of `definition`; each end is (child pin label, location, direction).
pub fn subcircuit(
    definition: &str,
    label: &str,
    ends: &[(&str, Location, u32, PortDirection)],
) -> ComponentInstance {
    let mut component = ComponentInstance::new(
        ComponentKind::Subcircuit {
            definition: definition.into(),
            ports: ends.iter().map(|(port, ..)| port.to_string()).collect(),
        },
        at(0, 0),
    )
    .with_label(label);
    for (_, location, width, direction) in ends {
        component = component.with_end(*location, *width, *direction);
    }
    component
}

/// Register wrapper: clk and d in, q out.
pub fn def_circuit() -> CircuitDef {
    let mut def = CircuitDef::new("DEF");
    def.add(ComponentInstance::input_pin("clk", at(0, 0), 1));
    def.add(ComponentInstance::input_pin("d", at(0, 10), 1));
    def.add(flip_flop(at(10, 0), at(10, 10), at(20, 0)));
    def.add(ComponentInstance::output_pin("q", at(30, 0), 1));
    def.wire(at(0, 0), at(10, 0))
        .wire(at(0, 10), at(10, 10))
        .wire(at(20, 0), at(30, 0));
    def
}

fn def_instance(label: &str, clk: Location, d: Location, q: Location) -> ComponentInstance {
    subcircuit(
        "DEF",
        label,
        &[
            ("clk", clk, 1, PortDirection::Input),
            ("d", d, 1, PortDirection::Input),
            ("q", q, 1, PortDirection::Output),
        ],
    )
}

/// Two instances of DEF: `i1` clocked straight from the generator, `i2`
/// through an AND gate enabled by pin `en`.
pub fn gated_design() -> Design {
    let mut top = CircuitDef::new("top");
    top.add(ComponentInstance::clock(at(0, 0), 1, 1));
    top.add(def_instance("i1", at(10, 0), at(10, 100), at(20, 0)));
    top.add(ComponentInstance::input_pin("din", at(0, 100), 1));
    top.add(ComponentInstance::output_pin("q1", at(30, 0), 1));
    top.add(and_gate(at(40, 40), at(40, 50), at(50, 40)));
    top.add(ComponentInstance::input_pin("en", at(30, 50), 1));
    top.add(def_instance("i2", at(60, 40), at(50, 100), at(80, 40)));
    top.add(ComponentInstance::output_pin("q2", at(90, 40), 1));
    top.wire(at(0, 0), at(10, 0))
        .wire(at(10, 0), at(40, 40))
        .wire(at(0, 100), at(10, 100))
        .wire(at(10, 100), at(50, 100))
        .wire(at(20, 0), at(30, 0))
        .wire(at(30, 50), at(40, 50))
        .wire(at(50, 40), at(60, 40))
        .wire(at(80, 40), at(90, 40));
    Design::new("top").with_circuit(top).with_circuit(def_circuit())
}

pub fn snapshot(design: &Design) -> DesignSnapshot {
    NetguardCore::snapshot(design, &CheckOptions::default()).expect("pipeline runs")
}

pub fn build_netlist(circuit: &CircuitDef) -> (Netlist, IssueCollector) {
    let mut collector = IssueCollector::new();
    let suppressed = BTreeSet::new();
    let netlist = {
        let mut diag = Diagnostics::new(&mut collector, &suppressed);
        Netlist::build(circuit, &BTreeMap::new(), &HdlLabels, &mut diag).expect("netlist builds")
    };
    (netlist, collector)
}

pub fn rule_count(snapshot: &DesignSnapshot, rule_id: &str) -> usize {
    snapshot.issues.iter().filter(|i| i.rule_id == rule_id).count()
}
