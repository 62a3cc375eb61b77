//! End-to-end netlist and rule-check scenarios.

mod common;

use common::*;
use netguard::design::{CircuitDef, ComponentInstance, Design, Location, PortDirection};
use netguard::drc::rule_ids;
use netguard::hierarchy::HierarchyPath;
use netguard::netlist::{NetBit, NetRole};
use netguard::prelude::*;
use std::collections::BTreeSet;

#[test]
fn test_shared_wire_endpoints_merge_nets() {
    let mut circuit = CircuitDef::new("top");
    circuit.add(source("a", at(0, 0), 1));
    circuit.add(sink(at(20, 0), 1));
    circuit.add(source("d", at(0, 20), 1));
    circuit.add(sink(at(10, 20), 1));
    circuit
        .wire(at(0, 0), at(10, 0))
        .wire(at(10, 0), at(20, 0))
        .wire(at(0, 20), at(10, 20));

    let (netlist, issues) = build_netlist(&circuit);
    assert_eq!(netlist.nets().len(), 2);
    assert_eq!(netlist.number_of_nets(), 2);
    assert_eq!(netlist.net_at(at(0, 0)), netlist.net_at(at(20, 0)));
    assert_ne!(netlist.net_at(at(0, 0)), netlist.net_at(at(0, 20)));
    assert!(issues.issues().is_empty());
}

#[test]
fn test_bus_split_into_single_bits() {
    let mut circuit = CircuitDef::new("top");
    circuit.add(ComponentInstance::input_pin("data", at(0, 0), 8));
    let fanouts: Vec<(Location, u32)> = (0..8).map(|k| (at(20, 10 * k), 1)).collect();
    let bit_map: Vec<Option<usize>> = (1..=8).map(Some).collect();
    circuit.add(splitter(at(10, 0), 8, &fanouts, bit_map));
    circuit.wire(at(0, 0), at(10, 0));
    for k in 0..8 {
        circuit.add(ComponentInstance::output_pin(
            format!("y{}", k),
            at(30, 10 * k),
            1,
        ));
        circuit.wire(at(20, 10 * k), at(30, 10 * k));
    }

    let (netlist, issues) = build_netlist(&circuit);
    assert!(issues.issues().is_empty());
    let bus = netlist.net_at(at(10, 0)).unwrap();
    assert!(netlist.net(bus).unwrap().is_forced_root());
    assert_eq!(netlist.number_of_buses(), 1);
    assert_eq!(netlist.number_of_nets(), 0);

    for k in 0..8 {
        let fan = netlist.net_at(at(20, 10 * k as i32)).unwrap();
        assert_eq!(
            netlist.net(fan).unwrap().role(),
            &NetRole::Child {
                parent: bus,
                inherited: vec![k]
            }
        );
        let (_, pin) = netlist.output_ports().nth(k).unwrap();
        assert_eq!(pin.point(0, 0).unwrap().net_bit(), Some(NetBit::new(bus, k)));
    }
}

#[test]
fn test_short_circuit_names_both_drivers() {
    let mut top = CircuitDef::new("top");
    top.add(source("u1", at(0, 0), 1));
    top.add(source("u2", at(10, 0), 1));
    top.add(ComponentInstance::output_pin("y", at(20, 0), 1));
    top.wire(at(0, 0), at(10, 0)).wire(at(10, 0), at(20, 0));
    let design = Design::new("top").with_circuit(top);

    let snapshot = snapshot(&design);
    assert_eq!(rule_count(&snapshot, rule_ids::SHORT_CIRCUIT), 1);
    let short = snapshot
        .issues
        .iter()
        .find(|i| i.rule_id == rule_ids::SHORT_CIRCUIT)
        .unwrap();
    assert_eq!(short.severity, Severity::Fatal);
    let names = short.component_names();
    assert!(names.contains(&"u1"));
    assert!(names.contains(&"u2"));
    assert!(snapshot.status.contains(DrcStatus::ERROR));
    assert!(snapshot.top_netlist().is_none());
    assert!(!snapshot.export_allowed());
}

#[test]
fn test_gated_instance_is_flagged_per_instance() {
    let snapshot = snapshot(&gated_design());
    assert_eq!(snapshot.status, DrcStatus::PASSED);

    let root = HierarchyPath::root();
    let expected: BTreeSet<_> = [root.child("i2")].into_iter().collect();
    assert_eq!(snapshot.gated_instances, expected);
    assert_eq!(rule_count(&snapshot, rule_ids::GATED_INCONSISTENCY), 1);
    assert_eq!(rule_count(&snapshot, rule_ids::GATED_CLOCK_TRACE), 1);
    assert_eq!(rule_count(&snapshot, rule_ids::GATED_CLOCK), 0);

    let trace = snapshot
        .issues
        .iter()
        .find(|i| i.rule_id == rule_ids::GATED_CLOCK_TRACE)
        .unwrap();
    assert!(trace.component_names().contains(&"AND_GATE@(50,40)"));

    // i1 is on the generator's tree, i2 only through the gate
    let def = snapshot.netlist("DEF").unwrap();
    let (_, register) = def.normal_components().next().unwrap();
    let clock_pin = register.point(0, 0).unwrap();
    assert_eq!(snapshot.clock_trees.clock_of(&root.child("i1"), clock_pin), Some(0));
    assert_eq!(snapshot.clock_trees.clock_of(&root.child("i2"), clock_pin), None);
}

#[test]
fn test_local_gating_does_not_mask_instance_inconsistency() {
    // DEF gains a second register clocked through an AND of clk and d
    let mut design = gated_design();
    let def = design
        .circuits
        .iter_mut()
        .find(|c| c.name == "DEF")
        .unwrap();
    def.add(and_gate(at(5, 20), at(5, 30), at(15, 20)));
    def.add(flip_flop(at(20, 20), at(20, 30), at(30, 20)));
    def.wire(at(0, 0), at(5, 20))
        .wire(at(0, 10), at(5, 30))
        .wire(at(15, 20), at(20, 20))
        .wire(at(0, 10), at(20, 30));

    let snapshot = snapshot(&design);
    assert_eq!(snapshot.status, DrcStatus::PASSED);

    let root = HierarchyPath::root();
    let expected: BTreeSet<_> = [root.child("i2")].into_iter().collect();
    assert_eq!(snapshot.gated_instances, expected);
    assert_eq!(rule_count(&snapshot, rule_ids::GATED_INCONSISTENCY), 1);

    let local: Vec<_> = snapshot
        .issues
        .iter()
        .filter(|i| i.rule_id == rule_ids::GATED_CLOCK)
        .collect();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].circuit, "DEF");
}

#[test]
fn test_dangling_output_is_reported_once() {
    let mut top = CircuitDef::new("top");
    top.add(ComponentInstance::input_pin("a", at(0, 0), 1));
    top.add(
        ComponentInstance::logic("NOT_GATE", at(20, 0))
            .with_end(at(10, 0), 1, PortDirection::Input)
            .with_end(at(20, 0), 1, PortDirection::Output),
    );
    top.wire(at(0, 0), at(10, 0)).wire(at(20, 0), at(30, 0));
    let design = Design::new("top").with_circuit(top);

    let snapshot = snapshot(&design);
    assert_eq!(rule_count(&snapshot, rule_ids::UNUSED_OUTPUT), 1);
    assert!(snapshot.issues.iter().all(|i| i.severity != Severity::Fatal));
    assert_eq!(snapshot.status, DrcStatus::PASSED);
}

#[test]
fn test_dangling_bit_behind_splitter_chain() {
    let mut top = CircuitDef::new("top");
    top.add(ComponentInstance::input_pin("data", at(0, 0), 4));
    top.add(splitter(
        at(10, 0),
        4,
        &[(at(20, 0), 2), (at(20, 10), 2)],
        vec![Some(1), Some(1), Some(2), Some(2)],
    ));
    top.add(splitter(
        at(30, 0),
        2,
        &[(at(40, 0), 1), (at(40, 10), 1)],
        vec![Some(1), Some(2)],
    ));
    top.add(sink(at(50, 0), 1));
    top.add(sink(at(30, 10), 2));
    top.wire(at(0, 0), at(10, 0))
        .wire(at(20, 0), at(30, 0))
        .wire(at(20, 10), at(30, 10))
        .wire(at(40, 0), at(50, 0))
        .wire(at(40, 10), at(50, 10));
    let design = Design::new("top").with_circuit(top);

    let snapshot = snapshot(&design);
    assert_eq!(rule_count(&snapshot, rule_ids::UNUSED_OUTPUT), 1);
    assert_eq!(rule_count(&snapshot, rule_ids::UNSOURCED_SINK), 0);
    let unused = snapshot
        .issues
        .iter()
        .find(|i| i.rule_id == rule_ids::UNUSED_OUTPUT)
        .unwrap();
    assert_eq!(unused.component_names(), vec!["data"]);
    assert_eq!(snapshot.status, DrcStatus::PASSED);

    // both splitter levels inherit from the input bus
    let netlist = snapshot.top_netlist().unwrap();
    let bus = netlist.net_at(at(10, 0)).unwrap();
    let (_, reader) = netlist.normal_components().next().unwrap();
    assert_eq!(reader.point(0, 0).unwrap().net_bit(), Some(NetBit::new(bus, 0)));
}
