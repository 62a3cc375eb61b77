//! Design rule checks run on circuit definitions and their built netlists.
//!
//! Each check batches its findings per concern: one record per problem
//! class (or per net / per duplicated name) listing every offender.

use crate::design::{CircuitDef, ComponentId, ComponentKind, Design, PortDirection};
use crate::drc::{issue, rule_ids, Diagnostics, DrcIssue, DrcStatus};
use crate::labels::LabelPolicy;
use crate::netlist::{
    ConnectionPoint, HiddenRouting, NetBit, NetId, Netlist, NetlistComponent, PointKind,
};
use std::collections::{BTreeMap, BTreeSet};

pub struct DesignRuleChecker<'a> {
    labels: &'a dyn LabelPolicy,
}

impl<'a> DesignRuleChecker<'a> {
    pub fn new(labels: &'a dyn LabelPolicy) -> Self {
        Self { labels }
    }

    /// Circuit names become entity names: none may be empty or repeated.
    pub fn check_sheet_names(&self, design: &Design, diag: &mut Diagnostics<'_>) -> DrcStatus {
        let mut status = DrcStatus::PASSED;
        let empty = design
            .circuits
            .iter()
            .filter(|c| c.name.trim().is_empty())
            .count();
        if empty > 0 {
            diag.emit(issue(
                rule_ids::SHEET_NAME_EMPTY,
                "",
                format!("{} circuit(s) have an empty name", empty),
            ));
            status |= DrcStatus::ERROR;
        }

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for circuit in design.circuits.iter().filter(|c| !c.name.trim().is_empty()) {
            *counts.entry(self.labels.comparison_key(&circuit.name)).or_default() += 1;
        }
        for (name, count) in counts.into_iter().filter(|(_, n)| *n > 1) {
            diag.emit(issue(
                rule_ids::SHEET_NAME_DUPLICATE,
                name.clone(),
                format!("circuit name '{}' is used by {} circuits", name, count),
            ));
            status |= DrcStatus::ERROR;
        }
        status
    }

    /// Identifier and component-support checks on one definition.
    pub fn check_annotations(&self, circuit: &CircuitDef, diag: &mut Diagnostics<'_>) -> DrcStatus {
        let mut status = DrcStatus::PASSED;
        let type_names: BTreeSet<String> = circuit
            .components
            .iter()
            .filter_map(|c| c.kind.hdl_type_name())
            .map(|name| self.labels.comparison_key(name))
            .collect();

        let mut missing = Vec::new();
        let mut invalid = Vec::new();
        let mut type_clash = Vec::new();
        let mut bad_definition = Vec::new();
        let mut unsupported = Vec::new();
        let mut tristate = Vec::new();
        let mut by_key: BTreeMap<String, Vec<(ComponentId, String)>> = BTreeMap::new();

        for (index, component) in circuit.components.iter().enumerate() {
            let id = ComponentId(index);
            let name = component.display_name();
            match &component.kind {
                ComponentKind::Logic(traits) => {
                    if !traits.hdl_supported {
                        unsupported.push((id, name.clone()));
                    }
                    if traits.tristate {
                        tristate.push((id, name.clone()));
                    }
                }
                ComponentKind::Subcircuit { definition, .. } => {
                    if !self.labels.is_valid(definition) {
                        bad_definition.push((id, name.clone()));
                    }
                }
                _ => {}
            }

            if !component.kind.requires_label() {
                continue;
            }
            if component.label.trim().is_empty() {
                missing.push((id, name));
                continue;
            }
            let key = self.labels.comparison_key(&component.label);
            if type_names.contains(&key) {
                type_clash.push((id, name.clone()));
            } else if !self.labels.is_valid(&component.label) {
                invalid.push((id, name.clone()));
            }
            by_key.entry(key).or_default().push((id, name));
        }

        let batches = [
            (rule_ids::MISSING_LABEL, missing, "component(s) need a label"),
            (rule_ids::INVALID_LABEL, invalid, "label(s) are not valid HDL identifiers"),
            (
                rule_ids::LABEL_IS_TYPE_NAME,
                type_clash,
                "label(s) collide with a component type name",
            ),
            (
                rule_ids::INVALID_DEFINITION_NAME,
                bad_definition,
                "subcircuit(s) instantiate a definition without a valid HDL name",
            ),
            (
                rule_ids::UNSUPPORTED_COMPONENT,
                unsupported,
                "component(s) have no HDL model",
            ),
            (
                rule_ids::TRISTATE_DRIVER,
                tristate,
                "component(s) drive tri-state outputs",
            ),
        ];
        for (rule_id, offenders, what) in batches {
            if offenders.is_empty() {
                continue;
            }
            let mut finding = issue(
                rule_id,
                &circuit.name,
                format!("{} {}", offenders.len(), what),
            );
            for (id, name) in offenders {
                finding.add_component(id, name);
            }
            diag.emit(finding);
            status |= if rule_id == rule_ids::MISSING_LABEL {
                DrcStatus::ANNOTATE_REQUIRED
            } else {
                DrcStatus::ERROR
            };
        }

        for (key, holders) in by_key.into_iter().filter(|(_, h)| h.len() > 1) {
            let mut finding = issue(
                rule_ids::DUPLICATE_LABEL,
                &circuit.name,
                format!("label '{}' is used by {} components", key, holders.len()),
            );
            for (id, name) in holders {
                finding.add_component(id, name);
            }
            diag.emit(finding);
            status |= DrcStatus::ERROR;
        }
        status
    }

    /// All netlist-level checks. Stops after a short circuit.
    pub fn check_netlist(&self, netlist: &mut Netlist, diag: &mut Diagnostics<'_>) -> DrcStatus {
        if !self.check_short_circuits(netlist, diag) {
            return DrcStatus::ERROR;
        }
        self.check_sources_and_sinks(netlist, diag);
        self.check_open_pins(netlist, diag);
        DrcStatus::PASSED
    }

    /// Fatal when two distinct outputs drive one node. Duplicate entries
    /// that resolve to a single driver are pruned instead.
    ///
    /// Returns `true` when the netlist is free of short circuits.
    pub fn check_short_circuits(&self, netlist: &mut Netlist, diag: &mut Diagnostics<'_>) -> bool {
        let mut handled = BTreeSet::new();
        let mut shorted: BTreeMap<NetId, BTreeSet<ConnectionPoint>> = BTreeMap::new();
        let mut prune = Vec::new();

        for (index, net) in netlist.nets().iter().enumerate() {
            if !net.is_root() {
                continue;
            }
            for bit in 0..net.width() as usize {
                let address = NetBit::new(NetId(index), bit);
                if handled.contains(&address) {
                    continue;
                }
                let reach = netlist.routing().reach(address);
                let drivers = HiddenRouting::drivers_over(netlist.nets(), &reach);
                if drivers.len() >= 2 {
                    shorted.entry(address.net).or_default().extend(drivers);
                } else {
                    prune.extend(reach.iter().copied().filter(|a| {
                        netlist
                            .net(a.net)
                            .map(|n| n.bit_sources(a.bit).len() >= 2)
                            .unwrap_or(false)
                    }));
                }
                handled.extend(reach);
            }
        }

        for (net, drivers) in &shorted {
            let mut finding = issue(
                rule_ids::SHORT_CIRCUIT,
                netlist.name(),
                format!("net {} is driven by {} outputs", net, drivers.len()),
            );
            for driver in drivers {
                highlight(&mut finding, netlist, driver);
            }
            if let Some(n) = netlist.net(*net) {
                finding.add_wires(n.segments());
            }
            finding.add_net(net);
            diag.emit(finding);
        }
        if !shorted.is_empty() {
            tracing::warn!(
                "circuit '{}': {} shorted net(s)",
                netlist.name(),
                shorted.len()
            );
            return false;
        }

        for address in prune {
            if let Some(net) = netlist.nets_mut().get_mut(address.net.0) {
                net.prune_sources(address.bit, 0);
            }
        }
        true
    }

    /// Sinks without any driver and outputs nobody reads.
    pub fn check_sources_and_sinks(&self, netlist: &Netlist, diag: &mut Diagnostics<'_>) {
        let mut unsourced: BTreeMap<NetId, Vec<ConnectionPoint>> = BTreeMap::new();
        let mut unused: BTreeMap<NetId, Vec<ConnectionPoint>> = BTreeMap::new();

        for (index, net) in netlist.nets().iter().enumerate() {
            if !net.is_root() {
                continue;
            }
            for bit in 0..net.width() as usize {
                let address = NetBit::new(NetId(index), bit);
                let sinks: Vec<ConnectionPoint> = ports(net.bit_sinks(bit));
                let sources: Vec<ConnectionPoint> = ports(net.bit_sources(bit));
                if !sinks.is_empty() && netlist.drivers(address).is_empty() {
                    unsourced.entry(address.net).or_default().extend(sinks);
                }
                if !sources.is_empty() && netlist.hidden_sinks(address).is_empty() {
                    unused.entry(address.net).or_default().extend(sources);
                }
            }
        }

        for (net, sinks) in unsourced {
            let mut finding = issue(
                rule_ids::UNSOURCED_SINK,
                netlist.name(),
                format!("net {} is read by {} input bit(s) but never driven", net, sinks.len()),
            );
            for sink in &sinks {
                highlight(&mut finding, netlist, sink);
            }
            finding.add_net(net);
            diag.emit(finding);
        }
        for (net, sources) in unused {
            let mut finding = issue(
                rule_ids::UNUSED_OUTPUT,
                netlist.name(),
                format!("net {} is driven but nothing reads it", net),
            );
            for source in &sources {
                highlight(&mut finding, netlist, source);
            }
            finding.add_net(net);
            diag.emit(finding);
        }
    }

    /// Input ends and ports left without a net.
    pub fn check_open_pins(&self, netlist: &Netlist, diag: &mut Diagnostics<'_>) {
        let batches = [
            (
                rule_ids::OPEN_INPUT,
                open_components(netlist.normal_components(), true),
                "component input(s) are not connected",
            ),
            (
                rule_ids::OPEN_SUBCIRCUIT_INPUT,
                open_components(netlist.subcircuits(), true),
                "subcircuit input(s) are not connected",
            ),
            (
                rule_ids::UNCONNECTED_INPUT_PORT,
                open_components(netlist.input_ports(), false),
                "input port(s) are not connected",
            ),
            (
                rule_ids::UNCONNECTED_OUTPUT_PORT,
                open_components(netlist.output_ports(), false),
                "output port(s) are not connected",
            ),
        ];
        for (rule_id, offenders, what) in batches {
            if offenders.is_empty() {
                continue;
            }
            let mut finding = issue(
                rule_id,
                netlist.name(),
                format!("{} {}", offenders.len(), what),
            );
            for (id, name) in offenders {
                finding.add_component(id, name);
            }
            diag.emit(finding);
        }
    }

    /// A top level with nothing to map onto a board cannot be exported.
    pub fn check_top_level_io(
        &self,
        netlist: &Netlist,
        bubble_total: usize,
        diag: &mut Diagnostics<'_>,
    ) -> DrcStatus {
        if netlist.port_count() > 0 || bubble_total > 0 {
            return DrcStatus::PASSED;
        }
        diag.emit(issue(
            rule_ids::TOP_LEVEL_NO_IO,
            netlist.name(),
            format!("top circuit '{}' has no ports and no mappable I/O", netlist.name()),
        ));
        DrcStatus::ERROR
    }
}

fn ports(points: &[ConnectionPoint]) -> Vec<ConnectionPoint> {
    points
        .iter()
        .filter(|p| p.kind == PointKind::Port)
        .copied()
        .collect()
}

fn highlight(finding: &mut DrcIssue, netlist: &Netlist, point: &ConnectionPoint) {
    let name = netlist
        .component_by_id(point.component)
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| point.component.to_string());
    finding.add_component(point.component, name);
}

/// Components with unbound bits, on input ends only when `inputs_only`.
fn open_components<'n>(
    components: impl Iterator<Item = (usize, &'n NetlistComponent)>,
    inputs_only: bool,
) -> Vec<(ComponentId, String)> {
    components
        .filter(|(_, component)| {
            component.ends().iter().any(|end| {
                (!inputs_only || end.direction() == PortDirection::Input)
                    && end.unbound_bits().next().is_some()
            })
        })
        .map(|(_, component)| (component.id(), component.name().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::{ComponentInstance, Location};
    use crate::drc::{IssueCollector, Severity};
    use crate::labels::HdlLabels;

    fn run<T>(f: impl FnOnce(&mut Diagnostics<'_>) -> T) -> (T, IssueCollector) {
        let mut collector = IssueCollector::new();
        let suppressed = BTreeSet::new();
        let result = {
            let mut diag = Diagnostics::new(&mut collector, &suppressed);
            f(&mut diag)
        };
        (result, collector)
    }

    fn build(circuit: &CircuitDef) -> Netlist {
        let (netlist, _) = run(|diag| Netlist::build(circuit, &BTreeMap::new(), &HdlLabels, diag));
        netlist.unwrap()
    }

    fn source(location: Location, width: u32) -> ComponentInstance {
        ComponentInstance::logic("SRC", location).with_end(location, width, PortDirection::Output)
    }

    fn sink(location: Location, width: u32) -> ComponentInstance {
        ComponentInstance::logic("SINK", location).with_end(location, width, PortDirection::Input)
    }

    #[test]
    fn test_sheet_names() {
        let design = Design::new("a")
            .with_circuit(CircuitDef::new("a"))
            .with_circuit(CircuitDef::new("A"))
            .with_circuit(CircuitDef::new(""));
        let checker = DesignRuleChecker::new(&HdlLabels);
        let (status, collector) = run(|diag| checker.check_sheet_names(&design, diag));
        assert!(status.contains(DrcStatus::ERROR));
        assert_eq!(collector.count(rule_ids::SHEET_NAME_EMPTY), 1);
        assert_eq!(collector.count(rule_ids::SHEET_NAME_DUPLICATE), 1);
    }

    #[test]
    fn test_annotation_findings() {
        let mut circuit = CircuitDef::new("top");
        circuit.add(ComponentInstance::input_pin("", Location::new(0, 0), 1));
        circuit.add(ComponentInstance::input_pin("data", Location::new(0, 10), 1));
        circuit.add(ComponentInstance::output_pin("DATA", Location::new(0, 20), 1));
        circuit.add(ComponentInstance::output_pin("signal", Location::new(0, 30), 1));
        circuit.add(
            ComponentInstance::logic("REGISTER", Location::new(0, 40))
                .with_label("register")
                .with_traits(|t| t.requires_label = true),
        );
        circuit.add(
            ComponentInstance::logic("BUFFER", Location::new(0, 50)).with_traits(|t| {
                t.tristate = true;
                t.hdl_supported = false;
            }),
        );

        let checker = DesignRuleChecker::new(&HdlLabels);
        let (status, collector) = run(|diag| checker.check_annotations(&circuit, diag));
        assert!(status.contains(DrcStatus::ANNOTATE_REQUIRED));
        assert!(status.contains(DrcStatus::ERROR));
        assert_eq!(collector.count(rule_ids::MISSING_LABEL), 1);
        assert_eq!(collector.count(rule_ids::DUPLICATE_LABEL), 1);
        assert_eq!(collector.count(rule_ids::INVALID_LABEL), 1);
        assert_eq!(collector.count(rule_ids::LABEL_IS_TYPE_NAME), 1);
        assert_eq!(collector.count(rule_ids::UNSUPPORTED_COMPONENT), 1);
        assert_eq!(collector.count(rule_ids::TRISTATE_DRIVER), 1);

        let duplicate = collector
            .issues()
            .iter()
            .find(|i| i.rule_id == rule_ids::DUPLICATE_LABEL)
            .unwrap();
        assert_eq!(duplicate.component_names(), vec!["data", "DATA"]);
    }

    #[test]
    fn test_clean_annotations_pass() {
        let mut circuit = CircuitDef::new("top");
        circuit.add(ComponentInstance::input_pin("a", Location::new(0, 0), 1));
        circuit.add(ComponentInstance::output_pin("y", Location::new(0, 10), 1));
        circuit.add(ComponentInstance::logic("AND_GATE", Location::new(0, 20)));
        let checker = DesignRuleChecker::new(&HdlLabels);
        let (status, collector) = run(|diag| checker.check_annotations(&circuit, diag));
        assert!(status.is_passed());
        assert!(collector.issues().is_empty());
    }

    #[test]
    fn test_short_circuit_names_both_drivers() {
        let mut circuit = CircuitDef::new("top");
        circuit.add(source(Location::new(0, 0), 1).with_label("u1"));
        circuit.add(source(Location::new(10, 0), 1).with_label("u2"));
        circuit.add(sink(Location::new(20, 0), 1));
        circuit
            .wire(Location::new(0, 0), Location::new(10, 0))
            .wire(Location::new(10, 0), Location::new(20, 0));

        let mut netlist = build(&circuit);
        assert!(netlist.has_short_circuit(NetBit::new(NetId(0), 0)));
        let checker = DesignRuleChecker::new(&HdlLabels);
        let (status, collector) = run(|diag| checker.check_netlist(&mut netlist, diag));
        assert_eq!(status, DrcStatus::ERROR);
        assert_eq!(collector.issues().len(), 1);
        let short = &collector.issues()[0];
        assert_eq!(short.severity, Severity::Fatal);
        assert_eq!(short.component_names(), vec!["u1", "u2"]);
    }

    /// Bus X reaches net Y through two parallel splitters.
    fn parallel_paths() -> CircuitDef {
        let mut circuit = CircuitDef::new("top");
        circuit.add(source(Location::new(0, 10), 2));
        for (bus, fan) in [((0, 10), (20, 0)), ((10, 10), (30, 0))] {
            circuit.add(
                ComponentInstance::new(
                    ComponentKind::Splitter {
                        bit_map: vec![Some(1), None],
                        no_connect: Vec::new(),
                    },
                    Location::new(bus.0, bus.1),
                )
                .with_end(Location::new(bus.0, bus.1), 2, PortDirection::InOut)
                .with_end(Location::new(fan.0, fan.1), 1, PortDirection::InOut),
            );
        }
        circuit.add(sink(Location::new(30, 0), 1));
        circuit
            .wire(Location::new(0, 10), Location::new(10, 10))
            .wire(Location::new(20, 0), Location::new(30, 0));
        circuit
    }

    #[test]
    fn test_duplicate_splitter_paths_are_pruned() {
        let mut netlist = build(&parallel_paths());
        let y = netlist.net_at(Location::new(20, 0)).unwrap();
        assert!(netlist.net(y).unwrap().is_forced_root());
        assert_eq!(netlist.net(y).unwrap().bit_sources(0).len(), 2);
        assert!(!netlist.has_short_circuit(NetBit::new(y, 0)));

        let checker = DesignRuleChecker::new(&HdlLabels);
        let (status, collector) = run(|diag| checker.check_netlist(&mut netlist, diag));
        assert!(status.is_passed());
        assert_eq!(collector.count(rule_ids::SHORT_CIRCUIT), 0);
        assert_eq!(netlist.net(y).unwrap().bit_sources(0).len(), 1);
        // bus bit 1 is driven and read by nobody
        assert_eq!(collector.count(rule_ids::UNUSED_OUTPUT), 1);
    }

    #[test]
    fn test_unsourced_sink_and_open_pins() {
        let mut circuit = CircuitDef::new("top");
        circuit.add(
            ComponentInstance::logic("AND_GATE", Location::new(20, 0))
                .with_end(Location::new(10, 0), 1, PortDirection::Input)
                .with_end(Location::new(10, 10), 1, PortDirection::Input)
                .with_end(Location::new(20, 0), 1, PortDirection::Output),
        );
        circuit.add(ComponentInstance::output_pin("y", Location::new(30, 0), 1));
        circuit.add(ComponentInstance::input_pin("a", Location::new(50, 50), 1));
        circuit
            .wire(Location::new(0, 0), Location::new(10, 0))
            .wire(Location::new(20, 0), Location::new(30, 0));

        let mut netlist = build(&circuit);
        let checker = DesignRuleChecker::new(&HdlLabels);
        let (status, collector) = run(|diag| checker.check_netlist(&mut netlist, diag));
        assert!(status.is_passed());
        assert_eq!(collector.count(rule_ids::UNSOURCED_SINK), 1);
        assert_eq!(collector.count(rule_ids::OPEN_INPUT), 1);
        assert_eq!(collector.count(rule_ids::UNCONNECTED_INPUT_PORT), 1);
        assert_eq!(collector.count(rule_ids::UNCONNECTED_OUTPUT_PORT), 0);
    }

    #[test]
    fn test_top_level_without_io() {
        let netlist = build(&CircuitDef::new("empty"));
        let checker = DesignRuleChecker::new(&HdlLabels);
        let (status, collector) = run(|diag| checker.check_top_level_io(&netlist, 0, diag));
        assert_eq!(status, DrcStatus::ERROR);
        assert_eq!(collector.count(rule_ids::TOP_LEVEL_NO_IO), 1);

        let (status, _) = run(|diag| checker.check_top_level_io(&netlist, 3, diag));
        assert!(status.is_passed());
    }
}
