//! Gated clock detection
//!
//! An edge-triggered component whose clock pin is not on a traced clock
//! tree is either gated by local logic (definite) or fed from a port of its
//! definition, in which case the verdict depends on the instance.

use crate::design::ComponentId;
use crate::drc::{issue, rule_ids, Diagnostics};
use crate::hierarchy::clock::ClockTreeContainer;
use crate::hierarchy::{built, Frame, HierarchyPath};
use crate::netlist::{ComponentRole, ConnectionPoint, Netlist, NetlistComponent, NetlistError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GatedClockReport {
    /// Instances whose clocks are gated, flagged for synthesis.
    pub gated_instances: BTreeSet<HierarchyPath>,
    pub gated: BTreeMap<String, BTreeSet<HierarchyPath>>,
    pub not_gated: BTreeMap<String, BTreeSet<HierarchyPath>>,
}

impl GatedClockReport {
    /// Definitions clocked properly in some instances and gated in others.
    pub fn inconsistent(&self) -> impl Iterator<Item = &str> {
        self.gated
            .keys()
            .filter(|definition| self.not_gated.contains_key(*definition))
            .map(String::as_str)
    }
}

/// Clock pins of one netlist that no clock tree reaches.
#[derive(Default)]
struct LevelFindings<'n> {
    clocked: bool,
    local: Vec<&'n NetlistComponent>,
    via_port: Vec<(&'n NetlistComponent, &'n NetlistComponent, ConnectionPoint)>,
}

pub struct GatedClockDetector<'a> {
    netlists: &'a BTreeMap<String, Netlist>,
    trees: &'a ClockTreeContainer,
    no_clock: BTreeSet<(String, ComponentId)>,
    reported: BTreeSet<(String, ComponentId)>,
}

impl<'a> GatedClockDetector<'a> {
    pub fn new(netlists: &'a BTreeMap<String, Netlist>, trees: &'a ClockTreeContainer) -> Self {
        Self {
            netlists,
            trees,
            no_clock: BTreeSet::new(),
            reported: BTreeSet::new(),
        }
    }

    pub fn detect(
        mut self,
        top: &str,
        diag: &mut Diagnostics<'_>,
    ) -> Result<GatedClockReport, NetlistError> {
        let mut report = GatedClockReport::default();
        let mut frames = vec![Frame {
            netlist: built(self.netlists, top)?,
            instance: None,
        }];
        self.visit(&mut frames, &HierarchyPath::root(), &mut report, diag)?;

        let inconsistent: Vec<String> = report.inconsistent().map(str::to_string).collect();
        for definition in inconsistent {
            let mut finding = issue(
                rule_ids::GATED_INCONSISTENCY,
                &definition,
                format!(
                    "circuit '{}' has a proper clock in some instances and a gated clock in others",
                    definition
                ),
            );
            for path in report.gated.get(&definition).into_iter().flatten() {
                finding.add_instance(path);
            }
            diag.emit(finding);
        }
        report.gated_instances = report.gated.values().flatten().cloned().collect();
        if !report.gated_instances.is_empty() {
            tracing::info!("{} gated instance(s)", report.gated_instances.len());
        }
        Ok(report)
    }

    fn visit(
        &mut self,
        frames: &mut Vec<Frame<'a>>,
        path: &HierarchyPath,
        report: &mut GatedClockReport,
        diag: &mut Diagnostics<'_>,
    ) -> Result<(), NetlistError> {
        let Some(netlist) = frames.last().map(|f| f.netlist) else {
            return Err(NetlistError::internal("instance walk lost its frame stack"));
        };
        for (slot, instance) in netlist.subcircuits() {
            frames.push(Frame {
                netlist: built(self.netlists, instance.definition().unwrap_or_default())?,
                instance: Some(slot),
            });
            self.visit(frames, &path.child(instance.label()), report, diag)?;
            frames.pop();
        }

        let findings = self.classify(netlist, path, diag);
        let definition = netlist.name();

        for component in &findings.local {
            if self.reported.insert((definition.to_string(), component.id())) {
                diag.emit(
                    issue(
                        rule_ids::GATED_CLOCK,
                        definition,
                        format!(
                            "clock of {} is driven by logic instead of a clock source",
                            component.name()
                        ),
                    )
                    .with_component(component.id(), component.name())
                    .with_instance(path),
                );
            }
        }

        if frames.len() == 1 {
            for (component, port, _) in &findings.via_port {
                diag.emit(
                    issue(
                        rule_ids::POSSIBLE_GATED_CLOCK,
                        definition,
                        format!(
                            "clock of {} comes from input {} instead of a clock source",
                            component.name(),
                            port.name()
                        ),
                    )
                    .with_component(component.id(), component.name())
                    .with_component(port.id(), port.name()),
                );
            }
            return Ok(());
        }

        // local gating is the same in every instance and was reported above
        if !findings.via_port.is_empty() {
            report
                .gated
                .entry(definition.to_string())
                .or_default()
                .insert(path.clone());
        } else if findings.clocked {
            report
                .not_gated
                .entry(definition.to_string())
                .or_default()
                .insert(path.clone());
        }

        for (component, port, driver) in &findings.via_port {
            diag.emit(
                issue(
                    rule_ids::POSSIBLE_GATED_CLOCK,
                    definition,
                    format!(
                        "clock of {} in {} is not a clock source in this instance",
                        component.name(),
                        path
                    ),
                )
                .with_component(component.id(), component.name())
                .with_instance(path),
            );
            self.trace_up(frames, path, port, driver.bit, diag);
        }
        Ok(())
    }

    fn classify<'n>(
        &mut self,
        netlist: &'n Netlist,
        path: &HierarchyPath,
        diag: &mut Diagnostics<'_>,
    ) -> LevelFindings<'n> {
        let mut findings = LevelFindings::default();
        for (_, component) in netlist.normal_components() {
            for &pin in component.clock_pins() {
                let Some(point) = component.point(pin, 0) else {
                    continue;
                };
                let driver = point.net_bit().and_then(|a| netlist.hidden_source(a));
                let Some(driver) = driver else {
                    if self.no_clock.insert((netlist.name().to_string(), component.id())) {
                        diag.emit(
                            issue(
                                rule_ids::NO_CLOCK_CONNECTION,
                                netlist.name(),
                                format!("clock input of {} is not driven", component.name()),
                            )
                            .with_component(component.id(), component.name()),
                        );
                    }
                    continue;
                };
                findings.clocked = true;
                if self.trees.clock_of(path, point).is_some() {
                    continue;
                }
                match netlist.component_by_id(driver.component) {
                    Some(port) if *port.role() == ComponentRole::InputPort => {
                        findings.via_port.push((component, port, driver));
                    }
                    _ => findings.local.push(component),
                }
            }
        }
        findings
    }

    /// Walks a port-fed clock up the instance stack to whatever drives it,
    /// emitting a notice per hop.
    fn trace_up(
        &self,
        frames: &[Frame<'a>],
        path: &HierarchyPath,
        port: &NetlistComponent,
        bit: usize,
        diag: &mut Diagnostics<'_>,
    ) {
        let mut level = frames.len() - 1;
        let mut path = path.clone();
        let mut bit = bit;
        let Some(mut child_port) = frames[level].netlist.port_index(port.label()) else {
            return;
        };
        while level > 0 {
            let (Some(instance), Some(parent_path)) = (frames[level].instance, path.parent()) else {
                return;
            };
            let parent = frames[level - 1].netlist;
            let driver = parent
                .connection_for_subcircuit(instance, child_port, bit)
                .and_then(|point| point.net_bit())
                .and_then(|address| parent.hidden_source(address))
                .and_then(|driver| parent.component_by_id(driver.component).map(|c| (driver, c)));
            let Some((driver, component)) = driver else {
                return;
            };
            diag.emit(
                issue(
                    rule_ids::GATED_CLOCK_TRACE,
                    parent.name(),
                    format!(
                        "clock for {} is driven by {} at {}",
                        path,
                        component.name(),
                        parent_path
                    ),
                )
                .with_component(component.id(), component.name())
                .with_instance(&path),
            );
            if *component.role() != ComponentRole::InputPort {
                return;
            }
            let Some(next) = parent.port_index(component.label()) else {
                return;
            };
            child_port = next;
            bit = driver.bit;
            path = parent_path;
            level -= 1;
        }
    }
}
