//! Clock sources and clock trees
//!
//! A clock source is identified by its timing alone. Each generator is
//! traced through hidden routing to every sink it reaches, descending into
//! subcircuit inputs and climbing out through output ports, with marks
//! recorded per hierarchy path.

use crate::design::ComponentId;
use crate::hierarchy::{built, Frame, HierarchyPath};
use crate::netlist::{ComponentRole, ConnectionPoint, NetBit, Netlist, NetlistError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// High and low half-periods, in simulation ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClockTiming {
    pub high: u32,
    pub low: u32,
}

impl ClockTiming {
    pub const fn new(high: u32, low: u32) -> Self {
        Self { high, low }
    }
}

/// Deduplicated clock timings; a timing's position is its clock id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClockSourceContainer {
    sources: Vec<ClockTiming>,
    requires_global_clock: bool,
}

impl ClockSourceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `timing`, registering it on first sight.
    pub fn clock_id(&mut self, timing: ClockTiming) -> usize {
        match self.id_of(timing) {
            Some(id) => id,
            None => {
                self.sources.push(timing);
                self.sources.len() - 1
            }
        }
    }

    pub fn id_of(&self, timing: ClockTiming) -> Option<usize> {
        self.sources.iter().position(|t| *t == timing)
    }

    pub fn sources(&self) -> &[ClockTiming] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Some component needs a native board oscillator.
    pub fn requires_global_clock(&self) -> bool {
        self.requires_global_clock
    }

    pub fn set_requires_global_clock(&mut self, required: bool) {
        self.requires_global_clock = required;
    }
}

/// Generators and marked points of one clock at one hierarchy path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClockTree {
    pub sources: BTreeSet<ComponentId>,
    pub points: BTreeSet<ConnectionPoint>,
    pub nets: BTreeSet<NetBit>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClockTreeContainer {
    trees: BTreeMap<HierarchyPath, BTreeMap<usize, ClockTree>>,
}

impl ClockTreeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    fn tree_mut(&mut self, path: &HierarchyPath, id: usize) -> &mut ClockTree {
        self.trees
            .entry(path.clone())
            .or_default()
            .entry(id)
            .or_default()
    }

    pub fn add_source(&mut self, path: &HierarchyPath, id: usize, generator: ComponentId) {
        self.tree_mut(path, id).sources.insert(generator);
    }

    /// Marks `point` (and the net bit it sits on) as part of clock `id`.
    /// Returns `false` when the point was already marked.
    pub fn mark(&mut self, path: &HierarchyPath, id: usize, point: ConnectionPoint) -> bool {
        let tree = self.tree_mut(path, id);
        if let Some(address) = point.net_bit() {
            tree.nets.insert(address);
        }
        tree.points.insert(point)
    }

    pub fn tree(&self, path: &HierarchyPath, id: usize) -> Option<&ClockTree> {
        self.trees.get(path).and_then(|trees| trees.get(&id))
    }

    pub fn trees(&self) -> &BTreeMap<HierarchyPath, BTreeMap<usize, ClockTree>> {
        &self.trees
    }

    /// Clock whose tree at `path` covers `address`.
    pub fn clock_source_id(&self, path: &HierarchyPath, address: NetBit) -> Option<usize> {
        self.trees
            .get(path)?
            .iter()
            .find(|(_, tree)| tree.nets.contains(&address))
            .map(|(id, _)| *id)
    }

    /// Clock that reached `point` at `path`.
    pub fn clock_of(&self, path: &HierarchyPath, point: &ConnectionPoint) -> Option<usize> {
        self.trees
            .get(path)?
            .iter()
            .find(|(_, tree)| tree.points.contains(point))
            .map(|(id, _)| *id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClockAnalysis {
    pub sources: ClockSourceContainer,
    pub trees: ClockTreeContainer,
}

pub struct ClockTreeAnalyzer<'a> {
    netlists: &'a BTreeMap<String, Netlist>,
}

impl<'a> ClockTreeAnalyzer<'a> {
    pub fn new(netlists: &'a BTreeMap<String, Netlist>) -> Self {
        Self { netlists }
    }

    pub fn analyze(&self, top: &str) -> Result<ClockAnalysis, NetlistError> {
        let mut analysis = ClockAnalysis::default();
        analysis
            .sources
            .set_requires_global_clock(self.netlists.values().any(Netlist::requires_global_clock));

        let mut frames = vec![Frame {
            netlist: built(self.netlists, top)?,
            instance: None,
        }];
        self.visit(&mut frames, &HierarchyPath::root(), &mut analysis)?;

        tracing::info!(
            "{} clock source(s), {} clocked hierarchy level(s)",
            analysis.sources.len(),
            analysis.trees.trees().len()
        );
        Ok(analysis)
    }

    /// Children first, then this level's generators.
    fn visit(
        &self,
        frames: &mut Vec<Frame<'a>>,
        path: &HierarchyPath,
        analysis: &mut ClockAnalysis,
    ) -> Result<(), NetlistError> {
        let netlist = current(frames)?;
        for (slot, instance) in netlist.subcircuits() {
            let definition = instance.definition().unwrap_or_default();
            frames.push(Frame {
                netlist: built(self.netlists, definition)?,
                instance: Some(slot),
            });
            self.visit(frames, &path.child(instance.label()), analysis)?;
            frames.pop();
        }

        for (_, generator) in netlist.clock_generators() {
            let ComponentRole::Clock { timing } = generator.role() else {
                continue;
            };
            if generator.ends().len() != 1 || generator.width() != 1 {
                return Err(NetlistError::internal(format!(
                    "clock generator {} in '{}' is not a single 1-bit output",
                    generator.name(),
                    netlist.name()
                )));
            }
            let id = analysis.sources.clock_id(*timing);
            analysis.trees.add_source(path, id, generator.id());
            let Some(&point) = generator.point(0, 0) else {
                continue;
            };
            let Some(address) = point.net_bit() else {
                continue;
            };
            analysis.trees.mark(path, id, point);
            self.trace(frames, path, id, address, analysis)?;
        }
        Ok(())
    }

    fn trace(
        &self,
        frames: &mut Vec<Frame<'a>>,
        path: &HierarchyPath,
        id: usize,
        address: NetBit,
        analysis: &mut ClockAnalysis,
    ) -> Result<(), NetlistError> {
        let netlist = current(frames)?;
        for sink in netlist.hidden_sinks(address) {
            if !analysis.trees.mark(path, id, sink) {
                continue;
            }
            let Some(component) = netlist.component_by_id(sink.component) else {
                continue;
            };
            match component.role() {
                ComponentRole::Subcircuit { definition } => {
                    let Some(port) = sink.child_port() else {
                        return Err(NetlistError::internal(format!(
                            "instance {} in '{}' has an end without a child port",
                            component.name(),
                            netlist.name()
                        )));
                    };
                    let child = built(self.netlists, definition)?;
                    let Some(pin) = child
                        .port_slot(port)
                        .and_then(|slot| child.component(slot))
                        .and_then(|pin| pin.point(0, sink.bit))
                        .copied()
                    else {
                        continue;
                    };
                    let child_path = path.child(component.label());
                    if !analysis.trees.mark(&child_path, id, pin) {
                        continue;
                    }
                    let Some(child_address) = pin.net_bit() else {
                        continue;
                    };
                    frames.push(Frame {
                        netlist: child,
                        instance: netlist.slot_of(component.id()),
                    });
                    self.trace(frames, &child_path, id, child_address, analysis)?;
                    frames.pop();
                }
                ComponentRole::OutputPort if frames.len() > 1 => {
                    let Some(output) = netlist
                        .slot_of(component.id())
                        .and_then(|slot| netlist.child_port_of(slot))
                    else {
                        continue;
                    };
                    let (Some(instance), Some(parent_path)) =
                        (frames[frames.len() - 1].instance, path.parent())
                    else {
                        continue;
                    };
                    let parent = frames[frames.len() - 2].netlist;
                    let Some(point) = parent.connection_for_subcircuit(instance, output, sink.bit)
                    else {
                        continue;
                    };
                    if !analysis.trees.mark(&parent_path, id, point) {
                        continue;
                    }
                    let Some(parent_address) = point.net_bit() else {
                        continue;
                    };
                    if let Some(frame) = frames.pop() {
                        let result = self.trace(frames, &parent_path, id, parent_address, analysis);
                        frames.push(frame);
                        result?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn current<'a>(frames: &[Frame<'a>]) -> Result<&'a Netlist, NetlistError> {
    frames
        .last()
        .map(|frame| frame.netlist)
        .ok_or_else(|| NetlistError::internal("instance walk lost its frame stack"))
}
