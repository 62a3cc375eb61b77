//! Bubble numbering
//!
//! Every board-facing I/O slot gets an index in one of three namespaces
//! (inputs, outputs, inouts). Local numbering restarts at each hierarchy
//! level; global numbering is flat across the design.

use crate::design::IoBubbles;
use crate::hierarchy::{built, HierarchyPath};
use crate::netlist::{Netlist, NetlistError, PortList};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Add, AddAssign};

/// Inclusive index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BubbleRange {
    pub start: usize,
    pub end: usize,
}

impl BubbleRange {
    /// `count` slots from `start`; `None` when empty.
    pub fn new(start: usize, count: usize) -> Option<Self> {
        (count > 0).then(|| Self {
            start,
            end: start + count - 1,
        })
    }

    pub fn size(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn overlaps(&self, other: &BubbleRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BubbleInformationContainer {
    pub inputs: Option<BubbleRange>,
    pub outputs: Option<BubbleRange>,
    pub inouts: Option<BubbleRange>,
}

impl BubbleInformationContainer {
    fn slice(base: BubbleCounts, size: BubbleCounts) -> Self {
        Self {
            inputs: BubbleRange::new(base.inputs, size.inputs),
            outputs: BubbleRange::new(base.outputs, size.outputs),
            inouts: BubbleRange::new(base.inouts, size.inouts),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_none() && self.outputs.is_none() && self.inouts.is_none()
    }

    pub fn counts(&self) -> BubbleCounts {
        let len = |range: Option<BubbleRange>| range.map(|r| r.size()).unwrap_or(0);
        BubbleCounts {
            inputs: len(self.inputs),
            outputs: len(self.outputs),
            inouts: len(self.inouts),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BubbleCounts {
    pub inputs: usize,
    pub outputs: usize,
    pub inouts: usize,
}

impl BubbleCounts {
    pub fn total(&self) -> usize {
        self.inputs + self.outputs + self.inouts
    }
}

impl From<IoBubbles> for BubbleCounts {
    fn from(io: IoBubbles) -> Self {
        Self {
            inputs: io.inputs as usize,
            outputs: io.outputs as usize,
            inouts: io.inouts as usize,
        }
    }
}

impl Add for BubbleCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            inputs: self.inputs + rhs.inputs,
            outputs: self.outputs + rhs.outputs,
            inouts: self.inouts + rhs.inouts,
        }
    }
}

impl AddAssign for BubbleCounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Bubble ranges of every subcircuit instance and mappable component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BubbleMap {
    pub local: BTreeMap<HierarchyPath, BubbleInformationContainer>,
    pub global: BTreeMap<HierarchyPath, BubbleInformationContainer>,
    /// Paths that are mappable components rather than subcircuits.
    pub components: BTreeSet<HierarchyPath>,
    pub totals: BubbleCounts,
}

/// Something a board-pin mapper can assign a physical pin to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappableResource {
    Port { list: PortList, width: usize },
    Component { global: BubbleInformationContainer },
}

impl BubbleMap {
    /// Top-level ports plus every mappable component, keyed by path.
    pub fn mappable_resources(&self, top: &Netlist) -> BTreeMap<HierarchyPath, MappableResource> {
        let root = HierarchyPath::root();
        let mut resources = BTreeMap::new();
        let ports = [
            (PortList::Input, top.input_ports().collect::<Vec<_>>()),
            (PortList::Output, top.output_ports().collect()),
            (PortList::InOut, top.inout_ports().collect()),
        ];
        for (list, components) in ports {
            for (_, port) in components {
                resources.insert(
                    root.child(port.label()),
                    MappableResource::Port {
                        list,
                        width: port.width(),
                    },
                );
            }
        }
        for path in &self.components {
            if let Some(global) = self.global.get(path) {
                resources.insert(path.clone(), MappableResource::Component { global: *global });
            }
        }
        resources
    }
}

pub struct BubbleAllocator<'a> {
    netlists: &'a BTreeMap<String, Netlist>,
    counts: BTreeMap<String, BubbleCounts>,
}

impl<'a> BubbleAllocator<'a> {
    pub fn new(netlists: &'a BTreeMap<String, Netlist>) -> Self {
        Self {
            netlists,
            counts: BTreeMap::new(),
        }
    }

    /// Total bubbles below one definition, memoized per definition.
    pub fn counts(&mut self, definition: &str) -> Result<BubbleCounts, NetlistError> {
        if let Some(counts) = self.counts.get(definition) {
            return Ok(*counts);
        }
        let netlist = built(self.netlists, definition)?;
        let mut total = BubbleCounts::default();
        for (_, instance) in netlist.subcircuits() {
            total += self.counts(instance.definition().unwrap_or_default())?;
        }
        for (_, component) in netlist.normal_components() {
            if let Some(io) = component.io() {
                total += BubbleCounts::from(io);
            }
        }
        self.counts.insert(definition.to_string(), total);
        Ok(total)
    }

    pub fn allocate(&mut self, top: &str) -> Result<BubbleMap, NetlistError> {
        let mut map = BubbleMap {
            totals: self.counts(top)?,
            ..Default::default()
        };
        self.walk(top, &HierarchyPath::root(), BubbleCounts::default(), &mut map)?;
        tracing::info!(
            "bubbles: {} in, {} out, {} inout over {} instance(s)",
            map.totals.inputs,
            map.totals.outputs,
            map.totals.inouts,
            map.global.len()
        );
        Ok(map)
    }

    fn walk(
        &mut self,
        definition: &str,
        path: &HierarchyPath,
        base: BubbleCounts,
        map: &mut BubbleMap,
    ) -> Result<(), NetlistError> {
        let netlist = built(self.netlists, definition)?;
        let mut local = BubbleCounts::default();

        for (_, instance) in netlist.subcircuits() {
            let child = instance.definition().unwrap_or_default();
            let size = self.counts(child)?;
            let child_path = path.child(instance.label());
            if size.total() > 0 {
                map.local
                    .insert(child_path.clone(), BubbleInformationContainer::slice(local, size));
                map.global.insert(
                    child_path.clone(),
                    BubbleInformationContainer::slice(base + local, size),
                );
            }
            self.walk(child, &child_path, base + local, map)?;
            local += size;
        }

        for (_, component) in netlist.normal_components() {
            let Some(size) = component.io().map(BubbleCounts::from) else {
                continue;
            };
            if size.total() == 0 {
                continue;
            }
            let segment = if component.label().is_empty() {
                component.name()
            } else {
                component.label()
            };
            let component_path = path.child(segment);
            map.local
                .insert(component_path.clone(), BubbleInformationContainer::slice(local, size));
            map.global.insert(
                component_path.clone(),
                BubbleInformationContainer::slice(base + local, size),
            );
            map.components.insert(component_path);
            local += size;
        }
        Ok(())
    }
}
