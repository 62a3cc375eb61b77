use crate::design::{ComponentId, IoBubbles};
use crate::hierarchy::clock::ClockTiming;
use crate::netlist::connection::{ConnectionEnd, ConnectionPoint, PortList};
use serde::Serialize;

/// How a registered component takes part in its netlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ComponentRole {
    Normal,
    Subcircuit { definition: String },
    Clock { timing: ClockTiming },
    InputPort,
    OutputPort,
    InOutPort,
}

impl ComponentRole {
    pub fn port_list(&self) -> Option<PortList> {
        match self {
            ComponentRole::InputPort => Some(PortList::Input),
            ComponentRole::OutputPort => Some(PortList::Output),
            ComponentRole::InOutPort => Some(PortList::InOut),
            _ => None,
        }
    }
}

/// A component instance with its ports resolved onto nets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetlistComponent {
    id: ComponentId,
    name: String,
    label: String,
    role: ComponentRole,
    ends: Vec<ConnectionEnd>,
    clock_pins: Vec<usize>,
    io: Option<IoBubbles>,
    requires_global_clock: bool,
}

impl NetlistComponent {
    pub fn new(id: ComponentId, name: String, label: String, role: ComponentRole) -> Self {
        Self {
            id,
            name,
            label,
            role,
            ends: Vec::new(),
            clock_pins: Vec::new(),
            io: None,
            requires_global_clock: false,
        }
    }

    pub fn with_clock_pins(mut self, pins: Vec<usize>) -> Self {
        self.clock_pins = pins;
        self
    }

    pub fn with_io(mut self, io: Option<IoBubbles>) -> Self {
        self.io = io;
        self
    }

    pub fn with_global_clock(mut self, required: bool) -> Self {
        self.requires_global_clock = required;
        self
    }

    pub fn push_end(&mut self, end: ConnectionEnd) {
        self.ends.push(end);
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Display name for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical HDL label; also the hierarchy-path segment of subcircuits.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn role(&self) -> &ComponentRole {
        &self.role
    }

    pub fn definition(&self) -> Option<&str> {
        match &self.role {
            ComponentRole::Subcircuit { definition } => Some(definition),
            _ => None,
        }
    }

    pub fn ends(&self) -> &[ConnectionEnd] {
        &self.ends
    }

    pub fn end(&self, index: usize) -> Option<&ConnectionEnd> {
        self.ends.get(index)
    }

    pub fn end_mut(&mut self, index: usize) -> Option<&mut ConnectionEnd> {
        self.ends.get_mut(index)
    }

    pub fn point(&self, end: usize, bit: usize) -> Option<&ConnectionPoint> {
        self.ends.get(end).and_then(|e| e.get(bit))
    }

    /// End indices of clock-type inputs.
    pub fn clock_pins(&self) -> &[usize] {
        &self.clock_pins
    }

    pub fn is_edge_triggered(&self) -> bool {
        !self.clock_pins.is_empty()
    }

    /// Board-pin map slots, for mappable components.
    pub fn io(&self) -> Option<IoBubbles> {
        self.io
    }

    pub fn requires_global_clock(&self) -> bool {
        self.requires_global_clock
    }

    pub fn width(&self) -> usize {
        self.ends.first().map(ConnectionEnd::width).unwrap_or(0)
    }

    /// End of a subcircuit instance bound to the given child port.
    pub fn end_for_child_port(&self, list: PortList, index: usize) -> Option<usize> {
        self.ends.iter().position(|end| {
            end.get(0)
                .and_then(ConnectionPoint::child_port)
                .map(|p| p.list == list && p.index == index)
                .unwrap_or(false)
        })
    }
}
