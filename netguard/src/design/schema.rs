//! Circuit graph snapshot
//!
//! The input to every analysis pass: circuit definitions made of classified
//! components and wire segments. A component's position in its circuit's
//! component list is its stable arena index.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Grid coordinate of a wire endpoint or component end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// Stable index of a component inside its circuit definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub usize);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
    #[serde(rename = "inout")]
    InOut,
}

impl PortDirection {
    /// Inout ends read the net as well as drive it.
    pub fn is_input(self) -> bool {
        matches!(self, PortDirection::Input | PortDirection::InOut)
    }

    pub fn is_output(self) -> bool {
        matches!(self, PortDirection::Output | PortDirection::InOut)
    }
}

/// One port of a component: where it sits, how wide it is, which way it points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEnd {
    pub location: Location,
    pub width: u32,
    pub direction: PortDirection,
}

impl PortEnd {
    pub fn new(location: Location, width: u32, direction: PortDirection) -> Self {
        Self {
            location,
            width,
            direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireSegment {
    pub start: Location,
    pub end: Location,
}

impl WireSegment {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    pub fn endpoints(&self) -> [Location; 2] {
        [self.start, self.end]
    }
}

/// Board-facing I/O slots a mappable component contributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoBubbles {
    #[serde(default)]
    pub inputs: u32,
    #[serde(default)]
    pub outputs: u32,
    #[serde(default)]
    pub inouts: u32,
}

impl IoBubbles {
    pub fn total(&self) -> u32 {
        self.inputs + self.outputs + self.inouts
    }
}

fn default_true() -> bool {
    true
}

/// Attributes of an ordinary library component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicTraits {
    /// Generated HDL entity name.
    pub hdl_name: String,
    #[serde(default)]
    pub requires_label: bool,
    #[serde(default = "default_true")]
    pub hdl_supported: bool,
    #[serde(default)]
    pub tristate: bool,
    /// End indices of clock-type inputs. Non-empty means edge-triggered.
    #[serde(default)]
    pub clock_pins: Vec<usize>,
    /// Needs a native board oscillator rather than a derived clock.
    #[serde(default)]
    pub requires_global_clock: bool,
    #[serde(default)]
    pub io: Option<IoBubbles>,
}

impl LogicTraits {
    pub fn new(hdl_name: impl Into<String>) -> Self {
        Self {
            hdl_name: hdl_name.into(),
            requires_label: false,
            hdl_supported: true,
            tristate: false,
            clock_pins: Vec::new(),
            requires_global_clock: false,
            io: None,
        }
    }
}

/// Closed classification of everything that can sit in a circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentKind {
    /// End 0 is the combined bus; `bit_map[b]` is the fan-out end carrying bus bit `b`.
    Splitter {
        bit_map: Vec<Option<usize>>,
        #[serde(default)]
        no_connect: Vec<usize>,
    },
    /// Connects every net carrying the same (case-sensitive) label.
    Tunnel,
    Probe,
    Pin,
    Clock {
        high_ticks: u32,
        low_ticks: u32,
    },
    /// `ports[i]` is the child pin label that end `i` attaches to.
    Subcircuit {
        definition: String,
        ports: Vec<String>,
    },
    Logic(LogicTraits),
}

impl ComponentKind {
    /// Entity name a generator would emit for this component, if any.
    pub fn hdl_type_name(&self) -> Option<&str> {
        match self {
            ComponentKind::Logic(traits) => Some(traits.hdl_name.as_str()),
            ComponentKind::Subcircuit { definition, .. } => Some(definition.as_str()),
            _ => None,
        }
    }

    pub fn requires_label(&self) -> bool {
        match self {
            ComponentKind::Subcircuit { .. } | ComponentKind::Pin => true,
            ComponentKind::Logic(traits) => traits.requires_label,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ComponentKind::Splitter { .. } => "splitter",
            ComponentKind::Tunnel => "tunnel",
            ComponentKind::Probe => "probe",
            ComponentKind::Pin => "pin",
            ComponentKind::Clock { .. } => "clock",
            ComponentKind::Subcircuit { .. } => "subcircuit",
            ComponentKind::Logic(_) => "logic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInstance {
    #[serde(default)]
    pub label: String,
    pub location: Location,
    #[serde(default)]
    pub ends: Vec<PortEnd>,
    pub kind: ComponentKind,
}

impl ComponentInstance {
    pub fn new(kind: ComponentKind, location: Location) -> Self {
        Self {
            label: String::new(),
            location,
            ends: Vec::new(),
            kind,
        }
    }

    pub fn logic(hdl_name: impl Into<String>, location: Location) -> Self {
        Self::new(ComponentKind::Logic(LogicTraits::new(hdl_name)), location)
    }

    /// A circuit input port: its single end drives the net.
    pub fn input_pin(label: impl Into<String>, location: Location, width: u32) -> Self {
        Self::new(ComponentKind::Pin, location)
            .with_label(label)
            .with_end(location, width, PortDirection::Output)
    }

    /// A circuit output port: its single end reads the net.
    pub fn output_pin(label: impl Into<String>, location: Location, width: u32) -> Self {
        Self::new(ComponentKind::Pin, location)
            .with_label(label)
            .with_end(location, width, PortDirection::Input)
    }

    pub fn clock(location: Location, high_ticks: u32, low_ticks: u32) -> Self {
        Self::new(
            ComponentKind::Clock {
                high_ticks,
                low_ticks,
            },
            location,
        )
        .with_end(location, 1, PortDirection::Output)
    }

    pub fn tunnel(name: impl Into<String>, location: Location, width: u32) -> Self {
        Self::new(ComponentKind::Tunnel, location)
            .with_label(name)
            .with_end(location, width, PortDirection::InOut)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_end(mut self, location: Location, width: u32, direction: PortDirection) -> Self {
        self.ends.push(PortEnd::new(location, width, direction));
        self
    }

    /// Mutable access to logic attributes; no-op for other kinds.
    pub fn with_traits(mut self, f: impl FnOnce(&mut LogicTraits)) -> Self {
        if let ComponentKind::Logic(traits) = &mut self.kind {
            f(traits);
        }
        self
    }

    pub fn display_name(&self) -> String {
        if self.label.is_empty() {
            match &self.kind {
                ComponentKind::Logic(traits) => format!("{}@{}", traits.hdl_name, self.location),
                other => format!("{}@{}", other.name(), self.location),
            }
        } else {
            self.label.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitDef {
    pub name: String,
    #[serde(default)]
    pub components: Vec<ComponentInstance>,
    #[serde(default)]
    pub wires: Vec<WireSegment>,
}

impl CircuitDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a component and returns its arena index.
    pub fn add(&mut self, component: ComponentInstance) -> ComponentId {
        self.components.push(component);
        ComponentId(self.components.len() - 1)
    }

    pub fn wire(&mut self, start: Location, end: Location) -> &mut Self {
        self.wires.push(WireSegment::new(start, end));
        self
    }

    pub fn component(&self, id: ComponentId) -> Option<&ComponentInstance> {
        self.components.get(id.0)
    }

    pub fn ids(&self) -> impl Iterator<Item = ComponentId> {
        (0..self.components.len()).map(ComponentId)
    }
}
