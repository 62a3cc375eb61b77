//! Nets: maximal sets of directly wired points at one bit width.

use crate::design::Location;
use crate::netlist::connection::ConnectionPoint;
use crate::netlist::NetlistError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Arena index of a net inside its netlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NetId(pub usize);

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// One bit of one net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NetBit {
    pub net: NetId,
    pub bit: usize,
}

impl NetBit {
    pub const fn new(net: NetId, bit: usize) -> Self {
        Self { net, bit }
    }
}

impl fmt::Display for NetBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.net, self.bit)
    }
}

/// Position of a net in the splitter hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NetRole {
    /// Fresh from wire merging.
    Unresolved,
    Root,
    /// Fed by exactly one splitter edge; `inherited[i]` is the parent bit behind own bit `i`.
    Child { parent: NetId, inherited: Vec<usize> },
    /// Root pinned by splitter topology: the top of a bus tree or a net fed
    /// by more than one splitter edge. Never inherits.
    ForcedRoot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Net {
    points: BTreeSet<Location>,
    segments: BTreeSet<usize>,
    width: Option<u32>,
    tunnels: BTreeSet<String>,
    role: NetRole,
    #[serde(skip)]
    sources: Vec<Vec<ConnectionPoint>>,
    #[serde(skip)]
    sinks: Vec<Vec<ConnectionPoint>>,
}

impl Default for Net {
    fn default() -> Self {
        Self::new()
    }
}

impl Net {
    pub fn new() -> Self {
        Self {
            points: BTreeSet::new(),
            segments: BTreeSet::new(),
            width: None,
            tunnels: BTreeSet::new(),
            role: NetRole::Unresolved,
            sources: Vec::new(),
            sinks: Vec::new(),
        }
    }

    /// Net synthesized where two component ends touch without a wire.
    pub fn single_point(location: Location, width: u32) -> Self {
        let mut net = Self::new();
        net.points.insert(location);
        net.width = Some(width);
        net
    }

    pub fn add_segment(&mut self, index: usize, endpoints: [Location; 2]) {
        self.segments.insert(index);
        self.points.extend(endpoints);
    }

    pub fn contains(&self, location: Location) -> bool {
        self.points.contains(&location)
    }

    pub fn points(&self) -> impl Iterator<Item = &Location> {
        self.points.iter()
    }

    /// Indices of the wire segments this net was grown from.
    pub fn segments(&self) -> impl Iterator<Item = usize> + '_ {
        self.segments.iter().copied()
    }

    /// Width in bits; zero until some component end touched the net.
    pub fn width(&self) -> u32 {
        self.width.unwrap_or(0)
    }

    pub fn has_width(&self) -> bool {
        self.width.is_some()
    }

    pub fn is_bus(&self) -> bool {
        self.width() > 1
    }

    /// Width is assigned once; a different second assignment is an error.
    pub fn set_width(&mut self, width: u32) -> Result<(), NetlistError> {
        match self.width {
            Some(existing) if existing != width => Err(NetlistError::WidthConflict {
                existing,
                requested: width,
            }),
            _ => {
                self.width = Some(width);
                Ok(())
            }
        }
    }

    pub fn add_tunnel(&mut self, name: &str) {
        self.tunnels.insert(name.to_string());
    }

    pub fn tunnels(&self) -> &BTreeSet<String> {
        &self.tunnels
    }

    pub fn shares_tunnel(&self, other: &Net) -> bool {
        self.tunnels.intersection(&other.tunnels).next().is_some()
    }

    /// Absorbs `other`; widths must agree when both are set.
    pub fn merge(&mut self, other: Net) -> Result<(), NetlistError> {
        if let Some(width) = other.width {
            self.set_width(width)?;
        }
        self.points.extend(other.points);
        self.segments.extend(other.segments);
        self.tunnels.extend(other.tunnels);
        Ok(())
    }

    pub fn role(&self) -> &NetRole {
        &self.role
    }

    pub fn is_root(&self) -> bool {
        !matches!(self.role, NetRole::Child { .. })
    }

    pub fn is_forced_root(&self) -> bool {
        matches!(self.role, NetRole::ForcedRoot)
    }

    pub fn parent(&self) -> Option<NetId> {
        match &self.role {
            NetRole::Child { parent, .. } => Some(*parent),
            _ => None,
        }
    }

    /// Parent bit behind own bit `bit`, for child nets.
    pub fn inherited_bit(&self, bit: usize) -> Option<usize> {
        match &self.role {
            NetRole::Child { inherited, .. } => inherited.get(bit).copied(),
            _ => None,
        }
    }

    pub fn set_role(&mut self, role: NetRole) {
        self.role = role;
    }

    pub fn force_root(&mut self) {
        self.role = NetRole::ForcedRoot;
    }

    /// Allocates per-bit source and sink lists. Child nets never carry them.
    pub fn initialize_source_sinks(&mut self) {
        self.sources.clear();
        self.sinks.clear();
        if !self.is_root() {
            return;
        }
        let width = self.width() as usize;
        self.sources = vec![Vec::new(); width];
        self.sinks = vec![Vec::new(); width];
    }

    pub fn add_source(&mut self, bit: usize, point: ConnectionPoint) -> bool {
        match self.sources.get_mut(bit) {
            Some(list) => {
                list.push(point);
                true
            }
            None => false,
        }
    }

    pub fn add_sink(&mut self, bit: usize, point: ConnectionPoint) -> bool {
        match self.sinks.get_mut(bit) {
            Some(list) => {
                list.push(point);
                true
            }
            None => false,
        }
    }

    pub fn bit_sources(&self, bit: usize) -> &[ConnectionPoint] {
        self.sources.get(bit).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn bit_sinks(&self, bit: usize) -> &[ConnectionPoint] {
        self.sinks.get(bit).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_bit_source(&self, bit: usize) -> bool {
        !self.bit_sources(bit).is_empty()
    }

    /// Keeps only the `keep`-th source entry of `bit`.
    pub fn prune_sources(&mut self, bit: usize, keep: usize) {
        if let Some(list) = self.sources.get_mut(bit) {
            if keep < list.len() {
                let kept = list[keep];
                list.clear();
                list.push(kept);
            }
        }
    }
}
