//! Connection points and ends: the per-bit view of component ports.

use crate::design::{ComponentId, PortDirection};
use crate::netlist::net::NetBit;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    /// A bit of a real component port.
    Port,
    /// A splitter crossing registered on a net reached through a hop.
    SplitterTap,
}

/// Which port list of a child definition a subcircuit end refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortList {
    Input,
    Output,
    InOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ChildPort {
    pub list: PortList,
    pub index: usize,
}

/// One bit of one component port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionPoint {
    pub component: ComponentId,
    pub end: usize,
    pub bit: usize,
    pub kind: PointKind,
    net: Option<NetBit>,
    child_port: Option<ChildPort>,
}

impl ConnectionPoint {
    pub fn new(component: ComponentId, end: usize, bit: usize, kind: PointKind) -> Self {
        Self {
            component,
            end,
            bit,
            kind,
            net: None,
            child_port: None,
        }
    }

    /// Resolved root address, once bound.
    pub fn net_bit(&self) -> Option<NetBit> {
        self.net
    }

    pub fn is_bound(&self) -> bool {
        self.net.is_some()
    }

    pub fn bind(&mut self, address: NetBit) {
        self.net = Some(address);
    }

    pub fn bound_to(mut self, address: NetBit) -> Self {
        self.net = Some(address);
        self
    }

    pub fn child_port(&self) -> Option<ChildPort> {
        self.child_port
    }

    pub fn set_child_port(&mut self, port: ChildPort) {
        self.child_port = Some(port);
    }

    pub fn is_splitter_tap(&self) -> bool {
        self.kind == PointKind::SplitterTap
    }
}

/// Fixed-width ordered bits of one port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionEnd {
    direction: PortDirection,
    points: Vec<ConnectionPoint>,
}

impl ConnectionEnd {
    pub fn new(component: ComponentId, end: usize, direction: PortDirection, width: u32) -> Self {
        let points = (0..width as usize)
            .map(|bit| ConnectionPoint::new(component, end, bit, PointKind::Port))
            .collect();
        Self { direction, points }
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn is_output(&self) -> bool {
        self.direction == PortDirection::Output
    }

    pub fn width(&self) -> usize {
        self.points.len()
    }

    pub fn get(&self, bit: usize) -> Option<&ConnectionPoint> {
        self.points.get(bit)
    }

    pub fn get_mut(&mut self, bit: usize) -> Option<&mut ConnectionPoint> {
        self.points.get_mut(bit)
    }

    pub fn points(&self) -> &[ConnectionPoint] {
        &self.points
    }

    pub fn points_mut(&mut self) -> &mut [ConnectionPoint] {
        &mut self.points
    }

    pub fn is_connected(&self) -> bool {
        self.points.iter().any(ConnectionPoint::is_bound)
    }

    pub fn unbound_bits(&self) -> impl Iterator<Item = usize> + '_ {
        self.points
            .iter()
            .filter(|p| !p.is_bound())
            .map(|p| p.bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::net::NetId;

    #[test]
    fn test_end_points_start_unbound() {
        let mut end = ConnectionEnd::new(ComponentId(2), 1, PortDirection::Input, 3);
        assert_eq!(end.width(), 3);
        assert!(!end.is_connected());
        end.get_mut(1).unwrap().bind(NetBit::new(NetId(0), 4));
        assert!(end.is_connected());
        assert_eq!(end.unbound_bits().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(end.get(1).unwrap().net_bit(), Some(NetBit::new(NetId(0), 4)));
    }

    #[test]
    fn test_child_port_tag() {
        let mut point = ConnectionPoint::new(ComponentId(0), 0, 0, PointKind::Port);
        assert!(point.child_port().is_none());
        point.set_child_port(ChildPort {
            list: PortList::Output,
            index: 2,
        });
        assert_eq!(point.child_port().map(|p| p.index), Some(2));
        assert!(!point.is_splitter_tap());
    }
}
