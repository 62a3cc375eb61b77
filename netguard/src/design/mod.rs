//! Design snapshots: the circuit graph handed to the analysis pipeline.

pub mod schema;

pub use schema::*;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum DesignError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("top circuit '{0}' is not defined")]
    UnknownTop(String),
    #[error("circuit '{circuit}': component {component} instantiates unknown circuit '{definition}'")]
    UnknownDefinition {
        circuit: String,
        component: ComponentId,
        definition: String,
    },
    #[error("circuit '{circuit}': component {component}: {reason}")]
    Malformed {
        circuit: String,
        component: ComponentId,
        reason: String,
    },
}

/// A whole project: every circuit definition plus the one to analyze from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Design {
    pub top: String,
    #[serde(default)]
    pub circuits: Vec<CircuitDef>,
}

impl Design {
    pub fn new(top: impl Into<String>) -> Self {
        Self {
            top: top.into(),
            circuits: Vec::new(),
        }
    }

    pub fn with_circuit(mut self, circuit: CircuitDef) -> Self {
        self.circuits.push(circuit);
        self
    }

    pub fn from_json_str(content: &str) -> Result<Self, DesignError> {
        serde_json::from_str(content).map_err(|e| DesignError::Parse(e.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self, DesignError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// First circuit carrying `name`.
    pub fn circuit(&self, name: &str) -> Option<&CircuitDef> {
        self.circuits.iter().find(|c| c.name == name)
    }

    /// SHA-256 over the canonical JSON form, hex encoded.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(self).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }

    /// Rejects snapshots no classifier could have produced.
    ///
    /// Naming problems (empty or duplicated circuit names, bad labels) are
    /// left to the design rule checks; this only guards the shape of the
    /// graph so later stages can index without bounds surprises. The top is
    /// resolved by the caller, which may override the stored one.
    pub fn validate(&self) -> Result<(), DesignError> {
        let names: HashSet<&str> = self.circuits.iter().map(|c| c.name.as_str()).collect();

        for circuit in &self.circuits {
            for (index, component) in circuit.components.iter().enumerate() {
                let id = ComponentId(index);
                let malformed = |reason: String| DesignError::Malformed {
                    circuit: circuit.name.clone(),
                    component: id,
                    reason,
                };

                if let Some(end) = component.ends.iter().position(|e| e.width == 0) {
                    return Err(malformed(format!("end {} has zero width", end)));
                }

                match &component.kind {
                    ComponentKind::Splitter {
                        bit_map,
                        no_connect,
                    } => validate_splitter(&component.ends, bit_map, no_connect)
                        .map_err(malformed)?,
                    ComponentKind::Clock { .. } => {
                        let shape_ok = component.ends.len() == 1
                            && component.ends[0].width == 1
                            && component.ends[0].direction == PortDirection::Output;
                        if !shape_ok {
                            return Err(malformed(
                                "clock generator needs exactly one 1-bit output end".into(),
                            ));
                        }
                    }
                    ComponentKind::Pin | ComponentKind::Tunnel => {
                        if component.ends.len() != 1 {
                            return Err(malformed(format!(
                                "{} needs exactly one end",
                                component.kind.name()
                            )));
                        }
                    }
                    ComponentKind::Subcircuit { definition, ports } => {
                        if !names.contains(definition.as_str()) {
                            return Err(DesignError::UnknownDefinition {
                                circuit: circuit.name.clone(),
                                component: id,
                                definition: definition.clone(),
                            });
                        }
                        if ports.len() != component.ends.len() {
                            return Err(malformed(format!(
                                "{} port labels for {} ends",
                                ports.len(),
                                component.ends.len()
                            )));
                        }
                    }
                    ComponentKind::Logic(traits) => {
                        if let Some(pin) =
                            traits.clock_pins.iter().find(|&&p| p >= component.ends.len())
                        {
                            return Err(malformed(format!("clock pin {} out of range", pin)));
                        }
                    }
                    ComponentKind::Probe => {}
                }
            }
        }
        Ok(())
    }
}

fn validate_splitter(
    ends: &[PortEnd],
    bit_map: &[Option<usize>],
    no_connect: &[usize],
) -> Result<(), String> {
    if ends.len() < 2 {
        return Err("splitter needs a bus end and at least one fan-out end".into());
    }
    if bit_map.len() != ends[0].width as usize {
        return Err(format!(
            "bit map has {} entries for a {}-bit bus",
            bit_map.len(),
            ends[0].width
        ));
    }
    let mut carried = vec![0u32; ends.len()];
    for end in bit_map.iter().flatten() {
        if *end == 0 || *end >= ends.len() {
            return Err(format!("bit map names invalid fan-out end {}", end));
        }
        carried[*end] += 1;
    }
    for (index, end) in ends.iter().enumerate().skip(1) {
        if carried[index] > 0 && carried[index] != end.width {
            return Err(format!(
                "fan-out end {} is {} bits wide but carries {} bus bits",
                index, end.width, carried[index]
            ));
        }
    }
    if let Some(end) = no_connect.iter().find(|&&e| e == 0 || e >= ends.len()) {
        return Err(format!("no-connect flag on invalid end {}", end));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter_circuit(bit_map: Vec<Option<usize>>) -> Design {
        let mut top = CircuitDef::new("top");
        top.add(
            ComponentInstance::new(
                ComponentKind::Splitter {
                    bit_map,
                    no_connect: vec![],
                },
                Location::new(0, 0),
            )
            .with_end(Location::new(0, 0), 2, PortDirection::InOut)
            .with_end(Location::new(10, 0), 1, PortDirection::InOut)
            .with_end(Location::new(10, 10), 1, PortDirection::InOut),
        );
        Design::new("top").with_circuit(top)
    }

    #[test]
    fn test_validate_leaves_top_to_caller() {
        let design = Design::new("missing").with_circuit(CircuitDef::new("top"));
        assert!(design.validate().is_ok());
        assert!(design.circuit("missing").is_none());
    }

    #[test]
    fn test_validate_splitter_shapes() {
        assert!(splitter_circuit(vec![Some(1), Some(2)]).validate().is_ok());
        assert!(splitter_circuit(vec![Some(1)]).validate().is_err());
        assert!(splitter_circuit(vec![Some(0), Some(2)]).validate().is_err());
        assert!(splitter_circuit(vec![Some(1), Some(1)]).validate().is_err());
    }

    #[test]
    fn test_validate_unknown_definition() {
        let mut top = CircuitDef::new("top");
        top.add(
            ComponentInstance::new(
                ComponentKind::Subcircuit {
                    definition: "nowhere".into(),
                    ports: vec![],
                },
                Location::new(0, 0),
            )
            .with_label("u1"),
        );
        let design = Design::new("top").with_circuit(top);
        assert!(matches!(
            design.validate(),
            Err(DesignError::UnknownDefinition { .. })
        ));
    }

    #[test]
    fn test_content_hash_tracks_changes() {
        let a = splitter_circuit(vec![Some(1), Some(2)]);
        let mut b = a.clone();
        assert_eq!(a.content_hash(), b.content_hash());
        b.circuits[0].wire(Location::new(0, 0), Location::new(0, 5));
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
    }

    #[test]
    fn test_json_component_kinds() {
        let json = r#"{
            "top": "main",
            "circuits": [{
                "name": "main",
                "components": [
                    {"label": "a", "location": {"x": 0, "y": 0},
                     "ends": [{"location": {"x": 0, "y": 0}, "width": 1, "direction": "output"}],
                     "kind": {"type": "pin"}},
                    {"location": {"x": 5, "y": 0},
                     "ends": [{"location": {"x": 5, "y": 0}, "width": 1, "direction": "input"}],
                     "kind": {"type": "logic", "hdl_name": "NOT_GATE"}}
                ],
                "wires": [{"start": {"x": 0, "y": 0}, "end": {"x": 5, "y": 0}}]
            }]
        }"#;
        let design = Design::from_json_str(json).unwrap();
        assert!(design.validate().is_ok());
        let main = design.circuit("main").unwrap();
        assert_eq!(main.components[0].kind, ComponentKind::Pin);
        match &main.components[1].kind {
            ComponentKind::Logic(traits) => {
                assert_eq!(traits.hdl_name, "NOT_GATE");
                assert!(traits.hdl_supported);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
