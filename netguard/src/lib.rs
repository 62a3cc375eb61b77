//! Netguard - netlist construction and design rule checks for hierarchical
//! digital circuits
//!
//! This library resolves drawn circuits into addressable netlists (through
//! bus splitters and named tunnels), checks them for structural problems
//! such as short circuits and open inputs, numbers every board-facing I/O
//! pin across the instantiation hierarchy, and traces clock sources to
//! detect gated clocks.
//!
//! # Quick Start
//!
//! ```no_run
//! use netguard::{CheckOptions, NetguardCore};
//! use std::path::Path;
//!
//! let result = NetguardCore::check_file(
//!     Path::new("design.json"),
//!     CheckOptions::default(),
//! ).unwrap();
//!
//! println!("status: {}", result.status);
//! for issue in &result.issues {
//!     println!("{} [{}]: {}", issue.severity, issue.rule_id, issue.message);
//! }
//! ```
//!
//! # Features
//!
//! - **Netlists**: wire merging, tunnels, splitter inheritance, hidden routing
//! - **Design rule checks**: shorts, unsourced sinks, labels, open pins
//! - **Hierarchy**: per-instance bubble numbering, clock trees, gated clocks
//! - **Caching**: snapshots keyed by a SHA-256 of the input

pub mod core;
pub mod design;
pub mod drc;
pub mod hierarchy;
pub mod labels;
pub mod netlist;
pub mod pipeline;

// Re-export main types
pub use crate::core::{
    discover_design_files, CheckOptions, CheckResult, CheckStats, NetguardCore, NetguardError,
};
pub use design::{CircuitDef, ComponentId, ComponentInstance, ComponentKind, Design, Location};
pub use drc::{DrcIssue, DrcStatus, IssueCollector, Reporter, Severity};
pub use hierarchy::HierarchyPath;
pub use labels::{HdlLabels, LabelPolicy};
pub use netlist::Netlist;
pub use pipeline::{DesignSnapshot, SnapshotCache};

/// Parse a design snapshot file (convenience wrapper).
pub fn parse_design(path: &std::path::Path) -> Result<Design, NetguardError> {
    Design::from_path(path).map_err(NetguardError::from)
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        CheckOptions, CheckResult, CheckStats, Design, DrcIssue, DrcStatus, NetguardCore,
        NetguardError, Severity,
    };
}
