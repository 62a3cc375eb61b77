//! Design rule check diagnostics
//!
//! Every finding is a [`DrcIssue`] pushed through a [`Reporter`]. Rule ids
//! double as message keys; [`RULES`] lists them with their fixed severity.

pub mod checks;

pub use checks::DesignRuleChecker;

use crate::design::ComponentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, individually suppressible.
    Normal,
    Severe,
    /// Aborts the pass for the affected circuit.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Normal => "normal",
            Severity::Severe => "severe",
            Severity::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Graphical object a finding points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Highlight {
    Component { id: ComponentId, name: String },
    Wire { index: usize },
    Net { address: String },
    Instance { path: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct DrcIssue {
    pub id: String,
    pub rule_id: String,
    pub severity: Severity,
    pub circuit: String,
    pub message: String,
    pub highlights: BTreeSet<Highlight>,
}

impl DrcIssue {
    pub fn new(
        rule_id: &str,
        severity: Severity,
        circuit: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            rule_id: rule_id.to_string(),
            severity,
            circuit: circuit.into(),
            message: message.into(),
            highlights: BTreeSet::new(),
        }
    }

    pub fn with_component(mut self, id: ComponentId, name: impl Into<String>) -> Self {
        self.add_component(id, name);
        self
    }

    pub fn add_component(&mut self, id: ComponentId, name: impl Into<String>) {
        self.highlights.insert(Highlight::Component {
            id,
            name: name.into(),
        });
    }

    pub fn add_wires(&mut self, wires: impl IntoIterator<Item = usize>) {
        self.highlights
            .extend(wires.into_iter().map(|index| Highlight::Wire { index }));
    }

    pub fn add_net(&mut self, address: impl fmt::Display) {
        self.highlights.insert(Highlight::Net {
            address: address.to_string(),
        });
    }

    pub fn with_instance(mut self, path: impl fmt::Display) -> Self {
        self.add_instance(path);
        self
    }

    pub fn add_instance(&mut self, path: impl fmt::Display) {
        self.highlights.insert(Highlight::Instance {
            path: path.to_string(),
        });
    }

    /// Names of highlighted components, in highlight order.
    pub fn component_names(&self) -> Vec<&str> {
        self.highlights
            .iter()
            .filter_map(|h| match h {
                Highlight::Component { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Sink for findings.
pub trait Reporter {
    fn report(&mut self, issue: DrcIssue);
}

/// Keeps every finding in memory.
#[derive(Debug, Default)]
pub struct IssueCollector {
    issues: Vec<DrcIssue>,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issues(&self) -> &[DrcIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<DrcIssue> {
        self.issues
    }

    pub fn count(&self, rule_id: &str) -> usize {
        self.issues.iter().filter(|i| i.rule_id == rule_id).count()
    }
}

impl Reporter for IssueCollector {
    fn report(&mut self, issue: DrcIssue) {
        self.issues.push(issue);
    }
}

/// Reporter wrapper applying suppression and keeping severity tallies.
pub struct Diagnostics<'a> {
    reporter: &'a mut dyn Reporter,
    suppressed: &'a BTreeSet<String>,
    fatal: usize,
}

impl<'a> Diagnostics<'a> {
    pub fn new(reporter: &'a mut dyn Reporter, suppressed: &'a BTreeSet<String>) -> Self {
        Self {
            reporter,
            suppressed,
            fatal: 0,
        }
    }

    pub fn emit(&mut self, issue: DrcIssue) {
        if issue.severity == Severity::Normal && self.suppressed.contains(&issue.rule_id) {
            tracing::debug!("suppressed {} in {}", issue.rule_id, issue.circuit);
            return;
        }
        if issue.severity == Severity::Fatal {
            self.fatal += 1;
        }
        self.reporter.report(issue);
    }

    pub fn fatal_count(&self) -> usize {
        self.fatal
    }
}

/// Export gate status. Flags combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DrcStatus(u8);

impl DrcStatus {
    pub const PASSED: Self = Self(0);
    pub const ANNOTATE_REQUIRED: Self = Self(1);
    pub const ERROR: Self = Self(2);
    pub const REQUIRED: Self = Self(4);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn is_passed(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for DrcStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DrcStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for DrcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_passed() {
            return f.write_str("PASSED");
        }
        let names: Vec<&str> = [
            (Self::ANNOTATE_REQUIRED, "ANNOTATE_REQUIRED"),
            (Self::ERROR, "ERROR"),
            (Self::REQUIRED, "REQUIRED"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        f.write_str(&names.join("|"))
    }
}

pub mod rule_ids {
    pub const SHEET_NAME_EMPTY: &str = "sheet_name_empty";
    pub const SHEET_NAME_DUPLICATE: &str = "sheet_name_duplicate";
    pub const RECURSIVE_INSTANTIATION: &str = "recursive_instantiation";
    pub const MISSING_LABEL: &str = "missing_label";
    pub const DUPLICATE_LABEL: &str = "duplicate_label";
    pub const INVALID_LABEL: &str = "invalid_label";
    pub const LABEL_IS_TYPE_NAME: &str = "label_is_type_name";
    pub const INVALID_DEFINITION_NAME: &str = "invalid_definition_name";
    pub const UNSUPPORTED_COMPONENT: &str = "unsupported_component";
    pub const TRISTATE_DRIVER: &str = "tristate_driver";
    pub const NET_WIDTH_CONFLICT: &str = "net_width_conflict";
    pub const COMPONENT_WIDTH_MISMATCH: &str = "component_width_mismatch";
    pub const TUNNEL_WIDTH_MISMATCH: &str = "tunnel_width_mismatch";
    pub const EMPTY_NETS: &str = "empty_nets";
    pub const DUPLICATE_SPLITTER: &str = "duplicate_splitter";
    pub const SPLITTER_END_UNCONNECTED: &str = "splitter_end_unconnected";
    pub const SPLITTER_NO_CONNECT_WIRED: &str = "splitter_no_connect_wired";
    pub const SHORT_CIRCUIT: &str = "short_circuit";
    pub const UNSOURCED_SINK: &str = "unsourced_sink";
    pub const UNUSED_OUTPUT: &str = "unused_output";
    pub const OPEN_INPUT: &str = "open_input";
    pub const OPEN_SUBCIRCUIT_INPUT: &str = "open_subcircuit_input";
    pub const UNCONNECTED_INPUT_PORT: &str = "unconnected_input_port";
    pub const UNCONNECTED_OUTPUT_PORT: &str = "unconnected_output_port";
    pub const TOP_LEVEL_NO_IO: &str = "top_level_no_io";
    pub const NO_CLOCK_CONNECTION: &str = "no_clock_connection";
    pub const GATED_CLOCK: &str = "gated_clock";
    pub const POSSIBLE_GATED_CLOCK: &str = "possible_gated_clock";
    pub const GATED_CLOCK_TRACE: &str = "gated_clock_trace";
    pub const GATED_INCONSISTENCY: &str = "gated_clock_inconsistency";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

pub struct RuleInfo {
    pub id: &'static str,
    pub severity: Severity,
    pub title: &'static str,
    pub description: &'static str,
}

pub const RULES: &[RuleInfo] = &[
    RuleInfo {
        id: rule_ids::SHEET_NAME_EMPTY,
        severity: Severity::Fatal,
        title: "Empty circuit name",
        description: "Every circuit definition needs a name to become an HDL entity",
    },
    RuleInfo {
        id: rule_ids::SHEET_NAME_DUPLICATE,
        severity: Severity::Fatal,
        title: "Duplicate circuit name",
        description: "Two circuit definitions share one name",
    },
    RuleInfo {
        id: rule_ids::RECURSIVE_INSTANTIATION,
        severity: Severity::Fatal,
        title: "Recursive instantiation",
        description: "A circuit instantiates itself directly or through its children",
    },
    RuleInfo {
        id: rule_ids::MISSING_LABEL,
        severity: Severity::Fatal,
        title: "Missing label",
        description: "A component that needs an identifier has none; annotate the circuit",
    },
    RuleInfo {
        id: rule_ids::DUPLICATE_LABEL,
        severity: Severity::Fatal,
        title: "Duplicate label",
        description: "Two components in one circuit share an identifier",
    },
    RuleInfo {
        id: rule_ids::INVALID_LABEL,
        severity: Severity::Fatal,
        title: "Invalid label",
        description: "Identifier has illegal characters or is a VHDL/Verilog keyword",
    },
    RuleInfo {
        id: rule_ids::LABEL_IS_TYPE_NAME,
        severity: Severity::Fatal,
        title: "Label equals a type name",
        description: "Identifier collides with a generated entity name",
    },
    RuleInfo {
        id: rule_ids::INVALID_DEFINITION_NAME,
        severity: Severity::Fatal,
        title: "Invalid circuit name",
        description: "Instantiated circuit name is not a legal HDL identifier",
    },
    RuleInfo {
        id: rule_ids::UNSUPPORTED_COMPONENT,
        severity: Severity::Fatal,
        title: "Unsupported component",
        description: "Component has no HDL implementation",
    },
    RuleInfo {
        id: rule_ids::TRISTATE_DRIVER,
        severity: Severity::Fatal,
        title: "Tri-state driver",
        description: "Tri-state outputs cannot be synthesized",
    },
    RuleInfo {
        id: rule_ids::NET_WIDTH_CONFLICT,
        severity: Severity::Fatal,
        title: "Net width conflict",
        description: "Components of different widths attach to one net",
    },
    RuleInfo {
        id: rule_ids::COMPONENT_WIDTH_MISMATCH,
        severity: Severity::Fatal,
        title: "Touching ends of different widths",
        description: "Two component ends share a location but differ in width",
    },
    RuleInfo {
        id: rule_ids::TUNNEL_WIDTH_MISMATCH,
        severity: Severity::Fatal,
        title: "Tunnel width mismatch",
        description: "Nets joined by a tunnel name have different widths",
    },
    RuleInfo {
        id: rule_ids::EMPTY_NETS,
        severity: Severity::Normal,
        title: "Zero-width nets removed",
        description: "Wires not attached to any component were dropped",
    },
    RuleInfo {
        id: rule_ids::DUPLICATE_SPLITTER,
        severity: Severity::Normal,
        title: "Duplicate splitter removed",
        description: "Two identical splitters sit on top of each other",
    },
    RuleInfo {
        id: rule_ids::SPLITTER_END_UNCONNECTED,
        severity: Severity::Severe,
        title: "Unmapped splitter end",
        description: "A splitter fan-out end has no net attached",
    },
    RuleInfo {
        id: rule_ids::SPLITTER_NO_CONNECT_WIRED,
        severity: Severity::Severe,
        title: "Wired no-connect splitter end",
        description: "A splitter end that carries no bits has a net attached",
    },
    RuleInfo {
        id: rule_ids::SHORT_CIRCUIT,
        severity: Severity::Fatal,
        title: "Short circuit",
        description: "A net bit is driven by more than one distinct output",
    },
    RuleInfo {
        id: rule_ids::UNSOURCED_SINK,
        severity: Severity::Severe,
        title: "Sink without source",
        description: "An input reads a net bit that nothing drives",
    },
    RuleInfo {
        id: rule_ids::UNUSED_OUTPUT,
        severity: Severity::Normal,
        title: "Unused output",
        description: "A driven net bit has no consumer",
    },
    RuleInfo {
        id: rule_ids::OPEN_INPUT,
        severity: Severity::Normal,
        title: "Open component input",
        description: "A component input is not connected",
    },
    RuleInfo {
        id: rule_ids::OPEN_SUBCIRCUIT_INPUT,
        severity: Severity::Severe,
        title: "Open subcircuit input",
        description: "A subcircuit instance input is not connected",
    },
    RuleInfo {
        id: rule_ids::UNCONNECTED_INPUT_PORT,
        severity: Severity::Severe,
        title: "Unconnected input port",
        description: "A circuit input pin drives nothing",
    },
    RuleInfo {
        id: rule_ids::UNCONNECTED_OUTPUT_PORT,
        severity: Severity::Normal,
        title: "Unconnected output port",
        description: "A circuit output pin is not connected",
    },
    RuleInfo {
        id: rule_ids::TOP_LEVEL_NO_IO,
        severity: Severity::Fatal,
        title: "Top level without I/O",
        description: "The top circuit has neither ports nor mappable components",
    },
    RuleInfo {
        id: rule_ids::NO_CLOCK_CONNECTION,
        severity: Severity::Severe,
        title: "Clock input without driver",
        description: "An edge-triggered component's clock pin is open or undriven",
    },
    RuleInfo {
        id: rule_ids::GATED_CLOCK,
        severity: Severity::Severe,
        title: "Gated clock",
        description: "A clock pin is driven by logic instead of a clock source",
    },
    RuleInfo {
        id: rule_ids::POSSIBLE_GATED_CLOCK,
        severity: Severity::Normal,
        title: "Possible gated clock",
        description: "A clock pin is driven through an input port that is not a clock in this instance",
    },
    RuleInfo {
        id: rule_ids::GATED_CLOCK_TRACE,
        severity: Severity::Normal,
        title: "Gated clock trace",
        description: "One hop of the path from a gated clock pin to its real driver",
    },
    RuleInfo {
        id: rule_ids::GATED_INCONSISTENCY,
        severity: Severity::Severe,
        title: "Gated and non-gated instances",
        description: "A circuit is clocked properly in some instances and gated in others",
    },
    RuleInfo {
        id: rule_ids::INTERNAL_ERROR,
        severity: Severity::Fatal,
        title: "Internal error",
        description: "Engine invariant violated; please report with the attached provenance",
    },
];

/// Fixed severity of a rule id.
pub fn rule_severity(rule_id: &str) -> Option<Severity> {
    RULES.iter().find(|r| r.id == rule_id).map(|r| r.severity)
}

/// Builds an issue with the severity registered for `rule_id`.
pub fn issue(rule_id: &str, circuit: impl Into<String>, message: impl Into<String>) -> DrcIssue {
    let severity = rule_severity(rule_id).unwrap_or(Severity::Fatal);
    DrcIssue::new(rule_id, severity, circuit, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flags() {
        let mut status = DrcStatus::PASSED;
        assert!(status.is_passed());
        status |= DrcStatus::ANNOTATE_REQUIRED;
        status |= DrcStatus::ERROR;
        assert!(status.contains(DrcStatus::ERROR));
        assert!(!status.contains(DrcStatus::REQUIRED));
        assert_eq!(status.bits(), 3);
        assert_eq!(status.to_string(), "ANNOTATE_REQUIRED|ERROR");
    }

    #[test]
    fn test_suppression_only_hits_normal() {
        let mut collector = IssueCollector::new();
        let suppressed: BTreeSet<String> = [rule_ids::UNUSED_OUTPUT, rule_ids::UNSOURCED_SINK]
            .iter()
            .map(|s| s.to_string())
            .collect();
        {
            let mut diag = Diagnostics::new(&mut collector, &suppressed);
            diag.emit(issue(rule_ids::UNUSED_OUTPUT, "top", "unused"));
            diag.emit(issue(rule_ids::UNSOURCED_SINK, "top", "open"));
            diag.emit(issue(rule_ids::SHORT_CIRCUIT, "top", "short"));
            assert_eq!(diag.fatal_count(), 1);
        }
        assert_eq!(collector.issues().len(), 2);
        assert_eq!(collector.count(rule_ids::UNUSED_OUTPUT), 0);
    }

    #[test]
    fn test_rule_registry_ids_are_unique() {
        let ids: BTreeSet<&str> = RULES.iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), RULES.len());
        assert_eq!(rule_severity(rule_ids::GATED_INCONSISTENCY), Some(Severity::Severe));
    }

    #[test]
    fn test_issue_highlights() {
        let issue = issue(rule_ids::SHORT_CIRCUIT, "top", "x")
            .with_component(ComponentId(1), "b")
            .with_component(ComponentId(0), "a");
        assert_eq!(issue.component_names(), vec!["a", "b"]);
        assert_eq!(issue.id.len(), 36);
    }
}
