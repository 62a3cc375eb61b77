//! Analysis pipeline
//!
//! `build` turns one design snapshot into a [`DesignSnapshot`]: netlists of
//! every definition that checked clean, plus the top-level bubble, clock and
//! gated-clock results. Nothing is mutated in place; [`SnapshotCache`]
//! reuses results for identical inputs.

use crate::core::{CheckOptions, NetguardError};
use crate::design::{Design, DesignError};
use crate::drc::{
    issue, rule_ids, DesignRuleChecker, Diagnostics, DrcIssue, DrcStatus, IssueCollector, Reporter,
};
use crate::hierarchy::{
    built, BubbleAllocator, BubbleMap, ClockSourceContainer, ClockTreeAnalyzer, ClockTreeContainer,
    GatedClockDetector, HierarchyPath, InstanceTree,
};
use crate::labels::LabelPolicy;
use crate::netlist::{Netlist, NetlistError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct DesignSnapshot {
    pub content_hash: String,
    pub top: String,
    pub status: DrcStatus,
    /// Definitions that built and checked clean.
    #[serde(skip)]
    pub netlists: BTreeMap<String, Netlist>,
    pub bubbles: BubbleMap,
    pub clock_sources: ClockSourceContainer,
    pub clock_trees: ClockTreeContainer,
    pub gated_instances: BTreeSet<HierarchyPath>,
    pub issues: Vec<DrcIssue>,
}

impl DesignSnapshot {
    fn new(content_hash: String, top: String) -> Self {
        Self {
            content_hash,
            top,
            status: DrcStatus::PASSED,
            netlists: BTreeMap::new(),
            bubbles: BubbleMap::default(),
            clock_sources: ClockSourceContainer::default(),
            clock_trees: ClockTreeContainer::default(),
            gated_instances: BTreeSet::new(),
            issues: Vec::new(),
        }
    }

    pub fn netlist(&self, definition: &str) -> Option<&Netlist> {
        self.netlists.get(definition)
    }

    pub fn top_netlist(&self) -> Option<&Netlist> {
        self.netlists.get(&self.top)
    }

    pub fn export_allowed(&self) -> bool {
        self.status.is_passed()
    }
}

/// Runs the whole pass. Findings are stored on the snapshot and forwarded
/// to `reporter`.
pub fn build(
    design: &Design,
    options: &CheckOptions,
    labels: &dyn LabelPolicy,
    reporter: &mut dyn Reporter,
) -> Result<DesignSnapshot, NetguardError> {
    design.validate()?;
    let top = options.top.clone().unwrap_or_else(|| design.top.clone());
    if design.circuit(&top).is_none() {
        return Err(DesignError::UnknownTop(top).into());
    }

    let mut snapshot = DesignSnapshot::new(design.content_hash(), top);
    let mut collector = IssueCollector::new();
    {
        let mut diag = Diagnostics::new(&mut collector, &options.suppressed_rules);
        snapshot.status = run(design, labels, &mut snapshot, &mut diag);
    }
    snapshot.issues = collector.into_issues();
    for finding in &snapshot.issues {
        reporter.report(finding.clone());
    }

    tracing::info!(
        "'{}': {} with {} issue(s), {} netlist(s) built",
        snapshot.top,
        snapshot.status,
        snapshot.issues.len(),
        snapshot.netlists.len()
    );
    Ok(snapshot)
}

fn run(
    design: &Design,
    labels: &dyn LabelPolicy,
    snapshot: &mut DesignSnapshot,
    diag: &mut Diagnostics<'_>,
) -> DrcStatus {
    let checker = DesignRuleChecker::new(labels);

    // Step 1: sheet names
    let status = checker.check_sheet_names(design, diag);
    if !status.is_passed() {
        return status;
    }

    // Step 2: instantiation order
    let Some(tree) = InstanceTree::build(design, &snapshot.top) else {
        return DrcStatus::ERROR;
    };
    let order = match tree.build_order() {
        Ok(order) => order,
        Err(definition) => {
            diag.emit(issue(
                rule_ids::RECURSIVE_INSTANTIATION,
                &definition,
                format!("circuit '{}' instantiates itself", definition),
            ));
            return DrcStatus::ERROR;
        }
    };

    // Step 3: definitions, children first
    let mut status = DrcStatus::PASSED;
    let mut failed = BTreeSet::new();
    for definition in &order {
        let Some(circuit) = design.circuit(definition) else {
            continue;
        };
        if tree
            .children(definition)
            .iter()
            .any(|(_, child)| failed.contains(*child))
        {
            tracing::warn!("skipping '{}': a subcircuit failed its checks", definition);
            failed.insert(definition.clone());
            status |= DrcStatus::REQUIRED;
            continue;
        }

        let mut local = checker.check_annotations(circuit, diag);
        if local.is_passed() {
            match Netlist::build(circuit, &snapshot.netlists, labels, diag) {
                Ok(mut netlist) => {
                    local |= checker.check_netlist(&mut netlist, diag);
                    if local.is_passed() {
                        snapshot.netlists.insert(definition.clone(), netlist);
                    }
                }
                Err(NetlistError::DrcFailed { status: failure, .. }) => local |= failure,
                Err(error) => {
                    report_internal(diag, definition, &error);
                    local |= DrcStatus::ERROR;
                }
            }
        }
        if !local.is_passed() {
            tracing::warn!("circuit '{}' failed: {}", definition, local);
            failed.insert(definition.clone());
            status |= local;
        }
    }
    if !status.is_passed() {
        return status;
    }

    // Step 4: top-level analyses
    let top = snapshot.top.clone();
    match analyze_top(&checker, snapshot, &top, diag) {
        Ok(status) => status,
        Err(error) => {
            report_internal(diag, &top, &error);
            DrcStatus::ERROR
        }
    }
}

fn analyze_top(
    checker: &DesignRuleChecker<'_>,
    snapshot: &mut DesignSnapshot,
    top: &str,
    diag: &mut Diagnostics<'_>,
) -> Result<DrcStatus, NetlistError> {
    let netlists = &snapshot.netlists;
    let bubbles = BubbleAllocator::new(netlists).allocate(top)?;
    let status = checker.check_top_level_io(built(netlists, top)?, bubbles.totals.total(), diag);
    if !status.is_passed() {
        return Ok(status);
    }

    let clocks = ClockTreeAnalyzer::new(netlists).analyze(top)?;
    let gated = GatedClockDetector::new(netlists, &clocks.trees).detect(top, diag)?;

    snapshot.bubbles = bubbles;
    snapshot.clock_sources = clocks.sources;
    snapshot.clock_trees = clocks.trees;
    snapshot.gated_instances = gated.gated_instances;
    Ok(DrcStatus::PASSED)
}

fn report_internal(diag: &mut Diagnostics<'_>, circuit: &str, error: &NetlistError) {
    tracing::warn!("internal error in '{}': {}", circuit, error);
    diag.emit(issue(rule_ids::INTERNAL_ERROR, circuit, error.to_string()));
}

/// Snapshots keyed by the SHA-256 of design and options.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: HashMap<String, Arc<DesignSnapshot>>,
    hits: usize,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_key(design: &Design, options: &CheckOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(design).unwrap_or_default());
        hasher.update(serde_json::to_vec(options).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }

    /// Cached snapshot for identical input, or a fresh build. A hit replays
    /// the stored findings to `reporter`.
    pub fn get_or_build(
        &mut self,
        design: &Design,
        options: &CheckOptions,
        labels: &dyn LabelPolicy,
        reporter: &mut dyn Reporter,
    ) -> Result<Arc<DesignSnapshot>, NetguardError> {
        let key = Self::cache_key(design, options);
        if let Some(snapshot) = self.entries.get(&key) {
            self.hits += 1;
            tracing::debug!("snapshot cache hit for '{}' ({})", snapshot.top, &key[..12]);
            for finding in &snapshot.issues {
                reporter.report(finding.clone());
            }
            return Ok(Arc::clone(snapshot));
        }

        let snapshot = Arc::new(build(design, options, labels, reporter)?);
        self.entries.insert(key, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
