//! Core check API shared by the CLI and library users.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::design::{Design, DesignError};
use crate::drc::{DrcIssue, DrcStatus, IssueCollector, Severity};
use crate::labels::HdlLabels;
use crate::pipeline::{self, DesignSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum NetguardError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid design: {0}")]
    Design(DesignError),
    #[error("{0}")]
    Other(String),
}

impl From<DesignError> for NetguardError {
    fn from(e: DesignError) -> Self {
        match e {
            DesignError::Parse(message) => NetguardError::Parse(message),
            DesignError::Io(io) => NetguardError::Io(io),
            other => NetguardError::Design(other),
        }
    }
}

/// Options for check runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOptions {
    /// Normal-severity rule ids to drop.
    #[serde(default)]
    pub suppressed_rules: BTreeSet<String>,
    /// Overrides the design's top circuit.
    #[serde(default)]
    pub top: Option<String>,
}

impl CheckOptions {
    pub fn suppress(mut self, rule_id: impl Into<String>) -> Self {
        self.suppressed_rules.insert(rule_id.into());
        self
    }

    pub fn with_top(mut self, top: impl Into<String>) -> Self {
        self.top = Some(top.into());
        self
    }
}

/// Per-file check result with issues and counts.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub file: PathBuf,
    pub top: String,
    pub status: DrcStatus,
    pub issues: Vec<DrcIssue>,
    pub stats: CheckStats,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckStats {
    pub fatal: usize,
    pub severe: usize,
    pub normal: usize,
}

impl CheckResult {
    pub fn has_fatal(&self) -> bool {
        self.stats.fatal > 0
    }

    pub fn has_severe_or_fatal(&self) -> bool {
        self.stats.fatal > 0 || self.stats.severe > 0
    }

    pub fn total_issues(&self) -> usize {
        self.stats.fatal + self.stats.severe + self.stats.normal
    }

    /// Whether the downstream HDL stage may consume this design.
    pub fn export_allowed(&self) -> bool {
        self.status.is_passed()
    }
}

fn issues_to_stats(issues: &[DrcIssue]) -> CheckStats {
    let mut stats = CheckStats::default();
    for i in issues {
        match i.severity {
            Severity::Fatal => stats.fatal += 1,
            Severity::Severe => stats.severe += 1,
            Severity::Normal => stats.normal += 1,
        }
    }
    stats
}

/// Recursively discover design snapshots (`*.json`) in a directory.
pub fn discover_design_files(dir: &Path) -> Result<Vec<PathBuf>, NetguardError> {
    let mut files = Vec::new();
    walk_dir(dir, &mut files, 0)?;
    files.sort();
    Ok(files)
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>, depth: usize) -> Result<(), NetguardError> {
    if depth > 20 {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with('.') || name == "node_modules" || name == "target" || name == "build" {
                continue;
            }
            walk_dir(&path, files, depth + 1)?;
        } else if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
            files.push(path);
        }
    }
    Ok(())
}

/// Core check API used by the CLI.
pub struct NetguardCore;

impl NetguardCore {
    /// Check one design snapshot file.
    pub fn check_file(path: &Path, options: CheckOptions) -> Result<CheckResult, NetguardError> {
        let design = Design::from_path(path)?;
        Self::check_design(&design, path, options)
    }

    /// Check an in-memory design; `file` is only used for reporting.
    pub fn check_design(
        design: &Design,
        file: &Path,
        options: CheckOptions,
    ) -> Result<CheckResult, NetguardError> {
        let snapshot = Self::snapshot(design, &options)?;
        let stats = issues_to_stats(&snapshot.issues);
        Ok(CheckResult {
            file: file.to_path_buf(),
            top: snapshot.top,
            status: snapshot.status,
            issues: snapshot.issues,
            stats,
            checked_at: Utc::now(),
        })
    }

    /// Full analysis result, including netlists and hierarchy data.
    pub fn snapshot(design: &Design, options: &CheckOptions) -> Result<DesignSnapshot, NetguardError> {
        let mut collector = IssueCollector::new();
        pipeline::build(design, options, &HdlLabels, &mut collector)
    }

    /// Check every design snapshot found under a directory.
    pub fn check_directory(
        dir: &Path,
        options: CheckOptions,
    ) -> Result<Vec<CheckResult>, NetguardError> {
        let files = discover_design_files(dir)?;
        let mut results = Vec::new();
        for path in files {
            results.push(Self::check_file(&path, options.clone())?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_by_severity() {
        let issues = vec![
            DrcIssue::new("a", Severity::Fatal, "top", ""),
            DrcIssue::new("b", Severity::Normal, "top", ""),
            DrcIssue::new("c", Severity::Normal, "top", ""),
        ];
        let stats = issues_to_stats(&issues);
        assert_eq!(
            stats,
            CheckStats {
                fatal: 1,
                severe: 0,
                normal: 2
            }
        );
    }

    #[test]
    fn test_design_errors_map_onto_crate_errors() {
        let parse: NetguardError = DesignError::Parse("bad".into()).into();
        assert!(matches!(parse, NetguardError::Parse(_)));
        let top: NetguardError = DesignError::UnknownTop("x".into()).into();
        assert!(matches!(top, NetguardError::Design(_)));
    }

    #[test]
    fn test_options_round_trip() {
        let options = CheckOptions::default()
            .suppress("unused_output")
            .with_top("main");
        let json = serde_json::to_string(&options).unwrap();
        let back: CheckOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
        let empty: CheckOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, CheckOptions::default());
    }
}
