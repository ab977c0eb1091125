//! Vulnerability report types
//!
//! A report is computed once per build and attached to the BuildJob.
//! The `blocked` flag is advisory; whether it fails a build is decided by
//! the build dispatcher.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Finding severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parses a scanner severity label; anything unrecognized is `Unknown`
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "LOW" => Severity::Low,
            "MEDIUM" => Severity::Medium,
            "HIGH" => Severity::High,
            "CRITICAL" => Severity::Critical,
            _ => Severity::Unknown,
        }
    }
}

/// Minimum severity that blocks a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockThreshold {
    /// Never block
    Disabled,
    /// Block if any finding is at least this severe
    AtLeast(Severity),
}

impl BlockThreshold {
    pub fn blocks(self, severity: Severity) -> bool {
        match self {
            BlockThreshold::Disabled => false,
            BlockThreshold::AtLeast(min) => severity != Severity::Unknown && severity >= min,
        }
    }
}

impl Default for BlockThreshold {
    fn default() -> Self {
        BlockThreshold::AtLeast(Severity::Critical)
    }
}

impl FromStr for BlockThreshold {
    type Err = std::convert::Infallible;

    /// `none` disables blocking; unrecognized values fall back to `critical`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "none" => BlockThreshold::Disabled,
            "low" => BlockThreshold::AtLeast(Severity::Low),
            "medium" => BlockThreshold::AtLeast(Severity::Medium),
            "high" => BlockThreshold::AtLeast(Severity::High),
            _ => BlockThreshold::AtLeast(Severity::Critical),
        })
    }
}

/// A single vulnerability reported by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub package_name: String,
    pub fixed_version: Option<String>,
}

/// Histogram of findings by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Unknown => {}
        }
    }
}

impl fmt::Display for SeverityCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "C:{} H:{} M:{} L:{}",
            self.critical, self.high, self.medium, self.low
        )
    }
}

/// Result of scanning a build workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityReport {
    pub scanned: bool,
    pub findings: Vec<Finding>,
    pub severity_counts: SeverityCounts,
    pub blocked: bool,
    pub summary: String,
}

impl VulnerabilityReport {
    /// Builds a report from parsed findings, applying the block threshold
    pub fn from_findings(findings: Vec<Finding>, threshold: BlockThreshold) -> Self {
        let mut severity_counts = SeverityCounts::default();
        for finding in &findings {
            severity_counts.record(finding.severity);
        }

        let blocked = findings.iter().any(|f| threshold.blocks(f.severity));

        let summary = format!(
            "Found {} vulnerabilities ({}){}",
            findings.len(),
            severity_counts,
            if blocked { " - BLOCKED" } else { "" }
        );

        Self {
            scanned: true,
            findings,
            severity_counts,
            blocked,
            summary,
        }
    }

    /// A report for a scan that did not run; never blocks
    pub fn not_scanned(summary: impl Into<String>) -> Self {
        Self {
            scanned: false,
            findings: Vec::new(),
            severity_counts: SeverityCounts::default(),
            blocked: false,
            summary: summary.into(),
        }
    }
}
