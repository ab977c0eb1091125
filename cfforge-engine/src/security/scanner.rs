//! Trivy filesystem scan

use cfforge_core::domain::vulnerability::{
    BlockThreshold, Finding, Severity, VulnerabilityReport,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::log_buffer::StepLog;
use crate::process::{Command, CommandRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    pub enabled: bool,
    pub threshold: BlockThreshold,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: BlockThreshold::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyReport {
    #[serde(default)]
    results: Option<Vec<TrivyResult>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyResult {
    #[serde(default)]
    vulnerabilities: Option<Vec<TrivyVulnerability>>,
}

#[derive(Debug, Deserialize)]
struct TrivyVulnerability {
    #[serde(rename = "VulnerabilityID")]
    id: String,
    #[serde(rename = "Severity", default)]
    severity: String,
    #[serde(rename = "PkgName", default)]
    package_name: String,
    #[serde(rename = "FixedVersion", default)]
    fixed_version: Option<String>,
}

/// Parses `trivy --format json` output
///
/// Anything printed before the JSON document (progress lines, warnings) is ignored.
pub fn parse_trivy_output(raw: &str) -> Result<Vec<Finding>, serde_json::Error> {
    let json = raw.find('{').map_or(raw, |start| &raw[start..]);
    let report: TrivyReport = serde_json::from_str(json)?;

    Ok(report
        .results
        .unwrap_or_default()
        .into_iter()
        .flat_map(|r| r.vulnerabilities.unwrap_or_default())
        .map(|v| Finding {
            id: v.id,
            severity: Severity::from_label(&v.severity),
            package_name: v.package_name,
            fixed_version: v.fixed_version.filter(|f| !f.is_empty()),
        })
        .collect())
}

pub struct VulnerabilityScanner {
    runner: Arc<dyn CommandRunner>,
    config: ScanConfig,
}

impl VulnerabilityScanner {
    pub fn new(runner: Arc<dyn CommandRunner>, config: ScanConfig) -> Self {
        Self { runner, config }
    }

    /// Scans `dir`; never fails
    pub async fn scan(&self, dir: &Path) -> VulnerabilityReport {
        if !self.config.enabled {
            return VulnerabilityReport::not_scanned("CVE scanning disabled");
        }

        let command = Command::new("trivy")
            .args([
                "fs",
                "--quiet",
                "--format",
                "json",
                "--severity",
                "CRITICAL,HIGH,MEDIUM,LOW",
            ])
            .arg(dir.display().to_string());

        // raw JSON stays out of the build log
        let scratch = StepLog::new();
        let output = match self.runner.execute(&command, &scratch).await {
            Ok(output) => output,
            Err(e) => {
                warn!("CVE scan unavailable: {}", e);
                return VulnerabilityReport::not_scanned(format!("CVE scan unavailable: {}", e));
            }
        };

        if !output.success() {
            warn!("trivy exited with code {}", output.exit_code);
            return VulnerabilityReport::not_scanned(format!(
                "CVE scan unavailable: trivy exited with code {}",
                output.exit_code
            ));
        }

        match parse_trivy_output(&output.output) {
            Ok(findings) => {
                let report = VulnerabilityReport::from_findings(findings, self.config.threshold);
                info!("CVE scan of {}: {}", dir.display(), report.summary);
                report
            }
            Err(e) => {
                warn!("Could not parse trivy output: {}", e);
                VulnerabilityReport::not_scanned(format!(
                    "CVE scan unavailable: could not parse scanner output: {}",
                    e
                ))
            }
        }
    }
}
