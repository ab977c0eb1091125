//! Build dispatcher
//!
//! Consumes build requests: finds the project's latest build job, runs the
//! language pipeline in an isolated workspace, scans the result, generates
//! an SBOM and persists the outcome. Every request ends with the job in a
//! terminal state, whatever goes wrong on the way (including panics).

use cfforge_core::domain::build::{BuildJob, BuildStatus};
use cfforge_core::domain::project::Language;
use cfforge_core::domain::vulnerability::VulnerabilityReport;
use cfforge_core::dto::build::BuildRequest;
use cfforge_core::dto::metric::{self, MetricEvent};
use cfforge_core::storage::workspace_prefix;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

use super::registry::PipelineRegistry;
use super::{BuildContext, BuildResult, PipelineExecutor};
use crate::Collaborators;
use crate::error::EngineError;
use crate::events::emit;
use crate::locks::ProjectLocks;
use crate::log_buffer::StepLog;
use crate::security::{ScanConfig, SbomGenerator, VulnerabilityScanner};
use crate::storage::download_prefix;

#[derive(Debug, Clone)]
pub struct BuildDispatcherConfig {
    /// Worker identity, used as the `source` of metric events
    pub source: String,
    /// Parent directory of per-build workspaces
    pub workspace_base: PathBuf,
    pub scan: ScanConfig,
    /// Fail builds whose vulnerability report is blocked
    pub enforce_vulnerability_gate: bool,
}

/// Everything a build run produced besides the job record
struct BuildOutcome {
    language: Language,
    result: BuildResult,
    report: VulnerabilityReport,
    sbom_key: Option<String>,
}

pub struct BuildDispatcher {
    config: BuildDispatcherConfig,
    registry: PipelineRegistry,
    executor: PipelineExecutor,
    scanner: VulnerabilityScanner,
    sbom: SbomGenerator,
    services: Collaborators,
    locks: ProjectLocks,
}

impl BuildDispatcher {
    pub fn new(
        config: BuildDispatcherConfig,
        registry: PipelineRegistry,
        services: Collaborators,
    ) -> Self {
        let executor = PipelineExecutor::new(services.runner.clone(), services.store.clone());
        let scanner = VulnerabilityScanner::new(services.runner.clone(), config.scan);
        let sbom = SbomGenerator::new(services.runner.clone(), services.store.clone());
        Self {
            config,
            registry,
            executor,
            scanner,
            sbom,
            services,
            locks: ProjectLocks::new(),
        }
    }

    fn workspace_dir(&self, job: &BuildJob) -> PathBuf {
        self.config
            .workspace_base
            .join(format!("cfforge-build-{}", job.id))
    }

    /// Handles one build request
    ///
    /// Returns the job as persisted. A request whose latest job is already
    /// terminal is acknowledged without running anything.
    pub async fn handle(&self, request: &BuildRequest) -> Result<BuildJob, EngineError> {
        let project_id = request.project_id;
        let _guard = self.locks.acquire(project_id).await;

        let mut job = self
            .services
            .builds
            .latest_build(project_id)
            .await?
            .ok_or(EngineError::NoBuildJob(project_id))?;

        if job.status.is_terminal() {
            info!(
                %project_id,
                build_id = %job.id,
                "Build already {}, ignoring redelivered request",
                job.status
            );
            return Ok(job);
        }

        let started = Instant::now();
        job.transition(BuildStatus::Building)?;
        self.services.builds.save_build(&job).await?;
        info!(%project_id, build_id = %job.id, "Build started");

        let log = StepLog::new();
        let work_dir = self.workspace_dir(&job);
        let outcome = AssertUnwindSafe(self.run_build(&job, &work_dir, &log))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(EngineError::from_panic(panic)));

        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(build_id = %job.id, "Failed to remove workspace {}: {}", work_dir.display(), e);
            }
        }

        let duration_ms = started.elapsed().as_millis() as i64;
        let event = self.finalize(&mut job, outcome, &log, duration_ms);

        self.services.builds.save_build(&job).await?;
        emit(self.services.events.as_ref(), event).await;

        info!(
            %project_id,
            build_id = %job.id,
            status = %job.status,
            duration_ms,
            "Build finished"
        );
        Ok(job)
    }

    async fn run_build(
        &self,
        job: &BuildJob,
        work_dir: &Path,
        log: &StepLog,
    ) -> Result<BuildOutcome, EngineError> {
        let project = self
            .services
            .projects
            .find_project(job.project_id)
            .await?
            .ok_or(EngineError::ProjectNotFound(job.project_id))?;

        let pipeline = self.registry.resolve(project.language)?;

        tokio::fs::create_dir_all(work_dir)
            .await
            .map_err(|e| EngineError::io("Failed to create build workspace", e))?;
        let files = download_prefix(
            self.services.store.as_ref(),
            &workspace_prefix(project.id),
            work_dir,
        )
        .await?;
        log.info(format!("Fetched {} project files", files));

        let ctx = BuildContext {
            project_id: project.id,
            build_id: job.id,
            work_dir: work_dir.to_path_buf(),
            language: project.language,
            framework: project.framework.clone(),
        };

        let result = self.executor.execute(pipeline.as_ref(), &ctx, log).await;

        let report = self.scanner.scan(work_dir).await;
        log.info(format!("CVE SCAN: {}", report.summary));

        let sbom_key = self
            .sbom
            .generate(work_dir, project.language, project.id, job.id)
            .await;
        match &sbom_key {
            Some(key) => log.info(format!("SBOM: {}", key)),
            None => log.info("SBOM: not generated"),
        }

        Ok(BuildOutcome {
            language: project.language,
            result,
            report,
            sbom_key,
        })
    }

    /// Applies the run outcome to the job and returns its metric event
    fn finalize(
        &self,
        job: &mut BuildJob,
        outcome: Result<BuildOutcome, EngineError>,
        log: &StepLog,
        duration_ms: i64,
    ) -> MetricEvent {
        let source = self.config.source.clone();

        let (status, event) = match outcome {
            Ok(outcome) => {
                job.vulnerability_report = Some(outcome.report.clone());
                job.sbom_key = outcome.sbom_key;
                job.artifact_key = outcome.result.artifact_key;

                let gated = outcome.result.status == BuildStatus::Success
                    && outcome.report.blocked
                    && self.config.enforce_vulnerability_gate;

                let (status, event) = if gated {
                    let message =
                        format!("Build blocked by vulnerability gate: {}", outcome.report.summary);
                    log.error("Build blocked due to CVE severity gate");
                    warn!(build_id = %job.id, "{}", message);
                    job.error_message = Some(message.clone());
                    (
                        BuildStatus::Failed,
                        MetricEvent::failure(
                            metric::BUILD_BLOCKED,
                            source,
                            job.project_id,
                            duration_ms,
                            message,
                        ),
                    )
                } else if outcome.result.status == BuildStatus::Success {
                    (
                        BuildStatus::Success,
                        MetricEvent::success(
                            metric::BUILD_COMPLETED,
                            source,
                            job.project_id,
                            duration_ms,
                        ),
                    )
                } else {
                    let message = outcome
                        .result
                        .error_message
                        .unwrap_or_else(|| "Build failed".to_string());
                    job.error_message = Some(message.clone());
                    (
                        BuildStatus::Failed,
                        MetricEvent::failure(
                            metric::BUILD_FAILED,
                            source,
                            job.project_id,
                            duration_ms,
                            message,
                        ),
                    )
                };
                (
                    status,
                    event
                        .with_dimension("language", outcome.language.as_str())
                        .with_dimension("vulnerabilities", outcome.report.severity_counts.to_string()),
                )
            }
            Err(e) => {
                error!(build_id = %job.id, "Build failed before completion: {}", e);
                log.error(e.to_string());
                job.error_message = Some(e.to_string());
                (
                    BuildStatus::Failed,
                    MetricEvent::failure(
                        metric::BUILD_FAILED,
                        source,
                        job.project_id,
                        duration_ms,
                        e.to_string(),
                    ),
                )
            }
        };

        if let Err(e) = job.transition(status) {
            // BUILDING reaches both terminal states, so this only trips on a
            // job changed underneath us
            error!(build_id = %job.id, "{}", e);
            job.status = status;
        }
        job.build_log = log.render();
        job.duration_ms = Some(duration_ms);

        event.with_dimension("build_id", job.id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{BuildPipeline, Step};
    use crate::repository::BuildRepository;
    use crate::storage::ObjectStore;
    use crate::testing::{Harness, project};
    use cfforge_core::domain::build::TriggerType;
    use cfforge_core::domain::vulnerability::BlockThreshold;
    use std::sync::Arc;

    const CRITICAL_REPORT: &str = r#"{"Results":[{"Vulnerabilities":[{"VulnerabilityID":"CVE-2024-9","PkgName":"log4j","Severity":"CRITICAL"}]}]}"#;

    fn dispatcher(harness: &Harness, enforce: bool) -> BuildDispatcher {
        BuildDispatcher::new(
            BuildDispatcherConfig {
                source: "builder-test".to_string(),
                workspace_base: harness.workspace_base(),
                scan: ScanConfig {
                    enabled: true,
                    threshold: BlockThreshold::default(),
                },
                enforce_vulnerability_gate: enforce,
            },
            PipelineRegistry::standard(),
            harness.collaborators(),
        )
    }

    async fn seed_go_project(harness: &Harness) -> (uuid::Uuid, BuildJob) {
        let project = project(Language::Go);
        let project_id = project.id;
        harness.repo.insert_project(project);
        harness
            .store
            .put_object(
                &format!("workspaces/{}/main.go", project_id),
                b"package main".to_vec(),
            )
            .await
            .unwrap();
        let job = BuildJob::queued(project_id, TriggerType::Manual);
        harness.repo.insert_build(job.clone());
        (project_id, job)
    }

    fn produce_binary(harness: &Harness, build_id: uuid::Uuid) {
        let binary = harness
            .workspace_base()
            .join(format!("cfforge-build-{}", build_id))
            .join("app");
        harness.runner.on_with("go build", 0, "", move |_| {
            std::fs::write(&binary, b"bin").unwrap();
        });
    }

    #[tokio::test]
    async fn test_successful_build_is_persisted() {
        let harness = Harness::new();
        let (project_id, job) = seed_go_project(&harness).await;
        produce_binary(&harness, job.id);
        harness.runner.on("trivy", 0, r#"{"Results":[]}"#);

        let finished = dispatcher(&harness, true)
            .handle(&BuildRequest { project_id })
            .await
            .unwrap();

        assert_eq!(finished.status, BuildStatus::Success);
        assert_eq!(
            finished.artifact_key,
            Some(format!("artifacts/{}/{}", project_id, job.id))
        );
        assert!(finished.build_log.contains("CVE SCAN: Found 0 vulnerabilities"));
        assert!(finished.duration_ms.is_some());
        assert!(!harness.workspace_base().join(format!("cfforge-build-{}", job.id)).exists());

        let stored = harness.repo.find_build(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BuildStatus::Success);
        assert_eq!(harness.events.event_types(), vec![metric::BUILD_COMPLETED]);
        let event = &harness.events.events()[0];
        assert_eq!(event.dimensions["language"], "GO");
        assert_eq!(event.source, "builder-test");
    }

    #[tokio::test]
    async fn test_unavailable_scanner_does_not_change_outcome() {
        let harness = Harness::new();
        let (project_id, job) = seed_go_project(&harness).await;
        produce_binary(&harness, job.id);
        harness.runner.missing("trivy");

        let finished = dispatcher(&harness, true)
            .handle(&BuildRequest { project_id })
            .await
            .unwrap();

        assert_eq!(finished.status, BuildStatus::Success);
        let report = finished.vulnerability_report.unwrap();
        assert!(!report.scanned);
        assert!(!report.blocked);
    }

    #[tokio::test]
    async fn test_blocked_report_fails_build_when_enforced() {
        let harness = Harness::new();
        let (project_id, job) = seed_go_project(&harness).await;
        produce_binary(&harness, job.id);
        harness.runner.on("trivy", 0, CRITICAL_REPORT);

        let finished = dispatcher(&harness, true)
            .handle(&BuildRequest { project_id })
            .await
            .unwrap();

        assert_eq!(finished.status, BuildStatus::Failed);
        assert_eq!(
            finished.error_message.as_deref(),
            Some("Build blocked by vulnerability gate: Found 1 vulnerabilities (C:1 H:0 M:0 L:0) - BLOCKED")
        );
        assert_eq!(harness.events.event_types(), vec![metric::BUILD_BLOCKED]);
    }

    #[tokio::test]
    async fn test_blocked_report_is_advisory_without_enforcement() {
        let harness = Harness::new();
        let (project_id, job) = seed_go_project(&harness).await;
        produce_binary(&harness, job.id);
        harness.runner.on("trivy", 0, CRITICAL_REPORT);

        let finished = dispatcher(&harness, false)
            .handle(&BuildRequest { project_id })
            .await
            .unwrap();

        assert_eq!(finished.status, BuildStatus::Success);
        assert!(finished.vulnerability_report.unwrap().blocked);
    }

    #[tokio::test]
    async fn test_unsupported_language_fails_job() {
        let harness = Harness::new();
        let project = project(Language::Ruby);
        let project_id = project.id;
        harness.repo.insert_project(project);
        let job = BuildJob::queued(project_id, TriggerType::Automated);
        harness.repo.insert_build(job.clone());

        let finished = dispatcher(&harness, true)
            .handle(&BuildRequest { project_id })
            .await
            .unwrap();

        assert_eq!(finished.status, BuildStatus::Failed);
        assert_eq!(
            finished.error_message.as_deref(),
            Some("No build pipeline for language: RUBY")
        );
        assert!(finished.build_log.contains("No build pipeline for language: RUBY"));
        assert_eq!(harness.events.event_types(), vec![metric::BUILD_FAILED]);
        assert!(harness.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_redelivered_request_for_terminal_job_is_ignored() {
        let harness = Harness::new();
        let project = project(Language::Go);
        let project_id = project.id;
        harness.repo.insert_project(project);
        let mut job = BuildJob::queued(project_id, TriggerType::Manual);
        job.status = BuildStatus::Success;
        harness.repo.insert_build(job.clone());

        let returned = dispatcher(&harness, true)
            .handle(&BuildRequest { project_id })
            .await
            .unwrap();

        assert_eq!(returned.status, BuildStatus::Success);
        assert!(harness.runner.calls().is_empty());
        assert!(harness.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_missing_job_is_error() {
        let harness = Harness::new();

        let err = dispatcher(&harness, true)
            .handle(&BuildRequest {
                project_id: uuid::Uuid::new_v4(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::NoBuildJob(_)));
    }

    struct PanickingPipeline;

    impl BuildPipeline for PanickingPipeline {
        fn language(&self) -> Language {
            Language::Go
        }

        fn plan(&self, _ctx: &BuildContext) -> Vec<Step> {
            panic!("plan exploded");
        }
    }

    #[tokio::test]
    async fn test_panic_is_finalized_as_failure() {
        let harness = Harness::new();
        let (project_id, job) = seed_go_project(&harness).await;
        let mut registry = PipelineRegistry::new();
        registry.register(Arc::new(PanickingPipeline));
        let dispatcher = BuildDispatcher::new(
            BuildDispatcherConfig {
                source: "builder-test".to_string(),
                workspace_base: harness.workspace_base(),
                scan: ScanConfig::default(),
                enforce_vulnerability_gate: true,
            },
            registry,
            harness.collaborators(),
        );

        let finished = dispatcher.handle(&BuildRequest { project_id }).await.unwrap();

        assert_eq!(finished.id, job.id);
        assert_eq!(finished.status, BuildStatus::Failed);
        assert_eq!(
            finished.error_message.as_deref(),
            Some("worker panicked: plan exploded")
        );
    }

    #[tokio::test]
    async fn test_failed_pipeline_still_scans() {
        let harness = Harness::new();
        let (project_id, _job) = seed_go_project(&harness).await;
        harness.runner.on("go mod download", 1, "network unreachable");

        let finished = dispatcher(&harness, true)
            .handle(&BuildRequest { project_id })
            .await
            .unwrap();

        assert_eq!(finished.status, BuildStatus::Failed);
        assert!(harness.runner.was_called("trivy fs"));
        assert!(finished.vulnerability_report.is_some());
        assert_eq!(
            finished.error_message.as_deref(),
            Some("Command failed: `go mod download` exited with code 1")
        );
    }
}
