//! Pipeline steps and their executor

use cfforge_core::domain::build::BuildStatus;
use cfforge_core::storage::artifact_key;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use super::{BuildContext, BuildPipeline, BuildResult};
use crate::error::EngineError;
use crate::log_buffer::StepLog;
use crate::process::{Command, CommandRunner};
use crate::storage::{ObjectStore, upload_file};

/// Where a packaging step leaves its artifact, relative to the workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    File(PathBuf),
    /// First file (by name) in `dir` whose name ends with `.{extension}`
    FirstWithExtension { dir: PathBuf, extension: &'static str },
}

impl ArtifactSource {
    fn resolve(&self, work_dir: &Path) -> Option<PathBuf> {
        match self {
            ArtifactSource::File(path) => {
                let path = work_dir.join(path);
                path.is_file().then_some(path)
            }
            ArtifactSource::FirstWithExtension { dir, extension } => {
                let suffix = format!(".{}", extension);
                let mut matches: Vec<PathBuf> = std::fs::read_dir(work_dir.join(dir))
                    .ok()?
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|path| {
                        path.is_file()
                            && path
                                .file_name()
                                .and_then(|n| n.to_str())
                                .is_some_and(|n| n.ends_with(&suffix))
                    })
                    .collect();
                matches.sort();
                matches.into_iter().next()
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            ArtifactSource::File(path) => path.display().to_string(),
            ArtifactSource::FirstWithExtension { dir, extension } => {
                format!("{}/*.{}", dir.display(), extension)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Runs a command; a non-zero exit aborts the pipeline
    Run {
        description: String,
        command: Command,
    },
    /// A step that does not apply to this workspace
    Skip { description: String, reason: String },
    /// Unnumbered warning
    Notice(String),
    /// Uploads the packaged artifact as `artifacts/{project}/{build}[.ext]`
    Upload {
        source: ArtifactSource,
        extension: Option<&'static str>,
    },
}

impl Step {
    pub fn run(description: impl Into<String>, command: Command) -> Self {
        Step::Run {
            description: description.into(),
            command,
        }
    }

    pub fn skip(description: impl Into<String>, reason: impl Into<String>) -> Self {
        Step::Skip {
            description: description.into(),
            reason: reason.into(),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Step::Notice(message.into())
    }

    pub fn upload(source: ArtifactSource, extension: Option<&'static str>) -> Self {
        Step::Upload { source, extension }
    }

    fn is_numbered(&self) -> bool {
        !matches!(self, Step::Notice(_))
    }

    fn description(&self) -> &str {
        match self {
            Step::Run { description, .. } | Step::Skip { description, .. } => description,
            Step::Notice(message) => message,
            Step::Upload { .. } => "Uploading artifact",
        }
    }
}

/// Runs pipeline plans
#[derive(Clone)]
pub struct PipelineExecutor {
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn ObjectStore>,
}

impl PipelineExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, store: Arc<dyn ObjectStore>) -> Self {
        Self { runner, store }
    }

    /// Runs `pipeline` against `ctx`, appending to `log`
    ///
    /// The first failing step ends the run; the log then ends with that
    /// step's output. The returned `log` is the full content of `log`.
    pub async fn execute(
        &self,
        pipeline: &dyn BuildPipeline,
        ctx: &BuildContext,
        log: &StepLog,
    ) -> BuildResult {
        let started = Instant::now();
        let steps = pipeline.plan(ctx);
        info!(
            project_id = %ctx.project_id,
            build_id = %ctx.build_id,
            "Running {} pipeline ({} steps)",
            pipeline.language(),
            steps.iter().filter(|s| s.is_numbered()).count()
        );

        let outcome = self.run_steps(&steps, ctx, log).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match outcome {
            Ok(artifact_key) => {
                log.info("BUILD SUCCESSFUL");
                BuildResult {
                    status: BuildStatus::Success,
                    log: log.render(),
                    artifact_key,
                    error_message: None,
                    duration_ms,
                }
            }
            Err(e) => {
                error!(build_id = %ctx.build_id, "Build pipeline failed: {}", e);
                BuildResult {
                    status: BuildStatus::Failed,
                    log: log.render(),
                    artifact_key: None,
                    error_message: Some(e.to_string()),
                    duration_ms,
                }
            }
        }
    }

    async fn run_steps(
        &self,
        steps: &[Step],
        ctx: &BuildContext,
        log: &StepLog,
    ) -> Result<Option<String>, EngineError> {
        let total = steps.iter().filter(|s| s.is_numbered()).count();
        let mut index = 0;
        let mut uploaded = None;

        for step in steps {
            if step.is_numbered() {
                index += 1;
                log.info(format!("[{}/{}] {}", index, total, step.description()));
            }

            match step {
                Step::Run { command, .. } => {
                    self.runner.run(command, log).await?;
                }
                Step::Skip { reason, .. } => log.warn(reason.clone()),
                Step::Notice(message) => log.warn(message.clone()),
                Step::Upload { source, extension } => {
                    let path = source
                        .resolve(&ctx.work_dir)
                        .ok_or_else(|| EngineError::MissingArtifact(source.describe()))?;
                    let key = artifact_key(ctx.project_id, ctx.build_id, *extension);
                    let size = upload_file(self.store.as_ref(), &key, &path).await?;
                    log.info(format!("Uploaded artifact {} ({} bytes)", key, size));
                    uploaded = Some(key);
                }
            }
        }

        Ok(uploaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FilesystemObjectStore;
    use crate::testing::ScriptedRunner;
    use cfforge_core::domain::project::Language;
    use uuid::Uuid;

    struct FixedPipeline(Vec<Step>);

    impl BuildPipeline for FixedPipeline {
        fn language(&self) -> Language {
            Language::Go
        }

        fn plan(&self, _ctx: &BuildContext) -> Vec<Step> {
            self.0.clone()
        }
    }

    fn context(dir: &Path) -> BuildContext {
        BuildContext {
            project_id: Uuid::new_v4(),
            build_id: Uuid::new_v4(),
            work_dir: dir.to_path_buf(),
            language: Language::Go,
            framework: None,
        }
    }

    #[tokio::test]
    async fn test_failing_step_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.on("second", 2, "second exploded");
        let store = Arc::new(FilesystemObjectStore::new(dir.path().join("store"), "b"));
        let executor = PipelineExecutor::new(runner.clone(), store);
        let pipeline = FixedPipeline(vec![
            Step::run("First", Command::new("first")),
            Step::run("Second", Command::new("second")),
            Step::run("Third", Command::new("third")),
        ]);
        let log = StepLog::new();

        let result = executor.execute(&pipeline, &context(dir.path()), &log).await;

        assert_eq!(result.status, BuildStatus::Failed);
        assert!(result.artifact_key.is_none());
        assert!(!runner.was_called("third"));
        assert!(result.log.ends_with("second exploded\n"));
        assert!(result.log.contains("[2/3] Second"));
        assert!(!result.log.contains("[3/3]"));
        assert_eq!(
            result.error_message.as_deref(),
            Some("Command failed: `second` exited with code 2")
        );
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_upload_step() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let store = Arc::new(FilesystemObjectStore::new(dir.path().join("store"), "b"));
        let executor = PipelineExecutor::new(runner, store);
        let pipeline = FixedPipeline(vec![Step::upload(
            ArtifactSource::FirstWithExtension {
                dir: "target".into(),
                extension: "jar",
            },
            Some("jar"),
        )]);

        let result = executor
            .execute(&pipeline, &context(dir.path()), &StepLog::new())
            .await;

        assert_eq!(result.status, BuildStatus::Failed);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Artifact not found: target/*.jar")
        );
    }

    #[tokio::test]
    async fn test_upload_picks_first_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(work.join("target")).unwrap();
        std::fs::write(work.join("target/b-app.jar"), b"b").unwrap();
        std::fs::write(work.join("target/a-app.jar"), b"a").unwrap();
        std::fs::write(work.join("target/a-app.txt"), b"x").unwrap();

        let store = Arc::new(FilesystemObjectStore::new(dir.path().join("store"), "b"));
        let executor = PipelineExecutor::new(Arc::new(ScriptedRunner::new()), store.clone());
        let pipeline = FixedPipeline(vec![Step::upload(
            ArtifactSource::FirstWithExtension {
                dir: "target".into(),
                extension: "jar",
            },
            Some("jar"),
        )]);
        let ctx = context(&work);

        let result = executor.execute(&pipeline, &ctx, &StepLog::new()).await;

        let key = result.artifact_key.unwrap();
        assert_eq!(key, format!("artifacts/{}/{}.jar", ctx.project_id, ctx.build_id));
        assert_eq!(store.get_object(&key).await.unwrap(), b"a");
        assert!(result.log.ends_with("BUILD SUCCESSFUL\n"));
    }

    #[tokio::test]
    async fn test_notices_are_not_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FilesystemObjectStore::new(dir.path().join("store"), "b"));
        let executor = PipelineExecutor::new(Arc::new(ScriptedRunner::new()), store);
        let pipeline = FixedPipeline(vec![
            Step::run("Build", Command::new("make")),
            Step::notice("No Procfile found"),
            Step::skip("Running tests", "No tests found, skipping"),
        ]);

        let result = executor
            .execute(&pipeline, &context(dir.path()), &StepLog::new())
            .await;

        assert_eq!(
            result.log,
            "[1/2] Build\nWARNING: No Procfile found\n[2/2] Running tests\nWARNING: No tests found, skipping\nBUILD SUCCESSFUL\n"
        );
    }
}
