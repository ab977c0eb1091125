//! CycloneDX SBOM generation

use cfforge_core::domain::project::Language;
use cfforge_core::storage::sbom_key;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::log_buffer::StepLog;
use crate::process::{Command, CommandRunner};
use crate::storage::{ObjectStore, upload_file};

pub struct SbomGenerator {
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn ObjectStore>,
}

impl SbomGenerator {
    pub fn new(runner: Arc<dyn CommandRunner>, store: Arc<dyn ObjectStore>) -> Self {
        Self { runner, store }
    }

    /// The generator command for `language` and the file it writes
    fn tool_for(language: Language, dir: &Path) -> Option<(Command, PathBuf)> {
        let (command, output) = match language {
            Language::Java => (
                Command::new("mvn").args([
                    "-B",
                    "org.cyclonedx:cyclonedx-maven-plugin:makeBom",
                    "-DoutputFormat=json",
                    "-DoutputName=sbom",
                ]),
                "target/sbom.json",
            ),
            Language::Nodejs => (
                Command::new("npx").args([
                    "@cyclonedx/cyclonedx-npm",
                    "--output-file",
                    "sbom.json",
                ]),
                "sbom.json",
            ),
            Language::Python => (
                Command::new("cyclonedx-py").args([
                    "requirements",
                    "--output-format",
                    "json",
                    "--output-file",
                    "sbom.json",
                ]),
                "sbom.json",
            ),
            Language::Go => (
                Command::new("cyclonedx-gomod").args(["app", "-json", "-output", "sbom.json"]),
                "sbom.json",
            ),
            _ => return None,
        };
        Some((command.current_dir(dir), dir.join(output)))
    }

    /// Generates and uploads an SBOM, returning its storage key
    ///
    /// Returns `None` when the language has no generator or anything fails.
    pub async fn generate(
        &self,
        dir: &Path,
        language: Language,
        project_id: Uuid,
        build_id: Uuid,
    ) -> Option<String> {
        let Some((command, output)) = Self::tool_for(language, dir) else {
            info!(%build_id, "No SBOM generator for {}", language);
            return None;
        };

        let scratch = StepLog::new();
        if let Err(e) = self.runner.run(&command, &scratch).await {
            warn!(%build_id, "SBOM generation failed: {}", e);
            return None;
        }

        let key = sbom_key(project_id, build_id);
        match upload_file(self.store.as_ref(), &key, &output).await {
            Ok(_) => {
                info!(%build_id, "Uploaded SBOM {}", key);
                Some(key)
            }
            Err(e) => {
                warn!(%build_id, "SBOM upload failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FilesystemObjectStore;
    use crate::testing::ScriptedRunner;

    #[tokio::test]
    async fn test_generates_and_uploads_sbom() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        let sbom_file = work.join("sbom.json");

        let runner = Arc::new(ScriptedRunner::new());
        runner.on_with("cyclonedx-gomod", 0, "", move |_| {
            std::fs::write(&sbom_file, br#"{"bomFormat":"CycloneDX"}"#).unwrap();
        });
        let store = Arc::new(FilesystemObjectStore::new(dir.path().join("store"), "b"));
        let generator = SbomGenerator::new(runner, store.clone());
        let (project_id, build_id) = (Uuid::new_v4(), Uuid::new_v4());

        let key = generator
            .generate(&work, Language::Go, project_id, build_id)
            .await
            .unwrap();

        assert_eq!(key, format!("sboms/{}/{}/sbom.json", project_id, build_id));
        assert!(store.get_object(&key).await.is_ok());
    }

    #[tokio::test]
    async fn test_tool_failure_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.missing("cyclonedx-py");
        let store = Arc::new(FilesystemObjectStore::new(dir.path().join("store"), "b"));
        let generator = SbomGenerator::new(runner, store);

        let key = generator
            .generate(dir.path(), Language::Python, Uuid::new_v4(), Uuid::new_v4())
            .await;

        assert!(key.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_language_has_no_sbom() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let store = Arc::new(FilesystemObjectStore::new(dir.path().join("store"), "b"));
        let generator = SbomGenerator::new(runner.clone(), store);

        let key = generator
            .generate(dir.path(), Language::Ruby, Uuid::new_v4(), Uuid::new_v4())
            .await;

        assert!(key.is_none());
        assert!(runner.calls().is_empty());
    }
}
