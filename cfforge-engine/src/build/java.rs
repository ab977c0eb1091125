//! Maven build for Java projects

use cfforge_core::domain::project::Language;

use super::{ArtifactSource, BuildContext, BuildPipeline, Step};

pub struct JavaPipeline;

impl BuildPipeline for JavaPipeline {
    fn language(&self) -> Language {
        Language::Java
    }

    fn plan(&self, ctx: &BuildContext) -> Vec<Step> {
        let mvn = |goals: &[&str]| ctx.command("mvn").arg("-B").args(goals.iter().copied());

        let tests = if ctx.has("src/test") {
            Step::run("Running tests", mvn(&["test"]))
        } else {
            Step::skip("Running tests", "No src/test directory found, skipping tests")
        };

        vec![
            Step::run("Resolving dependencies", mvn(&["dependency:resolve"])),
            Step::run("Compiling", mvn(&["compile"])),
            tests,
            Step::run("Packaging", mvn(&["package", "-DskipTests"])),
            Step::upload(
                ArtifactSource::FirstWithExtension {
                    dir: "target".into(),
                    extension: "jar",
                },
                Some("jar"),
            ),
        ]
    }
}
