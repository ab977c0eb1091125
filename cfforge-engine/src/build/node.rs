//! npm build for Node.js projects

use cfforge_core::domain::project::Language;
use tracing::warn;

use super::{ArtifactSource, BuildContext, BuildPipeline, Step};

pub struct NodePipeline;

impl NodePipeline {
    /// True when `package.json` declares a `test` script
    fn has_test_script(ctx: &BuildContext) -> bool {
        let Ok(raw) = std::fs::read_to_string(ctx.path("package.json")) else {
            return false;
        };
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(manifest) => manifest
                .get("scripts")
                .and_then(|scripts| scripts.get("test"))
                .is_some(),
            Err(e) => {
                warn!(build_id = %ctx.build_id, "Unreadable package.json: {}", e);
                false
            }
        }
    }
}

impl BuildPipeline for NodePipeline {
    fn language(&self) -> Language {
        Language::Nodejs
    }

    fn plan(&self, ctx: &BuildContext) -> Vec<Step> {
        let tests = if Self::has_test_script(ctx) {
            Step::run(
                "Running tests",
                ctx.command("npm").args(["test", "--if-present"]),
            )
        } else {
            Step::skip("Running tests", "No test script in package.json, skipping tests")
        };

        vec![
            Step::run("Installing dependencies", ctx.command("npm").arg("install")),
            tests,
            Step::run(
                "Building",
                ctx.command("npm").args(["run", "build", "--if-present"]),
            ),
            Step::run(
                "Packaging",
                ctx.command("sh")
                    .args(["-c", "mkdir -p dist && npm pack --pack-destination dist"]),
            ),
            Step::upload(
                ArtifactSource::FirstWithExtension {
                    dir: "dist".into(),
                    extension: "tgz",
                },
                Some("tgz"),
            ),
        ]
    }
}
