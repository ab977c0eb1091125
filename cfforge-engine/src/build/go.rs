//! Go module build

use cfforge_core::domain::project::Language;
use walkdir::WalkDir;

use super::{ArtifactSource, BuildContext, BuildPipeline, Step};

pub struct GoPipeline;

impl GoPipeline {
    fn has_test_files(ctx: &BuildContext) -> bool {
        WalkDir::new(&ctx.work_dir)
            .into_iter()
            .filter_entry(|e| e.file_name() != "vendor" && e.file_name() != ".git")
            .filter_map(Result::ok)
            .any(|e| {
                e.file_type().is_file()
                    && e.file_name().to_string_lossy().ends_with("_test.go")
            })
    }
}

impl BuildPipeline for GoPipeline {
    fn language(&self) -> Language {
        Language::Go
    }

    fn plan(&self, ctx: &BuildContext) -> Vec<Step> {
        let go = |args: &[&str]| ctx.command("go").args(args.iter().copied());

        let tests = if Self::has_test_files(ctx) {
            Step::run("Running tests", go(&["test", "./..."]))
        } else {
            Step::skip("Running tests", "No *_test.go files found, skipping tests")
        };

        vec![
            Step::run("Downloading modules", go(&["mod", "download"])),
            Step::run("Verifying modules", go(&["mod", "verify"])),
            tests,
            Step::run(
                "Building binary",
                go(&["build", "-o", "app", "."])
                    .env("CGO_ENABLED", "0")
                    .env("GOOS", "linux"),
            ),
            Step::upload(ArtifactSource::File("app".into()), None),
        ]
    }
}
