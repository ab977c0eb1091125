//! virtualenv build for Python projects

use cfforge_core::domain::project::Language;

use super::{ArtifactSource, BuildContext, BuildPipeline, Step};

pub struct PythonPipeline;

impl BuildPipeline for PythonPipeline {
    fn language(&self) -> Language {
        Language::Python
    }

    fn plan(&self, ctx: &BuildContext) -> Vec<Step> {
        let pip = ctx.path(".venv/bin/pip").display().to_string();
        let python = ctx.path(".venv/bin/python").display().to_string();

        let dependencies = if ctx.has("requirements.txt") {
            Step::run(
                "Installing dependencies",
                ctx.command(pip).args(["install", "-r", "requirements.txt"]),
            )
        } else if ctx.has("pyproject.toml") {
            Step::run(
                "Installing dependencies",
                ctx.command(pip).args(["install", "."]),
            )
        } else {
            Step::skip(
                "Installing dependencies",
                "No requirements.txt or pyproject.toml found, skipping dependency install",
            )
        };

        let tests = if ctx.has("tests") || ctx.has("test") {
            Step::run(
                "Running tests",
                ctx.command(python).args(["-m", "pytest", "--tb=short"]),
            )
        } else {
            Step::skip("Running tests", "No tests directory found, skipping tests")
        };

        let mut steps = vec![
            Step::run(
                "Creating virtual environment",
                ctx.command("python3").args(["-m", "venv", ".venv"]),
            ),
            dependencies,
            tests,
        ];

        if !ctx.has("Procfile") {
            steps.push(Step::notice(
                "No Procfile found. The platform needs a Procfile to start Python apps.",
            ));
        }

        steps.push(Step::run(
            "Packaging",
            ctx.command("sh").args([
                "-c",
                "mkdir -p dist && tar --exclude=./.venv --exclude=./dist -czf dist/app.tar.gz .",
            ]),
        ));
        steps.push(Step::upload(
            ArtifactSource::File("dist/app.tar.gz".into()),
            Some("tar.gz"),
        ));
        steps
    }
}
