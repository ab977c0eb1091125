//! Test doubles shared by the engine's unit tests

use async_trait::async_trait;
use cfforge_core::domain::project::{Language, Project};
use cfforge_core::dto::metric::MetricEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::Collaborators;
use crate::events::{EventPublisher, PublishError};
use crate::log_buffer::StepLog;
use crate::process::{Command, CommandOutput, CommandRunner, ProcessError};
use crate::repository::memory::InMemoryRepository;
use crate::storage::FilesystemObjectStore;

type Effect = Box<dyn Fn(&Command) + Send + Sync>;

struct Rule {
    pattern: String,
    exit_code: i32,
    output: String,
    spawn_error: bool,
    effect: Option<Effect>,
}

/// Command runner that answers from a script instead of spawning processes
///
/// Rules match when the rendered command line contains the pattern; the most
/// recently added matching rule wins. Unmatched commands succeed silently.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Command>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&self, rule: Rule) -> &Self {
        self.rules.lock().unwrap().push(rule);
        self
    }

    pub fn on(&self, pattern: &str, exit_code: i32, output: &str) -> &Self {
        self.add(Rule {
            pattern: pattern.to_string(),
            exit_code,
            output: output.to_string(),
            spawn_error: false,
            effect: None,
        })
    }

    /// Like [`ScriptedRunner::on`], running `effect` before answering
    pub fn on_with(
        &self,
        pattern: &str,
        exit_code: i32,
        output: &str,
        effect: impl Fn(&Command) + Send + Sync + 'static,
    ) -> &Self {
        self.add(Rule {
            pattern: pattern.to_string(),
            exit_code,
            output: output.to_string(),
            spawn_error: false,
            effect: Some(Box::new(effect)),
        })
    }

    /// Matching commands fail to start, as if the tool were not installed
    pub fn missing(&self, pattern: &str) -> &Self {
        self.add(Rule {
            pattern: pattern.to_string(),
            exit_code: -1,
            output: String::new(),
            spawn_error: true,
            effect: None,
        })
    }

    pub fn calls(&self) -> Vec<Command> {
        self.calls.lock().unwrap().clone()
    }

    /// Rendered command lines in invocation order
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(Command::display).collect()
    }

    pub fn was_called(&self, pattern: &str) -> bool {
        self.command_lines().iter().any(|c| c.contains(pattern))
    }

    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.command_lines().iter().position(|c| c.contains(pattern))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute(
        &self,
        command: &Command,
        log: &StepLog,
    ) -> Result<CommandOutput, ProcessError> {
        self.calls.lock().unwrap().push(command.clone());
        let line = command.display();

        let rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter().rev().find(|r| line.contains(&r.pattern)) else {
            return Ok(CommandOutput {
                output: String::new(),
                exit_code: 0,
            });
        };

        if rule.spawn_error {
            return Err(ProcessError::Spawn {
                command: line,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            });
        }
        if let Some(effect) = &rule.effect {
            effect(command);
        }
        for output_line in rule.output.lines() {
            log.output(output_line);
        }
        Ok(CommandOutput {
            output: rule.output.clone(),
            exit_code: rule.exit_code,
        })
    }
}

/// Event publisher that keeps everything it is given
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<MetricEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &MetricEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub fn project(language: Language) -> Project {
    Project {
        id: Uuid::new_v4(),
        name: "Shop".to_string(),
        slug: "shop".to_string(),
        language,
        framework: None,
        manifest: None,
        env_vars: HashMap::new(),
    }
}

/// Collaborators wired to in-memory doubles
pub struct Harness {
    pub repo: Arc<InMemoryRepository>,
    pub runner: Arc<ScriptedRunner>,
    pub events: Arc<RecordingPublisher>,
    pub store: Arc<FilesystemObjectStore>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            repo: Arc::new(InMemoryRepository::new()),
            runner: Arc::new(ScriptedRunner::new()),
            events: Arc::new(RecordingPublisher::default()),
            store: Arc::new(FilesystemObjectStore::new(dir.path().join("store"), "cf-forge")),
            dir,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            builds: self.repo.clone(),
            deployments: self.repo.clone(),
            projects: self.repo.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            runner: self.runner.clone(),
        }
    }

    pub fn workspace_base(&self) -> std::path::PathBuf {
        self.dir.path().join("work")
    }
}
