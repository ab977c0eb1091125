//! Application manifest rendering

use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

use crate::error::EngineError;

/// Renders the manifest pushed for `app_name`
///
/// The first entry of `applications` gets `app_name` as its name and the
/// environment variables merged into its `env` (existing keys are
/// overridden). A missing manifest yields a single-application one.
pub fn render_manifest(
    base: Option<&str>,
    app_name: &str,
    env: &BTreeMap<String, String>,
) -> Result<String, EngineError> {
    let mut document = match base.map(str::trim).filter(|b| !b.is_empty()) {
        Some(yaml) => serde_yaml::from_str::<Value>(yaml)
            .map_err(|e| EngineError::Manifest(e.to_string()))?,
        None => Value::Mapping(Mapping::new()),
    };

    let root = document
        .as_mapping_mut()
        .ok_or_else(|| EngineError::Manifest("manifest is not a mapping".to_string()))?;

    let applications = root
        .entry(Value::from("applications"))
        .or_insert_with(|| Value::Sequence(Vec::new()));
    let applications = applications
        .as_sequence_mut()
        .ok_or_else(|| EngineError::Manifest("`applications` is not a list".to_string()))?;
    if applications.is_empty() {
        applications.push(Value::Mapping(Mapping::new()));
    }

    let app = applications[0]
        .as_mapping_mut()
        .ok_or_else(|| EngineError::Manifest("application entry is not a mapping".to_string()))?;
    app.insert(Value::from("name"), Value::from(app_name));

    if !env.is_empty() {
        let app_env = app
            .entry(Value::from("env"))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
        let app_env = app_env
            .as_mapping_mut()
            .ok_or_else(|| EngineError::Manifest("`env` is not a mapping".to_string()))?;
        for (key, value) in env {
            app_env.insert(Value::from(key.as_str()), Value::from(value.as_str()));
        }
    }

    serde_yaml::to_string(&document).map_err(|e| EngineError::Manifest(e.to_string()))
}
