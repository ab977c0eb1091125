//! Strategy lookup by name

use cfforge_core::domain::deployment::StrategyKind;
use std::collections::HashMap;
use std::sync::Arc;

use super::DeployStrategy;
use super::blue_green::BlueGreenStrategy;
use super::canary::{CanaryConfig, CanaryStrategy};
use super::rolling::RollingStrategy;
use crate::error::EngineError;
use crate::process::CommandRunner;

/// A strategy picked for a requested name
pub struct ResolvedStrategy {
    pub strategy: Arc<dyn DeployStrategy>,
    /// The requested name when it did not match a registered strategy
    pub fallback_from: Option<String>,
}

#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<StrategyKind, Arc<dyn DeployStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rolling, blue-green and canary
    pub fn standard(
        runner: Arc<dyn CommandRunner>,
        health_url: &str,
        canary: CanaryConfig,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RollingStrategy::new(runner.clone())));
        registry.register(Arc::new(BlueGreenStrategy::new(runner.clone(), health_url)));
        registry.register(Arc::new(CanaryStrategy::new(runner, canary)));
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn DeployStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    pub fn get(&self, kind: StrategyKind) -> Result<Arc<dyn DeployStrategy>, EngineError> {
        self.strategies
            .get(&kind)
            .cloned()
            .ok_or(EngineError::StrategyNotRegistered(kind))
    }

    /// Looks up `name`, falling back to `default` for unknown names
    pub fn resolve(
        &self,
        name: &str,
        default: StrategyKind,
    ) -> Result<ResolvedStrategy, EngineError> {
        if let Some(strategy) = name
            .parse::<StrategyKind>()
            .ok()
            .and_then(|kind| self.strategies.get(&kind))
        {
            return Ok(ResolvedStrategy {
                strategy: strategy.clone(),
                fallback_from: None,
            });
        }

        Ok(ResolvedStrategy {
            strategy: self.get(default)?,
            fallback_from: Some(name.to_string()),
        })
    }
}
