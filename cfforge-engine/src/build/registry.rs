//! Language to pipeline lookup

use cfforge_core::domain::project::Language;
use std::collections::HashMap;
use std::sync::Arc;

use super::BuildPipeline;
use super::go::GoPipeline;
use super::java::JavaPipeline;
use super::node::NodePipeline;
use super::python::PythonPipeline;
use crate::error::EngineError;

/// Pipelines keyed by the language they build
///
/// Languages without a registered pipeline fail with
/// [`EngineError::UnsupportedLanguage`].
#[derive(Clone, Default)]
pub struct PipelineRegistry {
    pipelines: HashMap<Language, Arc<dyn BuildPipeline>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Java, Node.js, Python and Go
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JavaPipeline));
        registry.register(Arc::new(NodePipeline));
        registry.register(Arc::new(PythonPipeline));
        registry.register(Arc::new(GoPipeline));
        registry
    }

    /// Registers `pipeline`, replacing any pipeline for the same language
    pub fn register(&mut self, pipeline: Arc<dyn BuildPipeline>) {
        self.pipelines.insert(pipeline.language(), pipeline);
    }

    pub fn resolve(&self, language: Language) -> Result<Arc<dyn BuildPipeline>, EngineError> {
        self.pipelines
            .get(&language)
            .cloned()
            .ok_or(EngineError::UnsupportedLanguage(language))
    }
}
