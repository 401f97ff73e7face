//! Error types for cdktfgen

use std::fmt;

use crate::config::ConfigError;
use crate::exec::BuildStepError;
use crate::manifest::ManifestError;
use crate::publish::PublishError;
use crate::registry::ResolutionError;
use crate::scaffold::ScaffoldError;
use crate::toolchain::ToolchainError;

/// Pipeline states, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    AcquireToolchain,
    LoadConfig,
    ResolveDependencies,
    BuildDescriptors,
    MaterializeWorkspace,
    RunExternalSteps,
    PublishOutput,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AcquireToolchain => "acquire toolchain",
            Stage::LoadConfig => "load config",
            Stage::ResolveDependencies => "resolve dependencies",
            Stage::BuildDescriptors => "build descriptors",
            Stage::MaterializeWorkspace => "materialize workspace",
            Stage::RunExternalSteps => "run external steps",
            Stage::PublishOutput => "publish output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for generator operations
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Scaffold(#[from] ScaffoldError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    BuildStep(#[from] BuildStepError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled")]
    Cancelled,
}

impl GeneratorError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        GeneratorError::Io {
            context: context.into(),
            source,
        }
    }
}

/// A failure attributed to the pipeline stage it happened in
#[derive(Debug, thiserror::Error)]
#[error("{stage}: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: GeneratorError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: impl Into<GeneratorError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, GeneratorError::Cancelled)
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Attach a stage to a fallible step
pub(crate) trait StageContext<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T, E> StageContext<T> for std::result::Result<T, E>
where
    E: Into<GeneratorError>,
{
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| PipelineError::new(stage, e))
    }
}
