//! cdktfgen - CDK for Terraform binding generator
//!
//! Drives the cdktf toolchain end to end for a single Terraform provider or
//! module: validates the request, pins compatible toolchain dependencies,
//! renders the project descriptors, runs the external build steps in a
//! throwaway workspace and publishes the generated package.

// Core modules
pub mod config;
pub mod context;
pub mod error;
pub mod target;

// Descriptor construction
pub mod manifest;
pub mod registry;
pub mod scaffold;

// Execution
pub mod exec;
pub mod pipeline;
pub mod publish;
pub mod toolchain;
pub mod workspace;

// Re-exports for convenience
pub use config::{ConfigError, Request, Source, SourceKind};
pub use context::Context;
pub use error::{GeneratorError, PipelineError, Result, Stage};
pub use exec::{BuildStepError, CommandRunner, ExecContext, ProcessRunner};
pub use manifest::{Manifest, ManifestError, ManifestSource};
pub use pipeline::{Pipeline, PipelineOptions, BUILD_STEPS, DEFAULT_CDKTF_VERSION};
pub use publish::{publish_output, PublishError};
pub use registry::{DependencySource, NpmRegistry, ResolutionError, ResolvedDependencies};
pub use scaffold::{ProjectFiles, ScaffoldError};
pub use target::{GoTarget, Target, TargetError};
pub use toolchain::{TerraformRelease, ToolchainError, ToolchainInstaller};
pub use workspace::EphemeralDir;
