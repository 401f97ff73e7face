//! Generation request parsing and validation

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::target::{Target, TargetError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unmarshal config file: {0}")]
    Syntax(#[from] serde_yaml::Error),

    #[error("provider and module can't be set at the same time")]
    ProviderAndModule,

    #[error("target required")]
    MissingTarget,

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("name required")]
    MissingName,

    #[error("one of provider or module is required")]
    MissingSource,

    #[error("output required")]
    MissingOutput,

    #[error("target.moduleName required")]
    MissingModuleName,

    #[error("invalid target.packageName {0:?}: must be a single path segment")]
    InvalidPackageName(String),
}

/// A provider or module to generate bindings for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Registry locator, e.g. `registry.terraform.io/hashicorp/google`
    pub source: String,

    /// Version constraint, e.g. `4.69.1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Which kind of source a request targets. Exactly one is ever set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Provider(Source),
    Module(Source),
}

impl SourceKind {
    pub fn source(&self) -> &Source {
        match self {
            SourceKind::Provider(source) | SourceKind::Module(source) => source,
        }
    }
}

/// A validated generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    name: String,
    source: SourceKind,
    target: Target,
    output: PathBuf,
}

/// Request document as written by the user, before validation
#[derive(Debug, Deserialize)]
struct RawRequest {
    #[serde(default)]
    name: String,
    provider: Option<Source>,
    module: Option<Source>,
    target: Option<serde_json::Value>,
    #[serde(default)]
    output: String,
}

impl Request {
    /// Parse and validate a request document.
    ///
    /// Rules are checked in a fixed order and the first violation is
    /// returned. A request is only produced when every rule holds.
    pub fn parse(bytes: &[u8]) -> Result<Self, ConfigError> {
        let raw: RawRequest = serde_yaml::from_slice(bytes)?;

        if raw.provider.is_some() && raw.module.is_some() {
            return Err(ConfigError::ProviderAndModule);
        }
        let mut target = Target::decode(raw.target.ok_or(ConfigError::MissingTarget)?)?;

        if raw.name.is_empty() {
            return Err(ConfigError::MissingName);
        }
        let source = match (raw.provider, raw.module) {
            (Some(provider), None) => SourceKind::Provider(provider),
            (None, Some(module)) => SourceKind::Module(module),
            _ => return Err(ConfigError::MissingSource),
        };
        if raw.output.is_empty() {
            return Err(ConfigError::MissingOutput);
        }
        if target.module_name().is_empty() {
            return Err(ConfigError::MissingModuleName);
        }

        target.default_package_name(&raw.name);
        if !is_single_segment(target.package_name()) {
            return Err(ConfigError::InvalidPackageName(
                target.package_name().to_string(),
            ));
        }

        Ok(Self {
            name: raw.name,
            source,
            target,
            output: PathBuf::from(raw.output),
        })
    }

    /// Name of the provider or module, used as the output package suffix
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &SourceKind {
        &self.source
    }

    pub fn provider(&self) -> Option<&Source> {
        match &self.source {
            SourceKind::Provider(source) => Some(source),
            SourceKind::Module(_) => None,
        }
    }

    pub fn module(&self) -> Option<&Source> {
        match &self.source {
            SourceKind::Module(source) => Some(source),
            SourceKind::Provider(_) => None,
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Parent directory of the generated package. The final location is
    /// `<output>/<package_name>`.
    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn package_name(&self) -> &str {
        self.target.package_name()
    }

    pub fn module_name(&self) -> &str {
        self.target.module_name()
    }
}

/// The package name becomes a directory under the output and under the
/// workspace's `dist/go`, so it must not climb out of either.
pub(crate) fn is_single_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
