//! cdktf dependency resolution
//!
//! A cdktf release pins the versions of the jsii toolchain it was built
//! with. Those pins are looked up once per run from the package registry.

pub mod client;
pub mod error;

use async_trait::async_trait;

pub use client::{NpmRegistry, DEFAULT_REGISTRY_URL};
pub use error::ResolutionError;

/// Pinned toolchain versions for one cdktf release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependencies {
    pub jsii: String,
    pub jsii_pacmak: String,
    pub constructs: String,
    /// The requested umbrella version
    pub cdktf: String,
}

/// Source of pinned dependency versions
///
/// The registry call is the only network dependent step of a run. Tests swap
/// in a fixture behind this trait.
#[async_trait]
pub trait DependencySource: Send + Sync {
    async fn resolve(&self, cdktf_version: &str) -> Result<ResolvedDependencies, ResolutionError>;
}
