use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{DependencySource, ResolutionError, ResolvedDependencies};

/// Public npm registry
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// npm registry client resolving cdktf release pins
///
/// Issues a single GET per resolution. There is no retry and no request
/// timeout; callers bound latency through cancellation.
#[derive(Clone)]
pub struct NpmRegistry {
    http: reqwest::Client,
    base_url: Url,
}

/// The slice of `GET /cdktf/<version>` we care about
#[derive(Debug, Deserialize)]
struct ReleaseMetadata {
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: HashMap<String, String>,
}

impl NpmRegistry {
    /// Create a client for the public npm registry
    pub fn new() -> Result<Self, ResolutionError> {
        Self::with_base_url(DEFAULT_REGISTRY_URL)
    }

    /// Create a client for a registry mirror or a local mock server
    pub fn with_base_url(base_url: &str) -> Result<Self, ResolutionError> {
        let invalid = |message: String| ResolutionError::InvalidUrl {
            url: base_url.to_string(),
            message,
        };

        let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("url cannot be a base".to_string()));
        }

        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            base_url: parsed,
        })
    }

    fn release_url(&self, version: &str) -> Result<Url, ResolutionError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ResolutionError::InvalidUrl {
                url: self.base_url.to_string(),
                message: "url cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .push("cdktf")
            .push(version);
        Ok(url)
    }
}

#[async_trait]
impl DependencySource for NpmRegistry {
    async fn resolve(&self, cdktf_version: &str) -> Result<ResolvedDependencies, ResolutionError> {
        let url = self.release_url(cdktf_version)?;
        tracing::debug!(url = %url, "fetching cdktf release metadata");

        let response = self.http.get(url).send().await?;
        let status = response.status();
        tracing::debug!("Response status: {}", status);

        if !status.is_success() {
            return Err(ResolutionError::Status {
                status: status.as_u16(),
                version: cdktf_version.to_string(),
            });
        }

        let body = response.text().await?;
        let release: ReleaseMetadata =
            serde_json::from_str(&body).map_err(ResolutionError::Decode)?;

        pin_dependencies(release.dev_dependencies, cdktf_version)
    }
}

/// Pull the three pinned toolchain versions out of a release's
/// devDependencies. Each absent key is reported on its own.
fn pin_dependencies(
    mut dev_dependencies: HashMap<String, String>,
    cdktf_version: &str,
) -> Result<ResolvedDependencies, ResolutionError> {
    let jsii = dev_dependencies
        .remove("jsii")
        .ok_or(ResolutionError::MissingJsii)?;
    let jsii_pacmak = dev_dependencies
        .remove("jsii-pacmak")
        .ok_or(ResolutionError::MissingJsiiPacmak)?;
    let constructs = dev_dependencies
        .remove("constructs")
        .ok_or(ResolutionError::MissingConstructs)?;

    Ok(ResolvedDependencies {
        jsii,
        jsii_pacmak,
        constructs,
        cdktf: cdktf_version.to_string(),
    })
}
