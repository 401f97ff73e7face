//! cdktf.json manifest construction
//!
//! The manifest tells the cdktf toolchain which provider or module to fetch
//! bindings for. It is derived from a validated [`Request`] and written once
//! into the build workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Request, SourceKind};

/// File name of the manifest inside the build workspace
pub const MANIFEST_FILE: &str = "cdktf.json";

/// Language the cdktf toolchain itself runs in. Unrelated to the target
/// language of the generated bindings.
pub const MANIFEST_LANGUAGE: &str = "typescript";

/// The workspace never synthesizes, so the app entrypoint is a no-op
pub const MANIFEST_APP: &str = "echo noop";

pub const MANIFEST_PROJECT_ID: &str = "noop";

pub const MANIFEST_COMMENT: &str =
    "Generated by cdktf-provider-gen for binding generation only, do not edit";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("provider name not found: {0:?}")]
    ProviderNameNotFound(String),

    #[error("marshal cdktf.json: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub language: String,
    pub app: String,
    pub send_crash_reports: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_providers: Option<Vec<ManifestSource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_modules: Option<Vec<ManifestSource>>,
    pub project_id: String,
    #[serde(rename = "//")]
    pub comment: String,
}

/// A provider or module entry as the toolchain expects it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSource {
    pub name: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Display name of a provider: the last non-empty `/` separated segment of
/// its locator.
pub fn provider_display_name(locator: &str) -> Option<&str> {
    locator.split('/').rev().find(|segment| !segment.is_empty())
}

impl Manifest {
    pub fn for_request(request: &Request) -> Result<Self, ManifestError> {
        let mut manifest = Self {
            language: MANIFEST_LANGUAGE.to_string(),
            app: MANIFEST_APP.to_string(),
            send_crash_reports: false,
            terraform_providers: None,
            terraform_modules: None,
            project_id: MANIFEST_PROJECT_ID.to_string(),
            comment: MANIFEST_COMMENT.to_string(),
        };

        match request.source() {
            SourceKind::Provider(provider) => {
                let name = provider_display_name(&provider.source)
                    .ok_or_else(|| ManifestError::ProviderNameNotFound(provider.source.clone()))?;
                manifest.terraform_providers = Some(vec![ManifestSource {
                    name: name.to_string(),
                    source: provider.source.clone(),
                    version: provider.version.clone(),
                }]);
            }
            SourceKind::Module(module) => {
                manifest.terraform_modules = Some(vec![ManifestSource {
                    name: request.name().to_string(),
                    source: module.source.clone(),
                    version: module.version.clone(),
                }]);
            }
        }

        Ok(manifest)
    }

    /// Serialize to the on-disk format. serde_json leaves `/`, `<`, `>` and
    /// `&` unescaped, so registry locators stay readable.
    pub fn to_json(&self) -> Result<Vec<u8>, ManifestError> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
