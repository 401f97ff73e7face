//! Target language configuration
//!
//! A target is a tagged union keyed by its `language` field. Decoding happens
//! in two phases: the discriminant is read on its own, then the whole payload
//! is decoded against the variant it selects. Unknown languages are a hard
//! decode error.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Discriminant value of the go target
pub const GO_LANGUAGE: &str = "go";

/// Language binding to generate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "language")]
pub enum Target {
    #[serde(rename = "go")]
    Go(GoTarget),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoTarget {
    /// Root module, e.g. `github.com/sourcegraph/controller-cdktf/gen`
    pub module_name: String,

    /// Package under the module, e.g. `google`. When empty it defaults to the
    /// request name, and the full import path is `<module_name>/<package_name>`.
    #[serde(default)]
    pub package_name: String,
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("unknown target language {0:?}")]
    UnknownLanguage(String),

    #[error("invalid {language} target: {source}")]
    InvalidPayload {
        language: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid target: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// First decoding phase: only the discriminant
#[derive(Deserialize)]
struct Discriminant {
    #[serde(default)]
    language: String,
}

impl Target {
    /// Decode a target payload: read the discriminant, then decode the full
    /// payload against the selected variant.
    pub fn decode(payload: serde_json::Value) -> Result<Self, TargetError> {
        let discriminant = Discriminant::deserialize(&payload).map_err(TargetError::Malformed)?;

        match discriminant.language.as_str() {
            GO_LANGUAGE => GoTarget::deserialize(payload)
                .map(Target::Go)
                .map_err(|source| TargetError::InvalidPayload {
                    language: GO_LANGUAGE,
                    source,
                }),
            other => Err(TargetError::UnknownLanguage(other.to_string())),
        }
    }

    /// Discriminant of the populated variant
    pub fn language(&self) -> &'static str {
        match self {
            Target::Go(_) => GO_LANGUAGE,
        }
    }

    pub fn module_name(&self) -> &str {
        match self {
            Target::Go(go) => &go.module_name,
        }
    }

    pub fn package_name(&self) -> &str {
        match self {
            Target::Go(go) => &go.package_name,
        }
    }

    /// Fill in an empty package name
    pub(crate) fn default_package_name(&mut self, name: &str) {
        match self {
            Target::Go(go) => {
                if go.package_name.is_empty() {
                    go.package_name = name.to_string();
                }
            }
        }
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let payload = serde_json::Value::deserialize(deserializer)?;
        Target::decode(payload).map_err(D::Error::custom)
    }
}
