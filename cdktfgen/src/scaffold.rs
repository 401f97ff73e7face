//! Build workspace scaffolding
//!
//! Renders the npm project descriptor that drives the cdktf and jsii
//! toolchain, and writes it together with the cdktf manifest into the build
//! workspace.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::config::Request;
use crate::manifest::{Manifest, ManifestError, MANIFEST_FILE};
use crate::registry::ResolvedDependencies;

pub const DESCRIPTOR_FILE: &str = "package.json";

/// jsii output directory inside the workspace
pub const DIST_DIR: &str = "dist";

#[derive(Debug, Error)]
pub enum ScaffoldError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("render package.json: {0}")]
    Render(#[source] serde_json::Error),

    #[error("write {file}: {source}")]
    Write {
        file: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Everything the descriptor template needs
#[derive(Debug, Clone)]
pub struct TemplateData<'a> {
    pub name: &'a str,
    pub package_name: &'a str,
    pub module_name: &'a str,
    pub deps: &'a ResolvedDependencies,
}

impl<'a> TemplateData<'a> {
    pub fn new(request: &'a Request, deps: &'a ResolvedDependencies) -> Self {
        Self {
            name: request.name(),
            package_name: request.package_name(),
            module_name: request.module_name(),
            deps,
        }
    }
}

/// package.json as understood by npm and jsii
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PackageDescriptor<'a> {
    name: String,
    version: &'static str,
    description: String,
    private: bool,
    license: &'static str,
    author: Author,
    repository: Repository<'a>,
    main: &'static str,
    types: &'static str,
    scripts: BTreeMap<&'static str, &'static str>,
    jsii: JsiiConfig<'a>,
    dev_dependencies: BTreeMap<&'static str, &'a str>,
    peer_dependencies: BTreeMap<&'static str, &'a str>,
}

#[derive(Debug, Serialize)]
struct Author {
    name: &'static str,
    organization: bool,
}

#[derive(Debug, Serialize)]
struct Repository<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsiiConfig<'a> {
    outdir: &'static str,
    targets: JsiiTargets<'a>,
    tsc: JsiiTsc,
}

#[derive(Debug, Serialize)]
struct JsiiTargets<'a> {
    go: JsiiGoTarget<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsiiGoTarget<'a> {
    module_name: &'a str,
    package_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsiiTsc {
    out_dir: &'static str,
    root_dir: &'static str,
}

/// Render the project descriptor for `data`
pub fn render_descriptor(data: &TemplateData<'_>) -> Result<Vec<u8>, ScaffoldError> {
    let deps = data.deps;

    let scripts = BTreeMap::from([
        ("fetch", "cdktf get --output src"),
        ("compile", "jsii --silence-warnings=reserved-word"),
        ("pkg:go", "jsii-pacmak --target go"),
    ]);

    let dev_dependencies = BTreeMap::from([
        ("cdktf", deps.cdktf.as_str()),
        ("cdktf-cli", deps.cdktf.as_str()),
        ("constructs", deps.constructs.as_str()),
        ("jsii", deps.jsii.as_str()),
        ("jsii-pacmak", deps.jsii_pacmak.as_str()),
    ]);

    let peer_dependencies = BTreeMap::from([
        ("cdktf", deps.cdktf.as_str()),
        ("constructs", deps.constructs.as_str()),
    ]);

    let descriptor = PackageDescriptor {
        name: format!("cdktf-provider-gen-{}", data.package_name),
        version: "0.0.0",
        description: format!("CDK for Terraform bindings for {}", data.name),
        private: true,
        license: "UNLICENSED",
        author: Author {
            name: "cdktf-provider-gen",
            organization: false,
        },
        repository: Repository {
            kind: "git",
            url: data.module_name,
        },
        main: "lib/index.js",
        types: "lib/index.d.ts",
        scripts,
        jsii: JsiiConfig {
            outdir: DIST_DIR,
            targets: JsiiTargets {
                go: JsiiGoTarget {
                    module_name: data.module_name,
                    package_name: data.package_name,
                },
            },
            tsc: JsiiTsc {
                out_dir: "lib",
                root_dir: "src",
            },
        },
        dev_dependencies,
        peer_dependencies,
    };

    let mut bytes = serde_json::to_vec_pretty(&descriptor).map_err(ScaffoldError::Render)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// The two descriptor files placed at the root of the build workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFiles {
    pub package_json: Vec<u8>,
    pub cdktf_json: Vec<u8>,
}

impl ProjectFiles {
    /// Build both descriptors in memory
    pub fn build(request: &Request, deps: &ResolvedDependencies) -> Result<Self, ScaffoldError> {
        let cdktf_json = Manifest::for_request(request)?.to_json()?;
        let package_json = render_descriptor(&TemplateData::new(request, deps))?;

        Ok(Self {
            package_json,
            cdktf_json,
        })
    }

    pub async fn write_to(&self, dir: &Path) -> Result<(), ScaffoldError> {
        for (file, contents) in [
            (DESCRIPTOR_FILE, &self.package_json),
            (MANIFEST_FILE, &self.cdktf_json),
        ] {
            tracing::debug!("write {}", file);
            tokio::fs::write(dir.join(file), contents)
                .await
                .map_err(|source| ScaffoldError::Write { file, source })?;
        }
        Ok(())
    }
}

/// Where jsii-pacmak leaves the go package inside the workspace
pub fn artifact_dir(workspace: &Path, package_name: &str) -> std::path::PathBuf {
    workspace.join(DIST_DIR).join("go").join(package_name)
}
