//! Pinned terraform toolchain acquisition
//!
//! cdktf shells out to `terraform` while fetching provider schemas. A pinned
//! release is downloaded into the run's toolchain directory, verified against
//! the published SHA256SUMS and exposed to build steps through the
//! [`ExecContext`](crate::exec::ExecContext) search path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::process::Command;

use crate::exec::ExecContext;

/// Terraform release installed for every run
pub const TERRAFORM_VERSION: &str = "1.5.5";

pub const HASHICORP_RELEASES_URL: &str = "https://releases.hashicorp.com";

#[cfg(windows)]
const TERRAFORM_BINARY: &str = "terraform.exe";
#[cfg(not(windows))]
const TERRAFORM_BINARY: &str = "terraform";

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unsupported platform {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("no checksum for {0} in SHA256SUMS")]
    MissingChecksum(String),

    #[error("checksum mismatch for {archive}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        archive: String,
        expected: String,
        actual: String,
    },

    #[error("write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extract {archive:?}: {message}")]
    Extract { archive: PathBuf, message: String },

    #[error("{binary} not found in {dir:?} after install: {source}")]
    NotFound {
        binary: &'static str,
        dir: PathBuf,
        #[source]
        source: which::Error,
    },
}

/// Installs the external build tool into a directory
#[async_trait]
pub trait ToolchainInstaller: Send + Sync {
    /// Install into `dir` and return the path of the installed binary
    async fn install(&self, dir: &Path) -> Result<PathBuf, ToolchainError>;
}

/// A pinned terraform release from releases.hashicorp.com
#[derive(Clone)]
pub struct TerraformRelease {
    http: reqwest::Client,
    base_url: String,
    version: String,
}

impl TerraformRelease {
    pub fn new() -> Result<Self, ToolchainError> {
        Self::with_base_url(HASHICORP_RELEASES_URL, TERRAFORM_VERSION)
    }

    pub fn with_base_url(base_url: &str, version: &str) -> Result<Self, ToolchainError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| ToolchainError::Download {
                url: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            version: version.to_string(),
        })
    }

    fn release_url(&self) -> String {
        format!("{}/terraform/{}", self.base_url, self.version)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ToolchainError> {
        tracing::debug!("GET request to: {}", url);

        let download = |source| ToolchainError::Download {
            url: url.to_string(),
            source,
        };

        let response = self.http.get(url).send().await.map_err(download)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolchainError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(download)?;
        Ok(body.to_vec())
    }

    /// Download the archive for this platform and check it against the
    /// release's SHA256SUMS
    async fn download_verified(&self) -> Result<(String, Vec<u8>), ToolchainError> {
        let (os, arch) = platform()?;
        let archive = archive_name(&self.version, os, arch);
        let release_url = self.release_url();

        let sums = self
            .fetch(&format!(
                "{}/terraform_{}_SHA256SUMS",
                release_url, self.version
            ))
            .await?;
        let expected = checksum_for(&String::from_utf8_lossy(&sums), &archive)
            .ok_or_else(|| ToolchainError::MissingChecksum(archive.clone()))?;

        let bytes = self.fetch(&format!("{}/{}", release_url, archive)).await?;
        let actual = hex::encode(Sha256::digest(&bytes));
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(ToolchainError::ChecksumMismatch {
                archive,
                expected,
                actual,
            });
        }

        Ok((archive, bytes))
    }
}

#[async_trait]
impl ToolchainInstaller for TerraformRelease {
    async fn install(&self, dir: &Path) -> Result<PathBuf, ToolchainError> {
        tracing::info!(version = %self.version, dir = %dir.display(), "installing terraform");

        let (archive, bytes) = self.download_verified().await?;

        let archive_path = dir.join(&archive);
        tokio::fs::write(&archive_path, &bytes)
            .await
            .map_err(|source| ToolchainError::Io {
                path: archive_path.clone(),
                source,
            })?;

        extract(&archive_path, dir).await?;

        tokio::fs::remove_file(&archive_path)
            .await
            .map_err(|source| ToolchainError::Io {
                path: archive_path.clone(),
                source,
            })?;

        let binary = ExecContext::from_paths(vec![dir.to_path_buf()])
            .which(TERRAFORM_BINARY, dir)
            .map_err(|source| ToolchainError::NotFound {
                binary: TERRAFORM_BINARY,
                dir: dir.to_path_buf(),
                source,
            })?;

        tracing::debug!(binary = %binary.display(), "terraform installed");
        Ok(binary)
    }
}

async fn extract(archive: &Path, dir: &Path) -> Result<(), ToolchainError> {
    let output = Command::new("unzip")
        .arg("-o")
        .arg("-q")
        .arg(archive)
        .arg("-d")
        .arg(dir)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ToolchainError::Extract {
            archive: archive.to_path_buf(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ToolchainError::Extract {
            archive: archive.to_path_buf(),
            message: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    Ok(())
}

/// Release platform naming for the running host
pub fn platform() -> Result<(&'static str, &'static str), ToolchainError> {
    platform_for(std::env::consts::OS, std::env::consts::ARCH)
}

fn platform_for(os: &str, arch: &str) -> Result<(&'static str, &'static str), ToolchainError> {
    let unsupported = || ToolchainError::UnsupportedPlatform {
        os: os.to_string(),
        arch: arch.to_string(),
    };

    let release_os = match os {
        "linux" => "linux",
        "macos" => "darwin",
        "windows" => "windows",
        "freebsd" => "freebsd",
        "openbsd" => "openbsd",
        _ => return Err(unsupported()),
    };
    let release_arch = match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "arm" => "arm",
        _ => return Err(unsupported()),
    };

    Ok((release_os, release_arch))
}

fn archive_name(version: &str, os: &str, arch: &str) -> String {
    format!("terraform_{}_{}_{}.zip", version, os, arch)
}

/// Look up an archive's digest in a `sha256sum` style listing
fn checksum_for(sums: &str, archive: &str) -> Option<String> {
    sums.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let digest = fields.next()?;
        let name = fields.next()?.trim_start_matches('*');
        (name == archive).then(|| digest.to_string())
    })
}
