//! Logging setup
//!
//! `RUST_LOG` takes precedence. Without it `LOG_LEVEL` (default `info`)
//! applies to both crates. `LOG_FORMAT=json` switches to JSON lines.

use std::env;

use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const SERVICE_NAME: &str = "cdktf-provider-gen";

const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_TARGETS: [&str; 2] = ["cdktfgen", "cdktf_provider_gen"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Console,
    Json,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Console,
        }
    }
}

/// Identity attached to every log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: &'static str,
    pub version: &'static str,
    pub instance_id: String,
}

impl Resource {
    pub fn detect() -> Self {
        Self {
            name: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            instance_id: instance_id(
                env::var("HOSTNAME").ok(),
                std::fs::read_to_string("/etc/hostname").ok(),
            ),
        }
    }

    /// Root span for the process
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "service",
            service.name = self.name,
            service.version = self.version,
            service.instance_id = %self.instance_id,
        )
    }
}

fn instance_id(hostname_env: Option<String>, hostname_file: Option<String>) -> String {
    [hostname_env, hostname_file]
        .into_iter()
        .flatten()
        .map(|h| h.trim().to_string())
        .find(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn filter_directives(rust_log: Option<&str>, log_level: Option<&str>) -> String {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        return directives.to_string();
    }

    let level = log_level
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(DEFAULT_LOG_LEVEL)
        .to_lowercase();
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber
pub fn init() {
    let directives = filter_directives(
        env::var("RUST_LOG").ok().as_deref(),
        env::var("LOG_LEVEL").ok().as_deref(),
    );
    let filter = EnvFilter::try_new(&directives)
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(None, None)));

    let registry = tracing_subscriber::registry().with(filter);
    match LogFormat::parse(env::var("LOG_FORMAT").ok().as_deref()) {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Console => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}
