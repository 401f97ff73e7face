//! Generation pipeline
//!
//! A run moves strictly forward through the [`Stage`]s: acquire the pinned
//! terraform, load and validate the request, resolve the cdktf toolchain
//! pins, build the descriptors, materialize the build workspace, run the
//! external build steps one at a time and publish the generated package.
//!
//! Both ephemeral directories are owned by the run and removed on every exit
//! path unless `keep` is set.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::field;
use tracing::{Instrument, Span};

use crate::config::{Request, SourceKind};
use crate::context::Context;
use crate::error::{GeneratorError, Result, Stage, StageContext};
use crate::exec::{CommandRunner, ExecContext, ProcessRunner};
use crate::manifest::provider_display_name;
use crate::publish::publish_output;
use crate::registry::{DependencySource, NpmRegistry};
use crate::scaffold::{artifact_dir, ProjectFiles};
use crate::toolchain::{TerraformRelease, ToolchainInstaller};
use crate::workspace::EphemeralDir;

/// cdktf release used when none is requested
pub const DEFAULT_CDKTF_VERSION: &str = "0.16.3";

/// External build steps, run in order inside the build workspace
pub const BUILD_STEPS: [&str; 4] = [
    "npm install --no-save",
    "npm run fetch",
    "npm run compile",
    "npm run pkg:go",
];

const TOOLCHAIN_DIR_PREFIX: &str = "tf-bin";
const WORKSPACE_DIR_PREFIX: &str = "cdktfprovidergen";

/// Settings for a single pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Path of the request document
    pub config_path: PathBuf,
    /// Umbrella cdktf version the toolchain pins are resolved for
    pub cdktf_version: String,
    /// Retain both ephemeral directories for debugging
    pub keep: bool,
    /// Parent of the ephemeral directories, the system temp dir when unset
    pub temp_root: Option<PathBuf>,
    /// Base for a relative request output, the process working dir when unset
    pub working_dir: Option<PathBuf>,
}

impl PipelineOptions {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            cdktf_version: DEFAULT_CDKTF_VERSION.to_string(),
            keep: false,
            temp_root: None,
            working_dir: None,
        }
    }

    pub fn with_cdktf_version(mut self, version: impl Into<String>) -> Self {
        self.cdktf_version = version.into();
        self
    }

    pub fn with_keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    pub fn with_temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(dir.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Drives one generation run
///
/// Runs mutate nothing process wide, but they are not meant to overlap on
/// the same output directory.
pub struct Pipeline {
    options: PipelineOptions,
    installer: Arc<dyn ToolchainInstaller>,
    resolver: Arc<dyn DependencySource>,
    runner: Arc<dyn CommandRunner>,
}

impl Pipeline {
    pub fn new(
        options: PipelineOptions,
        installer: Arc<dyn ToolchainInstaller>,
        resolver: Arc<dyn DependencySource>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            options,
            installer,
            resolver,
            runner,
        }
    }

    /// Pipeline backed by releases.hashicorp.com, the npm registry and real
    /// child processes
    pub fn with_defaults(options: PipelineOptions) -> std::result::Result<Self, GeneratorError> {
        Ok(Self::new(
            options,
            Arc::new(TerraformRelease::new()?),
            Arc::new(NpmRegistry::new()?),
            Arc::new(ProcessRunner),
        ))
    }

    /// Run every stage and return the published package directory
    pub async fn run(&self, ctx: &Context) -> Result<PathBuf> {
        let span = tracing::info_span!(
            "gen",
            name = field::Empty,
            provider.name = field::Empty,
            provider.version = field::Empty,
            module.source = field::Empty,
            module.version = field::Empty,
            workspace = field::Empty,
            src_dir = field::Empty,
            output_dir = field::Empty,
        );
        self.run_stages(ctx, &span).instrument(span.clone()).await
    }

    async fn run_stages(&self, ctx: &Context, span: &Span) -> Result<PathBuf> {
        // Toolchain directory lives until the end of the run
        let toolchain_dir = self
            .ephemeral(TOOLCHAIN_DIR_PREFIX)
            .stage(Stage::AcquireToolchain)?;
        let terraform = cancellable(ctx, self.installer.install(toolchain_dir.path()))
            .await
            .stage(Stage::AcquireToolchain)?;
        let exec = ExecContext::inherit().with_prepended(toolchain_dir.path());
        tracing::debug!(terraform = %terraform.display(), "toolchain ready");

        let request = self.load_request().await.stage(Stage::LoadConfig)?;
        record_request(span, &request);

        let deps = cancellable(ctx, self.resolver.resolve(&self.options.cdktf_version))
            .await
            .stage(Stage::ResolveDependencies)?;
        tracing::debug!(
            jsii = %deps.jsii,
            jsii_pacmak = %deps.jsii_pacmak,
            constructs = %deps.constructs,
            cdktf = %deps.cdktf,
            "resolved cdktf dependencies"
        );

        let files = ProjectFiles::build(&request, &deps).stage(Stage::BuildDescriptors)?;

        let workspace = self
            .ephemeral(WORKSPACE_DIR_PREFIX)
            .stage(Stage::MaterializeWorkspace)?;
        span.record("workspace", field::display(workspace.path().display()));
        files
            .write_to(workspace.path())
            .await
            .stage(Stage::MaterializeWorkspace)?;

        tracing::info!("compiling cdktf provider code");
        for command in BUILD_STEPS {
            cancellable(ctx, self.runner.run(&exec, workspace.path(), command))
                .await
                .stage(Stage::RunExternalSteps)?;
        }

        let output_base = self
            .working_dir()
            .stage(Stage::PublishOutput)?
            .join(request.output());
        let src_dir = artifact_dir(workspace.path(), request.package_name());
        span.record("src_dir", field::display(src_dir.display()));
        let output_dir = publish(src_dir, output_base, request.package_name().to_string())
            .await
            .stage(Stage::PublishOutput)?;
        span.record("output_dir", field::display(output_dir.display()));

        tracing::info!("generated cdktf bindings");
        Ok(output_dir)
    }

    fn ephemeral(&self, prefix: &str) -> std::result::Result<EphemeralDir, GeneratorError> {
        EphemeralDir::create(prefix, self.options.temp_root.as_deref(), self.options.keep)
            .map_err(|e| GeneratorError::io(format!("create temp {} dir", prefix), e))
    }

    async fn load_request(&self) -> std::result::Result<Request, GeneratorError> {
        let path = &self.options.config_path;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| GeneratorError::io(format!("read config file {:?}", path), e))?;
        Ok(Request::parse(&bytes)?)
    }

    fn working_dir(&self) -> std::result::Result<PathBuf, GeneratorError> {
        match &self.options.working_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().map_err(|e| GeneratorError::io("get working dir", e)),
        }
    }
}

fn record_request(span: &Span, request: &Request) {
    span.record("name", request.name());
    match request.source() {
        SourceKind::Provider(provider) => {
            span.record(
                "provider.name",
                provider_display_name(&provider.source).unwrap_or_default(),
            );
            span.record(
                "provider.version",
                provider.version.as_deref().unwrap_or_default(),
            );
        }
        SourceKind::Module(module) => {
            span.record("module.source", module.source.as_str());
            span.record(
                "module.version",
                module.version.as_deref().unwrap_or_default(),
            );
        }
    }
}

/// Publishing is plain blocking filesystem work, keep it off the runtime
async fn publish(
    src_dir: PathBuf,
    output_base: PathBuf,
    package_name: String,
) -> std::result::Result<PathBuf, GeneratorError> {
    tokio::task::spawn_blocking(move || publish_output(&src_dir, &output_base, &package_name))
        .await
        .map_err(|e| GeneratorError::io("publish task", io::Error::other(e)))?
        .map_err(Into::into)
}

/// Race a step against cancellation. An abandoned step is dropped, which
/// kills any child process it owns.
async fn cancellable<T, E>(
    ctx: &Context,
    step: impl Future<Output = std::result::Result<T, E>>,
) -> std::result::Result<T, GeneratorError>
where
    E: Into<GeneratorError>,
{
    if ctx.is_cancelled() {
        return Err(GeneratorError::Cancelled);
    }

    tokio::select! {
        result = step => result.map_err(Into::into),
        _ = ctx.cancelled() => Err(GeneratorError::Cancelled),
    }
}
