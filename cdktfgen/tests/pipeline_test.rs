//! End to end pipeline runs against fake toolchain, registry and build steps

#![allow(clippy::disallowed_methods)] // Allow unwrap() in tests for clarity

use async_trait::async_trait;
use cdktfgen::{
    BuildStepError, CommandRunner, Context, DependencySource, ExecContext, GeneratorError,
    Manifest, Pipeline, PipelineOptions, PublishError, ResolutionError, ResolvedDependencies,
    Stage, ToolchainError, ToolchainInstaller, BUILD_STEPS,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

const GOOGLE_CONFIG: &str = r#"
name: google
provider:
  source: registry.terraform.io/hashicorp/google
  version: 4.69.1
target:
  language: go
  moduleName: github.com/sourcegraph/controller-cdktf/gen
output: gen
"#;

#[derive(Default)]
struct FakeInstaller {
    installed_in: Mutex<Option<PathBuf>>,
    fail: bool,
}

#[async_trait]
impl ToolchainInstaller for FakeInstaller {
    async fn install(&self, dir: &Path) -> Result<PathBuf, ToolchainError> {
        *self.installed_in.lock().unwrap() = Some(dir.to_path_buf());
        if self.fail {
            return Err(ToolchainError::MissingChecksum(
                "terraform_1.5.5_linux_amd64.zip".to_string(),
            ));
        }
        let binary = dir.join("terraform");
        fs::write(&binary, "#!/bin/sh\n").unwrap();
        Ok(binary)
    }
}

struct FixtureResolver {
    result: fn() -> Result<ResolvedDependencies, ResolutionError>,
    requested: Mutex<Vec<String>>,
}

impl FixtureResolver {
    fn new(result: fn() -> Result<ResolvedDependencies, ResolutionError>) -> Self {
        Self {
            result,
            requested: Mutex::new(Vec::new()),
        }
    }
}

fn pinned() -> Result<ResolvedDependencies, ResolutionError> {
    Ok(ResolvedDependencies {
        jsii: "^1.82.0".to_string(),
        jsii_pacmak: "^1.83.0".to_string(),
        constructs: "^10.0.25".to_string(),
        cdktf: "0.16.3".to_string(),
    })
}

#[async_trait]
impl DependencySource for FixtureResolver {
    async fn resolve(&self, cdktf_version: &str) -> Result<ResolvedDependencies, ResolutionError> {
        self.requested
            .lock()
            .unwrap()
            .push(cdktf_version.to_string());
        (self.result)()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum StepBehaviour {
    /// Succeed, producing the go package on the packaging step
    Generate,
    /// Fail the first step
    FailFirst,
    /// Never finish
    Hang,
    /// Succeed without producing the go package
    NoArtifacts,
}

struct Call {
    command: String,
    dir: PathBuf,
    search_path: Vec<PathBuf>,
    manifest: Option<Vec<u8>>,
}

struct RecordingRunner {
    behaviour: StepBehaviour,
    package: &'static str,
    calls: Mutex<Vec<Call>>,
}

impl RecordingRunner {
    fn new(behaviour: StepBehaviour) -> Self {
        Self {
            behaviour,
            package: "google",
            calls: Mutex::new(Vec::new()),
        }
    }

    fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.command.clone())
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(
        &self,
        exec: &ExecContext,
        dir: &Path,
        command: &str,
    ) -> Result<(), BuildStepError> {
        self.calls.lock().unwrap().push(Call {
            command: command.to_string(),
            dir: dir.to_path_buf(),
            search_path: exec.search_path().to_vec(),
            manifest: fs::read(dir.join("cdktf.json")).ok(),
        });

        match self.behaviour {
            StepBehaviour::FailFirst => Err(BuildStepError::Spawn {
                command: command.to_string(),
                source: std::io::Error::other("npm exploded"),
            }),
            StepBehaviour::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            StepBehaviour::NoArtifacts => Ok(()),
            StepBehaviour::Generate => {
                if command == "npm run pkg:go" {
                    let pkg = dir.join("dist/go").join(self.package);
                    fs::create_dir_all(pkg.join("computeinstance")).unwrap();
                    fs::write(pkg.join("google.go"), "package google\n").unwrap();
                    fs::write(
                        pkg.join("computeinstance/ComputeInstance.go"),
                        "package computeinstance\n",
                    )
                    .unwrap();
                }
                Ok(())
            }
        }
    }
}

struct Harness {
    temp_root: TempDir,
    work_dir: TempDir,
    config: PathBuf,
}

impl Harness {
    fn new(config: &str) -> Self {
        let temp_root = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let config_path = work_dir.path().join("google.yaml");
        fs::write(&config_path, config).unwrap();

        Self {
            temp_root,
            work_dir,
            config: config_path,
        }
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions::new(&self.config)
            .with_temp_root(self.temp_root.path())
            .with_working_dir(self.work_dir.path())
    }

    fn leftover_dirs(&self) -> Vec<PathBuf> {
        fs::read_dir(self.temp_root.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    fn output_dir(&self) -> PathBuf {
        self.work_dir.path().join("gen/google")
    }
}

fn pipeline(
    options: PipelineOptions,
    installer: &Arc<FakeInstaller>,
    resolver: &Arc<FixtureResolver>,
    runner: &Arc<RecordingRunner>,
) -> Pipeline {
    Pipeline::new(options, installer.clone(), resolver.clone(), runner.clone())
}

#[tokio::test]
async fn pipeline_generates_and_publishes_package() {
    let harness = Harness::new(GOOGLE_CONFIG);
    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::Generate));

    let output = assert_ok!(
        pipeline(harness.options(), &installer, &resolver, &runner)
            .run(&Context::new())
            .await
    );

    assert_eq!(output, harness.output_dir());
    assert_eq!(
        fs::read_to_string(output.join("google.go")).unwrap(),
        "package google\n"
    );
    assert!(output.join("computeinstance/ComputeInstance.go").is_file());

    assert_eq!(runner.commands(), BUILD_STEPS.to_vec());
    assert_eq!(*resolver.requested.lock().unwrap(), vec!["0.16.3"]);

    // Both ephemeral directories are gone after a successful run
    assert!(harness.leftover_dirs().is_empty());
}

#[tokio::test]
async fn pipeline_runs_steps_in_workspace_with_toolchain_first_on_path() {
    let harness = Harness::new(GOOGLE_CONFIG);
    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::Generate));

    pipeline(harness.options(), &installer, &resolver, &runner)
        .run(&Context::new())
        .await
        .unwrap();

    let toolchain_dir = installer.installed_in.lock().unwrap().clone().unwrap();
    let calls = runner.calls.lock().unwrap();
    let workspace = calls[0].dir.clone();

    assert_ne!(workspace, toolchain_dir);
    assert!(workspace.starts_with(harness.temp_root.path()));
    assert!(toolchain_dir.starts_with(harness.temp_root.path()));
    for call in calls.iter() {
        assert_eq!(call.dir, workspace);
        assert_eq!(call.search_path.first(), Some(&toolchain_dir));
    }
}

#[tokio::test]
async fn pipeline_writes_provider_manifest() {
    let harness = Harness::new(GOOGLE_CONFIG);
    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::Generate));

    pipeline(harness.options(), &installer, &resolver, &runner)
        .run(&Context::new())
        .await
        .unwrap();

    let calls = runner.calls.lock().unwrap();
    let manifest: Manifest =
        serde_json::from_slice(calls[0].manifest.as_ref().unwrap()).unwrap();

    assert_eq!(manifest.language, "typescript");
    assert!(!manifest.send_crash_reports);
    assert!(manifest.terraform_modules.is_none());

    let providers = manifest.terraform_providers.unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].name, "google");
    assert_eq!(providers[0].source, "registry.terraform.io/hashicorp/google");
    assert_eq!(providers[0].version.as_deref(), Some("4.69.1"));
}

#[tokio::test]
async fn pipeline_failure_removes_both_ephemeral_dirs() {
    let harness = Harness::new(GOOGLE_CONFIG);
    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::FailFirst));

    let err = assert_err!(
        pipeline(harness.options(), &installer, &resolver, &runner)
            .run(&Context::new())
            .await
    );

    assert_eq!(err.stage, Stage::RunExternalSteps);
    assert!(err.to_string().contains("npm install --no-save"));
    assert_eq!(runner.commands(), vec!["npm install --no-save"]);

    let toolchain_dir = installer.installed_in.lock().unwrap().clone().unwrap();
    let workspace = runner.calls.lock().unwrap()[0].dir.clone();
    assert!(!toolchain_dir.exists());
    assert!(!workspace.exists());
    assert!(harness.leftover_dirs().is_empty());
    assert!(!harness.output_dir().exists());
}

#[tokio::test]
async fn pipeline_keep_retains_both_ephemeral_dirs() {
    let harness = Harness::new(GOOGLE_CONFIG);
    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::FailFirst));

    let result = pipeline(
        harness.options().with_keep(true),
        &installer,
        &resolver,
        &runner,
    )
    .run(&Context::new())
    .await;
    assert!(result.is_err());

    let toolchain_dir = installer.installed_in.lock().unwrap().clone().unwrap();
    let workspace = runner.calls.lock().unwrap()[0].dir.clone();
    assert!(toolchain_dir.join("terraform").is_file());
    assert!(workspace.join("package.json").is_file());
    assert!(workspace.join("cdktf.json").is_file());
    assert_eq!(harness.leftover_dirs().len(), 2);
}

#[tokio::test]
async fn pipeline_replaces_stale_output() {
    let harness = Harness::new(GOOGLE_CONFIG);
    let stale = harness.output_dir().join("stale.go");
    fs::create_dir_all(harness.output_dir()).unwrap();
    fs::write(&stale, "package stale\n").unwrap();

    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::Generate));

    let output = pipeline(harness.options(), &installer, &resolver, &runner)
        .run(&Context::new())
        .await
        .unwrap();

    assert!(!stale.exists());
    assert!(output.join("google.go").is_file());
}

#[tokio::test]
async fn pipeline_missing_artifacts_fails_publish_and_keeps_output() {
    let harness = Harness::new(GOOGLE_CONFIG);
    let existing = harness.output_dir().join("keep.go");
    fs::create_dir_all(harness.output_dir()).unwrap();
    fs::write(&existing, "package google\n").unwrap();

    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::NoArtifacts));

    let err = assert_err!(
        pipeline(harness.options(), &installer, &resolver, &runner)
            .run(&Context::new())
            .await
    );

    assert_eq!(err.stage, Stage::PublishOutput);
    assert!(matches!(
        err.source,
        GeneratorError::Publish(PublishError::MissingArtifacts(_))
    ));
    assert_eq!(runner.commands(), BUILD_STEPS.to_vec());
    assert!(harness.leftover_dirs().is_empty());
    assert_eq!(fs::read_to_string(&existing).unwrap(), "package google\n");
}

#[tokio::test]
async fn pipeline_stops_when_pins_are_missing() {
    let harness = Harness::new(GOOGLE_CONFIG);
    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(|| {
        Err(ResolutionError::MissingJsiiPacmak)
    }));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::Generate));

    let err = pipeline(harness.options(), &installer, &resolver, &runner)
        .run(&Context::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::ResolveDependencies);
    assert!(err.to_string().contains("jsii-pacmak"));
    assert!(runner.commands().is_empty());
    assert!(harness.leftover_dirs().is_empty());
}

#[tokio::test]
async fn pipeline_rejects_invalid_config_after_toolchain() {
    let harness = Harness::new(
        r#"
provider:
  source: registry.terraform.io/hashicorp/google
module:
  source: terraform-aws-modules/vpc/aws
target:
  language: go
  moduleName: github.com/example/gen
output: gen
"#,
    );
    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::Generate));

    let err = pipeline(harness.options(), &installer, &resolver, &runner)
        .run(&Context::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::LoadConfig);
    assert_eq!(
        err.to_string(),
        "load config: provider and module can't be set at the same time"
    );
    assert!(installer.installed_in.lock().unwrap().is_some());
    assert!(resolver.requested.lock().unwrap().is_empty());
    assert!(harness.leftover_dirs().is_empty());
}

#[tokio::test]
async fn pipeline_reports_missing_config_file() {
    let harness = Harness::new(GOOGLE_CONFIG);
    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::Generate));

    let options = PipelineOptions {
        config_path: harness.work_dir.path().join("missing.yaml"),
        ..harness.options()
    };

    let err = pipeline(options, &installer, &resolver, &runner)
        .run(&Context::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::LoadConfig);
    assert!(matches!(err.source, GeneratorError::Io { .. }));
    assert!(err.to_string().contains("missing.yaml"));
}

#[tokio::test]
async fn pipeline_toolchain_failure_stops_before_config() {
    let harness = Harness::new("not: [valid");
    let installer = Arc::new(FakeInstaller {
        fail: true,
        ..Default::default()
    });
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::Generate));

    let err = pipeline(harness.options(), &installer, &resolver, &runner)
        .run(&Context::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::AcquireToolchain);
    assert!(matches!(
        err.source,
        GeneratorError::Toolchain(ToolchainError::MissingChecksum(_))
    ));
    assert!(harness.leftover_dirs().is_empty());
}

#[tokio::test]
async fn pipeline_passes_requested_cdktf_version() {
    let harness = Harness::new(GOOGLE_CONFIG);
    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::Generate));

    pipeline(
        harness.options().with_cdktf_version("0.17.3"),
        &installer,
        &resolver,
        &runner,
    )
    .run(&Context::new())
    .await
    .unwrap();

    assert_eq!(*resolver.requested.lock().unwrap(), vec!["0.17.3"]);
}

#[tokio::test]
async fn pipeline_cancellation_aborts_running_step() {
    let harness = Harness::new(GOOGLE_CONFIG);
    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::Hang));

    let ctx = Context::new().with_timeout(Duration::from_millis(100));
    let err = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline(harness.options(), &installer, &resolver, &runner).run(&ctx),
    )
    .await
    .expect("pipeline should observe cancellation")
    .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.stage, Stage::RunExternalSteps);
    assert_eq!(runner.commands(), vec!["npm install --no-save"]);
    assert!(harness.leftover_dirs().is_empty());
    assert!(!harness.output_dir().exists());
}

#[tokio::test]
async fn pipeline_does_not_start_when_already_cancelled() {
    let harness = Harness::new(GOOGLE_CONFIG);
    let installer = Arc::new(FakeInstaller::default());
    let resolver = Arc::new(FixtureResolver::new(pinned));
    let runner = Arc::new(RecordingRunner::new(StepBehaviour::Generate));

    let ctx = Context::new();
    ctx.cancel();

    let err = pipeline(harness.options(), &installer, &resolver, &runner)
        .run(&ctx)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.stage, Stage::AcquireToolchain);
    assert!(installer.installed_in.lock().unwrap().is_none());
    assert!(harness.leftover_dirs().is_empty());
}
