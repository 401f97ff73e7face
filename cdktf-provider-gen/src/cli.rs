use std::path::PathBuf;

use cdktfgen::{PipelineOptions, DEFAULT_CDKTF_VERSION};
use clap::Parser;

use crate::output::Format;

const EXAMPLES: &str = "\
Examples:
  # Generate the google provider
  cdktf-provider-gen --config google.yaml

  # Use a specific version of cdktf
  cdktf-provider-gen --config google.yaml --cdktf-version 0.17.3";

#[derive(Debug, Parser)]
#[command(
    name = "cdktf-provider-gen",
    version,
    about = "Generate CDK for Terraform bindings for a provider or module",
    after_help = EXAMPLES
)]
pub struct Cli {
    /// Request document describing the provider or module
    #[arg(short = 'c', long)]
    pub config: PathBuf,

    /// The target cdktf version to use
    #[arg(long, env = "CDKTF_VERSION", default_value = DEFAULT_CDKTF_VERSION)]
    pub cdktf_version: String,

    /// Retain the intermediate assets, useful for debugging codegen errors
    #[arg(long)]
    pub keep: bool,

    /// Format used to report a failure
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub error_format: Format,
}

impl Cli {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions::new(&self.config)
            .with_cdktf_version(&self.cdktf_version)
            .with_keep(self.keep)
    }
}
