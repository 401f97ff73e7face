mod cli;
mod logging;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use cdktfgen::{Context, Pipeline, PipelineError, Stage};
use clap::Parser;
use tracing::Instrument;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init();

    let resource = logging::Resource::detect();
    let format = cli.error_format;

    match run(cli).instrument(resource.span()).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            let mut stderr = std::io::stderr().lock();
            if let Err(render_err) = output::render(&mut stderr, format, &err) {
                tracing::error!(error = %render_err, "render error output");
                eprintln!("{}", err);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> cdktfgen::Result<PathBuf> {
    let pipeline = Pipeline::with_defaults(cli.pipeline_options())
        .map_err(|e| PipelineError::new(Stage::AcquireToolchain, e))?;

    let ctx = Context::new();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            canceller.cancel();
        }
    });

    pipeline.run(&ctx).await
}
