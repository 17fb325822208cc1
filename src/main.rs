use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use validate_manifests::cli::Cli;
use validate_manifests::discovery::Discovery;
use validate_manifests::output;
use validate_manifests::pipeline;
use validate_manifests::registry::{self, RegistrySet};
use validate_manifests::validator::Validator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let input = cli.input()?;
    let discovery = Discovery::with_ignore_patterns(&cli.ignore_filename_patterns)?;

    let registry_opts = cli.registry_options();
    let mut registries = Vec::new();
    for location in cli.effective_schema_locations() {
        let registry = registry::from_location(&location, &registry_opts)
            .with_context(|| format!("building schema registry for '{}'", location))?;
        registries.push(registry);
    }
    let validator = Validator::new(RegistrySet::new(registries), cli.validator_options());

    let color = atty::is(atty::Stream::Stdout);
    let sink = output::create(
        &cli.output,
        Box::new(std::io::stdout()),
        color,
        cli.verbose,
        cli.summary,
    )?;

    let success = pipeline::run(
        input,
        discovery,
        validator,
        sink,
        cli.pipeline_options(),
        CancellationToken::new(),
    )
    .await?;

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
