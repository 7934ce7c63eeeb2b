mod cli;

use serde::Serialize;
use std::rc::Rc;
use tfadopt::artifacts::{ArtifactSource, StaticArtifacts};
use tfadopt::pipeline::{self, PlannedImport};
use tfadopt::prop::Prop;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFADOPT_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Service(service_cli) => service(service_cli),
        cli::Command::Classify(classify_cli) => classify(classify_cli),
        cli::Command::Rewrite(rewrite_cli) => rewrite(rewrite_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn service(cli: cli::ServiceCommand) -> anyhow::Result<()> {
    let config = config(cli.service_id, &cli.service)?;
    let artifacts = load_artifacts(&cli.service)?;

    let mut terraform = tfadopt::terraform::Terraform::new(cli.terraform, &config.directory);
    let summary = pipeline::import_service(
        &config,
        &mut terraform,
        artifacts.as_ref().map(|a| a as &dyn ArtifactSource),
    )?;

    output(&cli.output, &summary)
}

#[derive(Serialize)]
struct Plan<'a> {
    service: PlannedImport,
    dependents: Vec<PlannedImport>,
    blocks: &'a [Prop],
}

pub fn classify(cli: cli::ClassifyCommand) -> anyhow::Result<()> {
    let config = config(cli.service_id, &cli.service)?;

    let document = match &cli.input_file {
        Some(path) => tfadopt::document::Document::load_file(path)?,
        None => std::io::read_to_string(std::io::stdin())?.parse()?,
    };

    let service = Rc::new(config.service());
    let props = tfadopt::classify::classify(&document, &service)?;
    let plan = Plan {
        service: PlannedImport::service(&service),
        dependents: pipeline::dependent_imports(&props),
        blocks: &props,
    };

    output(&cli.output, &plan)
}

pub fn rewrite(cli: cli::RewriteCommand) -> anyhow::Result<()> {
    let config = config(cli.service_id, &cli.service)?;
    let artifacts = load_artifacts(&cli.service)?;

    let dump = std::fs::read_to_string(&cli.dump)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", cli.dump.display()))?;
    let summary = pipeline::rewrite_existing(
        &config,
        &dump,
        artifacts.as_ref().map(|a| a as &dyn ArtifactSource),
    )?;

    output(&cli.output, &summary)
}

fn config(service_id: String, args: &cli::ServiceArgs) -> anyhow::Result<pipeline::Config> {
    Ok(pipeline::Config {
        service_id,
        version: args.version,
        resource_name: args.resource_name.clone(),
        directory: std::env::current_dir()?,
        manage_all: args.manage_all,
    })
}

fn load_artifacts(args: &cli::ServiceArgs) -> anyhow::Result<Option<StaticArtifacts>> {
    args.artifacts
        .as_deref()
        .map(StaticArtifacts::load_file)
        .transpose()
        .map_err(Into::into)
}

fn output(output: &cli::OutputArgs, value: &impl Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}
