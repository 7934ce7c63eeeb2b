//! tfadopt cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; tfadopt ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import a service into terraform
    ///
    /// Runs in the work directory, which must be empty. Writes main.tf, the
    /// externalized scripts and log formats, and terraform.tfstate.
    #[command(alias = "import")]
    Service(ServiceCommand),

    /// Print the resources that would be imported for a service dump
    ///
    /// Reads the output of `terraform show` from stdin unless --input-file is given
    Classify(ClassifyCommand),

    /// Rewrite an existing dump and state without running terraform
    Rewrite(RewriteCommand),
}

#[derive(Parser, Debug)]
pub struct ServiceCommand {
    /// Id of the service to import
    pub service_id: String,

    #[clap(flatten)]
    pub service: ServiceArgs,

    /// Terraform binary to run
    #[clap(long = "terraform", default_value = "terraform")]
    pub terraform: PathBuf,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct ClassifyCommand {
    /// Id of the service the dump belongs to
    pub service_id: String,

    #[clap(flatten)]
    pub service: ServiceArgs,

    /// Read the dump from a file
    #[clap(short = 'f', long = "input-file")]
    pub input_file: Option<PathBuf>,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct RewriteCommand {
    /// Id of the service the dump belongs to
    pub service_id: String,

    #[clap(flatten)]
    pub service: ServiceArgs,

    /// Output of `terraform show` to rewrite
    #[clap(short = 'f', long = "dump")]
    pub dump: PathBuf,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct ServiceArgs {
    /// Service version to import, the active version when absent
    #[clap(long = "service-version")]
    pub version: Option<u32>,

    /// Terraform resource name of the service
    #[clap(long = "resource-name", default_value = tfadopt::prop::ServiceProp::DEFAULT_NAME)]
    pub resource_name: String,

    /// Let terraform manage ACL entries, dictionary items and dynamic snippet content
    #[clap(long = "manage-all")]
    pub manage_all: bool,

    /// Yaml file with snippet contents, log formats and secrets
    #[clap(long = "artifacts")]
    pub artifacts: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
