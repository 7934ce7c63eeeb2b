//! The terraform side: importing resources into the state and dumping it as configuration
//!
//! [Toolchain] is what the pipeline needs from terraform. [Terraform] implements it by running the `terraform` binary
//! in the working directory.
use crate::prop::ResourceType;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const PROVIDER_FILE: &str = "provider.tf";
/// Empty resource blocks `terraform import` needs as import targets
pub const STUB_FILE: &str = "imports.tf";
pub const STATE_FILE: &str = "terraform.tfstate";

const REQUIRED_PROVIDER: &str = r#"terraform {
  required_providers {
    fastly = {
      source  = "fastly/fastly"
      version = ">= 2.0.0"
    }
  }
}
"#;

pub trait Toolchain {
    /// Prepares the working directory and installs the provider
    fn init(&mut self) -> Result<(), ToolchainError>;

    /// Imports a remote object into the state as `resource_type.resource_name`
    fn import(
        &mut self,
        resource_type: ResourceType,
        resource_name: &str,
        import_id: &str,
    ) -> Result<(), ToolchainError>;

    /// Current state rendered as configuration
    fn show(&mut self) -> Result<String, ToolchainError>;

    /// Removes whatever [Toolchain::init] and [Toolchain::import] left behind that is not part of the result
    fn finish(&mut self) -> Result<(), ToolchainError>;
}

#[derive(Debug, Clone)]
pub struct Terraform {
    binary: PathBuf,
    directory: PathBuf,
}

impl Terraform {
    pub fn new(binary: impl Into<PathBuf>, directory: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            directory: directory.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, ToolchainError> {
        let command = format!("{} {}", self.binary.display(), args.join(" "));
        tracing::debug!(command = command.as_str(), "running terraform");

        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.directory)
            .env("TF_IN_AUTOMATION", "1")
            .output()
            .map_err(|source| ToolchainError::Spawn {
                program: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ToolchainError::Failed {
                command,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| ToolchainError::NonUtf8Output(command))
    }

    fn write(&self, file: &str, contents: &str, append: bool) -> Result<(), ToolchainError> {
        let path = self.directory.join(file);
        let io_error = |source| ToolchainError::Io {
            path: path.clone(),
            source,
        };

        let mut handle = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .map_err(io_error)?;
        handle.write_all(contents.as_bytes()).map_err(io_error)
    }
}

impl Toolchain for Terraform {
    fn init(&mut self) -> Result<(), ToolchainError> {
        tracing::info!(directory=%self.directory.display(), "initializing terraform");
        self.write(PROVIDER_FILE, REQUIRED_PROVIDER, false)?;
        self.write(STUB_FILE, "", false)?;
        self.run(&["init", "-upgrade", "-input=false", "-no-color"])?;
        Ok(())
    }

    fn import(
        &mut self,
        resource_type: ResourceType,
        resource_name: &str,
        import_id: &str,
    ) -> Result<(), ToolchainError> {
        tracing::info!(%resource_type, resource_name, import_id, "importing");
        self.write(STUB_FILE, &stub_block(resource_type, resource_name), true)?;

        let address = format!("{resource_type}.{resource_name}");
        self.run(&["import", "-input=false", "-no-color", &address, import_id])?;
        Ok(())
    }

    fn show(&mut self) -> Result<String, ToolchainError> {
        self.run(&["show", "-no-color", STATE_FILE])
    }

    fn finish(&mut self) -> Result<(), ToolchainError> {
        let path = self.directory.join(STUB_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ToolchainError::Io { path, source }),
        }
    }
}

fn stub_block(resource_type: ResourceType, resource_name: &str) -> String {
    format!("resource \"{resource_type}\" \"{resource_name}\" {{}}\n")
}

/// Whether `path` is an empty directory
pub fn is_empty_dir(path: &Path) -> std::io::Result<bool> {
    Ok(std::fs::read_dir(path)?.next().is_none())
}

#[derive(thiserror::Error, Debug)]
pub enum ToolchainError {
    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to run {}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed: {stderr}")]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("`{0}` printed invalid utf-8")]
    NonUtf8Output(String),
}
