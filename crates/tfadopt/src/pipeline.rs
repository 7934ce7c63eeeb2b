//! End-to-end migration of one service
//!
//! Strictly sequential, every step consumes what the previous one produced:
//!
//! 1. `terraform init` in an empty working directory
//! 2. import the service and dump it
//! 3. [classify] the dump, import every dependent resource it names
//! 4. dump again, [Rewriter::rewrite] the dump into `main.tf`
//! 5. patch the state so the next `terraform plan` is clean
//!
//! Any failure aborts the run. There is nothing to resume from: remove the working directory and start over.
use crate::artifacts::{fetch_artifacts, ArtifactSource, FetchError};
use crate::classify::{classify, ClassifyError};
use crate::document::{BlockExt, Document, LoadError};
use crate::prop::{Prop, ResourceType, ServiceProp};
use crate::rewrite::{RewriteError, RewriteOptions, Rewriter};
use crate::state::{StateDocument, StateError};
use crate::terraform::{is_empty_dir, Toolchain, ToolchainError, STATE_FILE};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// File the rewritten configuration is written to
pub const CONFIG_FILE: &str = "main.tf";

#[derive(Debug, Clone)]
pub struct Config {
    pub service_id: String,
    /// Service version to import, the active version when absent
    pub version: Option<u32>,
    /// Terraform resource name of the service
    pub resource_name: String,
    pub directory: PathBuf,
    pub manage_all: bool,
}

impl Config {
    pub fn service(&self) -> ServiceProp {
        ServiceProp::new(
            self.service_id.clone(),
            self.resource_name.clone(),
            self.version,
        )
    }

    fn rewrite_options(&self) -> RewriteOptions {
        RewriteOptions {
            directory: self.directory.clone(),
            manage_all: self.manage_all,
        }
    }
}

/// What a run produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    /// `type.name` of every imported resource, service first
    pub imported: Vec<String>,
    /// Nested blocks of the service, in document order
    pub blocks: Vec<Prop>,
    pub config_file: PathBuf,
    pub state_file: PathBuf,
}

/// A resource `terraform import` is run for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedImport {
    pub resource_type: ResourceType,
    pub resource_name: String,
    pub import_id: String,
}

impl PlannedImport {
    pub fn service(service: &ServiceProp) -> Self {
        Self {
            resource_type: service.resource_type(),
            resource_name: service.normalized_name(),
            import_id: service.import_id(),
        }
    }

    /// `type.name` address of the resource
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.resource_name)
    }
}

/// Separate resources named by the service's nested blocks, in block order
pub fn dependent_imports(props: &[Prop]) -> Vec<PlannedImport> {
    props
        .iter()
        .filter_map(|prop| {
            Some(PlannedImport {
                resource_type: prop.resource_type()?,
                resource_name: prop.normalized_name()?,
                import_id: prop.import_id()?,
            })
        })
        .collect()
}

pub fn check_dir_empty(directory: &Path) -> Result<(), PipelineError> {
    let empty = is_empty_dir(directory).map_err(|source| PipelineError::Io {
        path: directory.to_path_buf(),
        source,
    })?;

    if empty {
        Ok(())
    } else {
        Err(PipelineError::DirectoryNotEmpty(directory.to_path_buf()))
    }
}

/// Imports the service and everything hanging off it, then writes configuration and state
pub fn import_service(
    config: &Config,
    toolchain: &mut dyn Toolchain,
    artifacts: Option<&dyn ArtifactSource>,
) -> Result<Summary, PipelineError> {
    check_dir_empty(&config.directory)?;
    toolchain.init()?;

    let service = Rc::new(config.service());
    let root = PlannedImport::service(&service);
    toolchain.import(root.resource_type, &root.resource_name, &root.import_id)?;
    let mut imported = vec![root.address()];

    let dump = toolchain.show()?;
    let props = classify(&Document::parse(&dump)?, &service)?;
    tracing::info!(blocks = props.len(), "service classified");

    for planned in dependent_imports(&props) {
        toolchain.import(planned.resource_type, &planned.resource_name, &planned.import_id)?;
        imported.push(planned.address());
    }
    toolchain.finish()?;

    let dump = toolchain.show()?;
    let mut summary = finish(config, &service, props, &dump, artifacts)?;
    summary.imported = imported;
    Ok(summary)
}

/// Classifies, rewrites and patches an existing dump and state without running terraform
///
/// The dump may hold dependent resources next to the service, only the service block is classified.
pub fn rewrite_existing(
    config: &Config,
    dump: &str,
    artifacts: Option<&dyn ArtifactSource>,
) -> Result<Summary, PipelineError> {
    let service = Rc::new(config.service());
    let document = Document::parse(dump)?;

    let service_type = service.resource_type();
    let service_only = document.filtered(|block| {
        block.ident_str() == "resource" && block.label(0) == Some(service_type.as_str())
    });
    let props = classify(&service_only, &service)?;

    finish(config, &service, props, dump, artifacts)
}

fn finish(
    config: &Config,
    service: &ServiceProp,
    mut props: Vec<Prop>,
    dump: &str,
    artifacts: Option<&dyn ArtifactSource>,
) -> Result<Summary, PipelineError> {
    if let Some(source) = artifacts {
        fetch_artifacts(&mut props, service, source)?;
    }

    let state_file = config.directory.join(STATE_FILE);
    let state = StateDocument::load(&state_file)?;

    let options = config.rewrite_options();
    let mut rewriter = Rewriter::new(service, &props, &state, &options);
    if let Some(source) = artifacts {
        rewriter = rewriter.with_artifacts(source);
    }
    let rewritten = rewriter.rewrite(Document::parse(dump)?)?;

    let config_file = config.directory.join(CONFIG_FILE);
    tracing::info!(path=%config_file.display(), "writing configuration");
    std::fs::write(&config_file, rewritten).map_err(|source| PipelineError::Io {
        path: config_file.clone(),
        source,
    })?;

    let mut state = state.set_activate_attr()?;
    if config.manage_all {
        state = state.set_manage_attrs()?;
    }
    state.save(&state_file)?;

    Ok(Summary {
        imported: Vec::new(),
        blocks: props,
        config_file,
        state_file,
    })
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("working directory {} is not empty", .0.display())]
    DirectoryNotEmpty(PathBuf),
    #[error("IO error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("terraform failed")]
    Toolchain(#[from] ToolchainError),
    #[error("failed to parse configuration dump")]
    Load(#[from] LoadError),
    #[error("failed to classify the service")]
    Classify(#[from] ClassifyError),
    #[error("failed to fetch artifacts")]
    Fetch(#[from] FetchError),
    #[error("failed to rewrite configuration")]
    Rewrite(#[from] RewriteError),
    #[error("failed to patch state")]
    State(#[from] StateError),
}
