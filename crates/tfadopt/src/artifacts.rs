//! Out of band source for content and secrets that the state does not hold
//!
//! `terraform show` never prints sensitive attributes and some provider versions leave them empty in the state as
//! well. An [ArtifactSource] is asked for those per block, keyed by service, version, block name and block type.
//! [StaticArtifacts] is the file backed implementation used by the command line.
use crate::prop::{Prop, ServiceProp};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArtifactKey<'a> {
    pub service_id: &'a str,
    pub version: Option<u32>,
    /// Name of the block as found in the configuration
    pub name: &'a str,
    /// Block type, e.g. `snippet` or `logging_s3`
    pub kind: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Script body or log format
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub secrets: IndexMap<String, String>,
}

pub trait ArtifactSource {
    /// `Ok(None)` when the source knows nothing about the block
    fn fetch(&self, key: &ArtifactKey) -> Result<Option<Artifact>, FetchError>;
}

/// Artifacts listed in a yaml (or json) file
///
/// ```yaml
/// - kind: logging_s3
///   name: s3 logs
///   content: '{"status": "%>s"}'
///   secrets:
///     s3_access_key: AKIA...
///     s3_secret_key: ...
/// - kind: backend
///   name: origin
///   service_id: 1a2b3c # optional, matches any service when absent
///   secrets:
///     ssl_client_key: ...
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticArtifacts {
    entries: Vec<ArtifactEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ArtifactEntry {
    kind: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    #[serde(flatten)]
    artifact: Artifact,
}

impl StaticArtifacts {
    pub fn load_file(path: &Path) -> Result<Self, FetchError> {
        tracing::info!(path=%path.display(), "loading artifacts");
        let raw = std::fs::read_to_string(path).map_err(|source| FetchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    pub fn insert(&mut self, kind: &str, name: &str, artifact: Artifact) {
        self.entries.push(ArtifactEntry {
            kind: kind.to_string(),
            name: name.to_string(),
            service_id: None,
            version: None,
            artifact,
        });
    }
}

impl ArtifactSource for StaticArtifacts {
    fn fetch(&self, key: &ArtifactKey) -> Result<Option<Artifact>, FetchError> {
        let found = self.entries.iter().find(|entry| {
            entry.kind == key.kind
                && entry.name == key.name
                && entry.service_id.as_deref().map_or(true, |id| id == key.service_id)
                && entry.version.map_or(true, |version| Some(version) == key.version)
        });
        Ok(found.map(|entry| entry.artifact.clone()))
    }
}

/// Key to look up a block, `None` for blocks that carry neither content nor secrets
pub fn artifact_key<'a>(prop: &'a Prop, service: &'a ServiceProp) -> Option<ArtifactKey<'a>> {
    match prop {
        Prop::Snippet(_)
        | Prop::Vcl(_)
        | Prop::DynamicSnippet(_)
        | Prop::Backend(_)
        | Prop::Logging(_) => Some(ArtifactKey {
            service_id: &service.id,
            version: service.version,
            name: prop.name()?,
            kind: prop.block_type(),
        }),
        _ => None,
    }
}

/// Asks `source` about every block and stores the returned secrets in the props
///
/// A returned log format also decides whether the endpoint's format is structured. Returns the number of blocks the
/// source had artifacts for.
pub fn fetch_artifacts(
    props: &mut [Prop],
    service: &ServiceProp,
    source: &dyn ArtifactSource,
) -> Result<usize, FetchError> {
    let mut found = 0;

    for prop in props.iter_mut() {
        let Some(key) = artifact_key(prop, service) else {
            continue;
        };
        let Some(artifact) = source.fetch(&key)? else {
            tracing::debug!(kind = key.kind, name = key.name, "no artifact");
            continue;
        };
        found += 1;

        if let (Prop::Logging(logging), Some(format)) = (&mut *prop, &artifact.content) {
            logging.structured_format =
                serde_json::from_str::<serde_json::Value>(format).is_ok();
        }

        if !artifact.secrets.is_empty() {
            match prop.sensitive_values_mut() {
                Some(values) => values.extend(artifact.secrets),
                None => tracing::warn!(
                    kind = prop.block_type(),
                    "ignoring secrets for a block without sensitive attributes"
                ),
            }
        }
    }

    tracing::info!(found, "artifacts fetched");
    Ok(found)
}

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid artifacts file")]
    Parse(#[from] serde_yaml::Error),
}
