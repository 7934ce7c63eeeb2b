//! terraform state (`terraform.tfstate`) as an opaque json tree
//!
//! The schema belongs to terraform and the provider. We only read scalar leaves and patch a few flags, always through
//! [query] strings which are built from the [template]s. Every query returns a new [StateDocument], the input is left
//! as it was.
pub mod query;
pub mod template;

use crate::prop::ResourceType;
use query::{Query, QueryError};
use serde_json::Value;
use std::path::Path;
use template::{IndexKeyParams, QueryTemplate, SetAttributeParams};

#[derive(Debug, Clone, PartialEq)]
pub struct StateDocument(Value);

impl StateDocument {
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn from_json(raw: &str) -> Result<Self, StateError> {
        Ok(Self(serde_json::from_str(raw)?))
    }

    pub fn load(path: &Path) -> Result<Self, StateError> {
        tracing::info!(path=%path.display(), "loading state");
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Writes the document as pretty json, replacing the file
    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        tracing::info!(path=%path.display(), "writing state");
        let mut raw = serde_json::to_string_pretty(&self.0)?;
        raw.push('\n');
        std::fs::write(path, raw)?;
        Ok(())
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Runs a query that must produce exactly one result
    pub fn query(&self, query: &str) -> Result<StateDocument, StateError> {
        let parsed: Query = query.parse().map_err(|source| StateError::Query {
            query: query.to_string(),
            source,
        })?;

        let mut results = parsed.run(&self.0).map_err(|source| StateError::Query {
            query: query.to_string(),
            source,
        })?;

        match results.len() {
            1 => Ok(Self(results.remove(0))),
            0 => Err(StateError::NotFound(query.to_string())),
            count => Err(StateError::Ambiguous {
                query: query.to_string(),
                count,
            }),
        }
    }

    /// Renders a [QueryTemplate] with `params` and runs it, see [StateDocument::query]
    pub fn query_template<P: serde::Serialize>(
        &self,
        template: &QueryTemplate,
        params: &P,
    ) -> Result<StateDocument, StateError> {
        let query = template.render(params)?;
        self.query(&query)
    }

    /// The value as text: strings as they are, `null` as empty, everything else as json
    pub fn to_text(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self.0 {
            Value::String(s) => s.into_bytes(),
            Value::Null => Vec::new(),
            other => other.to_string().into_bytes(),
        }
    }

    /// Sets `activate = true` on every service and WAF configuration instance
    pub fn set_activate_attr(&self) -> Result<StateDocument, StateError> {
        self.set_flag(
            &[ResourceType::ServiceVcl, ResourceType::WafConfiguration],
            "activate",
        )
    }

    pub fn set_manage_snippets_attr(&self) -> Result<StateDocument, StateError> {
        self.set_flag(&[ResourceType::DynamicSnippetContent], "manage_snippets")
    }

    pub fn set_manage_items_attr(&self) -> Result<StateDocument, StateError> {
        self.set_flag(&[ResourceType::DictionaryItems], "manage_items")
    }

    pub fn set_manage_entries_attr(&self) -> Result<StateDocument, StateError> {
        self.set_flag(&[ResourceType::AclEntries], "manage_entries")
    }

    /// All three `manage_*` flags
    pub fn set_manage_attrs(&self) -> Result<StateDocument, StateError> {
        self.set_manage_snippets_attr()?
            .set_manage_items_attr()?
            .set_manage_entries_attr()
    }

    /// Attaches an `index_key` to the instances of the resource `resource_type.resource_name`
    pub fn set_index_key(
        &self,
        resource_type: ResourceType,
        resource_name: &str,
        index_key: &str,
    ) -> Result<StateDocument, StateError> {
        self.query_template(
            &template::SET_INDEX_KEY,
            &IndexKeyParams::new(resource_type.as_str(), resource_name, index_key),
        )
    }

    fn set_flag(&self, types: &[ResourceType], flag: &str) -> Result<StateDocument, StateError> {
        tracing::debug!(flag, "patching state");
        self.query_template(
            &template::SET_ATTRIBUTE,
            &SetAttributeParams::new(types.iter().map(ResourceType::as_str).collect(), flag, true),
        )
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StateError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("state is not valid json")]
    Json(#[from] serde_json::Error),
    #[error("failed to render query template")]
    Template(#[from] minijinja::Error),
    #[error("query failed: {query}")]
    Query {
        query: String,
        #[source]
        source: QueryError,
    },
    #[error("no result for query: {0}")]
    NotFound(String),
    #[error("{count} results for query: {query}")]
    Ambiguous { query: String, count: usize },
}
