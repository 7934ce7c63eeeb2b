//! Descriptors ("props") of the blocks found in an imported service
//!
//! A [Prop] is produced for every nested block of the service resource, in document order. Rewriting later walks the
//! nested blocks of an independently re-parsed dump and matches them to props by position, so the list must contain
//! an entry for every block, see [Prop::Placeholder].
use indexmap::IndexMap;
use serde::Serialize;
use std::rc::Rc;

/// Resource types the migration knows how to import and rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceType {
    #[serde(rename = "fastly_service_vcl")]
    ServiceVcl,
    #[serde(rename = "fastly_service_waf_configuration")]
    WafConfiguration,
    #[serde(rename = "fastly_service_acl_entries")]
    AclEntries,
    #[serde(rename = "fastly_service_dictionary_items")]
    DictionaryItems,
    #[serde(rename = "fastly_service_dynamic_snippet_content")]
    DynamicSnippetContent,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::ServiceVcl,
        ResourceType::WafConfiguration,
        ResourceType::AclEntries,
        ResourceType::DictionaryItems,
        ResourceType::DynamicSnippetContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::ServiceVcl => "fastly_service_vcl",
            ResourceType::WafConfiguration => "fastly_service_waf_configuration",
            ResourceType::AclEntries => "fastly_service_acl_entries",
            ResourceType::DictionaryItems => "fastly_service_dictionary_items",
            ResourceType::DynamicSnippetContent => "fastly_service_dynamic_snippet_content",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|resource_type| resource_type.as_str() == s)
            .ok_or_else(|| UnknownResourceType(s.to_string()))
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("unknown resource type `{0}`")]
pub struct UnknownResourceType(pub String);

/// The service resource everything else hangs off
#[derive(Debug, Clone, PartialEq, Serialize, derive_new::new)]
pub struct ServiceProp {
    pub id: String,
    /// Name used for the terraform resource, normalized by [ServiceProp::normalized_name]
    pub name: String,
    /// Service version to import, the active version when absent
    pub version: Option<u32>,
}

impl ServiceProp {
    pub const DEFAULT_NAME: &'static str = "service";

    pub fn resource_type(&self) -> ResourceType {
        ResourceType::ServiceVcl
    }

    pub fn normalized_name(&self) -> String {
        normalize_or(&self.name, Self::DEFAULT_NAME)
    }

    /// `type.name` address of the resource
    pub fn reference(&self) -> String {
        format!("{}.{}", self.resource_type(), self.normalized_name())
    }

    pub fn import_id(&self) -> String {
        match self.version {
            Some(version) => format!("{}@{}", self.id, version),
            None => self.id.clone(),
        }
    }
}

/// Descriptor for a single nested block of the service resource
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prop {
    Acl(NamedProp),
    Dictionary(NamedProp),
    Waf(WafProp),
    DynamicSnippet(NamedProp),
    Snippet(NamedProp),
    Vcl(NamedProp),
    Backend(BackendProp),
    Logging(LoggingProp),
    /// A block that needs no descriptor of its own, kept to preserve positional alignment
    Placeholder(PlaceholderProp),
}

/// Blocks identified by a (remote id, name) pair
#[derive(Debug, Clone, Serialize)]
pub struct NamedProp {
    /// Remote identifier, `None` for blocks that only have a name (snippets, custom vcl)
    pub id: Option<String>,
    pub name: String,
    #[serde(skip)]
    pub service: Rc<ServiceProp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WafProp {
    pub id: String,
    #[serde(skip)]
    pub service: Rc<ServiceProp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendProp {
    pub name: String,
    /// Client certificate/key values supplied by an artifact source
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub sensitive_values: IndexMap<String, String>,
    #[serde(skip)]
    pub service: Rc<ServiceProp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingProp {
    pub name: String,
    /// Block type, e.g. `logging_s3`
    pub endpoint_type: String,
    /// Whether the log format is structured (json) rather than plain text
    pub structured_format: bool,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub sensitive_values: IndexMap<String, String>,
    #[serde(skip)]
    pub service: Rc<ServiceProp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceholderProp {
    pub block_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl NamedProp {
    pub fn new(id: Option<String>, name: impl Into<String>, service: &Rc<ServiceProp>) -> Self {
        Self {
            id,
            name: name.into(),
            service: Rc::clone(service),
        }
    }
}

impl Prop {
    pub const WAF_NAME: &'static str = "waf";

    /// Type of the nested block this prop was built from
    pub fn block_type(&self) -> &str {
        match self {
            Prop::Acl(_) => "acl",
            Prop::Dictionary(_) => "dictionary",
            Prop::Waf(_) => "waf",
            Prop::DynamicSnippet(_) => "dynamicsnippet",
            Prop::Snippet(_) => "snippet",
            Prop::Vcl(_) => "vcl",
            Prop::Backend(_) => "backend",
            Prop::Logging(logging) => &logging.endpoint_type,
            Prop::Placeholder(placeholder) => &placeholder.block_type,
        }
    }

    /// Human readable name as found in the configuration
    pub fn name(&self) -> Option<&str> {
        match self {
            Prop::Acl(named)
            | Prop::Dictionary(named)
            | Prop::DynamicSnippet(named)
            | Prop::Snippet(named)
            | Prop::Vcl(named) => Some(&named.name),
            Prop::Waf(_) => Some(Self::WAF_NAME),
            Prop::Backend(backend) => Some(&backend.name),
            Prop::Logging(logging) => Some(&logging.name),
            Prop::Placeholder(placeholder) => placeholder.name.as_deref(),
        }
    }

    pub fn normalized_name(&self) -> Option<String> {
        self.name()
            .map(|name| normalize_or(name, self.block_type()))
    }

    /// Remote identifier, if the block carries one
    pub fn id(&self) -> Option<&str> {
        match self {
            Prop::Acl(named) | Prop::Dictionary(named) | Prop::DynamicSnippet(named) => {
                named.id.as_deref()
            }
            Prop::Waf(waf) => Some(&waf.id),
            _ => None,
        }
    }

    pub fn service(&self) -> Option<&ServiceProp> {
        match self {
            Prop::Acl(named)
            | Prop::Dictionary(named)
            | Prop::DynamicSnippet(named)
            | Prop::Snippet(named)
            | Prop::Vcl(named) => Some(&named.service),
            Prop::Waf(waf) => Some(&waf.service),
            Prop::Backend(backend) => Some(&backend.service),
            Prop::Logging(logging) => Some(&logging.service),
            Prop::Placeholder(_) => None,
        }
    }

    /// Resource type for props that are imported as separate resources
    pub fn resource_type(&self) -> Option<ResourceType> {
        match self {
            Prop::Acl(_) => Some(ResourceType::AclEntries),
            Prop::Dictionary(_) => Some(ResourceType::DictionaryItems),
            Prop::Waf(_) => Some(ResourceType::WafConfiguration),
            Prop::DynamicSnippet(_) => Some(ResourceType::DynamicSnippetContent),
            _ => None,
        }
    }

    /// `type.name` address of the separate resource
    pub fn reference(&self) -> Option<String> {
        let resource_type = self.resource_type()?;
        let name = self.normalized_name()?;
        Some(format!("{resource_type}.{name}"))
    }

    /// Identifier passed to `terraform import`
    pub fn import_id(&self) -> Option<String> {
        let service = self.service()?;
        match self {
            Prop::Acl(_) | Prop::Dictionary(_) | Prop::DynamicSnippet(_) => {
                Some(format!("{}/{}", service.id, self.id()?))
            }
            Prop::Waf(waf) => Some(waf.id.clone()),
            _ => None,
        }
    }

    /// Secrets supplied out of band for this block
    pub fn sensitive_values(&self) -> Option<&IndexMap<String, String>> {
        match self {
            Prop::Backend(backend) => Some(&backend.sensitive_values),
            Prop::Logging(logging) => Some(&logging.sensitive_values),
            _ => None,
        }
    }

    pub fn sensitive_values_mut(&mut self) -> Option<&mut IndexMap<String, String>> {
        match self {
            Prop::Backend(backend) => Some(&mut backend.sensitive_values),
            Prop::Logging(logging) => Some(&mut logging.sensitive_values),
            _ => None,
        }
    }
}

/// Lower-cases a name and replaces whitespace and punctuation with `_`
///
/// `-` and `_` are kept since both are valid in resource names.
pub fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_whitespace() || (c.is_ascii_punctuation() && c != '-' && c != '_') {
                '_'
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

/// [normalize]s a name, falling back to `fallback` if the result is not a valid resource name
pub fn normalize_or(name: &str, fallback: &str) -> String {
    let normalized = normalize(name);
    if is_valid_resource_name(&normalized) {
        normalized
    } else {
        tracing::debug!(name, fallback, "name is not a valid resource name, using fallback");
        fallback.to_string()
    }
}

/// Terraform resource names start with a letter or `_` and continue with letters, digits, `_` or `-`
pub fn is_valid_resource_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && hcl::Identifier::new(name).is_ok()
}
