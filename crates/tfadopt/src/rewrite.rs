//! Second pass: turn the re-dumped configuration into something that can be applied again
//!
//! Works on all top-level resources produced by the imports: the service itself plus one block per dependent
//! resource. Per resource type it
//! - removes attributes the provider computes (ids, version markers)
//! - points dependent resources at the service with references instead of literal ids
//! - moves inline content into files, see [crate::externalize]
//! - fills in attributes `terraform show` cannot print (secrets, defaults)
//!
//! The nested blocks of the service are matched to the [Prop]s from [crate::classify] by position. Both lists come
//! from independent parses of the same resource, so every position is checked against the block type recorded by
//! classification and any mismatch aborts the rewrite.
//!
//! Running the rewrite on its own output produces the same output again.
use crate::artifacts::{artifact_key, ArtifactSource, FetchError};
use crate::document::{AttributeError, BlockExt, BlockMut, Document};
use crate::externalize::{ContentFile, ExternalizeError};
use crate::prop::{Prop, ResourceType, ServiceProp, UnknownResourceType};
use crate::secrets::{logging_sensitive_fields, BACKEND_SENSITIVE_FIELDS};
use crate::state::template::{ResourceAttributeParams, ServiceAttributeParams};
use crate::state::{template, StateDocument, StateError};
use hcl::expr::{ForExpr, Traversal, TraversalOperator, Variable};
use hcl::Identifier;
use hcl_edit::expr::Expression;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    /// Base directory for externalized content
    pub directory: PathBuf,
    /// Let terraform manage the entries of ACLs, dictionaries and dynamic snippets
    pub manage_all: bool,
}

#[derive(derive_new::new)]
pub struct Rewriter<'a> {
    service: &'a ServiceProp,
    props: &'a [Prop],
    state: &'a StateDocument,
    options: &'a RewriteOptions,
    #[new(default)]
    artifacts: Option<&'a dyn ArtifactSource>,
}

impl<'a> Rewriter<'a> {
    /// Falls back to `source` for content and secrets the state holds no value for
    pub fn with_artifacts(mut self, source: &'a dyn ArtifactSource) -> Self {
        self.artifacts = Some(source);
        self
    }

    pub fn rewrite(&self, mut document: Document) -> Result<String, RewriteError> {
        for mut block in document.blocks_mut() {
            if block.ident_str() != "resource" {
                return Err(RewriteError::UnexpectedBlockType(
                    block.ident_str().to_string(),
                ));
            }

            let (Some(resource_type), Some(resource_name)) = (block.label(0), block.label(1))
            else {
                return Err(RewriteError::MissingLabels);
            };
            let resource_type: ResourceType = resource_type.parse()?;
            let resource_name = resource_name.to_string();

            tracing::debug!(
                %resource_type,
                resource_name = resource_name.as_str(),
                "rewriting resource"
            );
            match resource_type {
                ResourceType::ServiceVcl => self.rewrite_service(&mut block)?,
                ResourceType::WafConfiguration => self.rewrite_waf(&mut block)?,
                ResourceType::AclEntries
                | ResourceType::DictionaryItems
                | ResourceType::DynamicSnippetContent => {
                    self.rewrite_dependent(&mut block, resource_type, &resource_name)?
                }
            }
        }

        Ok(document.to_string())
    }

    fn rewrite_service(&self, block: &mut BlockMut) -> Result<(), RewriteError> {
        for key in ["id", "active_version", "cloned_version"] {
            block.remove_attribute(key);
        }

        // the provider defaults to "Managed by Terraform" otherwise
        if block.optional_string_attribute("comment")?.is_none() {
            block.set_value("comment", "");
        }

        let mut index = 0;
        for mut nested in block.blocks_mut() {
            let found = nested.ident_str();
            let prop = self
                .props
                .get(index)
                .ok_or_else(|| RewriteError::Misaligned {
                    index,
                    expected: "nothing".to_string(),
                    found: found.to_string(),
                })?;
            if prop.block_type() != found {
                return Err(RewriteError::Misaligned {
                    index,
                    expected: prop.block_type().to_string(),
                    found: found.to_string(),
                });
            }

            self.rewrite_nested(&mut nested, prop)?;
            index += 1;
        }

        if let Some(prop) = self.props.get(index) {
            return Err(RewriteError::Misaligned {
                index,
                expected: prop.block_type().to_string(),
                found: "nothing".to_string(),
            });
        }

        Ok(())
    }

    fn rewrite_nested(&self, nested: &mut BlockMut, prop: &Prop) -> Result<(), RewriteError> {
        match prop {
            Prop::Acl(_) => {
                nested.remove_attribute("acl_id");
            }
            Prop::Dictionary(_) => {
                nested.remove_attribute("dictionary_id");
            }
            Prop::Waf(_) => {
                nested.remove_attribute("waf_id");
            }
            Prop::DynamicSnippet(_) => {
                nested.remove_attribute("snippet_id");
            }
            Prop::Snippet(_) => {
                let name = nested.string_attribute("name")?.to_string();
                let content = self.nested_content(prop, "snippet", &name, "content")?;
                self.externalize(nested, "content", &ContentFile::snippet(&name), &content)?;
            }
            Prop::Vcl(_) => {
                let name = nested.string_attribute("name")?.to_string();
                let content = self.nested_content(prop, "vcl", &name, "content")?;
                self.externalize(nested, "content", &ContentFile::vcl(&name), &content)?;
            }
            Prop::Backend(backend) => {
                let name = nested.string_attribute("name")?.to_string();
                for field in BACKEND_SENSITIVE_FIELDS {
                    let value = self.secret(prop, "backend", &name, field)?;
                    if !value.is_empty() {
                        nested.set_value(field, value);
                    }
                }
                tracing::trace!(backend = backend.name.as_str(), "backend secrets filled");
            }
            Prop::Logging(logging) => {
                let name = nested.string_attribute("name")?.to_string();
                let endpoint_type = logging.endpoint_type.as_str();

                let format = self.nested_content(prop, endpoint_type, &name, "format")?;
                let file = ContentFile::log_format(&name, &format);
                if logging.structured_format != file.filename.ends_with(".json") {
                    tracing::debug!(
                        name = name.as_str(),
                        "log format structure differs from the configuration dump"
                    );
                }
                self.externalize(nested, "format", &file, &format)?;

                for field in logging_sensitive_fields(endpoint_type) {
                    let value = self.secret(prop, endpoint_type, &name, field)?;
                    nested.set_value(field, value);
                }
            }
            Prop::Placeholder(placeholder) => match placeholder.block_type.as_str() {
                "request_setting" => {
                    let name = nested.string_attribute("name")?.to_string();
                    let xff = self.service_attribute("request_setting", &name, "xff")?;
                    // the provider defaults to "append"
                    if xff.to_text().is_empty() {
                        nested.set_value("xff", "");
                    }
                }
                "response_object" => {
                    let name = nested.string_attribute("name")?.to_string();
                    let content = self
                        .service_attribute("response_object", &name, "content")?
                        .into_bytes();
                    let file = ContentFile::response_object(&name);
                    self.externalize(nested, "content", &file, &content)?;
                }
                _ => {}
            },
        }
        Ok(())
    }

    fn rewrite_waf(&self, block: &mut BlockMut) -> Result<(), RewriteError> {
        for key in ["active", "cloned_version", "number", "id"] {
            block.remove_attribute(key);
        }

        // one waf per service, so the first (and only) nested waf block
        let waf_id = Traversal::new(
            Variable::unchecked(self.service.resource_type().as_str()),
            [
                TraversalOperator::GetAttr(Identifier::unchecked(self.service.normalized_name())),
                TraversalOperator::GetAttr(Identifier::unchecked("waf")),
                TraversalOperator::Index(hcl::Expression::Number(hcl::Number::from(0u64))),
                TraversalOperator::GetAttr(Identifier::unchecked("waf_id")),
            ],
        );
        block.set_expression("waf_id", to_edit_expression(&waf_id.into())?);
        Ok(())
    }

    fn rewrite_dependent(
        &self,
        block: &mut BlockMut,
        resource_type: ResourceType,
        resource_name: &str,
    ) -> Result<(), RewriteError> {
        let (id_key, collection, manage_key) = match resource_type {
            ResourceType::AclEntries => ("acl_id", "acl", "manage_entries"),
            ResourceType::DictionaryItems => ("dictionary_id", "dictionary", "manage_items"),
            _ => ("snippet_id", "dynamicsnippet", "manage_snippets"),
        };

        block.remove_attribute("id");

        if self.options.manage_all {
            block.set_value(manage_key, true);
        }

        let service_id = self.service_traversal([]).attr("id").build();
        block.set_expression("service_id", to_edit_expression(&service_id.into())?);

        let prop = self.props.iter().find(|prop| {
            prop.resource_type() == Some(resource_type)
                && prop.normalized_name().as_deref() == Some(resource_name)
        });

        match prop.and_then(Prop::name) {
            Some(name) => {
                let lookup = id_lookup(self.service_traversal([collection]).build(), id_key, name);
                block.set_expression(id_key, to_edit_expression(&lookup)?);
            }
            None => tracing::warn!(
                %resource_type,
                resource_name,
                "no block found for resource, keeping `{id_key}` as it is"
            ),
        }

        match resource_type {
            ResourceType::AclEntries => {
                let mut unexpected = None;
                for mut entry in block.blocks_mut() {
                    if entry.ident_str() != "entry" {
                        unexpected = Some(entry.ident_str().to_string());
                        break;
                    }
                    entry.remove_attribute("id");
                }
                if let Some(ident) = unexpected {
                    return Err(RewriteError::UnexpectedNestedBlock {
                        resource: resource_type.to_string(),
                        ident,
                    });
                }
            }
            ResourceType::DynamicSnippetContent => {
                let state = self.state.query_template(
                    &template::RESOURCE_ATTRIBUTE,
                    &ResourceAttributeParams::new(resource_type.as_str(), resource_name, "content"),
                )?;
                let mut content = state.into_bytes();
                if content.is_empty() {
                    if let Some(prop) = prop {
                        let fetched = self.artifact(prop)?.and_then(|artifact| artifact.content);
                        content = fetched.unwrap_or_default().into_bytes();
                    }
                }

                let file = ContentFile::dynamic_snippet(resource_name);
                self.externalize(block, "content", &file, &content)?;
            }
            _ => {}
        }

        Ok(())
    }

    /// `fastly_service_vcl.<name>` followed by `attributes`
    fn service_traversal<const N: usize>(&self, attributes: [&str; N]) -> hcl::expr::TraversalBuilder {
        let mut builder = Traversal::builder(Variable::unchecked(self.service.resource_type().as_str()))
            .attr(Identifier::unchecked(self.service.normalized_name()));
        for attribute in attributes {
            builder = builder.attr(Identifier::unchecked(attribute));
        }
        builder
    }

    fn service_attribute(
        &self,
        attribute_type: &str,
        name: &str,
        field: &str,
    ) -> Result<StateDocument, StateError> {
        let resource_name = self.service.normalized_name();
        self.state.query_template(
            &template::SERVICE_ATTRIBUTE,
            &ServiceAttributeParams::new(
                self.service.resource_type().as_str(),
                &resource_name,
                attribute_type,
                name,
                field,
            ),
        )
    }

    /// Content from the state or, if empty there, from the artifact source
    fn nested_content(
        &self,
        prop: &Prop,
        attribute_type: &str,
        name: &str,
        field: &str,
    ) -> Result<Vec<u8>, RewriteError> {
        let content = self.service_attribute(attribute_type, name, field)?.into_bytes();
        if !content.is_empty() {
            return Ok(content);
        }

        let fetched = self.artifact(prop)?.and_then(|artifact| artifact.content);
        Ok(fetched.unwrap_or_default().into_bytes())
    }

    /// Secret from the state or, if empty there, from the prop
    fn secret(
        &self,
        prop: &Prop,
        attribute_type: &str,
        name: &str,
        field: &str,
    ) -> Result<String, RewriteError> {
        let value = self.service_attribute(attribute_type, name, field)?.to_text();
        if !value.is_empty() {
            return Ok(value);
        }

        Ok(prop
            .sensitive_values()
            .and_then(|values| values.get(field))
            .cloned()
            .unwrap_or_default())
    }

    fn artifact(&self, prop: &Prop) -> Result<Option<crate::artifacts::Artifact>, FetchError> {
        let (Some(source), Some(key)) = (self.artifacts, artifact_key(prop, self.service)) else {
            return Ok(None);
        };
        source.fetch(&key)
    }

    fn externalize(
        &self,
        block: &mut BlockMut,
        key: &str,
        file: &ContentFile,
        content: &[u8],
    ) -> Result<(), RewriteError> {
        file.save(&self.options.directory, content)?;

        let path = hcl::format::to_string(&hcl::Expression::from(file.reference()))?;
        let call = format!("file({path})");
        block.set_expression(key, parse_expression(&call)?);
        Ok(())
    }
}

/// `{ for x in <collection> : x.name => x.<id_key> }["<name>"]`
fn id_lookup(collection: Traversal, id_key: &str, name: &str) -> hcl::Expression {
    let member = |attribute: &str| -> hcl::Expression {
        Traversal::builder(Variable::unchecked("x"))
            .attr(Identifier::unchecked(attribute))
            .build()
            .into()
    };

    let by_name = ForExpr::new(
        Identifier::unchecked("x"),
        hcl::Expression::from(collection),
        member(id_key),
    )
    .with_key_expr(member("name"));

    Traversal::new(
        hcl::Expression::from(by_name),
        [TraversalOperator::Index(hcl::Expression::from(name))],
    )
    .into()
}

fn to_edit_expression(expression: &hcl::Expression) -> Result<Expression, RewriteError> {
    let rendered = hcl::format::to_string(expression)?;
    parse_expression(&rendered)
}

fn parse_expression(raw: &str) -> Result<Expression, RewriteError> {
    raw.parse().map_err(|source| RewriteError::InvalidExpression {
        expression: raw.to_string(),
        source,
    })
}

#[derive(thiserror::Error, Debug)]
pub enum RewriteError {
    #[error("unexpected top-level block `{0}`, expected `resource`")]
    UnexpectedBlockType(String),
    #[error("resource block without type and name labels")]
    MissingLabels,
    #[error(transparent)]
    UnknownResourceType(#[from] UnknownResourceType),
    #[error("unexpected block `{ident}` in `{resource}`")]
    UnexpectedNestedBlock { resource: String, ident: String },
    #[error("nested block {index} is `{found}` but classification recorded `{expected}`")]
    Misaligned {
        index: usize,
        expected: String,
        found: String,
    },
    #[error(transparent)]
    Attribute(#[from] AttributeError),
    #[error("failed to read state")]
    State(#[from] StateError),
    #[error("failed to externalize content")]
    Externalize(#[from] ExternalizeError),
    #[error("failed to fetch artifact")]
    Fetch(#[from] FetchError),
    #[error("failed to format expression")]
    Format(#[from] hcl::Error),
    #[error("generated invalid expression `{expression}`")]
    InvalidExpression {
        expression: String,
        #[source]
        source: hcl_edit::parser::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::artifacts::{Artifact, StaticArtifacts};
    use crate::classify::classify;
    use crate::document;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::rc::Rc;

    const SERVICE_DUMP: &str = r#"
# fastly_service_vcl.service:
resource "fastly_service_vcl" "service" {
  active_version = 3
  cloned_version = 3
  id             = "svc123"
  name           = "demo"

  acl {
    acl_id = "abc"
    name   = "My ACL"
  }
  domain {
    name = "example.com"
  }
  logging_s3 {
    bucket_name   = "logs"
    format        = jsonencode({ "status" : "%>s", "ts" : "%{begin:%Y}t" })
    name          = "s3 logs"
    s3_access_key = (sensitive value)
    s3_secret_key = (sensitive value)
  }
  logging_syslog {
    address = "syslog.example.com"
    format  = "%h %l %{Host}i"
    name    = "syslog"
  }
  snippet {
    content = <<-EOT
      set req.http.X = "1";
    EOT
    name    = "Set X"
    type    = "recv"
  }
}
"#;

    const ACL_DUMP: &str = r#"
# fastly_service_acl_entries.my_acl:
resource "fastly_service_acl_entries" "my_acl" {
  acl_id     = "abc"
  id         = "svc123/abc"
  service_id = "svc123"

  entry {
    id      = "e1"
    ip      = "127.0.0.1"
    negated = false
    subnet  = "32"
  }
}
"#;

    fn state() -> StateDocument {
        StateDocument::from_value(json!({
            "version": 4,
            "resources": [
                {
                    "type": "fastly_service_vcl",
                    "name": "service",
                    "instances": [{
                        "attributes": {
                            "id": "svc123",
                            "acl": [{ "acl_id": "abc", "name": "My ACL" }],
                            "logging_s3": [{
                                "name": "s3 logs",
                                "format": "{\"status\":\"%>s\",\"ts\":\"%{begin:%Y}t\"}",
                                "s3_access_key": "AKIA",
                                "s3_secret_key": ""
                            }],
                            "logging_syslog": [{
                                "name": "syslog",
                                "format": "%h %l %{Host}i",
                                "tls_client_key": ""
                            }],
                            "snippet": [{ "name": "Set X", "content": "set req.http.X = \"1\";\n" }]
                        }
                    }]
                },
                {
                    "type": "fastly_service_acl_entries",
                    "name": "my_acl",
                    "instances": [{ "attributes": { "id": "svc123/abc", "acl_id": "abc" } }]
                }
            ]
        }))
    }

    struct Fixture {
        service: Rc<ServiceProp>,
        props: Vec<Prop>,
        state: StateDocument,
        options: RewriteOptions,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let service = Rc::new(ServiceProp::new("svc123".into(), "service".into(), None));
        let props = classify(&document!(SERVICE_DUMP), &service).unwrap();
        Fixture {
            service,
            props,
            state: state(),
            options: RewriteOptions {
                directory: dir.path().to_path_buf(),
                manage_all: false,
            },
            _dir: dir,
        }
    }

    impl Fixture {
        fn rewriter(&self) -> Rewriter<'_> {
            Rewriter::new(&self.service, &self.props, &self.state, &self.options)
        }

        fn read(&self, path: &str) -> String {
            std::fs::read_to_string(self.options.directory.join(path)).unwrap()
        }
    }

    fn expression_text(block: &hcl_edit::structure::Block, key: &str) -> Option<String> {
        block
            .expression(key)
            .map(|expression| expression.to_string().trim().to_string())
    }

    #[test]
    fn acl_end_to_end() {
        let fixture = fixture();
        let dump = format!("{SERVICE_DUMP}\n{ACL_DUMP}");
        let output = fixture.rewriter().rewrite(document!(&dump)).unwrap();

        let rewritten = document!(&output);
        let blocks: Vec<_> = rewritten.blocks().collect();
        assert_eq!(blocks.len(), 2);

        let service = blocks[0];
        for key in ["id", "active_version", "cloned_version"] {
            assert!(service.expression(key).is_none(), "{key} must be removed");
        }
        assert_eq!(service.string_attribute("comment"), Ok(""));
        let acl = service.body.blocks().next().unwrap();
        assert!(acl.expression("acl_id").is_none());
        assert_eq!(acl.string_attribute("name"), Ok("My ACL"));

        let entries = blocks[1];
        assert!(entries.expression("id").is_none());
        assert_eq!(
            expression_text(entries, "service_id").as_deref(),
            Some("fastly_service_vcl.service.id")
        );
        let acl_id = expression_text(entries, "acl_id").unwrap();
        assert!(acl_id.contains("fastly_service_vcl.service.acl"), "{acl_id}");
        assert!(acl_id.contains("x.acl_id"), "{acl_id}");
        assert!(acl_id.ends_with(r#"["My ACL"]"#), "{acl_id}");
        assert!(entries.expression("manage_entries").is_none());

        let entry = entries.body.blocks().next().unwrap();
        assert!(entry.expression("id").is_none());
        assert_eq!(entry.string_attribute("ip"), Ok("127.0.0.1"));
    }

    #[test]
    fn log_formats_and_secrets() {
        let fixture = fixture();
        let output = fixture.rewriter().rewrite(document!(SERVICE_DUMP)).unwrap();
        let rewritten = document!(&output);
        let service = rewritten.blocks().next().unwrap();
        let nested: Vec<_> = service.body.blocks().collect();

        let s3 = nested[2];
        assert_eq!(
            expression_text(s3, "format").as_deref(),
            Some(r#"file("./logformat/s3_logs.json")"#)
        );
        assert_eq!(s3.string_attribute("s3_access_key"), Ok("AKIA"));
        assert_eq!(s3.string_attribute("s3_secret_key"), Ok(""));
        assert_eq!(
            fixture.read("logformat/s3_logs.json"),
            r#"{"status":"%>s","ts":"%{begin:%Y}t"}"#
        );

        let syslog = nested[3];
        assert_eq!(
            expression_text(syslog, "format").as_deref(),
            Some(r#"file("./logformat/syslog.txt")"#)
        );
        assert_eq!(syslog.string_attribute("tls_client_key"), Ok(""));
        // the escape needed for parsing never reaches the file
        assert_eq!(fixture.read("logformat/syslog.txt"), "%h %l %{Host}i");

        let snippet = nested[4];
        assert_eq!(
            expression_text(snippet, "content").as_deref(),
            Some(r#"file("./vcl/snippet_set_x.vcl")"#)
        );
        assert_eq!(fixture.read("vcl/snippet_set_x.vcl"), "set req.http.X = \"1\";\n");
    }

    #[test]
    fn secrets_fall_back_to_props() {
        let mut fixture = fixture();
        let Prop::Logging(s3) = &mut fixture.props[2] else {
            panic!("expected logging prop")
        };
        s3.sensitive_values
            .insert("s3_secret_key".into(), "from-api".into());

        let output = fixture.rewriter().rewrite(document!(SERVICE_DUMP)).unwrap();
        let rewritten = document!(&output);
        let s3 = rewritten.blocks().next().unwrap().body.blocks().nth(2).unwrap();
        assert_eq!(s3.string_attribute("s3_access_key"), Ok("AKIA"));
        assert_eq!(s3.string_attribute("s3_secret_key"), Ok("from-api"));
    }

    #[test]
    fn content_falls_back_to_artifacts() {
        let mut fixture = fixture();
        fixture.state = StateDocument::from_value(json!({
            "resources": [{
                "type": "fastly_service_vcl",
                "name": "service",
                "instances": [{
                    "attributes": {
                        "logging_s3": [{ "name": "s3 logs", "format": null }],
                        "logging_syslog": [{ "name": "syslog", "format": "%h" }],
                        "snippet": [{ "name": "Set X", "content": "" }]
                    }
                }]
            }]
        }));

        let mut artifacts = StaticArtifacts::default();
        artifacts.insert(
            "snippet",
            "Set X",
            Artifact {
                content: Some("set req.http.X = \"2\";".into()),
                secrets: Default::default(),
            },
        );

        fixture
            .rewriter()
            .with_artifacts(&artifacts)
            .rewrite(document!(SERVICE_DUMP))
            .unwrap();

        assert_eq!(fixture.read("vcl/snippet_set_x.vcl"), "set req.http.X = \"2\";");
        // no content anywhere: empty, and not json
        assert_eq!(fixture.read("logformat/s3_logs.txt"), "");
    }

    #[test]
    fn rewriting_twice_changes_nothing() {
        let fixture = fixture();
        let dump = format!("{SERVICE_DUMP}\n{ACL_DUMP}");

        let once = fixture.rewriter().rewrite(document!(&dump)).unwrap();
        let twice = fixture.rewriter().rewrite(document!(&once)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn manage_all_sets_flags() {
        let mut fixture = fixture();
        fixture.options.manage_all = true;

        let output = fixture.rewriter().rewrite(document!(ACL_DUMP)).unwrap();
        let rewritten = document!(&output);
        let entries = rewritten.blocks().next().unwrap();
        assert_eq!(expression_text(entries, "manage_entries").as_deref(), Some("true"));
    }

    #[test]
    fn vcl_waf_and_backend_from_state() {
        let mut fixture = fixture();
        let dump = r#"
resource "fastly_service_vcl" "service" {
  id   = "svc123"
  name = "demo"

  backend {
    address = "127.0.0.1"
    name    = "origin"
  }
  vcl {
    content = <<-EOT
      sub vcl_recv {}
    EOT
    main    = true
    name    = "Main VCL"
  }
  waf {
    response_object = "WAF_Response"
    waf_id          = "waf1"
  }
}
"#;
        fixture.props = classify(&document!(dump), &fixture.service).unwrap();
        let Prop::Backend(backend) = &mut fixture.props[0] else {
            panic!("expected backend prop")
        };
        backend
            .sensitive_values
            .insert("ssl_client_cert".into(), "from-api".into());
        fixture.state = StateDocument::from_value(json!({
            "resources": [{
                "type": "fastly_service_vcl",
                "name": "service",
                "instances": [{
                    "attributes": {
                        "backend": [{
                            "name": "origin",
                            "ssl_client_cert": "-----BEGIN CERTIFICATE-----",
                            "ssl_client_key": ""
                        }],
                        "vcl": [{ "name": "Main VCL", "content": "sub vcl_recv {}\n", "main": true }],
                        "waf": [{ "response_object": "WAF_Response", "waf_id": "waf1" }]
                    }
                }]
            }]
        }));

        let output = fixture.rewriter().rewrite(document!(dump)).unwrap();
        let rewritten = document!(&output);
        let nested: Vec<_> = rewritten.blocks().next().unwrap().body.blocks().collect();

        // the state wins over the props, empty values stay unset
        assert_eq!(
            nested[0].string_attribute("ssl_client_cert"),
            Ok("-----BEGIN CERTIFICATE-----")
        );
        assert!(nested[0].expression("ssl_client_key").is_none());

        assert_eq!(
            expression_text(nested[1], "content").as_deref(),
            Some(r#"file("./vcl/main_vcl.vcl")"#)
        );
        assert_eq!(expression_text(nested[1], "main").as_deref(), Some("true"));
        assert_eq!(fixture.read("vcl/main_vcl.vcl"), "sub vcl_recv {}\n");

        assert!(nested[2].expression("waf_id").is_none());
        assert_eq!(nested[2].string_attribute("response_object"), Ok("WAF_Response"));
    }

    #[test]
    fn waf_references_service() {
        let fixture = fixture();
        let dump = r#"
resource "fastly_service_waf_configuration" "waf" {
  active         = true
  cloned_version = 2
  id             = "waf1"
  number         = 2
  waf_id         = "waf1"
  http_violation_score_threshold = 5
}
"#;
        let output = fixture.rewriter().rewrite(document!(dump)).unwrap();
        let rewritten = document!(&output);
        let waf = rewritten.blocks().next().unwrap();

        for key in ["active", "cloned_version", "number", "id"] {
            assert!(waf.expression(key).is_none(), "{key} must be removed");
        }
        assert_eq!(
            expression_text(waf, "waf_id").as_deref(),
            Some("fastly_service_vcl.service.waf[0].waf_id")
        );
        assert_eq!(
            expression_text(waf, "http_violation_score_threshold").as_deref(),
            Some("5")
        );
    }

    #[test]
    fn dynamic_snippet_content() {
        let mut fixture = fixture();
        fixture.props = vec![Prop::DynamicSnippet(crate::prop::NamedProp::new(
            Some("ds1".into()),
            "My Dyn",
            &fixture.service,
        ))];
        fixture.state = StateDocument::from_value(json!({
            "resources": [{
                "type": "fastly_service_dynamic_snippet_content",
                "name": "my_dyn",
                "instances": [{ "attributes": { "content": "if (req.http.X) {}" } }]
            }]
        }));

        let dump = r#"
resource "fastly_service_dynamic_snippet_content" "my_dyn" {
  content    = "if (req.http.X) {}"
  id         = "svc123/ds1"
  service_id = "svc123"
  snippet_id = "ds1"
}
"#;
        let output = fixture.rewriter().rewrite(document!(dump)).unwrap();
        let rewritten = document!(&output);
        let snippet = rewritten.blocks().next().unwrap();

        assert_eq!(
            expression_text(snippet, "content").as_deref(),
            Some(r#"file("./vcl/dsnippet_my_dyn.vcl")"#)
        );
        assert!(expression_text(snippet, "snippet_id")
            .unwrap()
            .ends_with(r#"["My Dyn"]"#));
        assert_eq!(fixture.read("vcl/dsnippet_my_dyn.vcl"), "if (req.http.X) {}");
    }

    #[test]
    fn request_setting_and_response_object() {
        let service = Rc::new(ServiceProp::new("svc123".into(), "service".into(), None));
        let dump = r#"
resource "fastly_service_vcl" "service" {
  comment = "keep me"

  request_setting {
    name = "force tls"
  }
  response_object {
    content = "<html>gone</html>"
    name    = "Gone"
    status  = 410
  }
}
"#;
        let props = classify(&document!(dump), &service).unwrap();
        let state = StateDocument::from_value(json!({
            "resources": [{
                "type": "fastly_service_vcl",
                "name": "service",
                "instances": [{
                    "attributes": {
                        "request_setting": [{ "name": "force tls", "xff": "" }],
                        "response_object": [{ "name": "Gone", "content": "<html>gone</html>" }]
                    }
                }]
            }]
        }));
        let dir = tempfile::tempdir().unwrap();
        let options = RewriteOptions {
            directory: dir.path().to_path_buf(),
            manage_all: false,
        };

        let output = Rewriter::new(&service, &props, &state, &options)
            .rewrite(document!(dump))
            .unwrap();
        let rewritten = document!(&output);
        let block = rewritten.blocks().next().unwrap();
        assert_eq!(block.string_attribute("comment"), Ok("keep me"));

        let nested: Vec<_> = block.body.blocks().collect();
        assert_eq!(nested[0].string_attribute("xff"), Ok(""));
        assert_eq!(
            expression_text(nested[1], "content").as_deref(),
            Some(r#"file("./content/gone.txt")"#)
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("content/gone.txt")).unwrap(),
            "<html>gone</html>"
        );
    }

    #[test]
    fn misaligned_props_are_rejected() {
        let mut fixture = fixture();
        fixture.props.swap(0, 1);

        let error = fixture.rewriter().rewrite(document!(SERVICE_DUMP)).unwrap_err();
        assert!(matches!(
            error,
            RewriteError::Misaligned { index: 0, ref expected, ref found } if expected == "domain" && found == "acl"
        ));

        let mut fixture = self::fixture();
        fixture.props.pop();
        let error = fixture.rewriter().rewrite(document!(SERVICE_DUMP)).unwrap_err();
        assert!(matches!(error, RewriteError::Misaligned { index: 4, .. }));
    }

    #[test]
    fn unknown_resources_are_rejected() {
        let fixture = fixture();

        let error = fixture
            .rewriter()
            .rewrite(document!(r#"resource "fastly_service_compute" "x" {}"#))
            .unwrap_err();
        assert!(matches!(error, RewriteError::UnknownResourceType(_)));

        let error = fixture
            .rewriter()
            .rewrite(document!(r#"data "fastly_service_vcl" "x" {}"#))
            .unwrap_err();
        assert!(matches!(error, RewriteError::UnexpectedBlockType(ident) if ident == "data"));
    }

    #[test]
    fn acl_entries_only_contain_entries() {
        let fixture = fixture();
        let dump = r#"
resource "fastly_service_acl_entries" "my_acl" {
  acl_id = "abc"
  other {}
}
"#;
        let error = fixture.rewriter().rewrite(document!(dump)).unwrap_err();
        assert!(matches!(
            error,
            RewriteError::UnexpectedNestedBlock { ref ident, .. } if ident == "other"
        ));
    }
}
