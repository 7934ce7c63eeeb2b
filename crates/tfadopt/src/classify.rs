//! First pass: turn the nested blocks of the imported service into [Prop]s
//!
//! Runs against the dump taken right after the service import. The resulting list drives which dependent resources
//! get imported and is later handed to [crate::rewrite] which relies on it lining up with the nested blocks by
//! position.
use crate::document::{AttributeError, BlockExt, Document};
use crate::prop::{BackendProp, LoggingProp, NamedProp, PlaceholderProp, Prop, ServiceProp, WafProp};
use hcl_edit::expr::Expression;
use hcl_edit::structure::Block;
use std::rc::Rc;

pub fn classify(document: &Document, service: &Rc<ServiceProp>) -> Result<Vec<Prop>, ClassifyError> {
    let blocks: Vec<&Block> = document.blocks().collect();
    let [block] = blocks.as_slice() else {
        return Err(ClassifyError::UnexpectedBlockCount(blocks.len()));
    };

    let expected_type = service.resource_type();
    if block.ident_str() != "resource" || block.label(0) != Some(expected_type.as_str()) {
        return Err(ClassifyError::UnexpectedBlock {
            ident: block.ident_str().to_string(),
            labels: block.labels.iter().map(|label| label.as_str().to_string()).collect(),
        });
    }

    let props = block
        .body
        .blocks()
        .map(|nested| classify_block(nested, service))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(count = props.len(), "nested blocks classified");
    Ok(props)
}

fn classify_block(block: &Block, service: &Rc<ServiceProp>) -> Result<Prop, ClassifyError> {
    let block_type = block.ident_str();

    let named = |id_key: Option<&str>| -> Result<NamedProp, AttributeError> {
        let id = id_key
            .map(|key| block.string_attribute(key).map(str::to_string))
            .transpose()?;
        let name = block.string_attribute("name")?;
        Ok(NamedProp::new(id, name, service))
    };

    let prop = match block_type {
        "acl" => Prop::Acl(named(Some("acl_id"))?),
        "dictionary" => Prop::Dictionary(named(Some("dictionary_id"))?),
        "dynamicsnippet" => Prop::DynamicSnippet(named(Some("snippet_id"))?),
        "snippet" => Prop::Snippet(named(None)?),
        "vcl" => Prop::Vcl(named(None)?),
        "waf" => Prop::Waf(WafProp {
            id: block.string_attribute("waf_id")?.to_string(),
            service: Rc::clone(service),
        }),
        "backend" => Prop::Backend(BackendProp {
            name: block.string_attribute("name")?.to_string(),
            sensitive_values: Default::default(),
            service: Rc::clone(service),
        }),
        logging if logging.starts_with("logging_") => Prop::Logging(LoggingProp {
            name: block.string_attribute("name")?.to_string(),
            endpoint_type: logging.to_string(),
            structured_format: is_json_encoded(block, "format"),
            sensitive_values: Default::default(),
            service: Rc::clone(service),
        }),
        // rewritten by name later on
        "request_setting" | "response_object" => Prop::Placeholder(PlaceholderProp {
            block_type: block_type.to_string(),
            name: Some(block.string_attribute("name")?.to_string()),
        }),
        other => Prop::Placeholder(PlaceholderProp {
            block_type: other.to_string(),
            // a non literal name on a block we do not rewrite is not worth failing over
            name: block
                .optional_string_attribute("name")
                .ok()
                .flatten()
                .map(str::to_string),
        }),
    };

    tracing::trace!(block_type, name = prop.name(), "classified");
    Ok(prop)
}

/// `terraform show` renders json strings as `jsonencode(...)`, an absent attribute is not structured
fn is_json_encoded(block: &Block, key: &str) -> bool {
    block.expression(key).is_some_and(|expression| {
        matches!(expression, Expression::FuncCall(_))
            && expression.to_string().trim_start().starts_with("jsonencode(")
    })
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ClassifyError {
    #[error("expected exactly one service resource block, got {0}")]
    UnexpectedBlockCount(usize),
    #[error("unexpected block `{ident}` with labels {labels:?}")]
    UnexpectedBlock { ident: String, labels: Vec<String> },
    #[error(transparent)]
    Attribute(#[from] AttributeError),
}
