//! Parameterized state queries
//!
//! Names coming from the service configuration end up inside query string literals. They are always rendered through
//! the `tojson` filter so that quotes and backslashes in a name cannot change the shape of the query.
use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, Value};
use serde::Serialize;

#[derive(Debug, Clone, Copy)]
pub struct QueryTemplate {
    pub name: &'static str,
    pub source: &'static str,
}

/// A field of one entry of a nested block list on a resource, e.g. the content of a snippet
pub const SERVICE_ATTRIBUTE: QueryTemplate = QueryTemplate {
    name: "service_attribute",
    source: concat!(
        ".resources[] | select(.type == {{ resource_type|tojson }} and .name == {{ resource_name|tojson }})",
        " | .instances[].attributes.{{ attribute_type }}[]",
        " | select(.name == {{ name|tojson }}) | .{{ field }}"
    ),
};

/// A top-level attribute of a resource, e.g. the content of a dynamic snippet
pub const RESOURCE_ATTRIBUTE: QueryTemplate = QueryTemplate {
    name: "resource_attribute",
    source: concat!(
        ".resources[] | select(.type == {{ resource_type|tojson }} and .name == {{ resource_name|tojson }})",
        " | .instances[].attributes.{{ field }}"
    ),
};

/// Sets the `index_key` of every instance of a resource
pub const SET_INDEX_KEY: QueryTemplate = QueryTemplate {
    name: "set_index_key",
    source: concat!(
        "(.resources[] | select(.type == {{ resource_type|tojson }} and .name == {{ resource_name|tojson }})",
        " | .instances[]) += {\"index_key\": {{ index_key|tojson }}}"
    ),
};

/// Sets an attribute on every instance of the given resource types
pub const SET_ATTRIBUTE: QueryTemplate = QueryTemplate {
    name: "set_attribute",
    source: concat!(
        "(.resources[] | select(",
        "{% for resource_type in resource_types %}{% if not loop.first %} or {% endif %}",
        ".type == {{ resource_type|tojson }}{% endfor %})",
        " | .instances[].attributes.{{ attribute }}) |= {{ value|tojson }}"
    ),
};

#[derive(Debug, Clone, Serialize, derive_new::new)]
pub struct ServiceAttributeParams<'a> {
    pub resource_type: &'a str,
    pub resource_name: &'a str,
    /// Nested block type, e.g. `snippet`
    pub attribute_type: &'a str,
    /// Value of the `name` field identifying the entry
    pub name: &'a str,
    /// Field to read, e.g. `content`
    pub field: &'a str,
}

#[derive(Debug, Clone, Serialize, derive_new::new)]
pub struct ResourceAttributeParams<'a> {
    pub resource_type: &'a str,
    pub resource_name: &'a str,
    pub field: &'a str,
}

#[derive(Debug, Clone, Serialize, derive_new::new)]
pub struct IndexKeyParams<'a> {
    pub resource_type: &'a str,
    pub resource_name: &'a str,
    pub index_key: &'a str,
}

#[derive(Debug, Clone, Serialize, derive_new::new)]
pub struct SetAttributeParams<'a> {
    pub resource_types: Vec<&'a str>,
    pub attribute: &'a str,
    pub value: bool,
}

impl QueryTemplate {
    pub fn render<P: Serialize>(&self, params: &P) -> Result<String, Error> {
        let rendered = environment().render_str(self.source, params)?;
        tracing::trace!(template = self.name, query = %rendered, "query rendered");
        Ok(rendered)
    }
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_filter("tojson", tojson);
    env
}

fn tojson(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value = serde_json::to_value(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    serde_json::to_string(&json_value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::query::Query;

    #[test]
    fn renders_service_attribute() {
        let query = SERVICE_ATTRIBUTE
            .render(&ServiceAttributeParams::new(
                "fastly_service_vcl",
                "service",
                "snippet",
                "Set \"X\" header",
                "content",
            ))
            .unwrap();

        insta::assert_snapshot!(query, @r###".resources[] | select(.type == "fastly_service_vcl" and .name == "service") | .instances[].attributes.snippet[] | select(.name == "Set \"X\" header") | .content"###);
        assert!(query.parse::<Query>().is_ok());
    }

    #[test]
    fn renders_index_key_update() {
        let query = SET_INDEX_KEY
            .render(&IndexKeyParams::new(
                "fastly_service_acl_entries",
                "my_acl",
                "My ACL",
            ))
            .unwrap();

        insta::assert_snapshot!(query, @r###"(.resources[] | select(.type == "fastly_service_acl_entries" and .name == "my_acl") | .instances[]) += {"index_key": "My ACL"}"###);
        assert!(matches!(query.parse::<Query>(), Ok(Query::Update { .. })));
    }

    #[test]
    fn renders_attribute_update_for_several_types() {
        let query = SET_ATTRIBUTE
            .render(&SetAttributeParams::new(
                vec!["fastly_service_vcl", "fastly_service_waf_configuration"],
                "activate",
                true,
            ))
            .unwrap();

        insta::assert_snapshot!(query, @r###"(.resources[] | select(.type == "fastly_service_vcl" or .type == "fastly_service_waf_configuration") | .instances[].attributes.activate) |= true"###);
        assert!(matches!(query.parse::<Query>(), Ok(Query::Update { .. })));
    }

    #[test]
    fn missing_parameter_is_an_error() {
        #[derive(Serialize)]
        struct Partial {
            resource_type: &'static str,
        }

        assert!(RESOURCE_ATTRIBUTE
            .render(&Partial {
                resource_type: "fastly_service_vcl"
            })
            .is_err());
    }
}
