//! A small jq subset for reading and patching state documents
//!
//! Supported: `.a.b`, `.a[]`, `.a[0]`, `|`, `select(.x == "y" and .z == 1 or ...)`, and the update forms
//! `(pipeline) |= literal` and `(pipeline) += literal`.
//!
//! Queries are evaluated on paths rather than values: every filter maps a set of locations in the document to a new
//! set of locations. Reading resolves the final locations, updating writes to them. This keeps both forms on the same
//! evaluator.
use pest::iterators::Pair;
use pest::Parser as _;
use pest_derive::Parser;
use serde_json::{Map, Value};

#[derive(Parser)]
#[grammar = "state/query.pest"]
struct QueryParser;

#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Read(Pipeline),
    Update {
        target: Pipeline,
        op: UpdateOp,
        value: Value,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateOp {
    /// `|=`, replace
    Assign,
    /// `+=`, add/merge
    Add,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline(Vec<Filter>);

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Path(Vec<Step>),
    /// disjunction of conjunctions
    Select(Vec<Vec<Comparison>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Field(String),
    Iterate,
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    path: Vec<Step>,
    expected: Value,
}

/// Position of a value inside the document
#[derive(Debug, Clone, PartialEq)]
enum Key {
    Field(String),
    Index(usize),
}

type Location = Vec<Key>;

impl std::str::FromStr for Query {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let query = QueryParser::parse(Rule::query, s)?
            .next()
            .ok_or(QueryError::UnexpectedRule(Rule::query))?;

        let Some(body) = query.into_inner().next() else {
            return Err(QueryError::UnexpectedRule(Rule::query));
        };

        match body.as_rule() {
            Rule::pipeline => Ok(Query::Read(parse_pipeline(body)?)),
            Rule::update => {
                let mut inner = body.into_inner();
                let target = parse_pipeline(next(&mut inner, Rule::update)?)?;
                let op = match next(&mut inner, Rule::update)?.as_str() {
                    "|=" => UpdateOp::Assign,
                    _ => UpdateOp::Add,
                };
                let value = parse_literal(next(&mut inner, Rule::update)?)?;
                Ok(Query::Update { target, op, value })
            }
            rule => Err(QueryError::UnexpectedRule(rule)),
        }
    }
}

fn next<'i>(
    pairs: &mut pest::iterators::Pairs<'i, Rule>,
    parent: Rule,
) -> Result<Pair<'i, Rule>, QueryError> {
    pairs.next().ok_or(QueryError::UnexpectedRule(parent))
}

fn parse_pipeline(pair: Pair<Rule>) -> Result<Pipeline, QueryError> {
    pair.into_inner()
        .map(|filter| match filter.as_rule() {
            Rule::path => Ok(Filter::Path(parse_path(filter)?)),
            Rule::select => {
                let condition = filter
                    .into_inner()
                    .next()
                    .ok_or(QueryError::UnexpectedRule(Rule::select))?;
                let disjunction = condition
                    .into_inner()
                    .map(|conjunction| {
                        conjunction
                            .into_inner()
                            .map(parse_comparison)
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Filter::Select(disjunction))
            }
            rule => Err(QueryError::UnexpectedRule(rule)),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Pipeline)
}

fn parse_comparison(pair: Pair<Rule>) -> Result<Comparison, QueryError> {
    let mut inner = pair.into_inner();
    let path = parse_path(next(&mut inner, Rule::comparison)?)?;
    let expected = parse_literal(next(&mut inner, Rule::comparison)?)?;
    Ok(Comparison { path, expected })
}

fn parse_path(pair: Pair<Rule>) -> Result<Vec<Step>, QueryError> {
    pair.into_inner()
        .map(|step| match step.as_rule() {
            Rule::field => Ok(Step::Field(step.as_str().to_string())),
            Rule::iterate => Ok(Step::Iterate),
            Rule::index => step
                .as_str()
                .trim_matches(|c| c == '[' || c == ']')
                .parse()
                .map(Step::Index)
                .map_err(|_| QueryError::InvalidLiteral(step.as_str().to_string())),
            rule => Err(QueryError::UnexpectedRule(rule)),
        })
        .collect()
}

fn parse_literal(pair: Pair<Rule>) -> Result<Value, QueryError> {
    match pair.as_rule() {
        Rule::string | Rule::number => serde_json::from_str(pair.as_str())
            .map_err(|_| QueryError::InvalidLiteral(pair.as_str().to_string())),
        Rule::boolean => Ok(Value::Bool(pair.as_str() == "true")),
        Rule::null => Ok(Value::Null),
        Rule::object => {
            let mut object = Map::new();
            for entry in pair.into_inner() {
                let mut inner = entry.into_inner();
                let key = next(&mut inner, Rule::entry)?;
                let key = match key.as_rule() {
                    Rule::string => serde_json::from_str(key.as_str())
                        .map_err(|_| QueryError::InvalidLiteral(key.as_str().to_string()))?,
                    _ => key.as_str().to_string(),
                };
                let value = parse_literal(next(&mut inner, Rule::entry)?)?;
                object.insert(key, value);
            }
            Ok(Value::Object(object))
        }
        rule => Err(QueryError::UnexpectedRule(rule)),
    }
}

impl Query {
    /// Runs the query, returning every output value
    ///
    /// Reads produce one value per matched location. Updates produce the modified document as their only output.
    pub fn run(&self, root: &Value) -> Result<Vec<Value>, QueryError> {
        match self {
            Query::Read(pipeline) => {
                let locations = pipeline.locate(root)?;
                Ok(locations
                    .iter()
                    .map(|location| resolve(root, location).cloned().unwrap_or(Value::Null))
                    .collect())
            }
            Query::Update { target, op, value } => {
                let locations = target.locate(root)?;
                tracing::trace!(count = locations.len(), "update targets located");

                let mut updated = root.clone();
                for location in &locations {
                    let slot = resolve_mut(&mut updated, location)?;
                    *slot = match op {
                        UpdateOp::Assign => value.clone(),
                        UpdateOp::Add => add(slot, value)?,
                    };
                }
                Ok(vec![updated])
            }
        }
    }
}

impl Pipeline {
    fn locate(&self, root: &Value) -> Result<Vec<Location>, QueryError> {
        let mut current = vec![Location::new()];

        for filter in &self.0 {
            let mut next = Vec::new();
            for location in current {
                let value = resolve(root, &location);
                match filter {
                    Filter::Path(steps) => expand(value, location, steps, &mut next)?,
                    Filter::Select(disjunction) => {
                        if matches(value, disjunction)? {
                            next.push(location);
                        }
                    }
                }
            }
            current = next;
        }

        Ok(current)
    }
}

fn matches(value: Option<&Value>, disjunction: &[Vec<Comparison>]) -> Result<bool, QueryError> {
    for conjunction in disjunction {
        let mut all = true;
        for comparison in conjunction {
            if !comparison.holds(value)? {
                all = false;
                break;
            }
        }
        if all {
            return Ok(true);
        }
    }
    Ok(false)
}

impl Comparison {
    fn holds(&self, value: Option<&Value>) -> Result<bool, QueryError> {
        let mut locations = Vec::new();
        expand(value, Location::new(), &self.path, &mut locations)?;

        Ok(locations.iter().any(|location| {
            let found = value.and_then(|value| resolve(value, location));
            found.unwrap_or(&Value::Null) == &self.expected
        }))
    }
}

/// Applies path steps to the value at `location`, appending every resulting location to `out`
fn expand(
    value: Option<&Value>,
    location: Location,
    steps: &[Step],
    out: &mut Vec<Location>,
) -> Result<(), QueryError> {
    let Some((step, rest)) = steps.split_first() else {
        out.push(location);
        return Ok(());
    };

    let mut descend = |key: Key, child: Option<&Value>| {
        let mut location = location.clone();
        location.push(key);
        expand(child, location, rest, out)
    };

    match (step, value) {
        (Step::Field(name), Some(Value::Object(object))) => {
            descend(Key::Field(name.clone()), object.get(name))
        }
        (Step::Field(name), None | Some(Value::Null)) => descend(Key::Field(name.clone()), None),
        (Step::Index(index), Some(Value::Array(array))) => {
            descend(Key::Index(*index), array.get(*index))
        }
        (Step::Index(index), None | Some(Value::Null)) => descend(Key::Index(*index), None),
        (Step::Iterate, Some(Value::Array(array))) => {
            for (index, child) in array.iter().enumerate() {
                descend(Key::Index(index), Some(child))?;
            }
            Ok(())
        }
        (Step::Iterate, Some(Value::Object(object))) => {
            for (key, child) in object {
                descend(Key::Field(key.clone()), Some(child))?;
            }
            Ok(())
        }
        // iterating nothing yields nothing
        (Step::Iterate, None | Some(Value::Null)) => Ok(()),
        (step, Some(value)) => Err(QueryError::Type {
            step: format!("{step:?}"),
            found: type_name(value),
        }),
    }
}

fn resolve<'v>(root: &'v Value, location: &[Key]) -> Option<&'v Value> {
    location.iter().try_fold(root, |value, key| match (key, value) {
        (Key::Field(name), Value::Object(object)) => object.get(name),
        (Key::Index(index), Value::Array(array)) => array.get(*index),
        _ => None,
    })
}

/// Walks to `location`, creating missing object fields on the way
fn resolve_mut<'v>(root: &'v mut Value, location: &[Key]) -> Result<&'v mut Value, QueryError> {
    let mut value = root;
    for key in location {
        if value.is_null() {
            *value = match key {
                Key::Field(_) => Value::Object(Map::new()),
                Key::Index(_) => Value::Array(Vec::new()),
            };
        }

        value = match (key, value) {
            (Key::Field(name), Value::Object(object)) => {
                object.entry(name.clone()).or_insert(Value::Null)
            }
            (Key::Index(index), Value::Array(array)) => {
                if array.len() <= *index {
                    array.resize(*index + 1, Value::Null);
                }
                &mut array[*index]
            }
            (key, value) => {
                return Err(QueryError::Type {
                    step: format!("{key:?}"),
                    found: type_name(value),
                })
            }
        };
    }
    Ok(value)
}

/// jq's `+`
fn add(left: &Value, right: &Value) -> Result<Value, QueryError> {
    Ok(match (left, right) {
        (Value::Null, right) => right.clone(),
        (left, Value::Null) => left.clone(),
        (Value::Object(left), Value::Object(right)) => {
            let mut merged = left.clone();
            merged.extend(right.iter().map(|(k, v)| (k.clone(), v.clone())));
            Value::Object(merged)
        }
        (Value::Array(left), Value::Array(right)) => {
            Value::Array(left.iter().chain(right).cloned().collect())
        }
        (Value::String(left), Value::String(right)) => Value::String(format!("{left}{right}")),
        (Value::Number(left), Value::Number(right)) => {
            match (left.as_i64(), right.as_i64()) {
                (Some(l), Some(r)) if l.checked_add(r).is_some() => Value::from(l + r),
                _ => Value::from(left.as_f64().unwrap_or_default() + right.as_f64().unwrap_or_default()),
            }
        }
        (left, right) => {
            return Err(QueryError::Type {
                step: format!("{} + {}", type_name(left), type_name(right)),
                found: type_name(left),
            })
        }
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("invalid query syntax")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),
    #[error("unexpected element in query: {0:?}")]
    UnexpectedRule(Rule),
    #[error("invalid literal `{0}`")]
    InvalidLiteral(String),
    #[error("cannot apply {step} to {found}")]
    Type { step: String, found: &'static str },
}

impl From<pest::error::Error<Rule>> for QueryError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        QueryError::Syntax(Box::new(e))
    }
}
