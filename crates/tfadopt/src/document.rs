//! editable hcl document ([Body]) parsed from a `terraform show` dump
//!
//! [Document] wraps a single [hcl_edit] body. Edits go through [BlockMut] so that untouched attributes, blocks and
//! comments keep their original formatting when the document is written back out.
//!
//! The raw dump is escaped with [escape] before parsing, see there for the two hazards that are worked around.
use hcl_edit::expr::Expression;
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use hcl_edit::{Decorate, Ident};
use std::borrow::Cow;
use std::path::Path;

/// Placeholder printed by `terraform show` for values marked as sensitive
pub const SENSITIVE_SENTINEL: &str = "(sensitive value)";

const INDENT: &str = "  ";

#[derive(Debug, Clone)]
pub struct Document {
    body: Body,
}

impl Document {
    /// Escapes and parses a configuration dump
    pub fn parse(raw: &str) -> Result<Self, LoadError> {
        let escaped = escape(raw);
        let body = hcl_edit::parser::parse_body(&escaped)?;
        Ok(Self { body })
    }

    pub fn load_file(file_path: &Path) -> Result<Self, LoadError> {
        tracing::info!(path=%file_path.display(), "loading configuration dump");
        let file_contents = std::fs::read_to_string(file_path)?;
        Self::parse(&file_contents)
    }

    /// Top-level blocks in document order
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.body.blocks()
    }

    /// Top-level blocks in document order, editable
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = BlockMut<'_>> {
        self.body
            .blocks_mut()
            .map(|block| BlockMut::new(block, 1))
    }

    /// A copy holding only the top-level blocks matching `predicate`
    pub fn filtered(&self, predicate: impl Fn(&Block) -> bool) -> Document {
        let mut body = Body::default();
        for block in self.body.blocks().filter(|block| predicate(block)) {
            body.push(block.clone());
        }
        Self { body }
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.body, f)
    }
}

impl std::str::FromStr for Document {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Applies the textual workarounds needed before `terraform show` output can be parsed
///
/// - `%{` starts a template directive in hcl, but log formats use it literally. Every `%{` that is not already
///   escaped becomes `%%{`.
/// - `terraform show` prints `(sensitive value)` unquoted for masked attributes, which is not a valid expression.
///   Those are turned into string literals when they make up the whole value of an attribute.
///
/// Both substitutions are idempotent. Already escaped input is returned unchanged.
pub fn escape(raw: &str) -> Cow<'_, str> {
    let bare_sentinel = format!("= {SENSITIVE_SENTINEL}");
    if !raw.contains("%{") && !raw.contains(&bare_sentinel) {
        return Cow::Borrowed(raw);
    }

    let mut escaped = String::with_capacity(raw.len() + 16);
    let mut previous = None;
    for c in raw.chars() {
        if c == '{' && previous == Some('%') && !escaped.ends_with("%%") {
            escaped.pop();
            escaped.push_str("%%");
        }
        escaped.push(c);
        previous = Some(c);
    }

    // only a whole expression, the sentinel text may also appear inside string literals
    let quoted_sentinel = format!("= \"{SENSITIVE_SENTINEL}\"");
    let mut quoted = String::with_capacity(escaped.len() + 16);
    for line in escaped.split_inclusive('\n') {
        let content = line.trim_end();
        match content.strip_suffix(&bare_sentinel) {
            Some(head) => {
                quoted.push_str(head);
                quoted.push_str(&quoted_sentinel);
                quoted.push_str(&line[content.len()..]);
            }
            None => quoted.push_str(line),
        }
    }
    Cow::Owned(quoted)
}

/// Read access to the parts of a [Block] the classifier and rewriter care about
pub trait BlockExt {
    fn ident_str(&self) -> &str;
    fn label(&self, index: usize) -> Option<&str>;

    /// Value of an attribute that must be a plain string literal
    fn string_attribute(&self, key: &str) -> Result<&str, AttributeError>;

    /// Like [BlockExt::string_attribute] but absent attributes are not an error
    fn optional_string_attribute(&self, key: &str) -> Result<Option<&str>, AttributeError>;

    fn expression(&self, key: &str) -> Option<&Expression>;
}

impl BlockExt for Block {
    fn ident_str(&self) -> &str {
        self.ident.value().as_str()
    }

    fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(|label| label.as_str())
    }

    fn string_attribute(&self, key: &str) -> Result<&str, AttributeError> {
        self.optional_string_attribute(key)?
            .ok_or_else(|| AttributeError::NotFound {
                key: key.to_string(),
                block: self.ident_str().to_string(),
            })
    }

    fn optional_string_attribute(&self, key: &str) -> Result<Option<&str>, AttributeError> {
        let Some(expression) = self.expression(key) else {
            return Ok(None);
        };

        match expression {
            Expression::String(value) => Ok(Some(value.value().as_str())),
            _ => Err(AttributeError::UnsupportedExpressionShape {
                key: key.to_string(),
                block: self.ident_str().to_string(),
            }),
        }
    }

    fn expression(&self, key: &str) -> Option<&Expression> {
        self.body.get_attribute(key).map(|attribute| &attribute.value)
    }
}

/// Mutable view of a block that knows its nesting depth
///
/// The depth is only used to indent attributes that did not exist before.
pub struct BlockMut<'a> {
    block: &'a mut Block,
    depth: usize,
}

impl<'a> BlockMut<'a> {
    fn new(block: &'a mut Block, depth: usize) -> Self {
        Self { block, depth }
    }

    /// Nested blocks in document order
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = BlockMut<'_>> {
        let depth = self.depth + 1;
        self.block
            .body
            .blocks_mut()
            .map(move |block| BlockMut::new(block, depth))
    }

    /// Removes an attribute. Returns whether it was present.
    pub fn remove_attribute(&mut self, key: &str) -> bool {
        let removed = self.block.body.remove_attribute(key).is_some();
        if removed {
            tracing::trace!(block = self.block.ident_str(), key, "attribute removed");
        }
        removed
    }

    /// Sets an attribute to a literal value, e.g. a string or a bool
    pub fn set_value(&mut self, key: &str, value: impl Into<Expression>) {
        self.set_expression(key, value.into())
    }

    /// Sets an attribute to an arbitrary expression such as `file("...")` or `a.b.c`
    ///
    /// An existing attribute keeps its position and surrounding formatting. A new attribute is placed after the
    /// last existing attribute of the block.
    pub fn set_expression(&mut self, key: &str, mut value: Expression) {
        let body = &mut self.block.body;

        let position = body.iter().position(|structure| match structure {
            Structure::Attribute(attribute) => attribute.key.value().as_str() == key,
            Structure::Block(_) => false,
        });

        if let Some(index) = position {
            if let Structure::Attribute(mut attribute) = body.remove(index) {
                *value.decor_mut() = attribute.value.decor().clone();
                attribute.value = value;
                body.insert(index, attribute);
                return;
            }
        }

        value.decor_mut().set_prefix(" ");
        let mut attribute = Attribute::new(Ident::new(key), value);
        attribute.key.decor_mut().set_suffix(" ");
        attribute.decor_mut().set_prefix(INDENT.repeat(self.depth));

        let index = body
            .iter()
            .enumerate()
            .filter(|(_, structure)| matches!(structure, Structure::Attribute(_)))
            .last()
            .map_or(0, |(last, _)| last + 1);
        body.insert(index, attribute);
        tracing::trace!(block = self.block.ident_str(), key, "attribute added");
    }
}

impl std::ops::Deref for BlockMut<'_> {
    type Target = Block;

    fn deref(&self) -> &Self::Target {
        &*self.block
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    #[error("Unable to parse hcl")]
    HclParseFailed(#[from] hcl_edit::parser::Error),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum AttributeError {
    #[error("attribute `{key}` not found in `{block}` block")]
    NotFound { key: String, block: String },
    #[error("attribute `{key}` in `{block}` block is not a plain string literal")]
    UnsupportedExpressionShape { key: String, block: String },
}

/// Utility macro to create a [Document] in tests and examples
///
/// ```
/// # use tfadopt::document;
/// let document = document!(r#"resource "fastly_service_vcl" "service" {}"#);
/// assert_eq!(document.blocks().count(), 1);
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use tfadopt::document;
/// document!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! document {
    { $expr:expr } => {
        $crate::document::Document::parse($expr).expect("document must parse")
    };
}
