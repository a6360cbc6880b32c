//! Bind expressions and their evaluation
//!
//! A bind expression is an optional context label prefix followed by a
//! document path: `:{item}/../ID`, `./ID`, `:{attach}/@ref`. Unprefixed
//! expressions evaluate against the `attach` context.

use crate::context::{ContextLabel, ContextStack, DocumentScope};
use crate::error::{BindError, ConfigError};
use std::fmt::{self, Display, Formatter};
use xflow_dom::{Document, DomPath, NodeId};

/// Parsed bind expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindExpr {
    label: ContextLabel,
    path: DomPath,
    source: String,
}

impl BindExpr {
    /// Parse an expression
    ///
    /// # Errors
    /// `ConfigError::InvalidBind` for an unknown label or malformed path
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        let source = expr.trim().to_string();

        let (label, rest) = match source.strip_prefix(":{") {
            Some(after) => {
                let Some(end) = after.find('}') else {
                    return Err(ConfigError::invalid_bind(&source, "unterminated context label"));
                };
                let name = &after[..end];
                let label = ContextLabel::from_name(name).ok_or_else(|| {
                    ConfigError::invalid_bind(&source, format!("unknown context label '{name}'"))
                })?;
                let rest = &after[end + 1..];
                let rest = match rest.strip_prefix('/') {
                    Some(relative) => relative,
                    None if rest.is_empty() => rest,
                    None => {
                        return Err(ConfigError::invalid_bind(
                            &source,
                            "expected '/' after context label",
                        ))
                    }
                };
                (label, rest)
            }
            None => (ContextLabel::Attach, source.as_str()),
        };

        let path: DomPath = rest
            .parse()
            .map_err(|e| ConfigError::invalid_bind(&source, format!("{e}")))?;

        Ok(Self {
            label,
            path,
            source,
        })
    }

    /// Context the expression starts from
    #[inline]
    #[must_use]
    pub fn label(&self) -> ContextLabel {
        self.label
    }

    /// Path evaluated from the context
    #[inline]
    #[must_use]
    pub fn path(&self) -> &DomPath {
        &self.path
    }

    /// Expression as written
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Display for BindExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Named bind of a statement (`<using name=".." path=".."/>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSpec {
    name: String,
    expr: BindExpr,
    required: bool,
}

impl BindSpec {
    /// Create a required bind
    #[must_use]
    pub fn new(name: impl Into<String>, expr: BindExpr) -> Self {
        Self {
            name: name.into(),
            expr,
            required: true,
        }
    }

    /// Parse a required bind from an expression string
    ///
    /// # Errors
    /// `ConfigError::InvalidBind` if the expression does not parse
    pub fn parse(name: impl Into<String>, expr: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(name, BindExpr::parse(expr)?))
    }

    /// Whether an unresolved bind is an error (`true`) or NULL (`false`)
    #[inline]
    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Parse from a `<using>` element
    ///
    /// # Errors
    /// Missing `name`/`path`, a malformed expression or a non-boolean `required`
    pub fn from_element(doc: &Document, node: NodeId) -> Result<Self, ConfigError> {
        let element = doc.name(node);
        let name = doc
            .attribute(node, "name")
            .ok_or_else(|| ConfigError::missing_attribute(element, "name"))?
            .trim_start_matches(':');
        let path = doc
            .attribute(node, "path")
            .ok_or_else(|| ConfigError::missing_attribute(element, "path"))?;
        let required = match doc.attribute(node, "required") {
            None => true,
            Some(value) => parse_bool(value)
                .ok_or_else(|| ConfigError::invalid_attribute(element, "required", value))?,
        };
        Ok(Self::parse(name, path)?.with_required(required))
    }

    /// Bind name as referenced by the statement (`:name`)
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expression the value comes from
    #[inline]
    #[must_use]
    pub fn expr(&self) -> &BindExpr {
        &self.expr
    }

    /// Whether resolution to nothing is an error
    #[inline]
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Resolve the bind against the current context
    ///
    /// # Errors
    /// - `BindError::Unresolved` if a required bind matches nothing
    /// - `BindError::Ambiguous` if more than one node matches
    /// - `BindError::LabelNotSet` if the expression's context is unbound
    pub fn evaluate(&self, ctx: &ContextStack, docs: &dyn DocumentScope) -> Result<ResolvedBind, BindError> {
        let mut values = ctx.values(docs, &self.expr)?;
        let value = match values.len() {
            0 if self.required => {
                return Err(BindError::Unresolved {
                    name: self.name.clone(),
                    expr: self.expr.to_string(),
                })
            }
            0 => None,
            1 => values.pop(),
            count => {
                return Err(BindError::Ambiguous {
                    name: self.name.clone(),
                    expr: self.expr.to_string(),
                    count,
                })
            }
        };
        tracing::trace!(bind = %self.name, expr = %self.expr, ?value, "bind evaluated");
        Ok(ResolvedBind {
            name: self.name.clone(),
            value,
        })
    }
}

/// Bind value captured at evaluation time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedBind {
    /// Bind name
    pub name: String,
    /// Resolved text, `None` for SQL NULL
    pub value: Option<String>,
}

impl ResolvedBind {
    /// Create a resolved bind
    #[must_use]
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload_doc() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new("root");
        let root = doc.root();
        let row = doc.add_element(root, "ROW");
        doc.add_element_with_text(row, "ID", "42");
        let upload = doc.add_element(row, "PHOTO");
        doc.set_attribute(upload, "ref", "file-1");
        (doc, row, upload)
    }

    #[test]
    fn parse_unprefixed_uses_attach() {
        let expr = BindExpr::parse("./ID").unwrap();
        assert_eq!(expr.label(), ContextLabel::Attach);
        assert_eq!(expr.path().to_string(), "./ID");
    }

    #[test]
    fn parse_labelled_expressions() {
        let expr = BindExpr::parse(":{item}/../ID").unwrap();
        assert_eq!(expr.label(), ContextLabel::Item);
        assert_eq!(expr.path().to_string(), "../ID");

        let bare = BindExpr::parse(":{item}").unwrap();
        assert!(bare.path().is_empty());
        assert_eq!(bare.to_string(), ":{item}");
    }

    #[test]
    fn parse_rejects_bad_labels() {
        assert!(matches!(
            BindExpr::parse(":{theme}/x"),
            Err(ConfigError::InvalidBind { .. })
        ));
        assert!(BindExpr::parse(":{item").is_err());
        assert!(BindExpr::parse(":{item}x").is_err());
        assert!(BindExpr::parse("a//b").is_err());
    }

    #[test]
    fn evaluate_required_and_optional() {
        let (doc, row, upload) = upload_doc();
        let mut ctx = ContextStack::with_root(doc.root());
        ctx.set(ContextLabel::Attach, row);
        ctx.set(ContextLabel::Item, upload);

        let id = BindSpec::parse("id", "./ID").unwrap();
        assert_eq!(id.evaluate(&ctx, &doc).unwrap().value.as_deref(), Some("42"));

        let file_ref = BindSpec::parse("ref", ":{item}/@ref").unwrap();
        assert_eq!(
            file_ref.evaluate(&ctx, &doc).unwrap().value.as_deref(),
            Some("file-1")
        );

        let missing = BindSpec::parse("name", "./NAME").unwrap();
        assert!(matches!(
            missing.evaluate(&ctx, &doc),
            Err(BindError::Unresolved { .. })
        ));

        let optional = missing.with_required(false);
        assert_eq!(optional.evaluate(&ctx, &doc).unwrap().value, None);
    }

    #[test]
    fn evaluate_ambiguous() {
        let (mut doc, row, _) = upload_doc();
        doc.add_element_with_text(row, "ID", "43");
        let mut ctx = ContextStack::with_root(doc.root());
        ctx.set(ContextLabel::Attach, row);

        let id = BindSpec::parse("id", "ID").unwrap();
        assert!(matches!(
            id.evaluate(&ctx, &doc),
            Err(BindError::Ambiguous { count: 2, .. })
        ));
    }

    #[test]
    fn from_element_reads_attributes() {
        let doc = Document::parse_str(r#"<using name=":id" path="./ID" required="false"/>"#).unwrap();
        let spec = BindSpec::from_element(&doc, doc.root()).unwrap();
        assert_eq!(spec.name(), "id");
        assert!(!spec.is_required());

        let bad = Document::parse_str(r#"<using name="id" path="./ID" required="maybe"/>"#).unwrap();
        assert!(matches!(
            BindSpec::from_element(&bad, bad.root()),
            Err(ConfigError::InvalidAttribute { .. })
        ));

        let unnamed = Document::parse_str(r#"<using path="./ID"/>"#).unwrap();
        assert!(matches!(
            BindSpec::from_element(&unnamed, unnamed.root()),
            Err(ConfigError::MissingAttribute { .. })
        ));
    }
}
