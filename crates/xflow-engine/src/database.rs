//! Statement definitions and the database connection seam
//!
//! Statement text is scanned once at load time for `:name` placeholders so a
//! missing `using` bind fails the module load rather than the first request.
//! Execution is delegated to a [`DatabaseConnection`].

use crate::bind::{BindSpec, ResolvedBind};
use crate::error::{ConfigError, DatabaseError};
use crate::lob::{LobKind, LobValue};
use indexmap::IndexMap;
use std::fmt::{self, Display, Formatter};
use xflow_dom::{Document, NodeId};

/// Placeholder reserved for the LOB being written
pub const LOB_PLACEHOLDER: &str = "lob";

/// Role a statement plays within a storage location
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatementType {
    /// Selects the LOB
    Query,
    /// Creates the row the LOB lives in
    Insert,
    /// Writes the LOB into an existing row
    Update,
    /// API call reading or writing the LOB
    Api,
}

impl StatementType {
    /// Every statement type
    pub const ALL: [StatementType; 4] = [Self::Query, Self::Insert, Self::Update, Self::Api];

    /// Element name in storage location definitions
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Api => "api",
        }
    }

    /// Statements whose binds are evaluated for read-only access
    #[inline]
    #[must_use]
    pub const fn is_select_oriented(self) -> bool {
        matches!(self, Self::Query | Self::Api)
    }
}

impl Display for StatementType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statement text with its placeholders extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    sql: String,
    purpose: String,
    placeholders: Vec<String>,
}

impl ParsedStatement {
    /// Scan statement text
    ///
    /// # Errors
    /// `ConfigError::EmptyStatement` if the text is blank
    pub fn parse(sql: &str, purpose: impl Into<String>) -> Result<Self, ConfigError> {
        let purpose = purpose.into();
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(ConfigError::EmptyStatement { purpose });
        }
        Ok(Self {
            placeholders: scan_placeholders(sql),
            sql: sql.to_string(),
            purpose,
        })
    }

    /// Statement text
    #[inline]
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Description used in errors and logs (`photo/update`)
    #[inline]
    #[must_use]
    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    /// Distinct placeholder names in order of first use
    #[inline]
    #[must_use]
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Whether the statement carries the LOB placeholder
    #[must_use]
    pub fn uses_lob(&self) -> bool {
        self.placeholders
            .iter()
            .any(|p| p.eq_ignore_ascii_case(LOB_PLACEHOLDER))
    }
}

fn scan_placeholders(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut found: Vec<String> = Vec::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            ':' => {
                let start = i + 1;
                let mut end = start;
                if chars.get(start).is_some_and(|n| n.is_alphabetic() || *n == '_') {
                    while chars
                        .get(end)
                        .is_some_and(|n| n.is_alphanumeric() || matches!(n, '_' | '$' | '#'))
                    {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    if !found.iter().any(|f| f.eq_ignore_ascii_case(&name)) {
                        found.push(name);
                    }
                    i = end;
                    continue;
                }
                // `:=` and `::` fall through here
                if chars.get(start).is_some_and(|n| matches!(n, '=' | ':')) {
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    found
}

/// Statement plus the binds that feed it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStatement {
    statement_type: StatementType,
    parsed: ParsedStatement,
    binds: Vec<BindSpec>,
}

impl DatabaseStatement {
    /// Build a statement, checking every placeholder has a bind
    ///
    /// # Errors
    /// `ConfigError::UnboundPlaceholder` for a placeholder with no bind
    pub fn new(
        statement_type: StatementType,
        parsed: ParsedStatement,
        binds: Vec<BindSpec>,
    ) -> Result<Self, ConfigError> {
        for placeholder in parsed.placeholders() {
            if placeholder.eq_ignore_ascii_case(LOB_PLACEHOLDER) {
                continue;
            }
            if !binds.iter().any(|b| b.name().eq_ignore_ascii_case(placeholder)) {
                return Err(ConfigError::UnboundPlaceholder {
                    purpose: parsed.purpose().to_string(),
                    placeholder: placeholder.clone(),
                });
            }
        }
        Ok(Self {
            statement_type,
            parsed,
            binds,
        })
    }

    /// Parse from a statement element
    ///
    /// `query` elements hold their text in `<select>`, the others in
    /// `<statement>`; binds come from `<using>` children either way.
    ///
    /// # Errors
    /// Missing or blank statement text, malformed binds or unbound placeholders
    pub fn from_element(
        doc: &Document,
        node: NodeId,
        statement_type: StatementType,
        location: &str,
    ) -> Result<Self, ConfigError> {
        let text_element = match statement_type {
            StatementType::Query => "select",
            StatementType::Insert | StatementType::Update | StatementType::Api => "statement",
        };
        let purpose = format!("{location}/{statement_type}");
        let sql = doc
            .children_local(node, text_element)
            .next()
            .map(|n| doc.text(n).to_string())
            .unwrap_or_default();
        let parsed = ParsedStatement::parse(&sql, purpose)?;

        let binds = doc
            .children_local(node, "using")
            .map(|u| BindSpec::from_element(doc, u))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(statement_type, parsed, binds)
    }

    /// Statement role
    #[inline]
    #[must_use]
    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    /// Parsed text
    #[inline]
    #[must_use]
    pub fn parsed(&self) -> &ParsedStatement {
        &self.parsed
    }

    /// Bind definitions
    #[inline]
    #[must_use]
    pub fn binds(&self) -> &[BindSpec] {
        &self.binds
    }
}

/// Single result row, column name to value
pub type Row = IndexMap<String, Option<String>>;

/// Database access used by storage locations and the system document
///
/// Implementations own timeouts and retries; every call blocks until done.
pub trait DatabaseConnection {
    /// Name of the connected database
    ///
    /// # Errors
    /// `DatabaseError::Unavailable` if the connection cannot be used
    fn database_name(&mut self) -> Result<String, DatabaseError>;

    /// Run a statement expected to return exactly one row
    ///
    /// # Errors
    /// `DatabaseError::NoRow` when nothing comes back, or any execution failure
    fn query_single_row(
        &mut self,
        statement: &ParsedStatement,
        binds: &[ResolvedBind],
    ) -> Result<Row, DatabaseError>;

    /// Select a LOB of the given kind, `None` when no row matches
    ///
    /// # Errors
    /// Any execution failure
    fn select_lob(
        &mut self,
        statement: &ParsedStatement,
        binds: &[ResolvedBind],
        kind: LobKind,
    ) -> Result<Option<LobValue>, DatabaseError>;

    /// Execute a DML or API statement, returning rows affected
    ///
    /// # Errors
    /// Any execution failure
    fn execute(
        &mut self,
        statement: &ParsedStatement,
        binds: &[ResolvedBind],
        lob: Option<&LobValue>,
    ) -> Result<u64, DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_finds_placeholders_once() {
        let parsed =
            ParsedStatement::parse("UPDATE t SET b = :lob WHERE id = :id AND x = :id", "t/update")
                .unwrap();
        assert_eq!(parsed.placeholders(), &["lob".to_string(), "id".to_string()]);
        assert!(parsed.uses_lob());
    }

    #[test]
    fn scan_skips_quotes_and_assignment() {
        let parsed = ParsedStatement::parse(
            "BEGIN l_x := ':not_me'; SELECT CAST(a AS text)::text FROM t WHERE id = :id; END;",
            "t/api",
        )
        .unwrap();
        assert_eq!(parsed.placeholders(), &["id".to_string()]);
        assert!(!parsed.uses_lob());
    }

    #[test]
    fn blank_statement_rejected() {
        assert!(matches!(
            ParsedStatement::parse("   ", "t/query"),
            Err(ConfigError::EmptyStatement { .. })
        ));
    }

    #[test]
    fn placeholder_needs_bind() {
        let parsed = ParsedStatement::parse("SELECT b FROM t WHERE id = :id", "t/query").unwrap();
        let err = DatabaseStatement::new(StatementType::Query, parsed.clone(), Vec::new());
        assert!(matches!(
            err,
            Err(ConfigError::UnboundPlaceholder { ref placeholder, .. }) if placeholder == "id"
        ));

        let bind = BindSpec::parse("id", "./ID").unwrap();
        assert!(DatabaseStatement::new(StatementType::Query, parsed, vec![bind]).is_ok());
    }

    #[test]
    fn from_element_reads_select_and_using() {
        let doc = Document::parse_str(
            r#"<query>
                 <select>SELECT b FROM t WHERE id = :id</select>
                 <using name="id" path="./ID"/>
               </query>"#,
        )
        .unwrap();
        let statement =
            DatabaseStatement::from_element(&doc, doc.root(), StatementType::Query, "photo").unwrap();
        assert_eq!(statement.parsed().purpose(), "photo/query");
        assert_eq!(statement.binds().len(), 1);
    }

    #[test]
    fn select_orientation() {
        assert!(StatementType::Query.is_select_oriented());
        assert!(StatementType::Api.is_select_oriented());
        assert!(!StatementType::Insert.is_select_oriented());
        assert!(!StatementType::Update.is_select_oriented());
    }
}
