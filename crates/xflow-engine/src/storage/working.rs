//! Per-operation evaluation of a storage location definition

use crate::bind::{BindSpec, ResolvedBind};
use crate::context::{ContextLabel, ContextStack, DocumentScope};
use crate::database::{DatabaseConnection, DatabaseStatement, StatementType};
use crate::error::{ConfigError, DatabaseError, EngineError, EngineResult};
use crate::lob::{LobKind, LobValue};
use crate::storage::definition::{CacheKeyStrategy, StorageLocationDefinition};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use xflow_dom::NodeId;

/// A storage location definition with its binds resolved for one target
///
/// Binds are evaluated exactly once, at construction. Read-only instances
/// resolve only select-oriented binds and refuse writes.
#[derive(Debug, Clone)]
pub struct WorkingStorageLocation {
    definition: Arc<StorageLocationDefinition>,
    kind: LobKind,
    read_only: bool,
    target: Option<NodeId>,
    binds: BTreeMap<StatementType, Vec<ResolvedBind>>,
    cache_key: String,
    lob: Option<LobValue>,
}

impl WorkingStorageLocation {
    pub(crate) fn evaluate(
        definition: Arc<StorageLocationDefinition>,
        kind: LobKind,
        ctx: &ContextStack,
        docs: &dyn DocumentScope,
        read_only: bool,
    ) -> EngineResult<Self> {
        let bind_error = |source| EngineError::Bind {
            location: definition.name().to_string(),
            source,
        };

        let mut binds = BTreeMap::new();
        for statement in definition.statements() {
            let statement_type = statement.statement_type();
            if read_only && !statement_type.is_select_oriented() {
                continue;
            }
            let resolved = statement
                .binds()
                .iter()
                .map(|b| b.evaluate(ctx, docs))
                .collect::<Result<Vec<_>, _>>()
                .map_err(bind_error)?;
            binds.insert(statement_type, resolved);
        }

        let cache_key = match definition.cache_key_strategy() {
            CacheKeyStrategy::SelectBinds => {
                let pairs = binds
                    .iter()
                    .filter(|(t, _)| t.is_select_oriented())
                    .flat_map(|(_, b)| b.iter());
                hash_key(definition.name(), pairs)
            }
            CacheKeyStrategy::Explicit(expr) => {
                let resolved = BindSpec::new("cache-key", expr.clone())
                    .evaluate(ctx, docs)
                    .map_err(bind_error)?;
                hash_key(definition.name(), std::iter::once(&resolved))
            }
        };

        let target = ctx.get(ContextLabel::Item);
        tracing::info!(
            location = definition.name(),
            module = definition.module(),
            %kind,
            read_only,
            statements = binds.len(),
            "working storage location created"
        );

        Ok(Self {
            definition,
            kind,
            read_only,
            target,
            binds,
            cache_key,
            lob: None,
        })
    }

    /// Definition this instance was evaluated from
    #[inline]
    #[must_use]
    pub fn definition(&self) -> &Arc<StorageLocationDefinition> {
        &self.definition
    }

    /// LOB kind read and written
    #[inline]
    #[must_use]
    pub fn kind(&self) -> LobKind {
        self.kind
    }

    /// Whether writes are refused
    #[inline]
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// `item` context at evaluation time
    #[inline]
    #[must_use]
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    /// Resolved binds for a statement, `None` if it was not evaluated
    #[must_use]
    pub fn binds_for(&self, statement_type: StatementType) -> Option<&[ResolvedBind]> {
        self.binds.get(&statement_type).map(Vec::as_slice)
    }

    /// Names of every bind that was evaluated
    #[must_use]
    pub fn evaluated_bind_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .binds
            .values()
            .flat_map(|b| b.iter().map(|r| r.name.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Hex digest identifying the content this instance addresses
    #[inline]
    #[must_use]
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// LOB fetched or last written
    #[inline]
    #[must_use]
    pub fn lob(&self) -> Option<&LobValue> {
        self.lob.as_ref()
    }

    /// Select the LOB through the query statement, or the API when there is none
    ///
    /// Returns `None` when the statement finds no row.
    ///
    /// # Errors
    /// - `EngineError::Database` on execution failure
    /// - `EngineError::Config` when neither a query nor an API statement is defined
    /// - `EngineError::LobKindMismatch` if the connection returns the wrong kind
    pub fn fetch(&mut self, conn: &mut dyn DatabaseConnection) -> EngineResult<Option<&LobValue>> {
        let (statement, binds) = [StatementType::Query, StatementType::Api]
            .into_iter()
            .find_map(|t| self.prepared(t))
            .ok_or_else(|| self.missing_statement("read"))?;

        let value = conn.select_lob(statement.parsed(), binds, self.kind)?;
        if let Some(value) = &value {
            self.check_kind(value)?;
        }
        tracing::debug!(
            location = self.definition.name(),
            found = value.is_some(),
            "storage location fetched"
        );
        self.lob = value;
        Ok(self.lob.as_ref())
    }

    /// Write a LOB
    ///
    /// Tries the update statement first; when it touches no row the insert
    /// runs and the update is retried. Without an update statement the insert
    /// alone runs, and without a database block the API statement does.
    /// Returns rows affected.
    ///
    /// # Errors
    /// - `EngineError::ReadOnly` for read-only instances
    /// - `EngineError::LobKindMismatch` if `value` is the wrong kind
    /// - `EngineError::Database` on execution failure, or when the update
    ///   touches no row and there is no insert
    /// - `EngineError::Config` when no statement could write the value
    pub fn write(&mut self, conn: &mut dyn DatabaseConnection, value: LobValue) -> EngineResult<u64> {
        if self.read_only {
            return Err(EngineError::ReadOnly(self.definition.name().to_string()));
        }
        self.check_kind(&value)?;

        let update = self.prepared(StatementType::Update);
        let insert = self.prepared(StatementType::Insert);
        let rows = match (update, insert) {
            (Some(update), insert) => {
                let mut rows = execute(conn, update, &value)?;
                if rows == 0 {
                    let Some(insert) = insert else {
                        return Err(DatabaseError::NoRow(update.0.parsed().purpose().to_string()).into());
                    };
                    execute(conn, insert, &value)?;
                    rows = execute(conn, update, &value)?;
                }
                rows
            }
            (None, Some(insert)) => execute(conn, insert, &value)?,
            (None, None) => match self.prepared(StatementType::Api) {
                Some(api) => execute(conn, api, &value)?,
                None => return Err(self.missing_statement("write")),
            },
        };

        tracing::debug!(
            location = self.definition.name(),
            rows,
            bytes = value.len(),
            "storage location written"
        );
        self.lob = Some(value);
        Ok(rows)
    }

    fn prepared(&self, statement_type: StatementType) -> Option<(&DatabaseStatement, &[ResolvedBind])> {
        let statement = self.definition.statement(statement_type)?;
        let binds = self.binds_for(statement_type)?;
        Some((statement, binds))
    }

    fn missing_statement(&self, operation: &'static str) -> EngineError {
        ConfigError::MissingStatement {
            name: self.definition.name().to_string(),
            operation,
        }
        .into()
    }

    fn check_kind(&self, value: &LobValue) -> EngineResult<()> {
        if self.kind.accepts(value) {
            Ok(())
        } else {
            Err(EngineError::LobKindMismatch {
                location: self.definition.name().to_string(),
                expected: self.kind,
                actual: value.kind(),
            })
        }
    }
}

fn execute(
    conn: &mut dyn DatabaseConnection,
    (statement, binds): (&DatabaseStatement, &[ResolvedBind]),
    value: &LobValue,
) -> Result<u64, DatabaseError> {
    let parsed = statement.parsed();
    let lob = parsed.uses_lob().then_some(value);
    conn.execute(parsed, binds, lob)
}

/// Digest of the location name and resolved binds
///
/// Every field is length-prefixed and each value carries a presence tag, so
/// NULL differs from the empty string and no value can forge another pair.
fn hash_key<'a>(name: &str, binds: impl Iterator<Item = &'a ResolvedBind>) -> String {
    fn field(hasher: &mut Sha256, bytes: &[u8]) {
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }

    let mut hasher = Sha256::new();
    field(&mut hasher, name.as_bytes());
    for bind in binds {
        field(&mut hasher, bind.name.as_bytes());
        match &bind.value {
            Some(value) => {
                hasher.update([1u8]);
                field(&mut hasher, value.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::BindExpr;
    use xflow_dom::Document;

    struct NoConnection;

    impl DatabaseConnection for NoConnection {
        fn database_name(&mut self) -> Result<String, DatabaseError> {
            Err(DatabaseError::Unavailable("closed".into()))
        }

        fn query_single_row(
            &mut self,
            statement: &crate::database::ParsedStatement,
            _: &[ResolvedBind],
        ) -> Result<crate::database::Row, DatabaseError> {
            Err(DatabaseError::NoRow(statement.purpose().to_string()))
        }

        fn select_lob(
            &mut self,
            _: &crate::database::ParsedStatement,
            _: &[ResolvedBind],
            _: LobKind,
        ) -> Result<Option<LobValue>, DatabaseError> {
            Err(DatabaseError::Unavailable("closed".into()))
        }

        fn execute(
            &mut self,
            _: &crate::database::ParsedStatement,
            _: &[ResolvedBind],
            _: Option<&LobValue>,
        ) -> Result<u64, DatabaseError> {
            Err(DatabaseError::Unavailable("closed".into()))
        }
    }

    const ROW_XML: &str = r#"<root><ROW><ID>7</ID><PHOTO ref="f7"/></ROW></root>"#;

    fn definition() -> Arc<StorageLocationDefinition> {
        let doc = Document::parse_str(
            r#"<file-storage-location name="photo">
                 <database>
                   <query><select>SELECT b FROM t WHERE id = :id</select><using name="id" path="./ID"/></query>
                   <insert><statement>INSERT INTO t (id, owner) VALUES (:id, :owner)</statement>
                     <using name="id" path="./ID"/><using name="owner" path="./OWNER"/></insert>
                 </database>
               </file-storage-location>"#,
        )
        .unwrap();
        Arc::new(StorageLocationDefinition::from_element(&doc, doc.root(), "m").unwrap())
    }

    fn positioned() -> (Document, ContextStack) {
        let doc = Document::parse_str(ROW_XML).unwrap();
        let row = doc.children(doc.root())[0];
        let mut ctx = ContextStack::with_root(doc.root());
        ctx.set(ContextLabel::Attach, row);
        (doc, ctx)
    }

    #[test]
    fn read_only_skips_write_binds() {
        let (doc, ctx) = positioned();
        // OWNER is absent, so evaluating the insert binds would fail
        let working = definition()
            .create_working(LobKind::Binary, &ctx, &doc, true)
            .unwrap();
        assert_eq!(working.evaluated_bind_names(), vec!["id"]);
        assert!(working.binds_for(StatementType::Insert).is_none());
        assert_eq!(
            working.binds_for(StatementType::Query).unwrap()[0].value.as_deref(),
            Some("7")
        );
    }

    #[test]
    fn writable_evaluates_every_bind() {
        let (doc, ctx) = positioned();
        let result = definition().create_working(LobKind::Binary, &ctx, &doc, false);
        assert!(matches!(result, Err(EngineError::Bind { .. })));
    }

    #[test]
    fn cache_key_depends_on_select_binds() {
        let (doc, ctx) = positioned();
        let a = definition().create_working(LobKind::Binary, &ctx, &doc, true).unwrap();
        let b = definition().create_working(LobKind::Character, &ctx, &doc, true).unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key().len(), 64);

        let other = Document::parse_str(r#"<root><ROW><ID>8</ID></ROW></root>"#).unwrap();
        let mut other_ctx = ContextStack::with_root(other.root());
        other_ctx.set(ContextLabel::Attach, other.children(other.root())[0]);
        let c = definition().create_working(LobKind::Binary, &other_ctx, &other, true).unwrap();
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn explicit_cache_key() {
        let (doc, ctx) = positioned();
        let def = Arc::new(
            (*definition())
                .clone()
                .with_cache_key(CacheKeyStrategy::Explicit(BindExpr::parse("./PHOTO/@ref").unwrap())),
        );
        let working = def.create_working(LobKind::Binary, &ctx, &doc, true).unwrap();
        assert_eq!(working.cache_key(), hash_key("photo", std::iter::once(&ResolvedBind::new("cache-key", Some("f7".into())))));
    }

    #[test]
    fn null_and_empty_binds_key_differently() {
        let null = ResolvedBind::new("id", None);
        let empty = ResolvedBind::new("id", Some(String::new()));
        assert_ne!(
            hash_key("photo", std::iter::once(&null)),
            hash_key("photo", std::iter::once(&empty))
        );
    }

    #[test]
    fn bind_value_cannot_forge_extra_pair() {
        let forged = [ResolvedBind::new("a", Some("1\nb=2".into()))];
        let genuine = [
            ResolvedBind::new("a", Some("1".into())),
            ResolvedBind::new("b", Some("2".into())),
        ];
        assert_ne!(hash_key("photo", forged.iter()), hash_key("photo", genuine.iter()));

        let split = [ResolvedBind::new("ab", Some("c".into()))];
        let shifted = [ResolvedBind::new("a", Some("bc".into()))];
        assert_ne!(hash_key("photo", split.iter()), hash_key("photo", shifted.iter()));
    }

    #[test]
    fn fetch_without_query_or_api_is_configuration_error() {
        let doc = Document::parse_str(
            r#"<file-storage-location name="inbox">
                 <database><insert><statement>INSERT INTO t (b) VALUES (:lob)</statement></insert></database>
               </file-storage-location>"#,
        )
        .unwrap();
        let def = Arc::new(StorageLocationDefinition::from_element(&doc, doc.root(), "m").unwrap());
        let (row_doc, ctx) = positioned();
        let mut working = def.create_working(LobKind::Binary, &ctx, &row_doc, true).unwrap();

        let mut conn = NoConnection;
        let err = working.fetch(&mut conn).unwrap_err();
        assert!(err.is_configuration());
        assert!(!err.is_recoverable());
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::MissingStatement { ref name, operation: "read" }) if name == "inbox"
        ));
    }

    #[test]
    fn target_is_item_context() {
        let (doc, mut ctx) = positioned();
        assert_eq!(
            definition().create_working(LobKind::Binary, &ctx, &doc, true).unwrap().target(),
            None
        );
        let photo = doc.children(doc.children(doc.root())[0])[1];
        ctx.set(ContextLabel::Item, photo);
        let working = definition().create_working(LobKind::Binary, &ctx, &doc, true).unwrap();
        assert_eq!(working.target(), Some(photo));
    }
}
