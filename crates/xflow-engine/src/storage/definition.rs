//! Parsed-once file storage location definitions

use crate::bind::{parse_bool, BindExpr};
use crate::context::{ContextLabel, ContextStack, DocumentScope};
use crate::database::{DatabaseStatement, StatementType};
use crate::error::{ConfigError, EngineError, EngineResult};
use crate::lob::LobKind;
use crate::storage::upload::{UploadInfo, WorkingUploadStorageLocation};
use crate::storage::working::WorkingStorageLocation;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use xflow_dom::{Document, NodeId};

const CREATE_PURPOSE: &str = "create working storage location";

/// How a working location derives its cache key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKeyStrategy {
    /// Hash of the evaluated select-oriented binds
    SelectBinds,
    /// Value of an explicit expression
    Explicit(BindExpr),
}

/// Immutable description of where a file's LOB lives and how to reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocationDefinition {
    name: String,
    module: String,
    has_database: bool,
    statements: BTreeMap<StatementType, DatabaseStatement>,
    upload_target: bool,
    cache_key: CacheKeyStrategy,
}

impl StorageLocationDefinition {
    /// Build a definition from statements
    ///
    /// `database` holds the query/insert/update statements of a database
    /// block (which may be empty), `api` the API statement.
    ///
    /// # Errors
    /// `ConfigError::MissingStatementBlock` if there is neither a database
    /// block nor an API statement
    pub fn new(
        name: impl Into<String>,
        module: impl Into<String>,
        database: Option<Vec<DatabaseStatement>>,
        api: Option<DatabaseStatement>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if database.is_none() && api.is_none() {
            return Err(ConfigError::MissingStatementBlock { name });
        }
        let has_database = database.is_some();
        let statements = database
            .into_iter()
            .flatten()
            .chain(api)
            .map(|s| (s.statement_type(), s))
            .collect();
        Ok(Self {
            name,
            module: module.into(),
            has_database,
            statements,
            upload_target: true,
            cache_key: CacheKeyStrategy::SelectBinds,
        })
    }

    /// Parse a `<file-storage-location>` element
    ///
    /// Any `<cache-key>` child is ignored: file locations always key on their
    /// select binds.
    ///
    /// # Errors
    /// Missing name, invalid `is-upload-target`, malformed statements or
    /// neither a `database` nor an `api` block
    pub fn from_element(doc: &Document, node: NodeId, module: &str) -> Result<Self, ConfigError> {
        let element = doc.name(node);
        let name = doc
            .attribute(node, "name")
            .ok_or_else(|| ConfigError::missing_attribute(element, "name"))?;

        let upload_target = match doc.attribute(node, "is-upload-target") {
            None => true,
            Some(value) => parse_bool(value)
                .ok_or_else(|| ConfigError::invalid_attribute(element, "is-upload-target", value))?,
        };

        let database = match doc.children_local(node, "database").next() {
            Some(block) => {
                let mut statements = Vec::new();
                for statement_type in [StatementType::Query, StatementType::Insert, StatementType::Update] {
                    if let Some(s) = doc.children_local(block, statement_type.as_str()).next() {
                        statements.push(DatabaseStatement::from_element(doc, s, statement_type, name)?);
                    }
                }
                Some(statements)
            }
            None => None,
        };

        let api = doc
            .children_local(node, StatementType::Api.as_str())
            .next()
            .map(|a| DatabaseStatement::from_element(doc, a, StatementType::Api, name))
            .transpose()?;

        if doc.children_local(node, "cache-key").next().is_some() {
            tracing::debug!(location = name, "ignoring cache-key on file storage location");
        }

        Ok(Self::new(name, module, database, api)?.with_upload_target(upload_target))
    }

    /// Set upload eligibility
    #[inline]
    #[must_use]
    pub fn with_upload_target(mut self, upload_target: bool) -> Self {
        self.upload_target = upload_target;
        self
    }

    /// Set cache key strategy
    #[inline]
    #[must_use]
    pub fn with_cache_key(mut self, strategy: CacheKeyStrategy) -> Self {
        self.cache_key = strategy;
        self
    }

    /// Definition name, unique within its module
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning module name
    #[inline]
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Whether uploads may target this location
    #[inline]
    #[must_use]
    pub fn is_upload_target(&self) -> bool {
        self.upload_target
    }

    /// Whether a database block was defined
    #[inline]
    #[must_use]
    pub fn has_database(&self) -> bool {
        self.has_database
    }

    /// Whether an API statement was defined
    #[inline]
    #[must_use]
    pub fn has_api(&self) -> bool {
        self.statements.contains_key(&StatementType::Api)
    }

    /// Statement of the given type
    #[inline]
    #[must_use]
    pub fn statement(&self, statement_type: StatementType) -> Option<&DatabaseStatement> {
        self.statements.get(&statement_type)
    }

    /// All statements in type order
    pub fn statements(&self) -> impl Iterator<Item = &DatabaseStatement> {
        self.statements.values()
    }

    /// Cache key strategy
    #[inline]
    #[must_use]
    pub fn cache_key_strategy(&self) -> &CacheKeyStrategy {
        &self.cache_key
    }

    /// Names of binds feeding select-oriented statements
    #[must_use]
    pub fn select_bind_names(&self) -> BTreeSet<String> {
        self.statements()
            .filter(|s| s.statement_type().is_select_oriented())
            .flat_map(|s| s.binds().iter().map(|b| b.name().to_string()))
            .collect()
    }

    /// Read-only working location for downloading a previous upload
    ///
    /// `target` becomes the `item` context and its parent the `attach`
    /// context while binds are evaluated; both are restored before returning.
    ///
    /// # Errors
    /// `EngineError::Bind` if a select bind cannot be evaluated
    pub fn create_working_for_download(
        self: &Arc<Self>,
        ctx: &mut ContextStack,
        docs: &dyn DocumentScope,
        target: NodeId,
    ) -> EngineResult<WorkingStorageLocation> {
        let mut local = ctx.localise(CREATE_PURPOSE);
        let attach = docs.document(ContextLabel::Item).parent_or_self(target);
        local.set(ContextLabel::Attach, attach);
        local.set(ContextLabel::Item, target);
        WorkingStorageLocation::evaluate(Arc::clone(self), LobKind::Binary, &local, docs, true)
    }

    /// Working location evaluated at the caller's current context
    ///
    /// # Errors
    /// `EngineError::Bind` if a bind cannot be evaluated
    pub fn create_working(
        self: &Arc<Self>,
        kind: LobKind,
        ctx: &ContextStack,
        docs: &dyn DocumentScope,
        read_only: bool,
    ) -> EngineResult<WorkingStorageLocation> {
        WorkingStorageLocation::evaluate(Arc::clone(self), kind, ctx, docs, read_only)
    }

    /// Writable working location for a new upload into `target`
    ///
    /// # Errors
    /// - `EngineError::NotUploadTarget` if uploads are disabled for this location
    /// - `EngineError::Bind` if a bind cannot be evaluated
    pub fn create_working_upload(
        self: &Arc<Self>,
        ctx: &mut ContextStack,
        docs: &dyn DocumentScope,
        target: NodeId,
        info: UploadInfo,
    ) -> EngineResult<WorkingUploadStorageLocation> {
        if !self.upload_target {
            return Err(EngineError::NotUploadTarget(self.name.clone()));
        }
        let mut local = ctx.localise(CREATE_PURPOSE);
        let attach = docs.document(ContextLabel::Item).parent_or_self(target);
        local.set(ContextLabel::Attach, attach);
        local.set(ContextLabel::Item, target);
        let working =
            WorkingStorageLocation::evaluate(Arc::clone(self), LobKind::Binary, &local, docs, false)?;
        Ok(WorkingUploadStorageLocation::new(working, info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHOTO: &str = r#"
        <file-storage-location name="photo">
          <database>
            <query>
              <select>SELECT file_blob FROM uploads WHERE id = :id</select>
              <using name="id" path="./ID"/>
            </query>
            <update>
              <statement>UPDATE uploads SET file_blob = :lob WHERE id = :id</statement>
              <using name="id" path="./ID"/>
            </update>
          </database>
          <cache-key>./ID</cache-key>
        </file-storage-location>"#;

    fn parse(xml: &str) -> Result<StorageLocationDefinition, ConfigError> {
        let doc = Document::parse_str(xml)?;
        StorageLocationDefinition::from_element(&doc, doc.root(), "mod")
    }

    #[test]
    fn parses_database_block() {
        let def = parse(PHOTO).unwrap();
        assert_eq!(def.name(), "photo");
        assert_eq!(def.module(), "mod");
        assert!(def.is_upload_target());
        assert!(def.has_database());
        assert!(!def.has_api());
        assert!(def.statement(StatementType::Query).is_some());
        assert!(def.statement(StatementType::Insert).is_none());
        assert_eq!(def.cache_key_strategy(), &CacheKeyStrategy::SelectBinds);
    }

    #[test]
    fn namespaced_definition_parses() {
        let def = parse(
            r#"<fm:file-storage-location xmlns:fm="http://www.fm.com/xflow" name="photo">
                 <fm:database>
                   <fm:query>
                     <fm:select>SELECT file_blob FROM uploads WHERE id = :id</fm:select>
                     <fm:using name="id" path="./ID"/>
                   </fm:query>
                 </fm:database>
                 <fm:api><fm:statement>BEGIN get_file(:ref, :lob); END;</fm:statement>
                 <fm:using name="ref" path=":{item}/@ref"/></fm:api>
               </fm:file-storage-location>"#,
        )
        .unwrap();
        assert!(def.has_database());
        assert!(def.has_api());
        let query = def.statement(StatementType::Query).unwrap();
        assert_eq!(query.parsed().placeholders(), ["id".to_string()]);
        assert_eq!(
            def.select_bind_names().into_iter().collect::<Vec<_>>(),
            vec!["id", "ref"]
        );
    }

    #[test]
    fn missing_blocks_rejected() {
        let err = parse(r#"<file-storage-location name="bare"/>"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingStatementBlock { ref name } if name == "bare"));
    }

    #[test]
    fn empty_database_block_accepted() {
        let def = parse(r#"<file-storage-location name="x"><database/></file-storage-location>"#).unwrap();
        assert!(def.has_database());
        assert_eq!(def.statements().count(), 0);
    }

    #[test]
    fn api_only_location() {
        let def = parse(
            r#"<file-storage-location name="api" is-upload-target="false">
                 <api><statement>BEGIN get_file(:ref, :lob); END;</statement>
                 <using name="ref" path=":{item}/@ref"/></api>
               </file-storage-location>"#,
        )
        .unwrap();
        assert!(def.has_api());
        assert!(!def.has_database());
        assert!(!def.is_upload_target());
        assert_eq!(def.select_bind_names().into_iter().collect::<Vec<_>>(), vec!["ref"]);
    }

    #[test]
    fn upload_target_must_be_boolean() {
        let err = parse(r#"<file-storage-location name="x" is-upload-target="yes"><database/></file-storage-location>"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAttribute { .. }));
    }

    #[test]
    fn download_restores_context_on_failure() {
        let def = Arc::new(parse(PHOTO).unwrap());
        let mut doc = Document::new("root");
        let root = doc.root();
        let target = doc.add_element(root, "PHOTO");
        let mut ctx = ContextStack::with_root(root);
        let before = ctx.snapshot();

        let result = def.create_working_for_download(&mut ctx, &doc, target);
        assert!(matches!(result, Err(EngineError::Bind { .. })));
        assert_eq!(ctx.snapshot(), before);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn upload_refused_when_not_target() {
        let def = Arc::new(parse(PHOTO).unwrap().with_upload_target(false));
        let doc = Document::new("root");
        let mut ctx = ContextStack::with_root(doc.root());
        let result = def.create_working_upload(&mut ctx, &doc, doc.root(), UploadInfo::new("a.png", "image/png", 1));
        assert!(matches!(result, Err(EngineError::NotUploadTarget(_))));
    }
}
