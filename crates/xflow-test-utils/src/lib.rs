//! Testing utilities for the xflow workspace
//!
//! Shared fixtures, an in-memory database connection and tracing setup.

#![allow(missing_docs)]

use indexmap::IndexMap;
use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Once};
use xflow_dom::{Document, NodeId};
use xflow_engine::{
    BaseUriBuilder, DatabaseConnection, DatabaseError, EngineConfig, HostResolver, LobKind,
    LobValue, Module, ParsedStatement, RequestInfo, ResolvedBind, Row, ThreadInfo,
};

pub const UPLOAD_MODULE_XML: &str = r#"
<module name="upload" title="File Upload">
  <header application-title="Document Store"/>
  <state-list>
    <state name="main" title="Main"/>
    <state name="review" title="Review"/>
  </state-list>
  <storage-location-list>
    <file-storage-location name="photo">
      <database>
        <query>
          <select>SELECT file_blob FROM uploads WHERE id = :id</select>
          <using name="id" path="./ID"/>
        </query>
        <insert>
          <statement>INSERT INTO uploads (id, owner) VALUES (:id, :owner)</statement>
          <using name="id" path=":{item}/../ID"/>
          <using name="owner" path="./OWNER"/>
        </insert>
        <update>
          <statement>UPDATE uploads SET file_blob = :lob WHERE id = :id</statement>
          <using name="id" path="./ID"/>
        </update>
      </database>
    </file-storage-location>
    <file-storage-location name="archive" is-upload-target="false">
      <api>
        <statement>BEGIN archive.get_file(:ref, :lob); END;</statement>
        <using name="ref" path=":{item}/@ref"/>
      </api>
    </file-storage-location>
  </storage-location-list>
</module>
"#;

pub const CALLER_MODULE_XML: &str = r#"
<module name="portal" title="Portal">
  <state-list><state name="home" title="Home"/></state-list>
</module>
"#;

pub fn upload_module() -> Arc<Module> {
    Arc::new(Module::parse_str(UPLOAD_MODULE_XML).unwrap())
}

pub fn caller_module() -> Arc<Module> {
    Arc::new(Module::parse_str(CALLER_MODULE_XML).unwrap())
}

pub fn engine_config() -> EngineConfig {
    EngineConfig::default()
        .with_release("6.2.0")
        .with_build("b1234", "2024-05-01T10:00:00")
        .with_services("upload, download")
}

pub fn thread_info() -> ThreadInfo {
    ThreadInfo::new("ref-001", "DOCS", "thread-1", "session-1")
}

pub fn uri_builder() -> BaseUriBuilder {
    BaseUriBuilder::new("https://apps.example.com")
        .unwrap()
        .with_context_path("/engine")
}

pub fn request(query: &str) -> RequestInfo {
    RequestInfo::new("POST", "/engine/fox/upload")
        .with_remote_address("192.0.2.10")
        .with_query_string(query)
        .with_header("X-Forwarded-For", "203.0.113.5")
        .with_header("User-Agent", "test-agent/1.0")
}

/// Working document `<root><ROW><ID>{id}</ID><OWNER>alice</OWNER><PHOTO ref="file-{id}"/></ROW></root>`
///
/// Returns the document, the row and the upload target.
pub fn upload_document(id: &str) -> (Document, NodeId, NodeId) {
    let mut doc = Document::new("root");
    let root = doc.root();
    let row = doc.add_element(root, "ROW");
    doc.add_element_with_text(row, "ID", id);
    doc.add_element_with_text(row, "OWNER", "alice");
    let photo = doc.add_element(row, "PHOTO");
    doc.set_attribute(photo, "ref", format!("file-{id}"));
    (doc, row, photo)
}

#[derive(Debug, Clone, Default)]
pub struct FixedHostResolver {
    host: Option<(String, String)>,
}

impl FixedHostResolver {
    pub fn new(hostname: &str, address: &str) -> Self {
        Self {
            host: Some((hostname.to_string(), address.to_string())),
        }
    }

    pub fn failing() -> Self {
        Self { host: None }
    }
}

impl HostResolver for FixedHostResolver {
    fn hostname(&self) -> io::Result<String> {
        self.host
            .as_ref()
            .map(|(h, _)| h.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host lookup disabled"))
    }

    fn address(&self) -> io::Result<String> {
        self.host
            .as_ref()
            .map(|(_, a)| a.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host lookup disabled"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedStatement {
    pub purpose: String,
    pub binds: Vec<ResolvedBind>,
    pub lob: Option<LobValue>,
}

/// In-memory [`DatabaseConnection`]
///
/// Rows are keyed by the value of the statement's first bind. `UPDATE`
/// touches only existing rows, `INSERT` creates one, anything else (API
/// blocks) always succeeds. Every executed statement is recorded.
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    name: String,
    unavailable: bool,
    rows: HashSet<String>,
    lobs: IndexMap<String, LobValue>,
    sysdate: Row,
    executed: Vec<ExecutedStatement>,
}

impl Default for MemoryConnection {
    fn default() -> Self {
        let mut sysdate = Row::new();
        sysdate.insert("sysdate".to_string(), Some("2024-05-01".to_string()));
        sysdate.insert("sysdatetime".to_string(), Some("2024-05-01T12:30:00".to_string()));
        Self {
            name: "XFLOWDB".to_string(),
            unavailable: false,
            rows: HashSet::new(),
            lobs: IndexMap::new(),
            sysdate,
            executed: Vec::new(),
        }
    }
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_row(mut self, key: &str) -> Self {
        self.rows.insert(key.to_string());
        self
    }

    pub fn with_lob(mut self, key: &str, value: LobValue) -> Self {
        self.rows.insert(key.to_string());
        self.lobs.insert(key.to_string(), value);
        self
    }

    pub fn executed(&self) -> &[ExecutedStatement] {
        &self.executed
    }

    pub fn executed_purposes(&self) -> Vec<&str> {
        self.executed.iter().map(|e| e.purpose.as_str()).collect()
    }

    pub fn lob(&self, key: &str) -> Option<&LobValue> {
        self.lobs.get(key)
    }

    pub fn has_row(&self, key: &str) -> bool {
        self.rows.contains(key)
    }

    fn check(&self) -> Result<(), DatabaseError> {
        if self.unavailable {
            Err(DatabaseError::Unavailable("connection closed".to_string()))
        } else {
            Ok(())
        }
    }
}

fn key(binds: &[ResolvedBind]) -> String {
    binds
        .first()
        .and_then(|b| b.value.clone())
        .unwrap_or_default()
}

impl DatabaseConnection for MemoryConnection {
    fn database_name(&mut self) -> Result<String, DatabaseError> {
        self.check()?;
        Ok(self.name.clone())
    }

    fn query_single_row(
        &mut self,
        _statement: &ParsedStatement,
        _binds: &[ResolvedBind],
    ) -> Result<Row, DatabaseError> {
        self.check()?;
        Ok(self.sysdate.clone())
    }

    fn select_lob(
        &mut self,
        statement: &ParsedStatement,
        binds: &[ResolvedBind],
        kind: LobKind,
    ) -> Result<Option<LobValue>, DatabaseError> {
        self.check()?;
        match self.lobs.get(&key(binds)) {
            Some(value) if !kind.accepts(value) => Err(DatabaseError::statement(
                statement.purpose(),
                format!("stored {} is not a {kind}", value.kind()),
            )),
            found => Ok(found.cloned()),
        }
    }

    fn execute(
        &mut self,
        statement: &ParsedStatement,
        binds: &[ResolvedBind],
        lob: Option<&LobValue>,
    ) -> Result<u64, DatabaseError> {
        self.check()?;
        self.executed.push(ExecutedStatement {
            purpose: statement.purpose().to_string(),
            binds: binds.to_vec(),
            lob: lob.cloned(),
        });

        let row_key = key(binds);
        let verb = statement
            .sql()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        let affected = match verb.as_str() {
            "UPDATE" if !self.rows.contains(&row_key) => return Ok(0),
            "INSERT" => {
                self.rows.insert(row_key.clone());
                1
            }
            _ => 1,
        };
        if let Some(value) = lob {
            self.lobs.insert(row_key, value.clone());
        }
        Ok(affected)
    }
}

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
