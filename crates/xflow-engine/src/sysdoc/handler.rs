//! The per-thread system document and its synchronisation with the call stack

use crate::config::EngineConfig;
use crate::context::ContextLabel;
use crate::database::{DatabaseConnection, ParsedStatement};
use crate::error::{DatabaseError, EngineError, EngineResult};
use crate::handler::{DomHandler, LoadPrecedence};
use crate::stack::{ListenerId, ModuleCallStack, StackTransition};
use crate::sysdoc::host::{HostResolver, UriBuilder};
use crate::sysdoc::request::{RequestInfo, ThreadInfo, FORWARDED_FOR_HEADER};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use xflow_dom::{Document, DomError, DomPath, DomResult, NodeId};

/// Root element of the system document
pub const SYS_ROOT: &str = "sys";

/// Title recorded for the previous module when there is none
pub const START_TITLE: &str = "Start";

/// Counter incremented for each status refresh abandoned on an ambiguous path
pub const REFRESH_SKIPPED_METRIC: &str = "xflow_sysdoc_refresh_skipped_total";

const SYSDATE_SQL: &str = "SELECT TO_CHAR(sysdate,'YYYY-MM-DD') \"sysdate\", \
     TO_CHAR(sysdate,'YYYY-MM-DD\"T\"HH24:MI:SS') \"sysdatetime\" FROM dual";

const UNKNOWN_HOST: &str = "unknown";

/// Owner of a thread's system document
///
/// Created once per thread. Module and state subtrees follow the call stack
/// through a registered listener; engine URL, request and database subtrees
/// are refreshed by [`DomHandler::open`] once per churn. The handler is
/// the document's only strong owner: once it drops, the listener left on the
/// stack becomes a no-op.
#[derive(Debug)]
pub struct SysDomHandler {
    doc: Arc<Mutex<Document>>,
    skipped: Arc<AtomicU64>,
    listener: ListenerId,
    query_string_limit: usize,
    servlet_path: String,
}

impl SysDomHandler {
    /// Build the document and subscribe to `stack`
    ///
    /// # Errors
    /// `EngineError::Config` if the engine URL cannot be built
    pub fn create(
        thread: &ThreadInfo,
        config: &EngineConfig,
        host: &dyn HostResolver,
        uri: &dyn UriBuilder,
        stack: &mut ModuleCallStack,
    ) -> EngineResult<Self> {
        let mut doc = Document::new(SYS_ROOT);

        set_lenient(&mut doc, "thread/ref", &thread.thread_ref)?;
        set_lenient(&mut doc, "thread/app_mnem", &thread.app_mnem)?;
        set_lenient(&mut doc, "thread/thread_id", &thread.thread_id)?;
        set_lenient(&mut doc, "thread/session_id", &thread.session_id)?;

        set_lenient(&mut doc, "engine/release", &config.release)?;
        set_lenient(&mut doc, "engine/build-tag", &config.build_tag)?;
        set_lenient(&mut doc, "engine/build-time", &config.build_time)?;
        set_lenient(&mut doc, "engine/fox_services", &config.services)?;
        let service_list = set_lenient(&mut doc, "engine/fox_service_list", "")?;
        for service in config.service_list() {
            doc.add_element_with_text(service_list, "fox_service", service);
        }
        set_lenient(&mut doc, "engine/status", config.status())?;

        let (hostname, address) = match host.hostname().and_then(|h| Ok((h, host.address()?))) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "host lookup failed, recording unknown host");
                (UNKNOWN_HOST.to_string(), UNKNOWN_HOST.to_string())
            }
        };
        set_lenient(&mut doc, "host/hostname", &hostname)?;
        set_lenient(&mut doc, "host/address", &address)?;

        refresh_engine_url(&mut doc, uri, &config.servlet_path)?;

        let skipped = Arc::new(AtomicU64::new(0));
        refresh_state(&mut doc, stack, &skipped);
        refresh_module(&mut doc, stack, &skipped);

        let doc = Arc::new(Mutex::new(doc));
        let listener = {
            let doc = Arc::downgrade(&doc);
            let skipped = Arc::clone(&skipped);
            stack.register(move |transition, stack| {
                let Some(doc) = doc.upgrade() else {
                    return;
                };
                let mut doc = doc.lock();
                match transition {
                    StackTransition::Module => {
                        refresh_module(&mut doc, stack, &skipped);
                        refresh_state(&mut doc, stack, &skipped);
                    }
                    StackTransition::State => refresh_state(&mut doc, stack, &skipped),
                }
            })
        };

        tracing::debug!(thread = %thread.thread_id, "system document created");
        Ok(Self {
            doc,
            skipped,
            listener,
            query_string_limit: config.query_string_limit,
            servlet_path: config.servlet_path.clone(),
        })
    }

    /// Write text at a single-valued path, creating it if needed
    ///
    /// # Errors
    /// - `EngineError::Internal` if the path matches more than one element
    /// - `EngineError::Document` if the path is malformed
    pub fn add_info(&self, path: &str, text: &str) -> EngineResult<()> {
        let parsed: DomPath = path.parse().map_err(DomError::from)?;
        let mut doc = self.doc.lock();
        let root = doc.root();
        match doc.get_create_1e(root, &parsed) {
            Ok(node) => {
                doc.set_text(node, text);
                Ok(())
            }
            Err(e) if e.is_too_many() => Err(EngineError::internal(
                format!("too many elements when adding system document info, check path ({path})"),
                e,
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// First value at a path
    #[must_use]
    pub fn text(&self, path: &str) -> Option<String> {
        self.doc.lock().text_at(path)
    }

    /// Number of elements at a path
    #[must_use]
    pub fn count(&self, path: &str) -> usize {
        self.doc.lock().count_at(path)
    }

    /// Root of the document, bound to the `sys` context label
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.doc.lock().root()
    }

    /// Run `f` with the document locked
    pub fn with_document<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.doc.lock())
    }

    /// Serialised document
    ///
    /// # Errors
    /// `EngineError::Document` if serialisation fails
    pub fn to_xml_string(&self) -> EngineResult<String> {
        Ok(self.doc.lock().to_xml_string()?)
    }

    /// Refreshes abandoned because a path was ambiguous
    #[inline]
    #[must_use]
    pub fn skipped_refreshes(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Listener registered on the call stack
    #[inline]
    #[must_use]
    pub fn listener_id(&self) -> ListenerId {
        self.listener
    }

    /// Stop following `stack`
    ///
    /// The listener only holds a weak reference to the document, so a
    /// dropped handler never keeps it alive; detaching also removes the
    /// listener itself. Returns whether it was still registered.
    pub fn detach(&self, stack: &mut ModuleCallStack) -> bool {
        stack.unregister(self.listener)
    }
}

impl DomHandler for SysDomHandler {
    fn context_label(&self) -> ContextLabel {
        ContextLabel::Sys
    }

    /// Per-churn refresh of the engine URL, request info and database subtrees
    ///
    /// # Errors
    /// - `EngineError::Internal` wrapping the cause if the database cannot be queried
    /// - `EngineError::Config` if the engine URL cannot be built
    fn open(
        &self,
        request: &RequestInfo,
        uri: &dyn UriBuilder,
        conn: &mut dyn DatabaseConnection,
    ) -> EngineResult<()> {
        let mut doc = self.doc.lock();
        refresh_engine_url(&mut doc, uri, &self.servlet_path)?;
        refresh_request_info(&mut doc, request, self.query_string_limit)?;

        let statement = ParsedStatement::parse(SYSDATE_SQL, "system document sysdate select")?;
        let row = conn.query_single_row(&statement, &[]).map_err(sysdate_failed)?;
        for (column, value) in &row {
            set_lenient(&mut doc, &format!("database/{column}"), value.as_deref().unwrap_or_default())?;
        }
        let name = conn.database_name().map_err(sysdate_failed)?;
        set_lenient(&mut doc, "database/name", &name)?;
        Ok(())
    }

    fn close(&self) -> EngineResult<()> {
        Ok(())
    }

    fn is_transient(&self) -> bool {
        false
    }

    fn load_precedence(&self) -> LoadPrecedence {
        LoadPrecedence::Medium
    }
}

fn sysdate_failed(e: DatabaseError) -> EngineError {
    tracing::error!(error = %e, "system document database refresh failed");
    EngineError::internal("failed to retrieve sysdate for system document", e)
}

fn set_lenient(doc: &mut Document, path: &str, text: &str) -> DomResult<NodeId> {
    let path: DomPath = path.parse()?;
    let root = doc.root();
    let node = doc.get_create_first(root, &path)?;
    Ok(doc.set_text(node, text))
}

fn refresh_engine_url(doc: &mut Document, uri: &dyn UriBuilder, servlet_path: &str) -> EngineResult<()> {
    let url = uri.to_absolute(&uri.servlet_uri(servlet_path))?;
    set_lenient(doc, "portal_urls/engine_url", &url)?;
    Ok(())
}

fn refresh_request_info(doc: &mut Document, request: &RequestInfo, limit: usize) -> DomResult<()> {
    let header = |name| request.header(name).unwrap_or_default();
    set_lenient(doc, "request_info/http_method", request.method())?;
    set_lenient(doc, "request_info/request_uri", request.request_uri())?;
    set_lenient(doc, "request_info/remote_address", request.remote_address())?;
    set_lenient(doc, "request_info/forwarded_for", header(FORWARDED_FOR_HEADER))?;
    set_lenient(doc, "request_info/user_agent", header("user-agent"))?;
    set_lenient(doc, "request_info/referer", header("referer"))?;

    let query: String = request
        .query_string()
        .unwrap_or_default()
        .chars()
        .take(limit)
        .collect();
    set_lenient(doc, "request_info/query_string", &query)?;
    Ok(())
}

/// Write every `(path, text)` pair, or nothing if any path prefix is ambiguous
fn write_subtree(doc: &mut Document, writes: &[(&str, String)]) -> DomResult<()> {
    let root = doc.root();
    let mut paths = Vec::with_capacity(writes.len());
    for (path, _) in writes {
        let path: DomPath = path.parse()?;
        for end in 1..=path.len() {
            let prefix = DomPath::new(path.steps()[..end].to_vec())?;
            doc.get_1e(root, &prefix)?;
        }
        paths.push(path);
    }
    for (path, (_, text)) in paths.iter().zip(writes) {
        let node = doc.get_create_1e(root, path)?;
        doc.set_text(node, text.as_str());
    }
    Ok(())
}

fn record_skip(subtree: &'static str, error: &DomError, skipped: &AtomicU64) {
    tracing::warn!(subtree, error = %error, "system document refresh skipped");
    metrics::counter!(REFRESH_SKIPPED_METRIC, "subtree" => subtree).increment(1);
    skipped.fetch_add(1, Ordering::Relaxed);
}

fn refresh_state(doc: &mut Document, stack: &ModuleCallStack, skipped: &AtomicU64) {
    let Some(state) = stack.top_call().and_then(|c| c.current_state()) else {
        return;
    };
    let writes = [
        ("state/name", state.name().to_string()),
        ("state/title", state.title().to_string()),
    ];
    if let Err(e) = write_subtree(doc, &writes) {
        record_skip("state", &e, skipped);
    }
}

fn refresh_module(doc: &mut Document, stack: &ModuleCallStack, skipped: &AtomicU64) {
    let Some(call) = stack.top_call() else {
        return;
    };
    let module = call.module();
    let (previous_name, previous_title) = match stack.previous_module() {
        Some(previous) => (previous.name().to_string(), previous.title().to_string()),
        None => (String::new(), START_TITLE.to_string()),
    };
    let writes = [
        ("module/name", module.name().to_string()),
        ("module/title", module.title().to_string()),
        ("module/application-title", module.application_title().to_string()),
        ("thread/call_id", call.call_id().to_string()),
        ("previous_module/name", previous_name),
        ("previous_module/title", previous_title),
        ("theme/name", call.entry_theme().to_string()),
    ];
    if let Err(e) = write_subtree(doc, &writes) {
        record_skip("module", &e, skipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Module, StateDefinition};
    use crate::sysdoc::host::BaseUriBuilder;
    use std::io;

    struct NoHost;

    impl HostResolver for NoHost {
        fn hostname(&self) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no host"))
        }

        fn address(&self) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no host"))
        }
    }

    fn handler(stack: &mut ModuleCallStack) -> SysDomHandler {
        let uri = BaseUriBuilder::new("https://apps.example.com").unwrap();
        SysDomHandler::create(
            &ThreadInfo::new("ref1", "APP", "t1", "s1"),
            &EngineConfig::default().with_services("upload, download"),
            &NoHost,
            &uri,
            stack,
        )
        .unwrap()
    }

    #[test]
    fn create_writes_static_subtrees() {
        let mut stack = ModuleCallStack::new();
        let sys = handler(&mut stack);
        assert_eq!(sys.text("thread/ref").as_deref(), Some("ref1"));
        assert_eq!(sys.text("engine/status").as_deref(), Some("DEVELOPMENT"));
        assert_eq!(sys.count("engine/fox_service_list/fox_service"), 2);
        assert_eq!(sys.text("host/hostname").as_deref(), Some("unknown"));
        assert_eq!(sys.text("host/address").as_deref(), Some("unknown"));
        assert_eq!(
            sys.text("portal_urls/engine_url").as_deref(),
            Some("https://apps.example.com/fox")
        );
        assert_eq!(sys.count("module"), 0);
        assert_eq!(sys.count("state"), 0);
    }

    #[test]
    fn ambiguous_module_subtree_is_skipped_whole() {
        let mut stack = ModuleCallStack::new();
        let sys = handler(&mut stack);
        {
            let mut doc = sys.doc.lock();
            let root = doc.root();
            doc.add_element(root, "theme");
            doc.add_element(root, "theme");
        }

        let module = Module::new("a")
            .with_state(StateDefinition::new("s1", "S1"))
            .unwrap();
        stack.push_module(Arc::new(module), "blue");

        assert_eq!(sys.skipped_refreshes(), 1);
        assert_eq!(sys.count("module"), 0);
        assert_eq!(sys.text("state/name").as_deref(), Some("s1"));
    }

    #[test]
    fn handler_contract() {
        let mut stack = ModuleCallStack::new();
        let sys = handler(&mut stack);
        let contract: &dyn DomHandler = &sys;
        assert_eq!(contract.context_label(), ContextLabel::Sys);
        assert!(!contract.is_transient());
        assert_eq!(contract.load_precedence(), LoadPrecedence::Medium);
        contract.close().unwrap();
        assert_eq!(sys.text("thread/ref").as_deref(), Some("ref1"));
    }

    #[test]
    fn dropped_handler_releases_document() {
        let mut stack = ModuleCallStack::new();
        let sys = handler(&mut stack);
        let weak = Arc::downgrade(&sys.doc);
        drop(sys);
        assert!(weak.upgrade().is_none());

        stack.push_module(Arc::new(Module::new("after")), "default");
        assert_eq!(stack.top_call().map(|c| c.module().name()), Some("after"));
    }

    #[test]
    fn detach_stops_following_stack() {
        let mut stack = ModuleCallStack::new();
        let sys = handler(&mut stack);
        assert!(sys.detach(&mut stack));
        assert!(!sys.detach(&mut stack));
        stack.push_module(Arc::new(Module::new("ignored")), "default");
        assert_eq!(sys.count("module"), 0);
    }

    #[test]
    fn add_info_rejects_ambiguous_path() {
        let mut stack = ModuleCallStack::new();
        let sys = handler(&mut stack);
        sys.add_info("custom/flag", "Y").unwrap();
        assert_eq!(sys.text("custom/flag").as_deref(), Some("Y"));

        {
            let mut doc = sys.doc.lock();
            let root = doc.root();
            doc.add_element(root, "custom");
        }
        let err = sys.add_info("custom/flag", "N").unwrap_err();
        assert!(matches!(err, EngineError::Internal { ref message, .. } if message.contains("custom/flag")));
    }
}
