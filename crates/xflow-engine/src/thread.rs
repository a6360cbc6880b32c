//! Engine thread: the per-session owner of context, call stack and documents

use crate::config::EngineConfig;
use crate::context::{ContextStack, ThreadDocuments};
use crate::database::DatabaseConnection;
use crate::error::{EngineError, EngineResult};
use crate::handler::DomHandler;
use crate::lob::LobValue;
use crate::module::{Module, StateDefinition};
use crate::stack::{ModuleCall, ModuleCallStack};
use crate::storage::{StorageLocationDefinition, UploadInfo};
use crate::sysdoc::{HostResolver, RequestInfo, SysDomHandler, ThreadInfo, UriBuilder};
use std::sync::Arc;
use uuid::Uuid;
use xflow_dom::{Document, NodeId};

/// Root element of a thread's working document
pub const WORKING_ROOT: &str = "root";

/// One logical thread of control
///
/// Everything here is owned by the thread and never shared with another.
#[derive(Debug)]
pub struct EngineThread {
    info: ThreadInfo,
    config: EngineConfig,
    document: Document,
    context: ContextStack,
    stack: ModuleCallStack,
    sys: SysDomHandler,
}

impl EngineThread {
    /// Start a thread with an empty working document and call stack
    ///
    /// # Errors
    /// Any error from [`SysDomHandler::create`]
    pub fn start(
        info: ThreadInfo,
        config: EngineConfig,
        host: &dyn HostResolver,
        uri: &dyn UriBuilder,
    ) -> EngineResult<Self> {
        let document = Document::new(WORKING_ROOT);
        let mut stack = ModuleCallStack::new();
        let sys = SysDomHandler::create(&info, &config, host, uri, &mut stack)?;
        let mut context = ContextStack::with_root(document.root());
        context.set(sys.context_label(), sys.root());
        tracing::info!(thread = %info.thread_id, app = %info.app_mnem, "engine thread started");
        Ok(Self {
            info,
            config,
            document,
            context,
            stack,
            sys,
        })
    }

    /// Per-request refresh of every document handler
    ///
    /// # Errors
    /// Any error from [`EngineThread::run_request`]
    pub fn churn(
        &mut self,
        request: &RequestInfo,
        uri: &dyn UriBuilder,
        conn: &mut dyn DatabaseConnection,
    ) -> EngineResult<()> {
        self.run_request(request, uri, conn, |_, _| Ok(()))
    }

    /// Run `work` for one request between opening and closing the handlers
    ///
    /// Handlers open in [`LoadPrecedence`](crate::handler::LoadPrecedence)
    /// order and close in reverse. Every handler that opened is closed, even
    /// when a later one fails to open or `work` fails.
    ///
    /// # Errors
    /// The first open failure, else the error from `work`, else the first
    /// close failure
    pub fn run_request<R>(
        &mut self,
        request: &RequestInfo,
        uri: &dyn UriBuilder,
        conn: &mut dyn DatabaseConnection,
        work: impl FnOnce(&mut Self, &mut dyn DatabaseConnection) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let _span = tracing::debug_span!("request", thread = %self.info.thread_id).entered();

        let mut opened = 0usize;
        let mut open_result = Ok(());
        for handler in self.handlers() {
            if let Err(e) = handler.open(request, uri, conn) {
                tracing::error!(label = %handler.context_label(), error = %e, "handler failed to open");
                open_result = Err(e);
                break;
            }
            tracing::trace!(
                label = %handler.context_label(),
                precedence = %handler.load_precedence(),
                "handler opened"
            );
            opened += 1;
        }

        let outcome = match open_result {
            Ok(()) => work(self, conn),
            Err(e) => Err(e),
        };

        let mut close_error = None;
        for handler in self.handlers()[..opened].iter().rev() {
            if let Err(e) = handler.close() {
                tracing::warn!(label = %handler.context_label(), error = %e, "handler failed to close");
                close_error.get_or_insert(e);
            }
        }

        match (outcome, close_error) {
            (Ok(value), None) => Ok(value),
            (Ok(_), Some(e)) | (Err(e), _) => Err(e),
        }
    }

    /// Document handlers in open order
    fn handlers(&self) -> Vec<&dyn DomHandler> {
        let mut handlers: Vec<&dyn DomHandler> = vec![&self.sys];
        handlers.sort_by_key(|h| h.load_precedence());
        handlers
    }

    /// Run `f` with the context labels and every labelled document
    pub fn with_documents<R>(
        &mut self,
        f: impl FnOnce(&mut ContextStack, &ThreadDocuments<'_>) -> R,
    ) -> R {
        let Self {
            document,
            context,
            sys,
            ..
        } = self;
        sys.with_document(|sys_doc| f(context, &ThreadDocuments::new(document, sys_doc)))
    }

    /// Call a module
    pub fn enter_module(&mut self, module: Arc<Module>, theme: impl Into<String>) -> Uuid {
        self.stack.push_module(module, theme)
    }

    /// Return from the current module
    ///
    /// # Errors
    /// `EngineError::EmptyStack` if no module is running
    pub fn exit_module(&mut self) -> EngineResult<ModuleCall> {
        self.stack.pop_module()
    }

    /// Enter a state of the current module
    ///
    /// # Errors
    /// Any error from [`ModuleCallStack::push_state`]
    pub fn enter_state(&mut self, name: &str) -> EngineResult<()> {
        self.stack.push_state(name)
    }

    /// Leave the current state
    ///
    /// # Errors
    /// Any error from [`ModuleCallStack::pop_state`]
    pub fn exit_state(&mut self) -> EngineResult<StateDefinition> {
        self.stack.pop_state()
    }

    /// Read the file previously uploaded into `target`
    ///
    /// # Errors
    /// Unknown location, bind failure or database failure
    pub fn download(
        &mut self,
        location: &str,
        target: NodeId,
        conn: &mut dyn DatabaseConnection,
    ) -> EngineResult<Option<LobValue>> {
        let definition = self.storage_location(location)?;
        let mut working =
            self.with_documents(|ctx, docs| definition.create_working_for_download(ctx, docs, target))?;
        let lob = working.fetch(conn)?.cloned();
        Ok(lob)
    }

    /// Store an uploaded file and record its metadata under `target`
    ///
    /// Returns rows affected.
    ///
    /// # Errors
    /// Unknown or non-upload location, bind failure or database failure
    pub fn upload(
        &mut self,
        location: &str,
        target: NodeId,
        info: UploadInfo,
        content: Vec<u8>,
        conn: &mut dyn DatabaseConnection,
    ) -> EngineResult<u64> {
        let definition = self.storage_location(location)?;
        let mut working =
            self.with_documents(|ctx, docs| definition.create_working_upload(ctx, docs, target, info))?;
        let rows = working.store(conn, content)?;
        working.record_metadata(&mut self.document)?;
        Ok(rows)
    }

    fn storage_location(&self, name: &str) -> EngineResult<Arc<StorageLocationDefinition>> {
        self.stack
            .top_call()
            .ok_or(EngineError::EmptyStack)?
            .module()
            .storage_location(name)
    }

    /// Thread identity
    #[inline]
    #[must_use]
    pub fn info(&self) -> &ThreadInfo {
        &self.info
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Working document
    #[inline]
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Working document, mutably
    #[inline]
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Context labels
    #[inline]
    #[must_use]
    pub fn context(&self) -> &ContextStack {
        &self.context
    }

    /// Context labels, mutably
    #[inline]
    pub fn context_mut(&mut self) -> &mut ContextStack {
        &mut self.context
    }

    /// Module call stack
    #[inline]
    #[must_use]
    pub fn call_stack(&self) -> &ModuleCallStack {
        &self.stack
    }

    /// System document
    #[inline]
    #[must_use]
    pub fn sys(&self) -> &SysDomHandler {
        &self.sys
    }
}
