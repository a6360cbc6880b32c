//! Named context slots with scoped overlays
//!
//! A [`ContextStack`] maps a small set of [`ContextLabel`]s to document
//! positions. Every label points into the working document except `sys`,
//! which points into the thread's system document; a [`DocumentScope`]
//! resolves each label to its document during evaluation. [`ContextStack::localise`] opens an overlay frame
//! and returns a [`LocalisedContext`] guard; labels set through the guard are
//! restored to their prior values when the guard drops, on every exit path
//! including `?` returns and panics.

use crate::bind::BindExpr;
use crate::error::BindError;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};
use std::ops::{Deref, DerefMut};
use xflow_dom::{Document, NodeId};

/// Roles a document position can play during evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContextLabel {
    /// Root of the working document
    Root,
    /// Element that relative expressions are evaluated against
    Attach,
    /// Element currently being processed
    Item,
    /// Element an action was invoked on
    Action,
    /// Root of the system document
    Sys,
}

impl ContextLabel {
    /// Every label
    pub const ALL: [ContextLabel; 5] = [Self::Root, Self::Attach, Self::Item, Self::Action, Self::Sys];

    /// Label name as written in bind expressions (`:{item}`)
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Attach => "attach",
            Self::Item => "item",
            Self::Action => "action",
            Self::Sys => "sys",
        }
    }

    /// Look up a label by name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == name)
    }
}

impl Display for ContextLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Documents that context labels point into
pub trait DocumentScope {
    /// Document holding the position bound to `label`
    fn document(&self, label: ContextLabel) -> &Document;
}

impl DocumentScope for Document {
    #[inline]
    fn document(&self, _label: ContextLabel) -> &Document {
        self
    }
}

/// Working and system documents of one thread
#[derive(Debug, Clone, Copy)]
pub struct ThreadDocuments<'a> {
    working: &'a Document,
    sys: &'a Document,
}

impl<'a> ThreadDocuments<'a> {
    /// Pair a working document with a system document
    #[inline]
    #[must_use]
    pub fn new(working: &'a Document, sys: &'a Document) -> Self {
        Self { working, sys }
    }
}

impl DocumentScope for ThreadDocuments<'_> {
    fn document(&self, label: ContextLabel) -> &Document {
        match label {
            ContextLabel::Sys => self.sys,
            ContextLabel::Root | ContextLabel::Attach | ContextLabel::Item | ContextLabel::Action => {
                self.working
            }
        }
    }
}

#[derive(Debug)]
struct Frame {
    purpose: String,
    saved: Vec<(ContextLabel, Option<NodeId>)>,
}

/// Per-thread mapping of context labels to document positions
#[derive(Debug, Default)]
pub struct ContextStack {
    current: HashMap<ContextLabel, NodeId>,
    frames: Vec<Frame>,
}

impl ContextStack {
    /// Create an empty stack
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stack with `root` bound as both root and attach
    #[must_use]
    pub fn with_root(root: NodeId) -> Self {
        let mut stack = Self::new();
        stack.set(ContextLabel::Root, root);
        stack.set(ContextLabel::Attach, root);
        stack
    }

    /// Current position of a label
    #[inline]
    #[must_use]
    pub fn get(&self, label: ContextLabel) -> Option<NodeId> {
        self.current.get(&label).copied()
    }

    /// Current position of a label, failing if unset
    ///
    /// # Errors
    /// `BindError::LabelNotSet` if nothing is bound to the label
    pub fn require(&self, label: ContextLabel) -> Result<NodeId, BindError> {
        self.get(label).ok_or(BindError::LabelNotSet(label))
    }

    /// Bind a label
    ///
    /// Inside an open frame the label's prior value is recorded (once per
    /// frame) and restored when the frame closes.
    pub fn set(&mut self, label: ContextLabel, node: NodeId) {
        let previous = self.current.insert(label, node);
        if let Some(frame) = self.frames.last_mut() {
            if !frame.saved.iter().any(|(l, _)| *l == label) {
                frame.saved.push((label, previous));
            }
        }
    }

    /// Number of open frames
    #[inline]
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Purposes of the open frames, outermost first
    pub fn open_frames(&self) -> impl Iterator<Item = &str> {
        self.frames.iter().map(|f| f.purpose.as_str())
    }

    /// Every bound label, for comparison and diagnostics
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<ContextLabel, NodeId> {
        self.current.iter().map(|(l, n)| (*l, *n)).collect()
    }

    /// Open an overlay frame
    ///
    /// The frame closes when the returned guard drops.
    pub fn localise(&mut self, purpose: impl Into<String>) -> LocalisedContext<'_> {
        let purpose = purpose.into();
        tracing::debug!(purpose = %purpose, depth = self.frames.len() + 1, "localise context");
        self.frames.push(Frame {
            purpose: purpose.clone(),
            saved: Vec::new(),
        });
        LocalisedContext {
            stack: self,
            purpose,
        }
    }

    /// Run `f` inside an overlay frame
    pub fn with_localised<R>(
        &mut self,
        purpose: impl Into<String>,
        f: impl FnOnce(&mut ContextStack) -> R,
    ) -> R {
        let mut guard = self.localise(purpose);
        f(&mut *guard)
    }

    fn delocalise(&mut self, purpose: &str) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        debug_assert_eq!(frame.purpose, purpose, "context frames closed out of order");
        for (label, previous) in frame.saved.into_iter().rev() {
            match previous {
                Some(node) => self.current.insert(label, node),
                None => self.current.remove(&label),
            };
        }
        tracing::debug!(purpose, depth = self.frames.len(), "delocalise context");
    }

    /// Nodes selected by a bind expression
    ///
    /// # Errors
    /// `BindError::LabelNotSet` if the expression's label is unbound
    pub fn select(&self, docs: &dyn DocumentScope, expr: &BindExpr) -> Result<Vec<NodeId>, BindError> {
        let context = self.require(expr.label())?;
        Ok(docs.document(expr.label()).select(context, expr.path()))
    }

    /// String values selected by a bind expression
    ///
    /// # Errors
    /// `BindError::LabelNotSet` if the expression's label is unbound
    pub fn values(&self, docs: &dyn DocumentScope, expr: &BindExpr) -> Result<Vec<String>, BindError> {
        let context = self.require(expr.label())?;
        Ok(docs.document(expr.label()).select_values(context, expr.path()))
    }
}

/// Guard for an open overlay frame
///
/// Dereferences to the underlying [`ContextStack`]; dropping it restores every
/// label set since the frame opened.
#[derive(Debug)]
pub struct LocalisedContext<'a> {
    stack: &'a mut ContextStack,
    purpose: String,
}

impl LocalisedContext<'_> {
    /// Purpose the frame was opened for
    #[inline]
    #[must_use]
    pub fn purpose(&self) -> &str {
        &self.purpose
    }
}

impl Deref for LocalisedContext<'_> {
    type Target = ContextStack;

    fn deref(&self) -> &Self::Target {
        self.stack
    }
}

impl DerefMut for LocalisedContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.stack
    }
}

impl Drop for LocalisedContext<'_> {
    fn drop(&mut self) {
        self.stack.delocalise(&self.purpose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with_children() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new("root");
        let root = doc.root();
        let a = doc.add_element(root, "a");
        let b = doc.add_element(a, "b");
        (doc, a, b)
    }

    #[test]
    fn label_names_round_trip() {
        for label in ContextLabel::ALL {
            assert_eq!(ContextLabel::from_name(label.as_str()), Some(label));
        }
        assert_eq!(ContextLabel::from_name("theme"), None);
    }

    #[test]
    fn with_root_binds_root_and_attach() {
        let (doc, _, _) = doc_with_children();
        let ctx = ContextStack::with_root(doc.root());
        assert_eq!(ctx.get(ContextLabel::Root), Some(doc.root()));
        assert_eq!(ctx.get(ContextLabel::Attach), Some(doc.root()));
        assert_eq!(ctx.get(ContextLabel::Item), None);
    }

    #[test]
    fn guard_restores_on_drop() {
        let (doc, a, b) = doc_with_children();
        let mut ctx = ContextStack::with_root(doc.root());
        let before = ctx.snapshot();

        {
            let mut local = ctx.localise("test");
            local.set(ContextLabel::Attach, a);
            local.set(ContextLabel::Item, b);
            local.set(ContextLabel::Item, a);
            assert_eq!(local.get(ContextLabel::Attach), Some(a));
            assert_eq!(local.get(ContextLabel::Item), Some(a));
            assert_eq!(local.depth(), 1);
        }

        assert_eq!(ctx.snapshot(), before);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn nested_frames_restore_in_order() {
        let (doc, a, b) = doc_with_children();
        let mut ctx = ContextStack::with_root(doc.root());

        let mut outer = ctx.localise("outer");
        outer.set(ContextLabel::Item, a);
        {
            let mut inner = outer.localise("inner");
            inner.set(ContextLabel::Item, b);
            assert_eq!(inner.open_frames().collect::<Vec<_>>(), vec!["outer", "inner"]);
        }
        assert_eq!(outer.get(ContextLabel::Item), Some(a));
        drop(outer);
        assert_eq!(ctx.get(ContextLabel::Item), None);
    }

    #[test]
    fn set_outside_frame_is_permanent() {
        let (doc, a, _) = doc_with_children();
        let mut ctx = ContextStack::new();
        ctx.set(ContextLabel::Action, a);
        ctx.with_localised("noop", |_| ());
        assert_eq!(ctx.get(ContextLabel::Action), Some(a));
        let _ = doc;
    }

    #[test]
    fn sys_label_reads_system_document() {
        let (working, a, _) = doc_with_children();
        let mut sys = Document::new("sys");
        let sys_root = sys.root();
        let thread = sys.add_element(sys_root, "thread");
        sys.add_element_with_text(thread, "ref", "T-1");

        let mut ctx = ContextStack::with_root(working.root());
        ctx.set(ContextLabel::Attach, a);
        ctx.set(ContextLabel::Sys, sys_root);
        let docs = ThreadDocuments::new(&working, &sys);

        let sys_expr = BindExpr::parse(":{sys}/thread/ref").unwrap();
        assert_eq!(ctx.values(&docs, &sys_expr).unwrap(), vec!["T-1".to_string()]);
        let local = BindExpr::parse("./b").unwrap();
        assert_eq!(ctx.select(&docs, &local).unwrap().len(), 1);
        assert_eq!(ctx.select(&working, &sys_expr).unwrap().len(), 0);
    }

    #[test]
    fn require_reports_unset_label() {
        let ctx = ContextStack::new();
        assert_eq!(
            ctx.require(ContextLabel::Item),
            Err(BindError::LabelNotSet(ContextLabel::Item))
        );
    }

    #[test]
    fn early_return_still_restores() {
        fn failing(ctx: &mut ContextStack, node: NodeId) -> Result<(), BindError> {
            let mut local = ctx.localise("failing");
            local.set(ContextLabel::Item, node);
            local.require(ContextLabel::Action)?;
            Ok(())
        }

        let (doc, a, _) = doc_with_children();
        let mut ctx = ContextStack::with_root(doc.root());
        assert!(failing(&mut ctx, a).is_err());
        assert_eq!(ctx.get(ContextLabel::Item), None);
        assert_eq!(ctx.depth(), 0);
    }
}
