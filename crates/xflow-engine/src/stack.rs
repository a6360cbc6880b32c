//! Module call stack with transition listeners
//!
//! Every push or pop notifies the registered listeners synchronously with the
//! kind of transition and the stack as it stands afterwards.

use crate::error::{EngineError, EngineResult};
use crate::module::{Module, StateDefinition};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Kind of change a listener is told about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackTransition {
    /// A module call was pushed or popped; the current state changed with it
    Module,
    /// The current state within the top module call changed
    State,
}

/// One entry on the call stack
#[derive(Debug, Clone)]
pub struct ModuleCall {
    call_id: Uuid,
    module: Arc<Module>,
    entry_theme: String,
    states: Vec<StateDefinition>,
}

impl ModuleCall {
    /// Unique id of this call
    #[inline]
    #[must_use]
    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// Module being run
    #[inline]
    #[must_use]
    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    /// Theme the module was entered with
    #[inline]
    #[must_use]
    pub fn entry_theme(&self) -> &str {
        &self.entry_theme
    }

    /// Current state, if any
    #[inline]
    #[must_use]
    pub fn current_state(&self) -> Option<&StateDefinition> {
        self.states.last()
    }

    /// Number of stacked states
    #[inline]
    #[must_use]
    pub fn state_depth(&self) -> usize {
        self.states.len()
    }
}

/// Handle returned by [`ModuleCallStack::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(StackTransition, &ModuleCallStack) + Send>;

/// Stack of module calls for one thread
#[derive(Default)]
pub struct ModuleCallStack {
    calls: Vec<ModuleCall>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl ModuleCallStack {
    /// Create an empty stack
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn register(
        &mut self,
        listener: impl FnMut(StackTransition, &ModuleCallStack) + Send + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener, returning whether it was registered
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(l, _)| *l != id);
        self.listeners.len() != before
    }

    /// Number of registered listeners
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Push a module call, entering its first declared state
    ///
    /// Returns the new call's id.
    pub fn push_module(&mut self, module: Arc<Module>, theme: impl Into<String>) -> Uuid {
        let call = ModuleCall {
            call_id: Uuid::new_v4(),
            states: module.entry_state().cloned().into_iter().collect(),
            module,
            entry_theme: theme.into(),
        };
        let call_id = call.call_id;
        tracing::debug!(module = call.module.name(), %call_id, "push module");
        self.calls.push(call);
        self.notify(StackTransition::Module);
        call_id
    }

    /// Pop the top module call
    ///
    /// # Errors
    /// `EngineError::EmptyStack` if there is no call
    pub fn pop_module(&mut self) -> EngineResult<ModuleCall> {
        let call = self.calls.pop().ok_or(EngineError::EmptyStack)?;
        tracing::debug!(module = call.module.name(), call_id = %call.call_id, "pop module");
        self.notify(StackTransition::Module);
        Ok(call)
    }

    /// Enter a state of the top module
    ///
    /// # Errors
    /// - `EngineError::EmptyStack` if there is no call
    /// - `EngineError::UnknownState` if the module declares no such state
    pub fn push_state(&mut self, name: &str) -> EngineResult<()> {
        let call = self.calls.last_mut().ok_or(EngineError::EmptyStack)?;
        let state = call.module.state(name)?.clone();
        tracing::debug!(module = call.module.name(), state = name, "push state");
        call.states.push(state);
        self.notify(StackTransition::State);
        Ok(())
    }

    /// Leave the current state of the top module
    ///
    /// # Errors
    /// - `EngineError::EmptyStack` if there is no call
    /// - `EngineError::NoActiveState` if the top call has no state
    pub fn pop_state(&mut self) -> EngineResult<StateDefinition> {
        let call = self.calls.last_mut().ok_or(EngineError::EmptyStack)?;
        let state = call
            .states
            .pop()
            .ok_or_else(|| EngineError::NoActiveState(call.module.name().to_string()))?;
        tracing::debug!(module = call.module.name(), state = state.name(), "pop state");
        self.notify(StackTransition::State);
        Ok(state)
    }

    /// Top module call
    #[inline]
    #[must_use]
    pub fn top_call(&self) -> Option<&ModuleCall> {
        self.calls.last()
    }

    /// Module of the call beneath the top
    #[must_use]
    pub fn previous_module(&self) -> Option<&Arc<Module>> {
        let len = self.calls.len();
        if len < 2 {
            return None;
        }
        self.calls.get(len - 2).map(ModuleCall::module)
    }

    /// Number of module calls
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Check if no module has been pushed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn notify(&mut self, transition: StackTransition) {
        // listeners only see `&self`, so none can be added while notifying
        let mut listeners = std::mem::take(&mut self.listeners);
        for (_, listener) in &mut listeners {
            listener(transition, self);
        }
        self.listeners = listeners;
    }
}

impl Debug for ModuleCallStack {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCallStack")
            .field("calls", &self.calls)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
