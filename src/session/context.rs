//! Session context - per-root state that hooks resolve.
//!
//! A [`SessionRoot`](super::SessionRoot) owns one [`SessionContext`] and
//! makes it current with [`provide_context`] while component code runs.
//! Hooks look up the nearest context on a thread-local stack, the same way
//! components find their parent while they are being built.
//!
//! The context never owns the session. It only mirrors what the root has
//! attached, and every change of that attachment bumps a revision signal
//! so watches and subscriptions can follow along.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use spark_signals::{signal, Signal};

use crate::backend::{Joined, ModelHandle, Session, View};
use crate::bridge::FrameScheduler;
use crate::error::SessionError;
use crate::types::{SessionId, ViewId};

use super::params::{ChangeSessionParams, SessionParams};

// =============================================================================
// Lifecycle callbacks
// =============================================================================

/// Callbacks registered by components for session lifecycle events.
///
/// Stored per root, so two roots never see each other's callbacks.
#[derive(Default)]
pub(crate) struct LifecycleCallbacks {
    synced: RefCell<Vec<(u64, Rc<dyn Fn(bool)>)>>,
    detached: RefCell<Vec<(u64, Rc<dyn Fn()>)>>,
    update: RefCell<Vec<(u64, Rc<dyn Fn(f64)>)>>,
    next_id: Cell<u64>,
}

impl LifecycleCallbacks {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub(crate) fn on_synced(&self, callback: Rc<dyn Fn(bool)>) -> u64 {
        let id = self.next_id();
        self.synced.borrow_mut().push((id, callback));
        id
    }

    pub(crate) fn on_detached(&self, callback: Rc<dyn Fn()>) -> u64 {
        let id = self.next_id();
        self.detached.borrow_mut().push((id, callback));
        id
    }

    pub(crate) fn on_update(&self, callback: Rc<dyn Fn(f64)>) -> u64 {
        let id = self.next_id();
        self.update.borrow_mut().push((id, callback));
        id
    }

    pub(crate) fn remove(&self, id: u64) {
        self.synced.borrow_mut().retain(|(cb, _)| *cb != id);
        self.detached.borrow_mut().retain(|(cb, _)| *cb != id);
        self.update.borrow_mut().retain(|(cb, _)| *cb != id);
    }

    // Callbacks may register or remove callbacks, so the lists are cloned first.

    pub(crate) fn emit_synced(&self, synced: bool) {
        let callbacks: Vec<_> = self.synced.borrow().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback(synced);
        }
    }

    pub(crate) fn emit_detached(&self) {
        let callbacks: Vec<_> = self.detached.borrow().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback();
        }
    }

    pub(crate) fn emit_update(&self, time: f64) {
        let callbacks: Vec<_> = self.update.borrow().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback(time);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.synced.borrow().len() + self.detached.borrow().len() + self.update.borrow().len()
    }
}

/// Imperative session operations, implemented by the root.
pub(crate) trait SessionControl {
    fn change_session(&self, change: ChangeSessionParams) -> Result<(), SessionError>;
    fn leave_session(&self) -> Result<(), SessionError>;
}

// =============================================================================
// SessionCore - the model-independent half
// =============================================================================

pub(crate) struct SessionCore {
    session: RefCell<Option<Rc<dyn Session>>>,
    view: RefCell<Option<Rc<dyn View>>>,
    params: RefCell<SessionParams>,
    attachment: Signal<u64>,
    attachments: Cell<u64>,
    scheduler: FrameScheduler,
    pub(crate) callbacks: LifecycleCallbacks,
    control: RefCell<Option<Weak<dyn SessionControl>>>,
}

impl SessionCore {
    fn new(params: SessionParams) -> Self {
        Self {
            session: RefCell::new(None),
            view: RefCell::new(None),
            params: RefCell::new(params),
            attachment: signal(0),
            attachments: Cell::new(0),
            scheduler: FrameScheduler::new(),
            callbacks: LifecycleCallbacks::default(),
            control: RefCell::new(None),
        }
    }

    /// Register the attachment revision as a dependency of the running
    /// effect or derived.
    pub(crate) fn track(&self) {
        let _revision = self.attachment.get();
    }

    fn bump(&self) {
        let revision = self.attachments.get() + 1;
        self.attachments.set(revision);
        self.attachment.set(revision);
    }

    pub(crate) fn session(&self) -> Option<Rc<dyn Session>> {
        self.session.borrow().clone()
    }

    pub(crate) fn view(&self) -> Option<Rc<dyn View>> {
        self.view.borrow().clone()
    }

    pub(crate) fn session_id(&self) -> Option<SessionId> {
        self.session.borrow().as_ref().map(|s| s.id().clone())
    }

    pub(crate) fn view_id(&self) -> Option<ViewId> {
        self.view.borrow().as_ref().map(|v| v.view_id().clone())
    }

    pub(crate) fn params(&self) -> SessionParams {
        self.params.borrow().clone()
    }

    pub(crate) fn set_params(&self, params: SessionParams) {
        *self.params.borrow_mut() = params;
    }

    pub(crate) fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub(crate) fn control(&self) -> Option<Rc<dyn SessionControl>> {
        self.control.borrow().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_control(&self, control: Weak<dyn SessionControl>) {
        *self.control.borrow_mut() = Some(control);
    }
}

// =============================================================================
// SessionContext
// =============================================================================

/// Per-root state shared with hooks: session, view, root model, parameters,
/// frame scheduler and lifecycle callbacks.
///
/// Cloning creates a new handle to the **same** context.
pub struct SessionContext<M> {
    pub(crate) core: Rc<SessionCore>,
    model: Rc<RefCell<Option<ModelHandle<M>>>>,
}

impl<M> Clone for SessionContext<M> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
            model: Rc::clone(&self.model),
        }
    }
}

impl<M> fmt::Debug for SessionContext<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session", &self.core.session_id())
            .field("view", &self.core.view_id())
            .field("revision", &self.core.attachments.get())
            .finish()
    }
}

impl<M> SessionContext<M> {
    pub(crate) fn new(params: SessionParams) -> Self {
        Self {
            core: Rc::new(SessionCore::new(params)),
            model: Rc::new(RefCell::new(None)),
        }
    }

    /// Publish a freshly joined (or re-synced) session.
    pub(crate) fn attach(&self, joined: &Joined<M>) {
        *self.core.session.borrow_mut() = Some(Rc::clone(&joined.session));
        *self.core.view.borrow_mut() = Some(Rc::clone(&joined.view));
        *self.model.borrow_mut() = Some(joined.model.clone());
        self.core.bump();
    }

    /// The view lost its connection. The session is kept for re-sync.
    pub(crate) fn detach_view(&self) {
        *self.core.view.borrow_mut() = None;
        *self.model.borrow_mut() = None;
        self.core.bump();
    }

    /// Retract everything.
    pub(crate) fn clear(&self) {
        *self.core.session.borrow_mut() = None;
        *self.core.view.borrow_mut() = None;
        *self.model.borrow_mut() = None;
        self.core.bump();
    }

    /// Model, view and event scope of the current attachment. Untracked.
    pub(crate) fn attachment(&self) -> Option<(ModelHandle<M>, Rc<dyn View>, String)> {
        let model = self.model.borrow().clone()?;
        let view = self.core.view()?;
        let scope = self.core.session_id()?;
        Some((model, view, scope.as_str().to_string()))
    }

    /// The root model, if a session is attached. Untracked.
    pub fn model(&self) -> Option<ModelHandle<M>> {
        self.model.borrow().clone()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.core.session_id()
    }

    pub fn view_id(&self) -> Option<ViewId> {
        self.core.view_id()
    }

    pub fn params(&self) -> SessionParams {
        self.core.params()
    }

    /// Whether a view is currently attached.
    pub fn is_joined(&self) -> bool {
        self.core.view.borrow().is_some()
    }

    pub fn scheduler(&self) -> FrameScheduler {
        self.core.scheduler.clone()
    }

    /// How many times the attachment changed.
    pub fn revision(&self) -> u64 {
        self.core.attachments.get()
    }
}

// =============================================================================
// Context stack
// =============================================================================

struct ContextEntry {
    core: Rc<SessionCore>,
    context: Rc<dyn Any>,
}

thread_local! {
    /// Contexts made current by `provide_context`, innermost last.
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// Pops the entry pushed by `provide_context`, also on unwind.
struct ContextGuard;

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Run `f` with `ctx` as the current session context.
pub fn provide_context<M: 'static, T>(ctx: &SessionContext<M>, f: impl FnOnce() -> T) -> T {
    let entry = ContextEntry {
        core: Rc::clone(&ctx.core),
        context: Rc::new(ctx.clone()),
    };
    CONTEXT_STACK.with(|stack| stack.borrow_mut().push(entry));
    let _guard = ContextGuard;
    f()
}

/// Nearest context for a root of model type `M`.
pub fn current_context<M: 'static>(hook: &'static str) -> Result<SessionContext<M>, SessionError> {
    CONTEXT_STACK.with(|stack| {
        stack
            .borrow()
            .iter()
            .rev()
            .find_map(|entry| entry.context.downcast_ref::<SessionContext<M>>().cloned())
            .ok_or(SessionError::MissingContext { hook })
    })
}

/// Nearest context of any model type.
pub(crate) fn current_core(hook: &'static str) -> Result<Rc<SessionCore>, SessionError> {
    CONTEXT_STACK.with(|stack| {
        stack
            .borrow()
            .last()
            .map(|entry| Rc::clone(&entry.core))
            .ok_or(SessionError::MissingContext { hook })
    })
}

/// Number of contexts currently provided on this thread.
pub fn context_depth() -> usize {
    CONTEXT_STACK.with(|stack| stack.borrow().len())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Chat;
    struct Board;

    fn params() -> SessionParams {
        SessionParams::new("app", "room")
    }

    #[test]
    fn test_missing_context() {
        let err = current_context::<Chat>("use_thing").unwrap_err();
        assert_eq!(err, SessionError::MissingContext { hook: "use_thing" });
        assert!(current_core("use_thing").is_err());
    }

    #[test]
    fn test_nested_contexts_resolve_by_model_type() {
        let chat = SessionContext::<Chat>::new(params());
        let board = SessionContext::<Board>::new(params().with_name("board"));

        provide_context(&chat, || {
            provide_context(&board, || {
                assert_eq!(context_depth(), 2);
                assert_eq!(current_context::<Chat>("t").unwrap().params().name, "room");
                assert_eq!(current_context::<Board>("t").unwrap().params().name, "board");
                assert_eq!(current_core("t").unwrap().params().name, "board");
            });
            assert_eq!(context_depth(), 1);
            assert!(current_context::<Board>("t").is_err());
        });
        assert_eq!(context_depth(), 0);
    }

    #[test]
    fn test_stack_unwinds_on_panic() {
        let chat = SessionContext::<Chat>::new(params());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            provide_context(&chat, || -> () { panic!("component bug") });
        }));
        assert!(result.is_err());
        assert_eq!(context_depth(), 0);
    }

    #[test]
    fn test_lifecycle_callbacks() {
        let callbacks = LifecycleCallbacks::default();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_clone = seen.clone();
        let id = callbacks.on_synced(Rc::new(move |synced| seen_clone.borrow_mut().push(synced)));
        callbacks.emit_synced(true);
        callbacks.emit_synced(false);
        assert_eq!(*seen.borrow(), vec![true, false]);

        callbacks.remove(id);
        callbacks.emit_synced(true);
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(callbacks.len(), 0);
    }

    #[test]
    fn test_unattached_context() {
        let ctx = SessionContext::<Chat>::new(params());
        assert!(!ctx.is_joined());
        assert!(ctx.model().is_none());
        assert!(ctx.attachment().is_none());

        ctx.clear();
        assert_eq!(ctx.revision(), 1);
    }
}
