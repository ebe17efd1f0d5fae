//! Session root - joins, tracks and leaves one session.
//!
//! The root is the provider half of the bindings. It owns the connector,
//! drives the join, listens for the view's lifecycle events and publishes
//! whatever is currently attached into its [`SessionContext`]:
//!
//! ```text
//! Idle ──connect()──► Joining ──join ok──► Joined ──leave()──► Left
//!   ▲                    │                   │  ▲                │
//!   └──── join failed ───┘        detached   │  │ synced(true)   │
//!                                            ▼  │                │
//!                                  (view + model hidden)         │
//!                                                                │
//!                            connect() / change_session() ◄──────┘
//! ```
//!
//! Component code runs inside [`SessionRoot::provide`] so hooks can find the
//! context. Dropping the root leaves the session.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;
use spark_signals::flush_sync;

use crate::backend::{Connector, EventHandler, Joined};
use crate::bridge::Subscription;
use crate::error::SessionError;
use crate::types::{events, Handling, SessionId, ViewId};

use super::context::{provide_context, SessionContext, SessionControl};
use super::params::{ChangeSessionParams, SessionParams};

/// Where a root is in its session lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RootPhase {
    #[default]
    Idle,
    Joining,
    Joined,
    Left,
}

struct RootInner<M> {
    me: Weak<RootInner<M>>,
    ctx: SessionContext<M>,
    connector: Box<dyn Connector<M>>,
    phase: Cell<RootPhase>,
    /// What the connector handed back, kept while the view is detached.
    joined: RefCell<Option<Joined<M>>>,
    lifecycle: RefCell<Vec<Subscription>>,
}

impl<M: 'static> RootInner<M> {
    fn connect(&self) -> Result<(), SessionError> {
        if matches!(self.phase.get(), RootPhase::Joining | RootPhase::Joined) {
            return Ok(());
        }

        let params = self.ctx.params();
        params.validate()?;

        self.phase.set(RootPhase::Joining);
        log::info!("joining session `{}` of `{}`", params.name, params.app_id);

        let joined = match self.connector.join(&params) {
            Ok(joined) => joined,
            Err(err) => {
                self.phase.set(RootPhase::Idle);
                log::warn!("join of `{}` failed: {}", params.name, err);
                return Err(err);
            }
        };

        self.install(joined);
        self.phase.set(RootPhase::Joined);
        flush_sync();
        Ok(())
    }

    fn install(&self, joined: Joined<M>) {
        let scope = joined.view.view_id().as_str().to_string();
        let scheduler = self.ctx.scheduler();

        let on_synced: EventHandler = {
            let me = self.me.clone();
            Rc::new(move |payload: &Value| {
                if let Some(root) = me.upgrade() {
                    root.on_synced(payload.as_bool().unwrap_or(true));
                }
            })
        };
        let on_detached: EventHandler = {
            let me = self.me.clone();
            Rc::new(move |_: &Value| {
                if let Some(root) = me.upgrade() {
                    root.on_detached();
                }
            })
        };
        let on_update: EventHandler = {
            let me = self.me.clone();
            Rc::new(move |payload: &Value| {
                if let Some(root) = me.upgrade() {
                    root.ctx.core.callbacks.emit_update(payload.as_f64().unwrap_or_default());
                }
            })
        };

        let lifecycle = vec![
            Subscription::attach(&joined.view, &scope, events::SYNCED, Handling::Immediate, &scheduler, on_synced),
            Subscription::attach(&joined.view, &scope, events::DETACHED, Handling::Immediate, &scheduler, on_detached),
            Subscription::attach(&joined.view, &scope, events::UPDATE, Handling::Immediate, &scheduler, on_update),
        ];
        let previous = self.lifecycle.replace(lifecycle);
        drop(previous);

        log::info!(
            "joined session {} as view {}",
            joined.session.id(),
            joined.view.view_id()
        );
        *self.joined.borrow_mut() = Some(joined.clone());
        self.ctx.attach(&joined);
    }

    fn on_synced(&self, synced: bool) {
        if synced && !self.ctx.is_joined() {
            let joined = self.joined.borrow().clone();
            if let Some(joined) = joined {
                log::info!("view {} re-synced", joined.view.view_id());
                self.ctx.attach(&joined);
                flush_sync();
            }
        }
        self.ctx.core.callbacks.emit_synced(synced);
    }

    fn on_detached(&self) {
        if self.ctx.is_joined() {
            log::info!("view detached from session {:?}", self.ctx.session_id());
            self.ctx.detach_view();
            flush_sync();
        }
        self.ctx.core.callbacks.emit_detached();
    }

    fn leave(&self) -> Result<(), SessionError> {
        if !matches!(self.phase.get(), RootPhase::Joined) {
            return Err(SessionError::NoSession {
                operation: "leave_session",
            });
        }

        let lifecycle = self.lifecycle.take();
        drop(lifecycle);
        let joined = self.joined.borrow_mut().take();

        // Retract the context before the session goes away.
        self.ctx.clear();
        flush_sync();
        self.phase.set(RootPhase::Left);

        if let Some(joined) = joined {
            let id = joined.session.id().clone();
            joined.session.leave();
            log::info!("left session {}", id);
        }
        Ok(())
    }

    fn change_session(&self, change: ChangeSessionParams) -> Result<(), SessionError> {
        if !matches!(self.phase.get(), RootPhase::Joined) {
            return Err(SessionError::NoSession {
                operation: "change_session",
            });
        }

        let next = self.ctx.params().merged(&change);
        next.validate()?;
        log::info!("changing session to `{}`", next.name);

        self.leave()?;
        self.ctx.core.set_params(next);
        self.connect()
    }
}

impl<M: 'static> SessionControl for RootInner<M> {
    fn change_session(&self, change: ChangeSessionParams) -> Result<(), SessionError> {
        RootInner::change_session(self, change)
    }

    fn leave_session(&self) -> Result<(), SessionError> {
        self.leave()
    }
}

/// Provider that joins a session and supplies it to hooks.
pub struct SessionRoot<M: 'static> {
    inner: Rc<RootInner<M>>,
}

impl<M: 'static> SessionRoot<M> {
    /// Create an idle root. Nothing is joined until [`connect`](Self::connect).
    pub fn new(params: SessionParams, connector: impl Connector<M> + 'static) -> Self {
        let inner = Rc::new_cyclic(|me| RootInner {
            me: me.clone(),
            ctx: SessionContext::new(params),
            connector: Box::new(connector),
            phase: Cell::new(RootPhase::Idle),
            joined: RefCell::new(None),
            lifecycle: RefCell::new(Vec::new()),
        });

        let control: Rc<dyn SessionControl> = inner.clone();
        inner.ctx.core.set_control(Rc::downgrade(&control));

        Self { inner }
    }

    /// Join the session. A no-op while already joining or joined.
    pub fn connect(&self) -> Result<(), SessionError> {
        self.inner.connect()
    }

    /// Leave the session. Watches fall back to the "no session" sentinel
    /// before the backend is told.
    pub fn leave(&self) -> Result<(), SessionError> {
        self.inner.leave()
    }

    /// Leave and rejoin with `change` merged over the current parameters.
    pub fn change_session(&self, change: ChangeSessionParams) -> Result<(), SessionError> {
        self.inner.change_session(change)
    }

    /// Run component code with this root's context current.
    pub fn provide<T>(&self, f: impl FnOnce() -> T) -> T {
        provide_context(&self.inner.ctx, f)
    }

    pub fn context(&self) -> SessionContext<M> {
        self.inner.ctx.clone()
    }

    /// End-of-frame work: coalesced recomputes, once-per-frame deliveries and
    /// polling watches. Call once per rendered frame. Returns the number of
    /// tasks that ran.
    pub fn flush_frame(&self) -> usize {
        flush_sync();
        let ran = self.inner.ctx.scheduler().flush();
        flush_sync();
        ran
    }

    pub fn phase(&self) -> RootPhase {
        self.inner.phase.get()
    }

    pub fn is_joined(&self) -> bool {
        self.inner.ctx.is_joined()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.ctx.session_id()
    }

    pub fn view_id(&self) -> Option<ViewId> {
        self.inner.ctx.view_id()
    }

    pub fn params(&self) -> SessionParams {
        self.inner.ctx.params()
    }
}

impl<M: 'static> Drop for SessionRoot<M> {
    fn drop(&mut self) {
        if self.inner.phase.get() == RootPhase::Joined {
            if let Err(err) = self.inner.leave() {
                log::warn!("leaving on drop failed: {}", err);
            }
        }
    }
}

impl<M: 'static> fmt::Debug for SessionRoot<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRoot")
            .field("phase", &self.phase())
            .field("context", &self.inner.ctx)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
