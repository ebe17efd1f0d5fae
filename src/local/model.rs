//! Model side of the local backend.
//!
//! Models react to events through plain `fn` handlers, never closures, so a
//! model's behavior is fully described by its data plus its code. Everything
//! a handler wants to do to the outside world goes through [`ModelContext`]
//! and is applied by the reflector once the handler returns.

use serde::Serialize;
use serde_json::Value;

use crate::error::SessionError;
use crate::types::{events, SessionId, ViewInfo, ViewRegistry};

/// Handler for an event the model subscribed to.
pub type ModelHandlerFn<M> = fn(&mut M, &Value, &mut ModelContext<M>);

/// Work scheduled with [`ModelContext::future`].
pub type FutureFn<M> = fn(&mut M, &mut ModelContext<M>);

/// A replicated root model.
pub trait Model: Sized + 'static {
    /// Called once when the session is created. Subscribe to events here.
    fn init(&mut self, _ctx: &mut ModelContext<Self>) -> Result<(), SessionError> {
        Ok(())
    }

    /// A view joined the session.
    fn handle_view_join(&mut self, _view: &ViewInfo, _ctx: &mut ModelContext<Self>) {}

    /// A view left the session.
    fn handle_view_exit(&mut self, _view: &ViewInfo, _ctx: &mut ModelContext<Self>) {}

    /// Registry kept up to date with joined views, for models that track them.
    fn views_mut(&mut self) -> Option<&mut ViewRegistry> {
        None
    }
}

pub(crate) struct ModelSubscription<M> {
    pub(crate) scope: String,
    pub(crate) event: String,
    pub(crate) handler: ModelHandlerFn<M>,
}

impl<M> ModelSubscription<M> {
    pub(crate) fn matches(&self, scope: &str, event: &str) -> bool {
        self.scope == scope && self.event == event
    }
}

/// What a model handler can ask of the session.
pub struct ModelContext<M> {
    session_id: SessionId,
    now: f64,
    pub(crate) subscriptions: Vec<ModelSubscription<M>>,
    pub(crate) unsubscriptions: Vec<(String, String)>,
    pub(crate) published: Vec<(String, String, Value)>,
    pub(crate) futures: Vec<(f64, FutureFn<M>)>,
}

impl<M> ModelContext<M> {
    pub(crate) fn new(session_id: SessionId, now: f64) -> Self {
        Self {
            session_id,
            now,
            subscriptions: Vec::new(),
            unsubscriptions: Vec::new(),
            published: Vec::new(),
            futures: Vec::new(),
        }
    }

    /// Run `handler` for every `event` published on `scope`.
    ///
    /// `view-join` and `view-exit` are delivered through
    /// [`Model::handle_view_join`] and [`Model::handle_view_exit`] and cannot
    /// be subscribed to directly.
    pub fn subscribe(
        &mut self,
        scope: &str,
        event: &str,
        handler: ModelHandlerFn<M>,
    ) -> Result<(), SessionError> {
        let reserved = match event {
            events::VIEW_JOIN => Some("handle_view_join"),
            events::VIEW_EXIT => Some("handle_view_exit"),
            _ => None,
        };
        if let Some(handler) = reserved {
            return Err(SessionError::ReservedEvent {
                event: event.to_string(),
                handler,
            });
        }

        self.subscriptions.push(ModelSubscription {
            scope: scope.to_string(),
            event: event.to_string(),
            handler,
        });
        Ok(())
    }

    /// Remove every handler for `(scope, event)`.
    pub fn unsubscribe(&mut self, scope: &str, event: &str) {
        self.subscriptions.retain(|sub| !sub.matches(scope, event));
        self.unsubscriptions.push((scope.to_string(), event.to_string()));
    }

    /// Publish an event to model and view subscribers.
    pub fn publish<T: Serialize + ?Sized>(
        &mut self,
        scope: &str,
        event: &str,
        data: &T,
    ) -> Result<(), SessionError> {
        let data = serde_json::to_value(data).map_err(|err| SessionError::Payload {
            scope: scope.to_string(),
            event: event.to_string(),
            reason: err.to_string(),
        })?;
        self.published.push((scope.to_string(), event.to_string(), data));
        Ok(())
    }

    /// Run `f` against the model `delay_ms` of session time from now.
    pub fn future(&mut self, delay_ms: f64, f: FutureFn<M>) {
        self.futures.push((delay_ms.max(0.0), f));
    }

    /// The session's id, also the scope of session-wide events.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Session time in milliseconds.
    pub fn now(&self) -> f64 {
        self.now
    }
}
