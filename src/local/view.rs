//! Client side of the local backend: views and sessions.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Weak;

use serde_json::Value;

use crate::backend::{EventHandler, HandlerId, Session, View};
use crate::types::{SessionId, ViewId, ViewInfo};

use super::reflector::{Envelope, Outbox};

struct ViewHandler {
    id: HandlerId,
    scope: String,
    event: String,
    handler: EventHandler,
}

/// A view connected to a [`LocalReflector`](super::LocalReflector).
///
/// Counts subscribe and unsubscribe calls so tests can check that listeners
/// are released symmetrically.
pub struct LocalView {
    info: ViewInfo,
    handlers: RefCell<Vec<ViewHandler>>,
    next_handler: Cell<u64>,
    detached: Cell<bool>,
    outbox: Weak<dyn Outbox>,
    subscribe_calls: Cell<u64>,
    unsubscribe_calls: Cell<u64>,
}

impl LocalView {
    pub(crate) fn new(info: ViewInfo, outbox: Weak<dyn Outbox>) -> Self {
        Self {
            info,
            handlers: RefCell::new(Vec::new()),
            next_handler: Cell::new(0),
            detached: Cell::new(false),
            outbox,
            subscribe_calls: Cell::new(0),
            unsubscribe_calls: Cell::new(0),
        }
    }

    pub fn info(&self) -> &ViewInfo {
        &self.info
    }

    /// Handlers currently installed.
    pub fn subscription_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    pub fn subscribe_calls(&self) -> u64 {
        self.subscribe_calls.get()
    }

    pub fn unsubscribe_calls(&self) -> u64 {
        self.unsubscribe_calls.get()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.get()
    }

    pub(crate) fn set_detached(&self, detached: bool) {
        self.detached.set(detached);
    }

    /// Run the handlers for `(scope, event)`.
    pub(crate) fn deliver(&self, scope: &str, event: &str, data: &Value) {
        // Handlers may subscribe or unsubscribe while running.
        let matching: Vec<EventHandler> = self
            .handlers
            .borrow()
            .iter()
            .filter(|h| h.scope == scope && h.event == event)
            .map(|h| h.handler.clone())
            .collect();
        for handler in matching {
            handler(data);
        }
    }
}

impl View for LocalView {
    fn view_id(&self) -> &ViewId {
        &self.info.view_id
    }

    fn subscribe(&self, scope: &str, event: &str, handler: EventHandler) -> HandlerId {
        self.subscribe_calls.set(self.subscribe_calls.get() + 1);
        let id = HandlerId::new(self.next_handler.get());
        self.next_handler.set(id.raw() + 1);
        self.handlers.borrow_mut().push(ViewHandler {
            id,
            scope: scope.to_string(),
            event: event.to_string(),
            handler,
        });
        id
    }

    fn unsubscribe(&self, _scope: &str, _event: &str, handler: HandlerId) {
        self.unsubscribe_calls.set(self.unsubscribe_calls.get() + 1);
        self.handlers.borrow_mut().retain(|h| h.id != handler);
    }

    fn publish(&self, scope: &str, event: &str, data: Value) {
        match self.outbox.upgrade() {
            Some(outbox) => outbox.enqueue(Envelope::Event {
                scope: scope.to_string(),
                event: event.to_string(),
                data,
            }),
            None => log::warn!("view {} published `{}` after its session ended", self.info.view_id, event),
        }
    }
}

impl fmt::Debug for LocalView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalView")
            .field("id", &self.info.view_id)
            .field("handlers", &self.subscription_count())
            .field("detached", &self.detached.get())
            .finish()
    }
}

/// A joined local session. Leaving removes the view from the reflector.
pub struct LocalSession {
    id: SessionId,
    view: ViewId,
    outbox: Weak<dyn Outbox>,
    left: Cell<bool>,
}

impl LocalSession {
    pub(crate) fn new(id: SessionId, view: ViewId, outbox: Weak<dyn Outbox>) -> Self {
        Self {
            id,
            view,
            outbox,
            left: Cell::new(false),
        }
    }

    pub fn has_left(&self) -> bool {
        self.left.get()
    }
}

impl Session for LocalSession {
    fn id(&self) -> &SessionId {
        &self.id
    }

    fn leave(&self) {
        if self.left.replace(true) {
            return;
        }
        if let Some(outbox) = self.outbox.upgrade() {
            outbox.remove_view(&self.view);
        }
    }
}

impl fmt::Debug for LocalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSession")
            .field("id", &self.id)
            .field("view", &self.view)
            .field("left", &self.left.get())
            .finish()
    }
}
