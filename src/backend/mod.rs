//! Backend contract - the external replicated-computation framework.
//!
//! The bindings never talk to a concrete framework. A backend supplies:
//!
//! - a [`Connector`] that joins a session and hands back a [`Joined`] triple
//! - a [`Session`] that can be left
//! - a [`View`], the client's pub/sub endpoint into the session
//! - a [`ModelHandle`] to the replicated root model
//!
//! Models may additionally implement [`ModelLookup`] (sub-objects by id) and
//! [`TracksViews`] (joined-view registry) to unlock the matching hooks.
//!
//! # Event flow
//!
//! ```text
//! View::publish ──► reflector ──► model handlers ──► "state-updated" ──► View subscribers
//! ```
//!
//! Everything between `publish` and the subscribers is the framework's job.

mod model;

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::SessionError;
use crate::session::SessionParams;
use crate::types::{SessionId, ViewId, ViewRegistry};

pub use model::ModelHandle;

/// Identifies one handler registered through [`View::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Callback invoked with the payload of a delivered event.
pub type EventHandler = Rc<dyn Fn(&Value)>;

/// The client's connection to a session.
pub trait View {
    /// Connection identifier of this client.
    fn view_id(&self) -> &ViewId;

    /// Register `handler` for events published on `(scope, event)`.
    fn subscribe(&self, scope: &str, event: &str, handler: EventHandler) -> HandlerId;

    /// Remove a handler previously returned by [`subscribe`](View::subscribe).
    fn unsubscribe(&self, scope: &str, event: &str, handler: HandlerId);

    /// Publish an event into the session. Arguments are forwarded unchanged.
    fn publish(&self, scope: &str, event: &str, data: Value);
}

/// A joined session.
pub trait Session {
    fn id(&self) -> &SessionId;

    /// Leave the session. The view stops receiving events.
    fn leave(&self);
}

/// Everything a successful join hands back.
pub struct Joined<M> {
    pub session: Rc<dyn Session>,
    pub view: Rc<dyn View>,
    pub model: ModelHandle<M>,
}

impl<M> Clone for Joined<M> {
    fn clone(&self) -> Self {
        Self {
            session: Rc::clone(&self.session),
            view: Rc::clone(&self.view),
            model: self.model.clone(),
        }
    }
}

impl<M> fmt::Debug for Joined<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Joined")
            .field("session", self.session.id())
            .field("view", self.view.view_id())
            .finish()
    }
}

/// Joins sessions on behalf of a [`SessionRoot`](crate::session::SessionRoot).
pub trait Connector<M> {
    fn join(&self, params: &SessionParams) -> Result<Joined<M>, SessionError>;
}

/// Models that can look up sub-objects by identifier.
pub trait ModelLookup {
    type Entry;

    fn lookup(&self, id: &str) -> Option<Self::Entry>;
}

/// Models that keep a registry of joined views.
pub trait TracksViews {
    /// `None` when view tracking is disabled for this model.
    fn joined_views(&self) -> Option<&ViewRegistry>;
}
