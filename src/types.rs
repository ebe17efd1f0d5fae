//! Core types shared by the bridge, the session layer and backends.
//!
//! - [`SessionId`], [`ViewId`] - identifiers handed out by the external framework
//! - [`Handling`] - how a subscription delivers its notifications
//! - [`ViewInfo`], [`ViewRegistry`], [`JoinedViews`] - joined-view bookkeeping
//! - [`events`] - well-known event names exchanged with the model side

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identifier of a joined session. Also the scope of session-wide events.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identifier of the current client's connection (its "view").
///
/// Also the scope of view-local events such as `synced` and `detached`.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViewId(String);

impl ViewId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// =============================================================================
// DELIVERY
// =============================================================================

/// How notifications for a subscription are delivered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Handling {
    /// Deliver synchronously, once per notification.
    #[default]
    Immediate,
    /// Deliver at most once per frame, with the latest payload.
    OncePerFrame,
}

// =============================================================================
// VIEWS
// =============================================================================

/// A joined view as seen by the model side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewInfo {
    pub view_id: ViewId,
    /// Optional application data supplied when the view joined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view_data: Option<Value>,
}

impl ViewInfo {
    pub fn new(view_id: ViewId) -> Self {
        Self { view_id, view_data: None }
    }
}

/// Joined views keyed by id, as tracked by a model that opts into view tracking.
pub type ViewRegistry = BTreeMap<ViewId, ViewInfo>;

/// Snapshot of the joined views handed to UI components.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct JoinedViews {
    pub views: Vec<ViewId>,
    pub view_count: usize,
}

impl From<&ViewRegistry> for JoinedViews {
    fn from(registry: &ViewRegistry) -> Self {
        Self {
            views: registry.keys().cloned().collect(),
            view_count: registry.len(),
        }
    }
}

// =============================================================================
// EVENT NAMES
// =============================================================================

/// Event names exchanged between the model side and the bindings.
pub mod events {
    /// Coarse "something in the model changed" signal, published on the
    /// session scope after every model handler and future.
    pub const STATE_UPDATED: &str = "state-updated";
    /// Published on the session scope when the joined-view registry changes.
    pub const VIEWS_UPDATED: &str = "views-updated";
    /// A view joined. Reserved: models override `handle_view_join` instead.
    pub const VIEW_JOIN: &str = "view-join";
    /// A view left. Reserved: models override `handle_view_exit` instead.
    pub const VIEW_EXIT: &str = "view-exit";
    /// View scope, payload `bool`: the view caught up with (or fell behind) the session.
    pub const SYNCED: &str = "synced";
    /// View scope, no payload: the view was detached from the session.
    pub const DETACHED: &str = "detached";
    /// View scope, payload `f64`: one simulation cycle ran at the given time.
    pub const UPDATE: &str = "update";
}

// =============================================================================
// Tests
// =============================================================================
