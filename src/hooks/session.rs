//! Session hooks - identifiers, parameters, lifecycle callbacks and the
//! imperative leave/change operations.
//!
//! The accessors read the context's attachment revision, so calling them
//! inside an effect re-runs it whenever the session is joined, detached,
//! re-synced, changed or left.

use std::fmt;
use std::rc::{Rc, Weak};

use crate::backend::{Session, View};
use crate::error::SessionError;
use crate::session::{current_core, ChangeSessionParams, SessionControl, SessionCore, SessionParams};
use crate::types::{SessionId, ViewId};

/// This client's view id, `None` while not joined.
pub fn use_view_id() -> Result<Option<ViewId>, SessionError> {
    let core = current_core("use_view_id")?;
    core.track();
    Ok(core.view_id())
}

/// The joined session's id, `None` before joining and after leaving.
pub fn use_session_id() -> Result<Option<SessionId>, SessionError> {
    let core = current_core("use_session_id")?;
    core.track();
    Ok(core.session_id())
}

/// The parameters of the current (or next) join.
pub fn use_session_params() -> Result<SessionParams, SessionError> {
    let core = current_core("use_session_params")?;
    core.track();
    Ok(core.params())
}

pub fn use_is_joined() -> Result<bool, SessionError> {
    let core = current_core("use_is_joined")?;
    core.track();
    Ok(core.view().is_some())
}

/// The backend's view, for calls the hooks do not cover. `None` while not
/// joined or detached.
pub fn use_view() -> Result<Option<Rc<dyn View>>, SessionError> {
    let core = current_core("use_view")?;
    core.track();
    Ok(core.view())
}

/// The backend's session handle. Survives a detach, gone after leaving.
pub fn use_session() -> Result<Option<Rc<dyn Session>>, SessionError> {
    let core = current_core("use_session")?;
    core.track();
    Ok(core.session())
}

// =============================================================================
// Imperative operations
// =============================================================================

/// Switches the nearest root to another session.
#[derive(Clone)]
pub struct ChangeSession {
    core: Rc<SessionCore>,
}

impl ChangeSession {
    /// Leave and rejoin with `change` merged over the current parameters.
    pub fn change(&self, change: ChangeSessionParams) -> Result<(), SessionError> {
        control(&self.core, "change_session")?.change_session(change)
    }
}

impl fmt::Debug for ChangeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSession").finish_non_exhaustive()
    }
}

/// Leaves the nearest root's session.
#[derive(Clone)]
pub struct LeaveSession {
    core: Rc<SessionCore>,
}

impl LeaveSession {
    pub fn leave(&self) -> Result<(), SessionError> {
        control(&self.core, "leave_session")?.leave_session()
    }
}

impl fmt::Debug for LeaveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaveSession").finish_non_exhaustive()
    }
}

fn control(core: &SessionCore, operation: &'static str) -> Result<Rc<dyn SessionControl>, SessionError> {
    core.control().ok_or(SessionError::NoSession { operation })
}

pub fn use_change_session() -> Result<ChangeSession, SessionError> {
    let core = current_core("use_change_session")?;
    Ok(ChangeSession { core })
}

pub fn use_leave_session() -> Result<LeaveSession, SessionError> {
    let core = current_core("use_leave_session")?;
    Ok(LeaveSession { core })
}

// =============================================================================
// Lifecycle callbacks
// =============================================================================

/// Keeps a lifecycle callback registered. Dropping it removes the callback.
pub struct CallbackGuard {
    core: Weak<SessionCore>,
    id: u64,
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        if let Some(core) = self.core.upgrade() {
            core.callbacks.remove(self.id);
        }
    }
}

impl fmt::Debug for CallbackGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CallbackGuard").field(&self.id).finish()
    }
}

/// Called with `true` when the view has caught up with the session, and
/// with whatever the backend reports on later sync changes.
pub fn use_synced_callback(callback: impl Fn(bool) + 'static) -> Result<CallbackGuard, SessionError> {
    let core = current_core("use_synced_callback")?;
    let id = core.callbacks.on_synced(Rc::new(callback));
    Ok(CallbackGuard {
        core: Rc::downgrade(&core),
        id,
    })
}

/// Called when the view loses its connection to the session.
pub fn use_detach_callback(callback: impl Fn() + 'static) -> Result<CallbackGuard, SessionError> {
    let core = current_core("use_detach_callback")?;
    let id = core.callbacks.on_detached(Rc::new(callback));
    Ok(CallbackGuard {
        core: Rc::downgrade(&core),
        id,
    })
}

/// Called with the session time on every view update.
pub fn use_update_callback(callback: impl Fn(f64) + 'static) -> Result<CallbackGuard, SessionError> {
    let core = current_core("use_update_callback")?;
    let id = core.callbacks.on_update(Rc::new(callback));
    Ok(CallbackGuard {
        core: Rc::downgrade(&core),
        id,
    })
}
