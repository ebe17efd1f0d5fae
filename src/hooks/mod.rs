//! Hooks - what components call inside [`SessionRoot::provide`](crate::SessionRoot::provide).
//!
//! Every hook resolves the nearest session context and fails with
//! [`SessionError::MissingContext`](crate::SessionError::MissingContext)
//! when there is none. Passive reads (watches, ids) treat "not joined" as a
//! normal state; imperative operations (publish, leave, change) return
//! [`SessionError::NoSession`](crate::SessionError::NoSession) instead.

mod events;
mod selector;
mod session;
mod views;

pub use events::{use_publish, use_subscribe, use_subscribe_with, EventSubscription, Publisher};
pub use selector::{use_model_by_id, use_model_root, use_model_selector, use_model_selector_with};
pub use session::{
    use_change_session, use_detach_callback, use_is_joined, use_leave_session, use_session,
    use_session_id, use_session_params, use_synced_callback, use_update_callback, use_view,
    use_view_id,
    CallbackGuard, ChangeSession, LeaveSession,
};
pub use views::use_joined_views;
