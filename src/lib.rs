//! # spark-session
//!
//! Reactive bindings for replicated-model multiplayer sessions.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for fine-grained reactivity.
//!
//! ## Architecture
//!
//! A replicated-computation framework owns the shared model and tells every
//! client "something changed" with a coarse `state-updated` event. These
//! bindings turn that into fine-grained reactivity: each component selects
//! the slice it renders, and only a change in that slice re-runs its effects.
//!
//! ```text
//! Backend ──state-updated──► Subscription ──► FrameScheduler (once per frame)
//!                                                  │
//!                           selector(model) ◄──────┘
//!                                  │
//!                            fingerprint ──changed?──► revision signal ──► effects
//! ```
//!
//! A [`SessionRoot`] joins the session through a [`Connector`] and provides
//! its context to the hooks. The backend itself stays behind the traits in
//! [`backend`]; [`local`] is an in-process implementation for tests and demos.
//!
//! ## Modules
//!
//! - [`types`] - Identifiers, delivery modes, joined views, event names
//! - [`backend`] - The contract a replicated-computation framework fulfils
//! - [`bridge`] - Fingerprints, selectors, frame scheduling, watches
//! - [`session`] - Parameters, per-root context, the root provider
//! - [`hooks`] - What components call
//! - [`local`] - In-process backend

pub mod backend;
pub mod bridge;
pub mod error;
pub mod hooks;
pub mod local;
pub mod session;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use error::SessionError;

pub use backend::{
    Connector, EventHandler, HandlerId, Joined, ModelHandle, ModelLookup, Session, TracksViews,
    View,
};

pub use bridge::{
    evaluate, evaluate_partial, fingerprint, Fingerprint, FrameScheduler, ModelWatch,
    PartialSelector, RenderTrigger, Selector, Subscription, WatchMode, WatchOptions, WatchState,
};

pub use session::{
    current_context, provide_context, ChangeSessionParams, RootPhase, SessionContext,
    SessionParams, SessionRoot,
};

pub use hooks::{
    use_change_session, use_detach_callback, use_is_joined, use_joined_views, use_leave_session,
    use_model_by_id, use_model_root, use_model_selector, use_model_selector_with, use_publish,
    use_session, use_session_id, use_session_params, use_subscribe, use_subscribe_with,
    use_synced_callback, use_update_callback, use_view, use_view_id, CallbackGuard, ChangeSession,
    EventSubscription, LeaveSession, Publisher,
};

pub use local::{LocalConnector, LocalReflector, LocalSession, LocalView, Model, ModelContext};
