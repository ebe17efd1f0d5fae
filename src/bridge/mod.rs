//! Model-change detection and re-render bridge.
//!
//! ```text
//! model mutates ──► "state-updated" ──► Subscription ──► FrameScheduler
//!                                                            │ once per frame
//!                                                            ▼
//!                    RenderTrigger ◄── fingerprint ◄── evaluate(selector)
//!                         │ only if the fingerprint changed
//!                         ▼
//!                  revision signal ──► effects re-run
//! ```
//!
//! - [`fingerprint`] - structural content hash of a selected value
//! - [`selector`] - selector evaluation with the "no session" sentinel
//! - [`scheduler`] - per-frame coalescing and polling
//! - [`trigger`] - fingerprint-gated watch state and revision signal
//! - [`subscription`] - RAII listener on a view's event channel
//! - [`watch`] - the attach/detach state machine tying it together

pub mod fingerprint;
pub mod scheduler;
pub mod selector;
pub mod subscription;
pub mod trigger;
pub mod watch;

pub use fingerprint::{fingerprint, Fingerprint};
pub use scheduler::{FrameScheduler, FrameTask, TaskId};
pub use selector::{evaluate, evaluate_partial, PartialSelector, Selector};
pub use subscription::Subscription;
pub use trigger::{RenderTrigger, WatchState};
pub use watch::{ModelWatch, WatchCore, WatchMode, WatchOptions};
