//! Session lifecycle: parameters, the per-root context and the root provider.

mod context;
mod params;
mod root;

pub use context::{context_depth, current_context, provide_context, SessionContext};
pub use params::{ChangeSessionParams, SessionParams};
pub use root::{RootPhase, SessionRoot};

pub(crate) use context::{current_core, SessionControl, SessionCore};
