//! In-process backend.
//!
//! A single-process stand-in for the replicated-computation framework, used
//! by the tests and the demo. It implements the [`backend`](crate::backend)
//! traits with a deterministic event queue and session clock; there is no
//! network, no replication and no snapshotting.
//!
//! ```ignore
//! let connector = LocalConnector::new(|_| Counter::default());
//! let root = SessionRoot::new(SessionParams::new("app", "room"), connector.clone());
//! root.connect()?;
//! connector.pump_all();
//! root.flush_frame();
//! ```

mod connector;
mod model;
mod reflector;
mod view;

pub use connector::LocalConnector;
pub use model::{FutureFn, Model, ModelContext, ModelHandlerFn};
pub use reflector::LocalReflector;
pub use view::{LocalSession, LocalView};
