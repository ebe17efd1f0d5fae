//! Re-render trigger - fingerprint-gated updates of a watched value.
//!
//! Holds the last accepted [`WatchState`] and a revision signal. Every
//! candidate value is fingerprinted; only a different fingerprint replaces
//! the state and bumps the revision, which re-runs whatever effect or derived
//! read it through [`RenderTrigger::track`].
//!
//! # Invariants
//!
//! 1. `state.fingerprint == fingerprint(state.value)`; both are replaced together.
//! 2. A candidate with the current fingerprint leaves the state `Rc` untouched,
//!    so downstream `Rc::ptr_eq` checks also see "no change".
//! 3. The revision increments by exactly 1 per accepted change.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use spark_signals::{signal, Signal};

use super::fingerprint::{fingerprint, Fingerprint};

/// The value a component currently renders, with its fingerprint.
pub struct WatchState<R> {
    value: Option<Rc<R>>,
    fingerprint: Option<Fingerprint>,
}

impl<R> WatchState<R> {
    /// The "no session" state.
    pub fn unavailable() -> Self {
        Self {
            value: None,
            fingerprint: None,
        }
    }

    pub fn value(&self) -> Option<&Rc<R>> {
        self.value.as_ref()
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.fingerprint
    }

    pub fn is_available(&self) -> bool {
        self.value.is_some()
    }
}

impl<R: Hash> WatchState<R> {
    fn from_candidate(candidate: Option<R>) -> Self {
        let fingerprint = candidate.as_ref().map(|v| fingerprint(v));
        Self {
            value: candidate.map(Rc::new),
            fingerprint,
        }
    }
}

impl<R: fmt::Debug> fmt::Debug for WatchState<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchState")
            .field("value", &self.value)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Fingerprint-gated holder of one component's watched value.
pub struct RenderTrigger<R> {
    state: RefCell<Rc<WatchState<R>>>,
    revision: Signal<u64>,
    renders: Cell<u64>,
}

impl<R: Hash + 'static> RenderTrigger<R> {
    /// Create a trigger holding `initial`. The initial value is not a re-render.
    pub fn new(initial: Option<R>) -> Self {
        Self {
            state: RefCell::new(Rc::new(WatchState::from_candidate(initial))),
            revision: signal(0),
            renders: Cell::new(0),
        }
    }

    /// Offer a freshly computed value.
    ///
    /// Returns `true` if the fingerprint differed and a re-render was signaled.
    pub fn update(&self, candidate: Option<R>) -> bool {
        let next = candidate.as_ref().map(|v| fingerprint(v));
        if self.state.borrow().fingerprint == next {
            log::trace!("watched value unchanged ({:?}), re-render suppressed", next);
            return false;
        }

        *self.state.borrow_mut() = Rc::new(WatchState {
            value: candidate.map(Rc::new),
            fingerprint: next,
        });

        let revision = self.renders.get() + 1;
        self.renders.set(revision);
        self.revision.set(revision);
        true
    }
}

impl<R> RenderTrigger<R> {
    /// Current state without creating a reactive dependency.
    pub fn state(&self) -> Rc<WatchState<R>> {
        Rc::clone(&self.state.borrow())
    }

    /// Current state, registering the revision signal as a dependency of the
    /// running effect or derived.
    pub fn track(&self) -> Rc<WatchState<R>> {
        let _revision = self.revision.get();
        self.state()
    }

    /// Number of re-renders signaled so far.
    pub fn renders(&self) -> u64 {
        self.renders.get()
    }

    /// The revision signal, for hosts that want to bind it directly.
    pub fn revision_signal(&self) -> Signal<u64> {
        self.revision.clone()
    }
}

// =============================================================================
// Tests
// =============================================================================
