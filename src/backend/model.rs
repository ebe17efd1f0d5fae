//! Shared handle to the framework-owned root model.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Handle to the replicated root model.
///
/// The model is owned by the external framework. UI code only ever reads it
/// through [`read`](ModelHandle::read); mutations happen when the backend
/// executes replicated events via [`apply`](ModelHandle::apply).
///
/// Cloning a `ModelHandle` creates a new handle to the **same** model.
pub struct ModelHandle<M> {
    inner: Rc<RefCell<M>>,
}

impl<M> Clone for ModelHandle<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<M: fmt::Debug> fmt::Debug for ModelHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(model) => f.debug_tuple("ModelHandle").field(&*model).finish(),
            Err(_) => f.write_str("ModelHandle(<executing>)"),
        }
    }
}

impl<M> ModelHandle<M> {
    pub fn new(model: M) -> Self {
        Self {
            inner: Rc::new(RefCell::new(model)),
        }
    }

    /// Read the model.
    ///
    /// # Panics
    ///
    /// Panics if called from inside [`apply`](ModelHandle::apply) on the same
    /// model (a selector must not run while the backend executes an event).
    pub fn read<R>(&self, f: impl FnOnce(&M) -> R) -> R {
        f(&self.inner.borrow())
    }

    /// Mutate the model. Reserved for backends executing replicated events.
    pub fn apply<R>(&self, f: impl FnOnce(&mut M) -> R) -> R {
        f(&mut self.inner.borrow_mut())
    }

    /// Whether both handles point at the same model.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
