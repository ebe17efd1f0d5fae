//! Selector evaluation against an optional root model.

use std::rc::Rc;

use crate::backend::ModelHandle;

/// Pure projection from the root model to the value a component renders.
pub type Selector<M, R> = Rc<dyn Fn(&M) -> R>;

/// Projection that may find nothing to select. `None` reads the same as
/// "no session".
pub type PartialSelector<M, R> = Rc<dyn Fn(&M) -> Option<R>>;

/// Run `selector` against `root`.
///
/// `None` is the "no session" sentinel: the root is absent before the first
/// join and after leaving, and that is a normal state rather than an error.
/// The selector runs synchronously and may run more often than the model
/// changes, so it must be free of side effects. Panics inside it propagate.
pub fn evaluate<M, R, F>(root: Option<&ModelHandle<M>>, selector: &F) -> Option<R>
where
    F: Fn(&M) -> R + ?Sized,
{
    root.map(|model| model.read(|m| selector(m)))
}

/// Run a selector that may come up empty. Both an absent root and an empty
/// selection give the sentinel.
pub fn evaluate_partial<M, R, F>(root: Option<&ModelHandle<M>>, selector: &F) -> Option<R>
where
    F: Fn(&M) -> Option<R> + ?Sized,
{
    root.and_then(|model| model.read(|m| selector(m)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        count: u32,
    }

    #[test]
    fn test_absent_root_is_sentinel() {
        let calls = Cell::new(0);
        let selector = |m: &Counter| {
            calls.set(calls.get() + 1);
            m.count
        };
        assert_eq!(evaluate::<Counter, _, _>(None, &selector), None);
        assert_eq!(calls.get(), 0, "selector must not run without a root");
    }

    #[test]
    fn test_present_root() {
        let root = ModelHandle::new(Counter { count: 3 });
        assert_eq!(evaluate(Some(&root), &|m: &Counter| m.count * 2), Some(6));
    }

    #[test]
    fn test_partial_selection() {
        let root = ModelHandle::new(Counter { count: 0 });
        let nonzero = |m: &Counter| (m.count > 0).then_some(m.count);

        assert_eq!(evaluate_partial(Some(&root), &nonzero), None);
        root.apply(|m| m.count = 2);
        assert_eq!(evaluate_partial(Some(&root), &nonzero), Some(2));
        assert_eq!(evaluate_partial::<Counter, u32, _>(None, &nonzero), None);
    }

    #[test]
    #[should_panic(expected = "selector bug")]
    fn test_selector_panics_propagate() {
        let root = ModelHandle::new(Counter { count: 0 });
        let _ = evaluate(Some(&root), &|_: &Counter| -> u32 { panic!("selector bug") });
    }
}
