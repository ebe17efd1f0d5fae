//! Model watches - the dirty-check state machine behind `use_model_selector`.
//!
//! ```text
//!              attach(model, view, scope)
//!   Unattached ──────────────────────────► Attached ──┐
//!   (sentinel) ◄────────────────────────── (listener)  │ notification
//!                      detach()                ▲       │ (coalesced per frame)
//!                                              └───────┘ recompute → trigger
//! ```
//!
//! Attaching always tears down the previous listener first and recomputes
//! immediately, so the first render already shows the current model. After
//! [`WatchCore::dispose`] nothing writes to the trigger again.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::backend::{ModelHandle, View};
use crate::types::{events, Handling};

use super::scheduler::{FrameScheduler, FrameTask, TaskId};
use super::selector::{evaluate_partial, PartialSelector};
use super::subscription::Subscription;
use super::trigger::{RenderTrigger, WatchState};

/// When a watch re-evaluates its selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WatchMode {
    /// On each change notification, at most once per frame.
    #[default]
    OnNotification,
    /// On every frame flush, whether or not anything was announced.
    EveryFrame,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchOptions {
    pub mode: WatchMode,
    /// Change notification to listen for in [`WatchMode::OnNotification`].
    pub event: String,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            mode: WatchMode::OnNotification,
            event: events::STATE_UPDATED.to_string(),
        }
    }
}

impl WatchOptions {
    pub fn every_frame() -> Self {
        Self {
            mode: WatchMode::EveryFrame,
            ..Self::default()
        }
    }

    pub fn on_event(event: impl Into<String>) -> Self {
        Self {
            mode: WatchMode::OnNotification,
            event: event.into(),
        }
    }
}

// =============================================================================
// WatchCore
// =============================================================================

/// What an attached watch holds on to.
struct Attachment<M> {
    model: ModelHandle<M>,
    _listener: Listener,
}

enum Listener {
    Notified(Subscription),
    Polled { scheduler: FrameScheduler, id: TaskId, _task: FrameTask },
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Polled { scheduler, id, .. } = self {
            scheduler.cancel(*id);
        }
    }
}

/// Watch state machine for one selector over a root model of type `M`.
pub struct WatchCore<M, R> {
    selector: PartialSelector<M, R>,
    trigger: Rc<RenderTrigger<R>>,
    options: WatchOptions,
    scheduler: FrameScheduler,
    attached: RefCell<Option<Attachment<M>>>,
    disposed: Cell<bool>,
}

impl<M: 'static, R: Hash + 'static> WatchCore<M, R> {
    /// Create an unattached watch. The trigger starts from `initial`.
    ///
    /// A selector returning `None` leaves the watch unavailable even while
    /// attached.
    pub fn new(
        selector: PartialSelector<M, R>,
        initial: Option<R>,
        options: WatchOptions,
        scheduler: FrameScheduler,
    ) -> Rc<Self> {
        Rc::new(Self {
            selector,
            trigger: Rc::new(RenderTrigger::new(initial)),
            options,
            scheduler,
            attached: RefCell::new(None),
            disposed: Cell::new(false),
        })
    }

    /// Attach to `model`, listening on `view` under `scope`.
    ///
    /// Any previous listener is removed before the new one is installed, even
    /// when the model and view are the same as before.
    pub fn attach(self: &Rc<Self>, model: ModelHandle<M>, view: &Rc<dyn View>, scope: &str) {
        if self.disposed.get() {
            return;
        }

        // Old listener goes first.
        let previous = self.attached.borrow_mut().take();
        drop(previous);

        let weak: Weak<Self> = Rc::downgrade(self);
        let listener = match self.options.mode {
            WatchMode::OnNotification => {
                let handler = Rc::new(move |_: &Value| {
                    if let Some(core) = weak.upgrade() {
                        core.recompute();
                    }
                });
                Listener::Notified(Subscription::attach(
                    view,
                    scope,
                    &self.options.event,
                    Handling::OncePerFrame,
                    &self.scheduler,
                    handler,
                ))
            }
            WatchMode::EveryFrame => {
                let task: FrameTask = Rc::new(move || {
                    if let Some(core) = weak.upgrade() {
                        core.recompute();
                    }
                });
                let id = self.scheduler.next_task_id();
                self.scheduler.poll_every_frame(id, &task);
                Listener::Polled {
                    scheduler: self.scheduler.clone(),
                    id,
                    _task: task,
                }
            }
        };

        *self.attached.borrow_mut() = Some(Attachment {
            model,
            _listener: listener,
        });
        log::debug!("watch attached to {} ({:?})", scope, self.options.mode);

        self.recompute();
    }

    /// Drop the listener and fall back to the "no session" sentinel.
    pub fn detach(&self) {
        let previous = self.attached.borrow_mut().take();
        if previous.is_none() {
            return;
        }
        drop(previous);
        log::debug!("watch detached");

        if !self.disposed.get() {
            self.trigger.update(None);
        }
    }

    /// Re-run the selector against the attached model.
    pub fn recompute(&self) {
        if self.disposed.get() {
            return;
        }
        let model = self.attached.borrow().as_ref().map(|a| a.model.clone());
        let value = evaluate_partial(model.as_ref(), &*self.selector);
        self.trigger.update(value);
    }

    /// Detach for good. Later attaches and recomputes are ignored.
    pub fn dispose(&self) {
        self.disposed.set(true);
        let previous = self.attached.borrow_mut().take();
        drop(previous);
    }

    pub fn is_attached(&self) -> bool {
        self.attached.borrow().is_some()
    }

    pub fn trigger(&self) -> &Rc<RenderTrigger<R>> {
        &self.trigger
    }
}

// =============================================================================
// ModelWatch - the handle components hold
// =============================================================================

/// Reactive handle to a selected slice of the replicated model.
///
/// [`get`](ModelWatch::get) returns `None` while no session is attached and
/// registers a dependency on the watch, so effects that read it re-run only
/// when the selected value actually changed.
///
/// Dropping the handle (or calling [`dispose`](ModelWatch::dispose)) removes
/// its listener.
pub struct ModelWatch<R> {
    trigger: Rc<RenderTrigger<R>>,
    teardown: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl<R> ModelWatch<R> {
    pub(crate) fn new(trigger: Rc<RenderTrigger<R>>, teardown: Box<dyn FnOnce()>) -> Self {
        Self {
            trigger,
            teardown: RefCell::new(Some(teardown)),
        }
    }

    /// Current value, tracked by the running effect or derived.
    pub fn get(&self) -> Option<Rc<R>> {
        self.trigger.track().value().cloned()
    }

    /// Current value without creating a dependency.
    pub fn peek(&self) -> Option<Rc<R>> {
        self.trigger.state().value().cloned()
    }

    /// `(value, is_available)`, tracked.
    pub fn snapshot(&self) -> (Option<Rc<R>>, bool) {
        let state = self.trigger.track();
        (state.value().cloned(), state.is_available())
    }

    /// The full watch state, untracked. The `Rc` stays the same until the
    /// selected value changes.
    pub fn state(&self) -> Rc<WatchState<R>> {
        self.trigger.state()
    }

    pub fn is_available(&self) -> bool {
        self.trigger.state().is_available()
    }

    /// Number of re-renders this watch has signaled.
    pub fn revision(&self) -> u64 {
        self.trigger.renders()
    }

    /// Stop watching. The last value stays readable.
    pub fn dispose(&self) {
        let teardown = self.teardown.borrow_mut().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.teardown.borrow().is_none()
    }
}

impl<R: Clone> ModelWatch<R> {
    /// Owned copy of the current value, tracked.
    pub fn cloned(&self) -> Option<R> {
        self.get().map(|value| (*value).clone())
    }
}

impl<R> Drop for ModelWatch<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<R: fmt::Debug> fmt::Debug for ModelWatch<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelWatch")
            .field("state", &self.trigger.state())
            .field("revision", &self.trigger.renders())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EventHandler, HandlerId};
    use crate::types::ViewId;
    use serde_json::json;

    #[derive(Default)]
    struct Counter {
        count: u32,
    }

    #[derive(Default)]
    struct CountingView {
        id: ViewId,
        handlers: RefCell<Vec<(HandlerId, String, EventHandler)>>,
        next_id: Cell<u64>,
        subscribes: Cell<u32>,
        unsubscribes: Cell<u32>,
    }

    impl CountingView {
        fn notify(&self, event: &str) {
            let matching: Vec<EventHandler> = self
                .handlers
                .borrow()
                .iter()
                .filter(|(_, e, _)| e == event)
                .map(|(_, _, h)| h.clone())
                .collect();
            for handler in matching {
                handler(&json!(null));
            }
        }
    }

    impl View for CountingView {
        fn view_id(&self) -> &ViewId {
            &self.id
        }

        fn subscribe(&self, _scope: &str, event: &str, handler: EventHandler) -> HandlerId {
            self.subscribes.set(self.subscribes.get() + 1);
            let id = HandlerId::new(self.next_id.get());
            self.next_id.set(id.raw() + 1);
            self.handlers.borrow_mut().push((id, event.to_string(), handler));
            id
        }

        fn unsubscribe(&self, _scope: &str, _event: &str, handler: HandlerId) {
            self.unsubscribes.set(self.unsubscribes.get() + 1);
            self.handlers.borrow_mut().retain(|(id, _, _)| *id != handler);
        }

        fn publish(&self, _scope: &str, _event: &str, _data: Value) {}
    }

    fn count_watch(options: WatchOptions, scheduler: &FrameScheduler) -> Rc<WatchCore<Counter, u32>> {
        WatchCore::new(Rc::new(|m: &Counter| Some(m.count)), None, options, scheduler.clone())
    }

    fn value(core: &WatchCore<Counter, u32>) -> Option<u32> {
        core.trigger().state().value().map(|v| **v)
    }

    #[test]
    fn test_attach_recomputes_immediately() {
        let scheduler = FrameScheduler::new();
        let view = Rc::new(CountingView::default());
        let dyn_view: Rc<dyn View> = view.clone();
        let model = ModelHandle::new(Counter { count: 3 });

        let core = count_watch(WatchOptions::default(), &scheduler);
        assert_eq!(value(&core), None);

        core.attach(model, &dyn_view, "session");
        assert_eq!(value(&core), Some(3));
        assert!(core.is_attached());
    }

    #[test]
    fn test_notifications_coalesce_per_frame() {
        let scheduler = FrameScheduler::new();
        let view = Rc::new(CountingView::default());
        let dyn_view: Rc<dyn View> = view.clone();
        let model = ModelHandle::new(Counter::default());

        let core = count_watch(WatchOptions::default(), &scheduler);
        core.attach(model.clone(), &dyn_view, "session");
        let renders = core.trigger().renders();

        model.apply(|m| m.count = 1);
        view.notify(events::STATE_UPDATED);
        model.apply(|m| m.count = 2);
        view.notify(events::STATE_UPDATED);
        assert_eq!(value(&core), Some(0), "recompute waits for the frame");

        assert_eq!(scheduler.flush(), 1);
        assert_eq!(value(&core), Some(2));
        assert_eq!(core.trigger().renders(), renders + 1);
    }

    #[test]
    fn test_reattach_replaces_listener() {
        let scheduler = FrameScheduler::new();
        let view = Rc::new(CountingView::default());
        let dyn_view: Rc<dyn View> = view.clone();

        let core = count_watch(WatchOptions::default(), &scheduler);
        core.attach(ModelHandle::new(Counter { count: 1 }), &dyn_view, "a");
        core.attach(ModelHandle::new(Counter { count: 1 }), &dyn_view, "a");
        core.attach(ModelHandle::new(Counter { count: 5 }), &dyn_view, "b");

        assert_eq!(view.subscribes.get(), 3);
        assert_eq!(view.unsubscribes.get(), 2);
        assert_eq!(view.handlers.borrow().len(), 1);
        assert_eq!(value(&core), Some(5));

        core.detach();
        assert_eq!(view.unsubscribes.get(), 3);
        assert_eq!(value(&core), None);
    }

    #[test]
    fn test_no_write_after_dispose() {
        let scheduler = FrameScheduler::new();
        let view = Rc::new(CountingView::default());
        let dyn_view: Rc<dyn View> = view.clone();
        let model = ModelHandle::new(Counter::default());

        let core = count_watch(WatchOptions::default(), &scheduler);
        core.attach(model.clone(), &dyn_view, "session");
        model.apply(|m| m.count = 9);
        view.notify(events::STATE_UPDATED);

        core.dispose();
        scheduler.flush();
        core.recompute();
        core.attach(model, &dyn_view, "session");

        assert_eq!(value(&core), Some(0));
        assert_eq!(view.subscribes.get(), view.unsubscribes.get());
    }

    #[test]
    fn test_every_frame_polls_without_notifications() {
        let scheduler = FrameScheduler::new();
        let view = Rc::new(CountingView::default());
        let dyn_view: Rc<dyn View> = view.clone();
        let model = ModelHandle::new(Counter::default());

        let core = count_watch(WatchOptions::every_frame(), &scheduler);
        core.attach(model.clone(), &dyn_view, "session");
        assert_eq!(view.subscribes.get(), 0);

        model.apply(|m| m.count = 4);
        scheduler.flush();
        assert_eq!(value(&core), Some(4));

        core.detach();
        model.apply(|m| m.count = 8);
        scheduler.flush();
        assert_eq!(value(&core), None);
    }

    #[test]
    fn test_empty_selection_is_unavailable_while_attached() {
        let scheduler = FrameScheduler::new();
        let view = Rc::new(CountingView::default());
        let dyn_view: Rc<dyn View> = view.clone();
        let model = ModelHandle::new(Counter::default());

        let core: Rc<WatchCore<Counter, u32>> = WatchCore::new(
            Rc::new(|m: &Counter| (m.count > 0).then_some(m.count)),
            None,
            WatchOptions::default(),
            scheduler.clone(),
        );
        core.attach(model.clone(), &dyn_view, "session");
        assert!(core.is_attached());
        assert!(!core.trigger().state().is_available());
        assert_eq!(core.trigger().renders(), 0);

        model.apply(|m| m.count = 3);
        view.notify(events::STATE_UPDATED);
        scheduler.flush();
        assert_eq!(value(&core), Some(3));
    }

    #[test]
    fn test_custom_event() {
        let scheduler = FrameScheduler::new();
        let view = Rc::new(CountingView::default());
        let dyn_view: Rc<dyn View> = view.clone();
        let model = ModelHandle::new(Counter::default());

        let core = count_watch(WatchOptions::on_event(events::VIEWS_UPDATED), &scheduler);
        core.attach(model.clone(), &dyn_view, "session");

        model.apply(|m| m.count = 1);
        view.notify(events::STATE_UPDATED);
        scheduler.flush();
        assert_eq!(value(&core), Some(0));

        view.notify(events::VIEWS_UPDATED);
        scheduler.flush();
        assert_eq!(value(&core), Some(1));
    }
}
