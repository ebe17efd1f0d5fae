//! Subscription bridge - scoped listeners on a view's event channel.
//!
//! A [`Subscription`] owns exactly one handler registered through
//! [`View::subscribe`]. Dropping it (or calling [`Subscription::detach`])
//! unsubscribes exactly once and cancels any delivery still queued for the
//! frame. A liveness flag shared with the installed handler guarantees that
//! nothing is delivered after the detach, even if the backend is in the
//! middle of dispatching when it happens.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::backend::{EventHandler, HandlerId, View};
use crate::types::Handling;

use super::scheduler::{FrameScheduler, FrameTask, TaskId};

/// Frame slot owned by a once-per-frame subscription.
struct FrameDelivery {
    scheduler: FrameScheduler,
    id: TaskId,
    // Kept alive here; the scheduler only holds it weakly.
    _task: FrameTask,
}

/// RAII guard for one handler on `(scope, event)`.
pub struct Subscription {
    view: Rc<dyn View>,
    scope: String,
    event: String,
    handler: Option<HandlerId>,
    alive: Rc<Cell<bool>>,
    delivery: Option<FrameDelivery>,
}

impl Subscription {
    /// Install `handler` on `view` for `(scope, event)`.
    ///
    /// With [`Handling::Immediate`] the handler runs synchronously inside the
    /// backend's dispatch. With [`Handling::OncePerFrame`] only the latest
    /// payload of a frame is kept and delivered on the next
    /// [`FrameScheduler::flush`].
    pub fn attach(
        view: &Rc<dyn View>,
        scope: &str,
        event: &str,
        handling: Handling,
        scheduler: &FrameScheduler,
        handler: EventHandler,
    ) -> Self {
        let alive = Rc::new(Cell::new(true));

        let (installed, delivery): (EventHandler, Option<FrameDelivery>) = match handling {
            Handling::Immediate => {
                let alive = alive.clone();
                let installed: EventHandler = Rc::new(move |payload: &Value| {
                    if alive.get() {
                        handler(payload);
                    }
                });
                (installed, None)
            }
            Handling::OncePerFrame => {
                let latest: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));

                let task: FrameTask = {
                    let alive = alive.clone();
                    let latest = latest.clone();
                    Rc::new(move || {
                        if !alive.get() {
                            return;
                        }
                        let payload = latest.borrow_mut().take();
                        if let Some(payload) = payload {
                            handler(&payload);
                        }
                    })
                };

                let id = scheduler.next_task_id();
                let installed: EventHandler = {
                    let alive = alive.clone();
                    let scheduler = scheduler.clone();
                    let task = Rc::downgrade(&task);
                    Rc::new(move |payload: &Value| {
                        if !alive.get() {
                            return;
                        }
                        *latest.borrow_mut() = Some(payload.clone());
                        if let Some(task) = task.upgrade() {
                            scheduler.schedule(id, &task);
                        }
                    })
                };

                let delivery = FrameDelivery {
                    scheduler: scheduler.clone(),
                    id,
                    _task: task,
                };
                (installed, Some(delivery))
            }
        };

        let handler = view.subscribe(scope, event, installed);
        log::debug!(
            "subscribed {:?} to {}/{} on view {}",
            handler,
            scope,
            event,
            view.view_id()
        );

        Self {
            view: Rc::clone(view),
            scope: scope.to_string(),
            event: event.to_string(),
            handler: Some(handler),
            alive,
            delivery,
        }
    }

    /// Remove the handler. Later calls are no-ops.
    pub fn detach(&mut self) {
        let Some(handler) = self.handler.take() else {
            return;
        };

        self.alive.set(false);
        if let Some(delivery) = self.delivery.take() {
            delivery.scheduler.cancel(delivery.id);
        }
        self.view.unsubscribe(&self.scope, &self.event, handler);
        log::debug!(
            "unsubscribed {:?} from {}/{} on view {}",
            handler,
            self.scope,
            self.event,
            self.view.view_id()
        );
    }

    pub fn is_active(&self) -> bool {
        self.handler.is_some()
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Whether this subscription listens on `view`.
    pub fn is_on(&self, view: &Rc<dyn View>) -> bool {
        Rc::ptr_eq(&self.view, view)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("view", self.view.view_id())
            .field("scope", &self.scope)
            .field("event", &self.event)
            .field("handler", &self.handler)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ViewId;
    use serde_json::json;

    /// Minimal in-memory view that records subscribe/unsubscribe calls.
    struct RecordingView {
        id: ViewId,
        handlers: RefCell<Vec<(HandlerId, String, String, EventHandler)>>,
        next_id: Cell<u64>,
        unsubscribed: RefCell<Vec<HandlerId>>,
    }

    impl RecordingView {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: ViewId::new("view-1"),
                handlers: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                unsubscribed: RefCell::new(Vec::new()),
            })
        }

        fn emit(&self, scope: &str, event: &str, payload: Value) {
            let matching: Vec<EventHandler> = self
                .handlers
                .borrow()
                .iter()
                .filter(|(_, s, e, _)| s == scope && e == event)
                .map(|(_, _, _, h)| h.clone())
                .collect();
            for handler in matching {
                handler(&payload);
            }
        }

        fn handler_count(&self) -> usize {
            self.handlers.borrow().len()
        }
    }

    impl View for RecordingView {
        fn view_id(&self) -> &ViewId {
            &self.id
        }

        fn subscribe(&self, scope: &str, event: &str, handler: EventHandler) -> HandlerId {
            let id = HandlerId::new(self.next_id.get());
            self.next_id.set(id.raw() + 1);
            self.handlers
                .borrow_mut()
                .push((id, scope.to_string(), event.to_string(), handler));
            id
        }

        fn unsubscribe(&self, _scope: &str, _event: &str, handler: HandlerId) {
            self.handlers.borrow_mut().retain(|(id, _, _, _)| *id != handler);
            self.unsubscribed.borrow_mut().push(handler);
        }

        fn publish(&self, scope: &str, event: &str, data: Value) {
            self.emit(scope, event, data);
        }
    }

    fn collecting() -> (EventHandler, Rc<RefCell<Vec<Value>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let handler: EventHandler = Rc::new(move |v: &Value| seen_clone.borrow_mut().push(v.clone()));
        (handler, seen)
    }

    #[test]
    fn test_immediate_delivery() {
        let recording = RecordingView::new();
        let view: Rc<dyn View> = recording.clone();
        let scheduler = FrameScheduler::new();
        let (handler, seen) = collecting();

        let sub = Subscription::attach(&view, "room", "chat", Handling::Immediate, &scheduler, handler);
        recording.emit("room", "chat", json!("hi"));
        recording.emit("room", "other", json!("ignored"));

        assert_eq!(*seen.borrow(), vec![json!("hi")]);
        assert!(sub.is_active());
        assert!(sub.is_on(&view));
    }

    #[test]
    fn test_drop_unsubscribes_exactly_once() {
        let recording = RecordingView::new();
        let view: Rc<dyn View> = recording.clone();
        let scheduler = FrameScheduler::new();
        let (handler, seen) = collecting();

        let mut sub = Subscription::attach(&view, "room", "chat", Handling::Immediate, &scheduler, handler);
        assert_eq!(recording.handler_count(), 1);

        sub.detach();
        sub.detach();
        drop(sub);

        assert_eq!(recording.handler_count(), 0);
        assert_eq!(recording.unsubscribed.borrow().len(), 1);

        recording.emit("room", "chat", json!(1));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_once_per_frame_keeps_latest() {
        let recording = RecordingView::new();
        let view: Rc<dyn View> = recording.clone();
        let scheduler = FrameScheduler::new();
        let (handler, seen) = collecting();

        let _sub = Subscription::attach(&view, "room", "tick", Handling::OncePerFrame, &scheduler, handler);
        recording.emit("room", "tick", json!(1));
        recording.emit("room", "tick", json!(2));
        recording.emit("room", "tick", json!(3));
        assert!(seen.borrow().is_empty(), "delivery waits for the frame");

        scheduler.flush();
        assert_eq!(*seen.borrow(), vec![json!(3)]);

        scheduler.flush();
        assert_eq!(seen.borrow().len(), 1, "no payload, no delivery");
    }

    #[test]
    fn test_detach_cancels_queued_delivery() {
        let recording = RecordingView::new();
        let view: Rc<dyn View> = recording.clone();
        let scheduler = FrameScheduler::new();
        let (handler, seen) = collecting();

        let sub = Subscription::attach(&view, "room", "tick", Handling::OncePerFrame, &scheduler, handler);
        recording.emit("room", "tick", json!(1));
        assert_eq!(scheduler.pending(), 1);

        drop(sub);
        assert_eq!(scheduler.pending(), 0);
        scheduler.flush();
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_detach_during_dispatch_stops_delivery() {
        let recording = RecordingView::new();
        let view: Rc<dyn View> = recording.clone();
        let scheduler = FrameScheduler::new();

        // First handler detaches the second one mid-dispatch.
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        let _first = Subscription::attach(
            &view,
            "room",
            "chat",
            Handling::Immediate,
            &scheduler,
            Rc::new(move |_: &Value| {
                slot_clone.borrow_mut().take();
            }),
        );

        let (handler, seen) = collecting();
        *slot.borrow_mut() = Some(Subscription::attach(
            &view,
            "room",
            "chat",
            Handling::Immediate,
            &scheduler,
            handler,
        ));

        recording.emit("room", "chat", json!("late"));
        assert!(seen.borrow().is_empty(), "detached handler must not see the event");
    }
}
