//! In-process reflector - one session's model, event queue and views.
//!
//! Nothing is replicated: there is one model and one ordered queue, and
//! everything runs when the host calls [`LocalReflector::pump`] or
//! [`LocalReflector::advance`].
//!
//! ```text
//! LocalView::publish ──► queue ──pump()──► model handlers ──► "state-updated"
//!                                               │                    │
//!                               ctx.publish ◄───┘                    ▼
//!                                  (queued)                 view subscribers
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;

use crate::backend::ModelHandle;
use crate::error::SessionError;
use crate::types::{events, SessionId, ViewId, ViewInfo};

use super::model::{FutureFn, Model, ModelContext, ModelHandlerFn, ModelSubscription};
use super::view::LocalView;

/// Queued work for a reflector.
pub(crate) enum Envelope {
    /// Published into the session, by a view or by the model.
    Event { scope: String, event: String, data: Value },
    ViewJoin(ViewInfo),
    ViewExit(ViewInfo),
    /// Lifecycle event for one view, scoped to its id.
    ToView { view: ViewId, event: String, data: Value },
}

/// What views and sessions need from their reflector.
pub(crate) trait Outbox {
    fn enqueue(&self, envelope: Envelope);
    fn remove_view(&self, view: &ViewId);
}

struct PendingFuture<M> {
    due: f64,
    seq: u64,
    run: FutureFn<M>,
}

struct ReflectorInner<M> {
    session_id: SessionId,
    password: Option<String>,
    model: ModelHandle<M>,
    subscriptions: RefCell<Vec<ModelSubscription<M>>>,
    views: RefCell<BTreeMap<ViewId, Rc<LocalView>>>,
    queue: RefCell<VecDeque<Envelope>>,
    futures: RefCell<Vec<PendingFuture<M>>>,
    time: Cell<f64>,
    next_view: Cell<u64>,
    next_future: Cell<u64>,
}

impl<M: Model> Outbox for ReflectorInner<M> {
    fn enqueue(&self, envelope: Envelope) {
        self.queue.borrow_mut().push_back(envelope);
    }

    fn remove_view(&self, view: &ViewId) {
        let removed = self.views.borrow_mut().remove(view);
        if let Some(removed) = removed {
            removed.set_detached(true);
            self.enqueue(Envelope::ViewExit(removed.info().clone()));
        }
    }
}

impl<M: Model> ReflectorInner<M> {
    fn context(&self) -> ModelContext<M> {
        ModelContext::new(self.session_id.clone(), self.time.get())
    }

    /// Apply what a handler asked for.
    fn absorb(&self, ctx: ModelContext<M>) {
        {
            let mut subscriptions = self.subscriptions.borrow_mut();
            for (scope, event) in &ctx.unsubscriptions {
                subscriptions.retain(|sub| !sub.matches(scope, event));
            }
            subscriptions.extend(ctx.subscriptions);
        }

        self.queue
            .borrow_mut()
            .extend(ctx.published.into_iter().map(|(scope, event, data)| Envelope::Event {
                scope,
                event,
                data,
            }));

        let now = self.time.get();
        let mut futures = self.futures.borrow_mut();
        for (delay, run) in ctx.futures {
            let seq = self.next_future.get();
            self.next_future.set(seq + 1);
            futures.push(PendingFuture {
                due: now + delay,
                seq,
                run,
            });
        }
    }

    fn connected_views(&self) -> Vec<Rc<LocalView>> {
        self.views
            .borrow()
            .values()
            .filter(|view| !view.is_detached())
            .cloned()
            .collect()
    }

    fn broadcast(&self, scope: &str, event: &str, data: &Value) {
        for view in self.connected_views() {
            view.deliver(scope, event, data);
        }
    }

    fn state_updated(&self) {
        self.broadcast(self.session_id.as_str(), events::STATE_UPDATED, &Value::Null);
    }

    fn run_handlers(&self, scope: &str, event: &str, data: &Value) -> usize {
        let handlers: Vec<ModelHandlerFn<M>> = self
            .subscriptions
            .borrow()
            .iter()
            .filter(|sub| sub.matches(scope, event))
            .map(|sub| sub.handler)
            .collect();

        for handler in &handlers {
            let mut ctx = self.context();
            self.model.apply(|model| handler(model, data, &mut ctx));
            self.absorb(ctx);
            self.state_updated();
        }
        handlers.len()
    }

    fn process(&self, envelope: Envelope) {
        match envelope {
            Envelope::Event { scope, event, data } => {
                let handled = self.run_handlers(&scope, &event, &data);
                log::trace!("{}/{} handled by {} model handler(s)", scope, event, handled);
                self.broadcast(&scope, &event, &data);
            }
            Envelope::ViewJoin(info) => {
                let mut ctx = self.context();
                let tracked = self.model.apply(|model| {
                    let tracked = match model.views_mut() {
                        Some(registry) => {
                            registry.insert(info.view_id.clone(), info.clone());
                            true
                        }
                        None => false,
                    };
                    model.handle_view_join(&info, &mut ctx);
                    tracked
                });
                self.absorb(ctx);
                log::debug!("view {} joined {}", info.view_id, self.session_id);
                if tracked {
                    self.broadcast(self.session_id.as_str(), events::VIEWS_UPDATED, &Value::Null);
                }
                self.state_updated();
            }
            Envelope::ViewExit(info) => {
                let mut ctx = self.context();
                let tracked = self.model.apply(|model| {
                    let tracked = match model.views_mut() {
                        Some(registry) => {
                            registry.remove(&info.view_id);
                            true
                        }
                        None => false,
                    };
                    model.handle_view_exit(&info, &mut ctx);
                    tracked
                });
                self.absorb(ctx);
                log::debug!("view {} left {}", info.view_id, self.session_id);
                if tracked {
                    self.broadcast(self.session_id.as_str(), events::VIEWS_UPDATED, &Value::Null);
                }
                self.state_updated();
            }
            Envelope::ToView { view, event, data } => {
                let target = self.views.borrow().get(&view).cloned();
                if let Some(target) = target {
                    target.deliver(view.as_str(), &event, &data);
                }
            }
        }
    }

    fn next_due_future(&self, until: f64) -> Option<PendingFuture<M>> {
        let mut futures = self.futures.borrow_mut();
        let index = futures
            .iter()
            .enumerate()
            .filter(|(_, f)| f.due <= until)
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)))
            .map(|(index, _)| index)?;
        Some(futures.remove(index))
    }
}

/// One local session: the model, its event queue and the connected views.
///
/// Cloning creates a new handle to the **same** session.
pub struct LocalReflector<M: Model> {
    inner: Rc<ReflectorInner<M>>,
}

impl<M: Model> Clone for LocalReflector<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<M: Model> fmt::Debug for LocalReflector<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalReflector")
            .field("session", &self.inner.session_id)
            .field("time", &self.inner.time.get())
            .field("views", &self.inner.views.borrow().len())
            .field("queued", &self.inner.queue.borrow().len())
            .finish()
    }
}

impl<M: Model> LocalReflector<M> {
    /// Create a session around `model` and run its [`Model::init`].
    pub fn new(session_id: SessionId, model: M) -> Result<Self, SessionError> {
        Self::with_password(session_id, model, None)
    }

    /// Like [`new`](Self::new), but joins must present `password`.
    pub fn with_password(
        session_id: SessionId,
        model: M,
        password: Option<String>,
    ) -> Result<Self, SessionError> {
        let inner = Rc::new(ReflectorInner {
            session_id,
            password,
            model: ModelHandle::new(model),
            subscriptions: RefCell::new(Vec::new()),
            views: RefCell::new(BTreeMap::new()),
            queue: RefCell::new(VecDeque::new()),
            futures: RefCell::new(Vec::new()),
            time: Cell::new(0.0),
            next_view: Cell::new(0),
            next_future: Cell::new(0),
        });

        let mut ctx = inner.context();
        inner.model.apply(|model| model.init(&mut ctx))?;
        inner.absorb(ctx);
        log::debug!("session {} created", inner.session_id);

        Ok(Self { inner })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    pub(crate) fn password(&self) -> Option<&str> {
        self.inner.password.as_deref()
    }

    pub fn model(&self) -> ModelHandle<M> {
        self.inner.model.clone()
    }

    /// Session time in milliseconds.
    pub fn time(&self) -> f64 {
        self.inner.time.get()
    }

    /// Ids of the views currently in the session, detached ones included.
    pub fn views(&self) -> Vec<ViewId> {
        self.inner.views.borrow().keys().cloned().collect()
    }

    pub fn view(&self, id: &ViewId) -> Option<Rc<LocalView>> {
        self.inner.views.borrow().get(id).cloned()
    }

    /// Envelopes waiting for [`pump`](Self::pump).
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Inject an event as if another client had published it.
    pub fn publish(&self, scope: &str, event: &str, data: Value) {
        self.inner.enqueue(Envelope::Event {
            scope: scope.to_string(),
            event: event.to_string(),
            data,
        });
    }

    /// Process queued envelopes until the queue is empty. Returns how many ran.
    pub fn pump(&self) -> usize {
        let mut processed = 0;
        loop {
            let next = self.inner.queue.borrow_mut().pop_front();
            let Some(envelope) = next else {
                break;
            };
            self.inner.process(envelope);
            processed += 1;
        }
        processed
    }

    /// Move session time forward by `ms`, running every future that falls
    /// due in order, then send each connected view an `update` with the new
    /// time. Returns the number of futures run.
    pub fn advance(&self, ms: f64) -> usize {
        let target = self.inner.time.get() + ms.max(0.0);
        let mut ran = 0;

        while let Some(future) = self.inner.next_due_future(target) {
            self.inner.time.set(future.due.max(self.inner.time.get()));
            let mut ctx = self.inner.context();
            self.inner.model.apply(|model| (future.run)(model, &mut ctx));
            self.inner.absorb(ctx);
            self.inner.state_updated();
            self.pump();
            ran += 1;
        }
        self.inner.time.set(target);

        for view in self.inner.connected_views() {
            self.inner.enqueue(Envelope::ToView {
                view: view.info().view_id.clone(),
                event: events::UPDATE.to_string(),
                data: Value::from(target),
            });
        }
        self.pump();
        ran
    }

    /// Add a view and queue its join announcement and initial sync.
    pub(crate) fn connect_view(&self, view_data: Option<Value>) -> Rc<LocalView> {
        let n = self.inner.next_view.get() + 1;
        self.inner.next_view.set(n);

        let info = ViewInfo {
            view_id: ViewId::new(format!("view-{n}")),
            view_data,
        };
        let outbox: Rc<dyn Outbox> = self.inner.clone();
        let view = Rc::new(LocalView::new(info.clone(), Rc::downgrade(&outbox)));
        self.inner
            .views
            .borrow_mut()
            .insert(info.view_id.clone(), Rc::clone(&view));

        self.inner.enqueue(Envelope::ViewJoin(info.clone()));
        self.inner.enqueue(Envelope::ToView {
            view: info.view_id,
            event: events::SYNCED.to_string(),
            data: Value::Bool(true),
        });
        view
    }

    pub(crate) fn outbox(&self) -> Weak<dyn Outbox> {
        let outbox: Rc<dyn Outbox> = self.inner.clone();
        Rc::downgrade(&outbox)
    }

    /// Simulate a dropped connection: the view stops receiving session
    /// events and is told it was detached.
    pub fn detach_view(&self, id: &ViewId) {
        if let Some(view) = self.view(id) {
            view.set_detached(true);
            self.inner.enqueue(Envelope::ToView {
                view: id.clone(),
                event: events::DETACHED.to_string(),
                data: Value::Null,
            });
        }
    }

    /// Reconnect a detached view.
    pub fn resync_view(&self, id: &ViewId) {
        if let Some(view) = self.view(id) {
            view.set_detached(false);
            self.inner.enqueue(Envelope::ToView {
                view: id.clone(),
                event: events::SYNCED.to_string(),
                data: Value::Bool(true),
            });
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
