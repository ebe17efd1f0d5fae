//! Event hooks - publish into and subscribe to session events.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use spark_signals::effect;

use crate::backend::EventHandler;
use crate::bridge::Subscription;
use crate::error::SessionError;
use crate::session::{current_core, SessionCore};
use crate::types::Handling;

// =============================================================================
// Publishing
// =============================================================================

type BuildFn<A> = dyn Fn(A) -> Result<(String, String, Value), SessionError>;

/// Publishes events built from call arguments into the current session.
pub struct Publisher<A> {
    core: Rc<SessionCore>,
    build: Rc<BuildFn<A>>,
}

impl<A> Clone for Publisher<A> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
            build: Rc::clone(&self.build),
        }
    }
}

impl<A> fmt::Debug for Publisher<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("joined", &self.core.view().is_some())
            .finish()
    }
}

impl<A> Publisher<A> {
    /// Build `(scope, event, data)` from `args` and publish it.
    ///
    /// Fails with [`SessionError::NoSession`] while no view is attached;
    /// nothing is built in that case.
    pub fn publish(&self, args: A) -> Result<(), SessionError> {
        let view = self
            .core
            .view()
            .ok_or(SessionError::NoSession { operation: "publish" })?;
        let (scope, event, data) = (self.build)(args)?;
        view.publish(&scope, &event, data);
        Ok(())
    }
}

/// Get a publisher whose events are built by `build`.
///
/// `build` maps the call arguments to `(scope, event, payload)`; the payload
/// is serialized with serde and handed to the view unchanged.
pub fn use_publish<A, T, F>(build: F) -> Result<Publisher<A>, SessionError>
where
    A: 'static,
    T: Serialize,
    F: Fn(A) -> (String, String, T) + 'static,
{
    let core = current_core("use_publish")?;
    let build = move |args: A| {
        let (scope, event, data) = build(args);
        match serde_json::to_value(&data) {
            Ok(value) => Ok((scope, event, value)),
            Err(err) => Err(SessionError::Payload {
                scope,
                event,
                reason: err.to_string(),
            }),
        }
    };
    Ok(Publisher {
        core,
        build: Rc::new(build),
    })
}

// =============================================================================
// Subscribing
// =============================================================================

/// A component's subscription to one `(scope, event)` pair.
///
/// Follows the session: the listener is moved to the new view on every
/// join, re-sync or session change and removed while detached. Dropping the
/// handle removes it for good.
pub struct EventSubscription {
    slot: Rc<RefCell<Option<Subscription>>>,
    stop: Option<Box<dyn FnOnce()>>,
}

impl EventSubscription {
    /// Whether a listener is installed right now.
    pub fn is_active(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop();
        }
        let current = self.slot.borrow_mut().take();
        drop(current);
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("subscription", &self.slot.borrow())
            .finish()
    }
}

/// Call `callback` with each `event` published on `scope`.
pub fn use_subscribe<T, F>(
    scope: impl Into<String>,
    event: impl Into<String>,
    callback: F,
) -> Result<EventSubscription, SessionError>
where
    T: DeserializeOwned + 'static,
    F: Fn(T) + 'static,
{
    subscribe("use_subscribe", scope.into(), event.into(), Handling::Immediate, callback)
}

/// [`use_subscribe`] with explicit delivery.
///
/// With [`Handling::OncePerFrame`] only the latest payload of each frame
/// reaches `callback`.
pub fn use_subscribe_with<T, F>(
    handling: Handling,
    scope: impl Into<String>,
    event: impl Into<String>,
    callback: F,
) -> Result<EventSubscription, SessionError>
where
    T: DeserializeOwned + 'static,
    F: Fn(T) + 'static,
{
    subscribe("use_subscribe_with", scope.into(), event.into(), handling, callback)
}

fn subscribe<T, F>(
    hook: &'static str,
    scope: String,
    event: String,
    handling: Handling,
    callback: F,
) -> Result<EventSubscription, SessionError>
where
    T: DeserializeOwned + 'static,
    F: Fn(T) + 'static,
{
    let core = current_core(hook)?;

    let handler: EventHandler = {
        let scope = scope.clone();
        let event = event.clone();
        Rc::new(move |payload: &Value| match serde_json::from_value::<T>(payload.clone()) {
            Ok(data) => callback(data),
            Err(err) => log::warn!("dropping `{}`/`{}` event: {}", scope, event, err),
        })
    };

    let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
    let slot_for_effect = slot.clone();
    let stop = effect(move || {
        core.track();
        let previous = slot_for_effect.borrow_mut().take();
        drop(previous);

        if let Some(view) = core.view() {
            let subscription = Subscription::attach(
                &view,
                &scope,
                &event,
                handling,
                core.scheduler(),
                handler.clone(),
            );
            *slot_for_effect.borrow_mut() = Some(subscription);
        }
    });

    Ok(EventSubscription {
        slot,
        stop: Some(Box::new(stop)),
    })
}
