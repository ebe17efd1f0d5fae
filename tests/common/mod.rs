//! Shared fixture: a counter model joined through the local backend.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;
use spark_session::{
    LocalConnector, LocalReflector, LocalView, Model, ModelContext, ModelLookup, SessionError,
    SessionParams, SessionRoot, TracksViews, ViewRegistry,
};

// =============================================================================
// COUNTER MODEL
// =============================================================================

#[derive(Debug, Default)]
pub struct Counter {
    pub count: u64,
    pub items: BTreeMap<String, u32>,
    pub track_views: bool,
    pub views: ViewRegistry,
}

fn increment(counter: &mut Counter, data: &Value, ctx: &mut ModelContext<Counter>) {
    counter.count += data.as_u64().unwrap_or(1);
    let scope = ctx.session_id().as_str().to_string();
    let _ = ctx.publish(&scope, "changed", &counter.count);
}

fn set(counter: &mut Counter, data: &Value, _ctx: &mut ModelContext<Counter>) {
    counter.count = data.as_u64().unwrap_or_default();
}

fn put_item(counter: &mut Counter, data: &Value, _ctx: &mut ModelContext<Counter>) {
    if let (Some(id), Some(value)) = (data["id"].as_str(), data["value"].as_u64()) {
        counter.items.insert(id.to_string(), value as u32);
    }
}

impl Model for Counter {
    fn init(&mut self, ctx: &mut ModelContext<Self>) -> Result<(), SessionError> {
        let scope = ctx.session_id().as_str().to_string();
        ctx.subscribe(&scope, "increment", increment)?;
        ctx.subscribe(&scope, "set", set)?;
        ctx.subscribe(&scope, "put-item", put_item)?;
        Ok(())
    }

    fn views_mut(&mut self) -> Option<&mut ViewRegistry> {
        self.track_views.then_some(&mut self.views)
    }
}

impl TracksViews for Counter {
    fn joined_views(&self) -> Option<&ViewRegistry> {
        self.track_views.then_some(&self.views)
    }
}

impl ModelLookup for Counter {
    type Entry = u32;

    fn lookup(&self, id: &str) -> Option<u32> {
        self.items.get(id).copied()
    }
}

// =============================================================================
// FIXTURE
// =============================================================================

pub struct Fixture {
    pub root: SessionRoot<Counter>,
    pub connector: LocalConnector<Counter>,
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn params() -> SessionParams {
    SessionParams::new("io.spark.counter", "room")
}

/// A root over a fresh connector. Not connected yet.
pub fn fixture() -> Fixture {
    fixture_with(params())
}

pub fn fixture_with(params: SessionParams) -> Fixture {
    init_logger();
    let connector = LocalConnector::new(|params: &SessionParams| Counter {
        track_views: params.track_views,
        ..Counter::default()
    });
    let root = SessionRoot::new(params, connector.clone());
    Fixture { root, connector }
}

impl Fixture {
    /// The session the root is currently joined to.
    pub fn reflector(&self) -> LocalReflector<Counter> {
        let params = self.root.params();
        self.connector
            .reflector(&params.app_id, &params.name)
            .expect("session exists once joined")
    }

    /// Session-wide scope of the current session.
    pub fn scope(&self) -> String {
        self.reflector().session_id().as_str().to_string()
    }

    /// Our own view on the backend side.
    pub fn view(&self) -> Rc<LocalView> {
        let id = self.root.view_id().expect("joined");
        self.reflector().view(&id).expect("view connected")
    }

    /// Publish an event into the current session as another client would.
    pub fn send(&self, event: &str, data: Value) {
        self.reflector().publish(&self.scope(), event, data);
    }

    /// Run the backend queue, then end the frame.
    pub fn settle(&self) {
        self.connector.pump_all();
        self.root.flush_frame();
    }
}
