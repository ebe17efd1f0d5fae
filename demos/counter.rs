//! Counter Example - Two views sharing one replicated counter
//!
//! This example demonstrates:
//! - Joining a session through a `SessionRoot`
//! - Selecting a slice of the model with `use_model_selector`
//! - Publishing events with `use_publish`
//! - Redrawing from a spark-signals effect only when the slice changes
//!
//! Keys: `+` or space increments, `r` resets, `q` quits.
//! A second "remote" client increments every few seconds.
//!
//! Run with: cargo run --example counter

use std::io::{self, stdout, Write};
use std::time::{Duration, Instant};

use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{self, Clear, ClearType};
use serde_json::{json, Value};
use spark_session::{
    use_model_selector, use_publish, use_synced_callback, Connector, LocalConnector, Model,
    ModelContext, SessionError, SessionParams, SessionRoot,
};
use spark_signals::effect;

#[derive(Debug, Default)]
struct Counter {
    count: u64,
    last_by: Option<String>,
}

fn increment(counter: &mut Counter, data: &Value, _ctx: &mut ModelContext<Counter>) {
    counter.count += 1;
    counter.last_by = data.as_str().map(str::to_string);
}

fn reset(counter: &mut Counter, _data: &Value, _ctx: &mut ModelContext<Counter>) {
    counter.count = 0;
}

impl Model for Counter {
    fn init(&mut self, ctx: &mut ModelContext<Self>) -> Result<(), SessionError> {
        let scope = ctx.session_id().as_str().to_string();
        ctx.subscribe(&scope, "increment", increment)?;
        ctx.subscribe(&scope, "reset", reset)?;
        Ok(())
    }
}

fn draw(line: u16, text: &str) {
    let mut out = stdout();
    let _ = execute!(out, MoveTo(0, line), Clear(ClearType::CurrentLine));
    let _ = write!(out, "{}", text);
    let _ = out.flush();
}

/// Raw mode for the lifetime of the demo. Restores the terminal on drop,
/// including when the loop bails out with an error.
struct RawTerminal;

impl RawTerminal {
    fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let guard = RawTerminal;
        execute!(stdout(), Clear(ClearType::All))?;
        Ok(guard)
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = execute!(stdout(), MoveTo(0, 6));
        println!();
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let params = SessionParams::new("io.spark.demo", "counter");
    let connector = LocalConnector::new(|_: &SessionParams| Counter::default());
    let root = SessionRoot::new(params.clone(), connector.clone());
    root.connect()?;

    // Another client in the same session.
    let remote = connector.join(&params)?;
    let scope = remote.session.id().as_str().to_string();

    let screen = RawTerminal::enter()?;
    draw(0, "spark-session counter   (+/space increment, r reset, q quit)");

    let (count, last_by, increment, reset, _synced) = root.provide(|| {
        let scope = scope.clone();
        let reset_scope = scope.clone();
        Ok::<_, SessionError>((
            use_model_selector(|m: &Counter| m.count)?,
            use_model_selector(|m: &Counter| m.last_by.clone())?,
            use_publish(move |by: String| (scope.clone(), "increment".to_string(), by))?,
            use_publish(move |_: ()| (reset_scope.clone(), "reset".to_string(), ()))?,
            use_synced_callback(|synced| draw(4, &format!("synced: {}", synced)))?,
        ))
    })?;

    let _render = effect(move || {
        let value = count.get().map(|v| *v);
        let who = last_by.get().and_then(|v| (*v).clone()).unwrap_or_default();
        match value {
            Some(value) => draw(2, &format!("count: {:<6} last by: {}", value, who)),
            None => draw(2, "count: (not joined)"),
        }
    });

    let mut last_remote = Instant::now();
    loop {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Char('+') | KeyCode::Char(' ') => increment.publish("local".to_string())?,
                        KeyCode::Char('r') => reset.publish(())?,
                        _ => {}
                    }
                }
            }
        }

        if last_remote.elapsed() >= Duration::from_secs(3) {
            remote.view.publish(&scope, "increment", json!("remote"));
            last_remote = Instant::now();
        }

        connector.pump_all();
        root.flush_frame();
    }

    remote.session.leave();
    root.leave()?;
    drop(screen);
    Ok(())
}
