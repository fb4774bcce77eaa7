//! Browser console output for `tracing` events
//!
//! Core modules log through the `tracing` macros. In the browser, `main()`
//! installs a `ConsoleLayer` that writes each event to `console.*` with the
//! module path in brackets, e.g. `[tatcore::review::client] annotation update
//! failed seq=3 error=Network failure: 503`.

use std::fmt::{self, Write};

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

/// Layer that renders events to one line and hands them to `sink`
pub struct ConsoleLayer<W> {
    sink: W,
}

impl<W> ConsoleLayer<W>
where
    W: Fn(Level, &str) + Send + Sync + 'static,
{
    pub fn new(sink: W) -> Self {
        Self { sink }
    }
}

impl ConsoleLayer<fn(Level, &str)> {
    /// Layer writing to the browser console
    pub fn console() -> Self {
        Self { sink: write_console }
    }
}

fn write_console(level: Level, line: &str) {
    let line = wasm_bindgen::JsValue::from_str(line);
    match level {
        Level::ERROR => web_sys::console::error_1(&line),
        Level::WARN => web_sys::console::warn_1(&line),
        Level::INFO => web_sys::console::info_1(&line),
        _ => web_sys::console::debug_1(&line),
    }
}

#[derive(Default)]
struct LineWriter {
    message: String,
    fields: String,
}

impl Visit for LineWriter {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// `[target] message key=value ...`
pub fn format_event(event: &Event<'_>) -> String {
    let mut writer = LineWriter::default();
    event.record(&mut writer);
    format!("[{}] {}{}", event.metadata().target(), writer.message, writer.fields)
}

impl<S, W> Layer<S> for ConsoleLayer<W>
where
    S: Subscriber,
    W: Fn(Level, &str) + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        (self.sink)(*event.metadata().level(), &format_event(event));
    }
}

/// Install the console layer as the global subscriber. Debug builds show
/// everything down to DEBUG, release builds WARN and above.
pub fn init_console_logging() {
    let level = if cfg!(debug_assertions) { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let subscriber = Registry::default().with(ConsoleLayer::console().with_filter(level));
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        web_sys::console::warn_1(&"[tatcore] a tracing subscriber was already installed".into());
    }
}
