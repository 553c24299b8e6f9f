//! Log capture for unit tests.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Collects every event emitted while installed as the thread default.
///
/// `#[tokio::test]` runs spawned tasks on the test thread, so events from
/// completion watchers are captured too.
#[derive(Clone, Default)]
pub(crate) struct LogCapture {
    lines: Arc<Mutex<Vec<CapturedEvent>>>,
}

#[derive(Clone, Debug)]
struct CapturedEvent {
    message: String,
    fields: Vec<String>,
}

impl CapturedEvent {
    fn render(&self) -> String {
        let mut line = self.message.clone();
        for field in &self.fields {
            line.push(' ');
            line.push_str(field);
        }
        line
    }
}

impl LogCapture {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_default(&self) -> DefaultGuard {
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.message).collect()
    }

    pub(crate) fn contains(&self, needle: &str) -> bool {
        self.events().iter().any(|e| e.render().contains(needle))
    }

    /// Lets spawned tasks run without waiting on anything in particular.
    pub(crate) async fn settle(&self) {
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
    }

    pub(crate) async fn wait_for(&self, needle: &str) {
        let found = tokio::time::timeout(Duration::from_secs(5), async {
            while !self.contains(needle) {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(found.is_ok(), "no log line containing {:?}", needle);
    }

    fn events(&self) -> Vec<CapturedEvent> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        let captured = CapturedEvent {
            message: visitor.message,
            fields: visitor.fields,
        };
        match self.lines.lock() {
            Ok(mut lines) => lines.push(captured),
            Err(poisoned) => poisoned.into_inner().push(captured),
        }
    }
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}
