//! In-memory [`GenericClient`] and `tracing` capture for unit tests.
//!
//! [`MemoryClient`] records every statement it receives and answers `query`
//! calls from a queue of canned results. An empty queue answers with no rows.
//! [`capture_events`] installs a thread-local subscriber that keeps the
//! target and level of every event, in emission order.

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use crate::value::{Attrs, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub sql: String,
    pub values: Vec<Value>,
}

#[derive(Default)]
pub(crate) struct MemoryClient {
    calls: Mutex<Vec<Call>>,
    responses: Mutex<VecDeque<OrmResult<Vec<Attrs>>>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_rows(&self, rows: Vec<Attrs>) {
        self.responses.lock().unwrap().push_back(Ok(rows));
    }

    pub fn push_error(&self, err: OrmError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sqls(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.sql).collect()
    }

    fn record(&self, sql: &str, values: &[Value]) -> OrmResult<Vec<Attrs>> {
        self.calls.lock().unwrap().push(Call {
            sql: sql.to_string(),
            values: values.to_vec(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

impl GenericClient for MemoryClient {
    async fn query(&self, sql: &str, values: &[Value]) -> OrmResult<Vec<Attrs>> {
        self.record(sql, values)
    }

    async fn execute(&self, sql: &str, values: &[Value]) -> OrmResult<u64> {
        self.record(sql, values).map(|rows| rows.len() as u64)
    }

    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        self.record(sql, &[]).map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Captured {
    pub target: String,
    pub level: Level,
}

#[derive(Clone, Default)]
pub(crate) struct CapturedEvents(Arc<Mutex<Vec<Captured>>>);

impl CapturedEvents {
    pub fn all(&self) -> Vec<Captured> {
        self.0.lock().unwrap().clone()
    }

    /// Targets of every event, in order.
    pub fn targets(&self) -> Vec<String> {
        self.all().into_iter().map(|e| e.target).collect()
    }

    pub fn warnings_on(&self, target: &str) -> usize {
        self.all()
            .iter()
            .filter(|e| e.target == target && e.level == Level::WARN)
            .count()
    }
}

struct CaptureLayer(CapturedEvents);

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        (self.0).0.lock().unwrap().push(Captured {
            target: meta.target().to_string(),
            level: *meta.level(),
        });
    }
}

/// Capture events on the current thread until the guard is dropped.
/// `#[tokio::test]` runs on a current-thread runtime, so async code is seen.
pub(crate) fn capture_events() -> (DefaultGuard, CapturedEvents) {
    let events = CapturedEvents::default();
    let subscriber = tracing_subscriber::registry().with(CaptureLayer(events.clone()));
    (tracing::subscriber::set_default(subscriber), events)
}
