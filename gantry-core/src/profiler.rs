// Profiler collaborator contract

use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A span handed out by a [`Profiler`]. Ended exactly once, optionally with
/// free-form data attached.
pub trait ProfilerSpan: Send {
    fn end(self: Box<Self>, data: Option<serde_json::Value>);
}

/// Narrow profiling contract consumed by the pipeline: start a named span,
/// end it with optional data. The pipeline never defines metric formats.
pub trait Profiler: Send + Sync {
    fn start(&self, name: &str) -> Box<dyn ProfilerSpan>;
}

/// No-op profiler used when none is supplied
#[derive(Default)]
pub struct NullProfiler;

struct NullSpan;

impl ProfilerSpan for NullSpan {
    fn end(self: Box<Self>, _data: Option<serde_json::Value>) {}
}

impl Profiler for NullProfiler {
    fn start(&self, _name: &str) -> Box<dyn ProfilerSpan> {
        Box::new(NullSpan)
    }
}

/// Profiler that reports span durations through `tracing`
#[derive(Default)]
pub struct TracingProfiler;

struct TracingSpan {
    name: String,
    started: Instant,
}

impl ProfilerSpan for TracingSpan {
    fn end(self: Box<Self>, data: Option<serde_json::Value>) {
        let elapsed = self.started.elapsed();
        match data {
            Some(data) => debug!(
                span = %self.name,
                duration_us = elapsed.as_micros() as u64,
                data = %data,
                "Profiler span closed"
            ),
            None => debug!(
                span = %self.name,
                duration_us = elapsed.as_micros() as u64,
                "Profiler span closed"
            ),
        }
    }
}

impl Profiler for TracingProfiler {
    fn start(&self, name: &str) -> Box<dyn ProfilerSpan> {
        Box::new(TracingSpan {
            name: name.to_string(),
            started: Instant::now(),
        })
    }
}

/// Shared handle the server stores and clones into contexts
pub type SharedProfiler = Arc<dyn Profiler>;

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingProfiler {
        ended: Arc<Mutex<Vec<String>>>,
    }

    struct RecordingSpan {
        name: String,
        ended: Arc<Mutex<Vec<String>>>,
    }

    impl ProfilerSpan for RecordingSpan {
        fn end(self: Box<Self>, _data: Option<serde_json::Value>) {
            self.ended.lock().push(self.name);
        }
    }

    impl Profiler for RecordingProfiler {
        fn start(&self, name: &str) -> Box<dyn ProfilerSpan> {
            Box::new(RecordingSpan {
                name: name.to_string(),
                ended: self.ended.clone(),
            })
        }
    }

    #[test]
    fn test_spans_record_on_end() {
        let ended = Arc::new(Mutex::new(Vec::new()));
        let profiler = RecordingProfiler { ended: ended.clone() };

        let span = profiler.start("http_request");
        assert!(ended.lock().is_empty());
        span.end(None);
        assert_eq!(*ended.lock(), vec!["http_request".to_string()]);
    }

    #[test]
    fn test_null_profiler_is_silent() {
        let profiler = NullProfiler;
        let span = profiler.start("anything");
        span.end(Some(serde_json::json!({"ok": true})));
    }
}
