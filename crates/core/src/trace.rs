use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub record_id: String,
    pub run_id: String,
    pub stage: String,
    pub attempt: u32,
    pub input: String,
    pub output: String,
    pub recorded_at: DateTime<Utc>,
}

impl TraceRecord {
    pub fn new(
        run_id: impl Into<String>,
        stage: impl Into<String>,
        attempt: u32,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            stage: stage.into(),
            attempt,
            input: input.into(),
            output: output.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Fire-and-forget destination for trace records. Implementations must not panic or
/// block the run when their backing store is unavailable.
pub trait TraceSink: Send + Sync {
    fn record(&self, record: TraceRecord);
}

impl<T> TraceSink for Arc<T>
where
    T: TraceSink + ?Sized,
{
    fn record(&self, record: TraceRecord) {
        (**self).record(record);
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTraceSink {
    records: Arc<Mutex<Vec<TraceRecord>>>,
}

impl InMemoryTraceSink {
    pub fn records(&self) -> Vec<TraceRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn stages(&self) -> Vec<String> {
        self.records().into_iter().map(|record| record.stage).collect()
    }
}

impl TraceSink for InMemoryTraceSink {
    fn record(&self, record: TraceRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

/// Forwards records to the `tracing` subscriber; prompts only at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTraceSink;

impl TraceSink for TracingTraceSink {
    fn record(&self, record: TraceRecord) {
        info!(
            event_name = "agent.trace.stage_recorded",
            correlation_id = %record.run_id,
            stage = %record.stage,
            attempt = record.attempt,
            output = %record.output,
            "stage output recorded"
        );
        debug!(
            event_name = "agent.trace.stage_input",
            correlation_id = %record.run_id,
            stage = %record.stage,
            input = %record.input,
            "stage input recorded"
        );
    }
}

/// Appends one JSON object per line. Write failures are logged and dropped.
pub struct JsonlTraceSink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl JsonlTraceSink {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(file),
            Err(error) => {
                warn!(
                    event_name = "agent.trace.sink_unavailable",
                    path = %path.display(),
                    error = %error,
                    "trace file could not be opened; records will be dropped"
                );
                None
            }
        };
        Self { path, file: Mutex::new(file) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, record: TraceRecord) {
        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(file) = guard.as_mut() else {
            return;
        };

        let written = serde_json::to_string(&record)
            .map_err(|error| error.to_string())
            .and_then(|line| writeln!(file, "{line}").map_err(|error| error.to_string()));
        if let Err(error) = written {
            warn!(
                event_name = "agent.trace.record_dropped",
                correlation_id = %record.run_id,
                stage = %record.stage,
                error = %error,
                "trace record could not be written"
            );
        }
    }
}

#[derive(Default)]
pub struct CompositeTraceSink {
    sinks: Vec<Box<dyn TraceSink>>,
}

impl CompositeTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink<S>(mut self, sink: S) -> Self
    where
        S: TraceSink + 'static,
    {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TraceSink for CompositeTraceSink {
    fn record(&self, record: TraceRecord) {
        for sink in &self.sinks {
            sink.record(record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{CompositeTraceSink, InMemoryTraceSink, JsonlTraceSink, TraceRecord, TraceSink};

    #[test]
    fn in_memory_sink_keeps_records_in_order() {
        let sink = InMemoryTraceSink::default();
        sink.record(TraceRecord::new("run-1", "reason", 0, "prompt", "Employees"));
        sink.record(TraceRecord::new("run-1", "think", 0, "prompt", "order by salary"));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(sink.stages(), vec!["reason".to_string(), "think".to_string()]);
        assert_eq!(records[0].run_id, "run-1");
        assert_ne!(records[0].record_id, records[1].record_id);
    }

    #[test]
    fn jsonl_sink_appends_one_line_per_record() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("trace.jsonl");
        let sink = JsonlTraceSink::open(&path);
        sink.record(TraceRecord::new("run-2", "act", 1, "prompt", "SELECT 1"));
        sink.record(TraceRecord::new("run-2", "observe", 1, "SELECT 1", "rejected"));

        let contents = fs::read_to_string(&path).expect("trace file should exist");
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let first: TraceRecord = serde_json::from_str(lines[0]).expect("valid json line");
        assert_eq!(first.stage, "act");
        assert_eq!(first.attempt, 1);
    }

    #[test]
    fn jsonl_sink_drops_records_when_file_cannot_be_opened() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("missing-dir").join("trace.jsonl");
        let sink = JsonlTraceSink::open(&path);
        sink.record(TraceRecord::new("run-3", "reason", 0, "prompt", "output"));
        assert!(!path.exists());
    }

    #[test]
    fn composite_sink_fans_out_to_every_sink() {
        let first = InMemoryTraceSink::default();
        let second = InMemoryTraceSink::default();
        let composite =
            CompositeTraceSink::new().with_sink(first.clone()).with_sink(second.clone());
        composite.record(TraceRecord::new("run-4", "answer", 0, "prompt", "done"));

        assert_eq!(composite.len(), 2);
        assert_eq!(first.records().len(), 1);
        assert_eq!(second.records().len(), 1);
    }
}
