use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSON-lines event sink shared by the walker and the book writer.
#[derive(Clone)]
pub struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: BTreeMap<String, u64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: BTreeMap::new(),
            })),
        })
    }

    /// Writes one event. `fields` is merged into `{"type": kind}`.
    pub fn log_event(&self, kind: &str, fields: Value) {
        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(kind.to_string()));
        if let Value::Object(extra) = fields {
            event.extend(extra);
        }
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{}", Value::Object(event));
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    /// Writes the accumulated counters and resets them.
    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let counters = std::mem::take(&mut state.counters);
            let event = json!({
                "type": "debug.summary",
                "context": context,
                "counts": counters,
            });
            let _ = writeln!(state.writer, "{event}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_events_and_sorted_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("layout.jsonl");
        let logger = DebugLogger::new(&path).expect("logger");
        logger.log_event("layout.warning", json!({"code": "TABLE_OVERFLOW", "detail": "a \"quoted\" value"}));
        logger.increment("warnings", 2);
        logger.increment("articles", 1);
        logger.emit_summary("book");
        logger.flush();

        let raw = std::fs::read_to_string(&path).expect("read log");
        let lines: Vec<Value> = raw
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "layout.warning");
        assert_eq!(lines[0]["detail"], "a \"quoted\" value");
        assert_eq!(lines[1]["counts"]["warnings"], 2);
        assert_eq!(lines[1]["context"], "book");
    }
}
