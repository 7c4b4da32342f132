//! Access logging.
//!
//! One [`AccessRecord`] is written per dispatched request, after the
//! response is complete. Writers are isolated from each other: a panicking
//! writer is skipped and never affects the response or the other writers.

use chrono::{DateTime, SecondsFormat, Utc};
use http::{Method, StatusCode};
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub status: StatusCode,
    /// Response body size
    pub bytes: usize,
    pub duration: Duration,
}

impl AccessRecord {
    /// `<RFC3339> (<corr>) <METHOD> <path>?<query>: <status> (<bytes> bytes): <ms>msecs`
    pub fn to_line(&self) -> String {
        let target = match &self.query {
            Some(query) if !query.is_empty() => format!("{}?{query}", self.path),
            _ => self.path.clone(),
        };
        format!(
            "{} ({}) {} {}: {} ({} bytes): {}msecs",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.correlation_id,
            self.method,
            target,
            self.status.as_u16(),
            self.bytes,
            self.duration.as_millis()
        )
    }
}

pub trait AccessWriter: Send + Sync + 'static {
    fn write(&self, record: &AccessRecord);

    fn flush(&self) {}
}

/// Fan-out to every registered writer.
#[derive(Clone, Default)]
pub struct AccessLog {
    writers: Vec<Arc<dyn AccessWriter>>,
}

impl AccessLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, writer: Arc<dyn AccessWriter>) {
        self.writers.push(writer);
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    pub fn write(&self, record: &AccessRecord) {
        for writer in &self.writers {
            if catch_unwind(AssertUnwindSafe(|| writer.write(record))).is_err() {
                tracing::warn!(correlation_id = %record.correlation_id, "access writer panicked");
            }
        }
    }

    pub fn flush(&self) {
        for writer in &self.writers {
            let _ = catch_unwind(AssertUnwindSafe(|| writer.flush()));
        }
    }
}

impl std::fmt::Debug for AccessLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLog")
            .field("writers", &self.writers.len())
            .finish()
    }
}

/// Emits each record as a `tracing` event, leveled by status class.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAccessWriter;

impl AccessWriter for TracingAccessWriter {
    fn write(&self, r: &AccessRecord) {
        let status = r.status.as_u16();
        let ms = r.duration.as_millis() as u64;
        if r.status.is_server_error() {
            tracing::error!(correlation_id = %r.correlation_id, method = %r.method, path = %r.path, status, bytes = r.bytes, duration_ms = ms, "request");
        } else if r.status.is_client_error() {
            tracing::warn!(correlation_id = %r.correlation_id, method = %r.method, path = %r.path, status, bytes = r.bytes, duration_ms = ms, "request");
        } else {
            tracing::info!(correlation_id = %r.correlation_id, method = %r.method, path = %r.path, status, bytes = r.bytes, duration_ms = ms, "request");
        }
    }
}

/// Writes one text line per record.
pub struct TextAccessWriter<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> TextAccessWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send + 'static> AccessWriter for TextAccessWriter<W> {
    fn write(&self, record: &AccessRecord) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(out, "{}", record.to_line());
    }

    fn flush(&self) {
        if let Ok(mut out) = self.out.lock() {
            let _ = out.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record() -> AccessRecord {
        AccessRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            correlation_id: "ABC123".into(),
            method: Method::GET,
            path: "/user/7".into(),
            query: Some("full=true".into()),
            status: StatusCode::OK,
            bytes: 42,
            duration: Duration::from_millis(15),
        }
    }

    #[test]
    fn text_line_format() {
        assert_eq!(
            record().to_line(),
            "2024-05-01T12:30:00.000Z (ABC123) GET /user/7?full=true: 200 (42 bytes): 15msecs"
        );
    }

    #[test]
    fn empty_query_is_omitted() {
        let mut r = record();
        r.query = None;
        assert!(r.to_line().contains("GET /user/7: 200"));
    }

    struct Panicking;

    impl AccessWriter for Panicking {
        fn write(&self, _record: &AccessRecord) {
            panic!("writer failure");
        }
    }

    struct Collect(Mutex<Vec<String>>);

    impl AccessWriter for Collect {
        fn write(&self, record: &AccessRecord) {
            self.0.lock().unwrap().push(record.correlation_id.clone());
        }
    }

    #[test]
    fn panicking_writer_does_not_stop_the_others() {
        let collect = Arc::new(Collect(Mutex::new(Vec::new())));
        let mut log = AccessLog::new();
        log.add(Arc::new(Panicking));
        log.add(collect.clone());
        log.write(&record());
        assert_eq!(*collect.0.lock().unwrap(), vec!["ABC123"]);
    }

    #[test]
    fn text_writer_appends_lines() {
        let writer = TextAccessWriter::new(Vec::new());
        writer.write(&record());
        writer.write(&record());
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
