use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use carousel_dataset::{
    build_dataset, log_run_failed, log_run_finish, log_run_start, DatasetConfig, LoggingConfig,
};
use tempfile::tempdir;
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn write_inputs(dir: &Path, prints: &str) {
    fs::write(dir.join("prints.json"), prints).expect("prints written");
    fs::write(dir.join("taps.json"), "").expect("taps written");
    fs::write(dir.join("pays.csv"), "pay_date,user_id,value_prop,total\n").expect("pays written");
}

#[test]
fn successful_build_emits_stage_events() {
    let dir = tempdir().expect("temp dir should be created");
    write_inputs(
        dir.path(),
        "{\"day\":\"2025-08-10\",\"user_id\":\"U1\",\"event_data\":{\"value_prop\":\"V1\",\"position\":0}}\n",
    );

    let logs = capture_logs(Level::INFO, || {
        let report = build_dataset(
            dir.path(),
            &dir.path().join("out.csv"),
            &DatasetConfig::default(),
        )
        .expect("build succeeds");
        assert_eq!(report.output_rows, 1);
        log_run_finish(&report);
    });

    assert!(logs.contains("\"event\":\"dataset.build.start\""));
    assert!(logs.contains("\"event\":\"events.load.finish\""));
    assert!(logs.contains("\"event\":\"payments.load.finish\""));
    assert!(logs.contains("\"event\":\"window.compute.finish\""));
    assert!(logs.contains("\"event\":\"dataset.assemble.finish\""));
    assert!(logs.contains("\"event\":\"dataset.build.finish\""));
    assert!(logs.contains("\"event\":\"run.finish\""));
}

#[test]
fn empty_inputs_emit_warnings() {
    let dir = tempdir().expect("temp dir should be created");
    write_inputs(dir.path(), "");

    let logs = capture_logs(Level::WARN, || {
        build_dataset(
            dir.path(),
            &dir.path().join("out.csv"),
            &DatasetConfig::default(),
        )
        .expect("empty inputs still build");
    });

    assert!(logs.contains("\"event\":\"events.load.empty\""));
    assert!(logs.contains("\"event\":\"dataset.assemble.no_impressions\""));
    assert!(!logs.contains("\"event\":\"dataset.build.start\""));
}

#[test]
fn failed_run_reports_reason_once() {
    let dir = tempdir().expect("temp dir should be created");

    let logs = capture_logs(Level::INFO, || {
        log_run_start(&LoggingConfig::default(), dir.path(), &dir.path().join("out.csv"));
        let err = build_dataset(
            dir.path(),
            &dir.path().join("out.csv"),
            &DatasetConfig::default(),
        )
        .expect_err("missing inputs must fail");
        log_run_failed(&err);
    });

    assert!(logs.contains("\"event\":\"run.start\""));
    assert_eq!(logs.matches("\"event\":\"run.failed\"").count(), 1);
    assert!(logs.contains("required input file not found"));
}
