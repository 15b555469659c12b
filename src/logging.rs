//! Process-wide logging: stdout plus an optional `run.log` file, both with
//! UTC timestamps

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const RUN_LOG_FILENAME: &str = "run.log";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn init_logging(log_dir: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_timer(utc_timer());

    let file_layer = match log_dir {
        Some(dir) => Some(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_timer(utc_timer())
                .with_writer(RunLogWriter::open(dir)?),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;
    Ok(())
}

fn utc_timer() -> ChronoUtc {
    ChronoUtc::new(TIMESTAMP_FORMAT.to_string())
}

/// Appends formatted log lines to `<log_dir>/run.log`
///
/// One un-rotated file shared by every run, so a plain append-mode handle is
/// all the file layer needs.
#[derive(Clone)]
pub struct RunLogWriter {
    file: Arc<Mutex<File>>,
}

impl RunLogWriter {
    pub fn open(log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(RUN_LOG_FILENAME))
            .context("Failed to open run log")?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }
}

impl<'a> MakeWriter<'a> for RunLogWriter {
    type Writer = RunLogWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        RunLogWriterGuard {
            file: self.file.clone(),
        }
    }
}

pub struct RunLogWriterGuard {
    file: Arc<Mutex<File>>,
}

impl Write for RunLogWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.lock() {
            Ok(mut file) => file.write(buf),
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.lock() {
            Ok(mut file) => file.flush(),
            Err(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_log_appends_across_writers() {
        let temp = tempfile::tempdir().expect("temp dir");
        let log_dir = temp.path().join("logs");

        let writer = RunLogWriter::open(&log_dir).expect("open");
        writer.make_writer().write_all(b"first\n").expect("write");
        writer.make_writer().write_all(b"second\n").expect("write");

        let reopened = RunLogWriter::open(&log_dir).expect("reopen");
        reopened.make_writer().write_all(b"third\n").expect("write");

        let contents = std::fs::read_to_string(log_dir.join(RUN_LOG_FILENAME)).expect("read");
        assert_eq!(contents, "first\nsecond\nthird\n");
    }
}
