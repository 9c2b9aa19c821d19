//! Tracing setup and the bounded log file
//!
//! Both binaries log through `tracing`. In silent mode the client has no
//! console to speak to, so events go to a small file that keeps only its
//! most recent lines.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Lines kept by a bounded log unless configured otherwise
pub const DEFAULT_LOG_MAX_LINES: usize = 100;

/// Log file that is trimmed to its last `max_lines` lines after every write
#[derive(Debug, Clone)]
pub struct BoundedLogFile {
    inner: Arc<BoundedInner>,
}

#[derive(Debug)]
struct BoundedInner {
    path: PathBuf,
    max_lines: usize,
    // Serializes append+trim across writers
    lock: Mutex<()>,
}

impl BoundedLogFile {
    /// Create a bounded log at `path`; the file and its directory are created lazily
    pub fn new(path: impl Into<PathBuf>, max_lines: usize) -> Self {
        Self {
            inner: Arc::new(BoundedInner {
                path: path.into(),
                max_lines,
                lock: Mutex::new(()),
            }),
        }
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Append a chunk of text and trim the file
    pub fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let _guard = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(bytes)?;
        drop(file);

        self.trim()
    }

    fn trim(&self) -> io::Result<()> {
        let contents = fs::read_to_string(&self.inner.path)?;
        let lines: Vec<&str> = contents.lines().collect();
        if lines.len() <= self.inner.max_lines {
            return Ok(());
        }

        let mut kept = lines[lines.len() - self.inner.max_lines..].join("\n");
        kept.push('\n');
        fs::write(&self.inner.path, kept)
    }
}

/// Writer handed out per event; flushes its buffer into the file on drop
pub struct BoundedLogWriter {
    log: BoundedLogFile,
    buffer: Vec<u8>,
}

impl Write for BoundedLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let result = self.log.append(&self.buffer);
        self.buffer.clear();
        result
    }
}

impl Drop for BoundedLogWriter {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            // The logger itself failed; stderr is the only place left
            eprintln!("Logging error: {}", e);
        }
    }
}

impl<'a> MakeWriter<'a> for BoundedLogFile {
    type Writer = BoundedLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        BoundedLogWriter {
            log: self.clone(),
            buffer: Vec::new(),
        }
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides `level`. With a log file, events go to the file only;
/// otherwise to stderr.
pub fn init_tracing(level: &str, log_file: Option<BoundedLogFile>) {
    let filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()));

    let (console, file) = match log_file {
        Some(file) => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(file),
            ),
        ),
        None => (
            Some(tracing_subscriber::fmt::layer().with_writer(io::stderr)),
            None,
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
}
