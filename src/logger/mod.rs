//! JSON-lines logging: append-only file sink with graceful degradation.
//!
//! The logger is initialized once at process start with a name and a
//! destination directory. Every fatal path writes through it before the
//! process terminates; when even the sink cannot be opened, callers fall
//! back to plain stderr (`main` handles that case, the library never
//! panics over a log line).

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::errors::{CsmError, Result};

/// Log severity, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Serialize)]
struct Record<'a> {
    ts: String,
    level: Level,
    logger: &'a str,
    message: &'a str,
}

#[derive(Debug)]
struct Inner {
    name: String,
    sink: Mutex<File>,
    /// Echo every record to stderr (debug mode).
    echo_stderr: bool,
}

/// Cheaply cloneable handle to the process-wide log sink.
#[derive(Clone, Debug)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl Logger {
    /// Open (or create) `<dir>/<name>.log` for appending.
    ///
    /// The directory is created if absent. Failure here is fatal for the
    /// agent; callers report it on a fallback console channel.
    pub fn init(name: &str, dir: &Path, echo_stderr: bool) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| CsmError::LogInit {
            path: dir.to_path_buf(),
            details: e.to_string(),
        })?;
        let path = dir.join(format!("{name}.log"));
        let sink = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CsmError::LogInit {
                path,
                details: e.to_string(),
            })?;
        Ok(Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                sink: Mutex::new(sink),
                echo_stderr,
            }),
        })
    }

    /// Path of the sink file for a given init call.
    #[must_use]
    pub fn sink_path(name: &str, dir: &Path) -> PathBuf {
        dir.join(format!("{name}.log"))
    }

    pub fn debug(&self, message: &str) {
        self.write(Level::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.write(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.write(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.write(Level::Error, message);
    }

    /// Log a fatal error with its full source chain, outermost first.
    pub fn error_chain(&self, context: &str, err: &dyn std::error::Error) {
        self.error(&format_error_chain(context, err));
    }

    fn write(&self, level: Level, message: &str) {
        let record = Record {
            ts: Utc::now().to_rfc3339(),
            level,
            logger: &self.inner.name,
            message,
        };
        let line = serde_json::to_string(&record).unwrap_or_else(|_| {
            String::from("{\"level\":\"error\",\"message\":\"unserializable log record\"}")
        });
        // Sink write failures degrade to stderr; logging never takes the
        // process down.
        let mut sink = self.inner.sink.lock();
        if writeln!(sink, "{line}").is_err() || self.inner.echo_stderr {
            eprintln!("{line}");
        }
    }
}

/// Render `err` and every `source()` beneath it into one line.
#[must_use]
pub fn format_error_chain(context: &str, err: &dyn std::error::Error) -> String {
    let mut out = format!("{context}: {err}");
    let mut cause = err.source();
    while let Some(c) = cause {
        out.push_str(": caused by: ");
        out.push_str(&c.to_string());
        cause = c.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{Logger, format_error_chain};
    use crate::core::errors::CsmError;
    use tempfile::TempDir;

    #[test]
    fn init_creates_directory_and_sink() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("logs");
        let logger = Logger::init("csm_agent", &dir, false).expect("init should succeed");
        logger.info("agent starting");

        let contents = std::fs::read_to_string(Logger::sink_path("csm_agent", &dir)).unwrap();
        assert!(contents.contains("agent starting"));
    }

    #[test]
    fn records_are_json_lines() {
        let tmp = TempDir::new().unwrap();
        let logger = Logger::init("csm_agent", tmp.path(), false).unwrap();
        logger.warn("marker file missing");
        logger.error("detach failed");

        let contents =
            std::fs::read_to_string(Logger::sink_path("csm_agent", tmp.path())).unwrap();
        for line in contents.lines() {
            let value: serde_json::Value = serde_json::from_str(line).expect("line should be JSON");
            assert_eq!(value["logger"], "csm_agent");
            assert!(value["ts"].is_string());
        }
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn init_fails_when_directory_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("logs");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = Logger::init("csm_agent", &blocker, false).unwrap_err();
        assert_eq!(err.code(), "CSM-1101");
    }

    #[test]
    fn error_chain_walks_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied");
        let err = CsmError::marker("/var/run/csm/csm_agent.pid", io);
        let text = format_error_chain("initialization failed", &err);
        assert!(text.contains("initialization failed"));
        assert!(text.contains("CSM-2003"));
        assert!(text.contains("caused by: permission denied"));
    }
}
