use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Per-run decision log.
///
/// Opened at the start of a run and closed at its end; every component that
/// makes a decision receives it by reference. Lines go to the log file (when
/// open), to stderr (when `echo` is set) and to an in-memory buffer (when
/// capturing).
pub struct RunLog {
    echo: bool,
    t0: Instant,
    path: Option<PathBuf>,
    file: RefCell<Option<BufWriter<File>>>,
    /// First failed write to the file; reported by `close`.
    failed: RefCell<Option<io::Error>>,
    captured: Option<RefCell<Vec<String>>>,
}

impl RunLog {
    pub fn open(path: &Path, echo: bool) -> Result<Self> {
        let f = File::create(path).map_err(|e| Error::save(path, e))?;
        Ok(Self {
            echo,
            t0: Instant::now(),
            path: Some(path.to_path_buf()),
            file: RefCell::new(Some(BufWriter::new(f))),
            failed: RefCell::new(None),
            captured: None,
        })
    }

    pub fn console(echo: bool) -> Self {
        Self {
            echo,
            t0: Instant::now(),
            path: None,
            file: RefCell::new(None),
            failed: RefCell::new(None),
            captured: None,
        }
    }

    pub fn disabled() -> Self {
        Self::console(false)
    }

    /// Keeps every line in memory; used by tests to assert on decisions.
    pub fn capturing() -> Self {
        Self {
            echo: false,
            t0: Instant::now(),
            path: None,
            file: RefCell::new(None),
            failed: RefCell::new(None),
            captured: Some(RefCell::new(Vec::new())),
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.write(Level::Info, msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.write(Level::Warn, msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        self.write(Level::Error, msg.as_ref());
    }

    /// Console-only progress line; not part of the decision log.
    pub fn progress(&self, label: &str, current: usize, total: usize) {
        if !self.echo {
            return;
        }
        let total = total.max(1);
        let current = current.min(total);
        let pct = (current as f64 / total as f64) * 100.0;
        let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{ts}] {label} {current}/{total} ({pct:5.1}%)");
    }

    pub fn lines(&self) -> Vec<String> {
        self.captured
            .as_ref()
            .map(|c| c.borrow().clone())
            .unwrap_or_default()
    }

    /// Flushes and releases the log file. Later writes only reach stderr.
    ///
    /// Fails with the first write error when any line was lost.
    pub fn close(&self) -> Result<()> {
        let flushed = match self.file.borrow_mut().take() {
            Some(mut w) => w.flush(),
            None => Ok(()),
        };
        let first = self.failed.borrow_mut().take();
        match (first, flushed) {
            (Some(e), _) | (None, Err(e)) => Err(self.save_error(e)),
            (None, Ok(())) => Ok(()),
        }
    }

    fn save_error(&self, err: io::Error) -> Error {
        match self.path.as_deref() {
            Some(p) => Error::save(p, err),
            None => Error::Io(err),
        }
    }

    fn write(&self, level: Level, msg: &str) {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{stamp}] {} {msg}", level.as_str());
        if let Some(w) = self.file.borrow_mut().as_mut() {
            if let Err(e) = writeln!(w, "{line}") {
                self.failed.borrow_mut().get_or_insert(e);
            }
        }
        if let Some(c) = self.captured.as_ref() {
            c.borrow_mut().push(line.clone());
        }
        if self.echo {
            let ts = fmt_elapsed(self.t0.elapsed().as_secs_f64());
            let mut stderr = io::stderr().lock();
            let _ = writeln!(stderr, "[{ts}] {} {msg}", level.as_str());
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn fmt_elapsed(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capturing_keeps_level_and_message() {
        let log = RunLog::capturing();
        log.info("ghost removed: sec9");
        log.warn("refresh failed");
        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("INFO ghost removed: sec9"));
        assert!(lines[1].contains(" WARN refresh failed"));
    }

    #[test]
    fn file_sink_is_flushed_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("process_log.txt");
        let log = RunLog::open(&path, false).unwrap();
        log.info("orphan bookmark removed: figA");
        log.close().unwrap();
        log.info("after close");
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("INFO orphan bookmark removed: figA"));
        assert!(!text.contains("after close"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_writes_are_reported_on_close() {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let log = RunLog::open(full, false).unwrap();
        // larger than the buffer, so the write reaches the device at once
        log.info("x".repeat(64 * 1024));
        log.info("later line");
        let err = log.close().unwrap_err();
        assert!(matches!(err, Error::Save { .. }));
        assert!(log.close().is_ok());
    }

    #[test]
    fn elapsed_formatting() {
        assert_eq!(fmt_elapsed(5.2), "00:05");
        assert_eq!(fmt_elapsed(3725.0), "01:02:05");
    }
}
