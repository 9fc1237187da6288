//! The logging sink the core writes decisions through.
//!
//! The core never reads back from the sink (§6); it only ever pushes a
//! message and a severity tag. `ConsoleSink` is the concrete collaborator
//! `main.rs` wires in, colored the same way the original CLI summary was.

use owo_colors::OwoColorize;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Action,
    Warn,
    Error,
}

/// A write-only interface accepting a message and a severity tag. Must be
/// safe for multiple writers: the driver thread and every copy worker can
/// all log concurrently.
pub trait Sink: Send + Sync {
    fn log(&self, severity: Severity, message: &str);
}

/// Prints to stdout/stderr, tagged and colored by severity, guarded by a
/// mutex so interleaved writes from worker threads don't tear lines.
pub struct ConsoleSink {
    verbose: bool,
    lock: Mutex<()>,
}

impl ConsoleSink {
    pub fn new(verbose: bool) -> Self {
        ConsoleSink {
            verbose,
            lock: Mutex::new(()),
        }
    }
}

impl Sink for ConsoleSink {
    fn log(&self, severity: Severity, message: &str) {
        if severity == Severity::Info && !self.verbose {
            return;
        }
        let _guard = self.lock.lock().unwrap();
        match severity {
            Severity::Info => println!("{} {}", "[info]".dimmed(), message),
            Severity::Action => println!("{} {}", "[action]".green(), message),
            Severity::Warn => eprintln!("{} {}", "[warn]".yellow(), message),
            Severity::Error => eprintln!("{} {}", "[error]".red().bold(), message),
        }
    }
}

/// Accumulates lines in memory, for tests that want to assert on log
/// category tags without capturing stdout.
#[cfg(test)]
pub struct RecordingSink {
    pub lines: Mutex<Vec<(Severity, String)>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink {
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn contains(&self, substring: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(_, msg)| msg.contains(substring))
    }

    pub fn count_containing(&self, substring: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, msg)| msg.contains(substring))
            .count()
    }
}

#[cfg(test)]
impl Sink for RecordingSink {
    fn log(&self, severity: Severity, message: &str) {
        self.lines.lock().unwrap().push((severity, message.to_string()));
    }
}
