//! Line-oriented log stream consumed by front ends
//!
//! Every stage reports progress as plain text lines (`[INFO] …`,
//! `[ERROR] …`) through a [`LogSink`]. Lines are delivered in the order they
//! are produced; buffering is left to the sink.

use crossbeam_channel::{Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Accepts one line of text at a time
pub trait LogSink {
    fn log(&self, line: &str);
}

impl<F> LogSink for F
where
    F: Fn(&str),
{
    fn log(&self, line: &str) {
        self(line)
    }
}

/// Discards every line
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _line: &str) {}
}

/// Collects lines in memory, for tests and front ends that redraw a log view
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl LogSink for MemorySink {
    fn log(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

/// Forwards lines to another thread over a channel
///
/// Lets a front end run the pipeline on a worker and drain lines on its own
/// thread. Lines sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<String>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel
    pub fn new() -> (Self, Receiver<String>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl LogSink for ChannelSink {
    fn log(&self, line: &str) {
        let _ = self.tx.send(line.to_string());
    }
}
