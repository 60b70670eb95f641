// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line-oriented output targets.
//!
//! A sink never fails from the caller's point of view: write errors are logged
//! and dropped, since a broken metrics pipe must not take the host down with it.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

/// Destination for formatted metric lines.
pub trait Sink: Send + Sync {
    /// Writes each line in order. An empty slice is a no-op.
    fn emit(&self, lines: &[String]);
}

fn write_lines(writer: &mut impl Write, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Writes to the process's standard output, one line per metric line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn emit(&self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        let stdout = io::stdout();
        if let Err(e) = write_lines(&mut stdout.lock(), lines) {
            warn!("Failed to write {} metric lines to stdout: {e}", lines.len());
        }
    }
}

/// Writes to any [`Write`] implementation, e.g. a file or a socket.
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        WriterSink {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn emit(&self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = write_lines(&mut *writer, lines) {
            warn!("Failed to write {} metric lines: {e}", lines.len());
        }
    }
}

/// Keeps every emitted line in memory. Useful for hosts that ship lines
/// themselves, and for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes and returns everything emitted so far.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Sink for MemorySink {
    fn emit(&self, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        debug!("Captured {} metric lines", lines.len());
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_sink_writes_one_line_per_entry() {
        let sink = WriterSink::new(Vec::new());
        sink.emit(&["count#a=1.0".to_string(), "count#b=2.0".to_string()]);

        let written = String::from_utf8(sink.into_inner()).unwrap_or_default();
        assert_eq!(written, "count#a=1.0\ncount#b=2.0\n");
    }

    #[test]
    fn empty_input_writes_nothing() {
        let sink = WriterSink::new(Vec::new());
        sink.emit(&[]);
        assert!(sink.into_inner().is_empty());

        let memory = MemorySink::new();
        memory.emit(&[]);
        assert!(memory.lines().is_empty());
    }

    #[test]
    #[traced_test]
    fn write_errors_are_swallowed() {
        let sink = WriterSink::new(BrokenPipe);
        sink.emit(&["count#a=1.0".to_string()]);

        assert!(logs_contain("Failed to write 1 metric lines: pipe closed"));
    }

    #[test]
    fn memory_sink_take_empties_it() {
        let sink = MemorySink::new();
        sink.emit(&["count#a=1.0".to_string()]);

        assert_eq!(sink.lines(), vec!["count#a=1.0"]);
        assert_eq!(sink.take(), vec!["count#a=1.0"]);
        assert!(sink.lines().is_empty());
    }
}
