// SPDX-License-Identifier: Apache-2.0 OR MIT
// Output destinations for log entries

use super::entry::LogEntry;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Destination for log entries that passed the level filter
pub trait LogWriter: Send + Sync {
    fn write(&self, entry: LogEntry);
}

/// Plain text lines on stdout
pub struct TextWriter;

impl LogWriter for TextWriter {
    fn write(&self, entry: LogEntry) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", entry.to_text_line());
    }
}

/// One JSON object per line on stderr
pub struct JsonWriter;

impl LogWriter for JsonWriter {
    fn write(&self, entry: LogEntry) {
        eprintln!("{}", entry.to_json());
    }
}

/// Keeps entries in memory so tests can assert on what was logged
#[derive(Clone, Default)]
pub struct MemoryWriter {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|e| e.message.contains(needle))
    }
}

impl LogWriter for MemoryWriter {
    fn write(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Facility, Severity};

    #[test]
    fn test_memory_writer_shares_entries_between_clones() {
        let writer = MemoryWriter::new();
        let clone = writer.clone();

        clone.write(LogEntry::new(Severity::Info, Facility::Test, "hello"));

        assert_eq!(writer.entries().len(), 1);
        assert!(writer.contains("hello"));
        assert!(!writer.contains("goodbye"));
    }
}
