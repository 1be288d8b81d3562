// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logger handle with global and per-facility level filtering

use super::entry::LogEntry;
use super::writer::{JsonWriter, LogWriter, TextWriter};
use super::{Facility, Severity};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

/// Logger handle for writing log entries
///
/// Cheap to clone; every clone shares the writer and the level settings, so
/// lowering the level on one handle affects every group task holding a copy.
pub struct Logger {
    writer: Arc<dyn LogWriter>,
    /// Global minimum log level (default: Info)
    global_min_level: Arc<AtomicU8>,
    /// Per-facility minimum log levels
    facility_min_levels: Arc<RwLock<HashMap<Facility, Severity>>>,
}

impl Logger {
    pub fn with_writer(writer: Arc<dyn LogWriter>) -> Self {
        Self {
            writer,
            global_min_level: Arc::new(AtomicU8::new(Severity::Info as u8)),
            facility_min_levels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Human-readable lines on stdout
    pub fn text() -> Self {
        Self::with_writer(Arc::new(TextWriter))
    }

    /// JSON objects on stderr, for log shippers
    pub fn json() -> Self {
        Self::with_writer(Arc::new(JsonWriter))
    }

    /// Whether a message at `severity` from `facility` would be written
    #[inline]
    pub fn is_enabled(&self, severity: Severity, facility: Facility) -> bool {
        // Facility-specific level overrides the global one
        if let Ok(levels) = self.facility_min_levels.read() {
            if let Some(&min_level) = levels.get(&facility) {
                return severity <= min_level;
            }
        }

        let global_min = self.global_min_level.load(Ordering::Relaxed);
        (severity as u8) <= global_min
    }

    #[inline]
    pub fn log(&self, severity: Severity, facility: Facility, message: &str) {
        if !self.is_enabled(severity, facility) {
            return;
        }
        self.writer.write(LogEntry::new(severity, facility, message));
    }

    #[inline]
    pub fn log_kv(
        &self,
        severity: Severity,
        facility: Facility,
        message: &str,
        kvs: &[(&str, &str)],
    ) {
        if !self.is_enabled(severity, facility) {
            return;
        }

        let mut entry = LogEntry::new(severity, facility, message);
        for (key, value) in kvs {
            entry.add_kv(key, value);
        }
        self.writer.write(entry);
    }

    #[inline]
    pub fn critical(&self, facility: Facility, message: &str) {
        self.log(Severity::Critical, facility, message);
    }

    #[inline]
    pub fn error(&self, facility: Facility, message: &str) {
        self.log(Severity::Error, facility, message);
    }

    #[inline]
    pub fn warning(&self, facility: Facility, message: &str) {
        self.log(Severity::Warning, facility, message);
    }

    #[inline]
    pub fn notice(&self, facility: Facility, message: &str) {
        self.log(Severity::Notice, facility, message);
    }

    #[inline]
    pub fn info(&self, facility: Facility, message: &str) {
        self.log(Severity::Info, facility, message);
    }

    #[inline]
    pub fn debug(&self, facility: Facility, message: &str) {
        self.log(Severity::Debug, facility, message);
    }

    pub fn set_global_level(&self, level: Severity) {
        self.global_min_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn global_level(&self) -> Severity {
        Severity::from_u8(self.global_min_level.load(Ordering::Relaxed)).unwrap_or(Severity::Info)
    }

    pub fn set_facility_level(&self, facility: Facility, level: Severity) {
        if let Ok(mut levels) = self.facility_min_levels.write() {
            levels.insert(facility, level);
        }
    }

    /// Fall back to the global level for `facility`
    pub fn clear_facility_level(&self, facility: Facility) {
        if let Ok(mut levels) = self.facility_min_levels.write() {
            levels.remove(&facility);
        }
    }
}

impl Clone for Logger {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            global_min_level: Arc::clone(&self.global_min_level),
            facility_min_levels: Arc::clone(&self.facility_min_levels),
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("global_level", &self.global_level())
            .finish_non_exhaustive()
    }
}
