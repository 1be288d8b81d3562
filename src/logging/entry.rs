// SPDX-License-Identifier: Apache-2.0 OR MIT
// Log entry structure

use super::{Facility, Severity};
use chrono::{DateTime, SecondsFormat, Utc};

/// One formatted log record
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub facility: Facility,
    pub message: String,
    /// Structured context such as `group=239.1.1.1` or `interface=eth0`
    pub kvs: Vec<(String, String)>,
}

impl LogEntry {
    pub fn new(severity: Severity, facility: Facility, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            facility,
            message: message.to_string(),
            kvs: Vec::new(),
        }
    }

    pub fn add_kv(&mut self, key: &str, value: &str) {
        self.kvs.push((key.to_string(), value.to_string()));
    }

    pub fn get_kv(&self, key: &str) -> Option<&str> {
        self.kvs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Render as a single human-readable line:
    /// `<rfc3339 µs> [SEVERITY] [Facility] message key=value ...`
    pub fn to_text_line(&self) -> String {
        let mut line = format!(
            "{} [{}] [{}] {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.severity,
            self.facility,
            self.message
        );
        for (key, value) in &self.kvs {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        line
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            "level": self.severity.as_str(),
            "facility": self.facility.as_str(),
            "message": self.message,
        });
        if !self.kvs.is_empty() {
            let context: serde_json::Map<String, serde_json::Value> = self
                .kvs
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            value["context"] = serde_json::Value::Object(context);
        }
        value
    }
}
