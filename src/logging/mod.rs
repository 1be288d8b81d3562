// SPDX-License-Identifier: Apache-2.0 OR MIT
// Facility/severity logging shared by every group task.
//
// A `Logger` is created once in `main` and handed to each component
// explicitly; nothing here is process-global.

mod entry;
mod facility;
mod logger;
mod severity;
mod writer;

pub use entry::LogEntry;
pub use facility::Facility;
pub use logger::Logger;
pub use severity::Severity;
pub use writer::{JsonWriter, LogWriter, MemoryWriter, TextWriter};
