// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Failure types returned by the per-group loops.
//!
//! Loops never exit the process themselves; they return a [`GroupError`] to
//! the supervisor, which applies its failure policy.

use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid group definition reaching a loop
    Config,
    /// Unknown interface or no usable address on it
    Interface,
    /// Socket creation, bind, join or option failure
    Socket,
    /// Read or write failure on an established socket
    Transport,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "configuration",
            ErrorKind::Interface => "interface",
            ErrorKind::Socket => "socket",
            ErrorKind::Transport => "transport",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fatal failure of one group's loop
#[derive(Error, Debug)]
#[error("{kind} error: {context}: {source}")]
pub struct GroupError {
    pub kind: ErrorKind,
    /// Names the failing group, interface or address
    pub context: String,
    #[source]
    pub source: io::Error,
}

impl GroupError {
    pub fn new(kind: ErrorKind, context: impl Into<String>, source: io::Error) -> Self {
        Self {
            kind,
            context: context.into(),
            source,
        }
    }

    pub fn interface(context: impl Into<String>, source: io::Error) -> Self {
        Self::new(ErrorKind::Interface, context, source)
    }

    /// A group definition that failed validation
    pub fn config(context: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::Config,
            context,
            io::Error::new(io::ErrorKind::InvalidInput, reason.to_string()),
        )
    }

    pub fn transport(context: impl Into<String>, source: io::Error) -> Self {
        Self::new(ErrorKind::Transport, context, source)
    }
}

/// Attach an [`ErrorKind`] and context to an `io::Result`
pub trait GroupResultExt<T> {
    fn group_context<F, C>(self, kind: ErrorKind, context: F) -> Result<T, GroupError>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> GroupResultExt<T> for io::Result<T> {
    fn group_context<F, C>(self, kind: ErrorKind, context: F) -> Result<T, GroupError>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| GroupError::new(kind, context(), e))
    }
}
