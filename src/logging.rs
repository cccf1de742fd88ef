//! A pluggable logging sink.
//!
//! The library never assumes a concrete sink (no global logger, no `log`
//! facade singleton); an [`Endpoint`](crate::endpoint) is constructed with
//! one, and [`NopLogger`] is a ready-made default that discards everything.

use std::fmt;

/// Severity of a log message.
///
/// `Trace` sits below `Debug` for the raw-datagram-dump verbosity that CoAP
/// engineering traffic tends to need; it's additive to the four levels a
/// sink is required to handle meaningfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      | Level::Trace => "TRACE",
      | Level::Debug => "DEBUG",
      | Level::Info => "INFO",
      | Level::Warn => "WARN",
      | Level::Error => "ERROR",
    };
    f.write_str(s)
  }
}

/// A sink that messages are logged to.
///
/// Implementors must be `Send + Sync` since the endpoint's receive thread,
/// poller thread, and caller threads all log concurrently.
pub trait Logger: Send + Sync {
  fn log(&self, level: Level, message: &str);
}

/// The default sink: discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopLogger;

impl Logger for NopLogger {
  fn log(&self, _level: Level, _message: &str) {}
}

/// Writes every message to stderr, prefixed with its level.
///
/// A minimal concrete sink for examples and tests; applications are
/// expected to bring their own (e.g. bridging to `log` or `tracing`).
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrLogger;

impl Logger for StderrLogger {
  fn log(&self, level: Level, message: &str) {
    eprintln!("[{level}] {message}");
  }
}
