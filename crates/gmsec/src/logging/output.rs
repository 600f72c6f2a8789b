// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Log output destinations (stderr and append-to-file).

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity used for filtering, ordered from most to least verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO ",
            Self::Warning => "WARN ",
            Self::Error => "ERROR",
        }
    }

    pub(crate) fn to_filter(self) -> log::LevelFilter {
        match self {
            Self::Trace => log::LevelFilter::Trace,
            Self::Debug => log::LevelFilter::Debug,
            Self::Info => log::LevelFilter::Info,
            Self::Warning => log::LevelFilter::Warn,
            Self::Error => log::LevelFilter::Error,
        }
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Self::Trace,
            log::Level::Debug => Self::Debug,
            log::Level::Info => Self::Info,
            log::Level::Warn => Self::Warning,
            log::Level::Error => Self::Error,
        }
    }
}

/// Destination for formatted log lines.
pub trait Output: Send + Sync {
    /// Write one record.
    fn write(&self, level: LogLevel, target: &str, message: &str) -> io::Result<()>;

    /// Flush buffered output.
    fn flush(&self) -> io::Result<()>;
}

fn format_line(level: LogLevel, target: &str, message: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!(
        "{}.{:03} [{}] {}: {}\n",
        now.as_secs(),
        now.subsec_millis(),
        level.as_str(),
        target,
        message
    )
}

/// Writes to stderr.
#[derive(Debug, Default)]
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn new() -> Self {
        Self
    }
}

impl Output for ConsoleOutput {
    fn write(&self, level: LogLevel, target: &str, message: &str) -> io::Result<()> {
        io::stderr().write_all(format_line(level, target, message).as_bytes())
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Appends to a file.
pub struct FileOutput {
    file: Mutex<File>,
}

impl FileOutput {
    /// Open (or create) `path` for appending.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl Output for FileOutput {
    fn write(&self, level: LogLevel, target: &str, message: &str) -> io::Result<()> {
        self.file
            .lock()
            .write_all(format_line(level, target, message).as_bytes())
    }

    fn flush(&self) -> io::Result<()> {
        self.file.lock().flush()
    }
}
