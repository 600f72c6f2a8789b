// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global `log::Log` implementation.

use super::output::{LogLevel, Output};
use std::io;
use std::sync::{Arc, OnceLock};

static LOGGER: OnceLock<&'static GlobalLogger> = OnceLock::new();

struct GlobalLogger {
    output: Arc<dyn Output>,
    level_filter: LogLevel,
}

impl log::Log for GlobalLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        LogLevel::from(metadata.level()) >= self.level_filter
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = self.output.write(
            LogLevel::from(record.level()),
            record.target(),
            &record.args().to_string(),
        );
    }

    fn flush(&self) {
        let _ = self.output.flush();
    }
}

/// Install the global logger.
///
/// Only the first call has an effect; it returns `false` if this crate's
/// logger (or any other `log` backend) was already installed.
pub fn init_logger(output: Arc<dyn Output>, level: LogLevel) -> bool {
    let mut installed = false;
    LOGGER.get_or_init(|| {
        let logger: &'static GlobalLogger = Box::leak(Box::new(GlobalLogger {
            output,
            level_filter: level,
        }));
        if log::set_logger(logger).is_ok() {
            log::set_max_level(level.to_filter());
            installed = true;
        }
        logger
    });
    installed
}

/// Flush the installed output. No-op before [`init_logger`].
pub fn flush_logger() -> io::Result<()> {
    match LOGGER.get() {
        Some(logger) => logger.output.flush(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::FileOutput;

    #[test]
    fn test_flush_without_logger() {
        assert!(flush_logger().is_ok());
    }

    #[test]
    fn test_init_once_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("init.log");
        let output = Arc::new(FileOutput::new(&path).unwrap());

        let first = init_logger(output, LogLevel::Info);
        let second = init_logger(Arc::new(crate::logging::ConsoleOutput::new()), LogLevel::Debug);
        assert!(!second);

        if first {
            log::debug!("[Test] filtered out");
            log::warn!("[Test] kept");
            flush_logger().unwrap();
            let text = std::fs::read_to_string(&path).unwrap();
            assert!(text.contains("[Test] kept"));
            assert!(!text.contains("filtered out"));
        }
    }
}
