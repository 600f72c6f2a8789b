// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `log` backend for applications embedding the GMSEC core.
//!
//! The library itself only talks to the [`log`] facade (`log::debug!`,
//! `log::warn!`, ...) with `[Component]` prefixed messages. Applications that
//! have no logger of their own can install this one:
//!
//! ```ignore
//! use gmsec::logging::{init_logger, ConsoleOutput, LogLevel};
//! use std::sync::Arc;
//!
//! init_logger(Arc::new(ConsoleOutput::new()), LogLevel::Info);
//! ```

mod logger;
mod output;

pub use logger::{flush_logger, init_logger};
pub use output::{ConsoleOutput, FileOutput, LogLevel, Output};
