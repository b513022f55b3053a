/*
 * Copyright (C) 2023 Nils Asmussen, Barkhausen Institut
 *
 * This file is part of M3 (Microkernel-based SysteM for Heterogeneous Manycores).
 *
 * M3 is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License version 2 as
 * published by the Free Software Foundation.
 *
 * M3 is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
 * General Public License version 2 for more details.
 */

//! A simple logger that writes to stderr

use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{Level, Log, Metadata, Record};

use crate::Error;

/// Whether the terminal is in raw mode, requiring explicit carriage returns
static RAW_MODE: AtomicBool = AtomicBool::new(false);

/// Sets whether the terminal is currently in raw mode
pub fn set_raw_mode(raw: bool) {
    RAW_MODE.store(raw, Ordering::Relaxed);
}

struct Logger {
    level: Level,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let level_string = record.level().to_string();
            let target = if !record.target().is_empty() {
                record.target()
            }
            else {
                record.module_path().unwrap_or_default()
            };

            let eol = if RAW_MODE.load(Ordering::Relaxed) {
                "\r\n"
            }
            else {
                "\n"
            };
            eprint!("{:<5} [{}] {}{}", level_string, target, record.args(), eol);
        }
    }

    fn flush(&self) {
    }
}

/// Installs the logger with the level given by `RUST_LOG` (`info` by default)
pub fn init() -> Result<(), Error> {
    let level = Level::from_str(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))?;
    log::set_boxed_logger(Box::new(Logger { level }))?;
    log::set_max_level(level.to_level_filter());
    Ok(())
}
