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

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::device::DeviceError;

/// The fatal errors that abort the bring-up
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error occurred: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Base(#[from] base::Error),
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("setting logger failed: {0}")]
    SetLog(#[from] log::SetLoggerError),
    #[error("parsing log level failed: {0}")]
    LogLevel(#[from] log::ParseLevelError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("tile {tile} has TCU version {found}, but expected {expected}")]
    TcuVersion {
        tile: String,
        found: u64,
        expected: u64,
    },
    #[error("{} has entry {entry:#x}, not {expected:#x}", .path.display())]
    EntryMismatch {
        path: PathBuf,
        entry: u64,
        expected: u64,
    },
    #[error("not enough space for arguments (need {needed:#x}, limit is {limit:#x})")]
    ArgSpace { needed: u64, limit: u64 },
    #[error("unable to read module '{name}' from {}: {source}", .path.display())]
    ModuleRead {
        name: String,
        path: PathBuf,
        source: io::Error,
    },
    #[error("unable to read program {}: {source}", .path.display())]
    ProgramRead { path: PathBuf, source: io::Error },
    #[error("{what} ends at {end:#x}, beyond the limit {limit:#x}")]
    LayoutOverflow {
        what: &'static str,
        end: u64,
        limit: u64,
    },
    #[error("{}: segment at {addr:#x} with {size:#x} bytes is outside of the tile's window", .path.display())]
    SegmentOutOfWindow {
        path: PathBuf,
        addr: u64,
        size: u64,
    },
}
