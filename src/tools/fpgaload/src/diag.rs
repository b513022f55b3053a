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

//! The diagnostic extractor, which collects counters, TCU logs and instruction traces at teardown
//!
//! Extracting diagnostics never fails as a whole. Each failure is reported for the affected tile
//! and handled according to its [`RecoveryPolicy`].

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::device::{DeviceError, FlitStats, PacketStats, TileDevice};

/// A failed attempt to extract a diagnostic from a tile
#[derive(Debug, Error)]
pub enum DiagnosticError {
    #[error("unable to read number of dropped NoC packets: {0}")]
    Packets(DeviceError),
    #[error("unable to read number of TCU dropped flits: {0}")]
    Flits(DeviceError),
    #[error("unable to read TCU log: {0}")]
    TcuLog(DeviceError),
    #[error("unable to read instruction trace: {0}")]
    Trace(DeviceError),
    #[error("unable to reset TCU: {0}")]
    Reset(DeviceError),
}

/// How to proceed after a [`DiagnosticError`]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecoveryPolicy {
    /// Reset the TCU and try once more, requesting the complete log
    RetryAfterReset,
    /// Report the error and continue with the next diagnostic
    GiveUp,
}

impl DiagnosticError {
    pub fn policy(&self) -> RecoveryPolicy {
        match self {
            Self::TcuLog(_) | Self::Trace(_) => RecoveryPolicy::RetryAfterReset,
            Self::Packets(_) | Self::Flits(_) | Self::Reset(_) => RecoveryPolicy::GiveUp,
        }
    }
}

/// The result of extracting a log from a tile
#[derive(Debug)]
pub enum Outcome {
    /// The log was not requested
    Skipped,
    /// The log was written on the first attempt
    Done,
    /// The first attempt failed, but the retry after the reset succeeded
    Recovered(DiagnosticError),
    /// The log is lost; contains the last error
    Failed(DiagnosticError),
}

impl Outcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Done | Self::Recovered(_))
    }
}

/// The diagnostics of one tile
#[derive(Debug)]
pub struct TileReport {
    pub tile: usize,
    pub packets: Result<PacketStats, DiagnosticError>,
    pub flits: Result<FlitStats, DiagnosticError>,
    pub tcu_log: Outcome,
    pub trace: Outcome,
}

#[derive(Copy, Clone)]
enum Dump {
    TcuLog,
    Trace,
}

impl Dump {
    fn run<T: TileDevice>(self, tile: &mut T, path: &Path, all: bool) -> Result<(), DiagnosticError> {
        match self {
            Self::TcuLog => tile.dump_tcu_log(path, all).map_err(DiagnosticError::TcuLog),
            Self::Trace => tile.dump_trace(path, all).map_err(DiagnosticError::Trace),
        }
    }
}

fn dump_with_retry<T: TileDevice>(tile: &mut T, dump: Dump, path: &Path) -> Outcome {
    let err = match dump.run(tile, path, false) {
        Ok(()) => return Outcome::Done,
        Err(e) => e,
    };

    warn!("{}: {}", tile.name(), err);
    match err.policy() {
        RecoveryPolicy::GiveUp => Outcome::Failed(err),
        RecoveryPolicy::RetryAfterReset => {
            info!("{}: resetting TCU and reading all logs...", tile.name());
            if let Err(e) = tile.tcu_reset() {
                let err = DiagnosticError::Reset(e);
                warn!("{}: {}", tile.name(), err);
                return Outcome::Failed(err);
            }
            match dump.run(tile, path, true) {
                Ok(()) => Outcome::Recovered(err),
                Err(e) => {
                    warn!("{}: {}", tile.name(), e);
                    Outcome::Failed(e)
                },
            }
        },
    }
}

/// Returns the path of the TCU command log of tile `idx`
pub fn tcu_log_path(dir: &Path, idx: usize) -> PathBuf {
    dir.join(format!("pm{}-tcu-cmds.log", idx))
}

/// Returns the path of the instruction trace of tile `idx`
pub fn trace_path(dir: &Path, idx: usize) -> PathBuf {
    dir.join(format!("pm{}-instrs.log", idx))
}

/// Extracts the diagnostics of tile `idx`.
///
/// The counters are reported for every run, including clean shutdowns. The TCU log and the
/// instruction trace are only extracted after a timeout; a clean shutdown skips both.
pub fn extract<T: TileDevice>(tile: &mut T, idx: usize, dir: &Path, timed_out: bool) -> TileReport {
    let packets = tile.arq_packets().map_err(DiagnosticError::Packets);
    match &packets {
        Ok(p) => info!(
            "{}: NoC dropped/total packets: {}/{} ({:.0}%)",
            tile.name(),
            p.dropped,
            p.total,
            if p.total == 0 {
                0.0
            }
            else {
                p.dropped as f64 / p.total as f64 * 100.0
            }
        ),
        Err(e) => warn!("{}: {}", tile.name(), e),
    }

    let flits = tile.tcu_flits().map_err(DiagnosticError::Flits);
    match &flits {
        Ok(f) => info!(
            "{}: TCU dropped/error flits: {}/{}",
            tile.name(),
            f.dropped,
            f.errors
        ),
        Err(e) => warn!("{}: {}", tile.name(), e),
    }

    let (tcu_log, trace) = if timed_out {
        info!("{}: reading TCU log...", tile.name());
        let tcu_log = dump_with_retry(tile, Dump::TcuLog, &tcu_log_path(dir, idx));
        info!("{}: reading instruction trace...", tile.name());
        let trace = dump_with_retry(tile, Dump::Trace, &trace_path(dir, idx));
        (tcu_log, trace)
    }
    else {
        (Outcome::Skipped, Outcome::Skipped)
    };

    TileReport {
        tile: idx,
        packets,
        flits,
        tcu_log,
        trace,
    }
}

/// Extracts the diagnostics of all tiles, one after another
pub fn extract_all<T: TileDevice>(tiles: &mut [T], dir: &Path, timed_out: bool) -> Vec<TileReport> {
    if timed_out {
        if let Err(e) = fs::create_dir_all(dir) {
            warn!("unable to create {}: {}", dir.display(), e);
        }
    }

    tiles
        .iter_mut()
        .enumerate()
        .map(|(idx, tile)| extract(tile, idx, dir, timed_out))
        .collect()
}
