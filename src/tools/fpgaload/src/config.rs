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

//! The command line and the validated configuration of a run

use std::path::PathBuf;
use std::time::Duration;

use base::cfg;
use clap::Parser;

use crate::bootinfo::ModSpec;
use crate::loader::Program;
use crate::supervisor::RunState;
use crate::Error;

/// Loads programs onto the FPGA platform and bridges the console while they run
#[derive(Debug, Parser)]
#[command(name = "fpgaload")]
pub struct Args {
    /// The FPGA to use
    #[arg(long, default_value_t = 0)]
    pub fpga: u8,
    /// The expected TCU version
    #[arg(long, default_value_t = 2)]
    pub version: u64,
    /// Reset the FPGA before loading
    #[arg(long)]
    pub reset: bool,
    /// Do not start the given tile (e.g., to attach a debugger)
    #[arg(long)]
    pub debug: Option<usize>,
    /// A program to load, as "<path> <args...>"; the n-th program is loaded onto tile n
    #[arg(long = "tile", required = true)]
    pub tiles: Vec<String>,
    /// A boot module, as name=path
    #[arg(long = "mod")]
    pub mods: Vec<String>,
    /// Enable virtual memory
    #[arg(long)]
    pub vm: bool,
    /// Use the given serial line as console instead of the TCU mailbox
    #[arg(long)]
    pub serial: Option<PathBuf>,
    /// Log flags, passed to the programs in the LOG environment variable
    #[arg(long)]
    pub logflags: Option<String>,
    /// Abort the run after the given number of seconds
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Exit with a non-zero code if the run timed out or was interrupted
    #[arg(long)]
    pub fail_on_timeout: bool,
    /// Load into memory instead of the FPGA and write the memory image to the given file
    #[arg(long, value_name = "FILE")]
    pub dry_run: Option<PathBuf>,
}

/// The console backend
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConsoleKind {
    /// Input is sent over the NoC to the tile registered in the mailbox
    Mailbox,
    /// Input and output go through an external serial line
    Serial(PathBuf),
}

/// Determines the exit code after a timeout or an interrupt
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExitPolicy {
    /// Always exit with 0; diagnostics are only logged
    AlwaysSucceed,
    /// Exit with 1 unless the system shut down cleanly
    FailOnTimeout,
}

/// The validated configuration of a run
#[derive(Clone, Debug)]
pub struct Config {
    pub fpga: u8,
    pub version: u64,
    pub reset: bool,
    pub debug: Option<usize>,
    pub programs: Vec<Program>,
    pub mods: Vec<ModSpec>,
    pub vm: bool,
    pub console: ConsoleKind,
    pub logflags: Option<String>,
    pub timeout: Option<Duration>,
    pub exit_policy: ExitPolicy,
    pub dry_run: Option<PathBuf>,
}

impl Config {
    /// Validates the given command line
    pub fn from_args(args: Args) -> Result<Self, Error> {
        let programs = args
            .tiles
            .iter()
            .map(|t| t.parse::<Program>())
            .collect::<Result<Vec<_>, _>>()?;
        if programs.is_empty() {
            return Err(Error::Config("at least one program is required".to_string()));
        }

        let mods = args
            .mods
            .iter()
            .map(|m| m.parse::<ModSpec>())
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(flags) = &args.logflags {
            if flags.is_empty() {
                return Err(Error::Config("log flags must not be empty".to_string()));
            }
        }
        if args.timeout == Some(0) {
            return Err(Error::Config("timeout must be at least one second".to_string()));
        }

        Ok(Self {
            fpga: args.fpga,
            version: args.version,
            reset: args.reset,
            debug: args.debug,
            programs,
            mods,
            vm: args.vm,
            console: match args.serial {
                Some(path) => ConsoleKind::Serial(path),
                None => ConsoleKind::Mailbox,
            },
            logflags: args.logflags,
            timeout: args.timeout.map(Duration::from_secs),
            exit_policy: if args.fail_on_timeout {
                ExitPolicy::FailOnTimeout
            }
            else {
                ExitPolicy::AlwaysSucceed
            },
            dry_run: args.dry_run,
        })
    }

    /// Returns the size of the private window of each tile
    pub fn pmp_size(&self) -> u64 {
        if self.vm {
            cfg::PMP_SIZE_VM
        }
        else {
            cfg::PMP_SIZE_NOVM
        }
    }

    /// Returns the exit code for a run that ended in `state`
    pub fn exit_code(&self, state: RunState) -> i32 {
        match (self.exit_policy, state) {
            (ExitPolicy::FailOnTimeout, RunState::TimedOut) => 1,
            _ => 0,
        }
    }
}
