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
use std::path::Path;
use std::process::exit;

use clap::Parser;
use log::{error, info};

use fpgaload::bringup;
use fpgaload::config::{Args, Config, ConsoleKind};
use fpgaload::console::{Console, MailboxConsole, SerialConsole, Terminal};
use fpgaload::device::Platform;
use fpgaload::hw::HwPlatform;
use fpgaload::mock::MockPlatform;
use fpgaload::supervisor::{self, CancelToken, Watchdog};
use fpgaload::{logger, signal, Error};

/// The file that signals external scripts that all tiles have been loaded
const READY_FILE: &str = ".ready";
/// The directory for TCU logs and instruction traces
const LOG_DIR: &str = "log";

fn dry_run(cfg: &Config, image: &Path) -> Result<i32, Error> {
    let mut plat = MockPlatform::new(MockPlatform::TILES, cfg.version);
    let res = bringup::bring_up(&mut plat, cfg)?;

    // everything up to the free memory has been planned by us
    let end = res.bootinfo.mem.addr().offset();
    plat.mem.save(image, end)?;
    info!("Wrote memory image with {:#x} bytes to {}", end, image.display());
    Ok(0)
}

fn run(cfg: &Config, token: &CancelToken) -> Result<i32, Error> {
    let mut plat = HwPlatform::connect(cfg.fpga, cfg.reset)?;

    bringup::connect(&mut plat, cfg.version)?;
    let res = bringup::load(&mut plat, cfg)?;

    // set up the console before the tiles start to not lose their registration in the mailbox
    let mut console: Box<dyn Console<HwPlatform>> = match &cfg.console {
        ConsoleKind::Mailbox => Box::new(MailboxConsole::new(
            Terminal::new()?,
            plat.mem(),
            res.layout.mailbox(),
        )?),
        ConsoleKind::Serial(path) => {
            Box::new(SerialConsole::new(Terminal::new()?, io::stdout(), path)?)
        },
    };

    let state = supervisor::launch(
        &mut plat,
        console.as_mut(),
        &mut io::stdout(),
        token,
        cfg.debug,
        Path::new(READY_FILE),
        Path::new(LOG_DIR),
    )?;
    Ok(cfg.exit_code(state))
}

fn setup_and_run(args: Args) -> Result<i32, Error> {
    let cfg = Config::from_args(args)?;

    let token = CancelToken::new();
    signal::install(&token)?;

    // a timeout before the tiles run means that the bring-up hangs; give up immediately
    let _watchdog = match cfg.timeout {
        Some(timeout) => Some(Watchdog::start(token.clone(), timeout, || {
            exit(1);
        })?),
        None => None,
    };

    match &cfg.dry_run {
        Some(image) => dry_run(&cfg, image),
        None => run(&cfg, &token),
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = logger::init() {
        eprintln!("Unable to initialize logger: {}", e);
        exit(1);
    }

    match setup_and_run(args) {
        Ok(code) => exit(code),
        Err(e) => {
            error!("{}", e);
            exit(1);
        },
    }
}
