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

//! Operator interrupts (SIGINT)
//!
//! Before the tiles run, an interrupt terminates the process immediately, because there are no
//! diagnostics to extract yet. Afterwards, it cancels the run like a timeout.

use std::io;
use std::sync::OnceLock;

use crate::supervisor::{CancelToken, RunState};

static TOKEN: OnceLock<CancelToken> = OnceLock::new();

/// The exit code for processes terminated by SIGINT
pub const SIGINT_EXIT_CODE: i32 = 128 + libc::SIGINT;

extern "C" fn on_sigint(_sig: libc::c_int) {
    match TOKEN.get() {
        Some(token) if token.state() != RunState::Waiting => token.cancel(),
        // SAFETY: _exit is async-signal-safe
        _ => unsafe { libc::_exit(SIGINT_EXIT_CODE) },
    }
}

/// Delivers SIGINT to `token`; can only be installed once per process
pub fn install(token: &CancelToken) -> io::Result<()> {
    TOKEN
        .set(token.clone())
        .map_err(|_| io::Error::new(io::ErrorKind::AlreadyExists, "SIGINT handler already installed"))?;

    let handler = on_sigint as extern "C" fn(libc::c_int);
    // SAFETY: the handler only accesses atomics and calls async-signal-safe functions
    if unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) } == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
