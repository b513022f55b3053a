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

//! The run-loop supervisor
//!
//! After all tiles have been started, the supervisor polls the console for input, receives the
//! output of the tiles and watches for the shutdown message, a timeout and operator interrupts.
//! Timeouts and interrupts are delivered through a [`CancelToken`] and observed cooperatively.

use std::io::Write;
use std::path::Path;
use std::str;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::bringup;
use crate::console::Console;
use crate::device::{DeviceError, NocDevice, Platform, TileDevice};
use crate::diag::{self, TileReport};
use crate::Error;

/// The message of the kernel that indicates a clean shutdown
pub const SHUTDOWN_MARKER: &str = "Shutting down";

/// The maximum time a single receive blocks the run loop
pub const RECV_TIMEOUT: Duration = Duration::from_millis(10);

/// The states of a run
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RunState {
    /// The tiles are being brought up
    Waiting,
    /// All tiles have been started
    Running,
    /// The run was aborted by a timeout or the operator
    TimedOut,
    /// The system has shut down
    Stopped,
}

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    state: AtomicU8,
}

/// Cancels a run and tracks its state; all clones refer to the same run
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the run to stop
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> RunState {
        RunState::try_from(self.inner.state.load(Ordering::SeqCst)).unwrap_or(RunState::Waiting)
    }

    pub fn set_state(&self, state: RunState) {
        self.inner.state.store(state.into(), Ordering::SeqCst);
    }
}

/// A timer that cancels a run after a given time.
///
/// If the timer fires before the run reached [`RunState::Running`], the bring-up got stuck. In
/// this case, the given bring-up policy is executed, which typically terminates the process, as
/// there is nothing to extract yet. Dropping the watchdog disarms it.
pub struct Watchdog {
    disarm: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn start<F>(token: CancelToken, timeout: Duration, on_bringup: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (disarm, rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || {
                if rx.recv_timeout(timeout) != Err(RecvTimeoutError::Timeout) {
                    return;
                }

                info!("Execution timed out after {} seconds", timeout.as_secs());
                token.cancel();
                if token.state() == RunState::Waiting {
                    on_bringup();
                }
            })?;

        Ok(Self {
            disarm: Some(disarm),
            thread: Some(thread),
        })
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm.take();
        if let Some(t) = self.thread.take() {
            t.join().ok();
        }
    }
}

fn poll_once<P, C, W>(plat: &mut P, console: &mut C, out: &mut W) -> Result<Option<RunState>, Error>
where
    P: Platform,
    C: Console<P> + ?Sized,
    W: Write,
{
    // force-extract logs on the quit key
    if console.poll_for_stop(plat)? {
        return Ok(Some(RunState::TimedOut));
    }

    let bytes = match plat.noc().receive_bytes(RECV_TIMEOUT) {
        Ok(bytes) => bytes,
        Err(DeviceError::Timeout) => return Ok(None),
        Err(e) => {
            warn!("receiving from NoC failed: {}", e);
            return Ok(None);
        },
    };

    // we get individual bytes from Linux, for example, so don't require valid UTF-8
    out.write_all(&bytes)?;
    out.flush()?;

    match str::from_utf8(&bytes) {
        Ok(msg) if msg.contains(SHUTDOWN_MARKER) => Ok(Some(RunState::Stopped)),
        _ => Ok(None),
    }
}

/// Runs the loop until the system shuts down or the run is cancelled.
///
/// Returns [`RunState::Stopped`] on a clean shutdown and [`RunState::TimedOut`] otherwise. Errors
/// of the console or the output end the run like a timeout.
pub fn run<P, C, W>(plat: &mut P, console: &mut C, out: &mut W, token: &CancelToken) -> RunState
where
    P: Platform,
    C: Console<P> + ?Sized,
    W: Write,
{
    token.set_state(RunState::Running);

    let state = loop {
        if token.is_cancelled() {
            break RunState::TimedOut;
        }

        match poll_once(plat, console, out) {
            Ok(Some(state)) => break state,
            Ok(None) => {},
            Err(e) => {
                warn!("run loop failed: {}", e);
                break RunState::TimedOut;
            },
        }
    };

    token.set_state(state);
    state
}

/// Tears the platform down after a run that ended in `state`.
///
/// Restores the console, disables the ARQ, extracts the diagnostics of every tile and stops
/// it. Failures are reported, but never end the teardown early.
pub fn teardown<P, C>(plat: &mut P, console: &mut C, state: RunState, log_dir: &Path) -> Vec<TileReport>
where
    P: Platform,
    C: Console<P> + ?Sized,
{
    if let Err(e) = console.cleanup(plat) {
        warn!("unable to clean up console: {}", e);
    }

    // disable NoC ARQ again for post-processing
    if let Err(e) = plat.set_arq_enable(false, None) {
        warn!("unable to disable ARQ: {}", e);
    }

    let timed_out = state == RunState::TimedOut;
    info!("Stopping all tiles...");
    let reports = diag::extract_all(plat.tiles(), log_dir, timed_out);
    for tile in plat.tiles().iter_mut() {
        if let Err(e) = tile.stop() {
            warn!("{}: unable to stop tile: {}", tile.name(), e);
        }
    }
    reports
}

/// Starts the loaded tiles, writes the `ready` marker, runs until the end and tears down.
///
/// The run counts as [`RunState::Running`] before the first tile is started. From then on, timeouts
/// and interrupts cancel the run instead of terminating the process. If starting the tiles or
/// writing the marker fails, the platform is still torn down before the error is returned.
pub fn launch<P, C, W>(
    plat: &mut P,
    console: &mut C,
    out: &mut W,
    token: &CancelToken,
    debug: Option<usize>,
    ready: &Path,
    log_dir: &Path,
) -> Result<RunState, Error>
where
    P: Platform,
    C: Console<P> + ?Sized,
    W: Write,
{
    token.set_state(RunState::Running);

    let (state, res) = match bringup::start(plat, debug)
        .and_then(|_| bringup::write_ready_marker(ready))
    {
        Ok(()) => (run(plat, console, out, token), Ok(())),
        Err(e) => {
            warn!("bring-up failed: {}", e);
            token.set_state(RunState::TimedOut);
            (RunState::TimedOut, Err(e))
        },
    };

    teardown(plat, console, state, log_dir);
    res.map(|_| state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert_eq!(token.state(), RunState::Waiting);
        clone.set_state(RunState::Running);
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.state(), RunState::Running);
    }

    #[test]
    fn dropped_watchdog_never_fires() {
        let token = CancelToken::new();
        let dog = Watchdog::start(token.clone(), Duration::from_secs(3600), || {}).unwrap();
        drop(dog);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn watchdog_during_bringup() {
        let token = CancelToken::new();
        let (tx, rx) = mpsc::channel();
        let _dog = Watchdog::start(token.clone(), Duration::from_millis(1), move || {
            tx.send(()).unwrap();
        })
        .unwrap();
        rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(token.is_cancelled());
    }
}
