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

//! The console bridge between the local terminal and the tiles
//!
//! There are two backends: the [`MailboxConsole`] sends the input over the NoC to whichever tile
//! registered itself in the mailbox, whereas the [`SerialConsole`] talks to an external serial
//! line. Both read the local input from a [`KeySource`].

mod mailbox;
mod serial;
mod term;

pub use self::mailbox::{MailboxConsole, MailboxSlot};
pub use self::serial::SerialConsole;
pub use self::term::Terminal;

use std::io;

use crate::device::Platform;
use crate::Error;

/// The key that stops the run and forces the extraction of the logs (Ctrl+])
pub const QUIT_KEY: u8 = 0x1d;

/// A non-blocking source of keystrokes
pub trait KeySource {
    /// Returns the keys that have been pressed since the last call; empty if there are none
    fn read_keys(&mut self) -> io::Result<Vec<u8>>;

    /// Restores the original state of the source
    fn restore(&mut self) -> io::Result<()>;
}

/// A console backend
pub trait Console<P: Platform> {
    /// Forwards pending input and returns true if the user requested to stop.
    ///
    /// Never blocks.
    fn poll_for_stop(&mut self, plat: &mut P) -> Result<bool, Error>;

    /// Sends `bytes` towards the current destination
    fn write(&mut self, plat: &mut P, bytes: &[u8]) -> Result<(), Error>;

    /// Restores the terminal and releases all resources
    fn cleanup(&mut self, plat: &mut P) -> Result<(), Error>;
}

/// Returns true if `keys` consist of the quit key alone.
///
/// A chunk that merely contains the quit key (e.g., pasted input) is forwarded like any other.
pub fn is_quit(keys: &[u8]) -> bool {
    keys == [QUIT_KEY]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_only_on_single_key() {
        assert!(is_quit(&[QUIT_KEY]));
        assert!(!is_quit(&[]));
        assert!(!is_quit(b"ls"));
        assert!(!is_quit(&[b'a', QUIT_KEY]));
        assert!(!is_quit(&[QUIT_KEY, QUIT_KEY]));
    }
}
