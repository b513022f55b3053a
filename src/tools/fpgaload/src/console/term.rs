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
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;

use super::KeySource;
use crate::logger;

/// Puts `fd` into non-blocking mode and returns the previous file status flags
pub(super) fn set_nonblocking(fd: RawFd) -> io::Result<libc::c_int> {
    // SAFETY: fcntl only operates on the descriptor and does not access memory
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: see above
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(flags)
}

/// Reads at most `buf.len()` bytes from the non-blocking `fd`; returns 0 if nothing is available
pub(super) fn read_nonblocking(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    // SAFETY: buf is valid for buf.len() bytes
    let res = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if res < 0 {
        let err = io::Error::last_os_error();
        return match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(0),
            _ => Err(err),
        };
    }
    Ok(res as usize)
}

/// The local terminal (stdin), in raw and non-blocking mode
pub struct Terminal {
    fd: RawFd,
    old_flags: libc::c_int,
    old_attrs: Option<libc::termios>,
}

impl Terminal {
    /// Puts stdin into raw, non-blocking mode.
    ///
    /// If stdin is not a terminal, only the non-blocking mode is set.
    pub fn new() -> io::Result<Self> {
        let fd = libc::STDIN_FILENO;
        let old_flags = set_nonblocking(fd)?;

        let mut attrs = MaybeUninit::<libc::termios>::uninit();
        // SAFETY: tcgetattr initializes attrs on success
        let old_attrs = if unsafe { libc::tcgetattr(fd, attrs.as_mut_ptr()) } == 0 {
            // SAFETY: initialized by tcgetattr above
            let old = unsafe { attrs.assume_init() };
            let mut raw = old;
            // we handle Ctrl+C and friends ourself by sending them to the tile
            raw.c_lflag &= !(libc::ICANON | libc::ISIG | libc::ECHO);
            raw.c_cc[libc::VMIN] = 1;
            raw.c_cc[libc::VTIME] = 0;
            // SAFETY: raw is a valid termios structure
            if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
                return Err(io::Error::last_os_error());
            }
            logger::set_raw_mode(true);
            Some(old)
        }
        else {
            None
        };

        eprint!("-- TCU Terminal ( Quit: Ctrl+] ) --\r\n");
        Ok(Self {
            fd,
            old_flags,
            old_attrs,
        })
    }
}

impl KeySource for Terminal {
    fn read_keys(&mut self) -> io::Result<Vec<u8>> {
        // read multiple bytes to get sequences like ^[D at once
        let mut buf = [0u8; 8];
        let len = read_nonblocking(self.fd, &mut buf)?;
        Ok(buf[..len].to_vec())
    }

    fn restore(&mut self) -> io::Result<()> {
        if let Some(old) = self.old_attrs.take() {
            // SAFETY: old has been filled by tcgetattr
            if unsafe { libc::tcsetattr(self.fd, libc::TCSAFLUSH, &old) } != 0 {
                return Err(io::Error::last_os_error());
            }
            logger::set_raw_mode(false);
        }
        // SAFETY: fcntl only operates on the descriptor
        if unsafe { libc::fcntl(self.fd, libc::F_SETFL, self.old_flags) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        // restore is idempotent; ignore errors as there is nothing left to do about them
        self.restore().ok();
    }
}
