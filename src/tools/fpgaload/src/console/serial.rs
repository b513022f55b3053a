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

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

use super::term::read_nonblocking;
use super::{is_quit, Console, KeySource};
use crate::device::Platform;
use crate::Error;

/// The console that talks to the tiles via an external serial line.
///
/// Writes to the serial line block, so that they are done by a separate writer thread that
/// drains a queue. The output of the tiles is read without blocking and copied to `out`.
pub struct SerialConsole<K, W> {
    keys: K,
    out: W,
    reader: File,
    queue: Option<Sender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
}

impl<K: KeySource, W: Write> SerialConsole<K, W> {
    /// Opens the serial line at `path` and starts the writer thread
    pub fn new(keys: K, out: W, path: &Path) -> Result<Self, Error> {
        let reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(path)?;
        let mut line = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(path)?;
        make_raw(&reader);

        let (queue, rx) = mpsc::channel::<Vec<u8>>();
        let writer = thread::Builder::new()
            .name("serial-writer".to_string())
            .spawn(move || {
                // ends as soon as the console drops the sender
                for bytes in rx {
                    if let Err(e) = line.write_all(&bytes).and_then(|_| line.flush()) {
                        warn!("unable to write to serial line: {}", e);
                        break;
                    }
                }
            })?;

        debug!("opened serial line {}", path.display());
        Ok(Self {
            keys,
            out,
            reader,
            queue: Some(queue),
            writer: Some(writer),
        })
    }

    fn forward_output(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; 256];
        loop {
            let len = read_nonblocking(self.reader.as_raw_fd(), &mut buf)?;
            if len == 0 {
                break Ok(());
            }
            self.out.write_all(&buf[..len])?;
            self.out.flush()?;
        }
    }
}

/// Puts the serial line into raw mode; lines that are no terminal (e.g., pipes) are left alone
fn make_raw(file: &File) {
    let fd = file.as_raw_fd();
    let mut attrs = std::mem::MaybeUninit::<libc::termios>::uninit();
    // SAFETY: tcgetattr initializes attrs on success
    if unsafe { libc::tcgetattr(fd, attrs.as_mut_ptr()) } == 0 {
        // SAFETY: initialized by tcgetattr above
        let mut attrs = unsafe { attrs.assume_init() };
        // SAFETY: attrs is a valid termios structure
        unsafe {
            libc::cfmakeraw(&mut attrs);
            libc::tcsetattr(fd, libc::TCSANOW, &attrs);
        }
    }
}

impl<P: Platform, K: KeySource, W: Write> Console<P> for SerialConsole<K, W> {
    fn poll_for_stop(&mut self, plat: &mut P) -> Result<bool, Error> {
        let keys = self.keys.read_keys()?;
        if is_quit(&keys) {
            return Ok(true);
        }
        if !keys.is_empty() {
            self.write(plat, &keys)?;
        }
        self.forward_output()?;
        Ok(false)
    }

    fn write(&mut self, _plat: &mut P, bytes: &[u8]) -> Result<(), Error> {
        if let Some(queue) = &self.queue {
            queue.send(bytes.to_vec()).map_err(|_| {
                io::Error::new(io::ErrorKind::BrokenPipe, "serial writer has stopped")
            })?;
        }
        Ok(())
    }

    fn cleanup(&mut self, _plat: &mut P) -> Result<(), Error> {
        self.queue.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                warn!("serial writer panicked");
            }
        }
        self.keys.restore()?;
        Ok(())
    }
}
