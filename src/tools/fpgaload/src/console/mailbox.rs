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

use base::mem::GlobOff;
use base::tcu::{EpId, TileId};

use log::trace;

use super::{is_quit, Console, KeySource};
use crate::device::{MemDevice, NocDevice, Platform};
use crate::layout::MemoryWindow;
use crate::Error;

/// The single-message mailbox in the memory tile.
///
/// A tile claims the console by writing its NoC id and the endpoint to receive the input to the
/// mailbox. An endpoint of 0 means that nobody has claimed the console yet.
#[derive(Copy, Clone, Debug)]
pub struct MailboxSlot {
    addr: GlobOff,
}

impl MailboxSlot {
    /// Offset of the destination tile
    pub const DEST_OFF: GlobOff = 0;
    /// Offset of the destination endpoint
    pub const EP_OFF: GlobOff = 8;

    pub fn new(win: MemoryWindow) -> Self {
        Self { addr: win.addr }
    }

    /// Clears the destination, as it might still be set from a previous run
    pub fn reset<M: MemDevice>(&self, mem: &mut M) -> Result<(), Error> {
        mem.write_u64(self.addr + Self::DEST_OFF, 0)?;
        mem.write_u64(self.addr + Self::EP_OFF, 0)?;
        Ok(())
    }

    /// Returns the current destination, if any
    pub fn destination<M: MemDevice>(&self, mem: &mut M) -> Result<Option<(TileId, EpId)>, Error> {
        let tile = mem.read_u64(self.addr + Self::DEST_OFF)?;
        let ep = mem.read_u64(self.addr + Self::EP_OFF)?;
        if ep == 0 {
            return Ok(None);
        }
        Ok(Some((TileId::new_from_raw(tile as u16), ep as EpId)))
    }
}

/// The console that forwards input to the tile registered in the mailbox
pub struct MailboxConsole<K> {
    keys: K,
    slot: MailboxSlot,
}

impl<K: KeySource> MailboxConsole<K> {
    /// Creates a new console for the given mailbox and resets the mailbox
    pub fn new<M: MemDevice>(keys: K, mem: &mut M, win: MemoryWindow) -> Result<Self, Error> {
        let slot = MailboxSlot::new(win);
        slot.reset(mem)?;
        Ok(Self { keys, slot })
    }
}

impl<P: Platform, K: KeySource> Console<P> for MailboxConsole<K> {
    fn poll_for_stop(&mut self, plat: &mut P) -> Result<bool, Error> {
        let keys = self.keys.read_keys()?;
        if is_quit(&keys) {
            return Ok(true);
        }
        if !keys.is_empty() {
            self.write(plat, &keys)?;
        }
        Ok(false)
    }

    fn write(&mut self, plat: &mut P, bytes: &[u8]) -> Result<(), Error> {
        match self.slot.destination(plat.mem())? {
            Some((tile, ep)) => plat.noc().send_bytes(tile, ep, bytes)?,
            // nobody listens yet; input is dropped, not queued
            None => trace!("dropping {} bytes of input", bytes.len()),
        }
        Ok(())
    }

    fn cleanup(&mut self, _plat: &mut P) -> Result<(), Error> {
        self.keys.restore()?;
        Ok(())
    }
}
