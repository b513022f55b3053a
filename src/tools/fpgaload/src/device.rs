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

//! The capabilities the loader needs from the platform.
//!
//! The loader never talks to a specific bus directly. Instead, it works with one [`TileDevice`]
//! per compute tile, a [`MemDevice`] for the memory tile and a [`NocDevice`] to send and receive
//! messages, all bundled by a [`Platform`].

use std::io;
use std::path::Path;
use std::time::Duration;

use base::mem::GlobOff;
use base::tcu::{EpId, EpRegs, FeatureFlags, TileId};

use thiserror::Error;

/// The errors reported by devices
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The operation did not complete in time; for receives, this is the normal case
    #[error("operation timed out")]
    Timeout,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("read-back mismatch at {0:#x}")]
    Mismatch(GlobOff),
}

/// Packet counters of the NoC's automatic-repeat-request (ARQ) unit
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PacketStats {
    pub dropped: u64,
    pub total: u64,
}

/// Flit counters of the TCU
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FlitStats {
    pub dropped: u64,
    pub errors: u64,
}

/// A compute tile
pub trait TileDevice {
    /// Returns a human-readable name of the tile
    fn name(&self) -> &str;

    /// Returns the NoC id of the tile
    fn id(&self) -> TileId;

    /// Stops the core and its clock
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Enables the clock of the core without letting it execute code
    fn enable_clock(&mut self) -> Result<(), DeviceError>;

    /// Lets the core start executing at its reset vector
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Returns the version of the TCU
    fn tcu_version(&mut self) -> Result<u64, DeviceError>;

    /// Resets the TCU (clears the command log and all registers except the features and EPs)
    fn tcu_reset(&mut self) -> Result<(), DeviceError>;

    /// Enables the instruction trace of the core
    fn enable_trace(&mut self) -> Result<(), DeviceError>;

    /// Sets the feature flags of the TCU
    fn set_features(&mut self, features: FeatureFlags) -> Result<(), DeviceError>;

    /// Writes the registers of endpoint `ep`
    fn set_ep(&mut self, ep: EpId, regs: &EpRegs) -> Result<(), DeviceError>;

    /// Enables or disables the ARQ unit, optionally changing its timeout
    fn set_arq(&mut self, enable: bool, timeout: Option<u32>) -> Result<(), DeviceError>;

    /// Returns the packet counters of the ARQ unit
    fn arq_packets(&mut self) -> Result<PacketStats, DeviceError>;

    /// Returns the flit counters of the TCU
    fn tcu_flits(&mut self) -> Result<FlitStats, DeviceError>;

    /// Writes the command log of the TCU to `path`; `all` requests the unfiltered log
    fn dump_tcu_log(&mut self, path: &Path, all: bool) -> Result<(), DeviceError>;

    /// Writes the instruction trace of the core to `path`; `all` requests the unfiltered trace
    fn dump_trace(&mut self, path: &Path, all: bool) -> Result<(), DeviceError>;
}

/// The memory tile
pub trait MemDevice {
    /// Returns the NoC id of the memory tile
    fn id(&self) -> TileId;

    /// Writes `data` to `off`
    fn write_bytes(&mut self, off: GlobOff, data: &[u8]) -> Result<(), DeviceError>;

    /// Reads `buf.len()` bytes from `off`
    fn read_bytes(&mut self, off: GlobOff, buf: &mut [u8]) -> Result<(), DeviceError>;

    /// Enables or disables the ARQ unit, optionally changing its timeout
    fn set_arq(&mut self, enable: bool, timeout: Option<u32>) -> Result<(), DeviceError>;

    /// Writes `data` to `off` and reads it back to verify the write
    fn write_bytes_checked(&mut self, off: GlobOff, data: &[u8]) -> Result<(), DeviceError> {
        self.write_bytes(off, data)?;
        let mut check = vec![0u8; data.len()];
        self.read_bytes(off, &mut check)?;
        match check.iter().zip(data).position(|(a, b)| a != b) {
            Some(pos) => Err(DeviceError::Mismatch(off + pos as GlobOff)),
            None => Ok(()),
        }
    }

    fn write_u64(&mut self, off: GlobOff, val: u64) -> Result<(), DeviceError> {
        self.write_bytes(off, &val.to_le_bytes())
    }

    fn read_u64(&mut self, off: GlobOff) -> Result<u64, DeviceError> {
        let mut buf = [0u8; 8];
        self.read_bytes(off, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}

/// The message interface to the NoC
pub trait NocDevice {
    /// Sends `data` as a message to endpoint `ep` of tile `dst`
    fn send_bytes(&mut self, dst: TileId, ep: EpId, data: &[u8]) -> Result<(), DeviceError>;

    /// Waits at most `timeout` for a message and returns its payload
    ///
    /// Returns [`DeviceError::Timeout`] if no message arrived in time.
    fn receive_bytes(&mut self, timeout: Duration) -> Result<Vec<u8>, DeviceError>;
}

/// A connected platform consisting of compute tiles, a memory tile and the NoC
pub trait Platform {
    type Tile: TileDevice;
    type Mem: MemDevice;
    type Noc: NocDevice;

    /// Returns all compute tiles in index order, the memory tile and the NoC interface at once
    fn split(&mut self) -> (&mut [Self::Tile], &mut Self::Mem, &mut Self::Noc);

    /// Returns all compute tiles in index order
    fn tiles(&mut self) -> &mut [Self::Tile] {
        self.split().0
    }

    /// Returns the memory tile
    fn mem(&mut self) -> &mut Self::Mem {
        self.split().1
    }

    /// Returns the NoC interface
    fn noc(&mut self) -> &mut Self::Noc {
        self.split().2
    }

    /// Enables or disables the ARQ unit of all tiles (including the memory tile) at once
    fn set_arq_enable(&mut self, enable: bool, timeout: Option<u32>) -> Result<(), DeviceError> {
        let (tiles, mem, _) = self.split();
        for tile in tiles.iter_mut() {
            tile.set_arq(enable, timeout)?;
        }
        mem.set_arq(enable, timeout)
    }
}
