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

//! The Trusted Communication Unit interface, as seen from outside of the tile
//!
//! The loader configures the TCU of every tile through its MMIO registers. This module defines the
//! register layout and the encoding of endpoints.

use bitflags::bitflags;

use core::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::kif::Perm;
use crate::mem::GlobOff;

/// A TCU register
pub type Reg = u64;
/// An endpoint id
pub type EpId = u16;
/// A activity id
pub type ActId = u16;

/// A tile id, consisting of a chip and chip-local tile id
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    id: u16,
}

impl TileId {
    /// Constructs a new tile id out of the given chip and chip-local tile id
    pub const fn new(chip: u8, tile: u8) -> Self {
        Self {
            id: (chip as u16) << 8 | tile as u16,
        }
    }

    /// Constructs a new tile id from the given raw id (e.g., as stored in TCUs)
    pub const fn new_from_raw(raw: u16) -> Self {
        Self { id: raw }
    }

    /// Returns the chip id
    pub const fn chip(&self) -> u8 {
        (self.id >> 8) as u8
    }

    /// Returns the chip-local tile id
    pub const fn tile(&self) -> u8 {
        (self.id & 0xFF) as u8
    }

    /// Returns the raw representation of the id (e.g., as stored in TCUs)
    pub const fn raw(&self) -> u16 {
        self.id
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "C{}T{:02}", self.chip(), self.tile())
    }
}

/// The total number of endpoints in each TCU
pub const TOTAL_EPS: EpId = 128;
/// The endpoint used for physical-memory protection of the tile's private window
pub const PMP_EP: EpId = 0;

/// The activity id used for endpoints that are not owned by a specific activity
pub const INVALID_ACT: ActId = 0xFFFF;

/// The base address of the TCU's MMIO area
pub const MMIO_ADDR: GlobOff = 0xF000_0000;
/// The size of the TCU's MMIO area
pub const MMIO_SIZE: GlobOff = 0x1000 * 2;
/// The base address of the TCU's private MMIO area
pub const MMIO_PRIV_ADDR: GlobOff = MMIO_ADDR + MMIO_SIZE;
/// The size of the TCU's private MMIO area
pub const MMIO_PRIV_SIZE: GlobOff = 0x1000;
/// The base address of the TCU's config space (hardware only)
pub const MMIO_CONFIG_ADDR: GlobOff = MMIO_PRIV_ADDR + MMIO_PRIV_SIZE;

/// The number of external registers
pub const EXT_REGS: usize = 3;
/// The number of unprivileged registers
pub const UNPRIV_REGS: usize = 6;
/// The number of registers per EP
pub const EP_REGS: usize = 3;

/// The external registers
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive)]
#[repr(u64)]
pub enum ExtReg {
    /// Stores the feature flags
    Features,
    /// Stores the tile description
    TileDesc,
    /// For external commands
    ExtCmd,
}

bitflags! {
    /// The flags for the [`ExtReg::Features`] register
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct FeatureFlags : Reg {
        /// Whether the tile is privileged
        const PRIV          = 1 << 0;
        /// Whether the tile uses virtual memory
        const VM            = 1 << 1;
        /// Whether the tile supports context switches
        const CTXSW         = 1 << 2;
    }
}

/// The external commands
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum ExtCmdOpCode {
    /// The idle command has no effect
    Idle,
    /// Invalidate and endpoint, if possible
    InvEP,
    /// Reset the CU
    Reset,
}

/// The config registers (hardware only)
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive)]
#[repr(u64)]
pub enum ConfigReg {
    /// The version of the TCU
    Version = 0x0,
    /// The number of flits the TCU dropped
    DropFlits = 0x6,
    /// The number of flits with errors the TCU received
    ErrorFlits = 0x7,
    /// The number of valid entries in the command log
    LogCount = 0x8,
    /// Enables/disables the instruction trace
    InstrTrace = 0xD,
    /// The number of valid entries in the instruction trace
    TraceCount = 0xE,
}

/// The different endpoint types
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
pub enum EpType {
    /// Invalid endpoint (unusable)
    Invalid,
    /// Send endpoint
    Send,
    /// Receive endpoint
    Receive,
    /// Memory endpoint
    Memory,
}

/// The mask of the endpoint type in the first endpoint register
pub const EP_TYPE_MASK: Reg = 0x7;
/// The position of the activity id in the first endpoint register
pub const EP_ACT_SHIFT: u32 = 3;
/// The position of the permissions in the first register of memory endpoints
pub const MEP_PERM_SHIFT: u32 = 19;
/// The position of the target tile in the first register of memory endpoints
pub const MEP_TILE_SHIFT: u32 = 23;

/// The registers of one endpoint
pub type EpRegs = [Reg; EP_REGS];

/// A decoded memory endpoint
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemEp {
    pub act: ActId,
    pub tile: TileId,
    pub addr: GlobOff,
    pub size: GlobOff,
    pub perm: Perm,
}

/// Encoding and register-address helpers for the TCU
pub struct TCU {}

impl TCU {
    /// Returns the registers of an invalid endpoint
    pub fn config_invalid() -> EpRegs {
        [EpType::Invalid as Reg, 0, 0]
    }

    /// Returns the registers of a memory endpoint for the given region in `tile`
    pub fn config_mem(act: ActId, tile: TileId, addr: GlobOff, size: GlobOff, perm: Perm) -> EpRegs {
        [
            (EpType::Memory as Reg)
                | ((act as Reg) << EP_ACT_SHIFT)
                | ((perm.bits() as Reg) << MEP_PERM_SHIFT)
                | ((tile.raw() as Reg) << MEP_TILE_SHIFT),
            addr as Reg,
            size as Reg,
        ]
    }

    /// Decodes the given registers as a memory endpoint, if they describe one
    pub fn unpack_mem_regs(regs: &EpRegs) -> Option<MemEp> {
        if (regs[0] & EP_TYPE_MASK) != EpType::Memory.into() {
            return None;
        }

        Some(MemEp {
            act: ((regs[0] >> EP_ACT_SHIFT) & 0xFFFF) as ActId,
            tile: TileId::new_from_raw(((regs[0] >> MEP_TILE_SHIFT) & 0xFFFF) as u16),
            addr: regs[1],
            size: regs[2],
            perm: Perm::from_bits_truncate(((regs[0] >> MEP_PERM_SHIFT) & 0xF) as u32),
        })
    }

    /// Returns whether the given registers describe a valid endpoint
    pub fn is_valid(regs: &EpRegs) -> bool {
        (regs[0] & EP_TYPE_MASK) != EpType::Invalid.into()
    }

    /// Returns the MMIO address for the given external register
    pub fn ext_reg_addr(reg: ExtReg) -> GlobOff {
        MMIO_ADDR + (reg as GlobOff) * 8
    }

    /// Returns the MMIO address of the given endpoint registers
    pub fn ep_regs_addr(ep: EpId) -> GlobOff {
        MMIO_ADDR + ((EXT_REGS + UNPRIV_REGS + EP_REGS * ep as usize) * 8) as GlobOff
    }

    /// Returns the MMIO address of the given config register
    pub fn config_reg_addr(reg: ConfigReg) -> GlobOff {
        MMIO_CONFIG_ADDR + (reg as GlobOff) * 8
    }
}
