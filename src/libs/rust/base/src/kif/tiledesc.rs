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

use bitflags::bitflags;
use core::fmt;

use num_enum::{FromPrimitive, IntoPrimitive};

/// The tile type, stored in the lowest bits of a [`TileDesc`]
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, FromPrimitive)]
#[repr(u64)]
pub enum TileType {
    #[default]
    Comp = 0,
    Mem  = 1,
}

/// The ISA of a tile.
///
/// The booted system knows more ISAs than the FPGA provides; the values are shared with it and
/// must not change. Devices and accelerators are represented by dummy ISAs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, FromPrimitive)]
#[repr(u64)]
pub enum TileISA {
    /// Memory tiles have no ISA
    #[default]
    None       = 0,
    RISCV      = 1,
    X86        = 2,
    ARM        = 3,
    AccelIndir = 4,
    AccelCopy  = 5,
    AccelRot13 = 6,
    IDEDev     = 7,
    NICDev     = 8,
    SerialDev  = 9,
}

bitflags! {
    /// The attributes for tiles
    ///
    /// These attributes cover smaller differences between tiles and allow us to choose between
    /// otherwise identical tiles.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TileAttr : TileDescRaw {
        /// Contains a BOOM core
        const BOOM          = 1 << 0;
        /// Contains a Rocket core
        const ROCKET        = 1 << 1;
        /// Contains a NIC
        const NIC           = 1 << 2;
        /// Contains a serial line
        const SERIAL        = 1 << 3;
        /// Contains internal memory (for memory tiles or SPM in compute tiles)
        const IMEM          = 1 << 4;
        /// Contains a Keccak Accelerator (KecAcc)
        const KECACC        = 1 << 5;
    }
}

/// The underlying type of [`TileDesc`]
///
/// +---------------------------+------------+-----+------+
/// | memory size (in 4K pages) | attributes | ISA | type |
/// +---------------------------+------------+-----+------+
/// 64                         28           11     6      0
pub type TileDescRaw = u64;

/// The mask for the tile type
pub const TYPE_MASK: TileDescRaw = 0x3F;
/// The position of the ISA
pub const ISA_SHIFT: u32 = 6;
/// The mask for the ISA (after shifting)
pub const ISA_MASK: TileDescRaw = 0x1F;
/// The position of the attributes
pub const ATTR_SHIFT: u32 = 11;
/// The mask for the attributes (after shifting)
pub const ATTR_MASK: TileDescRaw = 0x1FFFF;
/// The position of the memory size (in pages)
pub const MEM_SHIFT: u32 = 28;

const PAGE_SHIFT: u32 = crate::cfg::PAGE_BITS as u32;

/// Describes a tile.
///
/// The loader passes one descriptor per tile to the booted system (in the boot information) and
/// one to each tile (in its environment). The booted system decodes them directly, so the layout
/// above has to be kept bit-for-bit.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct TileDesc {
    val: TileDescRaw,
}

impl TileDesc {
    /// Creates a new tile description from the given type, ISA, and memory size.
    pub const fn new(ty: TileType, isa: TileISA, memsize: u64) -> TileDesc {
        Self::new_with_attr(ty, isa, memsize, TileAttr::empty())
    }

    /// Creates a new tile description from the given type, ISA, memory size, and attributes.
    pub const fn new_with_attr(
        ty: TileType,
        isa: TileISA,
        memsize: u64,
        attr: TileAttr,
    ) -> TileDesc {
        let mem_pages = memsize >> PAGE_SHIFT;
        let val = ty as TileDescRaw
            | (isa as TileDescRaw) << ISA_SHIFT
            | (attr.bits() << ATTR_SHIFT)
            | (mem_pages as TileDescRaw) << MEM_SHIFT;
        Self::new_from(val)
    }

    /// Creates a new tile description from the given raw value
    pub const fn new_from(val: TileDescRaw) -> TileDesc {
        TileDesc { val }
    }

    /// Returns the raw value
    pub const fn value(self) -> TileDescRaw {
        self.val
    }

    pub fn tile_type(self) -> TileType {
        TileType::from(self.val & TYPE_MASK)
    }

    pub fn isa(self) -> TileISA {
        TileISA::from((self.val >> ISA_SHIFT) & ISA_MASK)
    }

    pub fn attr(self) -> TileAttr {
        TileAttr::from_bits_truncate((self.val >> ATTR_SHIFT) & ATTR_MASK)
    }

    /// Returns the size of the internal memory (0 if none is present)
    pub fn mem_size(self) -> u64 {
        (self.val >> MEM_SHIFT) << PAGE_SHIFT
    }

    /// Returns whether the tile is a device instead of a core
    pub fn is_device(self) -> bool {
        matches!(
            self.isa(),
            TileISA::NICDev | TileISA::IDEDev | TileISA::SerialDev
        )
    }

    /// Returns whether the tile has an internal memory (SPM, DRAM, ...)
    pub fn has_memory(self) -> bool {
        self.tile_type() == TileType::Mem || self.attr().contains(TileAttr::IMEM)
    }

    /// Returns whether the tile supports virtual memory
    pub fn has_virtmem(self) -> bool {
        !self.has_memory() && !self.is_device()
    }
}

impl fmt::Debug for TileDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TileDesc[type={:?}, isa={:?}, memsz={:#x}, attr={:?}]",
            self.tile_type(),
            self.isa(),
            self.mem_size(),
            self.attr(),
        )
    }
}
