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

use core::fmt;

use crate::cfg;
use crate::mem::GlobOff;

/// The position of the tile tag within a global address
pub const TILE_SHIFT: u64 = 49;
/// The value added to the tile index to form the tile tag
pub const TILE_OFFSET: u64 = 0x4000;

/// Represents a global address, which is a combination of a tile index and an offset within the
/// tile.
///
/// This is the only address form that is understood across the NoC:
///
/// ```text
/// +---------------------------+--------------------------------+
/// | TILE_OFFSET + tile index  |             offset             |
/// +---------------------------+--------------------------------+
/// 64                          49                               0
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GlobAddr {
    val: u64,
}

impl GlobAddr {
    /// Creates a new global address from the given raw value
    pub const fn new(addr: u64) -> GlobAddr {
        GlobAddr { val: addr }
    }

    /// Creates a new global address from the given tile index and offset
    pub const fn new_with(tile: u16, off: GlobOff) -> GlobAddr {
        debug_assert!((tile as usize) < cfg::MAX_TILES);
        debug_assert!(off < (1 << TILE_SHIFT));
        Self::new(((TILE_OFFSET + tile as u64) << TILE_SHIFT) | off)
    }

    /// Returns the raw value
    pub const fn raw(self) -> u64 {
        self.val
    }

    /// Returns whether a tile index is set
    pub const fn has_tile(self) -> bool {
        self.val >= (TILE_OFFSET << TILE_SHIFT)
    }

    /// Returns the tile index
    pub const fn tile(self) -> u16 {
        ((self.val >> TILE_SHIFT) - TILE_OFFSET) as u16
    }

    /// Returns the offset
    pub const fn offset(self) -> GlobOff {
        self.val & ((1 << TILE_SHIFT) - 1)
    }
}

impl fmt::Debug for GlobAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_tile() {
            write!(f, "G[T{}+{:#x}]", self.tile(), self.offset())
        }
        else {
            write!(f, "G[{:#x}]", self.raw())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_a_bijection() {
        let tiles = [0u16, 1, 7, cfg::MEM_TILE, 0xFF, (cfg::MAX_TILES - 1) as u16];
        let offsets = [0u64, 1, 0x1000, 0xdead_beef, (1 << TILE_SHIFT) - 1];
        for tile in tiles {
            for off in offsets {
                let addr = GlobAddr::new_with(tile, off);
                assert!(addr.has_tile());
                assert_eq!((addr.tile(), addr.offset()), (tile, off));
                assert_eq!(GlobAddr::new(addr.raw()), addr);
            }
        }
    }

    #[test]
    fn memory_tile_address() {
        let addr = GlobAddr::new_with(cfg::MEM_TILE, 0x2000);
        assert_eq!(addr.raw(), (0x4008 << 49) | 0x2000);
        assert_eq!(format!("{:?}", addr), "G[T8+0x2000]");
        assert_eq!(format!("{:?}", GlobAddr::new(0xF000_0000)), "G[0xf0000000]");
    }
}
