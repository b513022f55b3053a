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

//! Describes the tiles of the FPGA platform to the booted system

use base::cfg;
use base::kif::{TileAttr, TileDesc, TileISA, TileType};
use base::mem::GlobOff;

use crate::layout::Layout;

/// Returns the descriptor of tile `idx`.
///
/// Indices below the number of compute tiles describe RISC-V compute tiles. Without virtual
/// memory, these tiles use their private window like an internal memory of `pmp_size` bytes. The
/// index equal to the number of compute tiles describes the memory tile.
pub fn tile_desc(idx: usize, tiles: usize, vm: bool, pmp_size: GlobOff) -> TileDesc {
    if idx >= tiles {
        return mem_desc();
    }

    let mut attr = if idx < cfg::ROCKET_TILES {
        TileAttr::ROCKET
    }
    else {
        TileAttr::BOOM
    };
    if idx == cfg::IO_TILE {
        attr |= TileAttr::NIC | TileAttr::SERIAL;
    }

    let memsize = if vm {
        0
    }
    else {
        attr |= TileAttr::IMEM;
        pmp_size
    };

    TileDesc::new_with_attr(TileType::Comp, TileISA::RISCV, memsize, attr)
}

/// Returns the descriptor of the memory tile
pub fn mem_desc() -> TileDesc {
    TileDesc::new_with_attr(TileType::Mem, TileISA::None, cfg::DRAM_SIZE, TileAttr::IMEM)
}

/// Returns the descriptors of all compute tiles followed by the one of the memory tile
pub fn all_descs(layout: &Layout) -> Vec<TileDesc> {
    (0..=layout.tiles())
        .map(|i| tile_desc(i, layout.tiles(), layout.vm(), layout.pmp_size()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use base::kif::{ATTR_SHIFT, ISA_SHIFT, MEM_SHIFT};

    const PMP: GlobOff = cfg::PMP_SIZE_NOVM;

    #[test]
    fn plain_compute_tile() {
        let desc = tile_desc(0, 8, true, PMP);
        assert_eq!(desc.value(), (1 << ISA_SHIFT) | (TileAttr::ROCKET.bits() << ATTR_SHIFT));
        assert_eq!(desc.value(), 0x40 | (1 << 12));
        assert!(desc.has_virtmem());

        let desc = tile_desc(5, 8, true, PMP);
        assert_eq!(desc.attr(), TileAttr::BOOM);
    }

    #[test]
    fn spm_compute_tile() {
        let desc = tile_desc(1, 8, false, PMP);
        assert_eq!(
            desc.value(),
            (1 << ISA_SHIFT)
                | ((TileAttr::ROCKET | TileAttr::IMEM).bits() << ATTR_SHIFT)
                | ((PMP >> 12) << MEM_SHIFT)
        );
        assert_eq!(desc.mem_size(), PMP);
        assert!(!desc.has_virtmem());
    }

    #[test]
    fn io_tile() {
        let desc = tile_desc(cfg::IO_TILE, 8, true, PMP);
        assert_eq!(desc.attr(), TileAttr::BOOM | TileAttr::NIC | TileAttr::SERIAL);
        assert_eq!(
            desc.value(),
            0x40 | (((1 << 0) | (1 << 2) | (1 << 3)) << 11)
        );
    }

    #[test]
    fn memory_tile() {
        let desc = tile_desc(8, 8, true, PMP);
        assert_eq!(desc, mem_desc());
        assert_eq!(desc.value(), (cfg::DRAM_SIZE >> 12) << 28 | ((1 << 4) << 11) | 1);
        assert_eq!(desc.tile_type(), TileType::Mem);
        assert_eq!(desc.isa(), TileISA::None);
        assert_eq!(desc.mem_size(), cfg::DRAM_SIZE);
    }
}
