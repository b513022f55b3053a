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

//! The address planner: partitions the memory tile among its consumers.
//!
//! ```text
//! 0          KENV_SIZE   +SERIAL_SIZE = PMP_ADDR                         mods       DRAM_SIZE
//! +-----------+-----------+-----------+-----------+-----+-----------+------------------+
//! | boot info |  mailbox  | window 0  | window 1  | ... | window n-1| modules + memory |
//! +-----------+-----------+-----------+-----------+-----+-----------+------------------+
//! ```
//!
//! Every region is owned by exactly one consumer and no two regions overlap. Thus, the components
//! writing to the memory tile never need to synchronize with each other.

use base::cfg;
use base::mem::GlobOff;
use base::util::math;

use crate::Error;

/// A region within the memory tile, exclusively owned by one consumer
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryWindow {
    pub addr: GlobOff,
    pub size: GlobOff,
}

impl MemoryWindow {
    pub const fn new(addr: GlobOff, size: GlobOff) -> Self {
        Self { addr, size }
    }

    /// Returns the first address behind the window
    pub const fn end(&self) -> GlobOff {
        self.addr + self.size
    }

    /// Returns whether `off..off+len` lies within this window
    pub fn contains(&self, off: GlobOff, len: GlobOff) -> bool {
        off >= self.addr && off.checked_add(len).map_or(false, |end| end <= self.end())
    }

    pub fn overlaps(&self, other: &MemoryWindow) -> bool {
        math::overlaps(self.addr, self.end(), other.addr, other.end())
    }
}

/// The planned layout of the memory tile
///
/// The layout is computed once and afterwards only passed around by reference.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Layout {
    vm: bool,
    boot_tiles: usize,
    kenv: MemoryWindow,
    mailbox: MemoryWindow,
    windows: Vec<MemoryWindow>,
    mods: MemoryWindow,
}

impl Layout {
    /// Plans the layout for `tiles` compute tiles with private windows of `pmp_size` bytes.
    ///
    /// The first `boot_tiles` tiles are loaded with a program. With virtual memory, only these get
    /// access to their window; the others still reserve the space to keep the layout uniform.
    pub fn plan(tiles: usize, boot_tiles: usize, vm: bool, pmp_size: GlobOff) -> Result<Self, Error> {
        if pmp_size == 0 || !math::is_aligned(pmp_size, cfg::PAGE_SIZE) {
            return Err(Error::Config(format!(
                "window size {:#x} is not a multiple of the page size",
                pmp_size
            )));
        }
        if boot_tiles > tiles {
            return Err(Error::Config(format!(
                "{} programs given, but the platform has only {} tiles",
                boot_tiles, tiles
            )));
        }

        let windows = (0..tiles as GlobOff)
            .map(|i| MemoryWindow::new(cfg::PMP_ADDR + i * pmp_size, pmp_size))
            .collect::<Vec<_>>();

        let mods_addr = math::round_up(cfg::PMP_ADDR + tiles as GlobOff * pmp_size, cfg::MOD_ALIGN);
        if mods_addr > cfg::DRAM_SIZE {
            return Err(Error::LayoutOverflow {
                what: "private windows",
                end: mods_addr,
                limit: cfg::DRAM_SIZE,
            });
        }

        Ok(Self {
            vm,
            boot_tiles,
            kenv: MemoryWindow::new(cfg::KENV_ADDR, cfg::KENV_SIZE),
            mailbox: MemoryWindow::new(cfg::SERIAL_ADDR, cfg::SERIAL_SIZE),
            windows,
            mods: MemoryWindow::new(mods_addr, cfg::DRAM_SIZE - mods_addr),
        })
    }

    /// Returns whether virtual memory is enabled
    pub fn vm(&self) -> bool {
        self.vm
    }

    /// Returns the number of compute tiles
    pub fn tiles(&self) -> usize {
        self.windows.len()
    }

    /// Returns the number of tiles that are loaded with a program
    pub fn boot_tiles(&self) -> usize {
        self.boot_tiles
    }

    /// Returns the size of the private windows
    pub fn pmp_size(&self) -> GlobOff {
        self.windows.first().map_or(0, |w| w.size)
    }

    /// The region for the boot information
    pub fn kenv(&self) -> MemoryWindow {
        self.kenv
    }

    /// The region for the serial mailbox
    pub fn mailbox(&self) -> MemoryWindow {
        self.mailbox
    }

    /// The private window of the given tile
    pub fn window(&self, tile: usize) -> MemoryWindow {
        self.windows[tile]
    }

    /// The region for boot modules; everything behind the modules is handed out as free memory
    pub fn mods(&self) -> MemoryWindow {
        self.mods
    }

    /// Returns whether the given tile gets a physical-memory-protection endpoint for its window
    pub fn has_pmp(&self, tile: usize) -> bool {
        !self.vm || tile < self.boot_tiles
    }

    /// Translates the address `virt`, as seen by the given tile, into an offset in the memory tile
    pub fn translate(&self, tile: usize, virt: u64) -> GlobOff {
        debug_assert!(virt >= cfg::MEM_OFFSET);
        self.windows[tile].addr + (virt - cfg::MEM_OFFSET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_disjoint() {
        let layout = Layout::plan(8, 3, true, cfg::PMP_SIZE_VM).unwrap();
        let mut regions = vec![layout.kenv(), layout.mailbox(), layout.mods()];
        regions.extend((0..layout.tiles()).map(|i| layout.window(i)));
        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
            }
        }
        assert_eq!(layout.mods().end(), cfg::DRAM_SIZE);
    }

    #[test]
    fn planning_is_deterministic() {
        let a = Layout::plan(4, 4, false, cfg::PMP_SIZE_NOVM).unwrap();
        let b = Layout::plan(4, 4, false, cfg::PMP_SIZE_NOVM).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn pmp_only_for_loaded_tiles_with_vm() {
        let layout = Layout::plan(4, 2, true, cfg::PMP_SIZE_VM).unwrap();
        assert!(layout.has_pmp(1));
        assert!(!layout.has_pmp(2));
        // the unloaded tiles still reserve their window
        assert_eq!(layout.mods().addr, cfg::PMP_ADDR + 4 * cfg::PMP_SIZE_VM);

        let layout = Layout::plan(4, 2, false, cfg::PMP_SIZE_NOVM).unwrap();
        assert!(layout.has_pmp(3));
    }

    #[test]
    fn too_many_windows() {
        assert!(matches!(
            Layout::plan(64, 1, false, cfg::PMP_SIZE_NOVM),
            Err(Error::LayoutOverflow { .. })
        ));
        assert!(matches!(Layout::plan(2, 3, false, cfg::PMP_SIZE_NOVM), Err(Error::Config(_))));
        assert!(matches!(Layout::plan(2, 1, false, 0x1234), Err(Error::Config(_))));
    }

    #[test]
    fn translation() {
        let layout = Layout::plan(2, 2, false, cfg::PMP_SIZE_NOVM).unwrap();
        assert_eq!(layout.translate(1, cfg::ENV_START), cfg::PMP_ADDR + cfg::PMP_SIZE_NOVM + 0x1000);
    }
}
