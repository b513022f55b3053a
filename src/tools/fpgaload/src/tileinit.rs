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

//! The tile initializer: brings the TCU of each tile into a defined state

use base::kif::Perm;
use base::tcu::{FeatureFlags, INVALID_ACT, PMP_EP, TCU, TOTAL_EPS};

use log::debug;

use crate::device::{MemDevice, TileDevice};
use crate::layout::Layout;
use crate::Error;

/// Returns the features to set for all tiles
pub fn features(vm: bool) -> FeatureFlags {
    let mut features = FeatureFlags::PRIV | FeatureFlags::CTXSW;
    if vm {
        features |= FeatureFlags::VM;
    }
    features
}

/// Initializes the TCU of tile `idx`.
///
/// Resets the TCU, enables the instruction trace, sets the features, invalidates all endpoints
/// and finally installs the PMP endpoint for the tile's window, if the tile gets one. This has to
/// be done before anything is loaded into the window.
pub fn init_tile<T: TileDevice, M: MemDevice>(
    tile: &mut T,
    mem: &M,
    layout: &Layout,
    idx: usize,
) -> Result<(), Error> {
    debug!("{}: initializing TCU", tile.name());

    // clears the command log and all registers except the features and the EPs
    tile.tcu_reset()?;
    tile.enable_trace()?;
    tile.set_features(features(layout.vm()))?;

    let invalid = TCU::config_invalid();
    for ep in 0..TOTAL_EPS {
        tile.set_ep(ep, &invalid)?;
    }

    if layout.has_pmp(idx) {
        let win = layout.window(idx);
        let regs = TCU::config_mem(INVALID_ACT, mem.id(), win.addr, win.size, Perm::RW);
        tile.set_ep(PMP_EP, &regs)?;
    }
    Ok(())
}

/// Initializes all given tiles in index order
pub fn init_tiles<T: TileDevice, M: MemDevice>(
    tiles: &mut [T],
    mem: &M,
    layout: &Layout,
) -> Result<(), Error> {
    for (idx, tile) in tiles.iter_mut().enumerate() {
        init_tile(tile, mem, layout, idx)?;
    }
    Ok(())
}
