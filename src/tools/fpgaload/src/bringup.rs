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

//! The bring-up of the platform, from stopping the tiles to starting the loaded programs

use std::fs;
use std::path::Path;

use base::tcu::TileId;

use log::info;

use crate::bootinfo::{self, BootInfo};
use crate::config::Config;
use crate::device::{MemDevice, Platform, TileDevice};
use crate::layout::Layout;
use crate::loader::{self, Image, LoadParams};
use crate::tileinit;
use crate::Error;

/// The ARQ timeout while the tiles are running
pub const ARQ_TIMEOUT: u32 = 200;

/// The result of a successful bring-up
#[derive(Debug)]
pub struct Bringup {
    pub layout: Layout,
    pub bootinfo: BootInfo,
}

/// Stops all tiles and checks that their TCU has the expected version
pub fn connect<P: Platform>(plat: &mut P, version: u64) -> Result<(), Error> {
    for tile in plat.tiles().iter_mut() {
        tile.stop()?;
    }

    for tile in plat.tiles().iter_mut() {
        let found = tile.tcu_version()?;
        if found != version {
            return Err(Error::TcuVersion {
                tile: tile.name().to_string(),
                found,
                expected: version,
            });
        }
    }
    Ok(())
}

/// Loads the boot information, the modules and the programs and prepares all tiles.
///
/// Everything that can fail without touching the memory tile (reading modules and programs,
/// planning the layout) is done first. The ARQ is disabled during the upload and enabled again
/// afterwards. No tile is started.
pub fn load<P: Platform>(plat: &mut P, cfg: &Config) -> Result<Bringup, Error> {
    let (tiles, mem, _) = plat.split();

    if let Some(debug) = cfg.debug {
        if debug >= tiles.len() {
            return Err(Error::Config(format!(
                "debug tile {} does not exist (platform has {} tiles)",
                debug,
                tiles.len()
            )));
        }
    }

    let layout = Layout::plan(tiles.len(), cfg.programs.len(), cfg.vm, cfg.pmp_size())?;
    let modules = bootinfo::read_modules(&cfg.mods)?;
    let images = cfg
        .programs
        .iter()
        .map(|p| Image::open(&p.path, layout.pmp_size()))
        .collect::<Result<Vec<_>, _>>()?;

    let tile_ids = tiles
        .iter()
        .map(|t| t.id())
        .chain(std::iter::once(mem.id()))
        .collect::<Vec<TileId>>();

    // disable NoC ARQ for program upload
    plat.set_arq_enable(false, None)?;

    let (tiles, mem, _) = plat.split();
    let bootinfo = bootinfo::load_boot_info(mem, &layout, &modules)?;

    tileinit::init_tiles(tiles, mem, &layout)?;

    let params = LoadParams {
        layout: &layout,
        descs: &bootinfo.tiles,
        tile_ids: &tile_ids,
        logflags: cfg.logflags.as_deref(),
    };
    for (idx, (prog, image)) in cfg.programs.iter().zip(&images).enumerate() {
        loader::load_program(&mut tiles[idx], mem, &params, idx, prog, image)?;
    }

    // enable NoC ARQ when cores are running
    plat.set_arq_enable(true, Some(ARQ_TIMEOUT))?;

    Ok(Bringup { layout, bootinfo })
}

/// Starts all tiles in index order, except for the debug tile
pub fn start<P: Platform>(plat: &mut P, debug: Option<usize>) -> Result<(), Error> {
    for (idx, tile) in plat.tiles().iter_mut().enumerate() {
        if Some(idx) != debug {
            tile.start()?;
        }
        else {
            info!("{}: not starting debug tile", tile.name());
        }
    }
    Ok(())
}

/// Signals external scripts that everything has been loaded
pub fn write_ready_marker(path: &Path) -> Result<(), Error> {
    fs::write(path, "1")?;
    Ok(())
}

/// Performs the complete bring-up: connect, load and start
pub fn bring_up<P: Platform>(plat: &mut P, cfg: &Config) -> Result<Bringup, Error> {
    connect(plat, cfg.version)?;
    let res = load(plat, cfg)?;
    start(plat, cfg.debug)?;
    Ok(res)
}
