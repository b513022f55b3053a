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

//! The FPGA platform, reached via UDP
//!
//! The FPGA contains eight compute tiles (PM0 to PM7) and the memory tile (DRAM) on chip 0.

mod link;
mod tile;

pub use self::link::{Header, Link, Mode, FPGA_BASE_IP, FPGA_PORT, MAX_PAYLOAD};
pub use self::tile::{CtrlReg, HwMem, HwTile, Ring, CTRL_ADDR, INSTR_TRACE, TCU_LOG};

use std::rc::Rc;
use std::time::Duration;

use base::cfg;
use base::tcu::{EpId, TileId};

use log::info;

use crate::device::{DeviceError, NocDevice, Platform, TileDevice};

/// The number of compute tiles
pub const TILES: usize = 8;

/// The NoC interface of the FPGA
pub struct HwNoc {
    link: Rc<Link>,
}

impl NocDevice for HwNoc {
    fn send_bytes(&mut self, dst: TileId, ep: EpId, data: &[u8]) -> Result<(), DeviceError> {
        for chunk in data.chunks(MAX_PAYLOAD) {
            self.link.send_msg(dst, ep, chunk)?;
        }
        Ok(())
    }

    fn receive_bytes(&mut self, timeout: Duration) -> Result<Vec<u8>, DeviceError> {
        self.link.recv_msg(timeout)
    }
}

/// The connected FPGA
pub struct HwPlatform {
    tiles: Vec<HwTile>,
    mem: HwMem,
    noc: HwNoc,
}

impl HwPlatform {
    /// Connects to FPGA number `fpga`; with `reset`, the TCUs of all tiles are reset first
    pub fn connect(fpga: u8, reset: bool) -> Result<Self, DeviceError> {
        let link = Rc::new(Link::connect(fpga)?);
        info!("Connected to FPGA at {}", link.peer());

        let mut tiles = (0..TILES)
            .map(|i| HwTile::new(i, TileId::new(0, i as u8), link.clone()))
            .collect::<Vec<_>>();
        if reset {
            for t in &mut tiles {
                t.stop()?;
                t.tcu_reset()?;
            }
        }

        Ok(Self {
            tiles,
            mem: HwMem::new(TileId::new(0, cfg::MEM_TILE as u8), link.clone()),
            noc: HwNoc { link },
        })
    }
}

impl Platform for HwPlatform {
    type Mem = HwMem;
    type Noc = HwNoc;
    type Tile = HwTile;

    fn split(&mut self) -> (&mut [HwTile], &mut HwMem, &mut HwNoc) {
        (&mut self.tiles, &mut self.mem, &mut self.noc)
    }
}
