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

//! The compute tiles and the memory tile of the FPGA

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use base::mem::GlobOff;
use base::tcu::{self, ConfigReg, EpId, EpRegs, ExtCmdOpCode, ExtReg, FeatureFlags, Reg, TileId, TCU};

use log::debug;

use super::link::Link;
use crate::device::{DeviceError, FlitStats, MemDevice, PacketStats, TileDevice};

/// The registers of the tile controller, which sits next to the core and the TCU
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u64)]
pub enum CtrlReg {
    /// Enables the clock of the core
    Clock,
    /// Holds the core in reset
    Reset,
    /// Raises interrupt 0 of the core, which starts the execution
    Interrupt,
    /// Enables the ARQ unit of the NoC router
    ArqEnable,
    /// The retransmission timeout of the ARQ unit in cycles
    ArqTimeout,
    /// The number of packets the ARQ unit dropped
    ArqDropped,
    /// The number of packets the ARQ unit handled
    ArqTotal,
}

/// The base address of the tile controller
pub const CTRL_ADDR: GlobOff = 0xFF00_0000;

/// A ring buffer of log entries in the TCU's MMIO space
pub struct Ring {
    pub addr: GlobOff,
    pub entries: u64,
    /// The number of 8-byte words per entry
    pub words: u64,
}

/// The TCU command log
pub const TCU_LOG: Ring = Ring {
    addr: tcu::MMIO_CONFIG_ADDR + 0x1000,
    entries: 1024,
    words: 2,
};

/// The instruction trace of the core
pub const INSTR_TRACE: Ring = Ring {
    addr: TCU_LOG.addr + TCU_LOG.entries * TCU_LOG.words * 8,
    entries: 4096,
    words: 1,
};

fn ctrl_addr(reg: CtrlReg) -> GlobOff {
    CTRL_ADDR + reg as GlobOff * 8
}

impl Ring {
    /// Writes the `count` most recent entries to `path`, or the entire buffer if `all` is set
    fn dump(
        &self,
        link: &Link,
        tile: TileId,
        count: u64,
        all: bool,
        path: &Path,
    ) -> Result<(), DeviceError> {
        let (first, num) = if all {
            (0, self.entries)
        }
        else {
            let num = count.min(self.entries);
            ((count + self.entries - num) % self.entries, num)
        };

        let mut out = BufWriter::new(File::create(path)?);
        let mut buf = vec![0u8; (self.words * 8) as usize];
        for i in 0..num {
            let idx = (first + i) % self.entries;
            link.read(tile, self.addr + idx * self.words * 8, &mut buf)?;
            let line = buf
                .chunks_exact(8)
                .map(|w| {
                    let mut word = [0u8; 8];
                    word.copy_from_slice(w);
                    format!("{:#018x}", u64::from_le_bytes(word))
                })
                .collect::<Vec<_>>();
            writeln!(out, "{}", line.join(" "))?;
        }
        out.flush()?;
        Ok(())
    }
}

/// A compute tile of the FPGA
pub struct HwTile {
    name: String,
    id: TileId,
    link: Rc<Link>,
}

impl HwTile {
    pub fn new(idx: usize, id: TileId, link: Rc<Link>) -> Self {
        Self {
            name: format!("PM{}", idx),
            id,
            link,
        }
    }

    fn write_reg(&self, addr: GlobOff, val: Reg) -> Result<(), DeviceError> {
        self.link.write_u64(self.id, addr, val)
    }

    fn read_reg(&self, addr: GlobOff) -> Result<Reg, DeviceError> {
        self.link.read_u64(self.id, addr)
    }
}

impl TileDevice for HwTile {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> TileId {
        self.id
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.write_reg(ctrl_addr(CtrlReg::Reset), 1)?;
        self.write_reg(ctrl_addr(CtrlReg::Clock), 0)
    }

    fn enable_clock(&mut self) -> Result<(), DeviceError> {
        self.write_reg(ctrl_addr(CtrlReg::Clock), 1)?;
        self.write_reg(ctrl_addr(CtrlReg::Reset), 0)
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        debug!("{}: starting core", self.name);
        self.write_reg(ctrl_addr(CtrlReg::Interrupt), 1)
    }

    fn tcu_version(&mut self) -> Result<u64, DeviceError> {
        Ok(self.read_reg(TCU::config_reg_addr(ConfigReg::Version))? & 0xFFFF)
    }

    fn tcu_reset(&mut self) -> Result<(), DeviceError> {
        self.write_reg(TCU::ext_reg_addr(ExtReg::ExtCmd), ExtCmdOpCode::Reset.into())
    }

    fn enable_trace(&mut self) -> Result<(), DeviceError> {
        self.write_reg(TCU::config_reg_addr(ConfigReg::InstrTrace), 1)
    }

    fn set_features(&mut self, features: FeatureFlags) -> Result<(), DeviceError> {
        self.write_reg(TCU::ext_reg_addr(ExtReg::Features), features.bits())
    }

    fn set_ep(&mut self, ep: EpId, regs: &EpRegs) -> Result<(), DeviceError> {
        let bytes = regs.iter().flat_map(|r| r.to_le_bytes()).collect::<Vec<u8>>();
        self.link.write(self.id, TCU::ep_regs_addr(ep), &bytes)
    }

    fn set_arq(&mut self, enable: bool, timeout: Option<u32>) -> Result<(), DeviceError> {
        self.write_reg(ctrl_addr(CtrlReg::ArqEnable), enable as Reg)?;
        if let Some(t) = timeout {
            self.write_reg(ctrl_addr(CtrlReg::ArqTimeout), t as Reg)?;
        }
        Ok(())
    }

    fn arq_packets(&mut self) -> Result<PacketStats, DeviceError> {
        Ok(PacketStats {
            dropped: self.read_reg(ctrl_addr(CtrlReg::ArqDropped))?,
            total: self.read_reg(ctrl_addr(CtrlReg::ArqTotal))?,
        })
    }

    fn tcu_flits(&mut self) -> Result<FlitStats, DeviceError> {
        Ok(FlitStats {
            dropped: self.read_reg(TCU::config_reg_addr(ConfigReg::DropFlits))?,
            errors: self.read_reg(TCU::config_reg_addr(ConfigReg::ErrorFlits))?,
        })
    }

    fn dump_tcu_log(&mut self, path: &Path, all: bool) -> Result<(), DeviceError> {
        let count = self.read_reg(TCU::config_reg_addr(ConfigReg::LogCount))?;
        TCU_LOG.dump(&self.link, self.id, count, all, path)
    }

    fn dump_trace(&mut self, path: &Path, all: bool) -> Result<(), DeviceError> {
        let count = self.read_reg(TCU::config_reg_addr(ConfigReg::TraceCount))?;
        INSTR_TRACE.dump(&self.link, self.id, count, all, path)
    }
}

/// The memory tile of the FPGA
pub struct HwMem {
    id: TileId,
    link: Rc<Link>,
}

impl HwMem {
    pub fn new(id: TileId, link: Rc<Link>) -> Self {
        Self { id, link }
    }
}

impl MemDevice for HwMem {
    fn id(&self) -> TileId {
        self.id
    }

    fn write_bytes(&mut self, off: GlobOff, data: &[u8]) -> Result<(), DeviceError> {
        self.link.write(self.id, off, data)
    }

    fn read_bytes(&mut self, off: GlobOff, buf: &mut [u8]) -> Result<(), DeviceError> {
        self.link.read(self.id, off, buf)
    }

    fn set_arq(&mut self, enable: bool, timeout: Option<u32>) -> Result<(), DeviceError> {
        self.link.write_u64(self.id, ctrl_addr(CtrlReg::ArqEnable), enable as Reg)?;
        if let Some(t) = timeout {
            self.link.write_u64(self.id, ctrl_addr(CtrlReg::ArqTimeout), t as Reg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_addresses() {
        assert_eq!(ctrl_addr(CtrlReg::Clock), 0xFF00_0000);
        assert_eq!(ctrl_addr(CtrlReg::ArqTotal), 0xFF00_0030);
        assert_eq!(INSTR_TRACE.addr, TCU_LOG.addr + 1024 * 16);
    }
}
