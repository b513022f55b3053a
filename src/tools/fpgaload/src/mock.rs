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

//! An in-memory platform
//!
//! The mock platform records all calls to the tiles and keeps the contents of the memory tile in
//! RAM. Failures of the tiles and the traffic on the NoC can be scripted. It is used for tests and
//! for dry runs, which perform the complete bring-up without hardware.

use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use base::cfg;
use base::mem::GlobOff;
use base::tcu::{EpId, EpRegs, FeatureFlags, TileId, TCU, TOTAL_EPS};

use crate::console::KeySource;
use crate::device::{
    DeviceError, FlitStats, MemDevice, NocDevice, PacketStats, Platform, TileDevice,
};

const PAGE_SIZE: usize = cfg::PAGE_SIZE as usize;

/// A call to a [`MockTile`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TileCall {
    Stop,
    EnableClock,
    Start,
    TcuVersion,
    TcuReset,
    EnableTrace,
    SetFeatures(FeatureFlags),
    SetEp(EpId, EpRegs),
    SetArq(bool, Option<u32>),
    ArqPackets,
    TcuFlits,
    DumpTcuLog(PathBuf, bool),
    DumpTrace(PathBuf, bool),
}

/// Scripted failures of a [`MockTile`]
#[derive(Clone, Debug, Default)]
pub struct Failures {
    /// Reading the packet counters fails
    pub packets: bool,
    /// Reading the flit counters fails
    pub flits: bool,
    /// The number of failing attempts to dump the TCU log
    pub tcu_log: usize,
    /// The number of failing attempts to dump the instruction trace
    pub trace: usize,
}

/// A compute tile that records all calls
#[derive(Debug)]
pub struct MockTile {
    name: String,
    id: TileId,
    version: u64,
    calls: Vec<TileCall>,
    eps: Vec<EpRegs>,
    pub fail: Failures,
}

impl MockTile {
    pub fn new(idx: usize, id: TileId, version: u64) -> Self {
        Self {
            name: format!("PM{}", idx),
            id,
            version,
            calls: Vec::new(),
            eps: vec![TCU::config_invalid(); TOTAL_EPS as usize],
            fail: Failures::default(),
        }
    }

    /// Returns all calls so far in order
    pub fn calls(&self) -> &[TileCall] {
        &self.calls
    }

    /// Returns the number of calls that satisfy `pred`
    pub fn count<F: Fn(&TileCall) -> bool>(&self, pred: F) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn started(&self) -> bool {
        self.calls.contains(&TileCall::Start)
    }

    /// Returns the current configuration of endpoint `ep`
    pub fn ep(&self, ep: EpId) -> EpRegs {
        self.eps[ep as usize]
    }

    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn dump(remaining: &mut usize) -> Result<(), DeviceError> {
        if *remaining > 0 {
            *remaining -= 1;
            return Err(DeviceError::Protocol("log is not readable".to_string()));
        }
        Ok(())
    }
}

impl TileDevice for MockTile {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> TileId {
        self.id
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.calls.push(TileCall::Stop);
        Ok(())
    }

    fn enable_clock(&mut self) -> Result<(), DeviceError> {
        self.calls.push(TileCall::EnableClock);
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.calls.push(TileCall::Start);
        Ok(())
    }

    fn tcu_version(&mut self) -> Result<u64, DeviceError> {
        self.calls.push(TileCall::TcuVersion);
        Ok(self.version)
    }

    fn tcu_reset(&mut self) -> Result<(), DeviceError> {
        self.calls.push(TileCall::TcuReset);
        Ok(())
    }

    fn enable_trace(&mut self) -> Result<(), DeviceError> {
        self.calls.push(TileCall::EnableTrace);
        Ok(())
    }

    fn set_features(&mut self, features: FeatureFlags) -> Result<(), DeviceError> {
        self.calls.push(TileCall::SetFeatures(features));
        Ok(())
    }

    fn set_ep(&mut self, ep: EpId, regs: &EpRegs) -> Result<(), DeviceError> {
        self.calls.push(TileCall::SetEp(ep, *regs));
        let slot = self
            .eps
            .get_mut(ep as usize)
            .ok_or_else(|| DeviceError::Protocol(format!("invalid endpoint {}", ep)))?;
        *slot = *regs;
        Ok(())
    }

    fn set_arq(&mut self, enable: bool, timeout: Option<u32>) -> Result<(), DeviceError> {
        self.calls.push(TileCall::SetArq(enable, timeout));
        Ok(())
    }

    fn arq_packets(&mut self) -> Result<PacketStats, DeviceError> {
        self.calls.push(TileCall::ArqPackets);
        if self.fail.packets {
            Err(DeviceError::Timeout)
        }
        else {
            Ok(PacketStats::default())
        }
    }

    fn tcu_flits(&mut self) -> Result<FlitStats, DeviceError> {
        self.calls.push(TileCall::TcuFlits);
        if self.fail.flits {
            Err(DeviceError::Timeout)
        }
        else {
            Ok(FlitStats::default())
        }
    }

    fn dump_tcu_log(&mut self, path: &Path, all: bool) -> Result<(), DeviceError> {
        self.calls.push(TileCall::DumpTcuLog(path.to_path_buf(), all));
        Self::dump(&mut self.fail.tcu_log)
    }

    fn dump_trace(&mut self, path: &Path, all: bool) -> Result<(), DeviceError> {
        self.calls.push(TileCall::DumpTrace(path.to_path_buf(), all));
        Self::dump(&mut self.fail.trace)
    }
}

/// A memory tile whose contents are kept in RAM, page by page
#[derive(Debug)]
pub struct MockMem {
    id: TileId,
    pages: BTreeMap<u64, Box<[u8]>>,
    arq: Vec<(bool, Option<u32>)>,
}

impl MockMem {
    pub fn new(id: TileId) -> Self {
        Self {
            id,
            pages: BTreeMap::new(),
            arq: Vec::new(),
        }
    }

    /// Returns `len` bytes at `off`; untouched memory reads as zero
    pub fn read_vec(&self, off: GlobOff, len: usize) -> Vec<u8> {
        let mut res = vec![0u8; len];
        let mut pos = 0;
        while pos < len {
            let addr = off + pos as GlobOff;
            let page_off = (addr % cfg::PAGE_SIZE) as usize;
            let amount = (PAGE_SIZE - page_off).min(len - pos);
            if let Some(page) = self.pages.get(&(addr / cfg::PAGE_SIZE)) {
                res[pos..pos + amount].copy_from_slice(&page[page_off..page_off + amount]);
            }
            pos += amount;
        }
        res
    }

    /// Returns all ARQ configurations in order
    pub fn arq_history(&self) -> &[(bool, Option<u32>)] {
        &self.arq
    }

    /// Returns the address behind the last page that has been written
    pub fn end(&self) -> GlobOff {
        self.pages
            .keys()
            .next_back()
            .map_or(0, |p| (p + 1) * cfg::PAGE_SIZE)
    }

    /// Writes the memory contents from address 0 to `len` to `path`; untouched pages become
    /// holes in the file
    pub fn save(&self, path: &Path, len: GlobOff) -> io::Result<()> {
        let mut file = File::create(path)?;
        for (no, page) in self.pages.range(..len.div_ceil(cfg::PAGE_SIZE)) {
            let off = no * cfg::PAGE_SIZE;
            let amount = (len - off).min(cfg::PAGE_SIZE) as usize;
            file.seek(SeekFrom::Start(off))?;
            file.write_all(&page[..amount])?;
        }
        file.set_len(len)
    }
}

impl MemDevice for MockMem {
    fn id(&self) -> TileId {
        self.id
    }

    fn write_bytes(&mut self, off: GlobOff, data: &[u8]) -> Result<(), DeviceError> {
        if off.checked_add(data.len() as GlobOff).map_or(true, |end| end > cfg::DRAM_SIZE) {
            return Err(DeviceError::Protocol(format!(
                "write of {} bytes at {:#x} exceeds memory",
                data.len(),
                off
            )));
        }

        let mut pos = 0;
        while pos < data.len() {
            let addr = off + pos as GlobOff;
            let page_off = (addr % cfg::PAGE_SIZE) as usize;
            let amount = (PAGE_SIZE - page_off).min(data.len() - pos);
            let page = self
                .pages
                .entry(addr / cfg::PAGE_SIZE)
                .or_insert_with(|| vec![0u8; PAGE_SIZE].into_boxed_slice());
            page[page_off..page_off + amount].copy_from_slice(&data[pos..pos + amount]);
            pos += amount;
        }
        Ok(())
    }

    fn read_bytes(&mut self, off: GlobOff, buf: &mut [u8]) -> Result<(), DeviceError> {
        buf.copy_from_slice(&self.read_vec(off, buf.len()));
        Ok(())
    }

    fn set_arq(&mut self, enable: bool, timeout: Option<u32>) -> Result<(), DeviceError> {
        self.arq.push((enable, timeout));
        Ok(())
    }
}

/// A NoC interface with scripted incoming messages
#[derive(Debug, Default)]
pub struct MockNoc {
    sent: Vec<(TileId, EpId, Vec<u8>)>,
    incoming: VecDeque<Vec<u8>>,
}

impl MockNoc {
    /// Queues a message that will be received by the next receive
    pub fn push_incoming(&mut self, msg: &[u8]) {
        self.incoming.push_back(msg.to_vec());
    }

    /// Returns all sent messages in order
    pub fn sent(&self) -> &[(TileId, EpId, Vec<u8>)] {
        &self.sent
    }
}

impl NocDevice for MockNoc {
    fn send_bytes(&mut self, dst: TileId, ep: EpId, data: &[u8]) -> Result<(), DeviceError> {
        self.sent.push((dst, ep, data.to_vec()));
        Ok(())
    }

    fn receive_bytes(&mut self, timeout: Duration) -> Result<Vec<u8>, DeviceError> {
        match self.incoming.pop_front() {
            Some(msg) => Ok(msg),
            None => {
                thread::sleep(timeout);
                Err(DeviceError::Timeout)
            },
        }
    }
}

/// The in-memory platform with the same tile numbering as the FPGA
#[derive(Debug)]
pub struct MockPlatform {
    pub tiles: Vec<MockTile>,
    pub mem: MockMem,
    pub noc: MockNoc,
}

impl MockPlatform {
    /// The number of compute tiles on the FPGA
    pub const TILES: usize = 8;

    /// Creates a platform with `tiles` compute tiles, all having TCU version `version`
    pub fn new(tiles: usize, version: u64) -> Self {
        Self {
            tiles: (0..tiles)
                .map(|i| MockTile::new(i, TileId::new(0, i as u8), version))
                .collect(),
            mem: MockMem::new(TileId::new(0, cfg::MEM_TILE as u8)),
            noc: MockNoc::default(),
        }
    }
}

impl Platform for MockPlatform {
    type Mem = MockMem;
    type Noc = MockNoc;
    type Tile = MockTile;

    fn split(&mut self) -> (&mut [MockTile], &mut MockMem, &mut MockNoc) {
        (&mut self.tiles, &mut self.mem, &mut self.noc)
    }
}

/// A key source that returns scripted keystrokes, one chunk per poll
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    keys: VecDeque<Vec<u8>>,
    restored: bool,
}

impl ScriptedKeys {
    pub fn new(chunks: &[&[u8]]) -> Self {
        Self {
            keys: chunks.iter().map(|c| c.to_vec()).collect(),
            restored: false,
        }
    }

    pub fn restored(&self) -> bool {
        self.restored
    }
}

impl KeySource for ScriptedKeys {
    fn read_keys(&mut self) -> io::Result<Vec<u8>> {
        Ok(self.keys.pop_front().unwrap_or_default())
    }

    fn restore(&mut self) -> io::Result<()> {
        self.restored = true;
        Ok(())
    }
}
