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

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base::cfg;
use fpgaload::bootinfo::ModSpec;
use fpgaload::config::{Config, ConsoleKind, ExitPolicy};
use fpgaload::loader::Program;

/// A load segment of a synthesized ELF binary
pub struct Segment {
    pub addr: u64,
    pub data: Vec<u8>,
    pub mem_size: u64,
}

/// Builds a minimal 64-bit little-endian RISC-V executable
pub fn elf(entry: u64, segments: &[Segment]) -> Vec<u8> {
    const EHDR: usize = 64;
    const PHDR: usize = 56;

    let mut data = vec![0u8; EHDR + segments.len() * PHDR];
    data[0..4].copy_from_slice(b"\x7FELF");
    data[4] = 2; // 64 bit
    data[5] = 1; // little endian
    data[6] = 1;
    data[16..18].copy_from_slice(&2u16.to_le_bytes()); // executable
    data[18..20].copy_from_slice(&0xF3u16.to_le_bytes()); // RISC-V
    data[20..24].copy_from_slice(&1u32.to_le_bytes());
    data[24..32].copy_from_slice(&entry.to_le_bytes());
    data[32..40].copy_from_slice(&(EHDR as u64).to_le_bytes());
    data[52..54].copy_from_slice(&(EHDR as u16).to_le_bytes());
    data[54..56].copy_from_slice(&(PHDR as u16).to_le_bytes());
    data[56..58].copy_from_slice(&(segments.len() as u16).to_le_bytes());

    for (i, seg) in segments.iter().enumerate() {
        let offset = data.len() as u64;
        let ph = EHDR + i * PHDR;
        data[ph..ph + 4].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
        data[ph + 4..ph + 8].copy_from_slice(&7u32.to_le_bytes());
        data[ph + 8..ph + 16].copy_from_slice(&offset.to_le_bytes());
        data[ph + 16..ph + 24].copy_from_slice(&seg.addr.to_le_bytes());
        data[ph + 24..ph + 32].copy_from_slice(&seg.addr.to_le_bytes());
        data[ph + 32..ph + 40].copy_from_slice(&(seg.data.len() as u64).to_le_bytes());
        data[ph + 40..ph + 48].copy_from_slice(&seg.mem_size.to_le_bytes());
        data[ph + 48..ph + 56].copy_from_slice(&0x1000u64.to_le_bytes());
        data.extend_from_slice(&seg.data);
    }
    data
}

/// The code of the test programs
pub const CODE: &[u8] = &[0x13, 0x00, 0x00, 0x00, 0x6f, 0x00, 0x00, 0x00];
/// The size of the zero-initialized data of the test programs
pub const BSS_SIZE: u64 = 0x100;

/// Writes a program with the given entry point to `dir` and returns its path
pub fn write_program(dir: &Path, name: &str, entry: u64) -> PathBuf {
    let path = dir.join(name);
    let bin = elf(entry, &[Segment {
        addr: cfg::ENTRY_ADDR,
        data: CODE.to_vec(),
        mem_size: CODE.len() as u64 + BSS_SIZE,
    }]);
    fs::write(&path, bin).unwrap();
    path
}

/// Writes a module with `size` bytes of `fill` to `dir` and returns its path
pub fn write_module(dir: &Path, name: &str, size: usize, fill: u8) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, vec![fill; size]).unwrap();
    path
}

/// Returns a program for the given path with additional arguments
pub fn program(path: &Path, args: &[&str]) -> Program {
    let mut all = vec![path.to_string_lossy().into_owned()];
    all.extend(args.iter().map(|a| a.to_string()));
    Program {
        path: path.to_path_buf(),
        args: all,
    }
}

/// Returns a configuration with default settings for the given programs and modules
pub fn config(programs: Vec<Program>, mods: Vec<ModSpec>) -> Config {
    Config {
        fpga: 0,
        version: 2,
        reset: false,
        debug: None,
        programs,
        mods,
        vm: false,
        console: ConsoleKind::Mailbox,
        logflags: None,
        timeout: Some(Duration::from_secs(10)),
        exit_policy: ExitPolicy::AlwaysSucceed,
        dry_run: None,
    }
}
