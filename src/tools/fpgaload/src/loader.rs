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

//! The program loader: puts a program, its arguments and its environment into a tile's window
//!
//! All programs are linked to [`cfg::ENTRY_ADDR`], but the tiles start at [`cfg::RESET_VEC`].
//! Therefore, the loader puts a jump to the entry point at the reset vector. Afterwards, the
//! environment block follows at [`cfg::ENV_START`] and the arguments at [`cfg::ARGV_START`]:
//!
//! ```text
//! RESET_VEC  ENV_START          ARGV_START                          ARGS_END     ENTRY_ADDR
//! +----------+------------------+----------------------------------+------------+-----------
//! | jal      | environment      | argv[], NULL, strings, envp[] .. |            | .text ...
//! +----------+------------------+----------------------------------+------------+-----------
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base::cfg;
use base::elf::{Elf, ProgramHeader};
use base::env::{self, EnvData};
use base::kif::TileDesc;
use base::mem::{GlobAddr, GlobOff};
use base::tcu::TileId;
use base::util::math;

use log::{debug, info};

use crate::device::{MemDevice, TileDevice};
use crate::layout::Layout;
use crate::Error;

/// A program to run on a tile, as given on the command line (`<path> <args...>`)
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Program {
    pub path: PathBuf,
    /// All arguments, including the path as the first one
    pub args: Vec<String>,
}

impl FromStr for Program {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let args = s.split_whitespace().map(|a| a.to_string()).collect::<Vec<_>>();
        match args.first() {
            Some(path) => Ok(Self {
                path: PathBuf::from(path),
                args,
            }),
            None => Err(Error::Config("empty program given".to_string())),
        }
    }
}

/// The argument area of a tile: pointer vectors and strings, addressed as seen by the tile
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ArgArea {
    start: u64,
    bytes: Vec<u8>,
}

impl ArgArea {
    /// Creates an empty argument area at virtual address `start`
    pub fn new(start: u64) -> Self {
        Self {
            start,
            bytes: Vec::new(),
        }
    }

    /// Returns the virtual address of the area
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Returns the virtual address behind the last byte that has been added
    pub fn cursor(&self) -> u64 {
        self.start + self.bytes.len() as u64
    }

    /// Returns the contents of the area
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Appends a NULL-terminated vector of pointers to the given strings, followed by the strings
    /// themselves, and returns the virtual address of the vector.
    ///
    /// Each string is NULL-terminated and padded to 8 bytes. Fails if the area would grow beyond
    /// `limit`, in which case the area is left unchanged.
    pub fn push_vec<S: AsRef<str>>(&mut self, strs: &[S], limit: u64) -> Result<u64, Error> {
        let vec_addr = self.cursor();
        let strings_addr = vec_addr + (strs.len() as u64 + 1) * 8;
        let needed = strs.iter().fold(strings_addr, |cur, s| {
            cur + math::round_up(s.as_ref().len() as u64 + 1, 8)
        });
        if needed > limit {
            return Err(Error::ArgSpace {
                needed: needed - self.start,
                limit: limit - self.start,
            });
        }

        let mut str_addr = strings_addr;
        let mut strings = Vec::new();
        for s in strs {
            self.bytes.extend_from_slice(&str_addr.to_le_bytes());
            let s = s.as_ref().as_bytes();
            let padded = math::round_up(s.len() + 1, 8);
            strings.extend_from_slice(s);
            strings.resize(strings.len() + padded - s.len(), 0);
            str_addr += padded as u64;
        }
        self.bytes.extend_from_slice(&0u64.to_le_bytes());
        self.bytes.extend_from_slice(&strings);
        Ok(vec_addr)
    }
}

/// Builds the argument area for the given arguments and optional log flags.
///
/// Returns the area together with the addresses of argv and envp (0 without log flags).
pub fn marshal_args<S: AsRef<str>>(
    args: &[S],
    logflags: Option<&str>,
) -> Result<(ArgArea, u64, u64), Error> {
    let mut area = ArgArea::new(cfg::ARGV_START);
    let argv = area.push_vec(args, cfg::ARGS_END)?;
    let envp = match logflags {
        Some(flags) => area.push_vec(&[format!("LOG={}", flags)], cfg::ARGS_END)?,
        None => 0,
    };
    Ok((area, argv, envp))
}

/// A validated program binary, ready to be loaded
pub struct Image {
    path: PathBuf,
    data: Vec<u8>,
    segments: Vec<ProgramHeader>,
}

impl Image {
    /// Reads the given ELF binary and checks that it can be loaded into a window of `win_size`
    /// bytes.
    ///
    /// The entry point has to be [`cfg::ENTRY_ADDR`], because the jump at the reset vector relies
    /// on that.
    pub fn open(path: &Path, win_size: GlobOff) -> Result<Self, Error> {
        let data = fs::read(path).map_err(|source| Error::ProgramRead {
            path: path.to_path_buf(),
            source,
        })?;

        let elf = Elf::new(&data)?;
        if elf.entry() != cfg::ENTRY_ADDR {
            return Err(Error::EntryMismatch {
                path: path.to_path_buf(),
                entry: elf.entry(),
                expected: cfg::ENTRY_ADDR,
            });
        }

        let segments = elf.load_segments()?;
        for seg in &segments {
            let in_window = seg
                .phys_addr
                .checked_sub(cfg::MEM_OFFSET)
                .and_then(|off| off.checked_add(seg.mem_size))
                .map_or(false, |end| end <= win_size);
            if !in_window {
                return Err(Error::SegmentOutOfWindow {
                    path: path.to_path_buf(),
                    addr: seg.phys_addr,
                    size: seg.mem_size,
                });
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            data,
            segments,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the load segments of the binary
    pub fn segments(&self) -> &[ProgramHeader] {
        &self.segments
    }

    fn segment_data(&self, seg: &ProgramHeader) -> &[u8] {
        let start = seg.offset as usize;
        &self.data[start..start + seg.file_size as usize]
    }
}

/// Everything the loader needs to know about the platform
pub struct LoadParams<'l> {
    pub layout: &'l Layout,
    /// The descriptors of all tiles, including the memory tile
    pub descs: &'l [TileDesc],
    /// The NoC ids of all tiles, including the memory tile
    pub tile_ids: &'l [TileId],
    pub logflags: Option<&'l str>,
}

/// Encodes the jump from the reset vector to the entry point
pub fn trampoline() -> Result<u64, Error> {
    env::jump_instr((cfg::ENTRY_ADDR - cfg::RESET_VEC) as i64)
        .map(u64::from)
        .ok_or_else(|| Error::Config("entry point is out of reach of the reset vector".to_string()))
}

/// Loads `prog` with the binary `image` into tile `idx`.
///
/// The tile's clock is enabled, but the tile is not started. Loading the same program twice
/// yields the same memory contents.
pub fn load_program<T: TileDevice, M: MemDevice>(
    tile: &mut T,
    mem: &mut M,
    params: &LoadParams<'_>,
    idx: usize,
    prog: &Program,
    image: &Image,
) -> Result<(), Error> {
    let layout = params.layout;

    // the clock needs to run to accept writes
    tile.enable_clock()?;

    info!("{}: loading {}...", tile.name(), image.path().display());

    let (area, argv, envp) = marshal_args(&prog.args, params.logflags)?;

    for seg in image.segments() {
        let dst = layout.translate(idx, seg.phys_addr);
        let data = image.segment_data(seg);
        debug!(
            "{}: loading segment {:#x}..{:#x} to {:#x}",
            tile.name(),
            seg.phys_addr,
            seg.phys_addr + seg.mem_size,
            dst
        );
        mem.write_bytes(dst, data)?;
        if seg.mem_size > seg.file_size {
            let bss = vec![0u8; (seg.mem_size - seg.file_size) as usize];
            mem.write_bytes(dst + seg.file_size, &bss)?;
        }
    }

    mem.write_bytes(layout.translate(idx, area.start()), area.bytes())?;

    let kenv = if idx == 0 {
        GlobAddr::new_with(cfg::MEM_TILE, layout.kenv().addr).raw()
    }
    else {
        0
    };
    let env = EnvData {
        platform: cfg::PLATFORM_HW,
        tile_id: idx as u64,
        tile_desc: params.descs[idx],
        argc: prog.args.len() as u64,
        argv,
        envp,
        kenv,
        raw_tile_ids: params.tile_ids.to_vec(),
    };

    mem.write_u64(layout.translate(idx, cfg::RESET_VEC), trampoline()?)?;
    mem.write_bytes(layout.translate(idx, cfg::ENV_START), &env.to_bytes())?;
    Ok(())
}
