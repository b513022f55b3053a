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

//! Contains the basics of the ELF interface
//!
//! Only 64-bit little-endian ELF files are supported, because that is all the tiles execute.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::errors::Error;
use crate::util;

const EI_NIDENT: usize = 16;
const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;

/// The program header entry types
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum PHType {
    /// Load segment
    #[default]
    Load = 1,
}

/// ELF header
#[derive(Default, Debug)]
pub struct ElfHeader {
    /// ELF magic: ['\x7F', 'E', 'L', 'F']
    pub ident: [u8; EI_NIDENT],
    /// ELF type (e.g., executable)
    pub ty: u16,
    /// Machine the ELF binary was built for
    pub machine: u16,
    /// ELF version
    pub version: u32,
    /// Entry point of the program
    pub entry: u64,
    /// Program header offset
    pub ph_off: u64,
    /// Section header offset
    pub sh_off: u64,
    /// ELF flags
    pub flags: u32,
    /// Size of the ELF header
    pub eh_size: u16,
    /// Size of program headers
    pub ph_entry_size: u16,
    /// Number of program headers
    pub ph_num: u16,
    /// Size of section headers
    pub sh_entry_size: u16,
    /// Number of section headers
    pub sh_num: u16,
    /// Section header string table index
    pub sh_string_idx: u16,
}

impl ElfHeader {
    /// The size of the header in the file
    pub const SIZE: usize = 64;

    /// Parses the ELF header at the beginning of `data`
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let trunc = |offset: usize| Error::TruncatedElf {
            what: "ELF header",
            offset: offset as u64,
            size: data.len(),
        };
        if data.len() < Self::SIZE {
            return Err(trunc(0));
        }

        let mut ident = [0u8; EI_NIDENT];
        ident.copy_from_slice(&data[0..EI_NIDENT]);
        if ident[0..4] != ELF_MAGIC {
            return Err(Error::InvalidElf("bad magic"));
        }
        if ident[4] != ELFCLASS64 {
            return Err(Error::InvalidElf("not a 64-bit ELF file"));
        }
        if ident[5] != ELFDATA2LSB {
            return Err(Error::InvalidElf("not a little-endian ELF file"));
        }

        let u16_at = |off| util::read_u16(data, off).ok_or_else(|| trunc(off));
        let u32_at = |off| util::read_u32(data, off).ok_or_else(|| trunc(off));
        let u64_at = |off| util::read_u64(data, off).ok_or_else(|| trunc(off));

        Ok(Self {
            ident,
            ty: u16_at(16)?,
            machine: u16_at(18)?,
            version: u32_at(20)?,
            entry: u64_at(24)?,
            ph_off: u64_at(32)?,
            sh_off: u64_at(40)?,
            flags: u32_at(48)?,
            eh_size: u16_at(52)?,
            ph_entry_size: u16_at(54)?,
            ph_num: u16_at(56)?,
            sh_entry_size: u16_at(58)?,
            sh_num: u16_at(60)?,
            sh_string_idx: u16_at(62)?,
        })
    }
}

/// Program header for 64-bit ELF files
#[derive(Default, Debug, Clone)]
pub struct ProgramHeader {
    /// Program header type
    pub ty: u32,
    /// Program header flags
    pub flags: u32,
    /// File offset
    pub offset: u64,
    /// Virtual address
    pub virt_addr: u64,
    /// Physical address
    pub phys_addr: u64,
    /// Size of this program header in the file
    pub file_size: u64,
    /// Size of this program header in memory
    pub mem_size: u64,
    /// Alignment
    pub align: u64,
}

impl ProgramHeader {
    /// The size of a program header in the file
    pub const SIZE: usize = 56;

    /// Parses the program header at `off` within `data`
    pub fn parse(data: &[u8], off: usize) -> Result<Self, Error> {
        let trunc = || Error::TruncatedElf {
            what: "program header",
            offset: off as u64,
            size: data.len(),
        };
        let bytes = off
            .checked_add(Self::SIZE)
            .and_then(|end| data.get(off..end))
            .ok_or_else(trunc)?;

        Ok(Self {
            ty: util::read_u32(bytes, 0).ok_or_else(trunc)?,
            flags: util::read_u32(bytes, 4).ok_or_else(trunc)?,
            offset: util::read_u64(bytes, 8).ok_or_else(trunc)?,
            virt_addr: util::read_u64(bytes, 16).ok_or_else(trunc)?,
            phys_addr: util::read_u64(bytes, 24).ok_or_else(trunc)?,
            file_size: util::read_u64(bytes, 32).ok_or_else(trunc)?,
            mem_size: util::read_u64(bytes, 40).ok_or_else(trunc)?,
            align: util::read_u64(bytes, 48).ok_or_else(trunc)?,
        })
    }
}

/// An ELF binary held in memory
pub struct Elf<'d> {
    data: &'d [u8],
    hdr: ElfHeader,
}

impl<'d> Elf<'d> {
    /// Parses the header of the given ELF binary
    pub fn new(data: &'d [u8]) -> Result<Self, Error> {
        let hdr = ElfHeader::parse(data)?;
        Ok(Self { data, hdr })
    }

    /// Returns the ELF header
    pub fn header(&self) -> &ElfHeader {
        &self.hdr
    }

    /// Returns the entry point
    pub fn entry(&self) -> u64 {
        self.hdr.entry
    }

    /// Returns all non-empty load segments
    pub fn load_segments(&self) -> Result<Vec<ProgramHeader>, Error> {
        let mut segs = Vec::new();
        let trunc = || Error::TruncatedElf {
            what: "program header table",
            offset: self.hdr.ph_off,
            size: self.data.len(),
        };
        let mut off = usize::try_from(self.hdr.ph_off).map_err(|_| trunc())?;
        for _ in 0..self.hdr.ph_num {
            let phdr = ProgramHeader::parse(self.data, off)?;
            off = off
                .checked_add(self.hdr.ph_entry_size as usize)
                .ok_or_else(trunc)?;

            // we're only interested in non-empty load segments
            if phdr.ty != PHType::Load.into() || phdr.mem_size == 0 {
                continue;
            }
            if phdr.file_size > phdr.mem_size {
                return Err(Error::InvalidElf("segment file size exceeds memory size"));
            }
            if phdr.offset.saturating_add(phdr.file_size) > self.data.len() as u64 {
                return Err(Error::TruncatedElf {
                    what: "segment",
                    offset: phdr.offset,
                    size: self.data.len(),
                });
            }

            segs.push(phdr);
        }
        Ok(segs)
    }

}
