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

//! The boot information that the loader passes to the first tile
//!
//! The information is a sequence of little-endian 8-byte fields:
//!
//! ```text
//! Info:  mod_count, tile_count, mem_count, serv_count
//! Mod:   addr, size, name[MAX_MODNAME_LEN]              (mod_count times)
//! Tile:  desc                                           (tile_count times)
//! Mem:   addr, size                                     (mem_count times)
//! ```

use core::fmt;

use crate::cfg::MAX_MODNAME_LEN;
use crate::errors::Error;
use crate::kif::TileDesc;
use crate::mem::GlobAddr;
use crate::util;

static_assertions::const_assert_eq!(Mod::SIZE, 80);

/// The boot information header
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq)]
pub struct Info {
    /// The number of boot modules
    pub mod_count: u64,
    /// The number of tiles
    pub tile_count: u64,
    /// The number of memory regions
    pub mem_count: u64,
    /// The number of services
    pub serv_count: u64,
}

impl Info {
    /// The size of the serialized header
    pub const SIZE: usize = 4 * 8;

    /// Serializes the header
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut res = [0u8; Self::SIZE];
        let fields = [
            self.mod_count,
            self.tile_count,
            self.mem_count,
            self.serv_count,
        ];
        for (chunk, val) in res.chunks_exact_mut(8).zip(fields) {
            chunk.copy_from_slice(&val.to_le_bytes());
        }
        res
    }

    /// Deserializes the header from the beginning of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let field = |i: usize| {
            util::read_u64(bytes, i * 8).ok_or(Error::ShortRecord {
                found: bytes.len(),
                expected: Self::SIZE,
            })
        };
        Ok(Self {
            mod_count: field(0)?,
            tile_count: field(1)?,
            mem_count: field(2)?,
            serv_count: field(3)?,
        })
    }
}

/// A boot module
#[derive(Clone, Eq, PartialEq)]
pub struct Mod {
    /// The global address of the module
    pub addr: GlobAddr,
    /// The size of the module
    pub size: u64,
    name: String,
}

impl Mod {
    /// The size of a serialized module record
    pub const SIZE: usize = 16 + MAX_MODNAME_LEN;

    /// Creates a new boot module
    pub fn new(addr: GlobAddr, size: u64, name: &str) -> Result<Self, Error> {
        if name.len() >= MAX_MODNAME_LEN {
            return Err(Error::NameTooLong {
                name: name.to_string(),
                max: MAX_MODNAME_LEN - 1,
            });
        }
        Ok(Self {
            addr,
            size,
            name: name.to_string(),
        })
    }

    /// Returns the name of the module
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Serializes the module record; the name is null-terminated and zero-padded
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut res = [0u8; Self::SIZE];
        res[0..8].copy_from_slice(&self.addr.raw().to_le_bytes());
        res[8..16].copy_from_slice(&self.size.to_le_bytes());
        res[16..16 + self.name.len()].copy_from_slice(self.name.as_bytes());
        res
    }

    /// Deserializes a module record from the beginning of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let short = || Error::ShortRecord {
            found: bytes.len(),
            expected: Self::SIZE,
        };
        if bytes.len() < Self::SIZE {
            return Err(short());
        }
        let addr = util::read_u64(bytes, 0).ok_or_else(short)?;
        let size = util::read_u64(bytes, 8).ok_or_else(short)?;
        let name = util::cstr_slice_to_str(&bytes[16..Self::SIZE]).ok_or_else(short)?;
        Self::new(GlobAddr::new(addr), size, name)
    }
}

impl fmt::Debug for Mod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "Mod[addr: {:?}, size: {:#x}, name: {}]",
            self.addr, self.size, self.name
        )
    }
}

/// Serializes the descriptor of a tile
pub fn tile_to_bytes(desc: TileDesc) -> [u8; 8] {
    desc.value().to_le_bytes()
}

/// A memory region
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Mem {
    addr: GlobAddr,
    size: u64,
}

impl Mem {
    /// The size of a serialized memory region
    pub const SIZE: usize = 16;

    /// Creates a new memory region of given size.
    pub fn new(addr: GlobAddr, size: u64, reserved: bool) -> Self {
        assert!((size & 1) == 0);
        Mem {
            addr,
            size: size | (reserved as u64),
        }
    }

    /// Returns the global address of this memory region
    pub fn addr(&self) -> GlobAddr {
        self.addr
    }

    /// Returns the size of the memory region
    pub fn size(&self) -> u64 {
        self.size & !1
    }

    /// Returns true if the region is reserved, that is, not usable by applications
    pub fn reserved(&self) -> bool {
        (self.size & 1) == 1
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut res = [0u8; Self::SIZE];
        res[0..8].copy_from_slice(&self.addr.raw().to_le_bytes());
        res[8..16].copy_from_slice(&self.size.to_le_bytes());
        res
    }
}

impl fmt::Debug for Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(
            f,
            "Mem[addr: {:?}, size: {:#x}, res={}]",
            self.addr,
            self.size(),
            self.reserved()
        )
    }
}
