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

//! The environment of a tile, as written by the loader into the tile's private window
//!
//! The environment block starts at [`cfg::ENV_START`](crate::cfg::ENV_START) and consists of
//! little-endian 8-byte fields:
//!
//! ```text
//! platform, tile_id, tile_desc, argc, argv, envp, kenv, raw_tile_count, raw_tile_ids[..]
//! ```
//!
//! The tile starts executing at [`cfg::RESET_VEC`](crate::cfg::RESET_VEC), where the loader puts a
//! single jump to the actual entry point.

use crate::errors::Error;
use crate::kif::TileDesc;
use crate::tcu::TileId;
use crate::util;

/// The number of fixed fields before the tile table
pub const ENV_FIELDS: usize = 8;

/// The environment block of one tile
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EnvData {
    /// The platform identifier
    pub platform: u64,
    /// The (logical) id of the tile
    pub tile_id: u64,
    /// The descriptor of the tile
    pub tile_desc: TileDesc,
    /// The number of arguments
    pub argc: u64,
    /// The address of the argument vector
    pub argv: u64,
    /// The address of the environment vector (0 if there is none)
    pub envp: u64,
    /// The global address of the boot information (only set for the first tile)
    pub kenv: u64,
    /// The NoC ids of all tiles, including the memory tile
    pub raw_tile_ids: Vec<TileId>,
}

impl EnvData {
    /// Returns the size of the serialized environment
    pub fn size(&self) -> usize {
        (ENV_FIELDS + self.raw_tile_ids.len()) * 8
    }

    /// Serializes the environment, including the tile table
    pub fn to_bytes(&self) -> Vec<u8> {
        let fields = [
            self.platform,
            self.tile_id,
            self.tile_desc.value(),
            self.argc,
            self.argv,
            self.envp,
            self.kenv,
            self.raw_tile_ids.len() as u64,
        ];

        let mut res = Vec::with_capacity(self.size());
        for f in fields {
            res.extend_from_slice(&f.to_le_bytes());
        }
        for id in &self.raw_tile_ids {
            res.extend_from_slice(&(id.raw() as u64).to_le_bytes());
        }
        res
    }

    /// Deserializes an environment from the beginning of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let field = |i: usize| {
            util::read_u64(bytes, i * 8).ok_or(Error::ShortRecord {
                found: bytes.len(),
                expected: (i + 1) * 8,
            })
        };

        let count = field(7)? as usize;
        let mut raw_tile_ids = Vec::with_capacity(count);
        for i in 0..count {
            raw_tile_ids.push(TileId::new_from_raw(field(ENV_FIELDS + i)? as u16));
        }

        Ok(Self {
            platform: field(0)?,
            tile_id: field(1)?,
            tile_desc: TileDesc::new_from(field(2)?),
            argc: field(3)?,
            argv: field(4)?,
            envp: field(5)?,
            kenv: field(6)?,
            raw_tile_ids,
        })
    }
}

/// The opcode of the RISC-V `jal` instruction
const OPCODE_JAL: u32 = 0x6F;

/// Encodes the RISC-V instruction `jal x0, <offset>`, that is, an unconditional relative jump.
///
/// Returns `None` if `offset` is odd or does not fit into the 21-bit immediate.
pub fn jump_instr(offset: i64) -> Option<u32> {
    if offset % 2 != 0 || !(-(1 << 20)..(1 << 20)).contains(&offset) {
        return None;
    }

    let imm = offset as u32;
    let bit20 = (imm >> 20) & 0x1;
    let bits10_1 = (imm >> 1) & 0x3FF;
    let bit11 = (imm >> 11) & 0x1;
    let bits19_12 = (imm >> 12) & 0xFF;
    Some((bit20 << 31) | (bits10_1 << 21) | (bit11 << 20) | (bits19_12 << 12) | OPCODE_JAL)
}
