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

//! Contains the kernel interface definitions that the loader produces

pub mod boot;
mod perm;
mod tiledesc;

pub use self::perm::Perm;
pub use self::tiledesc::{
    TileAttr, TileDesc, TileDescRaw, TileISA, TileType, ATTR_MASK, ATTR_SHIFT, ISA_MASK,
    ISA_SHIFT, MEM_SHIFT, TYPE_MASK,
};
