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

//! The platform contract between the FPGA loader and the software booted on the tiles.
//!
//! Everything in here describes data that crosses the boundary to the booted system: tile
//! descriptors, global addresses, TCU endpoint registers, the boot information, the per-tile
//! environment and the ELF binaries that are loaded. All encodings are fixed by the hardware and
//! the booted system, so they have to be reproduced bit-for-bit.

pub use static_assertions::const_assert;

pub mod cfg;
pub mod elf;
pub mod env;
mod errors;
pub mod kif;
pub mod mem;
pub mod tcu;
pub mod util;

pub use errors::Error;
