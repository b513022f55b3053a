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

//! The fixed memory layout and tile assignment of the FPGA platform

use crate::const_assert;

/// The number of bits of a page
pub const PAGE_BITS: usize = 12;
/// The size of a page
pub const PAGE_SIZE: u64 = 1 << PAGE_BITS;

/// The capacity of the memory tile (DRAM)
pub const DRAM_SIZE: u64 = 2 * 1024 * 1024 * 1024;
/// The tile index of the memory tile, as used in global addresses
pub const MEM_TILE: u16 = 8;

/// The address at which a compute tile sees the beginning of its private window
pub const MEM_OFFSET: u64 = 0x1000_0000;
/// The address the core starts executing at; the loader puts the trampoline here
pub const RESET_VEC: u64 = MEM_OFFSET;
/// The address of the environment block
pub const ENV_START: u64 = MEM_OFFSET + 0x1000;
/// The entry point every binary has to be linked to
pub const ENTRY_ADDR: u64 = MEM_OFFSET + 0x3000;
/// The beginning of the argument space (argv, envp and their strings)
pub const ARGV_START: u64 = ENV_START + 0x400;
/// The end of the argument space
pub const ARGS_END: u64 = ENV_START + 0x800;

/// The location of the boot information within the memory tile
pub const KENV_ADDR: u64 = 0;
/// The space reserved for the boot information
pub const KENV_SIZE: u64 = 4 * 1024;
/// The location of the serial mailbox within the memory tile
pub const SERIAL_ADDR: u64 = KENV_ADDR + KENV_SIZE;
/// The size of the serial mailbox
pub const SERIAL_SIZE: u64 = 4 * 1024;
/// The beginning of the private windows (physical-memory protection) within the memory tile
pub const PMP_ADDR: u64 = SERIAL_ADDR + SERIAL_SIZE;

/// The size of the private window per tile if virtual memory is enabled
pub const PMP_SIZE_VM: u64 = 16 * 1024 * 1024;
/// The size of the private window per tile if virtual memory is disabled
pub const PMP_SIZE_NOVM: u64 = 64 * 1024 * 1024;

/// The alignment of boot modules
pub const MOD_ALIGN: u64 = PAGE_SIZE;
/// The maximum length of a boot module name including the null termination
pub const MAX_MODNAME_LEN: usize = 64;

/// The platform identifier in the environment block
pub const PLATFORM_HW: u64 = 1;

/// The tiles below this index contain a Rocket core, the others a BOOM core
pub const ROCKET_TILES: usize = 5;
/// The tile that has the NIC and the serial line attached
pub const IO_TILE: usize = 6;

/// The maximum number of tiles a global address can refer to
pub const MAX_TILES: usize = 0x4000;

const_assert!(ENV_START < ARGV_START && ARGV_START < ARGS_END && ARGS_END < ENTRY_ADDR);
const_assert!(PMP_ADDR % PAGE_SIZE == 0);
