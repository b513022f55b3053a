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

//! Brings up M3 on the FPGA platform.
//!
//! The loader resets and configures the TCU of every tile, writes the boot information and the
//! boot modules into the memory tile, loads a program into the private window of each tile,
//! starts the tiles and finally bridges the console until the system shuts down or the run times
//! out. On timeouts, it extracts the TCU logs and instruction traces of all tiles.

pub mod bootinfo;
pub mod bringup;
pub mod config;
pub mod console;
pub mod desc;
pub mod device;
pub mod diag;
mod error;
pub mod hw;
pub mod layout;
pub mod loader;
pub mod logger;
pub mod mock;
pub mod signal;
pub mod supervisor;
pub mod tileinit;

pub use error::Error;
