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

//! Contains the error types of the platform contract

use thiserror::Error;

/// The errors that can occur while encoding or decoding platform data
#[derive(Debug, Error)]
pub enum Error {
    /// The ELF file is not a 64-bit little-endian ELF file
    #[error("invalid ELF file: {0}")]
    InvalidElf(&'static str),
    /// A structure of the ELF file lies outside of the file
    #[error("ELF file truncated: {what} at {offset:#x} exceeds file size {size:#x}")]
    TruncatedElf {
        what: &'static str,
        offset: u64,
        size: usize,
    },
    /// A name does not fit into its fixed-size record
    #[error("name '{name}' is too long (maximum is {max} bytes)")]
    NameTooLong { name: String, max: usize },
    /// A serialized record is shorter than its fixed size
    #[error("record too short: {found} bytes, expected {expected}")]
    ShortRecord { found: usize, expected: usize },
}
