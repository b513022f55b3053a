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

//! Contains utilities

pub mod math;

/// Returns the string up to the first null byte in `s`, or `None` if there is no null byte or the
/// string is not valid UTF-8
pub fn cstr_slice_to_str(s: &[u8]) -> Option<&str> {
    let end = s.iter().position(|b| *b == 0)?;
    core::str::from_utf8(&s[..end]).ok()
}

/// Reads a little-endian `u64` from `bytes` at `off`
pub fn read_u64(bytes: &[u8], off: usize) -> Option<u64> {
    let raw = bytes.get(off..off + 8)?;
    Some(u64::from_le_bytes(raw.try_into().ok()?))
}

/// Reads a little-endian `u32` from `bytes` at `off`
pub fn read_u32(bytes: &[u8], off: usize) -> Option<u32> {
    let raw = bytes.get(off..off + 4)?;
    Some(u32::from_le_bytes(raw.try_into().ok()?))
}

/// Reads a little-endian `u16` from `bytes` at `off`
pub fn read_u16(bytes: &[u8], off: usize) -> Option<u16> {
    let raw = bytes.get(off..off + 2)?;
    Some(u16::from_le_bytes(raw.try_into().ok()?))
}
