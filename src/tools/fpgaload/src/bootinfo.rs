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

//! The boot-info builder: describes modules, tiles and memory to the first tile

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use base::cfg;
use base::kif::{boot, TileDesc};
use base::mem::{GlobAddr, GlobOff};
use base::util::math;

use log::info;

use crate::device::MemDevice;
use crate::layout::Layout;
use crate::{desc, Error};

/// A boot module as given on the command line (`name=path`)
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModSpec {
    pub name: String,
    pub path: PathBuf,
}

impl FromStr for ModSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, path) = s
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("module '{}' is not of the form name=path", s)))?;
        if name.is_empty() || path.is_empty() {
            return Err(Error::Config(format!("module '{}' has an empty name or path", s)));
        }
        if name.len() >= cfg::MAX_MODNAME_LEN {
            return Err(Error::Config(format!(
                "module name '{}' is longer than {} bytes",
                name,
                cfg::MAX_MODNAME_LEN - 1
            )));
        }
        Ok(Self {
            name: name.to_string(),
            path: PathBuf::from(path),
        })
    }
}

/// A boot module whose contents have been read
#[derive(Clone, Debug)]
pub struct Module {
    pub spec: ModSpec,
    pub data: Vec<u8>,
}

/// Reads all given modules; a module that cannot be read aborts the bring-up
pub fn read_modules(specs: &[ModSpec]) -> Result<Vec<Module>, Error> {
    specs
        .iter()
        .map(|spec| {
            fs::read(&spec.path)
                .map(|data| Module {
                    spec: spec.clone(),
                    data,
                })
                .map_err(|source| Error::ModuleRead {
                    name: spec.name.clone(),
                    path: spec.path.clone(),
                    source,
                })
        })
        .collect()
}

/// The boot information as it is written into the memory tile
#[derive(Debug)]
pub struct BootInfo {
    pub info: boot::Info,
    pub mods: Vec<boot::Mod>,
    pub tiles: Vec<TileDesc>,
    pub mem: boot::Mem,
}

impl BootInfo {
    /// Places the given modules into the module area and describes the platform.
    ///
    /// Every module starts at a page boundary. The memory behind the last module is passed on as
    /// the only memory region.
    pub fn plan(layout: &Layout, modules: &[Module]) -> Result<Self, Error> {
        let mut cursor = layout.mods().addr;
        let mut mods = Vec::with_capacity(modules.len());
        for m in modules {
            let size = m.data.len() as GlobOff;
            mods.push(boot::Mod::new(
                GlobAddr::new_with(cfg::MEM_TILE, cursor),
                size,
                &m.spec.name,
            )?);
            cursor = math::round_up(cursor + size, cfg::MOD_ALIGN);
        }

        if cursor > layout.mods().end() {
            return Err(Error::LayoutOverflow {
                what: "boot modules",
                end: cursor,
                limit: layout.mods().end(),
            });
        }

        let tiles = desc::all_descs(layout);
        let info = boot::Info {
            mod_count: mods.len() as u64,
            tile_count: tiles.len() as u64,
            mem_count: 1,
            serv_count: 0,
        };
        let mem = boot::Mem::new(
            GlobAddr::new_with(cfg::MEM_TILE, cursor),
            layout.mods().end() - cursor,
            false,
        );

        let res = Self {
            info,
            mods,
            tiles,
            mem,
        };
        if res.size() as GlobOff > layout.kenv().size {
            return Err(Error::LayoutOverflow {
                what: "boot information",
                end: layout.kenv().addr + res.size() as GlobOff,
                limit: layout.kenv().end(),
            });
        }
        Ok(res)
    }

    /// Returns the size of the serialized boot information
    pub fn size(&self) -> usize {
        boot::Info::SIZE
            + self.mods.len() * boot::Mod::SIZE
            + self.tiles.len() * 8
            + boot::Mem::SIZE
    }

    /// Serializes the boot information
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut res = Vec::with_capacity(self.size());
        res.extend_from_slice(&self.info.to_bytes());
        for m in &self.mods {
            res.extend_from_slice(&m.to_bytes());
        }
        for t in &self.tiles {
            res.extend_from_slice(&boot::tile_to_bytes(*t));
        }
        res.extend_from_slice(&self.mem.to_bytes());
        res
    }
}

/// Writes the modules and the boot information into the memory tile
pub fn load_boot_info<M: MemDevice>(
    mem: &mut M,
    layout: &Layout,
    modules: &[Module],
) -> Result<BootInfo, Error> {
    let bootinfo = BootInfo::plan(layout, modules)?;

    for (m, desc) in modules.iter().zip(&bootinfo.mods) {
        let off = desc.addr.offset();
        info!(
            "{}: loading {} with {} bytes to {:#x}",
            mem.id(),
            m.spec.path.display(),
            m.data.len(),
            off
        );
        mem.write_bytes_checked(off, &m.data)?;
    }

    mem.write_bytes(layout.kenv().addr, &bootinfo.to_bytes())?;
    Ok(bootinfo)
}
